use std::env;

use anyhow::{Context, Result};

/// Runtime configuration, collected from the environment once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    /// Base URL of the frontend; thumbnails render `{frontend_url}/form/{id}`.
    pub frontend_url: String,
    /// Heartbeat target, normally this service's own public URL.
    pub backend_url: String,
    /// CORS origin. `*` means permissive.
    pub allowed_origin: String,
    pub heartbeat_minutes: u64,
    pub ai_api_key: String,
    pub cloudinary: CloudinaryConfig,
    /// Optional: when absent, thumbnail URLs are not persisted.
    pub database_url: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CloudinaryConfig {
    pub cloud_name: String,
    pub api_key: String,
    pub api_secret: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let port = match get("PORT") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("PORT is not a valid port number: {raw}"))?,
            None => 9090,
        };
        let heartbeat_minutes = match get("HEARTBEAT_MINUTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("HEARTBEAT_MINUTES is not a number: {raw}"))?,
            None => 14,
        };

        Ok(Self {
            port,
            frontend_url: get("FRONTEND_URL")
                .unwrap_or_else(|| "http://localhost:3000".to_string()),
            backend_url: get("BACKEND_URL").unwrap_or_else(|| "http://localhost:9090".to_string()),
            allowed_origin: get("ALLOWED_ORIGIN").unwrap_or_else(|| "*".to_string()),
            heartbeat_minutes,
            ai_api_key: get("AI_API_KEY").context("AI_API_KEY not set in environment")?,
            cloudinary: CloudinaryConfig {
                cloud_name: get("CLOUDINARY_NAME")
                    .context("CLOUDINARY_NAME not set in environment")?,
                api_key: get("CLOUDINARY_API_KEY")
                    .context("CLOUDINARY_API_KEY not set in environment")?,
                api_secret: get("CLOUDINARY_API_SECRET")
                    .context("CLOUDINARY_API_SECRET not set in environment")?,
            },
            database_url: get("DATABASE_URL"),
        })
    }
}
