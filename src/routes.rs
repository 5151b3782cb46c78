use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderValue;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{Value, json};
use sqlx::PgPool;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::bot::FormBot;
use crate::config::Config;
use crate::error::AppError;
use crate::renderer::{DEFAULT_BACKGROUND, RenderRequest};
use crate::screenshot::{Capture, ChromeCapture, ImageHost};
use crate::uploader::Uploader;

pub struct AppState {
    frontend_url: String,
    capture: Arc<dyn Capture>,
    host: Arc<dyn ImageHost>,
    bot: FormBot,
    pool: Option<PgPool>,
}

impl AppState {
    pub fn new(config: Config, pool: Option<PgPool>) -> anyhow::Result<Self> {
        Ok(Self {
            frontend_url: config.frontend_url,
            capture: Arc::new(ChromeCapture),
            host: Arc::new(Uploader::new(config.cloudinary)?),
            bot: FormBot::new(config.ai_api_key)?,
            pool,
        })
    }
}

pub fn router(state: Arc<AppState>, allowed_origin: &str) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/thumbnail", post(thumbnail))
        .route("/questify-bot", post(questify_bot))
        .layer(cors_layer(allowed_origin))
        .with_state(state)
}

fn cors_layer(allowed_origin: &str) -> CorsLayer {
    match allowed_origin {
        "*" => CorsLayer::permissive(),
        origin => match origin.parse::<HeaderValue>() {
            Ok(value) => CorsLayer::new()
                .allow_origin(value)
                .allow_methods(Any)
                .allow_headers(Any),
            Err(_) => {
                warn!(origin, "ALLOWED_ORIGIN is not a valid header value; using permissive CORS");
                CorsLayer::permissive()
            }
        },
    }
}

async fn root() -> &'static str {
    "Hey!"
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ThumbnailRequest {
    #[serde(default)]
    form_id: Option<String>,
    #[serde(default)]
    fullpage: Option<bool>,
    #[serde(default)]
    background_color: Option<String>,
}

/// Render the form page, upload the raster, persist the URL as the form's
/// thumbnail. Strictly sequential per request; no retries, no deduplication.
async fn thumbnail(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ThumbnailRequest>,
) -> Result<Json<Value>, AppError> {
    let form_id = payload
        .form_id
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingField("formId"))?;

    let request = RenderRequest {
        url: format!("{}/form/{}", state.frontend_url, form_id),
        full_page: payload.fullpage.unwrap_or(false),
        background_color: payload
            .background_color
            .unwrap_or_else(|| DEFAULT_BACKGROUND.to_string()),
    };
    info!(url = %request.url, full_page = request.full_page, "rendering thumbnail");

    let bytes = state
        .capture
        .capture(request)
        .await
        .map_err(AppError::ScreenshotFailed)?;
    let image_url = state
        .host
        .upload(bytes)
        .await
        .map_err(AppError::ScreenshotFailed)?;

    match &state.pool {
        Some(pool) => {
            sqlx::query(r#"UPDATE public."Form" SET thumbnail = $1 WHERE id = $2"#)
                .bind(&image_url)
                .bind(&form_id)
                .execute(pool)
                .await
                .map_err(AppError::Datastore)?;
        }
        None => warn!(%form_id, "no datastore configured; thumbnail URL not persisted"),
    }

    Ok(Json(json!({ "success": true, "message": image_url })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BotRequest {
    #[serde(default)]
    conversation: Option<String>,
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    current_state: Option<Value>,
}

async fn questify_bot(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<BotRequest>,
) -> Result<Json<Value>, AppError> {
    let conversation = payload
        .conversation
        .filter(|id| !id.is_empty())
        .ok_or(AppError::MissingField("conversation"))?;
    let prompt = payload
        .prompt
        .filter(|prompt| !prompt.is_empty())
        .ok_or(AppError::MissingField("prompt"))?;

    let data = state
        .bot
        .handle(&conversation, &prompt, payload.current_state)
        .await?;
    Ok(Json(json!({ "message": "Success", "data": data })))
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use axum::http::StatusCode;

    use super::*;

    /// Echoes the target URL back as the "image bytes" and counts calls.
    struct EchoCapture {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Capture for EchoCapture {
        async fn capture(&self, request: RenderRequest) -> anyhow::Result<Vec<u8>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(request.url.into_bytes())
        }
    }

    /// Turns the "image bytes" back into a URL, so tests can see exactly what
    /// was rendered and that the handler returns the host's URL untouched.
    struct EchoHost;

    #[async_trait]
    impl ImageHost for EchoHost {
        async fn upload(&self, bytes: Vec<u8>) -> anyhow::Result<String> {
            Ok(format!("https://res.cloudinary.test/{}", String::from_utf8(bytes)?))
        }
    }

    struct FailingCapture;

    #[async_trait]
    impl Capture for FailingCapture {
        async fn capture(&self, _request: RenderRequest) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("navigation timed out")
        }
    }

    fn test_state(capture: Arc<dyn Capture>, host: Arc<dyn ImageHost>) -> Arc<AppState> {
        Arc::new(AppState {
            frontend_url: "http://localhost:3000".to_string(),
            capture,
            host,
            bot: FormBot::new("test-key".to_string()).unwrap(),
            pool: None,
        })
    }

    fn thumbnail_payload(form_id: Option<&str>) -> ThumbnailRequest {
        ThumbnailRequest {
            form_id: form_id.map(str::to_string),
            fullpage: None,
            background_color: None,
        }
    }

    #[tokio::test]
    async fn missing_form_id_rejected_before_rendering() {
        let capture = Arc::new(EchoCapture { calls: AtomicUsize::new(0) });
        let state = test_state(capture.clone(), Arc::new(EchoHost));

        let err = thumbnail(State(state), Json(thumbnail_payload(None)))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "formId is missing");
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn empty_form_id_counts_as_missing() {
        let capture = Arc::new(EchoCapture { calls: AtomicUsize::new(0) });
        let state = test_state(capture.clone(), Arc::new(EchoHost));

        let err = thumbnail(State(state), Json(thumbnail_payload(Some(""))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(capture.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn success_returns_the_host_url_untouched() {
        let capture = Arc::new(EchoCapture { calls: AtomicUsize::new(0) });
        let state = test_state(capture, Arc::new(EchoHost));

        let Json(body) = thumbnail(State(state), Json(thumbnail_payload(Some("f-123"))))
            .await
            .unwrap();
        assert_eq!(body["success"], true);
        assert_eq!(
            body["message"],
            "https://res.cloudinary.test/http://localhost:3000/form/f-123"
        );
    }

    #[tokio::test]
    async fn render_failure_maps_to_upload_failed() {
        let state = test_state(Arc::new(FailingCapture), Arc::new(EchoHost));

        let err = thumbnail(State(state), Json(thumbnail_payload(Some("f-123"))))
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "Upload failed");
    }

    #[tokio::test]
    async fn concurrent_requests_do_not_interfere() {
        let capture = Arc::new(EchoCapture { calls: AtomicUsize::new(0) });
        let state = test_state(capture.clone(), Arc::new(EchoHost));

        let (left, right) = tokio::join!(
            thumbnail(State(state.clone()), Json(thumbnail_payload(Some("left")))),
            thumbnail(State(state.clone()), Json(thumbnail_payload(Some("right")))),
        );
        let left = left.unwrap().0["message"].as_str().unwrap().to_string();
        let right = right.unwrap().0["message"].as_str().unwrap().to_string();

        assert!(left.ends_with("/form/left"));
        assert!(right.ends_with("/form/right"));
        assert_eq!(capture.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn bot_requires_conversation_and_prompt() {
        let state = test_state(
            Arc::new(EchoCapture { calls: AtomicUsize::new(0) }),
            Arc::new(EchoHost),
        );

        let payload = BotRequest {
            conversation: None,
            prompt: Some("add a question".to_string()),
            current_state: None,
        };
        let err = questify_bot(State(state.clone()), Json(payload)).await.unwrap_err();
        assert_eq!(err.to_string(), "conversation is missing");

        let payload = BotRequest {
            conversation: Some("c-1".to_string()),
            prompt: None,
            current_state: None,
        };
        let err = questify_bot(State(state), Json(payload)).await.unwrap_err();
        assert_eq!(err.to_string(), "prompt is missing");
    }

    #[tokio::test]
    async fn root_says_hey() {
        assert_eq!(root().await, "Hey!");
    }
}
