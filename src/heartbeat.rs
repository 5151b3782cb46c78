use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::{info, warn};

const PING_TIMEOUT: Duration = Duration::from_secs(10);

/// What one keep-alive ping observed.
#[derive(Debug, PartialEq, Eq)]
enum PingOutcome {
    Ok,
    BadStatus(u16),
    Failed(String),
}

/// Keep-alive loop: one GET to `target_url` per tick. The outcome is logged
/// and never surfaced to request handling. Runs until the process exits.
pub async fn run(target_url: String, period: Duration) {
    info!(target = %target_url, period_secs = period.as_secs(), "heartbeat started");
    let client = Client::builder()
        .timeout(PING_TIMEOUT)
        .build()
        .unwrap_or_default();

    let mut interval = tokio::time::interval(period);
    // The first tick fires immediately; skip it so the server is up first.
    interval.tick().await;

    loop {
        interval.tick().await;
        match ping(&client, &target_url).await {
            PingOutcome::Ok => info!("heartbeat ok"),
            PingOutcome::BadStatus(status) => warn!(status, "heartbeat got a non-200"),
            PingOutcome::Failed(error) => warn!(error = %error, "heartbeat request failed"),
        }
    }
}

async fn ping(client: &Client, target_url: &str) -> PingOutcome {
    match client.get(target_url).send().await {
        Ok(response) if response.status() == StatusCode::OK => PingOutcome::Ok,
        Ok(response) => PingOutcome::BadStatus(response.status().as_u16()),
        Err(err) => PingOutcome::Failed(err.to_string()),
    }
}
