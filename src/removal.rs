use std::time::Duration;

use anyhow::{anyhow, Result};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::utils::http::get_http_client;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemovalStatus {
    Starting,
    Processing,
    Succeeded,
    Failed,
    Canceled,
}

impl RemovalStatus {
    pub fn parse(value: &str) -> Self {
        match value.trim().to_lowercase().as_str() {
            "starting" => RemovalStatus::Starting,
            "processing" => RemovalStatus::Processing,
            "succeeded" => RemovalStatus::Succeeded,
            "failed" => RemovalStatus::Failed,
            "canceled" => RemovalStatus::Canceled,
            other => {
                warn!("Unknown removal job status '{other}'; treating as processing");
                RemovalStatus::Processing
            }
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RemovalStatus::Succeeded | RemovalStatus::Failed | RemovalStatus::Canceled
        )
    }
}

#[derive(Debug, Deserialize)]
struct RemovalResponse {
    id: Option<String>,
    status: Option<String>,
    output: Option<String>,
    error: Option<String>,
}

#[derive(Debug, Clone)]
pub struct RemovalJob {
    pub id: String,
    pub status: RemovalStatus,
    pub output: Option<String>,
    pub error: Option<String>,
}

async fn call_removal_endpoint(payload: serde_json::Value) -> Result<RemovalResponse> {
    let client = get_http_client();
    let response = client
        .post(&CONFIG.removal_endpoint)
        .json(&payload)
        .send()
        .await
        .map_err(|err| anyhow!("Background removal request failed: {err}"))?;

    if !response.status().is_success() {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(anyhow!(
            "Background removal request failed with status {}: {}",
            status,
            body.trim()
        ));
    }

    Ok(response.json::<RemovalResponse>().await?)
}

pub async fn start_removal(image_url: &str, api_key: &str) -> Result<RemovalJob> {
    let payload = json!({
        "action": "start",
        "image_url": image_url,
        "api_key": api_key,
    });

    let parsed = call_removal_endpoint(payload).await?;
    let id = parsed
        .id
        .filter(|value| !value.trim().is_empty())
        .ok_or_else(|| anyhow!("Background removal start did not return a job id"))?;
    let status = RemovalStatus::parse(parsed.status.as_deref().unwrap_or("starting"));
    debug!("Started background removal job {id} (status {status:?})");

    Ok(RemovalJob {
        id,
        status,
        output: parsed.output,
        error: parsed.error,
    })
}

pub async fn check_removal(job_id: &str, api_key: &str) -> Result<RemovalJob> {
    let payload = json!({
        "action": "check",
        "id": job_id,
        "api_key": api_key,
    });

    let parsed = call_removal_endpoint(payload).await?;
    Ok(RemovalJob {
        id: job_id.to_string(),
        status: RemovalStatus::parse(parsed.status.as_deref().unwrap_or("processing")),
        output: parsed.output,
        error: parsed.error,
    })
}

/// Submits a removal job and polls it once a second until it reaches a
/// terminal state, returning the output URL on success.
pub async fn remove_background(image_url: &str, api_key: &str) -> Result<String> {
    let mut job = start_removal(image_url, api_key).await?;

    for _ in 0..CONFIG.removal_poll_max_attempts {
        if job.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(CONFIG.removal_poll_interval_ms)).await;
        job = check_removal(&job.id, api_key).await?;
    }

    match job.status {
        RemovalStatus::Succeeded => job
            .output
            .filter(|value| !value.trim().is_empty())
            .ok_or_else(|| anyhow!("Background removal succeeded but returned no output URL")),
        RemovalStatus::Failed => Err(anyhow!(
            "Background removal failed: {}",
            job.error.unwrap_or_else(|| "unknown error".to_string())
        )),
        RemovalStatus::Canceled => Err(anyhow!("Background removal was canceled")),
        _ => Err(anyhow!(
            "Timed out waiting for background removal job {}",
            job.id
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_documented_status() {
        assert_eq!(RemovalStatus::parse("starting"), RemovalStatus::Starting);
        assert_eq!(RemovalStatus::parse("PROCESSING"), RemovalStatus::Processing);
        assert_eq!(RemovalStatus::parse("succeeded"), RemovalStatus::Succeeded);
        assert_eq!(RemovalStatus::parse("failed"), RemovalStatus::Failed);
        assert_eq!(RemovalStatus::parse("canceled"), RemovalStatus::Canceled);
    }

    #[test]
    fn unknown_status_counts_as_processing() {
        assert_eq!(RemovalStatus::parse("queued"), RemovalStatus::Processing);
    }

    #[test]
    fn only_the_three_terminal_states_stop_polling() {
        assert!(!RemovalStatus::Starting.is_terminal());
        assert!(!RemovalStatus::Processing.is_terminal());
        assert!(RemovalStatus::Succeeded.is_terminal());
        assert!(RemovalStatus::Failed.is_terminal());
        assert!(RemovalStatus::Canceled.is_terminal());
    }
}
