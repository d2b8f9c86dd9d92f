use std::time::Instant;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::info;

#[derive(Debug)]
pub struct SessionTimer {
    operation: String,
    section: Option<String>,
    project_id: Option<String>,
    detail_text: Option<String>,
    started_at: DateTime<Utc>,
    started_perf: Instant,
    status: String,
    detail: Option<String>,
    completed: bool,
}

impl SessionTimer {
    pub fn new(
        operation: &str,
        section: Option<&str>,
        project_id: Option<&str>,
        detail_text: Option<&str>,
    ) -> Self {
        // Truncate on a char boundary; prompts are routinely non-ASCII.
        let detail_text = detail_text
            .map(|value| value.replace('\n', " "))
            .map(|value| {
                if value.chars().count() > 300 {
                    value.chars().take(300).collect()
                } else {
                    value
                }
            })
            .filter(|value| !value.trim().is_empty());

        SessionTimer {
            operation: operation.to_string(),
            section: section.map(|value| value.to_string()),
            project_id: project_id.map(|value| value.to_string()),
            detail_text,
            started_at: Utc::now(),
            started_perf: Instant::now(),
            status: "success".to_string(),
            detail: None,
            completed: false,
        }
    }

    pub fn log_received(&self) {
        info!(
            target: "studio.timing",
            "event=session_received operation={} section={:?} project_id={:?} received_at={} text={:?}",
            self.operation,
            self.section,
            self.project_id,
            self.started_at.to_rfc3339(),
            self.detail_text
        );
    }

    pub fn mark_status(&mut self, status: &str, detail: Option<String>) {
        self.status = status.to_string();
        self.detail = detail;
    }

    pub fn log_completed(&mut self) {
        if self.completed {
            return;
        }
        self.completed = true;
        let completed_at = Utc::now();
        let duration = self.started_perf.elapsed().as_secs_f64();
        info!(
            target: "studio.timing",
            "event=session_completed operation={} section={:?} project_id={:?} started_at={} completed_at={} duration_s={:.3} status={} detail={}",
            self.operation,
            self.section,
            self.project_id,
            self.started_at.to_rfc3339(),
            completed_at.to_rfc3339(),
            duration,
            self.status,
            self.detail.clone().unwrap_or_default()
        );
    }
}

pub fn start_session_timer(
    operation: &str,
    section: Option<&str>,
    project_id: Option<&str>,
    detail_text: Option<&str>,
) -> SessionTimer {
    let timer = SessionTimer::new(operation, section, project_id, detail_text);
    timer.log_received();
    timer
}

pub fn complete_session_timer(timer: &mut SessionTimer, status: &str, detail: Option<String>) {
    timer.mark_status(status, detail);
    timer.log_completed();
}

pub async fn log_generation_timing<T, F, Fut>(
    provider: &str,
    model: &str,
    operation: &str,
    metadata: Option<JsonValue>,
    call: F,
) -> Result<T, anyhow::Error>
where
    F: FnOnce() -> Fut,
    Fut: std::future::Future<Output = Result<T, anyhow::Error>>,
{
    let started_at = Utc::now();
    let started_perf = Instant::now();
    let metadata_text = metadata
        .as_ref()
        .map(|value| value.to_string())
        .unwrap_or_else(|| "{}".to_string());
    info!(
        target: "studio.timing",
        "event=generation_request provider={} model={} operation={} started_at={} metadata={}",
        provider,
        model,
        operation,
        started_at.to_rfc3339(),
        metadata_text
    );

    let mut status = "success";
    let result = call().await;
    if result.is_err() {
        status = "error";
    }

    let completed_at = Utc::now();
    let duration = started_perf.elapsed().as_secs_f64();
    info!(
        target: "studio.timing",
        "event=generation_response provider={} model={} operation={} completed_at={} duration_s={:.3} status={} metadata={}",
        provider,
        model,
        operation,
        completed_at.to_rfc3339(),
        duration,
        status,
        metadata_text
    );

    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detail_text_truncates_multibyte_prompts_on_char_boundaries() {
        let prompt = format!("{}é plus trailing copy", "a".repeat(299));
        let timer = SessionTimer::new("generate", Some("landing"), None, Some(&prompt));

        let detail = timer.detail_text.as_deref().unwrap();
        assert_eq!(detail.chars().count(), 300);
        assert!(detail.ends_with('é'));
    }

    #[test]
    fn short_detail_text_is_kept_verbatim_with_newlines_flattened() {
        let timer = SessionTimer::new("generate", None, None, Some("line one\nline two"));
        assert_eq!(timer.detail_text.as_deref(), Some("line one line two"));

        let blank = SessionTimer::new("generate", None, None, Some("   "));
        assert!(blank.detail_text.is_none());
    }
}
