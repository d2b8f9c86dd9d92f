use std::time::Duration;

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose, Engine as _};
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

use crate::config::CONFIG;
use crate::llm::media::{detect_mime_type, MediaFile};
use crate::utils::http::get_http_client;
use crate::utils::timing::log_generation_timing;

#[derive(Debug, thiserror::Error)]
#[error("Image generation failed: {0}")]
pub struct ImageGenerationError(pub String);

/// Signature the hosted service returns for a revoked or mistyped API key.
/// Callers surface it as an invalid-credential failure.
pub const INVALID_CREDENTIAL_SIGNATURE: &str = "Requested entity was not found";

#[derive(Debug, Clone, Default)]
pub struct GeminiImageConfig {
    pub aspect_ratio: Option<String>,
    pub image_size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    candidates: Option<Vec<GeminiCandidate>>,
}

#[derive(Debug, Deserialize)]
struct GeminiCandidate {
    content: Option<GeminiContent>,
}

#[derive(Debug, Deserialize)]
struct GeminiContent {
    parts: Option<Vec<GeminiPart>>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum GeminiPart {
    Text {
        text: String,
    },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: GeminiInlineData,
    },
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GeminiInlineData {
    mime_type: String,
    data: String,
}

const GEMINI_MAX_RETRY_ATTEMPTS: usize = 2;
const GEMINI_RETRY_BASE_DELAY_MS: u64 = 900;

fn redact_api_key(text: &str, api_key: &str) -> String {
    let key = api_key.trim();
    if key.is_empty() {
        return text.to_string();
    }
    text.replace(key, "[redacted]")
}

fn gemini_should_retry_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

fn gemini_should_retry_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn gemini_retry_delay(attempt: usize) -> Duration {
    let attempt = attempt.max(1) as u64;
    Duration::from_millis(GEMINI_RETRY_BASE_DELAY_MS.saturating_mul(attempt))
}

fn build_safety_settings() -> Vec<serde_json::Value> {
    let profile = CONFIG.gemini_safety_settings.as_str();
    let threshold = match profile {
        "standard" => "BLOCK_MEDIUM_AND_ABOVE",
        "permissive" => "OFF",
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}', using permissive defaults.",
                profile
            );
            "OFF"
        }
    };

    vec![
        json!({ "category": "HARM_CATEGORY_HARASSMENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_HATE_SPEECH", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_SEXUALLY_EXPLICIT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_DANGEROUS_CONTENT", "threshold": threshold }),
        json!({ "category": "HARM_CATEGORY_CIVIC_INTEGRITY", "threshold": threshold }),
    ]
}

fn build_image_config(config: Option<&GeminiImageConfig>) -> Option<Value> {
    let config = config?;
    let mut map = Map::new();

    if let Some(aspect_ratio) = config.aspect_ratio.as_deref() {
        let trimmed = aspect_ratio.trim();
        if !trimmed.is_empty() {
            map.insert("aspectRatio".to_string(), json!(trimmed));
        }
    }

    if let Some(image_size) = config.image_size.as_deref() {
        let trimmed = image_size.trim();
        if !trimmed.is_empty() {
            map.insert("imageSize".to_string(), json!(trimmed));
        }
    }

    if map.is_empty() {
        None
    } else {
        Some(Value::Object(map))
    }
}

fn truncate_for_log(value: &str, limit: usize) -> String {
    if value.chars().count() <= limit {
        return value.to_string();
    }
    let truncated: String = value.chars().take(limit).collect();
    format!("{truncated}... (truncated)")
}

fn summarize_parts(parts: &[Value]) -> Vec<Value> {
    parts
        .iter()
        .map(|part| {
            if let Some(text) = part.get("text").and_then(|value| value.as_str()) {
                json!({ "text": truncate_for_log(text, 200) })
            } else if let Some(inline_data) = part.get("inlineData") {
                let mime_type = inline_data
                    .get("mimeType")
                    .and_then(|value| value.as_str())
                    .unwrap_or("unknown");
                let data_len = inline_data
                    .get("data")
                    .and_then(|value| value.as_str())
                    .map(|value| value.len())
                    .unwrap_or(0);
                json!({ "inlineData": { "mimeType": mime_type, "dataLen": data_len } })
            } else {
                json!({ "unknownPart": true })
            }
        })
        .collect()
}

fn summarize_payload(payload: &Value) -> Value {
    let mut summary = Map::new();

    if payload.pointer("/systemInstruction").is_some() {
        summary.insert(
            "systemInstruction".to_string(),
            Value::String("image_generation_system_prompt".to_string()),
        );
    }

    if let Some(contents) = payload.get("contents").and_then(|value| value.as_array()) {
        let mut summarized_contents = Vec::new();
        for content in contents {
            let role = content
                .get("role")
                .and_then(|value| value.as_str())
                .unwrap_or("user");
            let parts = content
                .get("parts")
                .and_then(|value| value.as_array())
                .map(|parts| summarize_parts(parts))
                .unwrap_or_default();
            summarized_contents.push(json!({ "role": role, "parts": parts }));
        }
        summary.insert("contents".to_string(), Value::Array(summarized_contents));
    }

    if let Some(config) = payload.get("generationConfig") {
        summary.insert("generationConfig".to_string(), config.clone());
    }

    if let Some(safety) = payload
        .get("safetySettings")
        .and_then(|value| value.as_array())
    {
        summary.insert("safetySettingsCount".to_string(), json!(safety.len()));
    }

    Value::Object(summary)
}

fn summarize_response(response: &GeminiResponse) -> Value {
    let mut text_parts = 0usize;
    let mut image_parts = 0usize;
    let mut text_preview = None;

    let candidates = response.candidates.as_deref().unwrap_or(&[]);
    for candidate in candidates {
        if let Some(content) = &candidate.content {
            if let Some(parts) = &content.parts {
                for part in parts {
                    match part {
                        GeminiPart::Text { text } => {
                            text_parts += 1;
                            if text_preview.is_none() && !text.trim().is_empty() {
                                text_preview = Some(truncate_for_log(text, 200));
                            }
                        }
                        GeminiPart::InlineData { inline_data } => {
                            if inline_data.mime_type.starts_with("image/") {
                                image_parts += 1;
                            }
                        }
                    }
                }
            }
        }
    }

    json!({
        "candidates": response.candidates.as_ref().map(|candidates| candidates.len()).unwrap_or(0),
        "textParts": text_parts,
        "imageParts": image_parts,
        "textPreview": text_preview
    })
}

fn summarize_error_body(body: &str) -> (Option<String>, String) {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return (None, "empty response body".to_string());
    }

    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        let message = value
            .pointer("/error/message")
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .or_else(|| {
                value
                    .get("message")
                    .and_then(|v| v.as_str())
                    .map(|v| v.to_string())
            });
        return (message, truncate_for_log(&value.to_string(), 2000));
    }

    (None, truncate_for_log(trimmed, 2000))
}

/// Image parts in priority order, then exactly one trailing text part.
fn build_request_parts(images: &[MediaFile], instruction_text: &str) -> Vec<Value> {
    let mut parts = Vec::new();

    for image in images {
        let mime_type = if image.mime_type.trim().is_empty() {
            detect_mime_type(&image.bytes).unwrap_or_else(|| "image/png".to_string())
        } else {
            image.mime_type.clone()
        };
        let encoded = general_purpose::STANDARD.encode(&image.bytes);
        parts.push(json!({
            "inlineData": {
                "mimeType": mime_type,
                "data": encoded
            }
        }));
    }

    parts.push(json!({ "text": instruction_text }));
    parts
}

fn extract_first_image(response: GeminiResponse) -> Option<Vec<u8>> {
    for candidate in response.candidates.unwrap_or_default() {
        if let Some(content) = candidate.content {
            if let Some(parts) = content.parts {
                for part in parts {
                    if let GeminiPart::InlineData { inline_data } = part {
                        if inline_data.mime_type.starts_with("image/") {
                            if let Ok(bytes) = general_purpose::STANDARD.decode(inline_data.data) {
                                return Some(bytes);
                            }
                        }
                    }
                }
            }
        }
    }
    None
}

async fn call_gemini_api(model: &str, api_key: &str, payload: Value) -> Result<GeminiResponse> {
    let client = get_http_client();
    let url = format!(
        "{}/models/{}:generateContent?key={}",
        CONFIG.gemini_api_base, model, api_key
    );

    if tracing::enabled!(tracing::Level::DEBUG) {
        let payload_summary = summarize_payload(&payload);
        debug!(target: "llm.gemini", model = model, payload = %payload_summary);
    }

    let mut attempt = 0usize;
    loop {
        attempt += 1;
        let response = match client
            .post(&url)
            .timeout(Duration::from_secs(90))
            .json(&payload)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => {
                let err_text = redact_api_key(&err.to_string(), api_key);
                let err_url = err.url().map(|url| redact_api_key(url.as_str(), api_key));
                let should_retry =
                    gemini_should_retry_error(&err) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
                warn!(
                    "Gemini request failed to send: {} (timeout={}, connect={}, status={:?}, url={:?}, retrying={})",
                    err_text,
                    err.is_timeout(),
                    err.is_connect(),
                    err.status(),
                    err_url,
                    should_retry
                );
                if should_retry {
                    tokio::time::sleep(gemini_retry_delay(attempt)).await;
                    continue;
                }
                return Err(anyhow!("Gemini request failed: {}", err_text));
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let (message, body_summary) = summarize_error_body(&body);
            let should_retry =
                gemini_should_retry_status(status) && attempt < GEMINI_MAX_RETRY_ATTEMPTS;
            warn!(
                "Gemini API error: status={}, body={}, retrying={}",
                status, body_summary, should_retry
            );
            if should_retry {
                tokio::time::sleep(gemini_retry_delay(attempt)).await;
                continue;
            }
            let detail = message.unwrap_or(body_summary);
            return Err(anyhow!(
                "Gemini request failed with status {}: {}",
                status,
                detail
            ));
        }

        let value = response.json::<GeminiResponse>().await?;
        if tracing::enabled!(tracing::Level::DEBUG) {
            let response_summary = summarize_response(&value);
            debug!(target: "llm.gemini", model = model, response = %response_summary);
        }
        return Ok(value);
    }
}

/// One generation call: ordered reference images followed by the composed
/// instruction text. The response must carry an image part; a text-only
/// response is a failure, never an empty success.
pub async fn generate_image(
    instruction_text: &str,
    images: &[MediaFile],
    image_config: Option<GeminiImageConfig>,
    api_key: &str,
) -> Result<Vec<u8>, ImageGenerationError> {
    let system_instruction = if images.is_empty() {
        "Generate an image based on the prompt. CRITICAL: response be an image, NOT TEXT."
    } else {
        "Edit the images based on the prompt. CRITICAL: response be an image, NOT TEXT."
    };

    let parts = build_request_parts(images, instruction_text);
    let mut generation_config = json!({
        "responseModalities": ["TEXT", "IMAGE"]
    });
    if let Some(image_config) = build_image_config(image_config.as_ref()) {
        if let Some(config_object) = generation_config.as_object_mut() {
            config_object.insert("imageConfig".to_string(), image_config);
        }
    }

    let payload = json!({
        "systemInstruction": { "parts": [{ "text": system_instruction }] },
        "contents": [{ "role": "user", "parts": parts }],
        "generationConfig": generation_config,
        "safetySettings": build_safety_settings(),
    });

    let model = &CONFIG.gemini_image_model;
    let api_key = api_key.to_string();
    let response = log_generation_timing(
        "gemini",
        model,
        "generate_image",
        Some(json!({ "imageParts": images.len() })),
        || async { call_gemini_api(model, &api_key, payload).await },
    )
    .await
    .map_err(|err| ImageGenerationError(err.to_string()))?;

    extract_first_image(response)
        .ok_or_else(|| ImageGenerationError(format!("no image data found (model: {})", model)))
}
