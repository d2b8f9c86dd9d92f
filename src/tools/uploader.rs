use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{info, warn};

use crate::config::CONFIG;
use crate::utils::http::get_http_client;

#[derive(Debug, Deserialize)]
struct UploadResponse {
    success: bool,
    #[serde(rename = "imageUrl")]
    image_url: Option<String>,
}

/// Best-effort upload of a generated image to the hosted store. Every
/// failure path returns `None`; callers fall back to the in-memory result.
pub async fn upload_image_bytes(
    image_bytes: &[u8],
    api_key: &str,
    mime_type: &str,
    model: Option<&str>,
    prompt: Option<&str>,
) -> Option<String> {
    if api_key.trim().is_empty() {
        return None;
    }

    let file_ext = mime_type.split('/').nth(1).unwrap_or("png");
    let file_name = format!("upload.{}", if file_ext == "jpeg" { "jpg" } else { file_ext });

    let image_part = Part::bytes(image_bytes.to_vec())
        .file_name(file_name)
        .mime_str(mime_type)
        .ok()?;

    let form = Form::new()
        .part("image", image_part)
        .text("api_key", api_key.to_string())
        .text("ai_generated", "true")
        .text("model", model.unwrap_or("").to_string())
        .text("prompt", prompt.unwrap_or("").to_string());

    let client = get_http_client();
    let response = client
        .post(&CONFIG.upload_endpoint)
        .multipart(form)
        .send()
        .await
        .ok()?;

    if !response.status().is_success() {
        warn!("Image upload failed with status {}", response.status());
        return None;
    }

    let parsed = response.json::<UploadResponse>().await.ok()?;
    if parsed.success {
        if let Some(url) = parsed.image_url {
            info!("Uploaded generated image to {}", url);
            return Some(url);
        }
    }

    None
}
