use std::env;
use std::path::PathBuf;

use anyhow::Result;
use once_cell::sync::Lazy;
use tracing::warn;

#[allow(dead_code)]
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    pub database_url: String,
    pub gemini_image_model: String,
    pub gemini_api_base: String,
    pub gemini_safety_settings: String,
    pub upload_endpoint: String,
    pub removal_endpoint: String,
    pub removal_poll_interval_ms: u64,
    pub removal_poll_max_attempts: usize,
    pub max_concurrent_batches: usize,
    pub max_batch_size: usize,
    pub default_section: String,
    pub user_id: String,
    pub credentials_path: PathBuf,
}

pub static CONFIG: Lazy<Config> =
    Lazy::new(|| Config::load().expect("Failed to load configuration"));

fn env_string(name: &str, default: &str) -> String {
    env::var(name).unwrap_or_else(|_| default.to_string())
}

fn env_u64(name: &str, default: u64) -> u64 {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<u64>().ok())
        .unwrap_or(default)
}

fn env_usize(name: &str, default: usize) -> usize {
    env::var(name)
        .ok()
        .and_then(|value| value.parse::<usize>().ok())
        .unwrap_or(default)
}

fn normalize_database_url(value: String) -> String {
    if value.starts_with("sqlite+aiosqlite://") {
        return value.replacen("sqlite+aiosqlite://", "sqlite://", 1);
    }
    value
}

fn normalize_gemini_safety_settings(value: String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return "permissive".to_string();
    }

    let lowered = trimmed.to_lowercase();
    match lowered.as_str() {
        "permissive" | "off" | "none" => "permissive".to_string(),
        "standard" => "standard".to_string(),
        _ => {
            warn!(
                "Unknown GEMINI_SAFETY_SETTINGS value '{}'; defaulting to permissive.",
                value
            );
            "permissive".to_string()
        }
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let database_url = normalize_database_url(env_string(
            "DATABASE_URL",
            "sqlite://adforge.db?mode=rwc",
        ));

        Ok(Config {
            log_level: env_string("LOG_LEVEL", "info"),
            database_url,
            gemini_image_model: env_string(
                "GEMINI_IMAGE_MODEL",
                "gemini-2.5-flash-image-preview",
            ),
            gemini_api_base: env_string(
                "GEMINI_API_BASE",
                "https://generativelanguage.googleapis.com/v1beta",
            ),
            gemini_safety_settings: normalize_gemini_safety_settings(env_string(
                "GEMINI_SAFETY_SETTINGS",
                "permissive",
            )),
            upload_endpoint: env_string("UPLOAD_ENDPOINT", "https://cwd.pw/api/upload-image"),
            removal_endpoint: env_string(
                "REMOVAL_ENDPOINT",
                "https://api.replicate.com/v1/predictions",
            ),
            removal_poll_interval_ms: env_u64("REMOVAL_POLL_INTERVAL_MS", 1000),
            removal_poll_max_attempts: env_usize("REMOVAL_POLL_MAX_ATTEMPTS", 120),
            max_concurrent_batches: env_usize("MAX_CONCURRENT_BATCHES", 2),
            max_batch_size: env_usize("MAX_BATCH_SIZE", 4),
            default_section: env_string("DEFAULT_SECTION", "landing"),
            user_id: env_string("STUDIO_USER_ID", "local"),
            credentials_path: PathBuf::from(env_string(
                "CREDENTIALS_PATH",
                "adforge_credentials.json",
            )),
        })
    }
}
