use std::fs;
use std::path::{Path, PathBuf};

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

fn default_true() -> bool {
    true
}

/// On-disk shape of the credential file. Fixed key names; no expiry is
/// tracked, only the validity flag downgraded when the generation service
/// rejects the key.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialFile {
    #[serde(default)]
    gemini_api_key: String,
    #[serde(default)]
    removal_api_key: String,
    #[serde(default)]
    upload_api_key: String,
    #[serde(default = "default_true")]
    gemini_key_valid: bool,
}

impl Default for CredentialFile {
    fn default() -> Self {
        CredentialFile {
            gemini_api_key: String::new(),
            removal_api_key: String::new(),
            upload_api_key: String::new(),
            gemini_key_valid: true,
        }
    }
}

pub struct CredentialStore {
    path: PathBuf,
    inner: Mutex<CredentialFile>,
}

impl CredentialStore {
    pub fn load(path: &Path) -> Self {
        let contents = load_credential_file(path);
        CredentialStore {
            path: path.to_path_buf(),
            inner: Mutex::new(contents),
        }
    }

    pub fn generation_key(&self) -> Option<String> {
        let inner = self.inner.lock();
        let key = inner.gemini_api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn generation_key_valid(&self) -> bool {
        self.inner.lock().gemini_key_valid
    }

    /// Storing a fresh key also restores the validity flag.
    pub fn set_generation_key(&self, key: &str) {
        {
            let mut inner = self.inner.lock();
            inner.gemini_api_key = key.trim().to_string();
            inner.gemini_key_valid = true;
        }
        self.save();
    }

    pub fn mark_generation_key_invalid(&self) {
        {
            let mut inner = self.inner.lock();
            if !inner.gemini_key_valid {
                return;
            }
            inner.gemini_key_valid = false;
        }
        warn!("Generation API key marked invalid/expired");
        self.save();
    }

    pub fn removal_key(&self) -> Option<String> {
        let inner = self.inner.lock();
        let key = inner.removal_api_key.trim();
        if key.is_empty() {
            None
        } else {
            Some(key.to_string())
        }
    }

    pub fn set_removal_key(&self, key: &str) {
        self.inner.lock().removal_api_key = key.trim().to_string();
        self.save();
    }

    pub fn upload_key(&self) -> String {
        self.inner.lock().upload_api_key.clone()
    }

    pub fn set_upload_key(&self, key: &str) {
        self.inner.lock().upload_api_key = key.trim().to_string();
        self.save();
    }

    fn save(&self) {
        let snapshot = self.inner.lock().clone();
        let serialized = match serde_json::to_string_pretty(&snapshot) {
            Ok(value) => value,
            Err(err) => {
                warn!("Failed to serialize credentials: {err}");
                return;
            }
        };
        if let Err(err) = fs::write(&self.path, serialized) {
            warn!(
                "Failed to write credentials to {}: {err}",
                self.path.display()
            );
        }
    }
}

fn load_credential_file(path: &Path) -> CredentialFile {
    if !path.exists() {
        info!("Credential file not found at {}", path.display());
        return CredentialFile::default();
    }

    let raw = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read credential file at {}: {err}",
                path.display()
            );
            return CredentialFile::default();
        }
    };

    match serde_json::from_str(&raw) {
        Ok(data) => data,
        Err(err) => {
            warn!(
                "Failed to parse credential file at {}: {err}",
                path.display()
            );
            CredentialFile::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn temp_path() -> PathBuf {
        std::env::temp_dir().join(format!("adforge-credentials-{}.json", Uuid::new_v4()))
    }

    #[test]
    fn round_trips_keys_through_disk() {
        let path = temp_path();
        {
            let store = CredentialStore::load(&path);
            assert!(store.generation_key().is_none());
            store.set_generation_key("  gem-key  ");
            store.set_removal_key("rem-key");
        }

        let reloaded = CredentialStore::load(&path);
        assert_eq!(reloaded.generation_key().as_deref(), Some("gem-key"));
        assert_eq!(reloaded.removal_key().as_deref(), Some("rem-key"));
        assert!(reloaded.generation_key_valid());

        let _ = fs::remove_file(&path);
    }

    #[test]
    fn invalid_flag_survives_reload_until_key_replaced() {
        let path = temp_path();
        {
            let store = CredentialStore::load(&path);
            store.set_generation_key("stale");
            store.mark_generation_key_invalid();
        }

        let reloaded = CredentialStore::load(&path);
        assert!(!reloaded.generation_key_valid());

        reloaded.set_generation_key("fresh");
        assert!(reloaded.generation_key_valid());

        let _ = fs::remove_file(&path);
    }
}
