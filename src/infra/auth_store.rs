//! Usage: Persisted OAuth credential record (schema + atomic read/write helpers).
//!
//! Single-writer per process: callers share one `AuthStore` handle and writes are
//! serialized through its internal lock. Cross-process locking is out of scope.

use crate::infra::config::Config;
use crate::shared::blocking;
use crate::shared::error::AppResult;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;

const AUTH_FILE_NAME: &str = "auth.json";
const APP_DIR_NAME: &str = "ticktick-mcp";

/// On-disk record. Key names mirror the environment variables so a seeded
/// environment and a persisted file describe credentials identically.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistedAuthRecord {
    #[serde(rename = "TICKTICK_ACCESS_TOKEN")]
    pub access_token: String,
    #[serde(rename = "TICKTICK_REFRESH_TOKEN")]
    pub refresh_token: String,
    #[serde(rename = "TICKTICK_CLIENT_ID")]
    pub client_id: String,
    #[serde(rename = "TICKTICK_CLIENT_SECRET")]
    pub client_secret: String,
}

impl PersistedAuthRecord {
    pub fn has_access_token(&self) -> bool {
        !self.access_token.trim().is_empty()
    }

    pub fn has_refresh_token(&self) -> bool {
        !self.refresh_token.trim().is_empty()
    }
}

/// A blank incoming field never clobbers a stored non-blank one; a refreshed
/// grant is allowed to omit fields it did not rotate.
fn merge_records(previous: &PersistedAuthRecord, incoming: &PersistedAuthRecord) -> PersistedAuthRecord {
    let pick = |new: &str, old: &str| -> String {
        if new.trim().is_empty() {
            old.to_string()
        } else {
            new.to_string()
        }
    };
    PersistedAuthRecord {
        access_token: pick(&incoming.access_token, &previous.access_token),
        refresh_token: pick(&incoming.refresh_token, &previous.refresh_token),
        client_id: pick(&incoming.client_id, &previous.client_id),
        client_secret: pick(&incoming.client_secret, &previous.client_secret),
    }
}

#[derive(Clone)]
pub struct AuthStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    path: PathBuf,
    lock: Mutex<()>,
}

impl AuthStore {
    pub fn new(config: &Config) -> Self {
        let path = config
            .auth_file
            .clone()
            .unwrap_or_else(default_auth_path);
        Self::at_path(path)
    }

    pub fn at_path(path: PathBuf) -> Self {
        Self {
            inner: Arc::new(StoreInner {
                path,
                lock: Mutex::new(()),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// Missing file is a zero record, not an error.
    pub async fn load(&self) -> AppResult<PersistedAuthRecord> {
        let _guard = self.inner.lock.lock().await;
        let path = self.inner.path.clone();
        blocking::run("auth_store.load", move || load_sync(&path)).await
    }

    pub async fn save(&self, record: PersistedAuthRecord) -> AppResult<PersistedAuthRecord> {
        let _guard = self.inner.lock.lock().await;
        let path = self.inner.path.clone();
        blocking::run("auth_store.save", move || {
            let previous = load_sync(&path)?;
            let merged = merge_records(&previous, &record);
            write_sync(&path, &merged)?;
            Ok::<_, String>(merged)
        })
        .await
    }

    /// Refresh-path convenience: replace the access token and, when the grant
    /// rotated it, the refresh token.
    pub async fn update_tokens(
        &self,
        access_token: &str,
        refresh_token: Option<&str>,
    ) -> AppResult<PersistedAuthRecord> {
        self.save(PersistedAuthRecord {
            access_token: access_token.to_string(),
            refresh_token: refresh_token.unwrap_or_default().to_string(),
            ..PersistedAuthRecord::default()
        })
        .await
    }
}

pub fn default_auth_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR_NAME)
        .join(AUTH_FILE_NAME)
}

fn load_sync(path: &Path) -> Result<PersistedAuthRecord, String> {
    if !path.exists() {
        return Ok(PersistedAuthRecord::default());
    }
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to read auth file: {e}"))?;
    serde_json::from_str(&content)
        .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to parse auth file: {e}"))
}

fn write_sync(path: &Path, record: &PersistedAuthRecord) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to create auth dir: {e}"))?;
    }

    let tmp_path = path.with_extension("json.tmp");
    let backup_path = path.with_extension("json.bak");

    let content = serde_json::to_vec_pretty(record)
        .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to serialize auth record: {e}"))?;

    std::fs::write(&tmp_path, content)
        .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to write temp auth file: {e}"))?;

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    if path.exists() {
        std::fs::rename(path, &backup_path)
            .map_err(|e| format!("CONFIG_LOAD_FAILED: failed to create auth backup: {e}"))?;
    }

    if let Err(e) = std::fs::rename(&tmp_path, path) {
        let _ = std::fs::rename(&backup_path, path);
        return Err(format!("CONFIG_LOAD_FAILED: failed to finalize auth file: {e}"));
    }

    if backup_path.exists() {
        let _ = std::fs::remove_file(&backup_path);
    }

    Ok(())
}
