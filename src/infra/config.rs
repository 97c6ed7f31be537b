//! Usage: Environment-driven configuration (credentials, endpoints, timeouts).

use crate::shared::error::{codes, AppError, AppResult};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_AUTH_URL: &str = "https://dida365.com/oauth/authorize";
pub const DEFAULT_TOKEN_URL: &str = "https://dida365.com/oauth/token";
pub const DEFAULT_BASE_URL: &str = "https://api.dida365.com/open/v1";
pub const DEFAULT_CALLBACK_PORT: u16 = 8000;
pub const CALLBACK_PATH: &str = "/callback";
pub const OAUTH_SCOPES: &str = "tasks:read tasks:write";

pub const HTTP_TIMEOUT: Duration = Duration::from_secs(30);
pub const FLOW_TIMEOUT: Duration = Duration::from_secs(30);
pub const CALLBACK_GRACE: Duration = Duration::from_secs(10);

const ENV_CLIENT_ID: &str = "TICKTICK_CLIENT_ID";
const ENV_CLIENT_SECRET: &str = "TICKTICK_CLIENT_SECRET";
const ENV_AUTH_URL: &str = "TICKTICK_AUTH_URL";
const ENV_TOKEN_URL: &str = "TICKTICK_TOKEN_URL";
const ENV_BASE_URL: &str = "TICKTICK_BASE_URL";
const ENV_AUTH_FILE: &str = "TICKTICK_AUTH_FILE";

#[derive(Debug, Clone)]
pub struct Config {
    pub client_id: String,
    pub client_secret: String,
    pub auth_url: String,
    pub token_url: String,
    pub base_url: String,
    pub callback_port: u16,
    /// Override for the persisted auth record path; `None` uses the per-user default.
    pub auth_file: Option<PathBuf>,
}

impl Config {
    /// Loads from the process environment, with `.env` applied first when present.
    pub fn from_env() -> Self {
        // Missing .env is the normal case for installed binaries.
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded environment from .env");
        }

        Self {
            client_id: env_trimmed(ENV_CLIENT_ID),
            client_secret: env_trimmed(ENV_CLIENT_SECRET),
            auth_url: env_or(ENV_AUTH_URL, DEFAULT_AUTH_URL),
            token_url: env_or(ENV_TOKEN_URL, DEFAULT_TOKEN_URL),
            base_url: env_or(ENV_BASE_URL, DEFAULT_BASE_URL),
            callback_port: DEFAULT_CALLBACK_PORT,
            auth_file: std::env::var(ENV_AUTH_FILE)
                .ok()
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    pub fn redirect_uri(&self) -> String {
        format!(
            "http://localhost:{}{}",
            self.callback_port, CALLBACK_PATH
        )
    }

    /// Both halves of the client credential must be present before any grant is attempted.
    pub fn require_credentials(&self) -> AppResult<()> {
        if self.client_id.trim().is_empty() {
            return Err(AppError::new(
                codes::INVALID_CREDENTIALS,
                "TICKTICK_CLIENT_ID is not set",
            ));
        }
        if self.client_secret.trim().is_empty() {
            return Err(AppError::new(
                codes::INVALID_CREDENTIALS,
                "TICKTICK_CLIENT_SECRET is not set",
            ));
        }
        Ok(())
    }
}

fn env_trimmed(key: &str) -> String {
    std::env::var(key)
        .map(|v| v.trim().to_string())
        .unwrap_or_default()
}

fn env_or(key: &str, default: &str) -> String {
    let value = env_trimmed(key);
    if value.is_empty() {
        default.to_string()
    } else {
        value
    }
}
