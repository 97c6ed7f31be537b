//! Usage: Authorization code flow controller (browser login end to end).
//!
//! One `Authenticator` handle per process, built from `Config` + `AuthStore`.
//! `start_flow` owns a single live authorization attempt: bind listener, open
//! browser, wait for the callback under the flow deadline, exchange the code,
//! persist the grant.

use crate::auth::callback_server::{self, CallbackPayload};
use crate::auth::token_exchange::{self, TokenExchangeRequest, TokenResponse};
use crate::infra::auth_store::{AuthStore, PersistedAuthRecord};
use crate::infra::config::{Config, CALLBACK_GRACE, FLOW_TIMEOUT, HTTP_TIMEOUT, OAUTH_SCOPES};
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_seconds;
use base64::Engine;
use rand::RngCore;
use std::process::Command;
use std::time::Duration;
use tokio::task;

/// The tokens a completed flow hands back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<i64>,
}

impl From<TokenResponse> for TokenPair {
    fn from(response: TokenResponse) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token,
            expires_at: response.expires_at,
        }
    }
}

/// Book-keeping for one in-flight authorization attempt.
#[derive(Debug, Clone)]
struct AuthorizationAttempt {
    state_nonce: String,
    redirect_uri: String,
    created_at: i64,
    expires_at: i64,
}

impl AuthorizationAttempt {
    fn begin(redirect_uri: String, ttl: Duration) -> Self {
        let created_at = now_unix_seconds();
        Self {
            state_nonce: generate_state_nonce(),
            redirect_uri,
            created_at,
            expires_at: created_at.saturating_add(ttl.as_secs() as i64),
        }
    }
}

pub struct Authenticator {
    config: Config,
    store: AuthStore,
    http: reqwest::Client,
}

impl Authenticator {
    pub fn new(config: Config, store: AuthStore) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("ticktick-mcp/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::new(codes::AUTH_FAILED, format!("http client init failed: {e}"))
            })?;
        Ok(Self {
            config,
            store,
            http,
        })
    }

    pub fn store(&self) -> &AuthStore {
        &self.store
    }

    /// Authorize URL for the given state nonce, for browser redirect or manual
    /// navigation.
    pub fn authorization_url(&self, state: &str) -> AppResult<String> {
        build_authorize_url(&self.config, &self.config.redirect_uri(), state)
    }

    /// Runs the flow end to end and persists the resulting grant. Exactly one
    /// attempt is live at a time; the deadline covers the browser round trip
    /// and callback, not the code exchange.
    pub async fn start_flow(&self) -> AppResult<TokenPair> {
        self.config.require_credentials()?;

        let attempt =
            AuthorizationAttempt::begin(self.config.redirect_uri(), FLOW_TIMEOUT);
        tracing::debug!(
            created_at = attempt.created_at,
            expires_at = attempt.expires_at,
            redirect_uri = %attempt.redirect_uri,
            "authorization attempt started"
        );

        let listener = callback_server::bind_callback_listener(self.config.callback_port).await?;
        let auth_url = self.authorization_url(&attempt.state_nonce)?;

        let callback_state = attempt.state_nonce.clone();
        let callback_task = task::spawn(async move {
            callback_server::wait_for_callback(listener, &callback_state, CALLBACK_GRACE).await
        });
        // Yield once so the wait task is polled before the browser redirect can land.
        task::yield_now().await;

        if let Err(err) = open_browser(&auth_url) {
            // Manual navigation still works; the flow keeps waiting.
            tracing::warn!(url = %auth_url, "browser open failed, navigate manually: {err}");
        }

        let payload = await_callback(callback_task, FLOW_TIMEOUT).await?;

        if payload.error.is_some() {
            return Err(provider_error(&payload));
        }
        let code = payload.code.as_deref().unwrap_or_default();

        let response = token_exchange::exchange_authorization_code(
            &self.http,
            &TokenExchangeRequest {
                token_url: self.config.token_url.clone(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
                code: code.to_string(),
                redirect_uri: attempt.redirect_uri.clone(),
            },
        )
        .await?;

        let saved = self
            .store
            .save(PersistedAuthRecord {
                access_token: response.access_token.clone(),
                refresh_token: response.refresh_token.clone().unwrap_or_default(),
                client_id: self.config.client_id.clone(),
                client_secret: self.config.client_secret.clone(),
            })
            .await?;

        tracing::info!(
            access_token = %mask_token(&saved.access_token),
            has_refresh_token = saved.has_refresh_token(),
            "authorization flow completed"
        );

        Ok(TokenPair::from(response))
    }
}

/// Waits for the callback task under the deadline. On timeout the task is
/// aborted and the handle awaited, so the listener is dropped and the port
/// released before the error surfaces; a new flow can rebind at once.
async fn await_callback(
    mut callback_task: task::JoinHandle<AppResult<CallbackPayload>>,
    deadline: Duration,
) -> AppResult<CallbackPayload> {
    match tokio::time::timeout(deadline, &mut callback_task).await {
        Err(_) => {
            callback_task.abort();
            let _ = callback_task.await;
            Err(AppError::new(
                codes::AUTH_FAILED,
                format!("authorization timed out after {}s", deadline.as_secs()),
            ))
        }
        Ok(Err(join_err)) => Err(AppError::new(
            codes::AUTH_FAILED,
            format!("callback task failed: {join_err}"),
        )),
        Ok(Ok(result)) => result,
    }
}

/// 32 random bytes, url-safe base64 without padding.
pub fn generate_state_nonce() -> String {
    let mut bytes = [0u8; 32];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes)
}

fn build_authorize_url(config: &Config, redirect_uri: &str, state: &str) -> AppResult<String> {
    let mut url = reqwest::Url::parse(&config.auth_url).map_err(|e| {
        AppError::new(codes::AUTH_FAILED, format!("invalid oauth auth url: {e}"))
    })?;
    {
        let mut query = url.query_pairs_mut();
        query.append_pair("response_type", "code");
        query.append_pair("client_id", &config.client_id);
        query.append_pair("redirect_uri", redirect_uri);
        query.append_pair("scope", OAUTH_SCOPES);
        query.append_pair("state", state);
    }
    Ok(url.to_string())
}

fn provider_error(payload: &CallbackPayload) -> AppError {
    let error = payload.error.as_deref().unwrap_or("unknown_error");
    let message = match payload.error_description.as_deref() {
        Some(description) if !description.trim().is_empty() => {
            format!("{error}: {description}")
        }
        _ => error.to_string(),
    };
    AppError::new(codes::AUTH_FAILED, message)
}

#[allow(unreachable_code)]
fn open_browser(url: &str) -> AppResult<()> {
    #[cfg(target_os = "windows")]
    {
        // URL protocol handler opens the default browser; `explorer <url>` may
        // open File Explorer for some URL shapes.
        Command::new("rundll32.exe")
            .arg("url.dll,FileProtocolHandler")
            .arg(url)
            .spawn()
            .map_err(|e| format!("failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(target_os = "macos")]
    {
        Command::new("open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("failed to open browser: {e}"))?;
        return Ok(());
    }

    #[cfg(all(unix, not(target_os = "macos")))]
    {
        Command::new("xdg-open")
            .arg(url)
            .spawn()
            .map_err(|e| format!("failed to open browser: {e}"))?;
        return Ok(());
    }

    Err("browser open is unsupported on this platform"
        .to_string()
        .into())
}
