//! Usage: Authenticated TickTick Open API client (bearer injection + one-shot 401 refresh).

use crate::auth::token_exchange::{self, TokenRefreshRequest};
use crate::infra::auth_store::{AuthStore, PersistedAuthRecord};
use crate::infra::config::{Config, HTTP_TIMEOUT};
use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::mask_token;
use bytes::Bytes;
use reqwest::{Method, StatusCode};
use std::time::Duration;

pub struct ApiClient {
    config: Config,
    store: AuthStore,
    http: reqwest::Client,
}

impl ApiClient {
    pub fn new(config: Config, store: AuthStore) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .user_agent(format!("ticktick-mcp/{}", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .timeout(HTTP_TIMEOUT)
            .build()
            .map_err(|e| {
                AppError::new(
                    codes::API_REQUEST_FAILED,
                    format!("http client init failed: {e}"),
                )
            })?;
        Ok(Self {
            config,
            store,
            http,
        })
    }

    /// Sends one API request with the persisted access token. A 401 answer
    /// triggers exactly one refresh + retry; a second 401 surfaces
    /// `TOKEN_REFRESH_FAILED` without further attempts.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
    ) -> AppResult<Bytes> {
        let record = self.store.load().await?;
        if !record.has_access_token() {
            return Err(AppError::new(
                codes::INVALID_CREDENTIALS,
                "no access token available; run the authorization flow first",
            ));
        }

        let url = join_url(&self.config.base_url, path);
        let response = self
            .send_once(method.clone(), &url, body.as_ref(), &record.access_token)
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED {
            return read_api_response(response).await;
        }

        tracing::debug!(
            %method,
            path,
            access_token = %mask_token(&record.access_token),
            "access token rejected, refreshing"
        );
        let access_token = self.refresh_and_persist(&record).await?;

        let retry = self
            .send_once(method, &url, body.as_ref(), &access_token)
            .await?;
        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(AppError::new(
                codes::TOKEN_REFRESH_FAILED,
                "request unauthorized after token refresh",
            ));
        }
        read_api_response(retry).await
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        body: Option<&serde_json::Value>,
        access_token: &str,
    ) -> AppResult<reqwest::Response> {
        let mut request = self
            .http
            .request(method, url)
            .bearer_auth(access_token)
            .header(reqwest::header::CONTENT_TYPE, "application/json");
        if let Some(body) = body {
            let payload = serde_json::to_vec(body).map_err(|e| {
                AppError::new(
                    codes::API_REQUEST_FAILED,
                    format!("request body serialization failed: {e}"),
                )
            })?;
            request = request.body(payload);
        }
        request.send().await.map_err(|e| {
            AppError::new(codes::API_REQUEST_FAILED, format!("request failed: {e}"))
        })
    }

    /// Runs the refresh grant with the stored refresh token and persists the
    /// rotated tokens before the retry.
    async fn refresh_and_persist(&self, record: &PersistedAuthRecord) -> AppResult<String> {
        if !record.has_refresh_token() {
            return Err(AppError::new(
                codes::TOKEN_REFRESH_FAILED,
                "no refresh token available",
            ));
        }

        let (client_id, client_secret) = self.client_credentials(record)?;
        let response = token_exchange::refresh_access_token(
            &self.http,
            &TokenRefreshRequest {
                token_url: self.config.token_url.clone(),
                client_id,
                client_secret,
                refresh_token: record.refresh_token.clone(),
            },
        )
        .await?;

        let saved = self
            .store
            .update_tokens(&response.access_token, response.refresh_token.as_deref())
            .await?;
        tracing::info!(
            access_token = %mask_token(&saved.access_token),
            rotated_refresh_token = response.refresh_token.is_some(),
            "access token refreshed"
        );
        Ok(response.access_token)
    }

    /// Environment credentials win; a persisted record from an earlier flow is
    /// the fallback.
    fn client_credentials(&self, record: &PersistedAuthRecord) -> AppResult<(String, String)> {
        if !self.config.client_id.trim().is_empty()
            && !self.config.client_secret.trim().is_empty()
        {
            return Ok((
                self.config.client_id.clone(),
                self.config.client_secret.clone(),
            ));
        }
        if !record.client_id.trim().is_empty() && !record.client_secret.trim().is_empty() {
            return Ok((record.client_id.clone(), record.client_secret.clone()));
        }
        Err(AppError::new(
            codes::INVALID_CREDENTIALS,
            "client credentials are not configured",
        ))
    }
}

async fn read_api_response(response: reqwest::Response) -> AppResult<Bytes> {
    let status = response.status();
    if status.is_success() {
        return response.bytes().await.map_err(|e| {
            AppError::new(
                codes::API_REQUEST_FAILED,
                format!("response read failed: {e}"),
            )
        });
    }

    let body = response.text().await.unwrap_or_default();
    Err(AppError::new(
        codes::API_RESPONSE_ERROR,
        format!(
            "api returned status={} body={}",
            status.as_u16(),
            body.chars().take(500).collect::<String>()
        ),
    ))
}

fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim();
    if path.is_empty() {
        return base.to_string();
    }
    if path.starts_with('/') {
        format!("{base}{path}")
    } else {
        format!("{base}/{path}")
    }
}
