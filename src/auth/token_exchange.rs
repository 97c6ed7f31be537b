//! Usage: OAuth token endpoint helpers (authorization_code + refresh_token grants).
//!
//! Client credentials travel as HTTP Basic auth; the form body carries only the
//! grant parameters. Both grants share one canonical `TokenResponse`.

use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::mask_token;
use crate::shared::time::now_unix_seconds;
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct TokenExchangeRequest {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub code: String,
    pub redirect_uri: String,
}

#[derive(Debug, Clone)]
pub struct TokenRefreshRequest {
    pub token_url: String,
    pub client_id: String,
    pub client_secret: String,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<i64>,
    pub expires_at: Option<i64>,
}

pub async fn exchange_authorization_code(
    client: &reqwest::Client,
    req: &TokenExchangeRequest,
) -> AppResult<TokenResponse> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "authorization_code".to_string());
    form.insert("code", req.code.trim().to_string());
    form.insert("redirect_uri", req.redirect_uri.trim().to_string());

    let response = client
        .post(req.token_url.trim())
        .basic_auth(req.client_id.trim(), Some(req.client_secret.trim()))
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AppError::new(
                codes::TOKEN_EXCHANGE_FAILED,
                format!("token exchange request failed: {e}"),
            )
        })?;

    parse_token_response(response, codes::TOKEN_EXCHANGE_FAILED).await
}

pub async fn refresh_access_token(
    client: &reqwest::Client,
    req: &TokenRefreshRequest,
) -> AppResult<TokenResponse> {
    let mut form: HashMap<&str, String> = HashMap::new();
    form.insert("grant_type", "refresh_token".to_string());
    form.insert("refresh_token", req.refresh_token.trim().to_string());

    let response = client
        .post(req.token_url.trim())
        .basic_auth(req.client_id.trim(), Some(req.client_secret.trim()))
        .form(&form)
        .send()
        .await
        .map_err(|e| {
            AppError::new(
                codes::TOKEN_REFRESH_FAILED,
                format!("token refresh request failed: {e}"),
            )
        })?;

    parse_token_response(response, codes::TOKEN_REFRESH_FAILED).await
}

async fn parse_token_response(
    response: reqwest::Response,
    error_code: &'static str,
) -> AppResult<TokenResponse> {
    let status = response.status();
    let body = response.text().await.map_err(|e| {
        AppError::new(error_code, format!("token response read failed: {e}"))
    })?;

    if !status.is_success() {
        let (provider_code, provider_message) = parse_oauth_error_details(&body);
        let snippet = sanitize_error_body_snippet(&body);
        let mut msg = format!("token endpoint returned status={}", status.as_u16());
        if let Some(code) = provider_code {
            msg.push_str(" code=");
            msg.push_str(code.as_str());
        }
        if let Some(detail) = provider_message {
            msg.push_str(" message=");
            msg.push_str(detail.chars().take(240).collect::<String>().as_str());
        }
        msg.push_str(" body=");
        msg.push_str(snippet.as_str());
        return Err(AppError::new(error_code, msg));
    }

    let value: Value = serde_json::from_str(&body).map_err(|e| {
        AppError::new(error_code, format!("token response json invalid: {e}"))
    })?;

    let access_token = value
        .get("access_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::new(error_code, "token response missing access_token"))?
        .to_string();

    let refresh_token = value
        .get("refresh_token")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let token_type = value
        .get("token_type")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    let expires_in = value.get("expires_in").and_then(parse_i64_lossy);
    let expires_at = expires_in.and_then(|v| {
        if v <= 0 {
            None
        } else {
            Some(now_unix_seconds().saturating_add(v))
        }
    });

    Ok(TokenResponse {
        access_token,
        refresh_token,
        token_type,
        expires_in,
        expires_at,
    })
}

fn parse_i64_lossy(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lc = key.trim().to_ascii_lowercase();
    key_lc.contains("token")
        || key_lc.contains("secret")
        || key_lc == "authorization"
        || key_lc == "proxy-authorization"
}

fn redact_sensitive_json_fields(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, nested) in map {
                if is_sensitive_key(key) {
                    if let Some(raw) = nested.as_str() {
                        *nested = Value::String(mask_token(raw));
                        continue;
                    }
                }
                redact_sensitive_json_fields(nested);
            }
        }
        Value::Array(items) => {
            for nested in items {
                redact_sensitive_json_fields(nested);
            }
        }
        _ => {}
    }
}

fn sanitize_error_body_snippet(body: &str) -> String {
    if let Ok(mut value) = serde_json::from_str::<Value>(body) {
        redact_sensitive_json_fields(&mut value);
        if let Ok(encoded) = serde_json::to_string(&value) {
            return encoded.chars().take(500).collect();
        }
    }
    body.chars().take(500).collect()
}

fn parse_oauth_error_details(body: &str) -> (Option<String>, Option<String>) {
    let value: Value = match serde_json::from_str(body) {
        Ok(v) => v,
        Err(_) => return (None, None),
    };

    let code = value
        .get("error")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);
    let message = value
        .get("error_description")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    (code, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_i64_lossy_supports_number_and_string() {
        assert_eq!(parse_i64_lossy(&Value::from(1200)), Some(1200));
        assert_eq!(parse_i64_lossy(&Value::from("3600")), Some(3600));
        assert_eq!(parse_i64_lossy(&Value::from("x")), None);
    }

    #[test]
    fn parse_oauth_error_details_reads_standard_fields() {
        let payload = r#"{
          "error": "invalid_grant",
          "error_description": "token is invalid"
        }"#;

        let (code, message) = parse_oauth_error_details(payload);
        assert_eq!(code.as_deref(), Some("invalid_grant"));
        assert_eq!(message.as_deref(), Some("token is invalid"));
    }

    #[test]
    fn parse_oauth_error_details_tolerates_non_json_body() {
        let (code, message) = parse_oauth_error_details("<html>nope</html>");
        assert!(code.is_none());
        assert!(message.is_none());
    }

    #[test]
    fn sanitize_error_body_snippet_masks_token_fields() {
        let raw = r#"{
          "error": "invalid_grant",
          "refresh_token": "abcd1234xyz9876",
          "nested": {"access_token": "tokenvalue123456"}
        }"#;
        let snippet = sanitize_error_body_snippet(raw);
        assert!(snippet.contains(mask_token("abcd1234xyz9876").as_str()));
        assert!(snippet.contains(mask_token("tokenvalue123456").as_str()));
        assert!(!snippet.contains("abcd1234xyz9876"));
        assert!(!snippet.contains("tokenvalue123456"));
    }

    #[test]
    fn sanitize_error_body_snippet_truncates_plain_text() {
        let raw = "x".repeat(2000);
        assert_eq!(sanitize_error_body_snippet(&raw).len(), 500);
    }
}
