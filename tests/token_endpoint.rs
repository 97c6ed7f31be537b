use base64::Engine;
use httpmock::prelude::*;
use serde_json::json;
use ticktick_mcp::auth::token_exchange::{
    exchange_authorization_code, refresh_access_token, TokenExchangeRequest, TokenRefreshRequest,
};
use ticktick_mcp::codes;
use ticktick_mcp::shared::time::now_unix_seconds;

fn basic_auth_header(client_id: &str, client_secret: &str) -> String {
    let encoded = base64::engine::general_purpose::STANDARD
        .encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}

#[tokio::test]
async fn exchange_sends_credentials_as_basic_auth_not_form_fields() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .header("authorization", basic_auth_header("client-1", "secret-1"))
                .x_www_form_urlencoded_tuple("grant_type", "authorization_code")
                .x_www_form_urlencoded_tuple("code", "code-abc")
                .x_www_form_urlencoded_tuple(
                    "redirect_uri",
                    "http://localhost:8000/callback",
                );
            then.status(200).json_body(json!({
                "access_token": "access-xyz",
                "refresh_token": "refresh-xyz",
                "token_type": "bearer",
                "expires_in": 3600
            }));
        })
        .await;

    let client = reqwest::Client::new();
    let response = exchange_authorization_code(
        &client,
        &TokenExchangeRequest {
            token_url: server.url("/oauth/token"),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            code: "code-abc".to_string(),
            redirect_uri: "http://localhost:8000/callback".to_string(),
        },
    )
    .await
    .expect("exchange");

    mock.assert_async().await;
    assert_eq!(response.access_token, "access-xyz");
    assert_eq!(response.refresh_token.as_deref(), Some("refresh-xyz"));
    assert_eq!(response.token_type.as_deref(), Some("bearer"));
    let expires_at = response.expires_at.expect("expires_at");
    assert!(expires_at >= now_unix_seconds() + 3590);
}

#[tokio::test]
async fn exchange_error_status_surfaces_provider_details() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(400).json_body(json!({
                "error": "invalid_grant",
                "error_description": "authorization code expired"
            }));
        })
        .await;

    let client = reqwest::Client::new();
    let err = exchange_authorization_code(
        &client,
        &TokenExchangeRequest {
            token_url: server.url("/oauth/token"),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            code: "stale-code".to_string(),
            redirect_uri: "http://localhost:8000/callback".to_string(),
        },
    )
    .await
    .expect_err("exchange should fail");

    assert!(err.is_code(codes::TOKEN_EXCHANGE_FAILED));
    assert!(err.message().contains("status=400"));
    assert!(err.message().contains("invalid_grant"));
}

#[tokio::test]
async fn refresh_grant_carries_refresh_token_in_form() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/oauth/token")
                .header("authorization", basic_auth_header("client-1", "secret-1"))
                .x_www_form_urlencoded_tuple("grant_type", "refresh_token")
                .x_www_form_urlencoded_tuple("refresh_token", "refresh-1");
            then.status(200).json_body(json!({
                "access_token": "access-2"
            }));
        })
        .await;

    let client = reqwest::Client::new();
    let response = refresh_access_token(
        &client,
        &TokenRefreshRequest {
            token_url: server.url("/oauth/token"),
            client_id: "client-1".to_string(),
            client_secret: "secret-1".to_string(),
            refresh_token: "refresh-1".to_string(),
        },
    )
    .await
    .expect("refresh");

    mock.assert_async().await;
    assert_eq!(response.access_token, "access-2");
    // A grant may legitimately omit the refresh token.
    assert!(response.refresh_token.is_none());
}

#[tokio::test]
async fn refresh_failure_uses_refresh_error_code() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/oauth/token");
            then.status(401).json_body(json!({ "error": "invalid_client" }));
        })
        .await;

    let client = reqwest::Client::new();
    let err = refresh_access_token(
        &client,
        &TokenRefreshRequest {
            token_url: server.url("/oauth/token"),
            client_id: "client-1".to_string(),
            client_secret: "wrong".to_string(),
            refresh_token: "refresh-1".to_string(),
        },
    )
    .await
    .expect_err("refresh should fail");

    assert!(err.is_code(codes::TOKEN_REFRESH_FAILED));
}
