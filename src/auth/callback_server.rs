//! Usage: One-shot localhost callback listener for the OAuth authorization code flow.
//!
//! The listener answers every browser request it sees, but only a request that
//! decides the flow (code, provider error, missing code, bad state) resolves the
//! wait. After the deciding request a short detached grace task keeps answering
//! stragglers with an "already completed" page, then the port is released.

use crate::shared::error::{codes, AppError, AppResult};
use crate::shared::security::constant_time_eq;
use reqwest::Url;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::infra::config::CALLBACK_PATH;

const SUCCESS_HTML: &str = "<html><body><h1>Authorization successful</h1><p>You may close this window and return to the application.</p></body></html>";
const ERROR_HTML: &str = "<html><body><h1>Authorization failed</h1><p>You may close this window and retry.</p></body></html>";
const ALREADY_DONE_HTML: &str = "<html><body><h1>Authorization already completed</h1><p>You may close this window.</p></body></html>";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackPayload {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

#[derive(Debug)]
pub struct BoundCallbackListener {
    port: u16,
    listener_v4: Option<TcpListener>,
    listener_v6: Option<TcpListener>,
}

impl BoundCallbackListener {
    pub fn port(&self) -> u16 {
        self.port
    }

    async fn accept(&mut self) -> std::io::Result<TcpStream> {
        let (socket, _) = match (self.listener_v4.as_mut(), self.listener_v6.as_mut()) {
            (Some(v4), Some(v6)) => {
                tokio::select! {
                    result = v4.accept() => result,
                    result = v6.accept() => result,
                }
            }
            (Some(v4), None) => v4.accept().await,
            (None, Some(v6)) => v6.accept().await,
            (None, None) => unreachable!("listeners checked at bind"),
        }?;
        Ok(socket)
    }
}

/// Binds both loopback stacks on the given port. The redirect URI is
/// registered with the provider, so a busy configured port is fatal rather
/// than falling back; port 0 asks the OS for a free one.
pub async fn bind_callback_listener(port: u16) -> AppResult<BoundCallbackListener> {
    if port == 0 {
        return bind_dynamic_port().await;
    }

    let mut bind_errors: Vec<String> = Vec::new();
    let listener_v4 = match TcpListener::bind(("127.0.0.1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("127.0.0.1:{port} ({err})"));
            None
        }
    };
    let listener_v6 = match TcpListener::bind(("::1", port)).await {
        Ok(listener) => Some(listener),
        Err(err) => {
            bind_errors.push(format!("::1:{port} ({err})"));
            None
        }
    };
    if listener_v4.is_none() && listener_v6.is_none() {
        return Err(AppError::new(
            codes::SERVER_START_FAILED,
            format!("oauth callback bind failed: {}", bind_errors.join("; ")),
        ));
    }

    Ok(BoundCallbackListener {
        port,
        listener_v4,
        listener_v6,
    })
}

async fn bind_dynamic_port() -> AppResult<BoundCallbackListener> {
    let listener_v4 = TcpListener::bind(("127.0.0.1", 0)).await.map_err(|e| {
        AppError::new(
            codes::SERVER_START_FAILED,
            format!("oauth callback bind failed: 127.0.0.1:0 ({e})"),
        )
    })?;
    let port = listener_v4
        .local_addr()
        .map_err(|e| {
            AppError::new(
                codes::SERVER_START_FAILED,
                format!("oauth callback local_addr failed: {e}"),
            )
        })?
        .port();
    let listener_v6 = TcpListener::bind(("::1", port)).await.ok();

    Ok(BoundCallbackListener {
        port,
        listener_v4: Some(listener_v4),
        listener_v6,
    })
}

/// Serves requests until one decides the flow, then answers it, hands the
/// listener to the grace task, and returns. The caller owns the deadline; on
/// timeout it aborts the surrounding task and awaits the handle, so the
/// listener is dropped and the port freed before the timeout surfaces.
pub async fn wait_for_callback(
    mut listener: BoundCallbackListener,
    expected_state: &str,
    grace: Duration,
) -> AppResult<CallbackPayload> {
    loop {
        let mut socket = match listener.accept().await {
            Ok(socket) => socket,
            Err(err) => {
                return Err(AppError::new(
                    codes::AUTH_FAILED,
                    format!("oauth callback accept failed: {err}"),
                ));
            }
        };

        let Some(request) = read_request(&mut socket).await else {
            continue;
        };

        match classify_request(&request) {
            ParsedRequest::Malformed => {
                write_response(&mut socket, "400 Bad Request", "text/plain", "malformed request")
                    .await;
            }
            ParsedRequest::WrongMethod => {
                write_response(&mut socket, "405 Method Not Allowed", "text/plain", "GET only")
                    .await;
            }
            ParsedRequest::WrongPath => {
                write_response(&mut socket, "404 Not Found", "text/plain", "not found").await;
            }
            ParsedRequest::Callback(payload) => {
                let result = resolve_payload(payload, expected_state);
                match &result {
                    Ok(payload) if payload.error.is_some() => {
                        write_response(
                            &mut socket,
                            "400 Bad Request",
                            "text/html; charset=utf-8",
                            ERROR_HTML,
                        )
                        .await;
                    }
                    Ok(_) => {
                        write_response(
                            &mut socket,
                            "200 OK",
                            "text/html; charset=utf-8",
                            SUCCESS_HTML,
                        )
                        .await;
                    }
                    Err(err) => {
                        let message = err.message().to_string();
                        write_response(&mut socket, "400 Bad Request", "text/plain", &message)
                            .await;
                    }
                }
                tokio::spawn(serve_grace(listener, grace));
                return result;
            }
        }
    }
}

enum ParsedRequest {
    Callback(CallbackPayload),
    WrongPath,
    WrongMethod,
    Malformed,
}

fn classify_request(request: &str) -> ParsedRequest {
    let Some(first) = request.lines().next() else {
        return ParsedRequest::Malformed;
    };
    let mut parts = first.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let target = parts.next().unwrap_or_default();
    if target.is_empty() {
        return ParsedRequest::Malformed;
    }

    let Ok(url) = Url::parse(&format!("http://127.0.0.1{target}")) else {
        return ParsedRequest::Malformed;
    };
    if url.path() != CALLBACK_PATH {
        return ParsedRequest::WrongPath;
    }
    if method != "GET" {
        return ParsedRequest::WrongMethod;
    }

    let mut code: Option<String> = None;
    let mut state: Option<String> = None;
    let mut error: Option<String> = None;
    let mut error_description: Option<String> = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            // An empty error value is not a provider error.
            "error" if !value.trim().is_empty() => error = Some(value.trim().to_string()),
            "error_description" => error_description = Some(value.to_string()),
            _ => {}
        }
    }

    ParsedRequest::Callback(CallbackPayload {
        code,
        state,
        error,
        error_description,
    })
}

/// Every callback request decides the flow, even an invalid one. Provider
/// errors pass through for the controller to surface; state is only checked
/// when a code is being delivered.
fn resolve_payload(payload: CallbackPayload, expected_state: &str) -> AppResult<CallbackPayload> {
    if payload.error.is_some() {
        return Ok(payload);
    }
    let Some(code) = payload.code.as_deref() else {
        return Err(AppError::new(
            codes::AUTH_FAILED,
            "oauth callback missing authorization code",
        ));
    };
    if code.trim().is_empty() {
        return Err(AppError::new(
            codes::AUTH_FAILED,
            "oauth callback missing authorization code",
        ));
    }
    let state = payload.state.as_deref().unwrap_or_default();
    if !constant_time_eq(state, expected_state) {
        return Err(AppError::new(
            codes::AUTH_FAILED,
            "oauth callback state mismatch",
        ));
    }
    Ok(payload)
}

const MAX_REQUEST_BYTES: usize = 8192;
const REQUEST_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Reads until the header terminator so a request split across TCP segments
/// still classifies whole. Capped in size, and a stalled peer is dropped
/// rather than blocking the accept loop.
async fn read_request(socket: &mut TcpStream) -> Option<String> {
    let mut buffer: Vec<u8> = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];
    loop {
        let size = tokio::time::timeout(REQUEST_READ_TIMEOUT, socket.read(&mut chunk))
            .await
            .ok()?
            .ok()?;
        if size == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..size]);
        if buffer.windows(4).any(|window| window == b"\r\n\r\n") {
            break;
        }
        if buffer.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }
    if buffer.is_empty() {
        return None;
    }
    Some(String::from_utf8_lossy(&buffer).into_owned())
}

async fn write_response(socket: &mut TcpStream, status: &str, content_type: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {status}\r\nContent-Type: {content_type}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        body.len(),
        body
    );
    let _ = socket.write_all(response.as_bytes()).await;
    let _ = socket.shutdown().await;
}

/// Keeps answering late browser requests after the flow has been decided, then
/// drops the listener when the grace window closes.
async fn serve_grace(mut listener: BoundCallbackListener, grace: Duration) {
    let port = listener.port();
    let serve = async {
        loop {
            let Ok(mut socket) = listener.accept().await else {
                return;
            };
            if read_request(&mut socket).await.is_none() {
                continue;
            }
            write_response(
                &mut socket,
                "200 OK",
                "text/html; charset=utf-8",
                ALREADY_DONE_HTML,
            )
            .await;
        }
    };
    let _ = tokio::time::timeout(grace, serve).await;
    tracing::debug!(port, "callback grace window closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(request: &str) -> ParsedRequest {
        classify_request(request)
    }

    #[test]
    fn classify_extracts_code_and_state() {
        let parsed = classify("GET /callback?code=abc123&state=xyz HTTP/1.1\r\nHost: x\r\n\r\n");
        let ParsedRequest::Callback(payload) = parsed else {
            panic!("expected callback");
        };
        assert_eq!(payload.code.as_deref(), Some("abc123"));
        assert_eq!(payload.state.as_deref(), Some("xyz"));
        assert!(payload.error.is_none());
    }

    #[test]
    fn classify_extracts_provider_error() {
        let parsed = classify(
            "GET /callback?error=access_denied&error_description=nope HTTP/1.1\r\n\r\n",
        );
        let ParsedRequest::Callback(payload) = parsed else {
            panic!("expected callback");
        };
        assert_eq!(payload.error.as_deref(), Some("access_denied"));
        assert_eq!(payload.error_description.as_deref(), Some("nope"));
    }

    #[test]
    fn classify_drops_empty_error_values() {
        let parsed = classify("GET /callback?error=&state=xyz HTTP/1.1\r\n\r\n");
        let ParsedRequest::Callback(payload) = parsed else {
            panic!("expected callback");
        };
        assert!(payload.error.is_none());

        // Without code or error the request falls to the missing-code outcome.
        let err = resolve_payload(payload, "xyz").unwrap_err();
        assert!(err.message().contains("missing authorization code"));
    }

    #[test]
    fn classify_rejects_other_paths() {
        assert!(matches!(
            classify("GET /favicon.ico HTTP/1.1\r\n\r\n"),
            ParsedRequest::WrongPath
        ));
    }

    #[test]
    fn classify_rejects_non_get() {
        assert!(matches!(
            classify("POST /callback?code=x HTTP/1.1\r\n\r\n"),
            ParsedRequest::WrongMethod
        ));
    }

    #[test]
    fn resolve_accepts_matching_state() {
        let payload = CallbackPayload {
            code: Some("abc".to_string()),
            state: Some("expected".to_string()),
            error: None,
            error_description: None,
        };
        assert!(resolve_payload(payload, "expected").is_ok());
    }

    #[test]
    fn resolve_rejects_state_mismatch() {
        let payload = CallbackPayload {
            code: Some("abc".to_string()),
            state: Some("forged".to_string()),
            error: None,
            error_description: None,
        };
        let err = resolve_payload(payload, "expected").unwrap_err();
        assert!(err.is_code(codes::AUTH_FAILED));
        assert!(err.message().contains("state mismatch"));
    }

    #[test]
    fn resolve_rejects_missing_code() {
        let payload = CallbackPayload {
            code: None,
            state: Some("expected".to_string()),
            error: None,
            error_description: None,
        };
        let err = resolve_payload(payload, "expected").unwrap_err();
        assert!(err.message().contains("missing authorization code"));
    }

    #[test]
    fn resolve_passes_provider_error_through_without_state() {
        let payload = CallbackPayload {
            code: None,
            state: None,
            error: Some("access_denied".to_string()),
            error_description: None,
        };
        let resolved = resolve_payload(payload, "expected").unwrap();
        assert_eq!(resolved.error.as_deref(), Some("access_denied"));
    }
}
