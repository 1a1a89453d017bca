//! HTTP client for the language server's `GetUserStatus` endpoint.

use anyhow::Context;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::error::{DiscoveryError, Result};

/// Connect-RPC path of the user status call
pub const USER_STATUS_PATH: &str = "/exa.language_server_pb.LanguageServerService/GetUserStatus";
/// Header carrying the CSRF token
pub const CSRF_TOKEN_HEADER: &str = "X-Codeium-Csrf-Token";
/// Connect protocol version header
pub const PROTOCOL_VERSION_HEADER: &str = "Connect-Protocol-Version";

/// Request body: identifies the caller, carries no user data
#[derive(Debug, Serialize)]
struct UserStatusRequest {
    metadata: RequestMetadata,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RequestMetadata {
    ide_name: &'static str,
    extension_name: &'static str,
    locale: &'static str,
}

impl Default for UserStatusRequest {
    fn default() -> Self {
        Self {
            metadata: RequestMetadata {
                ide_name: "antigravity",
                extension_name: "antigravity",
                locale: "en",
            },
        }
    }
}

/// Client for one language server, reused across polls
#[derive(Debug, Clone)]
pub struct QuotaClient {
    http: reqwest::Client,
}

impl QuotaClient {
    /// Create a client whose requests give up after `timeout`
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .no_proxy()
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { http })
    }

    fn url(port: u16) -> String {
        format!("http://127.0.0.1:{}{}", port, USER_STATUS_PATH)
    }

    /// POST `GetUserStatus` to `127.0.0.1:<port>` and return the JSON body.
    ///
    /// A transport error or non-success status is
    /// [`DiscoveryError::PortProbeFailed`]; a body that is not JSON is
    /// [`DiscoveryError::MalformedResponse`].
    pub async fn query(&self, port: u16, token: &str) -> Result<Value> {
        let probe_failed = |reason: String| DiscoveryError::PortProbeFailed { port, reason };

        let response = self
            .http
            .post(Self::url(port))
            .header(CSRF_TOKEN_HEADER, token)
            .header(PROTOCOL_VERSION_HEADER, "1")
            .json(&UserStatusRequest::default())
            .send()
            .await
            .map_err(|e| probe_failed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(probe_failed(format!("HTTP {}", status)));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| probe_failed(e.to_string()))?;
        debug!("GetUserStatus on port {}: {} bytes", port, body.len());

        serde_json::from_slice(&body).map_err(|e| DiscoveryError::MalformedResponse(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderMap, StatusCode};
    use axum::routing::post;
    use axum::{Json, Router};
    use serde_json::json;

    async fn serve(router: Router) -> u16 {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        port
    }

    fn client() -> QuotaClient {
        QuotaClient::new(Duration::from_secs(2)).unwrap()
    }

    #[test]
    fn test_request_body_shape() {
        let body = serde_json::to_value(UserStatusRequest::default()).unwrap();
        assert_eq!(
            body,
            json!({ "metadata": { "ideName": "antigravity", "extensionName": "antigravity", "locale": "en" } })
        );
    }

    #[tokio::test]
    async fn test_query_sends_headers_and_returns_json() {
        let router = Router::new().route(
            USER_STATUS_PATH,
            post(|headers: HeaderMap, Json(body): Json<Value>| async move {
                let token_ok = headers.get(CSRF_TOKEN_HEADER).map(|v| v == "tok") == Some(true);
                let version_ok = headers.get(PROTOCOL_VERSION_HEADER).map(|v| v == "1") == Some(true);
                if !(token_ok && version_ok) || body["metadata"]["ideName"] != "antigravity" {
                    return (StatusCode::FORBIDDEN, Json(json!({})));
                }
                (StatusCode::OK, Json(json!({ "models": [] })))
            }),
        );
        let port = serve(router).await;

        let value = client().query(port, "tok").await.unwrap();
        assert_eq!(value, json!({ "models": [] }));

        let err = client().query(port, "wrong").await.unwrap_err();
        assert_eq!(
            err,
            DiscoveryError::PortProbeFailed {
                port,
                reason: "HTTP 403 Forbidden".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_query_non_json_body_is_malformed() {
        let router = Router::new().route(USER_STATUS_PATH, post(|| async { "not json" }));
        let port = serve(router).await;

        let err = client().query(port, "tok").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedResponse);
    }

    #[tokio::test]
    async fn test_query_wrong_path_is_probe_failure() {
        let port = serve(Router::new()).await;

        let err = client().query(port, "tok").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PortProbeFailed);
    }

    #[tokio::test]
    async fn test_query_closed_port_is_probe_failure() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = client().query(port, "tok").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::PortProbeFailed);
    }
}
