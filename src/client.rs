//! Authenticated HTTP access to the platform API.
//!
//! Every remote call a step makes (storage transfer, inference, knowledge
//! upload) goes through [`ApiClient`], which joins endpoint paths onto the
//! configured base URL, attaches the bearer token, and maps transport and
//! status failures to [`StepError`]. No retries are attempted.

use crate::error::StepError;
use reqwest::{Client, RequestBuilder, Response};
use std::fmt;
use std::time::Duration;
use tracing::debug;

/// Maximum number of response-body bytes kept in an HTTP error.
const ERROR_BODY_LIMIT: usize = 512;

/// A bearer-authenticated client bound to one API host.
#[derive(Clone)]
pub struct ApiClient {
    http: Client,
    base_url: String,
    token: String,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

impl ApiClient {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Result<Self, StepError> {
        let http = Client::builder()
            .build()
            .map_err(|e| StepError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Absolute URL for an API path beginning with `/`.
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub fn get(&self, url: &str) -> RequestBuilder {
        self.http.get(url).bearer_auth(&self.token)
    }

    pub fn post(&self, url: &str) -> RequestBuilder {
        self.http.post(url).bearer_auth(&self.token)
    }

    /// Send a request and require a success status.
    pub async fn send(
        &self,
        url: &str,
        request: RequestBuilder,
        timeout_secs: Option<u64>,
    ) -> Result<Response, StepError> {
        let request = match timeout_secs {
            Some(secs) => request.timeout(Duration::from_secs(secs)),
            None => request,
        };
        debug!("→ {}", url);

        let response = request
            .send()
            .await
            .map_err(|e| StepError::from_transport(url, e, timeout_secs))?;
        ensure_success(url, response).await
    }
}

/// Turn a non-success response into [`StepError::HttpStatus`].
pub async fn ensure_success(url: &str, response: Response) -> Result<Response, StepError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(StepError::HttpStatus {
        url: url.to_string(),
        status: status.as_u16(),
        body: truncate_chars(body.trim(), ERROR_BODY_LIMIT),
    })
}

fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_joins_without_double_slash() {
        let c = ApiClient::new("http://localhost:4000/", "t").unwrap();
        assert_eq!(
            c.endpoint("/api/agent-runtime/run"),
            "http://localhost:4000/api/agent-runtime/run"
        );
    }

    #[test]
    fn debug_hides_token() {
        let c = ApiClient::new("http://h", "very-secret").unwrap();
        assert!(!format!("{c:?}").contains("very-secret"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_chars("héllo", 2), "hé…");
        assert_eq!(truncate_chars("ok", 10), "ok");
    }

    #[tokio::test]
    async fn non_success_status_carries_code() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/missing")
            .match_header("authorization", "Bearer tok")
            .with_status(404)
            .with_body("no such file")
            .create_async()
            .await;

        let client = ApiClient::new(server.url(), "tok").unwrap();
        let url = client.endpoint("/missing");
        let err = client
            .send(&url, client.get(&url), None)
            .await
            .unwrap_err();
        match err {
            StepError::HttpStatus { status, body, .. } => {
                assert_eq!(status, 404);
                assert_eq!(body, "no such file");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn unreachable_host_is_connectivity_error() {
        // Port 9 (discard) on localhost is closed in test environments.
        let client = ApiClient::new("http://127.0.0.1:9", "tok").unwrap();
        let url = client.endpoint("/x");
        let err = client
            .send(&url, client.get(&url), Some(5))
            .await
            .unwrap_err();
        assert!(
            matches!(err, StepError::Connectivity { .. } | StepError::Timeout { .. }),
            "got: {err:?}"
        );
    }
}
