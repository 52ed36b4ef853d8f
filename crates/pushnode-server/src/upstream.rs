//! Forwarding to an upstream relay for serverless users.

use std::time::Duration;

use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use tracing::debug;

use crate::error::RelayError;

pub const PROTOBUF_CONTENT_TYPE: &str = "application/x-protobuf";

/// The upstream's answer, relayed to the sender as-is.
#[derive(Debug, Clone, PartialEq)]
pub struct ForwardResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: Bytes,
}

pub struct Upstream {
    client: reqwest::Client,
    endpoint: String,
}

impl Upstream {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self, RelayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| RelayError::Internal(format!("upstream client: {e}")))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POST a serialized envelope to `<endpoint>/rest/v1/push?token=<token>`.
    pub async fn push(&self, token: &str, body: Vec<u8>) -> Result<ForwardResponse, RelayError> {
        let url = format!("{}/rest/v1/push", self.endpoint);
        let response = self
            .client
            .post(url)
            .query(&[("token", token)])
            .header(CONTENT_TYPE, PROTOBUF_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| RelayError::Internal(format!("upstream request: {e}")))?;

        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| RelayError::Internal(format!("upstream body: {e}")))?;

        debug!(status, len = body.len(), "upstream answered");
        Ok(ForwardResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_bytes, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_forward_passes_response_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/push"))
            .and(query_param("token", "seg0..seg2"))
            .and(header("content-type", PROTOBUF_CONTENT_TYPE))
            .and(body_bytes(vec![1u8, 2, 3]))
            .respond_with(
                ResponseTemplate::new(202)
                    .insert_header("content-type", "application/json")
                    .set_body_raw(r#"{"request-uid":"abc"}"#, "application/json"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let upstream = Upstream::new(&format!("{}/", server.uri()), Duration::from_secs(5)).unwrap();
        let response = upstream.push("seg0..seg2", vec![1, 2, 3]).await.unwrap();
        assert_eq!(response.status, 202);
        assert_eq!(response.content_type.as_deref(), Some("application/json"));
        assert_eq!(response.body.as_ref(), br#"{"request-uid":"abc"}"#);
    }

    #[tokio::test]
    async fn test_unreachable_upstream_is_internal() {
        // Port 9 (discard) on localhost is not listening.
        let upstream = Upstream::new("http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        assert!(matches!(
            upstream.push("t", Vec::new()).await,
            Err(RelayError::Internal(_))
        ));
    }
}
