// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! HTTP client for OpenAI-compatible APIs.
//!
//! Provides [`OpenAiClient`] which handles request construction, bearer
//! authentication, and classification of failures into
//! [`ProviderErrorKind`]s. Retrying is left to the caller's retry policy.

use std::time::Duration;

use recollect_core::{ProviderError, ProviderErrorKind, RecollectError};
use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderValue};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::types::{
    ApiErrorResponse, ChatRequest, ChatResponse, EmbeddingRequest, EmbeddingResponse,
};

/// Name reported in provider errors.
pub const PROVIDER_NAME: &str = "openai";

/// Header carrying the provider-assigned request id.
const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Debug, Clone)]
pub struct OpenAiClient {
    client: reqwest::Client,
    base_url: String,
}

impl OpenAiClient {
    /// Creates a client for `base_url` (e.g. `https://api.openai.com/v1`).
    pub fn new(
        api_key: &str,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, RecollectError> {
        let mut headers = HeaderMap::new();
        let mut auth = HeaderValue::from_str(&format!("Bearer {api_key}"))
            .map_err(|e| RecollectError::Config(format!("invalid API key header value: {e}")))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| RecollectError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn chat(&self, request: &ChatRequest) -> Result<ChatResponse, RecollectError> {
        self.post("chat/completions", request).await
    }

    pub async fn embeddings(
        &self,
        request: &EmbeddingRequest,
    ) -> Result<EmbeddingResponse, RecollectError> {
        self.post("embeddings", request).await
    }

    async fn post<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, RecollectError>
    where
        Req: Serialize + ?Sized,
        Resp: DeserializeOwned,
    {
        let url = format!("{}/{path}", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| transport_error(&e))?;

        let status = response.status();
        let correlation_id = response
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        debug!(path, status = %status, correlation_id = ?correlation_id, "response received");

        let text = response.text().await.map_err(|e| {
            RecollectError::from(
                transport_error(&e).with_correlation_id(correlation_id.clone()),
            )
        })?;

        if !status.is_success() {
            let message = match serde_json::from_str::<ApiErrorResponse>(&text) {
                Ok(api_err) => match api_err.error.type_ {
                    Some(kind) => format!("API error ({kind}): {}", api_err.error.message),
                    None => format!("API error: {}", api_err.error.message),
                },
                Err(_) => format!("API returned {status}: {text}"),
            };
            warn!(path, status = %status, correlation_id = ?correlation_id, "request failed");
            return Err(ProviderError::new(classify_status(status), PROVIDER_NAME, message)
                .with_correlation_id(correlation_id)
                .into());
        }

        serde_json::from_str(&text).map_err(|e| {
            ProviderError::new(
                ProviderErrorKind::MalformedOutput,
                PROVIDER_NAME,
                format!("failed to parse response: {e}"),
            )
            .with_correlation_id(correlation_id)
            .into()
        })
    }
}

/// Maps a non-success HTTP status to a failure class.
pub fn classify_status(status: StatusCode) -> ProviderErrorKind {
    match status.as_u16() {
        401 | 403 => ProviderErrorKind::Authentication,
        429 => ProviderErrorKind::RateLimited,
        408 | 504 => ProviderErrorKind::Timeout,
        500..=599 => ProviderErrorKind::Unavailable,
        // Other 4xx mean the request itself is wrong; retrying will not help.
        _ => ProviderErrorKind::MalformedOutput,
    }
}

fn transport_error(e: &reqwest::Error) -> ProviderError {
    let kind = if e.is_timeout() {
        ProviderErrorKind::Timeout
    } else if e.is_decode() {
        ProviderErrorKind::MalformedOutput
    } else {
        ProviderErrorKind::Unavailable
    };
    ProviderError::new(kind, PROVIDER_NAME, format!("HTTP request failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ApiMessage;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_client(base_url: &str) -> OpenAiClient {
        OpenAiClient::new("test-api-key", base_url, Duration::from_secs(5)).unwrap()
    }

    fn chat_request() -> ChatRequest {
        ChatRequest {
            model: "gpt-4o-mini".into(),
            messages: vec![ApiMessage {
                role: "user".into(),
                content: "Hello".into(),
            }],
            max_tokens: 64,
            temperature: Some(0.0),
        }
    }

    fn chat_body(content: &str) -> serde_json::Value {
        serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": "gpt-4o-mini",
            "choices": [{"index": 0, "message": {"role": "assistant", "content": content}}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        })
    }

    #[tokio::test]
    async fn chat_success_sends_bearer_auth() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .and(header("authorization", "Bearer test-api-key"))
            .and(body_partial_json(serde_json::json!({"model": "gpt-4o-mini"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("Hi there!")))
            .mount(&server)
            .await;

        let client = test_client(&server.uri());
        let response = client.chat(&chat_request()).await.unwrap();

        assert_eq!(response.id, "chatcmpl-1");
        assert_eq!(response.choices[0].message.content.as_deref(), Some("Hi there!"));
        assert_eq!(response.usage.unwrap().prompt_tokens, 10);
    }

    #[tokio::test]
    async fn trailing_slash_in_base_url_is_ignored() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/chat/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(chat_body("ok")))
            .mount(&server)
            .await;

        let client = test_client(&format!("{}/v1/", server.uri()));
        assert!(client.chat(&chat_request()).await.is_ok());
    }

    #[tokio::test]
    async fn status_codes_map_to_error_kinds() {
        let cases = [
            (401, ProviderErrorKind::Authentication),
            (403, ProviderErrorKind::Authentication),
            (429, ProviderErrorKind::RateLimited),
            (408, ProviderErrorKind::Timeout),
            (504, ProviderErrorKind::Timeout),
            (500, ProviderErrorKind::Unavailable),
            (503, ProviderErrorKind::Unavailable),
            (400, ProviderErrorKind::MalformedOutput),
        ];
        for (status, expected) in cases {
            let server = MockServer::start().await;
            Mock::given(method("POST"))
                .and(path("/chat/completions"))
                .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
                    "error": {"type": "test_error", "message": "nope"}
                })))
                .mount(&server)
                .await;

            let err = test_client(&server.uri())
                .chat(&chat_request())
                .await
                .unwrap_err();
            match err {
                RecollectError::Provider(e) => {
                    assert_eq!(e.kind, expected, "status {status}");
                    assert!(e.message.contains("test_error"), "got: {}", e.message);
                }
                other => panic!("unexpected error for {status}: {other}"),
            }
        }
    }

    #[tokio::test]
    async fn request_id_becomes_correlation_id() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(429)
                    .insert_header("x-request-id", "req_abc123")
                    .set_body_string("slow down"),
            )
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .chat(&chat_request())
            .await
            .unwrap_err();
        match err {
            RecollectError::Provider(e) => {
                assert_eq!(e.correlation_id.as_deref(), Some("req_abc123"));
                assert!(e.message.contains("slow down"));
                assert!(e.is_retryable());
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn undecodable_success_body_is_malformed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/embeddings"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not json"))
            .mount(&server)
            .await;

        let err = test_client(&server.uri())
            .embeddings(&EmbeddingRequest {
                model: "text-embedding-3-small".into(),
                input: vec!["hi".into()],
            })
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            RecollectError::Provider(ProviderError {
                kind: ProviderErrorKind::MalformedOutput,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn slow_server_is_a_timeout() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/chat/completions"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(chat_body("late"))
                    .set_delay(Duration::from_millis(500)),
            )
            .mount(&server)
            .await;

        let client =
            OpenAiClient::new("k", server.uri(), Duration::from_millis(50)).unwrap();
        let err = client.chat(&chat_request()).await.unwrap_err();
        assert!(matches!(
            err,
            RecollectError::Provider(ProviderError {
                kind: ProviderErrorKind::Timeout,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn unreachable_server_is_unavailable() {
        // Port 9 (discard) is closed on test machines.
        let client = OpenAiClient::new("k", "http://127.0.0.1:9", Duration::from_secs(2)).unwrap();
        let err = client.chat(&chat_request()).await.unwrap_err();
        assert!(err.is_retryable(), "got: {err}");
    }
}
