// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock LLM provider adapter for deterministic testing.
//!
//! Scripted results are popped from a FIFO queue. When the queue is empty,
//! `[]` (no memories) is returned.

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use recollect_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderError, ProviderErrorKind,
    ProviderRequest, ProviderResponse, RecollectError, TokenUsage,
};
use tokio::sync::Mutex;

pub struct MockProvider {
    script: Arc<Mutex<VecDeque<Result<String, ProviderErrorKind>>>>,
    requests: Arc<Mutex<Vec<ProviderRequest>>>,
    calls: AtomicU32,
}

impl MockProvider {
    pub fn new() -> Self {
        Self {
            script: Arc::new(Mutex::new(VecDeque::new())),
            requests: Arc::new(Mutex::new(Vec::new())),
            calls: AtomicU32::new(0),
        }
    }

    /// Pre-loaded with successful responses.
    pub fn with_responses(responses: Vec<String>) -> Self {
        let provider = Self::new();
        if let Ok(mut script) = provider.script.try_lock() {
            script.extend(responses.into_iter().map(Ok));
        }
        provider
    }

    pub async fn add_response(&self, text: impl Into<String>) {
        self.script.lock().await.push_back(Ok(text.into()));
    }

    pub async fn add_failure(&self, kind: ProviderErrorKind) {
        self.script.lock().await.push_back(Err(kind));
    }

    /// Number of `complete` calls so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub async fn requests(&self) -> Vec<ProviderRequest> {
        self.requests.lock().await.clone()
    }
}

impl Default for MockProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockProvider {
    fn name(&self) -> &str {
        "mock-provider"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Provider
    }

    async fn health_check(&self) -> Result<HealthStatus, RecollectError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecollectError> {
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for MockProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RecollectError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let model = request.model.clone();
        self.requests.lock().await.push(request);
        let next = self
            .script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Ok("[]".to_string()));
        match next {
            Ok(content) => Ok(ProviderResponse {
                id: format!("mock-{call}"),
                content,
                model,
                usage: TokenUsage::default(),
            }),
            Err(kind) => Err(ProviderError::new(kind, "mock-provider", "scripted failure")
                .with_correlation_id(Some(format!("mock-{call}")))
                .into()),
        }
    }
}

/// JSON array response describing memories, for scripting extraction.
pub fn memories_json(items: &[(&str, &str, &str)]) -> String {
    let items: Vec<_> = items
        .iter()
        .map(|(text, category, confidence)| {
            serde_json::json!({"text": text, "category": category, "confidence": confidence})
        })
        .collect();
    serde_json::Value::Array(items).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use recollect_core::{ProviderMessage, Role};

    fn request() -> ProviderRequest {
        ProviderRequest {
            model: "m".into(),
            system_prompt: None,
            messages: vec![ProviderMessage {
                role: Role::User,
                content: "hi".into(),
            }],
            max_tokens: 16,
            temperature: None,
        }
    }

    #[tokio::test]
    async fn plays_script_then_defaults() {
        let provider = MockProvider::with_responses(vec!["first".into()]);
        provider.add_failure(ProviderErrorKind::RateLimited).await;

        assert_eq!(provider.complete(request()).await.unwrap().content, "first");
        let err = provider.complete(request()).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(provider.complete(request()).await.unwrap().content, "[]");
        assert_eq!(provider.calls(), 3);
        assert_eq!(provider.requests().await.len(), 3);
    }

    #[test]
    fn memories_json_is_an_array() {
        let json = memories_json(&[("User likes tea", "preference", "high")]);
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["category"], "preference");
    }
}
