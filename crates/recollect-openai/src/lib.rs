// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! OpenAI-compatible adapters for the Recollect memory pipeline.
//!
//! [`OpenAiProvider`] implements [`ProviderAdapter`] over `/chat/completions`
//! and is used for memory extraction. [`OpenAiEmbedder`] implements
//! `EmbeddingAdapter` over `/embeddings`. Both work against any server that
//! speaks the OpenAI wire format.

pub mod client;
pub mod embedder;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;
use recollect_config::model::ProviderConfig;
use recollect_core::{
    AdapterType, HealthStatus, PluginAdapter, ProviderAdapter, ProviderError, ProviderErrorKind,
    ProviderRequest, ProviderResponse, RecollectError, Role, TokenUsage,
};
use tracing::{debug, info};

pub use client::OpenAiClient;
pub use embedder::OpenAiEmbedder;

use crate::client::PROVIDER_NAME;
use crate::types::{ApiMessage, ChatRequest};

/// Environment variable consulted when the config has no API key.
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Chat completion provider implementing [`ProviderAdapter`].
///
/// API key resolution order: config -> `OPENAI_API_KEY` env var -> error.
pub struct OpenAiProvider {
    client: OpenAiClient,
}

impl OpenAiProvider {
    pub fn new(config: &ProviderConfig) -> Result<Self, RecollectError> {
        let client = client_from_config(config)?;
        info!(base_url = %config.base_url, "OpenAI provider initialized");
        Ok(Self { client })
    }

    pub fn with_client(client: OpenAiClient) -> Self {
        Self { client }
    }

    fn to_chat_request(request: &ProviderRequest) -> ChatRequest {
        let system = request.system_prompt.iter().map(|prompt| ApiMessage {
            role: Role::System.to_string(),
            content: prompt.clone(),
        });
        let messages = request.messages.iter().map(|m| ApiMessage {
            role: m.role.to_string(),
            content: m.content.clone(),
        });
        ChatRequest {
            model: request.model.clone(),
            messages: system.chain(messages).collect(),
            max_tokens: request.max_tokens,
            temperature: request.temperature,
        }
    }
}

/// Builds a client from the `[provider]` section.
pub fn client_from_config(config: &ProviderConfig) -> Result<OpenAiClient, RecollectError> {
    let api_key = resolve_api_key(&config.api_key)?;
    OpenAiClient::new(
        &api_key,
        config.base_url.clone(),
        Duration::from_millis(config.request_timeout_ms),
    )
}

fn resolve_api_key(config_key: &Option<String>) -> Result<String, RecollectError> {
    if let Some(key) = config_key
        && !key.is_empty()
    {
        return Ok(key.clone());
    }

    std::env::var(API_KEY_ENV).map_err(|_| {
        RecollectError::Config(format!(
            "API key not found. Set provider.api_key in config or the {API_KEY_ENV} environment variable."
        ))
    })
}

#[async_trait]
impl PluginAdapter for OpenAiProvider {
    fn name(&self) -> &str {
        PROVIDER_NAME
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
        debug!("OpenAI provider shutting down");
        Ok(())
    }
}

#[async_trait]
impl ProviderAdapter for OpenAiProvider {
    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, RecollectError> {
        let response = self.client.chat(&Self::to_chat_request(&request)).await?;

        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| {
                ProviderError::new(
                    ProviderErrorKind::MalformedOutput,
                    PROVIDER_NAME,
                    format!("response {} has no message content", response.id),
                )
                .with_correlation_id(Some(response.id.clone()))
            })?;

        Ok(ProviderResponse {
            id: response.id,
            content,
            model: response.model,
            usage: response
                .usage
                .map(|u| TokenUsage {
                    input_tokens: u.prompt_tokens,
                    output_tokens: u.completion_tokens,
                })
                .unwrap_or_default(),
        })
    }
}
