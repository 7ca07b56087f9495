// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Embedding adapter over the `/embeddings` endpoint.

use std::sync::OnceLock;

use async_trait::async_trait;
use recollect_config::model::ProviderConfig;
use recollect_core::{
    AdapterType, EmbeddingAdapter, EmbeddingInput, EmbeddingOutput, HealthStatus, PluginAdapter,
    ProviderError, ProviderErrorKind, RecollectError,
};
use tracing::{debug, info};

use crate::client::{OpenAiClient, PROVIDER_NAME};
use crate::client_from_config;
use crate::types::{EmbeddingData, EmbeddingRequest};

/// Embeds text with a fixed model.
///
/// The first successful response fixes the vector dimension. Any later
/// response with a different dimension is rejected as malformed, since
/// vectors of different sizes cannot share an index.
pub struct OpenAiEmbedder {
    client: OpenAiClient,
    model: String,
    dimensions: OnceLock<usize>,
}

impl OpenAiEmbedder {
    pub fn new(config: &ProviderConfig) -> Result<Self, RecollectError> {
        let client = client_from_config(config)?;
        info!(model = %config.embedding_model, "OpenAI embedder initialized");
        Ok(Self::with_client(client, config.embedding_model.clone()))
    }

    pub fn with_client(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            dimensions: OnceLock::new(),
        }
    }

    /// Dimension fixed by the first response, if any.
    pub fn dimensions(&self) -> Option<usize> {
        self.dimensions.get().copied()
    }

    fn check_batch(&self, expected: usize, mut data: Vec<EmbeddingData>) -> Result<Vec<Vec<f32>>, String> {
        if data.len() != expected {
            return Err(format!("expected {expected} embeddings, got {}", data.len()));
        }
        data.sort_by_key(|d| d.index);
        if data.iter().enumerate().any(|(i, d)| d.index != i) {
            return Err("embedding indices do not match the inputs".to_string());
        }
        let Some(first) = data.first() else {
            return Ok(Vec::new());
        };
        let width = first.embedding.len();
        if width == 0 {
            return Err("embedding is empty".to_string());
        }
        if let Some(bad) = data.iter().find(|d| d.embedding.len() != width) {
            return Err(format!(
                "embedding {} has dimension {}, expected {width}",
                bad.index,
                bad.embedding.len()
            ));
        }
        let fixed = *self.dimensions.get_or_init(|| width);
        if fixed != width {
            return Err(format!("dimension changed from {fixed} to {width}"));
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }
}

#[async_trait]
impl PluginAdapter for OpenAiEmbedder {
    fn name(&self) -> &str {
        PROVIDER_NAME
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Embedding
    }

    async fn health_check(&self) -> Result<HealthStatus, RecollectError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), RecollectError> {
        debug!("OpenAI embedder shutting down");
        Ok(())
    }
}

#[async_trait]
impl EmbeddingAdapter for OpenAiEmbedder {
    async fn embed(&self, input: EmbeddingInput) -> Result<EmbeddingOutput, RecollectError> {
        let expected = input.texts.len();
        if expected == 0 {
            return Ok(EmbeddingOutput {
                embeddings: Vec::new(),
                dimensions: self.dimensions().unwrap_or(0),
            });
        }
        let request = EmbeddingRequest {
            model: self.model.clone(),
            input: input.texts,
        };
        let response = self.client.embeddings(&request).await?;
        let embeddings = self.check_batch(expected, response.data).map_err(|detail| {
            ProviderError::new(ProviderErrorKind::MalformedOutput, PROVIDER_NAME, detail)
        })?;
        debug!(count = embeddings.len(), model = %self.model, "texts embedded");
        Ok(EmbeddingOutput {
            dimensions: embeddings.first().map_or(0, Vec::len),
            embeddings,
        })
    }
}
