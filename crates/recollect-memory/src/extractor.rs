// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! LLM-based memory extraction from sealed transcripts.
//!
//! The provider is asked for a JSON array of `{text, category, confidence}`
//! objects. Items that fail validation are dropped individually; a response
//! that is not a JSON array at all is a non-retryable malformed-output error.

use std::str::FromStr;
use std::sync::Arc;

use recollect_config::model::{ExtractionConfig, RecollectConfig};
use recollect_core::{
    ConfidenceLevel, ConversationTranscript, MemoryCategory, ProviderAdapter, ProviderError,
    ProviderErrorKind, ProviderMessage, ProviderRequest, RecollectError, Role,
};
use recollect_resilience::{RetryPolicy, retry};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::types::ExtractedMemory;

const EXTRACTION_PROMPT: &str = r#"Extract durable facts about the user from the conversation below that would be useful to remember in future conversations.

Output a JSON array. For each item:
- "text": the memory as a standalone statement (e.g., "The user's dog is named Max")
- "category": one of: preference, fact, task, relationship, decision
- "confidence": one of: low, medium, high

Only include information stated or confirmed by the user that is likely to stay relevant.
If nothing is worth remembering, return an empty array: []

Output the JSON array only, no explanation."#;

/// What one extraction run produced.
#[derive(Debug, Default)]
pub struct ExtractionOutcome {
    /// Accepted memories, in provider order.
    pub memories: Vec<ExtractedMemory>,
    /// Items discarded by validation, the confidence floor, or the cap.
    pub dropped: usize,
    /// Set when the provider call failed for good. `memories` is then empty.
    pub failure: Option<String>,
}

impl ExtractionOutcome {
    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// Settings for [`MemoryExtractor`].
#[derive(Debug, Clone)]
pub struct ExtractionSettings {
    pub model: String,
    pub max_tokens: u32,
    pub confidence_floor: ConfidenceLevel,
    pub max_memories: usize,
}

impl From<&ExtractionConfig> for ExtractionSettings {
    fn from(config: &ExtractionConfig) -> Self {
        Self {
            model: config.model.clone(),
            max_tokens: config.max_tokens,
            confidence_floor: config.confidence_floor,
            max_memories: config.max_memories_per_transcript,
        }
    }
}

impl Default for ExtractionSettings {
    fn default() -> Self {
        Self::from(&RecollectConfig::default().extraction)
    }
}

/// Turns a sealed transcript into structured memories.
pub struct MemoryExtractor {
    provider: Arc<dyn ProviderAdapter>,
    retry: RetryPolicy,
    settings: ExtractionSettings,
}

impl MemoryExtractor {
    pub fn new(
        provider: Arc<dyn ProviderAdapter>,
        retry: RetryPolicy,
        settings: ExtractionSettings,
    ) -> Self {
        Self {
            provider,
            retry,
            settings,
        }
    }

    /// Extract memories from a transcript.
    ///
    /// Never returns an error: provider failures that outlast the retry
    /// budget, and malformed responses, are reported through
    /// [`ExtractionOutcome::failure`] with an empty memory list.
    pub async fn extract(&self, transcript: &ConversationTranscript) -> ExtractionOutcome {
        if transcript.is_empty() {
            return ExtractionOutcome::default();
        }

        let request = self.build_request(transcript);
        let provider_name = self.provider.name().to_string();
        let result = retry(&self.retry, &provider_name, "extract", |attempt| {
            let request = request.clone();
            let provider = self.provider.clone();
            let provider_name = provider_name.clone();
            async move {
                debug!(attempt, provider = %provider_name, "requesting memory extraction");
                let response = provider.complete(request).await?;
                parse_extraction_response(&response.content).map_err(|detail| {
                    RecollectError::from(ProviderError::new(
                        ProviderErrorKind::MalformedOutput,
                        provider_name,
                        detail,
                    ))
                })
            }
        })
        .await;

        let raw_items = match result {
            Ok(items) => items,
            Err(e) => {
                warn!(
                    conversation_id = transcript.conversation_id(),
                    error = %e,
                    "memory extraction failed"
                );
                return ExtractionOutcome::failed(e.to_string());
            }
        };

        let outcome = self.filter(transcript.conversation_id(), raw_items);
        info!(
            conversation_id = transcript.conversation_id(),
            accepted = outcome.memories.len(),
            dropped = outcome.dropped,
            "memory extraction complete"
        );
        outcome
    }

    fn build_request(&self, transcript: &ConversationTranscript) -> ProviderRequest {
        ProviderRequest {
            model: self.settings.model.clone(),
            system_prompt: Some(EXTRACTION_PROMPT.to_string()),
            messages: vec![ProviderMessage {
                role: Role::User,
                content: format!("Conversation:\n{}", transcript.render()),
            }],
            max_tokens: self.settings.max_tokens,
            temperature: Some(0.0),
        }
    }

    /// Validate, apply the confidence floor, then cap.
    fn filter(&self, conversation_id: &str, raw_items: Vec<serde_json::Value>) -> ExtractionOutcome {
        let total = raw_items.len();
        let mut accepted = Vec::new();
        for item in raw_items {
            match validate_item(item, conversation_id) {
                Ok(memory) if memory.confidence_level >= self.settings.confidence_floor => {
                    accepted.push(memory);
                }
                Ok(memory) => {
                    debug!(text = %memory.text, level = %memory.confidence_level, "below confidence floor");
                }
                Err(reason) => {
                    warn!(conversation_id, reason = %reason, "dropping extracted item");
                }
            }
        }

        let memories = cap_by_confidence(accepted, self.settings.max_memories);
        ExtractionOutcome {
            dropped: total - memories.len(),
            memories,
            failure: None,
        }
    }
}

#[derive(Deserialize)]
struct RawMemory {
    #[serde(alias = "content")]
    text: String,
    category: String,
    #[serde(default)]
    confidence: Option<RawConfidence>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawConfidence {
    Score(f64),
    Level(String),
}

fn validate_item(
    item: serde_json::Value,
    conversation_id: &str,
) -> Result<ExtractedMemory, String> {
    let raw: RawMemory = serde_json::from_value(item).map_err(|e| e.to_string())?;
    let text = raw.text.trim();
    if text.is_empty() {
        return Err("empty text".to_string());
    }
    let category = MemoryCategory::from_str(raw.category.trim())
        .map_err(|_| format!("unknown category `{}`", raw.category))?;
    let confidence_level = match raw.confidence {
        None => ConfidenceLevel::Low,
        Some(RawConfidence::Score(score)) if (0.0..=1.0).contains(&score) => {
            ConfidenceLevel::from_score(score)
        }
        Some(RawConfidence::Score(score)) => {
            return Err(format!("confidence {score} outside [0, 1]"));
        }
        Some(RawConfidence::Level(level)) => ConfidenceLevel::from_str(level.trim())
            .map_err(|_| format!("unknown confidence `{level}`"))?,
    };
    Ok(ExtractedMemory {
        text: text.to_string(),
        category,
        confidence_level,
        source_conversation_id: conversation_id.to_string(),
    })
}

/// Keep at most `cap` memories, preferring higher confidence, earlier first
/// among equals, and return them in their original order.
fn cap_by_confidence(memories: Vec<ExtractedMemory>, cap: usize) -> Vec<ExtractedMemory> {
    if memories.len() <= cap {
        return memories;
    }
    let mut order: Vec<usize> = (0..memories.len()).collect();
    order.sort_by(|&a, &b| memories[b].confidence_level.cmp(&memories[a].confidence_level));
    let mut keep = vec![false; memories.len()];
    for &i in order.iter().take(cap) {
        keep[i] = true;
    }
    memories
        .into_iter()
        .zip(keep)
        .filter_map(|(m, k)| k.then_some(m))
        .collect()
}

/// Locate the JSON array in a provider response.
///
/// Tolerates markdown code fences and surrounding prose.
pub fn parse_extraction_response(response: &str) -> Result<Vec<serde_json::Value>, String> {
    let trimmed = response.trim();
    let (Some(start), Some(end)) = (trimmed.find('['), trimmed.rfind(']')) else {
        return Err("response contains no JSON array".to_string());
    };
    if end < start {
        return Err("response contains no JSON array".to_string());
    }
    serde_json::from_str::<Vec<serde_json::Value>>(&trimmed[start..=end])
        .map_err(|e| format!("invalid JSON array: {e}"))
}
