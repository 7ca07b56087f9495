// SPDX-FileCopyrightText: 2026 Recollect Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `recollect context` command implementation.

use chrono::Utc;
use recollect_config::model::RecollectConfig;
use recollect_core::RecollectError;
use recollect_memory::{RetrievalFilters, RetrievalQuery};
use tracing::warn;

use crate::pipeline::Pipeline;

/// Assembles context for `query` and prints the rendered block, or the full
/// selection as JSON.
pub async fn run_context(
    config: &RecollectConfig,
    query: &str,
    top_k: Option<usize>,
    json: bool,
) -> Result<(), RecollectError> {
    let pipeline = Pipeline::open(config).await?;
    let settings = pipeline.assembler.settings();
    let query = RetrievalQuery::new(query, top_k.unwrap_or(settings.top_k)).with_filters(
        RetrievalFilters {
            min_similarity: Some(settings.min_similarity),
            ..RetrievalFilters::default()
        },
    );

    let context = pipeline.assembler.assemble_query(&query, Utc::now()).await;
    if context.is_degraded() {
        warn!(outcome = ?context.outcome, "context assembly degraded");
    }

    if json {
        let body = serde_json::to_string_pretty(&context).map_err(RecollectError::storage)?;
        println!("{body}");
    } else {
        let indexed = pipeline.index.count().await?;
        eprintln!(
            "{} of {indexed} memories selected, {} tokens",
            context.selected.len(),
            context.total_tokens
        );
        print!("{}", context.render());
    }
    Ok(())
}
