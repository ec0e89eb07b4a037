//! Token-budget overflow detection and greedy document selection.
//!
//! Given the assembled chunks for a key and a model size class, decides
//! whether the context fits inside the model's token budget and, when it
//! does not, recommends the subset of documents to keep.
//!
//! Selection is greedy over the same priority ranking used for context
//! ordering, never an independent ranking: documents are taken in rank
//! order while they fit. Greedy (not knapsack) is deliberate — the
//! outcome stays explainable ("why was my document dropped") and runs in
//! linear time over the ranked list.

use std::collections::{HashMap, HashSet};

use crate::config::Config;
use crate::error::ConfigError;
use crate::models::{
    ContextChunk, Document, DocumentBreakdown, OverflowReport, RemovedDocument,
    SelectionRecommendation,
};
use crate::prioritize;

/// Fixed character-per-token heuristic shared with the chunker's
/// consumers. Exact tokenization is a non-goal.
pub const CHARS_PER_TOKEN: u64 = 4;

/// Estimated tokens for a chunk of `character_count` characters.
pub fn estimate_tokens(character_count: usize) -> u64 {
    (character_count as u64).div_ceil(CHARS_PER_TOKEN)
}

/// Context budget for a model category: `floor(max_tokens × percent / 100)`.
pub fn context_budget(config: &Config, model_category: &str) -> Result<u64, ConfigError> {
    let max_tokens = config.models.max_tokens(model_category)?;
    Ok(max_tokens * config.context.percent as u64 / 100)
}

/// Check assembled chunks against a model's context budget.
///
/// Returns a [`ConfigError`] synchronously for an unknown model
/// category; overflow itself is never an error, only a report.
pub fn check_overflow(
    documents: &[Document],
    chunks: &[ContextChunk],
    model_category: &str,
    config: &Config,
) -> Result<OverflowReport, ConfigError> {
    let max_context_tokens = context_budget(config, model_category)?;
    let current_tokens: u64 = chunks
        .iter()
        .map(|c| estimate_tokens(c.character_count))
        .sum();

    let breakdown = aggregate_by_document(documents, chunks, max_context_tokens);

    if current_tokens <= max_context_tokens {
        let total = breakdown.len();
        return Ok(OverflowReport {
            will_overflow: false,
            current_tokens,
            max_context_tokens,
            overflow_amount: 0,
            recommendations: SelectionRecommendation {
                suggested_documents: breakdown.clone(),
                removed_documents: Vec::new(),
                tokens_saved: 0,
                summary: format!("{}/{} documents recommended", total, total),
            },
            document_breakdown: breakdown,
        });
    }

    let recommendations = select_greedy(&breakdown, current_tokens, max_context_tokens);

    Ok(OverflowReport {
        will_overflow: true,
        current_tokens,
        max_context_tokens,
        overflow_amount: current_tokens - max_context_tokens,
        document_breakdown: breakdown,
        recommendations,
    })
}

/// Keep only chunks belonging to the selected documents, preserving
/// chunk order. Pure id-based filter for manual user overrides.
pub fn apply_document_selection(
    selected_document_ids: &[String],
    chunks: Vec<ContextChunk>,
) -> Vec<ContextChunk> {
    let selected: HashSet<&str> = selected_document_ids.iter().map(String::as_str).collect();
    chunks
        .into_iter()
        .filter(|c| selected.contains(c.document_id.as_str()))
        .collect()
}

/// Aggregate chunks per document and attach ranking scores, ordered by
/// the context priority ranking (priority ascending, relevance
/// descending, id as the final tie-break).
fn aggregate_by_document(
    documents: &[Document],
    chunks: &[ContextChunk],
    budget: u64,
) -> Vec<DocumentBreakdown> {
    let by_id: HashMap<&str, &Document> = documents.iter().map(|d| (d.id.as_str(), d)).collect();

    struct Agg {
        name: String,
        tokens: u64,
        chunks: usize,
    }

    let mut aggregates: HashMap<&str, Agg> = HashMap::new();
    for chunk in chunks {
        let entry = aggregates
            .entry(chunk.document_id.as_str())
            .or_insert_with(|| Agg {
                name: chunk.document_name.clone(),
                tokens: 0,
                chunks: 0,
            });
        entry.tokens += estimate_tokens(chunk.character_count);
        entry.chunks += 1;
    }

    let mut breakdown: Vec<DocumentBreakdown> = aggregates
        .into_iter()
        .map(|(doc_id, agg)| {
            // A chunk whose document is missing from the listing sorts
            // last and scores zero relevance.
            let (priority, relevance) = match by_id.get(doc_id) {
                Some(doc) => (prioritize::composite_priority(doc), prioritize::relevance_score(doc)),
                None => (i64::MAX, 0),
            };
            DocumentBreakdown {
                document_id: doc_id.to_string(),
                document_name: agg.name,
                token_count: agg.tokens,
                chunk_count: agg.chunks,
                priority_score: priority,
                relevance_score: relevance,
                oversized: agg.tokens > budget,
            }
        })
        .collect();

    breakdown.sort_by(|a, b| {
        a.priority_score
            .cmp(&b.priority_score)
            .then(b.relevance_score.cmp(&a.relevance_score))
            .then(a.document_id.cmp(&b.document_id))
    });

    breakdown
}

/// Greedy selection over the ranked breakdown: accept each document
/// while the running total stays inside the budget.
fn select_greedy(
    breakdown: &[DocumentBreakdown],
    current_tokens: u64,
    budget: u64,
) -> SelectionRecommendation {
    let mut suggested: Vec<DocumentBreakdown> = Vec::new();
    let mut removed: Vec<RemovedDocument> = Vec::new();
    let mut running: u64 = 0;

    for doc in breakdown {
        if running + doc.token_count <= budget {
            running += doc.token_count;
            suggested.push(doc.clone());
        } else {
            removed.push(RemovedDocument {
                document_id: doc.document_id.clone(),
                document_name: doc.document_name.clone(),
                token_count: doc.token_count,
                reason: format!(
                    "{} tokens exceed the remaining context budget ({} of {} left)",
                    doc.token_count,
                    budget - running,
                    budget
                ),
            });
        }
    }

    // Nothing fits: keep the top-ranked document anyway and surface the
    // overrun rather than recommending an empty context.
    if suggested.is_empty() {
        if let Some(top) = breakdown.first() {
            removed.retain(|r| r.document_id != top.document_id);
            running = top.token_count;
            suggested.push(top.clone());
        }
    }

    let tokens_saved = current_tokens.saturating_sub(running);
    let summary = format!(
        "{}/{} documents recommended",
        suggested.len(),
        breakdown.len()
    );

    SelectionRecommendation {
        suggested_documents: suggested,
        removed_documents: removed,
        tokens_saved,
        summary,
    }
}
