//! Document prioritization: ranking for context ordering plus a
//! 0–100 relevance score used in overflow reporting.
//!
//! All heuristics live in const rule tables rather than inline
//! conditionals so each table is unit-testable on its own and tuning a
//! weight never touches control flow.

use chrono::Utc;

use crate::models::{Document, DocumentCategory, DocumentStatus};

/// Fixed category ranking: lower sorts first.
const CATEGORY_PRIORITY: &[(DocumentCategory, u8)] = &[
    (DocumentCategory::Solicitations, 1),
    (DocumentCategory::Requirements, 2),
    (DocumentCategory::References, 3),
    (DocumentCategory::PastPerformance, 4),
    (DocumentCategory::Proposals, 5),
    (DocumentCategory::Compliance, 6),
    (DocumentCategory::Media, 7),
    (DocumentCategory::Unknown, 8),
];

/// Keyword deltas applied to the priority score when the keyword occurs
/// in the filename or description (case-insensitive). Negative deltas
/// pull a document forward; positive ones push it back.
const KEYWORD_RULES: &[(&str, i64)] = &[
    ("solicitation", -15),
    ("rfp", -15),
    ("statement of work", -12),
    ("sow", -10),
    ("requirement", -10),
    ("evaluation criteria", -8),
    ("compliance", -6),
    ("final", -5),
    ("approved", -5),
    ("draft", 5),
    ("temp", 8),
    ("old", 8),
    ("archive", 10),
];

/// Documents outside this byte range are treated as size outliers:
/// likely either stub files or raw media dumps.
const SIZE_NORMAL_MIN: u64 = 64;
const SIZE_NORMAL_MAX: u64 = 20 * 1024 * 1024;
const SIZE_OUTLIER_PENALTY: i64 = 10;

/// Position of a category in the fixed priority table.
pub fn category_priority(category: DocumentCategory) -> u8 {
    CATEGORY_PRIORITY
        .iter()
        .find(|(c, _)| *c == category)
        .map(|(_, p)| *p)
        .unwrap_or(u8::MAX)
}

/// Keyword/size heuristic score. Lower sorts first.
pub fn priority_score(doc: &Document) -> i64 {
    let haystack = match &doc.description {
        Some(desc) => format!("{} {}", doc.name, desc).to_lowercase(),
        None => doc.name.to_lowercase(),
    };

    let mut score: i64 = 0;
    for (keyword, delta) in KEYWORD_RULES {
        if haystack.contains(keyword) {
            score += delta;
        }
    }

    if doc.size < SIZE_NORMAL_MIN || doc.size > SIZE_NORMAL_MAX {
        score += SIZE_OUTLIER_PENALTY;
    }

    score
}

/// Sort documents into context order by the stable composite key:
/// active first, category priority ascending, heuristic score
/// ascending, newest first as the final tie-break.
pub fn rank(docs: &mut [Document]) {
    docs.sort_by(|a, b| {
        let a_archived = a.status != DocumentStatus::Active;
        let b_archived = b.status != DocumentStatus::Active;
        a_archived
            .cmp(&b_archived)
            .then(category_priority(a.category).cmp(&category_priority(b.category)))
            .then(priority_score(a).cmp(&priority_score(b)))
            .then(b.created_at.cmp(&a.created_at))
    });
}

/// Scalar form of the [`rank`] ordering, for consumers that need one
/// comparable number per document (overflow analysis). Category bands
/// dominate, keyword/size deltas order within a band. Lower sorts first.
pub fn composite_priority(doc: &Document) -> i64 {
    category_priority(doc.category) as i64 * 1000 + priority_score(doc)
}

/// Relevance score in `[0, 100]`.
///
/// Base 50; +20 for a size in the useful range; +15/+10 for documents
/// newer than 30/90 days; +15 for solicitation or requirements
/// categories; ±10 for final/approved vs draft/temp filenames.
pub fn relevance_score(doc: &Document) -> u8 {
    let mut score: i64 = 50;

    if (100..=5 * 1024 * 1024).contains(&doc.size) {
        score += 20;
    }

    let age_days = (Utc::now() - doc.created_at).num_days();
    if age_days < 30 {
        score += 15;
    } else if age_days < 90 {
        score += 10;
    }

    if matches!(
        doc.category,
        DocumentCategory::Solicitations | DocumentCategory::Requirements
    ) {
        score += 15;
    }

    let name = doc.name.to_lowercase();
    if name.contains("final") || name.contains("approved") {
        score += 10;
    } else if name.contains("draft") || name.contains("temp") {
        score -= 10;
    }

    score.clamp(0, 100) as u8
}
