//! Paragraph-boundary chunk builder.
//!
//! Splits extracted plaintext into one chunk per paragraph (blank-line
//! boundaries), dropping whitespace-only paragraphs. Each chunk gets a
//! sequential index, word/character counts, a section classification
//! from an ordered keyword rule list (first match wins), and provenance
//! metadata from its source document.
//!
//! Chunking is deterministic: identical input text always yields an
//! identical chunk sequence, ids included. Chunk ids are UUID v5 values
//! derived from `(document id, chunk index)`.

use uuid::Uuid;

use crate::models::{ChunkMetadata, ContextChunk, Document, SectionType};

/// Ordered section classification rules. The first rule whose keyword
/// list matches the chunk text (case-insensitive) wins.
const SECTION_RULES: &[(SectionType, &[&str])] = &[
    (
        SectionType::ExecutiveSummary,
        &["executive summary", "overview", "abstract"],
    ),
    (
        SectionType::Technical,
        &["technical approach", "architecture", "methodology", "solution"],
    ),
    (
        SectionType::Management,
        &["management plan", "staffing", "organizational", "schedule"],
    ),
    (
        SectionType::Requirements,
        &["shall ", "requirement", "compliance", "deliverable"],
    ),
    (
        SectionType::Experience,
        &["past performance", "case study", "experience", "qualification"],
    ),
];

/// Classify a paragraph by the ordered keyword rules.
pub fn classify_section(text: &str) -> SectionType {
    let lower = text.to_lowercase();
    for (section, keywords) in SECTION_RULES {
        if keywords.iter().any(|k| lower.contains(k)) {
            return *section;
        }
    }
    SectionType::General
}

/// Split text on blank-line boundaries, dropping whitespace-only
/// paragraphs. A line containing only spaces or tabs counts as blank.
fn split_paragraphs(text: &str) -> Vec<String> {
    let mut paragraphs = Vec::new();
    let mut current = String::new();

    for line in text.lines() {
        if line.trim().is_empty() {
            if !current.trim().is_empty() {
                paragraphs.push(current.trim().to_string());
            }
            current.clear();
        } else {
            if !current.is_empty() {
                current.push('\n');
            }
            current.push_str(line);
        }
    }
    if !current.trim().is_empty() {
        paragraphs.push(current.trim().to_string());
    }

    paragraphs
}

/// Build the ordered chunk sequence for one document's extracted text.
pub fn chunk_document(doc: &Document, text: &str) -> Vec<ContextChunk> {
    let metadata = ChunkMetadata {
        category: doc.category,
        project: doc.project.clone(),
        uploaded_at: doc.created_at,
    };

    split_paragraphs(text)
        .into_iter()
        .enumerate()
        .map(|(index, content)| {
            let index = index as i64;
            ContextChunk {
                id: chunk_id(&doc.id, index),
                document_id: doc.id.clone(),
                document_name: doc.name.clone(),
                word_count: content.split_whitespace().count(),
                character_count: content.chars().count(),
                section_type: classify_section(&content),
                chunk_index: index,
                metadata: metadata.clone(),
                content,
            }
        })
        .collect()
}

/// Deterministic chunk id: UUID v5 of `{document_id}:{index}`.
fn chunk_id(document_id: &str, index: i64) -> String {
    Uuid::new_v5(
        &Uuid::NAMESPACE_OID,
        format!("{}:{}", document_id, index).as_bytes(),
    )
    .to_string()
}
