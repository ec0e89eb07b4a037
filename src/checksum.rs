//! Document-set fingerprinting for cache staleness detection.
//!
//! A fingerprint is the SHA-256 of a canonical serialization of the
//! document set's descriptors. Descriptors are sorted by id before
//! hashing, so the fingerprint depends only on the set itself, never on
//! the order a store query happened to return it in.
//!
//! This is staleness detection, not security: collisions are treated as
//! impossible in practice, and no key material is involved.

use sha2::{Digest, Sha256};

use crate::models::Document;

/// The fields of a document that participate in the fingerprint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentDescriptor {
    pub id: String,
    pub filename: String,
    /// Unix timestamp of the last modification (falls back to creation).
    pub timestamp: i64,
    pub size: u64,
}

impl From<&Document> for DocumentDescriptor {
    fn from(doc: &Document) -> Self {
        Self {
            id: doc.id.clone(),
            filename: doc.name.clone(),
            timestamp: doc.stamp().timestamp(),
            size: doc.size,
        }
    }
}

/// Compute the fingerprint of a document set.
///
/// Same set → same fingerprint. Any add, remove, rename, resize, or
/// timestamp change → a different fingerprint with overwhelming
/// probability.
pub fn fingerprint(descriptors: &[DocumentDescriptor]) -> String {
    let mut sorted: Vec<&DocumentDescriptor> = descriptors.iter().collect();
    sorted.sort_by(|a, b| a.id.cmp(&b.id));

    let mut hasher = Sha256::new();
    for d in sorted {
        hasher.update(d.id.as_bytes());
        hasher.update(b"|");
        hasher.update(d.filename.as_bytes());
        hasher.update(b"|");
        hasher.update(d.timestamp.to_le_bytes());
        hasher.update(b"|");
        hasher.update(d.size.to_le_bytes());
        hasher.update(b"\n");
    }
    format!("{:x}", hasher.finalize())
}

/// Fingerprint a document slice directly.
pub fn fingerprint_documents(docs: &[Document]) -> String {
    let descriptors: Vec<DocumentDescriptor> = docs.iter().map(DocumentDescriptor::from).collect();
    fingerprint(&descriptors)
}
