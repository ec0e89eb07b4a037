//! Document-source collaborator trait.
//!
//! Listing and text extraction are owned by the embedding application
//! (file stores, parsers). The engine consumes them through this seam
//! so builds stay independent of any concrete storage or parser.

use anyhow::Result;
use async_trait::async_trait;

use crate::models::Document;

/// External provider of documents and their extracted text.
///
/// `extract_text` may fail per document; the build records the failure
/// and continues with the remaining documents.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    /// List the active documents for a (project, documentType) pair.
    async fn list_active_documents(
        &self,
        project: &str,
        document_type: &str,
    ) -> Result<Vec<Document>>;

    /// Extract plaintext from a single document.
    async fn extract_text(&self, document: &Document) -> Result<String>;
}
