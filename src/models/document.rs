use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// One decoded document returned by a page fetch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchedDocument {
    pub cursor: u64,
    pub access_key: String,
    /// Schema identifier reported by the service (e.g. `procNFe_v4.00.xsd`)
    pub schema: Option<String>,
    /// Decompressed, text-decoded payload
    pub raw_payload: String,
    pub business_date: Option<NaiveDate>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageStatus {
    NoDocuments,
    DocumentsFound,
}

/// Result of one page fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub status: PageStatus,
    pub status_code: u16,
    pub documents: Vec<FetchedDocument>,
    pub new_cursor: u64,
    pub max_cursor: u64,
    /// Documents the remote returned, including ones that failed to decode
    pub raw_document_count: usize,
    pub skipped_documents: usize,
    /// Attempts answered with a rate-limit signal before this page succeeded
    pub rate_limit_hits: u32,
}

impl Page {
    pub fn has_documents(&self) -> bool {
        self.status == PageStatus::DocumentsFound && self.raw_document_count > 0
    }
}
