//! Synthetic distribution service serving per-entity document streams.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine};
use chrono::NaiveDate;
use dashmap::DashMap;
use flate2::{write::GzEncoder, Compression};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use docsync::client::{DistributionQuery, DistributionRequest, DistributionTransport, RawDocument, RawPage};
use docsync::constants::status_codes;
use docsync::error::{FetchError, FetchErrorKind};
use docsync::store::Credential;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntheticDoc {
    pub cursor: u64,
    pub access_key: String,
    pub business_date: Option<NaiveDate>,
}

impl SyntheticDoc {
    pub fn new(cursor: u64, business_date: Option<NaiveDate>) -> Self {
        Self {
            cursor,
            access_key: access_key_for(cursor),
            business_date,
        }
    }

    fn to_raw(&self) -> RawDocument {
        let date = self
            .business_date
            .map(|d| format!("<dhEmi>{}T10:00:00-03:00</dhEmi>", d.format("%Y-%m-%d")))
            .unwrap_or_default();
        let xml = format!(
            "<resNFe><chNFe>{}</chNFe>{date}<vNF>100.00</vNF></resNFe>",
            self.access_key
        );
        RawDocument {
            cursor: self.cursor,
            schema: Some("resNFe_v1.01.xsd".to_string()),
            access_key: None,
            compressed_payload: gzip_base64(&xml),
            business_date: None,
        }
    }
}

pub fn access_key_for(cursor: u64) -> String {
    format!("352401{cursor:038}")
}

pub fn gzip_base64(text: &str) -> String {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(text.as_bytes()).unwrap();
    STANDARD.encode(encoder.finish().unwrap())
}

/// Documents at the given cursors, all sharing one business date
pub fn docs_at(cursors: impl IntoIterator<Item = u64>, date: Option<NaiveDate>) -> Vec<SyntheticDoc> {
    cursors
        .into_iter()
        .map(|cursor| SyntheticDoc::new(cursor, date))
        .collect()
}

pub struct SyntheticDistribution {
    page_size: usize,
    streams: DashMap<String, Vec<SyntheticDoc>>,
    queued_faults: Mutex<HashMap<String, VecDeque<FetchError>>>,
    fail_from_call: DashMap<String, (usize, FetchErrorKind)>,
    calls: DashMap<String, usize>,
    total_calls: AtomicUsize,
    stall: AtomicBool,
}

impl SyntheticDistribution {
    pub fn new(page_size: usize) -> Self {
        Self {
            page_size: page_size.max(1),
            streams: DashMap::new(),
            queued_faults: Mutex::new(HashMap::new()),
            fail_from_call: DashMap::new(),
            calls: DashMap::new(),
            total_calls: AtomicUsize::new(0),
            stall: AtomicBool::new(false),
        }
    }

    pub fn publish(&self, identity_key: &str, docs: Vec<SyntheticDoc>) {
        let mut stream = self.streams.entry(identity_key.to_string()).or_default();
        stream.extend(docs);
        stream.sort_by_key(|d| d.cursor);
        stream.dedup_by_key(|d| d.cursor);
    }

    /// Answer the next `send` for this key with an error
    pub fn queue_fault(&self, identity_key: &str, error: FetchError) {
        self.queued_faults
            .lock()
            .entry(identity_key.to_string())
            .or_default()
            .push_back(error);
    }

    /// Fail every call for this key from the `call`-th on (1-based)
    pub fn fail_from_call(&self, identity_key: &str, call: usize, kind: FetchErrorKind) {
        self.fail_from_call
            .insert(identity_key.to_string(), (call, kind));
    }

    pub fn clear_faults(&self) {
        self.queued_faults.lock().clear();
        self.fail_from_call.clear();
    }

    /// Report pages whose last cursor equals the requested cursor
    pub fn set_stall(&self, stall: bool) {
        self.stall.store(stall, Ordering::SeqCst);
    }

    pub fn calls_for(&self, identity_key: &str) -> usize {
        self.calls.get(identity_key).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn page_after(&self, identity_key: &str, cursor: u64) -> RawPage {
        let stream = self
            .streams
            .get(identity_key)
            .map(|s| s.value().clone())
            .unwrap_or_default();
        let max_cursor = stream.last().map_or(0, |d| d.cursor).max(cursor);
        let documents: Vec<RawDocument> = stream
            .iter()
            .filter(|d| d.cursor > cursor)
            .take(self.page_size)
            .map(SyntheticDoc::to_raw)
            .collect();

        if documents.is_empty() {
            return RawPage {
                status_code: status_codes::NO_DOCUMENTS,
                status_message: "Nenhum documento localizado".to_string(),
                documents,
                last_cursor: max_cursor,
                max_cursor,
            };
        }

        let last_cursor = if self.stall.load(Ordering::SeqCst) {
            cursor
        } else {
            documents.last().map_or(cursor, |d| d.cursor)
        };
        RawPage {
            status_code: status_codes::DOCUMENTS_FOUND,
            status_message: "Documento(s) localizado(s)".to_string(),
            documents,
            last_cursor,
            max_cursor,
        }
    }

    fn by_access_key(&self, identity_key: &str, access_key: &str) -> RawPage {
        let found = self
            .streams
            .get(identity_key)
            .and_then(|s| s.iter().find(|d| d.access_key == access_key).cloned());
        match found {
            Some(doc) => RawPage {
                status_code: status_codes::DOCUMENTS_FOUND,
                status_message: "Documento localizado".to_string(),
                documents: vec![doc.to_raw()],
                last_cursor: 0,
                max_cursor: 0,
            },
            None => RawPage {
                status_code: status_codes::NO_DOCUMENTS,
                status_message: "Nenhum documento localizado".to_string(),
                documents: Vec::new(),
                last_cursor: 0,
                max_cursor: 0,
            },
        }
    }
}

#[async_trait]
impl DistributionTransport for SyntheticDistribution {
    async fn send(
        &self,
        _credential: &Credential,
        request: &DistributionRequest,
    ) -> Result<RawPage, FetchError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        let call = {
            let mut count = self.calls.entry(request.identity_key.clone()).or_insert(0);
            *count += 1;
            *count
        };

        let queued = self
            .queued_faults
            .lock()
            .get_mut(&request.identity_key)
            .and_then(VecDeque::pop_front);
        if let Some(error) = queued {
            return Err(error);
        }
        if let Some(fault) = self.fail_from_call.get(&request.identity_key) {
            let (from, kind) = *fault.value();
            if call >= from {
                return Err(FetchError::new(kind, "injected failure"));
            }
        }

        Ok(match &request.query {
            DistributionQuery::ByCursor(cursor) => self.page_after(&request.identity_key, *cursor),
            DistributionQuery::ByAccessKey(key) => self.by_access_key(&request.identity_key, key),
        })
    }
}
