use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::error::{SyncError, SyncResult};

/// Persisted cursor position of one entity's document stream.
///
/// `last_seen_cursor` is the watermark: every document below it has been
/// fetched. It never decreases.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CursorState {
    pub last_seen_cursor: u64,
    pub max_known_cursor: u64,
}

impl CursorState {
    pub fn new(last_seen_cursor: u64, max_known_cursor: u64) -> Self {
        Self {
            last_seen_cursor,
            max_known_cursor: max_known_cursor.max(last_seen_cursor),
        }
    }

    /// Merge a newer observation without ever moving backwards
    pub fn advance(&self, cursor: u64, max_cursor: u64) -> Self {
        let last_seen_cursor = self.last_seen_cursor.max(cursor);
        Self {
            last_seen_cursor,
            max_known_cursor: self.max_known_cursor.max(max_cursor).max(last_seen_cursor),
        }
    }
}

/// Inclusive bounds on a document's business date
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeriodFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
}

impl PeriodFilter {
    pub fn new(start_date: Option<NaiveDate>, end_date: Option<NaiveDate>) -> SyncResult<Self> {
        if let (Some(start), Some(end)) = (start_date, end_date) {
            if start > end {
                return Err(SyncError::InvalidInput(format!(
                    "period start {start} is after end {end}"
                )));
            }
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn between(start: NaiveDate, end: NaiveDate) -> SyncResult<Self> {
        Self::new(Some(start), Some(end))
    }

    /// Whether a document with this business date is kept. Undated documents
    /// are always kept.
    pub fn contains(&self, date: Option<NaiveDate>) -> bool {
        let Some(date) = date else {
            return true;
        };
        self.start_date.map_or(true, |start| date >= start)
            && self.end_date.map_or(true, |end| date <= end)
    }

    /// Whether the date lies strictly after the end bound
    pub fn is_after_end(&self, date: NaiveDate) -> bool {
        self.end_date.is_some_and(|end| date > end)
    }
}

/// How an entity synchronization chooses its range and treats its record
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "mode", content = "period")]
pub enum SyncMode {
    /// Incremental run from the watermark; empty runs leave no record behind
    #[default]
    NewDocumentsOnly,
    /// Operator-triggered run from the watermark; the record is always kept
    Manual,
    /// Period-bounded run starting near the period start
    Period(PeriodFilter),
}

impl SyncMode {
    pub fn period_filter(&self) -> Option<&PeriodFilter> {
        match self {
            SyncMode::Period(filter) => Some(filter),
            _ => None,
        }
    }

    /// Watermark-driven modes scan every document, so they may commit the cursor
    pub fn advances_watermark(&self) -> bool {
        !matches!(self, SyncMode::Period(_))
    }

    pub fn discards_empty_runs(&self) -> bool {
        matches!(self, SyncMode::NewDocumentsOnly)
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncMode::NewDocumentsOnly => "new_documents_only",
            SyncMode::Manual => "manual",
            SyncMode::Period(_) => "period",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_cursor_state_never_decreases() {
        let state = CursorState::new(100, 250);
        let advanced = state.advance(80, 200);
        assert_eq!(advanced.last_seen_cursor, 100);
        assert_eq!(advanced.max_known_cursor, 250);

        let advanced = state.advance(300, 290);
        assert_eq!(advanced.last_seen_cursor, 300);
        assert_eq!(advanced.max_known_cursor, 300);
    }

    #[test]
    fn test_period_filter_bounds_are_inclusive() {
        let filter = PeriodFilter::between(date(2024, 1, 1), date(2024, 1, 31)).unwrap();
        assert!(filter.contains(Some(date(2024, 1, 1))));
        assert!(filter.contains(Some(date(2024, 1, 31))));
        assert!(!filter.contains(Some(date(2024, 2, 1))));
        assert!(!filter.contains(Some(date(2023, 12, 31))));
        assert!(filter.contains(None));
        assert!(filter.is_after_end(date(2024, 2, 1)));
        assert!(!filter.is_after_end(date(2024, 1, 31)));
    }

    #[test]
    fn test_period_filter_rejects_inverted_range() {
        assert!(PeriodFilter::between(date(2024, 2, 1), date(2024, 1, 1)).is_err());
    }

    #[test]
    fn test_sync_mode_policies() {
        assert!(SyncMode::NewDocumentsOnly.discards_empty_runs());
        assert!(!SyncMode::Manual.discards_empty_runs());
        let period = SyncMode::Period(PeriodFilter::default());
        assert!(!period.advances_watermark());
        assert!(period.period_filter().is_some());
    }
}
