//! Persistence sinks: where mapped rows end up.
//!
//! [`ExpenseSink`] is the whole contract the pipeline relies on: append one
//! row, read every row back. [`sheets::GoogleSheetsSink`] is the real
//! destination; [`MemorySink`] keeps rows in a `Vec` for tests and dry runs.
//!
//! Sinks do no retrying, batching or conflict resolution. Appends from one
//! process are serialised by [`crate::scan::ReceiptScanner`]; concurrent
//! writers in different processes get whatever order the backend applies.

pub mod sheets;

use crate::error::PersistenceError;
use crate::record::OutputRow;
use async_trait::async_trait;
use std::sync::Mutex;
use tracing::debug;

/// A row-oriented store.
#[async_trait]
pub trait ExpenseSink: Send + Sync {
    /// Human-readable destination, for logs and messages.
    fn describe(&self) -> String;

    /// Append `row` after the last existing row.
    async fn append_row(&self, row: &OutputRow) -> Result<(), PersistenceError>;

    /// Every stored row, oldest first.
    async fn read_all_rows(&self) -> Result<Vec<OutputRow>, PersistenceError>;
}

/// In-process sink. Optionally fails every append, to exercise error paths.
#[derive(Debug, Default)]
pub struct MemorySink {
    rows: Mutex<Vec<OutputRow>>,
    fail_with: Option<String>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sink that already holds `rows`.
    pub fn with_rows(rows: Vec<OutputRow>) -> Self {
        Self {
            rows: Mutex::new(rows),
            fail_with: None,
        }
    }

    /// A sink whose appends always fail with `reason`.
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            rows: Mutex::default(),
            fail_with: Some(reason.into()),
        }
    }

    /// Snapshot of the stored rows.
    pub fn rows(&self) -> Vec<OutputRow> {
        self.rows.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ExpenseSink for MemorySink {
    fn describe(&self) -> String {
        "memory".to_string()
    }

    async fn append_row(&self, row: &OutputRow) -> Result<(), PersistenceError> {
        if let Some(reason) = &self.fail_with {
            return Err(PersistenceError::Rejected(reason.clone()));
        }
        let mut rows = self
            .rows
            .lock()
            .map_err(|_| PersistenceError::Malformed("memory sink poisoned".into()))?;
        rows.push(row.clone());
        debug!("Memory sink now holds {} rows", rows.len());
        Ok(())
    }

    async fn read_all_rows(&self) -> Result<Vec<OutputRow>, PersistenceError> {
        self.rows
            .lock()
            .map(|r| r.clone())
            .map_err(|_| PersistenceError::Malformed("memory sink poisoned".into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::CellValue;

    fn row(merchant: &str, amount: f64) -> OutputRow {
        OutputRow(vec![
            CellValue::Text("2024-03-01".into()),
            CellValue::Text(merchant.into()),
            CellValue::Number(amount),
        ])
    }

    #[test]
    fn append_then_read_returns_row_last() {
        let sink = MemorySink::with_rows(vec![row("Oxxo", 35.0)]);
        tokio_test::block_on(async {
            sink.append_row(&row("Cafe X", 12.5)).await.unwrap();
            let rows = sink.read_all_rows().await.unwrap();
            assert_eq!(rows.len(), 2);
            assert_eq!(rows.last(), Some(&row("Cafe X", 12.5)));
        });
    }

    #[tokio::test]
    async fn failing_sink_stores_nothing() {
        let sink = MemorySink::failing("quota");
        let err = sink.append_row(&row("Oxxo", 1.0)).await.unwrap_err();
        assert!(err.to_string().contains("quota"));
        assert!(sink.rows().is_empty());
    }
}
