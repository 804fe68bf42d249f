//! Error types for the edgequake-receipts library.
//!
//! Three error types mirror the three parties involved in a scan:
//!
//! * [`ExtractionError`] — the vision model could not be reached, refused the
//!   request, or timed out. Produced by [`crate::pipeline::llm`].
//!
//! * [`PersistenceError`] — the spreadsheet (or the local export file) could
//!   not be written or read. Produced by [`crate::sink`].
//!
//! * [`ReceiptError`] — **Fatal** for the current scan. Every public entry
//!   point returns it; the two collaborator errors above are wrapped inside.
//!
//! Nothing is retried. Every error ends the invocation and the user decides
//! whether to try again.

use crate::record::ExpenseRecord;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the edgequake-receipts library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// Input file was not found at the given path.
    #[error("Receipt image not found: '{path}'\nCheck the path exists and is readable.")]
    InputNotFound { path: PathBuf },

    /// HTTP URL was syntactically valid but download failed.
    #[error("Failed to download '{url}': {reason}")]
    DownloadFailed { url: String, reason: String },

    /// The bytes are not a JPEG or PNG image.
    #[error("Unsupported image format ({detail}); upload a JPEG or PNG photo")]
    UnsupportedImage { detail: String },

    /// The bytes claim to be an image but could not be decoded.
    #[error("Could not decode receipt image: {0}")]
    ImageDecode(String),

    // ── Extraction errors ─────────────────────────────────────────────────
    /// The vision model call failed; no record was produced.
    #[error(transparent)]
    Extraction(#[from] ExtractionError),

    // ── Normalisation errors ──────────────────────────────────────────────
    /// The model answer is not a JSON object once fences are removed.
    #[error("Model response is not a JSON object: {detail}\nRaw response:\n{raw}")]
    Parse { detail: String, raw: String },

    /// A field is present but has the wrong shape (e.g. `"total": "abc"`).
    #[error("Field '{field}' has unusable value {value}: {reason}")]
    FieldCoercion {
        field: &'static str,
        value: String,
        reason: String,
    },

    // ── Mapping errors ────────────────────────────────────────────────────
    /// A column layout names a field that `ExpenseRecord` does not have.
    #[error("Unknown column '{name}' in layout (known: {known})")]
    UnknownColumn { name: String, known: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The record was extracted but could not be stored.
    ///
    /// The record travels with the error so it can be shown to the user and
    /// exported with [`crate::scan::export_record`].
    #[error("Receipt was read but not saved: {source}")]
    NotSaved {
        record: Box<ExpenseRecord>,
        #[source]
        source: PersistenceError,
    },

    /// A spreadsheet read failed outside of a save.
    #[error(transparent)]
    Persistence(PersistenceError),

    /// Could not write the manual export file.
    #[error("Failed to export record to '{path}': {source}")]
    ExportFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Failure talking to the vision model.
#[derive(Debug, Clone, Error)]
pub enum ExtractionError {
    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    NotConfigured { provider: String, hint: String },

    /// The provider rejected the request or could not be reached.
    #[error("LLM provider error: {message}")]
    Provider { message: String },

    /// The call did not finish within `api_timeout_secs`.
    #[error("LLM call timed out after {secs}s")]
    Timeout { secs: u64 },
}

/// Failure talking to the spreadsheet.
#[derive(Debug, Error)]
pub enum PersistenceError {
    /// Request never reached the spreadsheet API.
    #[error("Spreadsheet request failed: {0}")]
    Transport(String),

    /// The API answered with a non-success status.
    #[error("Spreadsheet API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    /// The API answered 2xx but the body could not be understood.
    #[error("Unexpected spreadsheet response: {0}")]
    Malformed(String),

    /// The sink refused the row before sending it.
    #[error("Row rejected: {0}")]
    Rejected(String),
}

impl From<reqwest::Error> for PersistenceError {
    fn from(e: reqwest::Error) -> Self {
        PersistenceError::Transport(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_error_includes_raw_response() {
        let e = ReceiptError::Parse {
            detail: "expected value at line 1 column 1".into(),
            raw: "Lo siento, no puedo leer el recibo".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("Lo siento"), "got: {msg}");
        assert!(msg.contains("line 1"));
    }

    #[test]
    fn field_coercion_display() {
        let e = ReceiptError::FieldCoercion {
            field: "total",
            value: "\"abc\"".into(),
            reason: "not a number".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("total"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn extraction_error_is_transparent() {
        let e: ReceiptError = ExtractionError::Timeout { secs: 60 }.into();
        assert_eq!(e.to_string(), "LLM call timed out after 60s");
    }

    #[test]
    fn not_saved_keeps_record() {
        let record = ExpenseRecord {
            merchant: "Oxxo".into(),
            amount: 42.0,
            ..ExpenseRecord::empty_on("2024-05-01")
        };
        let e = ReceiptError::NotSaved {
            record: Box::new(record),
            source: PersistenceError::Status {
                status: 403,
                body: "PERMISSION_DENIED".into(),
            },
        };
        assert!(e.to_string().contains("403"));
        match e {
            ReceiptError::NotSaved { record, .. } => assert_eq!(record.merchant, "Oxxo"),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
