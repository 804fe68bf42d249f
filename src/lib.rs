//! # edgequake-receipts
//!
//! Turn a photo of a purchase receipt into a row in an expense spreadsheet
//! using a Vision Language Model.
//!
//! ## Pipeline Overview
//!
//! ```text
//! receipt photo
//!  │
//!  ├─ 1. Image      decode JPEG/PNG, cap size, base64 PNG
//!  ├─ 2. Prompt     fixed instruction + JSON schema
//!  ├─ 3. VLM        one call to gemini / gpt-4.1 / claude / …
//!  ├─ 4. Normalise  strip fences, parse JSON, default missing fields
//!  ├─ 5. Map        record → row in the sheet's column order
//!  └─ 6. Append     Google Sheets (or any ExpenseSink)
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_receipts::{GoogleSheetsSink, ReceiptScanner, ScanConfig, SheetsConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from GEMINI_API_KEY / OPENAI_API_KEY / …
//!     let config = ScanConfig::default();
//!     let sink = GoogleSheetsSink::new(SheetsConfig::new("1AbC…", "ya29.…"))?;
//!     let scanner = ReceiptScanner::from_config(config, Arc::new(sink))?;
//!
//!     let outcome = scanner.scan("ticket.jpg").await?;
//!     println!("{} {} {}", outcome.record.merchant, outcome.record.amount, outcome.record.currency);
//!     scanner.save(&outcome.record).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `receipt2sheet` binary (clap + anyhow + tracing-subscriber) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod pipeline;
pub mod prompts;
pub mod record;
pub mod scan;
pub mod sink;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{CategoryPolicy, FieldSet, ScanConfig, ScanConfigBuilder, SheetsConfig};
pub use error::{ExtractionError, PersistenceError, ReceiptError};
pub use pipeline::llm::{CannedExtractionClient, ExtractionClient, LlmExtractionClient};
pub use pipeline::mapper::{to_row, Column, ColumnLayout};
pub use pipeline::normalize::{normalize, NormalizeOptions};
pub use record::{CellValue, Category, ExpenseRecord, OutputRow};
pub use scan::{export_record, ReceiptScanner, SavedReceipt, ScanOutcome};
pub use sink::sheets::GoogleSheetsSink;
pub use sink::{ExpenseSink, MemorySink};
