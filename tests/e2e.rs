//! End-to-end tests for edgequake-receipts.
//!
//! These tests read real receipt photos from `./test_cases/` with a live
//! vision model and, when a sheet is configured, append to a real Google
//! Sheet. They are gated behind the `E2E_ENABLED` environment variable so
//! they do not run in CI unless explicitly requested.
//!
//! Run with:
//!   E2E_ENABLED=1 GEMINI_API_KEY=... cargo test --test e2e -- --nocapture
//!
//! Use another photo:
//!   E2E_RECEIPT=/path/to/ticket.jpg E2E_ENABLED=1 cargo test --test e2e

use edgequake_receipts::{
    Category, ColumnLayout, GoogleSheetsSink, MemorySink, ReceiptScanner, ScanConfig,
    SheetsConfig,
};
use std::path::PathBuf;
use std::sync::Arc;

// ── Test helpers ─────────────────────────────────────────────────────────────

fn receipt_path() -> PathBuf {
    std::env::var("E2E_RECEIPT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_cases/receipt.jpg"))
}

/// Skip this test if E2E_ENABLED is not set *or* no photo at `path`.
macro_rules! e2e_skip_unless_ready {
    ($path:expr) => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
        let p: PathBuf = $path;
        if !p.exists() {
            println!("SKIP — receipt photo not found: {}", p.display());
            println!("       Set E2E_RECEIPT or add test_cases/receipt.jpg");
            return;
        }
        p.to_string_lossy().into_owned()
    }};
}

fn sheets_from_env() -> Option<SheetsConfig> {
    let id = std::env::var("RECEIPTS_SPREADSHEET_ID").ok()?;
    let token = std::env::var("GOOGLE_SHEETS_TOKEN").ok()?;
    let worksheet =
        std::env::var("RECEIPTS_WORKSHEET").unwrap_or_else(|_| "Transacciones".to_string());
    Some(SheetsConfig::new(id, token).worksheet(worksheet))
}

// ── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_scan_real_receipt() {
    let input = e2e_skip_unless_ready!(receipt_path());

    let scanner = ReceiptScanner::from_config(ScanConfig::default(), Arc::new(MemorySink::new()))
        .expect("provider configured");
    let outcome = scanner.scan(&input).await.expect("scan succeeds");
    let r = &outcome.record;

    println!("{:#?}", r);
    println!(
        "{} tokens in / {} tokens out / {}ms",
        outcome.extraction.input_tokens, outcome.extraction.output_tokens, outcome.duration_ms
    );

    assert!(
        chrono::NaiveDate::parse_from_str(&r.date, "%Y-%m-%d").is_ok(),
        "date should be YYYY-MM-DD, got {:?}",
        r.date
    );
    assert!(r.amount > 0.0, "a real receipt should have a total");
    assert!(!r.currency.is_empty());
    assert!(
        Category::parse(&r.category).is_some(),
        "category outside the fixed set: {}",
        r.category
    );
}

#[tokio::test]
async fn test_add_to_real_sheet() {
    let input = e2e_skip_unless_ready!(receipt_path());
    let Some(sheets) = sheets_from_env() else {
        println!("SKIP — set RECEIPTS_SPREADSHEET_ID and GOOGLE_SHEETS_TOKEN");
        return;
    };

    let sink = Arc::new(GoogleSheetsSink::new(sheets).expect("valid sheet config"));
    let config = ScanConfig::builder()
        .column_layout(ColumnLayout::timestamped())
        .build()
        .unwrap();
    let scanner = ReceiptScanner::from_config(config, sink).expect("provider configured");

    let saved = scanner.process(&input).await.expect("receipt saved");
    println!("Saved to {}: {:?}", saved.destination, saved.row);

    let rows = scanner.history().await.expect("sheet readable");
    assert_eq!(
        rows.last(),
        Some(&saved.row),
        "last row of the sheet should be the one just appended"
    );
}
