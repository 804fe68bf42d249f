//! Scan entry points: receipt image → [`ExpenseRecord`] → spreadsheet row.
//!
//! [`ReceiptScanner`] owns the two collaborators (the extraction client and
//! the sink) plus the configuration, all injected at construction. A scan
//! is split in two so a caller can show the record before committing it:
//!
//! ```text
//! scan()  image ─▶ prompt ─▶ model ─▶ normalise      → ScanOutcome
//! save()  record ─▶ row (layout) ─▶ sink.append_row  → SavedReceipt
//! process() = scan() + save()
//! ```
//!
//! Every step runs once. Any error ends the call; nothing is retried.

use crate::config::ScanConfig;
use crate::error::{ExtractionError, ReceiptError};
use crate::pipeline::image::{decode_receipt, load_receipt, ReceiptImage};
use crate::pipeline::llm::{ExtractionClient, ExtractionRequest, ExtractionResult, LlmExtractionClient};
use crate::pipeline::mapper;
use crate::pipeline::normalize::{self, NormalizeOptions};
use crate::prompts::ExtractionPrompt;
use crate::record::{ExpenseRecord, OutputRow};
use crate::sink::ExpenseSink;
use chrono::Local;
use edgequake_llm::{LLMProvider, ProviderFactory};
use image::ImageFormat;
use serde::Serialize;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Result of reading one receipt, before anything is saved.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub record: ExpenseRecord,
    pub extraction: ExtractionResult,
    pub image: ImageSummary,
    pub duration_ms: u64,
}

/// What was sent to the model, for display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ImageSummary {
    pub width: u32,
    pub height: u32,
    #[serde(skip)]
    pub format: ImageFormat,
    pub byte_len: usize,
}

impl From<&ReceiptImage> for ImageSummary {
    fn from(img: &ReceiptImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            format: img.format,
            byte_len: img.byte_len,
        }
    }
}

/// A record that made it into the sink.
#[derive(Debug, Clone, Serialize)]
pub struct SavedReceipt {
    pub record: ExpenseRecord,
    pub row: OutputRow,
    pub destination: String,
}

/// Runs the receipt pipeline against injected collaborators.
pub struct ReceiptScanner {
    config: ScanConfig,
    client: Arc<dyn ExtractionClient>,
    sink: Arc<dyn ExpenseSink>,
    /// Held across each append so one process never interleaves writes.
    append_lock: Mutex<()>,
}

impl ReceiptScanner {
    pub fn new(
        config: ScanConfig,
        client: Arc<dyn ExtractionClient>,
        sink: Arc<dyn ExpenseSink>,
    ) -> Self {
        Self {
            config,
            client,
            sink,
            append_lock: Mutex::new(()),
        }
    }

    /// Build a scanner whose extraction client is the provider resolved from
    /// `config` (see [`resolve_provider`]).
    pub fn from_config(config: ScanConfig, sink: Arc<dyn ExpenseSink>) -> Result<Self, ReceiptError> {
        let provider = resolve_provider(&config)?;
        let client = Arc::new(LlmExtractionClient::new(provider, &config));
        Ok(Self::new(config, client, sink))
    }

    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Destination description from the sink.
    pub fn destination(&self) -> String {
        self.sink.describe()
    }

    /// Read a receipt from a path, `-` (stdin) or URL.
    pub async fn scan(&self, input: &str) -> Result<ScanOutcome, ReceiptError> {
        info!("Scanning receipt: {}", input);
        let img = load_receipt(input, &self.config).await?;
        self.scan_image(img).await
    }

    /// Read a receipt already held in memory (e.g. an upload).
    pub async fn scan_bytes(&self, bytes: Vec<u8>) -> Result<ScanOutcome, ReceiptError> {
        let img = decode_receipt(bytes, self.config.max_image_dimension).await?;
        self.scan_image(img).await
    }

    /// Send a decoded image to the model and normalise its answer.
    pub async fn scan_image(&self, img: ReceiptImage) -> Result<ScanOutcome, ReceiptError> {
        let start = Instant::now();
        let summary = ImageSummary::from(&img);

        // `img` is dropped here; only the encoded copy travels on.
        let encoded = img.encode()?;
        let prompt = ExtractionPrompt::new(self.config.fields, self.config.system_prompt.as_deref());
        let request = ExtractionRequest::new(prompt, encoded);

        let extraction = self.client.extract(&request).await?;
        debug!("Raw model response: {}", extraction.raw_text);

        let record = normalize::normalize(&extraction.raw_text, &NormalizeOptions::from(&self.config))?;

        let duration_ms = start.elapsed().as_millis() as u64;
        info!(
            "Read receipt via {}: {} {} {} in {}ms",
            self.client.name(),
            record.merchant,
            record.amount,
            record.currency,
            duration_ms
        );

        Ok(ScanOutcome {
            record,
            extraction,
            image: summary,
            duration_ms,
        })
    }

    /// Map `record` with the configured layout and append it.
    ///
    /// On failure the record comes back inside [`ReceiptError::NotSaved`].
    pub async fn save(&self, record: &ExpenseRecord) -> Result<SavedReceipt, ReceiptError> {
        let row = mapper::to_row(record, &self.config.column_layout, &Local::now());

        let _guard = self.append_lock.lock().await;
        if let Err(source) = self.sink.append_row(&row).await {
            warn!("Could not save receipt to {}: {}", self.sink.describe(), source);
            return Err(ReceiptError::NotSaved {
                record: Box::new(record.clone()),
                source,
            });
        }

        info!("Saved receipt to {}", self.sink.describe());
        Ok(SavedReceipt {
            record: record.clone(),
            row,
            destination: self.sink.describe(),
        })
    }

    /// [`scan`](Self::scan) followed by [`save`](Self::save).
    pub async fn process(&self, input: &str) -> Result<SavedReceipt, ReceiptError> {
        let outcome = self.scan(input).await?;
        self.save(&outcome.record).await
    }

    /// Every row in the sink, oldest first.
    pub async fn history(&self) -> Result<Vec<OutputRow>, ReceiptError> {
        self.sink
            .read_all_rows()
            .await
            .map_err(ReceiptError::Persistence)
    }
}

/// Write `record` as pretty JSON into `dir` so it can be entered by hand.
///
/// Used when [`ReceiptScanner::save`] fails. The file is written to a temp
/// file in the same directory and renamed into place, so a crash never
/// leaves half a record behind.
pub fn export_record(record: &ExpenseRecord, dir: impl AsRef<Path>) -> Result<PathBuf, ReceiptError> {
    let dir = dir.as_ref();
    let path = dir.join(format!(
        "receipt-{}.json",
        Local::now().format("%Y%m%d-%H%M%S%.3f")
    ));
    let export_failed = |source: std::io::Error| ReceiptError::ExportFailed {
        path: path.clone(),
        source,
    };

    std::fs::create_dir_all(dir).map_err(export_failed)?;
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| ReceiptError::Internal(format!("serialise record: {e}")))?;

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(export_failed)?;
    tmp.write_all(json.as_bytes()).map_err(export_failed)?;
    tmp.write_all(b"\n").map_err(export_failed)?;
    tmp.persist(&path).map_err(|e| export_failed(e.error))?;

    info!("Exported record to {}", path.display());
    Ok(path)
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Model used when only a provider name is known.
pub fn default_model_for_provider(provider: &str) -> &'static str {
    match provider {
        "gemini" | "google" => "gemini-2.0-flash",
        "anthropic" | "claude" => "claude-sonnet-4-20250514",
        "ollama" => "llava",
        _ => "gpt-4.1-nano",
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        ExtractionError::NotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

/// Resolve the vision provider, from most-specific to least-specific:
///
/// 1. `config.provider` — used as-is
/// 2. `config.provider_name` (+ `config.model`)
/// 3. `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`, when both are set
/// 4. `GEMINI_API_KEY` → gemini
/// 5. [`ProviderFactory::from_env`] auto-detection
pub fn resolve_provider(config: &ScanConfig) -> Result<Arc<dyn LLMProvider>, ExtractionError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = config
            .model
            .as_deref()
            .unwrap_or_else(|| default_model_for_provider(name));
        return create_vision_provider(name, model);
    }

    if let (Ok(prov), Ok(model)) = (
        std::env::var("EDGEQUAKE_LLM_PROVIDER"),
        std::env::var("EDGEQUAKE_MODEL"),
    ) {
        if !prov.is_empty() && !model.is_empty() {
            return create_vision_provider(&prov, &model);
        }
    }

    if let Ok(key) = std::env::var("GEMINI_API_KEY") {
        if !key.is_empty() {
            let model = config
                .model
                .as_deref()
                .unwrap_or_else(|| default_model_for_provider("gemini"));
            return create_vision_provider("gemini", model);
        }
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| ExtractionError::NotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set GEMINI_API_KEY, OPENAI_API_KEY or ANTHROPIC_API_KEY.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::llm::CannedExtractionClient;
    use crate::sink::MemorySink;
    use std::io::Cursor;

    fn png() -> Vec<u8> {
        let img = ::image::DynamicImage::ImageRgba8(::image::RgbaImage::new(16, 16));
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .unwrap();
        buf
    }

    fn scanner(raw: &str, sink: Arc<MemorySink>) -> ReceiptScanner {
        ReceiptScanner::new(
            ScanConfig::default(),
            Arc::new(CannedExtractionClient::answering(raw)),
            sink,
        )
    }

    #[test]
    fn default_models() {
        assert_eq!(default_model_for_provider("gemini"), "gemini-2.0-flash");
        assert_eq!(default_model_for_provider("ollama"), "llava");
        assert_eq!(default_model_for_provider("openai"), "gpt-4.1-nano");
    }

    #[tokio::test]
    async fn scan_bytes_reports_image() {
        let s = scanner(r#"{"comercio":"Oxxo","total":35}"#, Arc::new(MemorySink::new()));
        let out = s.scan_bytes(png()).await.unwrap();
        assert_eq!(out.record.merchant, "Oxxo");
        assert_eq!(out.image.width, 16);
        assert_eq!(out.image.format, ImageFormat::Png);
    }

    #[tokio::test]
    async fn save_appends_configured_layout() {
        let sink = Arc::new(MemorySink::new());
        let s = scanner("{}", sink.clone());
        let saved = s.save(&ExpenseRecord::empty_on("2024-01-01")).await.unwrap();
        assert_eq!(saved.row.len(), 6);
        assert_eq!(sink.rows(), vec![saved.row]);
        assert_eq!(saved.destination, "memory");
    }

    #[tokio::test]
    async fn failed_save_returns_record() {
        let s = scanner("{}", Arc::new(MemorySink::failing("offline")));
        let record = ExpenseRecord {
            merchant: "Farmacia".into(),
            ..ExpenseRecord::empty_on("2024-01-01")
        };
        match s.save(&record).await.unwrap_err() {
            ReceiptError::NotSaved { record: r, .. } => assert_eq!(*r, record),
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn export_writes_json() {
        let dir = tempfile::tempdir().unwrap();
        let record = ExpenseRecord {
            merchant: "Cafe X".into(),
            amount: 12.5,
            ..ExpenseRecord::empty_on("2024-03-01")
        };
        let path = export_record(&record, dir.path().join("pending")).unwrap();
        let back: ExpenseRecord =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(back, record);
        assert_eq!(std::fs::read_dir(dir.path().join("pending")).unwrap().count(), 1);
    }
}
