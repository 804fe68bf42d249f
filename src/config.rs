//! Configuration types for receipt scanning.
//!
//! Everything the pipeline needs to know is resolved once, at startup, into
//! [`ScanConfig`] (model side) and [`SheetsConfig`] (spreadsheet side), and
//! passed in at construction. Nothing is read from globals later on.

use crate::error::ReceiptError;
use crate::pipeline::mapper::ColumnLayout;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Currency used when the receipt does not show one.
pub const DEFAULT_CURRENCY: &str = "MXN";

/// Worksheet (tab) rows are appended to by default.
pub const DEFAULT_WORKSHEET: &str = "Transacciones";

/// Default Sheets REST endpoint.
pub const DEFAULT_SHEETS_BASE_URL: &str = "https://sheets.googleapis.com/v4";

/// Configuration for a receipt scan.
///
/// # Example
/// ```rust
/// use edgequake_receipts::{CategoryPolicy, ScanConfig};
///
/// let config = ScanConfig::builder()
///     .model("gemini-2.0-flash")
///     .default_currency("USD")
///     .category_policy(CategoryPolicy::PassThrough)
///     .build()
///     .unwrap();
/// assert_eq!(config.default_currency, "USD");
/// ```
#[derive(Clone)]
pub struct ScanConfig {
    /// LLM model identifier. If None, uses the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "gemini", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens the model may generate. Default: 1024.
    ///
    /// The expected answer is a six-key JSON object, well under 200 tokens.
    pub max_tokens: usize,

    /// Per-call timeout in seconds. Default: 60.
    pub api_timeout_secs: u64,

    /// Replaces the built-in instruction text. The schema block is always appended.
    pub system_prompt: Option<String>,

    /// Which keys the model is asked to return. Default: [`FieldSet::Extended`].
    pub fields: FieldSet,

    /// Currency code used when the receipt shows none. Default: `MXN`.
    pub default_currency: String,

    /// Merchant value used when the model finds none. Default: empty string.
    pub merchant_placeholder: String,

    /// What to do with a category outside [`crate::record::Category::ALL`].
    pub category_policy: CategoryPolicy,

    /// Column order of the destination sheet. Default: [`ColumnLayout::timestamped`].
    pub column_layout: ColumnLayout,

    /// Largest width or height sent to the model; bigger photos are downscaled. Default: 2000.
    pub max_image_dimension: u32,

    /// Download timeout for URL inputs in seconds. Default: 60.
    pub download_timeout_secs: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 1024,
            api_timeout_secs: 60,
            system_prompt: None,
            fields: FieldSet::default(),
            default_currency: DEFAULT_CURRENCY.to_string(),
            merchant_placeholder: String::new(),
            category_policy: CategoryPolicy::default(),
            column_layout: ColumnLayout::timestamped(),
            max_image_dimension: 2000,
            download_timeout_secs: 60,
        }
    }
}

impl fmt::Debug for ScanConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanConfig")
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("system_prompt", &self.system_prompt)
            .field("fields", &self.fields)
            .field("default_currency", &self.default_currency)
            .field("merchant_placeholder", &self.merchant_placeholder)
            .field("category_policy", &self.category_policy)
            .field("column_layout", &self.column_layout)
            .field("max_image_dimension", &self.max_image_dimension)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

impl ScanConfig {
    /// Create a new builder for `ScanConfig`.
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScanConfig`].
#[derive(Debug)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.config.system_prompt = Some(prompt.into());
        self
    }

    pub fn fields(mut self, fields: FieldSet) -> Self {
        self.config.fields = fields;
        self
    }

    pub fn default_currency(mut self, code: impl Into<String>) -> Self {
        self.config.default_currency = code.into().trim().to_string();
        self
    }

    pub fn merchant_placeholder(mut self, placeholder: impl Into<String>) -> Self {
        self.config.merchant_placeholder = placeholder.into();
        self
    }

    pub fn category_policy(mut self, policy: CategoryPolicy) -> Self {
        self.config.category_policy = policy;
        self
    }

    pub fn column_layout(mut self, layout: ColumnLayout) -> Self {
        self.config.column_layout = layout;
        self
    }

    pub fn max_image_dimension(mut self, px: u32) -> Self {
        self.config.max_image_dimension = px.max(256);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScanConfig, ReceiptError> {
        let c = &self.config;
        if c.default_currency.is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Default currency must not be empty".into(),
            ));
        }
        if c.column_layout.is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Column layout must name at least one column".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(ReceiptError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// Destination spreadsheet for [`crate::sink::sheets::GoogleSheetsSink`].
///
/// The sheet is addressed by its stable id; names change when people
/// rename files, ids do not.
#[derive(Clone)]
pub struct SheetsConfig {
    /// The long id in the sheet URL (`/spreadsheets/d/<id>/edit`).
    pub spreadsheet_id: String,
    /// Worksheet (tab) name. Default: `Transacciones`.
    pub worksheet: String,
    /// OAuth2 bearer token with the `spreadsheets` scope, already resolved.
    pub access_token: String,
    /// API root. Overridable for tests and proxies.
    pub base_url: String,
    /// Per-request timeout in seconds. Default: 30.
    pub timeout_secs: u64,
}

impl SheetsConfig {
    pub fn new(spreadsheet_id: impl Into<String>, access_token: impl Into<String>) -> Self {
        Self {
            spreadsheet_id: spreadsheet_id.into(),
            worksheet: DEFAULT_WORKSHEET.to_string(),
            access_token: access_token.into(),
            base_url: DEFAULT_SHEETS_BASE_URL.to_string(),
            timeout_secs: 30,
        }
    }

    pub fn worksheet(mut self, name: impl Into<String>) -> Self {
        self.worksheet = name.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs.max(1);
        self
    }

    /// Reject configurations that cannot address a sheet.
    pub fn validate(&self) -> Result<(), ReceiptError> {
        if self.spreadsheet_id.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Spreadsheet id must not be empty".into(),
            ));
        }
        if self.worksheet.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Worksheet name must not be empty".into(),
            ));
        }
        if self.access_token.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Sheets access token must not be empty".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for SheetsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SheetsConfig")
            .field("spreadsheet_id", &self.spreadsheet_id)
            .field("worksheet", &self.worksheet)
            .field("access_token", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("timeout_secs", &self.timeout_secs)
            .finish()
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// Keys the model is asked to return.
///
/// | Set | Keys |
/// |-----|------|
/// | Basic | `fecha, comercio, total, moneda, categoria` |
/// | Extended | Basic + `descripcion` (default) |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum FieldSet {
    Basic,
    #[default]
    Extended,
}

/// Handling of a category the model invented outside the closed set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum CategoryPolicy {
    /// Replace it with `Otros` and log a warning. (default)
    #[default]
    CoerceToOther,
    /// Keep the model's value verbatim.
    PassThrough,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScanConfig::default();
        assert_eq!(c.default_currency, "MXN");
        assert_eq!(c.fields, FieldSet::Extended);
        assert_eq!(c.category_policy, CategoryPolicy::CoerceToOther);
        assert!(c.merchant_placeholder.is_empty());
        assert_eq!(c.column_layout, ColumnLayout::timestamped());
    }

    #[test]
    fn builder_clamps() {
        let c = ScanConfig::builder()
            .temperature(5.0)
            .max_image_dimension(10)
            .build()
            .unwrap();
        assert_eq!(c.temperature, 2.0);
        assert_eq!(c.max_image_dimension, 256);
    }

    #[test]
    fn blank_currency_rejected() {
        let err = ScanConfig::builder().default_currency("  ").build().unwrap_err();
        assert!(matches!(err, ReceiptError::InvalidConfig(_)));
    }

    #[test]
    fn scan_config_debug_shows_prompt_and_download_timeout() {
        let c = ScanConfig::builder()
            .system_prompt("Lee el ticket")
            .download_timeout_secs(17)
            .build()
            .unwrap();
        let dbg = format!("{c:?}");
        assert!(dbg.contains("Lee el ticket"), "{dbg}");
        assert!(dbg.contains("download_timeout_secs: 17"), "{dbg}");
    }

    #[test]
    fn sheets_config_redacts_token() {
        let c = SheetsConfig::new("1AbC", "ya29.secret");
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("ya29.secret"));
        assert!(dbg.contains("Transacciones"));
    }

    #[test]
    fn sheets_config_validation() {
        assert!(SheetsConfig::new("1AbC", "tok").validate().is_ok());
        assert!(SheetsConfig::new("", "tok").validate().is_err());
        assert!(SheetsConfig::new("1AbC", "").validate().is_err());
        assert!(SheetsConfig::new("1AbC", "tok").worksheet(" ").validate().is_err());
    }
}
