//! Response normalisation: raw model text → [`ExpenseRecord`].
//!
//! The prompt asks for bare JSON, but models still wrap answers in
//! ```` ```json ```` fences, return `null` for half the fields, or write
//! `"total": "$1,234.00"`. This stage is strict about shape (one JSON
//! object, numeric totals) and lenient about absence (every missing field
//! has a default). A malformed total is an error, never a silent `0.0`.
//!
//! Steps:
//! 1. Strip an outer fence, each end independently and only if present
//! 2. Parse exactly one JSON object
//! 3. Apply the per-field default policy

use crate::config::{CategoryPolicy, ScanConfig};
use crate::error::ReceiptError;
use crate::record::{Category, ExpenseRecord};
use chrono::{Local, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, warn};

/// Knobs the normaliser needs, lifted out of [`ScanConfig`].
#[derive(Debug, Clone)]
pub struct NormalizeOptions {
    pub default_currency: String,
    pub merchant_placeholder: String,
    pub category_policy: CategoryPolicy,
}

impl Default for NormalizeOptions {
    fn default() -> Self {
        Self::from(&ScanConfig::default())
    }
}

impl From<&ScanConfig> for NormalizeOptions {
    fn from(config: &ScanConfig) -> Self {
        Self {
            default_currency: config.default_currency.clone(),
            merchant_placeholder: config.merchant_placeholder.clone(),
            category_policy: config.category_policy,
        }
    }
}

/// Normalise a raw model answer, defaulting a missing date to today
/// (local time).
pub fn normalize(raw: &str, options: &NormalizeOptions) -> Result<ExpenseRecord, ReceiptError> {
    normalize_on(raw, options, Local::now().date_naive())
}

/// [`normalize`] with an explicit "today".
pub fn normalize_on(
    raw: &str,
    options: &NormalizeOptions,
    today: NaiveDate,
) -> Result<ExpenseRecord, ReceiptError> {
    let body = strip_fences(raw);
    let object = parse_object(body, raw)?;

    let record = ExpenseRecord {
        date: date_field(&object, today)?,
        merchant: text_field(&object, "comercio", "merchant")?
            .unwrap_or_else(|| options.merchant_placeholder.clone()),
        amount: amount_field(&object)?,
        currency: text_field(&object, "moneda", "currency")?
            .unwrap_or_else(|| options.default_currency.clone()),
        category: category_field(&object, options.category_policy)?,
        description: text_field(&object, "descripcion", "description")?.unwrap_or_default(),
    };

    debug!("Normalised record: {:?}", record);
    Ok(record)
}

// ── Step 1: fences ───────────────────────────────────────────────────────────

static RE_LEADING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^```(?i:json)?[ \t]*(?:\r?\n)?").unwrap());

static RE_TRAILING_FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:\r?\n)?[ \t]*```$").unwrap());

/// Unsigned decimal, optionally with `,` thousands separators.
static RE_AMOUNT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:\d{1,3}(?:,\d{3})+|\d+)(?:\.\d+)?$").unwrap());

/// Remove a leading ```` ``` ````/```` ```json ```` marker and a trailing
/// ```` ``` ```` marker from the trimmed text. Each end is handled on its
/// own, so a half-fenced answer still loses the half it has.
pub fn strip_fences(raw: &str) -> &str {
    let s = raw.trim();
    let s = match RE_LEADING_FENCE.find(s) {
        Some(m) => &s[m.end()..],
        None => s,
    };
    let s = match RE_TRAILING_FENCE.find(s) {
        Some(m) => &s[..m.start()],
        None => s,
    };
    s.trim()
}

// ── Step 2: JSON object ──────────────────────────────────────────────────────

fn parse_object(body: &str, raw: &str) -> Result<Map<String, Value>, ReceiptError> {
    let parse_error = |detail: String| ReceiptError::Parse {
        detail,
        raw: raw.to_string(),
    };

    if body.is_empty() {
        return Err(parse_error("empty response".into()));
    }
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(other) => Err(parse_error(format!(
            "expected a JSON object, got {}",
            json_kind(&other)
        ))),
        Err(e) => Err(parse_error(e.to_string())),
    }
}

fn json_kind(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// ── Step 3: fields ───────────────────────────────────────────────────────────

/// Value under the Spanish key, else the English alias. `null` and blank
/// strings count as absent.
fn lookup<'a>(object: &'a Map<String, Value>, key: &str, alias: &str) -> Option<&'a Value> {
    let present = |v: &&Value| match v {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        _ => true,
    };
    object
        .get(key)
        .filter(present)
        .or_else(|| object.get(alias).filter(present))
}

fn coercion_error(field: &'static str, value: &Value, reason: impl Into<String>) -> ReceiptError {
    ReceiptError::FieldCoercion {
        field,
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Trimmed string value; blank strings count as absent.
fn text_field(
    object: &Map<String, Value>,
    key: &'static str,
    alias: &str,
) -> Result<Option<String>, ReceiptError> {
    match lookup(object, key, alias) {
        None => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(coercion_error(key, other, "expected text")),
    }
}

/// `fecha`: absent, `null`, blank or the string `"null"` become `today`.
/// Anything else passes through as written.
fn date_field(object: &Map<String, Value>, today: NaiveDate) -> Result<String, ReceiptError> {
    let today_iso = || today.format("%Y-%m-%d").to_string();
    match text_field(object, "fecha", "date")? {
        Some(s) if s.eq_ignore_ascii_case("null") => Ok(today_iso()),
        Some(s) => Ok(s),
        None => Ok(today_iso()),
    }
}

/// `total`: absent or `null` become `0.0`. Numbers and numeric strings
/// are accepted; anything else is an error rather than a silent zero.
fn amount_field(object: &Map<String, Value>) -> Result<f64, ReceiptError> {
    let Some(value) = lookup(object, "total", "amount") else {
        return Ok(0.0);
    };

    let amount = match value {
        Value::Number(n) => n
            .as_f64()
            .ok_or_else(|| coercion_error("total", value, "number out of range"))?,
        Value::String(s) => parse_amount(s)
            .ok_or_else(|| coercion_error("total", value, "not a number"))?,
        _ => return Err(coercion_error("total", value, "expected a number")),
    };

    if !amount.is_finite() {
        return Err(coercion_error("total", value, "not a finite number"));
    }
    if amount < 0.0 {
        return Err(coercion_error("total", value, "negative total"));
    }
    // `-0` is a valid JSON number; keep it out of the sheet.
    Ok(if amount == 0.0 { 0.0 } else { amount })
}

/// Parse a numeric string such as `"12.50"`, `"$ 1,234.00"` or `"  7 "`.
///
/// A leading `$` and comma thousands separators in groups of three are
/// accepted. Comma decimals (`"12,50"`), stray commas, signs, `"NaN"` and
/// `"inf"` are rejected.
pub fn parse_amount(s: &str) -> Option<f64> {
    let s = s.trim();
    let s = s.strip_prefix('$').unwrap_or(s).trim_start();
    if !RE_AMOUNT.is_match(s) {
        return None;
    }
    s.replace(',', "").parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `categoria`: absent becomes `Otros`; known categories are matched
/// case-insensitively; unknown ones follow `policy`.
fn category_field(
    object: &Map<String, Value>,
    policy: CategoryPolicy,
) -> Result<String, ReceiptError> {
    let Some(raw) = text_field(object, "categoria", "category")? else {
        return Ok(Category::Otros.as_str().to_string());
    };
    if let Some(known) = Category::parse(&raw) {
        return Ok(known.as_str().to_string());
    }
    match policy {
        CategoryPolicy::CoerceToOther => {
            warn!("Unknown category '{}' replaced with 'Otros'", raw);
            Ok(Category::Otros.as_str().to_string())
        }
        CategoryPolicy::PassThrough => Ok(raw),
    }
}

// ── Tests ────────────────────────────────────────────────────────────────────
