//! Domain types produced by a scan: the normalised [`ExpenseRecord`] and the
//! spreadsheet-shaped [`OutputRow`] it is mapped into.

use serde::{Deserialize, Serialize};
use std::fmt;

/// One purchase, as read from a receipt and cleaned up by
/// [`crate::pipeline::normalize`].
///
/// After normalisation `date` is always a non-empty `YYYY-MM-DD` string (or
/// whatever the model supplied verbatim) and `amount` is always a finite,
/// non-negative number.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpenseRecord {
    /// Purchase date, `YYYY-MM-DD`.
    pub date: String,
    /// Store or business name.
    pub merchant: String,
    /// Total paid.
    pub amount: f64,
    /// Currency code, e.g. `MXN`.
    pub currency: String,
    /// One of [`Category::ALL`] unless the pass-through policy is in effect.
    pub category: String,
    /// Short summary of what was bought.
    pub description: String,
}

impl ExpenseRecord {
    /// A zero-amount record dated `date`, with every other field at its
    /// default. Handy as a base for struct-update syntax.
    pub fn empty_on(date: impl Into<String>) -> Self {
        Self {
            date: date.into(),
            merchant: String::new(),
            amount: 0.0,
            currency: crate::config::DEFAULT_CURRENCY.to_string(),
            category: Category::Otros.as_str().to_string(),
            description: String::new(),
        }
    }
}

/// Closed set of spending categories the model is asked to choose from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Alimentos,
    Transporte,
    Servicios,
    Salud,
    Ocio,
    Otros,
}

impl Category {
    /// Every category, in the order they are offered to the model.
    pub const ALL: [Category; 6] = [
        Category::Alimentos,
        Category::Transporte,
        Category::Servicios,
        Category::Salud,
        Category::Ocio,
        Category::Otros,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Alimentos => "Alimentos",
            Category::Transporte => "Transporte",
            Category::Servicios => "Servicios",
            Category::Salud => "Salud",
            Category::Ocio => "Ocio",
            Category::Otros => "Otros",
        }
    }

    /// Case-insensitive lookup; surrounding whitespace is ignored.
    pub fn parse(s: &str) -> Option<Category> {
        let s = s.trim();
        Category::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(s))
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single spreadsheet cell.
///
/// Serialised untagged, so a row becomes a plain JSON array such as
/// `["2024-03-01", "Cafe X", 12.5]`, which is exactly what the Sheets
/// `values` endpoints exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
}

impl CellValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            CellValue::Text(s) => Some(s),
            CellValue::Number(_) => None,
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            CellValue::Text(_) => None,
        }
    }
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => write!(f, "{n}"),
            CellValue::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for CellValue {
    fn from(s: &str) -> Self {
        CellValue::Text(s.to_string())
    }
}

impl From<String> for CellValue {
    fn from(s: String) -> Self {
        CellValue::Text(s)
    }
}

impl From<f64> for CellValue {
    fn from(n: f64) -> Self {
        CellValue::Number(n)
    }
}

/// Ordered cells for one spreadsheet row.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OutputRow(pub Vec<CellValue>);

impl OutputRow {
    pub fn cells(&self) -> &[CellValue] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<CellValue>> for OutputRow {
    fn from(cells: Vec<CellValue>) -> Self {
        OutputRow(cells)
    }
}
