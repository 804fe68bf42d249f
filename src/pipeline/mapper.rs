//! Record mapping: [`ExpenseRecord`] → [`OutputRow`] in the sheet's column order.
//!
//! Sheets built at different times disagree on columns. The two in use are
//!
//! ```text
//! timestamped  ingest_timestamp | date | merchant | category | amount | currency
//! compact      date | merchant | category | amount | currency
//! ```
//!
//! and they are not interchangeable, so the layout is always explicit
//! configuration. Layouts are parsed from names and an unknown name is an
//! error, never an empty cell.

use crate::error::ReceiptError;
use crate::record::{CellValue, ExpenseRecord, OutputRow};
use chrono::{DateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Format of the `ingest_timestamp` column.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// One column of the destination sheet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Column {
    /// When the row was written, not when the purchase happened.
    IngestTimestamp,
    Date,
    Merchant,
    Category,
    Amount,
    Currency,
    Description,
}

impl Column {
    pub const ALL: [Column; 7] = [
        Column::IngestTimestamp,
        Column::Date,
        Column::Merchant,
        Column::Category,
        Column::Amount,
        Column::Currency,
        Column::Description,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Column::IngestTimestamp => "ingest_timestamp",
            Column::Date => "date",
            Column::Merchant => "merchant",
            Column::Category => "category",
            Column::Amount => "amount",
            Column::Currency => "currency",
            Column::Description => "description",
        }
    }

    /// Accepts the canonical name, the Spanish key the model uses, and
    /// camelCase spellings (`ingestTimestamp`).
    pub fn from_name(name: &str) -> Option<Column> {
        let n = name.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        let col = match n.as_str() {
            "ingest_timestamp" | "ingesttimestamp" | "timestamp" => Column::IngestTimestamp,
            "date" | "fecha" => Column::Date,
            "merchant" | "comercio" => Column::Merchant,
            "category" | "categoria" => Column::Category,
            "amount" | "total" => Column::Amount,
            "currency" | "moneda" => Column::Currency,
            "description" | "descripcion" => Column::Description,
            _ => return None,
        };
        Some(col)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered columns of the destination sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ColumnLayout(Vec<Column>);

impl ColumnLayout {
    /// `[ingest_timestamp, date, merchant, category, amount, currency]`
    pub fn timestamped() -> Self {
        Self(vec![
            Column::IngestTimestamp,
            Column::Date,
            Column::Merchant,
            Column::Category,
            Column::Amount,
            Column::Currency,
        ])
    }

    /// `[date, merchant, category, amount, currency]`
    pub fn compact() -> Self {
        Self(vec![
            Column::Date,
            Column::Merchant,
            Column::Category,
            Column::Amount,
            Column::Currency,
        ])
    }

    pub fn new(columns: Vec<Column>) -> Self {
        Self(columns)
    }

    /// Parse a layout from column names, failing on the first unknown one.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Result<Self, ReceiptError> {
        let columns = names
            .iter()
            .map(|n| {
                let n = n.as_ref();
                Column::from_name(n).ok_or_else(|| ReceiptError::UnknownColumn {
                    name: n.to_string(),
                    known: known_names(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        if columns.is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Column layout must name at least one column".into(),
            ));
        }
        Ok(Self(columns))
    }

    pub fn columns(&self) -> &[Column] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of `column`, if the layout has it.
    pub fn position(&self, column: Column) -> Option<usize> {
        self.0.iter().position(|c| *c == column)
    }
}

/// `timestamped`, `compact`, or a comma-separated list of column names.
impl FromStr for ColumnLayout {
    type Err = ReceiptError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "timestamped" => Ok(Self::timestamped()),
            "compact" => Ok(Self::compact()),
            _ => {
                let names: Vec<&str> = s.split(',').filter(|n| !n.trim().is_empty()).collect();
                Self::from_names(&names)
            }
        }
    }
}

impl fmt::Display for ColumnLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.0.iter().map(|c| c.name()).collect();
        f.write_str(&names.join(","))
    }
}

fn known_names() -> String {
    Column::ALL
        .iter()
        .map(|c| c.name())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Lay `record` out in `layout` order. `ingested_at` fills the
/// `ingest_timestamp` column.
pub fn to_row<Tz>(record: &ExpenseRecord, layout: &ColumnLayout, ingested_at: &DateTime<Tz>) -> OutputRow
where
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    layout
        .columns()
        .iter()
        .map(|column| match column {
            Column::IngestTimestamp => {
                CellValue::Text(ingested_at.format(TIMESTAMP_FORMAT).to_string())
            }
            Column::Date => CellValue::Text(record.date.clone()),
            Column::Merchant => CellValue::Text(record.merchant.clone()),
            Column::Category => CellValue::Text(record.category.clone()),
            Column::Amount => CellValue::Number(record.amount),
            Column::Currency => CellValue::Text(record.currency.clone()),
            Column::Description => CellValue::Text(record.description.clone()),
        })
        .collect::<Vec<_>>()
        .into()
}

/// [`to_row`] with a layout given as names, e.g. straight from a config file.
pub fn to_row_by_names<S, Tz>(
    record: &ExpenseRecord,
    names: &[S],
    ingested_at: &DateTime<Tz>,
) -> Result<OutputRow, ReceiptError>
where
    S: AsRef<str>,
    Tz: TimeZone,
    Tz::Offset: fmt::Display,
{
    let layout = ColumnLayout::from_names(names)?;
    Ok(to_row(record, &layout, ingested_at))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;

    fn cafe() -> ExpenseRecord {
        ExpenseRecord {
            date: "2024-03-01".into(),
            merchant: "Cafe X".into(),
            amount: 12.5,
            currency: "MXN".into(),
            category: "Alimentos".into(),
            description: String::new(),
        }
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()
    }

    #[test]
    fn compact_layout_exact_row() {
        let layout =
            ColumnLayout::from_names(&["date", "merchant", "category", "amount", "currency"])
                .unwrap();
        let row = to_row(&cafe(), &layout, &at());
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!(["2024-03-01", "Cafe X", "Alimentos", 12.5, "MXN"])
        );
        assert_eq!(layout, ColumnLayout::compact());
    }

    #[test]
    fn timestamped_layout_prepends_ingest_time() {
        let row = to_row(&cafe(), &ColumnLayout::timestamped(), &at());
        assert_eq!(
            serde_json::to_value(&row).unwrap(),
            json!(["2024-03-01 09:30:00", "2024-03-01", "Cafe X", "Alimentos", 12.5, "MXN"])
        );
    }

    #[test]
    fn layouts_are_not_interchangeable() {
        let a = to_row(&cafe(), &ColumnLayout::timestamped(), &at());
        let b = to_row(&cafe(), &ColumnLayout::compact(), &at());
        assert_ne!(a.len(), b.len());
        assert_ne!(a.cells()[0], b.cells()[0]);
    }

    #[test]
    fn unknown_column_fails() {
        let err = ColumnLayout::from_names(&["date", "totl"]).unwrap_err();
        match err {
            ReceiptError::UnknownColumn { name, known } => {
                assert_eq!(name, "totl");
                assert!(known.contains("amount"));
            }
            other => panic!("unexpected: {other:?}"),
        }
        assert!(to_row_by_names(&cafe(), &["totl"], &at()).is_err());
    }

    #[test]
    fn empty_layout_fails() {
        let names: [&str; 0] = [];
        assert!(matches!(
            ColumnLayout::from_names(&names),
            Err(ReceiptError::InvalidConfig(_))
        ));
    }

    #[test]
    fn parse_layout_strings() {
        assert_eq!("compact".parse::<ColumnLayout>().unwrap(), ColumnLayout::compact());
        assert_eq!(
            "ingestTimestamp, fecha, comercio, categoria, total, moneda"
                .parse::<ColumnLayout>()
                .unwrap(),
            ColumnLayout::timestamped()
        );
        assert!("date,merchant,totl".parse::<ColumnLayout>().is_err());
    }

    #[test]
    fn layout_display_round_trips() {
        let layout = ColumnLayout::timestamped();
        assert_eq!(layout.to_string().parse::<ColumnLayout>().unwrap(), layout);
    }

    #[test]
    fn description_column() {
        let record = ExpenseRecord {
            description: "Café americano".into(),
            ..cafe()
        };
        let layout = ColumnLayout::new(vec![Column::Description, Column::Amount]);
        let row = to_row(&record, &layout, &at());
        assert_eq!(row.cells()[0].as_text(), Some("Café americano"));
        assert_eq!(layout.position(Column::Amount), Some(1));
    }
}
