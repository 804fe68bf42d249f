//! Google Sheets sink over the Sheets v4 REST API.
//!
//! Two endpoints are used:
//!
//! ```text
//! POST {base}/spreadsheets/{id}/values/{range}:append   append one row
//! GET  {base}/spreadsheets/{id}/values/{range}          read all rows
//! ```
//!
//! Rows are written with `valueInputOption=RAW` and read back with
//! `valueRenderOption=UNFORMATTED_VALUE`, so a cell comes back exactly as it
//! went in: `"2024-03-01"` stays text instead of turning into a date serial.
//!
//! Authentication is out of scope; the caller supplies an already-resolved
//! OAuth2 access token in [`SheetsConfig`].

use super::ExpenseSink;
use crate::config::SheetsConfig;
use crate::error::{PersistenceError, ReceiptError};
use crate::record::{CellValue, OutputRow};
use async_trait::async_trait;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Columns read back by [`GoogleSheetsSink::read_all_rows`].
const READ_COLUMNS: &str = "A:Z";

/// Sink appending to one worksheet of one spreadsheet.
#[derive(Debug)]
pub struct GoogleSheetsSink {
    client: reqwest::Client,
    config: SheetsConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ValueRange<'a> {
    major_dimension: &'static str,
    values: [&'a OutputRow; 1],
}

#[derive(Deserialize)]
struct ValuesResponse {
    #[serde(default)]
    values: Vec<Vec<Value>>,
}

impl GoogleSheetsSink {
    pub fn new(config: SheetsConfig) -> Result<Self, ReceiptError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ReceiptError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self { client, config })
    }

    /// A1 range covering the worksheet, e.g. `'Transacciones'!A:Z`.
    fn range(&self) -> String {
        format!(
            "'{}'!{}",
            self.config.worksheet.replace('\'', "''"),
            READ_COLUMNS
        )
    }

    fn append_url(&self) -> Result<Url, PersistenceError> {
        let mut url = values_url(&self.config, &format!("{}:append", self.range()))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", "RAW")
            .append_pair("insertDataOption", "INSERT_ROWS");
        Ok(url)
    }

    fn read_url(&self) -> Result<Url, PersistenceError> {
        let mut url = values_url(&self.config, &self.range())?;
        url.query_pairs_mut()
            .append_pair("valueRenderOption", "UNFORMATTED_VALUE")
            .append_pair("majorDimension", "ROWS");
        Ok(url)
    }
}

/// `{base}/spreadsheets/{id}/values/{range}` with each segment escaped.
fn values_url(config: &SheetsConfig, range: &str) -> Result<Url, PersistenceError> {
    let mut url = Url::parse(&config.base_url)
        .map_err(|e| PersistenceError::Transport(format!("bad base URL: {e}")))?;
    url.path_segments_mut()
        .map_err(|_| PersistenceError::Transport("base URL cannot hold a path".into()))?
        .pop_if_empty()
        .extend(["spreadsheets", config.spreadsheet_id.as_str(), "values", range]);
    Ok(url)
}

/// Convert one sheet row from the API into cells.
fn row_from_values(values: Vec<Value>) -> OutputRow {
    values
        .into_iter()
        .map(|v| match v {
            Value::Number(n) => n
                .as_f64()
                .map(CellValue::Number)
                .unwrap_or_else(|| CellValue::Text(n.to_string())),
            Value::String(s) => CellValue::Text(s),
            Value::Bool(b) => CellValue::Text(if b { "TRUE" } else { "FALSE" }.to_string()),
            Value::Null => CellValue::Text(String::new()),
            other => CellValue::Text(other.to_string()),
        })
        .collect::<Vec<_>>()
        .into()
}

fn parse_values_response(body: &str) -> Result<Vec<OutputRow>, PersistenceError> {
    let parsed: ValuesResponse =
        serde_json::from_str(body).map_err(|e| PersistenceError::Malformed(e.to_string()))?;
    Ok(parsed.values.into_iter().map(row_from_values).collect())
}

async fn check_status(response: reqwest::Response) -> Result<String, PersistenceError> {
    let status = response.status();
    let body = response.text().await.unwrap_or_default();
    if !status.is_success() {
        warn!("Sheets API returned {}", status);
        return Err(PersistenceError::Status {
            status: status.as_u16(),
            body,
        });
    }
    Ok(body)
}

#[async_trait]
impl ExpenseSink for GoogleSheetsSink {
    fn describe(&self) -> String {
        format!(
            "Google Sheet {} / {}",
            self.config.spreadsheet_id, self.config.worksheet
        )
    }

    async fn append_row(&self, row: &OutputRow) -> Result<(), PersistenceError> {
        if row.is_empty() {
            return Err(PersistenceError::Rejected("row has no cells".into()));
        }
        let body = ValueRange {
            major_dimension: "ROWS",
            values: [row],
        };

        let response = self
            .client
            .post(self.append_url()?)
            .bearer_auth(&self.config.access_token)
            .json(&body)
            .send()
            .await?;
        check_status(response).await?;

        info!("Appended {}-column row to {}", row.len(), self.describe());
        Ok(())
    }

    async fn read_all_rows(&self) -> Result<Vec<OutputRow>, PersistenceError> {
        let response = self
            .client
            .get(self.read_url()?)
            .bearer_auth(&self.config.access_token)
            .send()
            .await?;
        let body = check_status(response).await?;
        let rows = parse_values_response(&body)?;
        debug!("Read {} rows from {}", rows.len(), self.describe());
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> GoogleSheetsSink {
        GoogleSheetsSink::new(SheetsConfig::new("1AbC-xyz", "tok")).unwrap()
    }

    #[test]
    fn rejects_invalid_config() {
        assert!(GoogleSheetsSink::new(SheetsConfig::new("", "tok")).is_err());
    }

    #[test]
    fn append_url_shape() {
        let url = sink().append_url().unwrap();
        let s = url.as_str();
        assert!(
            s.starts_with("https://sheets.googleapis.com/v4/spreadsheets/1AbC-xyz/values/"),
            "{s}"
        );
        assert!(s.contains("Transacciones"));
        assert!(s.contains(":append?") || s.contains("%3Aappend?"), "{s}");
        assert!(s.contains("valueInputOption=RAW"));
        assert!(s.contains("insertDataOption=INSERT_ROWS"));
    }

    #[test]
    fn read_url_uses_unformatted_values() {
        let url = sink().read_url().unwrap();
        assert!(url.as_str().contains("valueRenderOption=UNFORMATTED_VALUE"));
    }

    #[test]
    fn worksheet_with_spaces_is_escaped() {
        let s = GoogleSheetsSink::new(SheetsConfig::new("id", "tok").worksheet("Gastos 2024"))
            .unwrap();
        let url = s.read_url().unwrap();
        assert!(!url.as_str().contains("Gastos 2024"));
        assert!(url.as_str().contains("Gastos%202024"));
    }

    #[test]
    fn custom_base_url() {
        let s = GoogleSheetsSink::new(
            SheetsConfig::new("id", "tok").base_url("http://127.0.0.1:8080/v4/"),
        )
        .unwrap();
        let url = s.read_url().unwrap();
        assert!(url.as_str().starts_with("http://127.0.0.1:8080/v4/spreadsheets/id/values/"));
    }

    #[test]
    fn append_body_is_single_row() {
        let row = OutputRow(vec!["2024-03-01".into(), 12.5.into()]);
        let body = ValueRange {
            major_dimension: "ROWS",
            values: [&row],
        };
        assert_eq!(
            serde_json::to_value(&body).unwrap(),
            serde_json::json!({"majorDimension": "ROWS", "values": [["2024-03-01", 12.5]]})
        );
    }

    #[test]
    fn parse_values() {
        let body = r#"{
            "range": "Transacciones!A1:F3",
            "majorDimension": "ROWS",
            "values": [
                ["Fecha", "Comercio", "Total"],
                ["2024-03-01", "Cafe X", 12.5],
                ["2024-03-02", "Oxxo", 35, true]
            ]
        }"#;
        let rows = parse_values_response(body).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1].cells()[2], CellValue::Number(12.5));
        assert_eq!(rows[2].cells()[3], CellValue::Text("TRUE".into()));
    }

    #[test]
    fn parse_empty_sheet() {
        let rows = parse_values_response(r#"{"range": "A:Z", "majorDimension": "ROWS"}"#).unwrap();
        assert!(rows.is_empty());
    }

    #[test]
    fn parse_garbage_is_malformed() {
        assert!(matches!(
            parse_values_response("<html>"),
            Err(PersistenceError::Malformed(_))
        ));
    }
}
