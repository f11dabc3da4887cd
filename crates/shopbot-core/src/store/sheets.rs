//! Google Sheets (v4 values API) backend for [`RowStore`].
//!
//! Each sheet is read as a whole by name with the first row taken as the
//! header. Multi-field row updates go through `values:batchUpdate`, which the
//! API applies as one request.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{Result, RowStore, StoreError, Table};
use crate::config::SheetsConfig;

/// Data rows start on this 1-based sheet row (row 1 is the header).
const FIRST_DATA_ROW: usize = 2;

pub struct SheetsRowStore {
    client: Client,
    base: Url,
    spreadsheet_id: String,
    token: String,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Vec<serde_json::Value>>,
}

#[derive(Debug, Serialize)]
struct WriteRange<'a> {
    range: String,
    values: [[&'a str; 1]; 1],
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct BatchUpdate<'a> {
    value_input_option: &'static str,
    data: Vec<WriteRange<'a>>,
}

impl SheetsRowStore {
    pub fn new(
        base: Url,
        spreadsheet_id: impl Into<String>,
        token: impl Into<String>,
        timeout: Duration,
    ) -> std::result::Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base,
            spreadsheet_id: spreadsheet_id.into(),
            token: token.into(),
        })
    }

    /// Build from the `sheets` config section and a bearer token.
    pub fn from_config(config: &SheetsConfig, token: impl Into<String>, timeout: Duration) -> Result<Self> {
        let base = Url::parse(&config.api_base_url)
            .map_err(|e| StoreError::Rejected(format!("invalid api_base_url {}: {e}", config.api_base_url)))?;
        Self::new(base, config.spreadsheet_id.clone(), token, timeout)
            .map_err(|e| StoreError::Unavailable(format!("http client: {e}")))
    }

    /// `{base}/v4/spreadsheets/{id}/values/{tail}` with each part encoded.
    fn values_url(&self, tail: &str) -> Result<Url> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| StoreError::Rejected(format!("invalid base url {}", self.base)))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", self.spreadsheet_id.as_str(), tail]);
        Ok(url)
    }

    async fn send(&self, req: reqwest::RequestBuilder, sheet: &str) -> Result<reqwest::Response> {
        let response = req
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(map_transport_error)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(map_status_error(status, &body, sheet))
    }
}

/// `'my sheet'!B3`, with quotes in the sheet name doubled.
fn a1_range(sheet: &str, cell: Option<(usize, usize)>) -> String {
    let quoted = format!("'{}'", sheet.replace('\'', "''"));
    match cell {
        Some((row, col)) => format!("{quoted}!{}{}", column_letter(col), row + FIRST_DATA_ROW),
        None => quoted,
    }
}

/// Zero-based column index → `A`, `B`, ..., `Z`, `AA`, ...
pub fn column_letter(mut col: usize) -> String {
    let mut out = Vec::new();
    loop {
        out.push(b'A' + (col % 26) as u8);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    out.reverse();
    String::from_utf8_lossy(&out).into_owned()
}

fn cell_text(v: &serde_json::Value) -> String {
    match v {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn map_transport_error(error: reqwest::Error) -> StoreError {
    if error.is_timeout() {
        StoreError::Timeout
    } else {
        StoreError::Unavailable(error.to_string())
    }
}

fn map_status_error(status: StatusCode, body: &str, sheet: &str) -> StoreError {
    let preview: String = body.split_whitespace().collect::<Vec<_>>().join(" ");
    let preview: String = preview.chars().take(160).collect();
    let message = format!("status {}: {preview}", status.as_u16());
    match status {
        StatusCode::BAD_REQUEST if body.contains("Unable to parse range") => {
            StoreError::SheetNotFound(sheet.to_string())
        }
        StatusCode::REQUEST_TIMEOUT | StatusCode::GATEWAY_TIMEOUT => StoreError::Timeout,
        StatusCode::TOO_MANY_REQUESTS => StoreError::Unavailable(message),
        _ if status.is_client_error() => StoreError::Rejected(message),
        _ => StoreError::Unavailable(message),
    }
}

#[async_trait]
impl RowStore for SheetsRowStore {
    async fn read_all_rows(&self, sheet: &str) -> Result<Table> {
        let url = self.values_url(&a1_range(sheet, None))?;
        debug!(sheet, "reading sheet");
        let response = self.send(self.client.get(url), sheet).await?;
        let body: ValueRange = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(format!("malformed values response: {e}")))?;

        let mut rows = body
            .values
            .iter()
            .map(|r| r.iter().map(cell_text).collect::<Vec<_>>());
        let headers = rows.next().unwrap_or_default();
        Ok(Table {
            headers,
            rows: rows.collect(),
        })
    }

    async fn write_cell(&self, sheet: &str, row: usize, column: &str, value: &str) -> Result<()> {
        let table = self.read_all_rows(sheet).await?;
        let col = table.require_column(sheet, column)?;
        let range = a1_range(sheet, Some((row, col)));
        let mut url = self.values_url(&range)?;
        url.query_pairs_mut().append_pair("valueInputOption", "RAW");
        let body = WriteRange {
            range,
            values: [[value]],
        };
        self.send(self.client.put(url).json(&body), sheet).await?;
        Ok(())
    }

    async fn write_row_fields(
        &self,
        sheet: &str,
        key_column: &str,
        key: &str,
        fields: &[(String, String)],
    ) -> Result<bool> {
        let table = self.read_all_rows(sheet).await?;
        let key_col = table.require_column(sheet, key_column)?;
        let Some(row) = table.find(key_col, key) else {
            return Ok(false);
        };
        let data = fields
            .iter()
            .map(|(name, value)| {
                let col = table.require_column(sheet, name)?;
                Ok(WriteRange {
                    range: a1_range(sheet, Some((row, col))),
                    values: [[value.as_str()]],
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let url = self.values_url("values:batchUpdate")?;
        let body = BatchUpdate {
            value_input_option: "RAW",
            data,
        };
        debug!(sheet, key, fields = fields.len(), "batch update");
        self.send(self.client.post(url).json(&body), sheet).await?;
        Ok(true)
    }
}
