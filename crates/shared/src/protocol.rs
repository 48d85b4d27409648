//! Wire payloads exchanged with the token endpoint and the spreadsheet
//! values API.

use serde::{Deserialize, Serialize};

/// A single spreadsheet cell as it travels over the wire. Reads may return
/// strings or numbers depending on how the store rendered the cell.
pub type CellValue = serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<i64>,
    #[serde(default)]
    pub token_type: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppendRowsRequest {
    pub values: Vec<Vec<CellValue>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValueRange {
    #[serde(default)]
    pub range: Option<String>,
    #[serde(default)]
    pub major_dimension: Option<String>,
    /// Omitted entirely by the store when the range holds no data.
    #[serde(default)]
    pub values: Option<Vec<Vec<CellValue>>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppendResponse {
    #[serde(default)]
    pub spreadsheet_id: Option<String>,
    #[serde(default)]
    pub table_range: Option<String>,
    #[serde(default)]
    pub updates: Option<UpdateSummary>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSummary {
    #[serde(default)]
    pub updated_range: Option<String>,
    #[serde(default)]
    pub updated_rows: Option<u32>,
    #[serde(default)]
    pub updated_cells: Option<u32>,
}

/// Error envelope. The values API nests `{error: {code, message, status}}`
/// while the OAuth endpoint answers `{error: "invalid_grant",
/// error_description: "..."}`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RemoteErrorBody {
    #[serde(default)]
    pub error: Option<RemoteErrorField>,
    #[serde(default)]
    pub error_description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum RemoteErrorField {
    Detailed {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        status: Option<String>,
    },
    Code(String),
}

impl RemoteErrorBody {
    /// Most specific human readable message in the body, if any.
    pub fn message(&self) -> Option<String> {
        let detailed = match &self.error {
            Some(RemoteErrorField::Detailed { message, .. }) => message.clone(),
            _ => None,
        };
        let code = match &self.error {
            Some(RemoteErrorField::Code(code)) => Some(code.clone()),
            Some(RemoteErrorField::Detailed { status, .. }) => status.clone(),
            None => None,
        };

        detailed
            .or_else(|| self.error_description.clone())
            .or(code)
            .map(|message| message.trim().to_string())
            .filter(|message| !message.is_empty())
    }
}

#[cfg(test)]
#[path = "tests/protocol_tests.rs"]
mod tests;
