//! Client for the spreadsheet-backed report store: authenticates with a
//! service account and appends/reads report rows.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client;
use shared::{
    domain::{Coordinate, Report},
    error::StoreError,
    protocol::{AppendResponse, AppendRowsRequest, CellValue, ValueRange},
};
use tracing::{debug, info, warn};
use url::Url;

pub mod auth;
pub mod config;
pub mod transport;

pub use auth::{AccessToken, CachedTokenSource, ServiceAccountTokenSource, TokenSource};
pub use config::{load_settings, StoreSettings};

const VALUE_INPUT_OPTION: &str = "USER_ENTERED";

/// Confirmation of an appended report.
#[derive(Debug, Clone, PartialEq)]
pub struct AppendReceipt {
    pub report: Report,
    pub updated_range: Option<String>,
}

#[async_trait]
pub trait ReportStore: Send + Sync {
    async fn add_report(&self, latitude: f64, longitude: f64)
        -> Result<AppendReceipt, StoreError>;
    /// Raw `[timestamp, latitude, longitude]` rows in store order. Rows are
    /// not parsed here.
    async fn get_reports(&self) -> Result<Vec<Vec<CellValue>>, StoreError>;
}

pub struct SheetsReportStore {
    http: Client,
    settings: Arc<StoreSettings>,
    tokens: Arc<dyn TokenSource>,
}

impl SheetsReportStore {
    pub fn new(settings: StoreSettings) -> Result<Self, StoreError> {
        let http = transport::build_http_client(settings.request_timeout)?;
        let settings = Arc::new(settings);
        let source = ServiceAccountTokenSource::new(http.clone(), settings.clone());
        let tokens: Arc<dyn TokenSource> = if settings.token_cache {
            Arc::new(CachedTokenSource::new(source))
        } else {
            Arc::new(source)
        };
        Ok(Self {
            http,
            settings,
            tokens,
        })
    }

    pub fn with_token_source(
        settings: StoreSettings,
        tokens: Arc<dyn TokenSource>,
    ) -> Result<Self, StoreError> {
        let http = transport::build_http_client(settings.request_timeout)?;
        Ok(Self {
            http,
            settings: Arc::new(settings),
            tokens,
        })
    }

    pub fn settings(&self) -> &StoreSettings {
        &self.settings
    }

    pub async fn access_token(&self) -> Result<AccessToken, StoreError> {
        self.tokens.access_token().await
    }

    fn values_url(&self, append: bool) -> Result<Url, StoreError> {
        let base = &self.settings.sheets_api_base;
        let mut url = Url::parse(base)
            .map_err(|err| StoreError::Config(format!("invalid sheets api base '{base}': {err}")))?;
        let range = if append {
            format!("{}:append", self.settings.sheet_name)
        } else {
            self.settings.sheet_name.clone()
        };

        url.path_segments_mut()
            .map_err(|_| StoreError::Config(format!("sheets api base '{base}' cannot hold a path")))?
            .pop_if_empty()
            .extend([self.settings.sheet_id.as_str(), "values", range.as_str()]);

        if append {
            url.query_pairs_mut()
                .append_pair("valueInputOption", VALUE_INPUT_OPTION);
        }
        Ok(url)
    }
}

#[async_trait]
impl ReportStore for SheetsReportStore {
    async fn add_report(
        &self,
        latitude: f64,
        longitude: f64,
    ) -> Result<AppendReceipt, StoreError> {
        let coordinate = Coordinate::new(latitude, longitude)
            .map_err(|err| StoreError::Submit(err.to_string()))?;
        let token = self.tokens.access_token().await?;
        let report = Report::submitted_at(Utc::now(), coordinate);
        let url = self.values_url(true)?;

        debug!(%url, "appending report row");
        let res = self
            .http
            .post(url)
            .bearer_auth(token.secret())
            .json(&AppendRowsRequest {
                values: vec![report.to_row()],
            })
            .send()
            .await
            .map_err(|err| StoreError::Submit(transport::describe_request_error(&err)))?;

        let status = res.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "append rejected by store");
            let message = transport::remote_error_message(res)
                .await
                .unwrap_or_else(|| format!("append request failed with status {status}"));
            return Err(StoreError::Submit(message));
        }

        let body: AppendResponse = res
            .json()
            .await
            .map_err(|err| StoreError::Submit(format!("malformed append response: {err}")))?;
        let updated_range = body.updates.and_then(|updates| updates.updated_range);
        info!(
            timestamp = %report.timestamp,
            latitude,
            longitude,
            updated_range = updated_range.as_deref().unwrap_or("-"),
            "report appended"
        );

        Ok(AppendReceipt {
            report,
            updated_range,
        })
    }

    async fn get_reports(&self) -> Result<Vec<Vec<CellValue>>, StoreError> {
        let token = self.tokens.access_token().await?;
        let url = self.values_url(false)?;

        debug!(%url, "reading report rows");
        let res = self
            .http
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|err| StoreError::Fetch(transport::describe_request_error(&err)))?;

        let status = res.status();
        if !status.is_success() {
            warn!(status = status.as_u16(), "read rejected by store");
            let message = transport::remote_error_message(res)
                .await
                .unwrap_or_else(|| format!("read request failed with status {status}"));
            return Err(StoreError::Fetch(message));
        }

        let body: ValueRange = res
            .json()
            .await
            .map_err(|err| StoreError::Fetch(format!("malformed values response: {err}")))?;
        let rows = body.values.unwrap_or_default();
        info!(rows = rows.len(), "report rows fetched");
        Ok(rows)
    }
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
