//! HTTP plumbing shared by the token exchange and the values API calls.

use std::time::Duration;

use reqwest::{Client, Response};
use shared::{error::StoreError, protocol::RemoteErrorBody};

pub fn build_http_client(timeout: Duration) -> Result<Client, StoreError> {
    Client::builder()
        .timeout(timeout)
        .build()
        .map_err(|err| StoreError::Config(format!("failed to build http client: {err}")))
}

pub fn describe_request_error(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("failed to connect: {err}")
    } else {
        format!("transport error: {err}")
    }
}

/// Pulls the message out of an error body; `None` when the body is empty or
/// not one of the known envelopes.
pub async fn remote_error_message(response: Response) -> Option<String> {
    let raw = response.text().await.ok()?;
    serde_json::from_str::<RemoteErrorBody>(&raw).ok()?.message()
}
