use std::{collections::HashMap, fmt, fs, path::Path, time::Duration};

use serde::Deserialize;
use shared::error::StoreError;
use tracing::warn;

pub const SETTINGS_FILE: &str = "reporter.toml";
pub const DEFAULT_SHEET_NAME: &str = "Sheet1";
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const DEFAULT_SHEETS_API_BASE: &str = "https://sheets.googleapis.com/v4/spreadsheets";
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Process-wide store configuration. Loaded once at startup and never
/// mutated afterwards.
#[derive(Clone)]
pub struct StoreSettings {
    pub sheet_id: String,
    pub sheet_name: String,
    pub service_account_email: String,
    pub private_key: String,
    pub token_url: String,
    pub sheets_api_base: String,
    pub request_timeout: Duration,
    pub token_cache: bool,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            sheet_id: String::new(),
            sheet_name: DEFAULT_SHEET_NAME.into(),
            service_account_email: String::new(),
            private_key: String::new(),
            token_url: DEFAULT_TOKEN_URL.into(),
            sheets_api_base: DEFAULT_SHEETS_API_BASE.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            token_cache: false,
        }
    }
}

impl fmt::Debug for StoreSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreSettings")
            .field("sheet_id", &self.sheet_id)
            .field("sheet_name", &self.sheet_name)
            .field("service_account_email", &self.service_account_email)
            .field("private_key", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("sheets_api_base", &self.sheets_api_base)
            .field("request_timeout", &self.request_timeout)
            .field("token_cache", &self.token_cache)
            .finish()
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileSettings {
    sheet_id: Option<String>,
    sheet_name: Option<String>,
    service_account_email: Option<String>,
    private_key: Option<String>,
    token_url: Option<String>,
    sheets_api_base: Option<String>,
    request_timeout_secs: Option<u64>,
    token_cache: Option<bool>,
}

pub fn load_settings() -> Result<StoreSettings, StoreError> {
    let env: HashMap<String, String> = std::env::vars().collect();
    load_settings_from(Path::new(SETTINGS_FILE), &env)
}

/// Defaults, then the optional settings file, then environment variables.
/// The `APP__` prefixed variable wins over the bare one.
pub fn load_settings_from(
    path: &Path,
    env: &HashMap<String, String>,
) -> Result<StoreSettings, StoreError> {
    let mut settings = StoreSettings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        match toml::from_str::<FileSettings>(&raw) {
            Ok(file_cfg) => apply_file_settings(&mut settings, file_cfg),
            Err(err) => warn!(path = %path.display(), "ignoring unreadable settings file: {err}"),
        }
    }

    let lookup = |keys: &[&str]| {
        keys.iter()
            .rev()
            .find_map(|key| env.get(*key).filter(|v| !v.trim().is_empty()).cloned())
    };

    if let Some(v) = lookup(&["SHEET_ID", "APP__SHEET_ID"]) {
        settings.sheet_id = v;
    }
    if let Some(v) = lookup(&["SHEET_NAME", "APP__SHEET_NAME"]) {
        settings.sheet_name = v;
    }
    if let Some(v) = lookup(&["SERVICE_ACCOUNT_EMAIL", "APP__SERVICE_ACCOUNT_EMAIL"]) {
        settings.service_account_email = v;
    }
    if let Some(v) = lookup(&["PRIVATE_KEY", "APP__PRIVATE_KEY"]) {
        settings.private_key = v;
    }
    if let Some(v) = lookup(&["APP__TOKEN_URL"]) {
        settings.token_url = v;
    }
    if let Some(v) = lookup(&["APP__SHEETS_API_BASE"]) {
        settings.sheets_api_base = v;
    }
    if let Some(v) = lookup(&["APP__REQUEST_TIMEOUT_SECS"]) {
        match v.parse::<u64>() {
            Ok(secs) if secs > 0 => settings.request_timeout = Duration::from_secs(secs),
            _ => warn!(value = %v, "ignoring invalid APP__REQUEST_TIMEOUT_SECS"),
        }
    }
    if let Some(v) = lookup(&["APP__TOKEN_CACHE"]) {
        settings.token_cache = matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes");
    }

    settings.private_key = unescape_private_key(&settings.private_key);
    validate(&settings)?;
    Ok(settings)
}

fn apply_file_settings(settings: &mut StoreSettings, file_cfg: FileSettings) {
    if let Some(v) = file_cfg.sheet_id {
        settings.sheet_id = v;
    }
    if let Some(v) = file_cfg.sheet_name {
        settings.sheet_name = v;
    }
    if let Some(v) = file_cfg.service_account_email {
        settings.service_account_email = v;
    }
    if let Some(v) = file_cfg.private_key {
        settings.private_key = v;
    }
    if let Some(v) = file_cfg.token_url {
        settings.token_url = v;
    }
    if let Some(v) = file_cfg.sheets_api_base {
        settings.sheets_api_base = v;
    }
    if let Some(secs) = file_cfg.request_timeout_secs.filter(|secs| *secs > 0) {
        settings.request_timeout = Duration::from_secs(secs);
    }
    if let Some(v) = file_cfg.token_cache {
        settings.token_cache = v;
    }
}

/// Keys shipped through env files usually carry literal `\n` sequences.
pub fn unescape_private_key(raw: &str) -> String {
    raw.trim().trim_matches('"').replace("\\n", "\n")
}

fn validate(settings: &StoreSettings) -> Result<(), StoreError> {
    let missing: Vec<&str> = [
        ("sheet id", settings.sheet_id.as_str()),
        ("sheet name", settings.sheet_name.as_str()),
        ("service account email", settings.service_account_email.as_str()),
        ("private key", settings.private_key.as_str()),
    ]
    .into_iter()
    .filter(|(_, value)| value.trim().is_empty())
    .map(|(name, _)| name)
    .collect();

    if !missing.is_empty() {
        return Err(StoreError::Config(format!(
            "missing required settings: {}",
            missing.join(", ")
        )));
    }
    Ok(())
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
