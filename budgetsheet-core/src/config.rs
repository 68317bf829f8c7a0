//! Configuration management
//!
//! Settings live in `settings.json` in the application directory:
//! ```json
//! {
//!   "sheets": {
//!     "spreadsheetId": "1AbC...",
//!     "credentialsPath": "/home/me/.budgetsheet/credentials.json",
//!     "categories": ["equipment", "salaries", "marketing", "miscellaneous"]
//!   },
//!   "server": { "bindAddress": "127.0.0.1:8000" },
//!   "app": { "demoMode": false }
//! }
//! ```
//! Environment variables override the file.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::adapters::sheets::SHEETS_PRODUCTION_URL;
use crate::domain::DEFAULT_CATEGORIES;

pub const SPREADSHEET_ID_ENV: &str = "GOOGLE_SHEET_ID";
pub const CREDENTIALS_ENV: &str = "BUDGETSHEET_CREDENTIALS";
pub const TOKEN_ENV: &str = "BUDGETSHEET_TOKEN";
pub const SHEETS_URL_ENV: &str = "BUDGETSHEET_SHEETS_URL";
pub const DEMO_MODE_ENV: &str = "BUDGETSHEET_DEMO_MODE";

pub const DEFAULT_BIND_ADDRESS: &str = "127.0.0.1:8000";

/// Raw settings.json structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SettingsFile {
    #[serde(default)]
    sheets: SheetsSettings,
    #[serde(default)]
    server: ServerSettings,
    #[serde(default)]
    app: AppSettings,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SheetsSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    spreadsheet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    credentials_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    token_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    base_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    categories: Option<Vec<String>>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ServerSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bind_address: Option<String>,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AppSettings {
    #[serde(default)]
    demo_mode: bool,
    #[serde(flatten)]
    other: HashMap<String, serde_json::Value>,
}

/// Resolved configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub spreadsheet_id: Option<String>,
    pub credentials_path: PathBuf,
    pub token_path: PathBuf,
    pub sheets_base_url: String,
    pub categories: Vec<String>,
    pub bind_address: String,
    pub demo_mode: bool,
}

impl Config {
    /// Defaults for an application directory
    pub fn defaults(app_dir: &Path) -> Self {
        Self {
            spreadsheet_id: None,
            credentials_path: app_dir.join("credentials.json"),
            token_path: app_dir.join("token.json"),
            sheets_base_url: SHEETS_PRODUCTION_URL.to_string(),
            categories: DEFAULT_CATEGORIES.iter().map(|c| c.to_string()).collect(),
            bind_address: DEFAULT_BIND_ADDRESS.to_string(),
            demo_mode: false,
        }
    }

    /// Load settings.json from `app_dir` and apply environment overrides.
    ///
    /// A missing or unparsable settings file yields the defaults.
    pub fn load(app_dir: &Path) -> Result<Self> {
        let raw = read_settings(app_dir)?;
        let mut config = Self::defaults(app_dir);

        config.spreadsheet_id = raw.sheets.spreadsheet_id.filter(|s| !s.trim().is_empty());
        if let Some(path) = raw.sheets.credentials_path {
            config.credentials_path = path;
        }
        if let Some(path) = raw.sheets.token_path {
            config.token_path = path;
        }
        if let Some(url) = raw.sheets.base_url {
            config.sheets_base_url = url;
        }
        if let Some(categories) = raw.sheets.categories.filter(|c| !c.is_empty()) {
            config.categories = categories;
        }
        if let Some(addr) = raw.server.bind_address {
            config.bind_address = addr;
        }
        config.demo_mode = raw.app.demo_mode;

        config.apply_env();
        Ok(config)
    }

    fn apply_env(&mut self) {
        if let Some(id) = env_value(SPREADSHEET_ID_ENV) {
            self.spreadsheet_id = Some(id);
        }
        if let Some(path) = env_value(CREDENTIALS_ENV) {
            self.credentials_path = PathBuf::from(path);
        }
        if let Some(path) = env_value(TOKEN_ENV) {
            self.token_path = PathBuf::from(path);
        }
        if let Some(url) = env_value(SHEETS_URL_ENV) {
            self.sheets_base_url = url;
        }
        match env_value(DEMO_MODE_ENV).as_deref() {
            Some("true" | "1" | "yes" | "TRUE" | "YES") => self.demo_mode = true,
            Some("false" | "0" | "no" | "FALSE" | "NO") => self.demo_mode = false,
            _ => {}
        }
    }

    /// Save to settings.json, preserving settings this tool does not manage.
    ///
    /// Values equal to the defaults are not written out.
    pub fn save(&self, app_dir: &Path) -> Result<()> {
        std::fs::create_dir_all(app_dir)
            .with_context(|| format!("Failed to create {}", app_dir.display()))?;
        let mut settings = read_settings(app_dir)?;
        let defaults = Self::defaults(app_dir);

        settings.sheets.spreadsheet_id = self.spreadsheet_id.clone();
        settings.sheets.credentials_path = (self.credentials_path != defaults.credentials_path)
            .then(|| self.credentials_path.clone());
        settings.sheets.token_path =
            (self.token_path != defaults.token_path).then(|| self.token_path.clone());
        settings.sheets.base_url = (self.sheets_base_url != defaults.sheets_base_url)
            .then(|| self.sheets_base_url.clone());
        settings.sheets.categories =
            (self.categories != defaults.categories).then(|| self.categories.clone());
        settings.server.bind_address =
            (self.bind_address != defaults.bind_address).then(|| self.bind_address.clone());
        settings.app.demo_mode = self.demo_mode;

        let content = serde_json::to_string_pretty(&settings)?;
        std::fs::write(settings_path(app_dir), content)?;
        Ok(())
    }

    pub fn enable_demo_mode(&mut self) {
        self.demo_mode = true;
    }

    pub fn disable_demo_mode(&mut self) {
        self.demo_mode = false;
    }
}

fn settings_path(app_dir: &Path) -> PathBuf {
    app_dir.join("settings.json")
}

fn read_settings(app_dir: &Path) -> Result<SettingsFile> {
    let path = settings_path(app_dir);
    if !path.exists() {
        return Ok(SettingsFile::default());
    }
    let content = std::fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(serde_json::from_str(&content).unwrap_or_default())
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}
