//! Google Sheets API client
//!
//! Implements the [`TabularStore`] port over the Sheets REST API (v4).
//! Every call is a single blocking HTTP request authorized with a bearer
//! token obtained by [`CredentialManager`]. The token is renewed before a
//! request once it expires, and once more if Google rejects it.
//!
//! API Documentation: https://developers.google.com/sheets/api/reference/rest

use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use url::Url;

use super::oauth::CredentialManager;
use crate::domain::result::{Error, Result};
use crate::domain::{AuthorizedUser, Row};
use crate::ports::{StoreConnector, TabularStore, ValueInput};

// =============================================================================
// API Models
// =============================================================================

#[derive(Debug, Deserialize)]
struct SpreadsheetMetadata {
    #[serde(default)]
    sheets: Vec<SheetEntry>,
}

#[derive(Debug, Deserialize)]
struct SheetEntry {
    properties: SheetProperties,
}

#[derive(Debug, Deserialize)]
struct SheetProperties {
    title: String,
}

#[derive(Debug, Serialize)]
struct ValuesBody<'a> {
    values: &'a [Row],
}

#[derive(Debug, Deserialize)]
struct BatchGetResponse {
    #[serde(default, rename = "valueRanges")]
    value_ranges: Vec<ValueRange>,
}

#[derive(Debug, Deserialize)]
struct ValueRange {
    #[serde(default)]
    values: Vec<Row>,
}

/// `{"error": {"code": 404, "message": "...", "status": "NOT_FOUND"}}`
#[derive(Debug, Deserialize)]
struct GoogleErrorBody {
    error: GoogleError,
}

#[derive(Debug, Deserialize)]
struct GoogleError {
    #[serde(default)]
    message: String,
}

// =============================================================================
// Sheets HTTP Client
// =============================================================================

/// Default production API URL
pub const SHEETS_PRODUCTION_URL: &str = "https://sheets.googleapis.com/v4";

/// Where the bearer token for each request comes from
enum Bearer {
    Fixed(String),
    Managed {
        credentials: Arc<CredentialManager>,
        user: Mutex<AuthorizedUser>,
    },
}

impl Bearer {
    /// Current access token, renewed first if it has expired
    fn token(&self) -> Result<String> {
        match self {
            Bearer::Fixed(token) => Ok(token.clone()),
            Bearer::Managed { credentials, user } => {
                let mut user = user
                    .lock()
                    .map_err(|_| Error::auth("Credential lock poisoned"))?;
                if !user.is_valid(Utc::now()) {
                    tracing::info!("access token expired, renewing");
                    *user = credentials.obtain()?;
                }
                Ok(user.access_token()?.to_string())
            }
        }
    }

    /// Exchange the refresh token after Google rejected the current token.
    ///
    /// Returns false when there is nothing to renew with.
    fn renew(&self) -> Result<bool> {
        let Bearer::Managed { credentials, user } = self else {
            return Ok(false);
        };
        let mut user = user
            .lock()
            .map_err(|_| Error::auth("Credential lock poisoned"))?;
        if !user.can_refresh() {
            return Ok(false);
        }

        tracing::info!("access token rejected, refreshing");
        let refreshed = credentials.refresh(&user)?;
        credentials.token_file().save(&refreshed)?;
        *user = refreshed;
        Ok(true)
    }
}

impl fmt::Debug for Bearer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bearer::Fixed(_) => f.write_str("Bearer::Fixed"),
            Bearer::Managed { .. } => f.write_str("Bearer::Managed"),
        }
    }
}

/// Sheets client bound to one spreadsheet
#[derive(Debug)]
pub struct SheetsClient {
    client: Client,
    base_url: Url,
    spreadsheet_id: String,
    bearer: Bearer,
}

impl SheetsClient {
    pub fn new(spreadsheet_id: &str, access_token: &str) -> Result<Self> {
        Self::new_with_base_url(spreadsheet_id, access_token, SHEETS_PRODUCTION_URL)
    }

    /// Client with a fixed access token that is never renewed
    pub fn new_with_base_url(
        spreadsheet_id: &str,
        access_token: &str,
        base_url: &str,
    ) -> Result<Self> {
        Self::build(
            spreadsheet_id,
            Bearer::Fixed(access_token.to_string()),
            base_url,
        )
    }

    /// Client that renews `user` through `credentials` as it expires
    pub fn with_credentials(
        spreadsheet_id: &str,
        credentials: Arc<CredentialManager>,
        user: AuthorizedUser,
        base_url: &str,
    ) -> Result<Self> {
        Self::build(
            spreadsheet_id,
            Bearer::Managed {
                credentials,
                user: Mutex::new(user),
            },
            base_url,
        )
    }

    fn build(spreadsheet_id: &str, bearer: Bearer, base_url: &str) -> Result<Self> {
        if spreadsheet_id.trim().is_empty() {
            return Err(Error::config("Spreadsheet ID cannot be empty"));
        }

        let base_url = Url::parse(base_url.trim_end_matches('/'))
            .map_err(|e| Error::config(format!("Invalid Sheets API URL '{}': {}", base_url, e)))?;

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::remote(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url,
            spreadsheet_id: spreadsheet_id.trim().to_string(),
            bearer,
        })
    }

    pub fn spreadsheet_id(&self) -> &str {
        &self.spreadsheet_id
    }

    /// `{base}/spreadsheets/{segments...}`
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| Error::config("Sheets API URL cannot be a base"))?
            .pop_if_empty()
            .push("spreadsheets")
            .extend(segments);
        Ok(url)
    }

    fn values_endpoint(&self, last: &str) -> Result<Url> {
        self.endpoint(&[self.spreadsheet_id.as_str(), "values", last])
    }

    /// Send with the current token; a 401 renews the token and resends once
    fn send(&self, request: RequestBuilder) -> Result<Response> {
        let retry = request.try_clone();
        let response = request
            .bearer_auth(self.bearer.token()?)
            .send()
            .map_err(map_request_error)?;

        if response.status() == StatusCode::UNAUTHORIZED {
            if let Some(retry) = retry {
                if self.bearer.renew()? {
                    let response = retry
                        .bearer_auth(self.bearer.token()?)
                        .send()
                        .map_err(map_request_error)?;
                    return check_response(response);
                }
            }
        }
        check_response(response)
    }

    fn write_values(&self, url: Url, rows: &[Row], put: bool) -> Result<()> {
        let body = ValuesBody { values: rows };
        let request = if put {
            self.client.put(url)
        } else {
            self.client.post(url)
        };
        self.send(request.json(&body))?;
        Ok(())
    }
}

impl TabularStore for SheetsClient {
    fn table_names(&self) -> Result<Vec<String>> {
        let mut url = self.endpoint(&[self.spreadsheet_id.as_str()])?;
        url.query_pairs_mut()
            .append_pair("fields", "sheets.properties.title");

        let metadata: SpreadsheetMetadata = self
            .send(self.client.get(url))?
            .json()
            .map_err(|e| Error::remote(format!("Failed to parse spreadsheet metadata: {}", e)))?;

        Ok(metadata
            .sheets
            .into_iter()
            .map(|s| s.properties.title)
            .collect())
    }

    fn add_tables(&self, names: &[String]) -> Result<()> {
        if names.is_empty() {
            return Ok(());
        }

        let requests: Vec<_> = names
            .iter()
            .map(|title| serde_json::json!({ "addSheet": { "properties": { "title": title } } }))
            .collect();

        let target = format!("{}:batchUpdate", self.spreadsheet_id);
        let url = self.endpoint(&[target.as_str()])?;
        self.send(
            self.client
                .post(url)
                .json(&serde_json::json!({ "requests": requests })),
        )?;
        Ok(())
    }

    fn update(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()> {
        let mut url = self.values_endpoint(range)?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str());
        self.write_values(url, rows, true)
    }

    fn append(&self, range: &str, rows: &[Row], input: ValueInput) -> Result<()> {
        let mut url = self.values_endpoint(&format!("{}:append", range))?;
        url.query_pairs_mut()
            .append_pair("valueInputOption", input.as_str())
            .append_pair("insertDataOption", "INSERT_ROWS");
        self.write_values(url, rows, false)
    }

    fn batch_get(&self, ranges: &[String]) -> Result<Vec<Vec<Row>>> {
        if ranges.is_empty() {
            return Ok(Vec::new());
        }

        let mut url = self.endpoint(&[self.spreadsheet_id.as_str(), "values:batchGet"])?;
        {
            let mut query = url.query_pairs_mut();
            for range in ranges {
                query.append_pair("ranges", range);
            }
        }

        let response: BatchGetResponse = self
            .send(self.client.get(url))?
            .json()
            .map_err(|e| Error::remote(format!("Failed to parse values response: {}", e)))?;

        let mut values: Vec<Vec<Row>> = response
            .value_ranges
            .into_iter()
            .map(|r| r.values)
            .collect();
        values.resize_with(ranges.len(), Vec::new);
        Ok(values)
    }
}

/// Map request errors to user-friendly messages
fn map_request_error(error: reqwest::Error) -> Error {
    if error.is_timeout() {
        Error::remote("Connection timed out after 30 seconds")
    } else if error.is_connect() {
        Error::remote("Unable to connect to Google Sheets")
    } else {
        Error::remote(format!("Google Sheets request failed: {}", error))
    }
}

/// Turn non-2xx responses into typed errors carrying Google's message
fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().unwrap_or_default();
    let message = serde_json::from_str::<GoogleErrorBody>(&body)
        .map(|b| b.error.message)
        .ok()
        .filter(|m| !m.is_empty());
    let detail = message
        .map(|m| format!(": {}", m))
        .unwrap_or_default();

    match status.as_u16() {
        401 => Err(Error::auth(format!(
            "Google rejected the access token{}. Run `bsheet auth` to re-authorize.",
            detail
        ))),
        403 => Err(Error::auth(format!(
            "Access to the spreadsheet was denied{}",
            detail
        ))),
        404 => Err(Error::remote(format!("Spreadsheet not found{}", detail))),
        429 => Err(Error::remote(
            "Google Sheets rate limit exceeded. Please wait a moment and try again.",
        )),
        code => Err(Error::remote(format!(
            "Google Sheets API error: HTTP {}{}",
            code, detail
        ))),
    }
}

// =============================================================================
// GoogleSheetsConnector - implements StoreConnector
// =============================================================================

/// Authenticates with Google and connects to the configured spreadsheet
pub struct GoogleSheetsConnector {
    credentials: Arc<CredentialManager>,
    spreadsheet_id: Option<String>,
    base_url: String,
}

impl GoogleSheetsConnector {
    pub fn new(credentials: CredentialManager, spreadsheet_id: Option<String>) -> Self {
        Self {
            credentials: Arc::new(credentials),
            spreadsheet_id: spreadsheet_id.filter(|id| !id.trim().is_empty()),
            base_url: SHEETS_PRODUCTION_URL.to_string(),
        }
    }

    /// Point at a different API host (used for tests)
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

impl StoreConnector for GoogleSheetsConnector {
    fn name(&self) -> &str {
        "google-sheets"
    }

    fn connect(&self) -> Result<Arc<dyn TabularStore>> {
        let spreadsheet_id = self.spreadsheet_id.as_deref().ok_or_else(|| {
            Error::config(
                "No spreadsheet ID configured. Set GOOGLE_SHEET_ID or run `bsheet setup --sheet-id <ID>`",
            )
        })?;

        let user = self.credentials.obtain()?;
        let client = SheetsClient::with_credentials(
            spreadsheet_id,
            Arc::clone(&self.credentials),
            user,
            &self.base_url,
        )?;
        tracing::debug!(spreadsheet_id, "connected to Google Sheets");
        Ok(Arc::new(client))
    }
}
