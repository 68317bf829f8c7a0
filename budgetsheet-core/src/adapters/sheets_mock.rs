//! Mock Google Sheets API server for testing
//!
//! Serves the Sheets v4 endpoints the client uses, backed by a
//! [`MemoryStore`], plus an OAuth token endpoint:
//! - GET  /spreadsheets/{id} returns sheet titles
//! - POST /spreadsheets/{id}:batchUpdate handles `addSheet` requests
//! - PUT  /spreadsheets/{id}/values/{range} writes cells
//! - POST /spreadsheets/{id}/values/{range}:append appends rows
//! - GET  /spreadsheets/{id}/values:batchGet reads ranges
//! - POST /token answers refresh-token grants

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use serde::Deserialize;
use serde_json::json;
use url::Url;

use super::memory::MemoryStore;
use crate::domain::result::Error;
use crate::domain::Row;
use crate::ports::{TabularStore, ValueInput};

pub const MOCK_SPREADSHEET_ID: &str = "mock-spreadsheet";
pub const MOCK_REFRESHED_TOKEN: &str = "mock_refreshed_token";

/// Mock Sheets server for testing
pub struct MockSheetsServer {
    port: u16,
    store: Arc<MemoryStore>,
    running: Arc<AtomicBool>,
    thread_handle: Option<thread::JoinHandle<()>>,
}

#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Spreadsheet ID the server answers for; anything else is a 404
    pub spreadsheet_id: String,
    /// Reject every bearer token with 401
    pub fail_auth: bool,
    /// Answer every Sheets call with 429
    pub rate_limit: bool,
    /// Answer refresh grants with `invalid_grant`
    pub revoke_refresh: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            spreadsheet_id: MOCK_SPREADSHEET_ID.to_string(),
            fail_auth: false,
            rate_limit: false,
            revoke_refresh: false,
        }
    }
}

#[derive(Deserialize)]
struct ValuesBody {
    #[serde(default)]
    values: Vec<Row>,
}

#[derive(Deserialize)]
struct BatchUpdateBody {
    #[serde(default)]
    requests: Vec<serde_json::Value>,
}

impl MockSheetsServer {
    /// Start on a random port over an empty store
    pub fn start(config: MockConfig) -> std::io::Result<Self> {
        Self::start_with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn start_with_store(config: MockConfig, store: Arc<MemoryStore>) -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")?;
        let port = listener.local_addr()?.port();
        let running = Arc::new(AtomicBool::new(true));
        let running_clone = running.clone();
        let store_clone = store.clone();

        listener.set_nonblocking(true)?;

        let thread_handle = thread::spawn(move || {
            while running_clone.load(Ordering::SeqCst) {
                match listener.accept() {
                    Ok((stream, _)) => {
                        let cfg = config.clone();
                        let store = store_clone.clone();
                        thread::spawn(move || handle_connection(stream, &cfg, &store));
                    }
                    Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(std::time::Duration::from_millis(10));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            store,
            running,
            thread_handle: Some(thread_handle),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    pub fn token_uri(&self) -> String {
        format!("{}/token", self.base_url())
    }

    /// The store behind the server
    pub fn store(&self) -> Arc<MemoryStore> {
        self.store.clone()
    }

    pub fn stop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(handle) = self.thread_handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for MockSheetsServer {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Request {
    method: String,
    target: String,
    headers: String,
    body: Vec<u8>,
}

/// Read the request head and a Content-Length body
fn read_request(stream: &mut TcpStream) -> Option<Request> {
    stream.set_nonblocking(false).ok()?;
    let mut data = Vec::new();
    let mut buffer = [0; 4096];

    let head_end = loop {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            return None;
        }
        data.extend_from_slice(&buffer[..n]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let head = String::from_utf8_lossy(&data[..head_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|l| l.split_once(':'))
        .find(|(k, _)| k.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, v)| v.trim().parse::<usize>().ok())
        .unwrap_or(0);

    while data.len() < head_end + content_length {
        let n = stream.read(&mut buffer).ok()?;
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buffer[..n]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    Some(Request {
        method: request_line.next()?.to_string(),
        target: request_line.next()?.to_string(),
        headers: head.to_lowercase(),
        body: data[head_end..].to_vec(),
    })
}

fn handle_connection(mut stream: TcpStream, config: &MockConfig, store: &MemoryStore) {
    let Some(request) = read_request(&mut stream) else {
        send_response(&mut stream, 400, "Bad Request", &google_error(400, "Invalid request"));
        return;
    };

    let Ok(url) = Url::parse(&format!("http://mock{}", request.target)) else {
        send_response(&mut stream, 400, "Bad Request", &google_error(400, "Invalid path"));
        return;
    };

    if request.method == "POST" && url.path() == "/token" {
        handle_token(&mut stream, config, &request.body);
        return;
    }

    if config.fail_auth || !request.headers.contains("authorization: bearer mock_") {
        send_response(
            &mut stream,
            401,
            "Unauthorized",
            &google_error(401, "Request had invalid authentication credentials."),
        );
        return;
    }

    if config.rate_limit {
        send_response(
            &mut stream,
            429,
            "Too Many Requests",
            &google_error(429, "Quota exceeded for quota metric 'Read requests'"),
        );
        return;
    }

    let segments: Vec<String> = url
        .path_segments()
        .map(|s| s.map(decode_segment).collect())
        .unwrap_or_default();
    let query: Vec<(String, String)> = url.query_pairs().into_owned().collect();
    let query_value = |key: &str| {
        query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    };

    if segments.first().map(String::as_str) != Some("spreadsheets") || segments.len() < 2 {
        send_response(&mut stream, 404, "Not Found", &google_error(404, "Endpoint not found"));
        return;
    }

    let (id, action) = match segments[1].split_once(':') {
        Some((id, action)) => (id.to_string(), Some(action.to_string())),
        None => (segments[1].clone(), None),
    };
    if id != config.spreadsheet_id {
        send_response(
            &mut stream,
            404,
            "Not Found",
            &google_error(404, "Requested entity was not found."),
        );
        return;
    }

    let rest: Vec<&str> = segments[2..].iter().map(String::as_str).collect();
    let input = match query_value("valueInputOption").as_deref() {
        Some("RAW") => ValueInput::Raw,
        _ => ValueInput::UserEntered,
    };

    let outcome: Result<serde_json::Value, Error> = match (
        request.method.as_str(),
        action.as_deref(),
        rest.as_slice(),
    ) {
        ("GET", None, []) => store.table_names().map(|names| {
            json!({
                "sheets": names
                    .iter()
                    .map(|t| json!({ "properties": { "title": t } }))
                    .collect::<Vec<_>>()
            })
        }),
        ("POST", Some("batchUpdate"), []) => {
            match serde_json::from_slice::<BatchUpdateBody>(&request.body) {
                Ok(body) => {
                    let titles: Vec<String> = body
                        .requests
                        .iter()
                        .filter_map(|r| r["addSheet"]["properties"]["title"].as_str())
                        .map(str::to_string)
                        .collect();
                    store
                        .add_tables(&titles)
                        .map(|_| json!({ "spreadsheetId": id, "replies": [] }))
                }
                Err(e) => Err(Error::validation(e.to_string())),
            }
        }
        ("GET", None, ["values:batchGet"]) => {
            let ranges: Vec<String> = query
                .iter()
                .filter(|(k, _)| k == "ranges")
                .map(|(_, v)| v.clone())
                .collect();
            store.batch_get(&ranges).map(|values| {
                let value_ranges: Vec<_> = ranges
                    .iter()
                    .zip(values)
                    .map(|(range, rows)| {
                        if rows.is_empty() {
                            json!({ "range": range, "majorDimension": "ROWS" })
                        } else {
                            json!({ "range": range, "majorDimension": "ROWS", "values": rows })
                        }
                    })
                    .collect();
                json!({ "spreadsheetId": id, "valueRanges": value_ranges })
            })
        }
        ("PUT", None, ["values", range]) => match serde_json::from_slice::<ValuesBody>(&request.body)
        {
            Ok(body) => store
                .update(range, &body.values, input)
                .map(|_| json!({ "spreadsheetId": id, "updatedRange": range })),
            Err(e) => Err(Error::validation(e.to_string())),
        },
        ("POST", None, ["values", target]) if target.ends_with(":append") => {
            let range = target.trim_end_matches(":append");
            match serde_json::from_slice::<ValuesBody>(&request.body) {
                Ok(body) => store
                    .append(range, &body.values, input)
                    .map(|_| json!({ "spreadsheetId": id, "tableRange": range })),
                Err(e) => Err(Error::validation(e.to_string())),
            }
        }
        _ => {
            send_response(&mut stream, 404, "Not Found", &google_error(404, "Endpoint not found"));
            return;
        }
    };

    match outcome {
        Ok(body) => send_response(&mut stream, 200, "OK", &body.to_string()),
        Err(Error::Remote(message)) | Err(Error::Validation(message)) => {
            send_response(&mut stream, 400, "Bad Request", &google_error(400, &message))
        }
        Err(e) => send_response(
            &mut stream,
            500,
            "Internal Server Error",
            &google_error(500, &e.to_string()),
        ),
    }
}

fn handle_token(stream: &mut TcpStream, config: &MockConfig, body: &[u8]) {
    let form: Vec<(String, String)> = url::form_urlencoded::parse(body).into_owned().collect();
    let grant = form
        .iter()
        .find(|(k, _)| k == "grant_type")
        .map(|(_, v)| v.as_str());

    if grant != Some("refresh_token") || config.revoke_refresh {
        let body = json!({
            "error": "invalid_grant",
            "error_description": "Token has been expired or revoked."
        });
        send_response(stream, 400, "Bad Request", &body.to_string());
        return;
    }

    let body = json!({
        "access_token": MOCK_REFRESHED_TOKEN,
        "expires_in": 3599,
        "scope": crate::domain::SHEETS_SCOPE,
        "token_type": "Bearer"
    });
    send_response(stream, 200, "OK", &body.to_string());
}

/// Percent-decode one path segment
fn decode_segment(segment: &str) -> String {
    // Sheet ranges never contain '&', '=' or '+', so form decoding is exact
    url::form_urlencoded::parse(segment.as_bytes())
        .next()
        .map(|(k, _)| k.into_owned())
        .unwrap_or_default()
}

fn google_error(code: u16, message: &str) -> String {
    json!({ "error": { "code": code, "message": message, "status": "ERROR" } }).to_string()
}

fn send_response(stream: &mut TcpStream, status: u16, status_text: &str, body: &str) {
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: application/json; charset=UTF-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        status_text,
        body.len(),
        body
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::oauth::{CredentialManager, TokenFile};
    use crate::adapters::sheets::{GoogleSheetsConnector, SheetsClient};
    use crate::domain::{AuthorizedUser, Expense, LedgerData, SHEETS_SCOPE};
    use crate::ports::StoreConnector;
    use crate::services::LedgerService;
    use chrono::{Duration, NaiveDate, Utc};
    use rust_decimal::Decimal;
    use tempfile::tempdir;

    fn client(server: &MockSheetsServer) -> SheetsClient {
        SheetsClient::new_with_base_url(MOCK_SPREADSHEET_ID, "mock_token", &server.base_url())
            .unwrap()
    }

    fn expired_user(token_uri: String) -> AuthorizedUser {
        AuthorizedUser {
            token: Some("mock_stale".to_string()),
            refresh_token: Some("1//refresh".to_string()),
            token_uri,
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![SHEETS_SCOPE.to_string()],
            expiry: Some(Utc::now() - Duration::hours(1)),
            other: Default::default(),
        }
    }

    #[test]
    fn test_mock_server_starts() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        assert!(server.port() > 0);
    }

    #[test]
    fn test_client_tables_and_values() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let client = client(&server);

        client
            .add_tables(&["Budget Overview".to_string(), "Expenses".to_string()])
            .unwrap();
        assert_eq!(
            client.table_names().unwrap(),
            vec!["Budget Overview", "Expenses"]
        );

        client
            .update(
                "'Budget Overview'!A1",
                &[vec![json!("Total Budget"), json!("Last Updated")]],
                ValueInput::Raw,
            )
            .unwrap();
        client
            .append("Expenses!A2", &[vec![json!("2024-01-01"), json!(12.5)]], ValueInput::UserEntered)
            .unwrap();

        let values = client
            .batch_get(&[
                "'Budget Overview'!A1:D1".to_string(),
                "Expenses!A2:E".to_string(),
                "Expenses!A10:E".to_string(),
            ])
            .unwrap();
        assert_eq!(values.len(), 3);
        assert_eq!(values[0][0][1], json!("Last Updated"));
        assert_eq!(values[1], vec![vec![json!("2024-01-01"), json!(12.5)]]);
        assert!(values[2].is_empty());

        assert_eq!(
            server.store().requests().last(),
            Some(&crate::adapters::memory::StoreRequest::BatchGet(vec![
                "'Budget Overview'!A1:D1".to_string(),
                "Expenses!A2:E".to_string(),
                "Expenses!A10:E".to_string(),
            ]))
        );
    }

    #[test]
    fn test_value_input_option_is_forwarded() {
        let server = MockSheetsServer::start_with_store(
            MockConfig::default(),
            Arc::new(MemoryStore::with_tables(&["Categories"])),
        )
        .unwrap();
        let client = client(&server);

        client
            .update("Categories!A1", &[vec![json!("Category")]], ValueInput::Raw)
            .unwrap();

        assert!(server.store().requests().iter().any(|r| matches!(
            r,
            crate::adapters::memory::StoreRequest::Update { input: ValueInput::Raw, .. }
        )));
    }

    #[test]
    fn test_auth_failure_is_auth_error() {
        let server = MockSheetsServer::start(MockConfig {
            fail_auth: true,
            ..Default::default()
        })
        .unwrap();

        let err = client(&server).table_names().unwrap_err();
        assert!(matches!(err, Error::Auth(_)), "got {:?}", err);
        assert!(err.to_string().contains("invalid authentication credentials"));
    }

    #[test]
    fn test_rate_limit_is_remote_error() {
        let server = MockSheetsServer::start(MockConfig {
            rate_limit: true,
            ..Default::default()
        })
        .unwrap();

        let err = client(&server).table_names().unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.to_string().to_lowercase().contains("rate limit"));
    }

    #[test]
    fn test_unknown_spreadsheet_is_not_found() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let client =
            SheetsClient::new_with_base_url("other-sheet", "mock_token", &server.base_url())
                .unwrap();

        let err = client.table_names().unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.to_string().contains("Spreadsheet not found"));
    }

    #[test]
    fn test_bad_range_carries_google_message() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();

        let err = client(&server)
            .update("Missing!A1", &[vec![json!(1)]], ValueInput::Raw)
            .unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
        assert!(err.to_string().contains("Unable to parse range: Missing!A1"));
    }

    #[test]
    fn test_unreachable_server() {
        let client =
            SheetsClient::new_with_base_url(MOCK_SPREADSHEET_ID, "mock_token", "http://127.0.0.1:9")
                .unwrap();
        let err = client.table_names().unwrap_err();
        assert!(matches!(err, Error::Remote(_)));
    }

    #[test]
    fn test_connector_requires_spreadsheet_id() {
        let dir = tempdir().unwrap();
        let manager = CredentialManager::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        )
        .unwrap()
        .interactive(false);

        let connector = GoogleSheetsConnector::new(manager, Some("  ".to_string()));
        let err = connector.connect().err().unwrap();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_connector_refreshes_expired_token() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        TokenFile::new(&token_path)
            .save(&expired_user(server.token_uri()))
            .unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let connector = GoogleSheetsConnector::new(manager, Some(MOCK_SPREADSHEET_ID.to_string()))
            .with_base_url(server.base_url());

        let store = connector.connect().unwrap();
        assert!(store.table_names().unwrap().is_empty());

        let saved = TokenFile::new(&token_path).load().unwrap().unwrap();
        assert_eq!(saved.token.as_deref(), Some(MOCK_REFRESHED_TOKEN));
        assert_eq!(saved.refresh_token.as_deref(), Some("1//refresh"));
        assert!(saved.is_valid(Utc::now()));
    }

    #[test]
    fn test_client_renews_token_that_expires_while_connected() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        // Valid at connect time, expired by the time of the next request
        let mut user = expired_user(server.token_uri());
        user.token = Some("expired_token".to_string());
        TokenFile::new(&token_path).save(&user).unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let client = SheetsClient::with_credentials(
            MOCK_SPREADSHEET_ID,
            Arc::new(manager),
            user,
            &server.base_url(),
        )
        .unwrap();

        assert!(client.table_names().unwrap().is_empty());
        assert!(client.table_names().unwrap().is_empty());

        let saved = TokenFile::new(&token_path).load().unwrap().unwrap();
        assert_eq!(saved.token.as_deref(), Some(MOCK_REFRESHED_TOKEN));
    }

    #[test]
    fn test_client_refreshes_rejected_token_and_resends() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");

        let mut user = expired_user(server.token_uri());
        user.token = Some("revoked_early".to_string());
        user.expiry = Some(Utc::now() + Duration::hours(1));

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let client = SheetsClient::with_credentials(
            MOCK_SPREADSHEET_ID,
            Arc::new(manager),
            user,
            &server.base_url(),
        )
        .unwrap();

        client
            .add_tables(&["Expenses".to_string()])
            .unwrap();
        assert_eq!(client.table_names().unwrap(), vec!["Expenses"]);

        let saved = TokenFile::new(&token_path).load().unwrap().unwrap();
        assert_eq!(saved.token.as_deref(), Some(MOCK_REFRESHED_TOKEN));
    }

    #[test]
    fn test_rejected_token_without_refresh_is_auth_error() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let dir = tempdir().unwrap();

        let mut user = expired_user(server.token_uri());
        user.token = Some("revoked_early".to_string());
        user.refresh_token = None;
        user.expiry = Some(Utc::now() + Duration::hours(1));

        let manager = CredentialManager::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        )
        .unwrap()
        .interactive(false);
        let client = SheetsClient::with_credentials(
            MOCK_SPREADSHEET_ID,
            Arc::new(manager),
            user,
            &server.base_url(),
        )
        .unwrap();

        let err = client.table_names().unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
    }

    #[test]
    fn test_revoked_refresh_token_is_auth_error() {
        let server = MockSheetsServer::start(MockConfig {
            revoke_refresh: true,
            ..Default::default()
        })
        .unwrap();
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        TokenFile::new(&token_path)
            .save(&expired_user(server.token_uri()))
            .unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let connector = GoogleSheetsConnector::new(manager, Some(MOCK_SPREADSHEET_ID.to_string()))
            .with_base_url(server.base_url());

        let err = connector.connect().err().unwrap();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[test]
    fn test_ledger_over_http() {
        let server = MockSheetsServer::start(MockConfig::default()).unwrap();
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        TokenFile::new(&token_path)
            .save(&expired_user(server.token_uri()))
            .unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let connector = GoogleSheetsConnector::new(manager, Some(MOCK_SPREADSHEET_ID.to_string()))
            .with_base_url(server.base_url());

        let mut ledger = LedgerService::new(Box::new(connector));
        ledger.authenticate().unwrap();
        let report = ledger.initialize().unwrap();
        assert_eq!(report.created.len(), 3);

        ledger.update_budget(Decimal::new(5000, 0)).unwrap();
        ledger
            .add_expense(&Expense::new(
                NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
                "equipment",
                "Laptop",
                Decimal::new(100, 0),
            ))
            .unwrap();

        let data: LedgerData = ledger.get_all_data().unwrap();
        assert_eq!(data.overview[0], json!(5000));
        assert_eq!(data.overview[3], json!("=A2-C2"));
        assert_eq!(data.expenses.len(), 1);
        assert_eq!(data.expenses[0][1], json!("equipment"));
        assert_eq!(data.analysis.len(), 4);
    }
}
