//! Google OAuth for installed applications
//!
//! Loads the cached authorized-user token, refreshes it when it has expired,
//! and otherwise runs the browser consent flow with a loopback redirect.
//! Whatever comes out is written back to the token file.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::time::Duration;

use base64::Engine;
use chrono::Utc;
use fs2::FileExt;
use rand::distributions::Alphanumeric;
use rand::Rng;
use reqwest::blocking::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;
use url::Url;

use crate::domain::result::{Error, Result};
use crate::domain::{AuthorizedUser, ClientConfig, ClientSecrets, SHEETS_SCOPE};

/// Persisted authorized-user token
#[derive(Debug, Clone)]
pub struct TokenFile {
    path: PathBuf,
}

impl TokenFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the token, `None` if there is no file yet
    pub fn load(&self) -> Result<Option<AuthorizedUser>> {
        if !self.path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(&self.path)?;
        AuthorizedUser::from_json(&content).map(Some)
    }

    /// Replace the token file atomically while holding an exclusive lock
    pub fn save(&self, user: &AuthorizedUser) -> Result<()> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;

        let lock_path = self.path.with_extension("lock");
        let lock = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)?;
        lock.lock_exclusive()?;

        let result = (|| -> Result<()> {
            let mut tmp = NamedTempFile::new_in(&dir)?;
            tmp.write_all(serde_json::to_string_pretty(user)?.as_bytes())?;
            tmp.flush()?;
            tmp.persist(&self.path).map_err(|e| Error::Io(e.error))?;
            Ok(())
        })();

        let _ = lock.unlock();
        result
    }
}

/// Response of the OAuth token endpoint
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

type Prompt = Box<dyn Fn(&str) + Send + Sync>;

/// Obtains a usable [`AuthorizedUser`] from cache, refresh, or consent
pub struct CredentialManager {
    secrets_path: PathBuf,
    token_file: TokenFile,
    scopes: Vec<String>,
    interactive: bool,
    client: Client,
    prompt: Prompt,
}

impl CredentialManager {
    pub fn new(secrets_path: impl Into<PathBuf>, token_path: impl Into<PathBuf>) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| Error::auth(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            secrets_path: secrets_path.into(),
            token_file: TokenFile::new(token_path),
            scopes: vec![SHEETS_SCOPE.to_string()],
            interactive: true,
            client,
            prompt: Box::new(|url| {
                eprintln!("Please visit this URL to authorize this application:\n{}", url);
            }),
        })
    }

    /// Allow or forbid the browser consent flow
    pub fn interactive(mut self, interactive: bool) -> Self {
        self.interactive = interactive;
        self
    }

    /// Replace how the consent URL is shown to the user
    pub fn with_prompt(mut self, prompt: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.prompt = Box::new(prompt);
        self
    }

    pub fn token_file(&self) -> &TokenFile {
        &self.token_file
    }

    /// Return valid credentials, refreshing or re-authorizing as needed.
    ///
    /// The token file is rewritten whenever the credential changed.
    pub fn obtain(&self) -> Result<AuthorizedUser> {
        let now = Utc::now();

        let cached = match self.token_file.load() {
            Ok(user) => user,
            Err(e) => {
                tracing::warn!(path = %self.token_file.path().display(), error = %e, "ignoring unreadable token file");
                None
            }
        };

        if let Some(user) = cached.filter(|u| u.covers(&self.scopes)) {
            if user.is_valid(now) {
                tracing::debug!("using cached access token");
                return Ok(user);
            }
            if user.is_expired(now) && user.can_refresh() {
                tracing::info!("access token expired, refreshing");
                let refreshed = self.refresh(&user)?;
                self.token_file.save(&refreshed)?;
                return Ok(refreshed);
            }
        }

        if !self.interactive {
            return Err(Error::auth(format!(
                "No valid credential in {}; run `bsheet auth` to authorize",
                self.token_file.path().display()
            )));
        }

        let user = self.run_consent_flow()?;
        self.token_file.save(&user)?;
        Ok(user)
    }

    /// Exchange the refresh token for a new access token
    pub fn refresh(&self, user: &AuthorizedUser) -> Result<AuthorizedUser> {
        let refresh_token = user
            .refresh_token
            .as_deref()
            .ok_or_else(|| Error::auth("Credential has no refresh token"))?;

        let response = self.post_token_request(
            &user.token_uri,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", &user.client_id),
                ("client_secret", &user.client_secret),
            ],
        )?;

        let mut refreshed = user.clone();
        refreshed.token = Some(response.access_token);
        refreshed.expiry = response
            .expires_in
            .map(|secs| Utc::now() + chrono::Duration::seconds(secs));
        if let Some(rt) = response.refresh_token {
            refreshed.refresh_token = Some(rt);
        }
        Ok(refreshed)
    }

    /// Run the consent flow even when a usable token is cached
    pub fn authorize(&self) -> Result<AuthorizedUser> {
        let user = self.run_consent_flow()?;
        self.token_file.save(&user)?;
        Ok(user)
    }

    fn run_consent_flow(&self) -> Result<AuthorizedUser> {
        let content = fs::read_to_string(&self.secrets_path).map_err(|e| {
            Error::auth(format!(
                "Cannot read client secrets {}: {}",
                self.secrets_path.display(),
                e
            ))
        })?;
        let secrets = ClientSecrets::from_json(&content)?;
        let client = secrets.client()?;

        let listener = TcpListener::bind("127.0.0.1:0")?;
        let redirect_uri = format!("http://localhost:{}/", listener.local_addr()?.port());

        let verifier = random_token(64);
        let state = random_token(30);
        let url = authorization_url(client, &redirect_uri, &self.scopes, &state, &verifier)?;

        (self.prompt)(url.as_str());
        let code = wait_for_code(&listener, &state)?;

        let response = self.post_token_request(
            &client.token_uri,
            &[
                ("grant_type", "authorization_code"),
                ("code", &code),
                ("client_id", &client.client_id),
                ("client_secret", &client.client_secret),
                ("redirect_uri", &redirect_uri),
                ("code_verifier", &verifier),
            ],
        )?;

        let scopes = response
            .scope
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_string).collect())
            .unwrap_or_else(|| self.scopes.clone());

        Ok(AuthorizedUser {
            token: Some(response.access_token),
            refresh_token: response.refresh_token,
            token_uri: client.token_uri.clone(),
            client_id: client.client_id.clone(),
            client_secret: client.client_secret.clone(),
            scopes,
            expiry: response
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
            other: Default::default(),
        })
    }

    fn post_token_request(&self, token_uri: &str, form: &[(&str, &str)]) -> Result<TokenResponse> {
        let response = self
            .client
            .post(token_uri)
            .form(form)
            .send()
            .map_err(|e| {
                if e.is_timeout() {
                    Error::auth("Token request timed out after 30 seconds")
                } else if e.is_connect() {
                    Error::auth("Unable to connect to the OAuth token endpoint")
                } else {
                    Error::auth(format!("Token request failed: {}", e))
                }
            })?;

        let status = response.status();
        let body = response
            .text()
            .map_err(|e| Error::auth(format!("Failed to read token response: {}", e)))?;

        if !status.is_success() {
            let detail = serde_json::from_str::<TokenErrorResponse>(&body)
                .map(|e| match e.error_description {
                    Some(desc) => format!("{}: {}", e.error, desc),
                    None => e.error,
                })
                .unwrap_or_else(|_| format!("HTTP {}", status.as_u16()));
            return Err(Error::auth(format!("Token request rejected: {}", detail)));
        }

        serde_json::from_str(&body)
            .map_err(|e| Error::auth(format!("Failed to parse token response: {}", e)))
    }
}

/// Consent URL with PKCE (S256) and offline access
pub fn authorization_url(
    client: &ClientConfig,
    redirect_uri: &str,
    scopes: &[String],
    state: &str,
    code_verifier: &str,
) -> Result<Url> {
    let challenge = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(Sha256::digest(code_verifier.as_bytes()));
    let scope = scopes.join(" ");

    Url::parse_with_params(
        &client.auth_uri,
        &[
            ("response_type", "code"),
            ("client_id", client.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("scope", scope.as_str()),
            ("state", state),
            ("code_challenge", challenge.as_str()),
            ("code_challenge_method", "S256"),
            ("access_type", "offline"),
            ("prompt", "consent"),
        ],
    )
    .map_err(|e| Error::auth(format!("Invalid auth_uri in client secrets: {}", e)))
}

fn random_token(len: usize) -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(len)
        .map(char::from)
        .collect()
}

/// Accept redirects until one carries the authorization code
fn wait_for_code(listener: &TcpListener, expected_state: &str) -> Result<String> {
    for stream in listener.incoming() {
        let mut stream = stream?;
        let target = match read_request_target(&stream) {
            Some(t) => t,
            None => continue,
        };

        let url = match Url::parse(&format!("http://localhost{}", target)) {
            Ok(u) => u,
            Err(_) => {
                respond(&mut stream, 400, "Bad request");
                continue;
            }
        };

        let mut code = None;
        let mut state = None;
        let mut error = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(err) = error {
            respond(&mut stream, 400, "Authorization was denied. You may close this window.");
            return Err(Error::auth(format!("Authorization denied: {}", err)));
        }

        // Browsers also ask for /favicon.ico and friends
        let Some(code) = code else {
            respond(&mut stream, 404, "Not found");
            continue;
        };

        if state.as_deref() != Some(expected_state) {
            respond(&mut stream, 400, "State mismatch. You may close this window.");
            return Err(Error::auth("Authorization response state mismatch"));
        }

        respond(
            &mut stream,
            200,
            "The authentication flow has completed. You may close this window.",
        );
        return Ok(code);
    }

    Err(Error::auth("Authorization listener closed before a code arrived"))
}

fn read_request_target(stream: &TcpStream) -> Option<String> {
    let mut line = String::new();
    BufReader::new(stream).read_line(&mut line).ok()?;
    let mut parts = line.split_whitespace();
    let _method = parts.next()?;
    parts.next().map(str::to_string)
}

fn respond(stream: &mut TcpStream, status: u16, message: &str) {
    let reason = match status {
        200 => "OK",
        400 => "Bad Request",
        _ => "Not Found",
    };
    let response = format!(
        "HTTP/1.1 {} {}\r\nContent-Type: text/plain; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        reason,
        message.len(),
        message
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use tempfile::tempdir;

    fn sample_user() -> AuthorizedUser {
        AuthorizedUser {
            token: Some("ya29.cached".to_string()),
            refresh_token: Some("1//refresh".to_string()),
            token_uri: "http://127.0.0.1:9/token".to_string(),
            client_id: "client".to_string(),
            client_secret: "secret".to_string(),
            scopes: vec![SHEETS_SCOPE.to_string()],
            expiry: Some(Utc::now() + ChronoDuration::hours(1)),
            other: Default::default(),
        }
    }

    #[test]
    fn test_token_file_round_trip() {
        let dir = tempdir().unwrap();
        let file = TokenFile::new(dir.path().join("token.json"));
        assert!(file.load().unwrap().is_none());

        file.save(&sample_user()).unwrap();
        let loaded = file.load().unwrap().unwrap();
        assert_eq!(loaded.token.as_deref(), Some("ya29.cached"));
        assert_eq!(loaded.refresh_token.as_deref(), Some("1//refresh"));
    }

    #[test]
    fn test_obtain_uses_valid_cached_token() {
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        TokenFile::new(&token_path).save(&sample_user()).unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        let user = manager.obtain().unwrap();
        assert_eq!(user.token.as_deref(), Some("ya29.cached"));
    }

    #[test]
    fn test_obtain_without_token_non_interactive_fails() {
        let dir = tempdir().unwrap();
        let manager = CredentialManager::new(
            dir.path().join("credentials.json"),
            dir.path().join("token.json"),
        )
        .unwrap()
        .interactive(false);

        let err = manager.obtain().unwrap_err();
        assert!(matches!(err, Error::Auth(_)));
        assert!(err.to_string().contains("bsheet auth"));
    }

    #[test]
    fn test_token_missing_scope_is_not_reused() {
        let dir = tempdir().unwrap();
        let token_path = dir.path().join("token.json");
        let mut user = sample_user();
        user.scopes = vec!["https://www.googleapis.com/auth/drive.readonly".to_string()];
        TokenFile::new(&token_path).save(&user).unwrap();

        let manager = CredentialManager::new(dir.path().join("credentials.json"), &token_path)
            .unwrap()
            .interactive(false);
        assert!(manager.obtain().is_err());
    }

    #[test]
    fn test_consent_flow_requires_client_secrets() {
        let dir = tempdir().unwrap();
        let manager = CredentialManager::new(
            dir.path().join("missing-credentials.json"),
            dir.path().join("token.json"),
        )
        .unwrap();

        let err = manager.obtain().unwrap_err();
        assert!(err.to_string().contains("Cannot read client secrets"));
    }

    #[test]
    fn test_authorization_url_has_pkce() {
        let client = ClientConfig {
            client_id: "abc.apps.googleusercontent.com".to_string(),
            client_secret: "s".to_string(),
            auth_uri: "https://accounts.google.com/o/oauth2/auth".to_string(),
            token_uri: "https://oauth2.googleapis.com/token".to_string(),
            redirect_uris: vec![],
        };
        let url = authorization_url(
            &client,
            "http://localhost:5555/",
            &[SHEETS_SCOPE.to_string()],
            "state123",
            "verifier",
        )
        .unwrap();

        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();
        assert_eq!(pairs["client_id"], "abc.apps.googleusercontent.com");
        assert_eq!(pairs["scope"], SHEETS_SCOPE);
        assert_eq!(pairs["code_challenge_method"], "S256");
        assert_eq!(pairs["access_type"], "offline");
        assert_eq!(pairs["state"], "state123");
        // SHA-256 of "verifier", base64url without padding
        assert_eq!(pairs["code_challenge"], "iMnq5o6zALKXGivsnlom_0F5_WYda32GHkxlV7mq7hQ");
    }

    #[test]
    fn test_random_token_shape() {
        let token = random_token(64);
        assert_eq!(token.len(), 64);
        assert!(token.chars().all(|c| c.is_ascii_alphanumeric()));
    }
}
