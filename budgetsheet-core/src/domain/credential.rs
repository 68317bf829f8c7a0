//! OAuth credential documents
//!
//! Both files use Google's own JSON layouts so they stay interchangeable with
//! tokens produced by Google's client libraries.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::result::{Error, Result};

/// Scope granting read/write access to spreadsheets
pub const SHEETS_SCOPE: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tokens this close to expiry are treated as expired
const EXPIRY_SKEW_SECONDS: i64 = 180;

/// OAuth client registration downloaded from the Google Cloud console
/// (`credentials.json`)
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    #[serde(default)]
    installed: Option<ClientConfig>,
    #[serde(default)]
    web: Option<ClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

impl ClientSecrets {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content).map_err(|e| {
            Error::auth(format!("Client secrets file is not valid JSON: {}", e))
        })
    }

    /// The client section, preferring an installed-app registration
    pub fn client(&self) -> Result<&ClientConfig> {
        self.installed
            .as_ref()
            .or(self.web.as_ref())
            .ok_or_else(|| {
                Error::auth("Client secrets file has neither an 'installed' nor a 'web' section")
            })
    }
}

/// Authorized-user token (`token.json`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizedUser {
    /// Current access token
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default)]
    pub scopes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<DateTime<Utc>>,
    /// Fields written by other clients, kept on save
    #[serde(flatten)]
    pub other: HashMap<String, serde_json::Value>,
}

impl AuthorizedUser {
    pub fn from_json(content: &str) -> Result<Self> {
        serde_json::from_str(content)
            .map_err(|e| Error::auth(format!("Token file is not valid JSON: {}", e)))
    }

    /// Whether the access token is past (or about to reach) its expiry
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECONDS) <= now,
            None => false,
        }
    }

    /// Usable as-is: has an access token that has not expired
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.token.is_some() && !self.is_expired(now)
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|t| !t.is_empty())
    }

    /// Whether every required scope was granted
    pub fn covers(&self, required: &[String]) -> bool {
        required.iter().all(|s| self.scopes.contains(s))
    }

    /// The access token, or an auth error if there is none
    pub fn access_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| Error::auth("Credential has no access token"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN_JSON: &str = r#"{
        "token": "ya29.abc",
        "refresh_token": "1//refresh",
        "token_uri": "https://oauth2.googleapis.com/token",
        "client_id": "client.apps.googleusercontent.com",
        "client_secret": "secret",
        "scopes": ["https://www.googleapis.com/auth/spreadsheets"],
        "universe_domain": "googleapis.com",
        "account": "",
        "expiry": "2024-05-01T12:00:00.123456Z"
    }"#;

    #[test]
    fn test_parse_google_token_file() {
        let user = AuthorizedUser::from_json(TOKEN_JSON).unwrap();
        assert_eq!(user.token.as_deref(), Some("ya29.abc"));
        assert!(user.can_refresh());
        assert!(user.covers(&[SHEETS_SCOPE.to_string()]));
        assert_eq!(
            user.other.get("universe_domain"),
            Some(&serde_json::json!("googleapis.com"))
        );
    }

    #[test]
    fn test_expiry_checks() {
        let user = AuthorizedUser::from_json(TOKEN_JSON).unwrap();
        let expiry = user.expiry.unwrap();

        assert!(user.is_valid(expiry - Duration::hours(1)));
        assert!(user.is_expired(expiry + Duration::seconds(1)));
        // Inside the skew window counts as expired
        assert!(user.is_expired(expiry - Duration::seconds(60)));
    }

    #[test]
    fn test_no_expiry_never_expires() {
        let mut user = AuthorizedUser::from_json(TOKEN_JSON).unwrap();
        user.expiry = None;
        assert!(user.is_valid(Utc::now()));

        user.token = None;
        assert!(!user.is_valid(Utc::now()));
        assert!(user.access_token().is_err());
    }

    #[test]
    fn test_round_trip_keeps_unknown_fields() {
        let user = AuthorizedUser::from_json(TOKEN_JSON).unwrap();
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["account"], serde_json::json!(""));
        assert_eq!(json["refresh_token"], serde_json::json!("1//refresh"));
    }

    #[test]
    fn test_client_secrets_sections() {
        let installed = ClientSecrets::from_json(
            r#"{"installed": {"client_id": "a", "client_secret": "b",
                "redirect_uris": ["http://localhost"]}}"#,
        )
        .unwrap();
        let client = installed.client().unwrap();
        assert_eq!(client.client_id, "a");
        assert_eq!(client.token_uri, "https://oauth2.googleapis.com/token");

        let web = ClientSecrets::from_json(
            r#"{"web": {"client_id": "w", "client_secret": "s"}}"#,
        )
        .unwrap();
        assert_eq!(web.client().unwrap().client_id, "w");

        let empty = ClientSecrets::from_json("{}").unwrap();
        assert!(matches!(empty.client(), Err(Error::Auth(_))));
    }
}
