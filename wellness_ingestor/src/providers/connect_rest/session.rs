//! Session material persisted in the token store.

use std::path::Path;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize, Serializer};
use snafu::ResultExt;

use crate::providers::{DecodeSnafu, MissingTokensSnafu, ProviderError, TokenIoSnafu};

/// File name of the session inside the token store directory.
pub const TOKEN_FILE: &str = "oauth2_token.json";

/// Tokens for an authenticated tracker session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionTokens {
    #[serde(serialize_with = "expose")]
    pub access_token: SecretString,
    #[serde(
        default,
        serialize_with = "expose_opt",
        skip_serializing_if = "Option::is_none"
    )]
    pub refresh_token: Option<SecretString>,
    /// Expiry as epoch seconds.
    pub expires_at: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl SessionTokens {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }

    /// Reads the session from `<token_store>/oauth2_token.json`.
    pub async fn load(token_store: &Path) -> Result<Self, ProviderError> {
        let path = token_store.join(TOKEN_FILE);
        let raw = match tokio::fs::read_to_string(&path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return MissingTokensSnafu { path }.fail();
            }
            Err(e) => return Err(e).context(TokenIoSnafu { path }),
        };
        serde_json::from_str(&raw).context(DecodeSnafu {
            what: format!("token file {}", path.display()),
        })
    }

    /// Writes the session, creating the token store directory if needed.
    pub async fn store(&self, token_store: &Path) -> Result<(), ProviderError> {
        tokio::fs::create_dir_all(token_store)
            .await
            .context(TokenIoSnafu { path: token_store })?;
        let path = token_store.join(TOKEN_FILE);
        let body = serde_json::to_string_pretty(self).context(DecodeSnafu {
            what: "session tokens",
        })?;
        tokio::fs::write(&path, body)
            .await
            .context(TokenIoSnafu { path })
    }
}

fn expose<S: Serializer>(secret: &SecretString, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(secret.expose_secret())
}

fn expose_opt<S: Serializer>(secret: &Option<SecretString>, s: S) -> Result<S::Ok, S::Error> {
    match secret {
        Some(secret) => s.serialize_some(secret.expose_secret()),
        None => s.serialize_none(),
    }
}
