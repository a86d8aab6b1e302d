//! Service principal authentication
//!
//! Tokens are requested with the client-credentials grant and cached until
//! shortly before they expire. One Fabric-scoped token serves both the Fabric
//! and the Power BI endpoints.

use crate::error::{DeployError, DeployResult};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::Client;
use serde::Deserialize;
use std::fmt;
use tokio::sync::Mutex;
use tracing::debug;

pub const FABRIC_SCOPE: &str = "https://api.fabric.microsoft.com/.default";
const AUTHORITY: &str = "https://login.microsoftonline.com";

/// Tokens this close to expiry are refreshed
const EXPIRY_MARGIN_SECS: i64 = 120;

/// Service principal credentials, as carried by the `spn` JSON document
#[derive(Clone, Deserialize)]
pub struct ClientCredentials {
    pub tenant_id: String,
    pub client_id: String,
    pub client_secret: String,
}

impl fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("tenant_id", &self.tenant_id)
            .field("client_id", &self.client_id)
            .field("client_secret", &"***")
            .finish()
    }
}

impl ClientCredentials {
    /// Parses the JSON document; single-quoted keys and values are accepted
    pub fn from_json(raw: &str) -> DeployResult<Self> {
        let normalized = raw.replace('\'', "\"");
        let credentials: Self = serde_json::from_str(&normalized)
            .map_err(|e| DeployError::json("service principal", e))?;
        if credentials.tenant_id.trim().is_empty() || credentials.client_id.trim().is_empty() {
            return Err(DeployError::validation(
                "service principal requires tenant_id and client_id",
            ));
        }
        Ok(credentials)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now + ChronoDuration::seconds(EXPIRY_MARGIN_SECS) < self.expires_at
    }
}

pub struct TokenSource {
    credentials: ClientCredentials,
    http_client: Client,
    authority: String,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenSource {
    pub fn new(credentials: ClientCredentials, http_client: Client) -> Self {
        Self {
            credentials,
            http_client,
            authority: AUTHORITY.to_string(),
            cached: Mutex::new(None),
        }
    }

    /// Fixed token, never refreshed
    pub fn with_static_token(token: impl Into<String>, http_client: Client) -> Self {
        Self {
            credentials: ClientCredentials {
                tenant_id: String::new(),
                client_id: String::new(),
                client_secret: String::new(),
            },
            http_client,
            authority: AUTHORITY.to_string(),
            cached: Mutex::new(Some(CachedToken {
                value: token.into(),
                expires_at: DateTime::<Utc>::MAX_UTC,
            })),
        }
    }

    pub async fn bearer(&self) -> DeployResult<String> {
        let mut cached = self.cached.lock().await;
        if let Some(token) = cached.as_ref().filter(|t| t.is_fresh(Utc::now())) {
            return Ok(token.value.clone());
        }

        let token = self.request_token().await?;
        let value = token.value.clone();
        *cached = Some(token);
        Ok(value)
    }

    async fn request_token(&self) -> DeployResult<CachedToken> {
        let url = format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority, self.credentials.tenant_id
        );
        debug!(tenant = %self.credentials.tenant_id, "Requesting access token");

        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("grant_type", "client_credentials"),
            ("scope", FABRIC_SCOPE),
        ];
        let response = self
            .http_client
            .post(&url)
            .form(&params)
            .send()
            .await
            .map_err(|e| DeployError::Transport {
                operation: "token request".to_string(),
                source: Box::new(e),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DeployError::RemoteFailure {
                operation: "token request".to_string(),
                status: status.as_u16(),
                message: body,
            });
        }

        let body: TokenResponse = response.json().await.map_err(|e| DeployError::Transport {
            operation: "token response".to_string(),
            source: Box::new(e),
        })?;
        Ok(CachedToken {
            value: body.access_token,
            expires_at: Utc::now() + ChronoDuration::seconds(body.expires_in.unwrap_or(3600)),
        })
    }
}
