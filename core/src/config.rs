//! Client configuration: where the service lives and which account to use.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const ENDPOINT_VAR: &str = "FMART_API_ENDPOINT";
pub const USER_ID_VAR: &str = "FMART_USER_ID";
pub const PASSWORD_VAR: &str = "FMART_PASSWORD";

/// Endpoint and account credentials for one invoice issuer.
///
/// The same credentials authenticate outbound requests and are expected back
/// in inbound status notifications.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientConfig {
    pub endpoint: String,
    pub user_id: String,
    #[serde(default)]
    pub password: String,
}

impl ClientConfig {
    pub fn new(endpoint: &str, user_id: &str, password: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            user_id: user_id.to_string(),
            password: password.to_string(),
        }
    }

    /// Reads `FMART_API_ENDPOINT`, `FMART_USER_ID` and `FMART_PASSWORD`.
    ///
    /// The endpoint is required; missing credentials are treated as empty.
    pub fn from_env() -> Result<Self, Error> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, Error> {
        let endpoint = lookup(ENDPOINT_VAR)
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| Error::Config(format!("{ENDPOINT_VAR} is not set")))?;
        Ok(Self {
            endpoint,
            user_id: lookup(USER_ID_VAR).unwrap_or_default(),
            password: lookup(PASSWORD_VAR).unwrap_or_default(),
        })
    }
}

impl fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientConfig")
            .field("endpoint", &self.endpoint)
            .field("user_id", &self.user_id)
            .field("password", &"<redacted>")
            .finish()
    }
}
