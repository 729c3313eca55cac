//! Credentials for the relay handshake
//!
//! Obtaining credentials (login, token refresh) happens outside the hub; the
//! hub only asks a [`CredentialProvider`] for the user id and the opaque
//! authorize string each time it opens a socket.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::Result;

/// What the relay needs to accept a session
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(rename = "userID", alias = "user_id")]
    pub user_id: u32,
    pub authorize: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user_id", &self.user_id)
            .field("authorize", &"<redacted>")
            .finish()
    }
}

/// Source of credentials, consulted on every connection attempt
#[async_trait]
pub trait CredentialProvider: Send + Sync {
    async fn credentials(&self) -> Result<Credentials>;
}

/// Fixed credentials supplied up front
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl StaticCredentials {
    pub fn new(user_id: u32, authorize: impl Into<String>) -> Self {
        Self(Credentials {
            user_id,
            authorize: authorize.into(),
        })
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentials {
    async fn credentials(&self) -> Result<Credentials> {
        Ok(self.0.clone())
    }
}
