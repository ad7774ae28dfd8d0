//! Typed request-scoped values passed explicitly through the service

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::net::IpAddr;
use uuid::Uuid;

use crate::auth::user::{User, UserId};
use crate::storage::traits::IssuedSession;

/// Client information attached to sessions and audit records
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientMetadata {
    pub ip: Option<IpAddr>,
    pub user_agent: Option<String>,
}

impl ClientMetadata {
    pub fn new(ip: Option<IpAddr>, user_agent: Option<String>) -> Self {
        // Oversized user agents are truncated rather than rejected
        let user_agent = user_agent.map(|ua| ua.chars().take(512).collect());
        Self { ip, user_agent }
    }
}

/// A credential presented with a request
#[derive(Clone, PartialEq, Eq)]
pub enum Credential {
    /// Opaque session token (cookie)
    Session(String),
    /// Signed access token (`Authorization: Bearer`)
    Bearer(String),
}

impl Credential {
    pub fn kind(&self) -> &'static str {
        match self {
            Credential::Session(_) => "session",
            Credential::Bearer(_) => "bearer",
        }
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Credential::{}(<redacted>)", self.kind())
    }
}

/// How a principal was authenticated
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PrincipalSource {
    Session { session_id: Uuid },
    AccessToken { session_id: Option<Uuid>, token_id: String },
}

/// The authenticated identity behind a request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Principal {
    pub user_id: UserId,
    pub username: String,
    /// Role names; for access tokens this is the snapshot taken at issuance
    pub roles: BTreeSet<String>,
    pub source: PrincipalSource,
}

impl Principal {
    pub fn session_id(&self) -> Option<Uuid> {
        match &self.source {
            PrincipalSource::Session { session_id } => Some(*session_id),
            PrincipalSource::AccessToken { session_id, .. } => *session_id,
        }
    }
}

/// Access/refresh token pair handed to clients
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token lifetime in seconds
    pub expires_in: u64,
}

impl std::fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .field("expires_in", &self.expires_in)
            .finish()
    }
}

/// Successful login
#[derive(Debug, Clone)]
pub struct AuthResult {
    pub user: User,
    pub session: IssuedSession,
    pub tokens: TokenPair,
}

/// Public view of the current principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
    pub roles: BTreeSet<String>,
}
