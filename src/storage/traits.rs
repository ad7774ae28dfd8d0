//! Abstract storage interfaces for pluggable backends
//!
//! This module defines the persistence boundaries of the service: user
//! credentials, server-side sessions and refresh-token records. Every
//! implementation must make each method atomic with respect to the others.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::time::Duration;
use uuid::Uuid;

use crate::auth::principal::ClientMetadata;
use crate::auth::user::{CredentialRecord, NewUser, PasswordHashRecord, User, UserId};
use crate::error::Result;

/// Server-side session state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Public session identifier, distinct from the session token
    pub id: Uuid,
    pub user_id: UserId,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub metadata: ClientMetadata,
    pub valid: bool,
}

impl Session {
    /// A session is usable iff it is still flagged valid and `now` is before expiry
    pub fn is_active_at(&self, now: DateTime<Utc>) -> bool {
        self.valid && now < self.expires_at
    }
}

/// Opaque session token. Only handed out once, at creation.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn new(token: String) -> Self {
        Self(token)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SessionToken(<redacted>)")
    }
}

/// Result of creating a session
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: SessionToken,
    pub session: Session,
}

/// Why a refresh token stopped being usable
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RevocationReason {
    /// User initiated logout
    UserLogout,
    /// Exchanged for a successor token
    Rotated,
    /// A rotated token was presented again
    ReuseDetected,
    /// User changed password/credentials
    CredentialChange,
    /// Account deactivated
    AccountSuspension,
    /// Administrative action
    AdminRevocation,
}

/// Server-side record backing a refresh token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshTokenRecord {
    /// The token's `jti` claim
    pub token_id: String,
    pub user_id: UserId,
    /// Session the token family belongs to
    pub session_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub revoked_at: Option<DateTime<Utc>>,
    pub reason: Option<RevocationReason>,
    /// Successor issued when this token was rotated
    pub replaced_by: Option<String>,
}

impl RefreshTokenRecord {
    pub fn new(
        token_id: String,
        user_id: UserId,
        session_id: Uuid,
        issued_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token_id,
            user_id,
            session_id,
            issued_at,
            expires_at,
            revoked_at: None,
            reason: None,
            replaced_by: None,
        }
    }

    pub fn is_revoked(&self) -> bool {
        self.revoked_at.is_some()
    }
}

/// Outcome of an atomic refresh-token rotation
#[derive(Debug, Clone, PartialEq)]
pub enum RotationOutcome {
    /// The old record was active; it is now revoked and the successor stored
    Rotated,
    /// The old record had already been revoked; nothing was stored
    AlreadyRevoked(RefreshTokenRecord),
    /// No record exists for the presented token
    Unknown,
}

/// Statistics about refresh-token revocations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevocationStats {
    pub total_records: usize,
    pub active_records: usize,
    pub by_reason: HashMap<RevocationReason, usize>,
}

/// User credential storage interface
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Create a user; fails with `Conflict` on a duplicate username or email
    async fn create_user(&self, new_user: NewUser) -> Result<User>;

    /// Case-insensitive lookup by username or email, hash included
    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<CredentialRecord>>;

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>>;

    /// Stored hash for a user, for re-verification flows
    async fn password_hash(&self, user_id: UserId) -> Result<Option<PasswordHashRecord>>;

    async fn update_password_hash(&self, user_id: UserId, hash: PasswordHashRecord) -> Result<()>;

    /// Store `hash` only if the current hash is still `expected`; returns
    /// whether it was stored
    async fn replace_password_hash(
        &self,
        user_id: UserId,
        expected: &PasswordHashRecord,
        hash: PasswordHashRecord,
    ) -> Result<bool>;

    async fn set_active(&self, user_id: UserId, active: bool) -> Result<()>;

    async fn set_roles(&self, user_id: UserId, roles: BTreeSet<String>) -> Result<()>;

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()>;
}

/// Server-side session storage interface
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Credential epoch of a user. `invalidate_all_for_user` advances it.
    async fn credential_epoch(&self, user_id: UserId) -> Result<u64>;

    /// Create a session and return its freshly generated token.
    ///
    /// `epoch` is the credential epoch read before the credentials were
    /// verified. Fails with `InvalidCredentials` if the epoch has moved on
    /// since, so no session outlives a concurrent `invalidate_all_for_user`.
    async fn create(&self, user_id: UserId, metadata: ClientMetadata, ttl: Duration, epoch: u64)
        -> Result<IssuedSession>;

    /// Look up an active session. Expired or invalidated sessions yield `None`.
    async fn get(&self, token: &str) -> Result<Option<Session>>;

    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<Session>>;

    /// Invalidate by token; returns whether an active session was ended
    async fn invalidate(&self, token: &str) -> Result<bool>;

    async fn invalidate_by_id(&self, session_id: Uuid) -> Result<bool>;

    /// Invalidate every session of a user and advance their credential
    /// epoch; returns how many were active
    async fn invalidate_all_for_user(&self, user_id: UserId) -> Result<usize>;

    /// Reclaim memory held by expired or invalidated sessions
    async fn sweep_expired(&self) -> Result<usize>;

    async fn active_count(&self) -> Result<usize>;
}

/// Refresh-token record storage interface
#[async_trait]
pub trait RefreshTokenStore: Send + Sync {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()>;

    async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>>;

    /// Atomically revoke `old_token_id` and store `successor` if, and only if,
    /// the old record is still active
    async fn rotate(&self, old_token_id: &str, successor: RefreshTokenRecord) -> Result<RotationOutcome>;

    async fn revoke(&self, token_id: &str, reason: RevocationReason) -> Result<bool>;

    async fn revoke_session(&self, session_id: Uuid, reason: RevocationReason) -> Result<usize>;

    async fn revoke_user_tokens(&self, user_id: UserId, reason: RevocationReason) -> Result<usize>;

    /// Drop records whose token has expired
    async fn cleanup_expired(&self) -> Result<usize>;

    async fn get_revocation_stats(&self) -> Result<RevocationStats>;
}
