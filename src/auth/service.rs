//! Authentication façade
//!
//! `AuthService` is the only entry point HTTP handlers use. It composes the
//! rate limiter, credential store, password hasher, session store, token
//! service, RBAC pipeline and audit logger.
//!
//! A login moves through `Received -> RateChecked -> CredentialVerified ->
//! SessionIssued -> Completed`; every failure exit writes a `login-failure`
//! audit record before returning.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::auth::password::PasswordHasher;
use crate::auth::pipeline::{RequestContext, RequestPipeline};
use crate::auth::principal::{AuthResult, ClientMetadata, Credential, Identity, Principal, PrincipalSource, TokenPair};
use crate::auth::token::{TokenService, TokenType};
use crate::auth::user::{
    validate_email, validate_password, validate_username, NewUser, PasswordHashRecord, Permission, RoleRegistry,
    User, UserId,
};
use crate::clock::SharedClock;
use crate::config::AuthConfig;
use crate::constants::DEFAULT_USER_ROLE;
use crate::core::rate_limiter::{rate_key, LoginRateLimiter, RateDecision};
use crate::core::thread_pool::HashingPool;
use crate::error::{Result, RustyGuardError};
use crate::security::timing::AuthTimer;
use crate::security_logger::{AuditEvent, AuditEventType, AuditLogger};
use crate::storage::session_store::MemorySessionStore;
use crate::storage::timeouts::bounded;
use crate::storage::token_revocation::MemoryRefreshTokenStore;
use crate::storage::traits::{
    CredentialStore, RefreshTokenStore, RevocationReason, RevocationStats, RotationOutcome, SessionStore,
};
use crate::storage::MemoryCredentialStore;

/// Backing stores used by the service
#[derive(Clone)]
pub struct AuthStores {
    pub credentials: Arc<dyn CredentialStore>,
    pub sessions: Arc<dyn SessionStore>,
    pub refresh_tokens: Arc<dyn RefreshTokenStore>,
}

impl AuthStores {
    /// Process-local stores, suitable for a single instance and for tests
    pub fn in_memory(clock: SharedClock) -> Self {
        Self {
            credentials: Arc::new(MemoryCredentialStore::new()),
            sessions: Arc::new(MemorySessionStore::new(clock.clone())),
            refresh_tokens: Arc::new(MemoryRefreshTokenStore::new(clock)),
        }
    }
}

/// Operator-facing counters
#[derive(Debug, Clone)]
pub struct AuthStats {
    pub active_sessions: usize,
    pub refresh_tokens: RevocationStats,
    pub rate_limited_keys: usize,
    pub audit_events: HashMap<AuditEventType, u64>,
}

/// A failed login with whatever identity was resolved before it failed
struct LoginFailure {
    user_id: Option<UserId>,
    error: RustyGuardError,
}

impl From<RustyGuardError> for LoginFailure {
    fn from(error: RustyGuardError) -> Self {
        Self { user_id: None, error }
    }
}

fn failure_reason(error: &RustyGuardError) -> &'static str {
    match error {
        RustyGuardError::InvalidCredentials => "invalid_credentials",
        RustyGuardError::InactiveAccount => "inactive_account",
        RustyGuardError::Throttled { .. } => "throttled",
        RustyGuardError::StorageUnavailable(_) => "unavailable",
        _ => "error",
    }
}

/// Authentication and authorization façade
pub struct AuthService {
    config: AuthConfig,
    credentials: Arc<dyn CredentialStore>,
    sessions: Arc<dyn SessionStore>,
    refresh_tokens: Arc<dyn RefreshTokenStore>,
    tokens: TokenService,
    hasher: Arc<PasswordHasher>,
    hashing_pool: HashingPool,
    roles: Arc<RoleRegistry>,
    rate_limiter: LoginRateLimiter,
    audit: Arc<AuditLogger>,
    pipeline: RequestPipeline,
    clock: SharedClock,
}

impl AuthService {
    pub fn new(
        config: AuthConfig,
        stores: AuthStores,
        roles: Arc<RoleRegistry>,
        audit: Arc<AuditLogger>,
        clock: SharedClock,
    ) -> Result<Self> {
        config.validate()?;

        let tokens = TokenService::from_config(&config, Arc::clone(&stores.refresh_tokens), clock.clone())?;
        let hasher = Arc::new(PasswordHasher::from_config(&config)?);
        let hashing_pool = HashingPool::from_config(&config)?;
        let rate_limiter = LoginRateLimiter::from_config(&config, clock.clone())?;

        Ok(Self {
            config,
            credentials: stores.credentials,
            sessions: stores.sessions,
            refresh_tokens: stores.refresh_tokens,
            tokens,
            hasher,
            hashing_pool,
            roles,
            rate_limiter,
            audit,
            pipeline: RequestPipeline::default(),
            clock,
        })
    }

    /// Service over in-memory stores with the built-in roles
    pub fn in_memory(config: AuthConfig, audit: Arc<AuditLogger>, clock: SharedClock) -> Result<Self> {
        let stores = AuthStores::in_memory(clock.clone());
        Self::new(config, stores, Arc::new(RoleRegistry::with_builtin_roles()), audit, clock)
    }

    /// Replace the request stages run by `authorize_request`
    pub fn with_pipeline(mut self, pipeline: RequestPipeline) -> Self {
        self.pipeline = pipeline;
        self
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn roles(&self) -> &RoleRegistry {
        &self.roles
    }

    pub fn token_service(&self) -> &TokenService {
        &self.tokens
    }

    fn timeout(&self) -> Duration {
        self.config.storage_timeout
    }

    async fn record_audit(
        &self,
        event_type: AuditEventType,
        user_id: Option<UserId>,
        metadata: &ClientMetadata,
        detail: serde_json::Value,
    ) {
        let event = AuditEvent::new(event_type, user_id, self.clock.now(), metadata.clone()).with_detail(detail);
        self.audit.record(event).await;
    }

    async fn verify_on_pool(&self, password: &str, hash: Option<PasswordHashRecord>) -> Result<bool> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        self.hashing_pool
            .run(move || match hash {
                Some(hash) => hasher.verify(&password, &hash),
                None => hasher.verify_dummy(&password),
            })
            .await
    }

    async fn hash_on_pool(&self, password: &str) -> Result<PasswordHashRecord> {
        let hasher = Arc::clone(&self.hasher);
        let password = password.to_string();
        self.hashing_pool.run(move || hasher.hash(&password)).await?
    }

    /// Create an account. New accounts get the `viewer` role when `roles`
    /// is empty; every requested role must already be defined.
    pub async fn register(&self, username: &str, email: &str, password: &str, roles: BTreeSet<String>) -> Result<User> {
        let username = username.trim();
        let email = email.trim();
        validate_username(username)?;
        validate_email(email)?;
        validate_password(password, username)?;

        let roles = if roles.is_empty() {
            [DEFAULT_USER_ROLE.to_string()].into_iter().collect()
        } else {
            roles
        };
        for role in &roles {
            if !self.roles.contains(role)? {
                return Err(RustyGuardError::ValidationError(format!("Unknown role '{}'", role)));
            }
        }

        let password_hash = self.hash_on_pool(password).await?;
        let new_user = NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash,
            roles,
            created_at: self.clock.now(),
        };
        bounded(self.timeout(), "create_user", self.credentials.create_user(new_user)).await
    }

    /// Authenticate with username or email and password.
    ///
    /// Failures are indistinguishable to the caller beyond the coarse error
    /// kind and take at least the configured minimum duration.
    pub async fn login(&self, identifier: &str, password: &str, metadata: ClientMetadata) -> Result<AuthResult> {
        let timer = AuthTimer::start(self.config.min_failure_duration);
        let key = rate_key(identifier, metadata.ip);

        match self.login_attempt(identifier, password, &metadata, &key).await {
            Ok(result) => {
                if let Err(e) = self.rate_limiter.reset(&key) {
                    log::error!("Failed to reset rate limit after login: {}", e);
                }
                log::info!("SECURITY: Login succeeded for user {}", result.user.id);
                self.record_audit(
                    AuditEventType::LoginSuccess,
                    Some(result.user.id),
                    &metadata,
                    serde_json::json!({ "sessionId": result.session.session.id }),
                )
                .await;
                Ok(result)
            }
            Err(failure) => {
                let reason = failure_reason(&failure.error);
                log::warn!("SECURITY: Login failed ({}) from {:?}", reason, metadata.ip);
                self.record_audit(
                    AuditEventType::LoginFailure,
                    failure.user_id,
                    &metadata,
                    serde_json::json!({ "reason": reason }),
                )
                .await;
                timer.pad().await;
                Err(failure.error)
            }
        }
    }

    async fn login_attempt(
        &self,
        identifier: &str,
        password: &str,
        metadata: &ClientMetadata,
        key: &str,
    ) -> std::result::Result<AuthResult, LoginFailure> {
        // Received -> RateChecked
        let Some(_attempt) = self.rate_limiter.begin_attempt(key)? else {
            return Err(RustyGuardError::Throttled {
                retry_after: Duration::from_secs(1),
            }
            .into());
        };
        if let RateDecision::Throttled { retry_after } = self.rate_limiter.check_and_record(key)? {
            return Err(RustyGuardError::Throttled { retry_after }.into());
        }

        // RateChecked -> CredentialVerified. The hasher runs even when no
        // account matches so both paths cost the same.
        let record = bounded(
            self.timeout(),
            "find_user",
            self.credentials.find_by_username_or_email(identifier),
        )
        .await?;
        // Read before verifying: a credential change after this point makes
        // the session store refuse the session. Unknown identifiers read the
        // nil user's epoch so both paths make the same calls.
        let epoch_owner = record.as_ref().map(|r| r.user.id).unwrap_or_else(uuid::Uuid::nil);
        let epoch = bounded(
            self.timeout(),
            "credential_epoch",
            self.sessions.credential_epoch(epoch_owner),
        )
        .await?;
        let verified = self
            .verify_on_pool(password, record.as_ref().map(|r| r.password_hash.clone()))
            .await?;

        let record = match record {
            Some(record) if verified => record,
            Some(record) => {
                return Err(LoginFailure {
                    user_id: Some(record.user.id),
                    error: RustyGuardError::InvalidCredentials,
                })
            }
            None => return Err(RustyGuardError::InvalidCredentials.into()),
        };
        let user_id = record.user.id;
        if !record.user.active {
            return Err(LoginFailure {
                user_id: Some(user_id),
                error: RustyGuardError::InactiveAccount,
            });
        }

        // CredentialVerified -> SessionIssued
        let session = bounded(
            self.timeout(),
            "create_session",
            self.sessions.create(user_id, metadata.clone(), self.config.session_ttl, epoch),
        )
        .await
        .map_err(|error| LoginFailure {
            user_id: Some(user_id),
            error,
        })?;

        let now = self.clock.now();
        let mut user = record.user;
        user.last_login = Some(now);

        let issued = async {
            bounded(self.timeout(), "record_login", self.credentials.record_login(user_id, now)).await?;
            self.issue_token_pair(&user, session.session.id).await
        }
        .await;
        let tokens = match issued {
            Ok(tokens) => tokens,
            Err(e) => {
                // Do not leave a half-issued session behind
                if let Err(cleanup) = self.sessions.invalidate_by_id(session.session.id).await {
                    log::error!("Failed to invalidate session after login error: {}", cleanup);
                }
                return Err(LoginFailure {
                    user_id: Some(user_id),
                    error: e,
                });
            }
        };

        if self.hasher.needs_rehash(&record.password_hash) {
            self.upgrade_hash(user_id, &record.password_hash, password).await;
        }

        Ok(AuthResult { user, session, tokens })
    }

    /// Re-hash a verified password with the current cost parameters. The
    /// new hash only replaces `verified`, never a hash set since.
    async fn upgrade_hash(&self, user_id: UserId, verified: &PasswordHashRecord, password: &str) {
        let result = async {
            let hash = self.hash_on_pool(password).await?;
            bounded(
                self.timeout(),
                "replace_password_hash",
                self.credentials.replace_password_hash(user_id, verified, hash),
            )
            .await
        }
        .await;
        match result {
            Ok(true) => log::info!("Password hash for user {} upgraded to current cost parameters", user_id),
            Ok(false) => log::info!("Password for user {} changed during login; skipping hash upgrade", user_id),
            Err(e) => log::warn!("Password hash upgrade for user {} failed: {}", user_id, e),
        }
    }

    async fn issue_token_pair(&self, user: &User, session_id: uuid::Uuid) -> Result<TokenPair> {
        let access_token = self.tokens.issue_access_token(user, Some(session_id))?;
        let refresh = bounded(
            self.timeout(),
            "store_refresh_token",
            self.tokens.issue_refresh_token(user, session_id),
        )
        .await?;
        Ok(TokenPair {
            access_token,
            refresh_token: refresh.token,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    /// End the session behind a credential along with its refresh tokens.
    ///
    /// Idempotent: unknown, expired or already revoked credentials succeed
    /// without effect.
    pub async fn logout(&self, credential: &Credential, metadata: &ClientMetadata) -> Result<()> {
        let target = match credential {
            Credential::Session(token) => {
                let session = bounded(self.timeout(), "get_session", self.sessions.get(token)).await?;
                bounded(self.timeout(), "invalidate_session", self.sessions.invalidate(token)).await?;
                session.map(|s| (s.user_id, s.id))
            }
            Credential::Bearer(token) => {
                let claims = self
                    .tokens
                    .verify_signature(token, TokenType::Access)
                    .or_else(|_| self.tokens.verify_signature(token, TokenType::Refresh));
                match claims {
                    Ok(claims) => match (claims.user_id(), claims.sid) {
                        (Ok(user_id), Some(session_id)) => Some((user_id, session_id)),
                        _ => None,
                    },
                    Err(_) => None,
                }
            }
        };

        let Some((user_id, session_id)) = target else {
            log::debug!("Logout with inactive {} credential; nothing to do", credential.kind());
            return Ok(());
        };

        bounded(self.timeout(), "invalidate_session", self.sessions.invalidate_by_id(session_id)).await?;
        let revoked = bounded(
            self.timeout(),
            "revoke_session_tokens",
            self.refresh_tokens.revoke_session(session_id, RevocationReason::UserLogout),
        )
        .await?;

        log::info!("User {} logged out of session {}", user_id, session_id);
        self.record_audit(
            AuditEventType::Logout,
            Some(user_id),
            metadata,
            serde_json::json!({ "sessionId": session_id, "revokedRefreshTokens": revoked }),
        )
        .await;
        Ok(())
    }

    /// Exchange a refresh token for a new token pair, rotating the refresh
    /// token. Presenting an already rotated token ends the whole session.
    pub async fn refresh(&self, refresh_token: &str, metadata: &ClientMetadata) -> Result<TokenPair> {
        let claims = self.tokens.verify_signature(refresh_token, TokenType::Refresh)?;
        let user_id = claims.user_id()?;
        let session_id = claims.sid.ok_or(RustyGuardError::TokenInvalid)?;

        let session = bounded(self.timeout(), "get_session", self.sessions.get_by_id(session_id)).await?;
        if session.map(|s| s.user_id) != Some(user_id) {
            return Err(RustyGuardError::TokenInvalid);
        }
        let user = bounded(self.timeout(), "find_user", self.credentials.find_by_id(user_id))
            .await?
            .ok_or(RustyGuardError::TokenInvalid)?;
        if !user.active {
            return Err(RustyGuardError::InactiveAccount);
        }

        let successor = self.tokens.prepare_refresh_token(&user, session_id)?;
        let outcome = bounded(
            self.timeout(),
            "rotate_refresh_token",
            self.refresh_tokens.rotate(&claims.jti, successor.record.clone()),
        )
        .await?;

        match outcome {
            RotationOutcome::Rotated => {}
            RotationOutcome::Unknown => return Err(RustyGuardError::TokenInvalid),
            RotationOutcome::AlreadyRevoked(record) => {
                if record.reason == Some(RevocationReason::Rotated) {
                    self.handle_refresh_reuse(user_id, session_id, metadata).await?;
                }
                return Err(RustyGuardError::TokenInvalid);
            }
        }

        let access_token = self.tokens.issue_access_token(&user, Some(session_id))?;
        self.record_audit(
            AuditEventType::TokenRefresh,
            Some(user_id),
            metadata,
            serde_json::json!({ "sessionId": session_id, "outcome": "rotated" }),
        )
        .await;

        Ok(TokenPair {
            access_token,
            refresh_token: successor.token,
            expires_in: self.tokens.access_ttl_secs(),
        })
    }

    async fn handle_refresh_reuse(&self, user_id: UserId, session_id: uuid::Uuid, metadata: &ClientMetadata) -> Result<()> {
        log::warn!(
            "SECURITY: Rotated refresh token replayed for user {}; revoking session {}",
            user_id,
            session_id
        );
        bounded(
            self.timeout(),
            "revoke_session_tokens",
            self.refresh_tokens.revoke_session(session_id, RevocationReason::ReuseDetected),
        )
        .await?;
        bounded(self.timeout(), "invalidate_session", self.sessions.invalidate_by_id(session_id)).await?;
        self.record_audit(
            AuditEventType::TokenRefresh,
            Some(user_id),
            metadata,
            serde_json::json!({ "sessionId": session_id, "outcome": "reuse_detected" }),
        )
        .await;
        Ok(())
    }

    /// Resolve a credential to the principal behind it
    pub async fn authenticate(&self, credential: &Credential) -> Result<Principal> {
        match credential {
            Credential::Session(token) => {
                let session = bounded(self.timeout(), "get_session", self.sessions.get(token))
                    .await?
                    .ok_or(RustyGuardError::TokenInvalid)?;
                let user = bounded(self.timeout(), "find_user", self.credentials.find_by_id(session.user_id))
                    .await?
                    .ok_or(RustyGuardError::TokenInvalid)?;
                if !user.active {
                    return Err(RustyGuardError::InactiveAccount);
                }
                Ok(Principal {
                    user_id: user.id,
                    username: user.username,
                    roles: user.roles,
                    source: PrincipalSource::Session { session_id: session.id },
                })
            }
            // Access tokens are not looked up; they stay valid until expiry
            Credential::Bearer(token) => {
                let claims = self.tokens.verify_signature(token, TokenType::Access)?;
                Ok(Principal {
                    user_id: claims.user_id()?,
                    username: claims.username,
                    roles: claims.roles,
                    source: PrincipalSource::AccessToken {
                        session_id: claims.sid,
                        token_id: claims.jti,
                    },
                })
            }
        }
    }

    /// Authenticate a credential and check that it grants `required`.
    /// Any failure, including a storage timeout, denies.
    pub async fn authorize_request(
        &self,
        credential: &Credential,
        required: &BTreeSet<Permission>,
        metadata: &ClientMetadata,
    ) -> Result<Principal> {
        let principal = self.authenticate(credential).await?;
        let roles = self.roles.resolve(principal.roles.iter())?;

        let ctx = RequestContext {
            principal: &principal,
            roles: &roles,
            required,
            metadata,
        };
        if let Err(e) = self.pipeline.run(&ctx) {
            if let RustyGuardError::PermissionDenied(reason) = &e {
                log::warn!("SECURITY: Permission denied for user {}: {}", principal.user_id, reason);
                let required: Vec<&str> = required.iter().map(Permission::as_str).collect();
                self.record_audit(
                    AuditEventType::PermissionDenied,
                    Some(principal.user_id),
                    metadata,
                    serde_json::json!({ "required": required, "reason": reason }),
                )
                .await;
            }
            return Err(e);
        }
        Ok(principal)
    }

    /// Public identity of the principal behind a credential
    pub async fn me(&self, credential: &Credential) -> Result<Identity> {
        let principal = self.authenticate(credential).await?;
        Ok(Identity {
            id: principal.user_id,
            username: principal.username,
            roles: principal.roles,
        })
    }

    async fn load_user(&self, user_id: UserId) -> Result<User> {
        bounded(self.timeout(), "find_user", self.credentials.find_by_id(user_id))
            .await?
            .ok_or_else(|| RustyGuardError::NotFound(format!("User {} not found", user_id)))
    }

    /// End every session and refresh token a user holds
    async fn revoke_everything(&self, user_id: UserId, reason: RevocationReason) -> Result<()> {
        let sessions = bounded(
            self.timeout(),
            "invalidate_user_sessions",
            self.sessions.invalidate_all_for_user(user_id),
        )
        .await?;
        let tokens = bounded(
            self.timeout(),
            "revoke_user_tokens",
            self.refresh_tokens.revoke_user_tokens(user_id, reason),
        )
        .await?;
        log::info!(
            "SECURITY: Revoked {} sessions and {} refresh tokens for user {} ({:?})",
            sessions,
            tokens,
            user_id,
            reason
        );
        Ok(())
    }

    /// Change a password after re-verifying the current one. Ends all of the
    /// user's sessions.
    pub async fn change_password(&self, user_id: UserId, current: &str, new_password: &str) -> Result<()> {
        let user = self.load_user(user_id).await?;
        let stored = bounded(self.timeout(), "get_password_hash", self.credentials.password_hash(user_id)).await?;
        if stored.is_none() || !self.verify_on_pool(current, stored).await? {
            return Err(RustyGuardError::InvalidCredentials);
        }
        self.set_password(&user, new_password, RevocationReason::CredentialChange).await
    }

    /// Administrative password reset; no current password required
    pub async fn reset_password(&self, user_id: UserId, new_password: &str) -> Result<()> {
        let user = self.load_user(user_id).await?;
        self.set_password(&user, new_password, RevocationReason::AdminRevocation).await
    }

    async fn set_password(&self, user: &User, new_password: &str, reason: RevocationReason) -> Result<()> {
        validate_password(new_password, &user.username)?;
        let hash = self.hash_on_pool(new_password).await?;
        // Advance the credential epoch before the hash changes; together with
        // the revocation below no login verified against the old hash keeps
        // a session
        bounded(
            self.timeout(),
            "invalidate_user_sessions",
            self.sessions.invalidate_all_for_user(user.id),
        )
        .await?;
        bounded(
            self.timeout(),
            "update_password_hash",
            self.credentials.update_password_hash(user.id, hash),
        )
        .await?;
        log::info!("SECURITY: Password changed for user {}", user.id);
        self.revoke_everything(user.id, reason).await
    }

    /// Soft-deactivate an account and end all of its sessions
    pub async fn deactivate_user(&self, user_id: UserId) -> Result<()> {
        bounded(self.timeout(), "set_active", self.credentials.set_active(user_id, false)).await?;
        log::info!("SECURITY: User {} deactivated", user_id);
        self.revoke_everything(user_id, RevocationReason::AccountSuspension).await
    }

    pub async fn activate_user(&self, user_id: UserId) -> Result<()> {
        bounded(self.timeout(), "set_active", self.credentials.set_active(user_id, true)).await?;
        log::info!("User {} reactivated", user_id);
        Ok(())
    }

    /// Replace a user's roles. Sessions see the change immediately; access
    /// tokens already issued keep their snapshot until they expire.
    pub async fn set_user_roles(&self, user_id: UserId, roles: BTreeSet<String>) -> Result<()> {
        for role in &roles {
            if !self.roles.contains(role)? {
                return Err(RustyGuardError::ValidationError(format!("Unknown role '{}'", role)));
            }
        }
        bounded(self.timeout(), "set_roles", self.credentials.set_roles(user_id, roles)).await?;
        log::info!("SECURITY: Roles updated for user {}", user_id);
        Ok(())
    }

    pub async fn stats(&self) -> Result<AuthStats> {
        Ok(AuthStats {
            active_sessions: bounded(self.timeout(), "count_sessions", self.sessions.active_count()).await?,
            refresh_tokens: bounded(
                self.timeout(),
                "refresh_token_stats",
                self.refresh_tokens.get_revocation_stats(),
            )
            .await?,
            rate_limited_keys: self.rate_limiter.tracked_keys()?,
            audit_events: self.audit.stats(),
        })
    }

    /// One pass of background housekeeping: reclaim expired sessions and
    /// refresh records and evict idle rate-limit keys
    pub async fn run_maintenance(&self) -> Result<()> {
        let sessions = bounded(self.timeout(), "sweep_sessions", self.sessions.sweep_expired()).await?;
        let records = bounded(
            self.timeout(),
            "cleanup_refresh_tokens",
            self.refresh_tokens.cleanup_expired(),
        )
        .await?;
        let keys = self.rate_limiter.cleanup()?;
        if sessions + records + keys > 0 {
            log::debug!(
                "Maintenance removed {} sessions, {} refresh records, {} rate-limit keys",
                sessions,
                records,
                keys
            );
        }
        Ok(())
    }

    /// Start periodic maintenance on the configured sweep interval
    pub fn start_maintenance(self: &Arc<Self>) -> JoinHandle<()> {
        let service = Arc::clone(self);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(service.config.sweep_interval);
            loop {
                interval.tick().await;
                if let Err(e) = service.run_maintenance().await {
                    log::error!("Maintenance pass failed: {}", e);
                }
            }
        })
    }
}
