use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, decode_header, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::{Arc, RwLock};
use uuid::Uuid;

use crate::auth::user::{User, UserId};
use crate::clock::SharedClock;
use crate::config::{AuthConfig, SigningKeyConfig};
use crate::error::{Result, RustyGuardError};
use crate::storage::traits::{RefreshTokenRecord, RefreshTokenStore, RevocationReason};

/// Issuer claim stamped on every token
pub const TOKEN_ISSUER: &str = "rusty-guard";

/// Kind of signed token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

/// JWT Claims structure
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Username at issuance
    pub username: String,
    /// Issuer
    pub iss: String,
    /// Expiration time (as UTC timestamp)
    pub exp: i64,
    /// Issued at (as UTC timestamp)
    pub iat: i64,
    /// Not before (as UTC timestamp)
    pub nbf: i64,
    /// Unique token id; for refresh tokens, the key of the server-side record
    pub jti: String,
    pub typ: TokenType,
    /// Role snapshot at issuance
    #[serde(default)]
    pub roles: BTreeSet<String>,
    /// Session this token was issued under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sid: Option<Uuid>,
}

impl Claims {
    fn for_user(user: &User, typ: TokenType, session_id: Option<Uuid>, now: DateTime<Utc>, ttl: chrono::Duration) -> Self {
        let now_ts = now.timestamp();
        Self {
            sub: user.id.to_string(),
            username: user.username.clone(),
            iss: TOKEN_ISSUER.to_string(),
            exp: (now + ttl).timestamp(),
            iat: now_ts,
            nbf: now_ts,
            jti: Uuid::new_v4().to_string(),
            typ,
            roles: user.roles.clone(),
            sid: session_id,
        }
    }

    /// Check if the token is expired at `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now.timestamp() >= self.exp
    }

    pub fn user_id(&self) -> Result<UserId> {
        Uuid::parse_str(&self.sub).map_err(|_| RustyGuardError::TokenInvalid)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(self.exp, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// A signed refresh token together with its server-side record
#[derive(Debug, Clone)]
pub struct IssuedRefreshToken {
    pub token: String,
    pub record: RefreshTokenRecord,
}

struct KeyEntry {
    key_id: String,
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    /// When this key stopped signing; `None` for the current key
    retired_at: Option<DateTime<Utc>>,
}

impl KeyEntry {
    fn new(config: &SigningKeyConfig, retired_at: Option<DateTime<Utc>>) -> Self {
        Self {
            key_id: config.key_id.clone(),
            encoding_key: EncodingKey::from_secret(config.secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(config.secret.as_bytes()),
            retired_at,
        }
    }
}

struct KeyRing {
    current: KeyEntry,
    previous: Option<KeyEntry>,
}

/// Signs and verifies access and refresh tokens
pub struct TokenService {
    keys: RwLock<KeyRing>,
    refresh_store: Arc<dyn RefreshTokenStore>,
    clock: SharedClock,
    access_ttl: chrono::Duration,
    refresh_ttl: chrono::Duration,
    leeway: i64,
    rotation_overlap: chrono::Duration,
}

fn to_chrono(duration: std::time::Duration) -> Result<chrono::Duration> {
    chrono::Duration::from_std(duration)
        .map_err(|e| RustyGuardError::ConfigError(format!("Duration out of range: {}", e)))
}

impl TokenService {
    /// Creates a token service from configuration. A configured previous key
    /// is treated as retired at construction time.
    pub fn from_config(
        config: &AuthConfig,
        refresh_store: Arc<dyn RefreshTokenStore>,
        clock: SharedClock,
    ) -> Result<Self> {
        let now = clock.now();
        let keys = KeyRing {
            current: KeyEntry::new(&config.signing_key, None),
            previous: config
                .previous_signing_key
                .as_ref()
                .map(|previous| KeyEntry::new(previous, Some(now))),
        };

        Ok(Self {
            keys: RwLock::new(keys),
            refresh_store,
            clock,
            access_ttl: to_chrono(config.access_token_ttl)?,
            refresh_ttl: to_chrono(config.refresh_token_ttl)?,
            leeway: config.clock_leeway.as_secs() as i64,
            rotation_overlap: to_chrono(config.key_rotation_overlap)?,
        })
    }

    /// Access token lifetime in seconds
    pub fn access_ttl_secs(&self) -> u64 {
        self.access_ttl.num_seconds().max(0) as u64
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let keys = self.keys.read()?;
        let mut header = Header::new(Algorithm::HS256);
        header.kid = Some(keys.current.key_id.clone());
        encode(&header, claims, &keys.current.encoding_key)
            .map_err(|e| RustyGuardError::SystemError(format!("Failed to sign token: {}", e)))
    }

    /// Sign a short-lived access token carrying the user's current roles
    pub fn issue_access_token(&self, user: &User, session_id: Option<Uuid>) -> Result<String> {
        let claims = Claims::for_user(user, TokenType::Access, session_id, self.clock.now(), self.access_ttl);
        self.sign(&claims)
    }

    /// Sign a refresh token and build its server-side record without storing it
    pub fn prepare_refresh_token(&self, user: &User, session_id: Uuid) -> Result<IssuedRefreshToken> {
        let now = self.clock.now();
        let claims = Claims::for_user(user, TokenType::Refresh, Some(session_id), now, self.refresh_ttl);
        let token = self.sign(&claims)?;
        let record = RefreshTokenRecord::new(claims.jti, user.id, session_id, now, now + self.refresh_ttl);
        Ok(IssuedRefreshToken { token, record })
    }

    /// Sign a refresh token and persist its record so it can be revoked
    pub async fn issue_refresh_token(&self, user: &User, session_id: Uuid) -> Result<IssuedRefreshToken> {
        let issued = self.prepare_refresh_token(user, session_id)?;
        self.refresh_store.insert(issued.record.clone()).await?;
        Ok(issued)
    }

    fn decoding_key_for(&self, key_id: &str, now: DateTime<Utc>) -> Result<DecodingKey> {
        let keys = self.keys.read()?;
        if keys.current.key_id == key_id {
            return Ok(keys.current.decoding_key.clone());
        }
        if let Some(previous) = keys.previous.as_ref().filter(|p| p.key_id == key_id) {
            let still_accepted = previous
                .retired_at
                .map(|retired| now < retired + self.rotation_overlap)
                .unwrap_or(false);
            if still_accepted {
                return Ok(previous.decoding_key.clone());
            }
            log::debug!("Token signed with retired key '{}' outside the overlap window", key_id);
        }
        Err(RustyGuardError::TokenInvalid)
    }

    /// Verify signature, issuer, type and time claims. Does not consult the
    /// refresh-token record.
    pub fn verify_signature(&self, token: &str, expected: TokenType) -> Result<Claims> {
        let now = self.clock.now();
        let header = decode_header(token).map_err(|e| {
            log::debug!("Token header rejected: {}", e);
            RustyGuardError::TokenInvalid
        })?;
        let key_id = header.kid.ok_or(RustyGuardError::TokenInvalid)?;
        let key = self.decoding_key_for(&key_id, now)?;

        // Time claims are checked against the injected clock below
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = false;
        validation.validate_nbf = false;
        validation.set_issuer(&[TOKEN_ISSUER]);

        let claims = decode::<Claims>(token, &key, &validation)
            .map_err(|e| {
                log::debug!("Token validation failed: {}", e);
                RustyGuardError::TokenInvalid
            })?
            .claims;

        if claims.typ != expected {
            return Err(RustyGuardError::TokenInvalid);
        }

        let now_ts = now.timestamp();
        if claims.nbf > now_ts + self.leeway || claims.iat > now_ts + self.leeway {
            return Err(RustyGuardError::TokenInvalid);
        }
        if claims.is_expired_at(now) {
            return Err(RustyGuardError::TokenExpired);
        }

        Ok(claims)
    }

    /// Verify any token. Refresh tokens must also have an unrevoked record
    /// that matches their subject and session.
    pub async fn verify(&self, token: &str) -> Result<Claims> {
        let claims = match self.verify_signature(token, TokenType::Access) {
            Ok(claims) => return Ok(claims),
            Err(RustyGuardError::TokenInvalid) => self.verify_signature(token, TokenType::Refresh)?,
            Err(e) => return Err(e),
        };

        let record = self
            .refresh_store
            .get(&claims.jti)
            .await?
            .ok_or(RustyGuardError::TokenInvalid)?;
        if record.is_revoked()
            || record.user_id.to_string() != claims.sub
            || Some(record.session_id) != claims.sid
        {
            return Err(RustyGuardError::TokenInvalid);
        }
        Ok(claims)
    }

    pub async fn revoke_refresh_token(&self, token_id: &str, reason: RevocationReason) -> Result<bool> {
        self.refresh_store.revoke(token_id, reason).await
    }

    /// Make `new_key` the signing key. The old current key keeps verifying
    /// until the rotation overlap elapses.
    pub fn rotate_key(&self, new_key: &SigningKeyConfig) -> Result<()> {
        let now = self.clock.now();
        let mut keys = self.keys.write()?;
        if keys.current.key_id == new_key.key_id {
            return Err(RustyGuardError::ConfigError(
                "New signing key must use a different key id".to_string(),
            ));
        }
        let mut retiring = std::mem::replace(&mut keys.current, KeyEntry::new(new_key, None));
        retiring.retired_at = Some(now);
        log::info!(
            "SECURITY: Signing key rotated from '{}' to '{}'",
            retiring.key_id,
            keys.current.key_id
        );
        keys.previous = Some(retiring);
        Ok(())
    }

    pub fn current_key_id(&self) -> Result<String> {
        Ok(self.keys.read()?.current.key_id.clone())
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    let (scheme, token) = auth_header.trim().split_once(' ')?;
    if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() {
        Some(token.trim().to_string())
    } else {
        None
    }
}
