//! In-memory server-side session storage
//!
//! Sessions are keyed by the SHA-256 digest of their token, so a dump of the
//! table cannot be replayed as credentials. All indexes live under one lock:
//! an invalidation is visible to every `get` that starts after it returns.
//! The per-user credential epochs share that lock, so `create` and
//! `invalidate_all_for_user` for one user are totally ordered.

use async_trait::async_trait;
use base64::Engine;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{IssuedSession, Session, SessionStore, SessionToken};
use crate::auth::principal::ClientMetadata;
use crate::auth::user::UserId;
use crate::clock::SharedClock;
use crate::constants::SESSION_TOKEN_BYTES;
use crate::error::{Result, RustyGuardError};

/// Generate a URL-safe session token from the OS CSPRNG
pub fn generate_session_token() -> SessionToken {
    let mut bytes = [0u8; SESSION_TOKEN_BYTES];
    OsRng.fill_bytes(&mut bytes);
    SessionToken::new(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(bytes))
}

/// Digest used as the storage key for a token
pub fn token_digest(token: &str) -> String {
    let digest = Sha256::digest(token.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest)
}

#[derive(Default)]
struct SessionTable {
    /// token digest -> session
    sessions: HashMap<String, Session>,
    /// session id -> token digest
    by_id: HashMap<Uuid, String>,
    /// user id -> token digests
    by_user: HashMap<UserId, HashSet<String>>,
    /// user id -> credential epoch; absent means 0
    epochs: HashMap<UserId, u64>,
}

impl SessionTable {
    fn epoch(&self, user_id: &UserId) -> u64 {
        self.epochs.get(user_id).copied().unwrap_or(0)
    }

    fn remove(&mut self, digest: &str) {
        if let Some(session) = self.sessions.remove(digest) {
            self.by_id.remove(&session.id);
            if let Some(digests) = self.by_user.get_mut(&session.user_id) {
                digests.remove(digest);
                if digests.is_empty() {
                    self.by_user.remove(&session.user_id);
                }
            }
        }
    }

    /// Flag a session invalid; returns whether it was active
    fn invalidate(&mut self, digest: &str, now: chrono::DateTime<chrono::Utc>) -> bool {
        match self.sessions.get_mut(digest) {
            Some(session) => {
                let was_active = session.is_active_at(now);
                session.valid = false;
                was_active
            }
            None => false,
        }
    }
}

/// In-memory implementation of the session store
pub struct MemorySessionStore {
    table: Arc<RwLock<SessionTable>>,
    clock: SharedClock,
}

impl MemorySessionStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            table: Arc::new(RwLock::new(SessionTable::default())),
            clock,
        }
    }

    /// Number of entries held, including expired ones not yet swept
    pub async fn stored_count(&self) -> usize {
        self.table.read().await.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn credential_epoch(&self, user_id: UserId) -> Result<u64> {
        Ok(self.table.read().await.epoch(&user_id))
    }

    async fn create(
        &self,
        user_id: UserId,
        metadata: ClientMetadata,
        ttl: Duration,
        epoch: u64,
    ) -> Result<IssuedSession> {
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| RustyGuardError::ValidationError(format!("Session TTL out of range: {}", e)))?;
        let token = generate_session_token();
        let digest = token_digest(token.as_str());
        let now = self.clock.now();

        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            created_at: now,
            expires_at: now + ttl,
            metadata,
            valid: true,
        };

        let mut table = self.table.write().await;
        if table.epoch(&user_id) != epoch {
            log::warn!(
                "SECURITY: Refusing session for user {}; credentials changed during login",
                user_id
            );
            return Err(RustyGuardError::InvalidCredentials);
        }
        if table.sessions.contains_key(&digest) {
            // 256 bits of entropy; a collision means the RNG is broken
            return Err(RustyGuardError::SystemError("Session token collision".to_string()));
        }
        table.by_id.insert(session.id, digest.clone());
        table.by_user.entry(user_id).or_default().insert(digest.clone());
        table.sessions.insert(digest, session.clone());

        log::debug!("Session {} created for user {}", session.id, user_id);
        Ok(IssuedSession { token, session })
    }

    async fn get(&self, token: &str) -> Result<Option<Session>> {
        let digest = token_digest(token);
        let now = self.clock.now();
        let table = self.table.read().await;
        Ok(table
            .sessions
            .get(&digest)
            .filter(|session| session.is_active_at(now))
            .cloned())
    }

    async fn get_by_id(&self, session_id: Uuid) -> Result<Option<Session>> {
        let now = self.clock.now();
        let table = self.table.read().await;
        Ok(table
            .by_id
            .get(&session_id)
            .and_then(|digest| table.sessions.get(digest))
            .filter(|session| session.is_active_at(now))
            .cloned())
    }

    async fn invalidate(&self, token: &str) -> Result<bool> {
        let digest = token_digest(token);
        let now = self.clock.now();
        let mut table = self.table.write().await;
        Ok(table.invalidate(&digest, now))
    }

    async fn invalidate_by_id(&self, session_id: Uuid) -> Result<bool> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        match table.by_id.get(&session_id).cloned() {
            Some(digest) => Ok(table.invalidate(&digest, now)),
            None => Ok(false),
        }
    }

    async fn invalidate_all_for_user(&self, user_id: UserId) -> Result<usize> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        *table.epochs.entry(user_id).or_insert(0) += 1;
        let digests: Vec<String> = table
            .by_user
            .get(&user_id)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default();

        let count = digests
            .iter()
            .filter(|digest| table.invalidate(digest, now))
            .count();

        if count > 0 {
            log::info!("Invalidated {} sessions for user {}", count, user_id);
        }
        Ok(count)
    }

    async fn sweep_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let stale: Vec<String> = table
            .sessions
            .iter()
            .filter(|(_, session)| !session.is_active_at(now))
            .map(|(digest, _)| digest.clone())
            .collect();

        for digest in &stale {
            table.remove(digest);
        }

        if !stale.is_empty() {
            log::info!("Swept {} expired or invalidated sessions", stale.len());
        }
        Ok(stale.len())
    }

    async fn active_count(&self) -> Result<usize> {
        let now = self.clock.now();
        let table = self.table.read().await;
        Ok(table.sessions.values().filter(|s| s.is_active_at(now)).count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn store_with_clock() -> (MemorySessionStore, ManualClock) {
        let clock = ManualClock::starting_now();
        (MemorySessionStore::new(Arc::new(clock.clone())), clock)
    }

    #[test]
    fn test_token_entropy_and_format() {
        let a = generate_session_token();
        let b = generate_session_token();
        assert_ne!(a, b);
        // 32 bytes -> 43 base64url chars without padding
        assert_eq!(a.as_str().len(), 43);
        assert!(!a.as_str().contains('.'));
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let (store, _clock) = store_with_clock();
        let user = Uuid::new_v4();
        let issued = store
            .create(user, ClientMetadata::default(), Duration::from_secs(60), 0)
            .await
            .unwrap();

        let session = store.get(issued.token.as_str()).await.unwrap().unwrap();
        assert_eq!(session.user_id, user);
        assert_eq!(session.id, issued.session.id);
        assert_ne!(session.id.to_string(), issued.token.as_str());
        assert!(store.get("unknown").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_expiry_boundary() {
        let (store, clock) = store_with_clock();
        let issued = store
            .create(Uuid::new_v4(), ClientMetadata::default(), Duration::from_secs(60), 0)
            .await
            .unwrap();

        clock.advance(chrono::Duration::seconds(59));
        assert!(store.get(issued.token.as_str()).await.unwrap().is_some());

        clock.advance(chrono::Duration::seconds(2));
        assert!(store.get(issued.token.as_str()).await.unwrap().is_none());
        // Still stored until swept, but logically gone
        assert_eq!(store.stored_count().await, 1);
    }

    #[tokio::test]
    async fn test_invalidate_is_immediate_and_idempotent() {
        let (store, _clock) = store_with_clock();
        let issued = store
            .create(Uuid::new_v4(), ClientMetadata::default(), Duration::from_secs(60), 0)
            .await
            .unwrap();

        assert!(store.invalidate(issued.token.as_str()).await.unwrap());
        assert!(store.get(issued.token.as_str()).await.unwrap().is_none());
        assert!(store.get_by_id(issued.session.id).await.unwrap().is_none());
        assert!(!store.invalidate(issued.token.as_str()).await.unwrap());
    }

    #[tokio::test]
    async fn test_invalidate_all_for_user() {
        let (store, _clock) = store_with_clock();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();
        let a1 = store.create(alice, ClientMetadata::default(), Duration::from_secs(60), 0).await.unwrap();
        let a2 = store.create(alice, ClientMetadata::default(), Duration::from_secs(60), 0).await.unwrap();
        let b1 = store.create(bob, ClientMetadata::default(), Duration::from_secs(60), 0).await.unwrap();

        assert_eq!(store.invalidate_all_for_user(alice).await.unwrap(), 2);
        assert!(store.get(a1.token.as_str()).await.unwrap().is_none());
        assert!(store.get(a2.token.as_str()).await.unwrap().is_none());
        assert!(store.get(b1.token.as_str()).await.unwrap().is_some());
        assert_eq!(store.active_count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_sweep_reclaims_memory() {
        let (store, clock) = store_with_clock();
        let user = Uuid::new_v4();
        let short = store.create(user, ClientMetadata::default(), Duration::from_secs(10), 0).await.unwrap();
        let long = store.create(user, ClientMetadata::default(), Duration::from_secs(100), 0).await.unwrap();
        let dead = store.create(user, ClientMetadata::default(), Duration::from_secs(100), 0).await.unwrap();
        store.invalidate(dead.token.as_str()).await.unwrap();

        clock.advance(chrono::Duration::seconds(20));
        assert_eq!(store.sweep_expired().await.unwrap(), 2);
        assert_eq!(store.stored_count().await, 1);
        assert!(store.get(short.token.as_str()).await.unwrap().is_none());
        assert!(store.get(long.token.as_str()).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_create_refused_once_epoch_moves() {
        let (store, _clock) = store_with_clock();
        let alice = Uuid::new_v4();
        let bob = Uuid::new_v4();

        let epoch = store.credential_epoch(alice).await.unwrap();
        assert_eq!(epoch, 0);
        let early = store.create(alice, ClientMetadata::default(), Duration::from_secs(60), epoch).await.unwrap();

        assert_eq!(store.invalidate_all_for_user(alice).await.unwrap(), 1);
        assert_eq!(store.credential_epoch(alice).await.unwrap(), 1);
        assert!(store.get(early.token.as_str()).await.unwrap().is_none());

        // A login that read the epoch before the invalidation gets nothing
        let late = store.create(alice, ClientMetadata::default(), Duration::from_secs(60), epoch).await;
        assert!(matches!(late, Err(RustyGuardError::InvalidCredentials)));
        assert_eq!(store.active_count().await.unwrap(), 0);

        assert!(store.create(alice, ClientMetadata::default(), Duration::from_secs(60), 1).await.is_ok());
        assert!(store.create(bob, ClientMetadata::default(), Duration::from_secs(60), 0).await.is_ok());
    }

    #[tokio::test]
    async fn test_concurrent_create_and_invalidate_all() {
        let (store, _clock) = store_with_clock();
        let store = Arc::new(store);
        let user = Uuid::new_v4();

        let mut handles = Vec::new();
        for _ in 0..20 {
            let store = Arc::clone(&store);
            handles.push(tokio::spawn(async move {
                let epoch = store.credential_epoch(user).await.unwrap();
                tokio::task::yield_now().await;
                let created = store.create(user, ClientMetadata::default(), Duration::from_secs(60), epoch).await;
                (epoch, created)
            }));
        }
        let invalidation = {
            let store = Arc::clone(&store);
            tokio::spawn(async move {
                tokio::task::yield_now().await;
                store.invalidate_all_for_user(user).await.unwrap()
            })
        };

        let mut outcomes = Vec::new();
        for handle in handles {
            outcomes.push(handle.await.unwrap());
        }
        invalidation.await.unwrap();

        // Anything created under the old epoch is either refused or dead
        for (epoch, created) in outcomes {
            match (epoch, created) {
                (0, Ok(issued)) => assert!(store.get(issued.token.as_str()).await.unwrap().is_none()),
                (0, Err(e)) => assert!(matches!(e, RustyGuardError::InvalidCredentials)),
                (_, created) => assert!(created.is_ok()),
            }
        }
    }
}
