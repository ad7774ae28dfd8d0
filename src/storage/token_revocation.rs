//! Refresh-token record storage and revocation
//!
//! Refresh tokens are signed, but each one is also backed by a server-side
//! record so it can be revoked before it expires. Rotation is a single
//! check-and-set under the table lock: of two concurrent refreshes with the
//! same token, exactly one wins.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::{RefreshTokenRecord, RefreshTokenStore, RevocationReason, RevocationStats, RotationOutcome};
use crate::auth::user::UserId;
use crate::clock::SharedClock;
use crate::error::Result;

#[derive(Default)]
struct RecordTable {
    /// token id -> record
    records: HashMap<String, RefreshTokenRecord>,
    /// user id -> token ids
    by_user: HashMap<UserId, HashSet<String>>,
    /// session id -> token ids
    by_session: HashMap<Uuid, HashSet<String>>,
}

impl RecordTable {
    fn insert(&mut self, record: RefreshTokenRecord) {
        self.by_user
            .entry(record.user_id)
            .or_default()
            .insert(record.token_id.clone());
        self.by_session
            .entry(record.session_id)
            .or_default()
            .insert(record.token_id.clone());
        self.records.insert(record.token_id.clone(), record);
    }

    fn remove(&mut self, token_id: &str) {
        if let Some(record) = self.records.remove(token_id) {
            if let Some(ids) = self.by_user.get_mut(&record.user_id) {
                ids.remove(token_id);
                if ids.is_empty() {
                    self.by_user.remove(&record.user_id);
                }
            }
            if let Some(ids) = self.by_session.get_mut(&record.session_id) {
                ids.remove(token_id);
                if ids.is_empty() {
                    self.by_session.remove(&record.session_id);
                }
            }
        }
    }

    fn revoke_ids(
        &mut self,
        ids: Vec<String>,
        reason: RevocationReason,
        now: chrono::DateTime<chrono::Utc>,
    ) -> usize {
        let mut count = 0;
        for id in ids {
            if let Some(record) = self.records.get_mut(&id) {
                if !record.is_revoked() {
                    record.revoked_at = Some(now);
                    record.reason = Some(reason);
                    count += 1;
                }
            }
        }
        count
    }
}

/// In-memory implementation of the refresh-token store
pub struct MemoryRefreshTokenStore {
    table: Arc<RwLock<RecordTable>>,
    clock: SharedClock,
}

impl MemoryRefreshTokenStore {
    pub fn new(clock: SharedClock) -> Self {
        Self {
            table: Arc::new(RwLock::new(RecordTable::default())),
            clock,
        }
    }
}

#[async_trait]
impl RefreshTokenStore for MemoryRefreshTokenStore {
    async fn insert(&self, record: RefreshTokenRecord) -> Result<()> {
        let mut table = self.table.write().await;
        table.insert(record);
        Ok(())
    }

    async fn get(&self, token_id: &str) -> Result<Option<RefreshTokenRecord>> {
        let table = self.table.read().await;
        Ok(table.records.get(token_id).cloned())
    }

    async fn rotate(&self, old_token_id: &str, successor: RefreshTokenRecord) -> Result<RotationOutcome> {
        let now = self.clock.now();
        let mut table = self.table.write().await;

        let successor_id = successor.token_id.clone();
        match table.records.get_mut(old_token_id) {
            None => return Ok(RotationOutcome::Unknown),
            Some(old) if old.is_revoked() => return Ok(RotationOutcome::AlreadyRevoked(old.clone())),
            Some(old) => {
                old.revoked_at = Some(now);
                old.reason = Some(RevocationReason::Rotated);
                old.replaced_by = Some(successor_id);
            }
        }
        table.insert(successor);
        Ok(RotationOutcome::Rotated)
    }

    async fn revoke(&self, token_id: &str, reason: RevocationReason) -> Result<bool> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let revoked = table.revoke_ids(vec![token_id.to_string()], reason, now) == 1;
        if revoked {
            log::info!("Refresh token {} revoked ({:?})", token_id, reason);
        }
        Ok(revoked)
    }

    async fn revoke_session(&self, session_id: Uuid, reason: RevocationReason) -> Result<usize> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let ids: Vec<String> = table
            .by_session
            .get(&session_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let count = table.revoke_ids(ids, reason, now);
        if count > 0 {
            log::info!("Revoked {} refresh tokens for session {} ({:?})", count, session_id, reason);
        }
        Ok(count)
    }

    async fn revoke_user_tokens(&self, user_id: UserId, reason: RevocationReason) -> Result<usize> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let ids: Vec<String> = table
            .by_user
            .get(&user_id)
            .map(|ids| ids.iter().cloned().collect())
            .unwrap_or_default();
        let count = table.revoke_ids(ids, reason, now);
        log::info!("Revoked {} refresh tokens for user {} (reason: {:?})", count, user_id, reason);
        Ok(count)
    }

    async fn cleanup_expired(&self) -> Result<usize> {
        let now = self.clock.now();
        let mut table = self.table.write().await;
        let expired: Vec<String> = table
            .records
            .values()
            .filter(|record| record.expires_at <= now)
            .map(|record| record.token_id.clone())
            .collect();

        for token_id in &expired {
            table.remove(token_id);
        }

        if !expired.is_empty() {
            log::info!("Cleaned up {} expired refresh token records", expired.len());
        }
        Ok(expired.len())
    }

    async fn get_revocation_stats(&self) -> Result<RevocationStats> {
        let now = self.clock.now();
        let table = self.table.read().await;

        let mut by_reason = HashMap::new();
        let mut active_records = 0;
        for record in table.records.values() {
            match record.reason {
                Some(reason) => *by_reason.entry(reason).or_insert(0) += 1,
                None if record.expires_at > now => active_records += 1,
                None => {}
            }
        }

        Ok(RevocationStats {
            total_records: table.records.len(),
            active_records,
            by_reason,
        })
    }
}
