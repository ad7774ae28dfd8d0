//! In-memory credential storage for development and testing
//!
//! Keeps every account in memory behind one lock so that the uniqueness
//! indexes and the user table can never disagree.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::traits::CredentialStore;
use crate::auth::user::{CredentialRecord, NewUser, PasswordHashRecord, User, UserId};
use crate::error::{Result, RustyGuardError};

#[derive(Default)]
struct UserTable {
    users: HashMap<UserId, CredentialRecord>,
    by_username: HashMap<String, UserId>,
    by_email: HashMap<String, UserId>,
}

impl UserTable {
    fn record_mut(&mut self, user_id: UserId) -> Result<&mut CredentialRecord> {
        self.users
            .get_mut(&user_id)
            .ok_or_else(|| RustyGuardError::NotFound(format!("User {} not found", user_id)))
    }
}

fn normalize(identifier: &str) -> String {
    identifier.trim().to_lowercase()
}

/// In-memory credential storage
pub struct MemoryCredentialStore {
    table: Arc<RwLock<UserTable>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            table: Arc::new(RwLock::new(UserTable::default())),
        }
    }

    pub async fn user_count(&self) -> usize {
        self.table.read().await.users.len()
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn create_user(&self, new_user: NewUser) -> Result<User> {
        let username_key = normalize(&new_user.username);
        let email_key = normalize(&new_user.email);

        let mut table = self.table.write().await;

        // An email may not collide with another account's username either,
        // since both are accepted as login identifiers.
        if table.by_username.contains_key(&username_key) || table.by_email.contains_key(&username_key) {
            return Err(RustyGuardError::Conflict("Username already taken".to_string()));
        }
        if table.by_email.contains_key(&email_key) || table.by_username.contains_key(&email_key) {
            return Err(RustyGuardError::Conflict("Email already registered".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username: new_user.username,
            email: new_user.email,
            active: true,
            roles: new_user.roles,
            created_at: new_user.created_at,
            last_login: None,
        };

        table.by_username.insert(username_key, user.id);
        table.by_email.insert(email_key, user.id);
        table.users.insert(
            user.id,
            CredentialRecord {
                user: user.clone(),
                password_hash: new_user.password_hash,
            },
        );

        log::info!("User created: {} ({})", user.username, user.id);
        Ok(user)
    }

    async fn find_by_username_or_email(&self, identifier: &str) -> Result<Option<CredentialRecord>> {
        let key = normalize(identifier);
        let table = self.table.read().await;
        let user_id = table.by_username.get(&key).or_else(|| table.by_email.get(&key));
        Ok(user_id.and_then(|id| table.users.get(id)).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> Result<Option<User>> {
        let table = self.table.read().await;
        Ok(table.users.get(&user_id).map(|record| record.user.clone()))
    }

    async fn password_hash(&self, user_id: UserId) -> Result<Option<PasswordHashRecord>> {
        let table = self.table.read().await;
        Ok(table.users.get(&user_id).map(|record| record.password_hash.clone()))
    }

    async fn update_password_hash(&self, user_id: UserId, hash: PasswordHashRecord) -> Result<()> {
        let mut table = self.table.write().await;
        table.record_mut(user_id)?.password_hash = hash;
        Ok(())
    }

    async fn replace_password_hash(
        &self,
        user_id: UserId,
        expected: &PasswordHashRecord,
        hash: PasswordHashRecord,
    ) -> Result<bool> {
        let mut table = self.table.write().await;
        let record = table.record_mut(user_id)?;
        if record.password_hash != *expected {
            return Ok(false);
        }
        record.password_hash = hash;
        Ok(true)
    }

    async fn set_active(&self, user_id: UserId, active: bool) -> Result<()> {
        let mut table = self.table.write().await;
        table.record_mut(user_id)?.user.active = active;
        Ok(())
    }

    async fn set_roles(&self, user_id: UserId, roles: BTreeSet<String>) -> Result<()> {
        let mut table = self.table.write().await;
        table.record_mut(user_id)?.user.roles = roles;
        Ok(())
    }

    async fn record_login(&self, user_id: UserId, at: DateTime<Utc>) -> Result<()> {
        let mut table = self.table.write().await;
        table.record_mut(user_id)?.user.last_login = Some(at);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_user(username: &str, email: &str) -> NewUser {
        NewUser {
            username: username.to_string(),
            email: email.to_string(),
            password_hash: PasswordHashRecord::new("$argon2id$placeholder".to_string()),
            roles: ["viewer".to_string()].into_iter().collect(),
            created_at: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let by_name = store.find_by_username_or_email("Alice").await.unwrap().unwrap();
        assert_eq!(by_name.user.id, user.id);

        let by_email = store.find_by_username_or_email("ALICE@example.com").await.unwrap().unwrap();
        assert_eq!(by_email.user.id, user.id);

        assert!(store.find_by_username_or_email("bob").await.unwrap().is_none());
        assert!(user.active);
        assert!(user.last_login.is_none());
    }

    #[tokio::test]
    async fn test_duplicates_conflict() {
        let store = MemoryCredentialStore::new();
        store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        let dup_name = store.create_user(new_user("ALICE", "other@example.com")).await;
        assert!(matches!(dup_name, Err(RustyGuardError::Conflict(_))));

        let dup_email = store.create_user(new_user("alice2", "Alice@Example.com")).await;
        assert!(matches!(dup_email, Err(RustyGuardError::Conflict(_))));

        assert_eq!(store.user_count().await, 1);
    }

    #[tokio::test]
    async fn test_mutations() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();

        store.set_active(user.id, false).await.unwrap();
        let roles: BTreeSet<String> = ["editor".to_string()].into_iter().collect();
        store.set_roles(user.id, roles.clone()).await.unwrap();
        let at = Utc::now();
        store.record_login(user.id, at).await.unwrap();

        let reloaded = store.find_by_id(user.id).await.unwrap().unwrap();
        assert!(!reloaded.active);
        assert_eq!(reloaded.roles, roles);
        assert_eq!(reloaded.last_login, Some(at));
    }

    #[tokio::test]
    async fn test_replace_password_hash_requires_expected() {
        let store = MemoryCredentialStore::new();
        let user = store.create_user(new_user("alice", "alice@example.com")).await.unwrap();
        let original = store.password_hash(user.id).await.unwrap().unwrap();
        let changed = PasswordHashRecord::new("$argon2id$changed".to_string());
        store.update_password_hash(user.id, changed.clone()).await.unwrap();

        // A rehash computed from the original hash must not clobber the change
        let stale = PasswordHashRecord::new("$argon2id$rehashed-old".to_string());
        assert!(!store.replace_password_hash(user.id, &original, stale).await.unwrap());
        assert_eq!(store.password_hash(user.id).await.unwrap(), Some(changed.clone()));

        let rehashed = PasswordHashRecord::new("$argon2id$rehashed-new".to_string());
        assert!(store.replace_password_hash(user.id, &changed, rehashed.clone()).await.unwrap());
        assert_eq!(store.password_hash(user.id).await.unwrap(), Some(rehashed));
    }

    #[tokio::test]
    async fn test_update_unknown_user_not_found() {
        let store = MemoryCredentialStore::new();
        let result = store.set_active(Uuid::new_v4(), false).await;
        assert!(matches!(result, Err(RustyGuardError::NotFound(_))));
    }
}
