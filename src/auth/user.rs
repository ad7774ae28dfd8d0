use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::RwLock;
use uuid::Uuid;

use crate::error::{Result, RustyGuardError};

pub type UserId = Uuid;

/// A permission string such as `read` or `manage_users`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Permission(String);

impl Permission {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Permission {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Permission {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

/// Builds a permission set from string literals
pub fn permissions<I, S>(names: I) -> BTreeSet<Permission>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    names.into_iter().map(Permission::new).collect()
}

/// A named bundle of permissions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Role {
    pub name: String,
    pub permissions: BTreeSet<Permission>,
}

impl Role {
    pub fn new<I, S>(name: impl Into<String>, perms: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            permissions: permissions(perms),
        }
    }

    /// Check if this role grants a specific permission
    pub fn has_permission(&self, permission: &Permission) -> bool {
        self.permissions.contains(permission)
    }
}

/// Registry of known roles. Read-mostly; administrative changes take effect
/// for every authorization decision made after they return.
pub struct RoleRegistry {
    roles: RwLock<HashMap<String, Role>>,
}

impl RoleRegistry {
    pub fn empty() -> Self {
        Self {
            roles: RwLock::new(HashMap::new()),
        }
    }

    /// Registry with the built-in `viewer`, `editor` and `admin` roles
    pub fn with_builtin_roles() -> Self {
        let registry = Self::empty();
        for role in [
            Role::new("viewer", ["read"]),
            Role::new("editor", ["read", "write"]),
            Role::new("admin", ["read", "write", "manage_users"]),
        ] {
            // A fresh registry lock cannot be poisoned
            let _ = registry.define_role(role);
        }
        registry
    }

    /// Create or replace a role definition
    pub fn define_role(&self, role: Role) -> Result<()> {
        if role.name.trim().is_empty() {
            return Err(RustyGuardError::ValidationError("Role name must not be empty".to_string()));
        }
        let mut roles = self.roles.write()?;
        log::info!("Role '{}' defined with {} permissions", role.name, role.permissions.len());
        roles.insert(role.name.clone(), role);
        Ok(())
    }

    pub fn remove_role(&self, name: &str) -> Result<bool> {
        let mut roles = self.roles.write()?;
        Ok(roles.remove(name).is_some())
    }

    pub fn get(&self, name: &str) -> Result<Option<Role>> {
        let roles = self.roles.read()?;
        Ok(roles.get(name).cloned())
    }

    pub fn contains(&self, name: &str) -> Result<bool> {
        let roles = self.roles.read()?;
        Ok(roles.contains_key(name))
    }

    /// Resolve role names to definitions. Unknown names are dropped, so they
    /// can never contribute a permission.
    pub fn resolve<'a, I>(&self, names: I) -> Result<Vec<Role>>
    where
        I: IntoIterator<Item = &'a String>,
    {
        let roles = self.roles.read()?;
        Ok(names
            .into_iter()
            .filter_map(|name| {
                let role = roles.get(name).cloned();
                if role.is_none() {
                    log::debug!("Ignoring unknown role '{}'", name);
                }
                role
            })
            .collect())
    }
}

impl Default for RoleRegistry {
    fn default() -> Self {
        Self::with_builtin_roles()
    }
}

/// Stored password hash (PHC string). Only the password hasher reads it.
#[derive(Clone, PartialEq, Eq)]
pub struct PasswordHashRecord(String);

impl PasswordHashRecord {
    pub fn new(phc: String) -> Self {
        Self(phc)
    }

    pub(crate) fn as_phc(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordHashRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordHashRecord(<redacted>)")
    }
}

/// Represents a registered account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    /// Unique user identifier
    pub id: UserId,
    pub username: String,
    pub email: String,
    /// Soft-deactivation flag; users are never deleted
    pub active: bool,
    pub roles: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains(role)
    }
}

/// Input for account creation
#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password_hash: PasswordHashRecord,
    pub roles: BTreeSet<String>,
    pub created_at: DateTime<Utc>,
}

/// A user together with its stored hash, as returned to the login path
#[derive(Debug, Clone)]
pub struct CredentialRecord {
    pub user: User,
    pub password_hash: PasswordHashRecord,
}

/// Username rules: 3..=32 characters of letters, digits, `_`, `-` or `.`
pub fn validate_username(username: &str) -> Result<()> {
    let len = username.chars().count();
    if !(3..=32).contains(&len) {
        return Err(RustyGuardError::ValidationError(
            "Username must be between 3 and 32 characters".to_string(),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.')
    {
        return Err(RustyGuardError::ValidationError(
            "Username may only contain letters, digits, '_', '-' and '.'".to_string(),
        ));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty() && !domain.is_empty() && !email.chars().any(|c| c.is_whitespace())
        }
        _ => false,
    };
    if !valid || email.len() > 254 {
        return Err(RustyGuardError::ValidationError("Invalid email address".to_string()));
    }
    Ok(())
}

pub fn validate_password(password: &str, username: &str) -> Result<()> {
    let len = password.chars().count();
    if !(8..=128).contains(&len) {
        return Err(RustyGuardError::ValidationError(
            "Password must be between 8 and 128 characters".to_string(),
        ));
    }
    if password.eq_ignore_ascii_case(username) {
        return Err(RustyGuardError::ValidationError(
            "Password must not match the username".to_string(),
        ));
    }
    Ok(())
}
