//! Role-based authorization decisions
//!
//! Pure functions over role definitions. No storage, no clock, no logging.

use std::collections::BTreeSet;

use crate::auth::user::{Permission, Role};

/// Outcome of an authorization check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied { missing: BTreeSet<Permission> },
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allowed)
    }
}

/// Union of the permissions granted by a set of roles
pub fn effective_permissions(roles: &[Role]) -> BTreeSet<Permission> {
    roles
        .iter()
        .flat_map(|role| role.permissions.iter().cloned())
        .collect()
}

/// Allow iff the principal holds at least one resolved role and the union of
/// its roles' permissions covers `required`.
///
/// A principal without any resolved role is denied even for an empty
/// requirement; unknown role names must already have been dropped by
/// [`crate::auth::user::RoleRegistry::resolve`].
pub fn authorize(principal_roles: &[Role], required: &BTreeSet<Permission>) -> Decision {
    if principal_roles.is_empty() {
        return Decision::Denied {
            missing: required.clone(),
        };
    }

    let granted = effective_permissions(principal_roles);
    let missing: BTreeSet<Permission> = required.difference(&granted).cloned().collect();

    if missing.is_empty() {
        Decision::Allowed
    } else {
        Decision::Denied { missing }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::user::permissions;

    fn viewer() -> Role {
        Role::new("viewer", ["read"])
    }

    fn editor() -> Role {
        Role::new("editor", ["read", "write"])
    }

    #[test]
    fn test_viewer_read_allowed_write_denied() {
        let roles = vec![viewer()];
        assert_eq!(authorize(&roles, &permissions(["read"])), Decision::Allowed);
        assert_eq!(
            authorize(&roles, &permissions(["write"])),
            Decision::Denied { missing: permissions(["write"]) }
        );
    }

    #[test]
    fn test_empty_roles_never_granted() {
        assert!(!authorize(&[], &BTreeSet::new()).is_allowed());
        assert!(!authorize(&[], &permissions(["read"])).is_allowed());
    }

    #[test]
    fn test_empty_requirement_with_role_allowed() {
        assert!(authorize(&[viewer()], &BTreeSet::new()).is_allowed());
    }

    #[test]
    fn test_union_across_roles() {
        let roles = vec![viewer(), Role::new("auditor", ["audit"])];
        assert!(authorize(&roles, &permissions(["read", "audit"])).is_allowed());
        assert!(!authorize(&roles, &permissions(["read", "audit", "write"])).is_allowed());
    }

    #[test]
    fn test_missing_reports_only_absent_permissions() {
        let decision = authorize(&[editor()], &permissions(["read", "write", "manage_users"]));
        assert_eq!(decision, Decision::Denied { missing: permissions(["manage_users"]) });
    }

    #[test]
    fn test_role_without_permissions_grants_nothing() {
        let empty = Role::new("nobody", Vec::<String>::new());
        assert!(!authorize(&[empty], &permissions(["read"])).is_allowed());
    }

    #[test]
    fn test_exhaustive_small_lattice() {
        let universe = ["read", "write", "manage_users"];
        let roles = vec![editor()];
        // Every subset of the universe: allowed iff it avoids manage_users
        for mask in 0u8..8 {
            let required: BTreeSet<Permission> = universe
                .iter()
                .enumerate()
                .filter(|(i, _)| mask & (1 << i) != 0)
                .map(|(_, p)| Permission::new(*p))
                .collect();
            let expected = !required.contains(&Permission::new("manage_users"));
            assert_eq!(authorize(&roles, &required).is_allowed(), expected, "mask {}", mask);
        }
    }
}
