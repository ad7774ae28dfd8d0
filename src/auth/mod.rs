//! Authentication and authorization module

pub mod password;
pub mod pipeline;
pub mod principal;
pub mod rbac;
pub mod service;
pub mod token;
pub mod user;

// Re-export main components
pub use password::PasswordHasher;
pub use pipeline::{FnStage, PermissionStage, RequestContext, RequestPipeline, RequestStage, RequireSessionStage};
pub use principal::{AuthResult, ClientMetadata, Credential, Identity, Principal, PrincipalSource, TokenPair};
pub use rbac::{authorize, effective_permissions, Decision};
pub use service::{AuthService, AuthStats, AuthStores};
pub use token::{extract_bearer_token, Claims, TokenService, TokenType};
pub use user::{permissions, Permission, Role, RoleRegistry, User, UserId};
