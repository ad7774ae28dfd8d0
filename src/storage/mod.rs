//! Storage backends for credentials, sessions and refresh-token records

pub mod memory;
pub mod session_store;
pub mod timeouts;
pub mod token_revocation;
pub mod traits;

// Re-export the storage interfaces and in-memory backends
pub use memory::MemoryCredentialStore;
pub use session_store::MemorySessionStore;
pub use token_revocation::MemoryRefreshTokenStore;
pub use traits::{
    CredentialStore, IssuedSession, RefreshTokenRecord, RefreshTokenStore, RevocationReason, RevocationStats,
    RotationOutcome, Session, SessionStore, SessionToken,
};
