//! Rusty Guard - authentication, session and authorization service
//!
//! This library verifies user credentials, issues server-side sessions and
//! signed access/refresh tokens, and answers role-based permission checks.
//! Login attempts are rate limited and every security-relevant outcome is
//! written to the audit log.

pub mod auth;
pub mod clock;
pub mod config;
pub mod constants;
pub mod core;
pub mod error;
pub mod handlers;
pub mod security;
pub mod security_logger;
pub mod storage;

// Re-export main components
pub use auth::{AuthService, AuthStores, ClientMetadata, Credential, Permission, Principal, TokenPair};
pub use clock::{system_clock, Clock, ManualClock, SharedClock, SystemClock};
pub use config::*;
pub use constants::*;
pub use error::{Result, RustyGuardError};
pub use security_logger::{AuditEvent, AuditEventType, AuditLogger, AuditSink};
