use std::error::Error;
use std::fmt;
use std::sync::PoisonError;
use std::time::Duration;

#[derive(Debug)]
pub enum RustyGuardError {
    // Authentication errors
    InvalidCredentials,
    InactiveAccount,
    Throttled { retry_after: Duration },

    // Token errors
    TokenExpired,
    TokenInvalid,

    // Authorization errors
    PermissionDenied(String),

    // Storage errors
    StorageUnavailable(String),
    StorageError(String),
    Conflict(String),
    NotFound(String),
    SessionLock(String),

    // Validation errors
    ValidationError(String),

    // System errors
    SystemError(String),

    // Configuration errors
    ConfigError(String),
}

impl RustyGuardError {
    /// Message safe to hand to a client. Never carries internal detail.
    pub fn public_message(&self) -> String {
        match self {
            Self::InvalidCredentials => "Invalid credentials".to_string(),
            Self::InactiveAccount => "Account inactive".to_string(),
            Self::Throttled { .. } => "Too many attempts, try again later".to_string(),
            Self::TokenExpired => "Token expired".to_string(),
            Self::TokenInvalid => "Invalid token".to_string(),
            Self::PermissionDenied(_) => "Forbidden".to_string(),
            Self::Conflict(msg) | Self::ValidationError(msg) => msg.clone(),
            Self::StorageUnavailable(_) => "Service unavailable".to_string(),
            Self::NotFound(_) => "Not found".to_string(),
            Self::StorageError(_)
            | Self::SessionLock(_)
            | Self::SystemError(_)
            | Self::ConfigError(_) => "Internal server error".to_string(),
        }
    }

    /// HTTP status code for this error kind
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidCredentials | Self::TokenExpired | Self::TokenInvalid => 401,
            Self::InactiveAccount | Self::PermissionDenied(_) => 403,
            Self::Throttled { .. } => 429,
            Self::Conflict(_) => 409,
            Self::ValidationError(_) => 400,
            Self::NotFound(_) => 404,
            Self::StorageUnavailable(_) => 503,
            Self::StorageError(_)
            | Self::SessionLock(_)
            | Self::SystemError(_)
            | Self::ConfigError(_) => 500,
        }
    }

    /// True for failures of a backing store (driver error or timeout)
    pub fn is_storage_failure(&self) -> bool {
        matches!(self, Self::StorageUnavailable(_) | Self::StorageError(_) | Self::SessionLock(_))
    }
}

impl fmt::Display for RustyGuardError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCredentials => write!(f, "Invalid credentials"),
            Self::InactiveAccount => write!(f, "Account is inactive"),
            Self::Throttled { retry_after } => {
                write!(f, "Too many attempts, retry after {}s", retry_after.as_secs())
            }
            Self::TokenExpired => write!(f, "Token expired"),
            Self::TokenInvalid => write!(f, "Token invalid"),
            Self::PermissionDenied(msg) => write!(f, "Permission denied: {}", msg),
            Self::StorageUnavailable(msg) => write!(f, "Storage unavailable: {}", msg),
            Self::StorageError(msg) => write!(f, "Storage error: {}", msg),
            Self::Conflict(msg) => write!(f, "Conflict: {}", msg),
            Self::NotFound(msg) => write!(f, "Not found: {}", msg),
            Self::SessionLock(msg) => write!(f, "Lock error: {}", msg),
            Self::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            Self::SystemError(msg) => write!(f, "System error: {}", msg),
            Self::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

impl Error for RustyGuardError {}

// Converting from PoisonError to facilitate poisoned mutex handling
impl<T> From<PoisonError<T>> for RustyGuardError {
    fn from(err: PoisonError<T>) -> Self {
        RustyGuardError::SessionLock(format!("Mutex poisoned: {}", err))
    }
}

// Generic result type for RustyGuard
pub type Result<T> = std::result::Result<T, RustyGuardError>;
