//! Request plumbing shared by the auth service and the HTTP layer

pub mod ip_extractor;
pub mod rate_limiter;
pub mod thread_pool;

// Re-export main components for convenience
pub use ip_extractor::ClientIpResolver;
pub use rate_limiter::{rate_key, LoginRateLimiter, RateDecision};
pub use thread_pool::HashingPool;
