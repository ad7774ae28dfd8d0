//! Security utilities for the HTTP surface and login timing

pub mod headers;
pub mod timing;

pub use headers::{add_security_headers, with_security_headers};
pub use timing::{constant_time_eq, constant_time_eq_bytes, AuthTimer};
