//! Request handlers for the HTTP endpoints

pub mod auth;

// Re-export the route tree
pub use auth::{handle_rejection, routes};
