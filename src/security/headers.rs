//! Security headers for authentication responses
//!
//! Responses from the auth endpoints carry credentials, so they must never be
//! cached by browsers or intermediaries.

use warp::http::HeaderValue;
use warp::reply::Response;

/// Strict Content Security Policy for API endpoints
const STRICT_CSP: &str = "default-src 'none'; frame-ancestors 'none';";

/// Add no-store and hardening headers to a response
pub fn add_security_headers(mut response: Response) -> Response {
    let headers = response.headers_mut();

    // Never cache tokens or identity data
    headers.insert("Cache-Control", HeaderValue::from_static("no-store"));
    headers.insert("Pragma", HeaderValue::from_static("no-cache"));

    // Prevent MIME type sniffing
    headers.insert("X-Content-Type-Options", HeaderValue::from_static("nosniff"));

    // Prevent clickjacking
    headers.insert("X-Frame-Options", HeaderValue::from_static("DENY"));

    headers.insert("Referrer-Policy", HeaderValue::from_static("no-referrer"));
    headers.insert("Content-Security-Policy", HeaderValue::from_static(STRICT_CSP));

    // Remove server information disclosure
    headers.remove("Server");

    response
}

/// Wrap a reply with the auth security headers
pub fn with_security_headers<T: warp::Reply>(reply: T) -> Response {
    add_security_headers(reply.into_response())
}
