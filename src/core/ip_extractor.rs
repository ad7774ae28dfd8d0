//! Client IP resolution for audit records and rate-limit keys
//!
//! Proxy headers are only honoured when the direct peer is an explicitly
//! trusted proxy; otherwise any client could pick its own rate-limit key by
//! sending a forged `X-Forwarded-For`.

use log::{debug, warn};
use std::net::{IpAddr, SocketAddr};
use warp::hyper::HeaderMap;

use crate::auth::principal::ClientMetadata;
use crate::config::AuthConfig;

/// Resolves the originating client address of a request
#[derive(Debug, Clone, Default)]
pub struct ClientIpResolver {
    trusted_proxies: Vec<IpAddr>,
}

impl ClientIpResolver {
    pub fn new(trusted_proxies: Vec<IpAddr>) -> Self {
        Self { trusted_proxies }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(config.trusted_proxies.clone())
    }

    fn is_trusted(&self, ip: &IpAddr) -> bool {
        self.trusted_proxies.contains(ip)
    }

    /// Extract the real client IP address from headers and connection info
    pub fn resolve(&self, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> Option<IpAddr> {
        let peer = remote_addr.map(|addr| addr.ip())?;
        if !self.is_trusted(&peer) {
            return Some(peer);
        }

        // X-Forwarded-For is "client, proxy1, proxy2"; walk from the right and
        // take the first hop that is not one of our own proxies
        if let Some(value) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            for hop in value.split(',').rev().map(str::trim) {
                match hop.parse::<IpAddr>() {
                    Ok(ip) if self.is_trusted(&ip) => continue,
                    Ok(ip) => {
                        debug!("Extracted IP from X-Forwarded-For: {}", ip);
                        return Some(ip);
                    }
                    Err(_) => {
                        warn!("Invalid IP format in X-Forwarded-For header: {}", hop);
                        break;
                    }
                }
            }
        }

        // X-Real-IP (nginx)
        if let Some(value) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
            match value.trim().parse::<IpAddr>() {
                Ok(ip) => {
                    debug!("Extracted IP from X-Real-IP: {}", ip);
                    return Some(ip);
                }
                Err(_) => warn!("Invalid IP format in X-Real-IP header: {}", value),
            }
        }

        debug!("No usable proxy header from trusted proxy {}, using proxy IP", peer);
        Some(peer)
    }

    /// Build the client metadata attached to sessions and audit events
    pub fn client_metadata(&self, headers: &HeaderMap, remote_addr: Option<SocketAddr>) -> ClientMetadata {
        let user_agent = headers
            .get("user-agent")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        ClientMetadata::new(self.resolve(headers, remote_addr), user_agent)
    }
}
