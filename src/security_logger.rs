//! Audit logging for authentication and authorization events
//!
//! Audit is observability, not a consistency gate: `AuditLogger::record`
//! never returns an error and never waits on a sink longer than its write
//! timeout. Sink failures are reported through operational logging.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;

use crate::auth::principal::ClientMetadata;
use crate::auth::user::UserId;
use crate::error::{Result, RustyGuardError};

/// Log target used by `LogAuditSink`
pub const AUDIT_LOG_TARGET: &str = "audit";

/// Types of audited events
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AuditEventType {
    LoginSuccess,
    LoginFailure,
    Logout,
    TokenRefresh,
    PermissionDenied,
}

impl AuditEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::LoginSuccess => "login-success",
            Self::LoginFailure => "login-failure",
            Self::Logout => "logout",
            Self::TokenRefresh => "token-refresh",
            Self::PermissionDenied => "permission-denied",
        }
    }
}

/// An append-only audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEvent {
    pub event_type: AuditEventType,
    /// `None` for failures before the identity was resolved
    pub user_id: Option<UserId>,
    pub timestamp: DateTime<Utc>,
    pub metadata: ClientMetadata,
    #[serde(default)]
    pub detail: serde_json::Value,
}

impl AuditEvent {
    pub fn new(
        event_type: AuditEventType,
        user_id: Option<UserId>,
        timestamp: DateTime<Utc>,
        metadata: ClientMetadata,
    ) -> Self {
        Self {
            event_type,
            user_id,
            timestamp,
            metadata,
            detail: serde_json::Value::Null,
        }
    }

    pub fn with_detail(mut self, detail: serde_json::Value) -> Self {
        self.detail = detail;
        self
    }
}

/// Destination for audit records
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, event: &AuditEvent) -> Result<()>;
}

/// Writes each event as one JSON line to the `audit` log target
#[derive(Debug, Default, Clone, Copy)]
pub struct LogAuditSink;

#[async_trait]
impl AuditSink for LogAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        let line = serde_json::to_string(event)
            .map_err(|e| RustyGuardError::SystemError(format!("Failed to encode audit event: {}", e)))?;
        log::info!(target: AUDIT_LOG_TARGET, "{}", line);
        Ok(())
    }
}

/// Keeps events in memory, for tests and operator inspection
#[derive(Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<AuditEvent> {
        self.events.read().await.clone()
    }

    pub async fn events_of(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.events
            .read()
            .await
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    pub async fn len(&self) -> usize {
        self.events.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.events.read().await.is_empty()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, event: &AuditEvent) -> Result<()> {
        self.events.write().await.push(event.clone());
        Ok(())
    }
}

/// Fans events out to sinks and raises alerts on bursts of failures
pub struct AuditLogger {
    sinks: Vec<Arc<dyn AuditSink>>,
    write_timeout: Duration,
    alert_thresholds: HashMap<AuditEventType, usize>,
    /// Events since the last alert, per type
    alert_counts: Mutex<HashMap<AuditEventType, usize>>,
    totals: Mutex<HashMap<AuditEventType, u64>>,
}

impl AuditLogger {
    /// Create a new audit logger
    pub fn new(sinks: Vec<Arc<dyn AuditSink>>) -> Self {
        let mut alert_thresholds = HashMap::new();
        alert_thresholds.insert(AuditEventType::LoginFailure, 5);
        alert_thresholds.insert(AuditEventType::PermissionDenied, 20);

        Self {
            sinks,
            write_timeout: Duration::from_secs(1),
            alert_thresholds,
            alert_counts: Mutex::new(HashMap::new()),
            totals: Mutex::new(HashMap::new()),
        }
    }

    /// Logger writing to the `audit` log target only
    pub fn to_log() -> Self {
        Self::new(vec![Arc::new(LogAuditSink) as Arc<dyn AuditSink>])
    }

    pub fn with_alert_threshold(mut self, event_type: AuditEventType, threshold: usize) -> Self {
        self.alert_thresholds.insert(event_type, threshold);
        self
    }

    pub fn with_write_timeout(mut self, timeout: Duration) -> Self {
        self.write_timeout = timeout;
        self
    }

    /// Record an event. Never fails the caller.
    pub async fn record(&self, event: AuditEvent) {
        self.count(&event);

        for sink in &self.sinks {
            match tokio::time::timeout(self.write_timeout, sink.append(&event)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => log::error!(
                    "Failed to write {} audit event: {}",
                    event.event_type.as_str(),
                    e
                ),
                Err(_) => log::error!(
                    "Audit sink timed out after {:?} writing {} event",
                    self.write_timeout,
                    event.event_type.as_str()
                ),
            }
        }
    }

    fn count(&self, event: &AuditEvent) {
        match self.totals.lock() {
            Ok(mut totals) => *totals.entry(event.event_type).or_insert(0) += 1,
            Err(e) => log::error!("Audit counters poisoned: {}", e),
        }

        let Some(&threshold) = self.alert_thresholds.get(&event.event_type) else {
            return;
        };
        let mut counts = match self.alert_counts.lock() {
            Ok(counts) => counts,
            Err(e) => {
                log::error!("Audit alert counters poisoned: {}", e);
                return;
            }
        };
        let count = counts.entry(event.event_type).or_insert(0);
        *count += 1;
        if *count >= threshold {
            log::error!(
                "SECURITY ALERT: {} events of type '{}' detected (latest user: {:?}, ip: {:?})",
                count,
                event.event_type.as_str(),
                event.user_id,
                event.metadata.ip
            );
            // Reset counter after alert
            *count = 0;
        }
    }

    /// Events recorded since startup, per type
    pub fn stats(&self) -> HashMap<AuditEventType, u64> {
        match self.totals.lock() {
            Ok(totals) => totals.clone(),
            Err(e) => e.into_inner().clone(),
        }
    }
}
