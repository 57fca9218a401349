// ==============================================================================
// audit.rs - Run Lifecycle Audit Events
// ==============================================================================
// Description: Structured audit trail for pipeline runs (start, resume,
//              per-sample limits, completion, failure)
// Author: Matt Barham
// Created: 2025-10-31
// Modified: 2025-12-06
// Version: 2.0.0
// ==============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    RunStarted,
    RunResumed,
    SampleLimitReached,
    RunCompleted,
    RunFailed,
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogSeverity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub run_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub event_type: AuditEventType,
    pub details: serde_json::Value,
    pub severity: LogSeverity,
}

impl AuditEvent {
    pub fn new(run_id: Uuid, event_type: AuditEventType, details: serde_json::Value) -> Self {
        let severity = match event_type {
            AuditEventType::RunResumed => LogSeverity::Warning,
            AuditEventType::RunFailed => LogSeverity::Error,
            _ => LogSeverity::Info,
        };

        Self {
            id: Uuid::new_v4(),
            run_id,
            timestamp: Utc::now(),
            event_type,
            details,
            severity,
        }
    }

    /// Emit the event as a single structured log record
    pub fn log(&self) {
        let payload = serde_json::to_string(self).unwrap_or_else(|_| self.details.to_string());

        match self.severity {
            LogSeverity::Info => info!(target: "audit", run_id = %self.run_id, "{}", payload),
            LogSeverity::Warning => warn!(target: "audit", run_id = %self.run_id, "{}", payload),
            LogSeverity::Error => error!(target: "audit", run_id = %self.run_id, "{}", payload),
        }
    }
}

/// Convenience function to log an audit event
pub fn log_event(run_id: Uuid, event_type: AuditEventType, details: serde_json::Value) -> AuditEvent {
    let event = AuditEvent::new(run_id, event_type, details);
    event.log();
    event
}
