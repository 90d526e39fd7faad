//! Audit logging client, shared by all ARCA components.
//!
//! Non-blocking and fault-tolerant: if arca-log is unavailable, events are
//! logged locally via tracing and discarded.

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

use crate::{LogEntry, LogLevel, LogRequest, LogServiceClient};

pub struct AuditLogger {
    client: RwLock<Option<LogServiceClient<tonic::transport::Channel>>>,
    log_endpoint: String,
    component: String,
}

impl AuditLogger {
    pub fn new(log_endpoint: &str, component: &str) -> Self {
        Self {
            client: RwLock::new(None),
            log_endpoint: log_endpoint.to_string(),
            component: component.to_string(),
        }
    }

    /// Endpoint-less logger: `ensure_connected` always fails silently.
    pub fn new_noop() -> Self {
        Self {
            client: RwLock::new(None),
            log_endpoint: String::new(),
            component: String::new(),
        }
    }

    async fn ensure_connected(&self) -> Option<LogServiceClient<tonic::transport::Channel>> {
        {
            let client = self.client.read().await;
            if client.is_some() {
                return client.clone();
            }
        }

        let mut client = self.client.write().await;
        if client.is_none() {
            match LogServiceClient::connect(self.log_endpoint.clone()).await {
                Ok(c) => {
                    debug!(endpoint = %self.log_endpoint, "connected to arca-log");
                    *client = Some(c);
                }
                Err(e) => {
                    debug!(error = %e, "failed to connect to arca-log, audit logs disabled");
                    return None;
                }
            }
        }
        client.clone()
    }

    pub async fn log(&self, level: LogLevel, message: impl Into<String>, object_ids: Vec<String>) {
        let message = message.into();

        match level {
            LogLevel::Emergency | LogLevel::Alert | LogLevel::Critical | LogLevel::Error => {
                tracing::error!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Warn => {
                tracing::warn!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Notice | LogLevel::Audit | LogLevel::Info => {
                tracing::info!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::Debug => {
                tracing::debug!(target: "audit", component = %self.component, objects = ?object_ids, "{}", message)
            }
            LogLevel::LogLevelUnspecified => {}
        }

        if let Some(mut client) = self.ensure_connected().await {
            let request = LogRequest {
                entry: Some(LogEntry {
                    id: String::new(),
                    timestamp_ns: 0,
                    message,
                    level: level as i32,
                    component: self.component.clone(),
                    related_object_ids: object_ids,
                }),
            };

            if let Err(e) = client.log(request).await {
                warn!(error = %e, "failed to send audit log to arca-log");
                *self.client.write().await = None;
            }
        }
    }
}

pub fn create_audit_logger(log_endpoint: &str, component: &str) -> Arc<AuditLogger> {
    Arc::new(AuditLogger::new(log_endpoint, component))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn noop_logger_does_not_panic() {
        let logger = AuditLogger::new_noop();
        logger.log(LogLevel::Audit, "svm created", vec!["svm-1".into()]).await;
    }

    #[tokio::test]
    async fn invalid_endpoint_does_not_panic() {
        let logger = create_audit_logger("http://invalid-endpoint:99999", "api");
        logger.log(LogLevel::Info, "hello", vec![]).await;
    }
}
