//! Domain-specific audit events for the REST server, wrapping the shared
//! `arca_log::AuditLogger` sink the same way `mvirt-api`'s `ApiAuditLogger`
//! wraps `mvirt_log::AuditLogger`.

use std::sync::Arc;

use arca_log::{AuditLogger, LogLevel};

pub struct ApiAuditLogger {
    inner: Arc<AuditLogger>,
}

impl ApiAuditLogger {
    pub fn new(log_endpoint: &str) -> Self {
        Self {
            inner: Arc::new(AuditLogger::new(log_endpoint, "arca-api")),
        }
    }

    pub fn new_noop() -> Self {
        Self {
            inner: Arc::new(AuditLogger::new_noop()),
        }
    }

    fn log_async(&self, level: LogLevel, message: String, object_ids: Vec<String>) {
        let inner = Arc::clone(&self.inner);
        tokio::spawn(async move {
            inner.log(level, message, object_ids).await;
        });
    }

    pub fn svm_created(&self, svm: &str, vlan_id: u16, vip: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("SVM created: {svm} (vlan {vlan_id}, vip {vip})"),
            vec![svm.to_string()],
        );
    }

    pub fn svm_degraded(&self, svm: &str, reason: &str) {
        self.log_async(
            LogLevel::Warn,
            format!("SVM {svm} entered degraded state: {reason}"),
            vec![svm.to_string()],
        );
    }

    pub fn svm_deleted(&self, svm: &str) {
        self.log_async(LogLevel::Audit, format!("SVM deleted: {svm}"), vec![svm.to_string()]);
    }

    pub fn volume_created(&self, svm: &str, volume: &str, size_bytes: u64) {
        self.log_async(
            LogLevel::Audit,
            format!("Volume created: {svm}/{volume} ({size_bytes} bytes)"),
            vec![svm.to_string(), volume.to_string()],
        );
    }

    pub fn volume_resized(&self, svm: &str, volume: &str, new_size_bytes: u64) {
        self.log_async(
            LogLevel::Audit,
            format!("Volume resized: {svm}/{volume} to {new_size_bytes} bytes"),
            vec![svm.to_string(), volume.to_string()],
        );
    }

    pub fn volume_deleted(&self, svm: &str, volume: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Volume deleted: {svm}/{volume}"),
            vec![svm.to_string(), volume.to_string()],
        );
    }

    pub fn export_added(&self, svm: &str, export_id: u32, volume: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Export added: {svm}#{export_id} -> {volume}"),
            vec![svm.to_string(), export_id.to_string()],
        );
    }

    pub fn export_removed(&self, svm: &str, export_id: u32) {
        self.log_async(
            LogLevel::Audit,
            format!("Export removed: {svm}#{export_id}"),
            vec![svm.to_string(), export_id.to_string()],
        );
    }

    pub fn directory_created(&self, svm: &str, path: &str, quota_bytes: u64) {
        self.log_async(
            LogLevel::Audit,
            format!("Directory created: {svm}:{path} (quota {quota_bytes} bytes)"),
            vec![svm.to_string(), path.to_string()],
        );
    }

    pub fn directory_deleted(&self, svm: &str, path: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Directory deleted: {svm}:{path}"),
            vec![svm.to_string(), path.to_string()],
        );
    }

    pub fn snapshot_created(&self, svm: &str, snapshot_path: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Snapshot created: {svm}:{snapshot_path}"),
            vec![svm.to_string(), snapshot_path.to_string()],
        );
    }

    pub fn snapshot_deleted(&self, svm: &str, snapshot_path: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Snapshot deleted: {svm}:{snapshot_path}"),
            vec![svm.to_string(), snapshot_path.to_string()],
        );
    }

    pub fn snapshot_restored(&self, svm: &str, snapshot_path: &str, target_path: &str) {
        self.log_async(
            LogLevel::Audit,
            format!("Snapshot restored: {svm}:{snapshot_path} -> {target_path}"),
            vec![svm.to_string(), snapshot_path.to_string()],
        );
    }

    pub fn quota_set(&self, svm: &str, path: &str, quota_bytes: u64) {
        self.log_async(
            LogLevel::Audit,
            format!("Quota set: {svm}:{path} = {quota_bytes} bytes"),
            vec![svm.to_string(), path.to_string()],
        );
    }

    pub fn quota_expanded(&self, svm: &str, path: &str, new_quota_bytes: u64) {
        self.log_async(
            LogLevel::Audit,
            format!("Quota expanded: {svm}:{path} to {new_quota_bytes} bytes"),
            vec![svm.to_string(), path.to_string()],
        );
    }
}
