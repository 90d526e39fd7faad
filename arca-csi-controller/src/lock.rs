//! Distributed lock (§4.7 "Distributed lock"): one Kubernetes Lease per
//! resource, renewed at a third of its TTL from a background task started at
//! acquisition and stopped on release, existing leases taken over once
//! expired (`renew_time + duration < now`).

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::coordination::v1::{Lease, LeaseSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::MicroTime;
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::Client;
use tokio::task::JoinHandle;

use arca_common::error::{ArcaError, Result};
use arca_common::lock::{LockGuard, LockManager};

pub struct K8sLeaseLockManager {
    client: Client,
    namespace: String,
    identity: String,
}

impl K8sLeaseLockManager {
    pub fn new(client: Client, namespace: impl Into<String>, identity: impl Into<String>) -> Self {
        Self {
            client,
            namespace: namespace.into(),
            identity: identity.into(),
        }
    }

    fn api(&self) -> Api<Lease> {
        Api::namespaced(self.client.clone(), &self.namespace)
    }

    fn lease_name(key: &str) -> String {
        format!("arca-lock-{}", key.replace([':', '/'], "-"))
    }

    async fn try_acquire_once(&self, key: &str, ttl: Duration) -> Result<bool> {
        let api = self.api();
        let name = Self::lease_name(key);
        let now = now_micro_time();
        let desired = Lease {
            metadata: kube::api::ObjectMeta {
                name: Some(name.clone()),
                ..Default::default()
            },
            spec: Some(LeaseSpec {
                holder_identity: Some(self.identity.clone()),
                lease_duration_seconds: Some(ttl.as_secs() as i32),
                acquire_time: Some(now.clone()),
                renew_time: Some(now),
                lease_transitions: Some(0),
            }),
        };

        match api.get_opt(&name).await.map_err(|e| ArcaError::Other(e.into()))? {
            None => match api.create(&PostParams::default(), &desired).await {
                Ok(_) => Ok(true),
                Err(kube::Error::Api(ae)) if ae.code == 409 => Ok(false),
                Err(e) => Err(ArcaError::Other(e.into())),
            },
            Some(existing) => {
                if lease_expired(&existing, ttl) {
                    let patch = serde_json::json!({
                        "spec": {
                            "holderIdentity": self.identity,
                            "leaseDurationSeconds": ttl.as_secs() as i32,
                            "acquireTime": now_rfc3339(),
                            "renewTime": now_rfc3339(),
                            "leaseTransitions": existing
                                .spec
                                .as_ref()
                                .and_then(|s| s.lease_transitions)
                                .unwrap_or(0)
                                + 1,
                        }
                    });
                    api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
                        .await
                        .map_err(|e| ArcaError::Other(e.into()))?;
                    Ok(true)
                } else {
                    let held_by_us = existing
                        .spec
                        .as_ref()
                        .and_then(|s| s.holder_identity.as_deref())
                        == Some(self.identity.as_str());
                    Ok(held_by_us)
                }
            }
        }
    }

    async fn renew(&self, key: &str) -> Result<()> {
        let api = self.api();
        let name = Self::lease_name(key);
        let patch = serde_json::json!({ "spec": { "renewTime": now_rfc3339() } });
        api.patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(())
    }

    async fn release_lease(&self, key: &str) -> Result<()> {
        let api = self.api();
        let name = Self::lease_name(key);
        match api.delete(&name, &kube::api::DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(ae)) if ae.code == 404 => Ok(()),
            Err(e) => Err(ArcaError::Other(e.into())),
        }
    }
}

fn lease_expired(lease: &Lease, ttl: Duration) -> bool {
    let Some(spec) = lease.spec.as_ref() else { return true };
    let Some(renew) = spec.renew_time.as_ref() else { return true };
    let duration = spec
        .lease_duration_seconds
        .map(|d| Duration::from_secs(d.max(0) as u64))
        .unwrap_or(ttl);
    let elapsed = chrono::Utc::now().signed_duration_since(renew.0);
    elapsed > chrono::Duration::from_std(duration).unwrap_or(chrono::Duration::zero())
}

fn now_micro_time() -> MicroTime {
    MicroTime(chrono::Utc::now())
}

fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

#[async_trait]
impl LockManager for K8sLeaseLockManager {
    async fn acquire(&self, key: &str, ttl: Duration, wait: Duration) -> Result<Box<dyn LockGuard>> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.try_acquire_once(key, ttl).await? {
                break;
            }
            if tokio::time::Instant::now() >= deadline {
                return Err(ArcaError::Transient(format!("timed out acquiring lock {key}")));
            }
            tokio::time::sleep(Duration::from_millis(200)).await;
        }

        let renew_interval = ttl / 3;
        let client = self.client.clone();
        let namespace = self.namespace.clone();
        let identity = self.identity.clone();
        let key_owned = key.to_string();
        let handle: JoinHandle<()> = tokio::spawn(async move {
            let manager = K8sLeaseLockManager::new(client, namespace, identity);
            loop {
                tokio::time::sleep(renew_interval).await;
                if manager.renew(&key_owned).await.is_err() {
                    break;
                }
            }
        });

        Ok(Box::new(K8sLeaseGuard {
            manager: K8sLeaseLockManager::new(self.client.clone(), self.namespace.clone(), self.identity.clone()),
            key: key.to_string(),
            renew_task: Some(handle),
        }))
    }
}

struct K8sLeaseGuard {
    manager: K8sLeaseLockManager,
    key: String,
    renew_task: Option<JoinHandle<()>>,
}

#[async_trait]
impl LockGuard for K8sLeaseGuard {
    async fn release(mut self: Box<Self>) -> Result<()> {
        if let Some(task) = self.renew_task.take() {
            task.abort();
        }
        self.manager.release_lease(&self.key).await
    }
}
