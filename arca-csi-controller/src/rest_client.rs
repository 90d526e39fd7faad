//! HTTP client for the REST surface (§6), mapping the `{data, error, message}`
//! envelope onto `ArcaError` kinds per §7. Transient/unavailable errors are
//! retried with exponential backoff (base 1s, doubling), bounded attempts.

use std::time::Duration;

use serde::{de::DeserializeOwned, Deserialize, Serialize};

use arca_common::error::{ArcaError, Result};

use crate::config::ArcaClientConfig;

const MAX_RETRIES: u32 = 4;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct ErrEnvelope {
    error: String,
    message: String,
}

pub struct ArcaClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: Option<String>,
}

impl ArcaClient {
    pub fn new(cfg: &ArcaClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| ArcaError::Other(e.into()))?;
        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            auth_token: cfg.auth_token.clone(),
        })
    }

    async fn send<B: Serialize, T: DeserializeOwned>(
        &self,
        method: reqwest::Method,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<T> {
        let mut delay = Duration::from_secs(1);
        let mut attempt = 0;
        loop {
            let url = format!("{}{}", self.base_url, path);
            let mut req = self.http.request(method.clone(), &url).query(query);
            if let Some(token) = &self.auth_token {
                req = req.bearer_auth(token);
            }
            if let Some(b) = body {
                req = req.json(b);
            }

            let resp = match req.send().await {
                Ok(r) => r,
                Err(e) => {
                    if attempt >= MAX_RETRIES {
                        return Err(ArcaError::Transient(e.to_string()));
                    }
                    attempt += 1;
                    tokio::time::sleep(delay).await;
                    delay *= 2;
                    continue;
                }
            };

            let status = resp.status();
            let text = resp.text().await.map_err(|e| ArcaError::Other(e.into()))?;

            if status.is_success() {
                let envelope: Envelope<T> = serde_json::from_str(&text).map_err(|e| ArcaError::Other(e.into()))?;
                return envelope
                    .data
                    .ok_or_else(|| ArcaError::Other(anyhow::anyhow!("response had no data field")));
            }

            let err_env: ErrEnvelope = serde_json::from_str(&text).unwrap_or(ErrEnvelope {
                error: "Unavailable".into(),
                message: text.clone(),
            });
            let arca_err = classify(&err_env.error, &err_env.message, status.as_u16());

            if arca_err.is_retryable() && attempt < MAX_RETRIES {
                attempt += 1;
                tokio::time::sleep(delay).await;
                delay *= 2;
                continue;
            }
            return Err(arca_err);
        }
    }

    pub async fn list_svms(&self) -> Result<Vec<SvmDto>> {
        self.send::<(), _>(reqwest::Method::GET, "/v1/svms", &[], None).await
    }

    pub async fn get_svm(&self, name: &str) -> Result<SvmDto> {
        self.send::<(), _>(reqwest::Method::GET, &format!("/v1/svms/{name}"), &[], None)
            .await
    }

    pub async fn create_svm(&self, req: &CreateSvmRequest) -> Result<SvmDto> {
        self.send(reqwest::Method::POST, "/v1/svms", &[], Some(req)).await
    }

    pub async fn create_directory(&self, req: &CreateDirectoryRequest) -> Result<DirectoryDto> {
        self.send(reqwest::Method::POST, "/v1/directories", &[], Some(req)).await
    }

    pub async fn delete_directory(&self, svm_name: &str, path: &str) -> Result<()> {
        self.send::<(), serde_json::Value>(
            reqwest::Method::DELETE,
            &format!("/v1/directories/{path}"),
            &[("svm_name", svm_name)],
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn create_snapshot(&self, req: &CreateSnapshotRequest) -> Result<SnapshotDto> {
        self.send(reqwest::Method::POST, "/v1/snapshots", &[], Some(req)).await
    }

    pub async fn restore_snapshot(&self, req: &RestoreSnapshotRequest) -> Result<()> {
        self.send::<_, serde_json::Value>(reqwest::Method::POST, "/v1/snapshots/restore", &[], Some(req))
            .await
            .map(|_| ())
    }

    pub async fn delete_snapshot(&self, svm_name: &str, path: &str) -> Result<()> {
        self.send::<(), serde_json::Value>(
            reqwest::Method::DELETE,
            &format!("/v1/snapshots/{path}"),
            &[("svm_name", svm_name)],
            None,
        )
        .await
        .map(|_| ())
    }

    pub async fn set_quota(&self, req: &SetQuotaRequest) -> Result<()> {
        self.send::<_, serde_json::Value>(reqwest::Method::POST, "/v1/quotas", &[], Some(req))
            .await
            .map(|_| ())
    }

    pub async fn expand_quota(&self, req: &SetQuotaRequest) -> Result<()> {
        self.send::<_, serde_json::Value>(reqwest::Method::PATCH, "/v1/quotas", &[], Some(req))
            .await
            .map(|_| ())
    }
}

fn classify(kind: &str, message: &str, status: u16) -> ArcaError {
    match kind {
        "NotFound" => ArcaError::NotFound(message.to_string()),
        "AlreadyExists" => ArcaError::AlreadyExists(message.to_string()),
        "NetworkConflict" => ArcaError::NetworkConflict(message.to_string()),
        "Validation" => ArcaError::Validation(message.to_string()),
        "CapacityExhausted" => ArcaError::CapacityExhausted(message.to_string()),
        "StateMachine" => ArcaError::StateMachine(message.to_string()),
        "Corruption" => ArcaError::Corruption(message.to_string()),
        _ if status == 408 || status == 429 || status >= 500 => ArcaError::Transient(message.to_string()),
        _ => ArcaError::Unavailable(message.to_string()),
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SvmDto {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub vip: String,
    pub gateway: String,
    pub mtu: u32,
    pub state: String,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CreateSvmRequest {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub gateway: Option<String>,
    pub mtu: Option<u32>,
}

#[derive(Debug, Serialize)]
pub struct CreateDirectoryRequest {
    pub svm_name: String,
    pub path: String,
    pub quota_bytes: u64,
}

#[derive(Debug, Deserialize)]
pub struct DirectoryDto {
    pub svm: String,
    pub path: String,
    pub quota_bytes: u64,
    pub project_id: u32,
}

#[derive(Debug, Serialize)]
pub struct CreateSnapshotRequest {
    pub svm_name: String,
    pub source_path: String,
    pub snapshot_path: String,
}

#[derive(Debug, Serialize)]
pub struct RestoreSnapshotRequest {
    pub svm_name: String,
    pub snapshot_path: String,
    pub target_path: String,
}

#[derive(Debug, Deserialize)]
pub struct SnapshotDto {
    pub svm: String,
    pub source_path: String,
    pub snapshot_path: String,
    pub size_bytes: u64,
    pub ready_to_use: bool,
}

#[derive(Debug, Serialize)]
pub struct SetQuotaRequest {
    pub svm_name: String,
    pub path: String,
    pub quota_bytes: u64,
}
