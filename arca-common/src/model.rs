//! Domain entities shared across the ARCA REST server, CSI controller, and
//! CSI node. See the data model for field meaning and invariants.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SvmState {
    Creating,
    Ready,
    Degraded,
    Deleting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Svm {
    pub name: String,
    pub vlan_id: u16,
    pub ip_cidr: String,
    pub vip: Ipv4Addr,
    pub gateway: Ipv4Addr,
    pub mtu: u32,
    pub state: SvmState,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    pub name: String,
    pub svm: String,
    pub size_bytes: u64,
    pub path: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Access {
    Rw,
    Ro,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Squash {
    RootSquash,
    NoRootSquash,
}

impl Default for Squash {
    fn default() -> Self {
        Squash::RootSquash
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecFlavor {
    Sys,
    Krb5,
    Krb5i,
    Krb5p,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Export {
    pub export_id: u32,
    pub svm: String,
    pub volume: String,
    pub client_cidr: String,
    pub access: Access,
    #[serde(default)]
    pub squash: Squash,
    #[serde(default = "default_sec")]
    pub sec: Vec<SecFlavor>,
    pub path: String,
    pub pseudo: String,
}

fn default_sec() -> Vec<SecFlavor> {
    vec![SecFlavor::Sys]
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Directory {
    pub svm: String,
    pub path: String,
    pub quota_bytes: u64,
    pub project_id: u32,
    pub used_bytes: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub svm: String,
    pub source_path: String,
    pub snapshot_path: String,
    pub size_bytes: u64,
    pub ready_to_use: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentSource {
    Volume { source_volume_id: String },
    Snapshot { source_snapshot_id: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcaVolume {
    pub volume_id: String,
    pub name: String,
    pub svm_name: String,
    pub vip: Ipv4Addr,
    pub path: String,
    pub capacity_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub content_source: Option<ContentSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArcaSnapshot {
    pub snapshot_id: String,
    pub name: String,
    pub source_volume_id: String,
    pub svm_name: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub ready_to_use: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeVolumeEntry {
    pub volume_id: String,
    pub svm: String,
    pub vip: Ipv4Addr,
    pub staging_path: String,
    #[serde(default)]
    pub published_paths: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NodeState {
    pub volumes: std::collections::BTreeMap<String, NodeVolumeEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpPoolRange {
    pub cidr: String,
    pub first_ip: Ipv4Addr,
    pub last_ip: Ipv4Addr,
    pub vlan_id: u16,
    pub gateway: Ipv4Addr,
}
