//! Cluster-scoped metadata store for ArcaVolume/ArcaSnapshot records (§3,
//! §4.7 "Metadata store"), backed by two Kubernetes CRDs rather than a side
//! database: the finalizer the spec requires is a first-class Kubernetes
//! concept, and external-provisioner/external-snapshotter sidecars already
//! expect driver state to live in the API server. Schema derivation follows
//! `servarr-crds`' `#[derive(CustomResource)]` usage.

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use arca_common::model::{ArcaSnapshot, ArcaVolume, ContentSource};

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "storage.arca.io",
    version = "v1alpha1",
    kind = "ArcaVolume",
    plural = "arcavolumes",
    singular = "arcavolume",
    shortname = "av"
)]
#[serde(rename_all = "camelCase")]
pub struct ArcaVolumeSpec {
    pub volume_id: String,
    pub name: String,
    pub svm_name: String,
    pub vip: String,
    pub path: String,
    pub capacity_bytes: u64,
    pub created_at: String,
    #[serde(default)]
    pub content_source: Option<ArcaContentSourceSpec>,
}

#[derive(Serialize, Deserialize, Clone, Debug, JsonSchema)]
#[serde(rename_all = "camelCase", tag = "kind")]
pub enum ArcaContentSourceSpec {
    Volume { source_volume_id: String },
    Snapshot { source_snapshot_id: String },
}

impl From<ContentSource> for ArcaContentSourceSpec {
    fn from(c: ContentSource) -> Self {
        match c {
            ContentSource::Volume { source_volume_id } => ArcaContentSourceSpec::Volume { source_volume_id },
            ContentSource::Snapshot { source_snapshot_id } => ArcaContentSourceSpec::Snapshot { source_snapshot_id },
        }
    }
}

impl From<ArcaContentSourceSpec> for ContentSource {
    fn from(c: ArcaContentSourceSpec) -> Self {
        match c {
            ArcaContentSourceSpec::Volume { source_volume_id } => ContentSource::Volume { source_volume_id },
            ArcaContentSourceSpec::Snapshot { source_snapshot_id } => ContentSource::Snapshot { source_snapshot_id },
        }
    }
}

impl ArcaVolumeSpec {
    pub fn from_domain(v: &ArcaVolume) -> Self {
        Self {
            volume_id: v.volume_id.clone(),
            name: v.name.clone(),
            svm_name: v.svm_name.clone(),
            vip: v.vip.to_string(),
            path: v.path.clone(),
            capacity_bytes: v.capacity_bytes,
            created_at: v.created_at.to_rfc3339(),
            content_source: v.content_source.clone().map(Into::into),
        }
    }

    pub fn to_domain(&self) -> anyhow::Result<ArcaVolume> {
        Ok(ArcaVolume {
            volume_id: self.volume_id.clone(),
            name: self.name.clone(),
            svm_name: self.svm_name.clone(),
            vip: self.vip.parse()?,
            path: self.path.clone(),
            capacity_bytes: self.capacity_bytes,
            created_at: self.created_at.parse()?,
            content_source: self.content_source.clone().map(Into::into),
        })
    }
}

#[derive(CustomResource, Serialize, Deserialize, Clone, Debug, Default, JsonSchema)]
#[kube(
    group = "storage.arca.io",
    version = "v1alpha1",
    kind = "ArcaSnapshot",
    plural = "arcasnapshots",
    singular = "arcasnapshot",
    shortname = "asn"
)]
#[serde(rename_all = "camelCase")]
pub struct ArcaSnapshotSpec {
    pub snapshot_id: String,
    pub name: String,
    pub source_volume_id: String,
    pub svm_name: String,
    pub path: String,
    pub size_bytes: u64,
    pub created_at: String,
    pub ready_to_use: bool,
}

impl ArcaSnapshotSpec {
    pub fn from_domain(s: &ArcaSnapshot) -> Self {
        Self {
            snapshot_id: s.snapshot_id.clone(),
            name: s.name.clone(),
            source_volume_id: s.source_volume_id.clone(),
            svm_name: s.svm_name.clone(),
            path: s.path.clone(),
            size_bytes: s.size_bytes,
            created_at: s.created_at.to_rfc3339(),
            ready_to_use: s.ready_to_use,
        }
    }

    pub fn to_domain(&self) -> anyhow::Result<ArcaSnapshot> {
        Ok(ArcaSnapshot {
            snapshot_id: self.snapshot_id.clone(),
            name: self.name.clone(),
            source_volume_id: self.source_volume_id.clone(),
            svm_name: self.svm_name.clone(),
            path: self.path.clone(),
            size_bytes: self.size_bytes,
            created_at: self.created_at.parse()?,
            ready_to_use: self.ready_to_use,
        })
    }
}

/// Kubernetes object names must be valid DNS subdomains; CSI volume/snapshot
/// ids are already lowercase hex so this is only ever a passthrough, but the
/// conversion point is kept explicit in case id derivation ever changes.
pub fn object_name(id: &str) -> String {
    id.to_lowercase()
}

pub const FINALIZER: &str = "storage.arca.io/csi-driver";
