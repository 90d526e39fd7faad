//! Cluster metadata store: reads go through a short-TTL LRU cache, writes
//! invalidate the written key, list bypasses the cache (§4.7 "Metadata
//! store"). Kubernetes CRDs defined in `crate::crd` are the backing store.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::{Client, ResourceExt};
use lru::LruCache;
use serde_json::json;

use arca_common::error::{ArcaError, Result};
use arca_common::model::{ArcaSnapshot, ArcaVolume};

use crate::crd::{object_name, ArcaSnapshot as ArcaSnapshotCrd, ArcaVolume as ArcaVolumeCrd, FINALIZER};

const CACHE_CAPACITY: usize = 1024;
const CACHE_TTL: Duration = Duration::from_secs(5);

struct CacheEntry<T> {
    value: T,
    at: Instant,
}

pub struct MetadataStore {
    volumes: Api<ArcaVolumeCrd>,
    snapshots: Api<ArcaSnapshotCrd>,
    volume_cache: Mutex<LruCache<String, CacheEntry<ArcaVolume>>>,
    snapshot_cache: Mutex<LruCache<String, CacheEntry<ArcaSnapshot>>>,
}

fn kube_err(e: kube::Error) -> ArcaError {
    if let kube::Error::Api(ref ae) = e {
        return match ae.code {
            404 => ArcaError::NotFound(ae.message.clone()),
            409 => ArcaError::AlreadyExists(ae.message.clone()),
            _ => ArcaError::Unavailable(ae.message.clone()),
        };
    }
    ArcaError::Other(e.into())
}

impl MetadataStore {
    pub fn new(client: Client) -> Self {
        Self {
            volumes: Api::all(client.clone()),
            snapshots: Api::all(client),
            volume_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
            snapshot_cache: Mutex::new(LruCache::new(std::num::NonZeroUsize::new(CACHE_CAPACITY).unwrap())),
        }
    }

    pub async fn get_volume(&self, volume_id: &str) -> Result<Option<ArcaVolume>> {
        if let Some(entry) = self.volume_cache.lock().unwrap().get(volume_id) {
            if entry.at.elapsed() < CACHE_TTL {
                return Ok(Some(entry.value.clone()));
            }
        }
        match self.volumes.get_opt(&object_name(volume_id)).await.map_err(kube_err)? {
            None => Ok(None),
            Some(obj) => {
                let domain = obj.spec.to_domain().map_err(ArcaError::Other)?;
                self.volume_cache.lock().unwrap().put(
                    volume_id.to_string(),
                    CacheEntry {
                        value: domain.clone(),
                        at: Instant::now(),
                    },
                );
                Ok(Some(domain))
            }
        }
    }

    pub async fn insert_volume(&self, volume: &ArcaVolume) -> Result<()> {
        let name = object_name(&volume.volume_id);
        let mut obj = ArcaVolumeCrd::new(&name, crate::crd::ArcaVolumeSpec::from_domain(volume));
        obj.finalizers_mut().push(FINALIZER.to_string());
        self.volumes
            .create(&PostParams::default(), &obj)
            .await
            .map(|_| ())
            .map_err(kube_err)?;
        self.volume_cache.lock().unwrap().pop(&volume.volume_id);
        Ok(())
    }

    /// Patches `capacityBytes` on an existing record. Used by
    /// ControllerExpandVolume, which must persist a grown size rather than
    /// recreate the record (§4.7 "ControllerExpandVolume").
    pub async fn update_volume_capacity(&self, volume_id: &str, capacity_bytes: u64) -> Result<()> {
        let name = object_name(volume_id);
        let patch = json!({ "spec": { "capacityBytes": capacity_bytes } });
        self.volumes
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(kube_err)?;
        self.volume_cache.lock().unwrap().pop(volume_id);
        Ok(())
    }

    pub async fn delete_volume(&self, volume_id: &str) -> Result<()> {
        let name = object_name(volume_id);
        let remove_finalizer = json!({ "metadata": { "finalizers": [] } });
        let _ = self
            .volumes
            .patch(&name, &PatchParams::default(), &Patch::Merge(&remove_finalizer))
            .await;
        match self.volumes.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(kube_err(e)),
        }
        self.volume_cache.lock().unwrap().pop(volume_id);
        Ok(())
    }

    pub async fn get_snapshot(&self, snapshot_id: &str) -> Result<Option<ArcaSnapshot>> {
        if let Some(entry) = self.snapshot_cache.lock().unwrap().get(snapshot_id) {
            if entry.at.elapsed() < CACHE_TTL {
                return Ok(Some(entry.value.clone()));
            }
        }
        match self.snapshots.get_opt(&object_name(snapshot_id)).await.map_err(kube_err)? {
            None => Ok(None),
            Some(obj) => {
                let domain = obj.spec.to_domain().map_err(ArcaError::Other)?;
                self.snapshot_cache.lock().unwrap().put(
                    snapshot_id.to_string(),
                    CacheEntry {
                        value: domain.clone(),
                        at: Instant::now(),
                    },
                );
                Ok(Some(domain))
            }
        }
    }

    pub async fn insert_snapshot(&self, snapshot: &ArcaSnapshot) -> Result<()> {
        let name = object_name(&snapshot.snapshot_id);
        let mut obj = ArcaSnapshotCrd::new(&name, crate::crd::ArcaSnapshotSpec::from_domain(snapshot));
        obj.finalizers_mut().push(FINALIZER.to_string());
        self.snapshots
            .create(&PostParams::default(), &obj)
            .await
            .map(|_| ())
            .map_err(kube_err)?;
        self.snapshot_cache.lock().unwrap().pop(&snapshot.snapshot_id);
        Ok(())
    }

    /// Flip `ready_to_use` on an existing record. Used after the REST-side
    /// snapshot reflink succeeds (§4.7 "CreateSnapshot").
    pub async fn mark_snapshot_ready(&self, snapshot_id: &str) -> Result<()> {
        let name = object_name(snapshot_id);
        let patch = json!({ "spec": { "readyToUse": true } });
        self.snapshots
            .patch(&name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map(|_| ())
            .map_err(kube_err)?;
        self.snapshot_cache.lock().unwrap().pop(snapshot_id);
        Ok(())
    }

    pub async fn delete_snapshot(&self, snapshot_id: &str) -> Result<()> {
        let name = object_name(snapshot_id);
        let remove_finalizer = json!({ "metadata": { "finalizers": [] } });
        let _ = self
            .snapshots
            .patch(&name, &PatchParams::default(), &Patch::Merge(&remove_finalizer))
            .await;
        match self.snapshots.delete(&name, &DeleteParams::default()).await {
            Ok(_) => {}
            Err(kube::Error::Api(ae)) if ae.code == 404 => {}
            Err(e) => return Err(kube_err(e)),
        }
        self.snapshot_cache.lock().unwrap().pop(snapshot_id);
        Ok(())
    }

    /// Bypasses the cache; honors the store's own continuation token.
    pub async fn list_volumes(&self, continuation_token: Option<String>) -> Result<(Vec<ArcaVolume>, Option<String>)> {
        let lp = ListParams {
            continue_token: continuation_token,
            ..Default::default()
        };
        let list = self.volumes.list(&lp).await.map_err(kube_err)?;
        let next = list.metadata.continue_.clone();
        let items = list
            .items
            .iter()
            .filter_map(|obj| obj.spec.to_domain().ok())
            .collect();
        Ok((items, next))
    }

    /// Bypasses the cache; honors the store's own continuation token.
    pub async fn list_snapshots(&self, continuation_token: Option<String>) -> Result<(Vec<ArcaSnapshot>, Option<String>)> {
        let lp = ListParams {
            continue_token: continuation_token,
            ..Default::default()
        };
        let list = self.snapshots.list(&lp).await.map_err(kube_err)?;
        let next = list.metadata.continue_.clone();
        let items = list
            .items
            .iter()
            .filter_map(|obj| obj.spec.to_domain().ok())
            .collect();
        Ok((items, next))
    }
}
