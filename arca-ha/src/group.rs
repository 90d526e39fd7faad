//! SVM resource group: strict ordering across block device, mount, netns,
//! and NFS daemon (§4.1). Start proceeds in order; stop tears down in
//! reverse; the group runs on exactly one node at a time by construction —
//! whichever node's agent process is invoked for `start` owns it.

use arca_common::error::Result;

use crate::resource::{GroupResource, ResourceStatus};

/// Ordered stages of one SVM resource group, outermost (block device) first.
pub struct SvmResourceGroup {
    pub svm: String,
    stages: Vec<Box<dyn GroupResource>>,
}

impl SvmResourceGroup {
    pub fn new(svm: impl Into<String>, stages: Vec<Box<dyn GroupResource>>) -> Self {
        Self {
            svm: svm.into(),
            stages,
        }
    }

    pub fn validate_all(&self) -> Result<()> {
        for stage in &self.stages {
            stage.validate()?;
        }
        Ok(())
    }

    /// Idempotent: starts each stage in order, skipping stages already
    /// started. A failure partway leaves earlier stages running — the
    /// caller retries the whole group, which is safe because every stage's
    /// own `start` is itself idempotent.
    pub async fn start(&self) -> Result<()> {
        self.validate_all()?;
        for stage in &self.stages {
            stage.start().await?;
        }
        Ok(())
    }

    /// Reverse order of `start` (§4.1: "restarts on the other node only
    /// after the replicated block device has been promoted there" implies
    /// the mirror teardown order here).
    pub async fn stop(&self) -> Result<()> {
        for stage in self.stages.iter().rev() {
            stage.stop().await?;
        }
        Ok(())
    }

    /// Aggregate status (§4.1): `Started` only if every stage reports
    /// started; `Stopped` only if every stage reports stopped; a mix is
    /// `Transitioning`; any stage `Failed` makes the whole group `Failed`.
    pub async fn status(&self) -> Result<ResourceStatus> {
        let mut all_started = true;
        let mut all_stopped = true;
        for stage in &self.stages {
            match stage.monitor().await? {
                ResourceStatus::Started => all_stopped = false,
                ResourceStatus::Stopped => all_started = false,
                ResourceStatus::Failed => return Ok(ResourceStatus::Failed),
                ResourceStatus::Transitioning => {
                    all_started = false;
                    all_stopped = false;
                }
            }
        }
        Ok(if all_started {
            ResourceStatus::Started
        } else if all_stopped {
            ResourceStatus::Stopped
        } else {
            ResourceStatus::Transitioning
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;

    use super::*;

    struct RecordingResource {
        name: &'static str,
        order: Arc<std::sync::Mutex<Vec<&'static str>>>,
        status: ResourceStatus,
        fail_validate: bool,
    }

    #[async_trait]
    impl GroupResource for RecordingResource {
        fn name(&self) -> &str {
            self.name
        }

        fn validate(&self) -> Result<()> {
            if self.fail_validate {
                return Err(arca_common::error::ArcaError::validation("bad params"));
            }
            Ok(())
        }

        async fn start(&self) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            self.order.lock().unwrap().push(self.name);
            Ok(())
        }

        async fn monitor(&self) -> Result<ResourceStatus> {
            Ok(self.status)
        }
    }

    fn stage(
        name: &'static str,
        order: &Arc<std::sync::Mutex<Vec<&'static str>>>,
        status: ResourceStatus,
    ) -> Box<dyn GroupResource> {
        Box::new(RecordingResource {
            name,
            order: Arc::clone(order),
            status,
            fail_validate: false,
        })
    }

    #[tokio::test]
    async fn start_runs_stages_in_order_stop_runs_reverse() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let group = SvmResourceGroup::new(
            "tenant_a",
            vec![
                stage("drbd", &order, ResourceStatus::Started),
                stage("mount", &order, ResourceStatus::Started),
                stage("netns", &order, ResourceStatus::Started),
                stage("nfs", &order, ResourceStatus::Started),
            ],
        );

        group.start().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["drbd", "mount", "netns", "nfs"]);

        order.lock().unwrap().clear();
        group.stop().await.unwrap();
        assert_eq!(*order.lock().unwrap(), vec!["nfs", "netns", "mount", "drbd"]);
    }

    #[tokio::test]
    async fn status_is_started_only_when_every_stage_started() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let all_up = SvmResourceGroup::new(
            "t",
            vec![
                stage("a", &order, ResourceStatus::Started),
                stage("b", &order, ResourceStatus::Started),
            ],
        );
        assert_eq!(all_up.status().await.unwrap(), ResourceStatus::Started);

        let mixed = SvmResourceGroup::new(
            "t",
            vec![
                stage("a", &order, ResourceStatus::Started),
                stage("b", &order, ResourceStatus::Stopped),
            ],
        );
        assert_eq!(mixed.status().await.unwrap(), ResourceStatus::Transitioning);
    }

    #[tokio::test]
    async fn status_is_failed_if_any_stage_failed() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let group = SvmResourceGroup::new(
            "t",
            vec![
                stage("a", &order, ResourceStatus::Started),
                stage("b", &order, ResourceStatus::Failed),
            ],
        );
        assert_eq!(group.status().await.unwrap(), ResourceStatus::Failed);
    }

    #[tokio::test]
    async fn start_fails_fast_on_invalid_stage_without_running_any() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut stages = vec![stage("a", &order, ResourceStatus::Started)];
        stages.push(Box::new(RecordingResource {
            name: "bad",
            order: Arc::clone(&order),
            status: ResourceStatus::Stopped,
            fail_validate: true,
        }));
        let group = SvmResourceGroup::new("t", stages);

        assert!(group.start().await.is_err());
        assert!(order.lock().unwrap().is_empty());
    }
}
