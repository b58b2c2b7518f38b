use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use kube::api::{Api, Patch, PatchParams, PostParams};
use kube::runtime::events::{Recorder, Reporter};
use kube::{Client, Resource, ResourceExt};
use serde_json::json;
use tracing::{debug, instrument};

use super::events::emit_warning;
use crate::crd::team::Team;

/// Writes the controller issues against the cluster. Reads always go through
/// the snapshot cache instead.
#[async_trait]
pub trait ClusterClient: Send + Sync {
    async fn create_namespace(&self, ns: &Namespace) -> Result<(), kube::Error>;

    /// Full update; fails with a conflict when `ns` is stale.
    async fn update_namespace(&self, ns: &Namespace) -> Result<(), kube::Error>;

    async fn create_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error>;

    /// Full update; fails with a conflict when `rq` is stale.
    async fn update_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error>;

    /// Persist `team.status` through the status subresource.
    async fn update_team_status(&self, team: &Team) -> Result<(), kube::Error>;

    /// Best effort; failures are logged, never returned.
    async fn record_warning(&self, team: &Team, reason: &str, note: String);
}

pub struct KubeClusterClient {
    client: Client,
    recorder: Recorder,
    field_manager: String,
}

impl KubeClusterClient {
    pub fn new(client: Client, controller_name: &str) -> Self {
        let reporter = Reporter {
            controller: controller_name.to_string(),
            instance: std::env::var("HOSTNAME").ok(),
        };
        Self {
            recorder: Recorder::new(client.clone(), reporter),
            client,
            field_manager: controller_name.to_string(),
        }
    }

    fn post_params(&self) -> PostParams {
        post_params(&self.field_manager)
    }

    fn patch_params(&self) -> PatchParams {
        patch_params(&self.field_manager)
    }

    fn quotas(&self, rq: &ResourceQuota) -> Api<ResourceQuota> {
        match rq.namespace() {
            Some(ns) => Api::namespaced(self.client.clone(), &ns),
            None => Api::default_namespaced(self.client.clone()),
        }
    }
}

fn post_params(field_manager: &str) -> PostParams {
    PostParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    }
}

fn patch_params(field_manager: &str) -> PatchParams {
    PatchParams {
        field_manager: Some(field_manager.to_string()),
        ..Default::default()
    }
}

#[async_trait]
impl ClusterClient for KubeClusterClient {
    #[instrument(skip_all, fields(name = %ns.name_any()))]
    async fn create_namespace(&self, ns: &Namespace) -> Result<(), kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.create(&self.post_params(), ns).await?;
        debug!("namespace created");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %ns.name_any()))]
    async fn update_namespace(&self, ns: &Namespace) -> Result<(), kube::Error> {
        let api: Api<Namespace> = Api::all(self.client.clone());
        api.replace(&ns.name_any(), &self.post_params(), ns)
            .await?;
        debug!("namespace updated");
        Ok(())
    }

    #[instrument(skip_all, fields(ns = ?rq.namespace(), name = %rq.name_any()))]
    async fn create_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error> {
        self.quotas(rq).create(&self.post_params(), rq).await?;
        debug!("resourcequota created");
        Ok(())
    }

    #[instrument(skip_all, fields(ns = ?rq.namespace(), name = %rq.name_any()))]
    async fn update_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error> {
        self.quotas(rq)
            .replace(&rq.name_any(), &self.post_params(), rq)
            .await?;
        debug!("resourcequota updated");
        Ok(())
    }

    #[instrument(skip_all, fields(name = %team.name_any()))]
    async fn update_team_status(&self, team: &Team) -> Result<(), kube::Error> {
        let api: Api<Team> = Api::all(self.client.clone());
        let status = serde_json::to_value(&team.status)
            .map_err(kube::Error::SerdeError)?;
        let patch = json!({ "status": status });
        api.patch_status(
            &team.name_any(),
            &self.patch_params(),
            &Patch::Merge(&patch),
        )
        .await?;
        debug!("team status updated");
        Ok(())
    }

    async fn record_warning(&self, team: &Team, reason: &str, note: String) {
        emit_warning(&self.recorder, &team.object_ref(&()), reason, note).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_carry_the_controller_field_manager() {
        assert_eq!(
            post_params("team-controller").field_manager.as_deref(),
            Some("team-controller")
        );
        assert_eq!(
            patch_params("team-controller").field_manager.as_deref(),
            Some("team-controller")
        );
    }
}
