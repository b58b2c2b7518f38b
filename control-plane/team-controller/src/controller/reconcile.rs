use std::sync::Arc;
use std::time::Instant;

use k8s_openapi::api::core::v1::Namespace;
use kube::ResourceExt;
use tracing::{debug, info, instrument, trace};

use super::ReconcileError;
use super::cache::SnapshotCache;
use super::children::{
    RESOURCE_QUOTA_NAME, is_controlled_by, is_namespace_active, merge_labels,
    missing_labels, new_namespace, new_resource_quota, quota_spec_matches,
    team_namespace,
};
use super::client::ClusterClient;
use super::events::{REASON_RESOURCE_EXISTS, resource_exists_message};
use super::key::ReconcileKey;
use super::status::calculate_status;
use crate::crd::team::Team;

/// Outcome of the namespace step.
enum NamespaceSync {
    /// The namespace was just created; the quota waits for the next pass.
    Created,
    /// The namespace exists and is owned by the team.
    Owned(Arc<Namespace>),
}

/// Drives one Team toward its desired children. Reads come from the
/// snapshot cache, writes go through the [`ClusterClient`].
#[derive(Clone)]
pub struct Reconciler {
    cache: SnapshotCache,
    client: Arc<dyn ClusterClient>,
}

impl Reconciler {
    pub fn new(cache: SnapshotCache, client: Arc<dyn ClusterClient>) -> Self {
        Self { cache, client }
    }

    pub fn cache(&self) -> &SnapshotCache {
        &self.cache
    }

    /// Reconcile the Team behind the raw queue item `raw_key`.
    #[instrument(skip(self))]
    pub async fn sync(&self, raw_key: &str) -> Result<(), ReconcileError> {
        let started = Instant::now();
        trace!("started syncing team");
        let res = self.sync_key(raw_key).await;
        debug!(elapsed = ?started.elapsed(), ok = res.is_ok(), "finished syncing team");
        res
    }

    async fn sync_key(&self, raw_key: &str) -> Result<(), ReconcileError> {
        let key = ReconcileKey::parse(raw_key)?;
        let Some(cached) = self.cache.team(&key) else {
            debug!(%key, "team has been deleted");
            return Ok(());
        };
        // the cached object is shared with every worker; work on a copy
        let mut team: Team = cached.as_ref().clone();

        let namespace = match self.sync_namespace(&team).await? {
            NamespaceSync::Created => return Ok(()),
            NamespaceSync::Owned(ns) => ns,
        };
        self.sync_resource_quota(&team, &namespace).await?;
        self.sync_status(&mut team).await
    }

    async fn sync_namespace(
        &self,
        team: &Team,
    ) -> Result<NamespaceSync, ReconcileError> {
        let name = team_namespace(team);
        let Some(cached) = self.cache.namespace(&name) else {
            info!(namespace = %name, "creating namespace");
            self.client.create_namespace(&new_namespace(team)?).await?;
            return Ok(NamespaceSync::Created);
        };

        if !is_controlled_by(cached.as_ref(), team) {
            return Err(self.foreign_owned(team, "Namespace", &name).await);
        }

        if missing_labels(team, cached.as_ref()) {
            let mut ns = cached.as_ref().clone();
            merge_labels(team, &mut ns);
            info!(namespace = %name, "updating namespace labels");
            self.client.update_namespace(&ns).await?;
        }
        Ok(NamespaceSync::Owned(cached))
    }

    async fn sync_resource_quota(
        &self,
        team: &Team,
        namespace: &Namespace,
    ) -> Result<(), ReconcileError> {
        let ns_name = namespace.name_any();
        if !is_namespace_active(namespace) {
            return Err(ReconcileError::NotReady(ns_name));
        }

        let Some(cached) = self.cache.resource_quota(&ns_name, RESOURCE_QUOTA_NAME)
        else {
            info!(namespace = %ns_name, quota = RESOURCE_QUOTA_NAME, "creating resourcequota");
            self.client
                .create_resource_quota(&new_resource_quota(team)?)
                .await?;
            return Ok(());
        };

        if !is_controlled_by(cached.as_ref(), team) {
            return Err(self
                .foreign_owned(team, "ResourceQuota", RESOURCE_QUOTA_NAME)
                .await);
        }

        let desired = &team.spec.resource_quota_spec;
        if !quota_spec_matches(cached.as_ref(), desired)
            || missing_labels(team, cached.as_ref())
        {
            let mut rq = cached.as_ref().clone();
            merge_labels(team, &mut rq);
            rq.spec = Some(desired.clone());
            info!(namespace = %ns_name, quota = RESOURCE_QUOTA_NAME, "updating resourcequota");
            self.client.update_resource_quota(&rq).await?;
        }
        Ok(())
    }

    /// Write the recomputed status only when it differs from the stored one.
    async fn sync_status(&self, team: &mut Team) -> Result<(), ReconcileError> {
        let status = calculate_status(&self.cache, team)?;
        let current = team.status.clone().unwrap_or_default();
        if current == status {
            trace!("status unchanged; skipping update");
            return Ok(());
        }
        debug!(?current, desired = ?status, "status changed; updating team");
        team.status = Some(status);
        self.client.update_team_status(team).await?;
        Ok(())
    }

    async fn foreign_owned(
        &self,
        team: &Team,
        kind: &'static str,
        name: &str,
    ) -> ReconcileError {
        self.client
            .record_warning(
                team,
                REASON_RESOURCE_EXISTS,
                resource_exists_message(name),
            )
            .await;
        ReconcileError::ForeignOwned {
            kind,
            name: name.to_string(),
        }
    }
}
