use std::sync::Arc;

use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use kube::runtime::reflector::{ObjectRef, Store, store::WriterDropped};

use super::key::ReconcileKey;
use crate::crd::team::Team;

/// Read-only view over the reflector stores fed by the informers.
///
/// Reads are eventually consistent: an object written through the API shows
/// up here only after the watch delivers it, typically within a watch round
/// trip and at worst after the next relist. Nothing in the reconciler writes
/// to these stores.
#[derive(Clone)]
pub struct SnapshotCache {
    teams: Store<Team>,
    namespaces: Store<Namespace>,
    quotas: Store<ResourceQuota>,
}

impl SnapshotCache {
    pub fn new(
        teams: Store<Team>,
        namespaces: Store<Namespace>,
        quotas: Store<ResourceQuota>,
    ) -> Self {
        Self {
            teams,
            namespaces,
            quotas,
        }
    }

    /// Resolves once every store has completed its initial list.
    pub async fn wait_until_ready(&self) -> Result<(), WriterDropped> {
        self.teams.wait_until_ready().await?;
        self.namespaces.wait_until_ready().await?;
        self.quotas.wait_until_ready().await
    }

    pub fn team(&self, key: &ReconcileKey) -> Option<Arc<Team>> {
        let mut obj_ref = ObjectRef::new(&key.name);
        if let Some(ns) = key.namespace.as_deref() {
            obj_ref = obj_ref.within(ns);
        }
        self.teams.get(&obj_ref)
    }

    pub fn namespace(&self, name: &str) -> Option<Arc<Namespace>> {
        self.namespaces.get(&ObjectRef::new(name))
    }

    pub fn namespaces(&self) -> Vec<Arc<Namespace>> {
        self.namespaces.state()
    }

    pub fn resource_quota(
        &self,
        namespace: &str,
        name: &str,
    ) -> Option<Arc<ResourceQuota>> {
        self.quotas.get(&ObjectRef::new(name).within(namespace))
    }
}
