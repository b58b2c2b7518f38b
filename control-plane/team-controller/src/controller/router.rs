use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use kube::{Resource, ResourceExt};
use tokio::sync::mpsc::UnboundedReceiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use super::cache::SnapshotCache;
use super::children::{OWNER_KIND, controller_of};
use super::key::ReconcileKey;
use super::queue::WorkQueue;
use crate::crd::team::Team;
use crate::watch::WatchEvent;

/// Maps watch notifications onto Team keys in the work queue.
#[derive(Clone)]
pub struct EventRouter {
    cache: SnapshotCache,
    queue: WorkQueue<String>,
}

impl EventRouter {
    pub fn new(cache: SnapshotCache, queue: WorkQueue<String>) -> Self {
        Self { cache, queue }
    }

    /// Every Team change, deletes included, schedules that Team.
    pub async fn on_team(&self, event: &WatchEvent<Team>) {
        let team = match event {
            WatchEvent::Added(t) | WatchEvent::Deleted(t) => t,
            WatchEvent::Updated { new, .. } => new,
        };
        let key = ReconcileKey::for_object(team.as_ref()).to_string();
        trace!(%key, "team event");
        self.queue.add(key).await;
    }

    /// Changes to a child schedule the Team that controls it. Periodic
    /// resyncs of an unchanged child are ignored, as are children whose
    /// controller is not a Team the cache knows about.
    pub async fn on_owned<K>(&self, event: &WatchEvent<K>)
    where
        K: Resource<DynamicType = ()>,
    {
        let obj = match event {
            WatchEvent::Added(o) | WatchEvent::Deleted(o) => o,
            WatchEvent::Updated { old, new } => {
                if old.resource_version() == new.resource_version() {
                    return;
                }
                new
            }
        };
        let Some(owner) = controller_of(obj.as_ref()) else {
            return;
        };
        if owner.kind != OWNER_KIND {
            return;
        }
        let key = ReconcileKey {
            namespace: None,
            name: owner.name.clone(),
        };
        if self.cache.team(&key).is_none() {
            debug!(
                kind = %K::kind(&()),
                name = %obj.name_any(),
                owner = %key,
                "ignoring event for orphaned object"
            );
            return;
        }
        trace!(kind = %K::kind(&()), name = %obj.name_any(), %key, "child event");
        self.queue.add(key.to_string()).await;
    }

    /// Route events from the three informers until `token` is cancelled or
    /// every channel is closed.
    pub async fn run(
        self,
        mut teams: UnboundedReceiver<WatchEvent<Team>>,
        mut namespaces: UnboundedReceiver<WatchEvent<Namespace>>,
        mut quotas: UnboundedReceiver<WatchEvent<ResourceQuota>>,
        token: CancellationToken,
    ) {
        let mut open = (true, true, true);
        while open.0 || open.1 || open.2 {
            tokio::select! {
                _ = token.cancelled() => break,
                ev = teams.recv(), if open.0 => match ev {
                    Some(ev) => self.on_team(&ev).await,
                    None => open.0 = false,
                },
                ev = namespaces.recv(), if open.1 => match ev {
                    Some(ev) => self.on_owned(&ev).await,
                    None => open.1 = false,
                },
                ev = quotas.recv(), if open.2 => match ev {
                    Some(ev) => self.on_owned(&ev).await,
                    None => open.2 = false,
                },
            }
        }
        info!("event router stopped");
    }
}
