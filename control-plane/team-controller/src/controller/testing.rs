//! Test doubles: a recording `ClusterClient` and snapshot caches populated
//! through reflector writers.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    Namespace, NamespaceStatus, ResourceQuota, ResourceQuotaSpec,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use kube::error::ErrorResponse;
use kube::runtime::reflector::store::Writer;
use kube::runtime::watcher;

use super::cache::SnapshotCache;
use super::client::ClusterClient;
use crate::crd::team::{Team, TeamSpec};

pub fn new_team(name: &str, environment: &str, rq: ResourceQuotaSpec) -> Team {
    let mut team = Team::new(
        name,
        TeamSpec {
            name: name.to_string(),
            environment: environment.to_string(),
            description: "test description".to_string(),
            resource_quota_spec: rq,
        },
    );
    team.metadata.uid = Some(format!("uid-{name}"));
    team.metadata.resource_version = Some("1".into());
    team
}

pub fn quantity_spec(resource: &str, amount: &str) -> ResourceQuotaSpec {
    ResourceQuotaSpec {
        hard: Some(BTreeMap::from([(
            resource.to_string(),
            Quantity(amount.to_string()),
        )])),
        ..Default::default()
    }
}

pub fn activate(mut ns: Namespace) -> Namespace {
    ns.status = Some(NamespaceStatus {
        phase: Some("Active".into()),
        ..Default::default()
    });
    ns
}

/// Objects to preload into the snapshot cache.
#[derive(Default)]
pub struct Objects {
    pub teams: Vec<Team>,
    pub namespaces: Vec<Namespace>,
    pub quotas: Vec<ResourceQuota>,
}

/// Writers must outlive the cache for `wait_until_ready` to resolve.
pub struct CacheFixture {
    pub teams: Writer<Team>,
    pub namespaces: Writer<Namespace>,
    pub quotas: Writer<ResourceQuota>,
}

impl CacheFixture {
    pub fn new(objects: Objects) -> Self {
        Self {
            teams: synced_writer(objects.teams),
            namespaces: synced_writer(objects.namespaces),
            quotas: synced_writer(objects.quotas),
        }
    }

    pub fn cache(&self) -> SnapshotCache {
        SnapshotCache::new(
            self.teams.as_reader(),
            self.namespaces.as_reader(),
            self.quotas.as_reader(),
        )
    }
}

fn synced_writer<K>(objs: Vec<K>) -> Writer<K>
where
    K: kube::Resource + Clone + 'static,
    K::DynamicType: Default + Eq + std::hash::Hash + Clone,
{
    let mut writer = Writer::default();
    writer.apply_watcher_event(&watcher::Event::Init);
    for obj in objs {
        writer.apply_watcher_event(&watcher::Event::InitApply(obj));
    }
    writer.apply_watcher_event(&watcher::Event::InitDone);
    writer
}

#[derive(Clone, Debug, PartialEq)]
pub enum ClusterCall {
    CreateNamespace(Namespace),
    UpdateNamespace(Namespace),
    CreateResourceQuota(ResourceQuota),
    UpdateResourceQuota(ResourceQuota),
    UpdateTeamStatus(Team),
    Warning { reason: String, note: String },
}

impl ClusterCall {
    pub fn is_write(&self) -> bool {
        !matches!(self, ClusterCall::Warning { .. })
    }
}

/// Records every call; optionally fails every write with a 500 or panics.
#[derive(Default)]
pub struct FakeCluster {
    pub calls: Mutex<Vec<ClusterCall>>,
    pub fail_writes: bool,
    pub panic_on_write: bool,
}

impl FakeCluster {
    pub fn failing() -> Self {
        Self {
            fail_writes: true,
            ..Default::default()
        }
    }

    pub fn panicking() -> Self {
        Self {
            panic_on_write: true,
            ..Default::default()
        }
    }

    pub fn calls(&self) -> Vec<ClusterCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn writes(&self) -> Vec<ClusterCall> {
        self.calls().into_iter().filter(ClusterCall::is_write).collect()
    }

    fn record(&self, call: ClusterCall) -> Result<(), kube::Error> {
        self.calls.lock().unwrap().push(call);
        if self.panic_on_write {
            panic!("injected panic");
        }
        if self.fail_writes {
            return Err(kube::Error::Api(ErrorResponse {
                status: "Failure".into(),
                message: "injected failure".into(),
                reason: "InternalError".into(),
                code: 500,
            }));
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterClient for FakeCluster {
    async fn create_namespace(&self, ns: &Namespace) -> Result<(), kube::Error> {
        self.record(ClusterCall::CreateNamespace(ns.clone()))
    }

    async fn update_namespace(&self, ns: &Namespace) -> Result<(), kube::Error> {
        self.record(ClusterCall::UpdateNamespace(ns.clone()))
    }

    async fn create_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error> {
        self.record(ClusterCall::CreateResourceQuota(rq.clone()))
    }

    async fn update_resource_quota(
        &self,
        rq: &ResourceQuota,
    ) -> Result<(), kube::Error> {
        self.record(ClusterCall::UpdateResourceQuota(rq.clone()))
    }

    async fn update_team_status(&self, team: &Team) -> Result<(), kube::Error> {
        self.record(ClusterCall::UpdateTeamStatus(team.clone()))
    }

    async fn record_warning(&self, _team: &Team, reason: &str, note: String) {
        self.calls.lock().unwrap().push(ClusterCall::Warning {
            reason: reason.to_string(),
            note,
        });
    }
}
