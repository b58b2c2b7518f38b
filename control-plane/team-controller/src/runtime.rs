use std::sync::Arc;

use k8s_openapi::api::core::v1::{Namespace, ResourceQuota};
use kube::runtime::reflector::store::Writer;
use kube::{Api, Client};
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::config::ControllerConfig;
use crate::controller::TeamController;
use crate::controller::cache::SnapshotCache;
use crate::controller::client::KubeClusterClient;
use crate::controller::router::EventRouter;
use crate::crd::team::Team;
use crate::watch::run_informer;

/// Wire informers, router and workers together and run until `token` is
/// cancelled. Returns once the workers have drained the queue.
pub async fn run_all(
    client: Client,
    cfg: ControllerConfig,
    token: CancellationToken,
) -> anyhow::Result<()> {
    info!(?cfg, "starting team controller runtime");
    let resync = cfg.resync_period();

    let teams = Writer::<Team>::default();
    let namespaces = Writer::<Namespace>::default();
    let quotas = Writer::<ResourceQuota>::default();
    let cache = SnapshotCache::new(
        teams.as_reader(),
        namespaces.as_reader(),
        quotas.as_reader(),
    );

    let cluster = Arc::new(KubeClusterClient::new(
        client.clone(),
        &cfg.controller_name,
    ));
    let controller = TeamController::new(cache.clone(), cluster, &cfg);

    let (team_tx, team_rx) = mpsc::unbounded_channel();
    let (ns_tx, ns_rx) = mpsc::unbounded_channel();
    let (rq_tx, rq_rx) = mpsc::unbounded_channel();

    // background tasks stop on their own once the token is cancelled
    let background = token.child_token();
    let mut tasks = JoinSet::new();
    tasks.spawn(run_informer(
        Api::<Team>::all(client.clone()),
        teams,
        team_tx,
        resync,
        background.clone(),
    ));
    tasks.spawn(run_informer(
        Api::<Namespace>::all(client.clone()),
        namespaces,
        ns_tx,
        resync,
        background.clone(),
    ));
    tasks.spawn(run_informer(
        Api::<ResourceQuota>::all(client),
        quotas,
        rq_tx,
        resync,
        background.clone(),
    ));
    tasks.spawn(
        EventRouter::new(cache, controller.queue().clone()).run(
            team_rx,
            ns_rx,
            rq_rx,
            background.clone(),
        ),
    );

    let res = controller.run(cfg.effective_workers(), token).await;

    background.cancel();
    while let Some(joined) = tasks.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "background task failed");
        }
    }
    res?;
    info!("team controller runtime stopped");
    Ok(())
}
