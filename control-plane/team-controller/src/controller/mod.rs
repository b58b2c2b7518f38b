pub mod cache;
pub mod children;
pub mod client;
pub mod events;
pub mod key;
pub mod queue;
pub mod reconcile;
pub mod router;
pub mod status;

#[cfg(test)]
pub(crate) mod testing;

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures_util::FutureExt;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::ControllerConfig;
use cache::SnapshotCache;
use client::ClusterClient;
use queue::{ItemBackoff, TokenBucket, WorkQueue};
use reconcile::Reconciler;

#[derive(thiserror::Error, Debug)]
pub enum ReconcileError {
    #[error("{kind} {name:?} already exists and is not managed by Team")]
    ForeignOwned { kind: &'static str, name: String },
    #[error("namespace {0:?} is not active yet")]
    NotReady(String),
    #[error("kubernetes api error: {0}")]
    Api(#[from] kube::Error),
    #[error("team {team:?} owns more than one namespace: {namespaces}")]
    InvariantViolation { team: String, namespaces: String },
    #[error("malformed reconcile key {0:?}")]
    MalformedKey(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(thiserror::Error, Debug)]
pub enum ControllerError {
    #[error("failed to sync informer caches: {0}")]
    CacheSync(#[from] kube::runtime::reflector::store::WriterDropped),
}

/// The worker side of the controller: a shared queue of Team keys drained by
/// a fixed pool of workers that each run the [`Reconciler`].
#[derive(Clone)]
pub struct TeamController {
    queue: WorkQueue<String>,
    reconciler: Reconciler,
    max_retries: u32,
}

impl TeamController {
    pub fn new(
        cache: SnapshotCache,
        client: Arc<dyn ClusterClient>,
        cfg: &ControllerConfig,
    ) -> Self {
        let backoff = ItemBackoff::new(cfg.backoff.base(), cfg.backoff.max());
        let bucket = TokenBucket::new(cfg.backoff.qps, cfg.backoff.burst);
        Self {
            queue: WorkQueue::with_bucket(backoff, bucket),
            reconciler: Reconciler::new(cache, client),
            max_retries: cfg.max_retries,
        }
    }

    pub fn queue(&self) -> &WorkQueue<String> {
        &self.queue
    }

    /// Wait for the caches, run `workers` workers until `token` is
    /// cancelled, then shut the queue down and wait for the workers to
    /// finish what is left in it.
    pub async fn run(
        &self,
        workers: usize,
        token: CancellationToken,
    ) -> Result<(), ControllerError> {
        info!("starting team controller");
        info!("waiting for informer caches to sync");
        tokio::select! {
            res = self.reconciler.cache().wait_until_ready() => res?,
            _ = token.cancelled() => {
                self.queue.shut_down().await;
                return Ok(());
            }
        }
        info!("informer caches synced");

        let mut pool = JoinSet::new();
        for id in 0..workers {
            let this = self.clone();
            pool.spawn(async move { this.run_worker(id).await });
        }

        token.cancelled().await;
        info!("shutting down work queue");
        self.queue.shut_down().await;
        while let Some(res) = pool.join_next().await {
            if let Err(e) = res {
                error!(error = %e, "worker task failed");
            }
        }
        info!("team controller stopped");
        Ok(())
    }

    async fn run_worker(&self, id: usize) {
        while self.process_next_work_item().await {}
        info!(worker = id, "worker exiting");
    }

    /// Handle one key. Returns false once the queue is shut down and drained.
    ///
    /// A panicking sync is reported as an internal error so the key is
    /// released and retried like any other failure.
    pub async fn process_next_work_item(&self) -> bool {
        let Some(key) = self.queue.get().await else {
            return false;
        };
        let res = AssertUnwindSafe(self.reconciler.sync(&key))
            .catch_unwind()
            .await
            .unwrap_or_else(|panic| {
                Err(ReconcileError::Internal(format!(
                    "sync panicked: {}",
                    panic_message(panic.as_ref())
                )))
            });
        handle_err(&self.queue, &key, res, self.max_retries).await;
        self.queue.done(&key).await;
        true
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(msg) = panic.downcast_ref::<&str>() {
        *msg
    } else if let Some(msg) = panic.downcast_ref::<String>() {
        msg.as_str()
    } else {
        "unknown panic"
    }
}

/// Apply the retry policy to the result of one sync.
///
/// Success resets the retry counter. A malformed key is dropped at once.
/// Any other error is requeued with backoff until `max_retries` retries have
/// been spent, then the key is dropped and forgotten.
pub async fn handle_err(
    queue: &WorkQueue<String>,
    key: &str,
    res: Result<(), ReconcileError>,
    max_retries: u32,
) {
    let err = match res {
        Ok(()) => {
            queue.forget(key).await;
            return;
        }
        Err(err) => err,
    };

    if let ReconcileError::MalformedKey(_) = err {
        error!(%key, error = %err, "dropping malformed key");
        queue.forget(key).await;
        return;
    }

    let retries = queue.num_requeues(key).await;
    if retries < max_retries {
        match &err {
            ReconcileError::InvariantViolation { .. } => error!(
                %key, error = %err, retries,
                "invariant violated; manual intervention required"
            ),
            _ => warn!(
                %key, error = %err, retries,
                "error syncing team; requeueing"
            ),
        }
        queue.add_rate_limited(key.to_owned()).await;
        return;
    }

    error!(%key, error = %err, retries, "dropping team out of the queue");
    queue.forget(key).await;
}
