//! Informer adapter: drives a `kube` watcher, keeps a reflector store current
//! and turns the raw watch stream into typed add/update/delete notifications.

use std::collections::HashSet;
use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use kube::runtime::reflector::{ObjectRef, Store, store::Writer};
use kube::runtime::{WatchStreamExt, watcher};
use kube::{Api, Resource};
use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// A change observed on a watched kind.
#[derive(Debug)]
pub enum WatchEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    /// Carries the last state the cache knew.
    Deleted(Arc<K>),
}

/// Compares raw watcher events against the store contents they are about to
/// replace. Must see each event before it is applied to the store.
pub struct Translator<K: Resource> {
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K: Resource> Default for Translator<K> {
    fn default() -> Self {
        Self { relisted: None }
    }
}

impl<K> Translator<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    pub fn translate(
        &mut self,
        store: &Store<K>,
        event: &watcher::Event<K>,
    ) -> Vec<WatchEvent<K>> {
        match event {
            watcher::Event::Apply(obj) => vec![applied(store, obj)],
            watcher::Event::Delete(obj) => {
                let last = store
                    .get(&ObjectRef::from_obj(obj))
                    .unwrap_or_else(|| Arc::new(obj.clone()));
                vec![WatchEvent::Deleted(last)]
            }
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectRef::from_obj(obj));
                }
                vec![applied(store, obj)]
            }
            watcher::Event::InitDone => {
                let Some(seen) = self.relisted.take() else {
                    return Vec::new();
                };
                store
                    .state()
                    .into_iter()
                    .filter(|obj| !seen.contains(&ObjectRef::from_obj(obj.as_ref())))
                    .map(WatchEvent::Deleted)
                    .collect()
            }
        }
    }
}

fn applied<K>(store: &Store<K>, obj: &K) -> WatchEvent<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let new = Arc::new(obj.clone());
    match store.get(&ObjectRef::from_obj(obj)) {
        Some(old) => WatchEvent::Updated { old, new },
        None => WatchEvent::Added(new),
    }
}

fn resync_timer(period: Option<Duration>) -> Option<Interval> {
    period.map(|p| tokio::time::interval_at(Instant::now() + p, p))
}

async fn next_tick(timer: &mut Option<Interval>) {
    match timer {
        Some(t) => {
            t.tick().await;
        }
        None => std::future::pending().await,
    }
}

/// Watch every object of `api`, mirror it into `writer` and forward typed
/// events on `tx` until `token` is cancelled or the receiver goes away.
///
/// With a `resync` period every cached object is re-sent as an `Updated`
/// whose old and new states are identical.
pub async fn run_informer<K>(
    api: Api<K>,
    mut writer: Writer<K>,
    tx: mpsc::UnboundedSender<WatchEvent<K>>,
    resync: Option<Duration>,
    token: CancellationToken,
) where
    K: Resource + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
    K::DynamicType: Default + Eq + Hash + Clone,
{
    let kind = K::kind(&Default::default()).to_string();
    let reader = writer.as_reader();
    let mut stream = watcher(api, watcher::Config::default())
        .default_backoff()
        .boxed();
    let mut translator = Translator::default();
    let mut timer = resync_timer(resync);
    info!(%kind, "starting informer");

    loop {
        let out = tokio::select! {
            _ = token.cancelled() => break,
            _ = next_tick(&mut timer) => {
                let objs = reader.state();
                debug!(%kind, count = objs.len(), "resync");
                objs.into_iter()
                    .map(|obj| WatchEvent::Updated { old: obj.clone(), new: obj })
                    .collect()
            }
            next = stream.next() => match next {
                Some(Ok(event)) => {
                    let out = translator.translate(&reader, &event);
                    writer.apply_watcher_event(&event);
                    out
                }
                Some(Err(e)) => {
                    warn!(%kind, error = %e, "watch error; backing off");
                    continue;
                }
                None => break,
            }
        };
        for event in out {
            if tx.send(event).is_err() {
                debug!(%kind, "event receiver dropped; stopping informer");
                return;
            }
        }
    }
    info!(%kind, "informer stopped");
}
