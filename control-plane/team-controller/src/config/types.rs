use std::time::Duration;

use envconfig::Envconfig;

/// Command line surface of the controller binary.
#[derive(clap::Parser, Clone, Debug)]
#[clap(author, version, about, long_about = None)]
pub struct ControllerArgs {
    /// Path to kubeconfig. Not needed inside the cluster
    #[clap(long, default_value = "")]
    pub kubeconfig: String,
}

#[derive(Envconfig, Clone, Debug)]
pub struct ControllerConfig {
    /// Number of concurrent reconcile workers.
    /// Env: TEAM_CTRL_WORKERS
    #[envconfig(from = "TEAM_CTRL_WORKERS", default = "2")]
    pub workers: usize,

    /// Failed attempts tolerated before a key is dropped from the queue.
    /// Env: TEAM_CTRL_MAX_RETRIES
    #[envconfig(from = "TEAM_CTRL_MAX_RETRIES", default = "15")]
    pub max_retries: u32,

    #[envconfig(nested)]
    pub backoff: BackoffConfig,

    /// Period at which every cached object is re-delivered as an update.
    /// 0 disables resync.
    /// Env: TEAM_CTRL_RESYNC_SECS
    #[envconfig(from = "TEAM_CTRL_RESYNC_SECS", default = "30")]
    pub resync_secs: u64,

    /// Reporter name used for events.
    /// Env: TEAM_CTRL_NAME
    #[envconfig(from = "TEAM_CTRL_NAME", default = "team-controller")]
    pub controller_name: String,
}

#[derive(Envconfig, Clone, Debug)]
pub struct BackoffConfig {
    #[envconfig(from = "TEAM_CTRL_BACKOFF_BASE_MS", default = "5")]
    pub base_ms: u64,
    #[envconfig(from = "TEAM_CTRL_BACKOFF_MAX_SECS", default = "1000")]
    pub max_secs: u64,
    /// Overall retry rate shared by all keys; 0 disables it.
    #[envconfig(from = "TEAM_CTRL_RATE_QPS", default = "10")]
    pub qps: f64,
    #[envconfig(from = "TEAM_CTRL_RATE_BURST", default = "100")]
    pub burst: u32,
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_secs)
    }
}

impl ControllerConfig {
    /// Worker count, never less than one.
    pub fn effective_workers(&self) -> usize {
        self.workers.max(1)
    }

    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_secs > 0).then(|| Duration::from_secs(self.resync_secs))
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: 5,
            max_secs: 1000,
            qps: 10.0,
            burst: 100,
        }
    }
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            max_retries: 15,
            backoff: BackoffConfig::default(),
            resync_secs: 30,
            controller_name: "team-controller".into(),
        }
    }
}
