pub mod config;
pub mod controller;
pub mod crd;
pub mod runtime;
pub mod signals;
pub mod watch;

use tracing_subscriber::{
    EnvFilter, filter::LevelFilter, layer::SubscriberExt,
    util::SubscriberInitExt,
};

pub fn init_tracing(default_env: &str) {
    let default_directive = default_env
        .parse()
        .unwrap_or_else(|_| LevelFilter::INFO.into());
    let filter = EnvFilter::builder()
        .with_env_var("RUST_LOG")
        .with_default_directive(default_directive)
        .from_env_lossy();

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(filter)
        .try_init();
}
