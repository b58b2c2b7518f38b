use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

/// Install the shutdown handlers and return the token they cancel.
///
/// The first Ctrl+C or SIGTERM cancels the token so the controller can drain.
/// A second one exits the process immediately with status 1.
pub fn shutdown_token() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        #[cfg(unix)]
        let mut terminate = match tokio::signal::unix::signal(
            tokio::signal::unix::SignalKind::terminate(),
        ) {
            Ok(s) => Some(s),
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                None
            }
        };

        for round in 0..2 {
            #[cfg(unix)]
            let terminate_recv = async {
                match terminate.as_mut() {
                    Some(s) => {
                        s.recv().await;
                    }
                    None => std::future::pending::<()>().await,
                }
            };
            #[cfg(not(unix))]
            let terminate_recv = std::future::pending::<()>();

            let interrupt = async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "unable to listen for Ctrl+C");
                    std::future::pending::<()>().await;
                }
            };

            tokio::select! {
                _ = interrupt => {}
                _ = terminate_recv => {}
            }

            if round == 0 {
                warn!("shutdown signal received; draining work queue");
                trigger.cancel();
            } else {
                warn!("second shutdown signal received; exiting");
                std::process::exit(1);
            }
        }
    });
    token
}
