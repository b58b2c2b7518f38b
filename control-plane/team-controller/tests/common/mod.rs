use std::future::Future;
use std::time::Duration;

use kube::{Client, api::Api};
use team_controller::config::ControllerConfig;
use team_controller::crd::team::Team;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// DNS-1123 safe numeric suffix for unique names
pub const DIGITS: [char; 10] =
    ['0', '1', '2', '3', '4', '5', '6', '7', '8', '9'];
pub fn uniq(prefix: &str) -> String {
    format!("{prefix}-{}", nanoid::nanoid!(6, &DIGITS))
}

/// Poll `check` once a second until it yields a value or `secs` run out.
pub async fn eventually<T, F, Fut>(secs: u64, what: &str, mut check: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    for _ in 0..secs {
        if let Some(v) = check().await {
            return v;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
    }
    panic!("timed out waiting for {what}");
}

/// Runs the controller in the background; stops it and deletes the Team on
/// drop. The Team's namespace and quota go with it through garbage
/// collection.
pub struct ControllerGuard {
    team: String,
    client: Client,
    token: CancellationToken,
    ctrl: Option<JoinHandle<()>>,
}

impl ControllerGuard {
    pub fn start(team: &str, client: Client) -> Self {
        let token = CancellationToken::new();
        let cfg = ControllerConfig {
            resync_secs: 5,
            ..Default::default()
        };
        let ctrl = {
            let client = client.clone();
            let token = token.clone();
            tokio::spawn(async move {
                let _ = team_controller::runtime::run_all(client, cfg, token)
                    .await;
            })
        };
        Self {
            team: team.to_string(),
            client,
            token,
            ctrl: Some(ctrl),
        }
    }

    /// Cancel and wait for the controller to drain.
    pub async fn stop(&mut self) {
        self.token.cancel();
        if let Some(handle) = self.ctrl.take() {
            let _ = handle.await;
        }
    }
}

impl Drop for ControllerGuard {
    fn drop(&mut self) {
        self.token.cancel();
        if let Some(ref handle) = self.ctrl {
            handle.abort();
        }
        let api: Api<Team> = Api::all(self.client.clone());
        let name = self.team.clone();
        let _ = tokio::spawn(async move {
            let _ = api.delete(&name, &Default::default()).await;
        });
    }
}
