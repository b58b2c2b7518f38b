use kube::ResourceExt;

use super::ReconcileError;
use super::cache::SnapshotCache;
use super::children::{RESOURCE_QUOTA_NAME, is_controlled_by};
use crate::crd::team::{Team, TeamStatus};

/// Derive the observable status of `team` from the children it owns in the
/// cache. Pure: reads the snapshot only.
///
/// Zero owned namespaces leaves the stored status as it is. A quota is
/// reported only when it exists in the owned namespace and is itself owned
/// by the team.
pub fn calculate_status(
    cache: &SnapshotCache,
    team: &Team,
) -> Result<TeamStatus, ReconcileError> {
    let mut owned: Vec<String> = cache
        .namespaces()
        .iter()
        .filter(|ns| is_controlled_by(ns.as_ref(), team))
        .map(|ns| ns.name_any())
        .collect();

    match owned.len() {
        0 => Ok(team.status.clone().unwrap_or_default()),
        1 => {
            let namespace = owned.remove(0);
            let resource_quota = cache
                .resource_quota(&namespace, RESOURCE_QUOTA_NAME)
                .filter(|rq| is_controlled_by(rq.as_ref(), team))
                .map(|_| RESOURCE_QUOTA_NAME.to_string())
                .unwrap_or_default();
            Ok(TeamStatus {
                namespace,
                resource_quota,
            })
        }
        _ => {
            owned.sort();
            Err(ReconcileError::InvariantViolation {
                team: team.name_any(),
                namespaces: owned.join(","),
            })
        }
    }
}
