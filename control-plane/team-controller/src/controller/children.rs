//! Desired shape of the objects a Team owns, and the ownership/label checks
//! used to compare them with what is cached.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::{
    Namespace, NamespaceSpec, ResourceQuota, ResourceQuotaSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::api::ObjectMeta;
use kube::{Resource, ResourceExt};

use super::ReconcileError;
use crate::crd::team::Team;

pub const RESOURCE_QUOTA_NAME: &str = "team-default-rq";
pub const OWNER_KIND: &str = "Team";
pub const LABEL_TEAM: &str = "team";
pub const LABEL_ENV: &str = "env";
pub const NAMESPACE_ACTIVE: &str = "Active";

pub fn team_namespace(team: &Team) -> String {
    format!("team-{}-{}", team.spec.name, team.spec.environment)
}

pub fn team_labels(team: &Team) -> BTreeMap<String, String> {
    BTreeMap::from([
        (LABEL_TEAM.to_string(), team.spec.name.clone()),
        (LABEL_ENV.to_string(), team.spec.environment.clone()),
    ])
}

/// Controller reference pointing at `team`. Requires the Team's uid, which
/// every object served by the API server carries.
pub fn owner_reference(team: &Team) -> Result<OwnerReference, ReconcileError> {
    team.controller_owner_ref(&())
        .map(|r| OwnerReference {
            block_owner_deletion: Some(true),
            ..r
        })
        .ok_or_else(|| {
            ReconcileError::Internal(format!(
                "team {:?} has no uid; cannot own children",
                team.name_any()
            ))
        })
}

pub fn new_namespace(team: &Team) -> Result<Namespace, ReconcileError> {
    Ok(Namespace {
        metadata: ObjectMeta {
            name: Some(team_namespace(team)),
            labels: Some(team_labels(team)),
            owner_references: Some(vec![owner_reference(team)?]),
            ..Default::default()
        },
        spec: Some(NamespaceSpec::default()),
        ..Default::default()
    })
}

pub fn new_resource_quota(
    team: &Team,
) -> Result<ResourceQuota, ReconcileError> {
    Ok(ResourceQuota {
        metadata: ObjectMeta {
            name: Some(RESOURCE_QUOTA_NAME.to_string()),
            namespace: Some(team_namespace(team)),
            labels: Some(team_labels(team)),
            owner_references: Some(vec![owner_reference(team)?]),
            ..Default::default()
        },
        spec: Some(team.spec.resource_quota_spec.clone()),
        ..Default::default()
    })
}

/// The controller owner reference of `obj`, if any.
pub fn controller_of<K: Resource>(obj: &K) -> Option<&OwnerReference> {
    obj.owner_references()
        .iter()
        .find(|r| r.controller == Some(true))
}

/// True when `obj` is controlled by this exact Team (matched by uid).
pub fn is_controlled_by<K: Resource>(obj: &K, team: &Team) -> bool {
    match (controller_of(obj), team.uid()) {
        (Some(owner), Some(uid)) => owner.uid == uid,
        _ => false,
    }
}

pub fn is_namespace_active(ns: &Namespace) -> bool {
    ns.status.as_ref().and_then(|s| s.phase.as_deref())
        == Some(NAMESPACE_ACTIVE)
}

/// True when any required label is absent or carries another value.
pub fn missing_labels<K: Resource>(team: &Team, obj: &K) -> bool {
    let labels = obj.labels();
    team_labels(team)
        .iter()
        .any(|(k, v)| labels.get(k) != Some(v))
}

/// Overwrite the required labels on `obj`, keeping every other label.
pub fn merge_labels<K: Resource>(team: &Team, obj: &mut K) {
    obj.labels_mut().extend(team_labels(team));
}

/// Compare quota specs, treating an absent spec as the empty spec.
pub fn quota_spec_matches(
    rq: &ResourceQuota,
    desired: &ResourceQuotaSpec,
) -> bool {
    match rq.spec.as_ref() {
        Some(spec) => spec == desired,
        None => *desired == ResourceQuotaSpec::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::testing::{new_team, quantity_spec};

    #[test]
    fn namespace_name_is_derived_from_name_and_environment() {
        let team = new_team("team1", "dev", ResourceQuotaSpec::default());
        assert_eq!(team_namespace(&team), "team-team1-dev");
    }

    #[test]
    fn new_children_carry_labels_and_controller_reference() {
        let team = new_team("test", "dev", quantity_spec("cpu", "4"));
        let ns = new_namespace(&team).unwrap();
        assert_eq!(ns.name_any(), "team-test-dev");
        assert_eq!(ns.labels(), &team_labels(&team));
        assert!(is_controlled_by(&ns, &team));
        let owner = controller_of(&ns).unwrap();
        assert_eq!(owner.kind, OWNER_KIND);
        assert_eq!(owner.name, "test");
        assert_eq!(owner.block_owner_deletion, Some(true));

        let rq = new_resource_quota(&team).unwrap();
        assert_eq!(rq.name_any(), RESOURCE_QUOTA_NAME);
        assert_eq!(rq.namespace().as_deref(), Some("team-test-dev"));
        assert!(is_controlled_by(&rq, &team));
        assert!(quota_spec_matches(&rq, &team.spec.resource_quota_spec));
    }

    #[test]
    fn children_cannot_be_built_without_uid() {
        let mut team = new_team("test", "dev", ResourceQuotaSpec::default());
        team.metadata.uid = None;
        assert!(matches!(
            new_namespace(&team),
            Err(ReconcileError::Internal(_))
        ));
    }

    #[test]
    fn ownership_is_matched_by_uid() {
        let team = new_team("test", "dev", ResourceQuotaSpec::default());
        let mut other = new_team("test", "dev", ResourceQuotaSpec::default());
        other.metadata.uid = Some("another-uid".into());
        let ns = new_namespace(&other).unwrap();
        assert!(!is_controlled_by(&ns, &team));

        let mut ns = new_namespace(&team).unwrap();
        if let Some(refs) = ns.metadata.owner_references.as_mut() {
            refs[0].controller = None;
        }
        assert!(!is_controlled_by(&ns, &team));
    }

    #[test]
    fn label_merge_is_additive() {
        let team = new_team("test", "dev", ResourceQuotaSpec::default());
        let mut ns = new_namespace(&team).unwrap();
        assert!(!missing_labels(&team, &ns));

        ns.labels_mut().insert("env".into(), "prod".into());
        ns.labels_mut().insert("other".into(), "other".into());
        assert!(missing_labels(&team, &ns));

        merge_labels(&team, &mut ns);
        assert!(!missing_labels(&team, &ns));
        assert_eq!(ns.labels().get("env").map(String::as_str), Some("dev"));
        assert_eq!(ns.labels().get("other").map(String::as_str), Some("other"));
    }

    #[test]
    fn absent_quota_spec_equals_empty_spec() {
        let team = new_team("test", "dev", ResourceQuotaSpec::default());
        let mut rq = new_resource_quota(&team).unwrap();
        rq.spec = None;
        assert!(quota_spec_matches(&rq, &ResourceQuotaSpec::default()));
        assert!(!quota_spec_matches(&rq, &quantity_spec("cpu", "4")));
    }
}
