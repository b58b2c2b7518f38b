use k8s_openapi::api::core::v1::ResourceQuotaSpec;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(
    CustomResource, Deserialize, Serialize, Clone, Debug, JsonSchema, PartialEq,
)]
#[kube(
    group = "aftouh.io",
    version = "v1",
    kind = "Team",
    plural = "teams",
    status = "TeamStatus",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Namespace","type":"string","jsonPath":".status.namespace"}"#,
    printcolumn = r#"{"name":"Quota","type":"string","jsonPath":".status.resourceQuota"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpec {
    /// Team name, used to derive the namespace name and the `team` label
    pub name: String,
    /// Environment (e.g. "dev", "prod"), used for the namespace and `env` label
    pub environment: String,
    #[serde(default)]
    pub description: String,
    /// Limits applied verbatim to the team's ResourceQuota
    #[serde(default)]
    pub resource_quota_spec: ResourceQuotaSpec,
}

#[derive(
    Deserialize, Serialize, Clone, Debug, JsonSchema, Default, PartialEq, Eq,
)]
#[serde(rename_all = "camelCase")]
pub struct TeamStatus {
    /// Name of the namespace owned by this team, empty until one is owned
    #[serde(default)]
    pub namespace: String,
    /// Name of the owned ResourceQuota, empty until it exists and is owned
    #[serde(default)]
    pub resource_quota: String,
}
