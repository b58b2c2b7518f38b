use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{Event, EventType, Recorder};
use tracing::warn;

pub const REASON_RESOURCE_EXISTS: &str = "ErrResourceExists";
pub const ACTION_RECONCILE: &str = "Reconcile";

pub fn resource_exists_message(name: &str) -> String {
    format!("Resource {:?} already exists and is not managed by Team", name)
}

pub async fn emit_warning(
    recorder: &Recorder,
    reference: &ObjectReference,
    reason: &str,
    note: String,
) {
    if let Err(e) = recorder
        .publish(
            &Event {
                type_: EventType::Warning,
                reason: reason.into(),
                note: Some(note),
                action: ACTION_RECONCILE.into(),
                secondary: None,
            },
            reference,
        )
        .await
    {
        warn!(error = %e, %reason, "failed to publish event");
    }
}
