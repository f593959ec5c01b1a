use std::time::Duration;

use uuid::Uuid;

use crate::error::ApiError;
use crate::repo::notifications;
use crate::store::AppState;

/// Per-recipient cap on in-app notifications.
const MAX_PER_HOUR: u64 = 100;

#[derive(Debug, Clone)]
pub struct NewNotification {
    pub user_id: Uuid,
    pub notification_type: String,
    pub subject: String,
    pub body: Option<String>,
    pub ref_type: Option<String>,
    pub ref_id: Option<Uuid>,
}

/// Store an in-app notification for `user_id`.
#[tracing::instrument(
    skip(state, notification),
    fields(
        user_id = %notification.user_id,
        notification_type = %notification.notification_type
    ),
    err
)]
pub async fn notify(state: &AppState, notification: &NewNotification) -> Result<Uuid, ApiError> {
    state.rate_limiter.check(
        "notify",
        &notification.user_id.to_string(),
        MAX_PER_HOUR,
        Duration::from_secs(3600),
    )?;

    let reference = notification
        .ref_type
        .as_deref()
        .zip(notification.ref_id);

    let id = notifications::insert(
        &state.pool,
        notification.user_id,
        &notification.notification_type,
        &notification.subject,
        notification.body.as_deref(),
        reference,
    )
    .await?;

    Ok(id)
}

/// Fire-and-forget variant for side effects of other operations.
async fn notify_quietly(state: &AppState, notification: NewNotification) {
    if let Err(e) = notify(state, &notification).await {
        tracing::warn!(error = %e, user_id = %notification.user_id, "notification dropped");
    }
}

/// Tell the assignee their application changed stage.
pub async fn on_application_moved(
    state: &AppState,
    assignee: Uuid,
    application_id: Uuid,
    stage_name: &str,
    actor_name: &str,
) {
    notify_quietly(
        state,
        NewNotification {
            user_id: assignee,
            notification_type: "application_moved".into(),
            subject: format!("Application moved to {stage_name}"),
            body: Some(format!(
                "{actor_name} moved application {application_id} to {stage_name}."
            )),
            ref_type: Some("application".into()),
            ref_id: Some(application_id),
        },
    )
    .await;
}

/// Tell a user they were assigned an application.
pub async fn on_application_assigned(
    state: &AppState,
    assignee: Uuid,
    application_id: Uuid,
    actor_name: &str,
) {
    notify_quietly(
        state,
        NewNotification {
            user_id: assignee,
            notification_type: "application_assigned".into(),
            subject: "Application assigned to you".into(),
            body: Some(format!(
                "{actor_name} assigned application {application_id} to you."
            )),
            ref_type: Some("application".into()),
            ref_id: Some(application_id),
        },
    )
    .await;
}

pub async fn on_message_received(
    state: &AppState,
    recipient: Uuid,
    message_id: Uuid,
    sender_name: &str,
) {
    notify_quietly(
        state,
        NewNotification {
            user_id: recipient,
            notification_type: "message".into(),
            subject: format!("New message from {sender_name}"),
            body: None,
            ref_type: Some("message".into()),
            ref_id: Some(message_id),
        },
    )
    .await;
}

pub async fn on_document_reviewed(
    state: &AppState,
    uploader: Uuid,
    document_id: Uuid,
    status: &str,
) {
    notify_quietly(
        state,
        NewNotification {
            user_id: uploader,
            notification_type: "document_reviewed".into(),
            subject: format!("Document {status}"),
            body: None,
            ref_type: Some("document".into()),
            ref_id: Some(document_id),
        },
    )
    .await;
}
