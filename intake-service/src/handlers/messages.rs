use axum::{
    extract::State,
    http::{header, HeaderMap, StatusCode},
    Json,
};

use crate::models::Activity;
use crate::AppState;

/// Handle an inbound chat activity
///
/// When an app id is configured the channel token is checked first and any
/// failure is a 401. Message activities are accepted immediately and
/// processed on a detached task; the poll loop outlives this request.
pub async fn receive_activity(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(activity): Json<Activity>,
) -> StatusCode {
    if let Some(auth) = &state.auth {
        let authorization = headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok());
        if let Err(e) = auth.authenticate(authorization, &activity).await {
            tracing::warn!("Rejected inbound activity: {}", e);
            return StatusCode::UNAUTHORIZED;
        }
    }

    if !activity.is_message() {
        tracing::debug!("Ignoring {} activity", activity.activity_type);
        return StatusCode::OK;
    }

    tracing::info!(
        conversation = ?activity.conversation_id(),
        attachments = activity.attachments.len(),
        "Received message activity"
    );

    let flow = state.flow.clone();
    tokio::spawn(async move {
        flow.handle_message(activity).await;
    });

    StatusCode::ACCEPTED
}
