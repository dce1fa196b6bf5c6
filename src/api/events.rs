use axum::{body::Bytes, extract::State, Json};

use crate::{
    error::Result,
    models::{CreateEventRequest, CreateEventResponse},
};

use super::{parse_object_body, AppState};

/// POST /events
pub async fn create_event(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Json<CreateEventResponse>> {
    let req: CreateEventRequest = parse_object_body(&body)?;
    let event = req.into_new_event()?;

    let stored = state.events.record(event).await?;
    tracing::debug!(
        event_id = stored.id,
        player_id = stored.player_id,
        event_type = %stored.event_type,
        "event recorded"
    );

    Ok(Json(CreateEventResponse {
        id: stored.id,
        created_at: stored.created_at,
    }))
}
