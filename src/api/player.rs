use axum::{
    body::Bytes,
    extract::{Path, RawQuery, State},
    http::HeaderMap,
    Json,
};
use serde_json::json;

use crate::{
    constants::EVENT_TYPE_SYNC,
    error::{AppError, Result},
    models::{Identity, NewEvent, PartialProfile, PlayerResponse, SyncRequest},
};

use super::{
    identity::{resolve_identity, IdentityQuery},
    parse_object_body, AppState,
};

/// POST /player/sync
pub async fn sync_player(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<PlayerResponse>> {
    // Everything that can reject the request runs before the database is touched.
    let req: SyncRequest = parse_object_body(&body)?;
    let query = IdentityQuery::from_raw(query.as_deref());
    let resolved = resolve_identity(&req, &query, &headers, &state.config)?;
    let incoming = PartialProfile::from_request(&req)?;

    let outcome = state
        .db
        .sync_player(
            &resolved.identity,
            resolved.link.as_ref(),
            &incoming,
            state.config.resources_policy,
        )
        .await?;

    let player = outcome.player;
    tracing::debug!(
        player_id = player.id,
        identity = %resolved.identity,
        source = ?resolved.source,
        created = outcome.created,
        "player synced"
    );

    if state.config.record_sync_events {
        state.events.record_detached(NewEvent {
            player_id: player.id,
            event_type: EVENT_TYPE_SYNC.to_string(),
            payload: json!({
                "created": outcome.created,
                "level": player.level,
                "experience": player.experience,
            }),
        });
    }

    Ok(Json(PlayerResponse {
        player: player.into(),
    }))
}

/// GET /player/{identity}
pub async fn get_player(
    State(state): State<AppState>,
    Path(raw_identity): Path<String>,
) -> Result<Json<PlayerResponse>> {
    let identity = Identity::parse(&raw_identity).ok_or(AppError::IdentityRequired)?;

    let player = state
        .db
        .touch_player(&identity, state.config.player_auto_create)
        .await?
        .ok_or_else(|| AppError::NotFound("Player not found".to_string()))?;

    Ok(Json(PlayerResponse {
        player: player.into(),
    }))
}
