//! REST handlers
//!
//! Commands issued over REST go through the same engine path as WebSocket
//! commands: the change is broadcast to the team channel and the resulting
//! snapshot is also returned in the response body.

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use teamplay_common::{PlaybackSnapshot, Song, TeamId};
use tracing::info;

use crate::api::server::AppContext;
use crate::error::{Error, Result};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: String,
    module: String,
    version: String,
    connections: usize,
    teams: usize,
}

#[derive(Debug, Deserialize)]
pub struct JumpRequest {
    pub index: i64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteTeamResponse {
    team_id: TeamId,
    removed: bool,
}

pub(crate) fn parse_team_id(raw: &str) -> Result<TeamId> {
    raw.parse()
        .map_err(|_| Error::MalformedCommand(format!("unparsable team id: {raw:?}")))
}

/// GET /health
pub async fn health(State(ctx): State<AppContext>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        module: "teamplay-sync".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        connections: ctx.hub.connection_count(),
        teams: ctx.engine.team_ids().len(),
    })
}

/// GET /teams/:team_id/state
pub async fn get_state(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    Ok(Json(ctx.engine.snapshot(team_id).await?))
}

/// GET /teams/:team_id/queue
pub async fn get_queue(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<Vec<Song>>> {
    let team_id = parse_team_id(&team_id)?;
    Ok(Json(ctx.engine.queue_songs(team_id).await?))
}

/// POST /teams/:team_id/play
pub async fn play(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.play(team_id, None).await?;
    Ok(Json(outcome.snapshot))
}

/// POST /teams/:team_id/pause
pub async fn pause(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.pause(team_id, None).await?;
    Ok(Json(outcome.snapshot))
}

/// POST /teams/:team_id/next
pub async fn next(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.advance_to_next(team_id, None).await?;
    Ok(Json(outcome.snapshot))
}

/// POST /teams/:team_id/previous
pub async fn previous(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.go_to_previous(team_id, None).await?;
    Ok(Json(outcome.snapshot))
}

/// POST /teams/:team_id/jump
pub async fn jump(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
    Json(req): Json<JumpRequest>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.jump_to(team_id, req.index, None).await?;
    Ok(Json(outcome.snapshot))
}

/// POST /teams/:team_id/refresh
pub async fn refresh(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<PlaybackSnapshot>> {
    let team_id = parse_team_id(&team_id)?;
    let outcome = ctx.engine.refresh_queue(team_id, None).await?;
    Ok(Json(outcome.snapshot))
}

/// DELETE /teams/:team_id
///
/// Drops the cached state of a team deleted from the store.
pub async fn delete_team(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Json<DeleteTeamResponse>> {
    let team_id = parse_team_id(&team_id)?;
    let removed = ctx.engine.invalidate_team(team_id).await;
    info!(team_id = %team_id, removed, "Team invalidated via API");
    Ok(Json(DeleteTeamResponse { team_id, removed }))
}
