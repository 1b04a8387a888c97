//! Per-team SSE stream
//!
//! A read-only member of one team channel: the catch-up state first, then
//! every broadcast for the team. Dropping the stream leaves the channel.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures::stream::Stream;
use std::convert::Infallible;
use std::sync::Arc;
use teamplay_common::ServerMessage;
use tracing::{debug, warn};

use super::handlers::parse_team_id;
use super::ws::ConnectionGuard;
use crate::api::server::AppContext;
use crate::error::Result;

/// GET /teams/:team_id/events
pub async fn team_events(
    State(ctx): State<AppContext>,
    Path(team_id): Path<String>,
) -> Result<Sse<impl Stream<Item = std::result::Result<Event, Infallible>>>> {
    let team_id = parse_team_id(&team_id)?;
    let (conn, mut rx) = ctx.hub.register();
    let guard = ConnectionGuard::new(conn, Arc::clone(&ctx.engine), Arc::clone(&ctx.hub));

    // Guard drop unregisters on failure
    ctx.engine.join_team(conn, team_id).await?;
    debug!(connection = %conn, team_id = %team_id, "SSE client subscribed");

    let stream = async_stream::stream! {
        let _guard = guard;
        while let Some(message) = rx.recv().await {
            let last = matches!(message, ServerMessage::TeamRemoved { .. });
            match Event::default().event(message.kind()).json_data(&message) {
                Ok(event) => yield Ok(event),
                Err(e) => warn!(error = %e, "Failed to serialize SSE event"),
            }
            if last {
                break;
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(ctx.sse_keep_alive)
            .text("keep-alive"),
    ))
}
