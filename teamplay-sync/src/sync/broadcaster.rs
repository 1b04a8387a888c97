//! Team-scoped fan-out
//!
//! Every member of a team's channel, including the connection that issued
//! a command, receives the same message stream. The engine calls the
//! broadcast methods while holding the team's lock, which fixes the order
//! in which a team's snapshots enter the transport.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use teamplay_common::{ConnectionId, ErrorPayload, PlaybackSnapshot, ServerMessage, Song, TeamId};
use tracing::{debug, info};

use super::transport::ChannelTransport;

pub struct SyncBroadcaster {
    transport: Arc<dyn ChannelTransport>,
    memberships: RwLock<HashMap<ConnectionId, HashSet<TeamId>>>,
}

/// Transport group name of a team channel
pub fn group_key(team_id: TeamId) -> String {
    format!("team:{team_id}")
}

impl SyncBroadcaster {
    pub fn new(transport: Arc<dyn ChannelTransport>) -> Self {
        Self {
            transport,
            memberships: RwLock::new(HashMap::new()),
        }
    }

    /// Add `conn` to the team channel, then send it `catch_up`
    ///
    /// Joining twice is harmless; the catch-up is sent again.
    pub fn join(&self, conn: ConnectionId, team_id: TeamId, catch_up: &[ServerMessage]) {
        self.transport.join_group(conn, &group_key(team_id));
        let newly_joined = self
            .memberships
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .entry(conn)
            .or_default()
            .insert(team_id);

        for message in catch_up {
            self.transport.send_to_caller(conn, message);
        }

        if newly_joined {
            info!(connection = %conn, team_id = %team_id, "Joined team channel");
        }
    }

    /// Remove `conn` from the team channel; returns whether it was a member
    pub fn leave(&self, conn: ConnectionId, team_id: TeamId) -> bool {
        self.transport.leave_group(conn, &group_key(team_id));
        let mut memberships = self
            .memberships
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let was_member = memberships
            .get_mut(&conn)
            .is_some_and(|teams| teams.remove(&team_id));
        if memberships.get(&conn).is_some_and(HashSet::is_empty) {
            memberships.remove(&conn);
        }
        if was_member {
            info!(connection = %conn, team_id = %team_id, "Left team channel");
        }
        was_member
    }

    /// Leave every team `conn` joined; returns those teams
    pub fn disconnect(&self, conn: ConnectionId) -> Vec<TeamId> {
        let teams = self
            .memberships
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&conn)
            .unwrap_or_default();
        for team_id in &teams {
            self.transport.leave_group(conn, &group_key(*team_id));
        }
        if !teams.is_empty() {
            debug!(connection = %conn, teams = teams.len(), "Connection left all team channels");
        }
        teams.into_iter().collect()
    }

    pub fn broadcast_snapshot(&self, snapshot: &PlaybackSnapshot) -> usize {
        let team_id = snapshot.team_id;
        let delivered = self
            .transport
            .send_to_group(&group_key(team_id), &ServerMessage::PlaybackState(snapshot.clone()));
        debug!(
            team_id = %team_id,
            index = snapshot.current_song_index,
            playing = snapshot.is_playing,
            delivered,
            "Broadcast playback state"
        );
        delivered
    }

    pub fn broadcast_queue(&self, team_id: TeamId, songs: Vec<Song>) -> usize {
        self.transport.send_to_group(
            &group_key(team_id),
            &ServerMessage::QueueUpdated { team_id, songs },
        )
    }

    pub fn send_to(&self, conn: ConnectionId, message: &ServerMessage) -> bool {
        self.transport.send_to_caller(conn, message)
    }

    pub fn send_error(&self, conn: ConnectionId, payload: ErrorPayload) -> bool {
        self.transport.send_to_caller(conn, &ServerMessage::Error(payload))
    }

    /// Send a final `TeamRemoved` and drop the channel
    pub fn close_team(&self, team_id: TeamId) {
        let group = group_key(team_id);
        self.transport
            .send_to_group(&group, &ServerMessage::TeamRemoved { team_id });
        self.transport.close_group(&group);

        let mut memberships = self
            .memberships
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        for teams in memberships.values_mut() {
            teams.remove(&team_id);
        }
        memberships.retain(|_, teams| !teams.is_empty());
        info!(team_id = %team_id, "Closed team channel");
    }

    pub fn is_member(&self, conn: ConnectionId, team_id: TeamId) -> bool {
        self.memberships
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&conn)
            .is_some_and(|teams| teams.contains(&team_id))
    }

    /// Connections currently in the team channel
    pub fn members(&self, team_id: TeamId) -> Vec<ConnectionId> {
        self.memberships
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|(_, teams)| teams.contains(&team_id))
            .map(|(conn, _)| *conn)
            .collect()
    }
}
