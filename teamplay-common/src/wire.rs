//! Wire types for the real-time channel
//!
//! Clients send [`ClientCommand`] frames and receive [`ServerMessage`] pushes,
//! both as JSON. Team ids arrive as plain strings so that an unparsable id
//! can be reported as a malformed command rather than a decode failure of the
//! whole frame.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::ids::TeamId;
use crate::models::Song;

/// Commands a client may issue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ClientCommand {
    JoinTeam {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    LeaveTeam {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Play {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Pause {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Advance {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Previous {
        #[serde(rename = "teamId")]
        team_id: String,
    },
    Jump {
        #[serde(rename = "teamId")]
        team_id: String,
        index: i64,
    },
}

impl ClientCommand {
    /// Raw team id as sent by the client
    pub fn raw_team_id(&self) -> &str {
        match self {
            ClientCommand::JoinTeam { team_id }
            | ClientCommand::LeaveTeam { team_id }
            | ClientCommand::Play { team_id }
            | ClientCommand::Pause { team_id }
            | ClientCommand::Advance { team_id }
            | ClientCommand::Previous { team_id }
            | ClientCommand::Jump { team_id, .. } => team_id,
        }
    }

    /// Parse the team id carried by this command
    pub fn team_id(&self) -> Result<TeamId> {
        let raw = self.raw_team_id();
        raw.parse()
            .map_err(|_| Error::InvalidInput(format!("unparsable team id: {raw:?}")))
    }

    pub fn name(&self) -> &'static str {
        match self {
            ClientCommand::JoinTeam { .. } => "JoinTeam",
            ClientCommand::LeaveTeam { .. } => "LeaveTeam",
            ClientCommand::Play { .. } => "Play",
            ClientCommand::Pause { .. } => "Pause",
            ClientCommand::Advance { .. } => "Advance",
            ClientCommand::Previous { .. } => "Previous",
            ClientCommand::Jump { .. } => "Jump",
        }
    }
}

/// Read-only projection of a team's playback clock, derived at send time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackSnapshot {
    pub team_id: TeamId,
    /// Index into the queue's play order, -1 when there is no current song
    pub current_song_index: i64,
    pub is_playing: bool,
    /// Anchor; present only while playing
    pub started_at_utc: Option<DateTime<Utc>>,
    /// Elapsed time accumulated before the anchor
    pub elapsed_seconds: f64,
    /// `elapsed_seconds` plus time since the anchor, evaluated when the
    /// snapshot was taken
    pub effective_elapsed_seconds: f64,
    pub current_song: Option<Song>,
    pub queue_length: usize,
}

/// Error details reported to the issuing connection only
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorPayload {
    /// Stable machine-readable code (e.g. `index_out_of_range`)
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
}

/// Messages pushed to clients
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServerMessage {
    /// Authoritative playback state for a team
    PlaybackState(PlaybackSnapshot),

    /// Queue contents changed
    QueueUpdated {
        #[serde(rename = "teamId")]
        team_id: TeamId,
        songs: Vec<Song>,
    },

    /// Command rejected
    Error(ErrorPayload),

    /// Team was deleted; the channel is closed after this message
    TeamRemoved {
        #[serde(rename = "teamId")]
        team_id: TeamId,
    },
}

impl ServerMessage {
    /// Event name (used as the SSE `event:` field)
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::PlaybackState(_) => "PlaybackState",
            ServerMessage::QueueUpdated { .. } => "QueueUpdated",
            ServerMessage::Error(_) => "Error",
            ServerMessage::TeamRemoved { .. } => "TeamRemoved",
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
