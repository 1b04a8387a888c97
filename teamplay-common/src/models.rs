//! Song and team records
//!
//! These are the shapes exchanged with the durable store. The in-memory
//! engine owns its own copies; nothing here carries behavior beyond
//! small conveniences.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{SongId, TeamId};

/// A song in a team's queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Song {
    pub id: SongId,
    /// Source link (e.g. a video URL); never fetched by the engine
    pub link: String,
    pub title: String,
    pub artist: String,
    pub rating: i32,
    /// Identity of the uploading user
    pub uploaded_by: String,
    pub inserted_at: DateTime<Utc>,
    /// Queue position as stored; the in-memory order is authoritative once loaded
    pub position: i64,
}

impl Song {
    /// Build a song with a fresh id, zero rating and the current time
    pub fn new(
        link: impl Into<String>,
        title: impl Into<String>,
        artist: impl Into<String>,
        uploaded_by: impl Into<String>,
    ) -> Self {
        Self {
            id: SongId::new(),
            link: link.into(),
            title: title.into(),
            artist: artist.into(),
            rating: 0,
            uploaded_by: uploaded_by.into(),
            inserted_at: Utc::now(),
            position: 0,
        }
    }
}

/// Persisted playback fields of a team
///
/// `current_song_index` uses -1 for "no current song", matching the
/// durable column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRecord {
    pub current_song_index: i64,
    pub is_playing: bool,
    pub started_at_utc: Option<DateTime<Utc>>,
    pub elapsed_seconds: f64,
}

impl Default for PlaybackRecord {
    fn default() -> Self {
        Self {
            current_song_index: -1,
            is_playing: false,
            started_at_utc: None,
            elapsed_seconds: 0.0,
        }
    }
}

/// A team as returned by the durable store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamRecord {
    pub id: TeamId,
    pub name: String,
    #[serde(flatten)]
    pub playback: PlaybackRecord,
    /// Songs in play order
    pub songs: Vec<Song>,
}

impl TeamRecord {
    pub fn new(id: TeamId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            playback: PlaybackRecord::default(),
            songs: Vec::new(),
        }
    }
}
