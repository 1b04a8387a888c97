//! Durable store access
//!
//! The engine reads teams (queue plus persisted playback fields) and writes
//! back the playback fields and the song rows touched by its own queue
//! edits. Creating and deleting teams is owned by the surrounding CRUD
//! layer; the seeding helpers on the concrete stores exist for startup and
//! tests.

pub mod init;
pub mod memory;
pub mod teams;

use async_trait::async_trait;
use teamplay_common::{PlaybackRecord, Result, Song, SongId, TeamId, TeamRecord};

pub use init::{init_database, init_schema};
pub use memory::MemoryTeamStore;
pub use teams::SqliteTeamStore;

/// Durable team store
#[async_trait]
pub trait TeamStore: Send + Sync {
    /// Fetch a team with its queue in order; `None` if it does not exist
    async fn get_team(&self, team_id: TeamId) -> Result<Option<TeamRecord>>;

    /// Overwrite the persisted playback fields of a team
    async fn update_team_playback(&self, team_id: TeamId, playback: &PlaybackRecord) -> Result<()>;

    /// Insert a song into the team's queue, or overwrite it (position included)
    async fn save_song(&self, team_id: TeamId, song: &Song) -> Result<()>;

    /// Delete a song from the team's queue; a missing song is not an error
    async fn delete_queued_song(&self, team_id: TeamId, song_id: SongId) -> Result<()>;
}
