//! In-process team store
//!
//! Backs tests and embedded use. Reads and writes can be made to fail on
//! demand to exercise the write-behind and refresh error paths.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use teamplay_common::{Error, PlaybackRecord, Result, Song, SongId, TeamId, TeamRecord};

use super::TeamStore;

#[derive(Debug, Default)]
pub struct MemoryTeamStore {
    teams: Mutex<HashMap<TeamId, TeamRecord>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    writes: AtomicUsize,
}

impl MemoryTeamStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn teams(&self) -> std::sync::MutexGuard<'_, HashMap<TeamId, TeamRecord>> {
        self.teams.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert_team(&self, team: TeamRecord) {
        self.teams().insert(team.id, team);
    }

    /// Append a song to an existing team; returns false for unknown teams
    pub fn add_song(&self, team_id: TeamId, mut song: Song) -> bool {
        let mut teams = self.teams();
        let Some(team) = teams.get_mut(&team_id) else {
            return false;
        };
        song.position = team.songs.len() as i64;
        team.songs.push(song);
        true
    }

    pub fn remove_song(&self, team_id: TeamId, song_id: SongId) -> bool {
        let mut teams = self.teams();
        let Some(team) = teams.get_mut(&team_id) else {
            return false;
        };
        let before = team.songs.len();
        team.songs.retain(|s| s.id != song_id);
        for (position, song) in team.songs.iter_mut().enumerate() {
            song.position = position as i64;
        }
        team.songs.len() != before
    }

    /// Current stored copy of a team
    pub fn team(&self, team_id: TeamId) -> Option<TeamRecord> {
        self.teams().get(&team_id).cloned()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_writable(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Internal("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Number of successful playback writes
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TeamStore for MemoryTeamStore {
    async fn get_team(&self, team_id: TeamId) -> Result<Option<TeamRecord>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::Internal("store unavailable".to_string()));
        }
        Ok(self.team(team_id).map(|mut team| {
            team.songs.sort_by_key(|s| (s.position, s.inserted_at));
            team
        }))
    }

    async fn update_team_playback(&self, team_id: TeamId, playback: &PlaybackRecord) -> Result<()> {
        self.check_writable()?;
        let mut teams = self.teams();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")))?;
        team.playback = playback.clone();
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn save_song(&self, team_id: TeamId, song: &Song) -> Result<()> {
        self.check_writable()?;
        let mut teams = self.teams();
        let team = teams
            .get_mut(&team_id)
            .ok_or_else(|| Error::NotFound(format!("team {team_id}")))?;
        match team.songs.iter_mut().find(|s| s.id == song.id) {
            Some(existing) => *existing = song.clone(),
            None => team.songs.push(song.clone()),
        }
        Ok(())
    }

    async fn delete_queued_song(&self, team_id: TeamId, song_id: SongId) -> Result<()> {
        self.check_writable()?;
        if let Some(team) = self.teams().get_mut(&team_id) {
            team.songs.retain(|s| s.id != song_id);
        }
        Ok(())
    }
}
