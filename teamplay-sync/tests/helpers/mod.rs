//! Shared fixtures for teamplay-sync integration tests
//!
//! - `TestTeam`: an engine over an in-memory store with one seeded team
//!   and a hand-driven clock
//! - `drain` / `playback_states`: read what a connection was sent

#![allow(dead_code)]

use chrono::{DateTime, Utc};
use std::sync::Arc;
use teamplay_common::{ManualClock, PlaybackSnapshot, ServerMessage, Song, TeamId, TeamRecord};
use teamplay_sync::db::MemoryTeamStore;
use teamplay_sync::sync::ConnectionHub;
use teamplay_sync::TeamSyncEngine;
use tokio::sync::mpsc::UnboundedReceiver;

pub fn t0() -> DateTime<Utc> {
    DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
        .unwrap()
        .with_timezone(&Utc)
}

pub fn song(title: &str) -> Song {
    Song::new(
        format!("https://example.test/{title}"),
        title,
        "Test Artist",
        "tester",
    )
}

pub struct TestTeam {
    pub engine: Arc<TeamSyncEngine>,
    pub store: Arc<MemoryTeamStore>,
    pub hub: Arc<ConnectionHub>,
    pub clock: Arc<ManualClock>,
    pub team: TeamId,
    pub songs: Vec<Song>,
}

impl TestTeam {
    /// One team with songs titled after `titles`
    pub fn with_songs(titles: &[&str]) -> Self {
        let store = Arc::new(MemoryTeamStore::new());
        let hub = Arc::new(ConnectionHub::new());
        let clock = Arc::new(ManualClock::new(t0()));

        let team = TeamId::new();
        store.insert_team(TeamRecord::new(team, "Test team"));
        let songs: Vec<Song> = titles.iter().map(|t| song(t)).collect();
        for s in &songs {
            store.add_song(team, s.clone());
        }

        let engine = Arc::new(TeamSyncEngine::new(
            store.clone(),
            hub.clone(),
            clock.clone(),
        ));

        Self {
            engine,
            store,
            hub,
            clock,
            team,
            songs,
        }
    }

    pub fn abc() -> Self {
        Self::with_songs(&["A", "B", "C"])
    }

    /// Add another team to the same store
    pub fn add_team(&self, titles: &[&str]) -> TeamId {
        let team = TeamId::new();
        self.store.insert_team(TeamRecord::new(team, "Other team"));
        for title in titles {
            self.store.add_song(team, song(title));
        }
        team
    }

    /// Register a connection and join the team, discarding the catch-up
    pub async fn member(&self) -> (teamplay_common::ConnectionId, UnboundedReceiver<ServerMessage>) {
        let (conn, mut rx) = self.hub.register();
        self.engine.join_team(conn, self.team).await.unwrap();
        drain(&mut rx);
        (conn, rx)
    }
}

/// Everything queued for a connection so far
pub fn drain(rx: &mut UnboundedReceiver<ServerMessage>) -> Vec<ServerMessage> {
    let mut messages = Vec::new();
    while let Ok(message) = rx.try_recv() {
        messages.push(message);
    }
    messages
}

/// Only the playback snapshots among `messages`
pub fn playback_states(messages: &[ServerMessage]) -> Vec<PlaybackSnapshot> {
    messages
        .iter()
        .filter_map(|m| match m {
            ServerMessage::PlaybackState(s) => Some(s.clone()),
            _ => None,
        })
        .collect()
}
