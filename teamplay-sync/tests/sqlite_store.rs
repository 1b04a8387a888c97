//! Engine over the SQLite store: persisted playback and queue edits survive
//! a restart

mod helpers;

use std::sync::Arc;
use teamplay_common::{ManualClock, TeamId};
use teamplay_sync::db::{init_database, SqliteTeamStore};
use teamplay_sync::sync::ConnectionHub;
use teamplay_sync::TeamSyncEngine;

async fn open_engine(path: &std::path::Path, clock: Arc<ManualClock>) -> (Arc<TeamSyncEngine>, SqliteTeamStore) {
    let pool = init_database(path).await.unwrap();
    let store = SqliteTeamStore::new(pool);
    let engine = Arc::new(TeamSyncEngine::new(
        Arc::new(store.clone()),
        Arc::new(ConnectionHub::new()),
        clock,
    ));
    (engine, store)
}

#[tokio::test]
async fn test_playing_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teamplay.db");
    let clock = Arc::new(ManualClock::new(helpers::t0()));
    let team = TeamId::new();

    {
        let (engine, store) = open_engine(&path, clock.clone()).await;
        store.create_team(team, "Persistent").await.unwrap();
        for title in ["A", "B", "C"] {
            store.add_song(team, &helpers::song(title)).await.unwrap();
        }

        engine.jump_to(team, 1, None).await.unwrap();
        engine.play(team, None).await.unwrap();
        engine.flush_writes().await;
        store.pool().close().await;
    }

    clock.advance_secs(20.0);
    let (engine, _store) = open_engine(&path, clock.clone()).await;
    let snapshot = engine.snapshot(team).await.unwrap();
    assert_eq!(snapshot.current_song_index, 1);
    assert!(snapshot.is_playing);
    assert_eq!(snapshot.started_at_utc, Some(helpers::t0()));
    assert!((snapshot.effective_elapsed_seconds - 20.0).abs() < 0.01);
}

#[tokio::test]
async fn test_refresh_sees_rows_added_out_of_band() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teamplay.db");
    let clock = Arc::new(ManualClock::new(helpers::t0()));
    let team = TeamId::new();

    let (engine, store) = open_engine(&path, clock).await;
    store.create_team(team, "Live").await.unwrap();
    let first = helpers::song("A");
    store.add_song(team, &first).await.unwrap();

    assert_eq!(engine.snapshot(team).await.unwrap().queue_length, 1);

    store.add_song(team, &helpers::song("B")).await.unwrap();
    assert!(store.delete_song(first.id).await.unwrap());
    let outcome = engine.refresh_queue(team, None).await.unwrap();

    assert_eq!(outcome.snapshot.queue_length, 1);
    assert_eq!(outcome.snapshot.current_song.unwrap().title, "B");
}

#[tokio::test]
async fn test_queue_edits_survive_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("teamplay.db");
    let clock = Arc::new(ManualClock::new(helpers::t0()));
    let team = TeamId::new();
    let songs: Vec<_> = ["A", "B", "C"].iter().map(|t| helpers::song(t)).collect();

    {
        let (engine, store) = open_engine(&path, clock.clone()).await;
        store.create_team(team, "Edited").await.unwrap();
        for song in &songs {
            store.add_song(team, song).await.unwrap();
        }

        engine
            .enqueue_song(team, helpers::song("Z"), true, None)
            .await
            .unwrap();
        engine.remove_song(team, songs[1].id, None).await.unwrap();

        let refreshed = engine.refresh_queue(team, None).await.unwrap();
        assert_eq!(refreshed.snapshot.queue_length, 3);
        engine.flush_writes().await;
        store.pool().close().await;
    }

    let (engine, _store) = open_engine(&path, clock).await;
    let titles: Vec<String> = engine
        .queue_songs(team)
        .await
        .unwrap()
        .into_iter()
        .map(|s| s.title)
        .collect();
    assert_eq!(titles, vec!["Z", "A", "C"]);

    let snapshot = engine.snapshot(team).await.unwrap();
    assert_eq!(snapshot.current_song_index, 1);
    assert_eq!(snapshot.current_song.unwrap().id, songs[0].id);
}
