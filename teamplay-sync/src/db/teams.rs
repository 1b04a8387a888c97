//! SQLite-backed team store

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use std::str::FromStr;
use teamplay_common::{Error, PlaybackRecord, Result, Song, SongId, TeamId, TeamRecord};
use tracing::debug;

use super::TeamStore;

/// Team store over a SQLite pool
#[derive(Debug, Clone)]
pub struct SqliteTeamStore {
    pool: SqlitePool,
}

impl SqliteTeamStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Insert a team with default playback fields
    pub async fn create_team(&self, team_id: TeamId, name: &str) -> Result<()> {
        sqlx::query("INSERT INTO teams (guid, name) VALUES (?, ?)")
            .bind(team_id.to_string())
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Append a song at the end of the team's queue; returns its position
    pub async fn add_song(&self, team_id: TeamId, song: &Song) -> Result<i64> {
        let position: i64 = sqlx::query_scalar(
            "SELECT COALESCE(MAX(position) + 1, 0) FROM songs WHERE team_guid = ?",
        )
        .bind(team_id.to_string())
        .fetch_one(&self.pool)
        .await?;

        sqlx::query(
            r#"
            INSERT INTO songs
                (guid, team_guid, link, title, artist, rating, uploaded_by, inserted_at, position)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(song.id.to_string())
        .bind(team_id.to_string())
        .bind(&song.link)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(song.rating)
        .bind(&song.uploaded_by)
        .bind(song.inserted_at)
        .bind(position)
        .execute(&self.pool)
        .await?;

        Ok(position)
    }

    /// Delete a song; returns whether it existed
    pub async fn delete_song(&self, song_id: SongId) -> Result<bool> {
        let result = sqlx::query("DELETE FROM songs WHERE guid = ?")
            .bind(song_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn load_songs(&self, team_id: TeamId) -> Result<Vec<Song>> {
        let rows = sqlx::query(
            r#"
            SELECT guid, link, title, artist, rating, uploaded_by, inserted_at, position
            FROM songs
            WHERE team_guid = ?
            ORDER BY position, inserted_at
            "#,
        )
        .bind(team_id.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(song_from_row).collect()
    }
}

fn song_from_row(row: &SqliteRow) -> Result<Song> {
    let guid: String = row.get("guid");
    let id = SongId::from_str(&guid)
        .map_err(|_| Error::Internal(format!("Invalid song guid in database: {guid}")))?;

    Ok(Song {
        id,
        link: row.get("link"),
        title: row.get("title"),
        artist: row.get("artist"),
        rating: row.get("rating"),
        uploaded_by: row.get("uploaded_by"),
        inserted_at: row.get::<DateTime<Utc>, _>("inserted_at"),
        position: row.get("position"),
    })
}

#[async_trait]
impl TeamStore for SqliteTeamStore {
    async fn get_team(&self, team_id: TeamId) -> Result<Option<TeamRecord>> {
        let row = sqlx::query(
            r#"
            SELECT name, current_song_index, is_playing, started_at_utc, elapsed_seconds
            FROM teams
            WHERE guid = ?
            "#,
        )
        .bind(team_id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let mut team = TeamRecord::new(team_id, row.get::<String, _>("name"));
        team.playback = PlaybackRecord {
            current_song_index: row.get("current_song_index"),
            is_playing: row.get("is_playing"),
            started_at_utc: row.get::<Option<DateTime<Utc>>, _>("started_at_utc"),
            elapsed_seconds: row.get("elapsed_seconds"),
        };
        team.songs = self.load_songs(team_id).await?;

        debug!(team_id = %team_id, songs = team.songs.len(), "Loaded team");
        Ok(Some(team))
    }

    async fn update_team_playback(&self, team_id: TeamId, playback: &PlaybackRecord) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE teams
            SET current_song_index = ?, is_playing = ?, started_at_utc = ?, elapsed_seconds = ?
            WHERE guid = ?
            "#,
        )
        .bind(playback.current_song_index)
        .bind(playback.is_playing)
        .bind(playback.started_at_utc)
        .bind(playback.elapsed_seconds)
        .bind(team_id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::NotFound(format!("team {team_id}")));
        }
        Ok(())
    }

    async fn save_song(&self, team_id: TeamId, song: &Song) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO songs
                (guid, team_guid, link, title, artist, rating, uploaded_by, inserted_at, position)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(guid) DO UPDATE SET
                link = excluded.link,
                title = excluded.title,
                artist = excluded.artist,
                rating = excluded.rating,
                uploaded_by = excluded.uploaded_by,
                position = excluded.position
            "#,
        )
        .bind(song.id.to_string())
        .bind(team_id.to_string())
        .bind(&song.link)
        .bind(&song.title)
        .bind(&song.artist)
        .bind(song.rating)
        .bind(&song.uploaded_by)
        .bind(song.inserted_at)
        .bind(song.position)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_queued_song(&self, team_id: TeamId, song_id: SongId) -> Result<()> {
        sqlx::query("DELETE FROM songs WHERE guid = ? AND team_guid = ?")
            .bind(song_id.to_string())
            .bind(team_id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn setup_store() -> SqliteTeamStore {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        init_schema(&pool).await.unwrap();
        SqliteTeamStore::new(pool)
    }

    fn song(title: &str) -> Song {
        Song::new(format!("https://example.test/{title}"), title, "artist", "uploader")
    }

    #[tokio::test]
    async fn test_unknown_team_is_none() {
        let store = setup_store().await;
        assert!(store.get_team(TeamId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_songs_come_back_in_queue_order() {
        let store = setup_store().await;
        let team = TeamId::new();
        store.create_team(team, "Night shift").await.unwrap();

        let (a, b, c) = (song("a"), song("b"), song("c"));
        assert_eq!(store.add_song(team, &a).await.unwrap(), 0);
        assert_eq!(store.add_song(team, &b).await.unwrap(), 1);
        assert_eq!(store.add_song(team, &c).await.unwrap(), 2);

        let record = store.get_team(team).await.unwrap().unwrap();
        assert_eq!(record.name, "Night shift");
        let ids: Vec<SongId> = record.songs.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![a.id, b.id, c.id]);
        assert_eq!(record.playback, PlaybackRecord::default());
    }

    #[tokio::test]
    async fn test_playback_fields_round_trip() {
        let store = setup_store().await;
        let team = TeamId::new();
        store.create_team(team, "Day shift").await.unwrap();

        let started = DateTime::parse_from_rfc3339("2026-03-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let playback = PlaybackRecord {
            current_song_index: 2,
            is_playing: true,
            started_at_utc: Some(started),
            elapsed_seconds: 12.5,
        };
        store.update_team_playback(team, &playback).await.unwrap();

        let record = store.get_team(team).await.unwrap().unwrap();
        assert_eq!(record.playback, playback);
    }

    #[tokio::test]
    async fn test_update_unknown_team_fails() {
        let store = setup_store().await;
        let err = store
            .update_team_playback(TeamId::new(), &PlaybackRecord::default())
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_delete_song() {
        let store = setup_store().await;
        let team = TeamId::new();
        store.create_team(team, "Ops").await.unwrap();
        let a = song("a");
        store.add_song(team, &a).await.unwrap();

        assert!(store.delete_song(a.id).await.unwrap());
        assert!(!store.delete_song(a.id).await.unwrap());
        assert!(store.get_team(team).await.unwrap().unwrap().songs.is_empty());
    }

    #[tokio::test]
    async fn test_save_song_inserts_then_moves() {
        let store = setup_store().await;
        let team = TeamId::new();
        store.create_team(team, "Ops").await.unwrap();
        let a = song("a");
        store.add_song(team, &a).await.unwrap();

        let mut z = song("z");
        z.position = 0;
        let mut a_moved = a.clone();
        a_moved.position = 1;
        a_moved.rating = 4;
        store.save_song(team, &z).await.unwrap();
        store.save_song(team, &a_moved).await.unwrap();

        let songs = store.get_team(team).await.unwrap().unwrap().songs;
        let ids: Vec<SongId> = songs.iter().map(|s| s.id).collect();
        assert_eq!(ids, vec![z.id, a.id]);
        assert_eq!(songs[1].rating, 4);

        store.delete_queued_song(team, z.id).await.unwrap();
        store.delete_queued_song(team, z.id).await.unwrap();
        assert_eq!(store.get_team(team).await.unwrap().unwrap().songs.len(), 1);
    }

    #[tokio::test]
    async fn test_save_song_for_unknown_team_fails() {
        let store = setup_store().await;
        assert!(store.save_song(TeamId::new(), &song("a")).await.is_err());
    }
}
