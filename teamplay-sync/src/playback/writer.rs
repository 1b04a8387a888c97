//! Write-behind persistence of playback fields and queue edits
//!
//! Committed changes are queued here after the in-memory state has already
//! been updated and broadcast. A single task drains the queue, so writes for
//! a team reach the store in commit order. A failed write is logged and kept
//! as the team's pending write; it never rolls back the in-memory state.
//!
//! - a pending playback record is superseded by the next playback write
//! - pending song changes are merged with the next queue edit and written
//!   together
//!
//! [`PlaybackWriter::retry`] re-submits whatever is pending.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use teamplay_common::{PlaybackRecord, Song, SongId, TeamId};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::db::TeamStore;

/// Song rows to write after a queue edit
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SongDelta {
    /// Songs that are new or whose fields (including position) changed
    pub upserts: Vec<Song>,
    /// Songs no longer in the queue
    pub deletes: Vec<SongId>,
}

impl SongDelta {
    /// Rows that turn `before` into `after`
    pub fn between(before: &[Song], after: &[Song]) -> Self {
        let deletes = before
            .iter()
            .filter(|old| !after.iter().any(|s| s.id == old.id))
            .map(|old| old.id)
            .collect();
        let upserts = after
            .iter()
            .filter(|song| !before.contains(song))
            .cloned()
            .collect();
        Self { upserts, deletes }
    }

    pub fn is_empty(&self) -> bool {
        self.upserts.is_empty() && self.deletes.is_empty()
    }

    /// Fold a later delta into this one; the later one wins per song
    pub fn merge(&mut self, later: SongDelta) {
        for id in later.deletes {
            self.upserts.retain(|s| s.id != id);
            if !self.deletes.contains(&id) {
                self.deletes.push(id);
            }
        }
        for song in later.upserts {
            self.deletes.retain(|id| *id != song.id);
            match self.upserts.iter_mut().find(|s| s.id == song.id) {
                Some(existing) => *existing = song,
                None => self.upserts.push(song),
            }
        }
    }

    /// Overlay these unwritten changes on songs read from the store
    pub fn apply_to(&self, songs: &mut Vec<Song>) {
        songs.retain(|s| !self.deletes.contains(&s.id));
        for song in &self.upserts {
            match songs.iter_mut().find(|s| s.id == song.id) {
                Some(existing) => *existing = song.clone(),
                None => songs.push(song.clone()),
            }
        }
        songs.sort_by_key(|s| s.position);
    }
}

enum WriterJob {
    Playback { team_id: TeamId, record: PlaybackRecord },
    Songs { team_id: TeamId, delta: SongDelta },
    Retry(TeamId),
    Discard(TeamId),
    Flush(oneshot::Sender<()>),
}

/// Failed writes of one team
#[derive(Debug, Default)]
struct Pending {
    playback: Option<PlaybackRecord>,
    songs: Option<SongDelta>,
}

impl Pending {
    fn is_empty(&self) -> bool {
        self.playback.is_none() && self.songs.is_none()
    }
}

type PendingWrites = Arc<Mutex<HashMap<TeamId, Pending>>>;

/// Handle to the write-behind task
#[derive(Clone)]
pub struct PlaybackWriter {
    tx: mpsc::UnboundedSender<WriterJob>,
    pending: PendingWrites,
}

impl PlaybackWriter {
    /// Start the writer task on the current tokio runtime
    pub fn spawn(store: Arc<dyn TeamStore>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let pending: PendingWrites = Arc::new(Mutex::new(HashMap::new()));
        tokio::spawn(run_writer(store, rx, Arc::clone(&pending)));
        Self { tx, pending }
    }

    fn send(&self, job: WriterJob) {
        if self.tx.send(job).is_err() {
            warn!("Playback writer stopped, dropping write");
        }
    }

    /// Queue a playback write; returns immediately
    pub fn persist(&self, team_id: TeamId, record: PlaybackRecord) {
        self.send(WriterJob::Playback { team_id, record });
    }

    /// Queue the song rows changed by a queue edit; returns immediately
    pub fn persist_songs(&self, team_id: TeamId, delta: SongDelta) {
        if !delta.is_empty() {
            self.send(WriterJob::Songs { team_id, delta });
        }
    }

    /// Re-submit previously failed writes, if any are pending
    pub fn retry(&self, team_id: TeamId) {
        if self.is_pending(team_id) {
            self.send(WriterJob::Retry(team_id));
        }
    }

    /// Wait until every write queued before this call has been attempted
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterJob::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    /// Whether a write for `team_id` failed and has not been superseded
    pub fn is_pending(&self, team_id: TeamId) -> bool {
        lock(&self.pending).contains_key(&team_id)
    }

    /// Song changes that failed to reach the store
    pub fn pending_songs(&self, team_id: TeamId) -> Option<SongDelta> {
        lock(&self.pending)
            .get(&team_id)
            .and_then(|p| p.songs.clone())
    }

    /// Forget pending writes (team removed)
    ///
    /// Writes already queued for the team are still attempted, but their
    /// failures are dropped once the writer reaches this point.
    pub fn discard(&self, team_id: TeamId) {
        lock(&self.pending).remove(&team_id);
        self.send(WriterJob::Discard(team_id));
    }
}

fn lock(pending: &PendingWrites) -> std::sync::MutexGuard<'_, HashMap<TeamId, Pending>> {
    pending.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

async fn run_writer(
    store: Arc<dyn TeamStore>,
    mut rx: mpsc::UnboundedReceiver<WriterJob>,
    pending: PendingWrites,
) {
    debug!("Playback writer started");

    while let Some(job) = rx.recv().await {
        match job {
            WriterJob::Playback { team_id, record } => {
                write_record(store.as_ref(), &pending, team_id, record).await;
            }
            WriterJob::Songs { team_id, delta } => {
                let mut merged = take_songs(&pending, team_id).unwrap_or_default();
                merged.merge(delta);
                write_songs(store.as_ref(), &pending, team_id, merged).await;
            }
            WriterJob::Retry(team_id) => {
                let record = lock(&pending)
                    .get(&team_id)
                    .and_then(|p| p.playback.clone());
                if let Some(record) = record {
                    info!(team_id = %team_id, "Retrying failed playback write");
                    write_record(store.as_ref(), &pending, team_id, record).await;
                }
                if let Some(delta) = take_songs(&pending, team_id) {
                    info!(team_id = %team_id, "Retrying failed queue write");
                    write_songs(store.as_ref(), &pending, team_id, delta).await;
                }
            }
            WriterJob::Discard(team_id) => {
                if lock(&pending).remove(&team_id).is_some() {
                    debug!(team_id = %team_id, "Dropped failed writes of removed team");
                }
            }
            WriterJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }

    debug!("Playback writer stopped");
}

fn take_songs(pending: &PendingWrites, team_id: TeamId) -> Option<SongDelta> {
    let mut pending = lock(pending);
    let entry = pending.get_mut(&team_id)?;
    let songs = entry.songs.take();
    if entry.is_empty() {
        pending.remove(&team_id);
    }
    songs
}

fn clear_playback(pending: &PendingWrites, team_id: TeamId) {
    let mut pending = lock(pending);
    if let Some(entry) = pending.get_mut(&team_id) {
        entry.playback = None;
        if entry.is_empty() {
            pending.remove(&team_id);
        }
    }
}

async fn write_record(
    store: &dyn TeamStore,
    pending: &PendingWrites,
    team_id: TeamId,
    record: PlaybackRecord,
) {
    match store.update_team_playback(team_id, &record).await {
        Ok(()) => {
            clear_playback(pending, team_id);
            debug!(
                team_id = %team_id,
                index = record.current_song_index,
                playing = record.is_playing,
                "Persisted playback state"
            );
        }
        Err(e) => {
            warn!(team_id = %team_id, error = %e, "Failed to persist playback state, in-memory state kept");
            lock(pending).entry(team_id).or_default().playback = Some(record);
        }
    }
}

async fn write_songs(
    store: &dyn TeamStore,
    pending: &PendingWrites,
    team_id: TeamId,
    delta: SongDelta,
) {
    match store_songs(store, team_id, &delta).await {
        Ok(()) => {
            debug!(
                team_id = %team_id,
                upserts = delta.upserts.len(),
                deletes = delta.deletes.len(),
                "Persisted queue edit"
            );
        }
        Err(e) => {
            warn!(team_id = %team_id, error = %e, "Failed to persist queue edit, in-memory queue kept");
            lock(pending).entry(team_id).or_default().songs = Some(delta);
        }
    }
}

async fn store_songs(
    store: &dyn TeamStore,
    team_id: TeamId,
    delta: &SongDelta,
) -> teamplay_common::Result<()> {
    for song_id in &delta.deletes {
        store.delete_queued_song(team_id, *song_id).await?;
    }
    for song in &delta.upserts {
        store.save_song(team_id, song).await?;
    }
    Ok(())
}
