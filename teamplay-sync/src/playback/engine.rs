//! Team sync engine
//!
//! The context object tying the queue cache, the per-team playback clocks,
//! the durable store and the broadcaster together. Every mutating operation
//! for a team runs while holding that team's async mutex:
//!
//! 1. the navigator applies the change to the queue and clock
//! 2. the new snapshot is broadcast to the team channel
//! 3. changed playback fields, and song rows touched by a queue edit, are
//!    handed to the write-behind writer
//!
//! Store reads (initialization, refresh) happen before the mutex is taken.
//! A refresh result is dropped if a newer refresh or a queue edit was
//! committed while it was being fetched. Teams never share a mutex, so
//! commands for different teams run in parallel.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use teamplay_common::{
    ClientCommand, Clock, ConnectionId, PlaybackSnapshot, ServerMessage, Song, SongId, TeamId,
    TeamRecord,
};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::clock::PlaybackClock;
use super::navigator::{Change, QueueNavigator};
use super::writer::{PlaybackWriter, SongDelta};
use crate::db::TeamStore;
use crate::error::{Error, Result};
use crate::queue::{QueueCache, SongQueue};
use crate::sync::{ChannelTransport, SyncBroadcaster};

/// Result of a team command
#[derive(Debug, Clone, PartialEq)]
pub struct CommandOutcome {
    /// Authoritative state after the command
    pub snapshot: PlaybackSnapshot,
    /// False for race no-ops (double play, previous at the first song, ...)
    pub changed: bool,
}

/// Counters ordering refreshes against each other and against queue edits
#[derive(Debug, Default)]
struct QueueMarks {
    edits: u64,
    refresh_issued: u64,
    refresh_applied: u64,
}

/// State guarded by a team's mutex
struct TeamState {
    clock: PlaybackClock,
    marks: QueueMarks,
    removed: bool,
}

/// Whether a queue change made by an operation is written to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueueWrite {
    Persist,
    Skip,
}

struct TeamSession {
    queue: Arc<SongQueue>,
    state: Mutex<TeamState>,
}

pub struct TeamSyncEngine {
    queues: QueueCache,
    sessions: RwLock<HashMap<TeamId, Arc<TeamSession>>>,
    store: Arc<dyn TeamStore>,
    broadcaster: SyncBroadcaster,
    writer: PlaybackWriter,
    clock: Arc<dyn Clock>,
}

fn store_error(e: teamplay_common::Error) -> Error {
    Error::Store(e.to_string())
}

impl TeamSyncEngine {
    /// Build an engine; spawns the write-behind task on the current runtime
    pub fn new(
        store: Arc<dyn TeamStore>,
        transport: Arc<dyn ChannelTransport>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            queues: QueueCache::new(),
            sessions: RwLock::new(HashMap::new()),
            writer: PlaybackWriter::spawn(Arc::clone(&store)),
            store,
            broadcaster: SyncBroadcaster::new(transport),
            clock,
        }
    }

    pub fn broadcaster(&self) -> &SyncBroadcaster {
        &self.broadcaster
    }

    pub fn is_initialized(&self, team_id: TeamId) -> bool {
        self.session_if_loaded(team_id).is_some()
    }

    /// Teams with a live session
    pub fn team_ids(&self) -> Vec<TeamId> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .keys()
            .copied()
            .collect()
    }

    fn session_if_loaded(&self, team_id: TeamId) -> Option<Arc<TeamSession>> {
        self.sessions
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .get(&team_id)
            .cloned()
    }

    /// Load a team from the store the first time it is accessed
    ///
    /// Returns true if this call populated the queue. Later calls, and a
    /// call that loses a race with a concurrent initializer, leave the live
    /// state untouched and return false.
    pub async fn initialize_queue(&self, team_id: TeamId) -> Result<bool> {
        if self.is_initialized(team_id) {
            return Ok(false);
        }

        let record = self
            .store
            .get_team(team_id)
            .await
            .map_err(store_error)?
            .ok_or(Error::TeamNotFound(team_id))?;

        Ok(self.install_session(record))
    }

    fn install_session(&self, record: TeamRecord) -> bool {
        let team_id = record.id;
        let mut sessions = self
            .sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if sessions.contains_key(&team_id) {
            return false;
        }

        let queue = self.queues.get_or_create(team_id);
        if queue.is_empty() {
            queue.replace_all(record.songs);
        }
        let clock = PlaybackClock::from_record(&record.playback, queue.len(), self.clock.now());

        info!(
            team_id = %team_id,
            songs = queue.len(),
            state = %clock.state(),
            "Initialized team queue"
        );

        sessions.insert(
            team_id,
            Arc::new(TeamSession {
                queue,
                state: Mutex::new(TeamState {
                    clock,
                    marks: QueueMarks::default(),
                    removed: false,
                }),
            }),
        );
        true
    }

    async fn session(&self, team_id: TeamId) -> Result<Arc<TeamSession>> {
        if let Some(session) = self.session_if_loaded(team_id) {
            return Ok(session);
        }
        self.initialize_queue(team_id).await?;
        self.session_if_loaded(team_id)
            .ok_or(Error::TeamNotFound(team_id))
    }

    /// Run `op` in the team's exclusive section and publish the result
    ///
    /// A changed queue is broadcast as `QueueUpdated` before the snapshot.
    /// Changes are persisted after the broadcast: the clock always, the
    /// queue only for [`QueueWrite::Persist`]. The caller gets the snapshot
    /// directly when nothing changed or when it is not in the team channel.
    async fn apply<T, F>(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
        queue_write: QueueWrite,
        op: F,
    ) -> Result<(T, CommandOutcome)>
    where
        F: FnOnce(&mut QueueNavigator<'_>, &mut QueueMarks) -> Result<(T, Change)>,
    {
        let session = self.session(team_id).await?;
        let mut state = session.state.lock().await;
        if state.removed {
            return Err(Error::TeamNotFound(team_id));
        }

        let before = (queue_write == QueueWrite::Persist).then(|| session.queue.snapshot());
        let now = self.clock.now();
        let (value, change) = {
            let TeamState { clock, marks, .. } = &mut *state;
            let mut navigator = QueueNavigator::new(&session.queue, clock, now);
            op(&mut navigator, marks)?
        };
        let snapshot = state.clock.snapshot(team_id, &session.queue, now);

        let mut song_delta = None;
        if change.queue {
            let songs = session.queue.snapshot().to_vec();
            if let Some(before) = before {
                state.marks.edits += 1;
                song_delta = Some(SongDelta::between(&before.to_vec(), &songs));
            }
            self.broadcaster.broadcast_queue(team_id, songs);
        }
        if change.any() {
            self.broadcaster.broadcast_snapshot(&snapshot);
        }
        if let Some(delta) = song_delta {
            self.writer.persist_songs(team_id, delta);
        }
        if change.clock {
            self.writer.persist(team_id, state.clock.to_record());
        }

        if let Some(conn) = reply_to {
            if !change.any() || !self.broadcaster.is_member(conn, team_id) {
                self.broadcaster
                    .send_to(conn, &ServerMessage::PlaybackState(snapshot.clone()));
            }
        }

        Ok((
            value,
            CommandOutcome {
                snapshot,
                changed: change.any(),
            },
        ))
    }

    async fn apply_change<F>(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
        op: F,
    ) -> Result<CommandOutcome>
    where
        F: FnOnce(&mut QueueNavigator<'_>) -> Result<Change>,
    {
        let (_, outcome) = self
            .apply(team_id, reply_to, QueueWrite::Skip, |navigator, _| {
                Ok(((), op(navigator)?))
            })
            .await?;
        Ok(outcome)
    }

    /// Like `apply_change`, and the edited song rows are written to the store
    async fn edit_queue<F>(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
        op: F,
    ) -> Result<CommandOutcome>
    where
        F: FnOnce(&mut QueueNavigator<'_>) -> Result<Change>,
    {
        let (_, outcome) = self
            .apply(team_id, reply_to, QueueWrite::Persist, |navigator, _| {
                Ok(((), op(navigator)?))
            })
            .await?;
        Ok(outcome)
    }

    pub async fn play(&self, team_id: TeamId, reply_to: Option<ConnectionId>) -> Result<CommandOutcome> {
        self.apply_change(team_id, reply_to, |n| Ok(n.play())).await
    }

    pub async fn pause(&self, team_id: TeamId, reply_to: Option<ConnectionId>) -> Result<CommandOutcome> {
        self.apply_change(team_id, reply_to, |n| Ok(n.pause())).await
    }

    pub async fn advance_to_next(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.apply_change(team_id, reply_to, |n| Ok(n.advance_to_next()))
            .await
    }

    pub async fn go_to_previous(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.apply_change(team_id, reply_to, |n| Ok(n.go_to_previous()))
            .await
    }

    pub async fn jump_to(
        &self,
        team_id: TeamId,
        index: i64,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.apply_change(team_id, reply_to, |n| n.jump_to(index)).await
    }

    /// Reconcile the cached queue with the store
    ///
    /// Pending writes are re-submitted and queued writes drained first, so
    /// the store reflects every edit committed before the refresh. The fetch
    /// happens outside the team lock. A store failure leaves the in-memory
    /// state as it is and is reported to the caller only.
    ///
    /// Song changes the store still lacks (failed writes) are laid over the
    /// fetched queue. A fetch overtaken by a newer refresh, or by a queue
    /// edit, is dropped and the current state returned unchanged.
    pub async fn refresh_queue(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        if self.initialize_queue(team_id).await? {
            // Freshly loaded, nothing to reconcile against
            return self.apply_change(team_id, reply_to, |_| Ok(Change::none())).await;
        }

        let session = self.session(team_id).await?;
        let (ticket, edits_seen) = {
            let mut state = session.state.lock().await;
            if state.removed {
                return Err(Error::TeamNotFound(team_id));
            }
            state.marks.refresh_issued += 1;
            (state.marks.refresh_issued, state.marks.edits)
        };

        self.writer.retry(team_id);
        self.writer.flush().await;

        let record = match self.store.get_team(team_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return Err(Error::TeamNotFound(team_id)),
            Err(e) => {
                warn!(team_id = %team_id, error = %e, "Queue refresh failed, keeping in-memory queue");
                return Err(store_error(e));
            }
        };

        let (_, outcome) = self
            .apply(team_id, reply_to, QueueWrite::Skip, |n, marks| {
                if ticket < marks.refresh_applied || marks.edits != edits_seen {
                    debug!(team_id = %team_id, ticket, "Dropping stale queue refresh");
                    return Ok(((), Change::none()));
                }
                marks.refresh_applied = ticket;

                let mut songs = record.songs;
                if let Some(unwritten) = self.writer.pending_songs(team_id) {
                    unwritten.apply_to(&mut songs);
                }
                Ok(((), n.reconcile(songs)))
            })
            .await?;
        debug!(team_id = %team_id, changed = outcome.changed, "Refreshed team queue");
        Ok(outcome)
    }

    pub async fn enqueue_song(
        &self,
        team_id: TeamId,
        song: Song,
        at_front: bool,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.edit_queue(team_id, reply_to, |n| n.enqueue(song, at_front))
            .await
    }

    /// Remove and return the head of the queue
    pub async fn dequeue_song(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
    ) -> Result<(Option<Song>, CommandOutcome)> {
        self.apply(team_id, reply_to, QueueWrite::Persist, |n, _| Ok(n.dequeue()))
            .await
    }

    pub async fn remove_song(
        &self,
        team_id: TeamId,
        song_id: SongId,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.edit_queue(team_id, reply_to, |n| Ok(n.remove(song_id)))
            .await
    }

    pub async fn update_song(
        &self,
        team_id: TeamId,
        song_id: SongId,
        song: Song,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.edit_queue(team_id, reply_to, |n| Ok(n.update_song(song_id, song)))
            .await
    }

    pub async fn clear_queue(
        &self,
        team_id: TeamId,
        reply_to: Option<ConnectionId>,
    ) -> Result<CommandOutcome> {
        self.edit_queue(team_id, reply_to, |n| Ok(n.clear())).await
    }

    /// Current snapshot, read under the team lock
    pub async fn snapshot(&self, team_id: TeamId) -> Result<PlaybackSnapshot> {
        let session = self.session(team_id).await?;
        let state = session.state.lock().await;
        if state.removed {
            return Err(Error::TeamNotFound(team_id));
        }
        Ok(state.clock.snapshot(team_id, &session.queue, self.clock.now()))
    }

    pub async fn effective_elapsed(&self, team_id: TeamId) -> Result<f64> {
        Ok(self.snapshot(team_id).await?.effective_elapsed_seconds)
    }

    /// Songs in play order
    pub async fn queue_songs(&self, team_id: TeamId) -> Result<Vec<Song>> {
        let session = self.session(team_id).await?;
        let state = session.state.lock().await;
        if state.removed {
            return Err(Error::TeamNotFound(team_id));
        }
        Ok(session.queue.snapshot().to_vec())
    }

    /// Forget a deleted team
    ///
    /// Members receive a final `TeamRemoved`; the channel, cached queue and
    /// clock are dropped. Returns false if the team was not loaded.
    pub async fn invalidate_team(&self, team_id: TeamId) -> bool {
        let Some(session) = self.session_if_loaded(team_id) else {
            return self.queues.invalidate(team_id);
        };

        let mut state = session.state.lock().await;
        if state.removed {
            return false;
        }
        state.removed = true;

        self.broadcaster.close_team(team_id);
        self.sessions
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .remove(&team_id);
        self.queues.invalidate(team_id);
        self.writer.discard(team_id);

        info!(team_id = %team_id, "Invalidated team");
        true
    }

    /// Add `conn` to the team channel and send it the catch-up state
    ///
    /// The catch-up (queue, then snapshot) is sent under the team lock, so
    /// no broadcast committed after it can overtake it.
    pub async fn join_team(&self, conn: ConnectionId, team_id: TeamId) -> Result<PlaybackSnapshot> {
        let session = self.session(team_id).await?;
        let state = session.state.lock().await;
        if state.removed {
            return Err(Error::TeamNotFound(team_id));
        }

        let snapshot = state.clock.snapshot(team_id, &session.queue, self.clock.now());
        let catch_up = [
            ServerMessage::QueueUpdated {
                team_id,
                songs: session.queue.snapshot().to_vec(),
            },
            ServerMessage::PlaybackState(snapshot.clone()),
        ];
        self.broadcaster.join(conn, team_id, &catch_up);
        Ok(snapshot)
    }

    /// Leave the team channel; no broadcast
    pub fn leave_team(&self, conn: ConnectionId, team_id: TeamId) -> bool {
        self.broadcaster.leave(conn, team_id)
    }

    /// Leave every team channel `conn` joined
    pub fn disconnect(&self, conn: ConnectionId) -> Vec<TeamId> {
        self.broadcaster.disconnect(conn)
    }

    /// Execute a client command on behalf of `conn`
    ///
    /// Errors are sent to `conn` only, then returned.
    pub async fn handle_command(&self, conn: ConnectionId, command: ClientCommand) -> Result<()> {
        let result = self.execute(conn, &command).await;
        if let Err(e) = &result {
            debug!(connection = %conn, command = command.name(), error = %e, "Command rejected");
            self.broadcaster
                .send_error(conn, e.to_payload(Some(command.name())));
        }
        result
    }

    async fn execute(&self, conn: ConnectionId, command: &ClientCommand) -> Result<()> {
        let team_id = command.team_id()?;
        let reply_to = Some(conn);

        match command {
            ClientCommand::JoinTeam { .. } => {
                self.join_team(conn, team_id).await?;
            }
            ClientCommand::LeaveTeam { .. } => {
                self.leave_team(conn, team_id);
            }
            ClientCommand::Play { .. } => {
                self.play(team_id, reply_to).await?;
            }
            ClientCommand::Pause { .. } => {
                self.pause(team_id, reply_to).await?;
            }
            ClientCommand::Advance { .. } => {
                self.advance_to_next(team_id, reply_to).await?;
            }
            ClientCommand::Previous { .. } => {
                self.go_to_previous(team_id, reply_to).await?;
            }
            ClientCommand::Jump { index, .. } => {
                self.jump_to(team_id, *index, reply_to).await?;
            }
        }
        Ok(())
    }

    /// Refresh every loaded team; returns how many refreshed cleanly
    pub async fn refresh_all(&self) -> usize {
        let mut refreshed = 0;
        for team_id in self.team_ids() {
            match self.refresh_queue(team_id, None).await {
                Ok(_) => refreshed += 1,
                Err(e) => warn!(team_id = %team_id, error = %e, "Periodic refresh failed"),
            }
        }
        refreshed
    }

    /// Periodically reconcile all loaded teams with the store
    pub fn spawn_reconciler(engine: Arc<Self>, every: Duration) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(every);
            // First tick completes immediately
            interval.tick().await;
            loop {
                interval.tick().await;
                let refreshed = engine.refresh_all().await;
                debug!(refreshed, "Periodic queue reconciliation done");
            }
        })
    }

    /// Wait for queued writes to be attempted
    pub async fn flush_writes(&self) {
        self.writer.flush().await;
    }

    pub fn has_pending_write(&self, team_id: TeamId) -> bool {
        self.writer.is_pending(team_id)
    }
}
