//! Playback clock
//!
//! Per-team state machine: `Stopped`, `Paused`, `Playing { started_at }`.
//! The anchor (`started_at`) lives inside the `Playing` variant, so "anchor
//! present iff playing" holds by construction. Effective elapsed time is
//! `elapsed_seconds + (now - started_at)` while playing and `elapsed_seconds`
//! otherwise, and is never negative.
//!
//! The clock never reads the time itself; every transition takes `now` from
//! the engine's single [`Clock`](teamplay_common::Clock).

use chrono::{DateTime, Utc};
use teamplay_common::time::seconds_between;
use teamplay_common::{PlaybackRecord, PlaybackSnapshot, TeamId};
use tracing::warn;

use crate::queue::SongQueue;

/// Clock state
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockState {
    /// No current song, or the end of the queue was reached
    Stopped,
    /// Current song set, position held in `elapsed_seconds`
    Paused,
    /// Current song running since `started_at`
    Playing { started_at: DateTime<Utc> },
}

impl std::fmt::Display for ClockState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClockState::Stopped => write!(f, "stopped"),
            ClockState::Paused => write!(f, "paused"),
            ClockState::Playing { .. } => write!(f, "playing"),
        }
    }
}

/// Playback position of one team
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackClock {
    current_index: Option<usize>,
    elapsed_seconds: f64,
    state: ClockState,
}

impl Default for PlaybackClock {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackClock {
    /// Stopped, no current song
    pub fn new() -> Self {
        Self {
            current_index: None,
            elapsed_seconds: 0.0,
            state: ClockState::Stopped,
        }
    }

    /// Rebuild a clock from persisted fields
    ///
    /// Out-of-range indexes, a playing flag without an anchor, anchors in the
    /// future and negative elapsed values are all repaired rather than
    /// trusted.
    pub fn from_record(record: &PlaybackRecord, queue_len: usize, now: DateTime<Utc>) -> Self {
        if queue_len == 0 {
            return Self::new();
        }

        let elapsed_seconds = if record.elapsed_seconds.is_finite() && record.elapsed_seconds > 0.0 {
            record.elapsed_seconds
        } else {
            0.0
        };

        let index = usize::try_from(record.current_song_index)
            .ok()
            .filter(|i| *i < queue_len);

        let Some(index) = index else {
            if record.current_song_index >= 0 {
                warn!(
                    index = record.current_song_index,
                    queue_len, "Stored song index out of range, resetting to first song"
                );
            }
            return Self {
                current_index: Some(0),
                elapsed_seconds: 0.0,
                state: ClockState::Stopped,
            };
        };

        let state = match (record.is_playing, record.started_at_utc) {
            (true, Some(started_at)) => ClockState::Playing {
                started_at: started_at.min(now),
            },
            (true, None) => {
                warn!("Stored playing state has no anchor, restoring as paused");
                ClockState::Paused
            }
            (false, _) => ClockState::Paused,
        };

        Self {
            current_index: Some(index),
            elapsed_seconds,
            state,
        }
    }

    /// Persisted form
    pub fn to_record(&self) -> PlaybackRecord {
        PlaybackRecord {
            current_song_index: self.current_index_wire(),
            is_playing: self.is_playing(),
            started_at_utc: self.started_at(),
            elapsed_seconds: self.elapsed_seconds,
        }
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    fn current_index_wire(&self) -> i64 {
        self.current_index.map(|i| i as i64).unwrap_or(-1)
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.elapsed_seconds
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.state, ClockState::Playing { .. })
    }

    /// Anchor, present only while playing
    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        match self.state {
            ClockState::Playing { started_at } => Some(started_at),
            _ => None,
        }
    }

    /// Start playing the current song
    ///
    /// No-op (returns false) when already playing or when there is no valid
    /// current song.
    pub fn play(&mut self, queue_len: usize, now: DateTime<Utc>) -> bool {
        if self.is_playing() || queue_len == 0 {
            return false;
        }

        match self.current_index {
            Some(index) if index < queue_len => {}
            Some(_) => return false,
            None => {
                // A song arrived while nothing was selected
                self.current_index = Some(0);
                self.elapsed_seconds = 0.0;
            }
        }

        self.state = ClockState::Playing { started_at: now };
        true
    }

    /// Fold the running interval into `elapsed_seconds` and drop the anchor
    ///
    /// No-op (returns false) unless playing.
    pub fn pause(&mut self, now: DateTime<Utc>) -> bool {
        let ClockState::Playing { started_at } = self.state else {
            return false;
        };
        self.elapsed_seconds += seconds_between(started_at, now);
        self.state = ClockState::Paused;
        true
    }

    /// Effective elapsed seconds at `now`
    pub fn effective_elapsed(&self, now: DateTime<Utc>) -> f64 {
        match self.state {
            ClockState::Playing { started_at } => {
                self.elapsed_seconds + seconds_between(started_at, now)
            }
            _ => self.elapsed_seconds,
        }
    }

    /// Select `index` from zero, keeping the playing flag
    ///
    /// A playing clock is re-anchored at `now`; otherwise the clock becomes
    /// paused on the new song.
    pub fn move_to(&mut self, index: usize, now: DateTime<Utc>) {
        self.current_index = Some(index);
        self.elapsed_seconds = 0.0;
        self.state = match self.state {
            ClockState::Playing { .. } => ClockState::Playing { started_at: now },
            _ => ClockState::Paused,
        };
    }

    /// Stop at `index` (the last valid song, or none)
    pub fn stop_at(&mut self, index: Option<usize>) {
        self.current_index = index;
        self.elapsed_seconds = 0.0;
        self.state = ClockState::Stopped;
    }

    /// Stopped with no current song
    pub fn reset(&mut self) {
        self.stop_at(None);
    }

    /// Re-point at the same song after it moved in the queue
    pub fn shift_index(&mut self, index: Option<usize>) {
        self.current_index = index;
        if index.is_none() {
            self.reset();
        }
    }

    /// Snapshot for clients
    pub fn snapshot(&self, team_id: TeamId, queue: &SongQueue, now: DateTime<Utc>) -> PlaybackSnapshot {
        PlaybackSnapshot {
            team_id,
            current_song_index: self.current_index_wire(),
            is_playing: self.is_playing(),
            started_at_utc: self.started_at(),
            elapsed_seconds: self.elapsed_seconds,
            effective_elapsed_seconds: self.effective_elapsed(now),
            current_song: self.current_index.and_then(|i| queue.get(i)),
            queue_length: queue.len(),
        }
    }
}
