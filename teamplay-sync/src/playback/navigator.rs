//! Queue navigation
//!
//! Moves a team's current-index pointer and keeps it attached to the same
//! song while the queue is edited. A [`QueueNavigator`] is a short-lived
//! view over one team's queue and clock, built by the engine while it holds
//! that team's lock, so every method here runs inside the team's exclusive
//! section.
//!
//! Navigation policy:
//! - advance past the last song stops at the last song
//! - previous at the first song is a no-op
//! - jump outside `[0, len)` is an error and changes nothing

use chrono::{DateTime, Utc};
use teamplay_common::{Song, SongId};

use super::clock::{ClockState, PlaybackClock};
use crate::error::{Error, Result};
use crate::queue::SongQueue;

/// What an operation touched; drives broadcasting and persistence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Change {
    pub clock: bool,
    pub queue: bool,
}

impl Change {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn clock(changed: bool) -> Self {
        Self {
            clock: changed,
            queue: false,
        }
    }

    pub fn any(&self) -> bool {
        self.clock || self.queue
    }
}

/// Navigation view over one team's queue and clock
pub struct QueueNavigator<'a> {
    queue: &'a SongQueue,
    clock: &'a mut PlaybackClock,
    now: DateTime<Utc>,
}

impl<'a> QueueNavigator<'a> {
    pub fn new(queue: &'a SongQueue, clock: &'a mut PlaybackClock, now: DateTime<Utc>) -> Self {
        Self { queue, clock, now }
    }

    pub fn play(&mut self) -> Change {
        Change::clock(self.clock.play(self.queue.len(), self.now))
    }

    pub fn pause(&mut self) -> Change {
        Change::clock(self.clock.pause(self.now))
    }

    /// Move to the next song from zero, keeping the playing flag
    ///
    /// At the last song the clock stops on that song.
    pub fn advance_to_next(&mut self) -> Change {
        let len = self.queue.len();
        if len == 0 {
            return self.reset_if_needed();
        }

        let next = self.clock.current_index().map_or(0, |i| i + 1);
        if next < len {
            self.clock.move_to(next, self.now);
            return Change::clock(true);
        }

        let last = Some(len - 1);
        let already_stopped = self.clock.state() == ClockState::Stopped
            && self.clock.current_index() == last
            && self.clock.elapsed_seconds() == 0.0;
        if already_stopped {
            return Change::none();
        }
        self.clock.stop_at(last);
        Change::clock(true)
    }

    /// Move to the previous song from zero; clamps at the first song
    pub fn go_to_previous(&mut self) -> Change {
        let len = self.queue.len();
        match self.clock.current_index() {
            None | Some(0) => Change::none(),
            _ if len == 0 => self.reset_if_needed(),
            Some(index) => {
                let target = (index - 1).min(len - 1);
                self.clock.move_to(target, self.now);
                Change::clock(true)
            }
        }
    }

    /// Select `index` from zero, keeping the playing flag
    pub fn jump_to(&mut self, index: i64) -> Result<Change> {
        let len = self.queue.len();
        let target = usize::try_from(index)
            .ok()
            .filter(|i| *i < len)
            .ok_or(Error::IndexOutOfRange { index, len })?;

        self.clock.move_to(target, self.now);
        Ok(Change::clock(true))
    }

    /// Replace the queue with `songs` from the durable store
    ///
    /// The clock follows the current song to its new position untouched. If
    /// the current song is gone, whatever now occupies its slot becomes
    /// current, as if advancing from the removed song.
    pub fn reconcile(&mut self, songs: Vec<Song>) -> Change {
        let before = self.queue.snapshot();
        let current_id = self
            .clock
            .current_index()
            .and_then(|i| before.get(i))
            .map(|s| s.id);

        self.queue.replace_all(songs);
        let queue_changed = before.to_vec() != self.queue.snapshot().to_vec();

        let clock_changed = match current_id {
            Some(id) => self.follow_current(id),
            None => self.select_first_if_unset(),
        };

        Change {
            clock: clock_changed,
            queue: queue_changed,
        }
    }

    /// Add a song; duplicate ids are rejected
    pub fn enqueue(&mut self, song: Song, at_front: bool) -> Result<Change> {
        let song_id = song.id;
        if !self.queue.enqueue(song, at_front) {
            return Err(Error::MalformedCommand(format!(
                "song {song_id} is already queued"
            )));
        }

        let clock = match self.clock.current_index() {
            Some(index) if at_front => {
                self.clock.shift_index(Some(index + 1));
                true
            }
            Some(_) => false,
            None => self.select_first_if_unset(),
        };

        Ok(Change { clock, queue: true })
    }

    /// Remove the head of the queue
    pub fn dequeue(&mut self) -> (Option<Song>, Change) {
        match self.queue.peek() {
            Some(head) => {
                let change = self.remove(head.id);
                (Some(head), change)
            }
            None => (None, Change::none()),
        }
    }

    /// Remove a song by id; unknown ids change nothing
    pub fn remove(&mut self, song_id: SongId) -> Change {
        let Some(position) = self.queue.position_of(song_id) else {
            return Change::none();
        };
        self.queue.remove(song_id);
        let len = self.queue.len();

        let clock = match self.clock.current_index() {
            Some(current) if position < current => {
                self.clock.shift_index(Some(current - 1));
                true
            }
            Some(current) if position == current => {
                self.take_over_slot(current, len);
                true
            }
            _ => false,
        };

        Change { clock, queue: true }
    }

    /// Replace a song in place (e.g. a rating edit)
    pub fn update_song(&mut self, song_id: SongId, song: Song) -> Change {
        Change {
            clock: false,
            queue: self.queue.update_song(song_id, song),
        }
    }

    pub fn clear(&mut self) -> Change {
        let queue = !self.queue.is_empty();
        self.queue.clear();
        let clock = self.reset_if_needed().clock;
        Change { clock, queue }
    }

    fn follow_current(&mut self, id: SongId) -> bool {
        let old_index = self.clock.current_index();
        let len = self.queue.len();

        match self.queue.position_of(id) {
            Some(new_index) if Some(new_index) == old_index => false,
            Some(new_index) => {
                self.clock.shift_index(Some(new_index));
                true
            }
            None => {
                self.take_over_slot(old_index.unwrap_or(0), len);
                true
            }
        }
    }

    /// The current song at `slot` was removed; select its successor
    fn take_over_slot(&mut self, slot: usize, len: usize) {
        if len == 0 {
            self.clock.reset();
        } else if slot < len {
            self.clock.move_to(slot, self.now);
        } else {
            self.clock.stop_at(Some(len - 1));
        }
    }

    fn select_first_if_unset(&mut self) -> bool {
        if self.clock.current_index().is_some() || self.queue.is_empty() {
            return false;
        }
        self.clock.stop_at(Some(0));
        true
    }

    fn reset_if_needed(&mut self) -> Change {
        let fresh = PlaybackClock::new();
        if *self.clock == fresh {
            return Change::none();
        }
        self.clock.reset();
        Change::clock(true)
    }
}
