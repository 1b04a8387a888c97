//! Song queue
//!
//! Ordered, thread-safe collection of songs for one team. Insertion order is
//! play order unless explicitly reordered. Song ids are unique within a queue.
//!
//! Every operation takes the queue's single mutex, so each call is atomic on
//! its own. Multi-step sequences ("find, then update") are consistent only
//! under the owning team's lock. Iteration goes through
//! [`SongQueue::snapshot`]; the live queue is never iterated in place.

use std::sync::{Arc, Mutex, MutexGuard};
use teamplay_common::{Song, SongId};

/// Ordered song collection for a single team
#[derive(Debug, Default)]
pub struct SongQueue {
    songs: Mutex<Vec<Song>>,
}

impl SongQueue {
    /// Create new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a queue from songs in play order; later duplicates are dropped
    pub fn from_songs(songs: Vec<Song>) -> Self {
        let queue = Self::new();
        queue.replace_all(songs);
        queue
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Song>> {
        self.songs.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Append (or prepend when `at_front`) a song
    ///
    /// `None` is ignored. A song whose id is already queued is ignored too.
    /// Returns true if the song was inserted.
    pub fn enqueue(&self, song: impl Into<Option<Song>>, at_front: bool) -> bool {
        let Some(song) = song.into() else {
            return false;
        };

        let mut songs = self.lock();
        if songs.iter().any(|s| s.id == song.id) {
            return false;
        }

        if at_front {
            songs.insert(0, song);
        } else {
            songs.push(song);
        }
        renumber(&mut songs);
        true
    }

    /// Remove and return the head
    pub fn dequeue(&self) -> Option<Song> {
        let mut songs = self.lock();
        if songs.is_empty() {
            return None;
        }
        let head = songs.remove(0);
        renumber(&mut songs);
        Some(head)
    }

    /// Head of the queue without removing it
    pub fn peek(&self) -> Option<Song> {
        self.lock().first().cloned()
    }

    /// Remove the song with this id; returns whether removal occurred
    pub fn remove(&self, song_id: SongId) -> bool {
        let mut songs = self.lock();
        match songs.iter().position(|s| s.id == song_id) {
            Some(index) => {
                songs.remove(index);
                renumber(&mut songs);
                true
            }
            None => false,
        }
    }

    /// Replace the song with this id in place, keeping its position and id
    ///
    /// Returns false (and changes nothing) if the id is not queued.
    pub fn update_song(&self, song_id: SongId, mut updated: Song) -> bool {
        let mut songs = self.lock();
        match songs.iter().position(|s| s.id == song_id) {
            Some(index) => {
                updated.id = song_id;
                updated.position = index as i64;
                songs[index] = updated;
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Current length
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Song at a play-order index
    pub fn get(&self, index: usize) -> Option<Song> {
        self.lock().get(index).cloned()
    }

    pub fn position_of(&self, song_id: SongId) -> Option<usize> {
        self.lock().iter().position(|s| s.id == song_id)
    }

    /// Replace the whole contents, dropping duplicate ids (first one wins)
    pub fn replace_all(&self, incoming: Vec<Song>) {
        let mut deduped: Vec<Song> = Vec::with_capacity(incoming.len());
        for song in incoming {
            if !deduped.iter().any(|s| s.id == song.id) {
                deduped.push(song);
            }
        }
        renumber(&mut deduped);
        *self.lock() = deduped;
    }

    /// Point-in-time copy of the queue for iteration
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            songs: Arc::new(self.lock().clone()),
        }
    }
}

fn renumber(songs: &mut [Song]) {
    for (index, song) in songs.iter_mut().enumerate() {
        song.position = index as i64;
    }
}

/// Immutable copy of a queue; iterating it any number of times is safe
#[derive(Debug, Clone, Default)]
pub struct QueueSnapshot {
    songs: Arc<Vec<Song>>,
}

impl QueueSnapshot {
    pub fn iter(&self) -> std::slice::Iter<'_, Song> {
        self.songs.iter()
    }

    pub fn len(&self) -> usize {
        self.songs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.songs.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.songs.get(index)
    }

    pub fn to_vec(&self) -> Vec<Song> {
        self.songs.as_ref().clone()
    }
}

impl<'a> IntoIterator for &'a QueueSnapshot {
    type Item = &'a Song;
    type IntoIter = std::slice::Iter<'a, Song>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn song(title: &str) -> Song {
        Song::new(format!("https://example.test/{title}"), title, "artist", "uploader")
    }

    fn titles(queue: &SongQueue) -> Vec<String> {
        queue.snapshot().iter().map(|s| s.title.clone()).collect()
    }

    #[test]
    fn test_enqueue_back_and_front() {
        let queue = SongQueue::new();
        assert!(queue.enqueue(song("b"), false));
        assert!(queue.enqueue(song("c"), false));
        assert!(queue.enqueue(song("a"), true));
        assert_eq!(titles(&queue), vec!["a", "b", "c"]);

        let positions: Vec<i64> = queue.snapshot().iter().map(|s| s.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
    }

    #[test]
    fn test_enqueue_none_is_ignored() {
        let queue = SongQueue::new();
        assert!(!queue.enqueue(None::<Song>, false));
        assert!(queue.is_empty());
    }

    #[test]
    fn test_enqueue_duplicate_id_is_ignored() {
        let queue = SongQueue::new();
        let a = song("a");
        assert!(queue.enqueue(a.clone(), false));
        assert!(!queue.enqueue(a, true));
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_dequeue_and_peek_on_empty() {
        let queue = SongQueue::new();
        assert!(queue.peek().is_none());
        assert!(queue.dequeue().is_none());
    }

    #[test]
    fn test_dequeue_returns_head() {
        let queue = SongQueue::from_songs(vec![song("a"), song("b")]);
        assert_eq!(queue.peek().unwrap().title, "a");
        assert_eq!(queue.dequeue().unwrap().title, "a");
        assert_eq!(queue.peek().unwrap().title, "b");
        assert_eq!(queue.peek().unwrap().position, 0);
    }

    #[test]
    fn test_remove_reports_whether_removed() {
        let a = song("a");
        let queue = SongQueue::from_songs(vec![a.clone(), song("b")]);
        assert!(queue.remove(a.id));
        assert!(!queue.remove(a.id));
        assert_eq!(titles(&queue), vec!["b"]);
    }

    #[test]
    fn test_update_song_in_place() {
        let b = song("b");
        let queue = SongQueue::from_songs(vec![song("a"), b.clone(), song("c")]);

        let mut rated = b.clone();
        rated.rating = 5;
        rated.id = SongId::new();
        assert!(queue.update_song(b.id, rated));

        let updated = queue.get(1).unwrap();
        assert_eq!(updated.id, b.id);
        assert_eq!(updated.rating, 5);

        assert!(!queue.update_song(SongId::new(), song("x")));
        assert_eq!(queue.len(), 3);
    }

    #[test]
    fn test_from_songs_drops_duplicates() {
        let a = song("a");
        let queue = SongQueue::from_songs(vec![a.clone(), song("b"), a]);
        assert_eq!(titles(&queue), vec!["a", "b"]);
    }

    #[test]
    fn test_snapshot_is_stable_and_restartable() {
        let queue = SongQueue::from_songs(vec![song("a"), song("b")]);
        let snapshot = queue.snapshot();
        queue.clear();

        assert_eq!(snapshot.iter().count(), 2);
        assert_eq!((&snapshot).into_iter().count(), 2);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_enqueue_keeps_every_song() {
        let queue = Arc::new(SongQueue::new());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for j in 0..50 {
                        queue.enqueue(song(&format!("{i}-{j}")), j % 2 == 0);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(queue.len(), 400);
    }
}
