//! Per-team song queues and the process-wide queue registry

pub mod cache;
pub mod song_queue;

pub use cache::QueueCache;
pub use song_queue::{QueueSnapshot, SongQueue};
