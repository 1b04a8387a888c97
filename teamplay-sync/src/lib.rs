//! # Teamplay Sync Library (teamplay-sync)
//!
//! Team playback and queue synchronization engine.
//!
//! **Purpose:** Keep every connected member of a team on the same song and
//! the same playback position. Holds the per-team song queue, the playback
//! clock state machine, and the group fan-out that pushes the authoritative
//! snapshot to every member after each committed change.
//!
//! **Architecture:** One [`TeamSyncEngine`](playback::TeamSyncEngine) context
//! object owns the queue cache, per-team sessions, the durable store handle
//! and the broadcaster. Each team's mutations run under that team's own
//! async mutex; different teams never contend.

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod playback;
pub mod queue;
pub mod sync;

pub use error::{Error, Result};
pub use playback::TeamSyncEngine;
