//! # Teamplay Common Library
//!
//! Shared vocabulary for the team playback services:
//! - Identifier newtypes (teams, songs, connections)
//! - Song and team records as exchanged with the durable store
//! - Wire types for client commands and server pushes
//! - Time source abstraction used by the playback clock

pub mod error;
pub mod ids;
pub mod models;
pub mod time;
pub mod wire;

pub use error::{Error, Result};
pub use ids::{ConnectionId, SongId, TeamId};
pub use models::{PlaybackRecord, Song, TeamRecord};
pub use time::{Clock, ManualClock, SystemClock};
pub use wire::{ClientCommand, ErrorPayload, PlaybackSnapshot, ServerMessage};
