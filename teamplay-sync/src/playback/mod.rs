//! Team playback: clock state machine, queue navigation, the engine that
//! serializes commands per team, and write-behind persistence.

pub mod clock;
pub mod engine;
pub mod navigator;
pub mod writer;

pub use clock::{ClockState, PlaybackClock};
pub use engine::{CommandOutcome, TeamSyncEngine};
pub use navigator::{Change, QueueNavigator};
pub use writer::{PlaybackWriter, SongDelta};
