//! Group fan-out of server messages
//!
//! [`ConnectionHub`] is the in-process realtime transport: one unbounded
//! queue per connection plus named groups. [`SyncBroadcaster`] maps teams
//! onto groups and tracks which teams each connection joined.

pub mod broadcaster;
pub mod hub;
pub mod transport;

pub use broadcaster::SyncBroadcaster;
pub use hub::ConnectionHub;
pub use transport::ChannelTransport;
