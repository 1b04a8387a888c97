//! Realtime transport seam

use teamplay_common::{ConnectionId, ServerMessage};

/// Group-addressable message transport
///
/// Sends never block: a message handed to the transport is queued for
/// every addressed connection in call order, so two sends to the same
/// group arrive at each member in the same relative order.
pub trait ChannelTransport: Send + Sync {
    fn join_group(&self, conn: ConnectionId, group: &str);

    fn leave_group(&self, conn: ConnectionId, group: &str);

    /// Drop the group and all its memberships
    fn close_group(&self, group: &str);

    /// Returns false if the connection is gone
    fn send_to_caller(&self, conn: ConnectionId, message: &ServerMessage) -> bool;

    /// Returns the number of members the message was queued for
    fn send_to_group(&self, group: &str, message: &ServerMessage) -> usize;
}
