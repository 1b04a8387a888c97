//! In-process connection hub

use std::collections::{HashMap, HashSet};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use teamplay_common::{ConnectionId, ServerMessage};
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::transport::ChannelTransport;

/// Registry of live connections and their group memberships
#[derive(Debug, Default)]
pub struct ConnectionHub {
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
    groups: RwLock<HashMap<String, HashSet<ConnectionId>>>,
}

impl ConnectionHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection; the receiver yields its outbound messages
    pub fn register(&self) -> (ConnectionId, mpsc::UnboundedReceiver<ServerMessage>) {
        let conn = ConnectionId::new();
        let (tx, rx) = mpsc::unbounded_channel();
        let total = {
            let mut connections = write(&self.connections);
            connections.insert(conn, tx);
            connections.len()
        };
        info!(connection = %conn, total, "Connection registered");
        (conn, rx)
    }

    /// Remove a connection from the hub and from every group
    pub fn unregister(&self, conn: ConnectionId) {
        let removed = write(&self.connections).remove(&conn).is_some();
        let mut groups = write(&self.groups);
        for members in groups.values_mut() {
            members.remove(&conn);
        }
        groups.retain(|_, members| !members.is_empty());
        if removed {
            info!(connection = %conn, "Connection unregistered");
        }
    }

    pub fn connection_count(&self) -> usize {
        read(&self.connections).len()
    }

    pub fn group_members(&self, group: &str) -> Vec<ConnectionId> {
        read(&self.groups)
            .get(group)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ChannelTransport for ConnectionHub {
    fn join_group(&self, conn: ConnectionId, group: &str) {
        write(&self.groups)
            .entry(group.to_string())
            .or_default()
            .insert(conn);
    }

    fn leave_group(&self, conn: ConnectionId, group: &str) {
        let mut groups = write(&self.groups);
        if let Some(members) = groups.get_mut(group) {
            members.remove(&conn);
            if members.is_empty() {
                groups.remove(group);
            }
        }
    }

    fn close_group(&self, group: &str) {
        write(&self.groups).remove(group);
    }

    fn send_to_caller(&self, conn: ConnectionId, message: &ServerMessage) -> bool {
        match read(&self.connections).get(&conn) {
            Some(tx) => tx.send(message.clone()).is_ok(),
            None => {
                debug!(connection = %conn, kind = message.kind(), "Dropping message for closed connection");
                false
            }
        }
    }

    fn send_to_group(&self, group: &str, message: &ServerMessage) -> usize {
        // Group lock held across the sends so concurrent broadcasts to one
        // group cannot interleave per member.
        let groups = read(&self.groups);
        let Some(members) = groups.get(group) else {
            return 0;
        };
        let connections = read(&self.connections);
        members
            .iter()
            .filter_map(|conn| connections.get(conn))
            .filter(|tx| tx.send(message.clone()).is_ok())
            .count()
    }
}
