//! Queue cache
//!
//! Maps team id → [`SongQueue`]. Entries are created lazily on first access
//! and are only removed by an explicit [`QueueCache::invalidate`] (team
//! deletion). Creation is insert-if-absent: when two callers race to create
//! the same team's queue, both get the one instance that won.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use teamplay_common::TeamId;
use tracing::debug;

use super::SongQueue;

/// Process-wide team → queue registry, owned by the engine context
#[derive(Debug, Default)]
pub struct QueueCache {
    queues: RwLock<HashMap<TeamId, Arc<SongQueue>>>,
}

impl QueueCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue for this team, creating an empty one if absent
    pub fn get_or_create(&self, team_id: TeamId) -> Arc<SongQueue> {
        if let Some(queue) = self.get(team_id) {
            return queue;
        }

        let mut queues = self.queues.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(queues.entry(team_id).or_insert_with(|| {
            debug!(team_id = %team_id, "Created song queue");
            Arc::new(SongQueue::new())
        }))
    }

    pub fn get(&self, team_id: TeamId) -> Option<Arc<SongQueue>> {
        self.queues
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(&team_id)
            .cloned()
    }

    /// Drop the team's queue; returns whether one existed
    pub fn invalidate(&self, team_id: TeamId) -> bool {
        let removed = self
            .queues
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(&team_id)
            .is_some();
        if removed {
            debug!(team_id = %team_id, "Invalidated song queue");
        }
        removed
    }

    pub fn team_ids(&self) -> Vec<TeamId> {
        self.queues
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .copied()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.queues.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
