// Process-wide map of live rooms, keyed by room id.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::BattleTiming;
use crate::metrics;

use super::actor::{self, RoomHandle, RoomSummary};
use super::room::Room;

/// Thread-safe registry of running room actors. A room removes itself from
/// the registry when its actor exits.
#[derive(Debug, Clone)]
pub struct RoomRegistry {
    inner: Arc<Mutex<HashMap<String, RoomHandle>>>,
    timing: BattleTiming,
}

impl RoomRegistry {
    pub fn new(timing: BattleTiming) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            timing,
        }
    }

    pub fn timing(&self) -> BattleTiming {
        self.timing
    }

    /// Spawn a room actor for a freshly matched pair and register it.
    pub fn create(&self, room_id: &str, passage: &str) -> RoomHandle {
        let inner = self.inner.clone();
        let id = room_id.to_string();
        let handle = actor::spawn(Room::new(room_id, passage), self.timing, move || {
            let mut rooms = inner.lock().unwrap();
            rooms.remove(&id);
            metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
            tracing::debug!(room = %id, remaining = rooms.len(), "Room removed from registry");
        });

        let mut rooms = self.inner.lock().unwrap();
        rooms.insert(room_id.to_string(), handle.clone());
        metrics::ACTIVE_ROOMS.set(rooms.len() as i64);
        handle
    }

    pub fn get(&self, room_id: &str) -> Option<RoomHandle> {
        let rooms = self.inner.lock().unwrap();
        rooms.get(room_id).filter(|h| !h.is_closed()).cloned()
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of every live room, ordered by id.
    pub fn summaries(&self) -> Vec<RoomSummary> {
        let rooms = self.inner.lock().unwrap();
        let mut out: Vec<RoomSummary> = rooms.values().map(|h| h.summary()).collect();
        out.sort_by(|a, b| a.id.cmp(&b.id));
        out
    }
}
