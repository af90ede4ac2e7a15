use crate::connection::streams::StreamSlot;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;

/// Concurrent mapping from stream ID to live stream state.
///
/// Backed by a sharded hash map so ingress dispatch and egress submission can touch disjoint
/// streams without contending. Insertion fails when the ID is already live, which is what
/// guarantees at most one stream per ID per endpoint.
#[derive(Debug, Default)]
pub(crate) struct StreamRegistry {
    streams: DashMap<u32, Arc<StreamSlot>>,
}

impl StreamRegistry {
    pub(crate) fn new() -> StreamRegistry {
        StreamRegistry { streams: DashMap::new() }
    }

    /// Inserts a slot for `id`. Returns false (and drops the slot) if the ID is already live.
    pub(crate) fn insert(&self, id: u32, slot: Arc<StreamSlot>) -> bool {
        match self.streams.entry(id) {
            Entry::Occupied(_) => false,
            Entry::Vacant(entry) => {
                entry.insert(slot);
                true
            }
        }
    }

    /// Returns the slot registered for `id`, if any.
    pub(crate) fn get(&self, id: u32) -> Option<Arc<StreamSlot>> {
        self.streams.get(&id).map(|entry| entry.value().clone())
    }

    /// Removes and returns the slot registered for `id`, if any.
    pub(crate) fn remove(&self, id: u32) -> Option<Arc<StreamSlot>> {
        self.streams.remove(&id).map(|(_, slot)| slot)
    }

    /// Returns true if `id` is live.
    pub(crate) fn contains(&self, id: u32) -> bool {
        self.streams.contains_key(&id)
    }

    /// Returns the number of live streams.
    pub(crate) fn len(&self) -> usize {
        self.streams.len()
    }

    /// Returns true when no stream is live.
    pub(crate) fn is_empty(&self) -> bool {
        self.streams.is_empty()
    }

    /// Removes every slot, returning them for shutdown fan-out.
    pub(crate) fn drain(&self) -> Vec<Arc<StreamSlot>> {
        let ids: Vec<u32> =
            self.streams.iter().map(|entry| *entry.key()).collect();
        ids.into_iter().filter_map(|id| self.remove(id)).collect()
    }
}
