use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{EntityHandle, EntityKind, MAX_INDEX};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct KindCounter {
    last_index: u64,
    epoch: u8,
}

/// Issues entity handles. One allocator per hosting process/actor context;
/// there is no global instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandleAllocator {
    counters: BTreeMap<u8, KindCounter>,
    index_limit: u64,
    issued: u64,
}

impl HandleAllocator {
    pub fn new() -> Self {
        Self::with_index_limit(MAX_INDEX)
    }

    /// Allocator whose index wraps after `limit`. Clamped to `1..=MAX_INDEX`.
    pub fn with_index_limit(limit: u64) -> Self {
        Self {
            counters: BTreeMap::new(),
            index_limit: limit.clamp(1, MAX_INDEX),
            issued: 0,
        }
    }

    pub fn allocate(&mut self, kind: EntityKind) -> EntityHandle {
        let counter = self.counters.entry(kind.tag()).or_default();
        if counter.last_index >= self.index_limit {
            counter.last_index = 0;
            counter.epoch = counter.epoch.wrapping_add(1);
            tracing::warn!(
                kind = %kind,
                epoch = counter.epoch,
                "handle index space wrapped, advancing epoch"
            );
        }
        counter.last_index += 1;
        self.issued += 1;

        let handle = EntityHandle::new(kind, counter.epoch, counter.last_index);
        tracing::trace!(handle = %handle, "allocated entity handle");
        handle
    }

    /// Total handles issued over the allocator's lifetime.
    pub fn issued_count(&self) -> u64 {
        self.issued
    }
}

impl Default for HandleAllocator {
    fn default() -> Self {
        Self::new()
    }
}
