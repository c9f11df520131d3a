//! Lazily grown set of worker slots.

use tracing::{debug, info, warn};

use crate::worker::{spawn_worker, EngineFactory, WorkerClient, WorkerEngine};

use super::types::{PoolSettings, PoolStatus};

struct WorkerSlot<W: WorkerEngine> {
    client: WorkerClient<W>,
    available: bool,
}

/// A slot handed out by [`WorkerPool::acquire`].
///
/// The slot stays busy until [`WorkerPool::release`] is called with its index.
pub struct Lease<W: WorkerEngine> {
    pub slot: usize,
    pub client: WorkerClient<W>,
}

/// Bounded set of workers.
///
/// Slots are created on demand, never more than `capacity`, and are reused
/// once released. The pool is not shared: one owner (the dispatch loop)
/// mutates it, which keeps slot availability race-free.
pub struct WorkerPool<W: WorkerEngine> {
    settings: PoolSettings,
    factory: EngineFactory<W>,
    slots: Vec<WorkerSlot<W>>,
}

impl<W: WorkerEngine> WorkerPool<W> {
    pub fn new(settings: PoolSettings, factory: EngineFactory<W>) -> Self {
        Self {
            settings,
            factory,
            slots: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.settings.name
    }

    /// Number of slots created so far.
    pub fn slot_count(&self) -> usize {
        self.slots.len()
    }

    /// Number of slots currently leased.
    pub fn busy_count(&self) -> usize {
        self.slots.iter().filter(|s| !s.available).count()
    }

    /// Leases a free slot, creating one if below capacity.
    ///
    /// Returns `Ok(None)` when every slot is busy and the pool is full.
    pub fn acquire(&mut self) -> std::io::Result<Option<Lease<W>>> {
        if let Some((slot, entry)) = self
            .slots
            .iter_mut()
            .enumerate()
            .find(|(_, s)| s.available)
        {
            entry.available = false;
            return Ok(Some(Lease {
                slot,
                client: entry.client.clone(),
            }));
        }

        if self.slots.len() >= self.settings.capacity {
            return Ok(None);
        }

        let slot = self.slots.len();
        let client = self.spawn(slot)?;
        self.slots.push(WorkerSlot {
            client: client.clone(),
            available: false,
        });
        Ok(Some(Lease { slot, client }))
    }

    /// Marks a leased slot as free again.
    pub fn release(&mut self, slot: usize) {
        match self.slots.get_mut(slot) {
            Some(entry) if !entry.available => entry.available = true,
            Some(_) => warn!(pool = %self.settings.name, slot, "Released a slot that was not leased"),
            None => warn!(pool = %self.settings.name, slot, "Released an unknown slot"),
        }
    }

    /// Creates the first slot ahead of demand. No-op once any slot exists.
    pub fn preload(&mut self) -> std::io::Result<()> {
        if !self.slots.is_empty() {
            return Ok(());
        }
        let client = self.spawn(0)?;
        self.slots.push(WorkerSlot {
            client,
            available: true,
        });
        info!(pool = %self.settings.name, "Preloaded worker");
        Ok(())
    }

    pub(crate) fn status(&self, queued: usize, total_processed: u64, total_failed: u64) -> PoolStatus {
        PoolStatus {
            name: self.settings.name.clone(),
            capacity: self.settings.capacity,
            slots: self.slots.len(),
            busy: self.busy_count(),
            queued,
            total_processed,
            total_failed,
        }
    }

    fn spawn(&self, slot: usize) -> std::io::Result<WorkerClient<W>> {
        let name = format!("{}-worker-{}", self.settings.name, slot);
        debug!(pool = %self.settings.name, slot, "Spawning worker");
        spawn_worker(
            name,
            self.factory.clone(),
            self.settings.response_timeout,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineError;
    use std::sync::Arc;
    use std::time::Duration;

    struct Echo;

    impl WorkerEngine for Echo {
        type Request = u32;
        type Response = u32;

        fn handle(&mut self, request: u32) -> Result<u32, EngineError> {
            Ok(request)
        }
    }

    fn pool(capacity: usize) -> WorkerPool<Echo> {
        let factory: EngineFactory<Echo> = Arc::new(|| Ok(Echo));
        WorkerPool::new(
            PoolSettings::new("echo", capacity, Duration::from_millis(500)),
            factory,
        )
    }

    #[test]
    fn test_slots_grow_to_capacity() {
        let mut pool = pool(2);
        let a = pool.acquire().unwrap().unwrap();
        let b = pool.acquire().unwrap().unwrap();
        assert_eq!((a.slot, b.slot), (0, 1));
        assert!(pool.acquire().unwrap().is_none());
        assert_eq!(pool.slot_count(), 2);
        assert_eq!(pool.busy_count(), 2);
    }

    #[test]
    fn test_released_slot_is_reused() {
        let mut pool = pool(2);
        let a = pool.acquire().unwrap().unwrap();
        pool.release(a.slot);
        let again = pool.acquire().unwrap().unwrap();
        assert_eq!(again.slot, 0);
        assert_eq!(pool.slot_count(), 1);
    }

    #[test]
    fn test_preload_creates_one_free_slot() {
        let mut pool = pool(3);
        pool.preload().unwrap();
        pool.preload().unwrap();
        assert_eq!(pool.slot_count(), 1);
        assert_eq!(pool.busy_count(), 0);

        let status = pool.status(0, 0, 0);
        assert_eq!(status.capacity, 3);
        assert_eq!(status.slots, 1);
    }

    #[test]
    fn test_zero_capacity_is_raised_to_one() {
        let mut pool = pool(0);
        assert!(pool.acquire().unwrap().is_some());
        assert!(pool.acquire().unwrap().is_none());
    }
}
