//! Generic object pool
//!
//! Entities live in a single arena-indexed table per kind. Slots are never
//! deallocated; releasing a slot only flips its `active` flag so the next
//! `acquire` can reuse it without touching the allocator mid-run.

use serde::{Deserialize, Serialize};

/// Growth factor applied to the current size when every slot is in use
const GROWTH_FACTOR: f64 = 0.5;

/// Handle to a pooled item
///
/// The generation changes on every release, so a handle kept past its
/// item's lifetime is rejected rather than aliasing the next occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoolHandle {
    pub index: u32,
    pub generation: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Slot<T> {
    item: T,
    active: bool,
    generation: u32,
}

/// Reusable-object allocator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectPool<T> {
    items: Vec<Slot<T>>,
    active_count: usize,
}

impl<T: Default> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Default> ObjectPool<T> {
    /// Create an empty pool; the first `acquire` grows it
    pub fn new() -> Self {
        Self {
            items: Vec::new(),
            active_count: 0,
        }
    }

    /// Create a pool pre-warmed with `capacity` inactive items
    pub fn with_capacity(capacity: usize) -> Self {
        let mut pool = Self {
            items: Vec::with_capacity(capacity),
            active_count: 0,
        };
        pool.grow(capacity);
        pool
    }

    fn grow(&mut self, additional: usize) {
        self.items.extend((0..additional).map(|_| Slot {
            item: T::default(),
            active: false,
            generation: 0,
        }));
    }

    /// Mark an inactive item active and return its handle, expanding the
    /// pool by half its current size when none is free
    pub fn acquire(&mut self) -> PoolHandle {
        let index = match self.items.iter().position(|slot| !slot.active) {
            Some(index) => index,
            None => {
                let first_new = self.items.len();
                let additional = ((first_new as f64 * GROWTH_FACTOR).ceil() as usize).max(1);
                self.grow(additional);
                log::debug!("Pool expanded {} -> {}", first_new, self.items.len());
                first_new
            }
        };

        let slot = &mut self.items[index];
        slot.active = true;
        self.active_count += 1;
        PoolHandle {
            index: index as u32,
            generation: slot.generation,
        }
    }

    /// Acquire a slot and overwrite its contents
    pub fn acquire_with(&mut self, item: T) -> PoolHandle {
        let handle = self.acquire();
        self.items[handle.index as usize].item = item;
        handle
    }
}

impl<T> ObjectPool<T> {
    fn slot(&self, handle: PoolHandle) -> Option<&Slot<T>> {
        self.items
            .get(handle.index as usize)
            .filter(|slot| slot.active && slot.generation == handle.generation)
    }

    /// Return an item to the pool. Unknown, stale, or already-released
    /// handles are ignored.
    pub fn release(&mut self, handle: PoolHandle) {
        let Some(slot) = self.items.get_mut(handle.index as usize) else {
            return;
        };
        if !slot.active || slot.generation != handle.generation {
            return;
        }
        slot.active = false;
        slot.generation = slot.generation.wrapping_add(1);
        self.active_count -= 1;
    }

    /// Mark every item inactive without deallocating
    pub fn reset(&mut self) {
        for slot in self.items.iter_mut().filter(|slot| slot.active) {
            slot.active = false;
            slot.generation = slot.generation.wrapping_add(1);
        }
        self.active_count = 0;
    }

    pub fn is_active(&self, handle: PoolHandle) -> bool {
        self.slot(handle).is_some()
    }

    pub fn get(&self, handle: PoolHandle) -> Option<&T> {
        self.slot(handle).map(|slot| &slot.item)
    }

    pub fn get_mut(&mut self, handle: PoolHandle) -> Option<&mut T> {
        self.items
            .get_mut(handle.index as usize)
            .filter(|slot| slot.active && slot.generation == handle.generation)
            .map(|slot| &mut slot.item)
    }

    /// Active items in slot order
    pub fn iter_active(&self) -> impl Iterator<Item = (PoolHandle, &T)> {
        self.items.iter().enumerate().filter(|(_, slot)| slot.active).map(|(i, slot)| {
            (
                PoolHandle {
                    index: i as u32,
                    generation: slot.generation,
                },
                &slot.item,
            )
        })
    }

    pub fn iter_active_mut(&mut self) -> impl Iterator<Item = &mut T> {
        self.items
            .iter_mut()
            .filter(|slot| slot.active)
            .map(|slot| &mut slot.item)
    }

    /// Release every active item for which `keep` returns false
    pub fn retain_active(&mut self, mut keep: impl FnMut(&T) -> bool) {
        for slot in self.items.iter_mut().filter(|slot| slot.active) {
            if !keep(&slot.item) {
                slot.active = false;
                slot.generation = slot.generation.wrapping_add(1);
                self.active_count -= 1;
            }
        }
    }

    pub fn active_count(&self) -> usize {
        self.active_count
    }

    pub fn available_count(&self) -> usize {
        self.items.len() - self.active_count
    }

    /// Total number of slots (active + available)
    pub fn capacity(&self) -> usize {
        self.items.len()
    }
}
