//! Generation-checked coroutine table
//!
//! Slots are reused after removal, but every reuse bumps the slot's
//! generation, so an id handed out earlier can never resolve to a newer
//! occupant. Removing one entry never changes another entry's identity.
//!
//! The table also remembers insertion order. Slot order is not creation
//! order once slots get reused, and the scheduler scans in creation order.

use std::fmt;

/// Stable handle to a coroutine within its owning scheduler
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CoroutineId {
    index: u32,
    generation: u32,
}

impl CoroutineId {
    /// Slot index (reused across generations)
    #[inline]
    pub fn index(self) -> u32 {
        self.index
    }

    /// Generation of the slot when this id was issued
    #[inline]
    pub fn generation(self) -> u32 {
        self.generation
    }
}

impl fmt::Debug for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "co#{}v{}", self.index, self.generation)
    }
}

impl fmt::Display for CoroutineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

enum Slot<T> {
    Occupied { generation: u32, value: T },
    Vacant { generation: u32 },
}

/// Generational slot storage with insertion-order iteration
pub(crate) struct Table<T> {
    slots: Vec<Slot<T>>,
    /// Vacant slot indices available for reuse
    free: Vec<u32>,
    /// Live ids in insertion order
    order: Vec<CoroutineId>,
}

impl<T> Table<T> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            order: Vec::new(),
        }
    }

    /// Insert a value built from its own id
    pub(crate) fn insert_with(&mut self, build: impl FnOnce(CoroutineId) -> T) -> CoroutineId {
        let id = match self.free.pop() {
            Some(index) => {
                let generation = match self.slots[index as usize] {
                    Slot::Vacant { generation } => generation,
                    Slot::Occupied { .. } => unreachable!("free list points at an occupied slot"),
                };
                CoroutineId { index, generation }
            }
            None => {
                let index = self.slots.len() as u32;
                self.slots.push(Slot::Vacant { generation: 0 });
                CoroutineId { index, generation: 0 }
            }
        };

        self.slots[id.index as usize] = Slot::Occupied {
            generation: id.generation,
            value: build(id),
        };
        self.order.push(id);
        id
    }

    /// Remove the entry for `id`, returning it if `id` is still current
    pub(crate) fn remove(&mut self, id: CoroutineId) -> Option<T> {
        if !self.contains(id) {
            return None;
        }

        let next = Slot::Vacant {
            generation: id.generation.wrapping_add(1),
        };
        let old = std::mem::replace(&mut self.slots[id.index as usize], next);
        self.free.push(id.index);
        if let Some(pos) = self.order.iter().position(|&o| o == id) {
            self.order.remove(pos);
        }

        match old {
            Slot::Occupied { value, .. } => Some(value),
            Slot::Vacant { .. } => None,
        }
    }

    pub(crate) fn contains(&self, id: CoroutineId) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn get(&self, id: CoroutineId) -> Option<&T> {
        match self.slots.get(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    pub(crate) fn get_mut(&mut self, id: CoroutineId) -> Option<&mut T> {
        match self.slots.get_mut(id.index as usize)? {
            Slot::Occupied { generation, value } if *generation == id.generation => Some(value),
            _ => None,
        }
    }

    /// Live ids in insertion order
    pub(crate) fn ids(&self) -> &[CoroutineId] {
        &self.order
    }

    pub(crate) fn len(&self) -> usize {
        self.order.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every entry, yielding values in insertion order
    pub(crate) fn drain(&mut self) -> Vec<T> {
        let ids = std::mem::take(&mut self.order);
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let next = Slot::Vacant {
                generation: id.generation.wrapping_add(1),
            };
            if let Slot::Occupied { value, .. } =
                std::mem::replace(&mut self.slots[id.index as usize], next)
            {
                out.push(value);
            }
            self.free.push(id.index);
        }
        out
    }
}
