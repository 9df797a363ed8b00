//! Sound bank: handle-addressed sound resources with shared ownership
//!
//! Game logic refers to sounds by [`SoundId`]. Each play request clones the
//! resource's [`Shared`] cell into the audio command, so removing a sound
//! from the bank while it is still playing only drops the bank's copy; the
//! resource is destroyed when the audio thread's finished report is
//! absorbed and the last copy goes away.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

use crate::audio::SoundResource;
use crate::handle::{HandleTable, Token};
use crate::shared::{CounterPool, Shared};

/// Counter slots reserved for bank entries before falling back to the heap
const DEFAULT_COUNTER_SLOTS: usize = 256;

/// Stable reference to a sound in a [`SoundBank`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundId(Token);

impl SoundId {
    pub fn token(self) -> Token {
        self.0
    }
}

struct Entry {
    token: Token,
    sound: Shared<dyn SoundResource>,
}

pub struct SoundBank {
    handles: HandleTable,
    entries: Vec<Entry>,
    counters: Arc<CounterPool>,
    destroyed: Arc<AtomicUsize>,
}

impl Default for SoundBank {
    fn default() -> Self {
        Self::new()
    }
}

impl SoundBank {
    pub fn new() -> Self {
        Self::with_counter_slots(DEFAULT_COUNTER_SLOTS)
    }

    pub fn with_counter_slots(slots: usize) -> Self {
        Self {
            handles: HandleTable::new(),
            entries: Vec::new(),
            counters: CounterPool::new(slots),
            destroyed: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn add<R: SoundResource + 'static>(&mut self, resource: R) -> SoundId {
        let destroyed = Arc::clone(&self.destroyed);
        let sound = Shared::pooled(resource, &self.counters, move |r: &R| {
            trace!("sound '{}' destroyed", r.name());
            destroyed.fetch_add(1, Ordering::Relaxed);
        })
        .upcast(|arc| arc as Arc<dyn SoundResource>);

        let id = self.handles.alloc(self.entries.len() as u32);
        let token = self.handles.to_token(id);
        self.entries.push(Entry { token, sound });
        SoundId(token)
    }

    /// A new reference to the sound, or None if it was removed.
    pub fn get(&self, id: SoundId) -> Option<Shared<dyn SoundResource>> {
        let index = self.handles.resolve(id.0)?;
        Some(self.entries[index as usize].sound.clone())
    }

    pub fn contains(&self, id: SoundId) -> bool {
        self.handles.validate(id.0)
    }

    /// Drop the bank's reference. Copies held by playing voices stay valid.
    pub fn remove(&mut self, id: SoundId) -> bool {
        let Some(handle) = self.handles.from_token(id.0) else {
            return false;
        };
        let Some(index) = self.handles.index_of(handle) else {
            return false;
        };
        let index = index as usize;
        self.entries.swap_remove(index);
        if let Some(moved) = self.entries.get(index)
            && let Some(moved_handle) = self.handles.from_token(moved.token)
        {
            self.handles.update_index(moved_handle, index as u32);
        }
        self.handles.release(handle);
        true
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resources whose last reference has been dropped
    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Relaxed)
    }

    /// Counter slots still free in the bank's pool
    pub fn free_counters(&self) -> usize {
        self.counters.available()
    }
}

impl std::fmt::Debug for SoundBank {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoundBank")
            .field("sounds", &self.entries.len())
            .field("destroyed", &self.destroyed())
            .finish()
    }
}
