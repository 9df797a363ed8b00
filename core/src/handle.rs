//! Generation-counted handle table
//!
//! Maps a stable 64-bit [`Token`] to a mutable payload index. Tokens encode
//! `(generation << 32) | (slot + 1)`; releasing a slot bumps its generation so
//! every token issued for the previous occupant stops resolving. Free slots
//! are threaded into a FIFO list through their otherwise unused index field.

use std::fmt;

/// Initial slot capacity of a fresh table.
pub const INITIAL_CAPACITY: usize = 16;

/// Sentinel marking the end of the free list.
const NIL: u32 = u32::MAX;

/// Slot index inside a [`HandleTable`].
///
/// Only meaningful together with the table that issued it. Store a
/// [`Token`] when the reference must survive across ticks.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandleId(u32);

impl HandleId {
    /// Raw slot index.
    pub fn slot(self) -> u32 {
        self.0
    }
}

/// Stable, generation-tagged reference to a handle table slot.
///
/// Zero is never issued and can be used as a "none" value by callers that
/// store tokens in plain integers.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Token(u64);

impl Token {
    /// A token that never validates.
    pub const NONE: Token = Token(0);

    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    pub fn raw(self) -> u64 {
        self.0
    }

    /// Generation encoded in the upper 32 bits.
    pub fn generation(self) -> u32 {
        (self.0 >> 32) as u32
    }

    /// Slot index encoded in the lower 32 bits, if any.
    fn slot(self) -> Option<u32> {
        (self.0 as u32).checked_sub(1)
    }

    fn encode(slot: u32, generation: u32) -> Self {
        Self(((generation as u64) << 32) | (slot as u64 + 1))
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.slot() {
            Some(slot) => write!(f, "Token(slot={}, gen={})", slot, self.generation()),
            None => write!(f, "Token(none)"),
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Slot {
    /// Payload index while live, next free slot while on the free list
    index: u32,
    generation: u32,
    live: bool,
}

/// Arena of generation-counted slots.
#[derive(Debug)]
pub struct HandleTable {
    slots: Vec<Slot>,
    /// Logical capacity; only ever doubles
    capacity: usize,
    free_head: u32,
    free_tail: u32,
    live: usize,
}

impl Default for HandleTable {
    fn default() -> Self {
        Self::new()
    }
}

impl HandleTable {
    pub fn new() -> Self {
        Self::with_capacity(INITIAL_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            slots: Vec::with_capacity(capacity),
            capacity,
            free_head: NIL,
            free_tail: NIL,
            live: 0,
        }
    }

    /// Allocate a slot pointing at `payload_index`.
    ///
    /// Takes the next never-used slot, then recycles the oldest released
    /// slot, and only doubles capacity when both are exhausted.
    pub fn alloc(&mut self, payload_index: u32) -> HandleId {
        let slot = if self.slots.len() < self.capacity {
            self.push_fresh(payload_index)
        } else if self.free_head != NIL {
            let slot = self.free_head;
            let entry = &mut self.slots[slot as usize];
            self.free_head = entry.index;
            if self.free_head == NIL {
                self.free_tail = NIL;
            }
            entry.index = payload_index;
            entry.live = true;
            slot
        } else {
            self.grow();
            self.push_fresh(payload_index)
        };
        self.live += 1;
        HandleId(slot)
    }

    /// Release a slot, invalidating every token issued for it.
    ///
    /// Releasing a slot that is not live is an invariant violation.
    pub fn release(&mut self, id: HandleId) {
        let Some(entry) = self.slots.get_mut(id.0 as usize) else {
            panic!("release of out-of-range handle slot {}", id.0);
        };
        assert!(entry.live, "double release of handle slot {}", id.0);

        entry.live = false;
        entry.generation = entry.generation.wrapping_add(1);
        entry.index = NIL;

        if self.free_tail == NIL {
            self.free_head = id.0;
        } else {
            self.slots[self.free_tail as usize].index = id.0;
        }
        self.free_tail = id.0;
        self.live -= 1;
    }

    /// Payload index of a live slot, or `None` when the slot is gone.
    pub fn index_of(&self, id: HandleId) -> Option<u32> {
        self.slots
            .get(id.0 as usize)
            .filter(|slot| slot.live)
            .map(|slot| slot.index)
    }

    /// Repoint a live slot at a new payload index (after the payload moved).
    pub fn update_index(&mut self, id: HandleId, new_index: u32) {
        match self.slots.get_mut(id.0 as usize) {
            Some(slot) if slot.live => slot.index = new_index,
            _ => panic!("update_index on dead handle slot {}", id.0),
        }
    }

    /// Whether `token` still refers to the slot's current occupant.
    pub fn validate(&self, token: Token) -> bool {
        self.from_token(token).is_some()
    }

    /// Encode a live slot as a stable token.
    pub fn to_token(&self, id: HandleId) -> Token {
        let slot = &self.slots[id.0 as usize];
        debug_assert!(slot.live, "token requested for dead slot {}", id.0);
        Token::encode(id.0, slot.generation)
    }

    /// Decode a token, rejecting stale generations and foreign slots.
    pub fn from_token(&self, token: Token) -> Option<HandleId> {
        let slot = token.slot()?;
        let entry = self.slots.get(slot as usize)?;
        (entry.live && entry.generation == token.generation()).then_some(HandleId(slot))
    }

    /// Resolve a token straight to its payload index.
    pub fn resolve(&self, token: Token) -> Option<u32> {
        self.from_token(token).and_then(|id| self.index_of(id))
    }

    /// Number of live slots.
    pub fn len(&self) -> usize {
        self.live
    }

    pub fn is_empty(&self) -> bool {
        self.live == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Tear the table down, invalidating every outstanding token.
    ///
    /// Generations survive so tokens issued before the clear never validate
    /// against slots allocated after it.
    pub fn clear(&mut self) {
        let ids: Vec<u32> = (0..self.slots.len() as u32)
            .filter(|&i| self.slots[i as usize].live)
            .collect();
        for id in ids {
            self.release(HandleId(id));
        }
    }

    fn push_fresh(&mut self, payload_index: u32) -> u32 {
        // Slot u32::MAX would spill into the generation bits once encoded
        debug_assert!(self.slots.len() < u32::MAX as usize, "handle table full");
        let slot = self.slots.len() as u32;
        self.slots.push(Slot {
            index: payload_index,
            generation: 0,
            live: true,
        });
        slot
    }

    fn grow(&mut self) {
        let new_capacity = self.capacity * 2;
        self.slots.reserve_exact(new_capacity - self.slots.len());
        tracing::trace!(
            "Handle table grew from {} to {} slots",
            self.capacity,
            new_capacity
        );
        self.capacity = new_capacity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // =============================================================
    // Allocation
    // =============================================================

    #[test]
    fn test_highest_slot_keeps_generation_bits() {
        let token = Token::encode(u32::MAX - 1, 9);
        assert_eq!(token.slot(), Some(u32::MAX - 1));
        assert_eq!(token.generation(), 9);
    }

    #[test]
    fn test_fresh_slots_start_at_generation_zero() {
        let mut table = HandleTable::new();
        let id = table.alloc(7);
        let token = table.to_token(id);
        assert_eq!(token.generation(), 0);
        assert_eq!(token.raw(), 1);
        assert_eq!(table.index_of(id), Some(7));
    }

    #[test]
    fn test_never_used_slots_before_free_list() {
        let mut table = HandleTable::with_capacity(4);
        let a = table.alloc(0);
        table.release(a);
        // Slot 0 is free, but slots 1..4 have never been used
        let b = table.alloc(1);
        assert_eq!(b.slot(), 1);
    }

    #[test]
    fn test_free_list_is_fifo() {
        let mut table = HandleTable::with_capacity(3);
        let ids: Vec<_> = (0..3).map(|i| table.alloc(i)).collect();
        table.release(ids[2]);
        table.release(ids[0]);
        assert_eq!(table.alloc(10).slot(), 2);
        assert_eq!(table.alloc(11).slot(), 0);
    }

    #[test]
    fn test_capacity_doubles_when_exhausted() {
        let mut table = HandleTable::with_capacity(2);
        table.alloc(0);
        table.alloc(1);
        assert_eq!(table.capacity(), 2);
        table.alloc(2);
        assert_eq!(table.capacity(), 4);
        table.alloc(3);
        table.alloc(4);
        assert_eq!(table.capacity(), 8);
        assert_eq!(table.len(), 5);
    }

    // =============================================================
    // Tokens
    // =============================================================

    #[test]
    fn test_token_round_trip_tracks_update_index() {
        let mut table = HandleTable::new();
        let ids: Vec<_> = (0..40).map(|i| table.alloc(i)).collect();
        for (n, id) in ids.iter().enumerate() {
            table.update_index(*id, 1000 + n as u32);
        }
        for (n, id) in ids.iter().enumerate() {
            let token = table.to_token(*id);
            let back = table.from_token(token).expect("live token");
            assert_eq!(back, *id);
            assert_eq!(table.index_of(back), Some(1000 + n as u32));
        }
    }

    #[test]
    fn test_generation_invalidates_recycled_slot() {
        let mut table = HandleTable::with_capacity(1);
        let first = table.alloc(5);
        let stale = table.to_token(first);
        table.release(first);

        let second = table.alloc(9);
        assert_eq!(second.slot(), first.slot());
        let fresh = table.to_token(second);

        assert_eq!(fresh.generation(), 1);
        assert!(table.from_token(stale).is_none());
        assert!(!table.validate(stale));
        assert_eq!(table.resolve(fresh), Some(9));
    }

    #[test]
    fn test_released_token_is_invalid_before_reuse() {
        let mut table = HandleTable::new();
        let id = table.alloc(3);
        let token = table.to_token(id);
        table.release(id);
        assert!(!table.validate(token));
        assert_eq!(table.index_of(id), None);
    }

    #[test]
    fn test_out_of_range_lookups_are_not_found() {
        let table = HandleTable::new();
        assert_eq!(table.index_of(HandleId(99)), None);
        assert!(table.from_token(Token::from_raw(50)).is_none());
        assert!(table.from_token(Token::NONE).is_none());
    }

    #[test]
    fn test_clear_invalidates_everything() {
        let mut table = HandleTable::new();
        let tokens: Vec<_> = (0..5)
            .map(|i| {
                let id = table.alloc(i);
                table.to_token(id)
            })
            .collect();
        table.clear();
        assert!(table.is_empty());
        assert!(tokens.iter().all(|t| !table.validate(*t)));
    }

    #[test]
    #[should_panic(expected = "double release")]
    fn test_double_release_panics() {
        let mut table = HandleTable::new();
        let id = table.alloc(0);
        table.release(id);
        table.release(id);
    }
}
