//! Growable buffer with an explicit doubling policy
//!
//! Every buffer half carried through an exchange channel is a [`GrowBuffer`].
//! Capacity starts small and only ever doubles. Growth is reported to the
//! pipeline's [`AllocContext`].
//!
//! Only the side currently owning the enclosing buffer may write to (and so
//! grow) a half. Ownership transfer through the exchange queues makes this
//! hold; nothing here checks it.

use std::ops::{Deref, DerefMut};

use crate::alloc::AllocContext;

/// Capacity used on first growth of an empty buffer.
pub const MIN_CAPACITY: usize = 8;

#[derive(Debug, Clone)]
pub struct GrowBuffer<T> {
    items: Vec<T>,
    /// Logical capacity; a power-of-two multiple of the first capacity
    capacity: usize,
    label: &'static str,
    ctx: AllocContext,
}

impl<T> GrowBuffer<T> {
    pub fn new(label: &'static str, ctx: &AllocContext) -> Self {
        Self {
            items: Vec::new(),
            capacity: 0,
            label,
            ctx: ctx.clone(),
        }
    }

    pub fn with_capacity(label: &'static str, capacity: usize, ctx: &AllocContext) -> Self {
        let mut buffer = Self::new(label, ctx);
        buffer.reserve_to(capacity);
        buffer
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an item, doubling capacity first if it is full.
    pub fn push(&mut self, item: T) {
        self.reserve_to(self.items.len() + 1);
        self.items.push(item);
    }

    /// Double capacity until `required` items fit.
    pub fn reserve_to(&mut self, required: usize) {
        if required <= self.capacity {
            return;
        }
        let old = self.capacity;
        let mut new_capacity = old.max(MIN_CAPACITY);
        while new_capacity < required {
            new_capacity *= 2;
        }
        self.items.reserve_exact(new_capacity - self.items.len());
        self.capacity = new_capacity;
        self.ctx.record_growth(
            self.label,
            old,
            new_capacity,
            (new_capacity - old) * std::mem::size_of::<T>(),
        );
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Move every item out, keeping capacity.
    pub fn drain(&mut self) -> std::vec::Drain<'_, T> {
        self.items.drain(..)
    }

    /// Move every item into `other`, leaving this buffer empty.
    pub fn drain_into(&mut self, other: &mut Vec<T>) {
        other.extend(self.items.drain(..));
    }
}

impl<T: Clone> GrowBuffer<T> {
    /// Replace contents with a copy of `src`.
    pub fn copy_from(&mut self, src: &[T]) {
        self.items.clear();
        self.extend_from_slice(src);
    }

    pub fn extend_from_slice(&mut self, src: &[T]) {
        self.reserve_to(self.items.len() + src.len());
        self.items.extend_from_slice(src);
    }

    /// Resize to `len`, filling new slots with `value`.
    pub fn resize(&mut self, len: usize, value: T) {
        self.reserve_to(len);
        self.items.resize(len, value);
    }
}

impl<T> Deref for GrowBuffer<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        &self.items
    }
}

impl<T> DerefMut for GrowBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        &mut self.items
    }
}

impl<'a, T> IntoIterator for &'a GrowBuffer<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capacity_only_doubles() {
        let ctx = AllocContext::new();
        let mut buf = GrowBuffer::new("test", &ctx);
        let mut seen = vec![];
        for i in 0..100u32 {
            buf.push(i);
            if seen.last() != Some(&buf.capacity()) {
                seen.push(buf.capacity());
            }
        }
        assert_eq!(seen, vec![8, 16, 32, 64, 128]);
        assert_eq!(ctx.stats().grow_events, 5);
        assert_eq!(ctx.stats().bytes_reserved, 128 * 4);
    }

    #[test]
    fn test_reserve_jumps_to_fitting_power() {
        let ctx = AllocContext::new();
        let mut buf: GrowBuffer<u8> = GrowBuffer::new("pixels", &ctx);
        buf.resize(320 * 200, 0);
        assert_eq!(buf.capacity(), 65536);
        assert_eq!(ctx.stats().grow_events, 1);
    }

    #[test]
    fn test_clear_keeps_capacity() {
        let ctx = AllocContext::new();
        let mut buf = GrowBuffer::with_capacity("log", 20, &ctx);
        buf.extend_from_slice(&[1, 2, 3]);
        buf.clear();
        buf.extend_from_slice(&[4; 32]);
        assert_eq!(buf.capacity(), 32);
        buf.clear();
        buf.copy_from(&[9; 10]);
        assert_eq!(buf.len(), 10);
        assert_eq!(ctx.stats().grow_events, 1);
    }

    #[test]
    fn test_drain_into_moves_everything() {
        let ctx = AllocContext::new();
        let mut buf = GrowBuffer::new("cmds", &ctx);
        buf.push("a");
        buf.push("b");
        let mut out = Vec::new();
        buf.drain_into(&mut out);
        assert!(buf.is_empty());
        assert_eq!(out, vec!["a", "b"]);
    }
}
