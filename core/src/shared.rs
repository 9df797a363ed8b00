//! Shared ownership cell with decoupled counter storage
//!
//! A [`Shared`] is a two-part handle: the payload lives behind an `Arc`,
//! while the reference count that decides when the payload is *destroyed*
//! lives in a separate counter slot. That slot is either a standalone heap
//! counter or an entry in a fixed [`CounterPool`], and it is returned to its
//! storage only after the payload's destroy hook has run.
//!
//! Copies are cheap and may cross thread boundaries inside buffer snapshots.
//! The destroy hook fires exactly once, on whichever thread drops the last
//! copy.

use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering, fence};
use std::sync::{Arc, Mutex};

type DestroyHook = Box<dyn FnOnce() + Send>;

/// Fixed-size storage for reference counters.
///
/// Payloads created through the pool share counter storage that outlives
/// nothing but itself: a slot is recycled the moment its count reaches zero
/// and its payload hook has run.
pub struct CounterPool {
    counts: Box<[AtomicUsize]>,
    free: Mutex<Vec<u32>>,
}

impl CounterPool {
    pub fn new(slots: usize) -> Arc<Self> {
        Arc::new(Self {
            counts: (0..slots).map(|_| AtomicUsize::new(0)).collect(),
            // Reversed so slot 0 is handed out first
            free: Mutex::new((0..slots as u32).rev().collect()),
        })
    }

    /// Number of unused counter slots.
    pub fn available(&self) -> usize {
        self.lock_free().len()
    }

    pub fn capacity(&self) -> usize {
        self.counts.len()
    }

    fn acquire(&self) -> Option<u32> {
        let slot = self.lock_free().pop()?;
        self.counts[slot as usize].store(1, Ordering::Relaxed);
        Some(slot)
    }

    fn release(&self, slot: u32) {
        debug_assert_eq!(self.counts[slot as usize].load(Ordering::Relaxed), 0);
        self.lock_free().push(slot);
    }

    fn lock_free(&self) -> std::sync::MutexGuard<'_, Vec<u32>> {
        self.free.lock().unwrap_or_else(|e| {
            tracing::warn!("Counter pool mutex poisoned; continuing");
            e.into_inner()
        })
    }
}

impl fmt::Debug for CounterPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CounterPool")
            .field("capacity", &self.capacity())
            .field("available", &self.available())
            .finish()
    }
}

/// Where a cell's counter lives.
#[derive(Clone)]
enum Counter {
    Heap(Arc<AtomicUsize>),
    Pooled { pool: Arc<CounterPool>, slot: u32 },
}

impl Counter {
    fn cell(&self) -> &AtomicUsize {
        match self {
            Counter::Heap(count) => count,
            Counter::Pooled { pool, slot } => &pool.counts[*slot as usize],
        }
    }

    /// Counter storage's own destroy step, run after the payload hook.
    fn release_storage(&self) {
        if let Counter::Pooled { pool, slot } = self {
            pool.release(*slot);
        }
    }
}

/// Type-erased half of a [`Shared`]: counter plus destroy hook.
///
/// Kept separate from the payload pointer so [`Shared::upcast`] can move
/// the payload into a new type without touching the count.
struct Owner {
    counter: Counter,
    hook: Arc<Mutex<Option<DestroyHook>>>,
}

impl Clone for Owner {
    fn clone(&self) -> Self {
        let previous = self.counter.cell().fetch_add(1, Ordering::Relaxed);
        assert!(previous > 0, "copy of a destroyed shared cell");
        Self {
            counter: self.counter.clone(),
            hook: self.hook.clone(),
        }
    }
}

impl Drop for Owner {
    fn drop(&mut self) {
        if self.counter.cell().fetch_sub(1, Ordering::Release) != 1 {
            return;
        }
        fence(Ordering::Acquire);

        let hook = self
            .hook
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(hook) = hook {
            hook();
        }
        self.counter.release_storage();
    }
}

/// Reference-counted shared payload with a pluggable destroy hook.
pub struct Shared<T: ?Sized> {
    payload: Arc<T>,
    owner: Owner,
}

impl<T: Send + Sync + 'static> Shared<T> {
    /// Wrap a payload with a heap counter and no destroy hook.
    pub fn new(payload: T) -> Self {
        Self::build(payload, None, None)
    }

    /// Wrap a payload with a heap counter and a destroy hook.
    pub fn with_destroy(payload: T, destroy: impl FnOnce(&T) + Send + 'static) -> Self {
        Self::build(payload, Some(Box::new(destroy)), None)
    }

    /// Wrap a payload whose counter lives in `pool`.
    ///
    /// Falls back to a heap counter when the pool is exhausted.
    pub fn pooled(
        payload: T,
        pool: &Arc<CounterPool>,
        destroy: impl FnOnce(&T) + Send + 'static,
    ) -> Self {
        Self::build(payload, Some(Box::new(destroy)), Some(pool))
    }

    fn build(
        payload: T,
        destroy: Option<Box<dyn FnOnce(&T) + Send>>,
        pool: Option<&Arc<CounterPool>>,
    ) -> Self {
        let payload = Arc::new(payload);

        let counter = match pool.and_then(|pool| pool.acquire().map(|slot| (pool, slot))) {
            Some((pool, slot)) => Counter::Pooled {
                pool: pool.clone(),
                slot,
            },
            None => {
                if pool.is_some() {
                    tracing::debug!("Counter pool exhausted, using heap counter");
                }
                Counter::Heap(Arc::new(AtomicUsize::new(1)))
            }
        };

        let hook = destroy.map(|destroy| {
            let target = payload.clone();
            Box::new(move || destroy(&target)) as DestroyHook
        });

        Self {
            payload,
            owner: Owner {
                counter,
                hook: Arc::new(Mutex::new(hook)),
            },
        }
    }
}

impl<T: ?Sized> Shared<T> {
    /// Narrow the payload type while keeping the same counter.
    ///
    /// `cast` is checked at compile time; the usual form is
    /// `shared.upcast(|p| p as Arc<dyn Trait>)`.
    pub fn upcast<U: ?Sized>(self, cast: impl FnOnce(Arc<T>) -> Arc<U>) -> Shared<U> {
        let Shared { payload, owner } = self;
        Shared {
            payload: cast(payload),
            owner,
        }
    }

    /// Current number of live copies.
    pub fn count(&self) -> usize {
        self.owner.counter.cell().load(Ordering::Acquire)
    }

    /// Whether two cells refer to the same payload.
    pub fn ptr_eq(a: &Self, b: &Self) -> bool {
        Arc::ptr_eq(&a.owner.hook, &b.owner.hook)
    }

    /// Whether the counter lives in a [`CounterPool`].
    pub fn is_pooled(&self) -> bool {
        matches!(self.owner.counter, Counter::Pooled { .. })
    }
}

impl<T: ?Sized> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            payload: self.payload.clone(),
            owner: self.owner.clone(),
        }
    }

    fn clone_from(&mut self, source: &Self) {
        if !Shared::ptr_eq(self, source) {
            *self = source.clone();
        }
    }
}

impl<T: ?Sized> Deref for Shared<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.payload
    }
}

impl<T: ?Sized + fmt::Debug> fmt::Debug for Shared<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Shared")
            .field("payload", &&*self.payload)
            .field("count", &self.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    fn counting_hook() -> (Arc<AtomicU32>, impl FnOnce(&String) + Send + 'static) {
        let fired = Arc::new(AtomicU32::new(0));
        let hook_fired = fired.clone();
        (fired, move |_: &String| {
            hook_fired.fetch_add(1, Ordering::SeqCst);
        })
    }

    // =============================================================
    // Refcount symmetry
    // =============================================================

    #[test]
    fn test_destroy_fires_once_after_last_copy() {
        let (fired, hook) = counting_hook();
        let a = Shared::with_destroy("payload".to_string(), hook);
        let b = a.clone();
        let c = b.clone();
        assert_eq!(a.count(), 3);

        drop(a);
        drop(c);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert_eq!(b.as_str(), "payload");

        drop(b);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_clone_from_releases_old_payload() {
        let (fired_a, hook_a) = counting_hook();
        let (fired_b, hook_b) = counting_hook();
        let mut a = Shared::with_destroy("a".to_string(), hook_a);
        let b = Shared::with_destroy("b".to_string(), hook_b);

        a.clone_from(&b);
        assert_eq!(fired_a.load(Ordering::SeqCst), 1);
        assert_eq!(b.count(), 2);
        assert_eq!(a.as_str(), "b");

        // Self-assignment must not touch the count
        let alias = a.clone();
        a.clone_from(&alias);
        assert_eq!(b.count(), 3);

        drop(a);
        drop(alias);
        drop(b);
        assert_eq!(fired_b.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_interleaved_copy_sequences() {
        for pattern in 0u32..64 {
            let (fired, hook) = counting_hook();
            let root = Shared::with_destroy("x".to_string(), hook);
            let mut copies = vec![root];
            for bit in 0..6 {
                if pattern & (1 << bit) != 0 {
                    let c = copies[0].clone();
                    copies.push(c);
                } else if copies.len() > 1 {
                    copies.remove(0);
                }
                assert_eq!(fired.load(Ordering::SeqCst), 0);
            }
            drop(copies);
            assert_eq!(fired.load(Ordering::SeqCst), 1, "pattern {pattern:06b}");
        }
    }

    #[test]
    fn test_last_drop_on_other_thread() {
        let (fired, hook) = counting_hook();
        let a = Shared::with_destroy("threaded".to_string(), hook);
        let b = a.clone();
        drop(a);
        std::thread::spawn(move || drop(b)).join().unwrap();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    // =============================================================
    // Pooled counters
    // =============================================================

    #[test]
    fn test_pooled_counter_returns_after_destroy() {
        let pool = CounterPool::new(2);
        let (fired, hook) = counting_hook();
        let a = Shared::pooled("pooled".to_string(), &pool, hook);
        assert!(a.is_pooled());
        assert_eq!(pool.available(), 1);

        let b = a.clone();
        drop(a);
        assert_eq!(pool.available(), 1);
        drop(b);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(pool.available(), 2);
    }

    #[test]
    fn test_exhausted_pool_falls_back_to_heap() {
        let pool = CounterPool::new(1);
        let first = Shared::pooled(1u32, &pool, |_| {});
        let second = Shared::pooled(2u32, &pool, |_| {});
        assert!(first.is_pooled());
        assert!(!second.is_pooled());
        drop(second);
        assert_eq!(pool.available(), 0);
        drop(first);
        assert_eq!(pool.available(), 1);
    }

    // =============================================================
    // Upcast
    // =============================================================

    trait Named: Send + Sync {
        fn name(&self) -> &str;
    }

    struct Thing(&'static str);

    impl Named for Thing {
        fn name(&self) -> &str {
            self.0
        }
    }

    #[test]
    fn test_upcast_shares_counter() {
        let fired = Arc::new(AtomicU32::new(0));
        let hook_fired = fired.clone();
        let thing = Shared::with_destroy(Thing("lamp"), move |t| {
            assert_eq!(t.0, "lamp");
            hook_fired.fetch_add(1, Ordering::SeqCst);
        });
        let keep = thing.clone();
        let named: Shared<dyn Named> = thing.upcast(|p| p as Arc<dyn Named>);

        assert_eq!(named.name(), "lamp");
        assert_eq!(named.count(), 2);
        drop(keep);
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        drop(named);
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }
}
