//! Lock-free single-producer queue with work-stealing consumers.
//!
//! # Design
//!
//! Based on the Chase-Lev dynamic circular deque in the C11 formulation of
//! Lê, Pop, and Cohen ("Correct and Efficient Work-Stealing for Weak Memory
//! Models", PPoPP '13), the same family implemented by
//! [crossbeam-deque](https://github.com/crossbeam-rs/crossbeam). One owner
//! thread pushes and pops at the bottom end; any number of [`Stealer`]
//! handles claim the oldest item at the top end with a compare-exchange.
//!
//! # Key properties
//!
//! - **Owner operations are CAS-free** except when racing a stealer for
//!   the final item. `push` is a slot write plus a Release store.
//! - **Monotonic 64-bit indices**: `top` and `bottom` only grow (modulo
//!   the owner's transient decrement inside `try_pop`), so an index is
//!   claimed at most once and the CAS cannot suffer ABA.
//! - **Growth without blocking stealers**: a full ring is replaced by a
//!   double-size copy; the old buffer is retired behind the new one and
//!   stays allocated until the queue drops, so an in-flight stealer's
//!   speculative read always targets live memory.
//! - **Cache-line padded indices** via `crossbeam_utils::CachePadded` to
//!   keep owner and stealer traffic off each other's lines.
//! - **Power-of-2 capacity**: bitwise AND masking for O(1) slot lookup.
//!
//! # Ordering rationale
//!
//! ```text
//! owner writes slot, then Release-stores bottom  →  stealer Acquire-loads bottom, then reads slot
//! stealer SeqCst-CASes top to claim an index     →  owner's SeqCst fence in try_pop observes it
//! owner Release-stores the grown buffer pointer  →  stealer Acquire-loads buffer after bottom
//! ```
//!
//! The stealer loads `buffer` after `bottom`: any index it may claim was
//! published by a `bottom` store that happened after the buffer holding
//! that index was published, so the Acquire chain hands it a ring that
//! contains the item. The owner's capacity check (`bottom - top < cap`)
//! keeps it from rewriting a slot any stealer could still claim under the
//! observed `top`.
//!
//! # Safety
//!
//! Uses `unsafe` for `MaybeUninit` slot access through `UnsafeCell`. A
//! stealer reads its target slot before the CAS that claims it; that copy
//! is a plain `MaybeUninit` byte copy, interpreted only after the CAS
//! succeeds and dropped without running destructors when it fails. This is
//! the standard Chase-Lev speculation, shared with crossbeam-deque.

#[cfg(not(loom))]
use std::sync::atomic::{fence, AtomicI64, AtomicPtr, Ordering};

#[cfg(loom)]
use loom::sync::atomic::{fence, AtomicI64, AtomicPtr, Ordering};

use std::cell::UnsafeCell;
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::sync::Arc;

use crossbeam_utils::CachePadded;

// The 64-bit indices are what rule out ABA; they need native atomics.
const _: () = assert!(
    cfg!(target_has_atomic = "64"),
    "single_producer_queue requires 64-bit atomics"
);

/// Ring capacity allocated by [`SingleProducerQueue::new`].
const DEFAULT_CAPACITY: usize = 64;
const _: () = assert!(DEFAULT_CAPACITY.is_power_of_two());

// ============================================================================
// Ring Buffer
// ============================================================================

/// One ring allocation: a power-of-two slot array plus the buffer it
/// replaced, if any.
///
/// Slot contents are raw `MaybeUninit` bytes; which indices hold live
/// values is decided entirely by `top`/`bottom` in [`Inner`]. Retired
/// predecessors hang off `prev` so a stealer that grabbed the old pointer
/// can finish its read against stable memory.
struct Buffer<T> {
    /// `capacity - 1`; capacity is a power of two.
    mask: i64,
    /// The ring this one replaced. Kept allocated until the queue drops.
    prev: Option<Box<Buffer<T>>>,
    slots: Box<[UnsafeCell<MaybeUninit<T>>]>,
}

impl<T> Buffer<T> {
    fn with_capacity(capacity: usize, prev: Option<Box<Buffer<T>>>) -> Box<Self> {
        debug_assert!(capacity.is_power_of_two());
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect();
        Box::new(Self {
            mask: capacity as i64 - 1,
            prev,
            slots,
        })
    }

    #[inline]
    fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Bitwise copy of the slot at `index`.
    ///
    /// # Safety
    ///
    /// `index` must be non-negative. The result is only a byte copy;
    /// callers may `assume_init` it only once they own the index (owner
    /// claim in `try_pop`, or a won CAS in `steal`).
    #[inline]
    unsafe fn read(&self, index: i64) -> MaybeUninit<T> {
        debug_assert!(index >= 0);
        let slot = &self.slots[(index & self.mask) as usize];
        // SAFETY: in bounds via the mask; copying MaybeUninit bytes has no
        // validity requirement even mid-race.
        unsafe { slot.get().read() }
    }

    /// Writes the slot at `index`.
    ///
    /// # Safety
    ///
    /// Owner thread only, and only for an index outside every stealer's
    /// reach under the currently observed `top`.
    #[inline]
    unsafe fn write(&self, index: i64, value: MaybeUninit<T>) {
        debug_assert!(index >= 0);
        let slot = &self.slots[(index & self.mask) as usize];
        // SAFETY: in bounds via the mask; exclusivity per the contract.
        unsafe { slot.get().write(value) }
    }
}

// ============================================================================
// Shared State
// ============================================================================

/// State shared by the owner and every stealer.
///
/// # Invariants
///
/// - Live items occupy indices `[top, bottom)`; an index is never reused
///   for a new item.
/// - Only the owner stores `bottom`, and decrements it only transiently
///   inside `try_pop`.
/// - `top` advances only through a successful `SeqCst` compare-exchange,
///   one claim per index.
/// - Only the owner swaps `buffer`. Replaced rings are linked behind the
///   live one and freed when this struct drops.
struct Inner<T> {
    /// Stealers' end. Claimed upward by CAS.
    top: CachePadded<AtomicI64>,
    /// Owner's end. Release-stored after each slot write.
    bottom: CachePadded<AtomicI64>,
    /// The live ring. Stealers Acquire-load it after `bottom`.
    buffer: AtomicPtr<Buffer<T>>,
    /// The queue logically owns `T` values inside the buffers.
    _marker: PhantomData<T>,
}

impl<T> Drop for Inner<T> {
    fn drop(&mut self) {
        // Sole reference left; the loads cannot race anything.
        let top = self.top.load(Ordering::Relaxed);
        let bottom = self.bottom.load(Ordering::Relaxed);
        let buffer = self.buffer.load(Ordering::Relaxed);
        // SAFETY: `buffer` came from Box::into_raw and nothing else can
        // reach it; indices [top, bottom) hold the remaining live values,
        // each dropped exactly once. Retired rings hold only moved-out
        // bytes, so dropping the boxes frees them without touching `T`s.
        unsafe {
            let buffer = Box::from_raw(buffer);
            let mut index = top;
            while index < bottom {
                drop(buffer.read(index).assume_init());
                index += 1;
            }
        }
    }
}

// ============================================================================
// Owner
// ============================================================================

/// The owning end of a work-stealing queue.
///
/// Exactly one thread holds this handle; it pushes and pops at the bottom
/// end in LIFO order, while [`Stealer`]s take the oldest items from the
/// other end. All owner methods take `&mut self`, so the owner role cannot
/// be shared even though the handle itself is `Send`.
///
/// # Examples
///
/// ```
/// use conq::{SingleProducerQueue, Steal};
///
/// let mut queue = SingleProducerQueue::new();
/// let stealer = queue.stealer();
/// queue.push(1);
/// queue.push(2);
///
/// // The owner pops newest-first; stealers take oldest-first.
/// assert_eq!(queue.try_pop(), Some(2));
/// assert_eq!(stealer.steal(), Steal::Success(1));
/// ```
pub struct SingleProducerQueue<T> {
    inner: Arc<Inner<T>>,
}

// SAFETY: moving the handle moves only an Arc. Items cross threads solely
// as whole `T` values (push on the owner thread, steal elsewhere), which
// is what `T: Send` licenses; no `&T` into the queue is ever exposed, so
// no `T: Sync` requirement arises.
unsafe impl<T: Send> Send for SingleProducerQueue<T> {}
// SAFETY: the `&self` surface is `stealer`/`len`/`is_empty`/`capacity`,
// all safe under concurrent sharing; mutation requires `&mut self`, which
// shared borrows exclude.
unsafe impl<T: Send> Sync for SingleProducerQueue<T> {}

impl<T> SingleProducerQueue<T> {
    /// Creates a queue with the default initial capacity of 64.
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    /// Creates a queue whose ring holds `capacity` items before growing.
    ///
    /// The actual capacity is `capacity` rounded up to a power of two,
    /// minimum 1.
    ///
    /// # Panics
    ///
    /// Panics if the rounded capacity overflows `usize`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity
            .max(1)
            .checked_next_power_of_two()
            .unwrap_or_else(|| panic!("queue capacity overflow"));
        let buffer = Buffer::with_capacity(capacity, None);
        Self {
            inner: Arc::new(Inner {
                top: CachePadded::new(AtomicI64::new(0)),
                bottom: CachePadded::new(AtomicI64::new(0)),
                buffer: AtomicPtr::new(Box::into_raw(buffer)),
                _marker: PhantomData,
            }),
        }
    }

    /// Number of items currently queued.
    ///
    /// Exact while no stealer is active; otherwise a snapshot that may be
    /// stale by the time it returns.
    #[inline]
    pub fn len(&self) -> usize {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Relaxed);
        (b - t).max(0) as usize
    }

    /// Returns `true` when the queue holds no items.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current ring capacity.
    #[inline]
    pub fn capacity(&self) -> usize {
        // SAFETY: only the owner swaps the buffer, and it is live for the
        // lifetime of `inner`.
        unsafe { (*self.inner.buffer.load(Ordering::Relaxed)).capacity() }
    }

    /// Creates a stealer handle. Any number may exist at once.
    pub fn stealer(&self) -> Stealer<T> {
        Stealer {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Appends an item at the bottom end, doubling the ring first if it
    /// is full. Amortized O(1).
    ///
    /// # Ordering
    ///
    /// 1. Load `bottom` (Relaxed; the owner is its only writer).
    /// 2. Load `top` (Acquire); a stale value only over-counts the size
    ///    and forces a harmless early grow.
    /// 3. Write the slot, then Release-store `bottom + 1` so a stealer
    ///    that observes the new `bottom` also observes the slot contents.
    ///
    /// # Panics
    ///
    /// Panics if the doubled capacity overflows.
    pub fn push(&mut self, value: T) {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Acquire);
        let mut buffer = self.inner.buffer.load(Ordering::Relaxed);

        // SAFETY: owner-exclusive buffer pointer, live for `inner`'s life.
        if b - t == unsafe { (*buffer).capacity() } as i64 {
            self.grow(t, b);
            buffer = self.inner.buffer.load(Ordering::Relaxed);
        }

        // SAFETY: the live window is [t, b) and the ring now has spare
        // room, so no stealer can claim index `b` before the store below
        // publishes it.
        unsafe { (*buffer).write(b, MaybeUninit::new(value)) };
        self.inner.bottom.store(b + 1, Ordering::Release);
    }

    /// Appends an item only if the ring has room, handing the value back
    /// inside [`Full`] otherwise.
    #[inline]
    pub fn try_push(&mut self, value: T) -> Result<(), Full<T>> {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Acquire);
        let buffer = self.inner.buffer.load(Ordering::Relaxed);

        // SAFETY: owner-exclusive buffer pointer.
        if b - t == unsafe { (*buffer).capacity() } as i64 {
            return Err(Full(value));
        }
        // SAFETY: as in `push`.
        unsafe { (*buffer).write(b, MaybeUninit::new(value)) };
        self.inner.bottom.store(b + 1, Ordering::Release);
        Ok(())
    }

    /// Removes and returns the most recently pushed item still queued.
    ///
    /// # Ordering
    ///
    /// 1. Decrement `bottom` (Relaxed store), then a SeqCst fence: every
    ///    stealer either sees the decrement or had already claimed `top`
    ///    before our `top` load below.
    /// 2. Load `top` (Relaxed; the fence did the ordering).
    /// 3. With two or more items left the owner takes index `bottom - 1`
    ///    outright. For the final item it races stealers with a SeqCst
    ///    CAS on `top`; exactly one side wins.
    #[inline]
    pub fn try_pop(&mut self) -> Option<T> {
        let b = self.inner.bottom.load(Ordering::Relaxed) - 1;
        self.inner.bottom.store(b, Ordering::Relaxed);
        fence(Ordering::SeqCst);
        let t = self.inner.top.load(Ordering::Relaxed);

        if t > b {
            // Already empty; undo the reservation.
            self.inner.bottom.store(b + 1, Ordering::Relaxed);
            return None;
        }

        let buffer = self.inner.buffer.load(Ordering::Relaxed);
        if t == b {
            // Final item: claim it through `top` like a stealer would.
            let won = self
                .inner
                .top
                .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
                .is_ok();
            self.inner.bottom.store(b + 1, Ordering::Relaxed);
            if !won {
                // A stealer got there first; the queue is now empty.
                return None;
            }
            // SAFETY: the CAS claimed index `b` for the owner.
            return Some(unsafe { (*buffer).read(b).assume_init() });
        }

        // SAFETY: more than one item remains, so after the fence no
        // stealer can advance `top` past `b`; index `b` is owner-claimed.
        Some(unsafe { (*buffer).read(b).assume_init() })
    }

    /// Replaces the ring with one of twice the capacity, retiring the old
    /// allocation behind it.
    #[cold]
    fn grow(&mut self, top: i64, bottom: i64) {
        let old_ptr = self.inner.buffer.load(Ordering::Relaxed);
        // SAFETY: owner-exclusive; stealers only read through their own
        // Acquire loads.
        let old = unsafe { &*old_ptr };
        let new_capacity = old
            .capacity()
            .checked_mul(2)
            .unwrap_or_else(|| panic!("queue capacity overflow"));
        let mut new = Buffer::with_capacity(new_capacity, None);

        // Copy the live window. Both rings agree on every index in
        // [top, bottom), so a stealer finishing against the old ring and
        // one starting against the new ring read the same bytes.
        for index in top..bottom {
            // SAFETY: `index` was live when the owner entered `grow`; the
            // new ring is unpublished, so writes to it race nothing.
            unsafe { new.write(index, old.read(index)) };
        }

        // SAFETY: `old_ptr` came from Box::into_raw; linking it behind the
        // new ring keeps the allocation alive for in-flight stealers while
        // handing ownership to the new ring.
        new.prev = Some(unsafe { Box::from_raw(old_ptr) });
        self.inner
            .buffer
            .store(Box::into_raw(new), Ordering::Release);
    }
}

impl<T> Default for SingleProducerQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for SingleProducerQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleProducerQueue")
            .field("len", &self.len())
            .field("capacity", &self.capacity())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Stealer
// ============================================================================

/// A cloneable handle that takes the oldest queued item from any thread.
///
/// Stealing never blocks and never spins internally: a lost race reports
/// [`Steal::Retry`] and leaves the retry policy to the caller.
///
/// # Examples
///
/// ```
/// use conq::{SingleProducerQueue, Steal};
///
/// let mut queue = SingleProducerQueue::new();
/// queue.push("job");
///
/// let stealer = queue.stealer();
/// let worker = std::thread::spawn(move || stealer.steal());
/// assert_eq!(worker.join().unwrap(), Steal::Success("job"));
/// ```
pub struct Stealer<T> {
    inner: Arc<Inner<T>>,
}

// SAFETY: a stealer only moves whole `T` values out of the queue, which
// `T: Send` licenses, and its shared surface performs no unsynchronized
// access to them.
unsafe impl<T: Send> Send for Stealer<T> {}
unsafe impl<T: Send> Sync for Stealer<T> {}

impl<T> Stealer<T> {
    /// Attempts to take the oldest item in the queue.
    ///
    /// # Ordering
    ///
    /// 1. Load `top` (Acquire), SeqCst fence, load `bottom` (Acquire).
    ///    An empty window (`bottom <= top`) returns [`Steal::Empty`].
    /// 2. Load `buffer` (Acquire) after `bottom`: the ring observed here
    ///    contains every index the observed `bottom` covers.
    /// 3. Speculatively byte-copy slot `top`, then CAS `top` (SeqCst).
    ///    Success makes the copy the one live value; failure discards it
    ///    without interpreting the bytes and reports [`Steal::Retry`].
    #[inline]
    pub fn steal(&self) -> Steal<T> {
        let t = self.inner.top.load(Ordering::Acquire);
        fence(Ordering::SeqCst);
        let b = self.inner.bottom.load(Ordering::Acquire);

        if b <= t {
            return Steal::Empty;
        }

        let buffer = self.inner.buffer.load(Ordering::Acquire);
        // SAFETY: index `t` was observed live, the buffer stays allocated
        // for the queue's lifetime, and the copy is interpreted only if
        // the CAS below claims the index.
        let value = unsafe { (*buffer).read(t) };

        match self
            .inner
            .top
            .compare_exchange(t, t + 1, Ordering::SeqCst, Ordering::Relaxed)
        {
            // SAFETY: the CAS claimed index `t`; the copy is the live one.
            Ok(_) => Steal::Success(unsafe { value.assume_init() }),
            // `value` is a MaybeUninit, so the stale copy drops no `T`.
            Err(_) => Steal::Retry,
        }
    }

    /// Estimated number of queued items.
    ///
    /// Racy by nature: the owner and other stealers may move either index
    /// while this reads them. Useful for heuristics, not invariants.
    #[inline]
    pub fn len(&self) -> usize {
        let b = self.inner.bottom.load(Ordering::Relaxed);
        let t = self.inner.top.load(Ordering::Relaxed);
        (b - t).max(0) as usize
    }

    /// Estimated emptiness; the same caveats as [`len`](Stealer::len).
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> Clone for Stealer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for Stealer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stealer")
            .field("len", &self.len())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// Results
// ============================================================================

/// Outcome of a [`Stealer::steal`] attempt.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Steal<T> {
    /// The queue was observed empty.
    Empty,
    /// Lost a race with the owner or another stealer; retrying may succeed.
    Retry,
    /// Took the oldest item.
    Success(T),
}

impl<T> Steal<T> {
    /// Returns `true` for [`Steal::Empty`].
    #[inline]
    pub fn is_empty(&self) -> bool {
        matches!(self, Steal::Empty)
    }

    /// Returns `true` for [`Steal::Retry`].
    #[inline]
    pub fn is_retry(&self) -> bool {
        matches!(self, Steal::Retry)
    }

    /// Returns `true` for [`Steal::Success`].
    #[inline]
    pub fn is_success(&self) -> bool {
        matches!(self, Steal::Success(_))
    }

    /// Unwraps the stolen item, if any.
    #[inline]
    pub fn success(self) -> Option<T> {
        match self {
            Steal::Success(value) => Some(value),
            Steal::Empty | Steal::Retry => None,
        }
    }
}

/// Error of [`SingleProducerQueue::try_push`] on a full ring; carries the
/// rejected value back to the caller.
pub struct Full<T>(T);

impl<T> Full<T> {
    /// Recovers the value that did not fit.
    #[inline]
    pub fn into_inner(self) -> T {
        self.0
    }
}

// Written by hand so the error is debuggable for every `T`.
impl<T> fmt::Debug for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Full(..)")
    }
}

impl<T> fmt::Display for Full<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("single-producer queue is full")
    }
}

impl<T> std::error::Error for Full<T> {}

// ============================================================================
// Tests
// ============================================================================


// ============================================================================
// Loom Tests
// ============================================================================


// Property-based tests are in the sibling module single_producer_queue_tests.rs
#[cfg(all(test, feature = "prop-tests"))]
#[path = "single_producer_queue_tests.rs"]
mod single_producer_queue_tests;
