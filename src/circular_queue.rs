//! Growable circular FIFO queue with indexed access.
//!
//! # Design
//!
//! A heap ring of `MaybeUninit<T>` slots whose capacity is always zero or a
//! power of two, so physical positions are `(head + i) & mask` with no
//! division. The queue grows by doubling when full and never shrinks;
//! growth re-lays the live window out contiguously from physical index 0.
//!
//! Single-threaded by construction: all mutation goes through `&mut self`.
//! For the cross-thread variants see [`crate::single_producer_queue`].
//!
//! # Invariants
//! - `len <= capacity`; `head < capacity` whenever `capacity > 0`.
//! - Logical slots `[0, len)` are initialized, all others are not.
//! - Elements drop in FIFO order, in `clear` and in `Drop` alike.

use std::fmt;
use std::mem::MaybeUninit;
use std::ptr;
use std::slice;

/// Capacity of the first allocation when growing from an empty queue.
const INITIAL_CAPACITY: usize = 4;
const _: () = assert!(INITIAL_CAPACITY.is_power_of_two());

/// A growable ring-backed FIFO queue.
///
/// Pushes at the back, pops at the front, and answers indexed reads from
/// the front in O(1). Capacity doubles when exhausted, so `push_back` is
/// amortized O(1) and a queue sized with [`with_capacity`] never
/// reallocates until it outgrows that size.
///
/// [`with_capacity`]: CircularQueue::with_capacity
///
/// # Examples
///
/// ```
/// use conq::CircularQueue;
///
/// let mut queue = CircularQueue::new();
/// queue.push_back(1);
/// queue.push_back(2);
/// assert_eq!(queue.get(1), Some(&2));
/// assert_eq!(queue.pop_front(), Some(1));
/// ```
pub struct CircularQueue<T> {
    buf: Box<[MaybeUninit<T>]>,
    /// Physical index of the logical front. Meaningless while `capacity`
    /// is zero.
    head: usize,
    len: usize,
}

impl<T> CircularQueue<T> {
    /// Creates an empty queue without allocating.
    pub fn new() -> Self {
        Self {
            buf: Box::new_uninit_slice(0),
            head: 0,
            len: 0,
        }
    }

    /// Creates an empty queue able to hold `capacity` elements without
    /// reallocating.
    ///
    /// The actual capacity is `capacity` rounded up to a power of two;
    /// zero stays zero and allocates nothing.
    ///
    /// # Panics
    ///
    /// Panics if the rounded capacity overflows `usize`.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            0
        } else {
            capacity
                .checked_next_power_of_two()
                .unwrap_or_else(|| panic!("circular queue capacity overflow"))
        };
        Self {
            buf: Box::new_uninit_slice(capacity),
            head: 0,
            len: 0,
        }
    }

    /// Number of elements currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` when no elements are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of elements the queue can hold before reallocating.
    #[inline]
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Appends an element at the back, doubling the capacity first if the
    /// queue is full.
    ///
    /// # Panics
    ///
    /// Panics if the doubled capacity overflows `usize`.
    pub fn push_back(&mut self, value: T) {
        if self.len == self.buf.len() {
            self.grow();
        }
        let idx = self.physical(self.len);
        self.buf[idx].write(value);
        self.len += 1;
    }

    /// Removes and returns the front element, or `None` if empty.
    pub fn pop_front(&mut self) -> Option<T> {
        if self.len == 0 {
            return None;
        }
        // SAFETY: len > 0, so the slot at `head` is initialized; advancing
        // `head` past it transfers ownership to the caller.
        let value = unsafe { self.buf[self.head].assume_init_read() };
        self.head = self.physical(1);
        self.len -= 1;
        Some(value)
    }

    /// Returns the element at logical `index` from the front, or `None`
    /// when `index >= len`.
    #[inline]
    pub fn get(&self, index: usize) -> Option<&T> {
        if index >= self.len {
            return None;
        }
        let idx = self.physical(index);
        // SAFETY: index < len, so the slot is initialized.
        Some(unsafe { self.buf[idx].assume_init_ref() })
    }

    /// Mutable counterpart of [`get`](CircularQueue::get).
    #[inline]
    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index >= self.len {
            return None;
        }
        let idx = self.physical(index);
        // SAFETY: index < len, so the slot is initialized.
        Some(unsafe { self.buf[idx].assume_init_mut() })
    }

    /// Returns the front element without removing it.
    #[inline]
    pub fn front(&self) -> Option<&T> {
        self.get(0)
    }

    /// Mutable access to the front element.
    #[inline]
    pub fn front_mut(&mut self) -> Option<&mut T> {
        self.get_mut(0)
    }

    /// Returns the back element without removing it.
    #[inline]
    pub fn back(&self) -> Option<&T> {
        self.len.checked_sub(1).and_then(|i| self.get(i))
    }

    /// Mutable access to the back element.
    #[inline]
    pub fn back_mut(&mut self) -> Option<&mut T> {
        self.len.checked_sub(1).and_then(move |i| self.get_mut(i))
    }

    /// Drops all elements in FIFO order, keeping the allocation.
    pub fn clear(&mut self) {
        let (first, second) = self.as_mut_slices();
        let first: *mut [T] = first;
        let second: *mut [T] = second;
        // Reset the indices before dropping so a panicking destructor
        // leaks the remainder instead of double-dropping it.
        self.len = 0;
        self.head = 0;
        // SAFETY: both ranges were initialized and are no longer reachable
        // through the queue, so each element drops exactly once.
        unsafe {
            ptr::drop_in_place(first);
            ptr::drop_in_place(second);
        }
    }

    /// Iterates the elements front to back.
    pub fn iter(&self) -> Iter<'_, T> {
        let (first, second) = self.as_slices();
        Iter {
            first: first.iter(),
            second: second.iter(),
        }
    }

    /// The live window as up-to-two contiguous runs, front run first.
    fn as_slices(&self) -> (&[T], &[T]) {
        if self.len == 0 {
            return (&[], &[]);
        }
        let cap = self.buf.len();
        let first_len = self.len.min(cap - self.head);
        let second_len = self.len - first_len;
        let base = self.buf.as_ptr() as *const T;
        // SAFETY: logical slots [0, len) are initialized and the two
        // ranges cover exactly those slots without overlap.
        unsafe {
            (
                slice::from_raw_parts(base.add(self.head), first_len),
                slice::from_raw_parts(base, second_len),
            )
        }
    }

    fn as_mut_slices(&mut self) -> (&mut [T], &mut [T]) {
        if self.len == 0 {
            return (&mut [], &mut []);
        }
        let cap = self.buf.len();
        let first_len = self.len.min(cap - self.head);
        let second_len = self.len - first_len;
        let base = self.buf.as_mut_ptr() as *mut T;
        // SAFETY: as in `as_slices`, plus the ranges are disjoint so two
        // live mutable slices are sound.
        unsafe {
            (
                slice::from_raw_parts_mut(base.add(self.head), first_len),
                slice::from_raw_parts_mut(base, second_len),
            )
        }
    }

    /// Physical slot index of logical offset `logical` from the front.
    #[inline]
    fn physical(&self, logical: usize) -> usize {
        let cap = self.buf.len();
        debug_assert!(cap.is_power_of_two());
        debug_assert!(logical <= self.len);
        (self.head + logical) & (cap - 1)
    }

    /// Doubles the capacity and re-lays the live window out from physical
    /// index 0.
    #[cold]
    fn grow(&mut self) {
        let old_cap = self.buf.len();
        let new_cap = if old_cap == 0 {
            INITIAL_CAPACITY
        } else {
            old_cap
                .checked_mul(2)
                .unwrap_or_else(|| panic!("circular queue capacity overflow"))
        };
        let mut new_buf = Box::new_uninit_slice(new_cap);
        let first_len = self.len.min(old_cap - self.head);
        let second_len = self.len - first_len;
        // SAFETY: the source ranges hold the initialized window; a bitwise
        // copy moves ownership because the old buffer is freed without
        // dropping its slots.
        unsafe {
            let src = self.buf.as_ptr();
            let dst = new_buf.as_mut_ptr();
            ptr::copy_nonoverlapping(src.add(self.head), dst, first_len);
            ptr::copy_nonoverlapping(src, dst.add(first_len), second_len);
        }
        self.buf = new_buf;
        self.head = 0;
    }
}

impl<T> Drop for CircularQueue<T> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T> Default for CircularQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: fmt::Debug> fmt::Debug for CircularQueue<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.iter()).finish()
    }
}

impl<T> Extend<T> for CircularQueue<T> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T> FromIterator<T> for CircularQueue<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let iter = iter.into_iter();
        let (lower, _) = iter.size_hint();
        let mut queue = Self::with_capacity(lower);
        queue.extend(iter);
        queue
    }
}

impl<'a, T> IntoIterator for &'a CircularQueue<T> {
    type Item = &'a T;
    type IntoIter = Iter<'a, T>;

    fn into_iter(self) -> Iter<'a, T> {
        self.iter()
    }
}

/// Front-to-back iterator over a [`CircularQueue`].
#[derive(Clone, Debug)]
pub struct Iter<'a, T> {
    first: slice::Iter<'a, T>,
    second: slice::Iter<'a, T>,
}

impl<'a, T> Iterator for Iter<'a, T> {
    type Item = &'a T;

    fn next(&mut self) -> Option<&'a T> {
        match self.first.next() {
            Some(value) => Some(value),
            None => self.second.next(),
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.first.len() + self.second.len();
        (len, Some(len))
    }
}

impl<T> ExactSizeIterator for Iter<'_, T> {}
