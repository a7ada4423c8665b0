//! Unbounded FIFO queue over a chain of heap blocks.
//!
//! # Design
//!
//! Elements live in fixed-capacity blocks linked head to tail. Each block
//! is a single allocation: a `BlockHeader` followed inline by its slot
//! array, laid out with `Layout::extend` so the header/slot split respects
//! `T`'s alignment. Pushes fill the tail block and pops drain the head
//! block, so both ends touch exactly one block and nothing ever moves.
//!
//! Compared to [`crate::circular_queue`], growth never copies elements and
//! element addresses are stable until popped; the price is a pointer chase
//! at block boundaries.
//!
//! Block sizing is delegated to a [`GrowthPolicy`] carried in a
//! [`CompressedPair`] next to the element count, so the default ZST policy
//! adds nothing to the queue's footprint.
//!
//! # Invariants
//! - In every block `begin <= end <= capacity`, and slots `[begin, end)`
//!   are initialized.
//! - Only the head block may have `begin > 0`; only the tail block may
//!   have `end < capacity`; interior blocks are full.
//! - `len` equals the sum of `end - begin` over the chain.
//! - A lone block is recycled in place when it empties; a head block with
//!   a successor is freed the moment its last element pops.

use std::alloc::{alloc, dealloc, handle_alloc_error, Layout};
use std::fmt;
use std::marker::PhantomData;
use std::mem::MaybeUninit;
use std::ptr::{self, NonNull};

use crate::compressed_pair::CompressedPair;

/// Capacity of the first block allocated by [`Doubling`].
const FIRST_BLOCK_CAPACITY: usize = 64;
/// Per-block capacity ceiling for [`Doubling`].
const MAX_BLOCK_CAPACITY: usize = 1024;
const _: () = assert!(FIRST_BLOCK_CAPACITY >= 1);
const _: () = assert!(FIRST_BLOCK_CAPACITY <= MAX_BLOCK_CAPACITY);

/// Chooses the capacity of each newly allocated block.
///
/// `prev` is the capacity of the most recently allocated block, or zero
/// when the queue has never allocated. Results below 1 are treated as 1.
pub trait GrowthPolicy {
    /// Capacity for the next block, given the previous block's capacity.
    fn next_block_capacity(&self, prev: usize) -> usize;
}

/// Default policy: 64-slot first block, doubling to a 1024-slot ceiling.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Doubling;

impl GrowthPolicy for Doubling {
    #[inline]
    fn next_block_capacity(&self, prev: usize) -> usize {
        if prev == 0 {
            FIRST_BLOCK_CAPACITY
        } else {
            prev.saturating_mul(2).min(MAX_BLOCK_CAPACITY)
        }
    }
}

/// Every block gets the same caller-chosen capacity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Fixed(pub usize);

impl GrowthPolicy for Fixed {
    #[inline]
    fn next_block_capacity(&self, _prev: usize) -> usize {
        self.0
    }
}

/// Bookkeeping at the front of every block allocation.
///
/// The slot array trails the header in the same allocation; reach it with
/// [`slot_ptr`], never through a reference to the header.
struct BlockHeader<T> {
    next: Option<NonNull<BlockHeader<T>>>,
    capacity: usize,
    /// First initialized slot.
    begin: usize,
    /// One past the last initialized slot.
    end: usize,
    /// Ties `T` to the header; the slots live past the struct's own end.
    _marker: PhantomData<T>,
}

impl<T> BlockHeader<T> {
    #[inline]
    fn len(&self) -> usize {
        self.end - self.begin
    }

    #[inline]
    fn is_empty(&self) -> bool {
        self.begin == self.end
    }

    #[inline]
    fn is_full(&self) -> bool {
        self.end == self.capacity
    }
}

/// Combined layout of a block: header plus `capacity` inline slots.
fn block_layout<T>(capacity: usize) -> (Layout, usize) {
    let header = Layout::new::<BlockHeader<T>>();
    let slots = Layout::array::<MaybeUninit<T>>(capacity)
        .unwrap_or_else(|_| panic!("block queue capacity overflow"));
    let (layout, offset) = header
        .extend(slots)
        .unwrap_or_else(|_| panic!("block queue capacity overflow"));
    (layout.pad_to_align(), offset)
}

/// Byte offset of the slot array inside a block allocation.
#[inline]
fn slot_offset<T>() -> usize {
    // The array's placement depends only on T's alignment, so a
    // single-element layout yields the same offset as any capacity.
    match Layout::new::<BlockHeader<T>>().extend(Layout::new::<T>()) {
        Ok((_, offset)) => offset,
        Err(_) => unreachable!("header plus one element always has a layout"),
    }
}

/// Pointer to slot `index` of `block`.
///
/// Derived from the allocation pointer rather than a header reference so
/// it is allowed to address past the header.
///
/// # Safety
///
/// `block` must point at a live block and `index` must not exceed its
/// capacity; the result may be dereferenced only for `index` strictly
/// inside the capacity.
unsafe fn slot_ptr<T>(block: NonNull<BlockHeader<T>>, index: usize) -> *mut MaybeUninit<T> {
    // SAFETY: per the contract the offset stays inside (or one past) the
    // block allocation.
    unsafe {
        debug_assert!(index <= (*block.as_ptr()).capacity);
        (block.as_ptr() as *mut u8)
            .add(slot_offset::<T>())
            .cast::<MaybeUninit<T>>()
            .add(index)
    }
}

/// Allocates an empty block of exactly `capacity` slots.
fn alloc_block<T>(capacity: usize) -> NonNull<BlockHeader<T>> {
    debug_assert!(capacity >= 1);
    let (layout, _) = block_layout::<T>(capacity);
    // SAFETY: the layout is non-zero-sized because it contains the header.
    let raw = unsafe { alloc(layout) } as *mut BlockHeader<T>;
    let Some(block) = NonNull::new(raw) else {
        handle_alloc_error(layout);
    };
    // SAFETY: freshly allocated, correctly laid out for a header write.
    unsafe {
        block.as_ptr().write(BlockHeader {
            next: None,
            capacity,
            begin: 0,
            end: 0,
            _marker: PhantomData,
        });
    }
    block
}

/// Frees a block allocation without touching its slots.
///
/// # Safety
///
/// `block` must be live, must have been produced by [`alloc_block`], and
/// its initialized slots must already have been dropped or moved out.
unsafe fn free_block<T>(block: NonNull<BlockHeader<T>>) {
    // SAFETY: capacity is the one the block was allocated with, so the
    // layout matches the allocation.
    unsafe {
        let capacity = (*block.as_ptr()).capacity;
        let (layout, _) = block_layout::<T>(capacity);
        dealloc(block.as_ptr() as *mut u8, layout);
    }
}

/// An unbounded FIFO queue of linked fixed-capacity blocks.
///
/// Pushed elements never move until they are popped, and growing the
/// queue allocates a block without copying anything. The block sizing
/// strategy is the `P` parameter; the default [`Doubling`] policy starts
/// at 64 slots and doubles up to 1024.
///
/// # Examples
///
/// ```
/// use conq::BlockQueue;
///
/// let mut queue: BlockQueue<u32> = BlockQueue::new();
/// queue.push_back(1);
/// queue.push_back(2);
/// assert_eq!(queue.pop_front(), Some(1));
/// assert_eq!(queue.len(), 1);
/// ```
pub struct BlockQueue<T, P: GrowthPolicy = Doubling> {
    head: Option<NonNull<BlockHeader<T>>>,
    tail: Option<NonNull<BlockHeader<T>>>,
    /// Element count paired with the growth policy; a ZST policy is free.
    len_and_policy: CompressedPair<usize, P>,
    _marker: PhantomData<T>,
}

// SAFETY: the queue exclusively owns its block chain; moving it across
// threads moves plain heap data, and shared access only hands out `&T`.
unsafe impl<T: Send, P: GrowthPolicy + Send> Send for BlockQueue<T, P> {}
unsafe impl<T: Sync, P: GrowthPolicy + Sync> Sync for BlockQueue<T, P> {}

impl<T, P: GrowthPolicy + Default> BlockQueue<T, P> {
    /// Creates an empty queue with the default policy. Allocates nothing.
    pub fn new() -> Self {
        Self::with_policy(P::default())
    }
}

impl<T, P: GrowthPolicy> BlockQueue<T, P> {
    /// Creates an empty queue with an explicit growth policy. Allocates
    /// nothing until the first push.
    pub fn with_policy(policy: P) -> Self {
        Self {
            head: None,
            tail: None,
            len_and_policy: CompressedPair::new(0, policy),
            _marker: PhantomData,
        }
    }

    /// Number of elements currently queued.
    #[inline]
    pub fn len(&self) -> usize {
        *self.len_and_policy.first()
    }

    /// Returns `true` when no elements are queued.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Appends an element at the back.
    ///
    /// Allocates a block only when the tail block is full or the queue
    /// has none.
    pub fn push_back(&mut self, value: T) {
        let tail = match self.tail {
            // SAFETY: the tail pointer, when present, is a live block.
            Some(tail) if unsafe { !(*tail.as_ptr()).is_full() } => tail,
            _ => self.grow_tail(),
        };
        // SAFETY: the chosen tail block has a free slot at `end`.
        unsafe {
            let end = (*tail.as_ptr()).end;
            debug_assert!(end < (*tail.as_ptr()).capacity);
            (*slot_ptr(tail, end)).write(value);
            (*tail.as_ptr()).end = end + 1;
        }
        *self.len_and_policy.first_mut() += 1;
        #[cfg(debug_assertions)]
        self.check_invariants();
    }

    /// Removes and returns the front element, or `None` if empty.
    pub fn pop_front(&mut self) -> Option<T> {
        let head = self.head?;
        // SAFETY: `head` is live; when it holds an element the slot at
        // `begin` is initialized and advancing `begin` makes it ours.
        let value = unsafe {
            let header = &mut *head.as_ptr();
            if header.is_empty() {
                // A lone recycled block; the queue is empty.
                debug_assert_eq!(self.tail, Some(head));
                return None;
            }
            let begin = header.begin;
            header.begin = begin + 1;
            (*slot_ptr(head, begin)).assume_init_read()
        };
        *self.len_and_policy.first_mut() -= 1;
        self.retire_head_if_empty(head);
        #[cfg(debug_assertions)]
        self.check_invariants();
        Some(value)
    }

    /// Returns the front element without removing it.
    pub fn front(&self) -> Option<&T> {
        let head = self.head?;
        // SAFETY: non-empty head block keeps slot `begin` initialized for
        // the duration of the shared borrow.
        unsafe {
            let header = &*head.as_ptr();
            if header.is_empty() {
                return None;
            }
            Some((*slot_ptr(head, header.begin)).assume_init_ref())
        }
    }

    /// Mutable access to the front element.
    pub fn front_mut(&mut self) -> Option<&mut T> {
        let head = self.head?;
        // SAFETY: as in `front`, with exclusivity from `&mut self`.
        unsafe {
            let header = &*head.as_ptr();
            if header.is_empty() {
                return None;
            }
            Some((*slot_ptr(head, header.begin)).assume_init_mut())
        }
    }

    /// Returns the back element without removing it.
    pub fn back(&self) -> Option<&T> {
        let tail = self.tail?;
        // SAFETY: a non-empty tail block keeps slot `end - 1` initialized
        // for the duration of the shared borrow.
        unsafe {
            let header = &*tail.as_ptr();
            if header.is_empty() {
                return None;
            }
            Some((*slot_ptr(tail, header.end - 1)).assume_init_ref())
        }
    }

    /// Mutable access to the back element.
    pub fn back_mut(&mut self) -> Option<&mut T> {
        let tail = self.tail?;
        // SAFETY: as in `back`, with exclusivity from `&mut self`.
        unsafe {
            let header = &*tail.as_ptr();
            if header.is_empty() {
                return None;
            }
            Some((*slot_ptr(tail, header.end - 1)).assume_init_mut())
        }
    }

    /// Drops all elements in FIFO order and frees every block, returning
    /// the queue to its unallocated state.
    pub fn clear(&mut self) {
        let mut cursor = self.head.take();
        self.tail = None;
        *self.len_and_policy.first_mut() = 0;
        while let Some(block) = cursor {
            // SAFETY: the chain is exclusively ours; each block's
            // initialized span drops exactly once before the block frees.
            unsafe {
                let header = &mut *block.as_ptr();
                cursor = header.next;
                let begin = header.begin;
                let count = header.len();
                header.begin = header.end;
                let live = ptr::slice_from_raw_parts_mut(
                    slot_ptr(block, begin) as *mut T,
                    count,
                );
                ptr::drop_in_place(live);
                free_block(block);
            }
        }
    }

    /// Allocates the next block per the policy and links it at the tail.
    #[cold]
    fn grow_tail(&mut self) -> NonNull<BlockHeader<T>> {
        let prev_capacity = match self.tail {
            // SAFETY: live block owned by the queue.
            Some(tail) => unsafe { (*tail.as_ptr()).capacity },
            None => 0,
        };
        let capacity = self
            .len_and_policy
            .second()
            .next_block_capacity(prev_capacity)
            .max(1);
        let block = alloc_block::<T>(capacity);
        match self.tail {
            // SAFETY: the old tail is live; linking does not move slots.
            Some(tail) => unsafe { (*tail.as_ptr()).next = Some(block) },
            None => self.head = Some(block),
        }
        self.tail = Some(block);
        block
    }

    /// Frees an emptied head block, or recycles it in place when it is
    /// the only block in the chain.
    fn retire_head_if_empty(&mut self, head: NonNull<BlockHeader<T>>) {
        debug_assert_eq!(self.head, Some(head));
        // SAFETY: `head` is live and owned by the queue.
        let (empty, next) = unsafe {
            let header = &*head.as_ptr();
            (header.is_empty(), header.next)
        };
        if !empty {
            return;
        }
        match next {
            Some(next) => {
                self.head = Some(next);
                // SAFETY: unlinked and empty, nothing references it now.
                unsafe { free_block(head) };
            }
            None => {
                debug_assert_eq!(self.tail, Some(head));
                // SAFETY: resetting the offsets recycles the lone block.
                unsafe {
                    let header = &mut *head.as_ptr();
                    header.begin = 0;
                    header.end = 0;
                }
            }
        }
    }

    /// Number of blocks currently allocated.
    fn block_count(&self) -> usize {
        let mut count = 0;
        let mut cursor = self.head;
        while let Some(block) = cursor {
            count += 1;
            // SAFETY: every link in the chain points at a live block.
            cursor = unsafe { (*block.as_ptr()).next };
        }
        count
    }

    /// Walks the chain and asserts the structural invariants.
    #[cfg(any(debug_assertions, test))]
    fn check_invariants(&self) {
        assert_eq!(self.head.is_some(), self.tail.is_some());
        let mut total = 0;
        let mut cursor = self.head;
        while let Some(block) = cursor {
            // SAFETY: live chain owned by the queue.
            let header = unsafe { &*block.as_ptr() };
            assert!(header.capacity >= 1);
            assert!(header.begin <= header.end);
            assert!(header.end <= header.capacity);
            if Some(block) != self.head {
                assert_eq!(header.begin, 0, "only the head block may be partially popped");
            }
            if Some(block) != self.tail {
                assert!(header.is_full(), "interior blocks must be full");
            }
            total += header.len();
            cursor = header.next;
        }
        assert_eq!(total, self.len());
    }
}

impl<T, P: GrowthPolicy> Drop for BlockQueue<T, P> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, P: GrowthPolicy + Default> Default for BlockQueue<T, P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T, P: GrowthPolicy> fmt::Debug for BlockQueue<T, P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockQueue")
            .field("len", &self.len())
            .field("blocks", &self.block_count())
            .finish_non_exhaustive()
    }
}

impl<T, P: GrowthPolicy> Extend<T> for BlockQueue<T, P> {
    fn extend<I: IntoIterator<Item = T>>(&mut self, iter: I) {
        for value in iter {
            self.push_back(value);
        }
    }
}

impl<T, P: GrowthPolicy + Default> FromIterator<T> for BlockQueue<T, P> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        let mut queue = Self::new();
        queue.extend(iter);
        queue
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::mem::size_of;
    use std::rc::Rc;

    // The pair earns its keep: the default queue is three words.
    const _: () = assert!(size_of::<BlockQueue<u64>>() == 3 * size_of::<usize>());
    const _: () = assert!(size_of::<BlockQueue<u64, Fixed>>() == 4 * size_of::<usize>());

    #[test]
    fn starts_unallocated() {
        let mut queue: BlockQueue<u32> = BlockQueue::new();
        assert_eq!(queue.len(), 0);
        assert!(queue.is_empty());
        assert_eq!(queue.block_count(), 0);
        assert_eq!(queue.pop_front(), None);
        assert_eq!(queue.front(), None);
        assert_eq!(queue.back(), None);
    }

    #[test]
    fn fifo_across_blocks() {
        let mut queue: BlockQueue<u32, Fixed> = BlockQueue::with_policy(Fixed(4));
        for i in 0..17 {
            queue.push_back(i);
        }
        assert_eq!(queue.len(), 17);
        assert_eq!(queue.block_count(), 5);
        for i in 0..17 {
            assert_eq!(queue.pop_front(), Some(i));
        }
        assert_eq!(queue.pop_front(), None);
    }

    #[test]
    fn doubling_schedule() {
        let policy = Doubling;
        assert_eq!(policy.next_block_capacity(0), 64);
        assert_eq!(policy.next_block_capacity(64), 128);
        assert_eq!(policy.next_block_capacity(512), 1024);
        assert_eq!(policy.next_block_capacity(1024), 1024);

        let mut queue: BlockQueue<u32> = BlockQueue::new();
        for i in 0..64 {
            queue.push_back(i);
        }
        assert_eq!(queue.block_count(), 1);
        queue.push_back(64);
        assert_eq!(queue.block_count(), 2);
    }

    #[test]
    fn fixed_policy_clamps_to_one() {
        let mut queue: BlockQueue<u8, Fixed> = BlockQueue::with_policy(Fixed(0));
        for i in 0..3 {
            queue.push_back(i);
        }
        assert_eq!(queue.block_count(), 3);
        assert_eq!(queue.pop_front(), Some(0));
        assert_eq!(queue.pop_front(), Some(1));
        assert_eq!(queue.pop_front(), Some(2));
    }

    #[test]
    #[should_panic(expected = "block queue capacity overflow")]
    fn push_panics_on_layout_overflow() {
        // A capacity this large overflows the slot-array layout before the
        // allocator is ever asked for memory.
        let mut queue: BlockQueue<u64, Fixed> = BlockQueue::with_policy(Fixed(usize::MAX));
        queue.push_back(0);
    }

    #[test]
    fn head_blocks_freed_as_they_drain() {
        let mut queue: BlockQueue<u32, Fixed> = BlockQueue::with_policy(Fixed(2));
        queue.extend(0..6);
        assert_eq!(queue.block_count(), 3);
        queue.pop_front();
        queue.pop_front();
        assert_eq!(queue.block_count(), 2);
        queue.pop_front();
        queue.pop_front();
        assert_eq!(queue.block_count(), 1);
        queue.pop_front();
        queue.pop_front();
        // The last block is recycled, not freed.
        assert_eq!(queue.block_count(), 1);
        assert!(queue.is_empty());
    }

    #[test]
    fn lone_block_recycles_in_place() {
        let mut queue: BlockQueue<u32, Fixed> = BlockQueue::with_policy(Fixed(8));
        queue.extend(0..5);
        for i in 0..5 {
            assert_eq!(queue.pop_front(), Some(i));
        }
        assert_eq!(queue.block_count(), 1);
        // A full recycled block refills without allocating a second one.
        queue.extend(10..18);
        assert_eq!(queue.block_count(), 1);
        assert_eq!(queue.front(), Some(&10));
        assert_eq!(queue.back(), Some(&17));
    }

    #[test]
    fn front_back_accessors() {
        let mut queue: BlockQueue<u32, Fixed> = BlockQueue::with_policy(Fixed(2));
        queue.extend(0..5);
        assert_eq!(queue.front(), Some(&0));
        assert_eq!(queue.back(), Some(&4));
        *queue.front_mut().unwrap() = 100;
        *queue.back_mut().unwrap() = 400;
        assert_eq!(queue.pop_front(), Some(100));
        queue.pop_front();
        queue.pop_front();
        queue.pop_front();
        assert_eq!(queue.pop_front(), Some(400));
    }

    #[test]
    fn clear_returns_to_unallocated() {
        let mut queue: BlockQueue<u32, Fixed> = BlockQueue::with_policy(Fixed(3));
        queue.extend(0..10);
        assert_eq!(queue.block_count(), 4);
        queue.clear();
        assert_eq!(queue.len(), 0);
        assert_eq!(queue.block_count(), 0);
        assert_eq!(queue.pop_front(), None);
        queue.push_back(7);
        assert_eq!(queue.front(), Some(&7));
    }

    /// Records the order in which instances drop.
    struct OrderedDrop {
        id: u32,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl Drop for OrderedDrop {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    #[test]
    fn clear_drops_in_fifo_order_across_blocks() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut queue: BlockQueue<OrderedDrop, Fixed> = BlockQueue::with_policy(Fixed(3));
        for id in 0..8 {
            queue.push_back(OrderedDrop {
                id,
                log: Rc::clone(&log),
            });
        }
        // Partially pop the head block so begin > 0 when it drops.
        queue.pop_front();
        log.borrow_mut().clear();
        queue.clear();
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4, 5, 6, 7]);
    }

    #[test]
    fn drop_drains_remaining_elements() {
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let mut queue: BlockQueue<OrderedDrop, Fixed> = BlockQueue::with_policy(Fixed(2));
            for id in 0..5 {
                queue.push_back(OrderedDrop {
                    id,
                    log: Rc::clone(&log),
                });
            }
            queue.pop_front();
            log.borrow_mut().clear();
        }
        assert_eq!(*log.borrow(), vec![1, 2, 3, 4]);
    }

    #[test]
    fn zero_sized_elements() {
        let mut queue: BlockQueue<(), Fixed> = BlockQueue::with_policy(Fixed(16));
        for _ in 0..100 {
            queue.push_back(());
        }
        assert_eq!(queue.len(), 100);
        assert_eq!(queue.block_count(), 7);
        assert_eq!(queue.front(), Some(&()));
        for _ in 0..100 {
            assert_eq!(queue.pop_front(), Some(()));
        }
        assert!(queue.is_empty());
    }

    #[test]
    fn high_alignment_elements() {
        #[repr(align(32))]
        #[derive(Debug, PartialEq)]
        struct Aligned(u8);

        let mut queue: BlockQueue<Aligned, Fixed> = BlockQueue::with_policy(Fixed(3));
        for i in 0..7 {
            queue.push_back(Aligned(i));
        }
        // The slot array must honor the element alignment in place.
        let front_addr = queue.front().unwrap() as *const Aligned as usize;
        assert_eq!(front_addr % 32, 0);
        for i in 0..7 {
            assert_eq!(queue.pop_front(), Some(Aligned(i)));
        }
    }

    #[test]
    fn collect_and_debug() {
        let queue: BlockQueue<u32> = (0..5).collect();
        assert_eq!(queue.len(), 5);
        let rendered = format!("{queue:?}");
        assert!(rendered.starts_with("BlockQueue"));
        assert!(rendered.contains("len: 5"));
        assert!(rendered.contains("blocks: 1"));
    }
}
