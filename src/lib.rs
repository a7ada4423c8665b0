//! Queue containers for single-producer pipelines.
//!
//! ## Scope
//! Four self-contained primitives used on scheduler and pipeline hot
//! paths: a growable ring with indexed access, an unbounded segmented
//! FIFO, a lock-free work-stealing queue, and the zero-overhead pair the
//! segmented queue carries its growth policy in.
//!
//! ## Key invariants
//! - Every owning container drops its remaining elements in FIFO order,
//!   in `clear` and in `Drop` alike.
//! - Ring capacities are powers of two; index math is mask-based, never
//!   modulo.
//! - The work-stealing queue delivers each item exactly once across owner
//!   pops and steals, with 64-bit monotonic indices ruling out ABA.
//! - Growth never blocks a concurrent stealer: replaced rings stay
//!   allocated until the queue drops.
//!
//! ## Choosing a queue
//! - [`CircularQueue`]: single-threaded FIFO plus O(1) indexed access;
//!   grows by doubling and re-lays elements out.
//! - [`BlockQueue`]: single-threaded unbounded FIFO; grows by linking
//!   blocks, so elements never move and growth never copies.
//! - [`SingleProducerQueue`]: one thread pushes and pops, any number of
//!   [`Stealer`]s drain the oldest items from other threads.
//!
//! ## Notable entry points
//! - `CircularQueue` / `BlockQueue`: the single-threaded FIFOs.
//! - `SingleProducerQueue` / `Stealer` / `Steal`: the work-stealing end.
//! - `GrowthPolicy` (`Doubling`, `Fixed`): block sizing for `BlockQueue`.
//! - `CompressedPair`: explicit value-plus-policy coupling with a
//!   compile-time size guarantee.

pub mod block_queue;
pub mod circular_queue;
pub mod compressed_pair;
pub mod single_producer_queue;
#[cfg(test)]
pub mod test_utils;

pub use block_queue::{BlockQueue, Doubling, Fixed, GrowthPolicy};
pub use circular_queue::CircularQueue;
pub use compressed_pair::CompressedPair;
pub use single_producer_queue::{Full, SingleProducerQueue, Steal, Stealer};
