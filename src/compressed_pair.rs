//! Zero-overhead pairing of a value with a usually-zero-sized policy.
//!
//! The C++ ancestor of this type exists to exploit the empty-base-class
//! optimization so a container can carry an allocator or comparator without
//! spending a byte on it. Rust's layout rules already store zero-sized
//! fields at zero cost, so this module keeps the explicit coupling and the
//! size guarantee and drops the inheritance machinery entirely.
//!
//! # Invariants
//! - `size_of::<CompressedPair<A, B>>() == size_of::<A>()` when `B` is a
//!   zero-sized type with alignment 1 (and symmetrically).
//! - No interior mutability and no `unsafe`.

/// Pairs a primary value with a policy value, typically zero-sized.
///
/// Containers in this crate use it to carry customization (for example a
/// block growth policy) alongside their bookkeeping without growing their
/// footprint in the common ZST case. The point is intent: a bare `(A, B)`
/// does not say which member is payload and which is policy.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct CompressedPair<A, B> {
    first: A,
    second: B,
}

impl<A, B> CompressedPair<A, B> {
    /// Creates a pair from its two members.
    #[inline]
    pub const fn new(first: A, second: B) -> Self {
        Self { first, second }
    }

    /// Returns the primary member.
    #[inline]
    pub fn first(&self) -> &A {
        &self.first
    }

    /// Returns the primary member mutably.
    #[inline]
    pub fn first_mut(&mut self) -> &mut A {
        &mut self.first
    }

    /// Returns the policy member.
    #[inline]
    pub fn second(&self) -> &B {
        &self.second
    }

    /// Returns the policy member mutably.
    #[inline]
    pub fn second_mut(&mut self) -> &mut B {
        &mut self.second
    }

    /// Consumes the pair, yielding both members.
    #[inline]
    pub fn into_inner(self) -> (A, B) {
        (self.first, self.second)
    }

    /// Rebuilds the pair with a transformed primary member.
    #[inline]
    pub fn map_first<C>(self, f: impl FnOnce(A) -> C) -> CompressedPair<C, B> {
        CompressedPair {
            first: f(self.first),
            second: self.second,
        }
    }
}

impl<A, B> From<(A, B)> for CompressedPair<A, B> {
    #[inline]
    fn from((first, second): (A, B)) -> Self {
        Self { first, second }
    }
}
