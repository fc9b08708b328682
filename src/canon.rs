//! Canonical serializer: turns a host value into bytes, and bytes into a
//! table hash.

use crate::value::{HostValue, Unhashable};
use core::cell::RefCell;
use core::hash::BuildHasher;

/// Seed capacity for the serialization buffer.
const BUFFER_CAPACITY: usize = 1 << 12;

/// Owns the reusable serialization buffer and the build-hasher that turns
/// canonical bytes into `u64` table hashes.
///
/// The buffer is cleared at the start of every call and carries no
/// information between calls; reuse only avoids reallocating for every
/// lookup. It lives behind a `RefCell` so read-side operations (`get`,
/// `contains`) can hash through `&self`; the crate is single-threaded and
/// non-reentrant, so the borrow is never contended.
pub struct Canonicalizer<S> {
    hasher: S,
    buf: RefCell<Vec<u8>>,
}

impl<S: BuildHasher> Canonicalizer<S> {
    pub fn with_hasher(hasher: S) -> Self {
        Self {
            hasher,
            buf: RefCell::new(Vec::with_capacity(BUFFER_CAPACITY)),
        }
    }

    pub(crate) fn hasher(&self) -> &S {
        &self.hasher
    }

    /// Hash of `value`'s canonical byte encoding.
    ///
    /// Values that are structurally equal hash identically; the converse
    /// does not hold, and collisions are resolved by structural equality
    /// during probing.
    pub fn hash_of<V: HostValue>(&self, value: &V) -> Result<u64, Unhashable> {
        let mut buf = self.buf.borrow_mut();
        buf.clear();
        value.write_canonical(&mut buf)?;
        Ok(self.hasher.hash_one(&buf[..]))
    }
}

impl<S: BuildHasher + Clone> Clone for Canonicalizer<S> {
    /// Independent canonicalizer with a fresh buffer; only the hasher state
    /// (and thus the hash function) is shared.
    fn clone(&self) -> Self {
        Self::with_hasher(self.hasher.clone())
    }
}
