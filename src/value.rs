//! Host capability surface: the only contract this crate has with the
//! runtime that owns the values it stores.
//!
//! The map never looks inside a value. Everything it needs (a canonical
//! byte encoding to hash, deep equality to resolve collisions, and
//! pin/unpin to keep values alive across host garbage collections) is
//! expressed here, so a target environment implements this trait once and
//! the core stays ignorant of the host's collector.

use core::fmt;

/// Host content that has no canonical byte encoding.
///
/// Returned by [`HostValue::write_canonical`] for values the host cannot
/// serialize (environment-dependent or external content). Propagated to the
/// caller; never treated as a hash of zero.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct Unhashable;

impl fmt::Display for Unhashable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("value has no canonical byte encoding")
    }
}

impl std::error::Error for Unhashable {}

/// An opaque, host-owned value handle.
///
/// Handles are content-immutable: the host never mutates a value in place.
/// That assumption is load-bearing: it is why `Clone` may share content
/// rather than deep-copy, why a stored hash stays valid for the lifetime of
/// an entry, and why [`PinHashMap::clone`](crate::PinHashMap) can alias
/// handles between two otherwise independent maps.
///
/// `Clone` must be cheap (a handle copy, not a content copy). Cloning does
/// not affect retention; only [`pin`](HostValue::pin) does.
pub trait HostValue: Clone {
    /// Append a deterministic canonical encoding of this value's content to
    /// `out`.
    ///
    /// Structurally equal values must produce byte-identical output; the
    /// map derives key hashes from these bytes and nothing else. The
    /// encoding supports arbitrarily nested composite values, exactly as
    /// the host's own equality does. It is never used as the equality test
    /// itself; that is [`structural_eq`](HostValue::structural_eq).
    fn write_canonical(&self, out: &mut Vec<u8>) -> Result<(), Unhashable>;

    /// Deep content equality, ignoring handle identity.
    ///
    /// This is the authority for table membership. Implementations must be
    /// consistent with [`write_canonical`](HostValue::write_canonical):
    /// `a.structural_eq(b)` implies identical canonical bytes.
    fn structural_eq(&self, other: &Self) -> bool;

    /// Keep this value alive until a matching [`unpin`](HostValue::unpin).
    ///
    /// Pins nest: a value pinned twice needs two unpins before the host may
    /// reclaim it.
    fn pin(&self);

    /// Release one pin previously taken with [`pin`](HostValue::pin).
    fn unpin(&self);

    /// Construct a host sequence value holding the given handles.
    ///
    /// Used by [`invert`](crate::PinHashMap::invert) under
    /// [`DuplicatePolicy::Stack`](crate::DuplicatePolicy) to collect the
    /// keys that shared a value. Only ever invoked with two or more items;
    /// a lone key is stored unwrapped.
    fn sequence_of(items: &[Self]) -> Self;
}
