//! pin-hashmap: A single-threaded map over host-owned opaque values, keyed
//! by structural equality, with pin-based retention and log compaction.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: give a garbage-collected host runtime a map whose keys compare
//!   by deep content while everything the map references stays alive, and
//!   do so in small layers that can be reasoned about independently.
//! - Layers:
//!   - HostValue: the capability trait a host implements once (canonical
//!     serialization, structural equality, pin/unpin, sequence
//!     construction). The core never looks past it.
//!   - Canonicalizer<S>: reusable serialization buffer plus build-hasher;
//!     key hashes are hashes of canonical bytes, nothing else.
//!   - RetentionLog<V>: append-only pinned-handle log; pins on push,
//!     re-pins on clone, unpins everything on drop.
//!   - PinHashMap<V, S>: the public API; a hashbrown HashTable index over
//!     slotmap entry storage, two retention logs, and compaction that
//!     rebuilds the logs from the live entries once they outgrow twice the
//!     table.
//!
//! Constraints
//! - Single-threaded: no atomics, interior mutability via Cell/RefCell;
//!   reentrancy from host callbacks is disallowed and panics in debug
//!   builds.
//! - Structural keys: lookups run host equality, so entries store their
//!   canonical hash and host code is only invoked while probing, never
//!   during internal rehashes.
//! - Retention is a superset of liveness: every handle reachable through
//!   the table is pinned by a log; removals never unpin eagerly, only a
//!   full compaction (or clear/drop) releases pins.
//! - Failed operations leave the map observably unchanged; batch
//!   operations validate everything before the first mutation.
//!
//! Why a log instead of reference counts?
//! - Per-entry counts would charge every handle copy; the log charges one
//!   pin per mutation and reclaims surplus in a single linear pass whose
//!   cost is O(1) amortized across mutations. Between compactions the map
//!   over-retains by at most the compaction factor, bounded and invisible
//!   to callers.
//!
//! Lifecycle
//! - A map is created empty and mutated through its methods; dropping it
//!   releases both logs (and thus every pin) synchronously, exactly once.
//!   Hosts that key destruction off a finalizer hook simply drop the map
//!   from the finalizer.
//!
//! Notes and non-goals
//! - No persistence and no transactions; the interchange form is the
//!   `Snapshot` key/value pair of sequences.
//! - Iteration order is implementation-defined and unstable across
//!   compactions and runs; callers needing determinism sort externally.
//! - `clone()` shares value handles (host values are content-immutable);
//!   only table structure and retention state are independent.
//! - Entries are not individually addressable: there are no stable entry
//!   handles, and lookups always go through a key.

mod canon;
mod map;
mod reentry;
mod retain;
mod test_host;
mod value;

// Public surface
pub use canon::Canonicalizer;
pub use map::{DuplicatePolicy, MapError, PinHashMap, Snapshot};
pub use retain::RetentionLog;
pub use value::{HostValue, Unhashable};
