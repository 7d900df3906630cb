//! concurrent-hash-index: a fixed-size, thread-safe, chained hash index
//! keyed by precomputed 32-bit hashes, mapping them to caller-owned handles.
//!
//! Internal Design:
//!
//! Summary
//! - Goal: a lookup index for concurrent servers (e.g. protocol ids such as
//!   fids or tags to per-request state) where the caller already has a hash
//!   and owns the values.
//! - Layers:
//!   - ChainTable<V>: structural, single-threaded table. A fixed array of
//!     buckets, each a doubly-linked chain in insertion order. Item records
//!     live in a generational slot arena and chains link by arena key.
//!   - HashIndex<V>: public concurrent layer. One reader/writer lock over a
//!     ChainTable; each operation holds it for one bucket scan.
//!   - Cursor<'a, V>: single forward pass over a HashIndex that takes the
//!     lock once per step and can remove the item it just yielded.
//!
//! Constraints
//! - Bucket count is fixed at construction; bucket = `hash % bucket_count`.
//! - At most one item per hash; duplicate inserts fail and change nothing.
//! - Coarse locking: one `parking_lot::RwLock` for the whole table.
//! - Values are handles (pointer wrappers, ids, `Arc`s). The index clones
//!   them out on lookup and drops them with their item record; it never
//!   touches what they refer to.
//!
//! Iteration consistency
//! - The cursor does not hold the lock between steps. Iteration is weakly
//!   consistent: it terminates, yields only items live at each step, never
//!   yields an item twice, and may miss items changed concurrently.
//! - Cursor positions are generational handles, so an item removed by
//!   another thread is detected as stale instead of being dereferenced.
//! - A hash removed and reinserted mid-pass is a new item at the chain tail,
//!   so the cursor may yield its value a second time.
//!
//! Notes and non-goals
//! - No resizing, rehashing or chain rebalancing.
//! - No snapshot iteration; clone the values out under your own
//!   coordination if you need one.
//! - No destructor callbacks for values: `remove` hands the value back and
//!   dropping the index drops the remaining handles.
//! - Model-checked with loom under `--cfg loom` (see `sync`).

pub mod chain_table;
mod chain_table_proptest;
mod error;
pub mod hash_index;
mod sync;

// Public surface
pub use error::{CursorError, InsertError, RemoveError};
pub use hash_index::{Cursor, HashIndex, DEFAULT_BUCKETS};
