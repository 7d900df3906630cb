//! HashIndex: concurrent layer holding one reader/writer lock over a `ChainTable`.

use crate::chain_table::{ChainTable, Handle};
use crate::error::{CursorError, InsertError, RemoveError};
use crate::sync::RwLock;
use core::fmt;
use core::iter::FusedIterator;

/// Bucket count used by `HashIndex::new`.
pub const DEFAULT_BUCKETS: usize = 100;

/// Thread-safe index from precomputed `u32` hashes to caller handles.
///
/// Every operation holds the lock for one bucket scan: `find`, `contains`,
/// `len` and cursor steps share it; `insert`, `insert_with`, `remove` and
/// `Cursor::remove_current` take it exclusively. The lock is parking_lot's
/// eventually-fair `RwLock`, so a steady stream of readers cannot starve a
/// writer indefinitely.
pub struct HashIndex<V> {
    table: RwLock<ChainTable<V>>,
    buckets: usize,
}

impl<V> HashIndex<V> {
    pub fn new() -> Self {
        Self::with_buckets(DEFAULT_BUCKETS)
    }

    /// # Panics
    ///
    /// Panics if `buckets` is zero.
    pub fn with_buckets(buckets: usize) -> Self {
        let table = ChainTable::with_buckets(buckets);
        tracing::debug!(buckets, "hash index created");
        Self {
            table: RwLock::new(table),
            buckets,
        }
    }

    /// Fixed at construction; read without locking.
    pub fn bucket_count(&self) -> usize {
        self.buckets
    }

    pub fn len(&self) -> usize {
        self.table.read().len()
    }
    pub fn is_empty(&self) -> bool {
        self.table.read().is_empty()
    }

    /// Copy of the handle stored under `hash`.
    pub fn find(&self, hash: u32) -> Option<V>
    where
        V: Clone,
    {
        self.table.read().get(hash).cloned()
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.table.read().contains(hash)
    }

    pub fn insert(&self, hash: u32, value: V) -> Result<(), InsertError> {
        self.insert_with(hash, || value)
    }

    /// Insert, building the value only when `hash` is absent.
    ///
    /// `default` runs under the exclusive lock; calling back into this index
    /// from it deadlocks.
    pub fn insert_with<F>(&self, hash: u32, default: F) -> Result<(), InsertError>
    where
        F: FnOnce() -> V,
    {
        let mut table = self.table.write();
        let slot = table.bucket_of(hash);
        match table.insert_with(hash, default) {
            Ok(_) => {
                tracing::trace!(op = "insert", hash, slot, result = "linked");
                Ok(())
            }
            Err(err) => {
                tracing::trace!(op = "insert", hash, slot, result = "duplicate");
                Err(err)
            }
        }
    }

    /// Unlink and free the item for `hash`, handing its value back.
    pub fn remove(&self, hash: u32) -> Result<V, RemoveError> {
        let mut table = self.table.write();
        let slot = table.bucket_of(hash);
        match table.remove(hash) {
            Some(value) => {
                tracing::trace!(op = "remove", hash, slot, result = "unlinked");
                Ok(value)
            }
            None => {
                tracing::trace!(op = "remove", hash, slot, result = "missing");
                Err(RemoveError::NotFound { hash })
            }
        }
    }

    /// Start a single forward pass over all buckets.
    ///
    /// The cursor holds no lock between steps, so other threads may mutate
    /// the index while it is in use. See [`Cursor`] for what that means for
    /// the values it yields.
    pub fn cursor(&self) -> Cursor<'_, V> {
        let next = self.table.read().head(0);
        Cursor {
            index: self,
            bucket: 0,
            next,
            last: None,
            current: None,
        }
    }
}

impl<V> Default for HashIndex<V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V> Drop for HashIndex<V> {
    fn drop(&mut self) {
        // Item records go with the table; values are dropped as plain handles.
        tracing::debug!(
            buckets = self.buckets,
            items = self.table.read().len(),
            "hash index released"
        );
    }
}

impl<V: fmt::Debug> fmt::Debug for HashIndex<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let table = self.table.read();
        f.debug_struct("HashIndex")
            .field("buckets", &self.buckets)
            .field("items", &table.len())
            .field("entries", &DebugEntries(&*table))
            .finish()
    }
}

struct DebugEntries<'a, V>(&'a ChainTable<V>);

impl<V: fmt::Debug> fmt::Debug for DebugEntries<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.0.iter()).finish()
    }
}

/// Weakly consistent cursor over a [`HashIndex`], in bucket-then-chain order.
///
/// Each step takes the shared lock once. Without concurrent writers a full
/// pass yields every value exactly once. With concurrent writers:
/// - every yielded value was live when its step ran;
/// - no item is yielded twice, but a hash removed and reinserted behind the
///   cursor is a new item and its value may be yielded again;
/// - items inserted or removed during the pass may be missed.
///
/// Items are addressed by generational handles, so a removed item is
/// detected rather than dereferenced. If the item the cursor was about to
/// visit is gone, the cursor resumes after the item it yielded last; only if
/// that one is gone too does it skip the rest of the bucket.
pub struct Cursor<'a, V> {
    index: &'a HashIndex<V>,
    bucket: usize,
    next: Option<Handle>,    // item to yield on the next step
    last: Option<Handle>,    // item yielded by the last step in this bucket
    current: Option<Handle>, // target of remove_current; cleared once used
}

impl<V> Cursor<'_, V> {
    /// Remove the item most recently yielded by `next`, returning its value.
    ///
    /// The cursor does not move; keep calling `next` to continue the pass.
    pub fn remove_current(&mut self) -> Result<V, CursorError> {
        let handle = self.current.take().ok_or(CursorError::InvalidState)?;
        let mut table = self.index.table.write();
        match table.remove_handle(handle) {
            Some((hash, value)) => {
                tracing::trace!(
                    op = "remove_current",
                    hash,
                    slot = self.bucket,
                    result = "unlinked"
                );
                Ok(value)
            }
            None => {
                tracing::trace!(op = "remove_current", slot = self.bucket, result = "stale");
                Err(CursorError::InvalidState)
            }
        }
    }
}

impl<V: Clone> Iterator for Cursor<'_, V> {
    type Item = V;

    fn next(&mut self) -> Option<V> {
        let table = self.index.table.read();
        loop {
            if let Some(handle) = self.next.take() {
                match table.step(handle) {
                    Some((value, next)) => {
                        self.next = next;
                        self.last = Some(handle);
                        self.current = Some(handle);
                        return Some(value.clone());
                    }
                    None => {
                        tracing::trace!(op = "next", slot = self.bucket, result = "stale");
                        // Items never move and appends go to the tail, so the
                        // live successor of the last yielded item is unseen.
                        if let Some((_, resume)) = self.last.and_then(|h| table.step(h)) {
                            if resume.is_some() {
                                self.next = resume;
                                continue;
                            }
                        }
                    }
                }
            }

            self.last = None;
            if self.bucket + 1 >= table.bucket_count() {
                self.bucket = table.bucket_count();
                self.current = None;
                return None;
            }
            self.bucket += 1;
            self.next = table.head(self.bucket);
        }
    }
}

impl<V: Clone> FusedIterator for Cursor<'_, V> {}

#[cfg(test)]
mod tests {
    use super::*;

    fn index_of(buckets: usize, items: &[(u32, &'static str)]) -> HashIndex<&'static str> {
        let index = HashIndex::with_buckets(buckets);
        for &(h, v) in items {
            index.insert(h, v).unwrap();
        }
        index
    }

    fn assert_send_sync<T: Send + Sync>() {}

    /// Invariant: the index and its cursor can be shared across threads when
    /// the stored handles can.
    #[test]
    fn index_and_cursor_are_send_sync() {
        assert_send_sync::<HashIndex<u64>>();
        assert_send_sync::<Cursor<'static, std::sync::Arc<str>>>();
    }

    /// Invariant: `new` uses the default bucket count.
    #[test]
    fn default_bucket_count() {
        let index: HashIndex<u8> = HashIndex::default();
        assert_eq!(index.bucket_count(), DEFAULT_BUCKETS);
        assert!(index.is_empty());
    }

    /// Invariant: a cursor on an empty index ends immediately and stays ended.
    #[test]
    fn empty_cursor_ends_immediately() {
        let index: HashIndex<u32> = HashIndex::with_buckets(5);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));
    }

    /// Invariant: `remove_current` needs a yielded, live item.
    #[test]
    fn remove_current_requires_a_yielded_item() {
        let index = index_of(2, &[(0, "a"), (1, "b")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));

        assert_eq!(cursor.next(), Some("a"));
        assert_eq!(cursor.remove_current(), Ok("a"));
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));

        assert_eq!(cursor.next(), Some("b"));
        assert_eq!(cursor.next(), None);
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));
        assert_eq!(index.len(), 1);
    }

    /// Invariant: removing the current item keeps the rest of its chain reachable.
    #[test]
    fn remove_current_mid_chain_continues() {
        let index = index_of(1, &[(1, "a"), (2, "b"), (3, "c")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        assert_eq!(cursor.next(), Some("b"));
        assert_eq!(cursor.remove_current(), Ok("b"));
        assert_eq!(cursor.next(), Some("c"));
        assert_eq!(cursor.next(), None);
        assert_eq!(index.find(2), None);
        assert_eq!(index.find(1), Some("a"));
        assert_eq!(index.find(3), Some("c"));
    }

    /// Invariant: when the item the cursor would visit next is removed
    /// between steps, the cursor resumes after the item it yielded last.
    #[test]
    fn removed_next_item_resumes_after_last_yielded() {
        let index = index_of(2, &[(0, "a"), (2, "b"), (4, "c"), (1, "d")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        index.remove(2).unwrap();
        assert_eq!(cursor.next(), Some("c"));
        assert_eq!(cursor.next(), Some("d"));
        assert_eq!(cursor.next(), None);
    }

    /// Invariant: one unrelated removal in a single-bucket index does not hide
    /// the rest of the chain.
    #[test]
    fn removal_ahead_of_cursor_keeps_remaining_chain() {
        let index: HashIndex<u32> = HashIndex::with_buckets(1);
        for h in 0..10u32 {
            index.insert(h, h).unwrap();
        }
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some(0));
        index.remove(1).unwrap();
        let rest: Vec<_> = cursor.collect();
        assert_eq!(rest, (2..10).collect::<Vec<_>>());
    }

    /// Invariant: when both the last yielded item and the next one are gone,
    /// the cursor moves on to the next bucket.
    #[test]
    fn removed_last_and_next_skips_rest_of_bucket() {
        let index = index_of(2, &[(0, "a"), (2, "b"), (4, "c"), (1, "d")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        assert_eq!(cursor.remove_current(), Ok("a"));
        index.remove(2).unwrap();
        assert_eq!(cursor.next(), Some("d"));
        assert_eq!(cursor.next(), None);
    }

    /// Invariant: a hash removed and reinserted while the cursor is still in
    /// its bucket is a new item at the chain tail, so its value comes again.
    #[test]
    fn reinserted_hash_behind_cursor_is_yielded_again() {
        let index: HashIndex<u32> = HashIndex::with_buckets(1);
        for h in 1..=3u32 {
            index.insert(h, h).unwrap();
        }
        let mut cursor = index.cursor();
        let mut seen = vec![cursor.next().unwrap()];
        index.remove(1).unwrap();
        index.insert(1, 1).unwrap();
        seen.extend(cursor);
        assert_eq!(seen, vec![1, 2, 3, 1]);
    }

    /// Invariant: a current item removed by someone else cannot be removed
    /// again through the cursor.
    #[test]
    fn remove_current_after_external_remove_is_invalid() {
        let index = index_of(4, &[(1, "a"), (5, "b")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        index.remove(1).unwrap();
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));
        assert_eq!(cursor.next(), Some("b"));
    }

    /// Invariant: a hash reinserted after removal is a new item; the cursor's
    /// old handle does not resolve to it.
    #[test]
    fn reinserted_hash_is_not_the_current_item() {
        let index = index_of(4, &[(1, "a")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        index.remove(1).unwrap();
        index.insert(1, "z").unwrap();
        assert_eq!(cursor.remove_current(), Err(CursorError::InvalidState));
        assert_eq!(index.find(1), Some("z"));
    }

    /// Invariant: an item appended to a chain the cursor already finished is
    /// not visited; buckets ahead of the cursor are.
    #[test]
    fn inserts_behind_and_ahead_of_cursor() {
        let index = index_of(3, &[(0, "a"), (1, "b")]);
        let mut cursor = index.cursor();
        assert_eq!(cursor.next(), Some("a"));
        index.insert(3, "behind").unwrap();
        index.insert(2, "ahead").unwrap();
        let rest: Vec<_> = cursor.collect();
        assert_eq!(rest, vec!["b", "ahead"]);
    }

    /// Invariant: insert/remove report the documented errors and leave the
    /// index unchanged on failure.
    #[test]
    fn insert_and_remove_errors() {
        let index = index_of(4, &[(7, "a")]);
        assert_eq!(index.insert(7, "b"), Err(InsertError::AlreadyExists { hash: 7 }));
        assert_eq!(index.find(7), Some("a"));
        assert_eq!(index.remove(8), Err(RemoveError::NotFound { hash: 8 }));
        assert_eq!(index.len(), 1);
        assert_eq!(index.remove(7), Ok("a"));
        assert!(!index.contains(7));
    }

    /// Invariant: Debug lists entries in iteration order.
    #[test]
    fn debug_lists_entries() {
        let index = index_of(2, &[(1, "b"), (0, "a")]);
        assert_eq!(
            format!("{:?}", index),
            r#"HashIndex { buckets: 2, items: 2, entries: {0: "a", 1: "b"} }"#
        );
    }
}
