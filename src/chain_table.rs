//! ChainTable: fixed-bucket structural layer with generational item handles.

use crate::error::InsertError;
use slotmap::{DefaultKey, SlotMap};

/// Names one item record. Becomes stale once that item is removed; a stale
/// handle never resolves, even if its arena slot is reused.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct Handle(DefaultKey);

impl Handle {
    pub(crate) fn new(k: DefaultKey) -> Self {
        Handle(k)
    }
    pub(crate) fn raw_handle(&self) -> DefaultKey {
        self.0
    }

    pub fn item_hash<V>(&self, table: &ChainTable<V>) -> Option<u32> {
        table.handle_hash(*self)
    }

    pub fn value<'a, V>(&self, table: &'a ChainTable<V>) -> Option<&'a V> {
        table.handle_value(*self)
    }

    pub fn value_mut<'a, V>(&self, table: &'a mut ChainTable<V>) -> Option<&'a mut V> {
        table.handle_value_mut(*self)
    }
}

#[derive(Debug)]
struct Item<V> {
    hash: u32,
    value: V,
    prev: Option<DefaultKey>,
    next: Option<DefaultKey>,
}

#[derive(Copy, Clone, Debug, Default)]
struct Chain {
    head: Option<DefaultKey>,
    tail: Option<DefaultKey>,
    len: usize,
}

/// Open-chaining table with a bucket count fixed at construction.
///
/// Each bucket is a doubly-linked chain in insertion order. Links are arena
/// keys into `items`, so unlinking is O(1) given a handle and no item ever
/// points at freed memory.
pub struct ChainTable<V> {
    chains: Box<[Chain]>,
    items: SlotMap<DefaultKey, Item<V>>, // item records using generational keys
}

impl<V> ChainTable<V> {
    /// # Panics
    ///
    /// Panics if `buckets` is zero.
    pub fn with_buckets(buckets: usize) -> Self {
        assert!(buckets > 0, "bucket count must be non-zero");
        Self {
            chains: vec![Chain::default(); buckets].into_boxed_slice(),
            items: SlotMap::with_key(),
        }
    }

    pub fn bucket_count(&self) -> usize {
        self.chains.len()
    }
    pub fn len(&self) -> usize {
        self.items.len()
    }
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Bucket that `hash` routes to; fixed for the table's lifetime.
    #[inline]
    pub fn bucket_of(&self, hash: u32) -> usize {
        hash as usize % self.chains.len()
    }

    /// Number of items chained in `bucket`. Out-of-range buckets are empty.
    pub fn chain_len(&self, bucket: usize) -> usize {
        self.chains.get(bucket).map_or(0, |c| c.len)
    }

    fn scan(&self, hash: u32) -> Option<DefaultKey> {
        let mut cur = self.chains[self.bucket_of(hash)].head;
        while let Some(k) = cur {
            let item = self.items.get(k)?;
            if item.hash == hash {
                return Some(k);
            }
            cur = item.next;
        }
        None
    }

    pub fn find(&self, hash: u32) -> Option<Handle> {
        self.scan(hash).map(Handle::new)
    }

    pub fn contains(&self, hash: u32) -> bool {
        self.scan(hash).is_some()
    }

    pub fn get(&self, hash: u32) -> Option<&V> {
        let k = self.scan(hash)?;
        self.items.get(k).map(|i| &i.value)
    }

    pub fn get_mut(&mut self, hash: u32) -> Option<&mut V> {
        let k = self.scan(hash)?;
        self.items.get_mut(k).map(|i| &mut i.value)
    }

    pub fn insert(&mut self, hash: u32, value: V) -> Result<Handle, InsertError> {
        self.insert_with(hash, || value)
    }

    /// Append a new item at the tail of its chain, building the value only
    /// if `hash` is absent.
    pub fn insert_with<F>(&mut self, hash: u32, default: F) -> Result<Handle, InsertError>
    where
        F: FnOnce() -> V,
    {
        if self.scan(hash).is_some() {
            return Err(InsertError::AlreadyExists { hash });
        }

        let slot = self.bucket_of(hash);
        let tail = self.chains[slot].tail;
        // The record is allocated before anything is linked to it.
        let k = self.items.insert(Item {
            hash,
            value: default(),
            prev: tail,
            next: None,
        });

        match tail.and_then(|t| self.items.get_mut(t)) {
            Some(last) => last.next = Some(k),
            None => self.chains[slot].head = Some(k),
        }
        let chain = &mut self.chains[slot];
        chain.tail = Some(k);
        chain.len += 1;

        Ok(Handle::new(k))
    }

    pub fn remove(&mut self, hash: u32) -> Option<V> {
        let k = self.scan(hash)?;
        self.unlink(k).map(|item| item.value)
    }

    pub fn remove_handle(&mut self, handle: Handle) -> Option<(u32, V)> {
        self.unlink(handle.raw_handle())
            .map(|item| (item.hash, item.value))
    }

    fn unlink(&mut self, k: DefaultKey) -> Option<Item<V>> {
        // Free the record first; its own links say how to splice the chain.
        let item = self.items.remove(k)?;
        let slot = self.bucket_of(item.hash);

        match item.prev {
            Some(p) => match self.items.get_mut(p) {
                Some(prev) => prev.next = item.next,
                None => debug_assert!(false, "chain links to a vacant slot"),
            },
            None => self.chains[slot].head = item.next,
        }
        match item.next {
            Some(n) => match self.items.get_mut(n) {
                Some(next) => next.prev = item.prev,
                None => debug_assert!(false, "chain links to a vacant slot"),
            },
            None => self.chains[slot].tail = item.prev,
        }
        self.chains[slot].len -= 1;

        Some(item)
    }

    /// First item of `bucket`, if any.
    pub(crate) fn head(&self, bucket: usize) -> Option<Handle> {
        self.chains.get(bucket)?.head.map(Handle::new)
    }

    /// Resolve `handle` to its value and the handle of its chain successor.
    /// `None` means the handle is stale.
    pub(crate) fn step(&self, handle: Handle) -> Option<(&V, Option<Handle>)> {
        self.items
            .get(handle.raw_handle())
            .map(|item| (&item.value, item.next.map(Handle::new)))
    }

    pub(crate) fn handle_hash(&self, h: Handle) -> Option<u32> {
        self.items.get(h.raw_handle()).map(|i| i.hash)
    }

    pub(crate) fn handle_value(&self, h: Handle) -> Option<&V> {
        self.items.get(h.raw_handle()).map(|i| &i.value)
    }

    pub(crate) fn handle_value_mut(&mut self, h: Handle) -> Option<&mut V> {
        self.items.get_mut(h.raw_handle()).map(|i| &mut i.value)
    }

    /// Items in bucket-ascending, then chain order.
    pub fn iter(&self) -> Iter<'_, V> {
        Iter {
            table: self,
            bucket: 0,
            next: self.chains[0].head,
        }
    }
}

/// Iterator over `(hash, &value)` in bucket-then-chain order.
pub struct Iter<'a, V> {
    table: &'a ChainTable<V>,
    bucket: usize,
    next: Option<DefaultKey>,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = (u32, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        let table = self.table;
        loop {
            if let Some(item) = self.next.and_then(|k| table.items.get(k)) {
                self.next = item.next;
                return Some((item.hash, &item.value));
            }
            if self.bucket + 1 >= table.chains.len() {
                self.bucket = table.chains.len();
                return None;
            }
            self.bucket += 1;
            self.next = table.chains[self.bucket].head;
        }
    }
}
