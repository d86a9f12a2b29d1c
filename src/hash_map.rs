use core::fmt::Debug;
use core::hash::BuildHasher;
use core::hash::Hash;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;

use crate::hash_table::Entry as TableEntry;
use crate::hash_table::HashTable;
use crate::hash_table::TryReserveError;

/// A hash map implemented using the linear-probing HashTable as the
/// underlying storage.
///
/// `HashMap<K, V, S>` stores key-value pairs where keys implement
/// `Hash + Eq` and uses a configurable hasher builder `S` to hash keys. The
/// underlying storage is the metadata-filtered linear-probing
/// [`HashTable`], holding the pairs as `(K, V)` entries.
///
/// Allocation failure is recoverable: the allocating methods return
/// `Result<_, TryReserveError>` and leave the map untouched on error. The
/// `MAX_LOAD_PERCENT` parameter is forwarded to the table and fixes the
/// maximum load factor at the type level.
///
/// # Performance Characteristics
///
/// - **Memory**: 1 byte per slot overhead, plus the size of `(K, V)`.
pub struct HashMap<K, V, S, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    table: HashTable<(K, V), A, MAX_LOAD_PERCENT>,
    hash_builder: S,
}

impl<K, V, S, A, const MAX_LOAD_PERCENT: usize> Debug for HashMap<K, V, S, A, MAX_LOAD_PERCENT>
where
    K: Debug + Hash + Eq,
    V: Debug,
    S: BuildHasher,
    A: Allocator,
{
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let mut map = f.debug_map();
        for (k, v) in self.iter() {
            map.entry(k, v);
        }
        map.finish()
    }
}

impl<K, V, S, A, const MAX_LOAD_PERCENT: usize> Clone for HashMap<K, V, S, A, MAX_LOAD_PERCENT>
where
    K: Hash + Eq + Clone,
    V: Clone,
    S: BuildHasher + Clone,
    A: Allocator + Clone,
{
    /// Clones the map by rebuilding it from its entries.
    ///
    /// The clone's capacity is computed from the entry count and its probe
    /// chains carry no tombstones. Aborts on allocation failure, matching
    /// the standard collections; use [`HashTable::try_clone`] through the
    /// table layer for the fallible form.
    fn clone(&self) -> Self {
        let hasher = &self.hash_builder;
        let table = self
            .table
            .try_clone(|(k, _)| hasher.hash_one(k))
            .unwrap_or_else(|err| err.abort());

        Self {
            table,
            hash_builder: self.hash_builder.clone(),
        }
    }
}

impl<K, V, S, A, const MAX_LOAD_PERCENT: usize> HashMap<K, V, S, A, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    S: BuildHasher,
    A: Allocator,
{
    /// Creates a new hash map with the given hasher builder, backed by the
    /// given allocator.
    pub const fn with_hasher_in(hash_builder: S, allocator: A) -> Self {
        Self {
            table: HashTable::new_in(allocator),
            hash_builder,
        }
    }

    /// Returns the number of elements in the map.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// assert_eq!(map.len(), 0);
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.len(), 1);
    /// ```
    pub fn len(&self) -> usize {
        self.table.len()
    }

    /// Returns `true` if the map contains no elements.
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Returns the number of slots in the map's table, always zero or a
    /// power of two.
    ///
    /// A freshly created map has capacity 0 and allocates on first insert.
    pub fn capacity(&self) -> usize {
        self.table.capacity()
    }

    /// Removes all elements from the map, retaining the allocated capacity.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// map.insert(1, "a").unwrap();
    /// let capacity = map.capacity();
    /// map.clear();
    /// assert!(map.is_empty());
    /// assert_eq!(map.capacity(), capacity);
    /// ```
    pub fn clear(&mut self) {
        self.table.clear();
    }

    /// Removes all elements and returns the backing allocation to the
    /// allocator, resetting the map to its unallocated state.
    pub fn clear_and_free(&mut self) {
        self.table.clear_and_free();
    }

    /// Reserves capacity for at least `additional` more elements.
    ///
    /// After a successful call, `additional` insertions are guaranteed not
    /// to allocate, provided no intervening removals add tombstones to the
    /// load.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the map unchanged if the allocation
    /// cannot be satisfied.
    pub fn reserve(&mut self, additional: usize) -> Result<(), TryReserveError> {
        let hasher = &self.hash_builder;
        self.table
            .reserve(additional, |(k, _)| hasher.hash_one(k))
    }

    /// Inserts a key-value pair into the map.
    ///
    /// If the map did not have this key present, `None` is returned. If the
    /// map did have this key present, the value is updated, and the old
    /// value is returned.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the map unchanged if a required growth
    /// cannot be satisfied by the allocator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// assert_eq!(map.insert(37, "a").unwrap(), None);
    /// assert_eq!(map.insert(37, "b").unwrap(), Some("a"));
    /// assert_eq!(map.get(&37), Some(&"b"));
    /// ```
    pub fn insert(&mut self, key: K, value: V) -> Result<Option<V>, TryReserveError> {
        let hash = self.hash_builder.hash_one(&key);
        let hasher = &self.hash_builder;
        match self
            .table
            .entry(hash, |(k, _)| k == &key, |(k, _)| hasher.hash_one(k))?
        {
            TableEntry::Occupied(mut entry) => {
                let old_value = core::mem::replace(&mut entry.get_mut().1, value);
                Ok(Some(old_value))
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                Ok(None)
            }
        }
    }

    /// Inserts a key-value pair that must not already be present.
    ///
    /// The key being absent is a precondition: debug builds assert it, and
    /// in release builds a violating call is silently ignored. Use
    /// [`insert`](HashMap::insert) when the key may be present.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the map unchanged if a required growth
    /// cannot be satisfied by the allocator.
    pub fn insert_no_clobber(&mut self, key: K, value: V) -> Result<(), TryReserveError> {
        let hash = self.hash_builder.hash_one(&key);
        let hasher = &self.hash_builder;
        match self
            .table
            .entry(hash, |(k, _)| k == &key, |(k, _)| hasher.hash_one(k))?
        {
            TableEntry::Occupied(_) => {
                debug_assert!(false, "insert_no_clobber called with a present key");
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
            }
        }
        Ok(())
    }

    /// Inserts a key-value pair without ever allocating, returning the
    /// previous value if the key was present.
    ///
    /// # Safety
    ///
    /// The caller must have established spare capacity for one insertion
    /// (e.g. via [`reserve`](HashMap::reserve)) in case the key is absent.
    pub unsafe fn insert_assume_capacity(&mut self, key: K, value: V) -> Option<V> {
        let hash = self.hash_builder.hash_one(&key);
        // SAFETY: Forwarded from the caller.
        match unsafe { self.table.entry_assume_capacity(hash, |(k, _)| k == &key) } {
            TableEntry::Occupied(mut entry) => {
                Some(core::mem::replace(&mut entry.get_mut().1, value))
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
                None
            }
        }
    }

    /// Inserts a key-value pair that must not already be present, without
    /// ever allocating.
    ///
    /// # Safety
    ///
    /// The caller must have established spare capacity for one insertion
    /// (e.g. via [`reserve`](HashMap::reserve)). The key being absent is a
    /// precondition: debug builds assert it, and in release builds a
    /// violating call is silently ignored.
    pub unsafe fn insert_assume_capacity_no_clobber(&mut self, key: K, value: V) {
        let hash = self.hash_builder.hash_one(&key);
        // SAFETY: Forwarded from the caller.
        match unsafe { self.table.entry_assume_capacity(hash, |(k, _)| k == &key) } {
            TableEntry::Occupied(_) => {
                debug_assert!(
                    false,
                    "insert_assume_capacity_no_clobber called with a present key"
                );
            }
            TableEntry::Vacant(entry) => {
                entry.insert((key, value));
            }
        }
    }

    /// Returns a reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.get(&1), Some(&"a"));
    /// assert_eq!(map.get(&2), None);
    /// ```
    pub fn get(&self, key: &K) -> Option<&V> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(_, v)| v)
    }

    /// Returns the key-value pair corresponding to the key.
    pub fn get_key_value(&self, key: &K) -> Option<(&K, &V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.find(hash, |(k, _)| k == key).map(|(k, v)| (k, v))
    }

    /// Returns a mutable reference to the value corresponding to the key.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// map.insert(1, 10).unwrap();
    /// if let Some(value) = map.get_mut(&1) {
    ///     *value += 1;
    /// }
    /// assert_eq!(map.get(&1), Some(&11));
    /// ```
    pub fn get_mut(&mut self, key: &K) -> Option<&mut V> {
        let hash = self.hash_builder.hash_one(key);
        self.table
            .find_mut(hash, |(k, _)| k == key)
            .map(|(_, v)| v)
    }

    /// Returns `true` if the map contains a value for the specified key.
    pub fn contains_key(&self, key: &K) -> bool {
        let hash = self.hash_builder.hash_one(key);
        self.table.contains(hash, |(k, _)| k == key)
    }

    /// Removes a key from the map, returning the value at the key if the
    /// key was previously in the map.
    ///
    /// The vacated slot becomes a tombstone; the load budget is not
    /// refunded until the next growth.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut map = HashMap::with_hasher(SimpleHasher);
    /// map.insert(1, "a").unwrap();
    /// assert_eq!(map.remove(&1), Some("a"));
    /// assert_eq!(map.remove(&1), None);
    /// ```
    pub fn remove(&mut self, key: &K) -> Option<V> {
        self.remove_entry(key).map(|(_, v)| v)
    }

    /// Removes a key from the map, returning the stored key and value if
    /// the key was previously in the map.
    pub fn remove_entry(&mut self, key: &K) -> Option<(K, V)> {
        let hash = self.hash_builder.hash_one(key);
        self.table.remove(hash, |(k, _)| k == key)
    }

    /// Gets the given key's corresponding entry in the map for in-place
    /// manipulation.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the map unchanged if a required growth
    /// cannot be satisfied by the allocator.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let mut counts: HashMap<&str, i32, _> = HashMap::with_hasher(SimpleHasher);
    /// for word in ["a", "b", "a"] {
    ///     *counts.entry(word).unwrap().or_insert(0) += 1;
    /// }
    /// assert_eq!(counts.get(&"a"), Some(&2));
    /// assert_eq!(counts.get(&"b"), Some(&1));
    /// ```
    pub fn entry(
        &mut self,
        key: K,
    ) -> Result<Entry<'_, K, V, A, MAX_LOAD_PERCENT>, TryReserveError> {
        let hash = self.hash_builder.hash_one(&key);
        let hasher = &self.hash_builder;
        match self
            .table
            .entry(hash, |(k, _)| k == &key, |(k, _)| hasher.hash_one(k))?
        {
            TableEntry::Occupied(entry) => Ok(Entry::Occupied(OccupiedEntry { entry })),
            TableEntry::Vacant(entry) => Ok(Entry::Vacant(VacantEntry { entry, key })),
        }
    }

    /// Gets the given key's corresponding entry without ever allocating.
    ///
    /// # Safety
    ///
    /// The caller must have established spare capacity for one insertion
    /// (e.g. via [`reserve`](HashMap::reserve)) in case the key is absent.
    pub unsafe fn entry_assume_capacity(&mut self, key: K) -> Entry<'_, K, V, A, MAX_LOAD_PERCENT> {
        let hash = self.hash_builder.hash_one(&key);
        // SAFETY: Forwarded from the caller.
        match unsafe { self.table.entry_assume_capacity(hash, |(k, _)| k == &key) } {
            TableEntry::Occupied(entry) => Entry::Occupied(OccupiedEntry { entry }),
            TableEntry::Vacant(entry) => Entry::Vacant(VacantEntry { entry, key }),
        }
    }

    /// Returns an iterator over the key-value pairs of the map.
    ///
    /// The iteration order is arbitrary and may change between versions.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.table.iter(),
        }
    }

    /// Returns an iterator over the key-value pairs of the map, with
    /// mutable references to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.table.iter_mut(),
        }
    }

    /// Returns an iterator over the keys of the map.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Returns an iterator over the values of the map, yielding mutable
    /// references.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    /// Clears the map, returning an iterator over the removed key-value
    /// pairs.
    ///
    /// Dropping the iterator drops the remaining pairs; after that the
    /// map's capacity and full load budget are retained.
    pub fn drain(&mut self) -> Drain<'_, K, V, A, MAX_LOAD_PERCENT> {
        Drain {
            inner: self.table.drain(),
        }
    }
}

impl<K, V, S, const MAX_LOAD_PERCENT: usize> HashMap<K, V, S, Global, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    S: BuildHasher,
{
    /// Creates a new hash map with the given hasher builder.
    ///
    /// # Examples
    ///
    /// ```rust
    /// # use core::hash::BuildHasher;
    /// # use siphasher::sip::SipHasher;
    /// #
    /// # use probe_hash::HashMap;
    /// #
    /// # struct SimpleHasher;
    /// # impl BuildHasher for SimpleHasher {
    /// #     type Hasher = SipHasher;
    /// #
    /// #     fn build_hasher(&self) -> Self::Hasher {
    /// #         SipHasher::new()
    /// #     }
    /// # }
    /// #
    /// let map: HashMap<i32, String, _> = HashMap::with_hasher(SimpleHasher);
    /// assert!(map.is_empty());
    /// ```
    pub const fn with_hasher(hash_builder: S) -> Self {
        Self::with_hasher_in(hash_builder, Global)
    }

    /// Creates a new hash map with the specified capacity and hasher
    /// builder.
    ///
    /// The actual capacity may be larger than requested due to the
    /// power-of-two slot organization of the underlying table.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial allocation cannot be satisfied.
    pub fn with_capacity_and_hasher(capacity: usize, hash_builder: S) -> Result<Self, TryReserveError> {
        let mut map = Self::with_hasher(hash_builder);
        map.reserve(capacity)?;
        Ok(map)
    }
}

impl<K, V, S, const MAX_LOAD_PERCENT: usize> HashMap<K, V, S, Global, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    /// Creates a new hash map with a default hasher builder.
    pub fn new() -> Self {
        Self::with_hasher(S::default())
    }

    /// Creates a new hash map with a default hasher builder and room for at
    /// least `capacity` entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the initial allocation cannot be satisfied.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        Self::with_capacity_and_hasher(capacity, S::default())
    }
}

impl<K, V, S, const MAX_LOAD_PERCENT: usize> Default for HashMap<K, V, S, Global, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    S: BuildHasher + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, S, A, const MAX_LOAD_PERCENT: usize> PartialEq for HashMap<K, V, S, A, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    V: PartialEq,
    S: BuildHasher,
    A: Allocator,
{
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().all(|(k, v)| other.get(k) == Some(v))
    }
}

impl<K, V, S, A, const MAX_LOAD_PERCENT: usize> Eq for HashMap<K, V, S, A, MAX_LOAD_PERCENT>
where
    K: Hash + Eq,
    V: Eq,
    S: BuildHasher,
    A: Allocator,
{
}

/// A view into a single entry in a map, which may be vacant or occupied.
///
/// This enum is constructed from the [`entry`] method on [`HashMap`].
///
/// [`entry`]: HashMap::entry
pub enum Entry<'a, K, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    /// A vacant entry - the key is not present in the map
    Vacant(VacantEntry<'a, K, V, A, MAX_LOAD_PERCENT>),
    /// An occupied entry - the key is present in the map
    Occupied(OccupiedEntry<'a, K, V, A, MAX_LOAD_PERCENT>),
}

impl<'a, K, V, A: Allocator, const MAX_LOAD_PERCENT: usize> Entry<'a, K, V, A, MAX_LOAD_PERCENT> {
    /// Ensures a value is in the entry by inserting the default if vacant,
    /// and returns a mutable reference to the value.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Ensures a value is in the entry by inserting the result of the
    /// closure if vacant, and returns a mutable reference to the value.
    pub fn or_insert_with<F>(self, default: F) -> &'a mut V
    where
        F: FnOnce() -> V,
    {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Provides in-place mutable access to an occupied entry before any
    /// potential inserts into the map.
    pub fn and_modify<F>(self, f: F) -> Self
    where
        F: FnOnce(&mut V),
    {
        match self {
            Entry::Occupied(mut entry) => {
                f(entry.get_mut());
                Entry::Occupied(entry)
            }
            Entry::Vacant(entry) => Entry::Vacant(entry),
        }
    }

    /// Returns a reference to this entry's key.
    pub fn key(&self) -> &K {
        match self {
            Entry::Occupied(entry) => entry.key(),
            Entry::Vacant(entry) => entry.key(),
        }
    }
}

impl<'a, K, V, A, const MAX_LOAD_PERCENT: usize> Entry<'a, K, V, A, MAX_LOAD_PERCENT>
where
    V: Default,
    A: Allocator,
{
    /// Ensures a value is in the entry by inserting `V::default()` if
    /// vacant, and returns a mutable reference to the value.
    pub fn or_default(self) -> &'a mut V {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in a map.
///
/// This struct is created by the [`entry`] method on [`HashMap`] when the
/// requested key is not present.
///
/// [`entry`]: HashMap::entry
pub struct VacantEntry<'a, K, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    entry: crate::hash_table::VacantEntry<'a, (K, V), A, MAX_LOAD_PERCENT>,
    key: K,
}

impl<'a, K, V, A: Allocator, const MAX_LOAD_PERCENT: usize>
    VacantEntry<'a, K, V, A, MAX_LOAD_PERCENT>
{
    /// Returns a reference to the key that would be used when inserting.
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Takes ownership of the key, leaving the entry unused.
    pub fn into_key(self) -> K {
        self.key
    }

    /// Inserts the value into the map with the entry's key and returns a
    /// mutable reference to it.
    pub fn insert(self, value: V) -> &'a mut V {
        &mut self.entry.insert((self.key, value)).1
    }
}

/// A view into an occupied entry in a map.
///
/// This struct is created by the [`entry`] method on [`HashMap`] when the
/// requested key is present.
///
/// [`entry`]: HashMap::entry
pub struct OccupiedEntry<'a, K, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    entry: crate::hash_table::OccupiedEntry<'a, (K, V), A, MAX_LOAD_PERCENT>,
}

impl<'a, K, V, A: Allocator, const MAX_LOAD_PERCENT: usize>
    OccupiedEntry<'a, K, V, A, MAX_LOAD_PERCENT>
{
    /// Returns a reference to the entry's key.
    pub fn key(&self) -> &K {
        &self.entry.get().0
    }

    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        &self.entry.get().1
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        &mut self.entry.get_mut().1
    }

    /// Converts the entry into a mutable reference to its value with the
    /// lifetime of the map borrow.
    pub fn into_mut(self) -> &'a mut V {
        &mut self.entry.into_mut().1
    }

    /// Replaces the entry's value, returning the previous one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry from the map and returns its value.
    ///
    /// Presence is proven by construction, making this the asserting form
    /// of removal.
    pub fn remove(self) -> V {
        self.entry.remove().1
    }

    /// Removes the entry from the map and returns the stored key and
    /// value.
    pub fn remove_entry(self) -> (K, V) {
        self.entry.remove()
    }
}

/// An iterator over the key-value pairs of a [`HashMap`].
///
/// This struct is created by the [`iter`] method on [`HashMap`].
///
/// [`iter`]: HashMap::iter
pub struct Iter<'a, K, V> {
    inner: crate::hash_table::Iter<'a, (K, V)>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, v)| (k, v))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

/// A mutable iterator over the key-value pairs of a [`HashMap`].
///
/// This struct is created by the [`iter_mut`] method on [`HashMap`]. Keys
/// are yielded by shared reference; mutating a key in place would corrupt
/// the probe chains.
///
/// [`iter_mut`]: HashMap::iter_mut
pub struct IterMut<'a, K, V> {
    inner: crate::hash_table::IterMut<'a, (K, V)>,
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|entry| {
            let (key, value) = entry;
            (&*key, value)
        })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

/// An iterator over the keys of a [`HashMap`].
///
/// This struct is created by the [`keys`] method on [`HashMap`].
///
/// [`keys`]: HashMap::keys
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(k, _)| k)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// An iterator over the values of a [`HashMap`].
///
/// This struct is created by the [`values`] method on [`HashMap`].
///
/// [`values`]: HashMap::values
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A mutable iterator over the values of a [`HashMap`].
///
/// This struct is created by the [`values_mut`] method on [`HashMap`].
///
/// [`values_mut`]: HashMap::values_mut
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, v)| v)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

/// A draining iterator over the key-value pairs of a [`HashMap`].
///
/// This struct is created by the [`drain`] method on [`HashMap`].
///
/// [`drain`]: HashMap::drain
pub struct Drain<'a, K, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    inner: crate::hash_table::Drain<'a, (K, V), A, MAX_LOAD_PERCENT>,
}

impl<K, V, A: Allocator, const MAX_LOAD_PERCENT: usize> Iterator
    for Drain<'_, K, V, A, MAX_LOAD_PERCENT>
{
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }
}

#[cfg(test)]
mod tests {
    use alloc::string::String;
    use alloc::string::ToString;
    use alloc::vec::Vec;
    use core::hash::BuildHasher;

    use rand::TryRngCore;
    use rand::rngs::OsRng;
    use siphasher::sip::SipHasher;

    use super::*;

    #[derive(Clone)]
    struct SipHashBuilder {
        k0: u64,
        k1: u64,
    }

    impl BuildHasher for SipHashBuilder {
        type Hasher = SipHasher;

        fn build_hasher(&self) -> Self::Hasher {
            SipHasher::new_with_keys(self.k0, self.k1)
        }
    }

    impl Default for SipHashBuilder {
        fn default() -> Self {
            let mut rng = OsRng;
            Self {
                k0: rng.try_next_u64().unwrap_or(0),
                k1: rng.try_next_u64().unwrap_or(0),
            }
        }
    }

    #[test]
    fn new_and_with_hasher() {
        let map: HashMap<i32, String, SipHashBuilder> = HashMap::new();
        assert!(map.is_empty());
        assert_eq!(map.len(), 0);
        assert_eq!(map.capacity(), 0);

        let map2 = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        assert!(map2.is_empty());
        assert_eq!(map2.len(), 0);
    }

    #[test]
    fn with_capacity_reserves() {
        let map2 = HashMap::<i32, String, _>::with_capacity_and_hasher(
            200,
            SipHashBuilder::default(),
        )
        .unwrap();
        assert!(map2.capacity() >= 200);
        assert!(map2.is_empty());
    }

    #[test]
    fn insert_and_get() {
        let mut map = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());

        assert_eq!(map.insert(1, "hello".to_string()).unwrap(), None);
        assert_eq!(map.len(), 1);
        assert!(!map.is_empty());

        assert_eq!(map.get(&1), Some(&"hello".to_string()));
        assert_eq!(map.get(&2), None);

        assert_eq!(
            map.insert(1, "world".to_string()).unwrap(),
            Some("hello".to_string())
        );
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(&1), Some(&"world".to_string()));
    }

    #[test]
    fn get_mut_modifies() {
        let mut map = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        map.insert(1, "hello".to_string()).unwrap();

        if let Some(value) = map.get_mut(&1) {
            value.push_str(" world");
        }

        assert_eq!(map.get(&1), Some(&"hello world".to_string()));
        assert_eq!(map.get_mut(&2), None);
    }

    #[test]
    fn get_key_value_returns_stored_key() {
        let mut map = HashMap::<String, i32, _>::with_hasher(SipHashBuilder::default());
        map.insert("alpha".to_string(), 1).unwrap();

        let (k, v) = map.get_key_value(&"alpha".to_string()).unwrap();
        assert_eq!(k, "alpha");
        assert_eq!(*v, 1);
        assert!(map.get_key_value(&"beta".to_string()).is_none());
    }

    #[test]
    fn basic_sum() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..5u64 {
            map.insert(i, i).unwrap();
        }

        let key_sum: u64 = map.keys().sum();
        assert_eq!(key_sum, 10);

        let value_sum: u64 = (0..5u64).map(|i| *map.get(&i).unwrap()).sum();
        assert_eq!(value_sum, 10);
    }

    #[test]
    fn remove_and_remove_entry() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..8u64 {
            map.insert(i, i * 10).unwrap();
        }

        assert_eq!(map.remove(&3), Some(30));
        assert_eq!(map.remove(&3), None);
        assert_eq!(map.remove_entry(&5), Some((5, 50)));
        assert_eq!(map.len(), 6);

        for i in [0u64, 1, 2, 4, 6, 7] {
            assert_eq!(map.get(&i), Some(&(i * 10)));
        }
        assert!(!map.contains_key(&3));
        assert!(!map.contains_key(&5));
    }

    #[test]
    fn insert_no_clobber_inserts_absent_key() {
        let mut map = HashMap::<i32, &str, _>::with_hasher(SipHashBuilder::default());
        map.insert_no_clobber(1, "one").unwrap();
        assert_eq!(map.get(&1), Some(&"one"));
        assert_eq!(map.len(), 1);
    }

    #[test]
    fn assume_capacity_inserts_do_not_allocate() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        map.reserve(10).unwrap();
        let capacity = map.capacity();

        for i in 0..10u64 {
            // SAFETY: capacity for 10 insertions was reserved above.
            unsafe {
                map.insert_assume_capacity_no_clobber(i, i);
            }
        }
        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.len(), 10);

        // SAFETY: the key is present, so no slot is consumed.
        let old = unsafe { map.insert_assume_capacity(4, 400) };
        assert_eq!(old, Some(4));
        assert_eq!(map.get(&4), Some(&400));
    }

    #[test]
    fn entry_api() {
        let mut map = HashMap::<&str, i32, _>::with_hasher(SipHashBuilder::default());

        let value = map.entry("a").unwrap().or_insert(1);
        assert_eq!(*value, 1);
        *map.entry("a").unwrap().or_insert(7) += 10;
        assert_eq!(map.get(&"a"), Some(&11));

        let value = map.entry("b").unwrap().or_insert_with(|| 2);
        assert_eq!(*value, 2);

        map.entry("a").unwrap().and_modify(|v| *v += 1);
        assert_eq!(map.get(&"a"), Some(&12));
        map.entry("c").unwrap().and_modify(|v| *v += 1);
        assert!(!map.contains_key(&"c"));

        let value: &mut i32 = map.entry("d").unwrap().or_default();
        assert_eq!(*value, 0);

        assert_eq!(map.entry("a").unwrap().key(), &"a");
        assert_eq!(map.entry("zzz").unwrap().key(), &"zzz");
        assert!(!map.contains_key(&"zzz"), "key() must not insert");
    }

    #[test]
    fn occupied_entry_operations() {
        let mut map = HashMap::<i32, String, _>::with_hasher(SipHashBuilder::default());
        map.insert(1, "one".to_string()).unwrap();

        match map.entry(1).unwrap() {
            Entry::Occupied(mut entry) => {
                assert_eq!(entry.key(), &1);
                assert_eq!(entry.get(), "one");
                let old = entry.insert("uno".to_string());
                assert_eq!(old, "one");
            }
            Entry::Vacant(_) => panic!("should be occupied"),
        }
        assert_eq!(map.get(&1), Some(&"uno".to_string()));

        match map.entry(1).unwrap() {
            Entry::Occupied(entry) => {
                let (k, v) = entry.remove_entry();
                assert_eq!(k, 1);
                assert_eq!(v, "uno");
            }
            Entry::Vacant(_) => panic!("should be occupied"),
        }
        assert!(map.is_empty());
    }

    #[test]
    fn vacant_entry_key_ownership() {
        let mut map: HashMap<String, i32, _> = HashMap::with_hasher(SipHashBuilder::default());

        match map.entry("owned".to_string()).unwrap() {
            Entry::Vacant(entry) => {
                assert_eq!(entry.key(), "owned");
                let key = entry.into_key();
                assert_eq!(key, "owned");
            }
            Entry::Occupied(_) => panic!("should be vacant"),
        }
        assert!(map.is_empty());
    }

    #[test]
    fn clear_retains_capacity() {
        let mut map = HashMap::<i32, i32, _>::with_hasher(SipHashBuilder::default());
        map.insert(1, 1).unwrap();
        let capacity = map.capacity();
        assert!(capacity > 0);

        map.clear();
        map.clear();

        assert_eq!(map.len(), 0);
        assert_eq!(map.capacity(), capacity);
        assert!(!map.contains_key(&1));
    }

    #[test]
    fn clear_and_free_releases_allocation() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..64u64 {
            map.insert(i, i).unwrap();
        }

        map.clear_and_free();
        assert_eq!(map.capacity(), 0);
        assert_eq!(map.len(), 0);

        map.insert(1, 1).unwrap();
        assert_eq!(map.get(&1), Some(&1));
    }

    #[test]
    fn iteration_yields_every_pair_once() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..50u64 {
            map.insert(i, i * 2).unwrap();
        }

        let mut pairs: Vec<(u64, u64)> = map.iter().map(|(k, v)| (*k, *v)).collect();
        pairs.sort_unstable();
        assert_eq!(pairs.len(), 50);
        for (i, (k, v)) in pairs.into_iter().enumerate() {
            assert_eq!(k, i as u64);
            assert_eq!(v, (i as u64) * 2);
        }

        let mut keys: Vec<u64> = map.keys().copied().collect();
        keys.sort_unstable();
        assert_eq!(keys, (0..50u64).collect::<Vec<_>>());

        let value_sum: u64 = map.values().sum();
        assert_eq!(value_sum, (0..50u64).map(|i| i * 2).sum());
    }

    #[test]
    fn iter_mut_and_values_mut() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..10u64 {
            map.insert(i, i).unwrap();
        }

        for (k, v) in map.iter_mut() {
            *v += *k;
        }
        for value in map.values_mut() {
            *value += 1;
        }

        for i in 0..10u64 {
            assert_eq!(map.get(&i), Some(&(i * 2 + 1)));
        }
    }

    #[test]
    fn drain_empties_map() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..20u64 {
            map.insert(i, i).unwrap();
        }
        let capacity = map.capacity();

        let mut drained: Vec<(u64, u64)> = map.drain().collect();
        drained.sort_unstable();
        assert_eq!(drained.len(), 20);
        for (i, (k, v)) in drained.into_iter().enumerate() {
            assert_eq!((k, v), (i as u64, i as u64));
        }

        assert!(map.is_empty());
        assert_eq!(map.capacity(), capacity);
    }

    #[test]
    fn clone_is_independent() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        for i in 0..30u64 {
            map.insert(i, i).unwrap();
        }
        for i in 0..10u64 {
            map.remove(&i);
        }

        let mut clone = map.clone();
        assert_eq!(clone, map);

        clone.insert(1000, 1000).unwrap();
        clone.remove(&15);
        assert!(!map.contains_key(&1000));
        assert!(map.contains_key(&15));
    }

    #[test]
    fn eq_ignores_order_and_capacity() {
        let mut a = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        let mut b = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        b.reserve(100).unwrap();

        for i in 0..10u64 {
            a.insert(i, i).unwrap();
        }
        for i in (0..10u64).rev() {
            b.insert(i, i).unwrap();
        }

        assert_eq!(a, b);

        b.insert(10, 10).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn reserve_then_insert_without_growth() {
        let mut map = HashMap::<u64, u64, _>::with_hasher(SipHashBuilder::default());
        map.reserve(500).unwrap();
        let capacity = map.capacity();

        for i in 0..500u64 {
            map.insert(i, i).unwrap();
        }

        assert_eq!(map.capacity(), capacity);
        assert_eq!(map.len(), 500);
    }

    #[test]
    fn debug_formats_as_map() {
        let mut map = HashMap::<i32, i32, _>::with_hasher(SipHashBuilder::default());
        map.insert(1, 2).unwrap();
        let formatted = alloc::format!("{:?}", map);
        assert_eq!(formatted, "{1: 2}");
    }

    #[test]
    fn string_keys() {
        let mut map = HashMap::<String, usize, _>::with_hasher(SipHashBuilder::default());
        let words = ["apple", "banana", "cherry", "date", "elderberry"];

        for (i, word) in words.iter().enumerate() {
            map.insert(word.to_string(), i).unwrap();
        }

        for (i, word) in words.iter().enumerate() {
            assert_eq!(map.get(&word.to_string()), Some(&i));
        }

        assert_eq!(map.remove(&"cherry".to_string()), Some(2));
        assert_eq!(map.len(), 4);
        assert!(!map.contains_key(&"cherry".to_string()));
    }
}
