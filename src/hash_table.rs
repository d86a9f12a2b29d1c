//! A cache-efficient hash table using metadata-filtered linear probing.
//!
//! The table is open-addressed with a linear probe sequence and keeps one
//! metadata byte per slot. The byte packs the slot state (empty, used,
//! tombstone) together with a 6-bit fingerprint of the hash, so almost every
//! probe step is decided by a single byte compare. Only when the fingerprint
//! matches does the probe touch the entry array and call the caller's
//! equality predicate.
//!
//! [`HashTable<V>`] stores values of type `V` and provides fast insertion,
//! lookup, and removal operations. This is a fairly low-level structure that
//! requires you to provide the hash value, an equality predicate, and (for
//! operations that may relocate entries) a rehash function for each
//! operation. Prefer using the [`HashMap<K, V, S>`] wrapper for a more
//! convenient key-value interface unless you are implementing your own map
//! structure.
//!
//! ## Design
//!
//! All data is stored in one contiguous type-erased allocation:
//! `[ Metadata | Entries ]`, with the entry array aligned to the entry type
//! within the block. A typical lookup touches two cache lines: the metadata
//! line around the initial probe position, and the entry line of the
//! matching slot. Keeping both arrays in one allocation means they are
//! adjacent in the address space, which helps TLB behavior and halves the
//! allocator traffic compared to split storage.
//!
//! Fingerprints are taken from the *top* 6 bits of the hash value. The probe
//! position uses the low `log2(capacity)` bits, so deriving the fingerprint
//! from the high end keeps the two disjoint for any realistic capacity. It
//! is important that fingerprints are not derived from the lower bits of the
//! hash, as that causes them to be correlated with their location in the
//! table, making the filter nearly useless exactly where collisions cluster.
//!
//! Capacity is always zero or a power of two so the probe position is a
//! masking operation on the hash. Using `&` over modulo has a measurable
//! performance impact on the probe loop.
//!
//! Removal writes a tombstone instead of back-shifting the chain. A
//! tombstone keeps probe chains through it intact and is skipped during
//! lookups; it continues to count against the load budget until the next
//! growth, which reinserts every live entry into a fresh block and discards
//! tombstones wholesale. Tombstoning keeps the probe loop branch-predictable
//! at the cost of carrying dead slots between growths.
//!
//! The load budget is tracked in an `available` countdown: the number of
//! further occupancy-increasing insertions permitted before the table must
//! grow. Installing into a previously-empty slot charges the budget;
//! recycling a tombstone slot does not (the slot was already counted), and
//! removal never refunds it. When the countdown hits zero the next insertion
//! of a new key grows the table to
//! `max(MINIMAL_CAPACITY, capacity_for_size(load + 1))`.
//!
//! Allocation goes through a caller-supplied [`Allocator`] and failure is
//! recoverable: allocating operations return [`TryReserveError`] and leave
//! the table exactly as it was. The table owns at most one block at any
//! time; growth allocates the new block, moves the entries, then frees the
//! old one.
//!
//! ## Safety Invariants
//!
//! The implementation relies on the following key invariants:
//!
//! 1. **Index Bounds**: probe indices are always masked by `capacity - 1`
//!    and capacity is a power of two, so every metadata and entry access
//!    stays inside the arrays. Probe loops are only entered when the
//!    capacity is nonzero.
//!
//! 2. **Initialization**: a metadata byte with the used bit set marks an
//!    initialized entry; empty and tombstone bytes mark uninitialized
//!    storage. Removal clears the used bit only after reading the value out.
//!
//! 3. **Chain Contiguity**: for every used slot, the probe walk from its
//!    home position reaches it without crossing an empty slot (tombstones
//!    are allowed in between). Insertion only ever installs on the probed
//!    chain itself, and growth rebuilds all chains from scratch.
//!
//! 4. **Termination**: `MAX_LOAD_PERCENT < 100` keeps
//!    `len + tombstones < capacity`, so at least one slot is empty and
//!    every probe walk terminates.
//!
//! [`HashMap<K, V, S>`]: crate::hash_map::HashMap

use alloc::alloc::handle_alloc_error;
use core::alloc::Layout;
use core::fmt::Debug;
use core::marker::PhantomData;
use core::mem::MaybeUninit;
use core::ptr::NonNull;

use allocator_api2::alloc::Allocator;
use allocator_api2::alloc::Global;

/// Smallest nonzero capacity the table will allocate.
///
/// The first insertion into an empty table jumps straight to this size so
/// tiny tables do not churn through 1-2-4 slot growths.
const MINIMAL_CAPACITY: usize = 8;

/// The error returned by allocating table operations.
///
/// The table is left in its pre-call state when any operation returns this;
/// no partial insertion is ever visible.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TryReserveError {
    /// The required capacity exceeded what the layout arithmetic can
    /// represent in a `usize`.
    CapacityOverflow,
    /// The allocator declined the request.
    AllocError {
        /// The layout of the allocation request that failed.
        layout: Layout,
    },
}

impl core::fmt::Display for TryReserveError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            TryReserveError::CapacityOverflow => {
                write!(f, "memory allocation failed: capacity overflow")
            }
            TryReserveError::AllocError { .. } => {
                write!(f, "memory allocation failed: allocator returned an error")
            }
        }
    }
}

impl core::error::Error for TryReserveError {}

impl TryReserveError {
    /// Escalates the error the way the infallible std collections do.
    pub(crate) fn abort(self) -> ! {
        match self {
            TryReserveError::CapacityOverflow => panic!("capacity overflow"),
            TryReserveError::AllocError { layout } => handle_alloc_error(layout),
        }
    }
}

/// Per-slot control byte.
///
/// Bit 0 is the used flag, bit 1 the tombstone flag, bits 2..7 hold the
/// fingerprint (the top 6 bits of the hash). The three states empty (0,0),
/// used (1,0) and tombstone (0,1) are mutually exclusive; (1,1) never
/// occurs. Packing the used bit next to the fingerprint lets `matches`
/// decide "used with this fingerprint" in one byte compare.
#[derive(Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
struct Metadata(u8);

// The whole layout computation assumes the control word is one byte.
const _: () =
    assert!(core::mem::size_of::<Metadata>() == 1 && core::mem::align_of::<Metadata>() == 1);

impl Metadata {
    const FREE: Metadata = Metadata(0);
    const TOMBSTONE: Metadata = Metadata(0b10);

    #[inline(always)]
    fn fingerprint(hash: u64) -> u8 {
        (hash >> 58) as u8
    }

    #[inline(always)]
    fn used(fingerprint: u8) -> Metadata {
        Metadata((fingerprint << 2) | 0b01)
    }

    #[inline(always)]
    fn is_free(self) -> bool {
        self.0 == Self::FREE.0
    }

    #[inline(always)]
    fn is_tombstone(self) -> bool {
        self.0 == Self::TOMBSTONE.0
    }

    #[inline(always)]
    fn is_used(self) -> bool {
        self.0 & 0b01 != 0
    }

    /// True when the slot is used and carries this fingerprint.
    #[inline(always)]
    fn matches(self, fingerprint: u8) -> bool {
        self.0 == (fingerprint << 2) | 0b01
    }
}

#[derive(Debug, Clone, Copy)]
struct DataLayout {
    layout: Layout,
    entries_offset: usize,
}

impl DataLayout {
    const EMPTY: DataLayout = DataLayout {
        layout: Layout::new::<()>(),
        entries_offset: 0,
    };

    fn new<V>(capacity: usize) -> Result<Self, TryReserveError> {
        let metadata_layout =
            Layout::array::<Metadata>(capacity).map_err(|_| TryReserveError::CapacityOverflow)?;
        let entries_layout = Layout::array::<MaybeUninit<V>>(capacity)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        let (layout, entries_offset) = metadata_layout
            .extend(entries_layout)
            .map_err(|_| TryReserveError::CapacityOverflow)?;

        Ok(DataLayout {
            layout,
            entries_offset,
        })
    }
}

/// The result of walking a probe chain for a hash.
enum Probe {
    /// A used slot whose entry satisfied the equality predicate.
    Occupied(usize),
    /// The slot a new entry for this hash should be installed into. When
    /// `recycled` is set the slot is a tombstone on the chain and is already
    /// counted against the load budget.
    Vacant { index: usize, recycled: bool },
}

/// A hash table using metadata-filtered linear probing.
///
/// `HashTable<V>` stores values of type `V` and provides fast insertion,
/// lookup, and removal operations. Unlike standard hash maps, this
/// implementation requires you to provide the hash value and an equality
/// predicate for each operation, plus a rehash function for operations that
/// may relocate entries.
///
/// The `MAX_LOAD_PERCENT` parameter fixes the maximum load factor at the
/// type level; values outside `1..=99` fail to compile when a constructor
/// is instantiated.
///
/// ## Performance Characteristics
///
/// - **Memory**: 1 byte per slot overhead, plus the size of `V`.
pub struct HashTable<V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    layout: DataLayout,
    alloc: NonNull<u8>,

    capacity: usize,
    len: usize,
    available: usize,

    allocator: A,

    _phantom: PhantomData<V>,
}

impl<V, A: Allocator, const MAX_LOAD_PERCENT: usize> Debug for HashTable<V, A, MAX_LOAD_PERCENT> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        use alloc::string::String;
        use alloc::string::ToString;
        use alloc::vec::Vec;

        if self.capacity == 0 {
            return f
                .debug_struct("HashTable")
                .field("metadata", &"unallocated")
                .field("len", &self.len)
                .field("available", &self.available)
                .finish();
        }

        // SAFETY: A nonzero capacity means `self.alloc` points at a live
        // allocation holding `capacity` metadata bytes.
        let states = unsafe {
            self.metadata_ptr()
                .as_ref()
                .iter()
                .map(|meta| {
                    if meta.is_free() {
                        "..".to_string()
                    } else if meta.is_tombstone() {
                        "xx".to_string()
                    } else {
                        alloc::format!("{:02x}", meta.0 >> 2)
                    }
                })
                .collect::<Vec<String>>()
                .join(" ")
        };

        f.debug_struct("HashTable")
            .field("metadata", &states)
            .field("len", &self.len)
            .field("capacity", &self.capacity)
            .field("available", &self.available)
            .finish()
    }
}

impl<V, const MAX_LOAD_PERCENT: usize> HashTable<V, Global, MAX_LOAD_PERCENT> {
    /// Creates a new, empty table backed by the global allocator.
    ///
    /// No memory is allocated until the first insertion or an explicit
    /// [`reserve`](HashTable::reserve).
    pub const fn new() -> Self {
        Self::new_in(Global)
    }

    /// Creates a table with room for at least `capacity` entries.
    pub fn with_capacity(capacity: usize) -> Result<Self, TryReserveError> {
        Self::with_capacity_in(capacity, Global)
    }
}

impl<V, const MAX_LOAD_PERCENT: usize> Default for HashTable<V, Global, MAX_LOAD_PERCENT> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V, A: Allocator, const MAX_LOAD_PERCENT: usize> HashTable<V, A, MAX_LOAD_PERCENT> {
    /// Referenced from every constructor so an out-of-range load factor
    /// fails at compile time rather than at first insert.
    const LOAD_FACTOR_VALID: () = assert!(
        MAX_LOAD_PERCENT > 0 && MAX_LOAD_PERCENT < 100,
        "MAX_LOAD_PERCENT must be between 1 and 99"
    );

    /// Creates a new, empty table backed by the given allocator.
    pub const fn new_in(allocator: A) -> Self {
        let () = Self::LOAD_FACTOR_VALID;
        Self {
            layout: DataLayout::EMPTY,
            alloc: NonNull::dangling(),
            capacity: 0,
            len: 0,
            available: 0,
            allocator,
            _phantom: PhantomData,
        }
    }

    /// Creates a table backed by the given allocator with room for at least
    /// `capacity` entries.
    pub fn with_capacity_in(capacity: usize, allocator: A) -> Result<Self, TryReserveError> {
        let mut table = Self::new_in(allocator);
        if capacity > 0 {
            let target = Self::capacity_for_size(capacity)?.max(MINIMAL_CAPACITY);
            // The rehash closure is never invoked: the table has no entries.
            table.grow(target, &|_| unreachable!())?;
        }
        Ok(table)
    }

    /// The maximum number of used-or-tombstone slots a table of `capacity`
    /// slots may carry.
    #[inline(always)]
    fn max_load(capacity: usize) -> usize {
        (capacity as u128 * MAX_LOAD_PERCENT as u128 / 100) as usize
    }

    /// The smallest valid capacity that holds `size` entries while staying
    /// strictly under the maximum load.
    fn capacity_for_size(size: usize) -> Result<usize, TryReserveError> {
        size.checked_mul(100)
            .ok_or(TryReserveError::CapacityOverflow)?
            .div_ceil(MAX_LOAD_PERCENT)
            .checked_add(1)
            .ok_or(TryReserveError::CapacityOverflow)?
            .checked_next_power_of_two()
            .ok_or(TryReserveError::CapacityOverflow)
    }

    /// Used plus tombstone slots, the quantity charged against the load
    /// budget.
    #[inline(always)]
    fn load(&self) -> usize {
        Self::max_load(self.capacity) - self.available
    }

    fn metadata_ptr(&self) -> NonNull<[Metadata]> {
        NonNull::slice_from_raw_parts(self.alloc.cast(), self.capacity)
    }

    fn entries_ptr(&self) -> NonNull<[MaybeUninit<V>]> {
        if self.capacity == 0 {
            return NonNull::slice_from_raw_parts(NonNull::dangling(), 0);
        }

        // SAFETY: A nonzero capacity means `self.alloc` points at a live
        // allocation described by `self.layout`, and `entries_offset` is
        // the in-bounds, `V`-aligned start of the entry array within it.
        unsafe {
            NonNull::slice_from_raw_parts(
                self.alloc.add(self.layout.entries_offset).cast(),
                self.capacity,
            )
        }
    }

    /// Returns the number of elements in the table.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Returns `true` if the table contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns the number of slots in the table, always zero or a power of
    /// two.
    ///
    /// The number of entries the table can hold before growing is smaller;
    /// see [`available`](HashTable::available).
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The remaining budget of new-slot insertions before the next insert
    /// of an absent key forces a growth.
    ///
    /// Removals do not refund the budget; the tombstones they leave behind
    /// keep counting against it until the next growth discards them.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Returns a reference to the underlying allocator.
    pub fn allocator(&self) -> &A {
        &self.allocator
    }

    /// Walk the probe chain for `hash`, classifying the terminal slot.
    ///
    /// Records the first tombstone seen so an insertion can recycle it
    /// instead of consuming a fresh slot at the end of the chain.
    ///
    /// # Safety
    ///
    /// The capacity must be nonzero.
    #[inline]
    unsafe fn probe(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Probe {
        debug_assert!(self.capacity > 0);

        let mask = self.capacity - 1;
        let fingerprint = Metadata::fingerprint(hash);
        let mut index = (hash as usize) & mask;
        let mut tombstone = None;

        // SAFETY: `index` is masked into bounds on every step, the walk
        // terminates at the first free byte (one always exists, invariant
        // 4), and a matching metadata byte marks an initialized entry.
        unsafe {
            let metadata = self.metadata_ptr().as_ref();
            loop {
                let meta = *metadata.get_unchecked(index);
                if meta.matches(fingerprint)
                    && eq(self
                        .entries_ptr()
                        .as_ref()
                        .get_unchecked(index)
                        .assume_init_ref())
                {
                    return Probe::Occupied(index);
                }
                if meta.is_free() {
                    return match tombstone {
                        Some(index) => Probe::Vacant {
                            index,
                            recycled: true,
                        },
                        None => Probe::Vacant {
                            index,
                            recycled: false,
                        },
                    };
                }
                if tombstone.is_none() && meta.is_tombstone() {
                    tombstone = Some(index);
                }
                index = (index + 1) & mask;
            }
        }
    }

    /// Walk the probe chain for `hash`, returning the index of the used
    /// slot whose entry satisfies `eq`.
    ///
    /// # Safety
    ///
    /// The capacity must be nonzero.
    #[inline]
    unsafe fn probe_find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<usize> {
        debug_assert!(self.capacity > 0);

        let mask = self.capacity - 1;
        let fingerprint = Metadata::fingerprint(hash);
        let mut index = (hash as usize) & mask;

        // SAFETY: Same bounds and termination reasoning as `probe`.
        unsafe {
            let metadata = self.metadata_ptr().as_ref();
            loop {
                let meta = *metadata.get_unchecked(index);
                if meta.matches(fingerprint)
                    && eq(self
                        .entries_ptr()
                        .as_ref()
                        .get_unchecked(index)
                        .assume_init_ref())
                {
                    return Some(index);
                }
                if meta.is_free() {
                    return None;
                }
                index = (index + 1) & mask;
            }
        }
    }

    /// Returns a reference to the value matching `hash` and `eq`, if any.
    ///
    /// # Arguments
    ///
    /// * `hash` - The hash value of the entry to find
    /// * `eq` - A predicate function that returns `true` for the value to
    ///   find
    pub fn find(&self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&V> {
        if self.len == 0 {
            return None;
        }

        // SAFETY: A nonzero `len` implies a nonzero capacity.
        let index = unsafe { self.probe_find(hash, eq)? };
        // SAFETY: `probe_find` only returns in-bounds used slots.
        unsafe {
            Some(
                self.entries_ptr()
                    .as_ref()
                    .get_unchecked(index)
                    .assume_init_ref(),
            )
        }
    }

    /// Returns a mutable reference to the value matching `hash` and `eq`,
    /// if any.
    pub fn find_mut(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<&mut V> {
        if self.len == 0 {
            return None;
        }

        // SAFETY: A nonzero `len` implies a nonzero capacity.
        let index = unsafe { self.probe_find(hash, eq)? };
        // SAFETY: `probe_find` only returns in-bounds used slots.
        unsafe {
            Some(
                self.entries_ptr()
                    .as_mut()
                    .get_unchecked_mut(index)
                    .assume_init_mut(),
            )
        }
    }

    /// Returns `true` if the table holds a value matching `hash` and `eq`.
    pub fn contains(&self, hash: u64, eq: impl Fn(&V) -> bool) -> bool {
        self.find(hash, eq).is_some()
    }

    /// Removes and returns the value matching `hash` and `eq`, if any.
    ///
    /// This is the remove-if-present form; the remove-or-assert form is
    /// [`OccupiedEntry::remove`], where presence is proven by construction.
    /// The vacated slot becomes a tombstone: the load budget is not
    /// refunded until the next growth.
    pub fn remove(&mut self, hash: u64, eq: impl Fn(&V) -> bool) -> Option<V> {
        if self.len == 0 {
            return None;
        }

        // SAFETY: A nonzero `len` implies a nonzero capacity.
        let index = unsafe { self.probe_find(hash, eq)? };
        self.len -= 1;

        // SAFETY: `probe_find` returned an in-bounds used slot. Writing the
        // tombstone byte before reading the value out is fine: the read
        // consumes the entry storage, and from here on the slot is treated
        // as uninitialized.
        unsafe {
            *self.metadata_ptr().as_mut().get_unchecked_mut(index) = Metadata::TOMBSTONE;
            Some(
                self.entries_ptr()
                    .as_ref()
                    .get_unchecked(index)
                    .assume_init_read(),
            )
        }
    }

    /// Gets an entry for the given hash and equality predicate, growing the
    /// table first if the load budget is exhausted.
    ///
    /// This method returns an [`Entry`] that allows for efficient insertion
    /// or modification of values. `rehash` is used to relocate existing
    /// entries if a growth is required.
    ///
    /// # Errors
    ///
    /// Returns an error if a required growth cannot be satisfied by the
    /// allocator. The table is unchanged in that case.
    #[inline]
    pub fn entry(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
        rehash: impl Fn(&V) -> u64,
    ) -> Result<Entry<'_, V, A, MAX_LOAD_PERCENT>, TryReserveError> {
        self.reserve(1, rehash)?;
        // SAFETY: `reserve` guaranteed a budget for one insertion.
        Ok(unsafe { self.entry_assume_capacity(hash, eq) })
    }

    /// Gets an entry for the given hash and equality predicate without ever
    /// allocating.
    ///
    /// # Safety
    ///
    /// The caller must have established spare capacity for one insertion
    /// (`available() >= 1`, e.g. via [`reserve`](HashTable::reserve)) in
    /// case the value is absent. Calling this on a table without capacity
    /// is undefined behavior in release builds; debug builds assert.
    pub unsafe fn entry_assume_capacity(
        &mut self,
        hash: u64,
        eq: impl Fn(&V) -> bool,
    ) -> Entry<'_, V, A, MAX_LOAD_PERCENT> {
        debug_assert!(self.capacity > 0);
        debug_assert!(self.available > 0 || self.contains(hash, &eq));

        // SAFETY: The caller guarantees reserved capacity, which implies a
        // nonzero capacity.
        match unsafe { self.probe(hash, eq) } {
            Probe::Occupied(index) => Entry::Occupied(OccupiedEntry { table: self, index }),
            Probe::Vacant { index, recycled } => Entry::Vacant(VacantEntry {
                table: self,
                hash,
                index,
                recycled,
            }),
        }
    }

    /// Reserves capacity for at least `additional` more elements.
    ///
    /// After a successful call, `additional` insertions are guaranteed not
    /// to allocate, provided no intervening removals add tombstones to the
    /// load. Does nothing if the budget already suffices. `rehash` is used
    /// to relocate existing entries when a growth is required.
    ///
    /// # Errors
    ///
    /// Returns an error and leaves the table unchanged if the new block
    /// cannot be allocated or the capacity arithmetic overflows.
    pub fn reserve(
        &mut self,
        additional: usize,
        rehash: impl Fn(&V) -> u64,
    ) -> Result<(), TryReserveError> {
        if additional <= self.available {
            return Ok(());
        }

        let required = self
            .load()
            .checked_add(additional)
            .ok_or(TryReserveError::CapacityOverflow)?;
        let new_capacity = Self::capacity_for_size(required)?.max(MINIMAL_CAPACITY);
        self.grow(new_capacity, &rehash)
    }

    /// Replace the backing allocation with a fresh one of `new_capacity`
    /// slots and reinsert every live entry, discarding tombstones.
    ///
    /// On allocation failure the table is untouched.
    #[cold]
    #[inline(never)]
    fn grow(
        &mut self,
        new_capacity: usize,
        rehash: &dyn Fn(&V) -> u64,
    ) -> Result<(), TryReserveError> {
        debug_assert!(new_capacity.is_power_of_two());
        debug_assert!(Self::max_load(new_capacity) >= self.len);

        let new_layout = DataLayout::new::<V>(new_capacity)?;
        let new_alloc: NonNull<u8> = match self.allocator.allocate(new_layout.layout) {
            Ok(block) => block.cast(),
            Err(_) => {
                return Err(TryReserveError::AllocError {
                    layout: new_layout.layout,
                });
            }
        };

        // SAFETY: The block was just allocated with `new_capacity` metadata
        // bytes at offset zero; zeroing them marks every slot free.
        unsafe {
            core::ptr::write_bytes(new_alloc.as_ptr(), 0x0, new_capacity);
        }

        let old_layout = core::mem::replace(&mut self.layout, new_layout);
        let old_alloc = core::mem::replace(&mut self.alloc, new_alloc);
        let old_capacity = core::mem::replace(&mut self.capacity, new_capacity);
        let old_len = self.len;
        self.len = 0;
        self.available = Self::max_load(new_capacity);

        if old_capacity == 0 {
            return Ok(());
        }

        // SAFETY: The old handles describe the allocation that was live
        // until the swap above; its used slots hold initialized values.
        // Reading a value out transfers ownership into the new table, so
        // the old block is freed without running destructors.
        unsafe {
            let old_metadata: NonNull<[Metadata]> =
                NonNull::slice_from_raw_parts(old_alloc.cast(), old_capacity);
            let old_entries: NonNull<[MaybeUninit<V>]> = NonNull::slice_from_raw_parts(
                old_alloc.add(old_layout.entries_offset).cast(),
                old_capacity,
            );

            for (index, meta) in old_metadata.as_ref().iter().enumerate() {
                if !meta.is_used() {
                    continue;
                }

                let value = old_entries.as_ref().get_unchecked(index).assume_init_read();
                let hash = rehash(&value);
                self.insert_unique(hash, value);
                self.len += 1;
                self.available -= 1;
            }

            debug_assert_eq!(self.len, old_len);

            self.allocator.deallocate(old_alloc, old_layout.layout);
        }

        Ok(())
    }

    /// Install a value known to be absent into a table with at least one
    /// free slot. Does not touch `len` or `available`; the caller accounts
    /// for both.
    ///
    /// Used by the growth and clone rebuilds, where chains are built fresh
    /// and no tombstones exist.
    ///
    /// # Safety
    ///
    /// The capacity must be nonzero, at least one slot must be free, and no
    /// existing entry may be equal to the one being inserted.
    unsafe fn insert_unique(&mut self, hash: u64, value: V) {
        let mask = self.capacity - 1;
        let mut index = (hash as usize) & mask;

        // SAFETY: `index` is masked into bounds and the walk stops at the
        // first non-used byte, which exists by the caller's contract.
        unsafe {
            let metadata = self.metadata_ptr().as_mut();
            while metadata.get_unchecked(index).is_used() {
                index = (index + 1) & mask;
            }
            *metadata.get_unchecked_mut(index) = Metadata::used(Metadata::fingerprint(hash));
            self.entries_ptr()
                .as_mut()
                .get_unchecked_mut(index)
                .write(value);
        }
    }

    /// Drop every initialized entry in place. Metadata is left untouched.
    ///
    /// # Safety
    ///
    /// Callers must reset or discard the metadata before the table is used
    /// again, since the used bytes now describe dropped storage.
    unsafe fn drop_entries(&mut self) {
        if !core::mem::needs_drop::<V>() || self.len == 0 {
            return;
        }

        // SAFETY: A used metadata byte marks an initialized entry.
        unsafe {
            for (index, meta) in self.metadata_ptr().as_ref().iter().enumerate() {
                if meta.is_used() {
                    self.entries_ptr()
                        .as_mut()
                        .get_unchecked_mut(index)
                        .assume_init_drop();
                }
            }
        }
    }

    /// Removes all elements from the table, retaining the allocated
    /// capacity.
    ///
    /// Tombstones are discarded along with the entries, so the full load
    /// budget is restored.
    pub fn clear(&mut self) {
        // SAFETY: The metadata bytes are reset to free immediately after
        // the entries are dropped.
        unsafe {
            self.drop_entries();
            if self.capacity != 0 {
                core::ptr::write_bytes(self.alloc.as_ptr(), 0x0, self.capacity);
            }
        }

        self.len = 0;
        self.available = Self::max_load(self.capacity);
    }

    /// Removes all elements and returns the backing allocation to the
    /// allocator, resetting the table to its unallocated state.
    pub fn clear_and_free(&mut self) {
        // SAFETY: Entries are dropped before their storage is freed; the
        // handles are reset so the freed block is never touched again.
        unsafe {
            self.drop_entries();
            if self.capacity != 0 {
                self.allocator.deallocate(self.alloc, self.layout.layout);
            }
        }

        self.layout = DataLayout::EMPTY;
        self.alloc = NonNull::dangling();
        self.capacity = 0;
        self.len = 0;
        self.available = 0;
    }

    /// Returns an iterator over all values in the table.
    ///
    /// The iterator yields `&V` references in an arbitrary order. The
    /// iteration order is not specified and may change between versions.
    pub fn iter(&self) -> Iter<'_, V> {
        // SAFETY: The pointers cover `capacity` slots; for an unallocated
        // table both slices are empty.
        unsafe {
            Iter {
                metadata: self.metadata_ptr().as_ref(),
                entries: self.entries_ptr().as_ref(),
                index: 0,
                remaining: self.len,
            }
        }
    }

    /// Returns an iterator over all values in the table, yielding mutable
    /// references.
    pub fn iter_mut(&mut self) -> IterMut<'_, V> {
        // SAFETY: As for `iter`; the entry base pointer is only
        // dereferenced at used slots, each of which is yielded once.
        unsafe {
            IterMut {
                metadata: self.metadata_ptr().as_ref(),
                entries: self.entries_ptr().cast(),
                index: 0,
                remaining: self.len,
                _phantom: PhantomData,
            }
        }
    }

    /// Returns an iterator that removes and yields all values from the
    /// table.
    ///
    /// After the iterator is dropped the table is empty with its capacity
    /// and full load budget retained. Calling `mem::forget` on the iterator
    /// leaks all unyielded values without dropping them.
    pub fn drain(&mut self) -> Drain<'_, V, A, MAX_LOAD_PERCENT> {
        Drain {
            table: self,
            index: 0,
        }
    }

    /// Creates an independent copy of the table.
    ///
    /// The copy's capacity is computed fresh from the entry count, its
    /// probe chains are rebuilt from scratch, and it carries no tombstones;
    /// it is not a bytewise replica of `self`. `rehash` supplies the hash
    /// for each copied value.
    ///
    /// # Errors
    ///
    /// Returns an error if the new block cannot be allocated; `self` is
    /// unaffected either way.
    pub fn try_clone(&self, rehash: impl Fn(&V) -> u64) -> Result<Self, TryReserveError>
    where
        V: Clone,
        A: Clone,
    {
        let mut new_table = Self::new_in(self.allocator.clone());
        if self.len == 0 {
            return Ok(new_table);
        }

        let capacity = Self::capacity_for_size(self.len)?.max(MINIMAL_CAPACITY);
        new_table.grow(capacity, &|_| unreachable!())?;

        for value in self.iter() {
            let value = value.clone();
            let hash = rehash(&value);
            // SAFETY: The capacity was sized for `self.len` entries and the
            // source holds no equal pairs, so a free slot always exists and
            // uniqueness carries over.
            unsafe {
                new_table.insert_unique(hash, value);
            }
            new_table.len += 1;
            new_table.available -= 1;
        }

        Ok(new_table)
    }
}

impl<V, A: Allocator, const MAX_LOAD_PERCENT: usize> Drop for HashTable<V, A, MAX_LOAD_PERCENT> {
    fn drop(&mut self) {
        // SAFETY: Entries are dropped before the single backing block is
        // returned to the allocator.
        unsafe {
            self.drop_entries();
            if self.capacity != 0 {
                self.allocator.deallocate(self.alloc, self.layout.layout);
            }
        }
    }
}

/// A view into a single entry in the hash table, which may be vacant or
/// occupied.
///
/// This enum is constructed from the [`entry`] and
/// [`entry_assume_capacity`] methods on [`HashTable`].
///
/// [`entry`]: HashTable::entry
/// [`entry_assume_capacity`]: HashTable::entry_assume_capacity
#[derive(Debug)]
pub enum Entry<'a, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    /// A vacant entry - the value is not present in the table
    Vacant(VacantEntry<'a, V, A, MAX_LOAD_PERCENT>),
    /// An occupied entry - the value is present in the table
    Occupied(OccupiedEntry<'a, V, A, MAX_LOAD_PERCENT>),
}

impl<'a, V, A: Allocator, const MAX_LOAD_PERCENT: usize> Entry<'a, V, A, MAX_LOAD_PERCENT> {
    /// Inserts a default value if the entry is vacant and returns a mutable
    /// reference to the value either way.
    pub fn or_insert(self, default: V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default),
        }
    }

    /// Inserts a value computed from a closure if the entry is vacant and
    /// returns a mutable reference to the value either way.
    pub fn or_insert_with(self, default: impl FnOnce() -> V) -> &'a mut V {
        match self {
            Entry::Occupied(entry) => entry.into_mut(),
            Entry::Vacant(entry) => entry.insert(default()),
        }
    }

    /// Applies the closure to the value if the entry is occupied, returning
    /// a mutable reference to it; returns `None` without inserting anything
    /// if the entry is vacant.
    pub fn and_modify(self, f: impl FnOnce(&mut V)) -> Option<&'a mut V> {
        match self {
            Entry::Occupied(entry) => {
                let value = entry.into_mut();
                f(value);
                Some(value)
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Inserts `V::default()` if the entry is vacant and returns a mutable
    /// reference to the value either way.
    pub fn or_default(self) -> &'a mut V
    where
        V: Default,
    {
        self.or_insert_with(Default::default)
    }
}

/// A view into a vacant entry in the hash table.
///
/// This struct is created by the [`entry`] method on [`HashTable`] when the
/// probed value is not present.
///
/// [`entry`]: HashTable::entry
#[derive(Debug)]
pub struct VacantEntry<'a, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    table: &'a mut HashTable<V, A, MAX_LOAD_PERCENT>,
    hash: u64,
    index: usize,
    recycled: bool,
}

impl<'a, V, A: Allocator, const MAX_LOAD_PERCENT: usize> VacantEntry<'a, V, A, MAX_LOAD_PERCENT> {
    /// Inserts a value into the vacant slot and returns a mutable reference
    /// to it.
    ///
    /// Installing into a fresh slot charges the load budget; recycling a
    /// tombstone slot does not, since that slot was already counted.
    pub fn insert(self, value: V) -> &'a mut V {
        if !self.recycled {
            debug_assert!(self.table.available > 0);
            self.table.available -= 1;
        }
        self.table.len += 1;

        // SAFETY: A `VacantEntry` is only constructed by `probe`, which
        // produced an in-bounds free or tombstone slot on the chain for
        // `self.hash`. Writing the used byte and the value installs the
        // entry on its own probe chain.
        unsafe {
            *self
                .table
                .metadata_ptr()
                .as_mut()
                .get_unchecked_mut(self.index) = Metadata::used(Metadata::fingerprint(self.hash));
            self.table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .write(value)
        }
    }
}

/// A view into an occupied entry in the hash table.
///
/// This struct is created by the [`entry`] method on [`HashTable`] when the
/// probed value is present.
///
/// [`entry`]: HashTable::entry
#[derive(Debug)]
pub struct OccupiedEntry<'a, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    table: &'a mut HashTable<V, A, MAX_LOAD_PERCENT>,
    index: usize,
}

// Safety invariant for OccupiedEntry methods:
// An `OccupiedEntry` is only created after `probe` finds an in-bounds used
// slot, so `self.index` addresses initialized storage for as long as the
// entry borrows the table. `get_unchecked`, `assume_init_ref`,
// `assume_init_mut`, and `assume_init_read` on that slot are therefore
// sound.
impl<'a, V, A: Allocator, const MAX_LOAD_PERCENT: usize> OccupiedEntry<'a, V, A, MAX_LOAD_PERCENT> {
    /// Gets a reference to the value in the entry.
    pub fn get(&self) -> &V {
        // SAFETY: See safety invariant comment above `impl` block.
        unsafe {
            self.table
                .entries_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_ref()
        }
    }

    /// Gets a mutable reference to the value in the entry.
    pub fn get_mut(&mut self) -> &mut V {
        // SAFETY: See safety invariant comment above `impl` block.
        unsafe {
            self.table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Converts the entry into a mutable reference to the value with the
    /// lifetime of the table borrow.
    pub fn into_mut(self) -> &'a mut V {
        // SAFETY: See safety invariant comment above `impl` block.
        unsafe {
            self.table
                .entries_ptr()
                .as_mut()
                .get_unchecked_mut(self.index)
                .assume_init_mut()
        }
    }

    /// Replaces the value in the entry, returning the previous one.
    pub fn insert(&mut self, value: V) -> V {
        core::mem::replace(self.get_mut(), value)
    }

    /// Removes the entry from the table and returns the value.
    ///
    /// The slot becomes a tombstone; the load budget is not refunded until
    /// the next growth.
    pub fn remove(self) -> V {
        self.table.len -= 1;

        // SAFETY: See safety invariant comment above `impl` block. The
        // tombstone byte is written before the value is read out, after
        // which the slot storage is treated as uninitialized.
        unsafe {
            *self
                .table
                .metadata_ptr()
                .as_mut()
                .get_unchecked_mut(self.index) = Metadata::TOMBSTONE;
            self.table
                .entries_ptr()
                .as_ref()
                .get_unchecked(self.index)
                .assume_init_read()
        }
    }
}

/// An iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`iter`] method on [`HashTable`]. It
/// yields `&V` references in an arbitrary order.
///
/// [`iter`]: HashTable::iter
pub struct Iter<'a, V> {
    metadata: &'a [Metadata],
    entries: &'a [MaybeUninit<V>],
    index: usize,
    remaining: usize,
}

impl<'a, V> Iterator for Iter<'a, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: `remaining` counts used slots at or past `index`, so the
        // scan cannot run off the end, and a used metadata byte marks an
        // initialized entry.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                if self.metadata.get_unchecked(index).is_used() {
                    self.remaining -= 1;
                    return Some(self.entries.get_unchecked(index).assume_init_ref());
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for Iter<'_, V> {}

/// A mutable iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`iter_mut`] method on [`HashTable`]. It
/// yields `&mut V` references in an arbitrary order.
///
/// [`iter_mut`]: HashTable::iter_mut
pub struct IterMut<'a, V> {
    metadata: &'a [Metadata],
    entries: NonNull<MaybeUninit<V>>,
    index: usize,
    remaining: usize,
    _phantom: PhantomData<&'a mut V>,
}

impl<'a, V> Iterator for IterMut<'a, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        // SAFETY: Bounds and initialization as for `Iter`; each used slot
        // is yielded exactly once, so the mutable references never alias.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                if self.metadata.get_unchecked(index).is_used() {
                    self.remaining -= 1;
                    return Some(self.entries.add(index).as_mut().assume_init_mut());
                }
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<V> ExactSizeIterator for IterMut<'_, V> {}

/// A draining iterator over the values in a [`HashTable`].
///
/// This struct is created by the [`drain`] method on [`HashTable`]. It
/// yields owned `V` values and empties the table as it iterates.
///
/// [`drain`]: HashTable::drain
pub struct Drain<'a, V, A: Allocator = Global, const MAX_LOAD_PERCENT: usize = 80> {
    table: &'a mut HashTable<V, A, MAX_LOAD_PERCENT>,
    index: usize,
}

impl<V, A: Allocator, const MAX_LOAD_PERCENT: usize> Iterator for Drain<'_, V, A, MAX_LOAD_PERCENT> {
    type Item = V;

    fn next(&mut self) -> Option<Self::Item> {
        if self.table.len == 0 {
            return None;
        }

        // SAFETY: `len` counts the used slots at or past `index` (earlier
        // ones were cleared as they were yielded), so the scan stays in
        // bounds. Reading the value out after clearing the byte hands
        // ownership to the caller.
        unsafe {
            loop {
                let index = self.index;
                self.index += 1;
                let metadata = self.table.metadata_ptr().as_mut();
                if metadata.get_unchecked(index).is_used() {
                    *metadata.get_unchecked_mut(index) = Metadata::FREE;
                    self.table.len -= 1;
                    return Some(
                        self.table
                            .entries_ptr()
                            .as_ref()
                            .get_unchecked(index)
                            .assume_init_read(),
                    );
                }
            }
        }
    }
}

impl<V, A: Allocator, const MAX_LOAD_PERCENT: usize> Drop for Drain<'_, V, A, MAX_LOAD_PERCENT> {
    fn drop(&mut self) {
        for _ in &mut *self {}

        // Every value is out; reset the metadata wholesale to discard
        // tombstones and restore the full load budget.
        // SAFETY: A nonzero capacity means the metadata region is live.
        unsafe {
            if self.table.capacity != 0 {
                core::ptr::write_bytes(self.table.alloc.as_ptr(), 0x0, self.table.capacity);
            }
        }
        self.table.available = HashTable::<V, A, MAX_LOAD_PERCENT>::max_load(self.table.capacity);
    }
}
