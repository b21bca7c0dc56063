//! Two-tier interning tables backing the mapping streams.
//!
//! Each mapping stream assigns small integer IDs to first-seen entities and
//! carries its own width-growing ID coder. The *transient* tier holds the
//! assignments of the current logical message; the *persistent* tier holds
//! assignments the caller has promoted after learning the receiver accepted
//! them. Resetting the transient tier rewinds the ID coder to the persistent
//! watermark, so both ends stay in lock-step across retransmissions.
//!
//! ID 0 is reserved for null. Fresh IDs are allocated densely above the
//! persistent watermark; the watermark never decreases, so removing a
//! persistent entry (a destroyed shared object) cannot cause an ID to be
//! reassigned.

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use bitbuf::{BitReader, BitResult, BitWriter, IdReader, IdWriter};

/// Write-side interning table keyed by entity.
#[derive(Debug, Clone)]
pub struct WriteMappings<K> {
    persistent: HashMap<K, u32>,
    transient: HashMap<K, u32>,
    last_persistent_id: u32,
    ids: IdWriter,
}

impl<K: Eq + Hash + Clone> WriteMappings<K> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            persistent: HashMap::new(),
            transient: HashMap::new(),
            last_persistent_id: 0,
            ids: IdWriter::new(),
        }
    }

    /// Looks up the assigned ID across both tiers.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.persistent
            .get(key)
            .or_else(|| self.transient.get(key))
            .copied()
    }

    /// Assigns the next dense ID to a novel entity in the transient tier.
    pub fn assign(&mut self, key: K) -> u32 {
        let id = self.last_persistent_id + self.transient.len() as u32 + 1;
        self.transient.insert(key, id);
        id
    }

    /// Emits an ID through the stream's ID coder.
    pub fn write_id(&mut self, out: &mut BitWriter, id: u32) -> BitResult<()> {
        self.ids.write(out, id)
    }

    /// Emits the null ID.
    pub fn write_null(&mut self, out: &mut BitWriter) -> BitResult<()> {
        self.ids.write(out, 0)
    }

    /// Snapshots and clears the transient tier, rewinding the ID coder to
    /// the persistent watermark.
    pub fn get_and_reset_transient(&mut self) -> HashMap<K, u32> {
        self.ids.set_bits_from_value(self.last_persistent_id);
        std::mem::take(&mut self.transient)
    }

    /// Merges a transient snapshot into the persistent tier. Call at a
    /// message boundary, after the matching reset.
    pub fn persist(&mut self, snapshot: HashMap<K, u32>) {
        for (key, id) in snapshot {
            self.last_persistent_id = self.last_persistent_id.max(id);
            self.persistent.insert(key, id);
        }
        self.ids.set_bits_from_value(self.last_persistent_id);
    }

    /// Removes a persistent entry, returning its ID. The watermark is
    /// unaffected; the ID is never reassigned.
    pub fn remove_persistent<Q>(&mut self, key: &Q) -> Option<u32>
    where
        K: Borrow<Q>,
        Q: Eq + Hash + ?Sized,
    {
        self.persistent.remove(key)
    }

    /// Number of persistent entries.
    #[must_use]
    pub fn persistent_len(&self) -> usize {
        self.persistent.len()
    }

    /// Number of transient entries.
    #[must_use]
    pub fn transient_len(&self) -> usize {
        self.transient.len()
    }
}

impl<K: Eq + Hash + Clone> Default for WriteMappings<K> {
    fn default() -> Self {
        Self::new()
    }
}

/// Read-side interning table keyed by ID.
#[derive(Debug, Clone)]
pub struct ReadMappings<V> {
    persistent: HashMap<u32, V>,
    transient: HashMap<u32, V>,
    /// Transient slots handed out, including one still being filled.
    reserved: u32,
    last_persistent_id: u32,
    ids: IdReader,
}

impl<V: Clone> ReadMappings<V> {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            persistent: HashMap::new(),
            transient: HashMap::new(),
            reserved: 0,
            last_persistent_id: 0,
            ids: IdReader::new(),
        }
    }

    /// Consumes an ID from the stream.
    pub fn read_id(&mut self, input: &mut BitReader<'_>) -> BitResult<u32> {
        self.ids.read(input)
    }

    /// Looks up a stored value across both tiers.
    #[must_use]
    pub fn get(&self, id: u32) -> Option<&V> {
        self.transient.get(&id).or_else(|| self.persistent.get(&id))
    }

    /// Reserves a transient slot for a novel ID. Returns `false` when the ID
    /// is not the next expected assignment, which means the stream is
    /// desynchronized.
    #[must_use]
    pub fn begin_transient(&mut self, id: u32) -> bool {
        if id != self.last_persistent_id + self.reserved + 1 {
            return false;
        }
        self.reserved += 1;
        true
    }

    /// Fills a reserved transient slot once the entity's metadata has been
    /// consumed.
    pub fn complete_transient(&mut self, id: u32, value: V) {
        self.transient.insert(id, value);
    }

    /// Snapshots and clears the transient tier, rewinding the ID coder to
    /// the persistent watermark.
    pub fn get_and_reset_transient(&mut self) -> HashMap<u32, V> {
        self.reserved = 0;
        self.ids.set_bits_from_value(self.last_persistent_id);
        std::mem::take(&mut self.transient)
    }

    /// Merges a transient snapshot into the persistent tier.
    pub fn persist(&mut self, snapshot: HashMap<u32, V>) {
        for (id, value) in snapshot {
            self.last_persistent_id = self.last_persistent_id.max(id);
            self.persistent.insert(id, value);
        }
        self.ids.set_bits_from_value(self.last_persistent_id);
    }

    /// Removes and returns a persistent entry by ID.
    pub fn take_persistent(&mut self, id: u32) -> Option<V> {
        self.persistent.remove(&id)
    }

    /// Finds the ID of a persistent entry matching a predicate.
    #[must_use]
    pub fn find_persistent_id(&self, mut predicate: impl FnMut(&V) -> bool) -> Option<u32> {
        self.persistent
            .iter()
            .find(|(_, value)| predicate(value))
            .map(|(id, _)| *id)
    }

    /// Number of persistent entries.
    #[must_use]
    pub fn persistent_len(&self) -> usize {
        self.persistent.len()
    }
}

impl<V: Clone> Default for ReadMappings<V> {
    fn default() -> Self {
        Self::new()
    }
}
