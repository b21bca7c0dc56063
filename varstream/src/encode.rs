//! The write half of a codec session.
//!
//! One [`Encoder`] binds to one logical byte stream and lives for the whole
//! connection: its mapping streams and shared-object reference table carry
//! interned state across messages. Call [`finish_message`](Encoder::finish_message)
//! at each message boundary to flush the bit buffer and drain the bytes, and
//! use the mapping snapshot operations to promote per-message assignments
//! once the receiver has acknowledged them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bitbuf::BitWriter;

use crate::error::{CodecError, CodecResult};
use crate::mapping::WriteMappings;
use crate::metadata::MetadataMode;
use crate::object::{DynamicObject, SharedHandle, SharedObject};
use crate::registry::{ClassDescriptor, TypeRegistry};
use crate::streamer::StreamerRef;
use crate::value::{RegexValue, Value};

/// Snapshot of the transient write mappings of one message.
#[derive(Debug, Default)]
pub struct WriteMappingSnapshot {
    pub types: HashMap<Arc<str>, u32>,
    pub classes: HashMap<Arc<str>, u32>,
    pub strings: HashMap<Arc<str>, u32>,
    /// Shared-object local ID to mapping ID.
    pub shared: HashMap<u32, u32>,
}

/// Write-side delta reference: the lineage head and its state as captured
/// when its mapping was promoted. Deltas are computed against this snapshot
/// rather than the live object, so they describe exactly the changes the
/// peer has not applied yet.
struct SharedReference {
    local_id: u32,
    state: Box<dyn DynamicObject>,
}

/// The write half of a codec session.
pub struct Encoder {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) metadata_mode: MetadataMode,
    pub(crate) bits: BitWriter,
    pub(crate) types: WriteMappings<Arc<str>>,
    pub(crate) classes: WriteMappings<Arc<str>>,
    pub(crate) strings: WriteMappings<Arc<str>>,
    pub(crate) shared: WriteMappings<u32>,
    /// Promoted reference per origin ID; the delta base.
    shared_refs: HashMap<u32, SharedReference>,
    /// Every shared object seen by this session, for clear detection.
    pub(crate) shared_live: HashMap<u32, Weak<SharedObject>>,
}

impl Encoder {
    /// Creates an encoder bound to a fresh byte stream.
    #[must_use]
    pub fn new(registry: Arc<TypeRegistry>, metadata_mode: MetadataMode) -> Self {
        Self {
            registry,
            metadata_mode,
            bits: BitWriter::new(),
            types: WriteMappings::new(),
            classes: WriteMappings::new(),
            strings: WriteMappings::new(),
            shared: WriteMappings::new(),
            shared_refs: HashMap::new(),
            shared_live: HashMap::new(),
        }
    }

    /// The session's metadata mode.
    #[must_use]
    pub fn metadata_mode(&self) -> MetadataMode {
        self.metadata_mode
    }

    /// Bits written since the last drain, including the in-flight byte.
    #[must_use]
    pub fn bits_written(&self) -> usize {
        self.bits.bits_written()
    }

    /// Pads to a byte boundary and drains the message bytes.
    pub fn finish_message(&mut self) -> Vec<u8> {
        self.bits.flush();
        self.bits.take_bytes()
    }

    // --- primitives ---

    pub fn write_bool(&mut self, value: bool) -> CodecResult<()> {
        self.bits.write_bit(value);
        Ok(())
    }

    pub fn write_bits(&mut self, value: u64, bits: u8) -> CodecResult<()> {
        self.bits.write_bits(value, bits)?;
        Ok(())
    }

    pub fn write_i32(&mut self, value: i32) -> CodecResult<()> {
        self.write_bits(u64::from(value as u32), 32)
    }

    pub fn write_u32(&mut self, value: u32) -> CodecResult<()> {
        self.write_bits(u64::from(value), 32)
    }

    pub fn write_i64(&mut self, value: i64) -> CodecResult<()> {
        self.write_bits(value as u64, 64)
    }

    pub fn write_f32(&mut self, value: f32) -> CodecResult<()> {
        self.write_bits(u64::from(value.to_bits()), 32)
    }

    pub fn write_f64(&mut self, value: f64) -> CodecResult<()> {
        self.write_bits(value.to_bits(), 64)
    }

    /// 32-bit length prefix, then 8 bits per byte.
    pub fn write_bytes(&mut self, value: &[u8]) -> CodecResult<()> {
        self.write_i32(value.len() as i32)?;
        for byte in value {
            self.write_bits(u64::from(*byte), 8)?;
        }
        Ok(())
    }

    /// 32-bit UTF-16 code unit count, then 16 bits per unit.
    pub fn write_string(&mut self, value: &str) -> CodecResult<()> {
        let units: Vec<u16> = value.encode_utf16().collect();
        self.write_i32(units.len() as i32)?;
        for unit in units {
            self.write_bits(u64::from(unit), 16)?;
        }
        Ok(())
    }

    pub fn write_vec3(&mut self, value: &[f32; 3]) -> CodecResult<()> {
        for component in value {
            self.write_f32(*component)?;
        }
        Ok(())
    }

    pub fn write_quat(&mut self, value: &[f32; 4]) -> CodecResult<()> {
        for component in value {
            self.write_f32(*component)?;
        }
        Ok(())
    }

    /// Pattern string, 1 bit case sensitivity, 3 bits syntax, 1 bit minimal.
    pub fn write_regex(&mut self, value: &RegexValue) -> CodecResult<()> {
        self.write_string(&value.pattern)?;
        self.write_bits(u64::from(value.case_sensitive), 1)?;
        self.write_bits(u64::from(value.syntax.raw()), 3)?;
        self.write_bool(value.minimal)
    }

    pub(crate) fn write_digest(&mut self, digest: &crate::digest::Digest) -> CodecResult<()> {
        for byte in digest {
            self.write_bits(u64::from(*byte), 8)?;
        }
        Ok(())
    }

    // --- mapping streams ---

    /// Emits a type streamer reference through the type mapping stream,
    /// followed by its self-describing metadata on first use.
    pub fn write_type_streamer(&mut self, streamer: Option<&StreamerRef>) -> CodecResult<()> {
        let Some(streamer) = streamer else {
            self.types.write_null(&mut self.bits)?;
            return Ok(());
        };
        if let Some(id) = self.types.get(streamer.name()) {
            self.types.write_id(&mut self.bits, id)?;
            return Ok(());
        }
        let id = self.types.assign(Arc::from(streamer.name()));
        self.types.write_id(&mut self.bits, id)?;
        self.write_type_metadata(streamer)
    }

    /// Emits a class descriptor reference through the class mapping stream,
    /// followed by its metadata on first use.
    pub fn write_class(&mut self, class: Option<&Arc<ClassDescriptor>>) -> CodecResult<()> {
        let Some(class) = class else {
            self.classes.write_null(&mut self.bits)?;
            return Ok(());
        };
        if let Some(id) = self.classes.get(class.name()) {
            self.classes.write_id(&mut self.bits, id)?;
            return Ok(());
        }
        let id = self.classes.assign(Arc::from(class.name()));
        self.classes.write_id(&mut self.bits, id)?;
        self.write_class_metadata(class)
    }

    /// Emits an interned name handle; `None` is the invalid-name sentinel.
    pub fn write_name(&mut self, name: Option<&str>) -> CodecResult<()> {
        let Some(name) = name else {
            self.strings.write_null(&mut self.bits)?;
            return Ok(());
        };
        if let Some(id) = self.strings.get(name) {
            self.strings.write_id(&mut self.bits, id)?;
            return Ok(());
        }
        let id = self.strings.assign(Arc::from(name));
        self.strings.write_id(&mut self.bits, id)?;
        self.write_string(name)
    }

    // --- values ---

    /// Encodes a dynamically typed value: its streamer through the type
    /// mapping stream, then the payload.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnregisteredType`] when the value's runtime
    /// type has no registered streamer; nothing is emitted in that case.
    pub fn write_value(&mut self, value: &Value) -> CodecResult<()> {
        if value.is_invalid() {
            return self.write_type_streamer(None);
        }
        let Some(streamer) = self.registry.streamer_for_value(value).cloned() else {
            tracing::warn!(kind = value.kind_name(), "write of unregistered value type");
            return Err(CodecError::UnregisteredType {
                name: unregistered_name(value),
            });
        };
        let announced = streamer
            .streamer_to_write(value)
            .unwrap_or_else(|| streamer.clone());
        self.write_type_streamer(Some(&announced))?;
        streamer.write(self, value)
    }

    /// Encodes a one-bit unchanged flag, or the full delta.
    pub fn write_value_delta(&mut self, value: &Value, reference: &Value) -> CodecResult<()> {
        let value_streamer = self.registry.streamer_for_value(value).cloned();
        let reference_streamer = self.registry.streamer_for_value(reference).cloned();
        let unchanged = match (&value_streamer, &reference_streamer) {
            (None, None) => value == reference,
            (Some(a), Some(b)) => Arc::ptr_eq(a, b) && a.equal(value, reference),
            _ => false,
        };
        if unchanged {
            self.write_bool(false)
        } else {
            self.write_bool(true)?;
            self.write_value_raw_delta(value, reference)
        }
    }

    /// Encodes a delta with no leading flag: the streamer through the type
    /// mapping stream, then the raw delta payload.
    pub fn write_value_raw_delta(&mut self, value: &Value, reference: &Value) -> CodecResult<()> {
        if value.is_invalid() {
            return self.write_type_streamer(None);
        }
        let Some(streamer) = self.registry.streamer_for_value(value).cloned() else {
            tracing::warn!(kind = value.kind_name(), "write of unregistered value type");
            return Err(CodecError::UnregisteredType {
                name: unregistered_name(value),
            });
        };
        self.write_type_streamer(Some(&streamer))?;
        streamer.write_raw_delta(self, value, reference)
    }

    // --- objects ---

    /// Encodes an object: class through the class mapping stream, then each
    /// storable property in order.
    pub fn write_object(&mut self, object: Option<&dyn DynamicObject>) -> CodecResult<()> {
        let Some(object) = object else {
            return self.write_class(None);
        };
        let class = self.resolve_class(object)?;
        self.write_class(Some(&class))?;
        for (index, property) in class.properties().iter().enumerate() {
            property.streamer.write(self, &object.property(index))?;
        }
        Ok(())
    }

    /// Encodes an object as a property-wise delta against a reference of
    /// the same class; a reference of a different class deltas each
    /// property against the absent marker.
    pub fn write_object_raw_delta(
        &mut self,
        value: Option<&dyn DynamicObject>,
        reference: Option<&dyn DynamicObject>,
    ) -> CodecResult<()> {
        let Some(value) = value else {
            return self.write_class(None);
        };
        let class = self.resolve_class(value)?;
        self.write_class(Some(&class))?;
        let same_class = reference.is_some_and(|r| r.class_name() == value.class_name());
        for (index, property) in class.properties().iter().enumerate() {
            let reference_value = match reference {
                Some(reference) if same_class => reference.property(index),
                _ => Value::Invalid,
            };
            property
                .streamer
                .write_delta(self, &value.property(index), &reference_value)?;
        }
        Ok(())
    }

    fn resolve_class(&self, object: &dyn DynamicObject) -> CodecResult<Arc<ClassDescriptor>> {
        match self.registry.class(object.class_name()) {
            Some(class) => Ok(class.clone()),
            None => {
                tracing::warn!(class = object.class_name(), "write of unregistered class");
                Err(CodecError::UnregisteredType {
                    name: object.class_name().to_owned(),
                })
            }
        }
    }

    // --- shared objects ---

    /// Encodes a shared-object reference. Every occurrence transmits the
    /// header `(local ID, origin ID)` followed by a body: a raw object delta
    /// against the promoted reference of the same origin when one exists,
    /// else an absolute object encoding. The mapping ID in front only names
    /// the object for persistence and cleared notifications; unlike the
    /// other mapped families, a repeat never collapses to a bare ID, so
    /// state changes always reach the peer.
    pub fn write_shared(&mut self, object: Option<&SharedHandle>) -> CodecResult<()> {
        let Some(object) = object else {
            self.shared.write_null(&mut self.bits)?;
            return Ok(());
        };
        let id = match self.shared.get(&object.local_id()) {
            Some(id) => id,
            None => self.shared.assign(object.local_id()),
        };
        self.shared_live
            .insert(object.local_id(), Arc::downgrade(object));
        self.shared.write_id(&mut self.bits, id)?;

        self.write_u32(object.local_id())?;
        self.write_u32(object.origin_id())?;
        let state = object.snapshot_state();
        let reference_state = self
            .shared_refs
            .get(&object.origin_id())
            .map(|reference| reference.state.clone());
        match reference_state {
            Some(reference_state) => {
                self.write_object_raw_delta(Some(&*state), Some(&*reference_state))
            }
            None => self.write_object(Some(&*state)),
        }
    }

    // --- mapping lifecycle ---

    /// Snapshots and clears every transient mapping, rewinding the ID coders
    /// to their persistent watermarks.
    pub fn get_and_reset_write_mappings(&mut self) -> WriteMappingSnapshot {
        WriteMappingSnapshot {
            types: self.types.get_and_reset_transient(),
            classes: self.classes.get_and_reset_transient(),
            strings: self.strings.get_and_reset_transient(),
            shared: self.shared.get_and_reset_transient(),
        }
    }

    /// Promotes a snapshot into the persistent tier. For shared objects this
    /// also advances the per-origin delta reference - capturing the state
    /// the peer has now applied - and forgets superseded predecessors, so
    /// later transmissions delta against the newest promoted state.
    pub fn persist_write_mappings(&mut self, snapshot: WriteMappingSnapshot) {
        self.types.persist(snapshot.types);
        self.classes.persist(snapshot.classes);
        self.strings.persist(snapshot.strings);
        for local_id in snapshot.shared.keys() {
            let Some(object) = self.shared_live.get(local_id).and_then(Weak::upgrade) else {
                continue;
            };
            let reference = SharedReference {
                local_id: object.local_id(),
                state: object.snapshot_state(),
            };
            let previous = self.shared_refs.insert(object.origin_id(), reference);
            if let Some(previous) = previous {
                if previous.local_id != object.local_id() {
                    // The lineage moved on; the old head's ID will not be
                    // reused by the peer.
                    self.shared.remove_persistent(&previous.local_id);
                    self.shared_live.remove(&previous.local_id);
                }
            }
        }
        self.shared.persist(snapshot.shared);
    }

    /// Snapshot-and-promote in one step, for callers that treat every
    /// message as accepted.
    pub fn persist_and_reset_write_mappings(&mut self) {
        let snapshot = self.get_and_reset_write_mappings();
        self.persist_write_mappings(snapshot);
    }

    /// Purges shared objects the application has dropped and returns their
    /// mapping IDs, for relay to the peer.
    pub fn drain_cleared_shared(&mut self) -> Vec<u32> {
        let Encoder {
            shared,
            shared_refs,
            shared_live,
            ..
        } = self;
        let mut cleared = Vec::new();
        let mut dead = Vec::new();
        shared_live.retain(|local_id, weak| {
            if weak.strong_count() > 0 {
                return true;
            }
            if let Some(id) = shared.remove_persistent(local_id) {
                cleared.push(id);
            }
            dead.push(*local_id);
            false
        });
        shared_refs.retain(|_, reference| !dead.contains(&reference.local_id));
        cleared.sort_unstable();
        cleared
    }
}

fn unregistered_name(value: &Value) -> String {
    match value {
        Value::Record(record) => record.type_name.to_string(),
        other => other.kind_name().to_owned(),
    }
}
