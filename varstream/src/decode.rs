//! The read half of a codec session.
//!
//! A [`Decoder`] holds the state that survives across messages: read
//! mappings, the shared-object tables, and the session configuration.
//! Each message is decoded through a [`MessageReader`] borrowing the
//! decoder and the message bytes; IDs and metadata consumed mid-message
//! land in the transient mapping tier until the caller promotes them.

use std::collections::HashMap;
use std::sync::{Arc, Weak};

use bitbuf::BitReader;

use crate::error::{CodecError, CodecResult};
use crate::limits::Limits;
use crate::mapping::ReadMappings;
use crate::metadata::{GenericsMode, MetadataMode};
use crate::object::{DynamicObject, SharedHandle, SharedObject};
use crate::plan::{ObjectReader, TypeReader};
use crate::registry::{ClassDescriptor, TypeRegistry};
use crate::streamer::StreamerRef;
use crate::value::{RegexSyntax, RegexValue, Value};

/// Snapshot of the transient read mappings of one message.
#[derive(Debug, Default)]
pub struct ReadMappingSnapshot {
    pub types: HashMap<u32, Arc<TypeReader>>,
    pub classes: HashMap<u32, Arc<ObjectReader>>,
    pub strings: HashMap<u32, Arc<str>>,
    pub shared: HashMap<u32, Option<SharedHandle>>,
}

/// The read half of a codec session.
pub struct Decoder {
    pub(crate) registry: Arc<TypeRegistry>,
    pub(crate) metadata_mode: MetadataMode,
    pub(crate) generics_mode: GenericsMode,
    pub(crate) limits: Limits,
    pub(crate) types: ReadMappings<Arc<TypeReader>>,
    pub(crate) classes: ReadMappings<Arc<ObjectReader>>,
    pub(crate) strings: ReadMappings<Arc<str>>,
    pub(crate) shared: ReadMappings<Option<SharedHandle>>,
    /// Latest received object per remote origin ID; the delta reference.
    pub(crate) shared_refs: HashMap<u32, Weak<SharedObject>>,
    /// Instances still being retransmitted, by remote ID.
    pub(crate) weak_shared: HashMap<u32, Weak<SharedObject>>,
    pub(crate) class_substitutions: HashMap<String, Arc<ClassDescriptor>>,
    pub(crate) type_substitutions: HashMap<String, StreamerRef>,
    pub(crate) depth: usize,
}

impl Decoder {
    /// Creates a decoder with default limits.
    #[must_use]
    pub fn new(
        registry: Arc<TypeRegistry>,
        metadata_mode: MetadataMode,
        generics_mode: GenericsMode,
    ) -> Self {
        Self {
            registry,
            metadata_mode,
            generics_mode,
            limits: Limits::default(),
            types: ReadMappings::new(),
            classes: ReadMappings::new(),
            strings: ReadMappings::new(),
            shared: ReadMappings::new(),
            shared_refs: HashMap::new(),
            weak_shared: HashMap::new(),
            class_substitutions: HashMap::new(),
            type_substitutions: HashMap::new(),
            depth: 0,
        }
    }

    /// Overrides the decode limits.
    pub fn set_limits(&mut self, limits: Limits) {
        self.limits = limits;
    }

    /// Maps a remote class name onto a local class before registry lookup.
    pub fn add_class_substitution(
        &mut self,
        remote_name: impl Into<String>,
        class: Arc<ClassDescriptor>,
    ) {
        self.class_substitutions.insert(remote_name.into(), class);
    }

    /// Maps a remote class name onto a locally registered class by name.
    /// Returns `false` if no such class is registered.
    pub fn add_class_substitution_by_name(
        &mut self,
        remote_name: impl Into<String>,
        local_name: &str,
    ) -> bool {
        match self.registry.class(local_name).cloned() {
            Some(class) => {
                self.class_substitutions.insert(remote_name.into(), class);
                true
            }
            None => false,
        }
    }

    /// Maps a remote type name onto a local streamer before registry lookup.
    pub fn add_type_substitution(&mut self, remote_name: impl Into<String>, streamer: StreamerRef) {
        self.type_substitutions.insert(remote_name.into(), streamer);
    }

    /// Maps a remote type name onto a locally registered type by name.
    /// Returns `false` if no such type is registered.
    pub fn add_type_substitution_by_name(
        &mut self,
        remote_name: impl Into<String>,
        local_name: &str,
    ) -> bool {
        match self.registry.streamer_by_name(local_name).cloned() {
            Some(streamer) => {
                self.type_substitutions.insert(remote_name.into(), streamer);
                true
            }
            None => false,
        }
    }

    /// Starts decoding one message.
    pub fn begin<'a>(&'a mut self, data: &'a [u8]) -> MessageReader<'a> {
        self.depth = 0;
        MessageReader {
            dec: self,
            bits: BitReader::new(data),
        }
    }

    /// Snapshots and clears every transient mapping.
    pub fn get_and_reset_read_mappings(&mut self) -> ReadMappingSnapshot {
        ReadMappingSnapshot {
            types: self.types.get_and_reset_transient(),
            classes: self.classes.get_and_reset_transient(),
            strings: self.strings.get_and_reset_transient(),
            shared: self.shared.get_and_reset_transient(),
        }
    }

    /// Promotes a snapshot into the persistent tier, advancing the
    /// per-origin delta references and forgetting superseded predecessors.
    pub fn persist_read_mappings(&mut self, snapshot: ReadMappingSnapshot) {
        self.types.persist(snapshot.types);
        self.classes.persist(snapshot.classes);
        self.strings.persist(snapshot.strings);
        for object in snapshot.shared.values().flatten() {
            let previous = self
                .shared_refs
                .insert(object.remote_origin_id(), Arc::downgrade(object));
            if let Some(previous) = previous.and_then(|weak| weak.upgrade()) {
                if previous.local_id() != object.local_id() {
                    let superseded = self.shared.find_persistent_id(|stored| {
                        stored
                            .as_ref()
                            .is_some_and(|s| s.local_id() == previous.local_id())
                    });
                    if let Some(id) = superseded {
                        self.shared.take_persistent(id);
                    }
                }
            }
            // Once persisted, later occurrences arrive as mapping IDs, not
            // as fresh metadata under the remote ID.
            self.weak_shared.remove(&object.remote_id());
        }
        self.shared.persist(snapshot.shared);
    }

    /// Snapshot-and-promote in one step.
    pub fn persist_and_reset_read_mappings(&mut self) {
        let snapshot = self.get_and_reset_read_mappings();
        self.persist_read_mappings(snapshot);
    }

    /// Handles a peer's cleared-shared-object notification: drops the
    /// persistent mapping entry and the retransmission table entry.
    pub fn clear_shared(&mut self, id: u32) {
        if let Some(Some(object)) = self.shared.take_persistent(id) {
            self.weak_shared.remove(&object.remote_id());
        }
    }
}

/// Decodes one message against the long-lived decoder state.
pub struct MessageReader<'a> {
    pub(crate) dec: &'a mut Decoder,
    pub(crate) bits: BitReader<'a>,
}

impl MessageReader<'_> {
    /// Bits left in the message, including flush padding.
    #[must_use]
    pub fn bits_remaining(&self) -> usize {
        self.bits.bits_remaining()
    }

    // --- primitives ---

    pub fn read_bool(&mut self) -> CodecResult<bool> {
        Ok(self.bits.read_bit()?)
    }

    pub fn read_bits(&mut self, bits: u8) -> CodecResult<u64> {
        Ok(self.bits.read_bits(bits)?)
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        Ok(self.read_bits(32)? as u32 as i32)
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        Ok(self.read_bits(32)? as u32)
    }

    pub fn read_i64(&mut self) -> CodecResult<i64> {
        Ok(self.read_bits(64)? as i64)
    }

    pub fn read_f32(&mut self) -> CodecResult<f32> {
        Ok(f32::from_bits(self.read_bits(32)? as u32))
    }

    pub fn read_f64(&mut self) -> CodecResult<f64> {
        Ok(f64::from_bits(self.read_bits(64)?))
    }

    /// Decodes a non-negative, limit-checked element count.
    pub fn read_collection_len(&mut self) -> CodecResult<usize> {
        let length = self.read_i32()?;
        if length < 0 || length as usize > self.dec.limits.max_collection_len {
            return Err(CodecError::InvalidLength {
                length: i64::from(length),
            });
        }
        Ok(length as usize)
    }

    pub fn read_bytes(&mut self) -> CodecResult<Vec<u8>> {
        let length = self.read_i32()?;
        if length < 0 || length as usize > self.dec.limits.max_bytes_len {
            return Err(CodecError::InvalidLength {
                length: i64::from(length),
            });
        }
        let mut bytes = Vec::with_capacity(length as usize);
        for _ in 0..length {
            bytes.push(self.read_bits(8)? as u8);
        }
        Ok(bytes)
    }

    pub fn read_string(&mut self) -> CodecResult<String> {
        let length = self.read_i32()?;
        if length < 0 || length as usize > self.dec.limits.max_string_len {
            return Err(CodecError::InvalidLength {
                length: i64::from(length),
            });
        }
        let mut units = Vec::with_capacity(length as usize);
        for _ in 0..length {
            units.push(self.read_bits(16)? as u16);
        }
        Ok(String::from_utf16_lossy(&units))
    }

    pub fn read_vec3(&mut self) -> CodecResult<[f32; 3]> {
        Ok([self.read_f32()?, self.read_f32()?, self.read_f32()?])
    }

    pub fn read_quat(&mut self) -> CodecResult<[f32; 4]> {
        Ok([
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
            self.read_f32()?,
        ])
    }

    pub fn read_regex(&mut self) -> CodecResult<RegexValue> {
        let pattern = self.read_string()?;
        let case_sensitive = self.read_bits(1)? == 1;
        let syntax = RegexSyntax::from_raw(self.read_bits(3)? as u8);
        let minimal = self.read_bool()?;
        Ok(RegexValue {
            pattern,
            case_sensitive,
            syntax,
            minimal,
        })
    }

    pub(crate) fn read_digest(&mut self) -> CodecResult<crate::digest::Digest> {
        let mut digest = [0u8; crate::digest::DIGEST_LEN];
        for byte in &mut digest {
            *byte = self.read_bits(8)? as u8;
        }
        Ok(digest)
    }

    pub(crate) fn enter_nested(&mut self) -> CodecResult<()> {
        self.dec.depth += 1;
        if self.dec.depth > self.dec.limits.max_depth {
            self.dec.depth -= 1;
            return Err(CodecError::DepthLimitExceeded {
                max_depth: self.dec.limits.max_depth,
            });
        }
        Ok(())
    }

    pub(crate) fn exit_nested(&mut self) {
        self.dec.depth = self.dec.depth.saturating_sub(1);
    }

    // --- mapping streams ---

    /// Consumes a type reference: `None` for the null ID, otherwise the
    /// interned read plan, building it from metadata on first use.
    pub fn read_type_reader(&mut self) -> CodecResult<Option<Arc<TypeReader>>> {
        let id = self.dec.types.read_id(&mut self.bits)?;
        if id == 0 {
            return Ok(None);
        }
        if let Some(reader) = self.dec.types.get(id) {
            return Ok(Some(reader.clone()));
        }
        if !self.dec.types.begin_transient(id) {
            return Err(CodecError::InvalidId { id });
        }
        let reader = self.read_type_metadata()?;
        self.dec.types.complete_transient(id, reader.clone());
        Ok(Some(reader))
    }

    pub(crate) fn read_type_reader_or_null(&mut self) -> CodecResult<Arc<TypeReader>> {
        Ok(self
            .read_type_reader()?
            .unwrap_or_else(|| Arc::new(TypeReader::null())))
    }

    /// Consumes a class reference: `None` for the null ID, otherwise the
    /// interned read plan.
    pub fn read_object_reader(&mut self) -> CodecResult<Option<Arc<ObjectReader>>> {
        let id = self.dec.classes.read_id(&mut self.bits)?;
        if id == 0 {
            return Ok(None);
        }
        if let Some(reader) = self.dec.classes.get(id) {
            return Ok(Some(reader.clone()));
        }
        if !self.dec.classes.begin_transient(id) {
            return Err(CodecError::InvalidId { id });
        }
        let reader = self.read_class_metadata()?;
        self.dec.classes.complete_transient(id, reader.clone());
        Ok(Some(reader))
    }

    /// Consumes an interned name handle; `None` is the invalid-name
    /// sentinel.
    pub fn read_name(&mut self) -> CodecResult<Option<Arc<str>>> {
        let id = self.dec.strings.read_id(&mut self.bits)?;
        if id == 0 {
            return Ok(None);
        }
        if let Some(name) = self.dec.strings.get(id) {
            return Ok(Some(name.clone()));
        }
        if !self.dec.strings.begin_transient(id) {
            return Err(CodecError::InvalidId { id });
        }
        let name: Arc<str> = Arc::from(self.read_string()?);
        self.dec.strings.complete_transient(id, name.clone());
        Ok(Some(name))
    }

    // --- values ---

    /// Decodes a dynamically typed value.
    pub fn read_value(&mut self) -> CodecResult<Value> {
        self.enter_nested()?;
        let result = self.read_value_inner();
        self.exit_nested();
        result
    }

    fn read_value_inner(&mut self) -> CodecResult<Value> {
        match self.read_type_reader()? {
            None => Ok(Value::Invalid),
            Some(reader) if reader.is_null() => Ok(Value::Invalid),
            Some(reader) => reader.read(self),
        }
    }

    /// Decodes a one-bit unchanged flag, reusing the reference when clear.
    pub fn read_value_delta(&mut self, reference: &Value) -> CodecResult<Value> {
        if self.read_bool()? {
            self.read_value_raw_delta(reference)
        } else {
            Ok(reference.clone())
        }
    }

    /// Decodes a delta with no leading flag.
    pub fn read_value_raw_delta(&mut self, reference: &Value) -> CodecResult<Value> {
        self.enter_nested()?;
        let result = self.read_value_raw_delta_inner(reference);
        self.exit_nested();
        result
    }

    fn read_value_raw_delta_inner(&mut self, reference: &Value) -> CodecResult<Value> {
        match self.read_type_reader()? {
            None => Ok(Value::Invalid),
            Some(reader) if reader.is_null() => Ok(Value::Invalid),
            Some(reader) => reader.read_raw_delta(self, reference),
        }
    }

    // --- objects ---

    /// Decodes an object; `None` when the remote wrote null or the class is
    /// unknown locally.
    pub fn read_object(&mut self) -> CodecResult<Option<Box<dyn DynamicObject>>> {
        match self.read_object_reader()? {
            None => Ok(None),
            Some(reader) => reader.read(self),
        }
    }

    /// Decodes a property-wise object delta against a reference.
    pub fn read_object_raw_delta(
        &mut self,
        reference: Option<&dyn DynamicObject>,
    ) -> CodecResult<Option<Box<dyn DynamicObject>>> {
        match self.read_object_reader()? {
            None => Ok(None),
            Some(reader) => reader.read_delta(self, reference),
        }
    }

    // --- shared objects ---

    /// Decodes a shared-object reference. Every occurrence carries the
    /// header `(local ID, origin ID)` and a body; a known remote ID applies
    /// the body to the existing instance in place, a novel one builds a new
    /// instance, assigns its remote IDs, and tracks it for retransmission.
    pub fn read_shared(&mut self) -> CodecResult<Option<SharedHandle>> {
        let id = self.dec.shared.read_id(&mut self.bits)?;
        if id == 0 {
            return Ok(None);
        }
        let known = self.dec.shared.get(id).cloned();
        if known.is_none() {
            if !self.dec.shared.begin_transient(id) {
                return Err(CodecError::InvalidId { id });
            }
            // Reserve the slot before the body so self-references resolve.
            self.dec.shared.complete_transient(id, None);
        }
        let handle = self.read_shared_body(known.flatten())?;
        self.dec.shared.complete_transient(id, handle.clone());
        Ok(handle)
    }

    fn read_shared_body(&mut self, known: Option<SharedHandle>) -> CodecResult<Option<SharedHandle>> {
        let remote_id = self.read_u32()?;
        if remote_id == 0 {
            return Ok(None);
        }
        let remote_origin_id = self.read_u32()?;
        let reference = self
            .dec
            .shared_refs
            .get(&remote_origin_id)
            .and_then(Weak::upgrade);

        let existing = known
            .filter(|object| object.remote_id() == remote_id)
            .or_else(|| self.dec.weak_shared.get(&remote_id).and_then(Weak::upgrade));
        if let Some(existing) = existing {
            let Some(reader) = self.read_object_reader()? else {
                return Ok(Some(existing));
            };
            match &reference {
                Some(reference) => {
                    let reference_state = reference.snapshot_state();
                    let mut state = existing.lock();
                    reader.read_delta_into(self, Some(&*reference_state), &mut **state)?;
                }
                None => {
                    let mut state = existing.lock();
                    reader.read_into(self, &mut **state)?;
                }
            }
            return Ok(Some(existing));
        }

        let object = match &reference {
            Some(reference) => {
                let reference_state = reference.snapshot_state();
                self.read_object_raw_delta(Some(&*reference_state))?
            }
            None => self.read_object()?,
        };
        let Some(object) = object else {
            tracing::warn!(remote_id, "decoded null shared object");
            return Ok(None);
        };
        let handle = match &reference {
            Some(reference) => SharedObject::successor(reference, object),
            None => SharedObject::new(object),
        };
        handle.set_remote_ids(remote_id, remote_origin_id);
        self.dec
            .weak_shared
            .insert(remote_id, Arc::downgrade(&handle));
        Ok(Some(handle))
    }
}
