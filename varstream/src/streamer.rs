//! Per-type read/write/equal/delta behavior.
//!
//! A [`TypeStreamer`] is the unit the registry hands out and the mapping
//! streams intern: it knows how to encode and decode values of one type,
//! how to compare them, and how to delta them against a reference. The
//! compound streamers (list, set, map, record) recurse through their
//! sub-streamers; the enum streamer packs values into exactly the bits its
//! declared range needs.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use bitbuf::bits_for_highest;

use crate::decode::MessageReader;
use crate::encode::Encoder;
use crate::error::{CodecError, CodecResult};
use crate::registry::{EnumDef, EnumKey, TypeId};
use crate::value::{map_get, map_insert, map_remove, RecordValue, Value};

/// Shared reference to a registered streamer.
pub type StreamerRef = Arc<dyn TypeStreamer>;

/// The structural kind of a type, as negotiated on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamerKind {
    Simple = 0,
    Enum = 1,
    Record = 2,
    List = 3,
    Set = 4,
    Map = 5,
}

impl StreamerKind {
    /// Returns the wire tag.
    #[must_use]
    pub const fn raw(self) -> i32 {
        self as i32
    }

    /// Decodes a wire tag.
    #[must_use]
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(Self::Simple),
            1 => Some(Self::Enum),
            2 => Some(Self::Record),
            3 => Some(Self::List),
            4 => Some(Self::Set),
            5 => Some(Self::Map),
            _ => None,
        }
    }
}

/// A named field of a record type.
#[derive(Debug, Clone)]
pub struct MetaField {
    pub name: String,
    pub streamer: StreamerRef,
}

impl MetaField {
    /// Creates a field declaration.
    #[must_use]
    pub fn new(name: impl Into<String>, streamer: StreamerRef) -> Self {
        Self {
            name: name.into(),
            streamer,
        }
    }
}

/// Read/write/equal/delta behavior for one registered type.
///
/// The delta form emits a single "changed" bit; if the bit is clear the
/// reference is reused and nothing else is transmitted. The raw delta form
/// elides the bit for callers that have already signaled change.
pub trait TypeStreamer: fmt::Debug + Send + Sync {
    /// The process-local type ID.
    fn type_id(&self) -> TypeId;

    /// The stable type name used in schema negotiation.
    fn name(&self) -> &str;

    /// The structural kind.
    fn kind(&self) -> StreamerKind {
        StreamerKind::Simple
    }

    /// The streamer to announce on the wire when writing `value`; generic
    /// values announce their wrapped descriptor.
    fn streamer_to_write(&self, _value: &Value) -> Option<StreamerRef> {
        None
    }

    /// Semantic equality for delta decisions.
    fn equal(&self, a: &Value, b: &Value) -> bool {
        a == b
    }

    /// The zero value of this type, used for fields absent remotely.
    fn default_value(&self) -> Value {
        Value::Invalid
    }

    /// Encodes `value` absolutely.
    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()>;

    /// Decodes an absolute value.
    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value>;

    /// Encodes a changed flag, then the raw delta when changed.
    fn write_delta(&self, out: &mut Encoder, value: &Value, reference: &Value) -> CodecResult<()> {
        if self.equal(value, reference) {
            out.write_bool(false)
        } else {
            out.write_bool(true)?;
            self.write_raw_delta(out, value, reference)
        }
    }

    /// Decodes a changed flag, reusing the reference when clear.
    fn read_delta(&self, input: &mut MessageReader<'_>, reference: &Value) -> CodecResult<Value> {
        if input.read_bool()? {
            self.read_raw_delta(input, reference)
        } else {
            Ok(reference.clone())
        }
    }

    /// Encodes the delta payload without the changed flag. Simple types
    /// fall back to an absolute encoding.
    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        _reference: &Value,
    ) -> CodecResult<()> {
        self.write(out, value)
    }

    /// Decodes the delta payload without the changed flag.
    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        _reference: &Value,
    ) -> CodecResult<Value> {
        self.read(input)
    }

    /// Enum bit width; 0 for non-enums.
    fn bits(&self) -> u8 {
        0
    }

    /// Enum key table; empty for non-enums.
    fn enum_keys(&self) -> &[EnumKey] {
        &[]
    }

    /// Whether this enum combines keys bitwise.
    fn is_flag(&self) -> bool {
        false
    }

    /// Translates a remote enum value through a remote-to-local map.
    fn enum_value_from_remote(&self, raw: i32, map: &HashMap<i32, i32>) -> i32 {
        let _ = raw;
        let _ = map;
        0
    }

    /// Key streamer for maps.
    fn key_streamer(&self) -> Option<&StreamerRef> {
        None
    }

    /// Element streamer for lists and sets, value streamer for maps.
    fn value_streamer(&self) -> Option<&StreamerRef> {
        None
    }

    /// Field table for records; empty otherwise.
    fn fields(&self) -> &[MetaField] {
        &[]
    }

    /// Resolves a field name to its index.
    fn field_index(&self, _name: &str) -> Option<usize> {
        None
    }
}

fn wrong_kind(streamer: &dyn TypeStreamer, value: &Value) -> CodecError {
    CodecError::WrongValueKind {
        streamer: streamer.name().to_owned(),
        found: value.kind_name(),
    }
}

/// The built-in simple kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SimpleKind {
    Bool,
    Int,
    UInt,
    Float,
    Double,
    Bytes,
    String,
    Url,
    Color,
    DateTime,
    Vec3,
    Quat,
    Regex,
    Variant,
    Script,
    SharedObject,
}

/// Streamer for one of the built-in simple kinds.
#[derive(Debug)]
pub(crate) struct SimpleStreamer {
    id: TypeId,
    name: &'static str,
    kind: SimpleKind,
}

impl SimpleStreamer {
    pub(crate) fn new(id: TypeId, name: &'static str, kind: SimpleKind) -> StreamerRef {
        Arc::new(Self { id, name, kind })
    }
}

impl TypeStreamer for SimpleStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        self.name
    }

    fn default_value(&self) -> Value {
        match self.kind {
            SimpleKind::Bool => Value::Bool(false),
            SimpleKind::Int => Value::Int(0),
            SimpleKind::UInt => Value::UInt(0),
            SimpleKind::Float => Value::Float(0.0),
            SimpleKind::Double => Value::Double(0.0),
            SimpleKind::Bytes => Value::Bytes(Vec::new()),
            SimpleKind::String => Value::String(String::new()),
            SimpleKind::Url => Value::Url(String::new()),
            SimpleKind::Color => Value::Color(0),
            SimpleKind::DateTime => Value::DateTime(0),
            SimpleKind::Vec3 => Value::Vec3([0.0; 3]),
            SimpleKind::Quat => Value::Quat([0.0; 4]),
            SimpleKind::Regex => Value::Regex(Default::default()),
            SimpleKind::Variant => Value::Invalid,
            SimpleKind::Script => Value::Script(Box::new(crate::script::ScriptValue::Invalid)),
            SimpleKind::SharedObject => Value::Shared(None),
        }
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        match (self.kind, value) {
            (SimpleKind::Bool, Value::Bool(v)) => out.write_bool(*v),
            (SimpleKind::Int, Value::Int(v)) => out.write_i32(*v),
            (SimpleKind::UInt, Value::UInt(v)) => out.write_u32(*v),
            (SimpleKind::Float, Value::Float(v)) => out.write_f32(*v),
            (SimpleKind::Double, Value::Double(v)) => out.write_f64(*v),
            (SimpleKind::Bytes, Value::Bytes(v)) => out.write_bytes(v),
            (SimpleKind::String, Value::String(v)) | (SimpleKind::Url, Value::Url(v)) => {
                out.write_string(v)
            }
            (SimpleKind::Color, Value::Color(v)) => out.write_u32(*v),
            (SimpleKind::DateTime, Value::DateTime(v)) => out.write_i64(*v),
            (SimpleKind::Vec3, Value::Vec3(v)) => out.write_vec3(v),
            (SimpleKind::Quat, Value::Quat(v)) => out.write_quat(v),
            (SimpleKind::Regex, Value::Regex(v)) => out.write_regex(v),
            (SimpleKind::Variant, v) => out.write_value(v),
            (SimpleKind::Script, Value::Script(v)) => out.write_script(v),
            (SimpleKind::SharedObject, Value::Shared(v)) => out.write_shared(v.as_ref()),
            _ => Err(wrong_kind(self, value)),
        }
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        Ok(match self.kind {
            SimpleKind::Bool => Value::Bool(input.read_bool()?),
            SimpleKind::Int => Value::Int(input.read_i32()?),
            SimpleKind::UInt => Value::UInt(input.read_u32()?),
            SimpleKind::Float => Value::Float(input.read_f32()?),
            SimpleKind::Double => Value::Double(input.read_f64()?),
            SimpleKind::Bytes => Value::Bytes(input.read_bytes()?),
            SimpleKind::String => Value::String(input.read_string()?),
            SimpleKind::Url => Value::Url(input.read_string()?),
            SimpleKind::Color => Value::Color(input.read_u32()?),
            SimpleKind::DateTime => Value::DateTime(input.read_i64()?),
            SimpleKind::Vec3 => Value::Vec3(input.read_vec3()?),
            SimpleKind::Quat => Value::Quat(input.read_quat()?),
            SimpleKind::Regex => Value::Regex(input.read_regex()?),
            SimpleKind::Variant => input.read_value()?,
            SimpleKind::Script => Value::Script(Box::new(input.read_script()?)),
            SimpleKind::SharedObject => Value::Shared(input.read_shared()?),
        })
    }

    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        match self.kind {
            SimpleKind::Variant => out.write_value_raw_delta(value, reference),
            SimpleKind::Script => match (value, reference) {
                (Value::Script(v), Value::Script(r)) => out.write_script_raw_delta(v, r),
                (Value::Script(v), _) => {
                    out.write_script_raw_delta(v, &crate::script::ScriptValue::Invalid)
                }
                _ => Err(wrong_kind(self, value)),
            },
            _ => self.write(out, value),
        }
    }

    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        match self.kind {
            SimpleKind::Variant => input.read_value_raw_delta(reference),
            SimpleKind::Script => {
                let reference = match reference {
                    Value::Script(r) => (**r).clone(),
                    _ => crate::script::ScriptValue::Invalid,
                };
                Ok(Value::Script(Box::new(
                    input.read_script_raw_delta(&reference)?,
                )))
            }
            _ => self.read(input),
        }
    }
}

/// Streamer for a declared enumeration.
#[derive(Debug)]
pub struct EnumStreamer {
    name: String,
    keys: Vec<EnumKey>,
    is_flag: bool,
    bits: u8,
}

impl EnumStreamer {
    /// Creates an enum streamer under a `Scope::Name` wire name.
    #[must_use]
    pub fn new(name: impl Into<String>, keys: Vec<EnumKey>, is_flag: bool) -> StreamerRef {
        let highest = keys.iter().map(|k| k.value.max(0)).max().unwrap_or(0);
        Arc::new(Self {
            name: name.into(),
            keys,
            is_flag,
            bits: bits_for_highest(highest as u32),
        })
    }

    /// Materializes the streamer for a class-scoped enum declaration.
    #[must_use]
    pub fn materialize(scope: &str, def: &EnumDef) -> StreamerRef {
        Self::new(format!("{scope}::{}", def.name), def.keys.clone(), def.is_flag)
    }
}

impl TypeStreamer for EnumStreamer {
    fn type_id(&self) -> TypeId {
        // Enum values travel as plain ints; the streamer is found by name.
        crate::builtin::INT
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StreamerKind {
        StreamerKind::Enum
    }

    fn default_value(&self) -> Value {
        Value::Int(0)
    }

    fn bits(&self) -> u8 {
        self.bits
    }

    fn enum_keys(&self) -> &[EnumKey] {
        &self.keys
    }

    fn is_flag(&self) -> bool {
        self.is_flag
    }

    fn enum_value_from_remote(&self, raw: i32, map: &HashMap<i32, i32>) -> i32 {
        if self.is_flag {
            let mut combined = 0;
            for (remote_bit, local_bit) in map {
                if raw & remote_bit != 0 {
                    combined |= local_bit;
                }
            }
            combined
        } else {
            map.get(&raw).copied().unwrap_or(0)
        }
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::Int(v) = value else {
            return Err(wrong_kind(self, value));
        };
        let mask = if self.bits >= 32 {
            u32::MAX
        } else {
            (1u32 << self.bits) - 1
        };
        out.write_bits(u64::from(*v as u32 & mask), self.bits)
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        Ok(Value::Int(input.read_bits(self.bits)? as i32))
    }
}

/// Streamer for an ordered collection of one element type.
#[derive(Debug)]
pub struct ListStreamer {
    id: TypeId,
    name: String,
    value: StreamerRef,
}

impl ListStreamer {
    /// Creates a list streamer.
    #[must_use]
    pub fn new(id: TypeId, name: impl Into<String>, value: StreamerRef) -> StreamerRef {
        Arc::new(Self {
            id,
            name: name.into(),
            value,
        })
    }
}

fn write_elements(out: &mut Encoder, element: &StreamerRef, items: &[Value]) -> CodecResult<()> {
    out.write_i32(items.len() as i32)?;
    for item in items {
        element.write(out, item)?;
    }
    Ok(())
}

fn read_elements(input: &mut MessageReader<'_>, element: &StreamerRef) -> CodecResult<Vec<Value>> {
    let len = input.read_collection_len()?;
    let mut items = Vec::with_capacity(len);
    for _ in 0..len {
        items.push(element.read(input)?);
    }
    Ok(items)
}

impl TypeStreamer for ListStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StreamerKind {
        StreamerKind::List
    }

    fn default_value(&self) -> Value {
        Value::List(Vec::new())
    }

    fn value_streamer(&self) -> Option<&StreamerRef> {
        Some(&self.value)
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::List(items) = value else {
            return Err(wrong_kind(self, value));
        };
        write_elements(out, &self.value, items)
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        Ok(Value::List(read_elements(input, &self.value)?))
    }

    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        let Value::List(items) = value else {
            return Err(wrong_kind(self, value));
        };
        let reference = reference.as_list();
        out.write_i32(items.len() as i32)?;
        out.write_i32(reference.len() as i32)?;
        for (i, item) in items.iter().enumerate() {
            if let Some(reference_item) = reference.get(i) {
                self.value.write_delta(out, item, reference_item)?;
            } else {
                self.value.write(out, item)?;
            }
        }
        Ok(())
    }

    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        let reference = reference.as_list();
        let len = input.read_collection_len()?;
        let reference_len = input.read_collection_len()?;
        let mut items = Vec::with_capacity(len);
        for i in 0..len {
            if i < reference_len {
                let reference_item = reference.get(i).cloned().unwrap_or(Value::Invalid);
                items.push(self.value.read_delta(input, &reference_item)?);
            } else {
                items.push(self.value.read(input)?);
            }
        }
        Ok(Value::List(items))
    }
}

/// Streamer for an unordered collection of one element type.
#[derive(Debug)]
pub struct SetStreamer {
    id: TypeId,
    name: String,
    value: StreamerRef,
}

impl SetStreamer {
    /// Creates a set streamer.
    #[must_use]
    pub fn new(id: TypeId, name: impl Into<String>, value: StreamerRef) -> StreamerRef {
        Arc::new(Self {
            id,
            name: name.into(),
            value,
        })
    }
}

impl TypeStreamer for SetStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StreamerKind {
        StreamerKind::Set
    }

    fn default_value(&self) -> Value {
        Value::Set(Vec::new())
    }

    fn value_streamer(&self) -> Option<&StreamerRef> {
        Some(&self.value)
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::Set(items) = value else {
            return Err(wrong_kind(self, value));
        };
        write_elements(out, &self.value, items)
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        Ok(Value::Set(read_elements(input, &self.value)?))
    }

    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        let Value::Set(items) = value else {
            return Err(wrong_kind(self, value));
        };
        let reference = reference.as_list();
        // Symmetric difference: each transmitted value toggles membership.
        let mut toggled: Vec<&Value> = items
            .iter()
            .filter(|item| !reference.contains(item))
            .collect();
        toggled.extend(reference.iter().filter(|item| !items.contains(item)));
        out.write_i32(toggled.len() as i32)?;
        for item in toggled {
            self.value.write(out, item)?;
        }
        Ok(())
    }

    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        let mut items = reference.as_list().to_vec();
        let toggled = input.read_collection_len()?;
        for _ in 0..toggled {
            let item = self.value.read(input)?;
            let before = items.len();
            items.retain(|existing| *existing != item);
            if items.len() == before {
                items.push(item);
            }
        }
        Ok(Value::Set(items))
    }
}

/// Streamer for a keyed map.
#[derive(Debug)]
pub struct MapStreamer {
    id: TypeId,
    name: String,
    key: StreamerRef,
    value: StreamerRef,
}

impl MapStreamer {
    /// Creates a map streamer.
    #[must_use]
    pub fn new(
        id: TypeId,
        name: impl Into<String>,
        key: StreamerRef,
        value: StreamerRef,
    ) -> StreamerRef {
        Arc::new(Self {
            id,
            name: name.into(),
            key,
            value,
        })
    }
}

impl TypeStreamer for MapStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StreamerKind {
        StreamerKind::Map
    }

    fn default_value(&self) -> Value {
        Value::Map(Vec::new())
    }

    fn key_streamer(&self) -> Option<&StreamerRef> {
        Some(&self.key)
    }

    fn value_streamer(&self) -> Option<&StreamerRef> {
        Some(&self.value)
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::Map(entries) = value else {
            return Err(wrong_kind(self, value));
        };
        out.write_i32(entries.len() as i32)?;
        for (k, v) in entries {
            self.key.write(out, k)?;
            self.value.write(out, v)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        let len = input.read_collection_len()?;
        let mut entries = Vec::with_capacity(len);
        for _ in 0..len {
            let k = self.key.read(input)?;
            let v = self.value.read(input)?;
            entries.push((k, v));
        }
        Ok(Value::Map(entries))
    }

    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        let Value::Map(entries) = value else {
            return Err(wrong_kind(self, value));
        };
        let reference = reference.as_map();

        let added: Vec<&(Value, Value)> = entries
            .iter()
            .filter(|(k, _)| map_get(reference, k).is_none())
            .collect();
        let modified: Vec<(&Value, &Value, &Value)> = entries
            .iter()
            .filter_map(|(k, v)| {
                map_get(reference, k)
                    .filter(|r| !self.value.equal(v, r))
                    .map(|r| (k, v, r))
            })
            .collect();
        let removed: Vec<&Value> = reference
            .iter()
            .filter(|(k, _)| map_get(entries, k).is_none())
            .map(|(k, _)| k)
            .collect();

        out.write_i32(added.len() as i32)?;
        for (k, v) in added {
            self.key.write(out, k)?;
            self.value.write(out, v)?;
        }
        out.write_i32(modified.len() as i32)?;
        for (k, v, r) in modified {
            self.key.write(out, k)?;
            self.value.write_delta(out, v, r)?;
        }
        out.write_i32(removed.len() as i32)?;
        for k in removed {
            self.key.write(out, k)?;
        }
        Ok(())
    }

    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        let mut entries = reference.as_map().to_vec();

        let added = input.read_collection_len()?;
        for _ in 0..added {
            let k = self.key.read(input)?;
            let v = self.value.read(input)?;
            map_insert(&mut entries, k, v);
        }
        let modified = input.read_collection_len()?;
        for _ in 0..modified {
            let k = self.key.read(input)?;
            let reference_value = map_get(&entries, &k).cloned().unwrap_or(Value::Invalid);
            let v = self.value.read_delta(input, &reference_value)?;
            map_insert(&mut entries, k, v);
        }
        let removed = input.read_collection_len()?;
        for _ in 0..removed {
            let k = self.key.read(input)?;
            map_remove(&mut entries, &k);
        }
        Ok(Value::Map(entries))
    }
}

/// Streamer for a record ("streamable") type with named fields.
#[derive(Debug)]
pub struct RecordStreamer {
    id: TypeId,
    name: Arc<str>,
    fields: Vec<MetaField>,
}

impl RecordStreamer {
    /// Creates a record streamer.
    #[must_use]
    pub fn new(id: TypeId, name: impl Into<Arc<str>>, fields: Vec<MetaField>) -> StreamerRef {
        Arc::new(Self {
            id,
            name: name.into(),
            fields,
        })
    }

    fn reference_field<'a>(&self, reference: &'a Value, index: usize) -> &'a Value {
        match reference {
            Value::Record(record)
                if record.type_name == self.name && record.fields.len() == self.fields.len() =>
            {
                &record.fields[index]
            }
            _ => &crate::value::INVALID,
        }
    }
}

impl TypeStreamer for RecordStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> StreamerKind {
        StreamerKind::Record
    }

    fn default_value(&self) -> Value {
        Value::Record(RecordValue {
            type_name: self.name.clone(),
            fields: self
                .fields
                .iter()
                .map(|f| f.streamer.default_value())
                .collect(),
        })
    }

    fn fields(&self) -> &[MetaField] {
        &self.fields
    }

    fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::Record(record) = value else {
            return Err(wrong_kind(self, value));
        };
        if record.fields.len() != self.fields.len() {
            return Err(wrong_kind(self, value));
        }
        for (field, value) in self.fields.iter().zip(&record.fields) {
            field.streamer.write(out, value)?;
        }
        Ok(())
    }

    fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            fields.push(field.streamer.read(input)?);
        }
        Ok(Value::Record(RecordValue {
            type_name: self.name.clone(),
            fields,
        }))
    }

    fn write_raw_delta(
        &self,
        out: &mut Encoder,
        value: &Value,
        reference: &Value,
    ) -> CodecResult<()> {
        let Value::Record(record) = value else {
            return Err(wrong_kind(self, value));
        };
        if record.fields.len() != self.fields.len() {
            return Err(wrong_kind(self, value));
        }
        for (i, (field, value)) in self.fields.iter().zip(&record.fields).enumerate() {
            field
                .streamer
                .write_delta(out, value, self.reference_field(reference, i))?;
        }
        Ok(())
    }

    fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        let mut fields = Vec::with_capacity(self.fields.len());
        for (i, field) in self.fields.iter().enumerate() {
            fields.push(
                field
                    .streamer
                    .read_delta(input, self.reference_field(reference, i))?,
            );
        }
        Ok(Value::Record(RecordValue {
            type_name: self.name.clone(),
            fields,
        }))
    }
}

/// Streamer for generic values; the wrapped descriptor does the work.
#[derive(Debug)]
pub(crate) struct GenericStreamer {
    id: TypeId,
}

impl GenericStreamer {
    pub(crate) fn new(id: TypeId) -> StreamerRef {
        Arc::new(Self { id })
    }
}

impl TypeStreamer for GenericStreamer {
    fn type_id(&self) -> TypeId {
        self.id
    }

    fn name(&self) -> &str {
        "generic"
    }

    fn streamer_to_write(&self, value: &Value) -> Option<StreamerRef> {
        match value {
            Value::Generic(generic) => Some(generic.streamer.clone()),
            _ => None,
        }
    }

    fn write(&self, out: &mut Encoder, value: &Value) -> CodecResult<()> {
        let Value::Generic(generic) = value else {
            return Err(wrong_kind(self, value));
        };
        generic.streamer.write(out, &generic.value)
    }

    fn read(&self, _input: &mut MessageReader<'_>) -> CodecResult<Value> {
        // Generic reads yield the placeholder; translated reads go through a
        // TypeReader instead.
        Ok(Value::Invalid)
    }
}
