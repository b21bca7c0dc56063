//! Prebuilt read plans produced by schema negotiation.
//!
//! A [`TypeReader`] either delegates straight to a local streamer (exact
//! match) or drives a translating slow path built from the remote metadata:
//! remapping enum values, routing record fields to local indices (or
//! dropping them), and recursing through collection sub-readers. Because the
//! remote metadata fully describes compound payloads, a translating reader
//! always consumes exactly the transmitted bits even when the data has
//! nowhere to go locally.

use std::collections::HashMap;
use std::sync::Arc;

use crate::decode::MessageReader;
use crate::error::{CodecError, CodecResult};
use crate::object::DynamicObject;
use crate::registry::ClassDescriptor;
use crate::streamer::StreamerRef;
use crate::value::{map_get, map_insert, map_remove, RecordValue, Value, INVALID};

/// One remote record field: its reader and the local field index, if any.
#[derive(Debug, Clone)]
pub struct FieldReader {
    pub(crate) reader: Arc<TypeReader>,
    /// `None` drops the decoded value.
    pub(crate) index: Option<usize>,
}

impl FieldReader {
    /// Creates a field reader.
    #[must_use]
    pub fn new(reader: Arc<TypeReader>, index: Option<usize>) -> Self {
        Self { reader, index }
    }

    /// The field's type reader.
    #[must_use]
    pub fn reader(&self) -> &Arc<TypeReader> {
        &self.reader
    }

    /// The local field index, if mapped.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

#[derive(Debug)]
enum ReaderVariant {
    Exact,
    Enum {
        bits: u8,
        map: HashMap<i32, i32>,
    },
    Record {
        fields: Vec<FieldReader>,
    },
    List {
        value: Arc<TypeReader>,
    },
    Set {
        value: Arc<TypeReader>,
    },
    Map {
        key: Arc<TypeReader>,
        value: Arc<TypeReader>,
    },
}

/// A read plan for one remote type.
#[derive(Debug)]
pub struct TypeReader {
    type_name: Arc<str>,
    streamer: Option<StreamerRef>,
    variant: ReaderVariant,
}

impl TypeReader {
    /// The null plan, produced for an empty remote type name.
    #[must_use]
    pub fn null() -> Self {
        Self::exact(Arc::from(""), None)
    }

    /// An exact-match plan delegating to the local streamer.
    #[must_use]
    pub fn exact(type_name: Arc<str>, streamer: Option<StreamerRef>) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::Exact,
        }
    }

    /// A translating enum plan: remote bit width plus a remote-to-local
    /// value map.
    #[must_use]
    pub fn enum_remap(
        type_name: Arc<str>,
        streamer: Option<StreamerRef>,
        bits: u8,
        map: HashMap<i32, i32>,
    ) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::Enum { bits, map },
        }
    }

    /// A translating record plan.
    #[must_use]
    pub fn record(
        type_name: Arc<str>,
        streamer: Option<StreamerRef>,
        fields: Vec<FieldReader>,
    ) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::Record { fields },
        }
    }

    /// A translating list plan.
    #[must_use]
    pub fn list(type_name: Arc<str>, streamer: Option<StreamerRef>, value: Arc<TypeReader>) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::List { value },
        }
    }

    /// A translating set plan.
    #[must_use]
    pub fn set(type_name: Arc<str>, streamer: Option<StreamerRef>, value: Arc<TypeReader>) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::Set { value },
        }
    }

    /// A translating map plan.
    #[must_use]
    pub fn map(
        type_name: Arc<str>,
        streamer: Option<StreamerRef>,
        key: Arc<TypeReader>,
        value: Arc<TypeReader>,
    ) -> Self {
        Self {
            type_name,
            streamer,
            variant: ReaderVariant::Map { key, value },
        }
    }

    /// The remote type name; empty for the null plan.
    #[must_use]
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// `true` for the null plan.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.type_name.is_empty()
    }

    /// The resolved local streamer, if any.
    #[must_use]
    pub fn streamer(&self) -> Option<&StreamerRef> {
        self.streamer.as_ref()
    }

    /// `true` when this plan is an exact match for the given streamer.
    #[must_use]
    pub fn matches_exactly(&self, streamer: &StreamerRef) -> bool {
        matches!(self.variant, ReaderVariant::Exact)
            && self
                .streamer
                .as_ref()
                .is_some_and(|own| Arc::ptr_eq(own, streamer))
    }

    /// `true` when this plan delegates to the local streamer.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        matches!(self.variant, ReaderVariant::Exact)
    }

    fn unknown(&self) -> CodecError {
        CodecError::UnknownType {
            name: self.type_name.to_string(),
        }
    }

    /// Decodes an absolute value.
    pub fn read(&self, input: &mut MessageReader<'_>) -> CodecResult<Value> {
        match &self.variant {
            ReaderVariant::Exact => match &self.streamer {
                Some(streamer) => streamer.read(input),
                None => Err(self.unknown()),
            },
            ReaderVariant::Enum { bits, map } => {
                let raw = input.read_bits(*bits)? as i32;
                Ok(Value::Int(match &self.streamer {
                    Some(streamer) => streamer.enum_value_from_remote(raw, map),
                    None => raw,
                }))
            }
            ReaderVariant::Record { fields } => match &self.streamer {
                Some(streamer) => {
                    let mut value = streamer.default_value();
                    for field in fields {
                        let decoded = field.reader.read(input)?;
                        store_field(&mut value, field.index, decoded);
                    }
                    Ok(value)
                }
                None => {
                    let mut decoded = Vec::with_capacity(fields.len());
                    for field in fields {
                        decoded.push(field.reader.read(input)?);
                    }
                    Ok(Value::Record(RecordValue {
                        type_name: self.type_name.clone(),
                        fields: decoded,
                    }))
                }
            },
            ReaderVariant::List { value } => Ok(Value::List(self.read_items(input, value)?)),
            ReaderVariant::Set { value } => Ok(Value::Set(self.read_items(input, value)?)),
            ReaderVariant::Map { key, value } => {
                let len = input.read_collection_len()?;
                let mut entries = Vec::with_capacity(len);
                for _ in 0..len {
                    let k = key.read(input)?;
                    let v = value.read(input)?;
                    entries.push((k, v));
                }
                Ok(Value::Map(entries))
            }
        }
    }

    fn read_items(
        &self,
        input: &mut MessageReader<'_>,
        value: &Arc<TypeReader>,
    ) -> CodecResult<Vec<Value>> {
        let len = input.read_collection_len()?;
        let mut items = Vec::with_capacity(len);
        for _ in 0..len {
            items.push(value.read(input)?);
        }
        Ok(items)
    }

    /// Decodes a changed flag, reusing the reference when clear.
    pub fn read_delta(&self, input: &mut MessageReader<'_>, reference: &Value) -> CodecResult<Value> {
        if let ReaderVariant::Exact = self.variant {
            return match &self.streamer {
                Some(streamer) => streamer.read_delta(input, reference),
                None => Err(self.unknown()),
            };
        }
        if input.read_bool()? {
            self.read_raw_delta(input, reference)
        } else {
            Ok(reference.clone())
        }
    }

    /// Decodes the delta payload without the changed flag.
    pub fn read_raw_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
    ) -> CodecResult<Value> {
        match &self.variant {
            ReaderVariant::Exact => match &self.streamer {
                Some(streamer) => streamer.read_raw_delta(input, reference),
                None => Err(self.unknown()),
            },
            ReaderVariant::Enum { bits, map } => {
                let raw = input.read_bits(*bits)? as i32;
                Ok(Value::Int(match &self.streamer {
                    Some(streamer) => streamer.enum_value_from_remote(raw, map),
                    None => raw,
                }))
            }
            ReaderVariant::Record { fields } => self.read_record_delta(input, reference, fields),
            ReaderVariant::List { value } => {
                let reference_items = reference.as_list();
                let mut items = reference_items.to_vec();
                let len = input.read_collection_len()?;
                let reference_len = input.read_collection_len()?;
                items.truncate(len);
                for i in 0..len {
                    if i < reference_len {
                        let reference_item =
                            reference_items.get(i).cloned().unwrap_or(Value::Invalid);
                        let decoded = value.read_delta(input, &reference_item)?;
                        if i < items.len() {
                            items[i] = decoded;
                        } else {
                            items.push(decoded);
                        }
                    } else {
                        items.push(value.read(input)?);
                    }
                }
                Ok(Value::List(items))
            }
            ReaderVariant::Set { value } => {
                let mut items = reference.as_list().to_vec();
                let toggled = input.read_collection_len()?;
                for _ in 0..toggled {
                    let item = value.read(input)?;
                    let before = items.len();
                    items.retain(|existing| *existing != item);
                    if items.len() == before {
                        items.push(item);
                    }
                }
                Ok(Value::Set(items))
            }
            ReaderVariant::Map { key, value } => {
                let mut entries = reference.as_map().to_vec();
                let added = input.read_collection_len()?;
                for _ in 0..added {
                    let k = key.read(input)?;
                    let v = value.read(input)?;
                    map_insert(&mut entries, k, v);
                }
                let modified = input.read_collection_len()?;
                for _ in 0..modified {
                    let k = key.read(input)?;
                    let reference_value = map_get(&entries, &k).cloned().unwrap_or(Value::Invalid);
                    let v = value.read_delta(input, &reference_value)?;
                    map_insert(&mut entries, k, v);
                }
                let removed = input.read_collection_len()?;
                for _ in 0..removed {
                    let k = key.read(input)?;
                    map_remove(&mut entries, &k);
                }
                Ok(Value::Map(entries))
            }
        }
    }

    fn read_record_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: &Value,
        fields: &[FieldReader],
    ) -> CodecResult<Value> {
        if let Some(streamer) = &self.streamer {
            let mut value = match reference {
                Value::Record(_) => reference.clone(),
                _ => streamer.default_value(),
            };
            for field in fields {
                let reference_field = load_field(&value, field.index);
                let decoded = field.reader.read_delta(input, &reference_field)?;
                store_field(&mut value, field.index, decoded);
            }
            Ok(value)
        } else {
            let reference_fields: &[Value] = match reference {
                Value::Record(record) if record.type_name == self.type_name => &record.fields,
                _ => &[],
            };
            let mut decoded = Vec::with_capacity(fields.len());
            for (i, field) in fields.iter().enumerate() {
                let reference_field = reference_fields.get(i).unwrap_or(&INVALID);
                decoded.push(field.reader.read_delta(input, reference_field)?);
            }
            Ok(Value::Record(RecordValue {
                type_name: self.type_name.clone(),
                fields: decoded,
            }))
        }
    }
}

fn load_field(value: &Value, index: Option<usize>) -> Value {
    match (value, index) {
        (Value::Record(record), Some(index)) => {
            record.fields.get(index).cloned().unwrap_or(Value::Invalid)
        }
        _ => Value::Invalid,
    }
}

fn store_field(value: &mut Value, index: Option<usize>, decoded: Value) {
    if let (Value::Record(record), Some(index)) = (value, index) {
        if index < record.fields.len() {
            record.fields[index] = decoded;
        }
    }
}

/// One remote object property: its reader and the local property index.
#[derive(Debug, Clone)]
pub struct PropertyReader {
    pub(crate) reader: Arc<TypeReader>,
    pub(crate) index: Option<usize>,
}

impl PropertyReader {
    /// Creates a property reader.
    #[must_use]
    pub fn new(reader: Arc<TypeReader>, index: Option<usize>) -> Self {
        Self { reader, index }
    }

    /// The property's type reader.
    #[must_use]
    pub fn reader(&self) -> &Arc<TypeReader> {
        &self.reader
    }

    /// The local property index, if mapped.
    #[must_use]
    pub fn index(&self) -> Option<usize> {
        self.index
    }
}

/// A read plan for one remote class.
#[derive(Debug)]
pub struct ObjectReader {
    class_name: Arc<str>,
    class: Option<Arc<ClassDescriptor>>,
    properties: Vec<PropertyReader>,
}

impl ObjectReader {
    /// An exact-match plan over a local class: every property decodes with
    /// its registered streamer straight into its own slot.
    #[must_use]
    pub fn exact(class: Arc<ClassDescriptor>) -> Self {
        let properties = class
            .properties()
            .iter()
            .enumerate()
            .map(|(i, property)| {
                PropertyReader::new(
                    Arc::new(TypeReader::exact(
                        Arc::from(property.streamer.name()),
                        Some(property.streamer.clone()),
                    )),
                    Some(i),
                )
            })
            .collect();
        Self {
            class_name: Arc::from(class.name()),
            class: Some(class),
            properties,
        }
    }

    /// A plan for a class unknown locally under name-only metadata: nothing
    /// can be decoded.
    #[must_use]
    pub fn named_only(class_name: Arc<str>) -> Self {
        Self {
            class_name,
            class: None,
            properties: Vec::new(),
        }
    }

    /// A translating plan built from remote metadata.
    #[must_use]
    pub fn translating(
        class_name: Arc<str>,
        class: Option<Arc<ClassDescriptor>>,
        properties: Vec<PropertyReader>,
    ) -> Self {
        Self {
            class_name,
            class,
            properties,
        }
    }

    /// The remote class name.
    #[must_use]
    pub fn class_name(&self) -> &str {
        &self.class_name
    }

    /// The resolved local class, if any.
    #[must_use]
    pub fn class(&self) -> Option<&Arc<ClassDescriptor>> {
        self.class.as_ref()
    }

    /// Instantiates and decodes a new object. Yields `None` when the class
    /// is unknown locally.
    pub fn read(
        &self,
        input: &mut MessageReader<'_>,
    ) -> CodecResult<Option<Box<dyn DynamicObject>>> {
        let mut object = self.class.as_ref().map(|class| class.instantiate());
        for property in &self.properties {
            let value = property.reader.read(input)?;
            if let (Some(object), Some(index)) = (object.as_deref_mut(), property.index) {
                object.set_property(index, value);
            }
        }
        Ok(object)
    }

    /// Decodes into an existing instance.
    pub fn read_into(
        &self,
        input: &mut MessageReader<'_>,
        target: &mut dyn DynamicObject,
    ) -> CodecResult<()> {
        for property in &self.properties {
            let value = property.reader.read(input)?;
            if let Some(index) = property.index {
                target.set_property(index, value);
            }
        }
        Ok(())
    }

    /// Instantiates and decodes a new object as a property-wise delta
    /// against a reference.
    pub fn read_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: Option<&dyn DynamicObject>,
    ) -> CodecResult<Option<Box<dyn DynamicObject>>> {
        let mut object = self.class.as_ref().map(|class| class.instantiate());
        for property in &self.properties {
            let value = self.read_property_delta(input, reference, property)?;
            if let (Some(object), Some(index)) = (object.as_deref_mut(), property.index) {
                object.set_property(index, value);
            }
        }
        Ok(object)
    }

    /// Decodes a property-wise delta into an existing instance.
    pub fn read_delta_into(
        &self,
        input: &mut MessageReader<'_>,
        reference: Option<&dyn DynamicObject>,
        target: &mut dyn DynamicObject,
    ) -> CodecResult<()> {
        for property in &self.properties {
            let value = self.read_property_delta(input, reference, property)?;
            if let Some(index) = property.index {
                target.set_property(index, value);
            }
        }
        Ok(())
    }

    fn read_property_delta(
        &self,
        input: &mut MessageReader<'_>,
        reference: Option<&dyn DynamicObject>,
        property: &PropertyReader,
    ) -> CodecResult<Value> {
        let reference_value = match (reference, property.index) {
            (Some(reference), Some(index)) => reference.property(index),
            _ => Value::Invalid,
        };
        property.reader.read_delta(input, &reference_value)
    }
}
