//! Schema negotiation: emitting and reconciling type/class metadata.
//!
//! A writer describes each novel type or class with FULL, HASH, or NO
//! side-metadata. The reader compares that metadata against its own
//! registry and builds a read plan: the fast path when everything matches
//! exactly, a translating plan otherwise. Under NO metadata both sides must
//! agree on every schema; nothing can be reconciled.

use std::collections::HashMap;
use std::sync::Arc;

use bitbuf::bits_for_highest;

use crate::decode::MessageReader;
use crate::digest;
use crate::encode::Encoder;
use crate::error::{CodecError, CodecResult};
use crate::plan::{FieldReader, ObjectReader, PropertyReader, TypeReader};
use crate::registry::{ClassDescriptor, EnumKey};
use crate::streamer::{StreamerKind, StreamerRef};

/// How much schema metadata a session transmits alongside names.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataMode {
    /// Names only; both sides are assumed to agree on every schema.
    None,
    /// Names plus a 128-bit digest of the property/field and enum tables.
    Hash,
    /// Names plus the full property/field and enum tables.
    Full,
}

/// Whether the reader maps remote types onto local descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericsMode {
    /// Map onto local descriptors where possible.
    Normal,
    /// Never map compound types locally; decode structurally.
    AllGeneric,
}

impl Encoder {
    /// Emits the self-describing metadata of a type streamer: its name,
    /// and in FULL/HASH modes its kind tag and kind-specific tables.
    pub(crate) fn write_type_metadata(&mut self, streamer: &StreamerRef) -> CodecResult<()> {
        self.write_bytes(streamer.name().as_bytes())?;
        if self.metadata_mode == MetadataMode::None {
            return Ok(());
        }
        let kind = streamer.kind();
        self.write_i32(kind.raw())?;
        match kind {
            StreamerKind::Simple => Ok(()),
            StreamerKind::Enum => {
                if self.metadata_mode == MetadataMode::Full {
                    self.write_i32(streamer.enum_keys().len() as i32)?;
                    for key in streamer.enum_keys() {
                        self.write_bytes(key.name.as_bytes())?;
                        self.write_i32(key.value)?;
                    }
                } else {
                    self.write_i32(i32::from(streamer.bits()))?;
                    self.write_digest(&digest::enum_digest(streamer.enum_keys()))?;
                }
                Ok(())
            }
            StreamerKind::List | StreamerKind::Set => {
                self.write_type_streamer(streamer.value_streamer())
            }
            StreamerKind::Map => {
                self.write_type_streamer(streamer.key_streamer())?;
                self.write_type_streamer(streamer.value_streamer())
            }
            StreamerKind::Record => {
                let fields = streamer.fields();
                self.write_i32(fields.len() as i32)?;
                if fields.is_empty() {
                    return Ok(());
                }
                for field in fields {
                    self.write_type_streamer(Some(&field.streamer))?;
                    if self.metadata_mode == MetadataMode::Full {
                        self.write_bytes(field.name.as_bytes())?;
                    }
                }
                if self.metadata_mode == MetadataMode::Hash {
                    self.write_digest(&digest::name_digest(
                        fields.iter().map(|f| f.name.as_str()),
                    ))?;
                }
                Ok(())
            }
        }
    }

    /// Emits the self-describing metadata of a class descriptor: its name,
    /// and in FULL/HASH modes its storable-property table.
    pub(crate) fn write_class_metadata(&mut self, class: &Arc<ClassDescriptor>) -> CodecResult<()> {
        self.write_bytes(class.name().as_bytes())?;
        if self.metadata_mode == MetadataMode::None {
            return Ok(());
        }
        let properties = class.properties();
        self.write_i32(properties.len() as i32)?;
        for property in properties {
            self.write_type_streamer(Some(&property.streamer))?;
            if self.metadata_mode == MetadataMode::Full {
                self.write_bytes(property.name.as_bytes())?;
            }
        }
        if self.metadata_mode == MetadataMode::Hash {
            self.write_digest(&digest::name_digest(
                properties.iter().map(|p| p.name.as_str()),
            ))?;
        }
        Ok(())
    }
}

impl MessageReader<'_> {
    fn read_name_bytes(&mut self) -> CodecResult<String> {
        let bytes = self.read_bytes()?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }

    /// Consumes class metadata and reconciles it against the local
    /// registry, producing a read plan.
    pub(crate) fn read_class_metadata(&mut self) -> CodecResult<Arc<ObjectReader>> {
        self.enter_nested()?;
        let result = self.read_class_metadata_inner();
        self.exit_nested();
        result
    }

    fn read_class_metadata_inner(&mut self) -> CodecResult<Arc<ObjectReader>> {
        let name = self.read_name_bytes()?;
        if name.is_empty() {
            return Ok(Arc::new(ObjectReader::named_only(Arc::from(""))));
        }
        let name: Arc<str> = Arc::from(name);
        let class = self
            .dec
            .class_substitutions
            .get(name.as_ref())
            .cloned()
            .or_else(|| self.dec.registry.class(name.as_ref()).cloned());
        if class.is_none() {
            tracing::warn!(class = name.as_ref(), "unknown class name");
        }
        if self.dec.metadata_mode == MetadataMode::None {
            return Ok(Arc::new(match class {
                Some(class) => ObjectReader::exact(class),
                None => ObjectReader::named_only(name),
            }));
        }

        let count = self.read_collection_len()?;
        let mut properties = Vec::with_capacity(count);
        for _ in 0..count {
            let reader = self.read_type_reader_or_null()?;
            let index = if self.dec.metadata_mode == MetadataMode::Full {
                let property_name = self.read_name_bytes()?;
                class
                    .as_ref()
                    .and_then(|class| class.property_index(&property_name))
            } else {
                None
            };
            properties.push(PropertyReader::new(reader, index));
        }

        if self.dec.metadata_mode == MetadataMode::Hash {
            let mut matches = false;
            let mut local_digest = None;
            if let Some(class) = &class {
                let local = class.properties();
                if local.len() == properties.len() {
                    matches = properties
                        .iter()
                        .zip(local)
                        .all(|(property, local)| property_matches(property, &local.streamer));
                }
                local_digest = Some(digest::name_digest(
                    local.iter().map(|p| p.name.as_str()).collect::<Vec<_>>(),
                ));
            }
            let remote_digest = self.read_digest()?;
            if let (Some(class), Some(local_digest)) = (&class, local_digest) {
                if matches && local_digest == remote_digest {
                    return Ok(Arc::new(ObjectReader::exact(class.clone())));
                }
            }
        }
        Ok(Arc::new(ObjectReader::translating(name, class, properties)))
    }

    /// Consumes type metadata and reconciles it against the local registry,
    /// producing a read plan.
    pub(crate) fn read_type_metadata(&mut self) -> CodecResult<Arc<TypeReader>> {
        self.enter_nested()?;
        let result = self.read_type_metadata_inner();
        self.exit_nested();
        result
    }

    fn read_type_metadata_inner(&mut self) -> CodecResult<Arc<TypeReader>> {
        let name = self.read_name_bytes()?;
        if name.is_empty() {
            return Ok(Arc::new(TypeReader::null()));
        }
        let name: Arc<str> = Arc::from(name);
        let mut streamer = self
            .dec
            .type_substitutions
            .get(name.as_ref())
            .cloned()
            .or_else(|| self.dec.registry.streamer_by_name(name.as_ref()).cloned());

        if self.dec.metadata_mode == MetadataMode::None {
            if streamer.is_none() {
                tracing::warn!(type_name = name.as_ref(), "unknown type name");
            }
            return Ok(Arc::new(TypeReader::exact(name, streamer)));
        }

        let tag = self.read_i32()?;
        let kind = StreamerKind::from_raw(tag).ok_or(CodecError::InvalidKindTag { tag })?;
        if kind == StreamerKind::Simple {
            if streamer.is_none() {
                tracing::warn!(type_name = name.as_ref(), "unknown type name");
            }
            return Ok(Arc::new(TypeReader::exact(name, streamer)));
        }
        if self.dec.generics_mode == GenericsMode::AllGeneric {
            streamer = None;
        }

        let reader = match kind {
            StreamerKind::Simple => unreachable!("handled above"),
            StreamerKind::Enum => self.read_enum_metadata(name, streamer)?,
            StreamerKind::List | StreamerKind::Set => {
                let value = self.read_type_reader_or_null()?;
                let matches = streamer.as_ref().is_some_and(|local| {
                    local.kind() == kind
                        && local
                            .value_streamer()
                            .is_some_and(|sub| value.matches_exactly(sub))
                });
                if matches {
                    TypeReader::exact(name, streamer)
                } else if kind == StreamerKind::List {
                    TypeReader::list(name, streamer, value)
                } else {
                    TypeReader::set(name, streamer, value)
                }
            }
            StreamerKind::Map => {
                let key = self.read_type_reader_or_null()?;
                let value = self.read_type_reader_or_null()?;
                let matches = streamer.as_ref().is_some_and(|local| {
                    local.kind() == StreamerKind::Map
                        && local
                            .key_streamer()
                            .is_some_and(|sub| key.matches_exactly(sub))
                        && local
                            .value_streamer()
                            .is_some_and(|sub| value.matches_exactly(sub))
                });
                if matches {
                    TypeReader::exact(name, streamer)
                } else {
                    TypeReader::map(name, streamer, key, value)
                }
            }
            StreamerKind::Record => self.read_record_metadata(name, streamer)?,
        };
        Ok(Arc::new(reader))
    }

    fn read_enum_metadata(
        &mut self,
        name: Arc<str>,
        streamer: Option<StreamerRef>,
    ) -> CodecResult<TypeReader> {
        let local_keys: Vec<EnumKey> = streamer
            .as_ref()
            .filter(|local| local.kind() == StreamerKind::Enum)
            .map(|local| local.enum_keys().to_vec())
            .unwrap_or_default();

        if self.dec.metadata_mode == MetadataMode::Full {
            let count = self.read_collection_len()?;
            let mut map = HashMap::new();
            let mut matches = count == local_keys.len();
            let mut highest = 0i32;
            for _ in 0..count {
                let key_name = self.read_name_bytes()?;
                let value = self.read_i32()?;
                highest = highest.max(value);
                let local_value = local_keys
                    .iter()
                    .find(|key| key.name == key_name)
                    .map(|key| key.value);
                if let Some(local_value) = local_value {
                    map.insert(value, local_value);
                }
                matches &= local_value == Some(value);
            }
            if matches {
                Ok(TypeReader::exact(name, streamer))
            } else {
                Ok(TypeReader::enum_remap(
                    name,
                    streamer,
                    bits_for_highest(highest.max(0) as u32),
                    map,
                ))
            }
        } else {
            let bits = self.read_i32()?;
            if !(0..=64).contains(&bits) {
                return Err(CodecError::InvalidLength {
                    length: i64::from(bits),
                });
            }
            let local_digest = digest::enum_digest(&local_keys);
            let remote_digest = self.read_digest()?;
            if local_digest == remote_digest {
                Ok(TypeReader::exact(name, streamer))
            } else {
                // Bit width keeps the stream aligned; with no key table the
                // values decode to 0 locally.
                Ok(TypeReader::enum_remap(
                    name,
                    streamer,
                    bits as u8,
                    HashMap::new(),
                ))
            }
        }
    }

    fn read_record_metadata(
        &mut self,
        name: Arc<str>,
        streamer: Option<StreamerRef>,
    ) -> CodecResult<TypeReader> {
        let count = self.read_collection_len()?;
        if count == 0 {
            // Empty records carry no digest in any mode.
            let exact = streamer
                .as_ref()
                .is_some_and(|local| local.fields().is_empty());
            return Ok(if exact {
                TypeReader::exact(name, streamer)
            } else {
                TypeReader::record(name, streamer, Vec::new())
            });
        }

        let mut fields = Vec::with_capacity(count);
        for _ in 0..count {
            let reader = self.read_type_reader_or_null()?;
            let index = if self.dec.metadata_mode == MetadataMode::Full {
                let field_name = self.read_name_bytes()?;
                streamer
                    .as_ref()
                    .and_then(|local| local.field_index(&field_name))
            } else {
                None
            };
            fields.push(FieldReader::new(reader, index));
        }

        if self.dec.metadata_mode == MetadataMode::Hash {
            let mut matches = false;
            let mut local_digest = None;
            if let Some(local) = &streamer {
                let local_fields = local.fields();
                if local_fields.len() == count {
                    matches = fields
                        .iter()
                        .zip(local_fields)
                        .all(|(field, local_field)| field_matches(field, &local_field.streamer));
                }
                local_digest = Some(digest::name_digest(
                    local_fields
                        .iter()
                        .map(|f| f.name.as_str())
                        .collect::<Vec<_>>(),
                ));
            }
            let remote_digest = self.read_digest()?;
            if let (Some(local), Some(local_digest)) = (&streamer, local_digest) {
                if matches && local_digest == remote_digest {
                    return Ok(TypeReader::exact(name, Some(local.clone())));
                }
            }
        } else if let Some(local) = &streamer {
            // Same fields, same order: the default streamer is equivalent
            // and faster.
            let local_fields = local.fields();
            if local_fields.len() == count {
                let exact = fields.iter().enumerate().all(|(i, field)| {
                    field.index() == Some(i)
                        && field_matches(field, &local_fields[i].streamer)
                });
                if exact {
                    return Ok(TypeReader::exact(name, streamer));
                }
            }
        }
        Ok(TypeReader::record(name, streamer, fields))
    }
}

fn property_matches(property: &PropertyReader, streamer: &StreamerRef) -> bool {
    property.reader().matches_exactly(streamer)
}

fn field_matches(field: &FieldReader, streamer: &StreamerRef) -> bool {
    field.reader().matches_exactly(streamer)
}
