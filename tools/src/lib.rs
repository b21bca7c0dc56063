//! Demo payloads and reports for the varstream CLI.
//!
//! # Design Principles
//!
//! - **First-class tooling** - These tools are part of the product, not afterthoughts.
//! - **Human-readable output** - Make it easy to understand what the codec is doing.

use std::sync::Arc;

use anyhow::{ensure, Context, Result};
use varstream::{
    builtin, ClassDef, Decoder, DynamicObject, Encoder, EnumKey, EnumStreamer, GenericsMode,
    ListStreamer, MetaField, MetadataMode, PropertyDef, RecordStreamer, RecordValue, SharedObject,
    TypeId, TypeRegistry, TypeRegistryBuilder, Value,
};

/// A sample entity class used by the demo payload.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Beacon {
    pub label: String,
    pub level: i32,
}

impl DynamicObject for Beacon {
    fn class_name(&self) -> &str {
        "Beacon"
    }

    fn property_count(&self) -> usize {
        2
    }

    fn property(&self, index: usize) -> Value {
        match index {
            0 => Value::String(self.label.clone()),
            1 => Value::Int(self.level),
            _ => Value::Invalid,
        }
    }

    fn set_property(&mut self, index: usize, value: Value) {
        match (index, value) {
            (0, Value::String(label)) => self.label = label,
            (1, Value::Int(level)) => self.level = level,
            _ => {}
        }
    }

    fn clone_object(&self) -> Box<dyn DynamicObject> {
        Box::new(self.clone())
    }
}

fn beacon_factory() -> Box<dyn DynamicObject> {
    Box::new(Beacon::default())
}

/// Builds the demo registry: a particle record, a phase enum, an int list,
/// and the `Beacon` class.
pub fn demo_registry() -> Result<Arc<TypeRegistry>> {
    let mut builder = TypeRegistryBuilder::new();
    let int = builtin::streamer(builtin::INT).context("int streamer")?;
    let float = builtin::streamer(builtin::FLOAT).context("float streamer")?;
    let vec3 = builtin::streamer(builtin::VEC3).context("vec3 streamer")?;
    let string = builtin::streamer(builtin::STRING).context("string streamer")?;

    let phase = EnumStreamer::new(
        "Particle::Phase",
        vec![
            EnumKey::new("Forming", 0),
            EnumKey::new("Stable", 1),
            EnumKey::new("Decaying", 2),
        ],
        false,
    );
    builder.register_streamer(phase.clone());
    builder.register_streamer(ListStreamer::new(TypeId::new(100), "int-list", int.clone()));
    builder.register_streamer(RecordStreamer::new(
        TypeId::new(101),
        "particle",
        vec![
            MetaField::new("position", vec3),
            MetaField::new("energy", float),
            MetaField::new("phase", phase),
        ],
    ));
    builder.register_class(
        ClassDef::new("Beacon", Box::new(beacon_factory))
            .property(PropertyDef::new("label", string))
            .property(PropertyDef::new("level", int)),
    );
    builder.build().context("freeze registry")
}

fn particle(position: [f32; 3], energy: f32, phase: i32) -> Value {
    Value::Record(RecordValue::new(
        "particle",
        vec![
            Value::Vec3(position),
            Value::Float(energy),
            Value::Int(phase),
        ],
    ))
}

/// Per-message sizes of one demo exchange.
#[derive(Debug, Clone, Copy)]
pub struct DemoReport {
    pub mode: MetadataMode,
    /// First message: descriptors plus payload.
    pub first_message_bytes: usize,
    /// Second message after persistence: interned IDs plus payload.
    pub second_message_bytes: usize,
    /// Third message: a shared-object successor delta.
    pub delta_message_bytes: usize,
}

/// Encodes and decodes the demo payload under one metadata mode, verifying
/// every value survives, and reports the message sizes.
pub fn run_demo(mode: MetadataMode) -> Result<DemoReport> {
    let registry = demo_registry()?;
    let mut encoder = Encoder::new(registry.clone(), mode);
    let mut decoder = Decoder::new(registry, mode, GenericsMode::Normal);

    let first_value = particle([1.0, 2.0, 3.0], 9.5, 1);
    let beacon = SharedObject::new(Box::new(Beacon {
        label: "north".to_owned(),
        level: 3,
    }));

    encoder.write_value(&first_value).context("encode particle")?;
    encoder.write_shared(Some(&beacon)).context("encode beacon")?;
    let first = encoder.finish_message();
    {
        let mut reader = decoder.begin(&first);
        let decoded = reader.read_value().context("decode particle")?;
        ensure!(decoded == first_value, "particle mangled: {decoded:?}");
        let received = reader
            .read_shared()
            .context("decode beacon")?
            .context("beacon reference")?;
        ensure!(
            received.lock().property(1) == Value::Int(3),
            "beacon level mangled"
        );
    }
    encoder.persist_and_reset_write_mappings();
    decoder.persist_and_reset_read_mappings();

    let second_value = particle([1.5, 2.0, 3.0], 9.0, 2);
    encoder.write_value(&second_value).context("encode second")?;
    let second = encoder.finish_message();
    {
        let mut reader = decoder.begin(&second);
        let decoded = reader.read_value().context("decode second")?;
        ensure!(decoded == second_value, "second particle mangled");
    }
    encoder.persist_and_reset_write_mappings();
    decoder.persist_and_reset_read_mappings();

    let successor = SharedObject::successor(
        &beacon,
        Box::new(Beacon {
            label: "north".to_owned(),
            level: 4,
        }),
    );
    encoder
        .write_shared(Some(&successor))
        .context("encode successor")?;
    let delta = encoder.finish_message();
    {
        let mut reader = decoder.begin(&delta);
        let received = reader
            .read_shared()
            .context("decode successor")?
            .context("successor reference")?;
        ensure!(
            received.lock().property(1) == Value::Int(4),
            "successor level mangled"
        );
    }

    Ok(DemoReport {
        mode,
        first_message_bytes: first.len(),
        second_message_bytes: second.len(),
        delta_message_bytes: delta.len(),
    })
}

/// Renders a message as grouped binary, least significant bit first.
#[must_use]
pub fn bit_dump(bytes: &[u8], bits_per_line: usize) -> String {
    let mut out = String::new();
    let mut column = 0;
    for byte in bytes {
        for bit in 0..8 {
            out.push(if (byte >> bit) & 1 == 1 { '1' } else { '0' });
            column += 1;
            if column == bits_per_line {
                out.push('\n');
                column = 0;
            } else if column % 8 == 0 {
                out.push(' ');
            }
        }
    }
    if column != 0 {
        out.push('\n');
    }
    out
}
