use std::sync::Arc;

use varstream::{
    builtin, ClassDef, Decoder, DynamicObject, Encoder, GenericsMode, MetadataMode, PropertyDef,
    RegexSyntax, RegexValue, ScriptValue, TypeRegistry, TypeRegistryBuilder, Value,
};

#[derive(Debug, Clone, PartialEq, Default)]
struct Marker {
    tag: i32,
}

impl DynamicObject for Marker {
    fn class_name(&self) -> &str {
        "Marker"
    }

    fn property_count(&self) -> usize {
        1
    }

    fn property(&self, index: usize) -> Value {
        match index {
            0 => Value::Int(self.tag),
            _ => Value::Invalid,
        }
    }

    fn set_property(&mut self, index: usize, value: Value) {
        if let (0, Value::Int(tag)) = (index, value) {
            self.tag = tag;
        }
    }

    fn clone_object(&self) -> Box<dyn DynamicObject> {
        Box::new(self.clone())
    }
}

fn marker_factory() -> Box<dyn DynamicObject> {
    Box::new(Marker::default())
}

fn registry() -> Arc<TypeRegistry> {
    let mut builder = TypeRegistryBuilder::new();
    let int = builtin::streamer(builtin::INT).unwrap();
    builder.register_class(
        ClassDef::new("Marker", Box::new(marker_factory)).property(PropertyDef::new("tag", int)),
    );
    builder.build().unwrap()
}

fn roundtrip(value: &ScriptValue) -> ScriptValue {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    encoder.write_script(value).unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    reader.read_script().unwrap()
}

fn delta_roundtrip(value: &ScriptValue, reference: &ScriptValue) -> ScriptValue {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    encoder.write_script_raw_delta(value, reference).unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    reader.read_script_raw_delta(reference).unwrap()
}

fn props(entries: &[(&str, ScriptValue)]) -> ScriptValue {
    ScriptValue::Object(
        entries
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect(),
    )
}

#[test]
fn script_primitives_roundtrip() {
    let values = [
        ScriptValue::Invalid,
        ScriptValue::Undefined,
        ScriptValue::Null,
        ScriptValue::Bool(true),
        ScriptValue::Number(-0.125),
        ScriptValue::String("hello".to_owned()),
        ScriptValue::Date(1_600_000_000_000),
        ScriptValue::RegExp(RegexValue {
            pattern: "a+b?".to_owned(),
            case_sensitive: false,
            syntax: RegexSyntax::Full,
            minimal: false,
        }),
    ];
    for value in &values {
        assert_eq!(&roundtrip(value), value, "{value:?}");
    }
}

#[test]
fn script_variant_wraps_dynamic_values() {
    let value = ScriptValue::Variant(Box::new(Value::List(vec![
        Value::Int(1),
        Value::String("two".to_owned()),
    ])));
    assert_eq!(roundtrip(&value), value);
}

#[test]
fn script_arrays_and_objects_roundtrip() {
    let value = ScriptValue::Array(vec![
        ScriptValue::Number(1.0),
        props(&[
            ("name", ScriptValue::String("inner".to_owned())),
            ("flag", ScriptValue::Bool(false)),
        ]),
        ScriptValue::Null,
    ]);
    assert_eq!(roundtrip(&value), value);
}

#[test]
fn script_native_object_roundtrips() {
    let value = ScriptValue::NativeObject(Some(Box::new(Marker { tag: 12 })));
    assert_eq!(roundtrip(&value), value);
    assert_eq!(
        roundtrip(&ScriptValue::NativeObject(None)),
        ScriptValue::NativeObject(None)
    );
}

#[test]
fn script_class_ref_roundtrips() {
    let registry = registry();
    let class = registry.class("Marker").unwrap().clone();
    let value = ScriptValue::ClassRef(Some(class));

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    encoder.write_script(&value).unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(reader.read_script().unwrap(), value);
}

#[test]
fn matching_kind_delta_elides_the_descriptor() {
    let value = ScriptValue::Number(2.0);
    let reference = ScriptValue::Number(1.0);
    assert_eq!(delta_roundtrip(&value, &reference), value);

    // Type-changed fallback.
    let value = ScriptValue::String("now a string".to_owned());
    assert_eq!(delta_roundtrip(&value, &reference), value);
}

#[test]
fn array_delta_recurses_per_element() {
    let reference = ScriptValue::Array(vec![
        ScriptValue::Number(1.0),
        ScriptValue::Number(2.0),
        ScriptValue::Number(3.0),
    ]);
    let value = ScriptValue::Array(vec![
        ScriptValue::Number(1.0),
        ScriptValue::Number(20.0),
        ScriptValue::Number(3.0),
        ScriptValue::Number(4.0),
    ]);
    assert_eq!(delta_roundtrip(&value, &reference), value);

    // Shrinking arrays prune on the reader.
    let shorter = ScriptValue::Array(vec![ScriptValue::Number(1.0)]);
    assert_eq!(delta_roundtrip(&shorter, &reference), shorter);
}

#[test]
fn object_delta_sends_changed_added_and_removed_properties() {
    let reference = props(&[
        ("keep", ScriptValue::Number(1.0)),
        ("bump", ScriptValue::Number(2.0)),
        ("drop", ScriptValue::Bool(true)),
    ]);
    let value = props(&[
        ("keep", ScriptValue::Number(1.0)),
        ("bump", ScriptValue::Number(20.0)),
        ("new", ScriptValue::String("fresh".to_owned())),
    ]);
    assert_eq!(delta_roundtrip(&value, &reference), value);
}

#[test]
fn object_delta_of_identical_objects_is_just_the_terminator() {
    let registry = registry();
    let reference = props(&[("a", ScriptValue::Number(1.0))]);

    let mut encoder = Encoder::new(registry, MetadataMode::Full);
    encoder
        .write_script_raw_delta(&reference.clone(), &reference)
        .unwrap();
    // One type-unchanged bit plus the invalid-name terminator ID.
    assert!(encoder.bits_written() <= 3);
}

#[test]
fn out_of_range_script_tag_is_rejected() {
    let registry = registry();
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    // Low nibble 0xF = tag 15.
    let mut reader = decoder.begin(&[0x0F]);
    assert!(matches!(
        reader.read_script(),
        Err(varstream::CodecError::InvalidScriptTag { tag: 15 })
    ));
}

#[test]
fn deep_script_nesting_is_bounded() {
    let registry = registry();
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    decoder.set_limits(varstream::Limits::for_testing());

    // Each 0xB nibble pair opens another array of length 1... eventually
    // the depth limit trips instead of the stack.
    let mut encoder = Encoder::new(TypeRegistryBuilder::new().build().unwrap(), MetadataMode::Full);
    let mut nested = ScriptValue::Number(0.0);
    for _ in 0..32 {
        nested = ScriptValue::Array(vec![nested]);
    }
    encoder.write_script(&nested).unwrap();
    let message = encoder.finish_message();

    let mut reader = decoder.begin(&message);
    assert!(matches!(
        reader.read_script(),
        Err(varstream::CodecError::DepthLimitExceeded { .. })
    ));
}
