use std::sync::Arc;

use varstream::{
    builtin, Decoder, Encoder, GenericsMode, ListStreamer, MapStreamer, MetaField, MetadataMode,
    RecordStreamer, RecordValue, SetStreamer, StreamerRef, TypeId, TypeRegistry,
    TypeRegistryBuilder, Value,
};

fn registry() -> Arc<TypeRegistry> {
    let mut builder = TypeRegistryBuilder::new();
    let int = builtin::streamer(builtin::INT).unwrap();
    let string = builtin::streamer(builtin::STRING).unwrap();

    builder.register_streamer(ListStreamer::new(TypeId::new(100), "int-list", int.clone()));
    builder.register_streamer(SetStreamer::new(TypeId::new(101), "int-set", int.clone()));
    builder.register_streamer(MapStreamer::new(
        TypeId::new(102),
        "string-int-map",
        string,
        int.clone(),
    ));
    builder.register_streamer(RecordStreamer::new(
        TypeId::new(103),
        "point",
        vec![MetaField::new("x", int.clone()), MetaField::new("y", int)],
    ));
    builder.build().unwrap()
}

fn point(x: i32, y: i32) -> Value {
    Value::Record(RecordValue::new("point", vec![Value::Int(x), Value::Int(y)]))
}

/// Applies the delta law: decoding `write_delta(a, b)` against `b` yields `a`.
fn delta_roundtrip(registry: &Arc<TypeRegistry>, value: &Value, reference: &Value) {
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    encoder.write_value_delta(value, reference).unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry.clone(), MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    let decoded = reader.read_value_delta(reference).unwrap();
    assert_eq!(&decoded, value, "delta {value:?} against {reference:?}");
}

#[test]
fn delta_law_over_value_pairs() {
    let registry = registry();
    let values = [
        Value::Int(1),
        Value::Int(2),
        Value::String("a".to_owned()),
        Value::Bool(true),
        point(1, 2),
        point(1, 9),
        Value::List(vec![Value::Int(1), Value::Int(2)]),
        Value::Set(vec![Value::Int(1), Value::Int(2)]),
        Value::Map(vec![(Value::String("k".to_owned()), Value::Int(1))]),
        Value::Invalid,
    ];
    for value in &values {
        for reference in &values {
            delta_roundtrip(&registry, value, reference);
        }
    }
}

#[test]
fn equal_values_delta_is_exactly_one_bit() {
    let registry = registry();
    let values = [Value::Int(42), point(3, 4), Value::String("same".into())];
    for value in &values {
        let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
        encoder.write_value_delta(value, value).unwrap();
        assert_eq!(encoder.bits_written(), 1, "{value:?}");
    }
}

#[test]
fn list_delta_wire_layout() {
    // Reference [1,2,3,4], value [1,2,9,4,5]: lengths, two unchanged bits,
    // one changed element, one unchanged bit, one appended absolute.
    let registry = registry();
    let list: StreamerRef = registry.streamer_by_name("int-list").unwrap().clone();
    let reference = Value::List((1..=4).map(Value::Int).collect());
    let value = Value::List(vec![
        Value::Int(1),
        Value::Int(2),
        Value::Int(9),
        Value::Int(4),
        Value::Int(5),
    ]);

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    list.write_raw_delta(&mut encoder, &value, &reference)
        .unwrap();
    // 32 (length) + 32 (reference length) + 1 + 1 + (1 + 32) + 1 + 32.
    assert_eq!(encoder.bits_written(), 132);
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    let plan = varstream::TypeReader::exact(Arc::from("int-list"), Some(list));
    assert_eq!(plan.read_raw_delta(&mut reader, &reference).unwrap(), value);
}

#[test]
fn list_delta_prunes_shrunk_tail() {
    let registry = registry();
    let list = registry.streamer_by_name("int-list").unwrap().clone();
    let reference = Value::List((1..=5).map(Value::Int).collect());
    let value = Value::List(vec![Value::Int(1), Value::Int(7)]);

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    list.write_raw_delta(&mut encoder, &value, &reference)
        .unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(
        list.read_raw_delta(&mut reader, &reference).unwrap(),
        value
    );
}

#[test]
fn set_delta_transmits_symmetric_difference() {
    let registry = registry();
    let set = registry.streamer_by_name("int-set").unwrap().clone();
    let reference = Value::Set(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let value = Value::Set(vec![Value::Int(2), Value::Int(3), Value::Int(8)]);

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    set.write_raw_delta(&mut encoder, &value, &reference)
        .unwrap();
    // Count (32 bits) plus two toggled elements (1 removed, 8 added).
    assert_eq!(encoder.bits_written(), 32 + 2 * 32);
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(set.read_raw_delta(&mut reader, &reference).unwrap(), value);
}

#[test]
fn map_delta_orders_added_modified_removed() {
    let registry = registry();
    let map = registry.streamer_by_name("string-int-map").unwrap().clone();
    let key = |s: &str| Value::String(s.to_owned());
    let reference = Value::Map(vec![
        (key("keep"), Value::Int(1)),
        (key("bump"), Value::Int(2)),
        (key("drop"), Value::Int(3)),
    ]);
    let value = Value::Map(vec![
        (key("keep"), Value::Int(1)),
        (key("bump"), Value::Int(20)),
        (key("new"), Value::Int(4)),
    ]);

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    map.write_raw_delta(&mut encoder, &value, &reference)
        .unwrap();
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(map.read_raw_delta(&mut reader, &reference).unwrap(), value);
}

#[test]
fn record_delta_recurses_per_field() {
    let registry = registry();
    let record = registry.streamer_by_name("point").unwrap().clone();
    let reference = point(10, 20);
    let value = point(10, 21);

    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    record
        .write_raw_delta(&mut encoder, &value, &reference)
        .unwrap();
    // Unchanged x costs one bit; changed y costs flag plus 32 bits.
    assert_eq!(encoder.bits_written(), 1 + 1 + 32);
    let message = encoder.finish_message();

    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(
        record.read_raw_delta(&mut reader, &reference).unwrap(),
        value
    );
}

#[test]
fn delta_against_other_kind_falls_back_to_absolute() {
    let registry = registry();
    delta_roundtrip(&registry, &Value::Int(5), &Value::String("not int".into()));
    delta_roundtrip(&registry, &point(1, 2), &Value::Int(9));
}
