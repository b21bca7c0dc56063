use std::sync::Arc;

use proptest::prelude::*;
use varstream::{
    builtin, Decoder, Encoder, GenericsMode, ListStreamer, MetaField, MetadataMode,
    RecordStreamer, RecordValue, TypeId, TypeRegistry, TypeRegistryBuilder, Value,
};

fn registry() -> Arc<TypeRegistry> {
    let mut builder = TypeRegistryBuilder::new();
    let int = builtin::streamer(builtin::INT).unwrap();
    let double = builtin::streamer(builtin::DOUBLE).unwrap();
    builder.register_streamer(ListStreamer::new(TypeId::new(100), "int-list", int.clone()));
    builder.register_streamer(RecordStreamer::new(
        TypeId::new(101),
        "sample",
        vec![MetaField::new("n", int), MetaField::new("x", double)],
    ));
    builder.build().unwrap()
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i32>().prop_map(Value::Int),
        any::<u32>().prop_map(Value::UInt),
        any::<i64>().prop_map(Value::DateTime),
        "[a-z]{0,12}".prop_map(Value::String),
        prop::collection::vec(any::<u8>(), 0..16).prop_map(Value::Bytes),
        prop::collection::vec(any::<i32>().prop_map(Value::Int), 0..8).prop_map(Value::List),
        (any::<i32>(), any::<f64>().prop_filter("finite", |x| x.is_finite())).prop_map(
            |(n, x)| Value::Record(RecordValue::new(
                "sample",
                vec![Value::Int(n), Value::Double(x)],
            ))
        ),
    ]
}

proptest! {
    #[test]
    fn prop_values_roundtrip_in_every_mode(value in value_strategy()) {
        let registry = registry();
        for mode in [MetadataMode::None, MetadataMode::Hash, MetadataMode::Full] {
            let mut encoder = Encoder::new(registry.clone(), mode);
            encoder.write_value(&value).unwrap();
            let message = encoder.finish_message();

            let mut decoder = Decoder::new(registry.clone(), mode, GenericsMode::Normal);
            let mut reader = decoder.begin(&message);
            prop_assert_eq!(&reader.read_value().unwrap(), &value);
        }
    }

    #[test]
    fn prop_delta_law(value in value_strategy(), reference in value_strategy()) {
        let registry = registry();
        let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
        encoder.write_value_delta(&value, &reference).unwrap();
        let message = encoder.finish_message();

        let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
        let mut reader = decoder.begin(&message);
        prop_assert_eq!(&reader.read_value_delta(&reference).unwrap(), &value);
    }

    #[test]
    fn prop_list_delta_recovers_value(
        value in prop::collection::vec(any::<i32>(), 0..12),
        reference in prop::collection::vec(any::<i32>(), 0..12),
    ) {
        let registry = registry();
        let list = registry.streamer_by_name("int-list").unwrap().clone();
        let value = Value::List(value.into_iter().map(Value::Int).collect());
        let reference = Value::List(reference.into_iter().map(Value::Int).collect());

        let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
        list.write_raw_delta(&mut encoder, &value, &reference).unwrap();
        let message = encoder.finish_message();

        let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
        let mut reader = decoder.begin(&message);
        prop_assert_eq!(&list.read_raw_delta(&mut reader, &reference).unwrap(), &value);
    }
}
