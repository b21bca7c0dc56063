use std::sync::Arc;

use varstream::{
    builtin, Decoder, Encoder, GenericsMode, MetaField, MetadataMode, RecordStreamer, RecordValue,
    TypeId, TypeRegistry, TypeRegistryBuilder, Value,
};

fn registry() -> Arc<TypeRegistry> {
    let mut builder = TypeRegistryBuilder::new();
    let int = builtin::streamer(builtin::INT).unwrap();
    builder.register_streamer(RecordStreamer::new(
        TypeId::new(100),
        "point",
        vec![MetaField::new("x", int.clone()), MetaField::new("y", int)],
    ));
    builder.build().unwrap()
}

fn point(x: i32, y: i32) -> Value {
    Value::Record(RecordValue::new("point", vec![Value::Int(x), Value::Int(y)]))
}

#[test]
fn repeated_type_costs_only_an_id_after_the_first_use() {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);

    encoder.write_value(&point(1, 2)).unwrap();
    let first = encoder.bits_written();
    encoder.write_value(&point(3, 4)).unwrap();
    let second = encoder.bits_written() - first;

    // Second occurrence: a few ID bits plus the 64-bit payload, no
    // descriptor metadata.
    assert!(second < 64 + 8, "second write took {second} bits");
    assert!(first > second, "first write must carry the descriptor");

    let message = encoder.finish_message();
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(reader.read_value().unwrap(), point(1, 2));
    assert_eq!(reader.read_value().unwrap(), point(3, 4));
}

#[test]
fn transient_reset_resends_metadata_next_message() {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);

    encoder.write_value(&point(1, 2)).unwrap();
    let first_len = encoder.bits_written();
    let first = encoder.finish_message();
    {
        let mut reader = decoder.begin(&first);
        assert_eq!(reader.read_value().unwrap(), point(1, 2));
    }

    // Neither side promotes; the metadata must be retransmitted and the
    // message costs the same again.
    let _ = encoder.get_and_reset_write_mappings();
    let _ = decoder.get_and_reset_read_mappings();

    encoder.write_value(&point(1, 2)).unwrap();
    assert_eq!(encoder.bits_written(), first_len);
    let second = encoder.finish_message();
    {
        let mut reader = decoder.begin(&second);
        assert_eq!(reader.read_value().unwrap(), point(1, 2));
    }
}

#[test]
fn persisted_mappings_survive_into_the_next_message() {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);

    encoder.write_value(&point(1, 2)).unwrap();
    let first_len = encoder.bits_written();
    let first = encoder.finish_message();
    {
        let mut reader = decoder.begin(&first);
        assert_eq!(reader.read_value().unwrap(), point(1, 2));
    }

    encoder.persist_and_reset_write_mappings();
    decoder.persist_and_reset_read_mappings();

    encoder.write_value(&point(9, 9)).unwrap();
    let second_len = encoder.bits_written();
    assert!(
        second_len < first_len,
        "persisted descriptor must not be retransmitted ({second_len} vs {first_len} bits)"
    );
    let second = encoder.finish_message();
    {
        let mut reader = decoder.begin(&second);
        assert_eq!(reader.read_value().unwrap(), point(9, 9));
    }
}

#[test]
fn snapshot_persist_after_ack_supports_out_of_order_promotion() {
    // The caller may hold several unacknowledged snapshots and promote them
    // as acks arrive, as long as both sides promote in the same order.
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);

    encoder.write_value(&point(1, 2)).unwrap();
    let first = encoder.finish_message();
    let write_snapshot = encoder.get_and_reset_write_mappings();

    let read_snapshot = {
        let mut reader = decoder.begin(&first);
        assert_eq!(reader.read_value().unwrap(), point(1, 2));
        drop(reader);
        decoder.get_and_reset_read_mappings()
    };

    // Ack arrives: both sides promote the same assignments.
    encoder.persist_write_mappings(write_snapshot);
    decoder.persist_read_mappings(read_snapshot);

    encoder.write_value(&point(5, 6)).unwrap();
    let second = encoder.finish_message();
    let mut reader = decoder.begin(&second);
    assert_eq!(reader.read_value().unwrap(), point(5, 6));
}

#[test]
fn name_handles_intern_within_a_message() {
    let registry = registry();
    let mut encoder = Encoder::new(registry.clone(), MetadataMode::Full);

    encoder.write_name(Some("energy")).unwrap();
    let first = encoder.bits_written();
    encoder.write_name(Some("energy")).unwrap();
    let second = encoder.bits_written() - first;
    encoder.write_name(None).unwrap();
    assert!(second <= 2, "interned name took {second} bits");

    let message = encoder.finish_message();
    let mut decoder = Decoder::new(registry, MetadataMode::Full, GenericsMode::Normal);
    let mut reader = decoder.begin(&message);
    assert_eq!(reader.read_name().unwrap().as_deref(), Some("energy"));
    assert_eq!(reader.read_name().unwrap().as_deref(), Some("energy"));
    assert_eq!(reader.read_name().unwrap(), None);
}
