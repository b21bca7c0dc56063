use bitbuf::{bits_for_highest, BitReader, BitWriter, IdReader, IdWriter};

#[test]
fn all_widths_roundtrip() {
    for bits in 1..=64u8 {
        let max = if bits == 64 { u64::MAX } else { (1 << bits) - 1 };
        for value in [0, 1, max / 2, max] {
            let mut writer = BitWriter::new();
            writer.write_bits(value, bits).unwrap();
            let bytes = writer.finish();

            let mut reader = BitReader::new(&bytes);
            assert_eq!(
                reader.read_bits(bits).unwrap(),
                value,
                "width {bits} value {value}"
            );
        }
    }
}

#[test]
fn back_to_back_writes_decode_in_order() {
    let ops: &[(u64, u8)] = &[(1, 1), (5, 3), (200, 8), (0, 2), (70_000, 17), (1, 1)];

    let mut writer = BitWriter::new();
    for &(value, bits) in ops {
        writer.write_bits(value, bits).unwrap();
    }
    let bytes = writer.finish();

    let mut reader = BitReader::new(&bytes);
    for &(value, bits) in ops {
        assert_eq!(reader.read_bits(bits).unwrap(), value);
    }
}

#[test]
fn single_true_flush_yields_0x01() {
    let mut writer = BitWriter::new();
    writer.write_bit(true);
    writer.flush();
    assert_eq!(writer.take_bytes(), vec![0x01]);
}

#[test]
fn session_spans_messages() {
    // A writer drained at message boundaries produces the same stream a
    // reader sees when fed message-by-message.
    let mut writer = BitWriter::new();
    writer.write_bits(0x2A, 6).unwrap();
    writer.flush();
    let first = writer.take_bytes();

    writer.write_bits(0x1234, 16).unwrap();
    writer.flush();
    let second = writer.take_bytes();

    let mut reader = BitReader::new(&first);
    assert_eq!(reader.read_bits(6).unwrap(), 0x2A);

    let mut reader = BitReader::new(&second);
    assert_eq!(reader.read_bits(16).unwrap(), 0x1234);
}

#[test]
fn id_sequence_total_bits_matches_formula() {
    for k in [1u32, 2, 3, 7, 8, 31, 32, 200] {
        let mut writer = BitWriter::new();
        let mut ids = IdWriter::new();
        for id in 1..=k {
            ids.write(&mut writer, id).unwrap();
        }
        let expected: usize = (1..=k)
            .map(|i| usize::from(bits_for_highest(i + 1)))
            .sum();
        assert_eq!(writer.bits_written(), expected, "k = {k}");

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);
        let mut ids = IdReader::new();
        for id in 1..=k {
            assert_eq!(ids.read(&mut reader).unwrap(), id);
        }
    }
}
