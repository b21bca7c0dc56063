use bitbuf::{BitReader, BitWriter, IdReader, IdWriter};
use proptest::prelude::*;

#[derive(Clone, Debug)]
enum Op {
    Bit(bool),
    Bits { bits: u8, value: u64 },
    U32(u32),
    U64(u64),
}

fn mask_value(bits: u8, value: u64) -> u64 {
    if bits >= 64 {
        value
    } else {
        let mask = (1u64 << bits) - 1;
        value & mask
    }
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        any::<bool>().prop_map(Op::Bit),
        (1u8..=64, any::<u64>()).prop_map(|(bits, value)| Op::Bits {
            bits,
            value: mask_value(bits, value),
        }),
        any::<u32>().prop_map(Op::U32),
        any::<u64>().prop_map(Op::U64),
    ]
}

proptest! {
    #[test]
    fn prop_roundtrip_ops(ops in prop::collection::vec(op_strategy(), 1..64)) {
        let mut writer = BitWriter::new();

        for op in &ops {
            match op {
                Op::Bit(b) => {
                    writer.write_bit(*b);
                }
                Op::Bits { bits, value } => {
                    writer.write_bits(*value, *bits).unwrap();
                }
                Op::U32(v) => {
                    writer.write_bits(u64::from(*v), 32).unwrap();
                }
                Op::U64(v) => {
                    writer.write_bits(*v, 64).unwrap();
                }
            }
        }

        let bytes = writer.finish();
        let mut reader = BitReader::new(&bytes);

        for op in &ops {
            match op {
                Op::Bit(b) => {
                    prop_assert_eq!(reader.read_bit().unwrap(), *b);
                }
                Op::Bits { bits, value } => {
                    prop_assert_eq!(reader.read_bits(*bits).unwrap(), *value);
                }
                Op::U32(v) => {
                    prop_assert_eq!(reader.read_bits(32).unwrap(), u64::from(*v));
                }
                Op::U64(v) => {
                    prop_assert_eq!(reader.read_bits(64).unwrap(), *v);
                }
            }
        }
    }

    #[test]
    fn prop_id_sequences_roundtrip(seed in prop::collection::vec(0u32..64, 1..64)) {
        // Interpret the seed as "new id" (assign densely) vs "repeat id k".
        let mut assigned = 0u32;
        let mut sequence = Vec::new();
        for s in seed {
            if assigned == 0 || s % 3 == 0 {
                assigned += 1;
                sequence.push(assigned);
            } else {
                sequence.push(s % assigned + 1);
            }
        }

        let mut writer = BitWriter::new();
        let mut ids = IdWriter::new();
        for &id in &sequence {
            ids.write(&mut writer, id).unwrap();
        }
        let bytes = writer.finish();

        let mut reader = BitReader::new(&bytes);
        let mut ids = IdReader::new();
        for &id in &sequence {
            prop_assert_eq!(ids.read(&mut reader).unwrap(), id);
        }
    }
}
