//! Property-based tests for bitstream operations.
//!
//! Uses proptest to verify round-trip correctness of BitReader/BitWriter
//! and the VC-2 interleaved exp-Golomb code.

use proptest::prelude::*;
use vc2_core::bitstream::{uint_bits, BitReader, BitWriter};

proptest! {
    /// Writing and reading fixed-width values produces the same value.
    #[test]
    fn roundtrip_bits_variable_width(value in 0u32..=0xFFFF, width in 1u8..=16) {
        let masked = value & ((1u32 << width) - 1);

        let mut writer = BitWriter::new();
        writer.write_bits(masked, width);
        writer.align_to_byte();

        let mut reader = BitReader::new(writer.data());
        prop_assert_eq!(reader.read_bits(width).unwrap(), masked);
    }

    /// Unsigned interleaved exp-Golomb values round-trip over the full
    /// range exercised by slice coefficients and header fields.
    #[test]
    fn roundtrip_uint(value in 0u32..=(1 << 20)) {
        let mut writer = BitWriter::new();
        writer.write_uint(value);
        writer.align_to_byte();

        let mut reader = BitReader::new(writer.data());
        prop_assert_eq!(reader.read_uint().unwrap(), value);
    }

    /// The code for n occupies exactly 2*floor(log2(n+1)) + 1 bits.
    #[test]
    fn uint_code_length(value in 0u32..=(1 << 20)) {
        let mut writer = BitWriter::new();
        writer.write_uint(value);

        let expected = 2 * ((value as u64 + 1).ilog2() as usize) + 1;
        prop_assert_eq!(writer.position_bits(), expected);
        prop_assert_eq!(uint_bits(value), expected);
    }

    /// Signed values round-trip including the sign bit.
    #[test]
    fn roundtrip_sint(value in -(1i32 << 19)..(1i32 << 19)) {
        let mut writer = BitWriter::new();
        writer.write_sint(value);
        writer.align_to_byte();

        let mut reader = BitReader::new(writer.data());
        prop_assert_eq!(reader.read_sint().unwrap(), value);
    }

    /// Values written after a bounded region are unaffected by writes
    /// dropped inside it.
    #[test]
    fn bounded_write_preserves_suffix(
        bound_bits in 1usize..64,
        payload in prop::collection::vec(0u32..16, 0..32),
        sentinel in 0u32..=0xFF,
    ) {
        let mut writer = BitWriter::new();
        writer.begin_bounded(bound_bits);
        for &v in &payload {
            writer.write_uint(v);
        }
        writer.end_bounded();
        writer.align_to_byte();
        writer.write_bits(sentinel, 8);

        let mut reader = BitReader::new(writer.data());
        reader.begin_bounded(bound_bits);
        reader.end_bounded().unwrap();
        reader.align_to_byte();
        prop_assert_eq!(reader.read_bits(8).unwrap(), sentinel);
    }

    /// Reads inside a bounded region never consume more than the bound.
    #[test]
    fn bounded_read_consumes_at_most_bound(
        data in prop::collection::vec(any::<u8>(), 1..32),
        bound_bits in 0usize..128,
        reads in 1usize..64,
    ) {
        let mut reader = BitReader::new(&data);
        reader.begin_bounded(bound_bits);
        for _ in 0..reads {
            if reader.read_uint().is_err() {
                break;
            }
        }
        let consumed = reader.position_bits();
        prop_assert!(consumed <= bound_bits.min(data.len() * 8));
    }
}
