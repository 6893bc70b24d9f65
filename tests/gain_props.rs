//! Property tests for the gain band re-encoding
//!
//! The logical 6-bit gain maps into the register's four-band layout: the
//! top two bits select the band, the low nibble passes through.

use proptest::prelude::*;
use ps3eye::encode_gain;

proptest! {
    #[test]
    fn low_nibble_passes_through(val in 0u8..64) {
        prop_assert_eq!(encode_gain(val) & 0x0f, val & 0x0f);
    }

    #[test]
    fn band_selects_high_bits(val in 0u8..64) {
        let expected_high = match val & 0x30 {
            0x00 => 0x00,
            0x10 => 0x30,
            0x20 => 0x70,
            _ => 0xf0,
        };
        prop_assert_eq!(encode_gain(val) & 0xf0, expected_high);
    }

    #[test]
    fn encoding_never_decreases_across_bands(a in 0u8..64, b in 0u8..64) {
        // A higher band always encodes above a lower band's ceiling
        if (a & 0x30) < (b & 0x30) {
            prop_assert!(encode_gain(a) < encode_gain(b) | 0x0f);
        }
    }
}

#[test]
fn documented_examples() {
    assert_eq!(encode_gain(0x05), 0x05);
    assert_eq!(encode_gain(0x15), 0x35);
    assert_eq!(encode_gain(0x25), 0x75);
    assert_eq!(encode_gain(0x35), 0xf5);
}
