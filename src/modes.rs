//! Compiled-in capture mode table
//!
//! The OV534 supports two sensor windows (VGA 640x480 and QVGA 320x240),
//! each with a fixed set of frame rates. A mode is the exact triple
//! (width, height, fps); there is no nearest-fit fallback.

use crate::format::OutputFormat;

/// Negotiated capture parameters, stored by a successful `init()`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mode {
    pub width: u32,
    pub height: u32,
    pub fps: u16,
    pub format: OutputFormat,
}

impl Mode {
    /// Raw sensor bytes per frame (8-bit Bayer, one byte per pixel)
    pub fn raw_frame_size(&self) -> usize {
        (self.width * self.height) as usize
    }

    /// Converted output bytes per frame
    pub fn output_frame_size(&self) -> usize {
        self.raw_frame_size() * self.format.bytes_per_pixel()
    }
}

/// One supported sensor window with its start tables and rate list
pub(crate) struct ModeEntry {
    pub width: u32,
    pub height: u32,
    pub bridge_start: &'static [(u16, u8)],
    pub sensor_start: &'static [(u8, u8)],
    pub rates: &'static [RateEntry],
}

/// Frame-rate register triple: sensor clock divider (0x11), sensor PLL
/// control (0x0d), bridge clock control (0xe5)
#[derive(Debug, Clone, Copy)]
pub(crate) struct RateEntry {
    pub fps: u16,
    pub r11: u8,
    pub r0d: u8,
    pub re5: u8,
}

/// Look up the exact (width, height, fps) combination.
pub(crate) fn find_mode(width: u32, height: u32, fps: u16) -> Option<(&'static ModeEntry, RateEntry)> {
    let entry = MODE_TABLE
        .iter()
        .find(|m| m.width == width && m.height == height)?;
    let rate = entry.rates.iter().find(|r| r.fps == fps)?;
    Some((entry, *rate))
}

/// All supported (width, height, fps) triples, for diagnostics
pub fn supported_modes() -> Vec<(u32, u32, u16)> {
    MODE_TABLE
        .iter()
        .flat_map(|m| m.rates.iter().map(|r| (m.width, m.height, r.fps)))
        .collect()
}

pub(crate) static MODE_TABLE: &[ModeEntry] = &[
    ModeEntry {
        width: 640,
        height: 480,
        bridge_start: BRIDGE_START_VGA,
        sensor_start: SENSOR_START_VGA,
        rates: RATES_VGA,
    },
    ModeEntry {
        width: 320,
        height: 240,
        bridge_start: BRIDGE_START_QVGA,
        sensor_start: SENSOR_START_QVGA,
        rates: RATES_QVGA,
    },
];

/// Bridge bring-up sequence, applied once per `init()`
pub(crate) static BRIDGE_INIT: &[(u16, u8)] = &[
    (0xe7, 0x3a),
    (0xc2, 0x0c),
    (0x88, 0xf8),
    (0xc3, 0x69),
    (0x89, 0xff),
    (0x76, 0x03),
    (0x92, 0x01),
    (0x93, 0x18),
    (0x94, 0x10),
    (0x95, 0x10),
    (0xe2, 0x00),
    (0xe7, 0x3e),
    (0x96, 0x00),
    (0x97, 0x20),
    (0x97, 0x20),
    (0x97, 0x20),
    (0x97, 0x0a),
    (0x97, 0x3f),
    (0x97, 0x4a),
    (0x97, 0x20),
    (0x97, 0x15),
    (0x97, 0x0b),
    (0x8e, 0x40),
    (0x1f, 0x81),
    (0x34, 0x05),
    (0xe3, 0x04),
    (0x88, 0x00),
    (0x89, 0x00),
    (0x76, 0x00),
    (0xe7, 0x2e),
    (0x31, 0xf9),
    (0x25, 0x42),
    (0x21, 0xf0),
    (0x8d, 0x1c),
    (0x8e, 0x80),
    (0xe5, 0x04),
];

/// Sensor bring-up sequence, applied once per `init()` after the soft reset
pub(crate) static SENSOR_INIT: &[(u8, u8)] = &[
    (0x3d, 0x03),
    (0x17, 0x26),
    (0x18, 0xa0),
    (0x19, 0x07),
    (0x1a, 0xf0),
    (0x32, 0x00),
    (0x29, 0xa0),
    (0x2c, 0xf0),
    (0x65, 0x20),
    (0x11, 0x01),
    (0x42, 0x7f),
    (0x63, 0xaa), // AWB off
    (0x64, 0xff),
    (0x66, 0x00),
    (0x13, 0xf0), // AGC/AWB/AEC off
    (0x0d, 0x41),
    (0x0f, 0xc5),
    (0x14, 0x11),
    (0x22, 0x7f),
    (0x23, 0x03),
    (0x24, 0x40),
    (0x25, 0x30),
    (0x26, 0xa1),
    (0x2a, 0x00),
    (0x2b, 0x00),
    (0x6b, 0xaa),
    (0x13, 0xff), // AGC/AWB/AEC on
    (0x90, 0x05),
    (0x91, 0x01),
    (0x92, 0x03),
    (0x93, 0x00),
    (0x94, 0x60),
    (0x95, 0x3c),
    (0x96, 0x24),
    (0x97, 0x1e),
    (0x98, 0x62),
    (0x99, 0x80),
    (0x9a, 0x1e),
    (0x9b, 0x08),
    (0x9c, 0x20),
    (0x9e, 0x81),
    (0xa6, 0x04),
    (0x7e, 0x0c),
    (0x7f, 0x16),
    (0x80, 0x2a),
    (0x81, 0x4e),
    (0x82, 0x61),
    (0x83, 0x6f),
    (0x84, 0x7b),
    (0x85, 0x86),
    (0x86, 0x8e),
    (0x87, 0x97),
    (0x88, 0xa4),
    (0x89, 0xaf),
    (0x8a, 0xc5),
    (0x8b, 0xd7),
    (0x8c, 0xe8),
    (0x8d, 0x20),
    (0x0c, 0x90),
];

static BRIDGE_START_VGA: &[(u16, u8)] = &[
    (0x1c, 0x00),
    (0x1d, 0x40),
    (0x1d, 0x02),
    (0x1d, 0x00),
    (0x1d, 0x02), // payload size: 0x0200 = 512
    (0x1d, 0x58), // frame size: 0x025800 = 640*480*0.5? bridge-internal units
    (0x1d, 0x00),
    (0xc0, 0x50), // horizontal window / 8
    (0xc1, 0x3c), // vertical window / 8
];

static SENSOR_START_VGA: &[(u8, u8)] = &[
    (0x12, 0x01), // raw Bayer, VGA
    (0x17, 0x26),
    (0x18, 0xa0),
    (0x19, 0x07),
    (0x1a, 0xf0),
    (0x29, 0xa0),
    (0x2c, 0xf0),
    (0x65, 0x20),
];

static BRIDGE_START_QVGA: &[(u16, u8)] = &[
    (0x1c, 0x00),
    (0x1d, 0x40),
    (0x1d, 0x02),
    (0x1d, 0x00),
    (0x1d, 0x01), // payload size
    (0x1d, 0x4b), // frame size
    (0x1d, 0x00),
    (0xc0, 0x28),
    (0xc1, 0x1e),
];

static SENSOR_START_QVGA: &[(u8, u8)] = &[
    (0x12, 0x41), // raw Bayer, QVGA
    (0x17, 0x3f),
    (0x18, 0x50),
    (0x19, 0x03),
    (0x1a, 0x78),
    (0x29, 0x50),
    (0x2c, 0x78),
    (0x65, 0x2f),
];

static RATES_VGA: &[RateEntry] = &[
    RateEntry { fps: 83, r11: 0x01, r0d: 0xc1, re5: 0x02 },
    RateEntry { fps: 75, r11: 0x01, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 60, r11: 0x00, r0d: 0x41, re5: 0x04 },
    RateEntry { fps: 50, r11: 0x01, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 40, r11: 0x02, r0d: 0xc1, re5: 0x04 },
    RateEntry { fps: 30, r11: 0x04, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 25, r11: 0x00, r0d: 0x01, re5: 0x02 },
    RateEntry { fps: 20, r11: 0x04, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 15, r11: 0x09, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 10, r11: 0x09, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 8, r11: 0x02, r0d: 0x01, re5: 0x02 },
    RateEntry { fps: 5, r11: 0x04, r0d: 0x01, re5: 0x02 },
    RateEntry { fps: 3, r11: 0x06, r0d: 0x01, re5: 0x02 },
    RateEntry { fps: 2, r11: 0x09, r0d: 0x01, re5: 0x02 },
];

static RATES_QVGA: &[RateEntry] = &[
    RateEntry { fps: 290, r11: 0x00, r0d: 0xc1, re5: 0x04 },
    RateEntry { fps: 205, r11: 0x01, r0d: 0xc1, re5: 0x02 },
    RateEntry { fps: 187, r11: 0x01, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 150, r11: 0x00, r0d: 0x41, re5: 0x04 },
    RateEntry { fps: 137, r11: 0x02, r0d: 0xc1, re5: 0x02 },
    RateEntry { fps: 125, r11: 0x01, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 100, r11: 0x02, r0d: 0xc1, re5: 0x04 },
    RateEntry { fps: 90, r11: 0x03, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 75, r11: 0x04, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 60, r11: 0x04, r0d: 0xc1, re5: 0x04 },
    RateEntry { fps: 50, r11: 0x04, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 40, r11: 0x06, r0d: 0x81, re5: 0x03 },
    RateEntry { fps: 37, r11: 0x00, r0d: 0x01, re5: 0x04 },
    RateEntry { fps: 30, r11: 0x04, r0d: 0x41, re5: 0x04 },
    RateEntry { fps: 17, r11: 0x18, r0d: 0xc1, re5: 0x02 },
    RateEntry { fps: 15, r11: 0x18, r0d: 0x81, re5: 0x02 },
    RateEntry { fps: 12, r11: 0x02, r0d: 0x01, re5: 0x04 },
    RateEntry { fps: 10, r11: 0x18, r0d: 0x41, re5: 0x02 },
    RateEntry { fps: 7, r11: 0x04, r0d: 0x01, re5: 0x04 },
    RateEntry { fps: 5, r11: 0x06, r0d: 0x01, re5: 0x04 },
    RateEntry { fps: 3, r11: 0x09, r0d: 0x01, re5: 0x04 },
    RateEntry { fps: 2, r11: 0x18, r0d: 0x01, re5: 0x02 },
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match_only() {
        assert!(find_mode(640, 480, 60).is_some());
        assert!(find_mode(320, 240, 187).is_some());
        // No nearest-fit fallback
        assert!(find_mode(640, 480, 61).is_none());
        assert!(find_mode(800, 600, 30).is_none());
        assert!(find_mode(320, 240, 290).is_some());
        assert!(find_mode(640, 480, 290).is_none());
    }

    #[test]
    fn test_frame_sizes() {
        let mode = Mode {
            width: 640,
            height: 480,
            fps: 30,
            format: OutputFormat::Rgb,
        };
        assert_eq!(mode.raw_frame_size(), 640 * 480);
        assert_eq!(mode.output_frame_size(), 640 * 480 * 3);
    }

    #[test]
    fn test_supported_modes_nonempty() {
        let modes = supported_modes();
        assert!(modes.contains(&(640, 480, 30)));
        assert!(modes.contains(&(320, 240, 290)));
        assert!(!modes.contains(&(320, 240, 120)));
        assert!(modes.len() >= 30);
    }
}
