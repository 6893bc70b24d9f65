//! Image-quality controls and auto/manual coupling
//!
//! Every setting keeps a cached logical value beside the hardware state.
//! The cache is authoritative for getters and is replayed when an automatic
//! mode is switched off (the sensor clobbers the manual registers while an
//! auto loop runs) and when streaming starts.
//!
//! The coupling rules live here, against the [`RegisterBus`] seam, so they
//! can be verified with a recording fake instead of a camera.

use crate::error::{Error, Result};
use crate::registers::RegisterBus;
use tracing::debug;

// OV7725 control registers
const REG_GAIN: u8 = 0x00;
const REG_HUE: u8 = 0x01;
const REG_AEC_HI: u8 = 0x08;
const REG_COM8: u8 = 0x13; // AGC/AWB/AEC enable bits
const REG_AEC_LO: u8 = 0x10;
const REG_COM3: u8 = 0x0c; // mirror / vflip bits
const REG_BLUE_BALANCE: u8 = 0x42;
const REG_RED_BALANCE: u8 = 0x43;
const REG_GREEN_BALANCE: u8 = 0x44;
const REG_AWB_CTRL: u8 = 0x63;
const REG_AGC_CTRL: u8 = 0x64;
const REG_SHARPNESS_QVGA: u8 = 0x8e;
const REG_SHARPNESS_VGA: u8 = 0x91;
const REG_BRIGHTNESS: u8 = 0x9b;
const REG_CONTRAST: u8 = 0x9c;

// COM8 bits
const COM8_AGC: u8 = 0x04;
const COM8_AWB: u8 = 0x02;
const COM8_AEC_AGC: u8 = 0x05;

// COM3 bits
const COM3_MIRROR: u8 = 0x40;
const COM3_VFLIP: u8 = 0x80;

/// Re-encode the logical 6-bit gain into the register's four-band layout.
///
/// The top two bits of the logical value select the band, the low nibble
/// carries through unchanged.
pub fn encode_gain(val: u8) -> u8 {
    let nibble = val & 0x0f;
    match val & 0x30 {
        0x00 => nibble,
        0x10 => nibble | 0x30,
        0x20 => nibble | 0x70,
        _ => nibble | 0xf0,
    }
}

/// Cached control values for one camera
#[derive(Debug, Clone)]
pub(crate) struct ControlState {
    pub autogain: bool,
    pub auto_exposure: bool,
    pub awb: bool,
    pub gain: u8,     // 0..=63
    pub exposure: u8, // 0..=255
    pub hue: u8,
    pub sharpness: u8,
    pub brightness: u8,
    pub contrast: u8,
    pub red_balance: u8,
    pub blue_balance: u8,
    pub green_balance: u8,
    pub flip_h: bool,
    pub flip_v: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        // Power-on defaults of the original driver
        Self {
            autogain: false,
            auto_exposure: false,
            awb: false,
            gain: 20,
            exposure: 120,
            hue: 143,
            sharpness: 0,
            brightness: 20,
            contrast: 37,
            red_balance: 128,
            blue_balance: 128,
            green_balance: 128,
            flip_h: false,
            flip_v: false,
        }
    }
}

impl ControlState {
    pub fn set_autogain(&mut self, bus: &dyn RegisterBus, on: bool) -> Result<()> {
        self.autogain = on;
        if on {
            rmw(bus, REG_COM8, |v| v | COM8_AGC)?;
            rmw(bus, REG_AGC_CTRL, |v| v | 0x03)?;
        } else {
            rmw(bus, REG_COM8, |v| v & !COM8_AGC)?;
            rmw(bus, REG_AGC_CTRL, |v| v & !0x03)?;
            // Auto gain clobbers the gain register while it runs
            self.write_gain(bus)?;
        }
        Ok(())
    }

    pub fn set_auto_exposure(&mut self, bus: &dyn RegisterBus, on: bool) -> Result<()> {
        self.auto_exposure = on;
        if on {
            rmw(bus, REG_COM8, |v| v | COM8_AEC_AGC)?;
        } else {
            rmw(bus, REG_COM8, |v| v & !COM8_AEC_AGC)?;
            // Gain is linked to the exposure auto loop on this sensor, so
            // exposure must be restored first, then gain.
            self.write_exposure(bus)?;
            self.write_gain(bus)?;
        }
        Ok(())
    }

    pub fn set_auto_white_balance(&mut self, bus: &dyn RegisterBus, on: bool) -> Result<()> {
        self.awb = on;
        if on {
            rmw(bus, REG_COM8, |v| v | COM8_AWB)?;
            rmw(bus, REG_AWB_CTRL, |v| v | 0xc0)?;
        } else {
            rmw(bus, REG_COM8, |v| v & !COM8_AWB)?;
            rmw(bus, REG_AWB_CTRL, |v| v & !0xc0)?;
            write(bus, REG_RED_BALANCE, self.red_balance)?;
            write(bus, REG_BLUE_BALANCE, self.blue_balance)?;
            write(bus, REG_GREEN_BALANCE, self.green_balance)?;
        }
        Ok(())
    }

    pub fn set_gain(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.gain = val;
        if self.autogain {
            // The AGC loop owns the register; the cached value is applied
            // when autogain is switched off.
            return Ok(());
        }
        self.write_gain(bus)
    }

    pub fn set_exposure(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.exposure = val;
        self.write_exposure(bus)
    }

    pub fn set_hue(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.hue = val;
        write(bus, REG_HUE, val)
    }

    pub fn set_sharpness(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.sharpness = val;
        write(bus, REG_SHARPNESS_VGA, val)?;
        write(bus, REG_SHARPNESS_QVGA, val)
    }

    pub fn set_brightness(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.brightness = val;
        write(bus, REG_BRIGHTNESS, val)
    }

    pub fn set_contrast(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.contrast = val;
        write(bus, REG_CONTRAST, val)
    }

    pub fn set_red_balance(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.red_balance = val;
        if self.awb {
            return Ok(());
        }
        write(bus, REG_RED_BALANCE, val)
    }

    pub fn set_blue_balance(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.blue_balance = val;
        if self.awb {
            return Ok(());
        }
        write(bus, REG_BLUE_BALANCE, val)
    }

    pub fn set_green_balance(&mut self, bus: &dyn RegisterBus, val: u8) -> Result<()> {
        self.green_balance = val;
        if self.awb {
            return Ok(());
        }
        write(bus, REG_GREEN_BALANCE, val)
    }

    /// Set both flip flags with one read-modify-write of COM3.
    ///
    /// The sensor is mirrored by default, so a *cleared* flag sets the
    /// corresponding register bit.
    pub fn set_flip(&mut self, bus: &dyn RegisterBus, horizontal: bool, vertical: bool) -> Result<()> {
        self.flip_h = horizontal;
        self.flip_v = vertical;
        rmw(bus, REG_COM3, |v| {
            let mut v = v & !(COM3_MIRROR | COM3_VFLIP);
            if !horizontal {
                v |= COM3_MIRROR;
            }
            if !vertical {
                v |= COM3_VFLIP;
            }
            v
        })
    }

    /// Replay every cached value to the hardware.
    ///
    /// Used when streaming starts: mode initialization rewrites most of the
    /// sensor, and the controls must survive a re-init.
    pub fn apply_all(&mut self, bus: &dyn RegisterBus) -> Result<()> {
        let (autogain, aec, awb) = (self.autogain, self.auto_exposure, self.awb);
        self.set_autogain(bus, autogain)?;
        self.set_auto_exposure(bus, aec)?;
        self.set_auto_white_balance(bus, awb)?;
        let (gain, exposure) = (self.gain, self.exposure);
        self.set_gain(bus, gain)?;
        self.set_exposure(bus, exposure)?;
        let (hue, sharp, bright, contrast) = (self.hue, self.sharpness, self.brightness, self.contrast);
        self.set_hue(bus, hue)?;
        self.set_sharpness(bus, sharp)?;
        self.set_brightness(bus, bright)?;
        self.set_contrast(bus, contrast)?;
        let (r, b, g) = (self.red_balance, self.blue_balance, self.green_balance);
        self.set_red_balance(bus, r)?;
        self.set_blue_balance(bus, b)?;
        self.set_green_balance(bus, g)?;
        let (h, v) = (self.flip_h, self.flip_v);
        self.set_flip(bus, h, v)
    }

    fn write_gain(&self, bus: &dyn RegisterBus) -> Result<()> {
        write(bus, REG_GAIN, encode_gain(self.gain))
    }

    fn write_exposure(&self, bus: &dyn RegisterBus) -> Result<()> {
        write(bus, REG_AEC_HI, self.exposure >> 7)?;
        write(bus, REG_AEC_LO, self.exposure << 1)
    }
}

/// Sensor write with protocol-timeout tolerance: an unacknowledged SCCB
/// cycle drops the setting but is not an error for the caller.
fn write(bus: &dyn RegisterBus, reg: u8, val: u8) -> Result<()> {
    match bus.sensor_write(reg, val) {
        Err(Error::ProtocolTimeout { reg }) => {
            debug!("control write to {:#04x} not acknowledged, dropped", reg);
            Ok(())
        }
        other => other,
    }
}

/// Read-modify-write with the same tolerance; a timed-out read skips the
/// whole update rather than writing a guessed value.
fn rmw(bus: &dyn RegisterBus, reg: u8, f: impl FnOnce(u8) -> u8) -> Result<()> {
    let current = match bus.sensor_read(reg) {
        Ok(v) => v,
        Err(Error::ProtocolTimeout { .. }) => {
            debug!("control read of {:#04x} not acknowledged, update skipped", reg);
            return Ok(());
        }
        Err(e) => return Err(e),
    };
    write(bus, reg, f(current))
}
