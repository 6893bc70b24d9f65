//! OV534 bridge and OV7725 sensor register access
//!
//! The bridge chip is programmed with vendor control transfers on endpoint 0.
//! The image sensor sits behind the bridge on an SCCB bus; sensor registers
//! are reached by staging the target address and data in bridge registers,
//! issuing an operation, and polling a status register until the bridge
//! reports the cycle complete.

use crate::error::{Error, Result};
use rusb::{Context, DeviceHandle};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, warn};

/// Control transfer timeout, matching the original driver
const CTRL_TIMEOUT: Duration = Duration::from_millis(500);

/// SCCB slave address of the OV7725 (write address)
const SENSOR_ADDRESS: u8 = 0x42;

// Bridge staging registers for the SCCB proxy
const REG_SCCB_ADDRESS: u16 = 0xf1;
const REG_SCCB_SUBADDR: u16 = 0xf2;
const REG_SCCB_WRITE: u16 = 0xf3;
const REG_SCCB_READ: u16 = 0xf4;
const REG_SCCB_OPERATION: u16 = 0xf5;
const REG_SCCB_STATUS: u16 = 0xf6;

// SCCB operations
const OP_WRITE_3: u8 = 0x37;
const OP_WRITE_2: u8 = 0x33;
const OP_READ_2: u8 = 0xf9;

/// Bounded retry count for the SCCB status poll
const STATUS_POLL_LIMIT: u32 = 5;

/// Single-register access seam
///
/// The control-coupling logic in [`crate::controls`] is written against this
/// trait so it can be exercised with a recording fake instead of hardware.
pub trait RegisterBus {
    /// Write one bridge register
    fn bridge_write(&self, reg: u16, val: u8) -> Result<()>;
    /// Read one bridge register
    fn bridge_read(&self, reg: u16) -> Result<u8>;
    /// Write one sensor register through the SCCB proxy
    fn sensor_write(&self, reg: u8, val: u8) -> Result<()>;
    /// Read one sensor register through the SCCB proxy
    fn sensor_read(&self, reg: u8) -> Result<u8>;
}

/// Register access for one open camera
///
/// All access goes through a single mutex so that a multi-step SCCB sequence
/// (stage address, issue operation, poll status) can never interleave with
/// another caller's sequence on the same device.
pub struct Registers {
    inner: Mutex<RegIo>,
}

struct RegIo {
    handle: Arc<DeviceHandle<Context>>,
}

impl Registers {
    pub fn new(handle: Arc<DeviceHandle<Context>>) -> Self {
        Self {
            inner: Mutex::new(RegIo { handle }),
        }
    }

    /// Stage the sensor's SCCB slave address in the bridge.
    ///
    /// Must be done once after open, before any sensor access.
    pub fn select_sensor(&self) -> Result<()> {
        let io = self.inner.lock().expect("register mutex poisoned");
        io.bridge_write(REG_SCCB_ADDRESS, SENSOR_ADDRESS)
    }

    /// Apply an ordered bridge register table, best-effort.
    ///
    /// Some OV534 registers are write-only or silently unacknowledged, so
    /// individual failures are recorded and the remainder still applied.
    pub fn write_bridge_table(&self, table: &[(u16, u8)]) {
        let io = self.inner.lock().expect("register mutex poisoned");
        for &(reg, val) in table {
            if let Err(e) = io.bridge_write(reg, val) {
                debug!("bridge table write {:#04x} <- {:#04x} failed: {}", reg, val, e);
            }
        }
    }

    /// Apply an ordered sensor register table, best-effort.
    pub fn write_sensor_table(&self, table: &[(u8, u8)]) {
        let io = self.inner.lock().expect("register mutex poisoned");
        for &(reg, val) in table {
            if let Err(e) = io.sensor_write(reg, val) {
                debug!("sensor table write {:#04x} <- {:#04x} failed: {}", reg, val, e);
            }
        }
    }
}

impl RegisterBus for Registers {
    fn bridge_write(&self, reg: u16, val: u8) -> Result<()> {
        let io = self.inner.lock().expect("register mutex poisoned");
        io.bridge_write(reg, val)
    }

    fn bridge_read(&self, reg: u16) -> Result<u8> {
        let io = self.inner.lock().expect("register mutex poisoned");
        io.bridge_read(reg)
    }

    fn sensor_write(&self, reg: u8, val: u8) -> Result<()> {
        let io = self.inner.lock().expect("register mutex poisoned");
        io.sensor_write(reg, val)
    }

    fn sensor_read(&self, reg: u8) -> Result<u8> {
        let io = self.inner.lock().expect("register mutex poisoned");
        io.sensor_read(reg)
    }
}

impl RegIo {
    fn bridge_write(&self, reg: u16, val: u8) -> Result<()> {
        let buf = [val];
        // bmRequestType 0x40: vendor request, host to device
        self.handle
            .write_control(0x40, 0x01, 0x00, reg, &buf, CTRL_TIMEOUT)?;
        Ok(())
    }

    fn bridge_read(&self, reg: u16) -> Result<u8> {
        let mut buf = [0u8; 1];
        // bmRequestType 0xc0: vendor request, device to host
        let n = self
            .handle
            .read_control(0xc0, 0x01, 0x00, reg, &mut buf, CTRL_TIMEOUT)?;
        if n != 1 {
            warn!("bridge read {:#04x}: short transfer ({} bytes)", reg, n);
            return Err(Error::Transport(rusb::Error::Io));
        }
        Ok(buf[0])
    }

    /// Poll the SCCB status register until the bridge reports the cycle
    /// complete. 0x00 = ready, 0x04 = slave NAK, 0x03 = busy.
    fn sccb_wait_ready(&self, reg: u8) -> Result<()> {
        for _ in 0..STATUS_POLL_LIMIT {
            match self.bridge_read(REG_SCCB_STATUS)? {
                0x00 => return Ok(()),
                0x04 => return Err(Error::ProtocolTimeout { reg }),
                status => debug!("sccb status {:#04x}, retrying", status),
            }
        }
        Err(Error::ProtocolTimeout { reg })
    }

    fn sensor_write(&self, reg: u8, val: u8) -> Result<()> {
        self.bridge_write(REG_SCCB_SUBADDR, reg)?;
        self.bridge_write(REG_SCCB_WRITE, val)?;
        self.bridge_write(REG_SCCB_OPERATION, OP_WRITE_3)?;
        self.sccb_wait_ready(reg)
    }

    fn sensor_read(&self, reg: u8) -> Result<u8> {
        self.bridge_write(REG_SCCB_SUBADDR, reg)?;
        self.bridge_write(REG_SCCB_OPERATION, OP_WRITE_2)?;
        self.sccb_wait_ready(reg)?;
        self.bridge_write(REG_SCCB_OPERATION, OP_READ_2)?;
        self.sccb_wait_ready(reg)?;
        self.bridge_read(REG_SCCB_READ)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sccb_constants() {
        // Staging registers are contiguous on the OV534
        assert_eq!(REG_SCCB_SUBADDR, REG_SCCB_ADDRESS + 1);
        assert_eq!(REG_SCCB_STATUS, REG_SCCB_ADDRESS + 5);
    }

    #[test]
    fn test_control_request_directions() {
        // Bit 7 of bmRequestType selects the direction
        assert_eq!(0x40 & 0x80, 0); // write: host to device
        assert_ne!(0xc0 & 0x80, 0); // read: device to host
    }
}
