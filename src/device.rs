//! Camera lifecycle: open, mode negotiation, streaming, controls
//!
//! A [`Camera`] is created unopened by the [`crate::manager::Enumerator`].
//! All methods take `&self`; internal state sits behind a mutex so that
//! `stop()` can be called while another thread is blocked in `get_frame()`.

use crate::controls::ControlState;
use crate::error::{Error, Result};
use crate::format::OutputFormat;
use crate::modes::{self, Mode};
use crate::registers::{RegisterBus, Registers};
use crate::stream::StreamWorker;
use rusb::{Context, Device, DeviceHandle};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime};
use tracing::{debug, info, warn};

/// Bridge register that starts (0x00) and stops (0x09) the video pipeline
const REG_STREAM: u16 = 0xe0;
const STREAM_START: u8 = 0x00;
const STREAM_STOP: u8 = 0x09;

// Status LED: GPIO direction in 0x21, level in 0x23, bit 7 each
const REG_LED_DIR: u16 = 0x21;
const REG_LED_LEVEL: u16 = 0x23;
const LED_BIT: u8 = 0x80;

/// One PlayStation Eye camera
pub struct Camera {
    device: Device<Context>,
    inner: Mutex<Inner>,
}

struct Inner {
    handle: Option<Arc<DeviceHandle<Context>>>,
    regs: Option<Arc<Registers>>,
    mode: Option<Mode>,
    controls: ControlState,
    stream: Option<StreamWorker>,
}

impl Camera {
    pub(crate) fn new(device: Device<Context>) -> Self {
        Self {
            device,
            inner: Mutex::new(Inner {
                handle: None,
                regs: None,
                mode: None,
                controls: ControlState::default(),
                stream: None,
            }),
        }
    }

    /// Claim exclusive access to the device.
    ///
    /// Fails with [`Error::DeviceBusy`] if this instance already holds the
    /// handle or the device is claimed elsewhere (including by the kernel's
    /// own camera driver when it cannot be detached).
    pub fn open(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.handle.is_some() {
            return Err(Error::DeviceBusy);
        }

        let mut handle = self.device.open().map_err(|e| match e {
            rusb::Error::Busy | rusb::Error::Access => Error::DeviceBusy,
            other => Error::Transport(other),
        })?;

        // The gspca kernel driver may own the interface; let libusb detach
        // it for the lifetime of our claim where the platform supports it.
        if let Err(e) = handle.set_auto_detach_kernel_driver(true) {
            debug!("auto-detach not supported: {}", e);
        }
        handle.claim_interface(0).map_err(|e| match e {
            rusb::Error::Busy => Error::DeviceBusy,
            other => Error::Transport(other),
        })?;

        let handle = Arc::new(handle);
        inner.regs = Some(Arc::new(Registers::new(Arc::clone(&handle))));
        inner.handle = Some(handle);
        info!("opened camera at {}", self.usb_port_path());
        Ok(())
    }

    /// Release the device. Idempotent; stops streaming first if needed.
    pub fn close(&self) {
        let mut inner = self.lock();
        Self::stop_locked(&mut inner);
        if let Some(handle) = inner.handle.take() {
            if let Err(e) = handle.release_interface(0) {
                debug!("release interface failed: {}", e);
            }
            info!("closed camera at {}", self.usb_port_path());
        }
        inner.regs = None;
        inner.mode = None;
    }

    /// Negotiate a capture mode and initialize the bridge and sensor.
    ///
    /// Only exact (width, height, fps) matches from the mode table are
    /// accepted; there is no nearest-fit fallback. Register application is
    /// best-effort, matching the tolerant bring-up of the hardware. The
    /// camera is left stopped.
    pub fn init(&self, width: u32, height: u32, fps: u16, format: OutputFormat) -> Result<()> {
        let mut inner = self.lock();
        if inner.stream.is_some() {
            return Err(Error::Configuration("cannot re-init while streaming".into()));
        }
        let regs = inner
            .regs
            .clone()
            .ok_or_else(|| Error::Configuration("init() requires an open device".into()))?;

        let (entry, rate) = modes::find_mode(width, height, fps).ok_or_else(|| {
            Error::Configuration(format!(
                "unsupported mode {}x{}@{}fps",
                width, height, fps
            ))
        })?;

        regs.select_sensor()?;

        // Sensor soft reset, then settle
        if let Err(e) = regs.sensor_write(0x12, 0x80) {
            debug!("sensor reset not acknowledged: {}", e);
        }
        std::thread::sleep(Duration::from_millis(10));

        regs.write_bridge_table(modes::BRIDGE_INIT);
        regs.write_sensor_table(modes::SENSOR_INIT);
        regs.write_bridge_table(entry.bridge_start);
        regs.write_sensor_table(entry.sensor_start);
        Self::write_rate(&regs, rate);

        inner.mode = Some(Mode {
            width,
            height,
            fps,
            format,
        });
        info!("initialized {}x{}@{}fps, {:?}", width, height, fps, format);
        Ok(())
    }

    /// Begin streaming.
    ///
    /// Requires a prior successful [`Camera::init`]; fails before any
    /// transfer resources are allocated otherwise. A second call while
    /// streaming is a no-op.
    pub fn start(&self) -> Result<()> {
        let mut inner = self.lock();
        if inner.stream.is_some() {
            return Ok(());
        }
        let mode = inner
            .mode
            .ok_or_else(|| Error::Configuration("start() requires a successful init()".into()))?;
        let (handle, regs) = match (inner.handle.clone(), inner.regs.clone()) {
            (Some(h), Some(r)) => (h, r),
            _ => return Err(Error::Configuration("start() requires an open device".into())),
        };

        Self::set_led(&regs, true);
        // Mode init rewrote the sensor; push the cached controls back
        inner.controls.apply_all(regs.as_ref())?;
        regs.bridge_write(REG_STREAM, STREAM_START)?;
        inner.stream = Some(StreamWorker::start(handle, mode));
        info!("streaming started");
        Ok(())
    }

    /// Stop streaming. Idempotent.
    ///
    /// When this returns, the capture thread has exited, any caller blocked
    /// in [`Camera::get_frame`] has been woken with [`Error::Stopped`], and
    /// the transfer pool is released.
    pub fn stop(&self) {
        let mut inner = self.lock();
        Self::stop_locked(&mut inner);
    }

    /// Retrieve the oldest completed frame, blocking until one is available
    /// or the stream stops.
    ///
    /// `out` must be exactly width × height × bytes-per-pixel of the
    /// negotiated format. Returns the frame's capture timestamp.
    pub fn get_frame(&self, out: &mut [u8]) -> Result<SystemTime> {
        let frames = {
            let inner = self.lock();
            let mode = inner
                .mode
                .ok_or_else(|| Error::Configuration("camera is not initialized".into()))?;
            let stream = inner
                .stream
                .as_ref()
                .ok_or_else(|| Error::Configuration("camera is not streaming".into()))?;
            if out.len() != mode.output_frame_size() {
                return Err(Error::Configuration(format!(
                    "output buffer is {} bytes, mode needs {}",
                    out.len(),
                    mode.output_frame_size()
                )));
            }
            stream.frames()
            // Lock released here so stop() can run while we wait
        };

        let frame = frames.recv_blocking().map_err(|_| Error::Stopped)?;
        out.copy_from_slice(&frame.data);
        Ok(frame.timestamp)
    }

    /// Change the frame rate of the negotiated mode.
    ///
    /// Fails while streaming; the rate must be in the mode table for the
    /// current resolution.
    pub fn set_frame_rate(&self, fps: u16) -> Result<()> {
        let mut inner = self.lock();
        if inner.stream.is_some() {
            return Err(Error::Configuration(
                "frame rate cannot change while streaming".into(),
            ));
        }
        let mode = inner
            .mode
            .ok_or_else(|| Error::Configuration("camera is not initialized".into()))?;
        let regs = inner
            .regs
            .clone()
            .ok_or_else(|| Error::Configuration("device not open".into()))?;
        let (_, rate) = modes::find_mode(mode.width, mode.height, fps).ok_or_else(|| {
            Error::Configuration(format!(
                "unsupported rate {}fps at {}x{}",
                fps, mode.width, mode.height
            ))
        })?;
        Self::write_rate(&regs, rate);
        inner.mode = Some(Mode { fps, ..mode });
        Ok(())
    }

    /// Stable textual identifier of the physical bus/port location
    pub fn usb_port_path(&self) -> String {
        let ports = self.device.port_numbers().unwrap_or_default();
        port_path_string(self.device.bus_number(), &ports)
    }

    pub fn is_open(&self) -> bool {
        self.lock().handle.is_some()
    }

    pub fn is_initialized(&self) -> bool {
        self.lock().mode.is_some()
    }

    pub fn is_streaming(&self) -> bool {
        self.lock().stream.is_some()
    }

    pub fn width(&self) -> u32 {
        self.lock().mode.map(|m| m.width).unwrap_or(0)
    }

    pub fn height(&self) -> u32 {
        self.lock().mode.map(|m| m.height).unwrap_or(0)
    }

    pub fn frame_rate(&self) -> u16 {
        self.lock().mode.map(|m| m.fps).unwrap_or(0)
    }

    /// Output bytes per frame for the negotiated mode, 0 before `init()`
    pub fn frame_size(&self) -> usize {
        self.lock().mode.map(|m| m.output_frame_size()).unwrap_or(0)
    }

    pub fn output_format(&self) -> Option<OutputFormat> {
        self.lock().mode.map(|m| m.format)
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().expect("camera mutex poisoned")
    }

    fn stop_locked(inner: &mut Inner) {
        let Some(mut stream) = inner.stream.take() else {
            return;
        };
        stream.stop();
        if let Some(regs) = &inner.regs {
            if let Err(e) = regs.bridge_write(REG_STREAM, STREAM_STOP) {
                debug!("stream stop register write failed: {}", e);
            }
            Self::set_led(regs, false);
        }
        info!("streaming stopped");
    }

    fn write_rate(regs: &Registers, rate: modes::RateEntry) {
        // Best-effort, like the init tables
        for (reg, val) in [(0x11u8, rate.r11), (0x0d, rate.r0d)] {
            if let Err(e) = regs.sensor_write(reg, val) {
                debug!("rate register {:#04x} write failed: {}", reg, e);
            }
        }
        if let Err(e) = regs.bridge_write(0xe5, rate.re5) {
            debug!("bridge clock register write failed: {}", e);
        }
    }

    fn set_led(regs: &Registers, on: bool) {
        let result = (|| -> Result<()> {
            let dir = regs.bridge_read(REG_LED_DIR)?;
            regs.bridge_write(REG_LED_DIR, dir | LED_BIT)?;
            let level = regs.bridge_read(REG_LED_LEVEL)?;
            let level = if on { level | LED_BIT } else { level & !LED_BIT };
            regs.bridge_write(REG_LED_LEVEL, level)?;
            if !on {
                let dir = regs.bridge_read(REG_LED_DIR)?;
                regs.bridge_write(REG_LED_DIR, dir & !LED_BIT)?;
            }
            Ok(())
        })();
        if let Err(e) = result {
            warn!("LED register access failed: {}", e);
        }
    }
}

// Control surface: getters return the cached logical value, setters update
// the cache and write through the register layer. A setter on a closed
// camera is a configuration error; an unacknowledged SCCB cycle is not.
macro_rules! control_pair {
    ($get:ident, $set:ident, $ty:ty, $doc:literal) => {
        #[doc = concat!("Cached ", $doc, " value")]
        pub fn $get(&self) -> $ty {
            self.lock().controls.$get
        }

        #[doc = concat!("Set ", $doc)]
        pub fn $set(&self, val: $ty) -> Result<()> {
            let mut inner = self.lock();
            let regs = inner
                .regs
                .clone()
                .ok_or_else(|| Error::Configuration("device not open".into()))?;
            inner.controls.$set(regs.as_ref(), val)
        }
    };
}

impl Camera {
    control_pair!(autogain, set_autogain, bool, "automatic gain control");
    control_pair!(auto_exposure, set_auto_exposure, bool, "automatic exposure");
    control_pair!(awb, set_auto_white_balance, bool, "automatic white balance");
    control_pair!(gain, set_gain, u8, "gain (0-63)");
    control_pair!(exposure, set_exposure, u8, "exposure");
    control_pair!(hue, set_hue, u8, "hue");
    control_pair!(sharpness, set_sharpness, u8, "sharpness");
    control_pair!(brightness, set_brightness, u8, "brightness");
    control_pair!(contrast, set_contrast, u8, "contrast");
    control_pair!(red_balance, set_red_balance, u8, "red balance");
    control_pair!(blue_balance, set_blue_balance, u8, "blue balance");
    control_pair!(green_balance, set_green_balance, u8, "green balance");

    pub fn flip_h(&self) -> bool {
        self.lock().controls.flip_h
    }

    pub fn flip_v(&self) -> bool {
        self.lock().controls.flip_v
    }

    /// Set both flip flags with a single register update
    pub fn set_flip(&self, horizontal: bool, vertical: bool) -> Result<()> {
        let mut inner = self.lock();
        let regs = inner
            .regs
            .clone()
            .ok_or_else(|| Error::Configuration("device not open".into()))?;
        inner.controls.set_flip(regs.as_ref(), horizontal, vertical)
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.close();
    }
}

fn port_path_string(bus: u8, ports: &[u8]) -> String {
    if ports.is_empty() {
        return format!("{}-0", bus);
    }
    let path: Vec<String> = ports.iter().map(|p| p.to_string()).collect();
    format!("{}-{}", bus, path.join("."))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_path_format() {
        assert_eq!(port_path_string(1, &[2, 4]), "1-2.4");
        assert_eq!(port_path_string(3, &[1]), "3-1");
        assert_eq!(port_path_string(2, &[]), "2-0");
    }

    #[test]
    fn test_port_path_stable() {
        // Identical inputs must produce identical identifiers
        assert_eq!(port_path_string(1, &[2, 4]), port_path_string(1, &[2, 4]));
        assert_ne!(port_path_string(1, &[2, 4]), port_path_string(1, &[2, 5]));
    }
}
