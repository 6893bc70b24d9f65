//! Userspace driver for the Sony PlayStation Eye camera
//!
//! The camera is an OmniVision OV7725 sensor behind an OV534 USB bridge.
//! This crate enumerates cameras, negotiates a capture mode from the
//! compiled-in mode table, programs the bridge and sensor registers,
//! reassembles the bulk payload stream into frames on a dedicated capture
//! thread, and exposes blocking frame retrieval plus the usual image
//! controls (gain, exposure, white balance, hue, sharpness, contrast,
//! brightness, flip).
//!
//! # Example
//!
//! ```no_run
//! use ps3eye::{Enumerator, OutputFormat};
//!
//! # fn main() -> ps3eye::Result<()> {
//! let mut enumerator = Enumerator::new()?;
//! let ids = enumerator.enumerate(false)?;
//! let cam = enumerator.camera(ids[0]).expect("stale id");
//!
//! cam.open()?;
//! cam.init(640, 480, 30, OutputFormat::Rgb)?;
//! cam.start()?;
//!
//! let mut frame = vec![0u8; cam.frame_size()];
//! let timestamp = cam.get_frame(&mut frame)?;
//! println!("frame captured at {:?}", timestamp);
//!
//! cam.stop();
//! cam.close();
//! # Ok(())
//! # }
//! ```

pub mod controls;
pub mod device;
pub mod error;
pub mod format;
pub mod manager;
pub mod modes;
pub mod registers;
pub mod stream;

pub use controls::encode_gain;
pub use device::Camera;
pub use error::{Error, Result};
pub use format::OutputFormat;
pub use manager::{CameraId, Enumerator, PRODUCT_ID, VENDOR_ID};
pub use modes::{supported_modes, Mode};
pub use registers::RegisterBus;
pub use stream::Frame;
