//! Driver error types

use thiserror::Error;

/// Errors surfaced by the driver
#[derive(Debug, Error)]
pub enum Error {
    /// Underlying USB transfer failure
    #[error("USB transport error: {0}")]
    Transport(#[from] rusb::Error),

    /// The sensor's SCCB protocol never reached the ready state within the
    /// bounded poll count. Non-fatal: the setting is simply not applied.
    #[error("sensor protocol timeout on register {reg:#04x}")]
    ProtocolTimeout { reg: u8 },

    /// Device already claimed by this process or another
    #[error("device is busy")]
    DeviceBusy,

    /// Unsupported mode or operation ordering violation
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The stream was stopped while a caller was waiting for a frame
    #[error("stream stopped")]
    Stopped,
}

impl Error {
    /// Protocol timeouts are tolerated during bring-up and control writes;
    /// everything else is a hard failure.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Error::ProtocolTimeout { .. })
    }
}

/// Type alias for driver results
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::ProtocolTimeout { reg: 0x13 };
        let msg = format!("{}", err);
        assert!(msg.contains("0x13"));

        let err = Error::Configuration("start() before init()".into());
        assert!(format!("{}", err).contains("start() before init()"));
    }

    #[test]
    fn test_fatality() {
        assert!(!Error::ProtocolTimeout { reg: 0 }.is_fatal());
        assert!(Error::DeviceBusy.is_fatal());
        assert!(Error::Transport(rusb::Error::Io).is_fatal());
    }
}
