use std::io;

use thiserror::Error;

use crate::frame::Mnemonic;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// How the caller should react to an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Rejected locally; the guarded command never reached the device.
    Validation,
    /// The device answered NAK. The link is still in sync.
    Rejected,
    /// The link can no longer be trusted for this run.
    Communication,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("mnemonic must be exactly two ASCII characters, got {0:?}")]
    InvalidMnemonic(String),

    #[error("bus address out of range: group={group}, device={device} (0-99 each)")]
    InvalidAddress { group: u8, device: u8 },

    #[error("invalid command data for {mnemonic}: {reason}")]
    InvalidData {
        mnemonic: Mnemonic,
        reason: &'static str,
    },

    #[error("{what} {value} out of range [{min}, {max}]")]
    OutOfRange {
        what: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("{value} does not fit a {width}-character field")]
    FieldOverflow { value: f64, width: usize },

    #[error("precondition failed: {0}")]
    Precondition(&'static str),

    #[error("device rejected {mnemonic} command (NAK)")]
    Rejected { mnemonic: Mnemonic },

    #[error("serial port {port} unavailable: {source}")]
    TransportUnavailable {
        port: String,
        #[source]
        source: serialport::Error,
    },

    #[error("write failed: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("read failed: {0}")]
    ReadFailed(#[source] io::Error),

    #[error("no reply to {0} query")]
    NoReply(Mnemonic),

    #[error("checksum mismatch in {mnemonic} reply (check byte 0x{received:02X})")]
    ChecksumFailure { mnemonic: Mnemonic, received: u8 },

    #[error("unexpected acknowledgement byte 0x{0:02X}")]
    UnexpectedAck(u8),

    #[error("no acknowledgement for {0} command")]
    AckTimeout(Mnemonic),

    #[error("unexpected {mnemonic} reply: {payload:?}")]
    UnexpectedReply { mnemonic: Mnemonic, payload: String },

    #[error("interface status has reserved bits set: 0x{0:04X}")]
    ReservedBits(u16),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidMnemonic(_)
            | Self::InvalidAddress { .. }
            | Self::InvalidData { .. }
            | Self::OutOfRange { .. }
            | Self::FieldOverflow { .. }
            | Self::Precondition(_) => ErrorKind::Validation,
            Self::Rejected { .. } => ErrorKind::Rejected,
            Self::TransportUnavailable { .. }
            | Self::WriteFailed(_)
            | Self::ReadFailed(_)
            | Self::NoReply(_)
            | Self::ChecksumFailure { .. }
            | Self::UnexpectedAck(_)
            | Self::AckTimeout(_)
            | Self::UnexpectedReply { .. }
            | Self::ReservedBits(_) => ErrorKind::Communication,
        }
    }

    pub fn is_fatal(&self) -> bool {
        self.kind() == ErrorKind::Communication
    }

    pub(crate) fn out_of_range(what: &'static str, value: f64, min: f64, max: f64) -> Self {
        Self::OutOfRange {
            what,
            value,
            min,
            max,
        }
    }
}

/// Rejects NaN and values outside `[min, max]`.
pub(crate) fn check_range(what: &'static str, value: f64, min: f64, max: f64) -> Result<f64> {
    if value.is_nan() || value < min || value > max {
        return Err(Error::out_of_range(what, value, min, max));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::{check_range, Error, ErrorKind};
    use crate::constants::PV;

    #[test]
    fn classifies_validation_and_communication_errors() {
        assert_eq!(
            Error::Precondition("heater off").kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::Rejected { mnemonic: PV }.kind(), ErrorKind::Rejected);
        assert!(Error::NoReply(PV).is_fatal());
        assert!(!Error::Rejected { mnemonic: PV }.is_fatal());
    }

    #[test]
    fn check_range_rejects_nan_and_bounds() {
        assert!(check_range("power", f64::NAN, 0.0, 100.0).is_err());
        assert!(check_range("power", -0.1, 0.0, 100.0).is_err());
        let err = check_range("power", 100.5, 0.0, 100.0).expect_err("should fail");
        assert!(err.to_string().contains("power 100.5 out of range"));
        assert_eq!(check_range("power", 100.0, 0.0, 100.0).expect("in range"), 100.0);
    }
}
