//! CSI-2 receiver errors.
//!
//! Errors returned by the control path and by the interrupt handler of the
//! receiver. They implement [`std::error::Error`], so they can be propagated
//! into [`anyhow::Error`] with `?`.

use crate::format::MbusCode;

/// CSI-2 receiver error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The receiver is not present in this ISP revision.
    DeviceUnavailable,
    /// The receiver or its PHY is active and cannot be reconfigured.
    Busy,
    /// The shared PHY is owned by another streamer.
    PhyInUse,
    /// The reset handshake did not complete within its retry budget.
    ///
    /// The register state of the receiver is indeterminate after this error.
    Timeout,
    /// The pixel code cannot be mapped to a physical format with the current
    /// routing and decompression settings.
    UnsupportedFormat(MbusCode),
    /// The link or pad does not exist or cannot be reconfigured.
    InvalidTopology,
    /// The interrupt status reported a transmission error.
    ///
    /// The value is the top-level interrupt status word.
    TransmissionError(u32),
}

impl Error {
    /// Returns the equivalent Linux errno (negative).
    pub fn as_errno(&self) -> i32 {
        match self {
            Error::DeviceUnavailable => -libc::ENODEV,
            Error::Busy | Error::PhyInUse => -libc::EBUSY,
            Error::Timeout => -libc::ETIMEDOUT,
            Error::UnsupportedFormat(_) | Error::InvalidTopology => -libc::EINVAL,
            Error::TransmissionError(_) => -libc::EIO,
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> Result<(), std::fmt::Error> {
        match self {
            Error::DeviceUnavailable => write!(f, "CSI-2 receiver not available"),
            Error::Busy => write!(f, "CSI-2 receiver busy"),
            Error::PhyInUse => write!(f, "CSI-2 PHY already in use"),
            Error::Timeout => write!(f, "CSI-2 reset timed out"),
            Error::UnsupportedFormat(code) => write!(f, "pixel format {code} unsupported"),
            Error::InvalidTopology => write!(f, "invalid link or pad"),
            Error::TransmissionError(status) => {
                write!(f, "transmission error (status {status:#010x})")
            }
        }
    }
}

impl std::error::Error for Error {}
