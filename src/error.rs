//! Error types for the sensor bus and its drivers

use thiserror::Error;

/// Error type for bus and driver operations
#[derive(Error, Debug)]
pub enum SensorError {
    /// A busy-wait (bus lock or device completion flag) ran out of attempts or time
    #[error("Bus contention timeout: gave up waiting for {waiting_for} after {attempts} attempts")]
    BusContentionTimeout {
        waiting_for: &'static str,
        attempts: u32,
    },

    /// A busy-wait observed its cancellation flag
    #[error("Cancelled while waiting for {waiting_for}")]
    Cancelled { waiting_for: &'static str },

    /// Invalid parameter
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The underlying bus transport failed
    #[error("Transport failure: {0}")]
    TransportFailure(String),

    /// Data transfer error
    #[error("Data transfer error: expected {expected} bytes, transferred {actual}")]
    TransferError { expected: usize, actual: usize },

    /// Checksum carried by the device response does not match the payload
    #[error("CRC mismatch: device sent 0x{actual:02X}, computed 0x{expected:02X}")]
    CrcMismatch { expected: u8, actual: u8 },

    /// The device flagged an error in its status bits
    #[error("Device fault: {0}")]
    DeviceFault(String),

    /// Operation not allowed in the driver's current state
    #[error("Invalid state: expected {expected}, driver is {actual}")]
    InvalidState {
        expected: &'static str,
        actual: &'static str,
    },
}

#[cfg(feature = "rpi")]
impl From<rppal::i2c::Error> for SensorError {
    fn from(error: rppal::i2c::Error) -> Self {
        SensorError::TransportFailure(error.to_string())
    }
}

/// Result type for bus and driver operations
pub type Result<T> = std::result::Result<T, SensorError>;
