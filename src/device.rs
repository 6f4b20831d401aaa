//! Common plumbing for every peripheral driver
//!
//! A driver owns an [`I2cDevice`]: a fixed 7-bit address plus a clone of the
//! shared bus. Each public driver operation runs as one
//! [`I2cDevice::transaction`], so command and response bytes for a device
//! are never interleaved with another caller's traffic.

use std::fmt;
use std::ops::RangeInclusive;

use tracing::{trace, warn};

use crate::bus::{BusGuard, I2cTransport, SharedBus};
use crate::error::{Result, SensorError};
use crate::poll::PollPolicy;

/// Largest valid 7-bit I2C address
pub const MAX_ADDRESS: u8 = 0x7F;

/// 7-bit I2C device address
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Validate a 7-bit address
    pub fn new(address: u8) -> Result<Self> {
        if address > MAX_ADDRESS {
            return Err(SensorError::InvalidParameter(format!(
                "I2C address must be 7-bit, got 0x{:02X}",
                address
            )));
        }
        Ok(Self(address))
    }

    /// Raw address value
    pub const fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for DeviceAddress {
    type Error = SensorError;

    fn try_from(address: u8) -> Result<Self> {
        Self::new(address)
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// What a driver does with a write value outside the device's valid span
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RangePolicy {
    /// Skip the write silently (logged at `warn`)
    #[default]
    Ignore,
    /// Fail with [`SensorError::InvalidParameter`]
    Reject,
}

impl RangePolicy {
    /// Returns `Ok(true)` when `value` may be sent, `Ok(false)` when the
    /// write must be skipped. No bus traffic happens either way.
    pub(crate) fn admit<V>(self, what: &str, value: V, range: RangeInclusive<V>) -> Result<bool>
    where
        V: PartialOrd + fmt::Display,
    {
        if range.contains(&value) {
            return Ok(true);
        }

        match self {
            RangePolicy::Ignore => {
                warn!(
                    "ignoring {} = {}: outside {}..={}",
                    what,
                    value,
                    range.start(),
                    range.end()
                );
                Ok(false)
            }
            RangePolicy::Reject => Err(SensorError::InvalidParameter(format!(
                "{} must be {}..={}, got {}",
                what,
                range.start(),
                range.end(),
                value
            ))),
        }
    }
}

/// Per-driver behaviour knobs
#[derive(Debug, Clone, Default)]
pub struct DriverConfig {
    /// Limits for device completion polling (ready/busy flags)
    pub completion: PollPolicy,
    /// Handling of out-of-range write values
    pub out_of_range: RangePolicy,
}

/// One device on a shared bus
pub struct I2cDevice<T> {
    bus: SharedBus<T>,
    address: DeviceAddress,
}

impl<T> Clone for I2cDevice<T> {
    fn clone(&self) -> Self {
        Self {
            bus: self.bus.clone(),
            address: self.address,
        }
    }
}

impl<T: I2cTransport> I2cDevice<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self { bus, address }
    }

    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn bus(&self) -> &SharedBus<T> {
        &self.bus
    }

    /// Run `operation` inside one bus guard scope
    ///
    /// The lock is taken before the first byte and released after
    /// `operation` returns, whatever it returns.
    pub fn transaction<R, F>(&self, operation: F) -> Result<R>
    where
        F: FnOnce(&mut Transaction<'_, T>) -> Result<R>,
    {
        let mut transaction = Transaction {
            guard: self.bus.acquire()?,
            address: self.address,
        };
        operation(&mut transaction)
    }

    /// Single write in its own transaction
    pub fn write(&self, bytes: &[u8]) -> Result<()> {
        self.transaction(|t| t.write(bytes))
    }

    /// Single read in its own transaction
    pub fn read_into(&self, buffer: &mut [u8]) -> Result<()> {
        self.transaction(|t| t.read_into(buffer))
    }

    /// Write then read in one transaction
    pub fn write_read(&self, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.transaction(|t| t.write_read(bytes, buffer))
    }
}

/// Bus access bound to one device address, valid while the lock is held
pub struct Transaction<'a, T> {
    guard: BusGuard<'a, T>,
    address: DeviceAddress,
}

impl<T: I2cTransport> Transaction<'_, T> {
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        trace!(address = %self.address, ?bytes, "i2c write");
        self.guard.write(self.address.get(), bytes)
    }

    pub fn read_into(&mut self, buffer: &mut [u8]) -> Result<()> {
        self.guard.read_into(self.address.get(), buffer)?;
        trace!(address = %self.address, len = buffer.len(), "i2c read");
        Ok(())
    }

    pub fn write_read(&mut self, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        trace!(address = %self.address, ?bytes, len = buffer.len(), "i2c write_read");
        self.guard.write_read(self.address.get(), bytes, buffer)
    }

    /// Point the device at `register` and read `buffer.len()` bytes from it
    pub fn read_register(&mut self, register: u8, buffer: &mut [u8]) -> Result<()> {
        self.write_read(&[register], buffer)
    }
}
