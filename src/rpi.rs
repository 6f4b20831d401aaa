//! Linux `/dev/i2c-N` transport built on rppal

use rppal::i2c::I2c;
use tracing::trace;

use crate::bus::I2cTransport;
use crate::error::{Result, SensorError};

/// One Linux I2C adapter
///
/// The kernel binds a slave address to the open file, so the transport
/// re-targets it only when consecutive transfers go to different devices.
#[derive(Debug)]
pub struct RppalTransport {
    i2c: I2c,
    target: Option<u8>,
}

impl RppalTransport {
    /// Open `/dev/i2c-<bus>`
    pub fn with_bus(bus: u8) -> Result<Self> {
        let i2c = I2c::with_bus(bus)?;
        trace!(bus, clock_speed = ?i2c.clock_speed().ok(), "opened i2c bus");
        Ok(Self { i2c, target: None })
    }

    fn target(&mut self, address: u8) -> Result<()> {
        if self.target != Some(address) {
            self.i2c.set_slave_address(u16::from(address))?;
            self.target = Some(address);
        }
        Ok(())
    }
}

impl I2cTransport for RppalTransport {
    fn write(&mut self, address: u8, bytes: &[u8]) -> Result<()> {
        self.target(address)?;
        let written = self.i2c.write(bytes)?;
        if written != bytes.len() {
            return Err(SensorError::TransferError {
                expected: bytes.len(),
                actual: written,
            });
        }
        Ok(())
    }

    fn read_into(&mut self, address: u8, buffer: &mut [u8]) -> Result<()> {
        self.target(address)?;
        let read = self.i2c.read(buffer)?;
        if read != buffer.len() {
            return Err(SensorError::TransferError {
                expected: buffer.len(),
                actual: read,
            });
        }
        Ok(())
    }

    fn write_read(&mut self, address: u8, bytes: &[u8], buffer: &mut [u8]) -> Result<()> {
        self.target(address)?;
        self.i2c.write_read(bytes, buffer)?;
        Ok(())
    }
}
