//! Honeywell MPRLS pressure sensor driver
//!
//! A read is command, busy-bit polling, then a four byte response: status
//! followed by a 24-bit pressure count. The whole exchange holds the bus.

use tracing::{debug, warn};

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::decode_be;
use crate::device::{DeviceAddress, DriverConfig, I2cDevice};
use crate::error::{Result, SensorError};
use crate::poll::poll_until;

pub const DEFAULT_ADDRESS: u8 = 0x18;

const COMMAND_READ: [u8; 3] = [0xAA, 0x00, 0x00];

const STATUS_BUSY: u8 = 0x20;
const STATUS_INTEGRITY_ERROR: u8 = 0x02;
const STATUS_SATURATION: u8 = 0x01;

/// Transfer function limits: 10 % and 90 % of 2^24 counts
pub const OUTPUT_MIN: u32 = 1_677_722;
pub const OUTPUT_MAX: u32 = 15_099_494;

pub const PASCAL_PER_PSI: f32 = 6894.76;

/// Calibrated pressure span of the part
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MprlsConfig {
    pub psi_min: f32,
    pub psi_max: f32,
}

impl Default for MprlsConfig {
    fn default() -> Self {
        Self {
            psi_min: 0.0,
            psi_max: 25.0,
        }
    }
}

impl MprlsConfig {
    /// Raw 24-bit count to PSI
    pub fn psi_from_raw(&self, raw: u32) -> f32 {
        let span = (OUTPUT_MAX - OUTPUT_MIN) as f32;
        (raw as f32 - OUTPUT_MIN as f32) * (self.psi_max - self.psi_min) / span + self.psi_min
    }
}

pub struct Mprls<T> {
    device: I2cDevice<T>,
    config: MprlsConfig,
    driver: DriverConfig,
}

impl<T: I2cTransport> Mprls<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self::with_config(bus, address, MprlsConfig::default(), DriverConfig::default())
    }

    pub fn with_config(bus: SharedBus<T>, address: DeviceAddress, config: MprlsConfig, driver: DriverConfig) -> Self {
        Self {
            device: I2cDevice::new(bus, address),
            config,
            driver,
        }
    }

    /// Raw 24-bit pressure count
    ///
    /// # Returns
    /// * `Ok(u32)` - Pressure count
    /// * `Err(SensorError::DeviceFault)` - Saturation or memory integrity flag set
    pub fn read_raw(&mut self) -> Result<u32> {
        let completion = &self.driver.completion;
        let mut response = [0u8; 4];

        self.device.transaction(|t| {
            t.write(&COMMAND_READ)?;

            poll_until(completion, "MPRLS conversion", || {
                let mut status = [0u8; 1];
                t.read_into(&mut status)?;
                Ok(status[0] & STATUS_BUSY == 0)
            })?;

            t.read_into(&mut response)
        })?;

        let status = response[0];
        if status & STATUS_SATURATION != 0 {
            warn!(status, "mprls math saturation");
            return Err(SensorError::DeviceFault("MPRLS math saturation".into()));
        }
        if status & STATUS_INTEGRITY_ERROR != 0 {
            warn!(status, "mprls integrity check failed");
            return Err(SensorError::DeviceFault("MPRLS memory integrity check failed".into()));
        }

        let raw = decode_be(&response[1..]);
        debug!(raw, "mprls count");
        Ok(raw)
    }

    pub fn read_psi(&mut self) -> Result<f32> {
        let raw = self.read_raw()?;
        Ok(self.config.psi_from_raw(raw))
    }

    /// Pressure in Pa
    pub fn read(&mut self) -> Result<f32> {
        Ok(self.read_psi()? * PASCAL_PER_PSI)
    }

    pub fn read_hpa(&mut self) -> Result<f32> {
        Ok(self.read()? / 100.0)
    }
}
