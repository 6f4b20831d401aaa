//! MLX90614 infrared thermometer driver
//!
//! SMBus read-word: the command byte selects a RAM or EEPROM cell and the
//! device answers low byte, high byte, then a PEC byte covering the whole
//! exchange including both address bytes.

use tracing::warn;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::crc8;
use crate::device::{DeviceAddress, I2cDevice};
use crate::error::{Result, SensorError};

/// Factory SMBus address
pub const DEFAULT_ADDRESS: u8 = 0x5A;

const PEC_POLYNOMIAL: u8 = 0x07;
const EEPROM_ACCESS: u8 = 0x20;
const ERROR_FLAG: u16 = 0x8000;

const KELVIN_PER_LSB: f32 = 0.02;
const ZERO_CELSIUS_KELVIN: f32 = 273.15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ram {
    Ambient = 0x06,
    Object1 = 0x07,
    Object2 = 0x08,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eeprom {
    ObjectMax = 0x00,
    ObjectMin = 0x01,
    PwmControl = 0x02,
    AmbientRange = 0x03,
    Emissivity = 0x04,
    Config1 = 0x05,
    SmbusAddress = 0x0E,
}

pub fn celsius_from_raw(raw: u16) -> f32 {
    f32::from(raw) * KELVIN_PER_LSB - ZERO_CELSIUS_KELVIN
}

pub struct Mlx90614<T> {
    device: I2cDevice<T>,
}

impl<T: I2cTransport> Mlx90614<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self {
            device: I2cDevice::new(bus, address),
        }
    }

    /// Read one word and verify its PEC
    fn read_word(&mut self, command: u8) -> Result<u16> {
        let mut response = [0u8; 3];
        self.device.write_read(&[command], &mut response)?;

        let address = self.device.address().get() << 1;
        let expected = crc8(
            &[address, command, address | 1, response[0], response[1]],
            PEC_POLYNOMIAL,
            0,
        );
        if expected != response[2] {
            return Err(SensorError::CrcMismatch {
                expected,
                actual: response[2],
            });
        }

        Ok(u16::from_le_bytes([response[0], response[1]]))
    }

    fn read_temperature(&mut self, cell: Ram) -> Result<f32> {
        let raw = self.read_word(cell as u8)?;
        if raw & ERROR_FLAG != 0 {
            warn!(?cell, raw, "mlx90614 error flag set");
            return Err(SensorError::DeviceFault(format!(
                "MLX90614 flagged {:?} reading 0x{:04X}",
                cell, raw
            )));
        }
        Ok(celsius_from_raw(raw))
    }

    /// Die temperature in °C
    pub fn read_ambient(&mut self) -> Result<f32> {
        self.read_temperature(Ram::Ambient)
    }

    /// Object temperature in °C from the first IR channel
    pub fn read_object1(&mut self) -> Result<f32> {
        self.read_temperature(Ram::Object1)
    }

    /// Object temperature in °C from the second IR channel (dual-zone parts)
    pub fn read_object2(&mut self) -> Result<f32> {
        self.read_temperature(Ram::Object2)
    }

    pub fn read_eeprom(&mut self, cell: Eeprom) -> Result<u16> {
        self.read_word(EEPROM_ACCESS | cell as u8)
    }

    /// Configured emissivity, 0.0-1.0
    pub fn read_emissivity(&mut self) -> Result<f32> {
        Ok(f32::from(self.read_eeprom(Eeprom::Emissivity)?) / 65535.0)
    }
}
