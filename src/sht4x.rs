//! SHT4x humidity and temperature sensor driver
//!
//! Single-phase timed measurements: one command byte, a fixed wait, then a
//! six byte response of two words, each followed by its CRC-8.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::{crc8, decode_be};
use crate::device::{DeviceAddress, I2cDevice};
use crate::error::{Result, SensorError};

/// SHT40-AD1B address
pub const DEFAULT_ADDRESS: u8 = 0x44;

const CRC_POLYNOMIAL: u8 = 0x31;
const CRC_INIT: u8 = 0xFF;

const COMMAND_SERIAL_NUMBER: u8 = 0x89;
const COMMAND_SOFT_RESET: u8 = 0x94;

const DELAY_HIGH: Duration = Duration::from_micros(8_300);
const DELAY_MEDIUM: Duration = Duration::from_micros(4_500);
const DELAY_LOW: Duration = Duration::from_micros(4_500);
const HEATING_LONG: Duration = Duration::from_millis(1_100);
const HEATING_SHORT: Duration = Duration::from_millis(110);
const POWER_UP: Duration = Duration::from_millis(1);

/// Measurement repeatability
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Precision {
    #[default]
    High,
    Medium,
    Low,
}

impl Precision {
    const fn command(self) -> u8 {
        match self {
            Precision::High => 0xFD,
            Precision::Medium => 0xF6,
            Precision::Low => 0xE0,
        }
    }

    const fn delay(self) -> Duration {
        match self {
            Precision::High => DELAY_HIGH,
            Precision::Medium => DELAY_MEDIUM,
            Precision::Low => DELAY_LOW,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterPower {
    Milliwatts200,
    Milliwatts110,
    Milliwatts20,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterDuration {
    OneSecond,
    TenthSecond,
}

fn heater_command(power: HeaterPower, duration: HeaterDuration) -> u8 {
    match (power, duration) {
        (HeaterPower::Milliwatts200, HeaterDuration::OneSecond) => 0x39,
        (HeaterPower::Milliwatts200, HeaterDuration::TenthSecond) => 0x32,
        (HeaterPower::Milliwatts110, HeaterDuration::OneSecond) => 0x2F,
        (HeaterPower::Milliwatts110, HeaterDuration::TenthSecond) => 0x24,
        (HeaterPower::Milliwatts20, HeaterDuration::OneSecond) => 0x1E,
        (HeaterPower::Milliwatts20, HeaterDuration::TenthSecond) => 0x15,
    }
}

fn heater_delay(duration: HeaterDuration) -> Duration {
    DELAY_HIGH
        + match duration {
            HeaterDuration::OneSecond => HEATING_LONG,
            HeaterDuration::TenthSecond => HEATING_SHORT,
        }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Measurement {
    /// °C
    pub temperature: f32,
    /// %RH, not clamped
    pub humidity: f32,
    pub raw_temperature: u16,
    pub raw_humidity: u16,
}

impl Measurement {
    fn from_words(raw_temperature: u16, raw_humidity: u16) -> Self {
        Self {
            temperature: temperature_from_raw(raw_temperature),
            humidity: humidity_from_raw(raw_humidity),
            raw_temperature,
            raw_humidity,
        }
    }
}

pub fn temperature_from_raw(raw: u16) -> f32 {
    -45.0 + 175.0 * f32::from(raw) / 65535.0
}

pub fn humidity_from_raw(raw: u16) -> f32 {
    -6.0 + 125.0 * f32::from(raw) / 65535.0
}

/// Split a six byte response into its two words, verifying each CRC
fn checked_words(response: &[u8; 6]) -> Result<(u16, u16)> {
    let mut words = [0u16; 2];
    for (word, chunk) in words.iter_mut().zip(response.chunks_exact(3)) {
        let expected = crc8(&chunk[..2], CRC_POLYNOMIAL, CRC_INIT);
        if expected != chunk[2] {
            return Err(SensorError::CrcMismatch {
                expected,
                actual: chunk[2],
            });
        }
        *word = decode_be(&chunk[..2]) as u16;
    }
    Ok((words[0], words[1]))
}

pub struct Sht4x<T> {
    device: I2cDevice<T>,
}

impl<T: I2cTransport> Sht4x<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self {
            device: I2cDevice::new(bus, address),
        }
    }

    /// Write `command`, wait `delay` with the bus held, read the response
    fn command_response(&mut self, command: u8, delay: Duration) -> Result<(u16, u16)> {
        let mut response = [0u8; 6];
        self.device.transaction(|t| {
            t.write(&[command])?;
            thread::sleep(delay);
            t.read_into(&mut response)
        })?;
        checked_words(&response)
    }

    pub fn measure(&mut self, precision: Precision) -> Result<Measurement> {
        let (temperature, humidity) = self.command_response(precision.command(), precision.delay())?;
        let measurement = Measurement::from_words(temperature, humidity);
        debug!(?precision, ?measurement, "sht4x measurement");
        Ok(measurement)
    }

    /// Fire the on-chip heater, then take a high precision measurement
    pub fn measure_with_heater(&mut self, power: HeaterPower, duration: HeaterDuration) -> Result<Measurement> {
        let (temperature, humidity) =
            self.command_response(heater_command(power, duration), heater_delay(duration))?;
        Ok(Measurement::from_words(temperature, humidity))
    }

    /// 32-bit serial number, first word most significant
    pub fn read_serial_number(&mut self) -> Result<u32> {
        let (high, low) = self.command_response(COMMAND_SERIAL_NUMBER, DELAY_HIGH)?;
        Ok((u32::from(high) << 16) | u32::from(low))
    }

    pub fn soft_reset(&mut self) -> Result<()> {
        self.device.write(&[COMMAND_SOFT_RESET])?;
        thread::sleep(POWER_UP);
        Ok(())
    }
}
