//! DS3231 real-time clock driver
//!
//! Time registers hold packed BCD. The hours register doubles as the mode
//! register: bit 6 selects 12-hour mode, and in that mode bit 5 is the PM
//! flag instead of the second tens bit.

use std::fmt;

use tracing::debug;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::{bcd_to_decimal, decimal_to_bcd};
use crate::device::{DeviceAddress, DriverConfig, I2cDevice};
use crate::error::Result;
use crate::poll::poll_until;

/// Fixed I2C address
pub const DEFAULT_ADDRESS: u8 = 0x68;

const HOURS_12H: u8 = 0x40;
const HOURS_PM: u8 = 0x20;
const HOURS_MODE_BITS: u8 = 0xC0;
const CONTROL_CONV: u8 = 0x20;
const STATUS_BSY: u8 = 0x04;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Seconds = 0x00,
    Minutes = 0x01,
    Hours = 0x02,
    Day = 0x03,
    Date = 0x04,
    MonthCentury = 0x05,
    Year = 0x06,
    Control = 0x0E,
    Status = 0x0F,
    TempMsb = 0x11,
    TempLsb = 0x12,
}

impl Register {
    pub const fn address(self) -> u8 {
        self as u8
    }
}

/// Time of day as stored on the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RtcTime {
    /// Clock-face hour: 0-23 in 24-hour mode, 1-12 in 12-hour mode
    pub hours: u8,
    pub minutes: u8,
    pub seconds: u8,
    /// `Some(is_pm)` in 12-hour mode
    pub pm: Option<bool>,
}

impl RtcTime {
    pub fn hours_24(&self) -> u8 {
        to_24_hour(self.hours, self.pm)
    }
}

impl fmt::Display for RtcTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}:{:02}", self.hours, self.minutes, self.seconds)?;
        match self.pm {
            Some(true) => write!(f, " PM"),
            Some(false) => write!(f, " AM"),
            None => Ok(()),
        }
    }
}

/// Split the hours register into clock-face hour and PM flag
fn decode_hours(raw: u8) -> (u8, Option<bool>) {
    let ones = raw & 0x0F;
    if raw & HOURS_12H != 0 {
        let tens = (raw >> 4) & 0x01;
        (tens * 10 + ones, Some(raw & HOURS_PM != 0))
    } else {
        let tens = (raw >> 4) & 0x03;
        (tens * 10 + ones, None)
    }
}

fn to_24_hour(hour: u8, pm: Option<bool>) -> u8 {
    match pm {
        None => hour,
        Some(false) => hour % 12,
        Some(true) => hour % 12 + 12,
    }
}

/// Hours register value for a 0-23 hour in the requested mode
fn encode_hours(hour_24: u8, twelve_hour: bool) -> u8 {
    if !twelve_hour {
        return decimal_to_bcd(hour_24);
    }
    let pm = if hour_24 >= 12 { HOURS_PM } else { 0 };
    let face = match hour_24 % 12 {
        0 => 12,
        hour => hour,
    };
    HOURS_12H | pm | decimal_to_bcd(face)
}

pub struct Ds3231<T> {
    device: I2cDevice<T>,
    driver: DriverConfig,
}

impl<T: I2cTransport> Ds3231<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self::with_driver_config(bus, address, DriverConfig::default())
    }

    pub fn with_driver_config(bus: SharedBus<T>, address: DeviceAddress, driver: DriverConfig) -> Self {
        Self {
            device: I2cDevice::new(bus, address),
            driver,
        }
    }

    fn read_byte(&self, register: Register) -> Result<u8> {
        let mut value = [0u8; 1];
        self.device.write_read(&[register.address()], &mut value)?;
        Ok(value[0])
    }

    pub fn read_seconds(&mut self) -> Result<u8> {
        Ok(bcd_to_decimal(self.read_byte(Register::Seconds)? & 0x7F))
    }

    pub fn read_minutes(&mut self) -> Result<u8> {
        Ok(bcd_to_decimal(self.read_byte(Register::Minutes)? & 0x7F))
    }

    /// Clock-face hour in whichever mode the clock is in
    pub fn read_hours(&mut self) -> Result<u8> {
        Ok(decode_hours(self.read_byte(Register::Hours)?).0)
    }

    /// Seconds, minutes and hours in a single burst read
    pub fn read_time(&mut self) -> Result<RtcTime> {
        let mut raw = [0u8; 3];
        self.device
            .write_read(&[Register::Seconds.address()], &mut raw)?;

        let (hours, pm) = decode_hours(raw[2]);
        Ok(RtcTime {
            hours,
            minutes: bcd_to_decimal(raw[1] & 0x7F),
            seconds: bcd_to_decimal(raw[0] & 0x7F),
            pm,
        })
    }

    /// Set the time of day from a 24-hour value
    ///
    /// The clock keeps its current 12/24-hour mode. Fields outside
    /// 0-23 / 0-59 / 0-59 follow the range policy: with `Ignore` only the
    /// valid fields are written, with `Reject` nothing is written.
    pub fn set_time(&mut self, hours: u8, minutes: u8, seconds: u8) -> Result<()> {
        let policy = self.driver.out_of_range;
        let write_hours = policy.admit("hours", hours, 0..=23)?;
        let write_minutes = policy.admit("minutes", minutes, 0..=59)?;
        let write_seconds = policy.admit("seconds", seconds, 0..=59)?;

        if !(write_hours || write_minutes || write_seconds) {
            return Ok(());
        }

        self.device.transaction(|t| {
            if write_hours {
                let mut current = [0u8; 1];
                t.read_register(Register::Hours.address(), &mut current)?;
                let twelve_hour = current[0] & HOURS_12H != 0;
                t.write(&[Register::Hours.address(), encode_hours(hours, twelve_hour)])?;
            }
            if write_minutes {
                t.write(&[Register::Minutes.address(), decimal_to_bcd(minutes)])?;
            }
            if write_seconds {
                t.write(&[Register::Seconds.address(), decimal_to_bcd(seconds)])?;
            }
            Ok(())
        })
    }

    pub fn set_12_hour_mode(&mut self) -> Result<()> {
        self.set_hour_mode(true)
    }

    pub fn set_24_hour_mode(&mut self) -> Result<()> {
        self.set_hour_mode(false)
    }

    fn set_hour_mode(&mut self, twelve_hour: bool) -> Result<()> {
        self.device.transaction(|t| {
            let mut current = [0u8; 1];
            t.read_register(Register::Hours.address(), &mut current)?;

            let (hour, pm) = decode_hours(current[0]);
            let updated = (current[0] & HOURS_MODE_BITS & !HOURS_12H)
                | encode_hours(to_24_hour(hour, pm), twelve_hour);
            debug!(from = current[0], to = updated, twelve_hour, "ds3231 hour mode");
            t.write(&[Register::Hours.address(), updated])
        })
    }

    /// Force a temperature conversion and wait for it to finish
    ///
    /// Waits for any running conversion (BSY), sets CONV, then waits for
    /// the device to clear CONV. Each poll is its own short transaction.
    pub fn update_temperature(&mut self) -> Result<()> {
        let completion = self.driver.completion.clone();

        poll_until(&completion, "DS3231 idle", || {
            Ok(self.read_byte(Register::Status)? & STATUS_BSY == 0)
        })?;

        self.device.transaction(|t| {
            let mut control = [0u8; 1];
            t.read_register(Register::Control.address(), &mut control)?;
            t.write(&[Register::Control.address(), control[0] | CONTROL_CONV])
        })?;

        let polls = poll_until(&completion, "DS3231 temperature conversion", || {
            Ok(self.read_byte(Register::Control)? & CONTROL_CONV == 0)
        })?;
        debug!(polls, "ds3231 temperature conversion done");
        Ok(())
    }

    /// Last converted die temperature in °C, 0.25 °C resolution
    pub fn read_temperature(&mut self) -> Result<f32> {
        let mut raw = [0u8; 2];
        self.device
            .write_read(&[Register::TempMsb.address()], &mut raw)?;
        Ok(temperature_from_raw(raw[0], raw[1]))
    }
}

/// Signed integer part plus quarter degrees from the top two bits of the LSB
pub fn temperature_from_raw(msb: u8, lsb: u8) -> f32 {
    f32::from(msb as i8) + f32::from(lsb >> 6) * 0.25
}
