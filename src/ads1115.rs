//! ADS1115 16-bit ADC driver
//!
//! Conversions are two-phase: writing the config register with OS=1 starts
//! a single-shot conversion, the OS bit reads back as 1 once the result is
//! ready, and only then is the conversion register read. Start, polling and
//! result read all happen inside one bus transaction.

use tracing::debug;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::{decode_be, decode_response, CommandPacking, Decode, RegisterFirst};
use crate::device::{DeviceAddress, DriverConfig, I2cDevice};
use crate::error::Result;
use crate::poll::poll_until;

/// I2C address with ADDR tied to GND
pub const DEFAULT_ADDRESS: u8 = 0x48;

/// Pointer byte followed by a 16-bit register value
const PACKING: RegisterFirst = RegisterFirst { width: 2 };

// Config register fields
const CONFIG_OS: u16 = 0x8000;
const CONFIG_MUX_SHIFT: u16 = 12;
const CONFIG_PGA_SHIFT: u16 = 9;
const CONFIG_MODE_SINGLE_SHOT: u16 = 0x0100;
const CONFIG_DR_SHIFT: u16 = 5;
const CONFIG_COMP_QUE_DISABLE: u16 = 0x0003;

/// Register pointer values
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    Conversion = 0x00,
    Config = 0x01,
    LoThresh = 0x02,
    HiThresh = 0x03,
}

impl Register {
    pub const fn address(self) -> u8 {
        self as u8
    }
}

/// Input multiplexer setting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    /// AIN0 - AIN1
    Diff01,
    /// AIN0 - AIN3
    Diff03,
    /// AIN1 - AIN3
    Diff13,
    /// AIN2 - AIN3
    Diff23,
    /// AIN0 - GND
    Ain0,
    /// AIN1 - GND
    Ain1,
    /// AIN2 - GND
    Ain2,
    /// AIN3 - GND
    Ain3,
}

impl Channel {
    const fn mux(self) -> u16 {
        match self {
            Channel::Diff01 => 0,
            Channel::Diff03 => 1,
            Channel::Diff13 => 2,
            Channel::Diff23 => 3,
            Channel::Ain0 => 4,
            Channel::Ain1 => 5,
            Channel::Ain2 => 6,
            Channel::Ain3 => 7,
        }
    }

    /// Single-ended channel by index (0-3)
    pub fn single_ended(index: u8) -> Option<Channel> {
        match index {
            0 => Some(Channel::Ain0),
            1 => Some(Channel::Ain1),
            2 => Some(Channel::Ain2),
            3 => Some(Channel::Ain3),
            _ => None,
        }
    }
}

/// Programmable gain amplifier, named by full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Gain {
    /// ±6.144 V
    TwoThirds,
    /// ±4.096 V
    One,
    /// ±2.048 V
    #[default]
    Two,
    /// ±1.024 V
    Four,
    /// ±0.512 V
    Eight,
    /// ±0.256 V
    Sixteen,
}

impl Gain {
    const fn pga(self) -> u16 {
        match self {
            Gain::TwoThirds => 0,
            Gain::One => 1,
            Gain::Two => 2,
            Gain::Four => 3,
            Gain::Eight => 4,
            Gain::Sixteen => 5,
        }
    }

    pub const fn full_scale_volts(self) -> f32 {
        match self {
            Gain::TwoThirds => 6.144,
            Gain::One => 4.096,
            Gain::Two => 2.048,
            Gain::Four => 1.024,
            Gain::Eight => 0.512,
            Gain::Sixteen => 0.256,
        }
    }
}

/// Samples per second
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DataRate {
    Sps8,
    Sps16,
    Sps32,
    Sps64,
    #[default]
    Sps128,
    Sps250,
    Sps475,
    Sps860,
}

impl DataRate {
    const fn dr(self) -> u16 {
        match self {
            DataRate::Sps8 => 0,
            DataRate::Sps16 => 1,
            DataRate::Sps32 => 2,
            DataRate::Sps64 => 3,
            DataRate::Sps128 => 4,
            DataRate::Sps250 => 5,
            DataRate::Sps475 => 6,
            DataRate::Sps860 => 7,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Ads1115Config {
    pub gain: Gain,
    pub data_rate: DataRate,
}

impl Ads1115Config {
    /// Config register value that starts a single-shot conversion on `channel`
    pub fn conversion_word(&self, channel: Channel) -> u16 {
        CONFIG_OS
            | (channel.mux() << CONFIG_MUX_SHIFT)
            | (self.gain.pga() << CONFIG_PGA_SHIFT)
            | CONFIG_MODE_SINGLE_SHOT
            | (self.data_rate.dr() << CONFIG_DR_SHIFT)
            | CONFIG_COMP_QUE_DISABLE
    }
}

/// ADS1115 driver
pub struct Ads1115<T> {
    device: I2cDevice<T>,
    config: Ads1115Config,
    driver: DriverConfig,
}

impl<T: I2cTransport> Ads1115<T> {
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Self {
        Self::with_config(bus, address, Ads1115Config::default(), DriverConfig::default())
    }

    pub fn with_config(bus: SharedBus<T>, address: DeviceAddress, config: Ads1115Config, driver: DriverConfig) -> Self {
        Self {
            device: I2cDevice::new(bus, address),
            config,
            driver,
        }
    }

    pub fn config(&self) -> &Ads1115Config {
        &self.config
    }

    /// Run one single-shot conversion and return the signed raw result
    ///
    /// # Returns
    /// * `Ok(i16)` - Raw conversion result
    /// * `Err(SensorError::BusContentionTimeout)` - OS bit never came back
    pub fn read(&mut self, channel: Channel) -> Result<i16> {
        let start = PACKING.pack(
            Register::Config.address(),
            u32::from(self.config.conversion_word(channel)),
        );
        let completion = &self.driver.completion;

        let (raw, polls) = self.device.transaction(|t| {
            t.write(&start)?;

            let polls = poll_until(completion, "ADS1115 conversion", || {
                let mut status = [0u8; 2];
                t.read_register(Register::Config.address(), &mut status)?;
                Ok(decode_be(&status) as u16 & CONFIG_OS != 0)
            })?;

            let mut result = [0u8; 2];
            t.read_register(Register::Conversion.address(), &mut result)?;
            Ok((decode_response(&result, Decode::SIGNED_16) as i16, polls))
        })?;

        debug!(?channel, raw, polls, "ads1115 conversion");
        Ok(raw)
    }

    /// Convert and scale to volts using the configured gain
    pub fn read_voltage(&mut self, channel: Channel) -> Result<f32> {
        let raw = self.read(channel)?;
        Ok(raw_to_volts(raw, self.config.gain))
    }

    /// Write a 16-bit register, high byte first
    pub fn write_register(&mut self, register: Register, value: u16) -> Result<()> {
        self.device
            .write(&PACKING.pack(register.address(), u32::from(value)))
    }

    pub fn read_register(&mut self, register: Register) -> Result<u16> {
        let mut value = [0u8; 2];
        self.device.write_read(&[register.address()], &mut value)?;
        Ok(decode_be(&value) as u16)
    }
}

/// Raw conversion result to volts
pub fn raw_to_volts(raw: i16, gain: Gain) -> f32 {
    f32::from(raw) * gain.full_scale_volts() / 32768.0
}
