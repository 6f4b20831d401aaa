//! ICM-20948 9-axis IMU driver: register banks and accelerometer FIFO
//!
//! The ICM-20948 maps four register banks onto the same address range and
//! selects between them with `REG_BANK_SEL` (0x7F, present in every bank).
//! The selected bank lives only on the chip: a device reset, another driver
//! instance or another process on the same bus can change it at any time.
//! This driver therefore never remembers the bank. Every access writes
//! `REG_BANK_SEL` first, inside the same bus transaction as the access itself.
//!
//! Lifecycle:
//!
//! ```text
//! UNINITIALIZED --reset()--> RESET --configure()--> CONFIGURED --read_fifo()--> STREAMING
//!       any state --reset()--> RESET
//! ```
//!
//! The FIFO is not self-clearing. [`Icm20948::read_fifo`] always resets it
//! after draining so the next drain starts from empty.

use std::fmt;
use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::{decode_be, encode_write, to_signed16};
use crate::device::{DeviceAddress, I2cDevice, Transaction};
use crate::error::{Result, SensorError};

/// I2C address with AD0 low
pub const DEFAULT_ADDRESS: u8 = 0x68;

/// I2C address with AD0 high
pub const ALTERNATE_ADDRESS: u8 = 0x69;

/// Expected `WHO_AM_I` value
pub const WHO_AM_I_VALUE: u8 = 0xEA;

/// Capacity of the hardware FIFO in bytes
pub const FIFO_SIZE: usize = 4096;

/// Bytes per accelerometer-only FIFO record (X, Y, Z, 16-bit each)
pub const ACCEL_RECORD_SIZE: usize = 6;

/// Time the device needs after a soft reset
pub const RESET_SETTLE: Duration = Duration::from_millis(10);

/// Largest value of the 12-bit accelerometer sample-rate divider
pub const MAX_SAMPLE_RATE_DIVIDER: u16 = 0x0FFF;

// PWR_MGMT_1 bits
const PWR_MGMT_1_DEVICE_RESET: u8 = 0x80;
const PWR_MGMT_1_SLEEP: u8 = 0x40;
const PWR_MGMT_1_TEMP_DIS: u8 = 0x08;
const PWR_MGMT_1_CLKSEL_AUTO: u8 = 0x01;

// USER_CTRL bits
const USER_CTRL_FIFO_EN: u8 = 0x40;

// PWR_MGMT_2: gyro X/Y/Z off
const PWR_MGMT_2_DISABLE_GYRO: u8 = 0x07;

// INT_ENABLE_2 / INT_STATUS_2 FIFO overflow bits
const INT_ENABLE_2_FIFO_OVERFLOW_EN: u8 = 0x01;
const INT_STATUS_2_FIFO_OVERFLOW: u8 = 0x1F;

// FIFO_EN_2 bits
const FIFO_EN_2_ACCEL: u8 = 0x10;

// FIFO_MODE: snapshot (stop writing when full)
const FIFO_MODE_SNAPSHOT: u8 = 0x01;

// FIFO_RST sequence
const FIFO_RST_ASSERT: u8 = 0x01;
const FIFO_RST_CLEAR: u8 = 0x00;

// ODR_ALIGN_EN
const ODR_ALIGN_ON: u8 = 0x01;

// ACCEL_CONFIG bits
const ACCEL_CONFIG_FCHOICE: u8 = 0x01;

/// Accelerometer internal sample rate before the divider
const ACCEL_BASE_RATE_HZ: f32 = 1125.0;

/// User register bank
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Bank {
    Ub0 = 0,
    Ub1 = 1,
    Ub2 = 2,
    Ub3 = 3,
}

impl Bank {
    pub const ALL: [Bank; 4] = [Bank::Ub0, Bank::Ub1, Bank::Ub2, Bank::Ub3];

    /// Value written to `REG_BANK_SEL` (bank number in bits 5:4)
    pub const fn select_value(self) -> u8 {
        (self as u8) << 4
    }
}

/// Registers used by this driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Register {
    WhoAmI,
    UserCtrl,
    PwrMgmt1,
    PwrMgmt2,
    IntEnable2,
    IntStatus2,
    AccelXoutH,
    FifoEn2,
    FifoRst,
    FifoMode,
    FifoCountH,
    FifoRw,
    AccelSmplrtDiv1,
    AccelSmplrtDiv2,
    OdrAlignEn,
    AccelConfig,
    RegBankSel,
}

impl Register {
    pub const fn address(self) -> u8 {
        match self {
            Register::WhoAmI => 0x00,
            Register::UserCtrl => 0x03,
            Register::PwrMgmt1 => 0x06,
            Register::PwrMgmt2 => 0x07,
            Register::IntEnable2 => 0x12,
            Register::IntStatus2 => 0x1B,
            Register::AccelXoutH => 0x2D,
            Register::FifoEn2 => 0x67,
            Register::FifoRst => 0x68,
            Register::FifoMode => 0x69,
            Register::FifoCountH => 0x70,
            Register::FifoRw => 0x72,
            Register::AccelSmplrtDiv1 => 0x10,
            Register::AccelSmplrtDiv2 => 0x11,
            Register::OdrAlignEn => 0x09,
            Register::AccelConfig => 0x14,
            Register::RegBankSel => 0x7F,
        }
    }

    /// Bank the register lives in; `None` for `REG_BANK_SEL`, which is in all of them
    pub const fn bank(self) -> Option<Bank> {
        match self {
            Register::RegBankSel => None,
            Register::AccelSmplrtDiv1
            | Register::AccelSmplrtDiv2
            | Register::OdrAlignEn
            | Register::AccelConfig => Some(Bank::Ub2),
            _ => Some(Bank::Ub0),
        }
    }
}

/// Driver lifecycle state
///
/// Bank selection is not part of this state; it is re-issued
/// on every access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImuState {
    Uninitialized,
    Reset,
    Configured,
    Streaming,
}

impl ImuState {
    pub const fn name(self) -> &'static str {
        match self {
            ImuState::Uninitialized => "UNINITIALIZED",
            ImuState::Reset => "RESET",
            ImuState::Configured => "CONFIGURED",
            ImuState::Streaming => "STREAMING",
        }
    }
}

impl fmt::Display for ImuState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Accelerometer full-scale range
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AccelRange {
    #[default]
    G2,
    G4,
    G8,
    G16,
}

impl AccelRange {
    /// `ACCEL_FS_SEL` field value
    pub const fn fs_sel(self) -> u8 {
        match self {
            AccelRange::G2 => 0,
            AccelRange::G4 => 1,
            AccelRange::G8 => 2,
            AccelRange::G16 => 3,
        }
    }

    pub const fn lsb_per_g(self) -> f32 {
        match self {
            AccelRange::G2 => 16384.0,
            AccelRange::G4 => 8192.0,
            AccelRange::G8 => 4096.0,
            AccelRange::G16 => 2048.0,
        }
    }
}

/// Accelerometer configuration applied by [`Icm20948::configure`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Icm20948Config {
    /// Output rate = 1125 Hz / (1 + divider), 12-bit
    pub sample_rate_divider: u16,
    pub accel_range: AccelRange,
    /// `ACCEL_DLPFCFG` field (0-7)
    pub accel_dlpf: u8,
}

impl Default for Icm20948Config {
    /// 102 Hz, ±2g, DLPF setting 0
    fn default() -> Self {
        Self {
            sample_rate_divider: 10,
            accel_range: AccelRange::G2,
            accel_dlpf: 0,
        }
    }
}

impl Icm20948Config {
    pub fn sample_rate_hz(&self) -> f32 {
        ACCEL_BASE_RATE_HZ / (1.0 + f32::from(self.sample_rate_divider))
    }

    fn validate(&self) -> Result<()> {
        if self.sample_rate_divider > MAX_SAMPLE_RATE_DIVIDER {
            return Err(SensorError::InvalidParameter(format!(
                "Sample rate divider must be 0-{}, got {}",
                MAX_SAMPLE_RATE_DIVIDER, self.sample_rate_divider
            )));
        }
        if self.accel_dlpf > 7 {
            return Err(SensorError::InvalidParameter(format!(
                "Accelerometer DLPF setting must be 0-7, got {}",
                self.accel_dlpf
            )));
        }
        Ok(())
    }

    fn accel_config_byte(&self) -> u8 {
        (self.accel_dlpf << 3) | (self.accel_range.fs_sel() << 1) | ACCEL_CONFIG_FCHOICE
    }
}

/// Raw accelerometer reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccelData {
    pub x: i16,
    pub y: i16,
    pub z: i16,
}

impl AccelData {
    fn from_be_bytes(bytes: &[u8]) -> Self {
        let axis = |offset: usize| to_signed16(decode_be(&bytes[offset..offset + 2])) as i16;
        Self {
            x: axis(0),
            y: axis(2),
            z: axis(4),
        }
    }

    /// Convert to g for the given full-scale range
    pub fn to_g(&self, range: AccelRange) -> (f32, f32, f32) {
        let scale = range.lsb_per_g();
        (
            f32::from(self.x) / scale,
            f32::from(self.y) / scale,
            f32::from(self.z) / scale,
        )
    }
}

/// Result of one FIFO drain
///
/// Only the first [`length`](Self::length) bytes of the buffer are samples
/// from this drain; anything after that is left over from earlier drains.
#[derive(Debug, Clone, Copy)]
pub struct FifoRead<'a> {
    buffer: &'a [u8; FIFO_SIZE],
    length: u16,
}

impl<'a> FifoRead<'a> {
    /// FIFO byte count reported by the device
    pub fn length(&self) -> u16 {
        self.length
    }

    /// The whole scratch buffer
    pub fn buffer(&self) -> &'a [u8; FIFO_SIZE] {
        self.buffer
    }

    /// The bytes that belong to this drain
    pub fn valid_bytes(&self) -> &'a [u8] {
        let buffer: &'a [u8; FIFO_SIZE] = self.buffer;
        &buffer[..usize::from(self.length).min(FIFO_SIZE)]
    }

    /// Decode complete accelerometer records; a trailing partial record is ignored
    pub fn accel_samples(&self) -> impl Iterator<Item = AccelData> + 'a {
        self.valid_bytes()
            .chunks_exact(ACCEL_RECORD_SIZE)
            .map(AccelData::from_be_bytes)
    }

    pub fn sample_count(&self) -> usize {
        self.valid_bytes().len() / ACCEL_RECORD_SIZE
    }
}

/// ICM-20948 driver
pub struct Icm20948<T> {
    device: I2cDevice<T>,
    config: Icm20948Config,
    state: ImuState,
    fifo_buffer: Box<[u8; FIFO_SIZE]>,
}

impl<T: I2cTransport> Icm20948<T> {
    /// Create the driver and bring the device up with the default configuration
    ///
    /// Runs [`reset`](Self::reset) then [`configure`](Self::configure).
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Result<Self> {
        Self::with_config(bus, address, Icm20948Config::default())
    }

    /// Create the driver and bring the device up with `config`
    pub fn with_config(bus: SharedBus<T>, address: DeviceAddress, config: Icm20948Config) -> Result<Self> {
        let mut imu = Self::unconfigured(bus, address, config)?;
        imu.init()?;
        Ok(imu)
    }

    /// Create the driver without touching the bus
    pub fn unconfigured(bus: SharedBus<T>, address: DeviceAddress, config: Icm20948Config) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            device: I2cDevice::new(bus, address),
            config,
            state: ImuState::Uninitialized,
            fifo_buffer: Box::new([0; FIFO_SIZE]),
        })
    }

    /// Reset and configure
    pub fn init(&mut self) -> Result<()> {
        self.reset()?;
        self.configure()
    }

    pub fn state(&self) -> ImuState {
        self.state
    }

    pub fn config(&self) -> &Icm20948Config {
        &self.config
    }

    pub fn address(&self) -> DeviceAddress {
        self.device.address()
    }

    fn transition(&mut self, next: ImuState) {
        if self.state != next {
            debug!(address = %self.device.address(), from = %self.state, to = %next, "imu state");
            self.state = next;
        }
    }

    /// Soft-reset the device and wait for it to settle
    ///
    /// Allowed from any state. The bus is released during the settle delay.
    pub fn reset(&mut self) -> Result<()> {
        self.device.transaction(|t| {
            write_banked(t, Bank::Ub0, &[(Register::PwrMgmt1, PWR_MGMT_1_DEVICE_RESET)])
        })?;
        thread::sleep(RESET_SETTLE);

        self.transition(ImuState::Reset);
        Ok(())
    }

    /// Power, FIFO and accelerometer setup; only valid straight after a reset
    ///
    /// A transport failure part-way through leaves the device partially
    /// configured and the driver in RESET; run [`init`](Self::init) again.
    pub fn configure(&mut self) -> Result<()> {
        if self.state != ImuState::Reset {
            return Err(SensorError::InvalidState {
                expected: ImuState::Reset.name(),
                actual: self.state.name(),
            });
        }

        let config = self.config;
        self.device.transaction(|t| {
            write_banked(
                t,
                Bank::Ub0,
                &[
                    (Register::PwrMgmt1, PWR_MGMT_1_TEMP_DIS | PWR_MGMT_1_CLKSEL_AUTO),
                    (Register::UserCtrl, USER_CTRL_FIFO_EN),
                    (Register::PwrMgmt2, PWR_MGMT_2_DISABLE_GYRO),
                    (Register::IntEnable2, INT_ENABLE_2_FIFO_OVERFLOW_EN),
                    (Register::FifoEn2, FIFO_EN_2_ACCEL),
                    (Register::FifoMode, FIFO_MODE_SNAPSHOT),
                ],
            )?;

            select_bank(t, Bank::Ub2)?;
            // DIV_1 holds bits 11:8, DIV_2 bits 7:0; the device auto-increments
            let divider = encode_write(
                Register::AccelSmplrtDiv1.address(),
                u32::from(config.sample_rate_divider),
                2,
            );
            t.write(&divider)?;
            t.write(&[Register::OdrAlignEn.address(), ODR_ALIGN_ON])?;
            t.write(&[Register::AccelConfig.address(), config.accel_config_byte()])?;

            reset_fifo_in(t)
        })?;

        self.transition(ImuState::Configured);
        Ok(())
    }

    /// Write `REG_BANK_SEL`, unconditionally
    pub fn select_bank(&mut self, bank: Bank) -> Result<()> {
        self.device.transaction(|t| select_bank(t, bank))
    }

    /// Discard everything in the FIFO
    pub fn reset_fifo(&mut self) -> Result<()> {
        self.device.transaction(reset_fifo_in)
    }

    /// Drain the FIFO into the scratch buffer, then reset it
    ///
    /// The reset is attempted even when the drain fails; the first error
    /// wins.
    pub fn read_fifo(&mut self) -> Result<FifoRead<'_>> {
        let buffer = &mut self.fifo_buffer;
        let length = self.device.transaction(|t| {
            let drained = drain_fifo(t, buffer);
            let reset = reset_fifo_in(t);
            let length = drained?;
            reset?;
            Ok(length)
        })?;

        if self.state == ImuState::Configured {
            self.transition(ImuState::Streaming);
        }

        Ok(FifoRead {
            buffer: &self.fifo_buffer,
            length,
        })
    }

    /// Read the instantaneous accelerometer output registers (not the FIFO)
    pub fn read_accel(&mut self) -> Result<AccelData> {
        let mut raw = [0u8; 6];
        self.device.transaction(|t| {
            select_bank(t, Bank::Ub0)?;
            t.read_register(Register::AccelXoutH.address(), &mut raw)
        })?;
        Ok(AccelData::from_be_bytes(&raw))
    }

    /// Read one byte from `register` in `bank`
    pub fn read_register(&mut self, bank: Bank, register: u8) -> Result<u8> {
        let mut value = [0u8];
        self.device.transaction(|t| {
            select_bank(t, bank)?;
            t.read_register(register, &mut value)
        })?;
        Ok(value[0])
    }

    pub fn who_am_i(&mut self) -> Result<u8> {
        self.read_register(Bank::Ub0, Register::WhoAmI.address())
    }

    /// Set or clear the sleep bit, leaving the rest of `PWR_MGMT_1` intact
    pub fn set_sleep(&mut self, sleep: bool) -> Result<()> {
        self.device.transaction(|t| {
            select_bank(t, Bank::Ub0)?;
            let mut current = [0u8];
            t.read_register(Register::PwrMgmt1.address(), &mut current)?;

            let updated = if sleep {
                current[0] | PWR_MGMT_1_SLEEP
            } else {
                current[0] & !PWR_MGMT_1_SLEEP
            };
            t.write(&[Register::PwrMgmt1.address(), updated])
        })
    }

    /// True if any FIFO overflow flag is set (reading clears the flags)
    pub fn fifo_overflowed(&mut self) -> Result<bool> {
        let status = self.read_register(Bank::Ub0, Register::IntStatus2.address())?;
        Ok(status & INT_STATUS_2_FIFO_OVERFLOW != 0)
    }
}

fn select_bank<T: I2cTransport>(t: &mut Transaction<'_, T>, bank: Bank) -> Result<()> {
    t.write(&[Register::RegBankSel.address(), bank.select_value()])
}

/// Select `bank`, then write each single-byte register in order
fn write_banked<T: I2cTransport>(t: &mut Transaction<'_, T>, bank: Bank, writes: &[(Register, u8)]) -> Result<()> {
    select_bank(t, bank)?;
    for &(register, value) in writes {
        debug_assert_eq!(register.bank(), Some(bank), "{:?} is not in {:?}", register, bank);
        t.write(&[register.address(), value])?;
    }
    Ok(())
}

fn reset_fifo_in<T: I2cTransport>(t: &mut Transaction<'_, T>) -> Result<()> {
    write_banked(
        t,
        Bank::Ub0,
        &[
            (Register::FifoRst, FIFO_RST_ASSERT),
            (Register::FifoRst, FIFO_RST_CLEAR),
        ],
    )
}

/// Read the FIFO count, then up to [`FIFO_SIZE`] bytes of FIFO data
fn drain_fifo<T: I2cTransport>(t: &mut Transaction<'_, T>, buffer: &mut [u8; FIFO_SIZE]) -> Result<u16> {
    select_bank(t, Bank::Ub0)?;

    let mut count = [0u8; 2];
    t.read_register(Register::FifoCountH.address(), &mut count)?;
    let length = decode_be(&count) as u16;

    let to_read = usize::from(length).min(FIFO_SIZE);
    if to_read > 0 {
        t.read_register(Register::FifoRw.address(), &mut buffer[..to_read])?;
    }

    Ok(length)
}
