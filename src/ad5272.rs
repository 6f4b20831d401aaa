//! AD5272 1024-position digital potentiometer driver
//!
//! Every frame is two bytes: a 4-bit command shifted left by two with the
//! top two data bits folded underneath, then the low data byte.

use tracing::debug;

use crate::bus::{I2cTransport, SharedBus};
use crate::codec::{decode_response, CommandPacking, Decode, ShiftedCommand};
use crate::device::{DeviceAddress, DriverConfig, I2cDevice};
use crate::error::Result;

/// I2C address with ADDR floating
pub const DEFAULT_ADDRESS: u8 = 0x2F;

/// Highest wiper position
pub const RDAC_MAX: u16 = 1023;

/// Highest control register value (four bits)
pub const CONTROL_MAX: u8 = 0x0F;

/// Control bit C1: allow wiper updates over I2C
pub const CONTROL_RDAC_WRITE_ENABLE: u8 = 0x02;

const PACKING: ShiftedCommand = ShiftedCommand {
    shift: 2,
    high_bits: 2,
};

const RESPONSE: Decode = Decode::masked(0x03FF);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Command {
    WriteRdac = 0x00,
    ReadRdac = 0x02,
    Store50tp = 0x03,
    SoftwareReset = 0x04,
    Read50tpContent = 0x05,
    Read50tpLastAddress = 0x06,
    WriteControl = 0x07,
    ReadControl = 0x08,
    Shutdown = 0x09,
}

/// Readback selector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadCommand {
    /// Current wiper position
    Rdac,
    /// Control register
    Control,
    /// Stored wiper value at a 50-TP memory location (0-49)
    StoredValue(u8),
    /// Address of the most recently programmed 50-TP location
    LastStoredAddress,
}

impl ReadCommand {
    fn command(self) -> (Command, u32) {
        match self {
            ReadCommand::Rdac => (Command::ReadRdac, 0),
            ReadCommand::Control => (Command::ReadControl, 0),
            ReadCommand::StoredValue(location) => (Command::Read50tpContent, u32::from(location & 0x3F)),
            ReadCommand::LastStoredAddress => (Command::Read50tpLastAddress, 0),
        }
    }
}

pub struct Ad5272<T> {
    device: I2cDevice<T>,
    driver: DriverConfig,
}

impl<T: I2cTransport> Ad5272<T> {
    /// Create the driver and unlock wiper writes
    ///
    /// The control register comes up write-protected after power-on, so the
    /// constructor writes [`CONTROL_RDAC_WRITE_ENABLE`] before returning.
    pub fn new(bus: SharedBus<T>, address: DeviceAddress) -> Result<Self> {
        Self::with_driver_config(bus, address, DriverConfig::default())
    }

    pub fn with_driver_config(bus: SharedBus<T>, address: DeviceAddress, driver: DriverConfig) -> Result<Self> {
        let mut digipot = Self {
            device: I2cDevice::new(bus, address),
            driver,
        };
        digipot.write_control(CONTROL_RDAC_WRITE_ENABLE)?;
        Ok(digipot)
    }

    pub fn address(&self) -> DeviceAddress {
        self.device.address()
    }

    fn send(&mut self, command: Command, value: u32) -> Result<()> {
        let frame = PACKING.pack(command as u8, value);
        self.device.write(&frame)
    }

    /// Move the wiper
    ///
    /// Values above [`RDAC_MAX`] are handled per the configured range policy
    /// and never reach the bus.
    pub fn write_rdac(&mut self, position: u16) -> Result<()> {
        if !self
            .driver
            .out_of_range
            .admit("RDAC position", position, 0..=RDAC_MAX)?
        {
            return Ok(());
        }
        debug!(address = %self.device.address(), position, "ad5272 write rdac");
        self.send(Command::WriteRdac, u32::from(position))
    }

    pub fn write_control(&mut self, value: u8) -> Result<()> {
        if !self
            .driver
            .out_of_range
            .admit("control register", value, 0..=CONTROL_MAX)?
        {
            return Ok(());
        }
        self.send(Command::WriteControl, u32::from(value))
    }

    /// Issue a read command and return the 10-bit response
    ///
    /// Command and readback share one transaction and the response buffer
    /// is fresh per call, so a failed read never leaks into the next one.
    pub fn read(&mut self, what: ReadCommand) -> Result<u16> {
        let (command, value) = what.command();
        let frame = PACKING.pack(command as u8, value);

        let mut response = [0u8; 2];
        self.device.transaction(|t| {
            t.write(&frame)?;
            t.read_into(&mut response)
        })?;

        Ok(decode_response(&response, RESPONSE) as u16)
    }

    /// Program the current wiper position into the next 50-TP location
    pub fn store_wiper(&mut self) -> Result<()> {
        self.send(Command::Store50tp, 0)
    }

    /// Reload the wiper from the last 50-TP value
    pub fn software_reset(&mut self) -> Result<()> {
        self.send(Command::SoftwareReset, 0)
    }

    pub fn set_shutdown(&mut self, shutdown: bool) -> Result<()> {
        self.send(Command::Shutdown, u32::from(shutdown))
    }
}
