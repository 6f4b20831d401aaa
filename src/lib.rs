//! Shared-bus I2C sensor interface for a high-altitude balloon payload
//!
//! Several drivers share one physical I2C bus through a cloneable
//! [`SharedBus`]. Every driver operation runs inside a single bus guard scope,
//! so a command and its response are never interleaved with another
//! caller's traffic, and the lock is released on every exit path.
//!
//! Devices covered:
//! - ICM-20948 IMU with register banks and an accelerometer FIFO ([`Icm20948`])
//! - ADS1115 ADC ([`Ads1115`]), AD5272 digital potentiometer ([`Ad5272`])
//! - DS3231 RTC ([`Ds3231`]), SHT4x humidity sensor ([`Sht4x`])
//! - MLX90614 IR thermometer ([`Mlx90614`]), MPRLS pressure sensor ([`Mprls`])
//!
//! # Quick Start
//!
//! ## Any transport
//! ```
//! use hab_sensor_interface::{Ad5272, DeviceAddress, I2cTransport, Result, SharedBus};
//!
//! /// Transport that accepts every write and reads back zeros
//! struct Loopback;
//!
//! impl I2cTransport for Loopback {
//!     fn write(&mut self, _address: u8, _bytes: &[u8]) -> Result<()> {
//!         Ok(())
//!     }
//!
//!     fn read_into(&mut self, _address: u8, buffer: &mut [u8]) -> Result<()> {
//!         buffer.fill(0);
//!         Ok(())
//!     }
//! }
//!
//! let bus = SharedBus::new(Loopback);
//! let mut digipot = Ad5272::new(bus.clone(), DeviceAddress::new(0x2F)?)?;
//! digipot.write_rdac(512)?;
//! # Ok::<(), hab_sensor_interface::SensorError>(())
//! ```
//!
//! ## Raspberry Pi (feature `rpi`)
//! ```ignore
//! use hab_sensor_interface::{DeviceAddress, Icm20948, RppalTransport, SharedBus};
//!
//! let bus = SharedBus::new(RppalTransport::with_bus(1)?);
//! let mut imu = Icm20948::new(bus, DeviceAddress::new(0x68)?)?;
//!
//! let fifo = imu.read_fifo()?;
//! for sample in fifo.accel_samples() {
//!     println!("{:?}", sample.to_g(imu.config().accel_range));
//! }
//! # Ok::<(), hab_sensor_interface::SensorError>(())
//! ```

pub mod ad5272;
pub mod ads1115;
pub mod bus;
pub mod codec;
pub mod device;
pub mod ds3231;
pub mod error;
pub mod icm20948;
pub mod mlx90614;
pub mod mprls;
pub mod poll;
#[cfg(feature = "rpi")]
pub mod rpi;
pub mod sht4x;

// Re-export public API
pub use ad5272::Ad5272;
pub use ads1115::{Ads1115, Ads1115Config};
pub use bus::{BusGuard, I2cTransport, SharedBus};
pub use device::{DeviceAddress, DriverConfig, I2cDevice, RangePolicy, Transaction};
pub use ds3231::{Ds3231, RtcTime};
pub use error::{Result, SensorError};
pub use icm20948::{Icm20948, Icm20948Config, ImuState};
pub use mlx90614::Mlx90614;
pub use mprls::{Mprls, MprlsConfig};
pub use poll::PollPolicy;
#[cfg(feature = "rpi")]
pub use rpi::RppalTransport;
pub use sht4x::Sht4x;
