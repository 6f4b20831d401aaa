//! Sensor poller - reads every payload sensor at a fixed cadence
//!
//! Two Linux I2C buses are opened. The IMU, humidity, IR and pressure
//! sensors sit on the sensor bus; the ADC, digital potentiometer and RTC on
//! the auxiliary bus. One timestamped line is printed per device per cycle.
//! Any driver error ends the run; Ctrl+C stops it cleanly, including while a
//! driver is busy-waiting.

use clap::Parser;
use hab_sensor_interface::ads1115::Channel;
use hab_sensor_interface::icm20948::WHO_AM_I_VALUE;
use hab_sensor_interface::sht4x::Precision;
use hab_sensor_interface::{
    Ad5272, Ads1115, Ads1115Config, DeviceAddress, DriverConfig, Ds3231, Icm20948, Mlx90614, Mprls,
    MprlsConfig, PollPolicy, RangePolicy, RppalTransport, SensorError, SharedBus, Sht4x,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "sensor-poller")]
#[command(about = "Poll the payload I2C sensors and print decoded readings", long_about = None)]
struct Args {
    /// I2C bus with the IMU, humidity, IR and pressure sensors
    #[arg(long, default_value = "0")]
    sensor_bus: u8,

    /// I2C bus with the ADC, digital potentiometer and RTC
    #[arg(long, default_value = "1")]
    aux_bus: u8,

    /// Poll interval in milliseconds
    #[arg(short, long, default_value = "1000")]
    interval: u64,

    /// Give up on a busy-wait after this many milliseconds
    #[arg(long, default_value = "2000")]
    poll_timeout: u64,

    /// Spin forever on busy-waits (Ctrl+C still interrupts)
    #[arg(long)]
    unbounded: bool,

    /// ADC input channel (0-3)
    #[arg(long, default_value = "0")]
    adc_channel: u8,

    /// Wiper position written to the digital potentiometer at startup (0-1023)
    #[arg(long)]
    wiper: Option<u16>,

    /// Full-scale range of the pressure sensor in PSI
    #[arg(long, default_value = "25")]
    pressure_range: f32,

    #[arg(long, default_value = "0x68", value_parser = parse_address)]
    imu_address: u8,

    #[arg(long, default_value = "0x44", value_parser = parse_address)]
    humidity_address: u8,

    #[arg(long, default_value = "0x5A", value_parser = parse_address)]
    ir_address: u8,

    #[arg(long, default_value = "0x18", value_parser = parse_address)]
    pressure_address: u8,

    #[arg(long, default_value = "0x49", value_parser = parse_address)]
    adc_address: u8,

    #[arg(long, default_value = "0x2F", value_parser = parse_address)]
    digipot_address: u8,

    #[arg(long, default_value = "0x68", value_parser = parse_address)]
    rtc_address: u8,
}

/// Accepts `0x`-prefixed hex or plain decimal
fn parse_address(value: &str) -> Result<u8, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u8::from_str_radix(hex, 16),
        None => value.parse(),
    };
    let address = parsed.map_err(|e| format!("invalid I2C address '{}': {}", value, e))?;
    DeviceAddress::new(address)
        .map(DeviceAddress::get)
        .map_err(|e| e.to_string())
}

struct Payload {
    imu: Icm20948<RppalTransport>,
    humidity: Sht4x<RppalTransport>,
    ir: Mlx90614<RppalTransport>,
    pressure: Mprls<RppalTransport>,
    adc: Ads1115<RppalTransport>,
    rtc: Ds3231<RppalTransport>,
    adc_channel: Channel,
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

fn poll_once(payload: &mut Payload) -> Result<(), SensorError> {
    let ts = timestamp();

    let range = payload.imu.config().accel_range;
    let fifo = payload.imu.read_fifo()?;
    let samples = fifo.sample_count();
    match fifo.accel_samples().last() {
        Some(latest) => {
            let (x, y, z) = latest.to_g(range);
            println!(
                "[{}] imu       fifo {:4} bytes ({:3} samples) latest X={:+.3}g Y={:+.3}g Z={:+.3}g",
                ts,
                fifo.length(),
                samples,
                x,
                y,
                z
            );
        }
        None => println!("[{}] imu       fifo empty", ts),
    }

    let m = payload.humidity.measure(Precision::High)?;
    println!("[{}] humidity  {:6.2} °C  {:6.2} %RH", ts, m.temperature, m.humidity);

    let ambient = payload.ir.read_ambient()?;
    let object = payload.ir.read_object1()?;
    println!("[{}] ir        ambient {:6.2} °C  object {:6.2} °C", ts, ambient, object);

    let hpa = payload.pressure.read_hpa()?;
    println!("[{}] pressure  {:8.2} hPa", ts, hpa);

    let volts = payload.adc.read_voltage(payload.adc_channel)?;
    println!("[{}] adc       {:?} {:+.4} V", ts, payload.adc_channel, volts);

    let time = payload.rtc.read_time()?;
    let rtc_temp = payload.rtc.read_temperature()?;
    println!("[{}] rtc       {}  {:5.2} °C", ts, time, rtc_temp);

    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let adc_channel = Channel::single_ended(args.adc_channel)
        .ok_or_else(|| format!("ADC channel must be 0-3, got {}", args.adc_channel))?;

    let stop = Arc::new(AtomicBool::new(false));
    let s = stop.clone();
    ctrlc::set_handler(move || {
        println!("\nReceived Ctrl+C, stopping...");
        s.store(true, Ordering::SeqCst);
    })?;

    let policy = if args.unbounded {
        PollPolicy::unbounded()
    } else {
        PollPolicy::default().with_timeout(Duration::from_millis(args.poll_timeout))
    };
    let policy = policy.with_cancel(stop.clone());

    let driver = DriverConfig {
        completion: policy.clone(),
        out_of_range: RangePolicy::Reject,
    };

    info!(sensor_bus = args.sensor_bus, aux_bus = args.aux_bus, "opening buses");
    let sensor_bus = SharedBus::with_lock_policy(RppalTransport::with_bus(args.sensor_bus)?, policy.clone());
    let aux_bus = SharedBus::with_lock_policy(RppalTransport::with_bus(args.aux_bus)?, policy);

    let mut imu = Icm20948::new(sensor_bus.clone(), DeviceAddress::new(args.imu_address)?)?;
    let id = imu.who_am_i()?;
    if id != WHO_AM_I_VALUE {
        warn!(id, "unexpected ICM-20948 WHO_AM_I");
    }

    let mut digipot = Ad5272::with_driver_config(
        aux_bus.clone(),
        DeviceAddress::new(args.digipot_address)?,
        driver.clone(),
    )?;
    if let Some(wiper) = args.wiper {
        digipot.write_rdac(wiper)?;
        info!(wiper, "digipot wiper set");
    }

    let mut payload = Payload {
        imu,
        humidity: Sht4x::new(sensor_bus.clone(), DeviceAddress::new(args.humidity_address)?),
        ir: Mlx90614::new(sensor_bus.clone(), DeviceAddress::new(args.ir_address)?),
        pressure: Mprls::with_config(
            sensor_bus,
            DeviceAddress::new(args.pressure_address)?,
            MprlsConfig {
                psi_min: 0.0,
                psi_max: args.pressure_range,
            },
            driver.clone(),
        ),
        adc: Ads1115::with_config(
            aux_bus.clone(),
            DeviceAddress::new(args.adc_address)?,
            Ads1115Config::default(),
            driver.clone(),
        ),
        rtc: Ds3231::with_driver_config(aux_bus, DeviceAddress::new(args.rtc_address)?, driver),
        adc_channel,
    };

    println!("Polling every {} ms. Press Ctrl+C to stop.\n", args.interval);

    let interval = Duration::from_millis(args.interval);
    let mut cycles = 0u64;
    while !stop.load(Ordering::SeqCst) {
        let started = Instant::now();

        match poll_once(&mut payload) {
            Ok(()) => cycles += 1,
            Err(SensorError::Cancelled { .. }) => break,
            Err(e) => return Err(e.into()),
        }

        while started.elapsed() < interval && !stop.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(10));
        }
    }

    info!(cycles, "stopped");
    Ok(())
}
