//! Integration tests: every driver wired onto two shared buses, polled in cycles

use crate::common::sim::{RegisterFile, ScriptedDevice, SimAds1115, SimDs3231, SimIcm20948};
use crate::common::{address, shared, MockBus, Operation, IMU_ADDRESS};
use hab_sensor_interface::ads1115::Channel;
use hab_sensor_interface::codec::crc8;
use hab_sensor_interface::icm20948::WHO_AM_I_VALUE;
use hab_sensor_interface::sht4x::Precision;
use hab_sensor_interface::{
    Ad5272, Ads1115, Ads1115Config, DriverConfig, Ds3231, Icm20948, Mlx90614, Mprls, MprlsConfig,
    PollPolicy, RangePolicy, RtcTime, SensorError, Sht4x,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

const HUMIDITY: u8 = 0x44;
const THERMOMETER: u8 = 0x5A;
const PRESSURE: u8 = 0x18;
const ADC: u8 = 0x49;
const DIGIPOT: u8 = 0x2F;
const RTC: u8 = 0x68;

const CYCLES: usize = 3;

fn sht_response(first: u16, second: u16) -> Vec<u8> {
    let mut response = Vec::new();
    for word in [first, second] {
        let bytes = word.to_be_bytes();
        response.extend(bytes);
        response.push(crc8(&bytes, 0x31, 0xFF));
    }
    response
}

fn mlx_response(command: u8, raw: u16) -> Vec<u8> {
    let [lsb, msb] = raw.to_le_bytes();
    let pec = crc8(
        &[THERMOMETER << 1, command, (THERMOMETER << 1) | 1, lsb, msb],
        0x07,
        0,
    );
    vec![lsb, msb, pec]
}

fn accel_record(x: i16, y: i16, z: i16) -> Vec<u8> {
    [x, y, z].iter().flat_map(|axis| axis.to_be_bytes()).collect()
}

/// Simulated devices behind both buses
struct Bench {
    sensor: MockBus,
    aux: MockBus,
    imu: Arc<Mutex<SimIcm20948>>,
    adc: Arc<Mutex<SimAds1115>>,
    rtc: Arc<Mutex<SimDs3231>>,
}

impl Bench {
    fn new(cycles: usize) -> Self {
        let sensor = MockBus::new();
        let aux = MockBus::new();

        let imu = shared(SimIcm20948::new());
        sensor.attach(IMU_ADDRESS, imu.clone());

        let mut humidity = ScriptedDevice::new();
        let mut thermometer = ScriptedDevice::new();
        let mut pressure = ScriptedDevice::new();
        for _ in 0..cycles {
            humidity.respond(&sht_response(0x6000, 0x6666));
            thermometer.respond(&mlx_response(0x06, 0x3AD2));
            thermometer.respond(&mlx_response(0x07, 0x3A98));
            pressure.respond(&[0x60]);
            pressure.respond(&[0x40]);
            pressure.respond(&[0x40, 0x80, 0x00, 0x00]);
        }
        sensor.attach(HUMIDITY, humidity);
        sensor.attach(THERMOMETER, thermometer);
        sensor.attach(PRESSURE, pressure);

        let adc = shared(SimAds1115::new(4096, 2));
        aux.attach(ADC, adc.clone());
        aux.attach(DIGIPOT, ScriptedDevice::new());
        let registers = RegisterFile::new()
            .with(0x00, 0x30)
            .with(0x01, 0x15)
            .with(0x02, 0x12)
            .with(0x11, 0x14)
            .with(0x12, 0x40);
        let rtc = shared(SimDs3231::new(registers));
        aux.attach(RTC, rtc.clone());

        Self {
            sensor,
            aux,
            imu,
            adc,
            rtc,
        }
    }
}

struct Payload {
    imu: Icm20948<MockBus>,
    humidity: Sht4x<MockBus>,
    ir: Mlx90614<MockBus>,
    pressure: Mprls<MockBus>,
    adc: Ads1115<MockBus>,
    digipot: Ad5272<MockBus>,
    rtc: Ds3231<MockBus>,
}

impl Payload {
    fn connect(bench: &Bench, driver: DriverConfig) -> Self {
        let sensor_bus = bench.sensor.shared_bus();
        let aux_bus = bench.aux.shared_bus();

        Self {
            imu: Icm20948::new(sensor_bus.clone(), address(IMU_ADDRESS)).unwrap(),
            humidity: Sht4x::new(sensor_bus.clone(), address(HUMIDITY)),
            ir: Mlx90614::new(sensor_bus.clone(), address(THERMOMETER)),
            pressure: Mprls::with_config(
                sensor_bus,
                address(PRESSURE),
                MprlsConfig::default(),
                driver.clone(),
            ),
            adc: Ads1115::with_config(aux_bus.clone(), address(ADC), Ads1115Config::default(), driver.clone()),
            digipot: Ad5272::with_driver_config(aux_bus.clone(), address(DIGIPOT), driver.clone()).unwrap(),
            rtc: Ds3231::with_driver_config(aux_bus, address(RTC), driver),
        }
    }
}

#[derive(Debug)]
struct Readings {
    samples: usize,
    temperature: f32,
    humidity: f32,
    ambient: f32,
    object: f32,
    hpa: f32,
    volts: f32,
    time: RtcTime,
    rtc_temperature: f32,
}

fn poll_once(payload: &mut Payload) -> Result<Readings, SensorError> {
    let samples = payload.imu.read_fifo()?.sample_count();
    let m = payload.humidity.measure(Precision::High)?;
    let ambient = payload.ir.read_ambient()?;
    let object = payload.ir.read_object1()?;
    let hpa = payload.pressure.read_hpa()?;
    let volts = payload.adc.read_voltage(Channel::Ain0)?;
    let time = payload.rtc.read_time()?;
    let rtc_temperature = payload.rtc.read_temperature()?;

    Ok(Readings {
        samples,
        temperature: m.temperature,
        humidity: m.humidity,
        ambient,
        object,
        hpa,
        volts,
        time,
        rtc_temperature,
    })
}

#[test]
fn test_poll_cycles_decode_every_device() {
    let bench = Bench::new(CYCLES);
    let mut payload = Payload::connect(&bench, DriverConfig::default());
    assert_eq!(payload.imu.who_am_i().unwrap(), WHO_AM_I_VALUE);
    payload.digipot.write_rdac(512).unwrap();

    for cycle in 0..CYCLES {
        {
            let mut imu = bench.imu.lock().unwrap();
            for i in 0..=cycle {
                imu.push_fifo(&accel_record(i as i16, 0, 16384));
            }
        }

        let r = poll_once(&mut payload).unwrap();
        assert_eq!(r.samples, cycle + 1, "cycle {}", cycle);
        assert!((r.temperature - 20.626).abs() < 1e-3);
        assert!((r.humidity - 44.0).abs() < 1e-3);
        assert!((r.ambient - 28.01).abs() < 1e-3);
        assert!((r.object - 26.85).abs() < 1e-3);
        assert!((r.hpa - 861.845).abs() < 0.01);
        assert!((r.volts - 0.256).abs() < 1e-6);
        assert_eq!(
            r.time,
            RtcTime {
                hours: 12,
                minutes: 15,
                seconds: 30,
                pm: None
            }
        );
        assert_eq!(r.rtc_temperature, 20.25);
    }

    assert_eq!(bench.adc.lock().unwrap().conversions_started, CYCLES as u32);
    assert_eq!(bench.rtc.lock().unwrap().conversions_started, 0);
    assert!(bench.aux.writes_to(DIGIPOT).contains(&vec![0x02, 0x00]));
}

#[test]
fn test_rtc_and_imu_share_an_address_on_separate_buses() {
    let bench = Bench::new(1);
    let mut payload = Payload::connect(&bench, DriverConfig::default());
    bench.sensor.clear_operations();
    bench.aux.clear_operations();

    payload.rtc.read_time().unwrap();
    payload.imu.who_am_i().unwrap();

    assert!(bench
        .sensor
        .operations()
        .iter()
        .all(|op| op.address() == IMU_ADDRESS));
    assert_eq!(bench.aux.operations().len(), 2);
    assert_eq!(bench.imu.lock().unwrap().register(0, 0x00), WHO_AM_I_VALUE);
}

#[test]
fn test_concurrent_pollers_keep_transactions_whole() {
    const ROUNDS: usize = 20;

    let bench = Bench::new(ROUNDS);
    let payload = Payload::connect(&bench, DriverConfig::default());
    let Payload {
        mut imu,
        mut humidity,
        mut ir,
        mut pressure,
        ..
    } = payload;
    bench.imu.lock().unwrap().push_fifo(&accel_record(1, 2, 3).repeat(50));
    bench.sensor.clear_operations();

    let motion = thread::spawn(move || {
        let mut samples = 0;
        for _ in 0..ROUNDS {
            samples += imu.read_fifo().unwrap().sample_count();
        }
        samples
    });
    let environment = thread::spawn(move || {
        for _ in 0..ROUNDS {
            humidity.measure(Precision::High).unwrap();
            ir.read_ambient().unwrap();
            ir.read_object1().unwrap();
            pressure.read_psi().unwrap();
        }
    });
    assert_eq!(motion.join().unwrap(), 50);
    environment.join().unwrap();

    let ops = bench.sensor.operations();
    for (i, op) in ops.iter().enumerate() {
        match op {
            Operation::Write { address, .. } if *address == HUMIDITY || *address == THERMOMETER => {
                assert_eq!(ops[i + 1].address(), *address, "response split at op {}", i);
            }
            // Bank select is always followed by an access in the same bank
            Operation::Write { address, bytes } if *address == IMU_ADDRESS && bytes[0] == 0x7F => {
                assert_eq!(ops[i + 1].address(), IMU_ADDRESS, "bank access split at op {}", i);
            }
            _ => {}
        }
    }

    // Pressure reads: command, status polls and result back to back
    let pressure_runs: Vec<&[Operation]> = ops
        .split(|op| op.address() != PRESSURE)
        .filter(|run| !run.is_empty())
        .collect();
    assert_eq!(pressure_runs.len(), ROUNDS);
    assert!(pressure_runs.iter().all(|run| run.len() == 4));
}

#[test]
fn test_ctrl_c_cancels_a_stuck_conversion() {
    let bench = Bench::new(1);
    bench.adc.lock().unwrap().busy_polls = u32::MAX;

    let stop = Arc::new(AtomicBool::new(false));
    let driver = DriverConfig {
        completion: PollPolicy::unbounded().with_cancel(stop.clone()),
        out_of_range: RangePolicy::Reject,
    };
    let mut payload = Payload::connect(&bench, driver);

    let s = stop.clone();
    let signal = thread::spawn(move || {
        thread::sleep(std::time::Duration::from_millis(20));
        s.store(true, Ordering::SeqCst);
    });

    let result = payload.adc.read(Channel::Ain0);
    signal.join().unwrap();

    assert!(matches!(
        result,
        Err(SensorError::Cancelled {
            waiting_for: "ADS1115 conversion"
        })
    ));
    // The aux bus is free again for the next device
    assert!(payload.rtc.read_time().is_ok());
}

#[test]
fn test_rejected_wiper_leaves_bus_quiet() {
    let bench = Bench::new(1);
    let driver = DriverConfig {
        out_of_range: RangePolicy::Reject,
        ..DriverConfig::default()
    };
    let mut payload = Payload::connect(&bench, driver);
    bench.aux.clear_operations();

    assert!(matches!(
        payload.digipot.write_rdac(2048),
        Err(SensorError::InvalidParameter(_))
    ));
    assert!(bench.aux.operations().is_empty());
}
