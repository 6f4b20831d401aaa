//! Unit tests for the humidity, IR thermometer and pressure drivers

use crate::common::sim::ScriptedDevice;
use crate::common::{address, MockBus, Operation};
use hab_sensor_interface::codec::crc8;
use hab_sensor_interface::mlx90614::Eeprom;
use hab_sensor_interface::sht4x::{HeaterDuration, HeaterPower, Precision};
use hab_sensor_interface::{DriverConfig, Mlx90614, Mprls, MprlsConfig, PollPolicy, SensorError, Sht4x};

const HUMIDITY: u8 = 0x44;
const THERMOMETER: u8 = 0x5A;
const PRESSURE: u8 = 0x18;

fn single(address: u8, sim: ScriptedDevice) -> MockBus {
    let mock = MockBus::new();
    mock.attach(address, sim);
    mock
}

/// Two words with their Sensirion CRCs
fn sht_response(first: u16, second: u16) -> Vec<u8> {
    let mut response = Vec::new();
    for word in [first, second] {
        let bytes = word.to_be_bytes();
        response.extend(bytes);
        response.push(crc8(&bytes, 0x31, 0xFF));
    }
    response
}

/// Thermometer read-word response with a valid PEC
fn mlx_response(command: u8, raw: u16) -> Vec<u8> {
    let [lsb, msb] = raw.to_le_bytes();
    let pec = crc8(
        &[THERMOMETER << 1, command, (THERMOMETER << 1) | 1, lsb, msb],
        0x07,
        0,
    );
    vec![lsb, msb, pec]
}

#[test]
fn test_humidity_measurement() {
    let mock = single(
        HUMIDITY,
        ScriptedDevice::with_responses(&[&[0x60, 0x00, 0xD4, 0x66, 0x66, 0x93]]),
    );
    let mut sensor = Sht4x::new(mock.shared_bus(), address(HUMIDITY));

    let m = sensor.measure(Precision::High).unwrap();
    assert_eq!(m.raw_temperature, 0x6000);
    assert_eq!(m.raw_humidity, 0x6666);
    assert!((m.temperature - 20.626).abs() < 1e-3);
    assert!((m.humidity - 44.0).abs() < 1e-3);

    assert_eq!(
        mock.operations(),
        vec![
            Operation::Write {
                address: HUMIDITY,
                bytes: vec![0xFD]
            },
            Operation::Read {
                address: HUMIDITY,
                len: 6
            },
        ]
    );
}

#[test]
fn test_humidity_precision_commands() {
    let mock = single(
        HUMIDITY,
        ScriptedDevice::with_responses(&[&sht_response(0, 0), &sht_response(0, 0)]),
    );
    let mut sensor = Sht4x::new(mock.shared_bus(), address(HUMIDITY));

    sensor.measure(Precision::Medium).unwrap();
    sensor.measure(Precision::Low).unwrap();

    assert_eq!(mock.writes_to(HUMIDITY), vec![vec![0xF6], vec![0xE0]]);
}

#[test]
fn test_humidity_crc_mismatch() {
    let mut response = sht_response(0x6000, 0x8000);
    response[5] ^= 0xFF;
    let mock = single(HUMIDITY, ScriptedDevice::with_responses(&[&response]));
    let mut sensor = Sht4x::new(mock.shared_bus(), address(HUMIDITY));

    assert!(matches!(
        sensor.measure(Precision::High),
        Err(SensorError::CrcMismatch { expected: 0xA2, .. })
    ));
}

#[test]
fn test_humidity_heater_and_serial() {
    let mock = single(
        HUMIDITY,
        ScriptedDevice::with_responses(&[&sht_response(0x8000, 0x8000), &sht_response(0x1234, 0x5678)]),
    );
    let mut sensor = Sht4x::new(mock.shared_bus(), address(HUMIDITY));

    let m = sensor
        .measure_with_heater(HeaterPower::Milliwatts20, HeaterDuration::TenthSecond)
        .unwrap();
    assert!((m.humidity - 56.5009).abs() < 1e-3);
    assert_eq!(sensor.read_serial_number().unwrap(), 0x1234_5678);

    sensor.soft_reset().unwrap();
    assert_eq!(mock.writes_to(HUMIDITY), vec![vec![0x15], vec![0x89], vec![0x94]]);
}

#[test]
fn test_thermometer_readings() {
    let mock = single(
        THERMOMETER,
        ScriptedDevice::with_responses(&[&[0xD2, 0x3A, 0x26], &[0xD2, 0x3A, 0x30], &mlx_response(0x08, 0x3A98)]),
    );
    let mut sensor = Mlx90614::new(mock.shared_bus(), address(THERMOMETER));

    assert!((sensor.read_ambient().unwrap() - 28.01).abs() < 1e-3);
    assert!((sensor.read_object1().unwrap() - 28.01).abs() < 1e-3);
    assert!((sensor.read_object2().unwrap() - 26.85).abs() < 1e-3);

    assert_eq!(mock.writes_to(THERMOMETER), vec![vec![0x06], vec![0x07], vec![0x08]]);
}

#[test]
fn test_thermometer_pec_mismatch() {
    let mock = single(THERMOMETER, ScriptedDevice::with_responses(&[&[0xD2, 0x3A, 0x00]]));
    let mut sensor = Mlx90614::new(mock.shared_bus(), address(THERMOMETER));

    assert!(matches!(
        sensor.read_ambient(),
        Err(SensorError::CrcMismatch {
            expected: 0x26,
            actual: 0x00
        })
    ));
}

#[test]
fn test_thermometer_error_flag() {
    let mock = single(
        THERMOMETER,
        ScriptedDevice::with_responses(&[&mlx_response(0x07, 0x8000)]),
    );
    let mut sensor = Mlx90614::new(mock.shared_bus(), address(THERMOMETER));

    assert!(matches!(sensor.read_object1(), Err(SensorError::DeviceFault(_))));
}

#[test]
fn test_thermometer_emissivity() {
    let mock = single(
        THERMOMETER,
        ScriptedDevice::with_responses(&[&mlx_response(0x24, 0xFFFF)]),
    );
    let mut sensor = Mlx90614::new(mock.shared_bus(), address(THERMOMETER));

    assert_eq!(sensor.read_emissivity().unwrap(), 1.0);
    assert_eq!(mock.writes_to(THERMOMETER), vec![vec![0x20 | Eeprom::Emissivity as u8]]);
}

#[test]
fn test_pressure_polls_busy_then_converts() {
    let mock = single(
        PRESSURE,
        ScriptedDevice::with_responses(&[&[0x60], &[0x60], &[0x40], &[0x40, 0x80, 0x00, 0x00]]),
    );
    let mut sensor = Mprls::new(mock.shared_bus(), address(PRESSURE));

    let psi = sensor.read_psi().unwrap();
    assert!((psi - 12.5).abs() < 1e-3);

    let ops = mock.operations();
    assert_eq!(
        ops.first(),
        Some(&Operation::Write {
            address: PRESSURE,
            bytes: vec![0xAA, 0x00, 0x00]
        })
    );
    let status_reads = ops
        .iter()
        .filter(|op| matches!(op, Operation::Read { len: 1, .. }))
        .count();
    assert_eq!(status_reads, 3);
    assert_eq!(
        ops.last(),
        Some(&Operation::Read {
            address: PRESSURE,
            len: 4
        })
    );
}

#[test]
fn test_pressure_units() {
    let mid = [0x40, 0x80, 0x00, 0x00];
    let mock = single(
        PRESSURE,
        ScriptedDevice::with_responses(&[&[0x40], &mid, &[0x40], &mid]),
    );
    let mut sensor = Mprls::new(mock.shared_bus(), address(PRESSURE));

    assert!((sensor.read().unwrap() - 86_184.5).abs() < 0.5);
    assert!((sensor.read_hpa().unwrap() - 861.845).abs() < 0.01);
}

#[test]
fn test_pressure_custom_range() {
    let mock = single(
        PRESSURE,
        ScriptedDevice::with_responses(&[&[0x40], &[0x40, 0xE6, 0x66, 0x66]]),
    );
    let config = MprlsConfig {
        psi_min: 0.0,
        psi_max: 15.0,
    };
    let mut sensor = Mprls::with_config(mock.shared_bus(), address(PRESSURE), config, DriverConfig::default());

    assert!((sensor.read_psi().unwrap() - 15.0).abs() < 1e-3);
}

#[test]
fn test_pressure_status_faults() {
    for (status, what) in [(0x41u8, "saturation"), (0x42u8, "integrity")] {
        let mock = single(
            PRESSURE,
            ScriptedDevice::with_responses(&[&[0x40], &[status, 0x80, 0x00, 0x00]]),
        );
        let mut sensor = Mprls::new(mock.shared_bus(), address(PRESSURE));

        match sensor.read_raw() {
            Err(SensorError::DeviceFault(message)) => assert!(message.contains(what), "{}", message),
            other => panic!("expected {} fault, got {:?}", what, other),
        }
    }
}

#[test]
fn test_pressure_busy_forever_times_out() {
    let mut sim = ScriptedDevice::new();
    for _ in 0..10 {
        sim.respond(&[0x60]);
    }
    let mock = single(PRESSURE, sim);
    let driver = DriverConfig {
        completion: PollPolicy::bounded(10),
        ..DriverConfig::default()
    };
    let bus = mock.shared_bus();
    let mut sensor = Mprls::with_config(bus.clone(), address(PRESSURE), MprlsConfig::default(), driver);

    assert!(matches!(
        sensor.read_raw(),
        Err(SensorError::BusContentionTimeout {
            waiting_for: "MPRLS conversion",
            attempts: 10
        })
    ));
    assert!(bus.try_acquire().is_some());
}
