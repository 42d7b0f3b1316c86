use std::time::Duration;

use crate::frame::Mnemonic;

pub const STX: u8 = 0x02;
pub const ETX: u8 = 0x03;
pub const EOT: u8 = 0x04;
pub const ENQ: u8 = 0x05;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;

pub const DEFAULT_BAUD: u32 = 9_600;
pub const DEFAULT_GROUP: u8 = 0;
pub const DEFAULT_DEVICE: u8 = 0;

/// Maximum time to wait for a query reply, also used for every write.
pub const QUERY_TIMEOUT: Duration = Duration::from_millis(125);
/// Maximum time to wait for the ACK/NAK byte after a command.
pub const ACK_TIMEOUT: Duration = Duration::from_millis(300);
/// Relay switching time after heater / LN2 heater on-off commands.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Read buffer size; a reply filling it is treated as too long.
pub const REPLY_CAPACITY: usize = 100;
pub const MIN_REPLY_LEN: usize = 5;
pub const MAX_COMMAND_DATA: usize = 64;

pub const PV: Mnemonic = Mnemonic::from_bytes(*b"PV");
pub const SL: Mnemonic = Mnemonic::from_bytes(*b"SL");
pub const S2: Mnemonic = Mnemonic::from_bytes(*b"S2");
pub const SP: Mnemonic = Mnemonic::from_bytes(*b"SP");
pub const LS: Mnemonic = Mnemonic::from_bytes(*b"LS");
pub const L2: Mnemonic = Mnemonic::from_bytes(*b"L2");
pub const HS: Mnemonic = Mnemonic::from_bytes(*b"HS");
pub const H2: Mnemonic = Mnemonic::from_bytes(*b"H2");
pub const HP: Mnemonic = Mnemonic::from_bytes(*b"HP");
pub const OP: Mnemonic = Mnemonic::from_bytes(*b"OP");
pub const HO: Mnemonic = Mnemonic::from_bytes(*b"HO");
pub const AF: Mnemonic = Mnemonic::from_bytes(*b"AF");
pub const SW: Mnemonic = Mnemonic::from_bytes(*b"SW");
pub const OS: Mnemonic = Mnemonic::from_bytes(*b"OS");
pub const XS: Mnemonic = Mnemonic::from_bytes(*b"XS");
pub const IS: Mnemonic = Mnemonic::from_bytes(*b"IS");
pub const IM: Mnemonic = Mnemonic::from_bytes(*b"IM");
pub const XP: Mnemonic = Mnemonic::from_bytes(*b"XP");
pub const TI: Mnemonic = Mnemonic::from_bytes(*b"TI");
pub const TD: Mnemonic = Mnemonic::from_bytes(*b"TD");
pub const HB: Mnemonic = Mnemonic::from_bytes(*b"HB");
pub const LB: Mnemonic = Mnemonic::from_bytes(*b"LB");
pub const TR: Mnemonic = Mnemonic::from_bytes(*b"TR");
pub const NP: Mnemonic = Mnemonic::from_bytes(*b"NP");
pub const NH: Mnemonic = Mnemonic::from_bytes(*b"NH");
pub const EE: Mnemonic = Mnemonic::from_bytes(*b"EE");
pub const DISPLAY_MAX: Mnemonic = Mnemonic::from_bytes(*b"1H");
pub const DISPLAY_MIN: Mnemonic = Mnemonic::from_bytes(*b"1L");

pub const SW_WRITE_MASK: u16 = 0xE005;
pub const OS_WRITE_MASK: u16 = 0x30BF;
pub const XS_WRITE_MASK: u16 = 0xFFB7;
pub const IS_RESERVED_MASK: u16 = 0xF802;

// Eurotherm 902S status word (SW)
pub const SW_DATA_FORMAT: u16 = 0x0001;
pub const SW_SENSOR_BREAK: u16 = 0x0002;
pub const SW_KEYLOCK: u16 = 0x0004;
pub const SW_ALARM2: u16 = 0x0100;
pub const SW_ALARM1: u16 = 0x0400;
pub const SW_ALARMS: u16 = 0x1000;
pub const SW_ACTIVE_SETPOINT: u16 = 0x2000;
pub const SW_REMOTE_ACTIVE: u16 = 0x4000;
pub const SW_MANUAL_MODE: u16 = 0x8000;

// Eurotherm 902S extension status word (XS)
pub const XS_SELF_TUNE: u16 = 0x0001;
pub const XS_ADAPTIVE_TUNE: u16 = 0x0002;
pub const XS_ENABLE_BROADCAST: u16 = 0x0004;
pub const XS_PID_CONTROL: u16 = 0x0010;
pub const XS_ACTIVE_PID: u16 = 0x0020;

// BVT3000 interface status (IS)
pub const IS_HEATER_ON: u16 = 1 << 0;
pub const IS_EVAPORATOR_CONNECTED: u16 = 1 << 2;
pub const IS_MISSING_GAS_FLOW: u16 = 1 << 3;
pub const IS_HEATER_OVERHEATING: u16 = 1 << 4;
pub const IS_EXCHANGER_CONNECTED: u16 = 1 << 5;
pub const IS_LN2_REFILL: u16 = 1 << 6;
pub const IS_LN2_EMPTY: u16 = 1 << 7;
pub const IS_LN2_HEATER_ON: u16 = 1 << 8;
pub const IS_BVT3500_PRESENT: u16 = 1 << 10;

pub const PERCENT_MIN: f64 = 0.0;
pub const PERCENT_MAX: f64 = 100.0;
pub const MAX_PROPORTIONAL_BAND: f64 = 999.9;
pub const MAX_INTEGRAL_TIME: f64 = 9999.0;
pub const MAX_DERIVATIVE_TIME: f64 = 999.9;
pub const MAX_CUTBACK: f64 = 9999.0;
pub const MAX_AT_TRIGGER_LEVEL: f64 = 231.7;

pub const OPERATION_NORMAL: u8 = 0;
pub const OPERATION_CONFIGURATION: u8 = 2;
