//! Status words and the interface status register.
//!
//! Words travel as `>` followed by four hex digits. Nothing is cached: each
//! read is a query, each flag change is a read followed by a masked write.

use tracing::debug;

use crate::constants::{
    IS, IS_BVT3500_PRESENT, IS_EVAPORATOR_CONNECTED, IS_EXCHANGER_CONNECTED, IS_HEATER_ON,
    IS_HEATER_OVERHEATING, IS_LN2_EMPTY, IS_LN2_HEATER_ON, IS_LN2_REFILL, IS_MISSING_GAS_FLOW,
    IS_RESERVED_MASK, OS, OS_WRITE_MASK, SW, SW_ACTIVE_SETPOINT, SW_ALARM1, SW_ALARM2, SW_ALARMS,
    SW_DATA_FORMAT, SW_KEYLOCK, SW_MANUAL_MODE, SW_REMOTE_ACTIVE, SW_SENSOR_BREAK,
    SW_WRITE_MASK, XS, XS_ACTIVE_PID, XS_ADAPTIVE_TUNE, XS_ENABLE_BROADCAST, XS_PID_CONTROL,
    XS_SELF_TUNE, XS_WRITE_MASK,
};
use crate::error::{Error, Result};
use crate::frame::Mnemonic;
use crate::protocol::Session;
use crate::transport::Link;

/// Writable status registers of the temperature controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusRegister {
    /// Status word.
    Sw,
    /// Optional status word.
    Os,
    /// Extension status word.
    Xs,
}

impl StatusRegister {
    pub const fn mnemonic(self) -> Mnemonic {
        match self {
            Self::Sw => SW,
            Self::Os => OS,
            Self::Xs => XS,
        }
    }

    /// Bits the firmware lets us write. Everything else is reserved.
    pub const fn write_mask(self) -> u16 {
        match self {
            Self::Sw => SW_WRITE_MASK,
            Self::Os => OS_WRITE_MASK,
            Self::Xs => XS_WRITE_MASK,
        }
    }
}

macro_rules! flag_accessors {
    ($($name:ident => $bit:expr),* $(,)?) => {
        $(
            pub const fn $name(self) -> bool {
                self.0 & $bit != 0
            }
        )*
    };
}

/// Eurotherm 902S status word (SW).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusWord(pub u16);

impl StatusWord {
    flag_accessors! {
        fixed_format => SW_DATA_FORMAT,
        sensor_break => SW_SENSOR_BREAK,
        keyboard_locked => SW_KEYLOCK,
        alarm2 => SW_ALARM2,
        alarm1 => SW_ALARM1,
        alarm => SW_ALARMS,
        second_setpoint_active => SW_ACTIVE_SETPOINT,
        remote_active => SW_REMOTE_ACTIVE,
        manual_mode => SW_MANUAL_MODE,
    }
}

/// Eurotherm 902S extension status word (XS).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtensionStatus(pub u16);

impl ExtensionStatus {
    flag_accessors! {
        self_tune => XS_SELF_TUNE,
        adaptive_tune => XS_ADAPTIVE_TUNE,
        broadcast_enabled => XS_ENABLE_BROADCAST,
        pid_control => XS_PID_CONTROL,
        second_pid_active => XS_ACTIVE_PID,
    }
}

/// BVT3000 interface status (IS), read-only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceStatus(pub u16);

impl InterfaceStatus {
    flag_accessors! {
        heater_on => IS_HEATER_ON,
        evaporator_connected => IS_EVAPORATOR_CONNECTED,
        missing_gas_flow => IS_MISSING_GAS_FLOW,
        heater_overheating => IS_HEATER_OVERHEATING,
        exchanger_connected => IS_EXCHANGER_CONNECTED,
        ln2_refill => IS_LN2_REFILL,
        ln2_empty => IS_LN2_EMPTY,
        ln2_heater_on => IS_LN2_HEATER_ON,
        bvt3500_present => IS_BVT3500_PRESENT,
    }
}

pub(crate) fn parse_hex_word(mnemonic: Mnemonic, payload: &str) -> Result<u16> {
    payload
        .strip_prefix('>')
        .map(str::trim)
        .filter(|digits| !digits.is_empty() && digits.len() <= 4)
        .and_then(|digits| u16::from_str_radix(digits, 16).ok())
        .ok_or_else(|| Error::UnexpectedReply {
            mnemonic,
            payload: payload.to_owned(),
        })
}

pub(crate) fn format_hex_word(value: u16) -> String {
    format!(">{value:04x}")
}

/// Word sent after setting or clearing `bits` in `current`.
pub fn masked_update(current: u16, bits: u16, on: bool, mask: u16) -> u16 {
    let updated = if on { current | bits } else { current & !bits };
    updated & mask
}

impl<L: Link> Session<L> {
    pub fn status_word(&mut self, register: StatusRegister) -> Result<u16> {
        let mnemonic = register.mnemonic();
        let payload = self.query(mnemonic)?;
        parse_hex_word(mnemonic, &payload)
    }

    /// Writes `value` with the register's write mask applied.
    pub fn write_status_word(&mut self, register: StatusRegister, value: u16) -> Result<()> {
        let masked = value & register.write_mask();
        debug!(register = %register.mnemonic(), value, masked, "writing status word");
        self.execute(register.mnemonic(), &format_hex_word(masked))
    }

    /// Read-modify-write of `bits`, preserving every other writable bit.
    pub fn update_status_word(
        &mut self,
        register: StatusRegister,
        bits: u16,
        on: bool,
    ) -> Result<()> {
        let current = self.status_word(register)?;
        let updated = masked_update(current, bits, on, register.write_mask());
        self.execute(register.mnemonic(), &format_hex_word(updated))
    }

    pub fn sw(&mut self) -> Result<StatusWord> {
        self.status_word(StatusRegister::Sw).map(StatusWord)
    }

    pub fn xs(&mut self) -> Result<ExtensionStatus> {
        self.status_word(StatusRegister::Xs).map(ExtensionStatus)
    }

    pub fn os(&mut self) -> Result<u16> {
        self.status_word(StatusRegister::Os)
    }

    /// Reads IS. Reserved bits being set means we are not talking to the
    /// firmware we think we are.
    pub fn interface_status(&mut self) -> Result<InterfaceStatus> {
        let payload = self.query(IS)?;
        let value = parse_hex_word(IS, &payload)?;
        if value & IS_RESERVED_MASK != 0 {
            return Err(Error::ReservedBits(value));
        }
        Ok(InterfaceStatus(value))
    }
}
