//! Named controller operations built on queries, commands and status words.
//!
//! Each operation is one `Session` method and runs in its own `debug` span.
//! Values are returned typed; nothing here prints.

use std::fmt;

use tracing::{debug, instrument, warn};

use crate::constants::{
    AF, DISPLAY_MAX, DISPLAY_MIN, H2, HB, HO, HP, HS, IM, L2, LB, LS, MAX_AT_TRIGGER_LEVEL,
    MAX_CUTBACK, MAX_DERIVATIVE_TIME, MAX_INTEGRAL_TIME, MAX_PROPORTIONAL_BAND, NH, NP, OP,
    OPERATION_CONFIGURATION, OPERATION_NORMAL, PERCENT_MAX, PERCENT_MIN, PV, S2, SL, SP,
    SW_ACTIVE_SETPOINT, SW_KEYLOCK, SW_MANUAL_MODE, TD, TI, TR, XP, XS_ADAPTIVE_TUNE,
    XS_SELF_TUNE,
};
use crate::error::{check_range, Error, Result};
use crate::flow::{self, FlowCode, Quantized};
use crate::frame::{Field, Mnemonic};
use crate::protocol::Session;
use crate::registers::{parse_hex_word, StatusRegister};
use crate::transport::Link;

const SETPOINT_FIELD: Field = Field::new(6, 1);
const POWER_FIELD: Field = Field::new(6, 1);
const PID_FIELD: Field = Field::new(6, 2);
const WIDE_PID_FIELD: Field = Field::new(6, 1);
/// `TI`, `HB` and `LB` drop to one decimal from here on.
const WIDE_PID_THRESHOLD: f64 = 999.5;
const LN2_POWER_FIELD: Field = Field::new(5, 2).with_fallback(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Setpoint {
    Sp1,
    Sp2,
}

impl Setpoint {
    const fn value_mnemonic(self) -> Mnemonic {
        match self {
            Self::Sp1 => SL,
            Self::Sp2 => S2,
        }
    }

    const fn limit_mnemonics(self) -> (Mnemonic, Mnemonic) {
        match self {
            Self::Sp1 => (LS, HS),
            Self::Sp2 => (L2, H2),
        }
    }
}

impl fmt::Display for Setpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sp1 => f.write_str("SP1"),
            Self::Sp2 => f.write_str("SP2"),
        }
    }
}

/// Automatic is PID regulation; manual hands output power to the keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Automatic,
    Manual,
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Automatic => f.write_str("AUTO"),
            Self::Manual => f.write_str("MANUAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationMode {
    Normal,
    Configuration,
}

impl OperationMode {
    const fn code(self) -> u8 {
        match self {
            Self::Normal => OPERATION_NORMAL,
            Self::Configuration => OPERATION_CONFIGURATION,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HeaterCondition {
    Ok,
    Overheating,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ln2Tank {
    Ok,
    NeedsRefill,
    Empty,
}

/// Inclusive range reported by the controller.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Limits {
    pub low: f64,
    pub high: f64,
}

fn parse_number(mnemonic: Mnemonic, payload: &str) -> Result<f64> {
    payload
        .trim()
        .parse()
        .map_err(|_| Error::UnexpectedReply {
            mnemonic,
            payload: payload.to_owned(),
        })
}

fn parse_switch(mnemonic: Mnemonic, payload: &str) -> Result<bool> {
    match payload.trim() {
        "1" => Ok(true),
        "0" => Ok(false),
        _ => Err(Error::UnexpectedReply {
            mnemonic,
            payload: payload.to_owned(),
        }),
    }
}

const fn switch(on: bool) -> &'static str {
    if on { "1" } else { "0" }
}

impl<L: Link> Session<L> {
    fn read_number(&mut self, mnemonic: Mnemonic) -> Result<f64> {
        let payload = self.query(mnemonic)?;
        parse_number(mnemonic, &payload)
    }

    fn write_number(&mut self, mnemonic: Mnemonic, field: Field, value: f64) -> Result<()> {
        let data = field.format(value)?;
        self.execute(mnemonic, &data)
    }

    fn write_wide_pid(&mut self, mnemonic: Mnemonic, value: f64) -> Result<()> {
        let field = if value < WIDE_PID_THRESHOLD {
            PID_FIELD
        } else {
            WIDE_PID_FIELD
        };
        self.write_number(mnemonic, field, value)
    }

    fn read_switch(&mut self, mnemonic: Mnemonic) -> Result<bool> {
        let payload = self.query(mnemonic)?;
        parse_switch(mnemonic, &payload)
    }

    /// Measured temperature (PV).
    #[instrument(level = "debug", skip(self))]
    pub fn temperature(&mut self) -> Result<f64> {
        self.read_number(PV)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn setpoint(&mut self, setpoint: Setpoint) -> Result<f64> {
        self.read_number(setpoint.value_mnemonic())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_setpoint(&mut self, setpoint: Setpoint, value: f64) -> Result<()> {
        self.write_number(setpoint.value_mnemonic(), SETPOINT_FIELD, value)
    }

    /// Temperature the controller is currently regulating to.
    #[instrument(level = "debug", skip(self))]
    pub fn working_setpoint(&mut self) -> Result<f64> {
        self.read_number(SP)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn active_setpoint(&mut self) -> Result<Setpoint> {
        Ok(if self.sw()?.second_setpoint_active() {
            Setpoint::Sp2
        } else {
            Setpoint::Sp1
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_active_setpoint(&mut self, setpoint: Setpoint) -> Result<()> {
        self.update_status_word(
            StatusRegister::Sw,
            SW_ACTIVE_SETPOINT,
            setpoint == Setpoint::Sp2,
        )
    }

    #[instrument(level = "debug", skip(self))]
    pub fn setpoint_limits(&mut self, setpoint: Setpoint) -> Result<Limits> {
        let (low, high) = setpoint.limit_mnemonics();
        Ok(Limits {
            low: self.read_number(low)?,
            high: self.read_number(high)?,
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn heater_state(&mut self) -> Result<bool> {
        self.read_switch(HP)
    }

    /// Switches the heater relay. Switching on is refused while the
    /// interface reports missing gas flow.
    #[instrument(level = "debug", skip(self))]
    pub fn set_heater_state(&mut self, on: bool) -> Result<()> {
        if on && self.interface_status()?.missing_gas_flow() {
            return Err(Error::Precondition(
                "cannot switch heater on, gas flow is missing",
            ));
        }
        self.actuate(HP, switch(on))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn check_heater(&mut self) -> Result<HeaterCondition> {
        Ok(if self.interface_status()?.heater_overheating() {
            HeaterCondition::Overheating
        } else {
            HeaterCondition::Ok
        })
    }

    /// Output power in percent.
    #[instrument(level = "debug", skip(self))]
    pub fn heater_power(&mut self) -> Result<f64> {
        self.read_number(OP)
    }

    /// Only accepted in automatic mode; SW is read first and nothing is
    /// sent otherwise.
    #[instrument(level = "debug", skip(self))]
    pub fn set_heater_power(&mut self, percent: f64) -> Result<()> {
        check_range("heater power", percent, PERCENT_MIN, PERCENT_MAX)?;
        if self.mode()? != Mode::Automatic {
            return Err(Error::Precondition(
                "heater power can only be set in automatic mode",
            ));
        }
        self.write_number(OP, POWER_FIELD, percent)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn heater_power_limit(&mut self) -> Result<f64> {
        self.read_number(HO)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_heater_power_limit(&mut self, percent: f64) -> Result<()> {
        check_range("heater power limit", percent, PERCENT_MIN, PERCENT_MAX)?;
        if !self.heater_state()? {
            warn!("heater is off, power limit takes effect once it is switched on");
        }
        self.write_number(HO, POWER_FIELD, percent)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn mode(&mut self) -> Result<Mode> {
        Ok(if self.sw()?.manual_mode() {
            Mode::Manual
        } else {
            Mode::Automatic
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_mode(&mut self, mode: Mode) -> Result<()> {
        self.update_status_word(StatusRegister::Sw, SW_MANUAL_MODE, mode == Mode::Manual)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn operation_mode(&mut self) -> Result<OperationMode> {
        let payload = self.query(IM)?;
        match payload.trim().parse::<u8>() {
            Ok(OPERATION_NORMAL) => Ok(OperationMode::Normal),
            Ok(OPERATION_CONFIGURATION) => Ok(OperationMode::Configuration),
            _ => Err(Error::UnexpectedReply {
                mnemonic: IM,
                payload,
            }),
        }
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_operation_mode(&mut self, mode: OperationMode) -> Result<()> {
        self.execute(IM, &format!(" {}", mode.code()))
    }

    /// `true` when the thermocouple / PT100 line is broken.
    #[instrument(level = "debug", skip(self))]
    pub fn check_sensor_break(&mut self) -> Result<bool> {
        Ok(self.sw()?.sensor_break())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn alarm_state(&mut self) -> Result<bool> {
        Ok(self.sw()?.alarm())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn self_tune(&mut self) -> Result<bool> {
        Ok(self.xs()?.self_tune())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_self_tune(&mut self, on: bool) -> Result<()> {
        self.update_status_word(StatusRegister::Xs, XS_SELF_TUNE, on)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn adaptive_tune(&mut self) -> Result<bool> {
        Ok(self.xs()?.adaptive_tune())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_adaptive_tune(&mut self, on: bool) -> Result<()> {
        self.update_status_word(StatusRegister::Xs, XS_ADAPTIVE_TUNE, on)
    }

    /// Which of the two PID parameter sets is in use.
    #[instrument(level = "debug", skip(self))]
    pub fn active_pid(&mut self) -> Result<u8> {
        Ok(if self.xs()?.second_pid_active() { 2 } else { 1 })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn adaptive_tune_trigger(&mut self) -> Result<f64> {
        self.read_number(TR)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_adaptive_tune_trigger(&mut self, level: f64) -> Result<()> {
        check_range("adaptive tune trigger", level, 0.0, MAX_AT_TRIGGER_LEVEL)?;
        self.execute(TR, &format!("{level:.2}"))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn proportional_band(&mut self) -> Result<f64> {
        self.read_number(XP)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_proportional_band(&mut self, band: f64) -> Result<()> {
        check_range("proportional band", band, 0.0, MAX_PROPORTIONAL_BAND)?;
        self.write_number(XP, PID_FIELD, band)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn integral_time(&mut self) -> Result<f64> {
        self.read_number(TI)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_integral_time(&mut self, seconds: f64) -> Result<()> {
        check_range("integral time", seconds, 0.0, MAX_INTEGRAL_TIME)?;
        self.write_wide_pid(TI, seconds)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn derivative_time(&mut self) -> Result<f64> {
        self.read_number(TD)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_derivative_time(&mut self, seconds: f64) -> Result<()> {
        check_range("derivative time", seconds, 0.0, MAX_DERIVATIVE_TIME)?;
        self.write_number(TD, PID_FIELD, seconds)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn cutback_high(&mut self) -> Result<f64> {
        self.read_number(HB)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_cutback_high(&mut self, value: f64) -> Result<()> {
        check_range("cutback high", value, 0.0, MAX_CUTBACK)?;
        self.write_wide_pid(HB, value)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn cutback_low(&mut self) -> Result<f64> {
        self.read_number(LB)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_cutback_low(&mut self, value: f64) -> Result<()> {
        check_range("cutback low", value, 0.0, MAX_CUTBACK)?;
        self.write_wide_pid(LB, value)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn display_limits(&mut self) -> Result<Limits> {
        Ok(Limits {
            low: self.read_number(DISPLAY_MIN)?,
            high: self.read_number(DISPLAY_MAX)?,
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn keyboard_locked(&mut self) -> Result<bool> {
        Ok(self.sw()?.keyboard_locked())
    }

    #[instrument(level = "debug", skip(self))]
    pub fn lock_keyboard(&mut self, lock: bool) -> Result<()> {
        self.update_status_word(StatusRegister::Sw, SW_KEYLOCK, lock)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn ln2_heater_state(&mut self) -> Result<bool> {
        self.read_switch(NP)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_ln2_heater_state(&mut self, on: bool) -> Result<()> {
        self.actuate(NP, switch(on))
    }

    #[instrument(level = "debug", skip(self))]
    pub fn ln2_heater_power(&mut self) -> Result<f64> {
        self.read_number(NH)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn set_ln2_heater_power(&mut self, percent: f64) -> Result<()> {
        check_range("LN2 heater power", percent, PERCENT_MIN, PERCENT_MAX)?;
        self.write_number(NH, LN2_POWER_FIELD, percent)
    }

    #[instrument(level = "debug", skip(self))]
    pub fn check_ln2(&mut self) -> Result<Ln2Tank> {
        let status = self.interface_status()?;
        Ok(if status.ln2_empty() {
            Ln2Tank::Empty
        } else if status.ln2_refill() {
            Ln2Tank::NeedsRefill
        } else {
            Ln2Tank::Ok
        })
    }

    #[instrument(level = "debug", skip(self))]
    pub fn flow_code(&mut self) -> Result<FlowCode> {
        let payload = self.query(AF)?;
        FlowCode::from_wire(AF, &payload)
    }

    /// Gas flow in l/h.
    #[instrument(level = "debug", skip(self))]
    pub fn flow_rate(&mut self) -> Result<f64> {
        self.flow_code().map(FlowCode::rate)
    }

    /// Sets the nearest calibrated rate. The heater must be on.
    #[instrument(level = "debug", skip(self))]
    pub fn set_flow_rate(&mut self, l_per_h: f64) -> Result<Quantized> {
        let quantized = flow::encode(l_per_h)?;
        if !self.heater_state()? {
            return Err(Error::Precondition(
                "cannot change gas flow rate with heater off",
            ));
        }
        self.execute(AF, &quantized.code.to_wire())?;
        let readback = self.flow_code()?;
        debug!(code = %quantized.code, %readback, "flow code written");
        Ok(quantized)
    }

    /// Reads digital port `P1`..`P4`.
    #[instrument(level = "debug", skip(self))]
    pub fn read_port(&mut self, port: u8) -> Result<u8> {
        if !(1..=4).contains(&port) {
            return Err(Error::out_of_range("port", f64::from(port), 1.0, 4.0));
        }
        let mnemonic = Mnemonic::from_bytes([b'P', b'0' + port]);
        let payload = self.query(mnemonic)?;
        parse_hex_word(mnemonic, &payload)
            .ok()
            .filter(|value| *value <= 0x0F)
            .and_then(|value| u8::try_from(value).ok())
            .ok_or(Error::UnexpectedReply { mnemonic, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::{HeaterCondition, Limits, Ln2Tank, Mode, OperationMode, Setpoint};
    use crate::constants::{
        AF, HO, HP, IM, IS_HEATER_OVERHEATING, IS_LN2_EMPTY, IS_LN2_REFILL,
        IS_MISSING_GAS_FLOW, NH, OP, S2, SETTLE_DELAY, SL, SW, SW_DATA_FORMAT, SW_MANUAL_MODE,
        SW_SENSOR_BREAK, TI, XS,
    };
    use crate::error::{Error, ErrorKind};
    use crate::frame::Address;
    use crate::protocol::Session;
    use crate::registers::StatusRegister;
    use crate::sim::{Event, Fault, SimController};

    fn sim_session() -> Session<SimController> {
        Session::new(SimController::new(), Address::default())
    }

    fn sent(session: &Session<SimController>) -> Vec<(String, String)> {
        session
            .link()
            .events()
            .iter()
            .filter_map(|event| match event {
                Event::Command(mnemonic, data) => Some((mnemonic.to_string(), data.clone())),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn reads_temperature_and_setpoints() {
        let mut session = sim_session();
        assert_eq!(session.temperature().expect("pv"), 23.4);
        assert_eq!(session.setpoint(Setpoint::Sp1).expect("sl"), 25.0);
        assert_eq!(session.setpoint(Setpoint::Sp2).expect("s2"), 30.0);
        assert_eq!(
            session.setpoint_limits(Setpoint::Sp1).expect("limits"),
            Limits {
                low: 73.0,
                high: 1273.0
            }
        );
    }

    #[test]
    fn setpoint_uses_six_wide_field() {
        let mut session = sim_session();
        session.set_setpoint(Setpoint::Sp1, 300.0).expect("set");
        session.set_setpoint(Setpoint::Sp2, -12.34).expect("set");
        assert_eq!(
            sent(&session),
            [
                (SL.to_string(), " 300.0".to_owned()),
                (S2.to_string(), " -12.3".to_owned())
            ]
        );
        assert_eq!(session.setpoint(Setpoint::Sp1).expect("sl"), 300.0);
    }

    #[test]
    fn oversized_setpoint_never_reaches_the_device() {
        let mut session = sim_session();
        let err = session
            .set_setpoint(Setpoint::Sp1, 123_456.0)
            .expect_err("too wide");
        assert!(matches!(err, Error::FieldOverflow { .. }));
        assert!(session.link().events().is_empty());
    }

    #[test]
    fn active_setpoint_toggles_sw_bit() {
        let mut session = sim_session();
        assert_eq!(session.active_setpoint().expect("sw"), Setpoint::Sp1);
        session.set_active_setpoint(Setpoint::Sp2).expect("set");
        assert_eq!(session.active_setpoint().expect("sw"), Setpoint::Sp2);
        assert_eq!(session.working_setpoint().expect("sp"), 30.0);
    }

    #[test]
    fn heater_switch_settles_after_ack() {
        let mut session = sim_session();
        session.set_heater_state(true).expect("heater on");
        assert!(session.link().heater_on());
        assert_eq!(
            session.link().events().last(),
            Some(&Event::Settle(SETTLE_DELAY))
        );
        assert!(session.heater_state().expect("hp"));
    }

    #[test]
    fn heater_refuses_to_start_without_gas_flow() {
        let mut sim = SimController::new();
        sim.set_interface_status(IS_MISSING_GAS_FLOW);
        let mut session = Session::new(sim, Address::default());
        let err = session.set_heater_state(true).expect_err("no gas");
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(session.link().commands(), 0);

        // switching off is always allowed
        session.set_heater_state(false).expect("heater off");
        assert_eq!(sent(&session), [(HP.to_string(), "0".to_owned())]);
    }

    #[test]
    fn heater_power_needs_automatic_mode() {
        let mut sim = SimController::new();
        sim.set_status_word(StatusRegister::Sw, SW_DATA_FORMAT | SW_MANUAL_MODE);
        let mut session = Session::new(sim, Address::default());

        let err = session.set_heater_power(50.0).expect_err("manual mode");
        assert!(matches!(err, Error::Precondition(_)));
        assert!(err.to_string().contains("automatic mode"));
        assert_eq!(session.link().commands(), 0);
    }

    #[test]
    fn heater_power_in_automatic_mode() {
        let mut session = sim_session();
        session.set_heater_power(42.5).expect("auto mode");
        assert_eq!(sent(&session), [(OP.to_string(), "  42.5".to_owned())]);
        assert_eq!(session.heater_power().expect("op"), 42.5);
    }

    #[test]
    fn percent_arguments_are_range_checked_before_any_traffic() {
        let mut session = sim_session();
        for value in [-0.1, 100.1, f64::NAN] {
            assert!(session.set_heater_power(value).is_err());
            assert!(session.set_heater_power_limit(value).is_err());
            assert!(session.set_ln2_heater_power(value).is_err());
        }
        assert!(session.link().events().is_empty());
    }

    #[test]
    fn power_limit_is_written_even_with_heater_off() {
        let mut session = sim_session();
        session.set_heater_power_limit(80.0).expect("limit");
        assert_eq!(sent(&session), [(HO.to_string(), "  80.0".to_owned())]);
        assert_eq!(session.heater_power_limit().expect("ho"), 80.0);
    }

    #[test]
    fn mode_round_trips_through_status_word() {
        let mut session = sim_session();
        assert_eq!(session.mode().expect("sw"), Mode::Automatic);
        session.set_mode(Mode::Manual).expect("manual");
        assert_eq!(session.mode().expect("sw"), Mode::Manual);
        assert_eq!(
            session.link().status_word(StatusRegister::Sw),
            SW_DATA_FORMAT | SW_MANUAL_MODE
        );
    }

    #[test]
    fn operation_mode_uses_space_padded_digit() {
        let mut session = sim_session();
        assert_eq!(session.operation_mode().expect("im"), OperationMode::Normal);
        session
            .set_operation_mode(OperationMode::Configuration)
            .expect("set");
        assert_eq!(sent(&session), [(IM.to_string(), " 2".to_owned())]);
        assert_eq!(
            session.operation_mode().expect("im"),
            OperationMode::Configuration
        );
    }

    #[test]
    fn status_flags_are_decoded() {
        let mut sim = SimController::new();
        sim.set_status_word(StatusRegister::Sw, SW_SENSOR_BREAK | 0x1000);
        sim.set_status_word(StatusRegister::Xs, 0x0023);
        sim.set_interface_status(IS_HEATER_OVERHEATING | IS_LN2_REFILL);
        let mut session = Session::new(sim, Address::default());

        assert!(session.check_sensor_break().expect("sw"));
        assert!(session.alarm_state().expect("sw"));
        assert!(session.self_tune().expect("xs"));
        assert!(session.adaptive_tune().expect("xs"));
        assert_eq!(session.active_pid().expect("xs"), 2);
        assert_eq!(
            session.check_heater().expect("is"),
            HeaterCondition::Overheating
        );
        assert_eq!(session.check_ln2().expect("is"), Ln2Tank::NeedsRefill);
    }

    #[test]
    fn empty_tank_wins_over_refill() {
        let mut sim = SimController::new();
        sim.set_interface_status(IS_LN2_EMPTY | IS_LN2_REFILL);
        let mut session = Session::new(sim, Address::default());
        assert_eq!(session.check_ln2().expect("is"), Ln2Tank::Empty);
    }

    #[test]
    fn tuning_flags_only_touch_their_bit() {
        let mut session = sim_session();
        session.set_self_tune(true).expect("self tune");
        session.set_adaptive_tune(true).expect("adaptive tune");
        session.set_self_tune(false).expect("self tune");
        assert_eq!(session.link().status_word(StatusRegister::Xs), 0x0002);
        assert_eq!(sent(&session).last(), Some(&(XS.to_string(), ">0002".to_owned())));
    }

    #[test]
    fn keyboard_lock_sets_and_clears() {
        let mut session = sim_session();
        session.lock_keyboard(true).expect("lock");
        assert!(session.keyboard_locked().expect("sw"));
        session.lock_keyboard(false).expect("unlock");
        assert!(!session.keyboard_locked().expect("sw"));
        assert_eq!(sent(&session)[0], (SW.to_string(), ">0005".to_owned()));
    }

    #[test]
    fn pid_parameters_use_their_field_formats() {
        let mut session = sim_session();
        session.set_proportional_band(36.0).expect("xp");
        session.set_integral_time(999.0).expect("ti");
        session.set_integral_time(999.7).expect("ti");
        session.set_integral_time(1200.0).expect("ti");
        session.set_derivative_time(2.8).expect("td");
        session.set_cutback_high(56.2).expect("hb");
        session.set_cutback_low(9999.0).expect("lb");
        session.set_adaptive_tune_trigger(4.6).expect("tr");
        let data: Vec<String> = sent(&session).into_iter().map(|(_, data)| data).collect();
        assert_eq!(
            data,
            [" 36.00", "999.00", " 999.7", "1200.0", "  2.80", " 56.20", "9999.0", "4.60"]
        );
        assert_eq!(session.integral_time().expect("ti"), 1200.0);
    }

    #[test]
    fn pid_ranges_are_enforced() {
        let mut session = sim_session();
        assert!(session.set_proportional_band(1000.0).is_err());
        assert!(session.set_integral_time(10_000.0).is_err());
        assert!(session.set_derivative_time(-1.0).is_err());
        assert!(session.set_cutback_low(-0.5).is_err());
        let err = session
            .set_adaptive_tune_trigger(231.8)
            .expect_err("above trigger maximum");
        assert!(err.to_string().contains("adaptive tune trigger"));
        assert!(session.link().events().is_empty());
        assert_eq!(session.adaptive_tune_trigger().expect("tr"), 4.6);
    }

    #[test]
    fn ln2_heater_power_falls_back_to_one_decimal() {
        let mut session = sim_session();
        session.set_ln2_heater_power(35.5).expect("nh");
        session.set_ln2_heater_power(100.0).expect("nh");
        assert_eq!(
            sent(&session),
            [
                (NH.to_string(), "35.50".to_owned()),
                (NH.to_string(), "100.0".to_owned())
            ]
        );
    }

    #[test]
    fn ln2_heater_switch_settles() {
        let mut session = sim_session();
        session.set_ln2_heater_state(true).expect("np");
        assert!(session.ln2_heater_state().expect("np"));
        assert!(
            session
                .link()
                .events()
                .contains(&Event::Settle(SETTLE_DELAY))
        );
    }

    #[test]
    fn flow_rate_requires_heater_on() {
        let mut session = sim_session();
        let err = session.set_flow_rate(1600.0).expect_err("heater off");
        assert!(matches!(err, Error::Precondition(_)));
        assert_eq!(session.link().commands(), 0);

        session.set_heater_state(true).expect("heater on");
        let quantized = session.set_flow_rate(1600.0).expect("heater on");
        assert_eq!(quantized.code.value(), 12);
        assert!(quantized.adjustment.is_none());
        assert_eq!(sent(&session).last(), Some(&(AF.to_string(), ">1100".to_owned())));
        assert_eq!(session.flow_rate().expect("af"), 1600.0);
    }

    #[test]
    fn out_of_range_flow_is_rejected_before_heater_check() {
        let mut session = sim_session();
        assert!(matches!(
            session.set_flow_rate(2001.0).expect_err("too high"),
            Error::OutOfRange { .. }
        ));
        assert!(session.link().events().is_empty());
    }

    #[test]
    fn reads_display_limits_and_ports() {
        let mut session = sim_session();
        assert_eq!(
            session.display_limits().expect("limits"),
            Limits {
                low: 73.0,
                high: 1273.0
            }
        );
        assert_eq!(session.read_port(3).expect("p3"), 0);
        assert!(session.read_port(5).is_err());
    }

    #[test]
    fn garbage_numeric_reply_is_fatal() {
        let mut sim = SimController::new();
        sim.set_value(TI, "abc");
        let mut session = Session::new(sim, Address::default());
        let err = session.integral_time().expect_err("garbage");
        assert!(matches!(err, Error::UnexpectedReply { mnemonic, .. } if mnemonic == TI));
        assert!(err.is_fatal());
    }

    #[test]
    fn rejected_setpoint_surfaces_as_rejected() {
        let mut session = sim_session();
        session.link_mut().inject(Fault::Nak);
        let err = session
            .set_setpoint(Setpoint::Sp1, 50.0)
            .expect_err("nak");
        assert_eq!(err.kind(), ErrorKind::Rejected);
        assert_eq!(session.temperature().expect("still in sync"), 23.4);
    }
}
