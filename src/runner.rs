//! Runs the requested operations in a fixed order and prints one
//! `***TAG: value` line per result.

use std::fmt::Display;
use std::io::Write;

use bvt3000_ctl::{HeaterCondition, Link, Ln2Tank, Mode, Session, Setpoint};
use color_eyre::eyre::{self, WrapErr};
use tracing::{error, info, warn};

/// What to do, resolved from the command line.
#[allow(clippy::struct_excessive_bools)]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Plan {
    pub read_temperature: bool,
    pub check_sensor_break: bool,
    pub check_heater: bool,
    pub heater_state: bool,
    pub set_heater: Option<bool>,
    pub get_power_limit: bool,
    pub set_power_limit: Option<f64>,
    pub set_power: Option<f64>,
    pub get_power: bool,
    pub set_mode: Option<Mode>,
    pub get_mode: bool,
    pub get_flow: bool,
    pub set_flow: Option<f64>,
    pub get_setpoint: bool,
    pub set_setpoint: Option<f64>,
    pub alarm: bool,
    pub lock_keypad: Option<bool>,
    pub get_proportional_band: bool,
    pub get_integral_time: bool,
    pub get_derivative_time: bool,
    pub set_proportional_band: Option<f64>,
    pub set_integral_time: Option<f64>,
    pub set_derivative_time: Option<f64>,
    pub get_ln2_heater_state: bool,
    pub set_ln2_heater_state: Option<bool>,
    pub get_ln2_heater_power: bool,
    pub set_ln2_heater_power: Option<f64>,
    pub check_ln2: bool,
}

struct Runner<'a, L, W> {
    session: &'a mut Session<L>,
    out: W,
    failures: usize,
}

/// Executes `plan`. Device refusals and local validation failures are
/// logged and counted; the first communication failure aborts the rest.
pub fn run<L: Link, W: Write>(
    session: &mut Session<L>,
    plan: &Plan,
    out: W,
) -> eyre::Result<usize> {
    let mut runner = Runner {
        session,
        out,
        failures: 0,
    };
    runner.run(plan)?;
    Ok(runner.failures)
}

fn on_off(on: bool) -> &'static str {
    if on { "ON" } else { "OFF" }
}

impl<L: Link, W: Write> Runner<'_, L, W> {
    fn attempt<T>(
        &mut self,
        operation: &'static str,
        call: impl FnOnce(&mut Session<L>) -> bvt3000_ctl::Result<T>,
    ) -> eyre::Result<Option<T>> {
        match call(&mut *self.session) {
            Ok(value) => Ok(Some(value)),
            Err(err) if err.is_fatal() => {
                Err(eyre::Report::new(err).wrap_err(format!("{operation} failed")))
            }
            Err(err) => {
                error!(operation, %err, "operation failed");
                self.failures += 1;
                Ok(None)
            }
        }
    }

    fn report(&mut self, tag: &str, value: impl Display) -> eyre::Result<()> {
        writeln!(self.out, "***{tag:<4}: {value}").wrap_err("failed to write report")
    }

    fn report_number(&mut self, tag: &str, value: f64) -> eyre::Result<()> {
        self.report(tag, format_args!("{value:.6}"))
    }

    fn read_heater_state(&mut self) -> eyre::Result<()> {
        if let Some(on) = self.attempt("heater state", Session::heater_state)? {
            self.report("HSC", on_off(on))?;
        }
        Ok(())
    }

    fn run(&mut self, plan: &Plan) -> eyre::Result<()> {
        if plan.read_temperature
            && let Some(temperature) = self.attempt("read temperature", Session::temperature)?
        {
            self.report_number("TEMP", temperature)?;
        }

        if plan.check_sensor_break {
            match self.attempt("sensor break check", Session::check_sensor_break)? {
                Some(true) => {
                    warn!("PT100/thermocouple sensor break");
                    self.report("SBC", "FAIL")?;
                }
                Some(false) => self.report("SBC", "OK")?,
                None => {}
            }
        }

        if plan.check_heater {
            match self.attempt("heater check", Session::check_heater)? {
                Some(HeaterCondition::Overheating) => {
                    self.report("HCC", "FAIL")?;
                    if self
                        .attempt("disable heater", |session| session.set_heater_state(false))?
                        .is_some()
                    {
                        warn!("heater overheating, heater disabled");
                    }
                }
                Some(HeaterCondition::Ok) => self.report("HCC", "OK")?,
                None => {}
            }
        }

        if plan.heater_state {
            self.read_heater_state()?;
        }

        if let Some(on) = plan.set_heater {
            info!(on, "switching heater");
            self.attempt("switch heater", |session| session.set_heater_state(on))?;
            self.read_heater_state()?;
        }

        if plan.get_power_limit
            && let Some(limit) = self.attempt("heater power limit", Session::heater_power_limit)?
        {
            self.report_number("HPWL", limit)?;
        }

        if let Some(limit) = plan.set_power_limit {
            self.attempt("set heater power limit", |session| {
                session.set_heater_power_limit(limit)
            })?;
        }

        if let Some(power) = plan.set_power {
            self.attempt("set heater power", |session| session.set_heater_power(power))?;
        }

        if plan.get_power
            && let Some(power) = self.attempt("heater power", Session::heater_power)?
        {
            self.report_number("HPWR", power)?;
        }

        if let Some(mode) = plan.set_mode {
            self.attempt("set mode", |session| session.set_mode(mode))?;
        }

        if plan.get_mode
            && let Some(mode) = self.attempt("mode", Session::mode)?
        {
            self.report("PIDM", mode)?;
        }

        if plan.get_flow
            && let Some(rate) = self.attempt("gas flow rate", Session::flow_rate)?
        {
            self.report_number("GASR", rate)?;
        }

        if let Some(rate) = plan.set_flow {
            self.attempt("set gas flow rate", |session| session.set_flow_rate(rate))?;
        }

        if plan.get_setpoint
            && let Some(value) =
                self.attempt("setpoint", |session| session.setpoint(Setpoint::Sp1))?
        {
            self.report_number("TSP", value)?;
        }

        if let Some(value) = plan.set_setpoint {
            self.attempt("set setpoint", |session| {
                session.set_setpoint(Setpoint::Sp1, value)
            })?;
        }

        if plan.alarm
            && let Some(alarm) = self.attempt("alarm state", Session::alarm_state)?
        {
            self.report("EALM", on_off(alarm))?;
        }

        if let Some(lock) = plan.lock_keypad {
            self.attempt("keypad lock", |session| session.lock_keyboard(lock))?;
        }

        if plan.get_proportional_band
            && let Some(value) = self.attempt("proportional band", Session::proportional_band)?
        {
            self.report_number("PPID", value)?;
        }

        if plan.get_integral_time
            && let Some(value) = self.attempt("integral time", Session::integral_time)?
        {
            self.report_number("IPID", value)?;
        }

        if plan.get_derivative_time
            && let Some(value) = self.attempt("derivative time", Session::derivative_time)?
        {
            self.report_number("DPID", value)?;
        }

        if let Some(value) = plan.set_proportional_band {
            self.attempt("set proportional band", |session| {
                session.set_proportional_band(value)
            })?;
        }

        if let Some(value) = plan.set_integral_time {
            self.attempt("set integral time", |session| session.set_integral_time(value))?;
        }

        if let Some(value) = plan.set_derivative_time {
            self.attempt("set derivative time", |session| {
                session.set_derivative_time(value)
            })?;
        }

        if plan.get_ln2_heater_state
            && let Some(on) = self.attempt("LN2 heater state", Session::ln2_heater_state)?
        {
            self.report("N2HE", on_off(on))?;
        }

        if let Some(on) = plan.set_ln2_heater_state {
            self.attempt("switch LN2 heater", |session| {
                session.set_ln2_heater_state(on)
            })?;
        }

        if plan.get_ln2_heater_power
            && let Some(power) = self.attempt("LN2 heater power", Session::ln2_heater_power)?
        {
            self.report_number("N2HP", power)?;
        }

        if let Some(power) = plan.set_ln2_heater_power {
            self.attempt("set LN2 heater power", |session| {
                session.set_ln2_heater_power(power)
            })?;
        }

        if plan.check_ln2
            && let Some(tank) = self.attempt("LN2 tank check", Session::check_ln2)?
        {
            let state = match tank {
                Ln2Tank::Ok => "OK",
                Ln2Tank::NeedsRefill => "FILL_ME",
                Ln2Tank::Empty => "EMPTY",
            };
            self.report("N2TK", state)?;
        }

        Ok(())
    }
}
