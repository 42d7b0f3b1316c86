mod interface;
mod runner;

use std::io;

use bvt3000_ctl::constants::{DEFAULT_BAUD, DEFAULT_DEVICE, DEFAULT_GROUP};
use bvt3000_ctl::sim::SimController;
use bvt3000_ctl::{transport, Address, Link, Mode, SerialLink, Session, SessionConfig};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser};
use color_eyre::eyre::{self, WrapErr};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use interface::InterfaceMode;
use runner::Plan;

#[allow(clippy::struct_excessive_bools)]
#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Bruker BVT3000 / Eurotherm 902S command line controller")]
struct Args {
    /// Serial port path (e.g. /dev/ttyUSB0)
    #[arg(short, long)]
    port: Option<String>,

    /// Serial baud rate
    #[arg(short, long)]
    baud: Option<u32>,

    /// Bi-Synch group id
    #[arg(long, default_value_t = DEFAULT_GROUP)]
    group: u8,

    /// Bi-Synch device id within the group
    #[arg(long, default_value_t = DEFAULT_DEVICE)]
    device_id: u8,

    /// Device interface
    #[arg(short = 'I', long, value_enum, default_value_t = InterfaceMode::Serial)]
    interface: InterfaceMode,

    /// More log output on stderr (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,

    /// List serial ports and exit
    #[arg(short, long)]
    list_devices: bool,

    /// Run every status check
    #[arg(short, long)]
    status_all: bool,

    /// Read the measured temperature
    #[arg(short = 't', long)]
    read_temperature: bool,

    /// Check for a thermocouple / PT100 sensor break
    #[arg(long)]
    check_sensor_break: bool,

    /// Check for heater overheating; an overheating heater is switched off
    #[arg(long)]
    check_heater: bool,

    /// Report whether the heater is on
    #[arg(long)]
    get_heater_state: bool,

    /// Switch the heater on
    #[arg(long, conflicts_with = "heater_off")]
    heater_on: bool,

    /// Switch the heater off
    #[arg(long)]
    heater_off: bool,

    #[arg(long)]
    get_heater_power_limit: bool,

    /// Maximum heater power in percent
    #[arg(long, value_name = "PERCENT")]
    set_heater_power_limit: Option<f64>,

    /// Heater power in percent (automatic mode only)
    #[arg(long, value_name = "PERCENT")]
    set_heater_power: Option<f64>,

    #[arg(long)]
    get_heater_power: bool,

    /// Switch to automatic (PID) control
    #[arg(long, conflicts_with = "manual_mode")]
    enable_pid_control: bool,

    /// Switch to manual control
    #[arg(long)]
    manual_mode: bool,

    /// Report automatic or manual mode
    #[arg(long)]
    get_mode: bool,

    /// Report the gas flow in l/h
    #[arg(long)]
    get_gas_flow_rate: bool,

    /// Gas flow in l/h, rounded to the nearest calibrated rate (heater must be on)
    #[arg(long, value_name = "L_PER_H")]
    set_gas_flow_rate: Option<f64>,

    #[arg(long)]
    get_temperature_setpoint: bool,

    /// Setpoint SP1
    #[arg(long, value_name = "TEMP", allow_negative_numbers = true)]
    set_temperature_setpoint: Option<f64>,

    /// Report the controller alarm state
    #[arg(long)]
    get_eurotherm_status: bool,

    /// Lock (1) or unlock (0) the front keypad
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    lock_keypad: Option<bool>,

    #[arg(long)]
    get_proportional_band: bool,

    #[arg(long)]
    get_integral_time: bool,

    #[arg(long)]
    get_derivative_time: bool,

    #[arg(long, value_name = "VALUE")]
    set_proportional_band: Option<f64>,

    #[arg(long, value_name = "SECONDS")]
    set_integral_time: Option<f64>,

    #[arg(long, value_name = "SECONDS")]
    set_derivative_time: Option<f64>,

    #[arg(long)]
    get_ln2_heater_state: bool,

    /// Switch the LN2 heater on (1) or off (0)
    #[arg(long, value_name = "BOOL", value_parser = BoolishValueParser::new())]
    set_ln2_heater_state: Option<bool>,

    #[arg(long)]
    get_ln2_heater_power: bool,

    /// LN2 heater power in percent
    #[arg(long, value_name = "PERCENT")]
    set_ln2_heater_power: Option<f64>,

    /// Report the LN2 tank level
    #[arg(long)]
    check_ln2_heater: bool,
}

#[derive(Debug, Clone)]
struct RuntimeArgs {
    port: Option<String>,
    interface: InterfaceMode,
    config: SessionConfig,
    plan: Plan,
}

fn main() -> eyre::Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.verbose);

    if args.list_devices {
        return list_devices();
    }

    let runtime = resolve_runtime_args(&args)?;
    let link = open_link(&runtime)?;
    let mut session = Session::new(link, runtime.config.address);

    let outcome = runner::run(&mut session, &runtime.plan, io::stdout().lock());

    match session.close() {
        Ok(()) => info!("session closed"),
        Err(err) => warn!(%err, "error while closing session"),
    }

    let failures = outcome?;
    if failures > 0 {
        return Err(eyre::eyre!("{failures} operation(s) failed"));
    }
    Ok(())
}

fn init_tracing(verbosity: u8) {
    let default = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

fn list_devices() -> eyre::Result<()> {
    let ports = transport::available_ports().wrap_err("failed to enumerate serial ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        println!("{}", port.port_name);
    }
    Ok(())
}

fn open_link(runtime: &RuntimeArgs) -> eyre::Result<Box<dyn Link + Send>> {
    match (runtime.interface, &runtime.port) {
        (InterfaceMode::Serial, Some(port)) => {
            let link = SerialLink::open(port, runtime.config.baud)
                .wrap_err_with(|| format!("unable to open serial port {port}"))?;
            Ok(Box::new(link))
        }
        (InterfaceMode::Serial, None) => Err(eyre::eyre!("serial port required")),
        (InterfaceMode::Simulation, _) => {
            info!("using simulated controller");
            Ok(Box::new(
                SimController::new().with_address(runtime.config.address),
            ))
        }
    }
}

fn resolve_runtime_args(args: &Args) -> eyre::Result<RuntimeArgs> {
    let interface = {
        #[cfg(debug_assertions)]
        {
            resolve_interface_mode(args)
        }
        #[cfg(not(debug_assertions))]
        {
            resolve_interface_mode(args)?
        }
    };
    let baud = args.baud.unwrap_or(DEFAULT_BAUD);
    let address = Address::new(args.group, args.device_id).wrap_err("invalid bus address")?;

    let port = if interface.needs_port() {
        Some(args.port.clone().ok_or_else(|| {
            eyre::eyre!("serial port required unless using simulation interface")
        })?)
    } else {
        None
    };

    Ok(RuntimeArgs {
        port,
        interface,
        config: SessionConfig { address, baud },
        plan: resolve_plan(args),
    })
}

fn resolve_plan(args: &Args) -> Plan {
    let set_heater = if args.heater_on {
        Some(true)
    } else if args.heater_off {
        Some(false)
    } else {
        None
    };
    let set_mode = if args.enable_pid_control {
        Some(Mode::Automatic)
    } else if args.manual_mode {
        Some(Mode::Manual)
    } else {
        None
    };

    Plan {
        read_temperature: args.read_temperature,
        check_sensor_break: args.check_sensor_break || args.status_all,
        check_heater: args.check_heater || args.status_all,
        heater_state: args.get_heater_state || args.status_all,
        set_heater,
        get_power_limit: args.get_heater_power_limit,
        set_power_limit: args.set_heater_power_limit,
        set_power: args.set_heater_power,
        get_power: args.get_heater_power,
        set_mode,
        get_mode: args.get_mode || args.status_all,
        get_flow: args.get_gas_flow_rate,
        set_flow: args.set_gas_flow_rate,
        get_setpoint: args.get_temperature_setpoint,
        set_setpoint: args.set_temperature_setpoint,
        alarm: args.get_eurotherm_status || args.status_all,
        lock_keypad: args.lock_keypad,
        get_proportional_band: args.get_proportional_band,
        get_integral_time: args.get_integral_time,
        get_derivative_time: args.get_derivative_time,
        set_proportional_band: args.set_proportional_band,
        set_integral_time: args.set_integral_time,
        set_derivative_time: args.set_derivative_time,
        get_ln2_heater_state: args.get_ln2_heater_state,
        set_ln2_heater_state: args.set_ln2_heater_state,
        get_ln2_heater_power: args.get_ln2_heater_power,
        set_ln2_heater_power: args.set_ln2_heater_power,
        check_ln2: args.check_ln2_heater,
    }
}

#[cfg(debug_assertions)]
fn resolve_interface_mode(args: &Args) -> InterfaceMode {
    args.interface
}

#[cfg(not(debug_assertions))]
fn resolve_interface_mode(args: &Args) -> eyre::Result<InterfaceMode> {
    if args.interface == InterfaceMode::Simulation {
        return Err(eyre::eyre!(
            "simulation interface is only available in debug builds"
        ));
    }
    Ok(args.interface)
}
