//! Bi-Synch driver for the Bruker BVT3000 variable temperature unit and its
//! Eurotherm 902S controller.
//!
//! Open a [`Session`] on a serial port (or any [`Link`]) and call the
//! operation methods on it:
//!
//! ```no_run
//! use bvt3000_ctl::{Session, SessionConfig};
//!
//! let mut session = Session::open("/dev/ttyUSB0", &SessionConfig::default())?;
//! println!("{}", session.temperature()?);
//! session.close()?;
//! # Ok::<(), bvt3000_ctl::Error>(())
//! ```

pub mod constants;
pub mod device;
pub mod error;
pub mod flow;
pub mod frame;
pub mod protocol;
pub mod registers;
pub mod sim;
pub mod transport;

pub use device::{HeaterCondition, Limits, Ln2Tank, Mode, OperationMode, Setpoint};
pub use error::{Error, ErrorKind, Result};
pub use flow::{Adjustment, FlowCode, Quantized};
pub use frame::{Address, Mnemonic};
pub use protocol::{Ack, Session, SessionConfig};
pub use registers::{ExtensionStatus, InterfaceStatus, StatusRegister, StatusWord};
pub use transport::{Link, SerialLink};
