use std::io::{self, Read, Write};
use std::thread;
use std::time::{Duration, Instant};

use serialport::{DataBits, FlowControl, Parity, SerialPort, SerialPortInfo, StopBits};
use tracing::{debug, info, warn};

use crate::constants::QUERY_TIMEOUT;
use crate::error::{Error, Result};

/// Half-duplex byte link to the controller.
///
/// Implementations must never have more than one exchange in flight; the
/// protocol engine guarantees it never asks for one.
pub trait Link {
    /// Blocks until every byte is handed to the wire.
    fn write_and_drain(&mut self, bytes: &[u8], timeout: Duration) -> Result<()>;

    /// Returns whatever arrives before `timeout`, at most `max_len` bytes.
    /// An empty vector means nothing arrived.
    fn read_partial(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>>;

    /// Waits for switching hardware on the device side to stabilise.
    fn settle(&mut self, duration: Duration) {
        thread::sleep(duration);
    }

    /// Flushes whatever the link still holds before it is dropped.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

impl<L: Link + ?Sized> Link for Box<L> {
    fn write_and_drain(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        (**self).write_and_drain(bytes, timeout)
    }

    fn read_partial(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        (**self).read_partial(max_len, timeout)
    }

    fn settle(&mut self, duration: Duration) {
        (**self).settle(duration);
    }

    fn close(&mut self) -> Result<()> {
        (**self).close()
    }
}

/// Serial port configured for the controller: 7 data bits, even parity,
/// one stop bit.
pub struct SerialLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialLink {
    pub fn open(name: &str, baud: u32) -> Result<Self> {
        let unavailable = |source| Error::TransportUnavailable {
            port: name.to_owned(),
            source,
        };
        let port = serialport::new(name, baud)
            .data_bits(DataBits::Seven)
            .parity(Parity::Even)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(QUERY_TIMEOUT)
            .open()
            .map_err(unavailable)?;
        info!(port = name, baud, "serial port opened");
        Ok(Self {
            port,
            name: name.to_owned(),
        })
    }
}

impl Link for SerialLink {
    fn write_and_drain(&mut self, bytes: &[u8], timeout: Duration) -> Result<()> {
        self.port
            .set_timeout(timeout)
            .map_err(|err| Error::WriteFailed(err.into()))?;
        self.port.write_all(bytes).map_err(Error::WriteFailed)?;
        // On unix this waits for the output buffer to drain (tcdrain).
        self.port.flush().map_err(Error::WriteFailed)
    }

    fn read_partial(&mut self, max_len: usize, timeout: Duration) -> Result<Vec<u8>> {
        read_until_deadline(&mut *self.port, max_len, timeout)
    }

    fn close(&mut self) -> Result<()> {
        let result = self.port.flush().map_err(Error::WriteFailed);
        match &result {
            Ok(()) => info!(port = %self.name, "serial port closed"),
            Err(err) => warn!(port = %self.name, %err, "error while closing serial port"),
        }
        result
    }
}

fn read_until_deadline(
    port: &mut dyn SerialPort,
    max_len: usize,
    timeout: Duration,
) -> Result<Vec<u8>> {
    let deadline = Instant::now() + timeout;
    let mut out = Vec::with_capacity(max_len);
    let mut chunk = [0u8; 64];

    while out.len() < max_len {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break;
        }
        port.set_timeout(remaining)
            .map_err(|err| Error::ReadFailed(err.into()))?;
        let want = chunk.len().min(max_len - out.len());
        match port.read(&mut chunk[..want]) {
            Ok(0) => break,
            Ok(count) => out.extend_from_slice(&chunk[..count]),
            Err(err) if err.kind() == io::ErrorKind::TimedOut => break,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(Error::ReadFailed(err)),
        }
    }

    debug!(bytes = out.len(), "read finished");
    Ok(out)
}

/// Serial ports the OS reports, for the CLI's listing.
pub fn available_ports() -> Result<Vec<SerialPortInfo>> {
    serialport::available_ports().map_err(|source| Error::TransportUnavailable {
        port: String::from("<enumeration>"),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::SerialLink;
    use crate::error::{Error, ErrorKind};

    #[test]
    fn missing_port_is_transport_unavailable() {
        let err = SerialLink::open("/dev/bvt3000-does-not-exist", 9_600)
            .err()
            .expect("open should fail");
        assert!(matches!(err, Error::TransportUnavailable { .. }));
        assert_eq!(err.kind(), ErrorKind::Communication);
        assert!(err.to_string().contains("bvt3000-does-not-exist"));
    }
}
