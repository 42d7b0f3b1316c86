//! Query / command exchanges over a [`Link`].
//!
//! Every call runs `Idle -> Sending -> AwaitingReply|AwaitingAck -> done`
//! and leaves nothing behind; the session only remembers the link and the
//! bus address.

use tracing::{debug, error, trace, warn};

use crate::constants::{
    ACK, ACK_TIMEOUT, DEFAULT_BAUD, EE, NAK, QUERY_TIMEOUT, REPLY_CAPACITY, SETTLE_DELAY,
};
use crate::error::{Error, Result};
use crate::frame::{self, Address, Mnemonic};
use crate::transport::{Link, SerialLink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionConfig {
    pub address: Address,
    pub baud: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            address: Address::default(),
            baud: DEFAULT_BAUD,
        }
    }
}

/// Outcome of a command the device answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    Accepted,
    Rejected,
}

/// One open connection to a controller.
pub struct Session<L = SerialLink> {
    link: L,
    address: Address,
}

impl Session<SerialLink> {
    pub fn open(port: &str, config: &SessionConfig) -> Result<Self> {
        let link = SerialLink::open(port, config.baud)?;
        Ok(Self::new(link, config.address))
    }
}

impl<L: Link> Session<L> {
    pub fn new(link: L, address: Address) -> Self {
        Self { link, address }
    }

    pub fn address(&self) -> Address {
        self.address
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn link_mut(&mut self) -> &mut L {
        &mut self.link
    }

    pub fn into_link(self) -> L {
        self.link
    }

    /// Releases the link. Failures are reported but leave nothing to undo.
    pub fn close(mut self) -> Result<()> {
        self.link.close()
    }

    /// Reads a register and returns its payload text.
    pub fn query(&mut self, mnemonic: Mnemonic) -> Result<String> {
        let request = frame::encode_query(self.address, mnemonic);
        debug!(%mnemonic, frame = %frame::to_hex(&request), "sending query");
        self.link
            .write_and_drain(&request, QUERY_TIMEOUT)
            .inspect_err(|err| error!(%mnemonic, %err, "query write failed"))?;

        let raw = self
            .link
            .read_partial(REPLY_CAPACITY, QUERY_TIMEOUT)
            .inspect_err(|err| error!(%mnemonic, %err, "query read failed"))?;
        debug!(%mnemonic, frame = %frame::to_hex(&raw), "received reply");

        let reply = frame::verify_reply(&raw, mnemonic)
            .inspect_err(|err| error!(%mnemonic, %err, "communication failure"))?;
        for defect in &reply.defects {
            warn!(
                %mnemonic,
                %defect,
                frame = %frame::to_hex(&raw),
                "communication may be degraded"
            );
        }
        trace!(%mnemonic, payload = %reply.payload, "query done");
        Ok(reply.payload)
    }

    /// Sends a command and waits for ACK/NAK.
    ///
    /// On NAK the device's error detail (`EE`) is fetched and dropped; the
    /// command is not retried.
    pub fn command(&mut self, mnemonic: Mnemonic, data: &str) -> Result<Ack> {
        let request = frame::encode_command(self.address, mnemonic, data)?;
        debug!(%mnemonic, data, frame = %frame::to_hex(&request), "sending command");
        self.link
            .write_and_drain(&request, QUERY_TIMEOUT)
            .inspect_err(|err| error!(%mnemonic, %err, "command write failed"))?;

        let ack = self
            .link
            .read_partial(1, ACK_TIMEOUT)
            .inspect_err(|err| error!(%mnemonic, %err, "acknowledgement read failed"))?;
        match ack.first().copied() {
            Some(ACK) => {
                trace!(%mnemonic, "command acknowledged");
                Ok(Ack::Accepted)
            }
            Some(NAK) => {
                warn!(%mnemonic, "command rejected by device");
                self.query(EE)?;
                Ok(Ack::Rejected)
            }
            Some(other) => {
                error!(%mnemonic, byte = other, "unexpected acknowledgement");
                Err(Error::UnexpectedAck(other))
            }
            None => {
                error!(%mnemonic, "no acknowledgement");
                Err(Error::AckTimeout(mnemonic))
            }
        }
    }

    /// [`Self::command`] with a NAK turned into [`Error::Rejected`].
    pub fn execute(&mut self, mnemonic: Mnemonic, data: &str) -> Result<()> {
        match self.command(mnemonic, data)? {
            Ack::Accepted => Ok(()),
            Ack::Rejected => Err(Error::Rejected { mnemonic }),
        }
    }

    /// Switches a relay and waits for it to settle before returning.
    pub fn actuate(&mut self, mnemonic: Mnemonic, data: &str) -> Result<()> {
        self.execute(mnemonic, data)?;
        self.link.settle(SETTLE_DELAY);
        Ok(())
    }
}
