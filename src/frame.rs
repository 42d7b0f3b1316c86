//! Bi-Synch frame codec.
//!
//! Query:   `EOT gg dd mm ENQ`
//! Command: `EOT gg dd STX mm data ETX bcc`
//! Reply:   `STX mm data ETX bcc`
//!
//! The block check character is the XOR of every body byte from the
//! mnemonic through `ETX` inclusive.

use std::fmt;
use std::str::FromStr;

use crate::constants::{
    DEFAULT_DEVICE, DEFAULT_GROUP, ENQ, EOT, ETX, MAX_COMMAND_DATA, MIN_REPLY_LEN, REPLY_CAPACITY,
    STX,
};
use crate::error::{Error, Result};

/// Two-character register or action name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Mnemonic([u8; 2]);

impl Mnemonic {
    /// Panics (at compile time when used in a `const`) on non-printable bytes.
    pub const fn from_bytes(bytes: [u8; 2]) -> Self {
        assert!(
            bytes[0].is_ascii_graphic() && bytes[1].is_ascii_graphic(),
            "mnemonic must be printable ASCII"
        );
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 2] {
        &self.0
    }
}

impl FromStr for Mnemonic {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.as_bytes() {
            [a, b] if a.is_ascii_graphic() && b.is_ascii_graphic() => Ok(Self([*a, *b])),
            _ => Err(Error::InvalidMnemonic(s.to_owned())),
        }
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", char::from(self.0[0]), char::from(self.0[1]))
    }
}

/// Group and device id, each sent as two decimal digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Address {
    group: u8,
    device: u8,
}

impl Address {
    pub fn new(group: u8, device: u8) -> Result<Self> {
        if group > 99 || device > 99 {
            return Err(Error::InvalidAddress { group, device });
        }
        Ok(Self { group, device })
    }

    pub const fn group(self) -> u8 {
        self.group
    }

    pub const fn device(self) -> u8 {
        self.device
    }

    fn header(self) -> Vec<u8> {
        let mut out = Vec::with_capacity(5);
        out.push(EOT);
        out.extend_from_slice(format!("{:02}{:02}", self.group, self.device).as_bytes());
        out
    }
}

impl Default for Address {
    fn default() -> Self {
        Self {
            group: DEFAULT_GROUP,
            device: DEFAULT_DEVICE,
        }
    }
}

pub fn checksum(body: &[u8]) -> u8 {
    body.iter().fold(0, |bcc, byte| bcc ^ byte)
}

pub fn encode_query(address: Address, mnemonic: Mnemonic) -> Vec<u8> {
    let mut out = address.header();
    out.extend_from_slice(mnemonic.as_bytes());
    out.push(ENQ);
    out
}

pub fn encode_command(address: Address, mnemonic: Mnemonic, data: &str) -> Result<Vec<u8>> {
    validate_data(mnemonic, data.as_bytes())?;
    let mut out = address.header();
    out.push(STX);
    let body_start = out.len();
    out.extend_from_slice(mnemonic.as_bytes());
    out.extend_from_slice(data.as_bytes());
    out.push(ETX);
    let bcc = checksum(&out[body_start..]);
    out.push(bcc);
    Ok(out)
}

pub fn encode_reply(mnemonic: Mnemonic, payload: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(payload.len() + 5);
    out.push(STX);
    out.extend_from_slice(mnemonic.as_bytes());
    out.extend_from_slice(payload.as_bytes());
    out.push(ETX);
    let bcc = checksum(&out[1..]);
    out.push(bcc);
    out
}

fn validate_data(mnemonic: Mnemonic, data: &[u8]) -> Result<()> {
    if data.len() > MAX_COMMAND_DATA {
        return Err(Error::InvalidData {
            mnemonic,
            reason: "data too long",
        });
    }
    if data.iter().any(|byte| !(0x20..0x7F).contains(byte)) {
        return Err(Error::InvalidData {
            mnemonic,
            reason: "data must be printable ASCII",
        });
    }
    Ok(())
}

/// Framing problems that are tolerated: the reply is still used if its
/// checksum verifies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameDefect {
    TooLong(usize),
    TooShort(usize),
    MissingStx,
    MissingEtx,
    EchoMismatch { expected: Mnemonic, received: Vec<u8> },
}

impl fmt::Display for FrameDefect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong(len) => write!(f, "reply too long ({len} bytes)"),
            Self::TooShort(len) => write!(f, "reply too short ({len} bytes)"),
            Self::MissingStx => write!(f, "missing STX"),
            Self::MissingEtx => write!(f, "missing ETX"),
            Self::EchoMismatch { expected, received } => write!(
                f,
                "expected echo of {expected}, got {}",
                String::from_utf8_lossy(received)
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub payload: String,
    pub defects: Vec<FrameDefect>,
}

pub fn verify_reply(raw: &[u8], expected: Mnemonic) -> Result<Reply> {
    let len = raw.len();
    if len == 0 {
        return Err(Error::NoReply(expected));
    }

    let mut defects = Vec::new();
    if len >= REPLY_CAPACITY {
        defects.push(FrameDefect::TooLong(len));
    }
    if len < MIN_REPLY_LEN {
        defects.push(FrameDefect::TooShort(len));
    }
    if raw[0] != STX {
        defects.push(FrameDefect::MissingStx);
    }
    if len < 2 || raw[len - 2] != ETX {
        defects.push(FrameDefect::MissingEtx);
    }
    let echo = raw.get(1..3.min(len)).unwrap_or_default();
    if echo != expected.as_bytes() {
        defects.push(FrameDefect::EchoMismatch {
            expected,
            received: echo.to_vec(),
        });
    }

    let received = raw[len - 1];
    let body = raw.get(1..len - 1).unwrap_or_default();
    let valid = body
        .iter()
        .position(|&byte| byte == ETX)
        .is_some_and(|etx| checksum(&body[..=etx]) == received);
    if !valid {
        return Err(Error::ChecksumFailure {
            mnemonic: expected,
            received,
        });
    }

    let data = if len >= MIN_REPLY_LEN {
        &raw[3..len - 2]
    } else {
        &[]
    };
    let data = data.split(|&byte| byte == 0).next().unwrap_or_default();
    Ok(Reply {
        payload: String::from_utf8_lossy(data).into_owned(),
        defects,
    })
}

/// A request frame as seen from the device side.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query {
        address: Address,
        mnemonic: Mnemonic,
    },
    Command {
        address: Address,
        mnemonic: Mnemonic,
        data: String,
        checksum_ok: bool,
    },
}

fn decimal_pair(tens: u8, ones: u8) -> Option<u8> {
    (tens.is_ascii_digit() && ones.is_ascii_digit()).then(|| (tens - b'0') * 10 + (ones - b'0'))
}

/// Returns `None` for anything that is not a query or command frame.
pub fn decode_request(frame: &[u8]) -> Option<Request> {
    let (&first, rest) = frame.split_first()?;
    if first != EOT || rest.len() < 4 {
        return None;
    }
    let address = Address::new(decimal_pair(rest[0], rest[1])?, decimal_pair(rest[2], rest[3])?)
        .ok()?;
    let rest = &rest[4..];

    match rest {
        [a, b, last] if *last == ENQ => Some(Request::Query {
            address,
            mnemonic: format!("{}{}", char::from(*a), char::from(*b)).parse().ok()?,
        }),
        [marker, body @ .., bcc] if *marker == STX && body.len() >= 3 => {
            let (&terminator, content) = body.split_last()?;
            if terminator != ETX {
                return None;
            }
            let mnemonic = std::str::from_utf8(&content[..2]).ok()?.parse().ok()?;
            let data = std::str::from_utf8(&content[2..]).ok()?.to_owned();
            Some(Request::Command {
                address,
                mnemonic,
                data,
                checksum_ok: checksum(body) == *bcc,
            })
        }
        _ => None,
    }
}

/// Right-aligned fixed-width numeric field.
///
/// When `precision` overflows `width` the precision is lowered, down to
/// `min_precision`, before giving up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Field {
    pub width: usize,
    pub precision: usize,
    pub min_precision: usize,
}

impl Field {
    pub const fn new(width: usize, precision: usize) -> Self {
        Self {
            width,
            precision,
            min_precision: precision,
        }
    }

    pub const fn with_fallback(self, min_precision: usize) -> Self {
        Self {
            min_precision,
            ..self
        }
    }

    pub fn format(&self, value: f64) -> Result<String> {
        let overflow = Error::FieldOverflow {
            value,
            width: self.width,
        };
        if !value.is_finite() {
            return Err(overflow);
        }
        for precision in (self.min_precision..=self.precision).rev() {
            let text = format!("{value:>width$.precision$}", width = self.width);
            if text.len() <= self.width {
                return Ok(text);
            }
        }
        Err(overflow)
    }
}

pub fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|byte| format!("{byte:02x}")).collect()
}
