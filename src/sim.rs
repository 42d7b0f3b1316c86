//! In-memory BVT3000 that speaks Bi-Synch, for tests and `--interface
//! simulation`.

use std::collections::{HashMap, VecDeque};
use std::time::Duration;

use crate::constants::{
    ACK, AF, DISPLAY_MAX, DISPLAY_MIN, EE, H2, HB, HO, HP, HS, IM, IS, IS_HEATER_ON,
    IS_LN2_HEATER_ON, L2, LB, LS, NAK, NH, NP, OP, OS, PV, S2, SL, SP, SW, SW_ACTIVE_SETPOINT,
    SW_DATA_FORMAT, SW_MANUAL_MODE, TD, TI, TR, XP, XS,
};
use crate::error::Result;
use crate::flow::FlowCode;
use crate::frame::{self, Address, Mnemonic, Request};
use crate::registers::{format_hex_word, parse_hex_word, StatusRegister};
use crate::transport::Link;

/// What the simulated device saw, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Query(Mnemonic),
    Command(Mnemonic, String),
    Settle(Duration),
}

/// Misbehaviour applied to the next exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Answer the next command with NAK.
    Nak,
    /// Flip a bit in the next reply's check byte.
    CorruptChecksum,
    /// Send nothing back.
    Silence,
    /// Answer the next command with this byte.
    AckByte(u8),
    /// Send these bytes instead of the real reply.
    Raw(Vec<u8>),
}

#[derive(Debug, Clone)]
pub struct SimController {
    address: Address,
    values: HashMap<Mnemonic, String>,
    sw: u16,
    os: u16,
    xs: u16,
    is: u16,
    heater_on: bool,
    ln2_heater_on: bool,
    flow: FlowCode,
    temperature: f64,
    faults: VecDeque<Fault>,
    pending: VecDeque<u8>,
    events: Vec<Event>,
}

impl Default for SimController {
    fn default() -> Self {
        Self::new()
    }
}

impl SimController {
    pub fn new() -> Self {
        let values = [
            (SL, "25.0"),
            (S2, "30.0"),
            (LS, "73.0"),
            (L2, "73.0"),
            (HS, "1273.0"),
            (H2, "1273.0"),
            (OP, "0.0"),
            (HO, "100.0"),
            (XP, "36.00"),
            (TI, "17.00"),
            (TD, "2.80"),
            (HB, "56.20"),
            (LB, "67.90"),
            (TR, "4.60"),
            (NH, "35.00"),
            (IM, "0"),
            (EE, ">0000"),
            (DISPLAY_MAX, "1273.0"),
            (DISPLAY_MIN, "73.0"),
        ]
        .into_iter()
        .map(|(mnemonic, value)| (mnemonic, value.to_owned()))
        .collect();

        Self {
            address: Address::default(),
            values,
            sw: SW_DATA_FORMAT,
            os: 0,
            xs: 0,
            is: 0,
            heater_on: false,
            ln2_heater_on: false,
            flow: FlowCode::default(),
            temperature: 23.4,
            faults: VecDeque::new(),
            pending: VecDeque::new(),
            events: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_address(mut self, address: Address) -> Self {
        self.address = address;
        self
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn commands(&self) -> usize {
        self.events
            .iter()
            .filter(|event| matches!(event, Event::Command(..)))
            .count()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn inject(&mut self, fault: Fault) {
        self.faults.push_back(fault);
    }

    pub fn set_status_word(&mut self, register: StatusRegister, value: u16) {
        match register {
            StatusRegister::Sw => self.sw = value,
            StatusRegister::Os => self.os = value,
            StatusRegister::Xs => self.xs = value,
        }
    }

    pub fn status_word(&self, register: StatusRegister) -> u16 {
        match register {
            StatusRegister::Sw => self.sw,
            StatusRegister::Os => self.os,
            StatusRegister::Xs => self.xs,
        }
    }

    /// Raw IS bits; heater relay bits are tracked separately and OR-ed in.
    pub fn set_interface_status(&mut self, value: u16) {
        self.is = value;
    }

    pub fn set_value(&mut self, mnemonic: Mnemonic, value: &str) {
        self.values.insert(mnemonic, value.to_owned());
    }

    pub fn set_temperature(&mut self, temperature: f64) {
        self.temperature = temperature;
    }

    pub fn heater_on(&self) -> bool {
        self.heater_on
    }

    pub fn ln2_heater_on(&self) -> bool {
        self.ln2_heater_on
    }

    pub fn flow_code(&self) -> FlowCode {
        self.flow
    }

    fn interface_bits(&self) -> u16 {
        let mut is = self.is;
        if self.heater_on {
            is |= IS_HEATER_ON;
        }
        if self.ln2_heater_on {
            is |= IS_LN2_HEATER_ON;
        }
        is
    }

    fn active_setpoint(&self) -> f64 {
        let mnemonic = if self.sw & SW_ACTIVE_SETPOINT == 0 { SL } else { S2 };
        self.values
            .get(&mnemonic)
            .and_then(|value| value.trim().parse().ok())
            .unwrap_or(self.temperature)
    }

    /// Moves PV a fifth of the way to the active setpoint while the heater
    /// regulates in automatic mode.
    fn tick(&mut self) {
        if self.heater_on && self.sw & SW_MANUAL_MODE == 0 {
            let target = self.active_setpoint();
            self.temperature += (target - self.temperature) * 0.2;
        }
    }

    fn answer_query(&mut self, mnemonic: Mnemonic) -> Option<String> {
        let flag = |on: bool| String::from(if on { "1" } else { "0" });
        match mnemonic {
            PV => {
                self.tick();
                Some(format!("{:.1}", self.temperature))
            }
            SP => Some(format!("{:.1}", self.active_setpoint())),
            SW => Some(format_hex_word(self.sw)),
            OS => Some(format_hex_word(self.os)),
            XS => Some(format_hex_word(self.xs)),
            IS => Some(format_hex_word(self.interface_bits())),
            HP => Some(flag(self.heater_on)),
            NP => Some(flag(self.ln2_heater_on)),
            AF => Some(self.flow.to_wire()),
            _ if is_port(mnemonic) => Some(String::from(">0")),
            _ => self.values.get(&mnemonic).cloned(),
        }
    }

    /// Applies a command; `false` means the device refuses it.
    fn apply_command(&mut self, mnemonic: Mnemonic, data: &str) -> bool {
        match mnemonic {
            SW | OS | XS => {
                let register = match mnemonic {
                    SW => StatusRegister::Sw,
                    OS => StatusRegister::Os,
                    _ => StatusRegister::Xs,
                };
                let Ok(value) = parse_hex_word(mnemonic, data) else {
                    return false;
                };
                let mask = register.write_mask();
                let current = self.status_word(register);
                self.set_status_word(register, (current & !mask) | (value & mask));
                true
            }
            HP | NP => {
                let on = match data {
                    "1" => true,
                    "0" => false,
                    _ => return false,
                };
                if mnemonic == HP {
                    self.heater_on = on;
                } else {
                    self.ln2_heater_on = on;
                }
                true
            }
            AF => match FlowCode::from_wire(AF, data) {
                Ok(code) => {
                    self.flow = code;
                    true
                }
                Err(_) => false,
            },
            PV | IS | SP | EE => false,
            _ => {
                if data.trim().parse::<f64>().is_err() {
                    return false;
                }
                self.values.insert(mnemonic, data.trim().to_owned());
                true
            }
        }
    }

    fn respond(&mut self, request: &[u8]) {
        let Some(request) = frame::decode_request(request) else {
            return;
        };
        match request {
            Request::Query { address, mnemonic } => {
                if address != self.address {
                    return;
                }
                self.events.push(Event::Query(mnemonic));
                match self.faults.pop_front() {
                    Some(Fault::Silence) => {}
                    Some(Fault::Raw(bytes)) => self.pending.extend(bytes),
                    other => {
                        let Some(payload) = self.answer_query(mnemonic) else {
                            return;
                        };
                        let mut reply = frame::encode_reply(mnemonic, &payload);
                        if other == Some(Fault::CorruptChecksum) {
                            if let Some(bcc) = reply.last_mut() {
                                *bcc ^= 0x01;
                            }
                        }
                        self.pending.extend(reply);
                    }
                }
            }
            Request::Command {
                address,
                mnemonic,
                data,
                checksum_ok,
            } => {
                if address != self.address {
                    return;
                }
                self.events.push(Event::Command(mnemonic, data.clone()));
                match self.faults.pop_front() {
                    Some(Fault::Silence) => {}
                    Some(Fault::Nak) => self.pending.push_back(NAK),
                    Some(Fault::AckByte(byte)) => self.pending.push_back(byte),
                    Some(Fault::Raw(bytes)) => self.pending.extend(bytes),
                    _ => {
                        let accepted = checksum_ok && self.apply_command(mnemonic, &data);
                        self.pending.push_back(if accepted { ACK } else { NAK });
                    }
                }
            }
        }
    }
}

fn is_port(mnemonic: Mnemonic) -> bool {
    let [kind, number] = *mnemonic.as_bytes();
    kind == b'P' && (b'1'..=b'4').contains(&number)
}

impl Link for SimController {
    fn write_and_drain(&mut self, bytes: &[u8], _timeout: Duration) -> Result<()> {
        // Anything the host did not read is lost when it starts a new exchange.
        self.pending.clear();
        self.respond(bytes);
        Ok(())
    }

    fn read_partial(&mut self, max_len: usize, _timeout: Duration) -> Result<Vec<u8>> {
        let count = max_len.min(self.pending.len());
        Ok(self.pending.drain(..count).collect())
    }

    fn settle(&mut self, duration: Duration) {
        self.events.push(Event::Settle(duration));
    }
}
