//! Scripted GSM modem.
//!
//! Answers the AT subset the device layer uses on top of a
//! [`SimulatedTransport`], with in-memory SMS storage. Used by tests and
//! by `--simulate` runs on machines without a modem attached.

use crate::serial::error::{ModemError, ModemResult};
use crate::serial::transport::{PortOpener, SerialTransport, SimulatedTransport};
use crate::serial::types::SerialEndpoint;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use wmodem_pdu::pdu::SmsStatus;

#[derive(Debug, Clone)]
struct StoredPdu {
    status: SmsStatus,
    hex: String,
}

#[derive(Debug)]
struct SimState {
    storage: BTreeMap<u32, StoredPdu>,
    next_index: u32,
    next_mr: u32,
    awaiting_pdu: Option<usize>,
    silent: bool,
    own_number: Option<String>,
    rssi: u8,
    ber: u8,
    sent: Vec<String>,
    commands: Vec<String>,
}

impl Default for SimState {
    fn default() -> Self {
        Self {
            storage: BTreeMap::new(),
            next_index: 1,
            next_mr: 1,
            awaiting_pdu: None,
            silent: false,
            own_number: Some("+15550100".to_string()),
            rssi: 21,
            ber: 0,
            sent: Vec::new(),
            commands: Vec::new(),
        }
    }
}

/// Handle to one simulated modem. Clones share state.
#[derive(Clone, Default)]
pub struct ModemSimulator {
    state: Arc<Mutex<SimState>>,
}

impl ModemSimulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a transport answered by this modem.
    pub fn transport(&self, port_name: &str) -> Arc<SimulatedTransport> {
        let transport = SimulatedTransport::new(port_name);
        let state = self.state.clone();
        transport.set_responder(Box::new(move |written| match state.lock() {
            Ok(mut s) => respond(&mut s, written),
            Err(_) => None,
        }));
        transport
    }

    /// Stop answering anything (a hung or absent modem).
    pub fn set_silent(&self, silent: bool) {
        self.with(|s| s.silent = silent);
    }

    pub fn set_own_number(&self, number: Option<&str>) {
        self.with(|s| s.own_number = number.map(String::from));
    }

    pub fn set_signal(&self, rssi: u8, ber: u8) {
        self.with(|s| {
            s.rssi = rssi;
            s.ber = ber;
        });
    }

    /// Put a PDU into storage; returns its index.
    pub fn store(&self, status: SmsStatus, pdu_hex: &str) -> u32 {
        self.with(|s| {
            let index = s.next_index;
            s.next_index += 1;
            s.storage.insert(
                index,
                StoredPdu {
                    status,
                    hex: pdu_hex.to_uppercase(),
                },
            );
            index
        })
    }

    /// Store a received PDU and raise `+CMTI` on `transport`.
    pub async fn receive(&self, transport: &SimulatedTransport, pdu_hex: &str) -> u32 {
        let index = self.store(SmsStatus::ReceivedUnread, pdu_hex);
        let urc = format!("\r\n+CMTI: \"SM\",{}\r\n", index);
        transport.inject_rx(urc.as_bytes()).await;
        index
    }

    pub fn stored_indices(&self) -> Vec<u32> {
        self.with(|s| s.storage.keys().copied().collect())
    }

    /// PDUs uploaded after `AT+CMGS`.
    pub fn sent_pdus(&self) -> Vec<String> {
        self.with(|s| s.sent.clone())
    }

    /// Every command line received, in order.
    pub fn commands(&self) -> Vec<String> {
        self.with(|s| s.commands.clone())
    }

    fn with<R>(&self, f: impl FnOnce(&mut SimState) -> R) -> R {
        match self.state.lock() {
            Ok(mut s) => f(&mut s),
            Err(poisoned) => f(&mut poisoned.into_inner()),
        }
    }
}

fn respond(s: &mut SimState, written: &[u8]) -> Option<Vec<u8>> {
    if s.silent {
        return None;
    }
    let text = String::from_utf8_lossy(written);

    if let Some(expected) = s.awaiting_pdu {
        if written == b"\x1b" {
            s.awaiting_pdu = None;
            return Some(b"\r\nOK\r\n".to_vec());
        }
        if let Some(pdu) = text.strip_suffix('\x1a') {
            s.awaiting_pdu = None;
            let octets = pdu.len() / 2;
            let sca = u8::from_str_radix(pdu.get(..2).unwrap_or("00"), 16).unwrap_or(0) as usize;
            if octets != expected + sca + 1 {
                return Some(b"\r\n+CMS ERROR: 304\r\n".to_vec());
            }
            s.sent.push(pdu.to_string());
            let mr = s.next_mr;
            s.next_mr = s.next_mr % 255 + 1;
            return Some(format!("\r\n+CMGS: {}\r\n\r\nOK\r\n", mr).into_bytes());
        }
        return None;
    }

    let command = text.trim_end_matches(['\r', '\n']).trim().to_string();
    s.commands.push(command.clone());
    let upper = command.to_uppercase();

    let body: Result<String, &str> = match upper.as_str() {
        "AT" | "ATE0" | "ATE1" | "AT+CMGF=0" => Ok(String::new()),
        "AT+CGMI" => Ok("Quectel".into()),
        "AT+CGMM" => Ok("EC25".into()),
        "AT+CGSN" => Ok("866123045678901".into()),
        "AT+CIMI" => Ok("460001234567890".into()),
        "AT+CNUM" => Ok(s
            .own_number
            .as_ref()
            .map(|n| format!("+CNUM: \"\",\"{}\",145", n))
            .unwrap_or_default()),
        "AT+COPS?" => Ok("+COPS: 0,0,\"SIMNET\",7".into()),
        "AT+CSQ" => Ok(format!("+CSQ: {},{}", s.rssi, s.ber)),
        _ => {
            if let Some(arg) = upper.strip_prefix("AT+CMGL=") {
                list(s, arg)
            } else if let Some(arg) = upper.strip_prefix("AT+CMGS=") {
                return match arg.parse::<usize>() {
                    Ok(len) if len > 0 => {
                        s.awaiting_pdu = Some(len);
                        Some(b"\r\n> ".to_vec())
                    }
                    _ => Some(b"\r\nERROR\r\n".to_vec()),
                };
            } else if let Some(arg) = upper.strip_prefix("AT+CMGD=") {
                match arg.parse::<u32>().ok().and_then(|i| s.storage.remove(&i)) {
                    Some(_) => Ok(String::new()),
                    None => Err("+CMS ERROR: 321"),
                }
            } else {
                Err("ERROR")
            }
        }
    };

    let reply = match body {
        Ok(body) if body.is_empty() => "\r\nOK\r\n".to_string(),
        Ok(body) => format!("\r\n{}\r\n\r\nOK\r\n", body),
        Err(code) => format!("\r\n{}\r\n", code),
    };
    Some(reply.into_bytes())
}

fn list(s: &mut SimState, arg: &str) -> Result<String, &'static str> {
    let filter = arg
        .trim()
        .parse::<u8>()
        .ok()
        .and_then(SmsStatus::from_code)
        .ok_or("+CMS ERROR: 302")?;

    let mut lines = Vec::new();
    for (index, stored) in s.storage.iter_mut() {
        if filter != SmsStatus::All && stored.status != filter {
            continue;
        }
        lines.push(format!(
            "+CMGL: {},{},,{}",
            index,
            stored.status.code(),
            stored.hex.len() / 2
        ));
        lines.push(stored.hex.clone());
        if stored.status == SmsStatus::ReceivedUnread {
            stored.status = SmsStatus::ReceivedRead;
        }
    }
    Ok(lines.join("\r\n"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Opener
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
//  Maps port paths to simulated modems. Paths without a modem fail to
//  open, like a missing device node.

#[derive(Clone, Default)]
pub struct SimulatorOpener {
    modems: Arc<Mutex<HashMap<String, ModemSimulator>>>,
    transports: Arc<Mutex<HashMap<String, Arc<SimulatedTransport>>>>,
}

impl SimulatorOpener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a modem at `path`, returning its handle.
    pub fn attach(&self, path: &str) -> ModemSimulator {
        let modem = ModemSimulator::new();
        if let Ok(mut modems) = self.modems.lock() {
            modems.insert(path.to_string(), modem.clone());
        }
        modem
    }

    /// Unplug the modem at `path`; its open transport, if any, closes.
    pub async fn detach(&self, path: &str) {
        if let Ok(mut modems) = self.modems.lock() {
            modems.remove(path);
        }
        let transport = self.transports.lock().ok().and_then(|mut t| t.remove(path));
        if let Some(transport) = transport {
            let _ = transport.close().await;
        }
    }

    /// Most recently opened transport for `path`.
    pub fn transport(&self, path: &str) -> Option<Arc<SimulatedTransport>> {
        self.transports.lock().ok()?.get(path).cloned()
    }

    pub fn modem(&self, path: &str) -> Option<ModemSimulator> {
        self.modems.lock().ok()?.get(path).cloned()
    }
}

#[async_trait::async_trait]
impl PortOpener for SimulatorOpener {
    async fn open(&self, endpoint: &SerialEndpoint) -> ModemResult<Arc<dyn SerialTransport>> {
        let modem = self
            .modem(&endpoint.path)
            .ok_or_else(|| ModemError::handshake(format!("no such port: {}", endpoint.path)))?;
        let transport = modem.transport(&endpoint.name());
        if let Ok(mut transports) = self.transports.lock() {
            transports.insert(endpoint.path.clone(), transport.clone());
        }
        Ok(transport)
    }
}
