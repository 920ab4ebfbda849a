//! GSM AT command set and response parsing.
//!
//! Builders for the 27.007 / 27.005 commands the device layer issues,
//! and parsers that turn raw response text into typed values.

use crate::serial::types::*;
use lazy_static::lazy_static;
use regex::Regex;
use wmodem_pdu::pdu::{self, SmsFragment, SmsStatus};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Commands
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Default command terminator.
pub const EOL: &str = "\r\n";
/// Terminator for `AT+CMGS=<n>`; a trailing LF would be read as PDU input.
pub const CR: &str = "\r";
/// Ends PDU input.
pub const CTRL_Z: &str = "\x1a";
/// Aborts PDU input.
pub const ESC: &[u8] = b"\x1b";

/// Commands used by the device layer.
pub struct AtCommands;

impl AtCommands {
    /// Attention / liveness probe.
    pub const AT: &'static str = "AT";
    pub const ECHO_OFF: &'static str = "ATE0";
    /// Message format: PDU.
    pub const PDU_MODE: &'static str = "AT+CMGF=0";
    pub const MANUFACTURER: &'static str = "AT+CGMI";
    pub const MODEL: &'static str = "AT+CGMM";
    pub const IMEI: &'static str = "AT+CGSN";
    pub const IMSI: &'static str = "AT+CIMI";
    pub const OWN_NUMBER: &'static str = "AT+CNUM";
    pub const CURRENT_OPERATOR: &'static str = "AT+COPS?";
    pub const SIGNAL_QUALITY: &'static str = "AT+CSQ";

    pub fn list_messages(status: SmsStatus) -> String {
        format!("AT+CMGL={}", status.code())
    }

    pub fn send_message(tpdu_len: usize) -> String {
        format!("AT+CMGS={}", tpdu_len)
    }

    pub fn delete_message(index: u32) -> String {
        format!("AT+CMGD={}", index)
    }
}

lazy_static! {
    static ref CSQ_RE: Regex = Regex::new(r"\+CSQ:\s*(\d+)\s*,\s*(\d+)").unwrap();
    static ref CNUM_RE: Regex = Regex::new(r#"\+CNUM:[^,]*,\s*"([^"]+)""#).unwrap();
    static ref COPS_RE: Regex = Regex::new(r#"\+COPS:[^"]*"([^"]*)""#).unwrap();
    static ref CMGS_RE: Regex = Regex::new(r"\+CMGS:\s*(\d+)").unwrap();
    static ref CMGL_RE: Regex = Regex::new(r"^\+CMGL:\s*(\d+)\s*,\s*(\d+)").unwrap();
    static ref INFO_PREFIX_RE: Regex = Regex::new(r"^\+[A-Z]+:\s*").unwrap();
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Response framing
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// True once `raw` holds a final result line or the PDU prompt.
pub fn has_final_result(raw: &str) -> bool {
    raw.trim_end().ends_with('>') || raw.lines().any(|l| matches!(ResultCode::parse(l), Some(c) if !c.is_prompt()))
}

/// Parse a raw response buffer into structured form.
pub fn parse_at_response(command: &str, raw: &str, elapsed_ms: u64) -> AtResponse {
    let mut lines: Vec<String> = raw
        .lines()
        .map(|l| l.trim().to_string())
        .filter(|l| !l.is_empty())
        .filter(|l| !l.eq_ignore_ascii_case(command.trim()))
        .collect();

    let result = match lines.iter().rposition(|l| ResultCode::parse(l).is_some()) {
        Some(pos) => {
            let line = lines.remove(pos);
            ResultCode::parse(&line).unwrap_or(ResultCode::Missing)
        }
        None => ResultCode::Missing,
    };

    lines.retain(|l| !is_unsolicited(l));

    AtResponse {
        command: command.to_string(),
        raw: raw.to_string(),
        lines,
        result,
        elapsed_ms,
    }
}

/// First information line, with any `+XXX:` prefix removed.
pub fn extract_value(resp: &AtResponse) -> Option<String> {
    resp.lines
        .iter()
        .map(|l| INFO_PREFIX_RE.replace(l, "").trim().trim_matches('"').to_string())
        .find(|v| !v.is_empty())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Typed parsers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `+CSQ: <rssi>,<ber>`
pub fn parse_signal_quality(text: &str) -> Option<(u8, u8)> {
    let caps = CSQ_RE.captures(text)?;
    let rssi = caps.get(1)?.as_str().parse::<u8>().ok()?;
    let ber = caps.get(2)?.as_str().parse::<u8>().ok()?;
    Some((rssi, ber))
}

/// CSQ RSSI to dBm; 99 ("not known") reports the floor.
pub fn rssi_to_dbm(rssi: u8) -> i32 {
    if rssi == 99 {
        -113
    } else {
        rssi as i32 * 2 - 113
    }
}

/// Bars: rssi ≥ 20 → 5, ≥ 15 → 4, ≥ 10 → 3, ≥ 5 → 2, ≥ 1 → 1, else 0.
/// Unknown (99) is 0.
pub fn signal_level(rssi: u8) -> u8 {
    match rssi {
        99 => 0,
        20.. => 5,
        15..=19 => 4,
        10..=14 => 3,
        5..=9 => 2,
        1..=4 => 1,
        0 => 0,
    }
}

pub fn signal_report(rssi: u8, ber: u8) -> SignalReport {
    SignalReport {
        rssi,
        ber,
        dbm: rssi_to_dbm(rssi),
        level: signal_level(rssi),
    }
}

/// `+CNUM: "<alpha>","<number>",<type>`
pub fn parse_own_number(text: &str) -> Option<String> {
    CNUM_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

/// `+COPS: <mode>,<format>,"<operator>"[,<act>]`
pub fn parse_operator(text: &str) -> Option<String> {
    COPS_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|s| !s.is_empty())
}

/// `+CMGS: <mr>`
pub fn parse_send_reference(text: &str) -> Option<u32> {
    CMGS_RE.captures(text)?.get(1)?.as_str().parse().ok()
}

/// Pair each `+CMGL: <index>,<stat>,...` header with the PDU line after
/// it and decode. Undecodable PDUs are kept with their diagnostic.
pub fn parse_message_list(lines: &[String]) -> Vec<SmsFragment> {
    let mut out = Vec::new();
    let mut iter = lines.iter().peekable();
    while let Some(line) = iter.next() {
        let caps = match CMGL_RE.captures(line) {
            Some(c) => c,
            None => continue,
        };
        let index: u32 = match caps[1].parse() {
            Ok(i) => i,
            Err(_) => continue,
        };
        let status = caps[2]
            .parse::<u8>()
            .ok()
            .and_then(SmsStatus::from_code)
            .unwrap_or_default();

        let has_pdu = matches!(iter.peek(), Some(next) if !next.starts_with("+CMGL:"));
        let pdu_line = if has_pdu { iter.next().map(String::as_str) } else { None };
        let Some(pdu_hex) = pdu_line else {
            log::warn!("+CMGL entry {} has no PDU line", index);
            continue;
        };

        match pdu::decode_pdu(pdu_hex) {
            Ok(decoded) => out.push(SmsFragment::from_pdu(index, status, decoded)),
            Err(e) => {
                log::warn!("message {} failed to decode: {}", index, e);
                out.push(SmsFragment::undecodable(index, status, pdu_hex, e.message));
            }
        }
    }
    out
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Unsolicited result codes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Incoming message stored in memory.
pub const URC_NEW_MESSAGE: &str = "+CMTI";

const UNSOLICITED_PREFIXES: &[&str] = &["+CMTI:", "+CDSI:"];

/// Lines that only ever appear unsolicited, even inside a command response.
pub fn is_unsolicited(line: &str) -> bool {
    let t = line.trim();
    t == "RING" || UNSOLICITED_PREFIXES.iter().any(|p| t.starts_with(p))
}

/// Split a URC line into code and parameters. Blank lines and stray final
/// result codes yield `None`.
pub fn parse_urc(line: &str) -> Option<Urc> {
    let t = line.trim();
    if t.is_empty() || ResultCode::parse(t).is_some() {
        return None;
    }
    let (code, params) = match t.split_once(':') {
        Some((code, rest)) if code.starts_with('+') || code.starts_with('^') => {
            let params = rest
                .split(',')
                .map(|p| p.trim().trim_matches('"').to_string())
                .collect();
            (code.trim().to_string(), params)
        }
        _ => (t.to_string(), Vec::new()),
    };
    Some(Urc {
        code,
        params,
        line: t.to_string(),
    })
}

/// Storage index announced by a `+CMTI: "<mem>",<index>` URC.
pub fn new_message_index(urc: &Urc) -> Option<u32> {
    if urc.code != URC_NEW_MESSAGE {
        return None;
    }
    urc.params.get(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_builders() {
        assert_eq!(AtCommands::list_messages(SmsStatus::All), "AT+CMGL=4");
        assert_eq!(AtCommands::list_messages(SmsStatus::ReceivedUnread), "AT+CMGL=0");
        assert_eq!(AtCommands::send_message(18), "AT+CMGS=18");
        assert_eq!(AtCommands::delete_message(7), "AT+CMGD=7");
    }

    #[test]
    fn test_has_final_result() {
        assert!(has_final_result("\r\n+CSQ: 15,0\r\n\r\nOK\r\n"));
        assert!(has_final_result("stuff\r\nERROR\r\n"));
        assert!(has_final_result("\r\n+CMS ERROR: 500\r\n"));
        assert!(has_final_result("\r\n> "));
        assert!(!has_final_result("\r\n+CSQ: 15,0\r\n"));
        assert!(!has_final_result(""));
        // Operator names are not result codes.
        assert!(!has_final_result("\r\n+COPS: 0,0,\"OK Mobile\"\r\n"));
    }

    #[test]
    fn test_parse_at_response_ok() {
        let resp = parse_at_response("AT", "AT\r\r\nOK\r\n", 50);
        assert!(resp.result.is_ok());
        assert_eq!(resp.elapsed_ms, 50);
        assert!(resp.lines.is_empty());
    }

    #[test]
    fn test_parse_at_response_with_data() {
        let resp = parse_at_response("AT+CGMI", "\r\nQuectel\r\n\r\nOK\r\n", 10);
        assert!(resp.result.is_ok());
        assert_eq!(resp.lines, vec!["Quectel"]);
        assert_eq!(extract_value(&resp).as_deref(), Some("Quectel"));
    }

    #[test]
    fn test_parse_at_response_error() {
        let resp = parse_at_response("AT+XYZ", "\r\n+CME ERROR: 100\r\n", 30);
        assert_eq!(resp.result, ResultCode::CmeError("100".into()));
        assert!(resp.lines.is_empty());
    }

    #[test]
    fn test_parse_at_response_drops_embedded_urc() {
        let raw = "\r\n+CMTI: \"SM\",4\r\n\r\n+CSQ: 20,99\r\n\r\nOK\r\n";
        let resp = parse_at_response("AT+CSQ", raw, 5);
        assert_eq!(resp.lines, vec!["+CSQ: 20,99"]);
    }

    #[test]
    fn test_parse_at_response_missing_code() {
        let resp = parse_at_response("AT+CGSN", "\r\n86123\r\n", 5000);
        assert_eq!(resp.result, ResultCode::Missing);
        assert_eq!(resp.lines, vec!["86123"]);
    }

    #[test]
    fn test_extract_value_strips_prefix() {
        let resp = parse_at_response("AT+CGSN", "\r\n+CGSN: \"866123045678901\"\r\nOK\r\n", 1);
        assert_eq!(extract_value(&resp).as_deref(), Some("866123045678901"));
    }

    #[test]
    fn test_signal() {
        assert_eq!(parse_signal_quality("+CSQ: 15,0"), Some((15, 0)));
        assert_eq!(parse_signal_quality("+CSQ: 99,99"), Some((99, 99)));
        assert_eq!(parse_signal_quality("garbage"), None);

        assert_eq!(rssi_to_dbm(0), -113);
        assert_eq!(rssi_to_dbm(15), -83);
        assert_eq!(rssi_to_dbm(31), -51);
        assert_eq!(rssi_to_dbm(99), -113);

        assert_eq!(signal_level(99), 0);
        assert_eq!(signal_level(0), 0);
        assert_eq!(signal_level(1), 1);
        assert_eq!(signal_level(5), 2);
        assert_eq!(signal_level(12), 3);
        assert_eq!(signal_level(15), 4);
        assert_eq!(signal_level(31), 5);

        let report = signal_report(99, 99);
        assert_eq!((report.dbm, report.level), (-113, 0));
    }

    #[test]
    fn test_own_number_and_operator() {
        assert_eq!(
            parse_own_number("+CNUM: \"\",\"+8613800138000\",145").as_deref(),
            Some("+8613800138000")
        );
        assert_eq!(parse_own_number("+CNUM: ,\"5551234\",129").as_deref(), Some("5551234"));
        assert_eq!(parse_own_number("OK"), None);

        assert_eq!(
            parse_operator("+COPS: 0,0,\"CHINA MOBILE\",7").as_deref(),
            Some("CHINA MOBILE")
        );
        assert_eq!(parse_operator("+COPS: 0"), None);
    }

    #[test]
    fn test_send_reference() {
        assert_eq!(parse_send_reference("+CMGS: 42"), Some(42));
        assert_eq!(parse_send_reference("OK"), None);
    }

    #[test]
    fn test_parse_message_list() {
        let lines: Vec<String> = [
            "+CMGL: 1,0,,31",
            "00040D91683108108300F00000322181010000000BE8329BFD06DDDF723619",
            "+CMGL: 2,1,,10",
            "00FF",
            "+CMGL: 3,1,,20",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        let frags = parse_message_list(&lines);
        assert_eq!(frags.len(), 2);
        assert_eq!(frags[0].index, 1);
        assert_eq!(frags[0].status, SmsStatus::ReceivedUnread);
        assert_eq!(frags[0].text, "hello world");
        assert_eq!(frags[1].index, 2);
        assert_eq!(frags[1].status, SmsStatus::ReceivedRead);
        assert!(frags[1].error.is_some());
        assert_eq!(frags[1].text, "00FF");
    }

    #[test]
    fn test_parse_urc() {
        let urc = parse_urc("+CMTI: \"SM\",3").unwrap();
        assert_eq!(urc.code, "+CMTI");
        assert_eq!(urc.params, vec!["SM", "3"]);
        assert_eq!(new_message_index(&urc), Some(3));

        let ring = parse_urc("RING").unwrap();
        assert_eq!(ring.code, "RING");
        assert!(ring.params.is_empty());
        assert_eq!(new_message_index(&ring), None);

        assert!(parse_urc("OK").is_none());
        assert!(parse_urc("   ").is_none());
    }

    #[test]
    fn test_is_unsolicited() {
        assert!(is_unsolicited("+CMTI: \"SM\",1"));
        assert!(is_unsolicited("RING"));
        assert!(!is_unsolicited("+CSQ: 10,0"));
        assert!(!is_unsolicited("+CMGL: 1,0,,20"));
        assert!(!is_unsolicited("+CREG: 0,1"));
    }

    #[test]
    fn test_registration_query_keeps_its_reply() {
        let resp = parse_at_response("AT+CREG?", "\r\n+CREG: 0,1\r\n\r\nOK\r\n", 5);
        assert_eq!(resp.result, ResultCode::Ok);
        assert_eq!(resp.lines, vec!["+CREG: 0,1"]);
        assert_eq!(extract_value(&resp).as_deref(), Some("0,1"));
    }
}
