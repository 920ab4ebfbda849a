use std::io::Write;

use wmodem::config::{AppConfig, LogFormat};

#[test]
fn test_load_config_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{
            "modem": {{
                "ports": ["/dev/ttyUSB*", "COM4"],
                "baudRate": 57600,
                "smsSendTimeoutMs": 90000,
                "maxConsecutiveTimeouts": 5
            }},
            "events": {{ "buffer": 16 }},
            "logging": {{ "level": "wmodem_serial=debug", "format": "json" }},
            "scanIntervalSecs": 60
        }}"#
    )
    .unwrap();

    let cfg = AppConfig::load(file.path()).unwrap();
    assert_eq!(cfg.modem.ports, vec!["/dev/ttyUSB*", "COM4"]);
    assert_eq!(cfg.modem.baud_rate, 57_600);
    assert_eq!(cfg.modem.sms_send_timeout_ms, 90_000);
    assert_eq!(cfg.modem.max_consecutive_timeouts, 5);
    assert_eq!(cfg.modem.handshake_timeout_ms, 2_000);
    assert_eq!(cfg.events.buffer, 16);
    assert_eq!(cfg.logging.level, "wmodem_serial=debug");
    assert_eq!(cfg.logging.format, LogFormat::Json);
    assert_eq!(cfg.scan_interval_secs, 60);
}

#[test]
fn test_empty_object_gives_defaults() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{}").unwrap();
    assert_eq!(AppConfig::load(file.path()).unwrap(), AppConfig::default());
}

#[test]
fn test_missing_file_names_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = AppConfig::load(&path).unwrap_err();
    assert!(format!("{:#}", err).contains("absent.json"));
}

#[test]
fn test_malformed_file_rejected() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(b"{\"modem\": {\"baudRate\": \"fast\"}}").unwrap();
    assert!(AppConfig::load(file.path()).is_err());
}
