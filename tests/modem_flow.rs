use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_test::{assert_err, assert_ok};
use wmodem::events::EventBroadcaster;
use wmodem::pdu::{decode_pdu, SmsStatus};
use wmodem::serial::{
    DeviceRegistry, InboundSms, ModemConfig, ModemErrorKind, SimulatorOpener, SmsSink,
};

const HELLO_WORLD: &str = "00040D91683108108300F00000322181010000000BE8329BFD06DDDF723619";
const NIHAO: &str = "00040D91683108108300F0000832218101000000044F60597D";

struct Collect(mpsc::UnboundedSender<InboundSms>);

#[async_trait::async_trait]
impl SmsSink for Collect {
    fn name(&self) -> &str {
        "collect"
    }

    async fn deliver(&self, sms: InboundSms) -> Result<(), String> {
        self.0.send(sms).map_err(|e| e.to_string())
    }
}

fn registry(ports: &[&str]) -> (DeviceRegistry, SimulatorOpener, EventBroadcaster) {
    let opener = SimulatorOpener::new();
    let config = ModemConfig {
        ports: ports.iter().map(|p| p.to_string()).collect(),
        command_timeout_ms: 300,
        handshake_timeout_ms: 150,
        sms_send_timeout_ms: 1_000,
        ..ModemConfig::default()
    };
    let events = EventBroadcaster::new();
    let registry = DeviceRegistry::new(config, Arc::new(opener.clone()), events.clone());
    (registry, opener, events)
}

#[tokio::test]
async fn test_scan_then_typed_operations() {
    let (registry, opener, _) = registry(&["/dev/ttyUSB0"]);
    let modem = opener.attach("/dev/ttyUSB0");
    modem.store(SmsStatus::ReceivedRead, HELLO_WORLD);
    modem.store(SmsStatus::ReceivedUnread, NIHAO);

    let found = registry.scan().await;
    assert_eq!(found.len(), 1);
    assert!(found[0].connected);

    let device = assert_ok!(registry.get("/dev/ttyUSB0"));

    let identity = device.identity().await;
    assert_eq!(identity.imei.as_deref(), Some("866123045678901"));
    assert_eq!(identity.phone_number.as_deref(), Some("+15550100"));

    let signal = assert_ok!(device.signal().await);
    assert_eq!(signal.rssi, 21);
    assert_eq!(signal.dbm, -71);
    assert_eq!(signal.level, 5);

    let unread = assert_ok!(device.list_sms(SmsStatus::ReceivedUnread).await);
    assert_eq!(unread.len(), 1);
    assert_eq!(unread[0].text, "你好");

    let all = assert_ok!(device.list_sms(SmsStatus::All).await);
    let texts: Vec<_> = all.iter().map(|m| m.text.as_str()).collect();
    assert_eq!(texts, vec!["hello world", "你好"]);

    let receipt = assert_ok!(device.send_sms("+8613800138000", "你好").await);
    assert_eq!(receipt.parts, 1);
    let sent = modem.sent_pdus();
    let decoded = assert_ok!(decode_pdu(&sent[0]));
    assert_eq!(decoded.address, "+8613800138000");
    assert_eq!(decoded.text, "你好");

    let report = assert_ok!(device.delete_sms(&[1, 2]).await);
    assert!(report.is_clean());
    assert!(modem.stored_indices().is_empty());

    let raw = assert_ok!(device.send_raw_command("AT+CGMM").await);
    assert_eq!(raw, vec!["EC25", "OK"]);
}

#[tokio::test]
async fn test_incoming_message_reaches_sink_and_subscribers() {
    let (registry, opener, events) = registry(&["/dev/ttyACM0"]);
    let modem = opener.attach("/dev/ttyACM0");
    let (tx, mut rx) = mpsc::unbounded_channel();
    registry.add_sink(Arc::new(Collect(tx)));

    let mut first = events.subscribe(10);
    let mut second = events.subscribe(10);
    registry.scan().await;

    let transport = opener.transport("/dev/ttyACM0").expect("transport opened by scan");
    modem.receive(&transport, HELLO_WORLD).await;

    let sms = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("delivery")
        .expect("sink channel open");
    assert_eq!(sms.device, "ttyACM0");
    assert_eq!(sms.message.text, "hello world");
    assert!(sms.detected_at <= chrono::Utc::now());

    for sub in [&mut first, &mut second] {
        let connected = assert_ok!(sub.try_recv());
        assert!(connected.starts_with("[ttyACM0] connected"), "{}", connected);
        let urc = assert_ok!(sub.try_recv());
        assert_eq!(urc, "[ttyACM0] +CMTI: \"SM\",1");
    }
}

#[tokio::test]
async fn test_lookup_errors_are_client_errors() {
    let (registry, _, _) = registry(&[]);
    let err = assert_err!(registry.get("ttyUSB3"));
    assert_eq!(err.kind, ModemErrorKind::NotFound);
    assert!(err.is_client_error());
    assert_eq!(err.code(), "not_found");
}

#[tokio::test]
async fn test_missing_hardware_is_skipped() {
    let (registry, opener, _) = registry(&["/dev/ttyUSB0", "/dev/ttyUSB1"]);
    let dead = opener.attach("/dev/ttyUSB1");
    dead.set_silent(true);

    assert!(registry.scan().await.is_empty());
    assert!(registry.list().is_empty());
}
