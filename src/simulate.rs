//! `--simulate` support: a pair of scripted modems standing in for real
//! hardware.

use wmodem_serial::serial::config::ModemConfig;
use wmodem_serial::serial::simulator::SimulatorOpener;

/// Ports the simulated modems appear on.
pub const SIMULATED_PORTS: [&str; 2] = ["/dev/ttySIM0", "/dev/ttySIM1"];

/// "hello world" from +8613800138000, delivered shortly after startup.
const DEMO_PDU: &str = "00040D91683108108300F00000322181010000000BE8329BFD06DDDF723619";

/// Attach the simulated modems and point `config` at them.
pub fn setup(config: &mut ModemConfig) -> SimulatorOpener {
    let opener = SimulatorOpener::new();
    for (i, path) in SIMULATED_PORTS.iter().enumerate() {
        let modem = opener.attach(path);
        modem.set_own_number(Some(&format!("+1555010{}", i)));
        modem.set_signal(18 + i as u8 * 5, 0);
    }
    config.ports = SIMULATED_PORTS.iter().map(|p| p.to_string()).collect();
    opener
}

/// Raise one incoming message on the first simulated modem.
pub async fn deliver_demo_message(opener: &SimulatorOpener) {
    let path = SIMULATED_PORTS[0];
    match (opener.modem(path), opener.transport(path)) {
        (Some(modem), Some(transport)) => {
            let index = modem.receive(&transport, DEMO_PDU).await;
            tracing::debug!(port = path, index, "simulated incoming sms");
        }
        _ => tracing::warn!(port = path, "simulated modem not connected"),
    }
}
