//! Serial byte-stream abstraction.
//!
//! The transport engine only needs a half-duplex byte stream: read what
//! is there, write a buffer, discard stale input, close. Real ports are
//! provided by [`crate::serial::native`]; [`SimulatedTransport`] is an
//! in-memory stream for tests and `--simulate` runs.

use crate::serial::error::ModemResult;
use crate::serial::types::SerialEndpoint;
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Transport trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// An open serial byte stream.
///
/// Implementations must be `Send + Sync` so they can be held behind an
/// `Arc` and used from the reader task and command callers at once.
#[async_trait::async_trait]
pub trait SerialTransport: Send + Sync {
    /// Read up to `buf.len()` bytes. `Ok(0)` means nothing arrived within
    /// the implementation's poll slice; an error means the stream is gone.
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize>;

    /// Write all of `buf`.
    async fn write(&self, buf: &[u8]) -> io::Result<usize>;

    /// Drop any received bytes not yet read.
    async fn discard_input(&self) -> io::Result<()>;

    /// Close the stream. Pending and later reads fail.
    async fn close(&self) -> io::Result<()>;

    fn is_open(&self) -> bool;

    fn port_name(&self) -> &str;
}

/// Opens a transport for an endpoint. The registry is generic over this
/// so discovery can run against real ports or simulated ones.
#[async_trait::async_trait]
pub trait PortOpener: Send + Sync {
    async fn open(&self, endpoint: &SerialEndpoint) -> ModemResult<Arc<dyn SerialTransport>>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Simulated transport (for testing & offline use)
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Produces the bytes a peer sends back after each write.
pub type Responder = Box<dyn FnMut(&[u8]) -> Option<Vec<u8>> + Send>;

/// A fully in-memory transport.
pub struct SimulatedTransport {
    name: String,
    open: AtomicBool,
    rx_buf: Mutex<VecDeque<u8>>,
    tx_buf: Mutex<VecDeque<u8>>,
    rx_notify: Notify,
    loopback: AtomicBool,
    fail_writes: AtomicBool,
    responder: std::sync::Mutex<Option<Responder>>,
}

impl SimulatedTransport {
    /// Create an open simulated transport for the given port name.
    pub fn new(port_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            name: port_name.into(),
            open: AtomicBool::new(true),
            rx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            tx_buf: Mutex::new(VecDeque::with_capacity(4096)),
            rx_notify: Notify::new(),
            loopback: AtomicBool::new(false),
            fail_writes: AtomicBool::new(false),
            responder: std::sync::Mutex::new(None),
        })
    }

    /// Enable loopback mode (TX data is immediately available in RX).
    pub fn set_loopback(&self, enabled: bool) {
        self.loopback.store(enabled, Ordering::SeqCst);
    }

    /// Make every subsequent write fail, as an unplugged adapter would.
    pub fn set_fail_writes(&self, enabled: bool) {
        self.fail_writes.store(enabled, Ordering::SeqCst);
    }

    /// Install a peer that answers each write.
    pub fn set_responder(&self, responder: Responder) {
        if let Ok(mut slot) = self.responder.lock() {
            *slot = Some(responder);
        }
    }

    /// Inject bytes into the receive buffer (simulate incoming data).
    pub async fn inject_rx(&self, data: &[u8]) {
        let mut buf = self.rx_buf.lock().await;
        buf.extend(data);
        self.rx_notify.notify_waiters();
    }

    /// Drain all bytes from the transmit buffer (for test assertions).
    pub async fn drain_tx(&self) -> Vec<u8> {
        let mut buf = self.tx_buf.lock().await;
        buf.drain(..).collect()
    }

    /// Peek at the transmit buffer contents without draining.
    pub async fn peek_tx(&self) -> Vec<u8> {
        let buf = self.tx_buf.lock().await;
        buf.iter().copied().collect()
    }

    fn not_open(&self) -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, format!("port {} not open", self.name))
    }
}

#[async_trait::async_trait]
impl SerialTransport for SimulatedTransport {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(self.not_open());
        }
        let mut rx = self.rx_buf.lock().await;
        if rx.is_empty() {
            drop(rx);
            // Wait for data with a short timeout
            tokio::select! {
                _ = self.rx_notify.notified() => {},
                _ = tokio::time::sleep(tokio::time::Duration::from_millis(50)) => {},
            }
            if !self.open.load(Ordering::SeqCst) {
                return Err(self.not_open());
            }
            rx = self.rx_buf.lock().await;
        }
        let count = buf.len().min(rx.len());
        for (slot, byte) in buf.iter_mut().zip(rx.drain(..count)) {
            *slot = byte;
        }
        Ok(count)
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.open.load(Ordering::SeqCst) {
            return Err(self.not_open());
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "simulated write failure"));
        }
        self.tx_buf.lock().await.extend(buf);

        if self.loopback.load(Ordering::SeqCst) {
            self.inject_rx(buf).await;
        }

        let reply = match self.responder.lock() {
            Ok(mut slot) => slot.as_mut().and_then(|respond| respond(buf)),
            Err(_) => None,
        };
        if let Some(bytes) = reply {
            self.inject_rx(&bytes).await;
        }
        Ok(buf.len())
    }

    async fn discard_input(&self) -> io::Result<()> {
        self.rx_buf.lock().await.clear();
        Ok(())
    }

    async fn close(&self) -> io::Result<()> {
        self.open.store(false, Ordering::SeqCst);
        self.rx_notify.notify_waiters();
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Trace formatting
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Render traffic for logs: printable ASCII as-is, CR/LF/Ctrl-Z as
/// escapes, anything else as `\xNN`.
pub fn printable(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len());
    for &b in data {
        match b {
            b'\r' => out.push_str("\\r"),
            b'\n' => out.push_str("\\n"),
            0x1A => out.push_str("^Z"),
            _ if b.is_ascii_graphic() || b == b' ' => out.push(b as char),
            _ => out.push_str(&format!("\\x{:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_simulated_transport_write_read() {
        let t = SimulatedTransport::new("COM1");
        t.inject_rx(b"Hello").await;
        let mut buf = [0u8; 64];
        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"Hello");
    }

    #[tokio::test]
    async fn test_simulated_transport_read_times_out_empty() {
        let t = SimulatedTransport::new("COM1");
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_simulated_transport_loopback() {
        let t = SimulatedTransport::new("COM1");
        t.set_loopback(true);
        t.write(b"echo").await.unwrap();
        let mut buf = [0u8; 64];
        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"echo");
        assert_eq!(t.drain_tx().await, b"echo");
        assert!(t.peek_tx().await.is_empty());
    }

    #[tokio::test]
    async fn test_responder_answers_writes() {
        let t = SimulatedTransport::new("COM1");
        t.set_responder(Box::new(|written| {
            (written == b"AT\r\n").then(|| b"\r\nOK\r\n".to_vec())
        }));
        t.write(b"AT\r\n").await.unwrap();
        let mut buf = [0u8; 16];
        let n = t.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"\r\nOK\r\n");
    }

    #[tokio::test]
    async fn test_error_when_closed() {
        let t = SimulatedTransport::new("COM1");
        t.close().await.unwrap();
        assert!(!t.is_open());
        let mut buf = [0u8; 8];
        assert!(t.read(&mut buf).await.is_err());
        assert!(t.write(b"AT").await.is_err());
    }

    #[tokio::test]
    async fn test_fail_writes() {
        let t = SimulatedTransport::new("COM1");
        t.set_fail_writes(true);
        let err = t.write(b"AT").await.unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
    }

    #[tokio::test]
    async fn test_discard_input() {
        let t = SimulatedTransport::new("COM1");
        t.inject_rx(b"stale").await;
        t.discard_input().await.unwrap();
        let mut buf = [0u8; 8];
        assert_eq!(t.read(&mut buf).await.unwrap(), 0);
    }

    #[test]
    fn test_printable() {
        assert_eq!(printable(b"AT+CMGS=18\r"), "AT+CMGS=18\\r");
        assert_eq!(printable(b"00\x1a"), "00^Z");
        assert_eq!(printable(&[0x01]), "\\x01");
    }
}
