//! AT transport engine.
//!
//! One background reader owns the receive side of a port. While a command
//! is in flight every received chunk is routed to that command; otherwise
//! bytes are split into lines and dispatched as unsolicited result codes.
//! Commands are serialised by a lock held for the whole exchange, so a
//! multi-step sequence (`AT+CMGS` prompt, then PDU upload) cannot be
//! interleaved with another caller.

use crate::serial::at;
use crate::serial::error::{ModemError, ModemResult};
use crate::serial::transport::{printable, SerialTransport};
use crate::serial::types::{AtResponse, Urc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex, MutexGuard};
use tokio::task::JoinHandle;

/// Longest unterminated line kept while waiting for a newline.
const MAX_LINE_BUFFER: usize = 4096;

/// Something the engine reports outside of a command exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineEvent {
    Urc(Urc),
    /// The stream is gone; carries the reason. Emitted once.
    Closed(String),
}

/// Receives URCs and the close notification. Called from the reader task,
/// so it must not block.
pub type EventHandler = Arc<dyn Fn(EngineEvent) + Send + Sync>;

type PendingSlot = Arc<StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>>;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Engine handle
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

pub struct AtEngine {
    port_name: String,
    transport: Arc<dyn SerialTransport>,
    command_lock: Mutex<()>,
    pending: PendingSlot,
    handler: EventHandler,
    closed: Arc<AtomicBool>,
    reader: StdMutex<Option<JoinHandle<()>>>,
}

impl AtEngine {
    /// Take ownership of an open transport and start the reader task.
    pub fn start(
        transport: Arc<dyn SerialTransport>,
        handler: EventHandler,
        read_buffer_size: usize,
    ) -> Arc<Self> {
        let port_name = transport.port_name().to_string();
        let pending: PendingSlot = Arc::new(StdMutex::new(None));
        let closed = Arc::new(AtomicBool::new(false));

        let runner = EngineReader {
            port_name: port_name.clone(),
            transport: transport.clone(),
            pending: pending.clone(),
            handler: handler.clone(),
            closed: closed.clone(),
            line_buf: String::new(),
        };
        let reader = tokio::spawn(runner.run(read_buffer_size.max(16)));

        log::debug!("{}: transport engine started", port_name);
        Arc::new(Self {
            port_name,
            transport,
            command_lock: Mutex::new(()),
            pending,
            handler,
            closed,
            reader: StdMutex::new(Some(reader)),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && self.transport.is_open()
    }

    /// Wait for exclusive use of the port.
    pub async fn session(&self) -> ModemResult<CommandSession<'_>> {
        let guard = self.command_lock.lock().await;
        if !self.is_open() {
            return Err(ModemError::not_connected(&self.port_name));
        }
        Ok(CommandSession {
            engine: self,
            _guard: guard,
        })
    }

    /// Single command with the standard terminator.
    pub async fn send_command(&self, command: &str, window: Duration) -> ModemResult<AtResponse> {
        self.session().await?.exchange(command, at::EOL, window).await
    }

    /// Close the stream and stop the reader. Idempotent; the handler sees
    /// `Closed` only the first time.
    pub async fn close(&self, reason: &str) {
        self.mark_closed(reason);
        if let Err(e) = self.transport.close().await {
            log::debug!("{}: close: {}", self.port_name, e);
        }
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }

    fn mark_closed(&self, reason: &str) {
        shut_down(&self.closed, &self.pending, &self.handler, &self.port_name, reason);
    }

    fn install(&self, tx: mpsc::UnboundedSender<Vec<u8>>) {
        if let Ok(mut slot) = self.pending.lock() {
            *slot = Some(tx);
        }
    }

    fn uninstall(&self) {
        if let Ok(mut slot) = self.pending.lock() {
            slot.take();
        }
    }

    fn dispatch_embedded_urcs(&self, text: &str) {
        for line in text.lines().filter(|l| at::is_unsolicited(l)) {
            if let Some(urc) = at::parse_urc(line) {
                log::debug!("{}: URC inside response: {}", self.port_name, urc.line);
                (self.handler)(EngineEvent::Urc(urc));
            }
        }
    }
}

impl Drop for AtEngine {
    fn drop(&mut self) {
        if let Ok(mut reader) = self.reader.lock() {
            if let Some(handle) = reader.take() {
                handle.abort();
            }
        }
    }
}

/// Flip the closed flag; the first caller drops any in-flight command's
/// channel and notifies the handler.
fn shut_down(
    closed: &AtomicBool,
    pending: &StdMutex<Option<mpsc::UnboundedSender<Vec<u8>>>>,
    handler: &EventHandler,
    port_name: &str,
    reason: &str,
) {
    if closed.swap(true, Ordering::SeqCst) {
        return;
    }
    if let Ok(mut slot) = pending.lock() {
        slot.take();
    }
    log::info!("{}: closed ({})", port_name, reason);
    handler(EngineEvent::Closed(reason.to_string()));
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Command session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//
//  Holds the command lock. Each `exchange` waits with a rolling window:
//  the timer restarts whenever bytes arrive, so long listings that keep
//  streaming are never cut off.

pub struct CommandSession<'a> {
    engine: &'a AtEngine,
    _guard: MutexGuard<'a, ()>,
}

enum Outcome {
    Complete,
    TimedOut,
    StreamClosed,
}

impl CommandSession<'_> {
    /// Write `command` + `terminator` and collect the response.
    ///
    /// Returns `Timeout` only when nothing at all arrived. A response cut
    /// off by the window is returned as-is with [`ResultCode::Missing`].
    ///
    /// [`ResultCode::Missing`]: crate::serial::types::ResultCode::Missing
    pub async fn exchange(
        &self,
        command: &str,
        terminator: &str,
        window: Duration,
    ) -> ModemResult<AtResponse> {
        let engine = self.engine;
        if !engine.is_open() {
            return Err(ModemError::not_connected(&engine.port_name));
        }

        if let Err(e) = engine.transport.discard_input().await {
            log::debug!("{}: discard input: {}", engine.port_name, e);
        }

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        engine.install(tx);

        let mut wire = Vec::with_capacity(command.len() + terminator.len());
        wire.extend_from_slice(command.as_bytes());
        wire.extend_from_slice(terminator.as_bytes());
        log::trace!("{} >> {}", engine.port_name, printable(&wire));

        let started = Instant::now();
        if let Err(e) = engine.transport.write(&wire).await {
            engine.uninstall();
            let reason = format!("write failed: {}", e);
            engine.close(&reason).await;
            return Err(ModemError::io(reason).with_port(engine.port_name.as_str()));
        }

        let mut raw: Vec<u8> = Vec::new();
        let outcome = loop {
            match tokio::time::timeout(window, rx.recv()).await {
                Ok(Some(chunk)) => {
                    raw.extend_from_slice(&chunk);
                    if at::has_final_result(&String::from_utf8_lossy(&raw)) {
                        break Outcome::Complete;
                    }
                }
                Ok(None) => break Outcome::StreamClosed,
                Err(_) => break Outcome::TimedOut,
            }
        };
        engine.uninstall();

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let text = String::from_utf8_lossy(&raw).into_owned();
        log::trace!("{} << {}", engine.port_name, printable(&raw));

        match outcome {
            Outcome::Complete => {}
            Outcome::TimedOut if raw.is_empty() => {
                return Err(ModemError::timeout(format!(
                    "no response to {} within {} ms",
                    command,
                    window.as_millis()
                ))
                .with_port(engine.port_name.as_str()));
            }
            Outcome::TimedOut => {
                log::warn!(
                    "{}: {} ended without a result code after {} ms",
                    engine.port_name,
                    command,
                    elapsed_ms
                );
            }
            Outcome::StreamClosed if raw.is_empty() => {
                return Err(ModemError::io(format!("port closed during {}", command))
                    .with_port(engine.port_name.as_str()));
            }
            Outcome::StreamClosed => {
                log::warn!("{}: port closed during {}", engine.port_name, command);
            }
        }

        engine.dispatch_embedded_urcs(&text);
        Ok(at::parse_at_response(command, &text, elapsed_ms))
    }

    /// Write bytes without waiting for a response.
    pub async fn write_raw(&self, data: &[u8]) -> ModemResult<()> {
        let engine = self.engine;
        log::trace!("{} >> {}", engine.port_name, printable(data));
        match engine.transport.write(data).await {
            Ok(_) => Ok(()),
            Err(e) => {
                let reason = format!("write failed: {}", e);
                engine.close(&reason).await;
                Err(ModemError::io(reason).with_port(engine.port_name.as_str()))
            }
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Reader task
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct EngineReader {
    port_name: String,
    transport: Arc<dyn SerialTransport>,
    pending: PendingSlot,
    handler: EventHandler,
    closed: Arc<AtomicBool>,
    line_buf: String,
}

impl EngineReader {
    async fn run(mut self, buffer_size: usize) {
        let mut read_buf = vec![0u8; buffer_size];
        loop {
            if self.closed.load(Ordering::SeqCst) {
                break;
            }
            match self.transport.read(&mut read_buf).await {
                Ok(0) => tokio::task::yield_now().await,
                Ok(n) => self.route(&read_buf[..n]),
                Err(e) => {
                    shut_down(
                        &self.closed,
                        &self.pending,
                        &self.handler,
                        &self.port_name,
                        &format!("read failed: {}", e),
                    );
                    break;
                }
            }
        }
        log::debug!("{}: reader stopped", self.port_name);
    }

    fn route(&mut self, data: &[u8]) {
        let forwarded = match self.pending.lock() {
            Ok(slot) => slot.as_ref().map(|tx| tx.send(data.to_vec()).is_ok()).unwrap_or(false),
            Err(_) => false,
        };
        if forwarded {
            self.line_buf.clear();
            return;
        }

        self.line_buf.push_str(&String::from_utf8_lossy(data));
        while let Some(pos) = self.line_buf.find('\n') {
            let line: String = self.line_buf.drain(..=pos).collect();
            if let Some(urc) = at::parse_urc(&line) {
                log::debug!("{}: URC {}", self.port_name, urc.line);
                (self.handler)(EngineEvent::Urc(urc));
            }
        }
        if self.line_buf.len() > MAX_LINE_BUFFER {
            log::warn!("{}: dropping {} bytes of unterminated input", self.port_name, self.line_buf.len());
            self.line_buf.clear();
        }
    }
}
