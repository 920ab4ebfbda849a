//! Real serial ports via `serialport`.
//!
//! The port is opened 8N1 without flow control and split with
//! `try_clone` into a read handle and a write handle, so the reader task
//! blocking in `read` never holds up a command write. Blocking calls run
//! on the blocking pool.

use crate::serial::error::{ModemError, ModemResult};
use crate::serial::transport::{PortOpener, SerialTransport};
use crate::serial::types::SerialEndpoint;
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

type PortHandle = Arc<Mutex<Option<Box<dyn SerialPort>>>>;

pub struct NativeTransport {
    name: String,
    reader: PortHandle,
    writer: PortHandle,
    open: Arc<AtomicBool>,
}

impl NativeTransport {
    /// Open `endpoint`. `read_timeout` bounds each blocking read, and so
    /// how quickly a close is noticed by the reader.
    pub fn open(endpoint: &SerialEndpoint, read_timeout: Duration) -> ModemResult<Self> {
        let port = serialport::new(&endpoint.path, endpoint.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .flow_control(serialport::FlowControl::None)
            .timeout(read_timeout)
            .open()
            .map_err(|e| ModemError::from(e).with_port(endpoint.name()))?;
        let writer = port
            .try_clone()
            .map_err(|e| ModemError::from(e).with_port(endpoint.name()))?;

        log::debug!("opened {} at {} baud", endpoint.path, endpoint.baud_rate);
        Ok(Self {
            name: endpoint.name(),
            reader: Arc::new(Mutex::new(Some(port))),
            writer: Arc::new(Mutex::new(Some(writer))),
            open: Arc::new(AtomicBool::new(true)),
        })
    }

    fn closed_error(&self) -> io::Error {
        io::Error::new(io::ErrorKind::NotConnected, format!("port {} not open", self.name))
    }
}

/// Run `f` against the port on the blocking pool. A handle found closed
/// after `f` returns is dropped here, since `close` cannot take it while
/// a blocking read holds the lock.
async fn with_port<R, F>(handle: &PortHandle, open: &Arc<AtomicBool>, name: &str, f: F) -> io::Result<R>
where
    R: Send + 'static,
    F: FnOnce(&mut Box<dyn SerialPort>) -> io::Result<R> + Send + 'static,
{
    let handle = handle.clone();
    let open = open.clone();
    let name = name.to_string();
    tokio::task::spawn_blocking(move || {
        let mut guard = handle
            .lock()
            .map_err(|_| io::Error::new(io::ErrorKind::Other, "port lock poisoned"))?;
        let result = match guard.as_mut() {
            Some(port) => f(port),
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                format!("port {} not open", name),
            )),
        };
        if !open.load(Ordering::SeqCst) && guard.take().is_some() {
            log::debug!("released {} after close", name);
        }
        result
    })
    .await
    .map_err(|e| io::Error::new(io::ErrorKind::Other, format!("blocking task failed: {}", e)))?
}

#[async_trait::async_trait]
impl SerialTransport for NativeTransport {
    async fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let capacity = buf.len();
        let data = with_port(&self.reader, &self.open, &self.name, move |port| {
            let mut chunk = vec![0u8; capacity];
            match port.read(&mut chunk) {
                Ok(n) => {
                    chunk.truncate(n);
                    Ok(chunk)
                }
                Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
                Err(e) => Err(e),
            }
        })
        .await?;
        if !self.is_open() {
            return Err(self.closed_error());
        }
        buf[..data.len()].copy_from_slice(&data);
        Ok(data.len())
    }

    async fn write(&self, buf: &[u8]) -> io::Result<usize> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        let data = buf.to_vec();
        with_port(&self.writer, &self.open, &self.name, move |port| {
            port.write_all(&data)?;
            port.flush()?;
            Ok(data.len())
        })
        .await
    }

    async fn discard_input(&self) -> io::Result<()> {
        if !self.is_open() {
            return Err(self.closed_error());
        }
        with_port(&self.writer, &self.open, &self.name, |port| {
            port.clear(serialport::ClearBuffer::Input)
                .map_err(|e| io::Error::new(io::ErrorKind::Other, e))
        })
        .await
    }

    async fn close(&self) -> io::Result<()> {
        if !self.open.swap(false, Ordering::SeqCst) {
            return Ok(());
        }
        // A reader blocked in `read` holds its lock; `with_port` drops
        // that handle once the read slice ends.
        if let Ok(mut writer) = self.writer.lock() {
            writer.take();
        }
        if let Ok(mut reader) = self.reader.try_lock() {
            reader.take();
        }
        log::debug!("closed {}", self.name);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn port_name(&self) -> &str {
        &self.name
    }
}

/// Opens real ports with the configured read slice.
pub struct NativeOpener {
    read_timeout: Duration,
}

impl NativeOpener {
    pub fn new(read_timeout: Duration) -> Self {
        Self { read_timeout }
    }
}

#[async_trait::async_trait]
impl PortOpener for NativeOpener {
    async fn open(&self, endpoint: &SerialEndpoint) -> ModemResult<Arc<dyn SerialTransport>> {
        let endpoint = endpoint.clone();
        let read_timeout = self.read_timeout;
        let transport = tokio::task::spawn_blocking(move || NativeTransport::open(&endpoint, read_timeout))
            .await
            .map_err(|e| ModemError::io(format!("open task failed: {}", e)))??;
        Ok(Arc::new(transport))
    }
}
