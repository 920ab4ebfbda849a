//! One connected modem and its typed operations.

use crate::serial::at::{self, AtCommands};
use crate::serial::config::ModemConfig;
use crate::serial::engine::{AtEngine, EventHandler};
use crate::serial::error::{ModemError, ModemResult};
use crate::serial::transport::SerialTransport;
use crate::serial::types::*;
use std::sync::atomic::{AtomicU32, AtomicU8, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Duration;
use wmodem_pdu::pdu::{self, LogicalSms, SmsStatus};

pub struct Device {
    name: String,
    endpoint: SerialEndpoint,
    engine: Arc<AtEngine>,
    config: ModemConfig,
    phone_number: RwLock<Option<String>>,
    consecutive_timeouts: AtomicU32,
    next_reference: AtomicU8,
}

impl std::fmt::Debug for Device {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Device")
            .field("name", &self.name)
            .field("path", &self.endpoint.path)
            .field("connected", &self.is_connected())
            .finish()
    }
}

impl Device {
    /// Start the engine on `transport` and run the handshake: liveness
    /// probe, echo off, PDU mode. The stream is closed if any step fails.
    pub async fn connect(
        endpoint: SerialEndpoint,
        transport: Arc<dyn SerialTransport>,
        handler: EventHandler,
        config: ModemConfig,
    ) -> ModemResult<Arc<Self>> {
        let name = endpoint.name();
        let engine = AtEngine::start(transport, handler, config.read_buffer_size);
        let device = Self {
            name,
            endpoint,
            engine,
            config,
            phone_number: RwLock::new(None),
            consecutive_timeouts: AtomicU32::new(0),
            next_reference: AtomicU8::new(seed_reference()),
        };

        if let Err(e) = device.handshake().await {
            device.engine.close("handshake failed").await;
            return Err(ModemError::handshake(e.message).with_port(device.name.as_str()));
        }

        if let Err(e) = device.refresh_phone_number().await {
            log::debug!("{}: own number unavailable: {}", device.name, e);
        }
        log::info!(
            "{}: connected at {} baud ({})",
            device.name,
            device.endpoint.baud_rate,
            device.phone_number().as_deref().unwrap_or("number unknown")
        );
        Ok(Arc::new(device))
    }

    async fn handshake(&self) -> ModemResult<()> {
        let session = self.engine.session().await?;
        for command in [AtCommands::AT, AtCommands::ECHO_OFF, AtCommands::PDU_MODE] {
            let resp = session
                .exchange(command, at::EOL, self.config.handshake_timeout())
                .await?;
            if !resp.result.is_ok() {
                return Err(ModemError::protocol(resp.summary()));
            }
        }
        Ok(())
    }

    // ── Accessors ────────────────────────────────────────────────

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &SerialEndpoint {
        &self.endpoint
    }

    pub fn is_connected(&self) -> bool {
        self.engine.is_open()
    }

    /// Cached own number.
    pub fn phone_number(&self) -> Option<String> {
        self.phone_number.read().ok().and_then(|n| n.clone())
    }

    pub fn summary(&self) -> DeviceSummary {
        DeviceSummary {
            name: self.name.clone(),
            path: self.endpoint.path.clone(),
            connected: self.is_connected(),
            phone_number: self.phone_number(),
        }
    }

    pub async fn close(&self, reason: &str) {
        self.engine.close(reason).await;
    }

    // ── Command plumbing ─────────────────────────────────────────

    async fn command(&self, command: &str, window: Duration) -> ModemResult<AtResponse> {
        let result = self.engine.send_command(command, window).await;
        self.observe(result).await
    }

    /// Count consecutive timeouts; past the limit the stream is closed.
    async fn observe<T>(&self, result: ModemResult<T>) -> ModemResult<T> {
        match &result {
            Ok(_) => self.consecutive_timeouts.store(0, Ordering::SeqCst),
            Err(e) if e.is_retryable() => {
                let count = self.consecutive_timeouts.fetch_add(1, Ordering::SeqCst) + 1;
                let limit = self.config.max_consecutive_timeouts;
                if limit > 0 && count >= limit {
                    log::warn!("{}: {} consecutive timeouts, closing", self.name, count);
                    self.engine
                        .close(&format!("{} consecutive command timeouts", count))
                        .await;
                }
            }
            Err(_) => {}
        }
        result
    }

    async fn expect_ok(&self, command: &str) -> ModemResult<AtResponse> {
        let resp = self.command(command, self.config.command_timeout()).await?;
        if resp.result.is_ok() {
            Ok(resp)
        } else {
            Err(ModemError::protocol(resp.summary()).with_port(self.name.as_str()))
        }
    }

    async fn query_value(&self, command: &str) -> ModemResult<String> {
        let resp = self.expect_ok(command).await?;
        at::extract_value(&resp).ok_or_else(|| {
            ModemError::protocol(format!("{}: empty response", command)).with_port(self.name.as_str())
        })
    }

    // ── Operations ───────────────────────────────────────────────

    /// Liveness probe (`AT`).
    pub async fn test(&self) -> ModemResult<()> {
        let resp = self
            .command(AtCommands::AT, self.config.handshake_timeout())
            .await?;
        if resp.result.is_ok() {
            Ok(())
        } else {
            Err(ModemError::protocol(resp.summary()).with_port(self.name.as_str()))
        }
    }

    /// Send arbitrary text and return the non-empty response lines,
    /// including the final result code.
    pub async fn send_raw_command(&self, command: &str) -> ModemResult<Vec<String>> {
        let command = command.trim();
        if command.is_empty() {
            return Err(ModemError::validation("command is empty"));
        }
        let resp = self.command(command, self.config.command_timeout()).await?;
        Ok(resp
            .raw
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(String::from)
            .collect())
    }

    pub async fn manufacturer(&self) -> ModemResult<String> {
        self.query_value(AtCommands::MANUFACTURER).await
    }

    pub async fn model(&self) -> ModemResult<String> {
        self.query_value(AtCommands::MODEL).await
    }

    pub async fn imei(&self) -> ModemResult<String> {
        self.query_value(AtCommands::IMEI).await
    }

    pub async fn imsi(&self) -> ModemResult<String> {
        self.query_value(AtCommands::IMSI).await
    }

    pub async fn operator(&self) -> ModemResult<String> {
        let resp = self.expect_ok(AtCommands::CURRENT_OPERATOR).await?;
        resp.lines
            .iter()
            .find_map(|l| at::parse_operator(l))
            .ok_or_else(|| ModemError::protocol("no operator selected").with_port(self.name.as_str()))
    }

    /// Query the own number and update the cache. `Ok(None)` when the SIM
    /// has no number stored.
    pub async fn refresh_phone_number(&self) -> ModemResult<Option<String>> {
        let resp = self.expect_ok(AtCommands::OWN_NUMBER).await?;
        let number = resp.lines.iter().find_map(|l| at::parse_own_number(l));
        if let Ok(mut cached) = self.phone_number.write() {
            *cached = number.clone();
        }
        Ok(number)
    }

    /// All identification fields; any that fail are left empty.
    pub async fn identity(&self) -> DeviceIdentity {
        DeviceIdentity {
            manufacturer: self.manufacturer().await.ok(),
            model: self.model().await.ok(),
            imei: self.imei().await.ok(),
            imsi: self.imsi().await.ok(),
            phone_number: self.refresh_phone_number().await.ok().flatten(),
            operator: self.operator().await.ok(),
        }
    }

    pub async fn signal(&self) -> ModemResult<SignalReport> {
        let resp = self.expect_ok(AtCommands::SIGNAL_QUALITY).await?;
        let (rssi, ber) = resp
            .lines
            .iter()
            .find_map(|l| at::parse_signal_quality(l))
            .ok_or_else(|| {
                ModemError::protocol(format!("unparseable {}", resp.summary()))
                    .with_port(self.name.as_str())
            })?;
        Ok(at::signal_report(rssi, ber))
    }

    /// List stored messages and reassemble multi-part ones. Reassembly
    /// only sees this listing; parts stored later are not merged in.
    pub async fn list_sms(&self, status: SmsStatus) -> ModemResult<Vec<LogicalSms>> {
        let resp = self.expect_ok(&AtCommands::list_messages(status)).await?;
        let fragments = at::parse_message_list(&resp.lines);
        log::debug!("{}: listed {} stored PDUs", self.name, fragments.len());
        Ok(pdu::reassemble(fragments))
    }

    /// Submit `text` to `number`, split into concatenated parts when it
    /// does not fit one PDU. All parts go out in one command session.
    pub async fn send_sms(&self, number: &str, text: &str) -> ModemResult<SendReceipt> {
        let number = number.trim();
        if number.is_empty() {
            return Err(ModemError::validation("destination number is empty"));
        }
        let reference = self.next_reference.fetch_add(1, Ordering::SeqCst);
        let parts = pdu::encode_submit_concatenated(number, text, reference)?;

        let session = self.engine.session().await?;
        let mut references = Vec::with_capacity(parts.len());
        for (i, part) in parts.iter().enumerate() {
            let command = AtCommands::send_message(part.tpdu_len);
            let prompt = session
                .exchange(&command, at::CR, self.config.command_timeout())
                .await;
            let prompt = self.observe(prompt).await?;
            if !prompt.result.is_prompt() {
                if prompt.result == ResultCode::Missing {
                    // The modem may still be waiting for PDU input.
                    let _ = session.write_raw(at::ESC).await;
                }
                return Err(ModemError::protocol(format!(
                    "no prompt for part {}/{}: {}",
                    i + 1,
                    parts.len(),
                    prompt.summary()
                ))
                .with_port(self.name.as_str()));
            }

            let done = session
                .exchange(&part.hex, at::CTRL_Z, self.config.sms_send_timeout())
                .await;
            let done = self.observe(done).await?;
            if !done.result.is_ok() {
                return Err(ModemError::protocol(format!(
                    "part {}/{} rejected: {}",
                    i + 1,
                    parts.len(),
                    done.summary()
                ))
                .with_port(self.name.as_str()));
            }
            if let Some(mr) = done.lines.iter().find_map(|l| at::parse_send_reference(l)) {
                references.push(mr);
            }
        }

        log::info!("{}: sent {} part(s) to {}", self.name, parts.len(), number);
        Ok(SendReceipt {
            parts: parts.len(),
            references,
        })
    }

    /// Delete each index in turn. Per-index failures are collected; only a
    /// fatal transport error stops the run.
    pub async fn delete_sms(&self, indices: &[u32]) -> ModemResult<DeleteReport> {
        if indices.is_empty() {
            return Err(ModemError::validation("no message indices given"));
        }
        let mut report = DeleteReport::default();
        for &index in indices {
            match self
                .command(&AtCommands::delete_message(index), self.config.command_timeout())
                .await
            {
                Ok(resp) if resp.result.is_ok() => report.deleted.push(index),
                Ok(resp) => report.failed.push(DeleteFailure {
                    index,
                    reason: resp.summary(),
                }),
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => report.failed.push(DeleteFailure {
                    index,
                    reason: e.to_string(),
                }),
            }
        }
        Ok(report)
    }
}

/// Start concatenation references somewhere other than zero so restarts
/// do not reuse the previous run's first reference.
fn seed_reference() -> u8 {
    (chrono::Utc::now().timestamp_subsec_nanos() % 256) as u8
}
