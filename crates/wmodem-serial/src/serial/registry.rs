//! Device registry: every connected modem, keyed by port name.
//!
//! Owns discovery (`scan`), hands out devices, turns engine events into
//! broadcast lines, and forwards new messages announced by `+CMTI` to the
//! registered sinks.

use crate::serial::at;
use crate::serial::config::ModemConfig;
use crate::serial::device::Device;
use crate::serial::engine::{EngineEvent, EventHandler};
use crate::serial::error::{ModemError, ModemResult};
use crate::serial::port_scanner;
use crate::serial::sink::SmsSink;
use crate::serial::transport::PortOpener;
use crate::serial::types::*;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock, Weak};
use wmodem_events::EventBroadcaster;
use wmodem_pdu::pdu::SmsStatus;

/// Receiver placeholder when the SIM number could not be read.
pub const UNKNOWN_NUMBER: &str = "unknown";

/// Cheap to clone; clones share the same registry.
#[derive(Clone)]
pub struct DeviceRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    config: ModemConfig,
    opener: Arc<dyn PortOpener>,
    events: EventBroadcaster,
    sinks: RwLock<Vec<Arc<dyn SmsSink>>>,
    devices: Mutex<HashMap<String, Arc<Device>>>,
    scan_lock: tokio::sync::Mutex<()>,
}

impl DeviceRegistry {
    pub fn new(config: ModemConfig, opener: Arc<dyn PortOpener>, events: EventBroadcaster) -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                config,
                opener,
                events,
                sinks: RwLock::new(Vec::new()),
                devices: Mutex::new(HashMap::new()),
                scan_lock: tokio::sync::Mutex::new(()),
            }),
        }
    }

    pub fn config(&self) -> &ModemConfig {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBroadcaster {
        &self.inner.events
    }

    pub fn add_sink(&self, sink: Arc<dyn SmsSink>) {
        if let Ok(mut sinks) = self.inner.sinks.write() {
            log::debug!("registered SMS sink {}", sink.name());
            sinks.push(sink);
        }
    }

    // ── Discovery ─────────────────────────────────────────────────

    /// Probe every candidate port. Healthy devices are left alone; one
    /// failing the liveness probe is closed and reconnected. Ports that
    /// fail to open or handshake are skipped.
    pub async fn scan(&self) -> Vec<DeviceSummary> {
        let _scan = self.inner.scan_lock.lock().await;
        let config = &self.inner.config;

        for path in port_scanner::candidate_ports(&config.ports) {
            let endpoint = SerialEndpoint::new(path, config.baud_rate);
            let name = endpoint.name();

            if let Some(existing) = self.inner.lookup(&name) {
                if existing.is_connected() && existing.test().await.is_ok() {
                    continue;
                }
                log::warn!("{}: liveness probe failed, reconnecting", name);
                self.inner.detach(&name, &existing, "liveness probe failed").await;
            }

            match self.connect(endpoint).await {
                Ok(device) => self.inner.attach(device),
                Err(e) => log::info!("{}: skipped: {}", name, e),
            }
        }

        self.list()
    }

    async fn connect(&self, endpoint: SerialEndpoint) -> ModemResult<Arc<Device>> {
        let transport = self.inner.opener.open(&endpoint).await?;
        let handler = event_handler(Arc::downgrade(&self.inner), endpoint.name());
        Device::connect(endpoint, transport, handler, self.inner.config.clone()).await
    }

    // ── Lookup ────────────────────────────────────────────────────

    /// Find a connected device by name or path.
    pub fn get(&self, name_or_path: &str) -> ModemResult<Arc<Device>> {
        let name = device_name(name_or_path.trim());
        match self.inner.lookup(&name) {
            Some(device) if device.is_connected() => Ok(device),
            Some(_) => Err(ModemError::not_connected(&name)),
            None => Err(ModemError::not_found(&name)),
        }
    }

    /// All devices, sorted by name.
    pub fn list(&self) -> Vec<DeviceSummary> {
        let mut out: Vec<DeviceSummary> = match self.inner.devices.lock() {
            Ok(devices) => devices.values().map(|d| d.summary()).collect(),
            Err(_) => Vec::new(),
        };
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    // ── Teardown ──────────────────────────────────────────────────

    pub async fn remove(&self, name_or_path: &str) -> ModemResult<()> {
        let name = device_name(name_or_path.trim());
        let device = self
            .inner
            .lookup(&name)
            .ok_or_else(|| ModemError::not_found(&name))?;
        self.inner.detach(&name, &device, "removed").await;
        Ok(())
    }

    /// Close every device.
    pub async fn shutdown(&self) {
        let devices: Vec<(String, Arc<Device>)> = match self.inner.devices.lock() {
            Ok(mut devices) => devices.drain().collect(),
            Err(_) => Vec::new(),
        };
        for (name, device) in devices {
            device.close("shutdown").await;
            self.inner.broadcast(&name, "disconnected: shutdown");
        }
        log::info!("device registry shut down");
    }
}

impl RegistryInner {
    fn lookup(&self, name: &str) -> Option<Arc<Device>> {
        self.devices.lock().ok()?.get(name).cloned()
    }

    fn attach(&self, device: Arc<Device>) {
        let name = device.name().to_string();
        let line = format!(
            "connected: {} ({})",
            device.endpoint().path,
            device.phone_number().as_deref().unwrap_or(UNKNOWN_NUMBER)
        );
        if let Ok(mut devices) = self.devices.lock() {
            devices.insert(name.clone(), device);
        }
        self.broadcast(&name, &line);
    }

    /// Drop `device` from the map (if it is still the one registered
    /// under `name`) and close it.
    async fn detach(&self, name: &str, device: &Arc<Device>, reason: &str) {
        let removed = match self.devices.lock() {
            Ok(mut devices) => match devices.get(name) {
                Some(current) if Arc::ptr_eq(current, device) => devices.remove(name).is_some(),
                _ => false,
            },
            Err(_) => false,
        };
        device.close(reason).await;
        if removed {
            self.broadcast(name, &format!("disconnected: {}", reason));
        }
    }

    fn broadcast(&self, name: &str, text: &str) {
        self.events.broadcast(format!("[{}] {}", name, text));
    }

    fn handle_event(self: &Arc<Self>, name: &str, event: EngineEvent) {
        match event {
            EngineEvent::Urc(urc) => {
                self.broadcast(name, &urc.line);
                if let Some(index) = at::new_message_index(&urc) {
                    let inner = self.clone();
                    let name = name.to_string();
                    tokio::spawn(async move { inner.forward_new_message(&name, index).await });
                }
            }
            EngineEvent::Closed(reason) => {
                // Only a closed device is dropped; a fresh one under the
                // same name stays.
                let removed = match self.devices.lock() {
                    Ok(mut devices) => match devices.get(name) {
                        Some(device) if !device.is_connected() => devices.remove(name).is_some(),
                        _ => false,
                    },
                    Err(_) => false,
                };
                if removed {
                    self.broadcast(name, &format!("disconnected: {}", reason));
                }
            }
        }
    }

    /// List storage and hand every complete message containing `index`
    /// to the sinks. Parts of a multi-part message wait until the last
    /// part's notification.
    async fn forward_new_message(&self, name: &str, index: u32) {
        let device = match self.lookup(name) {
            Some(d) if d.is_connected() => d,
            _ => return,
        };
        let messages = match device.list_sms(SmsStatus::All).await {
            Ok(m) => m,
            Err(e) => {
                log::warn!("{}: listing after +CMTI {} failed: {}", name, index, e);
                return;
            }
        };

        let receiver = device
            .phone_number()
            .unwrap_or_else(|| UNKNOWN_NUMBER.to_string());
        let sinks: Vec<Arc<dyn SmsSink>> = self.sinks.read().map(|s| s.clone()).unwrap_or_default();

        for message in messages.into_iter().filter(|m| m.contains_index(index)) {
            if !message.is_complete() {
                log::debug!(
                    "{}: message {} has {}/{} parts, waiting",
                    name,
                    index,
                    message.parts_received,
                    message.parts_expected
                );
                continue;
            }
            self.broadcast(name, &format!("sms from {}", message.sender));
            let sms = InboundSms::new(name, receiver.as_str(), message);
            for sink in &sinks {
                let sink = sink.clone();
                let sms = sms.clone();
                tokio::spawn(async move {
                    if let Err(e) = sink.deliver(sms).await {
                        log::warn!("sink {} failed: {}", sink.name(), e);
                    }
                });
            }
        }
    }
}

fn event_handler(registry: Weak<RegistryInner>, name: String) -> EventHandler {
    Arc::new(move |event| {
        if let Some(inner) = registry.upgrade() {
            inner.handle_event(&name, event);
        }
    })
}
