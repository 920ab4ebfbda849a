//! Consumers of received messages.

use crate::serial::types::InboundSms;

/// Receives every complete inbound message. Persistence and webhook
/// forwarding live behind this trait.
///
/// Deliveries are spawned and not retried; a returned error is logged.
#[async_trait::async_trait]
pub trait SmsSink: Send + Sync {
    fn name(&self) -> &str;

    async fn deliver(&self, sms: InboundSms) -> Result<(), String>;
}
