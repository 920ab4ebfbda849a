//! Built-in message sinks.

use wmodem_serial::serial::sink::SmsSink;
use wmodem_serial::serial::types::InboundSms;

/// Writes every received message to the log.
#[derive(Debug, Default)]
pub struct LogSink;

impl LogSink {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl SmsSink for LogSink {
    fn name(&self) -> &str {
        "log"
    }

    async fn deliver(&self, sms: InboundSms) -> Result<(), String> {
        let msg = &sms.message;
        tracing::info!(
            device = %sms.device,
            receiver = %sms.receiver,
            sender = %msg.sender,
            parts = msg.parts_received,
            sent_at = ?sms.sent_at,
            indices = ?msg.indices,
            "sms: {}",
            msg.text
        );
        if let Some(err) = &msg.error {
            tracing::warn!(device = %sms.device, "undecodable message: {}", err);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wmodem_pdu::pdu::{LogicalSms, SmsStatus};

    #[tokio::test]
    async fn test_log_sink_accepts_everything() {
        let sms = InboundSms::new(
            "ttyUSB0",
            "unknown",
            LogicalSms {
                indices: vec![4],
                status: SmsStatus::ReceivedUnread,
                sender: "+15551234567".into(),
                timestamp: None,
                text: "ping".into(),
                reference: None,
                parts_expected: 1,
                parts_received: 1,
                error: None,
            },
        );
        assert!(LogSink::new().deliver(sms).await.is_ok());
        assert_eq!(LogSink.name(), "log");
    }
}
