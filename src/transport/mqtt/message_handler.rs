//! Pure inbound message routing
//!
//! Every inbound publish reaches `on_any_message` with its raw topic. Topics
//! under the device prefix additionally reach `on_device_message` with the
//! prefix removed.

use bytes::Bytes;

/// Owned copy of an inbound publish, handed to event subscribers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttMessage {
    pub topic: String,
    pub payload: Bytes,
}

impl MqttMessage {
    pub fn new(topic: &str, payload: &[u8]) -> Self {
        Self {
            topic: topic.to_string(),
            payload: Bytes::copy_from_slice(payload),
        }
    }

    /// Payload as text, replacing invalid UTF-8.
    pub fn payload_str(&self) -> String {
        String::from_utf8_lossy(&self.payload).into_owned()
    }
}

/// Pure topic routing decisions
pub struct MessageHandler;

impl MessageHandler {
    /// Topic relative to `prefix`, or `None` when the message is not addressed
    /// to this device. An empty prefix matches every topic.
    pub fn strip_prefix<'a>(prefix: &str, topic: &'a str) -> Option<&'a str> {
        topic.strip_prefix(prefix)
    }

    /// Owned device-scoped copy of a publish, relative to `prefix`.
    pub fn device_message(prefix: &str, topic: &str, payload: &[u8]) -> Option<MqttMessage> {
        Self::strip_prefix(prefix, topic).map(|relative| MqttMessage::new(relative, payload))
    }
}
