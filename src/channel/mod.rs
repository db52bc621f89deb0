//! Publish side of the message bus.
//!
//! Executions only ever need to publish, so the seam between the core and
//! the transport is the single-method [`MessageChannel`] trait. The MQTT
//! implementation lives in [`mqtt`]; tests substitute an in-memory recorder.
//!
//! One shared channel is used by every execution, so implementations must
//! be safe to call from concurrent tasks.

pub mod mqtt;

use async_trait::async_trait;
use thiserror::Error;

pub use mqtt::MqttChannel;

#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
}

#[async_trait]
pub trait MessageChannel: Send + Sync {
    /// Queue `payload` for delivery on `topic`.
    ///
    /// Returns once the message is handed to the transport; it does not wait
    /// for a broker acknowledgement.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ChannelError>;
}
