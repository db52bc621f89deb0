use async_trait::async_trait;
use rumqttc::{AsyncClient, ClientError, QoS};

use super::{ChannelError, MessageChannel};

/// [`MessageChannel`] over a `rumqttc` client.
///
/// Publishes are at-most-once and never retained. The client is cheap to
/// clone; all clones feed the same event loop.
#[derive(Clone)]
pub struct MqttChannel {
    client: AsyncClient,
}

impl MqttChannel {
    pub fn new(client: AsyncClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl MessageChannel for MqttChannel {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<(), ChannelError> {
        self.client
            .publish(topic, QoS::AtMostOnce, false, payload)
            .await
            .map_err(|e: ClientError| ChannelError::Publish {
                topic: topic.to_string(),
                reason: e.to_string(),
            })
    }
}
