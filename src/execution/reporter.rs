use std::sync::Arc;

use async_trait::async_trait;

use super::{ExecutionId, ExecutionStatus, ExecutionTopics};
use crate::channel::MessageChannel;
use crate::worker::OutputSink;

/// Publishes the observable lifecycle of one execution.
///
/// Publish failures are logged and swallowed: a run request never fails
/// because the bus is unhappy.
pub struct Reporter {
    channel: Arc<dyn MessageChannel>,
    execution_id: ExecutionId,
    topics: ExecutionTopics,
}

impl Reporter {
    pub fn new(
        channel: Arc<dyn MessageChannel>,
        execution_id: ExecutionId,
        topics: ExecutionTopics,
    ) -> Self {
        Self {
            channel,
            execution_id,
            topics,
        }
    }

    pub fn execution_id(&self) -> &ExecutionId {
        &self.execution_id
    }

    pub async fn status(&self, status: ExecutionStatus) {
        self.send(&self.topics.status, status.as_str().as_bytes().to_vec())
            .await;
    }

    pub async fn log(&self, chunk: &[u8]) {
        self.send(&self.topics.log, chunk.to_vec()).await;
    }

    pub async fn error(&self, chunk: &[u8]) {
        self.send(&self.topics.error, chunk.to_vec()).await;
    }

    /// Sink that routes stdout chunks to the log topic.
    pub fn stdout(&self) -> LogSink<'_> {
        LogSink(self)
    }

    /// Sink that routes stderr chunks to the error topic.
    pub fn stderr(&self) -> ErrorSink<'_> {
        ErrorSink(self)
    }

    async fn send(&self, topic: &str, payload: Vec<u8>) {
        if let Err(e) = self.channel.publish(topic, payload).await {
            tracing::warn!(
                execution_id = %self.execution_id,
                topic,
                error = %e,
                "Failed to publish execution message"
            );
        }
    }
}

pub struct LogSink<'a>(&'a Reporter);

#[async_trait]
impl<'a> OutputSink for LogSink<'a> {
    async fn write(&self, chunk: &[u8]) {
        self.0.log(chunk).await;
    }
}

pub struct ErrorSink<'a>(&'a Reporter);

#[async_trait]
impl<'a> OutputSink for ErrorSink<'a> {
    async fn write(&self, chunk: &[u8]) {
        self.0.error(chunk).await;
    }
}
