use std::sync::Arc;
use std::time::Duration;

use rumqttc::{
    AsyncClient, ConnectionError, Event, EventLoop, LastWill, MqttOptions, Outgoing, Packet,
    QoS, Transport,
};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::channel::MqttChannel;
use crate::config::{BrokerAddr, WorkerConfig, TOPIC_NAMESPACE};
use crate::error::Result;
use crate::execution::{Orchestrator, Topics};
use crate::script::ScriptResolver;
use crate::worker::ScriptExecutor;

/// Delay before retrying after a connection failure.
const RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Bound on the client request queue shared by all executions.
const REQUEST_CAPACITY: usize = 64;

/// How long to wait for the DISCONNECT packet to go out on shutdown.
const DISCONNECT_GRACE: Duration = Duration::from_secs(5);

/// A worker attached to the message bus.
///
/// Owns the MQTT event loop and turns every message on
/// `<ns>/<id>/run/start` into an independent execution task.
pub struct WorkerNode {
    config: WorkerConfig,
    topics: Topics,
}

impl WorkerNode {
    pub fn new(config: WorkerConfig) -> Self {
        let topics = Topics::new(TOPIC_NAMESPACE, &config.identifier);
        Self { config, topics }
    }

    pub fn topics(&self) -> &Topics {
        &self.topics
    }

    /// Run the worker until `shutdown` is cancelled.
    ///
    /// 1. Connects to the first broker, rotating through the list on failure
    /// 2. On every (re)connect publishes availability and subscribes to run requests
    /// 3. Spawns one task per run request; executions run concurrently and
    ///    unbounded
    /// 4. On shutdown goes offline, waits for in-flight executions, then
    ///    disconnects
    ///
    /// # Errors
    ///
    /// Returns an error only for invalid configuration. Connection failures
    /// are logged and retried forever.
    pub async fn run(self, shutdown: CancellationToken) -> Result<()> {
        self.config.validate()?;

        let mut broker_index = 0;
        let (client, mut eventloop) =
            AsyncClient::new(self.mqtt_options(&self.config.brokers[0]), REQUEST_CAPACITY);

        let resolver = ScriptResolver::new(&self.config.script_dir, self.config.fetch_timeout)?;
        let orchestrator = Arc::new(Orchestrator::new(
            Arc::new(MqttChannel::new(client.clone())),
            self.topics.clone(),
            resolver,
            ScriptExecutor::new(),
        ));
        let executions = TaskTracker::new();
        let run_start = self.topics.run_start();

        tracing::info!(
            identifier = %self.config.identifier,
            broker = %self.config.brokers[0],
            "Attempting to connect to MQTT broker"
        );

        loop {
            let event = tokio::select! {
                _ = shutdown.cancelled() => None,
                event = eventloop.poll() => Some(event),
            };

            let Some(event) = event else {
                self.shutdown(&client, &mut eventloop, &executions).await;
                return Ok(());
            };

            match event {
                Ok(Event::Incoming(Packet::ConnAck(_))) => {
                    tracing::info!(broker = %self.config.brokers[broker_index], "Connected to MQTT broker");
                    self.announce(&client);
                }
                Ok(Event::Incoming(Packet::Publish(publish))) => {
                    if publish.topic != run_start {
                        tracing::debug!(topic = %publish.topic, "Ignoring message on unexpected topic");
                        continue;
                    }
                    let orchestrator = orchestrator.clone();
                    executions.spawn(async move {
                        orchestrator.handle(&publish.payload).await;
                    });
                }
                Ok(_) => {}
                Err(e) => {
                    log_connection_error(&e);

                    tokio::select! {
                        _ = shutdown.cancelled() => {
                            self.shutdown(&client, &mut eventloop, &executions).await;
                            return Ok(());
                        }
                        _ = tokio::time::sleep(RECONNECT_DELAY) => {}
                    }

                    broker_index = (broker_index + 1) % self.config.brokers.len();
                    let broker = &self.config.brokers[broker_index];
                    eventloop.mqtt_options = self.mqtt_options(broker);
                    tracing::info!(broker = %broker, "Attempting to connect to MQTT broker");
                }
            }
        }
    }

    fn mqtt_options(&self, broker: &BrokerAddr) -> MqttOptions {
        let mut options = MqttOptions::new(self.config.client_id(), &broker.host, broker.port);
        options
            .set_keep_alive(self.config.keep_alive)
            .set_clean_session(true)
            .set_last_will(LastWill::new(
                self.topics.available(),
                "false",
                QoS::AtMostOnce,
                false,
            ));
        if broker.tls {
            options.set_transport(Transport::tls_with_default_config());
        }
        options
    }

    /// Called on every ConnAck. The session is clean, so the subscription
    /// has to be renewed each time.
    fn announce(&self, client: &AsyncClient) {
        if let Err(e) = client.try_publish(self.topics.available(), QoS::AtMostOnce, false, "true")
        {
            tracing::warn!(error = %e, "Failed to publish availability");
        }
        if let Err(e) = client.try_subscribe(self.topics.run_start(), QoS::AtMostOnce) {
            tracing::error!(error = %e, "Failed to subscribe to run requests");
        } else {
            tracing::info!(topic = %self.topics.run_start(), "Listening for run requests");
        }
    }

    /// Go offline, let running executions finish, then disconnect.
    ///
    /// The event loop keeps being polled while executions drain so their
    /// output still reaches the broker. New run requests are dropped.
    async fn shutdown(
        &self,
        client: &AsyncClient,
        eventloop: &mut EventLoop,
        executions: &TaskTracker,
    ) {
        tracing::info!(in_flight = executions.len(), "Shutting down worker");

        if let Err(e) = client.try_publish(self.topics.available(), QoS::AtMostOnce, false, "false")
        {
            tracing::warn!(error = %e, "Failed to publish unavailability");
        }
        if let Err(e) = client.try_unsubscribe(self.topics.run_start()) {
            tracing::warn!(error = %e, "Failed to unsubscribe from run requests");
        }

        executions.close();
        loop {
            tokio::select! {
                biased;
                _ = executions.wait() => break,
                event = eventloop.poll() => match event {
                    Ok(Event::Incoming(Packet::Publish(publish))) => {
                        tracing::warn!(topic = %publish.topic, "Dropping run request received during shutdown");
                    }
                    Ok(_) => {}
                    Err(e) => {
                        log_connection_error(&e);
                        tokio::time::sleep(RECONNECT_DELAY).await;
                    }
                },
            }
        }

        if let Err(e) = client.try_disconnect() {
            tracing::warn!(error = %e, "Failed to request disconnect");
            return;
        }

        let drain = async {
            loop {
                match eventloop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) | Err(_) => break,
                    Ok(_) => {}
                }
            }
        };
        if tokio::time::timeout(DISCONNECT_GRACE, drain).await.is_err() {
            tracing::warn!("Timed out waiting for broker disconnect");
        }

        tracing::info!("Worker stopped");
    }
}

fn log_connection_error(e: &ConnectionError) {
    tracing::warn!(error = %e, "Connection failed");
}
