use super::NotificationSink;
use crate::config::MqttConfig;
use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::JoinRequest;
use async_trait::async_trait;
use rumqttc::{AsyncClient, Event, EventLoop, MqttOptions, Outgoing, Packet, QoS};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

const REQUEST_CAPACITY: usize = 64;

/// Matches broker acknowledgements to the publishes waiting on them.
///
/// The event loop sends publishes in the order they were queued, so the n-th
/// outgoing publish belongs to the n-th queued one. Packet ids seen again are
/// retransmissions after a reconnect.
#[derive(Default)]
struct AckTracker {
    queued: u64,
    sent: u64,
    waiters: HashMap<u64, oneshot::Sender<()>>,
    in_flight: HashMap<u16, u64>,
}

impl AckTracker {
    fn expect_publish(&mut self) -> (u64, oneshot::Receiver<()>) {
        let (tx, rx) = oneshot::channel();
        let sequence = self.queued;
        self.queued += 1;
        self.waiters.insert(sequence, tx);
        (sequence, rx)
    }

    fn forget(&mut self, sequence: u64) {
        self.waiters.remove(&sequence);
    }

    fn observe(&mut self, event: &Event) {
        match event {
            Event::Outgoing(Outgoing::Publish(pkid)) => {
                if !self.in_flight.contains_key(pkid) {
                    self.in_flight.insert(*pkid, self.sent);
                    self.sent += 1;
                }
            }
            Event::Incoming(Packet::PubAck(ack)) => {
                let waiter = self
                    .in_flight
                    .remove(&ack.pkid)
                    .and_then(|sequence| self.waiters.remove(&sequence));
                if let Some(waiter) = waiter {
                    let _ = waiter.send(());
                }
            }
            _ => {}
        }
    }
}

/// Publishes request payloads as JSON to two MQTT topics.
///
/// A publish succeeds only once the broker has acknowledged it (QoS 1) within
/// the configured ack timeout.
#[derive(Clone)]
pub struct MqttNotificationSink {
    client: AsyncClient,
    acks: Arc<Mutex<AckTracker>>,
    ack_timeout: Duration,
    success_topic: String,
    error_topic: String,
}

impl MqttNotificationSink {
    /// The returned event loop must be driven (see [`Self::spawn_event_loop`])
    /// for anything to reach the broker.
    pub fn new(config: &MqttConfig) -> (Self, EventLoop) {
        let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
        options.set_keep_alive(Duration::from_secs(30));
        let (client, event_loop) = AsyncClient::new(options, REQUEST_CAPACITY);

        (
            Self {
                client,
                acks: Arc::default(),
                ack_timeout: config.ack_timeout,
                success_topic: config.success_topic.clone(),
                error_topic: config.error_topic.clone(),
            },
            event_loop,
        )
    }

    /// Drive the MQTT connection, reconnecting after errors, until a disconnect
    /// has been sent.
    pub fn spawn_event_loop(&self, mut event_loop: EventLoop) -> JoinHandle<()> {
        let acks = self.acks.clone();
        tokio::spawn(async move {
            loop {
                match event_loop.poll().await {
                    Ok(Event::Outgoing(Outgoing::Disconnect)) => {
                        debug!("MQTT disconnect sent");
                        break;
                    }
                    Ok(event) => {
                        debug!(?event, "MQTT event");
                        if let Ok(mut acks) = acks.lock() {
                            acks.observe(&event);
                        }
                    }
                    Err(error) => {
                        warn!(error = %error, "MQTT connection error; retrying");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
        })
    }

    /// Disconnect once everything queued before has been sent, waiting at most
    /// one ack timeout for the event loop to get there.
    pub async fn shutdown(&self, mut event_loop: JoinHandle<()>) {
        if let Err(error) = self.client.try_disconnect() {
            warn!(error = %error, "Failed to queue MQTT disconnect");
        }
        match tokio::time::timeout(self.ack_timeout, &mut event_loop).await {
            Ok(_) => info!("MQTT connection closed"),
            Err(_) => {
                warn!(timeout = ?self.ack_timeout, "MQTT connection did not close in time; dropping it");
                event_loop.abort();
            }
        }
    }

    async fn send(&self, topic: &str, request: &JoinRequest) -> DaemonResult<()> {
        let payload = request.to_json()?;

        let (sequence, acked) = {
            let mut acks = self.acks.lock().map_err(|_| {
                DaemonError::StorageError("Lock poisoned".to_string())
            })?;
            self.client
                .try_publish(topic, QoS::AtLeastOnce, false, payload)
                .map_err(|e| {
                    DaemonError::Notification(format!("failed to publish to {topic}: {e}"))
                })?;
            acks.expect_publish()
        };

        match tokio::time::timeout(self.ack_timeout, acked).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(DaemonError::Notification(format!(
                "publish to {topic} was abandoned before the broker acknowledged it"
            ))),
            Err(_) => {
                if let Ok(mut acks) = self.acks.lock() {
                    acks.forget(sequence);
                }
                Err(DaemonError::Notification(format!(
                    "broker did not acknowledge publish to {topic} within {:?}",
                    self.ack_timeout
                )))
            }
        }
    }
}

#[async_trait]
impl NotificationSink for MqttNotificationSink {
    async fn publish(&self, request: &JoinRequest) -> DaemonResult<()> {
        self.send(&self.success_topic, request).await
    }

    async fn publish_error(&self, request: &JoinRequest) -> DaemonResult<()> {
        self.send(&self.error_topic, request).await
    }
}
