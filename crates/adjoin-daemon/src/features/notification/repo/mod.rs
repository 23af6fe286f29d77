pub mod mqtt;

use crate::shared::error::{DaemonError, DaemonResult};
use crate::shared::types::JoinRequest;
use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, RwLock};

/// Outbound notifications. Both channels carry the request payload unchanged.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Success/forward channel
    async fn publish(&self, request: &JoinRequest) -> DaemonResult<()>;

    /// Error/cleanup channel
    async fn publish_error(&self, request: &JoinRequest) -> DaemonResult<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationChannel {
    Success,
    Error,
}

#[derive(Debug, Clone)]
pub struct PublishedNotification {
    pub channel: NotificationChannel,
    pub payload: Value,
}

/// In-memory sink used by tests and dry runs.
#[derive(Clone, Default)]
pub struct InMemoryNotificationSink {
    published: Arc<RwLock<Vec<PublishedNotification>>>,
}

impl InMemoryNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn published(&self) -> Vec<PublishedNotification> {
        self.published.read().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn payloads(&self, channel: NotificationChannel) -> Vec<Value> {
        self.published()
            .into_iter()
            .filter(|notification| notification.channel == channel)
            .map(|notification| notification.payload)
            .collect()
    }

    pub fn success_count(&self) -> usize {
        self.payloads(NotificationChannel::Success).len()
    }

    pub fn error_count(&self) -> usize {
        self.payloads(NotificationChannel::Error).len()
    }

    fn record(&self, channel: NotificationChannel, request: &JoinRequest) -> DaemonResult<()> {
        let mut published = self.published.write().map_err(|_| {
            DaemonError::StorageError("Lock poisoned".to_string())
        })?;
        published.push(PublishedNotification {
            channel,
            payload: request.to_value(),
        });
        Ok(())
    }
}

#[async_trait]
impl NotificationSink for InMemoryNotificationSink {
    async fn publish(&self, request: &JoinRequest) -> DaemonResult<()> {
        self.record(NotificationChannel::Success, request)
    }

    async fn publish_error(&self, request: &JoinRequest) -> DaemonResult<()> {
        self.record(NotificationChannel::Error, request)
    }
}
