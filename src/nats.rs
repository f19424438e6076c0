// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS client abstraction for publishing run events

use async_nats::{Client, ConnectOptions, Subscriber};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

use crate::errors::{ProvisioningError, ProvisioningResult};
use crate::events::{EventSink, ProvisioningEvent};

/// Configuration for NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Request timeout
    pub request_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-private-network".to_string(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl NatsConfig {
    /// Config for a comma separated server list, as found in `NATS_URL`
    pub fn from_url(url: &str) -> Self {
        Self {
            servers: url
                .split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from)
                .collect(),
            ..Self::default()
        }
    }
}

/// NATS client wrapper
#[derive(Clone)]
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Create a new NATS client with the given configuration
    pub async fn new(config: NatsConfig) -> ProvisioningResult<Self> {
        let connect_options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout)
            .request_timeout(Some(config.request_timeout));

        let client = async_nats::connect_with_options(config.servers.join(","), connect_options)
            .await
            .map_err(|e| ProvisioningError::Messaging(format!("connect: {}", e)))?;

        info!("Connected to NATS at {:?}", config.servers);

        Ok(Self { client })
    }

    /// Publish a message to a subject
    pub async fn publish<T>(&self, subject: &str, message: &T) -> ProvisioningResult<()>
    where
        T: Serialize,
    {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| ProvisioningError::Messaging(format!("publish to {}: {}", subject, e)))?;

        debug!("Published message to subject: {}", subject);
        Ok(())
    }

    /// Subscribe to a subject
    pub async fn subscribe(&self, subject: &str) -> ProvisioningResult<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.to_string())
            .await
            .map_err(|e| ProvisioningError::Messaging(format!("subscribe to {}: {}", subject, e)))?;

        info!("Subscribed to subject: {}", subject);
        Ok(subscriber)
    }

    /// Flush buffered publishes
    pub async fn flush(&self) -> ProvisioningResult<()> {
        self.client
            .flush()
            .await
            .map_err(|e| ProvisioningError::Messaging(format!("flush: {}", e)))
    }

    /// Get the underlying NATS client for advanced operations
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

/// Publishes run events on `provisioning.{unit_kind}.{operation}`
#[derive(Clone)]
pub struct NatsEventSink {
    client: NatsClient,
}

impl NatsEventSink {
    pub fn new(client: NatsClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn emit(&self, event: &ProvisioningEvent) -> ProvisioningResult<()> {
        self.client.publish(&event.subject(), event).await
    }
}

/// Decode a run event received from a subscription
pub fn decode_event(payload: &[u8]) -> ProvisioningResult<ProvisioningEvent> {
    Ok(serde_json::from_slice(payload)?)
}

/// Wire form helper for consumers that only need the envelope header
#[derive(Debug, Clone, Deserialize)]
pub struct EventHeader {
    pub event_id: uuid::Uuid,
    pub run_id: uuid::Uuid,
    #[serde(rename = "type")]
    pub event_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ProvisioningEventKind;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_from_url() {
        let config = NatsConfig::from_url("nats://a:4222, nats://b:4222,");
        assert_eq!(config.servers, vec!["nats://a:4222", "nats://b:4222"]);
        assert_eq!(config.name, "cim-private-network");
    }

    #[test]
    fn test_decode_event_and_header() {
        let event = ProvisioningEvent::new(
            uuid::Uuid::now_v7(),
            ProvisioningEventKind::RunStarted {
                units: vec!["network".into()],
            },
        );
        let payload = serde_json::to_vec(&event).unwrap();

        assert_eq!(decode_event(&payload).unwrap(), event);
        let header: EventHeader = serde_json::from_slice(&payload).unwrap();
        assert_eq!(header.event_type, "run_started");
        assert_eq!(header.run_id, event.run_id);
    }

    #[test]
    fn test_decode_garbage() {
        let err = decode_event(b"not json").unwrap_err();
        assert_eq!(err.category(), "serialization");
    }
}
