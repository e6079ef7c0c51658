use crate::replication::backbone::{Backbone, BackboneMessage};
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Deserialize;
use tracing::{debug, info};

/// NATS configuration
#[derive(Clone, Debug, Deserialize)]
pub struct NatsConfig {
    /// Run without a backbone (single-instance delivery only) when false
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default = "default_url")]
    pub url: String,
    /// Root of every subject this service publishes or subscribes to
    #[serde(default = "default_subject_prefix")]
    pub subject_prefix: String,
    /// Outbound replication messages buffered before new ones are dropped
    #[serde(default = "default_publish_queue")]
    pub publish_queue: usize,
}

fn default_enabled() -> bool {
    true
}

fn default_url() -> String {
    std::env::var("NATS_URL").unwrap_or_else(|_| "nats://localhost:4222".to_string())
}

fn default_subject_prefix() -> String {
    "fleetcast".to_string()
}

fn default_publish_queue() -> usize {
    1024
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            url: default_url(),
            subject_prefix: default_subject_prefix(),
            publish_queue: default_publish_queue(),
        }
    }
}

/// Backbone over core NATS pub/sub (no JetStream; updates are ephemeral)
pub struct NatsBackbone {
    client: async_nats::Client,
}

impl NatsBackbone {
    /// Connect to the NATS server named in `config`
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        info!("Connecting to NATS at {}", config.url);

        let client = async_nats::connect(&config.url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS");
        Ok(Self { client })
    }
}

impl Backbone for NatsBackbone {
    fn publish(&self, subject: String, payload: Vec<u8>) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            debug!(subject = %subject, bytes = payload.len(), "Publishing to NATS");
            self.client
                .publish(subject.clone(), payload.into())
                .await
                .with_context(|| format!("Failed to publish to subject '{}'", subject))?;
            Ok(())
        })
    }

    fn subscribe(
        &self,
        pattern: String,
    ) -> BoxFuture<'_, Result<BoxStream<'static, BackboneMessage>>> {
        Box::pin(async move {
            let subscriber = self
                .client
                .subscribe(pattern.clone())
                .await
                .with_context(|| format!("Failed to subscribe to '{}'", pattern))?;

            info!(pattern = %pattern, "Subscribed to NATS subject");

            let stream = subscriber
                .map(|msg| BackboneMessage {
                    subject: msg.subject.to_string(),
                    payload: msg.payload.to_vec(),
                })
                .boxed();
            Ok(stream)
        })
    }
}
