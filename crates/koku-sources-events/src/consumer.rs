//! Kafka consumer for the source event stream.
//!
//! Offsets are committed manually after the [`EventHandler`] accepts each
//! message, so a restart resumes from the last committed offset. Broker
//! connection loss and handler failures are handled by rebuilding the
//! consumer after a fixed delay, which redelivers uncommitted messages.

use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use rdkafka::types::RDKafkaErrorCode;
use rdkafka::{Offset, TopicPartitionList};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::classifier::EventClassifier;
use crate::config::KafkaConfig;
use crate::error::{EventError, EventResult};
use crate::handler::{dispatch, EventHandler};
use crate::health::HealthStatus;
use crate::message::RawMessage;

const METADATA_TIMEOUT: Duration = Duration::from_secs(5);

/// Consumer of the sources topic with automatic reconnect.
pub struct SourcesConsumer {
    config: KafkaConfig,
    classifier: EventClassifier,
    retry_delay: Duration,
}

impl SourcesConsumer {
    /// Create a consumer. No connection is made until [`run`](Self::run).
    pub fn new(config: KafkaConfig, classifier: EventClassifier, retry_delay: Duration) -> Self {
        Self {
            config,
            classifier,
            retry_delay,
        }
    }

    fn create_consumer(&self) -> EventResult<StreamConsumer> {
        let mut client_config = ClientConfig::new();

        client_config
            .set("bootstrap.servers", &self.config.bootstrap_servers)
            .set("client.id", &self.config.client_id)
            .set("group.id", &self.config.consumer_group)
            .set("security.protocol", self.config.security_protocol.as_str())
            .set("auto.offset.reset", "earliest")
            .set("enable.auto.commit", "false")
            .set("session.timeout.ms", "30000");

        if let Some(sasl) = &self.config.sasl {
            client_config
                .set("sasl.mechanism", sasl.mechanism.as_str())
                .set("sasl.username", &sasl.username)
                .set("sasl.password", &sasl.password);
        }

        client_config
            .create()
            .map_err(|e| self.connection_failed(&e))
    }

    fn connection_failed(&self, e: &KafkaError) -> EventError {
        EventError::ConnectionFailed {
            broker: self.config.bootstrap_servers.clone(),
            cause: e.to_string(),
        }
    }

    /// Check broker connectivity by fetching topic metadata.
    pub fn health_check(&self, consumer: &StreamConsumer) -> EventResult<HealthStatus> {
        let metadata = consumer
            .fetch_metadata(Some(&self.config.topic), METADATA_TIMEOUT)
            .map_err(|e| self.connection_failed(&e))?;

        Ok(HealthStatus {
            connected: true,
            brokers: metadata.brokers().len(),
            topic_present: metadata
                .topics()
                .iter()
                .any(|t| t.name() == self.config.topic && t.error().is_none()),
        })
    }

    fn connect_once(&self) -> EventResult<StreamConsumer> {
        let consumer = self.create_consumer()?;

        let health = self.health_check(&consumer)?;
        if !health.is_healthy() {
            return Err(EventError::ConnectionFailed {
                broker: self.config.bootstrap_servers.clone(),
                cause: "no brokers available".to_string(),
            });
        }

        consumer
            .subscribe(&[self.config.topic.as_str()])
            .map_err(|e| EventError::ConsumeFailed {
                topic: self.config.topic.clone(),
                cause: e.to_string(),
            })?;

        info!(
            topic = %self.config.topic,
            consumer_group = %self.config.consumer_group,
            brokers = health.brokers,
            "Subscribed to topic"
        );
        Ok(consumer)
    }

    /// Connect, retrying with a fixed delay. Returns `None` on shutdown.
    async fn connect(&self, shutdown: &CancellationToken) -> Option<StreamConsumer> {
        loop {
            match self.connect_once() {
                Ok(consumer) => return Some(consumer),
                Err(e) => error!(error = %e, "Kafka connection failure. Reconnecting..."),
            }

            tokio::select! {
                () = shutdown.cancelled() => return None,
                () = tokio::time::sleep(self.retry_delay) => {}
            }
        }
    }

    /// Consume until shutdown, handing accepted events to `handler`.
    #[instrument(skip_all, fields(topic = %self.config.topic, consumer_group = %self.config.consumer_group))]
    pub async fn run<H>(self, handler: Arc<H>, shutdown: CancellationToken) -> EventResult<()>
    where
        H: EventHandler + ?Sized,
    {
        info!("Listener started. Waiting for messages...");

        while let Some(consumer) = self.connect(&shutdown).await {
            match self.consume(&consumer, handler.as_ref(), &shutdown).await {
                Ok(()) => break,
                Err(_) if shutdown.is_cancelled() => break,
                Err(e) if e.is_transient() => {
                    warn!(error = %e, "Consumption interrupted. Reconnecting...");
                    drop(consumer);
                    tokio::select! {
                        () = shutdown.cancelled() => break,
                        () = tokio::time::sleep(self.retry_delay) => {}
                    }
                }
                Err(e) => {
                    error!(error = %e, "Consumer stopped");
                    return Err(e);
                }
            }
        }

        info!("Consumer loop ended");
        Ok(())
    }

    async fn consume<H>(
        &self,
        consumer: &StreamConsumer,
        handler: &H,
        shutdown: &CancellationToken,
    ) -> EventResult<()>
    where
        H: EventHandler + ?Sized,
    {
        let mut stream = consumer.stream();

        loop {
            let next = tokio::select! {
                () = shutdown.cancelled() => return Ok(()),
                next = stream.next() => next,
            };

            match next {
                Some(Ok(message)) => {
                    let raw = RawMessage::from_kafka(&message);
                    dispatch(&self.classifier, handler, &raw).await?;
                    if let Err(e) = commit_offset(consumer, &message) {
                        warn!(error = %e, "Offset commit failed");
                    }
                }
                Some(Err(e)) if is_connection_loss(&e) => {
                    return Err(EventError::ConsumeFailed {
                        topic: self.config.topic.clone(),
                        cause: e.to_string(),
                    });
                }
                Some(Err(e)) => error!(error = %e, "Error receiving message"),
                None => {
                    return Err(EventError::ConsumeFailed {
                        topic: self.config.topic.clone(),
                        cause: "message stream ended".to_string(),
                    });
                }
            }
        }
    }
}

fn is_connection_loss(e: &KafkaError) -> bool {
    matches!(
        e.rdkafka_error_code(),
        Some(RDKafkaErrorCode::AllBrokersDown | RDKafkaErrorCode::BrokerTransportFailure)
    )
}

fn commit_offset(consumer: &StreamConsumer, message: &BorrowedMessage<'_>) -> EventResult<()> {
    let commit_failed = |e: KafkaError| EventError::CommitFailed {
        topic: message.topic().to_string(),
        offset: message.offset(),
        cause: e.to_string(),
    };

    let mut tpl = TopicPartitionList::new();
    tpl.add_partition_offset(
        message.topic(),
        message.partition(),
        Offset::Offset(message.offset() + 1),
    )
    .map_err(commit_failed)?;

    consumer
        .commit(&tpl, CommitMode::Async)
        .map_err(commit_failed)?;

    debug!(offset = message.offset(), "Committed offset");
    Ok(())
}
