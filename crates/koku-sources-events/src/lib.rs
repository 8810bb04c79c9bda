//! # koku-sources-events
//!
//! Consumes the source registry event stream and turns its messages into
//! typed events for the synchronization engine.
//!
//! ## Cargo Features
//!
//! - `kafka`: Enable the Kafka consumer (requires librdkafka)
//!
//! ## Example
//!
//! ```rust,ignore
//! use koku_sources_events::{EventClassifier, KafkaConfig, SourcesConsumer};
//!
//! let config = KafkaConfig::from_env()?;
//! let classifier = EventClassifier::new(&config.topic, app_type_id);
//! let consumer = SourcesConsumer::new(config, classifier, Duration::from_secs(10));
//! consumer.run(handler, shutdown).await?;
//! ```

pub mod classifier;
pub mod config;
pub mod error;
pub mod handler;
pub mod health;
pub mod message;

#[cfg(feature = "kafka")]
pub mod consumer;

pub use classifier::{
    ClassifiedEvent, EventClassifier, EventSubject, EventType, HDR_EVENT_TYPE, HDR_RH_IDENTITY,
};
pub use config::{KafkaConfig, KafkaConfigBuilder, SaslMechanism, SecurityProtocol};
pub use error::{EventError, EventResult};
pub use handler::{dispatch, EventHandler};
pub use health::HealthStatus;
pub use message::RawMessage;

#[cfg(feature = "kafka")]
pub use consumer::SourcesConsumer;
