//! Event classification.
//!
//! Turns a [`RawMessage`] from the sources topic into a [`ClassifiedEvent`],
//! or discards it. Classification never fails: malformed payloads are
//! logged and ignored.

use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{EventError, EventResult};
use crate::message::RawMessage;

/// Header carrying the registry event name.
pub const HDR_EVENT_TYPE: &str = "event_type";

/// Header carrying the caller identity.
pub const HDR_RH_IDENTITY: &str = "x-rh-identity";

/// Registry events the integration reacts to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ApplicationCreate,
    ApplicationDestroy,
    AuthenticationCreate,
    AuthenticationUpdate,
    SourceUpdate,
    SourceDestroy,
}

impl EventType {
    /// Parse the `event_type` header value.
    #[must_use]
    pub fn from_header(value: &str) -> Option<Self> {
        match value {
            "Application.create" => Some(Self::ApplicationCreate),
            "Application.destroy" => Some(Self::ApplicationDestroy),
            "Authentication.create" => Some(Self::AuthenticationCreate),
            "Authentication.update" => Some(Self::AuthenticationUpdate),
            "Source.update" => Some(Self::SourceUpdate),
            "Source.destroy" => Some(Self::SourceDestroy),
            _ => None,
        }
    }

    /// Header representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ApplicationCreate => "Application.create",
            Self::ApplicationDestroy => "Application.destroy",
            Self::AuthenticationCreate => "Authentication.create",
            Self::AuthenticationUpdate => "Authentication.update",
            Self::SourceUpdate => "Source.update",
            Self::SourceDestroy => "Source.destroy",
        }
    }

    /// Whether the event tears the source down.
    #[must_use]
    pub fn is_destroy(&self) -> bool {
        matches!(self, Self::ApplicationDestroy | Self::SourceDestroy)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a classified event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventSubject {
    /// A source registry source.
    Source(i64),
    /// A source registry endpoint; must be resolved to its source.
    Endpoint(i64),
}

/// A broker message accepted for processing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassifiedEvent {
    pub event_type: EventType,
    pub subject: EventSubject,
    pub auth_header: Option<String>,
    pub offset: i64,
}

/// Filters messages for one topic and one registered application type.
#[derive(Debug, Clone)]
pub struct EventClassifier {
    topic: String,
    application_type_id: i64,
}

impl EventClassifier {
    /// Create a classifier for the given topic and application type.
    pub fn new(topic: impl Into<String>, application_type_id: i64) -> Self {
        Self {
            topic: topic.into(),
            application_type_id,
        }
    }

    /// Topic this classifier accepts.
    #[must_use]
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Classify a message, returning `None` for anything not to be processed.
    #[must_use]
    pub fn classify(&self, message: &RawMessage) -> Option<ClassifiedEvent> {
        match self.try_classify(message) {
            Ok(event) => event,
            Err(e) => {
                warn!(offset = message.offset, error = %e, "Unable to load message");
                None
            }
        }
    }

    fn try_classify(&self, message: &RawMessage) -> EventResult<Option<ClassifiedEvent>> {
        if message.topic != self.topic {
            return Ok(None);
        }

        let Some(event_type) = message
            .header_str(HDR_EVENT_TYPE)
            .and_then(EventType::from_header)
        else {
            debug!(offset = message.offset, "Other message");
            return Ok(None);
        };

        let value: Value =
            serde_json::from_slice(&message.payload).map_err(|e| EventError::InvalidPayload {
                reason: e.to_string(),
            })?;

        let subject = match event_type {
            EventType::ApplicationCreate | EventType::ApplicationDestroy => {
                let app_type = parse_id(&value, "application_type_id")?;
                if app_type != self.application_type_id {
                    debug!(
                        offset = message.offset,
                        application_type_id = app_type,
                        "Application message for another application type"
                    );
                    return Ok(None);
                }
                EventSubject::Source(parse_id(&value, "source_id")?)
            }
            EventType::AuthenticationCreate | EventType::AuthenticationUpdate => {
                if value.get("resource_type").and_then(Value::as_str) != Some("Endpoint") {
                    debug!(offset = message.offset, "Authentication message for non-endpoint resource");
                    return Ok(None);
                }
                EventSubject::Endpoint(parse_id(&value, "resource_id")?)
            }
            EventType::SourceUpdate | EventType::SourceDestroy => {
                EventSubject::Source(parse_id(&value, "id")?)
            }
        };

        debug!(offset = message.offset, event_type = %event_type, ?subject, "Cost management message");

        Ok(Some(ClassifiedEvent {
            event_type,
            subject,
            auth_header: message.header_str(HDR_RH_IDENTITY).map(str::to_string),
            offset: message.offset,
        }))
    }
}

/// Read an identifier sent either as a JSON number or a numeric string.
fn parse_id(value: &Value, field: &str) -> EventResult<i64> {
    let parsed = match value.get(field) {
        Some(Value::Number(n)) => n.as_i64(),
        Some(Value::String(s)) => s.trim().parse().ok(),
        _ => None,
    };
    parsed.ok_or_else(|| EventError::InvalidPayload {
        reason: format!("missing or non-integer field `{field}`"),
    })
}
