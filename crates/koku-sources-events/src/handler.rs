//! Hand-off from the consumer loop to event processing.

use async_trait::async_trait;
use tracing::info;

use crate::classifier::{ClassifiedEvent, EventClassifier};
use crate::error::{EventError, EventResult};
use crate::message::RawMessage;

/// Receives classified events from the consumer loop.
///
/// Implementations should return quickly; the consumer does not read the
/// next message until `handle` returns.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Accept an event for processing.
    ///
    /// Returning an error leaves the offset uncommitted; the consumer
    /// reconnects and the message is delivered again.
    async fn handle(&self, event: ClassifiedEvent)
        -> Result<(), Box<dyn std::error::Error + Send + Sync>>;
}

/// Classify a message and pass it to the handler.
///
/// Returns true if the message was accepted, false if it was ignored.
/// Either way the offset may be committed afterwards.
pub async fn dispatch<H>(
    classifier: &EventClassifier,
    handler: &H,
    message: &RawMessage,
) -> EventResult<bool>
where
    H: EventHandler + ?Sized,
{
    let Some(event) = classifier.classify(message) else {
        return Ok(false);
    };

    info!(
        offset = event.offset,
        event_type = %event.event_type,
        subject = ?event.subject,
        "Cost management message to process"
    );

    handler
        .handle(event)
        .await
        .map_err(|e| EventError::HandlerFailed {
            offset: message.offset,
            cause: e.to_string(),
        })?;

    Ok(true)
}
