//! Broker message as seen by the classifier.

/// A message consumed from the broker, detached from the client library.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    /// Topic the message was read from.
    pub topic: String,
    /// Header key/value pairs in broker order.
    pub headers: Vec<(String, Vec<u8>)>,
    /// Raw payload bytes; empty when the message had none.
    pub payload: Vec<u8>,
    /// Partition offset.
    pub offset: i64,
}

impl RawMessage {
    /// Create a message with no headers.
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>, offset: i64) -> Self {
        Self {
            topic: topic.into(),
            headers: Vec::new(),
            payload: payload.into(),
            offset,
        }
    }

    /// Append a header.
    #[must_use]
    pub fn with_header(mut self, key: impl Into<String>, value: impl Into<Vec<u8>>) -> Self {
        self.headers.push((key.into(), value.into()));
        self
    }

    /// First header value with the given key.
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&[u8]> {
        self.headers
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_slice())
    }

    /// First header value with the given key, if it is valid UTF-8.
    #[must_use]
    pub fn header_str(&self, key: &str) -> Option<&str> {
        self.header(key).and_then(|v| std::str::from_utf8(v).ok())
    }

    /// Copy a consumed Kafka message.
    #[cfg(feature = "kafka")]
    pub fn from_kafka<M: rdkafka::message::Message>(message: &M) -> Self {
        use rdkafka::message::Headers;

        let headers = message
            .headers()
            .map(|headers| {
                headers
                    .iter()
                    .map(|h| (h.key.to_string(), h.value.map(<[u8]>::to_vec).unwrap_or_default()))
                    .collect()
            })
            .unwrap_or_default();

        Self {
            topic: message.topic().to_string(),
            headers,
            payload: message.payload().map(<[u8]>::to_vec).unwrap_or_default(),
            offset: message.offset(),
        }
    }
}
