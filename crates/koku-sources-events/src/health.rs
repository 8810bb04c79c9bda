//! Broker connectivity status.

use serde::{Deserialize, Serialize};

/// Health status of the Kafka connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    /// Whether metadata could be fetched.
    pub connected: bool,
    /// Number of brokers discovered.
    pub brokers: usize,
    /// Whether the subscribed topic exists on the cluster.
    pub topic_present: bool,
}

impl HealthStatus {
    /// Check if the connection is usable for consumption.
    #[must_use]
    pub fn is_healthy(&self) -> bool {
        self.connected && self.brokers > 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_healthy() {
        let status = HealthStatus {
            connected: true,
            brokers: 3,
            topic_present: true,
        };
        assert!(status.is_healthy());
    }

    #[test]
    fn test_missing_topic_is_still_healthy() {
        // The topic can be auto-created on first subscribe.
        let status = HealthStatus {
            connected: true,
            brokers: 1,
            topic_present: false,
        };
        assert!(status.is_healthy());
    }

    #[test]
    fn test_health_status_no_brokers() {
        let status = HealthStatus {
            connected: true,
            brokers: 0,
            topic_present: false,
        };
        assert!(!status.is_healthy());
    }
}
