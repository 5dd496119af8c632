//! Per-project websocket fan-out, generalizing the teacher's single global
//! `broadcast::Sender<Arc<String>>` (`state.rs::AppState::broadcast`) into a
//! registry keyed by project id — one channel per project instead of one
//! for the whole process.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use tokio::sync::broadcast;

const CHANNEL_CAPACITY: usize = 1024;

#[derive(Serialize)]
#[serde(tag = "type")]
pub enum HubMessage {
    #[serde(rename = "drift.alert")]
    DriftAlert { data: serde_json::Value },
    #[serde(rename = "drift.resolved")]
    DriftResolved { data: serde_json::Value },
    #[serde(rename = "replay.status")]
    ReplayStatus { data: serde_json::Value },
}

pub struct Hub {
    channels: DashMap<String, broadcast::Sender<Arc<String>>>,
}

impl Hub {
    pub fn new() -> Self {
        Hub {
            channels: DashMap::new(),
        }
    }

    /// Registers interest in a project's channel, creating it if this is the
    /// first subscriber, and returns a receiver for the caller's websocket
    /// loop to poll.
    pub fn subscribe(&self, project_id: &str) -> broadcast::Receiver<Arc<String>> {
        self.channels
            .entry(project_id.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live subscribers currently registered for a project —
    /// tokio's broadcast channel tracks this natively via `receiver_count`.
    pub fn connection_count(&self, project_id: &str) -> usize {
        self.channels
            .get(project_id)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }

    pub fn broadcast(&self, project_id: &str, message: &HubMessage) {
        let Ok(json) = serde_json::to_string(message) else {
            return;
        };
        if let Some(tx) = self.channels.get(project_id) {
            // `send` only errors when there are zero receivers — a harmless
            // race with a client that disconnected between `subscribe` and
            // now, so there's nothing to prune here unlike per-connection
            // fan-out; tokio's broadcast drops lagging/dead receivers itself.
            let _ = tx.send(Arc::new(json));
        }
    }
}

impl Default for Hub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn broadcast_reaches_all_subscribers_of_a_project() {
        let hub = Hub::new();
        let mut a = hub.subscribe("p1");
        let mut b = hub.subscribe("p1");
        let mut other = hub.subscribe("p2");

        hub.broadcast(
            "p1",
            &HubMessage::DriftAlert {
                data: serde_json::json!({"alert_id": "a1"}),
            },
        );

        let msg_a = a.recv().await.unwrap();
        let msg_b = b.recv().await.unwrap();
        assert_eq!(msg_a, msg_b);
        assert!(msg_a.contains("drift.alert") || msg_a.contains("drift_alert"));
        assert!(other.try_recv().is_err());
    }

    #[test]
    fn connection_count_reflects_subscribers() {
        let hub = Hub::new();
        assert_eq!(hub.connection_count("p1"), 0);
        let _a = hub.subscribe("p1");
        let _b = hub.subscribe("p1");
        assert_eq!(hub.connection_count("p1"), 2);
    }
}
