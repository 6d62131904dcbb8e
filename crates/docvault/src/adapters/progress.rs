use serde::Serialize;
use tokio::sync::broadcast;

use crate::models::DocumentStatus;

/// Update pushed to subscribers while a document is processed
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type")]
pub enum ProgressEvent {
    StatusChanged {
        document_id: String,
        status: DocumentStatus,
    },
    VersionCreated {
        document_id: String,
        version: i64,
    },
    Deleted {
        document_id: String,
    },
}

/// Broadcast channel for progress updates.
///
/// Sending never blocks and never fails the caller; events are dropped
/// when nobody listens.
#[derive(Clone)]
pub struct ProgressHub {
    tx: broadcast::Sender<ProgressEvent>,
}

impl ProgressHub {
    pub fn new() -> Self {
        let (tx, _) = broadcast::channel(100);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ProgressEvent> {
        self.tx.subscribe()
    }

    pub fn send(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}

impl Default for ProgressHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_without_subscribers_is_silent() {
        let hub = ProgressHub::new();
        hub.send(ProgressEvent::Deleted {
            document_id: "d1".into(),
        });
    }

    #[test]
    fn test_subscribers_see_events_in_order() {
        let hub = ProgressHub::new();
        let mut rx = hub.subscribe();

        hub.send(ProgressEvent::StatusChanged {
            document_id: "d1".into(),
            status: DocumentStatus::Ready,
        });
        hub.send(ProgressEvent::VersionCreated {
            document_id: "d1".into(),
            version: 2,
        });

        tokio_test::block_on(async {
            assert!(matches!(
                rx.recv().await.unwrap(),
                ProgressEvent::StatusChanged { .. }
            ));
            assert_eq!(
                rx.recv().await.unwrap(),
                ProgressEvent::VersionCreated {
                    document_id: "d1".into(),
                    version: 2
                }
            );
        });
    }

    #[test]
    fn test_event_json_shape() {
        let value = serde_json::to_value(ProgressEvent::StatusChanged {
            document_id: "d1".into(),
            status: DocumentStatus::Processing,
        })
        .unwrap();
        assert_eq!(value["type"], "StatusChanged");
        assert_eq!(value["status"], "processing");
    }
}
