//! Bridge between the document store and the event bus.
//!
//! The gateway seeds initial state with a read of both documents, forwards
//! every store snapshot onto the bus as a typed payload, and executes publish
//! commands as full-replace writes. Malformed documents are logged and
//! dropped; write failures are reported without retry, leaving optimistic
//! local state in place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, warn};
use tokio::sync::broadcast::{error::TryRecvError, Receiver, Sender};

use crate::protocol::{Message, PlaybackDocument, QueueDocument, SessionMessage, StoreMessage};
use crate::store::{DocKey, DocumentSnapshot, DocumentStore};

const FORWARDER_IDLE_SLEEP_MS: u64 = 15;

/// Connects one client session's bus to the shared document store.
pub struct StoreGateway {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    store: Arc<dyn DocumentStore>,
    watcher_stop: Arc<AtomicBool>,
}

impl StoreGateway {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            store,
            watcher_stop: Arc::new(AtomicBool::new(false)),
        }
    }

    fn decode_snapshot(bus_producer: &Sender<Message>, snapshot: DocumentSnapshot) {
        match snapshot.key {
            DocKey::PlaybackState => {
                match serde_json::from_value::<PlaybackDocument>(snapshot.document) {
                    Ok(document) => {
                        let _ = bus_producer
                            .send(Message::Store(StoreMessage::PlaybackSnapshot(document)));
                    }
                    Err(err) => {
                        warn!("StoreGateway: dropped malformed playback document: {}", err);
                    }
                }
            }
            DocKey::QueueState => match serde_json::from_value::<QueueDocument>(snapshot.document) {
                Ok(document) => {
                    let _ = bus_producer.send(Message::Store(StoreMessage::QueueSnapshot(document)));
                }
                Err(err) => {
                    warn!("StoreGateway: dropped malformed queue document: {}", err);
                }
            },
        }
    }

    fn seed_initial_state(&self) {
        for key in DocKey::ALL {
            match self.store.read(key) {
                Ok(Some(document)) => {
                    Self::decode_snapshot(&self.bus_producer, DocumentSnapshot { key, document });
                }
                Ok(None) => {
                    debug!("StoreGateway: no initial document for {}", key);
                }
                Err(err) => {
                    error!("StoreGateway: initial read failed for {}: {}", key, err);
                    let _ = self
                        .bus_producer
                        .send(Message::Store(StoreMessage::SubscriptionLost {
                            key,
                            error: err,
                        }));
                }
            }
        }
    }

    fn spawn_forwarder(&self, key: DocKey) {
        let mut snapshots = self.store.subscribe(key);
        let bus_producer = self.bus_producer.clone();
        let stop = Arc::clone(&self.watcher_stop);

        thread::spawn(move || loop {
            if stop.load(Ordering::SeqCst) {
                break;
            }
            match snapshots.try_recv() {
                Ok(snapshot) => Self::decode_snapshot(&bus_producer, snapshot),
                Err(TryRecvError::Empty) => {
                    thread::sleep(Duration::from_millis(FORWARDER_IDLE_SLEEP_MS));
                }
                Err(TryRecvError::Lagged(skipped)) => {
                    warn!("StoreGateway: {} fan-out lagged by {} snapshots", key, skipped);
                }
                Err(TryRecvError::Closed) => {
                    if !stop.load(Ordering::SeqCst) {
                        let _ = bus_producer.send(Message::Store(StoreMessage::SubscriptionLost {
                            key,
                            error: "store fan-out channel closed".to_string(),
                        }));
                    }
                    break;
                }
            }
        });
    }

    fn publish(&self, key: DocKey, document: serde_json::Value) {
        if let Err(err) = self.store.write(key, document) {
            error!("StoreGateway: write failed for {}: {}", key, err);
            let _ = self
                .bus_producer
                .send(Message::Store(StoreMessage::WriteFailed { key, error: err }));
        }
    }

    pub fn run(&mut self) {
        self.seed_initial_state();
        for key in DocKey::ALL {
            self.spawn_forwarder(key);
        }

        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Store(StoreMessage::PublishPlayback(document))) => {
                    match serde_json::to_value(&document) {
                        Ok(value) => self.publish(DocKey::PlaybackState, value),
                        Err(err) => {
                            error!("StoreGateway: failed to encode playback document: {}", err);
                        }
                    }
                }
                Ok(Message::Store(StoreMessage::PublishQueue(document))) => {
                    match serde_json::to_value(&document) {
                        Ok(value) => self.publish(DocKey::QueueState, value),
                        Err(err) => {
                            error!("StoreGateway: failed to encode queue document: {}", err);
                        }
                    }
                }
                Ok(Message::Session(SessionMessage::Shutdown)) => {
                    debug!("StoreGateway: shutting down");
                    self.watcher_stop.store(true, Ordering::SeqCst);
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("StoreGateway: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => {
                    self.watcher_stop.store(true, Ordering::SeqCst);
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    use tokio::sync::broadcast::{self, Sender};

    use super::*;
    use crate::store::memory::MemoryStore;
    use crate::test_support::{assert_no_message, wait_for_message};

    fn spawn_gateway(store: Arc<MemoryStore>) -> (Sender<Message>, Receiver<Message>) {
        let (bus_sender, _) = broadcast::channel(256);
        let gateway_receiver = bus_sender.subscribe();
        let gateway_sender = bus_sender.clone();
        // Subscribe the caller's receiver before the gateway thread can emit its
        // startup seed, otherwise late subscribers race past it.
        let receiver = bus_sender.subscribe();
        let gateway_store: Arc<dyn DocumentStore> = store;
        thread::spawn(move || {
            let mut gateway = StoreGateway::new(gateway_receiver, gateway_sender, gateway_store);
            gateway.run();
        });
        (bus_sender, receiver)
    }

    fn playback_doc(revision: u64) -> PlaybackDocument {
        PlaybackDocument {
            revision,
            track_id: "trk-1".to_string(),
            title: "Test Track".to_string(),
            thumbnail_url: String::new(),
            is_playing: true,
            position_seconds: 12.5,
            is_muted: false,
        }
    }

    #[test]
    fn test_seed_forwards_existing_documents() {
        let store = Arc::new(MemoryStore::new());
        store
            .write(
                DocKey::PlaybackState,
                serde_json::to_value(playback_doc(3)).unwrap(),
            )
            .unwrap();

        let (bus_sender, mut receiver) = spawn_gateway(store);
        let message = wait_for_message(&mut receiver, Duration::from_secs(1), |message| {
            matches!(message, Message::Store(StoreMessage::PlaybackSnapshot(_)))
        });
        if let Message::Store(StoreMessage::PlaybackSnapshot(document)) = message {
            assert_eq!(document.revision, 3);
            assert_eq!(document.track_id, "trk-1");
        } else {
            panic!("expected PlaybackSnapshot");
        }
    }

    #[test]
    fn test_publish_round_trips_through_store_fanout() {
        let store = Arc::new(MemoryStore::new());
        let (bus_sender, mut receiver) = spawn_gateway(Arc::clone(&store));

        bus_sender
            .send(Message::Store(StoreMessage::PublishPlayback(playback_doc(1))))
            .unwrap();

        wait_for_message(&mut receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Store(StoreMessage::PlaybackSnapshot(document)) if document.revision == 1
            )
        });
        assert!(store.read(DocKey::PlaybackState).unwrap().is_some());
    }

    #[test]
    fn test_write_failure_reports_and_keeps_running() {
        let store = Arc::new(MemoryStore::new());
        let (bus_sender, mut receiver) = spawn_gateway(Arc::clone(&store));

        store.set_fail_writes(true);
        bus_sender
            .send(Message::Store(StoreMessage::PublishPlayback(playback_doc(1))))
            .unwrap();
        wait_for_message(&mut receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Store(StoreMessage::WriteFailed {
                    key: DocKey::PlaybackState,
                    ..
                })
            )
        });

        store.set_fail_writes(false);
        bus_sender
            .send(Message::Store(StoreMessage::PublishPlayback(playback_doc(2))))
            .unwrap();
        wait_for_message(&mut receiver, Duration::from_secs(1), |message| {
            matches!(
                message,
                Message::Store(StoreMessage::PlaybackSnapshot(document)) if document.revision == 2
            )
        });
    }

    #[test]
    fn test_malformed_document_is_dropped() {
        let store = Arc::new(MemoryStore::new());
        let (bus_sender, mut receiver) = spawn_gateway(Arc::clone(&store));

        store
            .write(DocKey::QueueState, serde_json::json!({"items": 5}))
            .unwrap();
        assert_no_message(&mut receiver, Duration::from_millis(150), |message| {
            matches!(message, Message::Store(StoreMessage::QueueSnapshot(_)))
        });
    }

    #[test]
    fn test_no_snapshots_after_shutdown() {
        let store = Arc::new(MemoryStore::new());
        let (bus_sender, mut receiver) = spawn_gateway(Arc::clone(&store));

        bus_sender
            .send(Message::Session(SessionMessage::Shutdown))
            .unwrap();
        // Let the forwarders observe the stop flag.
        thread::sleep(Duration::from_millis(60));

        store
            .write(
                DocKey::PlaybackState,
                serde_json::to_value(playback_doc(9)).unwrap(),
            )
            .unwrap();
        assert_no_message(&mut receiver, Duration::from_millis(150), |message| {
            matches!(message, Message::Store(StoreMessage::PlaybackSnapshot(_)))
        });
    }
}
