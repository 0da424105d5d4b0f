//! Shared queue manager.
//!
//! Owns the locally cached copy of the queue document. Every mutation is a
//! read-modify-write against that cache followed by a full-list publish, so
//! two clients mutating at the same instant race and the store's last write
//! wins over the whole list. Next/previous navigate the list without
//! consuming it; `PopFront` is the consuming advance.

use log::{debug, warn};
use rand::{rngs::StdRng, Rng, SeedableRng};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::protocol::{
    ConfigMessage, Message, PlaybackMessage, QueueDocument, QueueMessage, QueueTrack,
    SelectionMode, SessionMessage, StoreMessage,
};

/// Applies queue mutations and selects next/previous tracks.
pub struct QueueManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    queue: QueueDocument,
    /// Track id of the current authoritative playback state.
    current_track_id: String,
    selection_mode: SelectionMode,
    // Use StdRng instead of ThreadRng for thread safety
    rng_seed: [u8; 32],
}

impl QueueManager {
    pub fn new(bus_consumer: Receiver<Message>, bus_producer: Sender<Message>) -> Self {
        let mut seed = [0u8; 32];
        if let Err(err) = getrandom::getrandom(&mut seed) {
            warn!("QueueManager: failed to seed rng, using zero seed: {}", err);
        }
        Self {
            bus_consumer,
            bus_producer,
            queue: QueueDocument::default(),
            current_track_id: String::new(),
            selection_mode: SelectionMode::default(),
            rng_seed: seed,
        }
    }

    fn publish_queue(&mut self) {
        let document = QueueDocument {
            revision: self.queue.revision + 1,
            items: self.queue.items.clone(),
        };
        self.queue = document.clone();
        let _ = self
            .bus_producer
            .send(Message::Store(StoreMessage::PublishQueue(document)));
    }

    fn emit_change_track(&self, track: QueueTrack) {
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::ChangeTrack(track)));
    }

    fn handle_enqueue(&mut self, track: QueueTrack) {
        if self.queue.items.iter().any(|item| item.id == track.id) {
            debug!("QueueManager: duplicate enqueue rejected for {}", track.id);
            return;
        }
        self.queue.items.push(track);
        self.publish_queue();
    }

    fn handle_remove_by_id(&mut self, id: &str) {
        let before = self.queue.items.len();
        self.queue.items.retain(|item| item.id != id);
        if self.queue.items.len() == before {
            debug!("QueueManager: remove ignored, {} not queued", id);
            return;
        }
        self.publish_queue();
    }

    fn handle_pop_front(&mut self) {
        if self.queue.items.is_empty() {
            debug!("QueueManager: pop on empty queue ignored");
            return;
        }
        let head = self.queue.items.remove(0);
        // Track change first, then the shortened list: two separate writes,
        // not atomic.
        self.emit_change_track(head);
        self.publish_queue();
    }

    fn current_index(&self) -> usize {
        self.queue
            .items
            .iter()
            .position(|item| item.id == self.current_track_id)
            .unwrap_or(0)
    }

    fn random_index_excluding(&mut self, len: usize, exclude: usize) -> usize {
        let mut rng = StdRng::from_seed(self.rng_seed);
        let mut index;
        loop {
            index = rng.gen_range(0..len);
            if index != exclude {
                break;
            }
        }
        // Update the seed for next time
        let mut new_seed = [0u8; 32];
        for (i, val) in new_seed.iter_mut().enumerate() {
            *val = self.rng_seed[i].wrapping_add(1);
        }
        self.rng_seed = new_seed;
        index
    }

    fn handle_next(&mut self) {
        let len = self.queue.items.len();
        if len == 0 {
            debug!("QueueManager: next ignored, queue empty");
            return;
        }
        let current = self.current_index();
        let next = match self.selection_mode {
            SelectionMode::RoundRobin => (current + 1) % len,
            SelectionMode::Shuffle => {
                if len == 1 {
                    0
                } else {
                    self.random_index_excluding(len, current)
                }
            }
        };
        self.emit_change_track(self.queue.items[next].clone());
    }

    fn handle_previous(&mut self) {
        let len = self.queue.items.len();
        if len == 0 {
            debug!("QueueManager: previous ignored, queue empty");
            return;
        }
        // Previous is always circular, wrapping from 0 to the end.
        let current = self.current_index();
        let previous = (current + len - 1) % len;
        self.emit_change_track(self.queue.items[previous].clone());
    }

    fn handle_queue_snapshot(&mut self, document: QueueDocument) {
        if document.revision < self.queue.revision {
            debug!(
                "QueueManager: dropped stale queue snapshot (revision {} < {})",
                document.revision, self.queue.revision
            );
            return;
        }
        self.queue = document;
        let _ = self.bus_producer.send(Message::Queue(
            QueueMessage::QueueChanged(self.queue.items.clone()),
        ));
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Queue(message)) => match message {
                    QueueMessage::Enqueue(track) => self.handle_enqueue(track),
                    QueueMessage::RemoveById(id) => self.handle_remove_by_id(&id),
                    QueueMessage::PopFront => self.handle_pop_front(),
                    QueueMessage::SetSelectionMode(mode) => {
                        debug!("QueueManager: selection mode changed to {:?}", mode);
                        self.selection_mode = mode;
                    }
                    QueueMessage::QueueChanged(_) => {}
                },
                Ok(Message::Playback(PlaybackMessage::Next)) => self.handle_next(),
                Ok(Message::Playback(PlaybackMessage::Previous)) => self.handle_previous(),
                Ok(Message::Store(StoreMessage::QueueSnapshot(document))) => {
                    self.handle_queue_snapshot(document);
                }
                Ok(Message::Store(StoreMessage::PlaybackSnapshot(document))) => {
                    self.current_track_id = document.track_id;
                }
                Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                    self.selection_mode = config.queue.selection_mode;
                }
                Ok(Message::Session(SessionMessage::Shutdown)) => {
                    debug!("QueueManager: shutting down");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("QueueManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
