//! Document store abstractions and concrete implementations.
//!
//! The store is the only rendezvous point between clients: a passive service
//! holding two singleton JSON documents, replaced whole on every write and
//! fanned out to every subscriber, including the writer.

pub mod memory;
pub mod rest;

use std::fmt;

use tokio::sync::broadcast;

/// Typed key for the two known singleton documents. String document ids do
/// not leak outside this module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DocKey {
    PlaybackState,
    QueueState,
}

impl DocKey {
    pub const ALL: [DocKey; 2] = [DocKey::PlaybackState, DocKey::QueueState];

    pub(crate) fn document_id(self) -> &'static str {
        match self {
            DocKey::PlaybackState => "playback_state",
            DocKey::QueueState => "queue_state",
        }
    }
}

impl fmt::Display for DocKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.document_id())
    }
}

/// Full copy of a document delivered to subscribers on each write.
#[derive(Debug, Clone)]
pub struct DocumentSnapshot {
    pub key: DocKey,
    pub document: serde_json::Value,
}

/// Interface implemented by concrete document stores.
///
/// Writes are full replaces; there is no partial-update primitive. Reads
/// return `None` for documents that have never been written.
pub trait DocumentStore: Send + Sync {
    fn read(&self, key: DocKey) -> Result<Option<serde_json::Value>, String>;
    fn write(&self, key: DocKey, document: serde_json::Value) -> Result<(), String>;
    /// Subscribes to snapshot fan-out for one document. Dropping the
    /// receiver is the unsubscribe.
    fn subscribe(&self, key: DocKey) -> broadcast::Receiver<DocumentSnapshot>;
    /// Stops any background watchers owned by the store.
    fn shutdown(&self);
}
