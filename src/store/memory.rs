//! In-process document store with real snapshot fan-out.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tokio::sync::broadcast;

use crate::store::{DocKey, DocumentSnapshot, DocumentStore};

const FANOUT_CAPACITY: usize = 256;

/// Shared in-memory store. Multiple client sessions may hold the same
/// instance; every write fans out to all subscribers, including the writer.
pub struct MemoryStore {
    documents: Mutex<HashMap<DocKey, serde_json::Value>>,
    channels: HashMap<DocKey, broadcast::Sender<DocumentSnapshot>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        let mut channels = HashMap::new();
        for key in DocKey::ALL {
            let (sender, _) = broadcast::channel(FANOUT_CAPACITY);
            channels.insert(key, sender);
        }
        Self {
            documents: Mutex::new(HashMap::new()),
            channels,
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Makes subsequent writes fail, for exercising write-failure handling.
    #[cfg(test)]
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn channel(&self, key: DocKey) -> &broadcast::Sender<DocumentSnapshot> {
        self.channels
            .get(&key)
            .unwrap_or_else(|| unreachable!("channel exists for every DocKey"))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentStore for MemoryStore {
    fn read(&self, key: DocKey) -> Result<Option<serde_json::Value>, String> {
        let documents = self
            .documents
            .lock()
            .map_err(|_| "memory store lock poisoned".to_string())?;
        Ok(documents.get(&key).cloned())
    }

    fn write(&self, key: DocKey, document: serde_json::Value) -> Result<(), String> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(format!("simulated write failure for {key}"));
        }
        {
            let mut documents = self
                .documents
                .lock()
                .map_err(|_| "memory store lock poisoned".to_string())?;
            documents.insert(key, document.clone());
        }
        // No subscribers is not an error; the document is still stored.
        let _ = self.channel(key).send(DocumentSnapshot { key, document });
        Ok(())
    }

    fn subscribe(&self, key: DocKey) -> broadcast::Receiver<DocumentSnapshot> {
        self.channel(key).subscribe()
    }

    fn shutdown(&self) {
        // No background watchers to stop.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_returns_none_before_first_write() {
        let store = MemoryStore::new();
        assert_eq!(store.read(DocKey::PlaybackState).unwrap(), None);
    }

    #[test]
    fn test_write_fans_out_to_all_subscribers_including_writer() {
        let store = MemoryStore::new();
        let mut first = store.subscribe(DocKey::PlaybackState);
        let mut second = store.subscribe(DocKey::PlaybackState);

        let document = serde_json::json!({"is_playing": true});
        store.write(DocKey::PlaybackState, document.clone()).unwrap();

        let snapshot = first.try_recv().expect("first subscriber snapshot");
        assert_eq!(snapshot.key, DocKey::PlaybackState);
        assert_eq!(snapshot.document, document);
        let snapshot = second.try_recv().expect("second subscriber snapshot");
        assert_eq!(snapshot.document, document);
    }

    #[test]
    fn test_documents_are_independent_streams() {
        let store = MemoryStore::new();
        let mut queue_rx = store.subscribe(DocKey::QueueState);

        store
            .write(DocKey::PlaybackState, serde_json::json!({"is_playing": false}))
            .unwrap();
        assert!(queue_rx.try_recv().is_err());

        store
            .write(DocKey::QueueState, serde_json::json!({"items": []}))
            .unwrap();
        assert!(queue_rx.try_recv().is_ok());
    }

    #[test]
    fn test_last_write_wins_on_read() {
        let store = MemoryStore::new();
        store
            .write(DocKey::QueueState, serde_json::json!({"revision": 1}))
            .unwrap();
        store
            .write(DocKey::QueueState, serde_json::json!({"revision": 2}))
            .unwrap();
        assert_eq!(
            store.read(DocKey::QueueState).unwrap(),
            Some(serde_json::json!({"revision": 2}))
        );
    }

    #[test]
    fn test_failing_writes_keep_previous_document() {
        let store = MemoryStore::new();
        store
            .write(DocKey::PlaybackState, serde_json::json!({"revision": 1}))
            .unwrap();
        store.set_fail_writes(true);
        assert!(store
            .write(DocKey::PlaybackState, serde_json::json!({"revision": 2}))
            .is_err());
        assert_eq!(
            store.read(DocKey::PlaybackState).unwrap(),
            Some(serde_json::json!({"revision": 1}))
        );
    }
}
