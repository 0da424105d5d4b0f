//! REST document store adapter.
//!
//! Adapts an HTTP document service (`GET`/`PUT {base}/documents/{id}`) to the
//! [`DocumentStore`] contract. Push notifications are emulated by a watcher
//! thread that polls both documents and fans out a snapshot whenever the
//! stored blob changes.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::broadcast;

use crate::store::{DocKey, DocumentSnapshot, DocumentStore};

const FANOUT_CAPACITY: usize = 256;
const CLIENT_ID_HEADER: &str = "X-Client-Id";

/// Document store reached over HTTP, with a polling watcher standing in for
/// server push.
pub struct RestStore {
    http_client: ureq::Agent,
    base_url: String,
    client_id: String,
    channels: Arc<HashMap<DocKey, broadcast::Sender<DocumentSnapshot>>>,
    stop: Arc<AtomicBool>,
}

impl RestStore {
    /// Creates the adapter and starts the snapshot watcher.
    pub fn new(endpoint: &str, client_id: &str, poll_interval: Duration) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .timeout_read(Duration::from_secs(15))
            .timeout_write(Duration::from_secs(15))
            .build();

        let mut channels = HashMap::new();
        for key in DocKey::ALL {
            let (sender, _) = broadcast::channel(FANOUT_CAPACITY);
            channels.insert(key, sender);
        }

        let store = Self {
            http_client,
            base_url: Self::endpoint_base(endpoint),
            client_id: client_id.to_string(),
            channels: Arc::new(channels),
            stop: Arc::new(AtomicBool::new(false)),
        };
        store.spawn_watcher(poll_interval);
        store
    }

    fn endpoint_base(endpoint: &str) -> String {
        endpoint.trim().trim_end_matches('/').to_string()
    }

    fn document_url(&self, key: DocKey) -> String {
        format!("{}/documents/{}", self.base_url, key.document_id())
    }

    fn fetch(&self, key: DocKey) -> Result<Option<serde_json::Value>, String> {
        let url = self.document_url(key);
        let response = match self
            .http_client
            .get(&url)
            .set(CLIENT_ID_HEADER, &self.client_id)
            .call()
        {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(format!("document read failed ({key}): {err}")),
        };
        let document: serde_json::Value = response
            .into_json()
            .map_err(|err| format!("document parse failed ({key}): {err}"))?;
        Ok(Some(document))
    }

    fn spawn_watcher(&self, poll_interval: Duration) {
        let http_client = self.http_client.clone();
        let base_url = self.base_url.clone();
        let client_id = self.client_id.clone();
        let channels = Arc::clone(&self.channels);
        let stop = Arc::clone(&self.stop);

        thread::spawn(move || {
            let poller = RestStore {
                http_client,
                base_url,
                client_id,
                channels: Arc::clone(&channels),
                stop: Arc::clone(&stop),
            };
            let mut last_seen: HashMap<DocKey, serde_json::Value> = HashMap::new();
            while !stop.load(Ordering::SeqCst) {
                for key in DocKey::ALL {
                    match poller.fetch(key) {
                        Ok(Some(document)) => {
                            if last_seen.get(&key) != Some(&document) {
                                last_seen.insert(key, document.clone());
                                if let Some(sender) = channels.get(&key) {
                                    let _ = sender.send(DocumentSnapshot { key, document });
                                }
                            }
                        }
                        Ok(None) => {}
                        Err(err) => {
                            // Transient poll failures are tolerated; the next
                            // round retries.
                            warn!("RestStore: poll failed: {}", err);
                        }
                    }
                }
                thread::sleep(poll_interval);
            }
            debug!("RestStore: watcher stopped");
        });
    }
}

impl DocumentStore for RestStore {
    fn read(&self, key: DocKey) -> Result<Option<serde_json::Value>, String> {
        self.fetch(key)
    }

    fn write(&self, key: DocKey, document: serde_json::Value) -> Result<(), String> {
        let url = self.document_url(key);
        self.http_client
            .put(&url)
            .set(CLIENT_ID_HEADER, &self.client_id)
            .send_json(document)
            .map_err(|err| format!("document write failed ({key}): {err}"))?;
        Ok(())
    }

    fn subscribe(&self, key: DocKey) -> broadcast::Receiver<DocumentSnapshot> {
        self.channels
            .get(&key)
            .unwrap_or_else(|| unreachable!("channel exists for every DocKey"))
            .subscribe()
    }

    fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
