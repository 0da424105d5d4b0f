//! Debounced search coordinator.
//!
//! One backend call per quiet interval: a query change schedules a call,
//! a newer change within the interval reschedules it, and clearing the query
//! cancels any pending call and clears results.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use log::{debug, error, warn};
use tokio::sync::broadcast::{error::TryRecvError, Receiver, Sender};

use crate::backends::{SearchAuth, SearchBackend};
use crate::protocol::{ConfigMessage, Message, SearchMessage, SessionMessage};

const DEFAULT_DEBOUNCE_MS: u64 = 500;
const DEFAULT_RESULT_LIMIT: usize = 25;
const IDLE_SLEEP_MS: u64 = 20;

struct PendingQuery {
    query: String,
    due_at: Instant,
}

/// Debounces query input and issues one-shot backend searches.
pub struct SearchManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    backend: Arc<dyn SearchBackend>,
    auth: Option<SearchAuth>,
    debounce: Duration,
    result_limit: usize,
    pending: Option<PendingQuery>,
}

impl SearchManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        backend: Arc<dyn SearchBackend>,
        auth: Option<SearchAuth>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            backend,
            auth,
            debounce: Duration::from_millis(DEFAULT_DEBOUNCE_MS),
            result_limit: DEFAULT_RESULT_LIMIT,
            pending: None,
        }
    }

    fn emit_results(&self, query: String, hits: Vec<crate::protocol::SearchHit>) {
        let _ = self
            .bus_producer
            .send(Message::Search(SearchMessage::ResultsReady { query, hits }));
    }

    fn handle_query_changed(&mut self, query: String) {
        let query = query.trim().to_string();
        if query.is_empty() {
            // Clearing the input cancels the pending call and the results.
            self.pending = None;
            self.emit_results(String::new(), Vec::new());
            return;
        }
        self.pending = Some(PendingQuery {
            query,
            due_at: Instant::now() + self.debounce,
        });
    }

    fn run_due_search(&mut self) {
        let due = matches!(&self.pending, Some(pending) if Instant::now() >= pending.due_at);
        if !due {
            return;
        }
        let pending = self
            .pending
            .take()
            .unwrap_or_else(|| unreachable!("pending checked above"));

        let Some(auth) = self.auth.as_ref() else {
            error!("SearchManager: no search credentials configured");
            let _ = self.bus_producer.send(Message::Search(
                SearchMessage::SearchFailed("no search credentials configured".to_string()),
            ));
            self.emit_results(pending.query, Vec::new());
            return;
        };

        debug!("SearchManager: searching for '{}'", pending.query);
        match self
            .backend
            .search(auth, &pending.query, self.result_limit)
        {
            Ok(hits) => self.emit_results(pending.query, hits),
            Err(err) => {
                error!("SearchManager: search failed: {}", err);
                let _ = self
                    .bus_producer
                    .send(Message::Search(SearchMessage::SearchFailed(err)));
                self.emit_results(pending.query, Vec::new());
            }
        }
    }

    pub fn run(&mut self) {
        loop {
            loop {
                match self.bus_consumer.try_recv() {
                    Ok(Message::Search(SearchMessage::QueryChanged(query))) => {
                        self.handle_query_changed(query);
                    }
                    Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                        self.debounce =
                            Duration::from_millis(config.search.debounce_ms.clamp(100, 2_000));
                        self.result_limit = config.search.result_limit.clamp(1, 100) as usize;
                    }
                    Ok(Message::Session(SessionMessage::Shutdown)) => {
                        debug!("SearchManager: shutting down");
                        return;
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!("SearchManager: bus lagged by {} messages", skipped);
                    }
                    Err(TryRecvError::Closed) => return,
                }
            }

            self.run_due_search();
            thread::sleep(Duration::from_millis(IDLE_SLEEP_MS));
        }
    }
}
