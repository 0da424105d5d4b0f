//! Search backend abstractions and concrete implementations.

pub mod subsonic;

use crate::protocol::SearchHit;

/// Connection profile used by search backend adapters.
#[derive(Debug, Clone)]
pub struct SearchAuth {
    pub endpoint: String,
    pub username: String,
    pub password: String,
}

/// Interface implemented by concrete media search adapters.
///
/// Each call is a fresh one-shot request returning ranked candidates.
pub trait SearchBackend: Send + Sync {
    fn search(&self, auth: &SearchAuth, query: &str, limit: usize)
        -> Result<Vec<SearchHit>, String>;
}
