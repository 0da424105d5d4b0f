//! Persistent application configuration model and defaults.

use crate::protocol::SelectionMode;

/// Root configuration persisted to `auxroom.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Client identity and join behavior.
    #[serde(default)]
    pub client: ClientConfig,
    /// Document store selection and connection settings.
    #[serde(default)]
    pub store: StoreConfig,
    /// Playback synchronization behavior.
    #[serde(default)]
    pub sync: SyncConfig,
    /// Shared queue behavior.
    #[serde(default)]
    pub queue: QueueConfig,
    /// Search backend and throttling settings.
    #[serde(default)]
    pub search: SearchConfig,
    /// Local playback preferences.
    #[serde(default)]
    pub playback: PlaybackConfig,
}

/// Client identity persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ClientConfig {
    #[serde(default = "default_client_name")]
    pub name: String,
    /// Stable per-installation id; generated on first run.
    #[serde(default)]
    pub id: String,
    /// Treat startup as the join gesture. Native clients have no autoplay
    /// policy to satisfy, so a headless follower can join unattended.
    #[serde(default = "default_true")]
    pub auto_join: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            name: default_client_name(),
            id: String::new(),
            auto_join: true,
        }
    }
}

/// Which document store implementation to connect to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreBackendKind {
    /// In-process store; useful for single-host sessions and tests.
    #[default]
    Memory,
    /// Remote document service reached over HTTP.
    Rest,
}

/// Document store connection settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub backend: StoreBackendKind,
    #[serde(default)]
    pub endpoint: String,
    /// Snapshot poll cadence for the REST store watcher.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            backend: StoreBackendKind::default(),
            endpoint: String::new(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

/// Playback synchronization settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SyncConfig {
    /// Local clock sample rate while playing, in Hz.
    #[serde(default = "default_sampler_hz")]
    pub sampler_hz: u32,
    /// Minimum seconds between position republications while this client is
    /// the most recent playback writer. 0 disables the beacon.
    #[serde(default = "default_beacon_interval_secs")]
    pub position_beacon_interval_secs: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sampler_hz: default_sampler_hz(),
            position_beacon_interval_secs: default_beacon_interval_secs(),
        }
    }
}

/// Shared queue settings.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueueConfig {
    #[serde(default)]
    pub selection_mode: SelectionMode,
}

/// Search backend and throttling settings.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SearchConfig {
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub username: String,
    /// Optional inline credential; the OS keyring is consulted when empty.
    #[serde(default)]
    pub password: String,
    /// Quiet interval before a query string change issues a backend call.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    #[serde(default = "default_result_limit")]
    pub result_limit: u32,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            username: String::new(),
            password: String::new(),
            debounce_ms: default_debounce_ms(),
            result_limit: default_result_limit(),
        }
    }
}

/// Local playback preferences persisted between sessions.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackConfig {
    /// Local-only volume level, 0-100. Never shared through the store.
    #[serde(default = "default_volume")]
    pub volume: u8,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            volume: default_volume(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_client_name() -> String {
    "auxroom".to_string()
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_sampler_hz() -> u32 {
    4
}

fn default_beacon_interval_secs() -> u64 {
    5
}

fn default_debounce_ms() -> u64 {
    500
}

fn default_result_limit() -> u32 {
    25
}

fn default_volume() -> u8 {
    100
}
