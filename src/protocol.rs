//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the store
//! gateway, playback sync, queue, search, and player components, plus the
//! two shared document types that cross the store boundary as JSON.

use crate::config::Config;
use crate::store::DocKey;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum Message {
    Playback(PlaybackMessage),
    Queue(QueueMessage),
    Search(SearchMessage),
    Store(StoreMessage),
    Player(PlayerMessage),
    Session(SessionMessage),
    Config(ConfigMessage),
}

/// Reconciler lifecycle phase for the local player.
///
/// `Joining -> Synced` is gated on an explicit user gesture so that applying
/// authoritative state never fights the local player's autoplay policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncPhase {
    Uninitialized,
    Joining,
    Synced,
}

/// Track traversal strategy for next/previous operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Index-based round-robin; previous wraps from 0 to the end.
    #[default]
    RoundRobin,
    /// Uniformly random index other than the current one.
    Shuffle,
}

/// Authoritative playback document. Every write is a full replace; writers
/// carry forward every field they are not changing.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct PlaybackDocument {
    /// Monotonically increasing write sequence used to drop stale snapshots.
    #[serde(default)]
    pub revision: u64,
    /// Opaque external identifier of the current media.
    #[serde(default)]
    pub track_id: String,
    /// Display metadata denormalized next to the track reference.
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: String,
    #[serde(default)]
    pub is_playing: bool,
    /// Authoritative seek position at the instant of the write.
    #[serde(default)]
    pub position_seconds: f64,
    #[serde(default)]
    pub is_muted: bool,
}

/// One entry in the shared queue. Insertion order is playback order.
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub struct QueueTrack {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub thumbnail_url: String,
}

/// Shared queue document. Mutated by full-list replace writes.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct QueueDocument {
    #[serde(default)]
    pub revision: u64,
    #[serde(default)]
    pub items: Vec<QueueTrack>,
}

/// Snapshot of per-client transient state for frontends to render.
#[derive(Debug, Clone)]
pub struct LocalPlaybackView {
    pub phase: SyncPhase,
    pub track_id: String,
    pub title: String,
    pub thumbnail_url: String,
    pub is_playing: bool,
    pub is_muted: bool,
    /// Last authoritative position applied or published.
    pub position_seconds: f64,
    /// Latest locally sampled player elapsed time.
    pub elapsed_seconds: f64,
    pub duration_seconds: Option<f64>,
    /// Local-only playback preference; never written to the store.
    pub volume: u8,
}

/// Playback-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum PlaybackMessage {
    /// Explicit user gesture completing `Joining -> Synced`.
    Join,
    Play,
    Pause,
    SetMuted(bool),
    Seek(f64),
    /// Local-only volume preference, 0-100.
    SetVolume(u8),
    Next,
    Previous,
    /// Make the given track the shared current track, position 0, playing.
    ChangeTrack(QueueTrack),
    /// Periodic sample of the local player clock.
    Progress {
        elapsed_seconds: f64,
        duration_seconds: Option<f64>,
    },
    PhaseChanged(SyncPhase),
    LocalStateChanged(LocalPlaybackView),
}

/// Queue-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum QueueMessage {
    /// Append unless a track with the same id is already queued.
    Enqueue(QueueTrack),
    RemoveById(String),
    /// Dequeue the head and make it the shared current track.
    PopFront,
    SetSelectionMode(SelectionMode),
    QueueChanged(Vec<QueueTrack>),
}

/// One ranked media candidate returned by the search backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub thumbnail_url: String,
}

/// Search-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum SearchMessage {
    QueryChanged(String),
    ResultsReady { query: String, hits: Vec<SearchHit> },
    SearchFailed(String),
}

/// Store-domain commands and notifications.
#[derive(Debug, Clone)]
pub enum StoreMessage {
    /// Decoded playback document delivered by the store (including self-echo).
    PlaybackSnapshot(PlaybackDocument),
    /// Decoded queue document delivered by the store.
    QueueSnapshot(QueueDocument),
    /// Request a full-replace write of the playback document.
    PublishPlayback(PlaybackDocument),
    /// Request a full-replace write of the queue document.
    PublishQueue(QueueDocument),
    WriteFailed { key: DocKey, error: String },
    SubscriptionLost { key: DocKey, error: String },
}

/// Local player phase reported by the player adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Playing,
    Paused,
    Ended,
}

/// Player-adapter events.
#[derive(Debug, Clone)]
pub enum PlayerMessage {
    Ready,
    StateChanged(PlayerPhase),
}

/// Session lifecycle commands.
#[derive(Debug, Clone)]
pub enum SessionMessage {
    /// Tear down every manager loop and watcher for this client session.
    Shutdown,
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
#[allow(clippy::large_enum_variant)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}
