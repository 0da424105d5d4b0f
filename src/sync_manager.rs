//! Playback synchronization manager.
//!
//! Owns the per-client mirror of the authoritative playback document and the
//! `Uninitialized -> Joining -> Synced` lifecycle. Incoming snapshots are
//! applied to the local player in full (last snapshot wins, every field);
//! local intents optimistically drive the player and publish the next full
//! document with unchanged fields carried forward from the mirror.

use std::sync::Arc;
use std::time::Duration;

use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use log::{debug, warn};
use tokio::sync::broadcast::{Receiver, Sender};

use crate::player::PlayerAdapter;
use crate::protocol::{
    ConfigMessage, LocalPlaybackView, Message, PlaybackDocument, PlaybackMessage, PlayerMessage,
    PlayerPhase, QueueTrack, SessionMessage, StoreMessage, SyncPhase,
};

/// Reconciles the local player against authoritative state and publishes
/// local intents as full-document writes.
pub struct SyncManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    player: Arc<dyn PlayerAdapter>,
    phase: SyncPhase,
    mirror: PlaybackDocument,
    /// Latest snapshot received before joining; applied on `Join`.
    pending_snapshot: Option<PlaybackDocument>,
    /// Highest revision seen or published; the next write uses this + 1.
    latest_revision: u64,
    last_applied_revision: Option<u64>,
    /// Revision of our own most recent write, while it is still the newest.
    last_published_revision: Option<u64>,
    loaded_track_id: Option<String>,
    /// Armed on the first `Ended` event, disarmed by the next applied
    /// snapshot, so duplicate `Ended` events advance at most once.
    advance_armed: bool,
    elapsed_seconds: f64,
    duration_seconds: Option<f64>,
    volume: u8,
    beacon: Option<DefaultDirectRateLimiter>,
}

impl SyncManager {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        player: Arc<dyn PlayerAdapter>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            player,
            phase: SyncPhase::Uninitialized,
            mirror: PlaybackDocument::default(),
            pending_snapshot: None,
            latest_revision: 0,
            last_applied_revision: None,
            last_published_revision: None,
            loaded_track_id: None,
            advance_armed: false,
            elapsed_seconds: 0.0,
            duration_seconds: None,
            volume: 100,
            beacon: None,
        }
    }

    fn emit_phase_changed(&self) {
        let _ = self.bus_producer.send(Message::Playback(
            PlaybackMessage::PhaseChanged(self.phase),
        ));
    }

    fn emit_local_state(&self) {
        let view = LocalPlaybackView {
            phase: self.phase,
            track_id: self.mirror.track_id.clone(),
            title: self.mirror.title.clone(),
            thumbnail_url: self.mirror.thumbnail_url.clone(),
            is_playing: self.mirror.is_playing,
            is_muted: self.mirror.is_muted,
            position_seconds: self.mirror.position_seconds,
            elapsed_seconds: self.elapsed_seconds,
            duration_seconds: self.duration_seconds,
            volume: self.volume,
        };
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::LocalStateChanged(view)));
    }

    /// Position to stamp into an outgoing write: the player's current clock
    /// when available, the mirrored authoritative position otherwise.
    fn current_position(&self) -> f64 {
        self.player
            .elapsed_seconds()
            .unwrap_or(self.mirror.position_seconds)
    }

    fn publish(&mut self, mut document: PlaybackDocument) {
        document.revision = self.latest_revision + 1;
        self.latest_revision = document.revision;
        self.last_published_revision = Some(document.revision);
        self.mirror = document.clone();
        let _ = self
            .bus_producer
            .send(Message::Store(StoreMessage::PublishPlayback(document)));
        self.emit_local_state();
    }

    fn handle_snapshot(&mut self, document: PlaybackDocument) {
        if document.revision > self.latest_revision {
            self.latest_revision = document.revision;
        }
        if let Some(published) = self.last_published_revision {
            if document.revision > published {
                // Another client has written since; stop beaconing.
                self.last_published_revision = None;
            }
        }

        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: buffering snapshot until joined");
            self.mirror = document.clone();
            self.pending_snapshot = Some(document);
            self.emit_local_state();
            return;
        }
        self.apply_snapshot(document);
    }

    fn apply_snapshot(&mut self, document: PlaybackDocument) {
        if let Some(applied) = self.last_applied_revision {
            if document.revision < applied {
                debug!(
                    "SyncManager: dropped stale snapshot (revision {} < {})",
                    document.revision, applied
                );
                return;
            }
        }

        if !document.track_id.is_empty()
            && self.loaded_track_id.as_deref() != Some(document.track_id.as_str())
        {
            self.player.load(&document.track_id);
            self.loaded_track_id = Some(document.track_id.clone());
        }
        // Every snapshot is authoritative truth about position, not a delta.
        self.player.seek(document.position_seconds);
        if document.is_playing {
            self.player.play();
        } else {
            self.player.pause();
        }
        if document.is_muted {
            self.player.mute();
        } else {
            self.player.unmute();
        }

        self.last_applied_revision = Some(document.revision);
        self.advance_armed = false;
        self.elapsed_seconds = document.position_seconds;
        self.mirror = document;
        self.emit_local_state();
    }

    fn handle_join(&mut self) {
        if self.phase != SyncPhase::Joining {
            debug!("SyncManager: join ignored in phase {:?}", self.phase);
            return;
        }
        self.phase = SyncPhase::Synced;
        self.emit_phase_changed();
        if let Some(pending) = self.pending_snapshot.take() {
            self.apply_snapshot(pending);
        } else {
            self.emit_local_state();
        }
    }

    fn handle_player_ready(&mut self) {
        if self.phase != SyncPhase::Uninitialized {
            return;
        }
        self.phase = SyncPhase::Joining;
        self.emit_phase_changed();
    }

    fn handle_play(&mut self) {
        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: play ignored before join");
            return;
        }
        self.player.play();
        let mut next = self.mirror.clone();
        next.is_playing = true;
        next.position_seconds = self.current_position();
        self.publish(next);
    }

    fn handle_pause(&mut self) {
        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: pause ignored before join");
            return;
        }
        self.player.pause();
        let mut next = self.mirror.clone();
        next.is_playing = false;
        next.position_seconds = self.current_position();
        self.publish(next);
    }

    fn handle_set_muted(&mut self, muted: bool) {
        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: mute ignored before join");
            return;
        }
        if muted {
            self.player.mute();
        } else {
            self.player.unmute();
        }
        let mut next = self.mirror.clone();
        next.is_muted = muted;
        next.position_seconds = self.current_position();
        self.publish(next);
    }

    fn handle_seek(&mut self, position_seconds: f64) {
        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: seek ignored before join");
            return;
        }
        let position = position_seconds.max(0.0);
        self.player.seek(position);
        self.elapsed_seconds = position;
        let mut next = self.mirror.clone();
        next.position_seconds = position;
        self.publish(next);
    }

    fn handle_change_track(&mut self, track: QueueTrack) {
        if self.phase != SyncPhase::Synced {
            debug!("SyncManager: track change ignored before join");
            return;
        }
        self.player.load(&track.id);
        self.loaded_track_id = Some(track.id.clone());
        self.player.seek(0.0);
        self.player.play();
        self.elapsed_seconds = 0.0;
        self.advance_armed = false;

        let mut next = self.mirror.clone();
        next.track_id = track.id;
        next.title = track.title;
        next.thumbnail_url = track.thumbnail_url;
        next.is_playing = true;
        next.position_seconds = 0.0;
        self.publish(next);
    }

    fn handle_set_volume(&mut self, volume: u8) {
        // Deliberately local-only: volume never reaches the store.
        let volume = volume.min(100);
        self.player.set_volume(volume);
        self.volume = volume;
        self.emit_local_state();
    }

    fn handle_ended(&mut self) {
        if self.phase != SyncPhase::Synced {
            return;
        }
        if self.advance_armed {
            debug!("SyncManager: duplicate ended event ignored");
            return;
        }
        self.advance_armed = true;
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::Next));
    }

    fn handle_progress(&mut self, elapsed_seconds: f64, duration_seconds: Option<f64>) {
        self.elapsed_seconds = elapsed_seconds;
        self.duration_seconds = duration_seconds;
        self.beacon_tick();
    }

    /// While this client's write is still the newest and playback is running,
    /// republish the tuple with a fresh position so late joiners land close
    /// to the true clock. Rate-capped; disabled when the interval is 0.
    fn beacon_tick(&mut self) {
        if self.phase != SyncPhase::Synced || !self.mirror.is_playing {
            return;
        }
        if self.last_published_revision != Some(self.latest_revision) {
            return;
        }
        let allowed = match &self.beacon {
            Some(limiter) => limiter.check().is_ok(),
            None => false,
        };
        if !allowed {
            return;
        }
        let mut next = self.mirror.clone();
        next.position_seconds = self.elapsed_seconds;
        self.publish(next);
    }

    fn apply_config(&mut self, config: &crate::config::Config) {
        self.beacon = match config.sync.position_beacon_interval_secs {
            0 => None,
            secs => Quota::with_period(Duration::from_secs(secs)).map(RateLimiter::direct),
        };
        self.handle_set_volume(config.playback.volume);
    }

    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Playback(message)) => match message {
                    PlaybackMessage::Join => self.handle_join(),
                    PlaybackMessage::Play => self.handle_play(),
                    PlaybackMessage::Pause => self.handle_pause(),
                    PlaybackMessage::SetMuted(muted) => self.handle_set_muted(muted),
                    PlaybackMessage::Seek(position) => self.handle_seek(position),
                    PlaybackMessage::SetVolume(volume) => self.handle_set_volume(volume),
                    PlaybackMessage::ChangeTrack(track) => self.handle_change_track(track),
                    PlaybackMessage::Progress {
                        elapsed_seconds,
                        duration_seconds,
                    } => self.handle_progress(elapsed_seconds, duration_seconds),
                    _ => {}
                },
                Ok(Message::Store(StoreMessage::PlaybackSnapshot(document))) => {
                    self.handle_snapshot(document);
                }
                Ok(Message::Player(PlayerMessage::Ready)) => self.handle_player_ready(),
                Ok(Message::Player(PlayerMessage::StateChanged(PlayerPhase::Ended))) => {
                    self.handle_ended();
                }
                Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                    self.apply_config(&config);
                }
                Ok(Message::Session(SessionMessage::Shutdown)) => {
                    debug!("SyncManager: shutting down");
                    break;
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("SyncManager: bus lagged by {} messages", skipped);
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    }
}
