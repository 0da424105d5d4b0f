//! Local player seam.
//!
//! The core never touches media bytes; it drives whatever playback widget the
//! host embeds through this adapter. Commands on an unready player are
//! guarded no-ops, never errors. Adapters report lifecycle events on the bus
//! as [`PlayerMessage`](crate::protocol::PlayerMessage) payloads.

use std::sync::Mutex;
use std::time::Instant;

use log::debug;
use tokio::sync::broadcast::Sender;

use crate::protocol::{Message, PlayerMessage, PlayerPhase};

/// Interface implemented by concrete local player adapters.
pub trait PlayerAdapter: Send + Sync {
    fn load(&self, track_id: &str);
    fn play(&self);
    fn pause(&self);
    fn seek(&self, position_seconds: f64);
    fn mute(&self);
    fn unmute(&self);
    fn set_volume(&self, volume: u8);
    /// `None` until the player is ready.
    fn elapsed_seconds(&self) -> Option<f64>;
    fn duration_seconds(&self) -> Option<f64>;
    fn is_ready(&self) -> bool;
}

#[derive(Debug, Default)]
struct SilentPlayerState {
    ready: bool,
    playing: bool,
    /// Position at the last seek/pause boundary.
    base_position: f64,
    /// Wall-clock anchor while playing.
    started_at: Option<Instant>,
}

/// Headless player that tracks position against the wall clock without
/// producing audio. Backs the follower binary; real frontends plug their own
/// widget in instead.
pub struct SilentPlayer {
    bus_producer: Sender<Message>,
    state: Mutex<SilentPlayerState>,
}

impl SilentPlayer {
    pub fn new(bus_producer: Sender<Message>) -> Self {
        Self {
            bus_producer,
            state: Mutex::new(SilentPlayerState::default()),
        }
    }

    /// Marks the player ready and announces it on the bus. The embedding
    /// session calls this once wiring is complete, standing in for the
    /// widget's own ready callback.
    pub fn announce_ready(&self) {
        {
            let mut state = self.lock();
            state.ready = true;
        }
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::Ready));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SilentPlayerState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn emit_phase(&self, phase: PlayerPhase) {
        let _ = self
            .bus_producer
            .send(Message::Player(PlayerMessage::StateChanged(phase)));
    }

    fn elapsed_locked(state: &SilentPlayerState) -> f64 {
        let running = state
            .started_at
            .map(|anchor| anchor.elapsed().as_secs_f64())
            .unwrap_or(0.0);
        state.base_position + running
    }
}

impl PlayerAdapter for SilentPlayer {
    fn load(&self, track_id: &str) {
        let mut state = self.lock();
        if !state.ready {
            debug!("SilentPlayer: load before ready ignored");
            return;
        }
        debug!("SilentPlayer: loaded track {}", track_id);
        state.base_position = 0.0;
        if state.playing {
            state.started_at = Some(Instant::now());
        }
    }

    fn play(&self) {
        let should_emit = {
            let mut state = self.lock();
            if !state.ready || state.playing {
                false
            } else {
                state.playing = true;
                state.started_at = Some(Instant::now());
                true
            }
        };
        if should_emit {
            self.emit_phase(PlayerPhase::Playing);
        }
    }

    fn pause(&self) {
        let should_emit = {
            let mut state = self.lock();
            if !state.ready || !state.playing {
                false
            } else {
                state.base_position = Self::elapsed_locked(&state);
                state.started_at = None;
                state.playing = false;
                true
            }
        };
        if should_emit {
            self.emit_phase(PlayerPhase::Paused);
        }
    }

    fn seek(&self, position_seconds: f64) {
        let mut state = self.lock();
        if !state.ready {
            debug!("SilentPlayer: seek before ready ignored");
            return;
        }
        state.base_position = position_seconds.max(0.0);
        if state.playing {
            state.started_at = Some(Instant::now());
        }
    }

    fn mute(&self) {
        // Nothing audible to silence; the state lives in the shared document.
        debug!("SilentPlayer: muted");
    }

    fn unmute(&self) {
        debug!("SilentPlayer: unmuted");
    }

    fn set_volume(&self, volume: u8) {
        debug!("SilentPlayer: volume set to {}", volume.min(100));
    }

    fn elapsed_seconds(&self) -> Option<f64> {
        let state = self.lock();
        if !state.ready {
            return None;
        }
        Some(Self::elapsed_locked(&state))
    }

    fn duration_seconds(&self) -> Option<f64> {
        // No media is loaded, so there is no duration to report.
        None
    }

    fn is_ready(&self) -> bool {
        self.lock().ready
    }
}


#[cfg(test)]
mod tests {
    use std::thread;
    use std::time::Duration;

    use tokio::sync::broadcast;

    use super::*;

    #[test]
    fn test_commands_before_ready_are_no_ops() {
        let (bus_sender, mut receiver) = broadcast::channel(16);
        let player = SilentPlayer::new(bus_sender);

        player.play();
        player.seek(10.0);
        assert_eq!(player.elapsed_seconds(), None);
        assert!(receiver.try_recv().is_err());
    }

    #[test]
    fn test_elapsed_advances_only_while_playing() {
        let (bus_sender, _receiver) = broadcast::channel(16);
        let player = SilentPlayer::new(bus_sender);
        player.announce_ready();

        player.seek(5.0);
        thread::sleep(Duration::from_millis(30));
        let paused_elapsed = player.elapsed_seconds().unwrap();
        assert!((paused_elapsed - 5.0).abs() < 0.01);

        player.play();
        thread::sleep(Duration::from_millis(50));
        let playing_elapsed = player.elapsed_seconds().unwrap();
        assert!(playing_elapsed > paused_elapsed);

        player.pause();
        let frozen = player.elapsed_seconds().unwrap();
        thread::sleep(Duration::from_millis(30));
        assert_eq!(player.elapsed_seconds().unwrap(), frozen);
    }

    #[test]
    fn test_play_and_pause_emit_phase_changes_once() {
        let (bus_sender, mut receiver) = broadcast::channel(16);
        let player = SilentPlayer::new(bus_sender);
        player.announce_ready();
        assert!(matches!(
            receiver.try_recv(),
            Ok(Message::Player(PlayerMessage::Ready))
        ));

        player.play();
        player.play();
        assert!(matches!(
            receiver.try_recv(),
            Ok(Message::Player(PlayerMessage::StateChanged(PlayerPhase::Playing)))
        ));
        assert!(receiver.try_recv().is_err());

        player.pause();
        assert!(matches!(
            receiver.try_recv(),
            Ok(Message::Player(PlayerMessage::StateChanged(PlayerPhase::Paused)))
        ));
    }
}
