//! Local playback clock sampler.
//!
//! One dedicated thread samples the player's elapsed time at a fixed cadence
//! while the player reports itself playing, emitting `Progress` messages for
//! progress rendering and for stamping outgoing writes. Because there is a
//! single long-lived thread that samples conditionally, no timer is ever
//! registered per playing-transition and none can leak.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, warn};
use tokio::sync::broadcast::{error::TryRecvError, Receiver, Sender};

use crate::player::PlayerAdapter;
use crate::protocol::{
    ConfigMessage, Message, PlaybackMessage, PlayerMessage, PlayerPhase, SessionMessage,
};

const DEFAULT_SAMPLER_HZ: u32 = 4;

/// Samples the local player clock while playing.
pub struct ClockSampler {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    player: Arc<dyn PlayerAdapter>,
    playing: bool,
    sample_interval: Duration,
}

impl ClockSampler {
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        player: Arc<dyn PlayerAdapter>,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            player,
            playing: false,
            sample_interval: Self::interval_for_hz(DEFAULT_SAMPLER_HZ),
        }
    }

    fn interval_for_hz(hz: u32) -> Duration {
        Duration::from_millis(1_000 / u64::from(hz.clamp(1, 10)))
    }

    fn sample(&self) {
        // Not ready yet: sampling is a guarded no-op, not an error.
        if !self.player.is_ready() {
            return;
        }
        let Some(elapsed_seconds) = self.player.elapsed_seconds() else {
            return;
        };
        let _ = self
            .bus_producer
            .send(Message::Playback(PlaybackMessage::Progress {
                elapsed_seconds,
                duration_seconds: self.player.duration_seconds(),
            }));
    }

    pub fn run(&mut self) {
        loop {
            loop {
                match self.bus_consumer.try_recv() {
                    Ok(Message::Player(PlayerMessage::StateChanged(phase))) => {
                        self.playing = phase == PlayerPhase::Playing;
                    }
                    Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                        self.sample_interval = Self::interval_for_hz(config.sync.sampler_hz);
                    }
                    Ok(Message::Session(SessionMessage::Shutdown)) => {
                        debug!("ClockSampler: shutting down");
                        return;
                    }
                    Ok(_) => {}
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Lagged(skipped)) => {
                        warn!("ClockSampler: bus lagged by {} messages", skipped);
                    }
                    Err(TryRecvError::Closed) => return,
                }
            }

            if self.playing {
                self.sample();
            }
            thread::sleep(self.sample_interval);
        }
    }
}
