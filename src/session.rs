//! Client session bootstrap.
//!
//! Wires one client's managers to a shared bus and spawns each on its own
//! thread. Several sessions against the same store instance form a listening
//! room inside one process; the REST store extends that across hosts.

use std::sync::Arc;
use std::thread;

use tokio::sync::broadcast;

use crate::backends::{SearchAuth, SearchBackend};
use crate::clock_sampler::ClockSampler;
use crate::config::Config;
use crate::player::PlayerAdapter;
use crate::protocol::{ConfigMessage, Message, SessionMessage};
use crate::queue_manager::QueueManager;
use crate::search_manager::SearchManager;
use crate::store::DocumentStore;
use crate::store_gateway::StoreGateway;
use crate::sync_manager::SyncManager;

/// Everything a client session needs wired together.
pub struct SessionServicesConfig {
    pub bus_sender: broadcast::Sender<Message>,
    pub store: Arc<dyn DocumentStore>,
    pub player: Arc<dyn PlayerAdapter>,
    pub search_backend: Arc<dyn SearchBackend>,
    pub search_auth: Option<SearchAuth>,
    pub config: Config,
}

/// Handle to a running session; `shutdown` tears every manager down.
pub struct SessionHandle {
    bus_sender: broadcast::Sender<Message>,
}

impl SessionHandle {
    pub fn bus(&self) -> &broadcast::Sender<Message> {
        &self.bus_sender
    }

    /// Broadcasts the shutdown command. Every manager loop, forwarder, and
    /// sampler observes it and exits; no callbacks or samples fire afterward.
    pub fn shutdown(&self) {
        let _ = self
            .bus_sender
            .send(Message::Session(SessionMessage::Shutdown));
    }
}

pub fn spawn_session_services(services: SessionServicesConfig) -> SessionHandle {
    let SessionServicesConfig {
        bus_sender,
        store,
        player,
        search_backend,
        search_auth,
        config,
    } = services;

    let gateway_bus_receiver = bus_sender.subscribe();
    let gateway_bus_sender = bus_sender.clone();
    let gateway_store = Arc::clone(&store);
    thread::spawn(move || {
        let mut gateway = StoreGateway::new(gateway_bus_receiver, gateway_bus_sender, gateway_store);
        gateway.run();
    });

    let sync_bus_receiver = bus_sender.subscribe();
    let sync_bus_sender = bus_sender.clone();
    let sync_player = Arc::clone(&player);
    thread::spawn(move || {
        let mut sync_manager = SyncManager::new(sync_bus_receiver, sync_bus_sender, sync_player);
        sync_manager.run();
    });

    let queue_bus_receiver = bus_sender.subscribe();
    let queue_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let mut queue_manager = QueueManager::new(queue_bus_receiver, queue_bus_sender);
        queue_manager.run();
    });

    let sampler_bus_receiver = bus_sender.subscribe();
    let sampler_bus_sender = bus_sender.clone();
    let sampler_player = Arc::clone(&player);
    thread::spawn(move || {
        let mut sampler =
            ClockSampler::new(sampler_bus_receiver, sampler_bus_sender, sampler_player);
        sampler.run();
    });

    let search_bus_receiver = bus_sender.subscribe();
    let search_bus_sender = bus_sender.clone();
    thread::spawn(move || {
        let mut search_manager = SearchManager::new(
            search_bus_receiver,
            search_bus_sender,
            search_backend,
            search_auth,
        );
        search_manager.run();
    });

    let _ = bus_sender.send(Message::Config(ConfigMessage::ConfigChanged(config)));

    SessionHandle { bus_sender }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use tokio::sync::broadcast::{self, Receiver};

    use super::*;
    use crate::player::fake::{FakePlayer, PlayerCall};
    use crate::protocol::{
        PlaybackMessage, PlayerMessage, QueueMessage, QueueTrack, StoreMessage, SyncPhase,
    };
    use crate::store::memory::MemoryStore;
    use crate::test_support::{assert_no_message, drain_messages, wait_for_message};

    struct ClientHarness {
        handle: SessionHandle,
        receiver: Receiver<Message>,
        player: Arc<FakePlayer>,
    }

    impl ClientHarness {
        fn new(store: Arc<MemoryStore>) -> Self {
            let (bus_sender, _) = broadcast::channel(2048);
            let receiver = bus_sender.subscribe();
            let player = Arc::new(FakePlayer::ready());
            let handle = spawn_session_services(SessionServicesConfig {
                bus_sender,
                store,
                player: (Arc::clone(&player) as Arc<dyn PlayerAdapter>),
                search_backend: Arc::new(NoopBackend),
                search_auth: None,
                config: Config::default(),
            });
            Self {
                handle,
                receiver,
                player,
            }
        }

        fn send(&self, message: Message) {
            self.handle.bus().send(message).expect("bus send failed");
        }

        fn join(&mut self) {
            self.send(Message::Player(PlayerMessage::Ready));
            wait_for_message(&mut self.receiver, Duration::from_secs(1), |message| {
                matches!(
                    message,
                    Message::Playback(PlaybackMessage::PhaseChanged(SyncPhase::Joining))
                )
            });
            self.send(Message::Playback(PlaybackMessage::Join));
            wait_for_message(&mut self.receiver, Duration::from_secs(1), |message| {
                matches!(
                    message,
                    Message::Playback(PlaybackMessage::PhaseChanged(SyncPhase::Synced))
                )
            });
        }

        fn wait_for_player_call(&self, expected: PlayerCall) {
            let deadline = std::time::Instant::now() + Duration::from_secs(2);
            loop {
                if self.player.calls().contains(&expected) {
                    return;
                }
                if std::time::Instant::now() > deadline {
                    panic!(
                        "player never received {:?}; calls: {:?}",
                        expected,
                        self.player.calls()
                    );
                }
                std::thread::sleep(Duration::from_millis(5));
            }
        }
    }

    struct NoopBackend;

    impl SearchBackend for NoopBackend {
        fn search(
            &self,
            _auth: &SearchAuth,
            _query: &str,
            _limit: usize,
        ) -> Result<Vec<crate::protocol::SearchHit>, String> {
            Ok(Vec::new())
        }
    }

    fn track(id: &str) -> QueueTrack {
        QueueTrack {
            id: id.to_string(),
            title: format!("Track {id}"),
            thumbnail_url: String::new(),
        }
    }

    #[test]
    fn test_two_clients_converge_on_play_state() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = ClientHarness::new(Arc::clone(&store));
        let mut follower = ClientHarness::new(Arc::clone(&store));
        controller.join();
        follower.join();

        // Client A makes T1 the shared track, playing from zero.
        controller.send(Message::Playback(PlaybackMessage::ChangeTrack(track(
            "t1",
        ))));

        follower.wait_for_player_call(PlayerCall::Load("t1".to_string()));
        follower.wait_for_player_call(PlayerCall::Play);
        controller.wait_for_player_call(PlayerCall::Load("t1".to_string()));
    }

    #[test]
    fn test_remote_seek_and_play_applies_on_synced_follower() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = ClientHarness::new(Arc::clone(&store));
        let mut follower = ClientHarness::new(Arc::clone(&store));
        controller.join();
        follower.join();

        controller.send(Message::Playback(PlaybackMessage::ChangeTrack(track(
            "t1",
        ))));
        follower.wait_for_player_call(PlayerCall::Play);
        follower.player.clear_calls();

        controller.player.set_elapsed(Some(42.0));
        controller.send(Message::Playback(PlaybackMessage::Seek(42.0)));

        follower.wait_for_player_call(PlayerCall::Seek(42.0));
        follower.wait_for_player_call(PlayerCall::Play);
    }

    #[test]
    fn test_pop_front_updates_playback_and_queue_everywhere() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = ClientHarness::new(Arc::clone(&store));
        let mut follower = ClientHarness::new(Arc::clone(&store));
        controller.join();
        follower.join();

        controller.send(Message::Queue(QueueMessage::Enqueue(track("t1"))));
        controller.send(Message::Queue(QueueMessage::Enqueue(track("t2"))));
        wait_for_message(&mut follower.receiver, Duration::from_secs(2), |message| {
            matches!(
                message,
                Message::Queue(QueueMessage::QueueChanged(items)) if items.len() == 2
            )
        });

        controller.send(Message::Queue(QueueMessage::PopFront));

        // Playback converges on T1 at position zero for both clients.
        follower.wait_for_player_call(PlayerCall::Load("t1".to_string()));
        follower.wait_for_player_call(PlayerCall::Seek(0.0));
        // The shared queue shrinks to [t2] on the other client.
        wait_for_message(&mut follower.receiver, Duration::from_secs(2), |message| {
            matches!(
                message,
                Message::Queue(QueueMessage::QueueChanged(items))
                    if items.len() == 1 && items[0].id == "t2"
            )
        });
    }

    #[test]
    fn test_mute_propagates_between_clients() {
        let store = Arc::new(MemoryStore::new());
        let mut controller = ClientHarness::new(Arc::clone(&store));
        let mut follower = ClientHarness::new(Arc::clone(&store));
        controller.join();
        follower.join();

        controller.send(Message::Playback(PlaybackMessage::ChangeTrack(track(
            "t1",
        ))));
        follower.wait_for_player_call(PlayerCall::Play);

        controller.send(Message::Playback(PlaybackMessage::SetMuted(true)));
        follower.wait_for_player_call(PlayerCall::Mute);
    }

    #[test]
    fn test_shutdown_stops_store_fanout_into_session() {
        let store = Arc::new(MemoryStore::new());
        let mut client = ClientHarness::new(Arc::clone(&store));
        client.join();

        client.handle.shutdown();
        std::thread::sleep(Duration::from_millis(80));
        drain_messages(&mut client.receiver);
        client.player.clear_calls();

        // A write from elsewhere must no longer reach this session.
        store
            .write(
                crate::store::DocKey::PlaybackState,
                serde_json::to_value(crate::protocol::PlaybackDocument {
                    revision: 10,
                    track_id: "t9".to_string(),
                    title: String::new(),
                    thumbnail_url: String::new(),
                    is_playing: true,
                    position_seconds: 3.0,
                    is_muted: false,
                })
                .unwrap(),
            )
            .unwrap();

        assert_no_message(&mut client.receiver, Duration::from_millis(200), |message| {
            matches!(message, Message::Store(StoreMessage::PlaybackSnapshot(_)))
        });
        assert!(client.player.calls().is_empty());
    }
}
