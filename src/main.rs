mod backends;
mod clock_sampler;
mod config;
mod config_persistence;
mod player;
mod protocol;
mod queue_manager;
mod search_keyring;
mod search_manager;
mod session;
mod store;
mod store_gateway;
mod sync_manager;
#[cfg(test)]
mod test_support;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::broadcast;

use backends::subsonic::SubsonicSearchAdapter;
use backends::SearchAuth;
use config::{Config, SearchConfig, StoreBackendKind};
use player::{PlayerAdapter, SilentPlayer};
use protocol::{Message, PlaybackMessage, QueueMessage, SearchMessage, StoreMessage};
use session::{spawn_session_services, SessionServicesConfig};
use store::memory::MemoryStore;
use store::rest::RestStore;
use store::DocumentStore;

fn sanitize_config(config: Config) -> Config {
    let mut config = config;
    config.store.poll_interval_ms = config.store.poll_interval_ms.clamp(100, 60_000);
    config.sync.sampler_hz = config.sync.sampler_hz.clamp(1, 10);
    config.sync.position_beacon_interval_secs =
        config.sync.position_beacon_interval_secs.min(600);
    config.search.debounce_ms = config.search.debounce_ms.clamp(100, 2_000);
    config.search.result_limit = config.search.result_limit.clamp(1, 100);
    config.playback.volume = config.playback.volume.min(100);
    config
}

/// Resolves the search credential: inline config first, then the OS keyring.
fn resolve_search_auth(search: &SearchConfig) -> Option<SearchAuth> {
    if search.endpoint.trim().is_empty() || search.username.trim().is_empty() {
        return None;
    }
    let password = if !search.password.is_empty() {
        search.password.clone()
    } else {
        match search_keyring::get_search_password(&search.username) {
            Ok(Some(password)) => password,
            Ok(None) => {
                warn!(
                    "No search credential for '{}' in config or keyring; search disabled",
                    search.username
                );
                return None;
            }
            Err(err) => {
                warn!("Keyring lookup failed: {}; search disabled", err);
                return None;
            }
        }
    };
    Some(SearchAuth {
        endpoint: search.endpoint.clone(),
        username: search.username.clone(),
        password,
    })
}

fn handle_runtime_message(config_file: &Path, message: Message) {
    match message {
        Message::Playback(PlaybackMessage::SetVolume(volume)) => {
            if let Err(err) = config_persistence::persist_volume(config_file, volume) {
                warn!("Failed to persist volume: {}", err);
            }
        }
        Message::Queue(QueueMessage::SetSelectionMode(mode)) => {
            if let Err(err) = config_persistence::persist_selection_mode(config_file, mode) {
                warn!("Failed to persist selection mode: {}", err);
            }
        }
        Message::Playback(PlaybackMessage::PhaseChanged(phase)) => {
            info!("Sync phase: {:?}", phase);
        }
        Message::Playback(PlaybackMessage::LocalStateChanged(view)) => {
            debug!(
                "Local state: phase={:?} track='{}' [{}] playing={} muted={} position={:.1}s elapsed={:.1}s duration={:?} volume={}",
                view.phase,
                view.title,
                view.track_id,
                view.is_playing,
                view.is_muted,
                view.position_seconds,
                view.elapsed_seconds,
                view.duration_seconds,
                view.volume
            );
        }
        Message::Queue(QueueMessage::QueueChanged(items)) => {
            info!("Queue now holds {} tracks", items.len());
        }
        Message::Store(StoreMessage::WriteFailed { key, error }) => {
            error!("Write to '{}' failed; local state kept: {}", key, error);
        }
        Message::Store(StoreMessage::SubscriptionLost { key, error }) => {
            error!(
                "Lost '{}' subscription ({}). Restart to reconnect.",
                key, error
            );
        }
        Message::Search(SearchMessage::ResultsReady { query, hits }) => {
            if !query.is_empty() {
                info!("Search '{}' returned {} results", query, hits.len());
                for hit in hits.iter().take(3) {
                    debug!("  {} [{}] {}", hit.title, hit.id, hit.thumbnail_url);
                }
            }
        }
        Message::Search(SearchMessage::SearchFailed(err)) => {
            warn!("Search failed: {}", err);
        }
        _ => {}
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let mut clog = colog::default_builder();
    clog.filter(None, log::LevelFilter::Debug);
    clog.init();

    std::panic::set_hook(Box::new(|panic_info| {
        let current_thread = std::thread::current();
        let thread_name = current_thread.name().unwrap_or("unnamed");
        log::error!("panic in thread '{}': {}", thread_name, panic_info);
    }));

    let config_dir = dirs::config_dir().unwrap();
    let config_file = config_dir.join("auxroom.toml");

    if !config_file.exists() {
        let default_config = Config::default();
        info!(
            "Config file not found. Creating default config. path={}",
            config_file.display()
        );
        std::fs::write(
            config_file.clone(),
            toml::to_string(&default_config).unwrap(),
        )
        .unwrap();
    }

    let config_content = std::fs::read_to_string(config_file.clone()).unwrap();
    let mut config = sanitize_config(toml::from_str::<Config>(&config_content).unwrap_or_default());

    if config.client.id.is_empty() {
        config.client.id = uuid::Uuid::new_v4().to_string();
        if let Err(err) = config_persistence::persist_client_id(&config_file, &config.client.id) {
            warn!("Failed to persist client id: {}", err);
        }
    }
    info!(
        "Starting client '{}' ({})",
        config.client.name, config.client.id
    );

    // Bus for communication between components
    let (bus_sender, _) = broadcast::channel(1024);
    let mut bus_receiver = bus_sender.subscribe();

    let store: Arc<dyn DocumentStore> = match config.store.backend {
        StoreBackendKind::Memory => {
            info!("Using in-process document store");
            Arc::new(MemoryStore::new())
        }
        StoreBackendKind::Rest => {
            info!("Using REST document store at {}", config.store.endpoint);
            Arc::new(RestStore::new(
                &config.store.endpoint,
                &config.client.id,
                Duration::from_millis(config.store.poll_interval_ms),
            ))
        }
    };

    let player = Arc::new(SilentPlayer::new(bus_sender.clone()));
    let search_auth = resolve_search_auth(&config.search);
    if search_auth.is_none() {
        info!("Search backend not configured; search requests will fail");
    }

    let handle = spawn_session_services(SessionServicesConfig {
        bus_sender: bus_sender.clone(),
        store: Arc::clone(&store),
        player: (Arc::clone(&player) as Arc<dyn PlayerAdapter>),
        search_backend: Arc::new(SubsonicSearchAdapter::new()),
        search_auth,
        config: config.clone(),
    });

    player.announce_ready();
    if config.client.auto_join {
        debug!("Auto-joining the listening room");
        let _ = handle.bus().send(Message::Playback(PlaybackMessage::Join));
    }

    loop {
        match bus_receiver.blocking_recv() {
            Ok(message) => handle_runtime_message(&config_file, message),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Main loop lagged by {} messages", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }

    store.shutdown();
    info!("Application exiting");
    Ok(())
}
