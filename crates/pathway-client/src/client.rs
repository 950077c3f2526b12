//! Client core facade.

use std::path::Path;
use std::sync::Arc;

use pathway_core::{Clock, SystemClock};
use pathway_realtime::{ChannelApi, RealtimeConnectionManager, Topic};
use pathway_session::{AuthApi, SessionLifecycleCoordinator};
use pathway_settings::{PathwaySettings, load_settings, load_settings_from_path};
use tracing::{info, warn};

use crate::errors::ClientError;
use crate::feed::ChatFeed;

/// Load settings (from `path`, or `~/.pathway/settings.json`) and install
/// the global logging subscriber they describe.
pub fn init(path: Option<&Path>) -> Result<PathwaySettings, ClientError> {
    let settings = match path {
        Some(path) => load_settings_from_path(path)?,
        None => load_settings()?,
    };
    pathway_telemetry::init_logging(&settings.logging)?;
    info!(version = env!("CARGO_PKG_VERSION"), "pathway client core initialised");
    Ok(settings)
}

/// The three client components, wired from one settings value.
pub struct ClientCore {
    settings: PathwaySettings,
    realtime: RealtimeConnectionManager,
    session: SessionLifecycleCoordinator,
    chat: ChatFeed,
}

impl ClientCore {
    /// Build the components around the host's Data Service adapters.
    pub fn new(settings: PathwaySettings, channels: Arc<dyn ChannelApi>, auth: Arc<dyn AuthApi>) -> Self {
        Self::with_clock(settings, channels, auth, Arc::new(SystemClock))
    }

    /// Like [`Self::new`] with an explicit wall clock.
    pub fn with_clock(
        settings: PathwaySettings,
        channels: Arc<dyn ChannelApi>,
        auth: Arc<dyn AuthApi>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let realtime = RealtimeConnectionManager::new(channels, settings.realtime.clone());
        let session = SessionLifecycleCoordinator::with_clock(auth, settings.session.clone(), clock);
        let chat = ChatFeed::new(settings.chat.clone(), settings.progress.clone());
        Self {
            settings,
            realtime,
            session,
            chat,
        }
    }

    /// Restore the persisted session and open the connection-status topic.
    ///
    /// Failures are logged; both recover on their own (next sign-in event,
    /// background reconnect).
    pub async fn start(&self) {
        match self.session.restore().await {
            Ok(found) => info!(signed_in = found, "client core started"),
            Err(err) => warn!(error = %err, kind = err.error_kind(), "session restore failed"),
        }
        if let Err(err) = self.realtime.open(Topic::connection_status()).await {
            warn!(error = %err, "connection-status channel unavailable");
        }
    }

    /// Effective settings.
    pub fn settings(&self) -> &PathwaySettings {
        &self.settings
    }

    /// Live-update channels.
    pub fn realtime(&self) -> &RealtimeConnectionManager {
        &self.realtime
    }

    /// Authentication session.
    pub fn session(&self) -> &SessionLifecycleCoordinator {
        &self.session
    }

    /// Chat ingestion and progress.
    pub fn chat(&self) -> &ChatFeed {
        &self.chat
    }

    /// Stop feeds and timers, then close every channel.
    pub async fn shutdown(&self) {
        self.chat.stop();
        self.session.dispose();
        self.realtime.shutdown().await;
        info!("client core shut down");
    }
}
