/// Domain view of a session plus join code and player name rules.
pub mod session;
/// Session lifecycle phases and the allowed transitions between them.
pub mod state_machine;

use std::sync::Arc;

use tokio::sync::{RwLock, watch};

use crate::{
    config::AppConfig, dao::session_store::SessionStore, error::ServiceError,
    services::topics::TopicPairSelector,
};

/// Shared handle passed to routes, services and in-process clients.
pub type SharedState = Arc<AppState>;

/// Central application state holding the session store and the topic selector.
pub struct AppState {
    session_store: RwLock<Option<Arc<dyn SessionStore>>>,
    degraded: watch::Sender<bool>,
    config: AppConfig,
    topic_selector: Arc<dyn TopicPairSelector>,
}

impl AppState {
    /// Construct a new [`AppState`] wrapped in an [`Arc`] so it can be cloned cheaply.
    ///
    /// The application starts in degraded mode until a storage backend is installed.
    pub fn new(config: AppConfig, topic_selector: Arc<dyn TopicPairSelector>) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(true);
        Arc::new(Self {
            session_store: RwLock::new(None),
            degraded: degraded_tx,
            config,
            topic_selector,
        })
    }

    /// Construct a state with `store` already installed.
    pub fn with_store(
        config: AppConfig,
        topic_selector: Arc<dyn TopicPairSelector>,
        store: Arc<dyn SessionStore>,
    ) -> SharedState {
        let (degraded_tx, _rx) = watch::channel(false);
        Arc::new(Self {
            session_store: RwLock::new(Some(store)),
            degraded: degraded_tx,
            config,
            topic_selector,
        })
    }

    /// Obtain a handle to the current session store, if one is installed.
    pub async fn session_store(&self) -> Option<Arc<dyn SessionStore>> {
        let guard = self.session_store.read().await;
        guard.as_ref().cloned()
    }

    /// Current session store, or [`ServiceError::Degraded`] when none is installed.
    pub async fn require_session_store(&self) -> Result<Arc<dyn SessionStore>, ServiceError> {
        self.session_store().await.ok_or(ServiceError::Degraded)
    }

    /// Install a new session store implementation and leave degraded mode.
    pub async fn set_session_store(&self, store: Arc<dyn SessionStore>) {
        {
            let mut guard = self.session_store.write().await;
            *guard = Some(store);
        }
        self.update_degraded(false);
    }

    /// Remove the current session store and enter degraded mode.
    pub async fn clear_session_store(&self) {
        {
            let mut guard = self.session_store.write().await;
            guard.take();
        }
        self.update_degraded(true);
    }

    /// Current degraded flag.
    pub fn is_degraded(&self) -> bool {
        *self.degraded.borrow()
    }

    /// Subscribe to degraded mode updates.
    pub fn degraded_watcher(&self) -> watch::Receiver<bool> {
        self.degraded.subscribe()
    }

    /// Update and broadcast the degraded flag when the value changes.
    pub fn update_degraded(&self, value: bool) {
        self.degraded.send_if_modified(|current| {
            if *current == value {
                return false;
            }
            *current = value;
            true
        });
    }

    /// Runtime configuration.
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Selector used when a race starts.
    pub fn topic_selector(&self) -> &Arc<dyn TopicPairSelector> {
        &self.topic_selector
    }
}
