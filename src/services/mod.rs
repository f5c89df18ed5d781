/// OpenAPI documentation generation.
pub mod documentation;
/// Health check service.
pub mod health_service;
/// Session creation, joins and race start.
pub mod lifecycle;
/// Storage connection supervision and degraded mode.
pub mod storage_supervisor;
/// Start/target topic selection.
pub mod topics;
/// Navigation trails and winner commit.
pub mod trail;

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use uuid::Uuid;

    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemorySessionStore,
        services::{
            lifecycle::{assign_join_code, create_session, join, seat_host},
            topics::{FixedTopicPair, TopicPairSelector},
        },
        state::{AppState, SharedState, session::JoinCode},
    };

    /// In-memory state whose races always go from "Dog" to "Cat".
    pub(crate) fn memory_state() -> SharedState {
        state_with(
            MemorySessionStore::new(),
            Arc::new(FixedTopicPair::new("Dog", "Cat").unwrap()),
        )
    }

    pub(crate) fn state_with(
        store: MemorySessionStore,
        selector: Arc<dyn TopicPairSelector>,
    ) -> SharedState {
        state_with_config(store, selector, AppConfig::default())
    }

    pub(crate) fn state_with_config(
        store: MemorySessionStore,
        selector: Arc<dyn TopicPairSelector>,
        config: AppConfig,
    ) -> SharedState {
        AppState::with_store(config, selector, Arc::new(store))
    }

    /// Lobby whose first player is the seated host and the rest joined by code.
    pub(crate) async fn lobby_with(
        state: &SharedState,
        max_players: Option<u32>,
        players: &[&str],
    ) -> (Uuid, JoinCode) {
        let id = create_session(state, max_players).await.unwrap();
        let code = JoinCode::generate();
        assign_join_code(state, id, &code).await.unwrap();
        if let Some((host, guests)) = players.split_first() {
            seat_host(state, id, host).await.unwrap();
            for guest in guests {
                join(state, code.as_str(), guest).await.unwrap();
            }
        }
        (id, code)
    }
}
