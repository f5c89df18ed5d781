//! Process-local session store backed by concurrent hash maps.
//!
//! Used when no external database is configured and throughout the test suite.
//! Each operation locks a single map entry, which gives the same per-call
//! atomicity the document databases offer and nothing more.

use std::{
    io,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::{Duration, SystemTime},
};

use dashmap::DashMap;
use futures::future::BoxFuture;
use tokio::time::sleep;
use uuid::Uuid;

use crate::dao::{
    models::{ArrayField, SessionCondition, SessionEntity, SessionPatch},
    session_store::SessionStore,
    storage::{StorageError, StorageResult},
};

/// Session store kept in process memory.
///
/// Sessions are lost on restart. Clones share the same maps.
#[derive(Clone, Default)]
pub struct MemorySessionStore {
    inner: Arc<MemoryInner>,
}

#[derive(Default)]
struct MemoryInner {
    sessions: DashMap<Uuid, SessionEntity>,
    join_codes: DashMap<String, Uuid>,
    latency: Option<Duration>,
    offline: AtomicBool,
}

impl MemorySessionStore {
    /// Empty store answering immediately.
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every operation by `latency` before it touches the maps, simulating
    /// a network round trip so concurrent callers interleave.
    pub fn with_latency(latency: Duration) -> Self {
        Self {
            inner: Arc::new(MemoryInner {
                latency: Some(latency),
                ..MemoryInner::default()
            }),
        }
    }

    /// Make every subsequent operation fail as if the backend were unreachable.
    pub fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    async fn round_trip(&self, operation: &str) -> StorageResult<()> {
        if let Some(latency) = self.inner.latency {
            sleep(latency).await;
        }
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StorageError::unavailable(
                format!("in-memory store offline during {operation}"),
                io::Error::new(io::ErrorKind::NotConnected, "store offline"),
            ));
        }
        Ok(())
    }

    fn index_join_code(&self, id: Uuid, previous: Option<String>, next: Option<&String>) {
        let Some(next) = next else {
            return;
        };
        if let Some(previous) = previous.filter(|previous| previous != next) {
            self.inner
                .join_codes
                .remove_if(&previous, |_, owner| *owner == id);
        }
        self.inner.join_codes.insert(next.clone(), id);
    }
}

impl SessionStore for MemorySessionStore {
    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("create").await?;
            let id = session.id;
            if let Some(code) = &session.join_code {
                store.inner.join_codes.insert(code.clone(), id);
            }
            store.inner.sessions.insert(id, session);
            Ok(id)
        })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("get").await?;
            Ok(store
                .inner
                .sessions
                .get(&id)
                .map(|entry| entry.value().clone()))
        })
    }

    fn update(&self, id: Uuid, patch: SessionPatch) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("update").await?;
            let previous_code = {
                let Some(mut entry) = store.inner.sessions.get_mut(&id) else {
                    return Ok(false);
                };
                let previous = entry.join_code.clone();
                patch.apply_to(&mut entry);
                previous
            };
            store.index_join_code(id, previous_code, patch.join_code.as_ref());
            Ok(true)
        })
    }

    fn conditional_update(
        &self,
        id: Uuid,
        condition: SessionCondition,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("conditional update").await?;
            let previous_code = {
                let Some(mut entry) = store.inner.sessions.get_mut(&id) else {
                    return Ok(false);
                };
                if !condition.holds_for(&entry) {
                    return Ok(false);
                }
                let previous = entry.join_code.clone();
                patch.apply_to(&mut entry);
                previous
            };
            store.index_join_code(id, previous_code, patch.join_code.as_ref());
            Ok(true)
        })
    }

    fn append(
        &self,
        id: Uuid,
        field: ArrayField,
        value: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("append").await?;
            let Some(mut entry) = store.inner.sessions.get_mut(&id) else {
                return Ok(false);
            };
            match field {
                ArrayField::Roster => {
                    if !entry.roster.contains(&value) {
                        entry.roster.push(value);
                    }
                }
                ArrayField::Trail { player } => {
                    entry.trails.entry(player).or_default().push(value);
                }
            }
            entry.updated_at = SystemTime::now();
            Ok(true)
        })
    }

    fn find_by_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move {
            store.round_trip("find by join code").await?;
            Ok(store.inner.join_codes.get(&code).map(|entry| *entry.value()))
        })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.round_trip("health check").await })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.round_trip("reconnect").await })
    }
}
