/// In-process store used by default and in tests.
pub mod memory;
/// MongoDB backend.
#[cfg(feature = "mongo-store")]
pub mod mongodb;

use futures::future::BoxFuture;
use uuid::Uuid;

use crate::dao::{
    models::{ArrayField, SessionCondition, SessionEntity, SessionPatch},
    storage::StorageResult,
};

/// Abstraction over the shared session document store.
///
/// Every call is a single round trip. Nothing here spans more than one call, so
/// sequences such as "read the roster, then append" are not linearizable: other
/// clients may write between the two steps. Callers that need a guard must use
/// [`SessionStore::conditional_update`], which evaluates its condition and writes
/// atomically.
///
/// Mutating calls return `false` when the addressed session does not exist (or,
/// for conditional updates, when the guard did not hold).
pub trait SessionStore: Send + Sync {
    /// Insert a new record and return its identifier.
    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>>;
    /// Fetch a fresh copy of a record.
    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>>;
    /// Overwrite the populated fields of `patch` (last write wins per field).
    fn update(&self, id: Uuid, patch: SessionPatch) -> BoxFuture<'static, StorageResult<bool>>;
    /// Apply `patch` only if `condition` holds at write time.
    fn conditional_update(
        &self,
        id: Uuid,
        condition: SessionCondition,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Atomically append `value` to an array field.
    fn append(
        &self,
        id: Uuid,
        field: ArrayField,
        value: String,
    ) -> BoxFuture<'static, StorageResult<bool>>;
    /// Resolve a join code to the session currently using it.
    fn find_by_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>>;
    /// Check that the backend is reachable.
    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>>;
    /// Re-establish the backend connection after a failed health check.
    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>>;
}
