//! Client side of the polling protocol.
//!
//! Clients never receive pushes: each screen runs poll loops against a
//! [`SessionReader`] and turns what it observes into [`SyncEvent`]s. The reader
//! is either in-process ([`LocalReader`]) or remote over the REST API
//! (`HttpSessionClient`, feature `http-client`).

/// Session context held by a client between screens.
pub mod context;
/// REST client for a remote server.
#[cfg(feature = "http-client")]
pub mod http;
/// Reader calling the services directly.
pub mod local;
/// Cancellable background poll tasks.
pub mod poll;
/// Poll loops and the screens owning them.
pub mod sync;

use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::{
    error::ServiceError,
    state::{session::TopicPair, state_machine::SessionPhase},
};

pub use self::context::{ContextSlot, SessionContext};
#[cfg(feature = "http-client")]
pub use self::http::HttpSessionClient;
pub use self::local::LocalReader;
pub use self::poll::PollHandle;
pub use self::sync::{LobbyScreen, RaceResults, RaceScreen, SyncEvent, SyncTarget};

/// Read side of the session API, as seen by a polling client.
///
/// Every call is a fresh fetch; nothing is cached between calls.
pub trait SessionReader: Send + Sync {
    /// Current phase.
    fn phase(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<SessionPhase, ServiceError>>;
    /// Roster in join order.
    fn roster(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Vec<String>, ServiceError>>;
    /// Race topics, once chosen.
    fn topics(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<TopicPair>, ServiceError>>;
    /// Committed winner.
    fn winner(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<String>, ServiceError>>;
    /// Trails of every roster member.
    fn trails(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<IndexMap<String, Vec<String>>, ServiceError>>;
}
