//! Session creation, joining and the lobby to race transition.

use indexmap::IndexSet;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
    dao::{
        models::{ArrayField, SessionCondition, SessionEntity, SessionPatch},
        session_store::SessionStore,
    },
    error::ServiceError,
    state::{
        SharedState,
        session::{JoinCode, Session, TopicPair, normalize_player_name},
        state_machine::{SessionEvent, SessionPhase, next_phase},
    },
};

/// Minimum roster size required to start a race.
pub const MIN_PLAYERS: usize = 2;

/// Identifiers handed back to the host after [`host_session`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostedSession {
    /// Internal identifier used by host-side operations.
    pub session_id: Uuid,
    /// Public code shared with players.
    pub join_code: JoinCode,
}

/// Create an empty lobby session. A capacity of zero means unlimited.
pub async fn create_session(
    state: &SharedState,
    max_players: Option<u32>,
) -> Result<Uuid, ServiceError> {
    let store = state.require_session_store().await?;
    let id = store.create(SessionEntity::new(max_players)).await?;
    info!(session_id = %id, ?max_players, "session created");
    Ok(id)
}

/// Attach a join code to a session.
///
/// Uniqueness is the caller's responsibility and is not re-checked here.
pub async fn assign_join_code(
    state: &SharedState,
    session_id: Uuid,
    code: &JoinCode,
) -> Result<(), ServiceError> {
    let store = state.require_session_store().await?;
    let patch = SessionPatch::default().join_code(code.as_str());
    if !store.update(session_id, patch).await? {
        return Err(session_not_found(session_id));
    }
    debug!(session_id = %session_id, join_code = %code, "join code assigned");
    Ok(())
}

/// Seat the host as the first roster member, bypassing the join rules.
pub async fn seat_host(
    state: &SharedState,
    session_id: Uuid,
    host_name: &str,
) -> Result<(), ServiceError> {
    let name = require_player_name(host_name)?;
    let store = state.require_session_store().await?;
    if !store.append(session_id, ArrayField::Roster, name.clone()).await? {
        return Err(session_not_found(session_id));
    }
    info!(session_id = %session_id, host = %name, "host seated");
    Ok(())
}

/// Create a session, give it a fresh join code and seat the host.
pub async fn host_session(
    state: &SharedState,
    max_players: Option<u32>,
    host_name: &str,
) -> Result<HostedSession, ServiceError> {
    require_player_name(host_name)?;
    let store = state.require_session_store().await?;
    let session_id = create_session(state, max_players).await?;
    let join_code = unused_join_code(store.as_ref(), state.config().join_code_attempts).await?;
    assign_join_code(state, session_id, &join_code).await?;
    seat_host(state, session_id, host_name).await?;
    Ok(HostedSession {
        session_id,
        join_code,
    })
}

/// Normalize a user-typed join code and resolve it to a session id.
pub async fn resolve_join_code(state: &SharedState, raw_code: &str) -> Result<Uuid, ServiceError> {
    let code = JoinCode::parse(raw_code)?;
    let store = state.require_session_store().await?;
    store
        .find_by_join_code(code.as_str().to_owned())
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("no session with join code {code}")))
}

/// Add a player to the session behind `raw_code`.
///
/// Checks run in order: unknown code, empty roster, capacity, duplicate name.
/// The read and the append are separate round trips, so concurrent joins can
/// overshoot `max_players`.
pub async fn join(
    state: &SharedState,
    raw_code: &str,
    player_name: &str,
) -> Result<Uuid, ServiceError> {
    let name = require_player_name(player_name)?;
    let session_id = resolve_join_code(state, raw_code).await?;
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;

    if session.roster.is_empty() {
        return Err(ServiceError::NoPlayers);
    }
    if session.is_full() {
        return Err(ServiceError::SessionFull);
    }
    if session.has_player(&name) {
        return Err(ServiceError::DuplicateName(name));
    }

    if !store
        .append(session_id, ArrayField::Roster, name.clone())
        .await?
    {
        return Err(session_not_found(session_id));
    }
    info!(session_id = %session_id, player = %name, "player joined");
    Ok(session_id)
}

/// Move the session from lobby to a running race.
///
/// The phase goes to `starting` first, then the topic selector runs, then the
/// topics are committed together with `in_progress`. Both writes are guarded on
/// the expected phase. A selector failure leaves the session in `starting`,
/// from which a later call may retry.
pub async fn start(state: &SharedState, session_id: Uuid) -> Result<TopicPair, ServiceError> {
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;

    if session.roster.len() < MIN_PLAYERS {
        return Err(ServiceError::NotEnoughPlayers(session.roster.len()));
    }

    let starting = next_phase(session.phase, SessionEvent::StartRequested)?;
    if session.phase == SessionPhase::Lobby {
        let claimed = store
            .conditional_update(
                session_id,
                SessionCondition::PhaseIs(SessionPhase::Lobby),
                SessionPatch::default().phase(starting),
            )
            .await?;
        if !claimed {
            return Err(ServiceError::InvalidState(
                "session left the lobby while starting".into(),
            ));
        }
    } else {
        debug!(session_id = %session_id, "retrying start from starting phase");
    }

    let topics = match state.topic_selector().choose().await {
        Ok(topics) => topics,
        Err(err) => {
            warn!(
                session_id = %session_id,
                error = %err,
                "topic selection failed; session stays in starting"
            );
            return Err(err.into());
        }
    };

    let running = next_phase(starting, SessionEvent::TopicsCommitted)?;
    let committed = store
        .conditional_update(
            session_id,
            SessionCondition::PhaseIs(SessionPhase::Starting),
            SessionPatch::default()
                .phase(running)
                .topics(topics.start.as_str(), topics.target.as_str()),
        )
        .await?;
    if !committed {
        return Err(ServiceError::InvalidState(
            "session already left the starting phase".into(),
        ));
    }

    info!(
        session_id = %session_id,
        start = %topics.start,
        target = %topics.target,
        "race started"
    );
    Ok(topics)
}

/// Current phase of a session.
pub async fn get_phase(state: &SharedState, session_id: Uuid) -> Result<SessionPhase, ServiceError> {
    Ok(read_session(state, session_id).await?.phase)
}

/// Roster of a session in join order.
pub async fn get_roster(
    state: &SharedState,
    session_id: Uuid,
) -> Result<IndexSet<String>, ServiceError> {
    Ok(read_session(state, session_id).await?.roster)
}

/// Race topics, present once the race is in progress.
pub async fn get_topics(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Option<TopicPair>, ServiceError> {
    Ok(read_session(state, session_id).await?.topics)
}

/// Fetch a fresh copy of a session through the installed store.
pub(crate) async fn read_session(
    state: &SharedState,
    session_id: Uuid,
) -> Result<Session, ServiceError> {
    let store = state.require_session_store().await?;
    load_session(store.as_ref(), session_id).await
}

pub(crate) async fn load_session(
    store: &dyn SessionStore,
    session_id: Uuid,
) -> Result<Session, ServiceError> {
    store
        .get(session_id)
        .await?
        .map(Session::from)
        .ok_or_else(|| session_not_found(session_id))
}

pub(crate) fn require_player_name(raw: &str) -> Result<String, ServiceError> {
    normalize_player_name(raw)
        .ok_or_else(|| ServiceError::InvalidInput("player name must not be empty".into()))
}

fn session_not_found(session_id: Uuid) -> ServiceError {
    ServiceError::NotFound(format!("session {session_id}"))
}

async fn unused_join_code(
    store: &dyn SessionStore,
    attempts: u32,
) -> Result<JoinCode, ServiceError> {
    for attempt in 1..=attempts.max(1) {
        let code = JoinCode::generate();
        if store
            .find_by_join_code(code.as_str().to_owned())
            .await?
            .is_none()
        {
            return Ok(code);
        }
        debug!(attempt, join_code = %code, "join code already in use; drawing another");
    }
    Err(ServiceError::InvalidState(format!(
        "no unused join code found after {attempts} attempts"
    )))
}
