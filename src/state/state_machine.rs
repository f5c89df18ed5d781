use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Lifecycle phases of a race session.
///
/// The derived ordering follows declaration order, so `Lobby < Starting <
/// InProgress < Ended` and a valid sequence of observations never decreases.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum SessionPhase {
    /// Players gather and the host waits for enough of them to start.
    Lobby,
    /// The host clicked start; topics are being chosen.
    Starting,
    /// The race is running and trails are being recorded.
    InProgress,
    /// Somebody reached the target; results are final.
    Ended,
}

impl SessionPhase {
    /// Stable identifier used by storage backends and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Lobby => "lobby",
            SessionPhase::Starting => "starting",
            SessionPhase::InProgress => "in_progress",
            SessionPhase::Ended => "ended",
        }
    }

    /// Whether no further transition can leave this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionPhase::Ended)
    }
}

impl fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Events that move a session through its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The host asked to start the race. Re-sent from `Starting` when a previous
    /// attempt failed while choosing topics.
    StartRequested,
    /// Start and target topics were chosen and committed.
    TopicsCommitted,
    /// A player's visit landed on the target topic.
    TargetReached,
}

/// Error returned when an event cannot be applied from the current phase.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from}")]
pub struct InvalidTransition {
    /// The phase the session was in when the event was received.
    pub from: SessionPhase,
    /// The event that cannot be applied from this phase.
    pub event: SessionEvent,
}

/// Compute the phase reached by applying `event` from `from`.
///
/// `TargetReached` is accepted from `Ended` as well: under the last-write-wins
/// winner policy a second arrival re-commits the terminal phase.
pub fn next_phase(
    from: SessionPhase,
    event: SessionEvent,
) -> Result<SessionPhase, InvalidTransition> {
    let next = match (from, event) {
        (SessionPhase::Lobby, SessionEvent::StartRequested)
        | (SessionPhase::Starting, SessionEvent::StartRequested) => SessionPhase::Starting,
        (SessionPhase::Starting, SessionEvent::TopicsCommitted) => SessionPhase::InProgress,
        (SessionPhase::InProgress, SessionEvent::TargetReached)
        | (SessionPhase::Ended, SessionEvent::TargetReached) => SessionPhase::Ended,
        (from, event) => return Err(InvalidTransition { from, event }),
    };

    Ok(next)
}
