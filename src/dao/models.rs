use std::time::SystemTime;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::state::state_machine::SessionPhase;

/// Session record persisted by the storage layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SessionEntity {
    /// Primary key of the session.
    pub id: Uuid,
    /// Public join code, assigned shortly after creation.
    pub join_code: Option<String>,
    /// Optional capacity; `None` means unlimited.
    pub max_players: Option<u32>,
    /// Player display names in join order.
    pub roster: Vec<String>,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Topic every player starts from, set once the race is in progress.
    pub start_topic: Option<String>,
    /// Topic players race towards, set once the race is in progress.
    pub target_topic: Option<String>,
    /// Visited topics per player, in visit order.
    pub trails: IndexMap<String, Vec<String>>,
    /// Name of the player who reached the target.
    pub winner: Option<String>,
    /// Creation timestamp for auditing/debugging.
    pub created_at: SystemTime,
    /// Last time the record was written.
    pub updated_at: SystemTime,
}

impl SessionEntity {
    /// Build an empty lobby session.
    pub fn new(max_players: Option<u32>) -> Self {
        let now = SystemTime::now();
        Self {
            id: Uuid::new_v4(),
            join_code: None,
            max_players: max_players.filter(|max| *max > 0),
            roster: Vec::new(),
            phase: SessionPhase::Lobby,
            start_topic: None,
            target_topic: None,
            trails: IndexMap::new(),
            winner: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Field level delta applied by [`SessionStore::update`](crate::dao::session_store::SessionStore::update).
///
/// Each populated field overwrites the stored value (last write wins); absent
/// fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionPatch {
    /// New join code.
    pub join_code: Option<String>,
    /// New phase.
    pub phase: Option<SessionPhase>,
    /// New start topic.
    pub start_topic: Option<String>,
    /// New target topic.
    pub target_topic: Option<String>,
    /// New winner.
    pub winner: Option<String>,
}

impl SessionPatch {
    /// Set the join code.
    pub fn join_code(mut self, code: impl Into<String>) -> Self {
        self.join_code = Some(code.into());
        self
    }

    /// Set the phase.
    pub fn phase(mut self, phase: SessionPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Set both race topics.
    pub fn topics(mut self, start: impl Into<String>, target: impl Into<String>) -> Self {
        self.start_topic = Some(start.into());
        self.target_topic = Some(target.into());
        self
    }

    /// Set the winner.
    pub fn winner(mut self, name: impl Into<String>) -> Self {
        self.winner = Some(name.into());
        self
    }

    /// Overwrite the populated fields of `session`.
    pub fn apply_to(&self, session: &mut SessionEntity) {
        if let Some(code) = &self.join_code {
            session.join_code = Some(code.clone());
        }
        if let Some(phase) = self.phase {
            session.phase = phase;
        }
        if let Some(start) = &self.start_topic {
            session.start_topic = Some(start.clone());
        }
        if let Some(target) = &self.target_topic {
            session.target_topic = Some(target.clone());
        }
        if let Some(winner) = &self.winner {
            session.winner = Some(winner.clone());
        }
        session.updated_at = SystemTime::now();
    }
}

/// Guard evaluated atomically with a conditional update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCondition {
    /// The stored phase equals the given one.
    PhaseIs(SessionPhase),
    /// No winner has been committed yet.
    WinnerUnset,
}

impl SessionCondition {
    /// Evaluate the guard against a record.
    pub fn holds_for(&self, session: &SessionEntity) -> bool {
        match self {
            SessionCondition::PhaseIs(phase) => session.phase == *phase,
            SessionCondition::WinnerUnset => session.winner.is_none(),
        }
    }
}

/// Array fields supporting atomic appends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArrayField {
    /// The roster; appends have set semantics and ignore values already present.
    Roster,
    /// A player's trail; appends always push, duplicates included.
    Trail {
        /// Owner of the trail.
        player: String,
    },
}
