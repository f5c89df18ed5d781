use std::{fmt, str::FromStr};

use indexmap::{IndexMap, IndexSet};
use rand::Rng;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{dao::models::SessionEntity, state::state_machine::SessionPhase};

/// Number of characters in a join code.
pub const JOIN_CODE_LENGTH: usize = 6;
const JOIN_CODE_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789";

/// Reasons a string is not a valid join code.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JoinCodeError {
    /// Code does not have exactly [`JOIN_CODE_LENGTH`] characters.
    #[error("join code must be exactly {JOIN_CODE_LENGTH} characters (got {0})")]
    WrongLength(usize),
    /// Code contains something other than ASCII letters and digits.
    #[error("join code may only contain letters and digits (found `{0}`)")]
    InvalidCharacter(char),
}

/// Public code players type to find a session. Always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, ToSchema)]
#[serde(transparent)]
pub struct JoinCode(String);

impl JoinCode {
    /// Normalize user input (trim, uppercase) and validate it.
    pub fn parse(raw: &str) -> Result<Self, JoinCodeError> {
        let code = raw.trim().to_ascii_uppercase();
        let len = code.chars().count();
        if len != JOIN_CODE_LENGTH {
            return Err(JoinCodeError::WrongLength(len));
        }
        if let Some(bad) = code.chars().find(|c| !c.is_ascii_alphanumeric()) {
            return Err(JoinCodeError::InvalidCharacter(bad));
        }
        Ok(Self(code))
    }

    /// Draw a random code from the uppercase alphanumeric alphabet.
    pub fn generate() -> Self {
        let mut rng = rand::rng();
        let code = (0..JOIN_CODE_LENGTH)
            .map(|_| char::from(JOIN_CODE_ALPHABET[rng.random_range(0..JOIN_CODE_ALPHABET.len())]))
            .collect();
        Self(code)
    }

    /// Borrow the normalized code.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for JoinCode {
    type Err = JoinCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for JoinCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for JoinCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        Self::parse(&raw).map_err(serde::de::Error::custom)
    }
}

/// Trim surrounding whitespace from a display name, rejecting blank names.
///
/// Comparison stays case-sensitive: "ava" and "Ava" are different players.
pub fn normalize_player_name(raw: &str) -> Option<String> {
    let name = raw.trim();
    (!name.is_empty()).then(|| name.to_owned())
}

/// Start and target topics of a race.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct TopicPair {
    /// Topic every player starts from.
    pub start: String,
    /// Topic players race towards.
    pub target: String,
}

/// Snapshot of a session as read from the store, shaped for rule checks.
#[derive(Debug, Clone)]
pub struct Session {
    /// Primary key.
    pub id: Uuid,
    /// Public join code, once assigned.
    pub join_code: Option<String>,
    /// Optional capacity.
    pub max_players: Option<u32>,
    /// Distinct player names in join order.
    pub roster: IndexSet<String>,
    /// Current lifecycle phase.
    pub phase: SessionPhase,
    /// Race topics, once chosen.
    pub topics: Option<TopicPair>,
    /// Visited topics per player.
    pub trails: IndexMap<String, Vec<String>>,
    /// Player who reached the target.
    pub winner: Option<String>,
}

impl Session {
    /// Whether the roster already reached the configured capacity.
    pub fn is_full(&self) -> bool {
        self.max_players
            .is_some_and(|max| self.roster.len() >= max as usize)
    }

    /// Whether `name` is in the roster.
    pub fn has_player(&self, name: &str) -> bool {
        self.roster.contains(name)
    }

    /// Trails for every roster member in roster order, followed by trails of
    /// names no longer in the roster. Players without visits get an empty trail.
    pub fn all_trails(&self) -> IndexMap<String, Vec<String>> {
        let mut trails: IndexMap<String, Vec<String>> = self
            .roster
            .iter()
            .map(|name| {
                let trail = self.trails.get(name).cloned().unwrap_or_default();
                (name.clone(), trail)
            })
            .collect();
        for (name, trail) in &self.trails {
            trails
                .entry(name.clone())
                .or_insert_with(|| trail.clone());
        }
        trails
    }
}

impl From<SessionEntity> for Session {
    fn from(value: SessionEntity) -> Self {
        let topics = value
            .start_topic
            .zip(value.target_topic)
            .map(|(start, target)| TopicPair { start, target });
        Self {
            id: value.id,
            join_code: value.join_code,
            max_players: value.max_players,
            roster: value.roster.into_iter().collect(),
            phase: value.phase,
            topics,
            trails: value.trails,
            winner: value.winner,
        }
    }
}
