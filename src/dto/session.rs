use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    dto::validation::validate_not_blank,
    services::{
        lifecycle::HostedSession,
        trail::{RaceSummary, VisitOutcome},
    },
    state::{session::TopicPair, state_machine::SessionPhase},
};

/// Payload used by a host to open a new session.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct HostSessionRequest {
    /// Display name of the host, seated first.
    #[validate(length(min = 1, max = 64), custom(function = validate_not_blank))]
    pub host_name: String,
    /// Optional capacity; omitted or 0 means unlimited.
    #[serde(default)]
    pub max_players: Option<u32>,
}

/// Identifiers returned to the host.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HostSessionResponse {
    /// Internal session identifier.
    pub session_id: Uuid,
    /// Code players type to join.
    pub join_code: String,
}

impl From<HostedSession> for HostSessionResponse {
    fn from(value: HostedSession) -> Self {
        Self {
            session_id: value.session_id,
            join_code: value.join_code.to_string(),
        }
    }
}

/// Payload used by a player to join through a code.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct JoinRequest {
    /// Display name of the player.
    #[validate(length(min = 1, max = 64), custom(function = validate_not_blank))]
    pub player_name: String,
}

/// Confirmation returned after a successful join.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JoinResponse {
    /// Internal session identifier.
    pub session_id: Uuid,
    /// Normalized join code.
    pub join_code: String,
    /// Name the player was admitted under.
    pub player_name: String,
}

/// A hop in a player's trail.
#[derive(Debug, Serialize, Deserialize, ToSchema, Validate)]
pub struct VisitRequest {
    /// Player who navigated.
    #[validate(length(min = 1, max = 64), custom(function = validate_not_blank))]
    pub player_name: String,
    /// Topic the player landed on.
    #[validate(length(min = 1, max = 256), custom(function = validate_not_blank))]
    pub topic: String,
}

/// Result of a recorded visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisitOutcomeDto {
    /// Appended, target not reached.
    Recorded,
    /// Target reached; the player is the winner.
    Won,
    /// Target reached after another winner was committed.
    LateArrival,
}

impl From<VisitOutcome> for VisitOutcomeDto {
    fn from(value: VisitOutcome) -> Self {
        match value {
            VisitOutcome::Recorded => VisitOutcomeDto::Recorded,
            VisitOutcome::Won => VisitOutcomeDto::Won,
            VisitOutcome::LateArrival => VisitOutcomeDto::LateArrival,
        }
    }
}

/// Response to a recorded visit.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VisitResponse {
    /// What happened to the visit.
    pub outcome: VisitOutcomeDto,
}

/// Current phase of a session.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PhaseResponse {
    /// Lifecycle phase.
    pub phase: SessionPhase,
}

/// Roster in join order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RosterResponse {
    /// Player names.
    pub players: Vec<String>,
}

/// Race topics; absent until the race is in progress.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TopicsResponse {
    /// Start and target topics.
    pub topics: Option<TopicPair>,
}

/// Winner of the race, once committed.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WinnerResponse {
    /// Player name.
    pub winner: Option<String>,
}

/// Trails keyed by player in roster order.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TrailsResponse {
    /// Visited topics per player.
    #[schema(value_type = Object)]
    pub trails: IndexMap<String, Vec<String>>,
}

/// Everything the results screen needs.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SummaryResponse {
    /// Phase at read time.
    pub phase: SessionPhase,
    /// Start and target topics.
    pub topics: Option<TopicPair>,
    /// Winner, once committed.
    pub winner: Option<String>,
    /// Visited topics per player.
    #[schema(value_type = Object)]
    pub trails: IndexMap<String, Vec<String>>,
}

impl From<RaceSummary> for SummaryResponse {
    fn from(value: RaceSummary) -> Self {
        Self {
            phase: value.phase,
            topics: value.topics,
            winner: value.winner,
            trails: value.trails,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_request_rejects_blank_names() {
        let request = HostSessionRequest {
            host_name: "   ".into(),
            max_players: Some(4),
        };
        assert!(request.validate().is_err());

        let request = HostSessionRequest {
            host_name: "Ava".into(),
            max_players: None,
        };
        assert!(request.validate().is_ok());
    }

    #[test]
    fn visit_request_requires_a_topic() {
        let request = VisitRequest {
            player_name: "Ava".into(),
            topic: String::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn max_players_defaults_to_unset() {
        let request: HostSessionRequest = serde_json::from_str(r#"{"host_name":"Ava"}"#).unwrap();
        assert_eq!(request.max_players, None);
    }

    #[test]
    fn visit_outcomes_serialize_in_snake_case() {
        let json = serde_json::to_string(&VisitResponse {
            outcome: VisitOutcome::LateArrival.into(),
        })
        .unwrap();
        assert_eq!(json, r#"{"outcome":"late_arrival"}"#);
    }
}
