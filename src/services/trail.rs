//! Per-player navigation trails and the winner commit.

use indexmap::IndexMap;
use tracing::info;

use crate::{
    config::WinnerPolicy,
    dao::models::{ArrayField, SessionCondition, SessionPatch},
    error::ServiceError,
    services::lifecycle::{load_session, require_player_name, resolve_join_code},
    state::{
        SharedState,
        session::{Session, TopicPair},
        state_machine::{SessionEvent, SessionPhase, next_phase},
    },
};

/// What happened to a recorded visit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    /// The topic was appended; the target was not reached.
    Recorded,
    /// The visit reached the target and the player was committed as winner.
    Won,
    /// The visit reached the target but another winner was already committed.
    LateArrival,
}

/// End-of-race view: topics, winner and every trail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RaceSummary {
    /// Phase at read time.
    pub phase: SessionPhase,
    /// Race topics, once chosen.
    pub topics: Option<TopicPair>,
    /// Committed winner.
    pub winner: Option<String>,
    /// Trails of every roster member in roster order.
    pub trails: IndexMap<String, Vec<String>>,
}

/// Append `topic` to the player's trail and commit the win when it is the target.
///
/// The append, the target check and the winner commit are separate round trips.
/// Under [`WinnerPolicy::LastWriteWins`] two racing arrivals both commit and the
/// later write is the final winner; [`WinnerPolicy::FirstCommitWins`] guards the
/// commit on an unset winner instead.
pub async fn record_visit(
    state: &SharedState,
    raw_code: &str,
    player_name: &str,
    topic: &str,
) -> Result<VisitOutcome, ServiceError> {
    let player = require_player_name(player_name)?;
    let topic = topic.trim();
    if topic.is_empty() {
        return Err(ServiceError::InvalidInput("topic must not be empty".into()));
    }

    let session_id = resolve_join_code(state, raw_code).await?;
    let store = state.require_session_store().await?;
    let session = load_session(store.as_ref(), session_id).await?;

    if !session.has_player(&player) {
        return Err(ServiceError::NotFound(format!(
            "player {player} in session {session_id}"
        )));
    }
    if session.phase != SessionPhase::InProgress {
        return Err(ServiceError::InvalidState(format!(
            "visits are only recorded while the race is in progress (phase is {})",
            session.phase
        )));
    }

    let trail = ArrayField::Trail {
        player: player.clone(),
    };
    if !store.append(session_id, trail, topic.to_owned()).await? {
        return Err(ServiceError::NotFound(format!("session {session_id}")));
    }

    let reached_target = session
        .topics
        .as_ref()
        .is_some_and(|topics| topics.target == topic);
    if !reached_target {
        return Ok(VisitOutcome::Recorded);
    }

    let ended = next_phase(session.phase, SessionEvent::TargetReached)?;
    let patch = SessionPatch::default().winner(player.as_str()).phase(ended);
    let committed = match state.config().winner_policy {
        WinnerPolicy::LastWriteWins => store.update(session_id, patch).await?,
        WinnerPolicy::FirstCommitWins => {
            store
                .conditional_update(session_id, SessionCondition::WinnerUnset, patch)
                .await?
        }
    };

    if committed {
        info!(
            session_id = %session_id,
            winner = %player,
            %topic,
            "target reached; race ended"
        );
        Ok(VisitOutcome::Won)
    } else {
        info!(
            session_id = %session_id,
            player = %player,
            "target reached after winner was committed"
        );
        Ok(VisitOutcome::LateArrival)
    }
}

/// Committed winner of the session behind `raw_code`.
pub async fn get_winner(
    state: &SharedState,
    raw_code: &str,
) -> Result<Option<String>, ServiceError> {
    Ok(read_by_code(state, raw_code).await?.winner)
}

/// Trails of every roster member, in roster order.
pub async fn get_all_trails(
    state: &SharedState,
    raw_code: &str,
) -> Result<IndexMap<String, Vec<String>>, ServiceError> {
    Ok(read_by_code(state, raw_code).await?.all_trails())
}

/// Topics, winner and trails from a single read.
pub async fn get_summary(state: &SharedState, raw_code: &str) -> Result<RaceSummary, ServiceError> {
    let session = read_by_code(state, raw_code).await?;
    Ok(RaceSummary {
        phase: session.phase,
        trails: session.all_trails(),
        topics: session.topics,
        winner: session.winner,
    })
}

async fn read_by_code(state: &SharedState, raw_code: &str) -> Result<Session, ServiceError> {
    let session_id = resolve_join_code(state, raw_code).await?;
    let store = state.require_session_store().await?;
    load_session(store.as_ref(), session_id).await
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::sleep;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::session_store::memory::MemorySessionStore,
        services::{
            lifecycle::{get_phase, start},
            test_support::{lobby_with, memory_state, state_with_config},
            topics::FixedTopicPair,
        },
        state::{SharedState, session::JoinCode},
    };

    async fn race(state: &SharedState, players: &[&str]) -> JoinCode {
        let (id, code) = lobby_with(state, None, players).await;
        start(state, id).await.unwrap();
        code
    }

    #[tokio::test]
    async fn trail_keeps_visit_order_and_duplicates() {
        let state = memory_state();
        let code = race(&state, &["Ava", "Ben"]).await;

        for topic in ["Dog", "Mammal", "Dog", "Mammal"] {
            let outcome = record_visit(&state, code.as_str(), "Ava", topic)
                .await
                .unwrap();
            assert_eq!(outcome, VisitOutcome::Recorded);
        }

        let trails = get_all_trails(&state, code.as_str()).await.unwrap();
        assert_eq!(trails["Ava"], vec!["Dog", "Mammal", "Dog", "Mammal"]);
        assert!(trails["Ben"].is_empty());
        assert_eq!(get_winner(&state, code.as_str()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn reaching_the_target_ends_the_race() {
        let state = memory_state();
        let code = race(&state, &["Ava", "Ben"]).await;

        record_visit(&state, code.as_str(), "Ben", "Dog").await.unwrap();
        let outcome = record_visit(&state, code.as_str(), "Ben", "Cat")
            .await
            .unwrap();
        assert_eq!(outcome, VisitOutcome::Won);

        let summary = get_summary(&state, code.as_str()).await.unwrap();
        assert_eq!(summary.phase, SessionPhase::Ended);
        assert_eq!(summary.winner.as_deref(), Some("Ben"));
        assert_eq!(summary.trails["Ben"].last().map(String::as_str), Some("Cat"));
        assert_eq!(
            summary.topics.map(|topics| topics.target),
            Some("Cat".to_string())
        );
    }

    #[tokio::test]
    async fn visits_are_rejected_outside_the_race() {
        let state = memory_state();
        let (id, code) = lobby_with(&state, None, &["Ava", "Ben"]).await;

        assert!(matches!(
            record_visit(&state, code.as_str(), "Ava", "Dog").await,
            Err(ServiceError::InvalidState(_))
        ));

        start(&state, id).await.unwrap();
        record_visit(&state, code.as_str(), "Ava", "Cat").await.unwrap();
        assert!(matches!(
            record_visit(&state, code.as_str(), "Ben", "Cat").await,
            Err(ServiceError::InvalidState(_))
        ));
        assert_eq!(get_phase(&state, id).await.unwrap(), SessionPhase::Ended);
    }

    #[tokio::test]
    async fn unknown_players_cannot_record_visits() {
        let state = memory_state();
        let code = race(&state, &["Ava", "Ben"]).await;
        assert!(matches!(
            record_visit(&state, code.as_str(), "Mallory", "Cat").await,
            Err(ServiceError::NotFound(_))
        ));
        assert_eq!(get_winner(&state, code.as_str()).await.unwrap(), None);
    }

    #[tokio::test]
    async fn blank_topics_are_invalid() {
        let state = memory_state();
        let code = race(&state, &["Ava", "Ben"]).await;
        assert!(matches!(
            record_visit(&state, code.as_str(), "Ava", "  ").await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    /// Ava and Ben both reach the target; Ben's reads happen before Ava's commit
    /// and Ben's commit lands last.
    async fn racing_arrivals(
        policy: WinnerPolicy,
    ) -> (VisitOutcome, VisitOutcome, SharedState, JoinCode) {
        let config = AppConfig {
            winner_policy: policy,
            ..AppConfig::default()
        };
        let state = state_with_config(
            MemorySessionStore::with_latency(Duration::from_millis(10)),
            Arc::new(FixedTopicPair::new("Dog", "Cat").unwrap()),
            config,
        );
        let code = race(&state, &["Ava", "Ben"]).await;

        let (ava, ben) = tokio::join!(
            record_visit(&state, code.as_str(), "Ava", "Cat"),
            async {
                sleep(Duration::from_millis(5)).await;
                record_visit(&state, code.as_str(), "Ben", "Cat").await
            },
        );
        (ava.unwrap(), ben.unwrap(), state, code)
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_wins_overwrites_the_first_winner() {
        let (ava, ben, state, code) = racing_arrivals(WinnerPolicy::LastWriteWins).await;
        assert_eq!(ava, VisitOutcome::Won);
        assert_eq!(ben, VisitOutcome::Won);

        let summary = get_summary(&state, code.as_str()).await.unwrap();
        assert_eq!(summary.winner.as_deref(), Some("Ben"));
        assert_eq!(summary.phase, SessionPhase::Ended);
        assert_eq!(summary.trails["Ava"], vec!["Cat"]);
        assert_eq!(summary.trails["Ben"], vec!["Cat"]);
    }

    #[tokio::test(start_paused = true)]
    async fn first_commit_wins_keeps_the_earlier_winner() {
        let (ava, ben, state, code) = racing_arrivals(WinnerPolicy::FirstCommitWins).await;
        assert_eq!(ava, VisitOutcome::Won);
        assert_eq!(ben, VisitOutcome::LateArrival);
        assert_eq!(
            get_winner(&state, code.as_str()).await.unwrap().as_deref(),
            Some("Ava")
        );
    }
}
