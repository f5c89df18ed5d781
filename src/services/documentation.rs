use utoipa::OpenApi;

#[derive(OpenApi)]
/// Aggregated OpenAPI specification for Wiki Race Back.
#[openapi(
    paths(
        crate::routes::health::healthcheck,
        crate::routes::sessions::host_session,
        crate::routes::sessions::start_session,
        crate::routes::sessions::session_phase,
        crate::routes::sessions::session_roster,
        crate::routes::sessions::session_topics,
        crate::routes::join::join_session,
        crate::routes::join::record_visit,
        crate::routes::join::race_winner,
        crate::routes::join::race_trails,
        crate::routes::join::race_summary,
    ),
    components(
        schemas(
            crate::dto::health::HealthResponse,
            crate::error::ErrorBody,
            crate::error::ErrorCode,
            crate::dto::session::HostSessionRequest,
            crate::dto::session::HostSessionResponse,
            crate::dto::session::JoinRequest,
            crate::dto::session::JoinResponse,
            crate::dto::session::VisitRequest,
            crate::dto::session::VisitResponse,
            crate::dto::session::VisitOutcomeDto,
            crate::dto::session::PhaseResponse,
            crate::dto::session::RosterResponse,
            crate::dto::session::TopicsResponse,
            crate::dto::session::WinnerResponse,
            crate::dto::session::TrailsResponse,
            crate::dto::session::SummaryResponse,
            crate::state::session::TopicPair,
            crate::state::state_machine::SessionPhase,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "sessions", description = "Host operations addressed by session id"),
        (name = "join", description = "Player operations addressed by join code"),
    )
)]
pub struct ApiDoc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_route_is_documented() {
        let doc = ApiDoc::openapi();
        for path in [
            "/healthcheck",
            "/sessions",
            "/sessions/{id}/start",
            "/sessions/{id}/phase",
            "/sessions/{id}/roster",
            "/sessions/{id}/topics",
            "/join/{code}",
            "/join/{code}/visits",
            "/join/{code}/winner",
            "/join/{code}/trails",
            "/join/{code}/summary",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {path}");
        }
    }
}
