use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;
use uuid::Uuid;

use crate::{
    dto::session::{
        HostSessionRequest, HostSessionResponse, PhaseResponse, RosterResponse, TopicsResponse,
    },
    error::AppError,
    services::lifecycle,
    state::{SharedState, session::TopicPair},
};

/// Host-side routes addressed by internal session id.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(host_session))
        .route("/sessions/{id}/start", post(start_session))
        .route("/sessions/{id}/phase", get(session_phase))
        .route("/sessions/{id}/roster", get(session_roster))
        .route("/sessions/{id}/topics", get(session_topics))
}

/// Create a session, assign a join code and seat the host.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "sessions",
    request_body = HostSessionRequest,
    responses(
        (status = 200, description = "Session created", body = HostSessionResponse),
        (status = 400, description = "Invalid host name"),
        (status = 503, description = "Storage unavailable")
    )
)]
pub async fn host_session(
    State(state): State<SharedState>,
    Valid(Json(payload)): Valid<Json<HostSessionRequest>>,
) -> Result<Json<HostSessionResponse>, AppError> {
    let hosted = lifecycle::host_session(&state, payload.max_players, &payload.host_name).await?;
    Ok(Json(hosted.into()))
}

/// Start the race: choose topics and move the session to in_progress.
#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Race started", body = TopicPair),
        (status = 404, description = "Unknown session"),
        (status = 409, description = "Not enough players or session already started"),
        (status = 502, description = "Topic selection failed")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TopicPair>, AppError> {
    let topics = lifecycle::start(&state, id).await?;
    Ok(Json(topics))
}

/// Current lifecycle phase.
#[utoipa::path(
    get,
    path = "/sessions/{id}/phase",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Current phase", body = PhaseResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_phase(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PhaseResponse>, AppError> {
    let phase = lifecycle::get_phase(&state, id).await?;
    Ok(Json(PhaseResponse { phase }))
}

/// Roster in join order.
#[utoipa::path(
    get,
    path = "/sessions/{id}/roster",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Roster", body = RosterResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_roster(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<RosterResponse>, AppError> {
    let roster = lifecycle::get_roster(&state, id).await?;
    Ok(Json(RosterResponse {
        players: roster.into_iter().collect(),
    }))
}

/// Start and target topics, once the race runs.
#[utoipa::path(
    get,
    path = "/sessions/{id}/topics",
    tag = "sessions",
    params(("id" = Uuid, Path, description = "Session identifier")),
    responses(
        (status = 200, description = "Race topics", body = TopicsResponse),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn session_topics(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<TopicsResponse>, AppError> {
    let topics = lifecycle::get_topics(&state, id).await?;
    Ok(Json(TopicsResponse { topics }))
}
