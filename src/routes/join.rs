use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use axum_valid::Valid;

use crate::{
    dto::session::{
        JoinRequest, JoinResponse, SummaryResponse, TrailsResponse, VisitRequest, VisitResponse,
        WinnerResponse,
    },
    error::AppError,
    services::{lifecycle, trail},
    state::{SharedState, session::normalize_player_name},
};

/// Player-side routes addressed by public join code.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/join/{code}", post(join_session))
        .route("/join/{code}/visits", post(record_visit))
        .route("/join/{code}/winner", get(race_winner))
        .route("/join/{code}/trails", get(race_trails))
        .route("/join/{code}/summary", get(race_summary))
}

/// Join the lobby behind a code.
#[utoipa::path(
    post,
    path = "/join/{code}",
    tag = "join",
    params(("code" = String, Path, description = "Six character join code, case-insensitive")),
    request_body = JoinRequest,
    responses(
        (status = 200, description = "Player admitted", body = JoinResponse),
        (status = 400, description = "Malformed code or name"),
        (status = 404, description = "Unknown join code"),
        (status = 409, description = "No host yet, session full or name taken")
    )
)]
pub async fn join_session(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<JoinRequest>>,
) -> Result<Json<JoinResponse>, AppError> {
    let session_id = lifecycle::join(&state, &code, &payload.player_name).await?;
    Ok(Json(JoinResponse {
        session_id,
        join_code: code.trim().to_ascii_uppercase(),
        player_name: normalize_player_name(&payload.player_name).unwrap_or_default(),
    }))
}

/// Record a navigation hop; reaching the target ends the race.
#[utoipa::path(
    post,
    path = "/join/{code}/visits",
    tag = "join",
    params(("code" = String, Path, description = "Six character join code, case-insensitive")),
    request_body = VisitRequest,
    responses(
        (status = 200, description = "Visit recorded", body = VisitResponse),
        (status = 404, description = "Unknown join code or player"),
        (status = 409, description = "Race is not in progress")
    )
)]
pub async fn record_visit(
    State(state): State<SharedState>,
    Path(code): Path<String>,
    Valid(Json(payload)): Valid<Json<VisitRequest>>,
) -> Result<Json<VisitResponse>, AppError> {
    let outcome =
        trail::record_visit(&state, &code, &payload.player_name, &payload.topic).await?;
    Ok(Json(VisitResponse {
        outcome: outcome.into(),
    }))
}

/// Winner of the race, once committed.
#[utoipa::path(
    get,
    path = "/join/{code}/winner",
    tag = "join",
    params(("code" = String, Path, description = "Six character join code, case-insensitive")),
    responses(
        (status = 200, description = "Winner", body = WinnerResponse),
        (status = 404, description = "Unknown join code")
    )
)]
pub async fn race_winner(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<WinnerResponse>, AppError> {
    let winner = trail::get_winner(&state, &code).await?;
    Ok(Json(WinnerResponse { winner }))
}

/// Every roster member's trail in roster order.
#[utoipa::path(
    get,
    path = "/join/{code}/trails",
    tag = "join",
    params(("code" = String, Path, description = "Six character join code, case-insensitive")),
    responses(
        (status = 200, description = "Trails", body = TrailsResponse),
        (status = 404, description = "Unknown join code")
    )
)]
pub async fn race_trails(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<TrailsResponse>, AppError> {
    let trails = trail::get_all_trails(&state, &code).await?;
    Ok(Json(TrailsResponse { trails }))
}

/// Topics, winner and trails in one read.
#[utoipa::path(
    get,
    path = "/join/{code}/summary",
    tag = "join",
    params(("code" = String, Path, description = "Six character join code, case-insensitive")),
    responses(
        (status = 200, description = "Race summary", body = SummaryResponse),
        (status = 404, description = "Unknown join code")
    )
)]
pub async fn race_summary(
    State(state): State<SharedState>,
    Path(code): Path<String>,
) -> Result<Json<SummaryResponse>, AppError> {
    let summary = trail::get_summary(&state, &code).await?;
    Ok(Json(summary.into()))
}
