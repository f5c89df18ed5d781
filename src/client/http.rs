use std::time::Duration;

use futures::future::BoxFuture;
use indexmap::IndexMap;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use uuid::Uuid;

use crate::{
    client::{SessionContext, SessionReader},
    dto::session::{
        HostSessionRequest, HostSessionResponse, JoinRequest, JoinResponse, PhaseResponse,
        RosterResponse, TopicsResponse, TrailsResponse, VisitOutcomeDto, VisitRequest,
        VisitResponse, WinnerResponse,
    },
    error::{ErrorBody, ServiceError},
    state::{session::TopicPair, state_machine::SessionPhase},
};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the REST API of a remote server.
///
/// Implements [`SessionReader`] for the poll loops and exposes the write
/// operations a player or host needs.
#[derive(Clone)]
pub struct HttpSessionClient {
    client: Client,
    base_url: String,
}

impl HttpSessionClient {
    /// Talk to the server at `base_url` (for example `http://localhost:8080`).
    pub fn new(base_url: impl Into<String>) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|err| ServiceError::Remote(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Host a new session.
    pub async fn host_session(
        &self,
        host_name: &str,
        max_players: Option<u32>,
    ) -> Result<HostSessionResponse, ServiceError> {
        let request = HostSessionRequest {
            host_name: host_name.to_owned(),
            max_players,
        };
        send(self.client.post(self.url("/sessions")).json(&request)).await
    }

    /// Join the session behind `code`.
    pub async fn join(&self, code: &str, player_name: &str) -> Result<JoinResponse, ServiceError> {
        let request = JoinRequest {
            player_name: player_name.to_owned(),
        };
        send(
            self.client
                .post(self.url(&format!("/join/{}", code.trim())))
                .json(&request),
        )
        .await
    }

    /// Start the race of a hosted session.
    pub async fn start(&self, session_id: Uuid) -> Result<TopicPair, ServiceError> {
        send(
            self.client
                .post(self.url(&format!("/sessions/{session_id}/start"))),
        )
        .await
    }

    /// Record a navigation hop.
    pub async fn record_visit(
        &self,
        context: &SessionContext,
        topic: &str,
    ) -> Result<VisitOutcomeDto, ServiceError> {
        let request = VisitRequest {
            player_name: context.player_name.clone(),
            topic: topic.to_owned(),
        };
        let response: VisitResponse = send(
            self.client
                .post(self.url(&format!("/join/{}/visits", context.join_code)))
                .json(&request),
        )
        .await?;
        Ok(response.outcome)
    }

    fn get<T>(&self, path: String) -> BoxFuture<'static, Result<T, ServiceError>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let request = self.client.get(self.url(&path));
        Box::pin(send(request))
    }
}

/// Send a request and decode its JSON body, mapping failures onto [`ServiceError`].
async fn send<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, ServiceError> {
    let response = request.send().await.map_err(transport_error)?;
    let status = response.status();
    if status.is_success() {
        return response.json().await.map_err(transport_error);
    }

    match response.json::<ErrorBody>().await {
        Ok(body) => Err(body.into_service_error()),
        Err(_) => Err(status_error(status)),
    }
}

/// Fallback for error responses without a JSON body.
fn status_error(status: StatusCode) -> ServiceError {
    let message = status.to_string();
    match status {
        StatusCode::NOT_FOUND => ServiceError::NotFound(message),
        StatusCode::BAD_REQUEST => ServiceError::InvalidInput(message),
        StatusCode::CONFLICT => ServiceError::InvalidState(message),
        StatusCode::SERVICE_UNAVAILABLE => ServiceError::Degraded,
        StatusCode::GATEWAY_TIMEOUT | StatusCode::REQUEST_TIMEOUT => ServiceError::Timeout,
        _ => ServiceError::Remote(message),
    }
}

fn transport_error(err: reqwest::Error) -> ServiceError {
    if err.is_timeout() {
        ServiceError::Timeout
    } else {
        ServiceError::Remote(err.to_string())
    }
}

impl SessionReader for HttpSessionClient {
    fn phase(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<SessionPhase, ServiceError>> {
        let response =
            self.get::<PhaseResponse>(format!("/sessions/{}/phase", context.session_id));
        Box::pin(async move { Ok(response.await?.phase) })
    }

    fn roster(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Vec<String>, ServiceError>> {
        let response =
            self.get::<RosterResponse>(format!("/sessions/{}/roster", context.session_id));
        Box::pin(async move { Ok(response.await?.players) })
    }

    fn topics(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<TopicPair>, ServiceError>> {
        let response =
            self.get::<TopicsResponse>(format!("/sessions/{}/topics", context.session_id));
        Box::pin(async move { Ok(response.await?.topics) })
    }

    fn winner(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<String>, ServiceError>> {
        let response = self.get::<WinnerResponse>(format!("/join/{}/winner", context.join_code));
        Box::pin(async move { Ok(response.await?.winner) })
    }

    fn trails(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<IndexMap<String, Vec<String>>, ServiceError>> {
        let response = self.get::<TrailsResponse>(format!("/join/{}/trails", context.join_code));
        Box::pin(async move { Ok(response.await?.trails) })
    }
}
