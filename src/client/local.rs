use futures::future::BoxFuture;
use indexmap::IndexMap;

use crate::{
    client::{SessionContext, SessionReader},
    error::ServiceError,
    services::{lifecycle, trail},
    state::{SharedState, session::TopicPair, state_machine::SessionPhase},
};

/// Reader calling the services of an in-process [`SharedState`].
#[derive(Clone)]
pub struct LocalReader {
    state: SharedState,
}

impl LocalReader {
    /// Read through `state`.
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }
}

impl SessionReader for LocalReader {
    fn phase(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<SessionPhase, ServiceError>> {
        let state = self.state.clone();
        let session_id = context.session_id;
        Box::pin(async move { lifecycle::get_phase(&state, session_id).await })
    }

    fn roster(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Vec<String>, ServiceError>> {
        let state = self.state.clone();
        let session_id = context.session_id;
        Box::pin(async move {
            let roster = lifecycle::get_roster(&state, session_id).await?;
            Ok(roster.into_iter().collect())
        })
    }

    fn topics(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<TopicPair>, ServiceError>> {
        let state = self.state.clone();
        let session_id = context.session_id;
        Box::pin(async move { lifecycle::get_topics(&state, session_id).await })
    }

    fn winner(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<Option<String>, ServiceError>> {
        let state = self.state.clone();
        let code = context.join_code.clone();
        Box::pin(async move { trail::get_winner(&state, code.as_str()).await })
    }

    fn trails(
        &self,
        context: &SessionContext,
    ) -> BoxFuture<'static, Result<IndexMap<String, Vec<String>>, ServiceError>> {
        let state = self.state.clone();
        let code = context.join_code.clone();
        Box::pin(async move { trail::get_all_trails(&state, code.as_str()).await })
    }
}
