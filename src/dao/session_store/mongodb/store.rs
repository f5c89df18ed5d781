use std::sync::Arc;

use futures::future::BoxFuture;
use mongodb::{
    Collection, Database, IndexModel,
    bson::{Document, doc},
    options::IndexOptions,
};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{
    config::MongoConfig,
    connection::establish_connection,
    error::{MongoDaoError, MongoResult},
    models::{
        MongoSessionDocument, ROSTER_FIELD, conditional_filter, doc_id, set_document, trail_path,
    },
};
use crate::dao::{
    models::{ArrayField, SessionCondition, SessionEntity, SessionPatch},
    session_store::SessionStore,
    storage::StorageResult,
};

const SESSION_COLLECTION_NAME: &str = "sessions";

/// Session store backed by the `sessions` MongoDB collection.
#[derive(Clone)]
pub struct MongoSessionStore {
    inner: Arc<MongoInner>,
}

struct MongoInner {
    database: RwLock<Database>,
    config: MongoConfig,
}

impl MongoInner {
    async fn ping(&self) -> MongoResult<()> {
        let database = self.database.read().await.clone();

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|source| MongoDaoError::HealthPing { source })?;
        Ok(())
    }

    async fn reconnect(&self) -> MongoResult<()> {
        let (_client, database) =
            establish_connection(&self.config.options, &self.config.database_name).await?;
        *self.database.write().await = database;
        Ok(())
    }
}

impl MongoSessionStore {
    /// Establish a connection to MongoDB and ensure indexes are present.
    pub async fn connect(config: MongoConfig) -> MongoResult<Self> {
        let (_client, database) =
            establish_connection(&config.options, &config.database_name).await?;

        let inner = Arc::new(MongoInner {
            database: RwLock::new(database),
            config,
        });

        let store = Self { inner };
        store.ensure_indexes().await?;
        Ok(store)
    }

    async fn ensure_indexes(&self) -> MongoResult<()> {
        // Not unique: join code uniqueness is checked by the caller before the
        // code is assigned.
        let index = IndexModel::builder()
            .keys(doc! {"join_code": 1})
            .options(
                IndexOptions::builder()
                    .name(Some("session_join_code_idx".to_owned()))
                    .sparse(Some(true))
                    .build(),
            )
            .build();

        self.collection()
            .await
            .create_index(index)
            .await
            .map_err(|source| MongoDaoError::EnsureIndex {
                collection: SESSION_COLLECTION_NAME,
                index: "join_code",
                source,
            })?;

        Ok(())
    }

    async fn collection(&self) -> Collection<MongoSessionDocument> {
        let guard = self.inner.database.read().await;
        guard.collection::<MongoSessionDocument>(SESSION_COLLECTION_NAME)
    }

    async fn create(&self, session: SessionEntity) -> MongoResult<Uuid> {
        let id = session.id;
        let document: MongoSessionDocument = session.into();
        self.collection()
            .await
            .insert_one(&document)
            .await
            .map_err(|source| MongoDaoError::CreateSession { id, source })?;
        Ok(id)
    }

    async fn get(&self, id: Uuid) -> StorageResult<Option<SessionEntity>> {
        let document = self
            .collection()
            .await
            .find_one(doc_id(id))
            .await
            .map_err(|source| MongoDaoError::LoadSession { id, source })?;

        document.map(SessionEntity::try_from).transpose()
    }

    async fn update(
        &self,
        id: Uuid,
        condition: Option<SessionCondition>,
        patch: SessionPatch,
    ) -> MongoResult<bool> {
        let filter = match condition {
            Some(condition) => conditional_filter(id, condition),
            None => doc_id(id),
        };
        let result = self
            .collection()
            .await
            .update_one(filter, set_document(&patch))
            .await
            .map_err(|source| MongoDaoError::UpdateSession { id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn append(&self, id: Uuid, field: ArrayField, value: String) -> MongoResult<bool> {
        let mut target = Document::new();
        let operator = match field {
            ArrayField::Roster => {
                target.insert(ROSTER_FIELD, value);
                "$addToSet"
            }
            ArrayField::Trail { player } => {
                target.insert(trail_path(&player), value);
                "$push"
            }
        };
        let mut update = doc! {"$currentDate": { "updated_at": true }};
        update.insert(operator, target);
        let result = self
            .collection()
            .await
            .update_one(doc_id(id), update)
            .await
            .map_err(|source| MongoDaoError::UpdateSession { id, source })?;
        Ok(result.matched_count > 0)
    }

    async fn find_by_join_code(&self, code: String) -> MongoResult<Option<Uuid>> {
        let document = self
            .collection()
            .await
            .find_one(doc! {"join_code": code.as_str()})
            .await
            .map_err(|source| MongoDaoError::FindJoinCode {
                code: code.clone(),
                source,
            })?;

        Ok(document.and_then(|document| {
            SessionEntity::try_from(document)
                .ok()
                .map(|session| session.id)
        }))
    }
}

impl SessionStore for MongoSessionStore {
    fn create(&self, session: SessionEntity) -> BoxFuture<'static, StorageResult<Uuid>> {
        let store = self.clone();
        Box::pin(async move { store.create(session).await.map_err(Into::into) })
    }

    fn get(&self, id: Uuid) -> BoxFuture<'static, StorageResult<Option<SessionEntity>>> {
        let store = self.clone();
        Box::pin(async move { store.get(id).await })
    }

    fn update(&self, id: Uuid, patch: SessionPatch) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.update(id, None, patch).await.map_err(Into::into) })
    }

    fn conditional_update(
        &self,
        id: Uuid,
        condition: SessionCondition,
        patch: SessionPatch,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move {
            store
                .update(id, Some(condition), patch)
                .await
                .map_err(Into::into)
        })
    }

    fn append(
        &self,
        id: Uuid,
        field: ArrayField,
        value: String,
    ) -> BoxFuture<'static, StorageResult<bool>> {
        let store = self.clone();
        Box::pin(async move { store.append(id, field, value).await.map_err(Into::into) })
    }

    fn find_by_join_code(&self, code: String) -> BoxFuture<'static, StorageResult<Option<Uuid>>> {
        let store = self.clone();
        Box::pin(async move { store.find_by_join_code(code).await.map_err(Into::into) })
    }

    fn health_check(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.ping().await.map_err(Into::into) })
    }

    fn try_reconnect(&self) -> BoxFuture<'static, StorageResult<()>> {
        let store = self.clone();
        Box::pin(async move { store.inner.reconnect().await.map_err(Into::into) })
    }
}
