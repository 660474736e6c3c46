//! Record service - the encrypted record pipeline
//!
//! Private payloads are sealed under a fresh key, pushed to the content store
//! and referenced from the row by content id. Public payloads stay inline.
//! The content store is written first and the row second; there is no
//! transaction spanning the two.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::config::StoreFailurePolicy;
use crate::content_store::ContentStore;
use crate::crypto::{self, RecordKey};
use crate::db::records::{self, PayloadStorage, RecordChanges, RecordRow};
use crate::db::Database;
use crate::error::WelltickError;
use crate::models::{RecordCategory, Visibility};

use super::auth_service::AuthUser;

/// What happened to a record's payload on the way out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PayloadStatus {
    /// Payload included
    Present,
    /// A payload is stored but this response does not carry it
    Withheld,
    /// No payload stored
    Absent,
    /// Content store could not be reached
    Unavailable,
    /// Sealed payload failed its integrity check
    Corrupted,
}

/// Outbound projection of a record. Never carries the content id or key.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordView {
    pub id: String,
    pub category: RecordCategory,
    pub title: String,
    pub description: Option<String>,
    pub payload: Option<Value>,
    pub visibility: Visibility,
    pub payload_status: PayloadStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RecordView {
    fn new(row: RecordRow, payload: Option<Value>, payload_status: PayloadStatus) -> Self {
        Self {
            id: row.id,
            category: row.category,
            title: row.title,
            description: row.description,
            payload,
            visibility: row.visibility,
            payload_status,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }

    /// View that never touches the content store: inline payloads are
    /// returned, sealed ones are withheld
    fn without_fetch(row: RecordRow) -> Self {
        match row.storage.clone() {
            PayloadStorage::Empty => Self::new(row, None, PayloadStatus::Absent),
            PayloadStorage::Inline(value) => Self::new(row, Some(value), PayloadStatus::Present),
            PayloadStorage::Sealed { .. } => Self::new(row, None, PayloadStatus::Withheld),
        }
    }

    /// Listing view: payloads are never included
    fn summary(row: RecordRow) -> Self {
        let status = match row.storage {
            PayloadStorage::Empty => PayloadStatus::Absent,
            _ => PayloadStatus::Withheld,
        };
        Self::new(row, None, status)
    }
}

/// Body of a create request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateRecordInput {
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, alias = "data")]
    pub payload: Option<Value>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

/// Body of a partial update.
///
/// For `description` and `payload` an absent field leaves the value alone and
/// an explicit `null` clears it.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateRecordInput {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default, deserialize_with = "present")]
    pub description: Option<Option<String>>,
    #[serde(default, alias = "data", deserialize_with = "present")]
    pub payload: Option<Option<Value>>,
    #[serde(default)]
    pub visibility: Option<Visibility>,
}

fn present<'de, T, D>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Query string of a list request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordListQuery {
    #[serde(default, alias = "type")]
    pub category: Option<String>,
    #[serde(default)]
    pub limit: Option<u32>,
    #[serde(default)]
    pub offset: Option<u32>,
}

fn not_found() -> WelltickError {
    WelltickError::NotFound("Health record not found".into())
}

fn validate_title(title: &str) -> Result<String, WelltickError> {
    let title = title.trim();
    if title.is_empty() {
        return Err(WelltickError::InvalidInput("Title must not be empty".into()));
    }
    Ok(title.to_string())
}

/// Record service
pub struct RecordService {
    db: Arc<Database>,
    store: Arc<dyn ContentStore>,
    on_store_failure: StoreFailurePolicy,
}

impl RecordService {
    pub fn new(
        db: Arc<Database>,
        store: Arc<dyn ContentStore>,
        on_store_failure: StoreFailurePolicy,
    ) -> Self {
        Self {
            db,
            store,
            on_store_failure,
        }
    }

    // =========================================================================
    // Write Operations
    // =========================================================================

    /// Create a record for `owner`
    pub async fn create(
        &self,
        owner: &AuthUser,
        input: CreateRecordInput,
    ) -> Result<RecordView, WelltickError> {
        let category: RecordCategory = input
            .category
            .as_deref()
            .ok_or_else(|| WelltickError::InvalidInput("Category and title are required".into()))?
            .parse()?;
        let title = validate_title(input.title.as_deref().unwrap_or_default())?;
        let visibility = input.visibility.unwrap_or_default();

        let storage = match input.payload {
            Some(payload) => self.store_payload(payload, visibility).await?,
            None => PayloadStorage::Empty,
        };

        let row = self.db.with_conn(|conn| {
            records::insert_record(
                conn,
                records::NewRecord {
                    owner_id: owner.id.clone(),
                    category,
                    title,
                    description: input.description,
                    visibility,
                    storage,
                },
            )
        })?;

        info!(id = %row.id, category = %row.category, visibility = row.visibility.as_str(), "Created health record");

        Ok(RecordView::without_fetch(row))
    }

    /// Apply a partial update
    pub async fn update(
        &self,
        owner: &AuthUser,
        id: &str,
        input: UpdateRecordInput,
    ) -> Result<RecordView, WelltickError> {
        let current = self
            .db
            .with_conn(|conn| records::get_record(conn, &owner.id, id))?
            .ok_or_else(not_found)?;

        let title = input.title.as_deref().map(validate_title).transpose()?;
        let visibility = input.visibility.unwrap_or(current.visibility);

        let storage = match input.payload {
            Some(Some(payload)) => {
                self.replace_payload(payload, &current.storage, visibility)
                    .await?
            }
            Some(None) => Some(PayloadStorage::Empty),
            None if visibility != current.visibility => {
                self.move_payload(&current.storage, visibility).await?
            }
            None => None,
        };

        let changes = RecordChanges {
            title,
            description: input.description,
            visibility: input.visibility,
            storage,
        };

        let row = self
            .db
            .with_conn(|conn| records::update_record(conn, &owner.id, id, &changes))?
            .ok_or_else(not_found)?;

        info!(id = %row.id, visibility = row.visibility.as_str(), "Updated health record");

        Ok(RecordView::without_fetch(row))
    }

    /// Delete a record's row. A sealed blob is left in the content store.
    pub fn delete(&self, owner: &AuthUser, id: &str) -> Result<(), WelltickError> {
        let deleted = self
            .db
            .with_conn(|conn| records::delete_record(conn, &owner.id, id))?;

        if !deleted {
            return Err(not_found());
        }

        info!(id = %id, "Deleted health record");
        Ok(())
    }

    // =========================================================================
    // Read Operations
    // =========================================================================

    /// Fetch a record with its payload.
    ///
    /// Store outages and integrity failures do not fail the request; they show
    /// up as `payload: null` with a matching `payloadStatus`.
    pub async fn get(&self, owner: &AuthUser, id: &str) -> Result<RecordView, WelltickError> {
        let row = self
            .db
            .with_conn(|conn| records::get_record(conn, &owner.id, id))?
            .ok_or_else(not_found)?;

        let (payload, status) = match &row.storage {
            PayloadStorage::Empty => (None, PayloadStatus::Absent),
            PayloadStorage::Inline(value) => (Some(value.clone()), PayloadStatus::Present),
            PayloadStorage::Sealed { content_id, key_hex } => {
                match self.open_sealed(content_id, key_hex).await {
                    Ok(value) => (Some(value), PayloadStatus::Present),
                    Err(
                        e @ (WelltickError::Integrity(_)
                        | WelltickError::HashMismatch { .. }
                        | WelltickError::Crypto(_)),
                    ) => {
                        error!(id = %row.id, error = %e, "Sealed payload failed integrity check");
                        (None, PayloadStatus::Corrupted)
                    }
                    Err(e) => {
                        warn!(id = %row.id, error = %e, "Sealed payload unavailable");
                        (None, PayloadStatus::Unavailable)
                    }
                }
            }
        };

        Ok(RecordView::new(row, payload, status))
    }

    /// List an owner's records without payloads, newest first
    pub fn list(
        &self,
        owner: &AuthUser,
        query: &RecordListQuery,
    ) -> Result<Vec<RecordView>, WelltickError> {
        let category = query
            .category
            .as_deref()
            .map(str::parse::<RecordCategory>)
            .transpose()?;

        let query = records::RecordQuery {
            category,
            limit: query.limit.unwrap_or(100),
            offset: query.offset.unwrap_or(0),
        };

        let rows = self
            .db
            .with_conn(|conn| records::list_records(conn, &owner.id, &query))?;

        Ok(rows.into_iter().map(RecordView::summary).collect())
    }

    // =========================================================================
    // Payload storage
    // =========================================================================

    /// Storage form for a newly supplied payload, applying the failure policy
    async fn store_payload(
        &self,
        payload: Value,
        visibility: Visibility,
    ) -> Result<PayloadStorage, WelltickError> {
        if !visibility.is_private() {
            return Ok(PayloadStorage::Inline(payload));
        }

        match self.seal(&payload).await {
            Ok(storage) => Ok(storage),
            Err(e) => match self.on_store_failure {
                StoreFailurePolicy::Reject => Err(e),
                StoreFailurePolicy::Degrade => {
                    warn!(error = %e, "Content store write failed, saving record without payload");
                    Ok(PayloadStorage::Empty)
                }
            },
        }
    }

    /// Storage form for a payload supplied on update.
    ///
    /// Under the degrade policy a failed write keeps the current storage
    /// (`None`) rather than clearing it. An inline payload cannot stay inline
    /// on a private record, so that case fails the update instead.
    async fn replace_payload(
        &self,
        payload: Value,
        current: &PayloadStorage,
        visibility: Visibility,
    ) -> Result<Option<PayloadStorage>, WelltickError> {
        if !visibility.is_private() {
            return Ok(Some(PayloadStorage::Inline(payload)));
        }

        match self.seal(&payload).await {
            Ok(storage) => Ok(Some(storage)),
            Err(e)
                if self.on_store_failure == StoreFailurePolicy::Degrade
                    && !matches!(current, PayloadStorage::Inline(_)) =>
            {
                warn!(error = %e, "Content store write failed, keeping current payload");
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    /// Seal a payload and push it to the content store
    async fn seal(&self, payload: &Value) -> Result<PayloadStorage, WelltickError> {
        let (key, sealed) = crypto::seal_json(payload)?;

        let content_id = self.store.put(&sealed).await.map_err(|e| match e {
            WelltickError::ContentStore(_) => e,
            other => WelltickError::ContentStore(other.to_string()),
        })?;

        debug!(content_id = %content_id, backend = self.store.backend_name(), "Stored sealed payload");

        Ok(PayloadStorage::Sealed {
            content_id,
            key_hex: key.to_hex(),
        })
    }

    /// Fetch and decrypt a sealed payload
    async fn open_sealed(&self, content_id: &str, key_hex: &str) -> Result<Value, WelltickError> {
        let key = RecordKey::from_hex(key_hex)?;
        let sealed = self.store.get(content_id).await?;
        crypto::open_json(&sealed, &key)
    }

    /// Move an existing payload into the storage form `target` requires.
    ///
    /// Store failures always fail the update here: the payload already
    /// exists, so the degrade policy does not apply.
    async fn move_payload(
        &self,
        storage: &PayloadStorage,
        target: Visibility,
    ) -> Result<Option<PayloadStorage>, WelltickError> {
        match (storage, target) {
            (PayloadStorage::Inline(value), Visibility::Private) => Ok(Some(self.seal(value).await?)),
            (PayloadStorage::Sealed { content_id, key_hex }, Visibility::Public) => {
                let value = self.open_sealed(content_id, key_hex).await?;
                Ok(Some(PayloadStorage::Inline(value)))
            }
            _ => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::content_store::LocalContentStore;
    use crate::db::users;
    use async_trait::async_trait;
    use serde_json::json;
    use tempfile::TempDir;

    struct DownStore;

    #[async_trait]
    impl ContentStore for DownStore {
        async fn put(&self, _data: &[u8]) -> crate::error::Result<String> {
            Err(WelltickError::ContentStore("connection refused".into()))
        }

        async fn get(&self, _id: &str) -> crate::error::Result<Vec<u8>> {
            Err(WelltickError::ContentStore("connection refused".into()))
        }

        fn backend_name(&self) -> &'static str {
            "down"
        }
    }

    fn owner(db: &Database) -> AuthUser {
        let user = db
            .with_conn(|c| users::create_user(c, "owner@example.com", "h"))
            .unwrap();
        AuthUser {
            id: user.id,
            email: user.email,
        }
    }

    async fn local_service(policy: StoreFailurePolicy) -> (RecordService, AuthUser, TempDir) {
        let dir = TempDir::new().unwrap();
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = owner(&db);
        let store = Arc::new(LocalContentStore::new(dir.path()).await.unwrap());
        (RecordService::new(db, store, policy), user, dir)
    }

    fn medication(payload: Value, visibility: Visibility) -> CreateRecordInput {
        CreateRecordInput {
            category: Some("medication".into()),
            title: Some("Lisinopril".into()),
            payload: Some(payload),
            visibility: Some(visibility),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_private_round_trip() {
        let (service, user, _dir) = local_service(StoreFailurePolicy::Reject).await;

        let created = service
            .create(&user, medication(json!({"dose": "10mg"}), Visibility::Private))
            .await
            .unwrap();
        assert_eq!(created.payload, None);
        assert_eq!(created.payload_status, PayloadStatus::Withheld);

        let row = service
            .db
            .with_conn(|c| records::get_record(c, &user.id, &created.id))
            .unwrap()
            .unwrap();
        assert!(row.storage.is_sealed());

        let fetched = service.get(&user, &created.id).await.unwrap();
        assert_eq!(fetched.payload, Some(json!({"dose": "10mg"})));
        assert_eq!(fetched.payload_status, PayloadStatus::Present);
    }

    #[tokio::test]
    async fn test_validation_happens_before_any_write() {
        let (service, user, _dir) = local_service(StoreFailurePolicy::Reject).await;

        let mut bad_category = medication(json!(1), Visibility::Private);
        bad_category.category = Some("surgery".into());
        assert!(matches!(
            service.create(&user, bad_category).await,
            Err(WelltickError::InvalidInput(_))
        ));

        let mut blank_title = medication(json!(1), Visibility::Private);
        blank_title.title = Some("   ".into());
        assert!(matches!(
            service.create(&user, blank_title).await,
            Err(WelltickError::InvalidInput(_))
        ));

        assert_eq!(service.db.stats().unwrap().record_count, 0);
    }

    #[tokio::test]
    async fn test_visibility_switch_moves_payload() {
        let (service, user, _dir) = local_service(StoreFailurePolicy::Reject).await;
        let created = service
            .create(&user, medication(json!({"dose": "5mg"}), Visibility::Private))
            .await
            .unwrap();

        let public = service
            .update(
                &user,
                &created.id,
                UpdateRecordInput {
                    visibility: Some(Visibility::Public),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(public.payload, Some(json!({"dose": "5mg"})));

        let private = service
            .update(
                &user,
                &created.id,
                UpdateRecordInput {
                    visibility: Some(Visibility::Private),
                    ..Default::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(private.payload_status, PayloadStatus::Withheld);

        let row = service
            .db
            .with_conn(|c| records::get_record(c, &user.id, &created.id))
            .unwrap()
            .unwrap();
        assert!(row.storage.is_sealed());
        assert_eq!(
            service.get(&user, &created.id).await.unwrap().payload,
            Some(json!({"dose": "5mg"}))
        );
    }

    #[tokio::test]
    async fn test_update_clears_and_replaces_fields() {
        let (service, user, _dir) = local_service(StoreFailurePolicy::Reject).await;
        let mut input = medication(json!("a"), Visibility::Public);
        input.description = Some("morning".into());
        let created = service.create(&user, input).await.unwrap();

        let input: UpdateRecordInput =
            serde_json::from_value(json!({"description": null, "data": "b"})).unwrap();
        let updated = service.update(&user, &created.id, input).await.unwrap();
        assert_eq!(updated.description, None);
        assert_eq!(updated.payload, Some(json!("b")));
        assert_eq!(updated.title, "Lisinopril");

        let empty_title = UpdateRecordInput {
            title: Some("".into()),
            ..Default::default()
        };
        assert!(service.update(&user, &created.id, empty_title).await.is_err());
    }

    #[tokio::test]
    async fn test_store_failure_policies() {
        let db = Arc::new(Database::open_in_memory().unwrap());
        let user = owner(&db);

        let reject = RecordService::new(db.clone(), Arc::new(DownStore), StoreFailurePolicy::Reject);
        let err = reject
            .create(&user, medication(json!(1), Visibility::Private))
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), hyper::StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(db.stats().unwrap().record_count, 0);

        let degrade = RecordService::new(db.clone(), Arc::new(DownStore), StoreFailurePolicy::Degrade);
        let created = degrade
            .create(&user, medication(json!(1), Visibility::Private))
            .await
            .unwrap();
        assert_eq!(created.payload_status, PayloadStatus::Absent);
        assert_eq!(db.stats().unwrap().record_count, 1);
    }

    #[tokio::test]
    async fn test_list_and_delete() {
        let (service, user, _dir) = local_service(StoreFailurePolicy::Reject).await;
        let created = service
            .create(&user, medication(json!(1), Visibility::Public))
            .await
            .unwrap();

        let listed = service.list(&user, &RecordListQuery::default()).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].payload, None);

        let bad = RecordListQuery {
            category: Some("x".into()),
            ..Default::default()
        };
        assert!(service.list(&user, &bad).is_err());

        service.delete(&user, &created.id).unwrap();
        assert!(matches!(
            service.delete(&user, &created.id),
            Err(WelltickError::NotFound(_))
        ));
    }
}
