//! Implements the `Ledger` and `AllowList` traits with the Firestore REST API.
//!
//! Every request carries the project's API key. When a session is active its Firebase ID token is
//! sent as a bearer token so that the database's security rules see the signed-in user.

use crate::api::document::{
    encode_fields, encode_patch, CommitRequest, Document, ErrorEnvelope, RunQueryResponse, Write,
    CREATED_BY,
};
use crate::api::{BatchOutcome, Ledger, Session};
use crate::config::FirebaseConfig;
use crate::error::{Error, ErrorType, IntoResult};
use crate::gate::AllowList;
use crate::model::{Record, RecordFields, RecordId, RecordPatch};
use crate::Result;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, trace, warn};

const FIRESTORE_URL: &str = "https://firestore.googleapis.com/v1";
/// When set to `host:port`, requests go to a local Firestore emulator instead.
const EMULATOR_ENV: &str = "FIRESTORE_EMULATOR_HOST";
const SETTINGS: &str = "settings";
const ALLOWED_EMAILS: &str = "allowedEmails";
const UNKNOWN_CREATOR: &str = "unknown";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Firestore refuses commits with more writes than this.
const MAX_BATCH: usize = 500;

/// A thin Firestore REST client. Clones share the same session.
#[derive(Debug, Clone)]
pub(crate) struct FirestoreClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    api_key: String,
    session: Arc<RwLock<Option<Session>>>,
}

impl FirestoreClient {
    pub(crate) fn new(firebase: &FirebaseConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .pub_result(ErrorType::Internal)?;
        let client = Self {
            http,
            base_url: FIRESTORE_URL.to_string(),
            project_id: firebase.project_id.clone(),
            api_key: firebase.api_key.clone(),
            session: Arc::new(RwLock::new(None)),
        };
        match std::env::var(EMULATOR_ENV) {
            Ok(host) if !host.trim().is_empty() => {
                debug!("Using the Firestore emulator at {host}");
                Ok(client.with_base_url(format!("http://{}/v1", host.trim())))
            }
            _ => Ok(client),
        }
    }

    /// Points the client at another server, e.g. the Firestore emulator.
    pub(crate) fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub(crate) async fn set_session(&self, session: Option<Session>) {
        *self.session.write().await = session;
    }

    async fn email(&self) -> Option<String> {
        self.session
            .read()
            .await
            .as_ref()
            .map(|s| s.email().to_string())
    }

    /// `projects/{p}/databases/(default)/documents`
    fn documents_root(&self) -> String {
        format!("projects/{}/databases/(default)/documents", self.project_id)
    }

    fn document_name(&self, collection: &str, id: &str) -> String {
        format!("{}/{collection}/{id}", self.documents_root())
    }

    async fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{path}", self.base_url);
        let builder = self
            .http
            .request(method, url)
            .query(&[("key", self.api_key.as_str())]);
        match self.session.read().await.as_ref().and_then(Session::token) {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send<R>(&self, builder: reqwest::RequestBuilder, what: &str) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let response = builder
            .send()
            .await
            .map_err(|e| {
                anyhow::anyhow!("Unable to reach Firestore to {what}: {}", e.without_url())
            })
            .pub_result(ErrorType::StoreUnavailable)?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| {
                anyhow::anyhow!(
                    "Unable to read the Firestore response to {what}: {}",
                    e.without_url()
                )
            })
            .pub_result(ErrorType::StoreUnavailable)?;
        trace!("Firestore {what} returned {status}");
        if !status.is_success() {
            let detail = ErrorEnvelope::parse(&body);
            let error_type = classify(status, detail.as_ref().map(|d| d.status.as_str()));
            let message = detail.map(|d| d.message).unwrap_or(body);
            return Err(Error::msg(
                error_type,
                format!("Firestore failed to {what} with status {status}: {message}"),
            ));
        }
        serde_json::from_str(&body)
            .map_err(|e| anyhow::anyhow!("Unable to parse the Firestore response to {what}: {e}"))
            .pub_result(ErrorType::StoreUnavailable)
    }

    async fn post<B, R>(&self, path: &str, body: &B, what: &str) -> Result<R>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let builder = self.request(reqwest::Method::POST, path).await.json(body);
        self.send(builder, what).await
    }

    async fn get_document(&self, collection: &str, id: &str) -> Result<Document> {
        let path = self.document_name(collection, id);
        let builder = self.request(reqwest::Method::GET, &path).await;
        self.send(builder, &format!("read {collection}/{id}")).await
    }

    async fn commit(&self, writes: Vec<Write>, what: &str) -> Result<()> {
        let path = format!("{}:commit", self.documents_root());
        let _: serde_json::Value = self.post(&path, &CommitRequest { writes }, what).await?;
        Ok(())
    }

    async fn run_query(&self, collection: &str) -> Result<Vec<Document>> {
        let path = format!("{}:runQuery", self.documents_root());
        let query = json!({
            "structuredQuery": {
                "from": [{ "collectionId": collection }],
                "orderBy": [{ "field": { "fieldPath": "date" }, "direction": "DESCENDING" }]
            }
        });
        let items: Vec<RunQueryResponse> = self
            .post(&path, &query, &format!("list {collection}"))
            .await?;
        Ok(items.into_iter().filter_map(|i| i.document).collect())
    }
}

/// Maps a failed response to an error type: missing documents are `NotFound`, refusals are
/// `Unauthorized` and everything else is `StoreUnavailable`.
pub(crate) fn classify(status: StatusCode, rpc_status: Option<&str>) -> ErrorType {
    match (status, rpc_status) {
        (StatusCode::NOT_FOUND, _) | (_, Some("NOT_FOUND")) => ErrorType::NotFound,
        (StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN, _)
        | (_, Some("PERMISSION_DENIED" | "UNAUTHENTICATED")) => ErrorType::Unauthorized,
        _ => ErrorType::StoreUnavailable,
    }
}

/// A `Ledger` backed by one Firestore collection.
#[derive(Debug, Clone)]
pub(crate) struct FirestoreLedger {
    client: FirestoreClient,
    collection: String,
}

impl FirestoreLedger {
    pub(crate) fn new(client: FirestoreClient, collection: impl Into<String>) -> Self {
        Self {
            client,
            collection: collection.into(),
        }
    }

    /// The document for a new record, stamped with the creator.
    async fn new_document(&self, id: &RecordId, fields: &RecordFields) -> Document {
        let mut values = encode_fields(fields);
        let creator = self
            .client
            .email()
            .await
            .unwrap_or_else(|| UNKNOWN_CREATOR.to_string());
        values.insert(CREATED_BY.to_string(), super::document::Value::string(creator));
        Document::new(
            self.client.document_name(&self.collection, id.as_str()),
            values,
        )
    }

    /// A NotFound from a write with an `exists` precondition means the record is gone.
    fn not_found(id: &RecordId, e: Error) -> Error {
        if e.is_not_found() {
            Error::not_found(id)
        } else {
            e
        }
    }
}

#[async_trait]
impl Ledger for FirestoreLedger {
    async fn list_all(&mut self) -> Result<Vec<Record>> {
        let documents = self.client.run_query(&self.collection).await?;
        let mut records = Vec::with_capacity(documents.len());
        for document in documents {
            match document.to_record() {
                Ok(record) => records.push(record),
                Err(e) => warn!("Skipping an unreadable document: {e:#}"),
            }
        }
        // Stored dates may mix formats, so order again by the parsed date
        records.sort_by(|a, b| b.date().cmp(&a.date()));
        debug!("Listed {} records from Firestore", records.len());
        Ok(records)
    }

    async fn create(&mut self, mut fields: RecordFields) -> Result<RecordId> {
        fields.normalize();
        fields.validate()?;
        let id = RecordId::generate();
        let document = self.new_document(&id, &fields).await;
        self.client
            .commit(vec![Write::create(document)], "create a record")
            .await?;
        debug!("Created record {id} in Firestore");
        Ok(id)
    }

    async fn update(&mut self, id: &RecordId, mut patch: RecordPatch) -> Result<()> {
        patch.normalize();
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::invalid("A record needs a non-empty name"));
        }
        let document = Document::new(
            self.client.document_name(&self.collection, id.as_str()),
            encode_patch(&patch),
        );
        let mask = patch.field_names().into_iter().map(String::from).collect();
        self.client
            .commit(vec![Write::patch(document, mask)], "update a record")
            .await
            .map_err(|e| Self::not_found(id, e))?;
        debug!("Updated record {id} in Firestore");
        Ok(())
    }

    async fn delete(&mut self, id: &RecordId) -> Result<()> {
        let name = self.client.document_name(&self.collection, id.as_str());
        self.client
            .commit(vec![Write::delete(name)], "delete a record")
            .await
            .map_err(|e| Self::not_found(id, e))?;
        debug!("Deleted record {id} from Firestore");
        Ok(())
    }

    /// All or nothing: every record is validated before a single atomic commit.
    async fn batch_create(&mut self, mut records: Vec<RecordFields>) -> Result<BatchOutcome> {
        records.iter_mut().for_each(RecordFields::normalize);
        let invalid = records.iter().filter(|r| r.validate().is_err()).count();
        if invalid > 0 {
            return Err(Error::invalid(format!(
                "{invalid} of {} records have no name, nothing was imported",
                records.len()
            )));
        }
        if records.len() > MAX_BATCH {
            return Err(Error::invalid(format!(
                "At most {MAX_BATCH} records can be imported at once, got {}",
                records.len()
            )));
        }
        if records.is_empty() {
            return Ok(BatchOutcome::default());
        }

        let mut created = Vec::with_capacity(records.len());
        let mut writes = Vec::with_capacity(records.len());
        for fields in &records {
            let id = RecordId::generate();
            writes.push(Write::create(self.new_document(&id, fields).await));
            created.push(id);
        }
        self.client.commit(writes, "import records").await?;
        debug!("Imported {} records into Firestore", created.len());
        Ok(BatchOutcome {
            created,
            rejected: 0,
        })
    }

    async fn set_session(&mut self, session: Option<&Session>) {
        self.client.set_session(session.cloned()).await;
    }
}

/// The allow-list stored in `settings/allowedEmails` as `{emails: [string]}`. A missing document
/// is an empty list.
#[derive(Debug, Clone)]
pub(crate) struct FirestoreAllowList {
    client: FirestoreClient,
}

impl FirestoreAllowList {
    pub(crate) fn new(client: FirestoreClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AllowList for FirestoreAllowList {
    async fn fetch(&self) -> Result<Vec<String>> {
        match self.client.get_document(SETTINGS, ALLOWED_EMAILS).await {
            Ok(document) => Ok(document
                .get("emails")
                .map(|v| v.as_strings())
                .unwrap_or_default()),
            Err(e) if e.is_not_found() => {
                debug!("There is no allow-list document, nobody is allowed");
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }
}
