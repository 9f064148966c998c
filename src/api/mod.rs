//! Access to the services behind the ledger: the record store, the allow-list and the identity
//! provider.
//!
//! Each service is a trait with two implementations. The remote ones talk to Firebase (Firestore
//! for data, Identity Toolkit for sign-in). The offline ones keep everything in memory and are
//! seeded with sample data so the whole program can run top-to-bottom without any network access.
//! `Mode` picks one set, once, at startup.

mod document;
mod files;
mod firestore;
mod identity;
mod memory;
mod oauth;

use crate::gate::AllowList;
use crate::model::{Record, RecordFields, RecordId, RecordPatch};
use crate::{Config, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

pub(crate) use firestore::{FirestoreAllowList, FirestoreClient, FirestoreLedger};
pub(crate) use identity::{FirebaseIdentity, TestIdentity};
pub(crate) use memory::{MemoryAllowList, MemoryLedger};

/// When this environment variable is set to anything non-empty the program runs offline.
pub const OFFLINE_ENV: &str = "LEDGER_OFFLINE";

/// The email of the identity used when running offline.
pub const TEST_EMAIL: &str = "admin@example.com";

/// The display name of the identity used when running offline.
pub const TEST_DISPLAY_NAME: &str = "測試管理員";

/// Which set of backing services to use.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Firestore, Firebase sign-in and the remote allow-list.
    Remote,
    /// In-memory seeded records, a fixed test identity and a fixed allow-list.
    #[default]
    Offline,
}

serde_plain::derive_display_from_serialize!(Mode);
serde_plain::derive_fromstr_from_deserialize!(Mode);

impl Mode {
    /// Offline when `LEDGER_OFFLINE` is set and non-empty, or when the Firebase configuration is
    /// incomplete. Remote otherwise.
    pub fn select(config: &Config) -> Self {
        let forced = std::env::var(OFFLINE_ENV)
            .map(|v| !v.is_empty())
            .unwrap_or(false);
        Self::choose(forced, config.firebase().is_configured())
    }

    fn choose(offline_forced: bool, firebase_configured: bool) -> Self {
        if offline_forced {
            debug!("{OFFLINE_ENV} is set, running offline");
            Mode::Offline
        } else if firebase_configured {
            Mode::Remote
        } else {
            debug!("Firebase is not configured, running offline");
            Mode::Offline
        }
    }
}

/// A signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct User {
    pub email: String,
    pub display_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub photo_url: Option<String>,
}

/// The current sign-in: who it is and, for remote services, the bearer token to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    user: User,
    token: Option<String>,
}

impl Session {
    pub fn new(user: User, token: Option<String>) -> Self {
        Self { user, token }
    }

    pub(crate) fn test() -> Self {
        Self::new(
            User {
                email: TEST_EMAIL.to_string(),
                display_name: TEST_DISPLAY_NAME.to_string(),
                photo_url: None,
            },
            None,
        )
    }

    pub fn user(&self) -> &User {
        &self.user
    }

    pub fn email(&self) -> &str {
        &self.user.email
    }

    pub(crate) fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }
}

/// What became of a batch of new records.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct BatchOutcome {
    /// Ids of the records that were stored, in input order.
    pub created: Vec<RecordId>,
    /// How many records were refused.
    pub rejected: usize,
}

/// The record store.
///
/// `list_all` returns every record ordered by date, newest first, with equal dates keeping their
/// stored order. Mutations return only once the store has accepted them. Callers reload with
/// `list_all` rather than patching their own copy.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// All records, newest first.
    async fn list_all(&mut self) -> Result<Vec<Record>>;

    /// Stores a new record and returns its fresh id.
    async fn create(&mut self, fields: RecordFields) -> Result<RecordId>;

    /// Replaces the fields present in `patch`. `NotFound` if there is no record with `id`.
    async fn update(&mut self, id: &RecordId, patch: RecordPatch) -> Result<()>;

    /// Removes a record. `NotFound` if there is no record with `id`.
    async fn delete(&mut self, id: &RecordId) -> Result<()>;

    /// Stores many records. See the implementations for their atomicity.
    async fn batch_create(&mut self, records: Vec<RecordFields>) -> Result<BatchOutcome>;

    /// Tells the store who is signed in.
    async fn set_session(&mut self, _session: Option<&Session>) {}
}

/// Signs users in and out.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// The session left over from an earlier run, if it is still usable.
    async fn restore(&mut self) -> Result<Option<Session>>;

    /// Runs the interactive sign-in.
    async fn sign_in(&mut self) -> Result<Session>;

    /// Forgets the current session.
    async fn sign_out(&mut self) -> Result<()>;
}

/// One set of backing services.
pub(crate) struct Backends {
    pub(crate) ledger: Box<dyn Ledger>,
    pub(crate) allow_list: Arc<dyn AllowList>,
    pub(crate) identity: Box<dyn IdentityProvider>,
}

impl Backends {
    /// Builds the services for `mode`. Nothing is contacted until the first call.
    pub(crate) fn new(config: &Config, mode: Mode) -> Result<Self> {
        match mode {
            Mode::Offline => Ok(Self::offline()),
            Mode::Remote => {
                let client = FirestoreClient::new(config.firebase())?;
                Ok(Self {
                    ledger: Box::new(FirestoreLedger::new(client.clone(), config.collection())),
                    allow_list: Arc::new(FirestoreAllowList::new(client)),
                    identity: Box::new(FirebaseIdentity::new(config)?),
                })
            }
        }
    }

    pub(crate) fn offline() -> Self {
        Self {
            ledger: Box::new(MemoryLedger::default()),
            allow_list: Arc::new(MemoryAllowList::default()),
            identity: Box::new(TestIdentity::default()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_choice() {
        assert_eq!(Mode::choose(true, true), Mode::Offline);
        assert_eq!(Mode::choose(false, true), Mode::Remote);
        assert_eq!(Mode::choose(false, false), Mode::Offline);
    }

    #[test]
    fn test_mode_display() {
        assert_eq!(Mode::Remote.to_string(), "remote");
        assert_eq!("offline".parse::<Mode>().unwrap(), Mode::Offline);
    }

    #[test]
    fn test_session_hides_token_in_user() {
        let session = Session::new(
            User {
                email: "a@example.com".into(),
                display_name: "A".into(),
                photo_url: None,
            },
            Some("secret".into()),
        );
        let json = serde_json::to_string(session.user()).unwrap();
        assert!(!json.contains("secret"));
        assert_eq!(session.token(), Some("secret"));
    }
}
