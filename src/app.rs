//! The application state.
//!
//! `App` owns the backing services chosen at startup, the current session, the full record list
//! and the filter criteria. Front-ends call into it and render `App::view`. Every mutation needs
//! an authorized session, goes to the store, and is followed by a full reload; the local list is
//! never patched in place.

use crate::api::{Backends, IdentityProvider, Ledger, Mode, Session, User};
use crate::codec;
use crate::error::Error;
use crate::filter::{Criteria, View};
use crate::gate::AccessGate;
use crate::model::{Record, RecordFields, RecordId, RecordPatch};
use crate::{Config, Result};
use serde::Serialize;
use tracing::{debug, info, warn};

/// What `App::import_csv` did with a file.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ImportSummary {
    /// Ids of the stored records.
    pub created: Vec<RecordId>,
    /// Rows dropped while decoding for lacking a valid date or a name.
    pub skipped: usize,
    /// Decoded rows that the store refused.
    pub rejected: usize,
}

impl ImportSummary {
    pub fn imported(&self) -> usize {
        self.created.len()
    }
}

pub struct App {
    mode: Mode,
    ledger: Box<dyn Ledger>,
    identity: Box<dyn IdentityProvider>,
    gate: AccessGate,
    session: Option<Session>,
    records: Vec<Record>,
    criteria: Criteria,
}

impl App {
    /// Builds the backing services for `mode`. Nothing is contacted yet.
    pub fn start(config: &Config, mode: Mode) -> Result<Self> {
        info!("Starting in {mode} mode");
        Ok(Self::with_backends(mode, Backends::new(config, mode)?))
    }

    pub(crate) fn with_backends(mode: Mode, backends: Backends) -> Self {
        Self {
            mode,
            ledger: backends.ledger,
            identity: backends.identity,
            gate: AccessGate::new(backends.allow_list),
            session: None,
            records: Vec::new(),
            criteria: Criteria::default(),
        }
    }

    /// An offline app with the seeded sample records.
    pub fn offline() -> Self {
        Self::with_backends(Mode::Offline, Backends::offline())
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn user(&self) -> Option<&User> {
        self.session.as_ref().map(Session::user)
    }

    /// Every loaded record, newest first.
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn criteria(&self) -> &Criteria {
        &self.criteria
    }

    /// Replaces the whole record list with a fresh one from the store.
    pub async fn reload(&mut self) -> Result<()> {
        self.records = self.ledger.list_all().await?;
        debug!("Loaded {} records", self.records.len());
        Ok(())
    }

    /// Picks up a session left by an earlier run. Offline, the test identity is signed in when
    /// there is none. The records are loaded once a session is established.
    pub async fn resume(&mut self) -> Result<()> {
        match self.identity.restore().await? {
            Some(session) => self.establish(session).await?,
            None if self.mode == Mode::Offline => {
                self.sign_in().await?;
            }
            None => debug!("There is no saved session"),
        }
        Ok(())
    }

    /// Runs the identity provider's sign-in and checks the result against the allow-list. A
    /// denied identity is signed out again before this returns `Unauthorized`.
    pub async fn sign_in(&mut self) -> Result<&Session> {
        let session = self.identity.sign_in().await?;
        self.establish(session).await?;
        self.session
            .as_ref()
            .ok_or_else(|| Error::unauthorized("The sign-in did not produce a session"))
    }

    pub async fn sign_out(&mut self) -> Result<()> {
        self.identity.sign_out().await?;
        self.clear_session().await;
        info!("Signed out");
        Ok(())
    }

    async fn establish(&mut self, session: Session) -> Result<()> {
        if !self.gate.is_authorized(session.email()).await {
            let email = session.email().to_string();
            warn!("{email} is not on the allow-list, signing out");
            if let Err(e) = self.identity.sign_out().await {
                warn!("Unable to sign out {email}: {e}");
            }
            self.clear_session().await;
            return Err(Error::unauthorized(format!(
                "{email} is not allowed to use this ledger"
            )));
        }
        self.ledger.set_session(Some(&session)).await;
        debug!("Signed in as {}", session.email());
        self.session = Some(session);
        self.reload().await
    }

    async fn clear_session(&mut self) {
        self.session = None;
        self.records.clear();
        self.ledger.set_session(None).await;
    }

    async fn require_session(&self) -> Result<()> {
        let Some(session) = &self.session else {
            return Err(Error::unauthorized(
                "Not signed in. Run 'ledger auth' (or call sign_in) first",
            ));
        };
        if !self.gate.is_authorized(session.email()).await {
            return Err(Error::unauthorized(format!(
                "{} is not allowed to change this ledger",
                session.email()
            )));
        }
        Ok(())
    }

    /// The store call has already succeeded when this runs, so a failed reload is only logged.
    async fn reload_after_write(&mut self) {
        if let Err(e) = self.reload().await {
            warn!("The change was saved but the records could not be reloaded: {e}");
        }
    }

    pub async fn add(&mut self, fields: RecordFields) -> Result<RecordId> {
        self.require_session().await?;
        let id = self.ledger.create(fields).await?;
        self.reload_after_write().await;
        Ok(id)
    }

    /// An empty patch is `Invalid` for a record that exists and `NotFound` otherwise.
    pub async fn edit(&mut self, id: &RecordId, patch: RecordPatch) -> Result<()> {
        self.require_session().await?;
        if patch.is_empty() {
            self.reload().await?;
            if !self.records.iter().any(|r| r.id() == id) {
                return Err(Error::not_found(id));
            }
            return Err(Error::invalid("There is nothing to update"));
        }
        self.ledger.update(id, patch).await?;
        self.reload_after_write().await;
        Ok(())
    }

    pub async fn remove(&mut self, id: &RecordId) -> Result<()> {
        self.require_session().await?;
        self.ledger.delete(id).await?;
        self.reload_after_write().await;
        Ok(())
    }

    /// Decodes CSV text and stores every accepted row in one batch. Rows without a valid date or a
    /// name are dropped and counted in `skipped`.
    pub async fn import_csv(&mut self, text: &str) -> Result<ImportSummary> {
        self.require_session().await?;
        let decoded = codec::decode(text)?;
        let outcome = self.ledger.batch_create(decoded.records).await?;
        self.reload_after_write().await;
        Ok(ImportSummary {
            created: outcome.created,
            skipped: decoded.skipped,
            rejected: outcome.rejected,
        })
    }

    /// The filtered records as CSV.
    pub fn export_csv(&self) -> Result<String> {
        codec::encode(&self.view().records)
    }

    pub fn set_criteria(&mut self, criteria: Criteria) {
        self.criteria = criteria;
    }

    pub fn view(&self) -> View {
        View::new(&self.records, &self.criteria)
    }
}
