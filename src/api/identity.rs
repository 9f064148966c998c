//! Implementations of `IdentityProvider`.
//!
//! `FirebaseIdentity` signs in with Google (see `oauth`), trades the Google access token for a
//! Firebase session through Identity Toolkit, and keeps that session in `.secrets/session.json`
//! so later runs can `restore` it. An expired ID token is refreshed through the Secure Token
//! endpoint.
//!
//! `TestIdentity` always yields the same offline identity.

use crate::api::files::{File, SecretFile, SessionFile};
use crate::api::{oauth, IdentityProvider, Session, User};
use crate::error::{ErrorType, IntoResult, Res};
use crate::{utils, Config, Result};
use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

const IDENTITY_TOOLKIT_URL: &str = "https://identitytoolkit.googleapis.com/v1";
const SECURE_TOKEN_URL: &str = "https://securetoken.googleapis.com/v1";
const GOOGLE_PROVIDER: &str = "google.com";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// The offline identity. It is signed in by `sign_in` and forgotten by `sign_out`; nothing is
/// persisted.
#[derive(Debug, Clone)]
pub(crate) struct TestIdentity {
    session: Session,
    signed_in: bool,
}

impl TestIdentity {
    pub(crate) fn new(session: Session) -> Self {
        Self {
            session,
            signed_in: false,
        }
    }
}

impl Default for TestIdentity {
    fn default() -> Self {
        Self::new(Session::test())
    }
}

#[async_trait]
impl IdentityProvider for TestIdentity {
    async fn restore(&mut self) -> Result<Option<Session>> {
        Ok(self.signed_in.then(|| self.session.clone()))
    }

    async fn sign_in(&mut self) -> Result<Session> {
        self.signed_in = true;
        debug!("Signed in the offline identity {}", self.session.email());
        Ok(self.session.clone())
    }

    async fn sign_out(&mut self) -> Result<()> {
        self.signed_in = false;
        Ok(())
    }
}

/// Google sign-in exchanged for a Firebase session.
#[derive(Debug, Clone)]
pub(crate) struct FirebaseIdentity {
    api_key: String,
    client_secret_path: PathBuf,
    session_path: PathBuf,
    identity_url: String,
    token_url: String,
    http: reqwest::Client,
}

impl FirebaseIdentity {
    pub(crate) fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .pub_result(ErrorType::Internal)?;
        Ok(Self {
            api_key: config.firebase().api_key.clone(),
            client_secret_path: config.client_secret_path(),
            session_path: config.session_path(),
            identity_url: IDENTITY_TOOLKIT_URL.to_string(),
            token_url: SECURE_TOKEN_URL.to_string(),
            http,
        })
    }

    async fn post<B, R>(&self, url: &str, body: B, what: &str) -> Res<R>
    where
        B: FnOnce(reqwest::RequestBuilder) -> reqwest::RequestBuilder,
        R: DeserializeOwned,
    {
        let request = self
            .http
            .post(url)
            .query(&[("key", self.api_key.as_str())]);
        let response = body(request)
            .send()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Unable to reach Firebase to {what}"))?;
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(reqwest::Error::without_url)
            .with_context(|| format!("Unable to read the Firebase response to {what}"))?;
        if !status.is_success() {
            return Err(anyhow!("Firebase refused to {what} ({status}): {text}"));
        }
        serde_json::from_str(&text)
            .with_context(|| format!("Unable to parse the Firebase response to {what}"))
    }

    /// Trades a Google access token for a Firebase session.
    async fn sign_in_with_google(&self, access_token: &str) -> Res<SessionFile> {
        let url = format!("{}/accounts:signInWithIdp", self.identity_url);
        let body = json!({
            "postBody": format!("access_token={access_token}&providerId={GOOGLE_PROVIDER}"),
            "requestUri": "http://localhost",
            "returnSecureToken": true,
            "returnIdpCredential": true,
        });
        let response: SignInResponse = self
            .post(&url, |r| r.json(&body), "sign in with Google")
            .await?;
        let user = User {
            display_name: response
                .display_name
                .unwrap_or_else(|| response.email.clone()),
            email: response.email,
            photo_url: response.photo_url,
        };
        Ok(SessionFile::new(
            user,
            response.id_token,
            response.refresh_token,
            expires_at(&response.expires_in),
        ))
    }

    /// Renews the ID token of a saved session.
    async fn refresh(&self, file: &mut File<SessionFile>) -> Res<()> {
        let url = format!("{}/token", self.token_url);
        let form = [
            ("grant_type", "refresh_token"),
            ("refresh_token", file.data().refresh_token()),
        ];
        let response: RefreshResponse = self
            .post(&url, |r| r.form(&form), "refresh the session")
            .await?;
        file.data_mut().update(
            response.id_token,
            expires_at(&response.expires_in),
            response.refresh_token,
        );
        file.save().await
    }

    async fn restore_inner(&self) -> Res<Option<Session>> {
        if !self.session_path.is_file() {
            debug!("There is no saved session at {}", self.session_path.display());
            return Ok(None);
        }
        let mut file: File<SessionFile> = File::load(&self.session_path).await?;
        if file.data().is_expired() {
            debug!("The saved session has expired, refreshing it");
            if let Err(e) = self.refresh(&mut file).await {
                warn!("Unable to refresh the saved session, sign in again with 'ledger auth': {e:#}");
                return Ok(None);
            }
        }
        Ok(file.data().session())
    }

    async fn sign_in_inner(&self) -> Res<Session> {
        let secret = SecretFile::load(&self.client_secret_path).await?;
        let access_token = oauth::authorize(&secret).await?;
        let data = self.sign_in_with_google(&access_token).await?;
        let session = data
            .session()
            .ok_or_else(|| anyhow!("Firebase did not return a user"))?;
        let file = File::new(&self.session_path, data);
        file.save().await?;
        info!("Signed in as {}, session saved to {}", session.email(), file.path().display());
        Ok(session)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentity {
    async fn restore(&mut self) -> Result<Option<Session>> {
        self.restore_inner().await.pub_result(ErrorType::Auth)
    }

    async fn sign_in(&mut self) -> Result<Session> {
        self.sign_in_inner().await.pub_result(ErrorType::Auth)
    }

    async fn sign_out(&mut self) -> Result<()> {
        utils::remove_file(&self.session_path)
            .await
            .pub_result(ErrorType::Io)
    }
}

/// `expires_in` is a number of seconds sent as a string. Unparseable or out of range means
/// already expired.
fn expires_at(expires_in: &str) -> DateTime<Utc> {
    let now = Utc::now();
    expires_in
        .trim()
        .parse::<i64>()
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| now.checked_add_signed(delta))
        .unwrap_or(now)
}

/// The parts of the `accounts:signInWithIdp` response that we use.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    email: String,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    photo_url: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: String,
}

/// The parts of the Secure Token response that we use. Unlike the sign-in response this one is
/// snake_case.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct RefreshResponse {
    id_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    expires_in: String,
}
