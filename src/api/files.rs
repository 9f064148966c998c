//! Serialization and deserialization structures for the credential files in `.secrets`.
//! - `client_secret.json`: OAuth 2.0 client credentials from Google Cloud Console
//! - `session.json`: the Firebase session obtained by signing in

use crate::api::{Session, User};
use crate::error::Res;
use crate::utils;
use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::de::{DeserializeOwned, Error};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt::Debug;
use std::path::{Path, PathBuf};

/// This redirect needs to be present in the OAuth credential file, or else OAuth will not work.
const REDIRECT: &str = "http://localhost";

/// Represents a file that we want to `Serialize`, `Deserialize`, and read from memory in-between
/// serializations and deserialization. Basically we are just holding the `path` and the `data`
/// here.
#[derive(Default, Debug, Clone)]
pub(super) struct File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    path: PathBuf,
    data: F,
}

impl<F> File<F>
where
    F: Serialize + DeserializeOwned + Clone + Debug,
{
    /// Load data from a file and create a File instance
    pub(super) async fn load(path: impl Into<PathBuf>) -> Res<Self> {
        let path = path.into();
        let data: F = utils::deserialize(&path).await?;
        Ok(Self { path, data })
    }

    /// Create a File instance with the given path and data
    pub(super) fn new(path: impl Into<PathBuf>, data: F) -> Self {
        Self {
            path: path.into(),
            data,
        }
    }

    /// Save the current data to the file, readable by the owner only
    pub(super) async fn save(&self) -> Res<()> {
        let json =
            serde_json::to_string_pretty(&self.data).context("Failed to serialize data to JSON")?;
        utils::write(&self.path, json).await?;

        #[cfg(unix)]
        {
            use std::fs::Permissions;
            use std::os::unix::fs::PermissionsExt;
            tokio::fs::set_permissions(&self.path, Permissions::from_mode(0o600))
                .await
                .context("Failed to set file permissions")?;
        }

        Ok(())
    }

    pub(super) fn data(&self) -> &F {
        &self.data
    }

    pub(super) fn data_mut(&mut self) -> &mut F {
        &mut self.data
    }

    pub(super) fn path(&self) -> &Path {
        &self.path
    }
}

/// Represents the structure of the `client_secret.json` file downloaded from Google Cloud Console.
///
/// This file contains OAuth 2.0 Desktop Application credentials. The standard format from Google
/// has an "installed" wrapper around the actual credentials.
///
/// Example:
/// ```json
/// {
///   "installed": {
///     "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
///     "client_secret": "YOUR_CLIENT_SECRET",
///     "redirect_uris": ["http://localhost"],
///     "auth_uri": "https://accounts.google.com/o/oauth2/auth",
///     "token_uri": "https://oauth2.googleapis.com/token"
///   }
/// }
/// ```
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct SecretFile {
    installed: InstalledCredentials,
}

impl SecretFile {
    pub(super) async fn load(path: &Path) -> Res<SecretFile> {
        utils::deserialize(path).await.with_context(|| {
            format!(
                "Unable to read the OAuth client secret at {}. Download it from the Google \
                Cloud Console and pass it to 'ledger init --client-secret'",
                path.display()
            )
        })
    }

    pub(super) fn client_id(&self) -> &str {
        &self.installed.client_id
    }

    pub(super) fn client_secret(&self) -> &str {
        &self.installed.client_secret
    }

    pub(super) fn auth_uri(&self) -> &str {
        &self.installed.auth_uri
    }

    pub(super) fn token_uri(&self) -> &str {
        &self.installed.token_uri
    }
}

/// The actual OAuth credentials nested within the `client_secret.json` file.
#[derive(Default, Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
struct InstalledCredentials {
    client_id: String,
    client_secret: String,

    /// For this application, should contain "http://localhost" (without a port number)
    redirect_uris: RedirectUris,

    auth_uri: String,
    token_uri: String,
}

#[derive(Default, Debug, Clone)]
struct RedirectUris(Vec<String>);

impl Serialize for RedirectUris {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for RedirectUris {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let vec = Vec::<String>::deserialize(deserializer)?;
        if !vec.iter().any(|s| is_valid_redirect(s)) {
            return Err(D::Error::custom(format!(
                "At least one of the redirects needs to be {REDIRECT}, but this was not found. \
                When creating the OAuth client for your Google project, you must include \
                '{REDIRECT}'"
            )));
        }
        Ok(RedirectUris(vec))
    }
}

fn is_valid_redirect(s: &str) -> bool {
    s == REDIRECT || s == "http://127.0.0.1"
}

/// The Firebase session saved after signing in. The ID token is what Firestore sees; the refresh
/// token renews it.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) struct SessionFile {
    user: Option<User>,
    id_token: String,
    refresh_token: String,
    expires_at: DateTime<Utc>,
}

impl SessionFile {
    pub(super) fn new(
        user: User,
        id_token: String,
        refresh_token: String,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            user: Some(user),
            id_token,
            refresh_token,
            expires_at,
        }
    }

    pub(super) fn refresh_token(&self) -> &str {
        &self.refresh_token
    }

    /// Check if the token is expired or will expire soon (within 5 minutes)
    pub(super) fn is_expired(&self) -> bool {
        let now = Utc::now();
        let buffer = chrono::Duration::minutes(5);
        self.expires_at <= now + buffer
    }

    /// Replaces the ID token after a refresh.
    pub(super) fn update(
        &mut self,
        id_token: String,
        expires_at: DateTime<Utc>,
        refresh_token: Option<String>,
    ) {
        self.id_token = id_token;
        self.expires_at = expires_at;
        if let Some(rt) = refresh_token {
            self.refresh_token = rt;
        }
    }

    /// The session this file describes. `None` when the file does not name a user.
    pub(super) fn session(&self) -> Option<Session> {
        let user = self.user.clone()?;
        Some(Session::new(user, Some(self.id_token.clone())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn secret_json(redirect: &str) -> String {
        format!(
            r#"
{{
    "installed": {{
        "client_id": "YOUR_CLIENT_ID.apps.googleusercontent.com",
        "client_secret": "YOUR_CLIENT_SECRET",
        "redirect_uris": ["{redirect}", "https://example.com:4040/whatever"],
        "auth_uri": "https://accounts.google.com/o/oauth2/auth",
        "token_uri": "https://oauth2.googleapis.com/token"
    }}
}}
"#
        )
    }

    fn user() -> User {
        User {
            email: "coach@example.com".to_string(),
            display_name: "Coach".to_string(),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn test_client_secret_good_redirect() {
        for redirect in ["http://localhost", "http://127.0.0.1"] {
            let dir = TempDir::new().unwrap();
            let p = dir.path().join("file.json");
            utils::write(&p, secret_json(redirect)).await.unwrap();
            let secret = SecretFile::load(&p).await.unwrap();
            assert_eq!(
                secret.client_id(),
                "YOUR_CLIENT_ID.apps.googleusercontent.com"
            );
            assert_eq!(secret.token_uri(), "https://oauth2.googleapis.com/token");
        }
    }

    #[tokio::test]
    async fn test_client_secret_bad_redirect() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("file.json");
        utils::write(&p, secret_json("http://localhost:9900"))
            .await
            .unwrap();
        let e = SecretFile::load(&p).await.unwrap_err();
        assert!(format!("{e:?}").contains("At least one of the redirects needs to be"));
    }

    #[tokio::test]
    async fn test_session_file_save_and_load() {
        let dir = TempDir::new().unwrap();
        let p = dir.path().join("session.json");
        let data = SessionFile::new(
            user(),
            "id".to_string(),
            "refresh".to_string(),
            Utc::now() + chrono::Duration::hours(1),
        );
        File::new(&p, data).save().await.unwrap();

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = std::fs::metadata(&p).unwrap().permissions().mode();
            assert_eq!(mode & 0o777, 0o600);
        }

        let loaded: File<SessionFile> = File::load(&p).await.unwrap();
        assert!(!loaded.data().is_expired());
        let session = loaded.data().session().unwrap();
        assert_eq!(session.email(), "coach@example.com");
        assert_eq!(session.token(), Some("id"));
    }

    #[test]
    fn test_session_expiry_and_update() {
        let mut data = SessionFile::new(
            user(),
            "old".to_string(),
            "refresh".to_string(),
            Utc::now() + chrono::Duration::minutes(2),
        );
        assert!(data.is_expired());
        data.update(
            "new".to_string(),
            Utc::now() + chrono::Duration::hours(1),
            None,
        );
        assert!(!data.is_expired());
        assert_eq!(data.refresh_token(), "refresh");
        assert_eq!(data.session().unwrap().token(), Some("new"));
    }

    #[test]
    fn test_session_without_user() {
        assert!(SessionFile::default().session().is_none());
    }
}
