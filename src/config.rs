//! Configuration file handling for the ledger.
//!
//! The configuration file is stored at `$LEDGER_HOME/config.json` and holds the Firebase project
//! settings, the Firestore collection name and the paths of the OAuth client secret and the saved
//! session.

use crate::error::{ErrorType, IntoResult, Res};
use crate::{utils, Result};
use anyhow::{bail, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_NAME: &str = "badminton-ledger";
const CONFIG_VERSION: u8 = 1;
const SECRETS: &str = ".secrets";
const CLIENT_SECRET_JSON: &str = "client_secret.json";
const SESSION_JSON: &str = "session.json";
const CONFIG_JSON: &str = "config.json";
const DEFAULT_COLLECTION: &str = "accounting";
const PLACEHOLDER_PREFIX: &str = "YOUR_";

/// The `Config` object represents the configuration of the app. You instantiate it by providing
/// the path to `$LEDGER_HOME` and from there it loads `$LEDGER_HOME/config.json`. It provides
/// paths to other items that are expected in a certain location within the home directory.
#[derive(Debug, Clone)]
pub struct Config {
    root: PathBuf,
    secrets: PathBuf,
    config_path: PathBuf,
    config_file: ConfigFile,
}

impl Config {
    /// Creates the home directory, its `.secrets` subdirectory and an initial `config.json`.
    ///
    /// # Arguments
    /// - `dir` - The directory that will be the root of the data directory, e.g.
    ///   `$HOME/badminton-ledger`
    /// - `firebase` - The Firebase web-app settings. When `None`, placeholder values are written
    ///   and the app runs offline until they are filled in.
    /// - `secret_file` - The downloaded Google OAuth client credentials. When given, it is moved
    ///   into `.secrets/client_secret.json`.
    pub async fn create(
        dir: impl Into<PathBuf>,
        firebase: Option<FirebaseConfig>,
        secret_file: Option<&Path>,
    ) -> Result<Self> {
        Self::create_inner(dir.into(), firebase, secret_file)
            .await
            .pub_result(ErrorType::Config)
    }

    async fn create_inner(
        maybe_relative: PathBuf,
        firebase: Option<FirebaseConfig>,
        secret_file: Option<&Path>,
    ) -> Res<Self> {
        utils::make_dir(&maybe_relative)
            .await
            .context("Unable to create the ledger home directory")?;
        let root = utils::canonicalize(&maybe_relative).await?;
        let secrets = root.join(SECRETS);
        utils::make_dir(&secrets).await?;

        let config_path = root.join(CONFIG_JSON);
        if config_path.is_file() {
            bail!(
                "A config file already exists at '{}'",
                config_path.display()
            );
        }
        if let Some(secret_file) = secret_file {
            utils::rename(secret_file, secrets.join(CLIENT_SECRET_JSON)).await?;
        }
        let config_file = ConfigFile {
            firebase: firebase.unwrap_or_else(FirebaseConfig::placeholder),
            ..ConfigFile::default()
        };
        config_file.save(&config_path).await?;

        Ok(Self {
            root,
            secrets,
            config_path,
            config_file,
        })
    }

    /// This will
    /// - validate that the `ledger_home` exists and that the config file exists
    /// - load the config file
    /// - validate that the secrets directory exists
    pub async fn load(ledger_home: impl Into<PathBuf>) -> Result<Self> {
        Self::load_inner(ledger_home.into())
            .await
            .pub_result(ErrorType::Config)
    }

    async fn load_inner(maybe_relative: PathBuf) -> Res<Self> {
        let root = utils::canonicalize(&maybe_relative)
            .await
            .context("The ledger home is missing, run 'ledger init' first")?;
        let config_path = root.join(CONFIG_JSON);
        if !config_path.is_file() {
            bail!("The config file is missing '{}'", config_path.display())
        }
        let config_file = ConfigFile::load(&config_path).await?;
        let config = Self {
            secrets: root.join(SECRETS),
            root,
            config_path,
            config_file,
        };
        if !config.secrets.is_dir() {
            bail!(
                "The secrets directory is missing '{}'",
                config.secrets.display()
            )
        }
        Ok(config)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> &Path {
        &self.config_path
    }

    pub fn secrets(&self) -> &Path {
        &self.secrets
    }

    pub fn firebase(&self) -> &FirebaseConfig {
        &self.config_file.firebase
    }

    /// The Firestore collection that holds the records.
    pub fn collection(&self) -> &str {
        &self.config_file.collection
    }

    /// Returns the stored `client_secret_path` if it is absolute, otherwise resolves the relative
    /// path.
    pub fn client_secret_path(&self) -> PathBuf {
        self.resolve(self.config_file.client_secret_path())
    }

    /// Returns the stored `session_path` if it is absolute, otherwise resolves the relative path.
    pub fn session_path(&self) -> PathBuf {
        self.resolve(self.config_file.session_path())
    }

    fn resolve(&self, p: PathBuf) -> PathBuf {
        if p.is_absolute() {
            return p;
        }
        self.root.join(p)
    }
}

/// The Firebase web-app settings, as shown in the Firebase console.
#[derive(Debug, Default, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FirebaseConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub auth_domain: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub storage_bucket: String,
    #[serde(default)]
    pub messaging_sender_id: String,
    #[serde(default)]
    pub app_id: String,
}

impl FirebaseConfig {
    /// The values written by `ledger init` when no Firebase settings are given.
    pub fn placeholder() -> Self {
        Self {
            api_key: "YOUR_API_KEY".to_string(),
            auth_domain: "YOUR_PROJECT_ID.firebaseapp.com".to_string(),
            project_id: "YOUR_PROJECT_ID".to_string(),
            storage_bucket: "YOUR_PROJECT_ID.appspot.com".to_string(),
            messaging_sender_id: "YOUR_MESSAGING_SENDER_ID".to_string(),
            app_id: "YOUR_APP_ID".to_string(),
        }
    }

    /// Reads Firebase settings from a JSON file.
    pub async fn load(path: &Path) -> Result<Self> {
        utils::deserialize(path)
            .await
            .context("Unable to read the Firebase config")
            .pub_result(ErrorType::Config)
    }

    /// True when every value is present and none is a placeholder.
    pub fn is_configured(&self) -> bool {
        [
            &self.api_key,
            &self.auth_domain,
            &self.project_id,
            &self.storage_bucket,
            &self.messaging_sender_id,
            &self.app_id,
        ]
        .iter()
        .all(|v| {
            let v = v.trim();
            !v.is_empty() && !v.starts_with(PLACEHOLDER_PREFIX)
        })
    }
}

/// Represents the serialization and deserialization format of the configuration file.
///
/// Example configuration:
/// ```json
/// {
///   "app_name": "badminton-ledger",
///   "config_version": 1,
///   "collection": "accounting",
///   "firebase": {
///     "apiKey": "AIzaSyD-example",
///     "authDomain": "my-club.firebaseapp.com",
///     "projectId": "my-club",
///     "storageBucket": "my-club.appspot.com",
///     "messagingSenderId": "1234567890",
///     "appId": "1:1234567890:web:abcdef"
///   },
///   "client_secret_path": ".secrets/client_secret.json",
///   "session_path": ".secrets/session.json"
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
struct ConfigFile {
    /// Application name, should always be "badminton-ledger"
    app_name: String,

    /// Configuration file version
    config_version: u8,

    /// The Firestore collection holding the records
    #[serde(default = "default_collection")]
    collection: String,

    #[serde(default)]
    firebase: FirebaseConfig,

    /// Path to the OAuth 2.0 client credentials file (relative to the home or absolute)
    #[serde(skip_serializing_if = "Option::is_none")]
    client_secret_path: Option<PathBuf>,

    /// Path to the saved sign-in session (relative to the home or absolute)
    #[serde(skip_serializing_if = "Option::is_none")]
    session_path: Option<PathBuf>,
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            app_name: APP_NAME.to_string(),
            config_version: CONFIG_VERSION,
            collection: default_collection(),
            firebase: FirebaseConfig::default(),
            client_secret_path: None,
            session_path: None,
        }
    }
}

impl ConfigFile {
    async fn load(path: impl AsRef<Path>) -> Res<Self> {
        let path = path.as_ref();
        let config: ConfigFile = utils::deserialize(path).await?;
        anyhow::ensure!(
            config.app_name == APP_NAME,
            "Invalid app_name in config file: expected '{}', got '{}'",
            APP_NAME,
            config.app_name
        );
        Ok(config)
    }

    async fn save(&self, path: impl AsRef<Path>) -> Res<()> {
        let data = serde_json::to_string_pretty(self).context("Unable to serialize config")?;
        utils::write(path, data)
            .await
            .context("Unable to write config file")
    }

    /// If None, defaults to $LEDGER_HOME/.secrets/client_secret.json
    fn client_secret_path(&self) -> PathBuf {
        self.client_secret_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(CLIENT_SECRET_JSON))
    }

    /// If None, defaults to $LEDGER_HOME/.secrets/session.json
    fn session_path(&self) -> PathBuf {
        self.session_path
            .clone()
            .unwrap_or_else(|| PathBuf::from(SECRETS).join(SESSION_JSON))
    }
}
