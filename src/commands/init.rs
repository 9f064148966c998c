use crate::commands::Out;
use crate::config::FirebaseConfig;
use crate::{Config, Result};
use std::path::Path;

/// Creates the data directory, its `.secrets` subdirectory and an initial `config.json`.
///
/// # Arguments
/// - `ledger_home` - The directory that will be the root of the data directory, e.g.
///   `$HOME/badminton-ledger`
/// - `firebase_config` - A JSON file with the Firebase web-app settings. Placeholders are written
///   when it is omitted, and the program runs offline until they are replaced.
/// - `client_secret` - The downloaded OAuth 2.0 client credentials needed to sign in with Google.
///   This will be moved to its default location in the data directory.
///
/// # Errors
/// - Returns an error if the home already has a config file or if any file operation fails.
pub async fn init(
    ledger_home: &Path,
    firebase_config: Option<&Path>,
    client_secret: Option<&Path>,
) -> Result<Out<()>> {
    let firebase = match firebase_config {
        Some(path) => Some(FirebaseConfig::load(path).await?),
        None => None,
    };
    let config = Config::create(ledger_home, firebase, client_secret).await?;
    let mut message = format!(
        "Successfully created the ledger directory and config at {}",
        config.root().display()
    );
    if !config.firebase().is_configured() {
        message.push_str(&format!(
            ". Firebase is not configured yet, so the ledger runs offline. Fill in the firebase \
            section of {} to use Firestore",
            config.config_path().display()
        ));
    }
    Ok(message.into())
}
