//! Authentication command handler.
//!
//! - `ledger auth` - signs in with Google and checks the allow-list
//! - `ledger auth --sign-out` - forgets the saved session

use crate::api::User;
use crate::app::App;
use crate::commands::Out;
use crate::Result;

/// Signs in, or out when `sign_out` is set.
///
/// Remotely this is the only command that opens the Google consent flow; the session it saves is
/// picked up by every later command. Offline it signs in the test identity.
///
/// # Errors
/// Returns `Unauthorized` when the identity is not on the allow-list, in which case it is signed
/// out again.
pub async fn auth(app: &mut App, sign_out: bool) -> Result<Out<Option<User>>> {
    if sign_out {
        app.sign_out().await?;
        return Ok(Out::new("Signed out", None));
    }
    let user = app.sign_in().await?.user().clone();
    Ok(Out::new(
        format!("Signed in as {} ({})", user.display_name, user.email),
        Some(user),
    ))
}
