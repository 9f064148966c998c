//! The Google OAuth 2.0 installed-app flow.
//!
//! This module:
//! - builds the consent URL from `client_secret.json` (PKCE and a CSRF state)
//! - serves the callback on `localhost:3030` with a one-shot hyper server
//! - exchanges the returned code for a Google access token
//!
//! The access token is then traded for a Firebase session by `identity`.

use crate::api::files::SecretFile;
use crate::error::Res;
use anyhow::{anyhow, bail, Context};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, PkceCodeChallenge,
    RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use std::convert::Infallible;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

const OAUTH_SCOPES: &[&str] = &["openid", "email", "profile"];
const OAUTH_CALLBACK_PORT: u16 = 3030;
const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// What Google sent to the loopback callback.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
struct Callback {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

impl Callback {
    fn from_query(query: Option<&str>) -> Self {
        let mut callback = Callback::default();
        let Some(query) = query else {
            return callback;
        };
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => callback.code = Some(value.into_owned()),
                "state" => callback.state = Some(value.into_owned()),
                "error" => callback.error = Some(value.into_owned()),
                _ => {}
            }
        }
        callback
    }

    /// The authorization code, if the callback carries one for the expected state.
    fn into_code(self, expected_state: &str) -> Res<String> {
        if let Some(error) = self.error {
            bail!("Google refused the sign-in: {error}");
        }
        if self.state.as_deref() != Some(expected_state) {
            bail!("The OAuth callback state does not match, refusing the sign-in");
        }
        self.code
            .ok_or_else(|| anyhow!("The OAuth callback did not include a code"))
    }
}

/// Runs the consent flow and returns a Google access token.
///
/// The consent URL is logged with `info!`; open it in a browser and approve the request. This
/// waits up to five minutes for the callback.
pub(super) async fn authorize(secret: &SecretFile) -> Res<String> {
    let redirect = format!("http://localhost:{OAUTH_CALLBACK_PORT}");
    let client = BasicClient::new(ClientId::new(secret.client_id().to_string()))
        .set_client_secret(ClientSecret::new(secret.client_secret().to_string()))
        .set_auth_uri(AuthUrl::new(secret.auth_uri().to_string()).context("Invalid auth_uri")?)
        .set_token_uri(TokenUrl::new(secret.token_uri().to_string()).context("Invalid token_uri")?)
        .set_redirect_uri(RedirectUrl::new(redirect).context("Invalid redirect URI")?);

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();
    let (auth_url, csrf_token) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(OAUTH_SCOPES.iter().map(|s| Scope::new(s.to_string())))
        .set_pkce_challenge(pkce_challenge)
        .url();

    let listener = TcpListener::bind(("127.0.0.1", OAUTH_CALLBACK_PORT))
        .await
        .with_context(|| format!("Unable to listen on localhost:{OAUTH_CALLBACK_PORT}"))?;
    info!("Open this URL in your browser to sign in:\n\n{auth_url}\n");

    let callback = wait_for_callback(listener).await?;
    let code = callback.into_code(csrf_token.secret())?;
    debug!("Received the OAuth callback, exchanging the code");

    let http = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()
        .context("Unable to build the HTTP client")?;
    let token = client
        .exchange_code(AuthorizationCode::new(code))
        .set_pkce_verifier(pkce_verifier)
        .request_async(&http)
        .await
        .map_err(|e| anyhow!("Unable to exchange the OAuth code for a token: {e}"))?;

    Ok(token.access_token().secret().to_string())
}

/// Serves the loopback redirect until the first request that carries a code or an error.
async fn wait_for_callback(listener: TcpListener) -> Res<Callback> {
    let (tx, mut rx) = mpsc::channel::<Callback>(1);
    let server = tokio::spawn(async move {
        loop {
            let stream = match listener.accept().await {
                Ok((stream, _)) => stream,
                Err(e) => {
                    warn!("Unable to accept the OAuth callback connection: {e}");
                    continue;
                }
            };
            let tx = tx.clone();
            tokio::spawn(async move {
                let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                    let tx = tx.clone();
                    async move { Ok::<_, Infallible>(respond(req, &tx).await) }
                });
                if let Err(e) = http1::Builder::new()
                    .serve_connection(TokioIo::new(stream), service)
                    .await
                {
                    debug!("OAuth callback connection ended: {e}");
                }
            });
        }
    });

    let received = tokio::time::timeout(CALLBACK_TIMEOUT, rx.recv()).await;
    server.abort();
    match received {
        Ok(Some(callback)) => Ok(callback),
        Ok(None) => bail!("The OAuth callback server stopped unexpectedly"),
        Err(_) => bail!(
            "Timed out after {} seconds waiting for the OAuth callback",
            CALLBACK_TIMEOUT.as_secs()
        ),
    }
}

async fn respond(
    req: Request<hyper::body::Incoming>,
    tx: &mpsc::Sender<Callback>,
) -> Response<String> {
    let callback = Callback::from_query(req.uri().query());
    if callback.code.is_none() && callback.error.is_none() {
        // Browsers also ask for things like /favicon.ico
        return Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(String::new())
            .unwrap_or_default();
    }
    let failed = callback.error.is_some();
    let _ = tx.send(callback).await;
    let body = if failed {
        "Sign-in was cancelled. You can close this window."
    } else {
        "Sign-in complete. You can close this window and return to the ledger."
    };
    Response::new(body.to_string())
}
