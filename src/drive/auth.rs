//! OAuth2 access for Google Drive (installed-application flow).
//!
//! The token is cached as JSON under the configured token directory. A cached
//! token that is still fresh is reused, an expired one is refreshed with its
//! refresh token, and only when neither works does the interactive consent
//! flow run: the consent URL is printed and a small axum server on
//! `127.0.0.1:<port>` answers the `/Callback` redirect and hands the
//! authorization code back over a oneshot channel.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};

use axum::Router;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use chrono::{DateTime, Duration, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{debug, info, instrument, warn};
use url::Url;

/// Read-only Drive scope.
pub const DRIVE_READONLY_SCOPE: &str = "https://www.googleapis.com/auth/drive.readonly";

/// File name of the cached token inside the token directory.
pub const TOKEN_FILE_NAME: &str = "drive-token.json";

/// Default local port for the consent callback.
pub const DEFAULT_CALLBACK_PORT: u16 = 8888;

const CALLBACK_PATH: &str = "/Callback";

/// How long the callback server may take to finish answering the browser.
const SHUTDOWN_GRACE: std::time::Duration = std::time::Duration::from_secs(5);

/// Tokens expiring within this window are treated as expired.
const EXPIRY_MARGIN_SECS: i64 = 60;

/// Errors raised while obtaining a Drive access token.
#[derive(Debug, Error)]
pub enum AuthError {
    /// The OAuth client secret file is missing or unreadable.
    #[error("cannot read OAuth client secret {path}: {source}")]
    ClientSecretMissing {
        /// Configured client secret path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The client secret file is not a Google installed/web client secret.
    #[error("invalid OAuth client secret {path}: {reason}")]
    ClientSecretInvalid {
        /// Configured client secret path.
        path: PathBuf,
        /// What is wrong with the file.
        reason: String,
    },

    /// Reading or writing the cached token failed.
    #[error("token store error at {path}: {source}")]
    TokenStore {
        /// Token file path.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The token endpoint rejected the exchange or refresh.
    #[error("token endpoint returned HTTP {status}: {body}")]
    Exchange {
        /// HTTP status code.
        status: u16,
        /// Response body.
        body: String,
    },

    /// The token endpoint could not be reached or answered garbage.
    #[error("token request failed: {0}")]
    Network(#[from] reqwest::Error),

    /// The consent callback listener could not be started.
    #[error("cannot listen for OAuth callback on port {port}: {source}")]
    Listener {
        /// Callback port.
        port: u16,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// The consent callback did not carry an authorization code.
    #[error("OAuth consent failed: {reason}")]
    Callback {
        /// Why the callback was rejected.
        reason: String,
    },
}

impl AuthError {
    /// Whether this failure stems from local configuration rather than the
    /// OAuth exchange itself.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::ClientSecretMissing { .. } | Self::ClientSecretInvalid { .. }
        )
    }
}

#[derive(Debug, Clone, Deserialize)]
struct ClientSecretFile {
    installed: Option<ClientSecret>,
    web: Option<ClientSecret>,
}

/// OAuth client credentials from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecret {
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: String,
    /// Consent page URL.
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    /// Token endpoint URL.
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

/// Cached access/refresh token pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    /// Bearer access token.
    pub access_token: String,
    /// Long-lived refresh token (offline access).
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Expiry of `access_token`; `None` means unknown.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

impl StoredToken {
    /// Whether the access token can still be used at `now`.
    #[must_use]
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .is_some_and(|expires| expires - Duration::seconds(EXPIRY_MARGIN_SECS) > now)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl TokenResponse {
    fn into_stored(self, previous_refresh: Option<String>, now: DateTime<Utc>) -> StoredToken {
        StoredToken {
            access_token: self.access_token,
            refresh_token: self.refresh_token.or(previous_refresh),
            expires_at: self.expires_in.map(|secs| now + Duration::seconds(secs)),
        }
    }
}

/// Obtains Drive access tokens for one user.
#[derive(Debug, Clone)]
pub struct GoogleAuthenticator {
    client: Client,
    client_secret_path: PathBuf,
    token_dir: PathBuf,
    callback_port: u16,
}

impl GoogleAuthenticator {
    /// Creates an authenticator.
    pub fn new(
        client: Client,
        client_secret_path: impl Into<PathBuf>,
        token_dir: impl Into<PathBuf>,
        callback_port: u16,
    ) -> Self {
        Self {
            client,
            client_secret_path: client_secret_path.into(),
            token_dir: token_dir.into(),
            callback_port,
        }
    }

    /// Path of the cached token file.
    #[must_use]
    pub fn token_path(&self) -> PathBuf {
        self.token_dir.join(TOKEN_FILE_NAME)
    }

    /// Returns a usable access token, refreshing or running the consent flow
    /// as needed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError`] when the client secret is unusable, the token
    /// store cannot be read or written, or every way of getting a token fails.
    #[instrument(skip(self), fields(token_path = %self.token_path().display()))]
    pub async fn access_token(&self) -> Result<String, AuthError> {
        let secret = load_client_secret(&self.client_secret_path).await?;
        let token_path = self.token_path();
        let now = Utc::now();

        if let Some(stored) = load_stored_token(&token_path).await? {
            if stored.is_fresh(now) {
                debug!("using cached Drive token");
                return Ok(stored.access_token);
            }
            if let Some(refresh_token) = stored.refresh_token.clone() {
                match self.refresh(&secret, &refresh_token).await {
                    Ok(response) => {
                        let refreshed = response.into_stored(Some(refresh_token), Utc::now());
                        store_token(&token_path, &refreshed).await?;
                        info!("refreshed Drive access token");
                        return Ok(refreshed.access_token);
                    }
                    Err(error) => {
                        warn!(%error, "token refresh failed, falling back to consent flow");
                    }
                }
            }
        }

        let token = self.consent_flow(&secret).await?;
        store_token(&token_path, &token).await?;
        info!("stored new Drive token");
        Ok(token.access_token)
    }

    async fn refresh(
        &self,
        secret: &ClientSecret,
        refresh_token: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.token_request(
            secret,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", secret.client_id.as_str()),
                ("client_secret", secret.client_secret.as_str()),
            ],
        )
        .await
    }

    async fn token_request(
        &self,
        secret: &ClientSecret,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, AuthError> {
        let response = self.client.post(&secret.token_uri).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuthError::Exchange {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json::<TokenResponse>().await?)
    }

    async fn consent_flow(&self, secret: &ClientSecret) -> Result<StoredToken, AuthError> {
        let redirect_uri = format!("http://localhost:{}{CALLBACK_PATH}", self.callback_port);
        let consent_url = consent_url(secret, &redirect_uri)?;

        let listener = TcpListener::bind(("127.0.0.1", self.callback_port))
            .await
            .map_err(|source| AuthError::Listener {
                port: self.callback_port,
                source,
            })?;

        info!(url = %consent_url, "open this URL in a browser to authorize Drive access");
        eprintln!("Please open the following address in your browser:\n  {consent_url}");

        let code = receive_code(listener, self.callback_port).await?;
        let now = Utc::now();
        let response = self
            .token_request(
                secret,
                &[
                    ("grant_type", "authorization_code"),
                    ("code", code.as_str()),
                    ("redirect_uri", redirect_uri.as_str()),
                    ("client_id", secret.client_id.as_str()),
                    ("client_secret", secret.client_secret.as_str()),
                ],
            )
            .await?;
        Ok(response.into_stored(None, now))
    }
}

/// Builds the consent page URL for offline read-only Drive access.
fn consent_url(secret: &ClientSecret, redirect_uri: &str) -> Result<Url, AuthError> {
    Url::parse_with_params(
        &secret.auth_uri,
        &[
            ("client_id", secret.client_id.as_str()),
            ("redirect_uri", redirect_uri),
            ("response_type", "code"),
            ("scope", DRIVE_READONLY_SCOPE),
            ("access_type", "offline"),
        ],
    )
    .map_err(|e| AuthError::Callback {
        reason: format!("invalid auth_uri '{}': {e}", secret.auth_uri),
    })
}

/// Query string of the OAuth redirect.
#[derive(Debug, Default, Deserialize)]
struct CallbackParams {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl CallbackParams {
    fn into_outcome(self) -> Result<String, AuthError> {
        match (self.code, self.error) {
            (Some(code), _) if !code.is_empty() => Ok(code),
            (_, Some(error)) => Err(AuthError::Callback { reason: error }),
            _ => Err(AuthError::Callback {
                reason: "callback carried no authorization code".to_string(),
            }),
        }
    }
}

/// Hands the first callback outcome back to the consent flow.
type CallbackSender = Arc<Mutex<Option<oneshot::Sender<Result<String, AuthError>>>>>;

async fn handle_callback(
    State(sender): State<CallbackSender>,
    Query(params): Query<CallbackParams>,
) -> (StatusCode, &'static str) {
    let outcome = params.into_outcome();
    let reply = match &outcome {
        Ok(_) => (
            StatusCode::OK,
            "Authorization received. You may close this window.",
        ),
        Err(_) => (
            StatusCode::BAD_REQUEST,
            "Authorization failed. Check the terminal.",
        ),
    };

    let pending = sender
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .take();
    match pending {
        Some(pending) => {
            let _ = pending.send(outcome);
        }
        None => debug!("ignoring repeated OAuth callback"),
    }
    reply
}

/// Serves `/Callback` on `listener` until the first redirect arrives and
/// returns its authorization code.
async fn receive_code(listener: TcpListener, port: u16) -> Result<String, AuthError> {
    let (code_tx, code_rx) = oneshot::channel();
    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let sender: CallbackSender = Arc::new(Mutex::new(Some(code_tx)));

    let app = Router::new()
        .route(CALLBACK_PATH, get(handle_callback))
        .with_state(sender);
    let mut server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    let outcome = tokio::select! {
        received = code_rx => received.unwrap_or_else(|_| Err(AuthError::Callback {
            reason: "callback server stopped before a redirect arrived".to_string(),
        })),
        served = &mut server => {
            return Err(match served {
                Ok(Err(source)) => AuthError::Listener { port, source },
                _ => AuthError::Callback {
                    reason: "callback server stopped before a redirect arrived".to_string(),
                },
            });
        }
    };

    // Let the browser's response finish before the listener goes away.
    let _ = stop_tx.send(());
    if tokio::time::timeout(SHUTDOWN_GRACE, server).await.is_err() {
        debug!("callback server still draining, detaching");
    }
    outcome
}

async fn load_client_secret(path: &Path) -> Result<ClientSecret, AuthError> {
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| AuthError::ClientSecretMissing {
            path: path.to_path_buf(),
            source,
        })?;
    let file: ClientSecretFile =
        serde_json::from_str(&raw).map_err(|e| AuthError::ClientSecretInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    file.installed
        .or(file.web)
        .ok_or_else(|| AuthError::ClientSecretInvalid {
            path: path.to_path_buf(),
            reason: "expected an \"installed\" or \"web\" client".to_string(),
        })
}

async fn load_stored_token(path: &Path) -> Result<Option<StoredToken>, AuthError> {
    let raw = match tokio::fs::read_to_string(path).await {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(AuthError::TokenStore {
                path: path.to_path_buf(),
                source,
            });
        }
    };
    match serde_json::from_str(&raw) {
        Ok(token) => Ok(Some(token)),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable cached token");
            Ok(None)
        }
    }
}

async fn store_token(path: &Path, token: &StoredToken) -> Result<(), AuthError> {
    let to_store_error = |source| AuthError::TokenStore {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(to_store_error)?;
    }
    let json = serde_json::to_vec_pretty(token)
        .map_err(|e| to_store_error(std::io::Error::other(e)))?;
    tokio::fs::write(path, json).await.map_err(to_store_error)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn secret() -> ClientSecret {
        ClientSecret {
            client_id: "cid.apps.googleusercontent.com".to_string(),
            client_secret: "csecret".to_string(),
            auth_uri: default_auth_uri(),
            token_uri: default_token_uri(),
        }
    }

    #[test]
    fn test_stored_token_freshness_respects_margin() {
        let now = Utc::now();
        let token = |expires_at| StoredToken {
            access_token: "a".to_string(),
            refresh_token: None,
            expires_at,
        };
        assert!(token(Some(now + Duration::minutes(10))).is_fresh(now));
        assert!(!token(Some(now + Duration::seconds(30))).is_fresh(now));
        assert!(!token(Some(now - Duration::minutes(1))).is_fresh(now));
        assert!(!token(None).is_fresh(now));
    }

    #[test]
    fn test_token_response_keeps_previous_refresh_token() {
        let now = Utc::now();
        let response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: Some(3600),
            refresh_token: None,
        };
        let stored = response.into_stored(Some("keep".to_string()), now);
        assert_eq!(stored.refresh_token.as_deref(), Some("keep"));
        assert_eq!(stored.expires_at, Some(now + Duration::seconds(3600)));
    }

    #[test]
    fn test_consent_url_requests_offline_readonly_access() {
        let url = consent_url(&secret(), "http://localhost:8888/Callback").unwrap();
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("scope".to_string(), DRIVE_READONLY_SCOPE.to_string())));
        assert!(pairs.contains(&("access_type".to_string(), "offline".to_string())));
        assert!(pairs.contains(&(
            "redirect_uri".to_string(),
            "http://localhost:8888/Callback".to_string()
        )));
    }

    async fn callback_listener() -> (TcpListener, u16) {
        let listener = TcpListener::bind(("127.0.0.1", 0)).await.unwrap();
        let port = listener.local_addr().unwrap().port();
        (listener, port)
    }

    #[tokio::test]
    async fn test_receive_code_returns_decoded_code() {
        let (listener, port) = callback_listener().await;
        let receiver = tokio::spawn(receive_code(listener, port));

        let response = reqwest::get(format!(
            "http://127.0.0.1:{port}/Callback?code=4%2F0Ab&scope=x"
        ))
        .await
        .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::OK);
        assert_eq!(receiver.await.unwrap().unwrap(), "4/0Ab");
    }

    #[tokio::test]
    async fn test_receive_code_reports_denial() {
        let (listener, port) = callback_listener().await;
        let receiver = tokio::spawn(receive_code(listener, port));

        let response = reqwest::get(format!(
            "http://127.0.0.1:{port}/Callback?error=access_denied"
        ))
        .await
        .unwrap();

        assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
        let result = receiver.await.unwrap();
        assert!(matches!(result, Err(AuthError::Callback { reason }) if reason == "access_denied"));
    }

    #[tokio::test]
    async fn test_receive_code_ignores_other_paths() {
        let (listener, port) = callback_listener().await;
        let receiver = tokio::spawn(receive_code(listener, port));

        let favicon = reqwest::get(format!("http://127.0.0.1:{port}/favicon.ico"))
            .await
            .unwrap();
        assert_eq!(favicon.status(), reqwest::StatusCode::NOT_FOUND);
        assert!(!receiver.is_finished());

        reqwest::get(format!("http://127.0.0.1:{port}/Callback?code=late"))
            .await
            .unwrap();
        assert_eq!(receiver.await.unwrap().unwrap(), "late");
    }

    #[tokio::test]
    async fn test_receive_code_handles_request_split_across_segments() {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let (listener, port) = callback_listener().await;
        let receiver = tokio::spawn(receive_code(listener, port));

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream.set_nodelay(true).unwrap();
        stream.write_all(b"GET /Callback?co").await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        stream
            .write_all(b"de=split-code HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
            .await
            .unwrap();

        let mut reply = String::new();
        stream.read_to_string(&mut reply).await.unwrap();
        assert!(reply.starts_with("HTTP/1.1 200"), "{reply}");
        assert_eq!(receiver.await.unwrap().unwrap(), "split-code");
    }

    #[test]
    fn test_callback_params_without_code_is_rejected() {
        let outcome = CallbackParams {
            code: Some(String::new()),
            error: None,
        }
        .into_outcome();
        assert!(matches!(outcome, Err(AuthError::Callback { .. })));
    }

    #[tokio::test]
    async fn test_load_client_secret_missing_file_is_configuration_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = load_client_secret(&dir.path().join("credentials.json"))
            .await
            .unwrap_err();
        assert!(err.is_configuration(), "{err}");
    }

    #[tokio::test]
    async fn test_load_client_secret_accepts_installed_client() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("credentials.json");
        std::fs::write(
            &path,
            r#"{"installed":{"client_id":"id","client_secret":"s","token_uri":"http://t/token"}}"#,
        )
        .unwrap();
        let secret = load_client_secret(&path).await.unwrap();
        assert_eq!(secret.client_id, "id");
        assert_eq!(secret.token_uri, "http://t/token");
        assert_eq!(secret.auth_uri, default_auth_uri());
    }

    #[tokio::test]
    async fn test_token_store_round_trips_through_directory() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join(TOKEN_FILE_NAME);
        let token = StoredToken {
            access_token: "a".to_string(),
            refresh_token: Some("r".to_string()),
            expires_at: None,
        };
        store_token(&path, &token).await.unwrap();
        assert_eq!(load_stored_token(&path).await.unwrap(), Some(token));
    }
}
