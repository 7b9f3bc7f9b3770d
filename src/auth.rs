//! OAuth sign-in against the hosted auth provider (PKCE + loopback callback).

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use axum::{
    Router,
    extract::{Query, State},
    http::{HeaderMap, header::HOST},
    response::{Html, Redirect},
    routing::get,
};
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::Utc;
use rand::{Rng, distributions::Alphanumeric};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use tokio::{net::TcpListener, sync::mpsc};
use tracing::{info, warn};
use url::Url;

use crate::{
    config::CloudConfig,
    error::{PulseError, Result},
    storage,
    sync::{Identity, remote_error},
};

const AUTH_ERROR_PATH: &str = "/auth/auth-code-error";
const SIGN_IN_TIMEOUT: Duration = Duration::from_secs(300);
const REFRESH_MARGIN_SECS: i64 = 60;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSession {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: String,
    /// Unix seconds.
    #[serde(default)]
    pub expires_at: Option<i64>,
    pub user: AuthUser,
}

impl AuthSession {
    pub fn identity(&self) -> Identity {
        Identity {
            user_id: self.user.id.clone(),
            access_token: self.access_token.clone(),
        }
    }

    pub fn needs_refresh(&self, now_secs: i64) -> bool {
        self.expires_at
            .is_some_and(|at| now_secs >= at - REFRESH_MARGIN_SECS)
    }

    pub fn display_name(&self) -> &str {
        self.user.email.as_deref().unwrap_or(&self.user.id)
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: String,
    #[serde(default)]
    expires_at: Option<i64>,
    #[serde(default)]
    expires_in: Option<i64>,
    user: AuthUser,
}

impl From<TokenResponse> for AuthSession {
    fn from(token: TokenResponse) -> Self {
        let expires_at = token
            .expires_at
            .or_else(|| token.expires_in.map(|secs| Utc::now().timestamp() + secs));
        Self {
            access_token: token.access_token,
            refresh_token: token.refresh_token,
            expires_at,
            user: token.user,
        }
    }
}

/// PKCE verifier and its S256 challenge.
#[derive(Clone, Debug)]
pub struct PkcePair {
    pub verifier: String,
    pub challenge: String,
}

impl PkcePair {
    pub fn generate() -> Self {
        let verifier: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(64)
            .map(char::from)
            .collect();
        Self::from_verifier(verifier)
    }

    pub fn from_verifier(verifier: String) -> Self {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Self {
            verifier,
            challenge,
        }
    }
}

#[derive(Clone, Debug)]
pub struct AuthClient {
    http: Client,
    base_url: String,
    anon_key: String,
    provider: String,
}

impl AuthClient {
    pub fn new(config: &CloudConfig) -> Result<Self> {
        if !config.is_configured() {
            return Err(PulseError::Config(
                "cloud url and anon_key must be set to sign in".to_string(),
            ));
        }
        Ok(Self {
            http: Client::builder().timeout(Duration::from_secs(15)).build()?,
            base_url: config.base_url().to_string(),
            anon_key: config.anon_key.clone(),
            provider: config.provider.clone(),
        })
    }

    pub fn authorize_url(&self, redirect_to: &str, challenge: &str) -> Result<Url> {
        Url::parse_with_params(
            &format!("{}/auth/v1/authorize", self.base_url),
            &[
                ("provider", self.provider.as_str()),
                ("redirect_to", redirect_to),
                ("code_challenge", challenge),
                ("code_challenge_method", "s256"),
            ],
        )
        .map_err(|e| PulseError::Auth(format!("invalid auth url: {e}")))
    }

    async fn token_request(
        &self,
        grant_type: &str,
        body: serde_json::Value,
    ) -> Result<AuthSession> {
        let response = self
            .http
            .post(format!("{}/auth/v1/token", self.base_url))
            .query(&[("grant_type", grant_type)])
            .header("apikey", &self.anon_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(match remote_error(response).await {
                PulseError::Remote { message, .. } => PulseError::Auth(message),
                other => other,
            });
        }
        let token: TokenResponse = response.json().await?;
        Ok(token.into())
    }

    pub async fn exchange_code(&self, code: &str, verifier: &str) -> Result<AuthSession> {
        let session = self
            .token_request("pkce", json!({"auth_code": code, "code_verifier": verifier}))
            .await?;
        info!(user = %session.user.id, "auth code exchanged");
        Ok(session)
    }

    pub async fn refresh(&self, session: &AuthSession) -> Result<AuthSession> {
        if session.refresh_token.is_empty() {
            return Err(PulseError::Auth("session expired, sign in again".to_string()));
        }
        self.token_request(
            "refresh_token",
            json!({"refresh_token": session.refresh_token}),
        )
        .await
    }
}

/// Where the browser goes after the callback.
///
/// `next` must be a path; anything else falls back to `/`.
pub fn callback_redirect(
    origin: &str,
    forwarded_host: Option<&str>,
    local_env: bool,
    next: Option<&str>,
    exchanged: bool,
) -> String {
    if !exchanged {
        return format!("{origin}{AUTH_ERROR_PATH}");
    }

    let next = match next {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    };

    match forwarded_host {
        Some(host) if !local_env && !host.is_empty() => format!("https://{host}{next}"),
        _ => format!("{origin}{next}"),
    }
}

#[derive(Debug, Deserialize)]
struct CallbackParams {
    code: Option<String>,
    next: Option<String>,
}

#[derive(Clone)]
struct CallbackState {
    client: AuthClient,
    verifier: Arc<String>,
    local_env: bool,
    fallback_origin: String,
    sessions: mpsc::Sender<AuthSession>,
}

async fn handle_callback(
    State(state): State<CallbackState>,
    headers: HeaderMap,
    Query(params): Query<CallbackParams>,
) -> Redirect {
    let origin = headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(|host| format!("http://{host}"))
        .unwrap_or_else(|| state.fallback_origin.clone());
    let forwarded_host = headers
        .get("x-forwarded-host")
        .and_then(|value| value.to_str().ok());

    let mut exchanged = false;
    if let Some(code) = params.code.as_deref() {
        match state.client.exchange_code(code, &state.verifier).await {
            Ok(session) => {
                exchanged = true;
                let _ = state.sessions.send(session).await;
            }
            Err(e) => warn!(error = %e, "auth code exchange failed"),
        }
    }

    Redirect::temporary(&callback_redirect(
        &origin,
        forwarded_host,
        state.local_env,
        params.next.as_deref(),
        exchanged,
    ))
}

async fn signed_in_page() -> Html<&'static str> {
    Html("<h1>Signed in to pulse</h1><p>You can close this tab and return to the terminal.</p>")
}

async fn auth_error_page() -> Html<&'static str> {
    Html(concat!(
        "<h1>Sign-in failed</h1>",
        "<p>The sign-in link was invalid or expired. Run <code>pulse login</code> again.</p>"
    ))
}

fn callback_router(state: CallbackState) -> Router {
    Router::new()
        .route("/auth/callback", get(handle_callback))
        .route(AUTH_ERROR_PATH, get(auth_error_page))
        .fallback(signed_in_page)
        .with_state(state)
}

/// Runs the loopback sign-in: prints the authorize URL through `show_url`,
/// serves the callback, and returns the exchanged session.
pub async fn sign_in(
    client: &AuthClient,
    port: u16,
    show_url: impl FnOnce(&Url),
) -> Result<AuthSession> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port))).await?;
    let origin = format!("http://{}", listener.local_addr()?);
    let pkce = PkcePair::generate();
    let url = client.authorize_url(&format!("{origin}/auth/callback"), &pkce.challenge)?;

    let (session_tx, mut session_rx) = mpsc::channel(1);
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let router = callback_router(CallbackState {
        client: client.clone(),
        verifier: Arc::new(pkce.verifier),
        local_env: true,
        fallback_origin: origin,
        sessions: session_tx,
    });

    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async {
                let _ = stop_rx.await;
            })
            .await
    });

    show_url(&url);
    let received = tokio::time::timeout(SIGN_IN_TIMEOUT, session_rx.recv()).await;
    let _ = stop_tx.send(());
    let _ = server.await;

    match received {
        Ok(Some(session)) => Ok(session),
        Ok(None) => Err(PulseError::Auth("callback server closed".to_string())),
        Err(_) => Err(PulseError::Auth("timed out waiting for sign-in".to_string())),
    }
}

pub fn session_path(state_dir: &Path) -> std::path::PathBuf {
    state_dir.join(crate::constants::FILE_NAMES.session)
}

pub fn load_session(path: &Path) -> Option<AuthSession> {
    if !path.exists() {
        return None;
    }
    storage::read_json(path)
        .map_err(|e| warn!(error = %e, "could not read stored session"))
        .ok()
}

/// Tokens never go through the rotating backups.
pub fn save_session(path: &Path, session: &AuthSession) -> Result<()> {
    storage::write_json_no_backup(path, session)
}

pub fn clear_session(path: &Path) -> Result<()> {
    storage::delete_file_if_exists(path)?;
    storage::remove_backups(path)
}

/// Refreshes and re-saves the stored session when its token is about to expire.
pub async fn ensure_fresh(
    client: &AuthClient,
    path: &Path,
    session: AuthSession,
) -> Result<AuthSession> {
    if !session.needs_refresh(Utc::now().timestamp()) {
        return Ok(session);
    }
    let refreshed = client.refresh(&session).await?;
    save_session(path, &refreshed)?;
    info!("session refreshed");
    Ok(refreshed)
}
