use std::future::Future;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use reqwest::Client;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::error::AuthError;
use crate::traits::TokenSet;

/// Lifetime assumed when the token endpoint omits `expires_in`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

/// Permissions requested during authorization.
pub const SCOPES: &[&str] = &[
    "playlist-modify-private",
    "playlist-modify-public",
    "playlist-read-collaborative",
    "playlist-read-private",
    "user-follow-read",
    "user-library-modify",
    "user-library-read",
    "user-read-playback-position",
    "user-modify-playback-state",
    "user-read-currently-playing",
    "user-read-playback-state",
    "user-read-private",
    "user-top-read",
];

#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    #[allow(dead_code)]
    pub token_type: Option<String>,
    #[allow(dead_code)]
    pub scope: Option<String>,
}

impl TokenResponse {
    /// Turn a token endpoint response into a storable token set.
    ///
    /// Refresh responses may omit `refresh_token`; the previous one stays valid
    /// in that case and is carried over.
    pub fn into_token_set(self, previous_refresh: Option<&str>, now: DateTime<Utc>) -> TokenSet {
        let lifetime = |secs: u64| {
            i64::try_from(secs)
                .ok()
                .and_then(Duration::try_seconds)
                .and_then(|d| now.checked_add_signed(d))
        };
        let expires_at = self
            .expires_in
            .and_then(lifetime)
            .or_else(|| lifetime(DEFAULT_EXPIRES_IN))
            .unwrap_or(now);

        TokenSet {
            access_token: self.access_token,
            refresh_token: self
                .refresh_token
                .or_else(|| previous_refresh.map(str::to_owned)),
            expires_at,
        }
    }
}

// ── PKCE ────────────────────────────────────────────────────────

/// Generate a PKCE code verifier (32 random bytes, base64url, 43 chars).
pub fn generate_code_verifier() -> String {
    random_token()
}

/// Compute code_challenge = base64url_nopad(sha256(verifier)).
pub fn compute_code_challenge(verifier: &str) -> String {
    let hash = Sha256::digest(verifier.as_bytes());
    URL_SAFE_NO_PAD.encode(hash)
}

/// Generate a random `state` parameter.
pub fn generate_state() -> String {
    random_token()
}

fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::rng().fill(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Everything needed to drive one authorization-code round trip.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: Url,
    pub redirect_uri: String,
    pub state: String,
    pub code_verifier: String,
}

impl AuthorizationRequest {
    /// Build a fresh PKCE request against `{accounts_base}/authorize`.
    pub fn new(accounts_base: &str, client_id: &str, redirect_uri: &str) -> Result<Self, AuthError> {
        let code_verifier = generate_code_verifier();
        let challenge = compute_code_challenge(&code_verifier);
        let state = generate_state();
        let scope = SCOPES.join(" ");

        let base = format!("{}/authorize", accounts_base.trim_end_matches('/'));
        let url = Url::parse_with_params(
            &base,
            &[
                ("response_type", "code"),
                ("client_id", client_id),
                ("redirect_uri", redirect_uri),
                ("scope", scope.as_str()),
                ("code_challenge_method", "S256"),
                ("code_challenge", challenge.as_str()),
                ("state", state.as_str()),
            ],
        )
        .map_err(|e| AuthError::Redirect(format!("invalid authorize URL: {e}")))?;

        Ok(Self {
            url,
            redirect_uri: redirect_uri.to_owned(),
            state,
            code_verifier,
        })
    }
}

// ── Token endpoint ──────────────────────────────────────────────

/// The provider's token endpoint.
pub trait TokenEndpoint: Send + Sync {
    /// Exchange an authorization code for tokens.
    fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> impl Future<Output = Result<TokenResponse, AuthError>> + Send;

    /// Trade a refresh token for a new access token.
    fn refresh(
        &self,
        refresh_token: &str,
    ) -> impl Future<Output = Result<TokenResponse, AuthError>> + Send;
}

/// Spotify's `/api/token`, called with URL-encoded form bodies.
pub struct SpotifyTokenEndpoint {
    http: Client,
    client_id: String,
    token_url: String,
}

impl SpotifyTokenEndpoint {
    pub fn new(client_id: impl Into<String>, accounts_base: &str) -> Self {
        Self {
            http: Client::new(),
            client_id: client_id.into(),
            token_url: format!("{}/api/token", accounts_base.trim_end_matches('/')),
        }
    }

    async fn post_form(&self, params: &[(&str, &str)]) -> Result<TokenResponse, AuthError> {
        let resp = self.http.post(&self.token_url).form(params).send().await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            tracing::warn!(status, "Spotify token request failed");
            return Err(AuthError::from_token_response(status, body));
        }

        resp.json::<TokenResponse>()
            .await
            .map_err(|e| AuthError::Transport(format!("malformed token response: {e}")))
    }
}

impl TokenEndpoint for SpotifyTokenEndpoint {
    async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<TokenResponse, AuthError> {
        self.post_form(&[
            ("client_id", self.client_id.as_str()),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ])
        .await
    }

    async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
        self.post_form(&[
            ("client_id", self.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ])
        .await
    }
}

// ── Consent prompt ──────────────────────────────────────────────

/// Interactive half of the flow: show the consent page, hand back the code.
pub trait ConsentPrompt: Send + Sync {
    /// Redirect URI the prompt listens on; sent in both authorize and token calls.
    fn redirect_uri(&self) -> String;

    fn obtain_code(
        &self,
        request: &AuthorizationRequest,
    ) -> impl Future<Output = Result<String, AuthError>> + Send;
}

/// Launches the consent page; `open::that` outside tests.
pub type Opener = Box<dyn Fn(&str) -> std::io::Result<()> + Send + Sync>;

/// Opens the consent page in the default browser and waits for the redirect
/// on a loopback port.
pub struct BrowserPrompt {
    port: u16,
    opener: Opener,
}

impl BrowserPrompt {
    pub fn new(port: u16) -> Self {
        Self::with_opener(port, Box::new(|url: &str| open::that(url)))
    }

    pub fn with_opener(port: u16, opener: Opener) -> Self {
        Self { port, opener }
    }
}

const NOT_FOUND_REPLY: &str =
    "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n";

/// Whether a raw HTTP request targets the redirect path.
fn is_callback_request(raw: &str) -> bool {
    raw.lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .is_some_and(|path| path == "/callback" || path.starts_with("/callback?"))
}

impl ConsentPrompt for BrowserPrompt {
    fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/callback", self.port)
    }

    async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String, AuthError> {
        // Bind before the browser opens so a fast redirect cannot race us.
        let listener = TcpListener::bind(("127.0.0.1", self.port))
            .await
            .map_err(|e| AuthError::Redirect(format!("failed to bind 127.0.0.1:{}: {e}", self.port)))?;

        tracing::info!("Opening Spotify authorization URL in browser");
        (self.opener)(request.url.as_str())
            .map_err(|e| AuthError::Redirect(format!("failed to open browser: {e}")))?;

        tracing::info!(port = self.port, "Waiting for Spotify OAuth redirect...");
        let mut buf = [0u8; 4096];
        loop {
            let (mut stream, _) = listener
                .accept()
                .await
                .map_err(|e| AuthError::Redirect(format!("failed to accept connection: {e}")))?;

            let n = match stream.read(&mut buf).await {
                Ok(n) => n,
                Err(e) => {
                    tracing::debug!(error = %e, "unreadable connection on redirect port");
                    continue;
                }
            };
            let raw = String::from_utf8_lossy(&buf[..n]);

            // Browsers preconnect and ask for favicons; only the callback counts.
            if !is_callback_request(&raw) {
                tracing::debug!("ignoring non-callback request on redirect port");
                let _ = stream.write_all(NOT_FOUND_REPLY.as_bytes()).await;
                continue;
            }

            let outcome = parse_redirect(&raw, &request.state);
            let page = match &outcome {
                Ok(_) => "<h2>Spotify connected.</h2><p>You can close this tab and return to podsync.</p>",
                Err(_) => "<h2>Spotify authorization failed.</h2><p>Return to podsync for details.</p>",
            };
            let response = format!(
                "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\nConnection: close\r\n\r\n\
                 <html><body>{page}</body></html>"
            );
            let _ = stream.write_all(response.as_bytes()).await;

            return outcome;
        }
    }
}

/// Extract the authorization code from the raw redirect HTTP request.
///
/// `error=access_denied` (the user pressed cancel) maps to
/// [`AuthError::Cancelled`]; a missing or foreign `state` is rejected.
pub fn parse_redirect(raw_request: &str, expected_state: &str) -> Result<String, AuthError> {
    // "GET /callback?code=...&state=... HTTP/1.1"
    let path = raw_request
        .lines()
        .next()
        .and_then(|line| line.split_whitespace().nth(1))
        .ok_or_else(|| AuthError::Redirect("malformed HTTP request from redirect".into()))?;

    let parsed = Url::parse(&format!("http://localhost{path}"))
        .map_err(|e| AuthError::Redirect(format!("failed to parse redirect URL: {e}")))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (k, v) in parsed.query_pairs() {
        match k.as_ref() {
            "code" => code = Some(v.into_owned()),
            "state" => state = Some(v.into_owned()),
            "error" => error = Some(v.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return if error == "access_denied" {
            Err(AuthError::Cancelled)
        } else {
            Err(AuthError::Redirect(format!("provider returned error: {error}")))
        };
    }

    if state.as_deref() != Some(expected_state) {
        return Err(AuthError::Redirect("state mismatch in redirect".into()));
    }

    code.ok_or_else(|| AuthError::Redirect("no 'code' parameter in redirect".into()))
}
