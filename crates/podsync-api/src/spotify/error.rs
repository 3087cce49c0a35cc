use thiserror::Error;

/// Errors from the authorization layer.
///
/// `Clone` because a single in-flight authorization is shared by every caller
/// waiting on it, and each of them gets its own copy of the outcome.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("authorization cancelled")]
    Cancelled,

    #[error("token endpoint rejected the request (status {status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("code verifier rejected: {0}")]
    VerifierMismatch(String),

    #[error("redirect error: {0}")]
    Redirect(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("token store error: {0}")]
    Store(String),
}

impl AuthError {
    /// Classify a non-success token endpoint response.
    ///
    /// Spotify answers a bad PKCE verifier with `invalid_grant` and a
    /// description mentioning the verifier; that case is retried once by the
    /// authorizer, everything else is a plain rejection.
    pub fn from_token_response(status: u16, body: String) -> Self {
        let lowered = body.to_ascii_lowercase();
        if lowered.contains("code_verifier") || lowered.contains("code verifier") {
            AuthError::VerifierMismatch(body)
        } else {
            AuthError::Rejected { status, body }
        }
    }
}

impl From<reqwest::Error> for AuthError {
    fn from(e: reqwest::Error) -> Self {
        AuthError::Transport(e.to_string())
    }
}

/// Errors from the Spotify Web API client.
#[derive(Debug, Error)]
pub enum SpotifyError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("API error (status {status}): {body}")]
    Api { status: u16, body: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("request path is empty")]
    InvalidPath,

    #[error("pagination link outside the API base: {0}")]
    ForeignLink(String),
}
