//! Seams between the Spotify client and its collaborators.
//!
//! The authorizer persists tokens through [`TokenStore`], and the request
//! client obtains bearer tokens through [`AccessTokenProvider`]. Both are
//! implemented by production types elsewhere in the workspace and by small
//! fakes in tests.

use std::future::Future;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::spotify::AuthError;

/// Tokens are treated as expired this long before their real expiry so a
/// request never leaves with a token that dies in flight.
pub const EXPIRY_SKEW: Duration = Duration::seconds(10);

/// An access/refresh token pair with its expiry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenSet {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl TokenSet {
    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now + EXPIRY_SKEW >= self.expires_at
    }
}

/// Durable storage for the single token set.
pub trait TokenStore: Send + Sync {
    fn load(&self) -> impl Future<Output = Result<Option<TokenSet>, AuthError>> + Send;

    fn save(&self, tokens: &TokenSet) -> impl Future<Output = Result<(), AuthError>> + Send;

    fn clear(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}

/// Anything that can hand out a valid bearer token.
pub trait AccessTokenProvider: Send + Sync {
    /// Return a currently valid access token, authorizing if needed.
    fn access_token(&self) -> impl Future<Output = Result<String, AuthError>> + Send;

    /// Forget stored credentials so the next `access_token` call starts over.
    fn invalidate(&self) -> impl Future<Output = Result<(), AuthError>> + Send;
}
