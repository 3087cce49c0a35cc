use podsync_api::spotify::AuthError;
use podsync_api::traits::{TokenSet, TokenStore};

use crate::db::KvHandle;

pub const TOKEN_KEY: &str = "spotify-oauth-tokens";

/// Persists the Spotify token pair as JSON in the key/value store.
#[derive(Clone)]
pub struct KvTokenStore {
    kv: KvHandle,
    key: String,
}

impl KvTokenStore {
    pub fn new(kv: KvHandle) -> Self {
        Self {
            kv,
            key: TOKEN_KEY.to_owned(),
        }
    }
}

impl TokenStore for KvTokenStore {
    async fn load(&self) -> Result<Option<TokenSet>, AuthError> {
        let raw = self
            .kv
            .get_item(self.key.as_str())
            .await
            .map_err(|e| AuthError::Store(e.to_string()))?;

        let Some(raw) = raw else {
            return Ok(None);
        };

        match serde_json::from_str(&raw) {
            Ok(tokens) => Ok(Some(tokens)),
            Err(e) => {
                // An unreadable token pair is as good as none: authorize again.
                tracing::warn!(error = %e, "stored Spotify tokens are unreadable, ignoring");
                Ok(None)
            }
        }
    }

    async fn save(&self, tokens: &TokenSet) -> Result<(), AuthError> {
        let raw = serde_json::to_string(tokens).map_err(|e| AuthError::Store(e.to_string()))?;
        self.kv
            .set_item(self.key.as_str(), raw)
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }

    async fn clear(&self) -> Result<(), AuthError> {
        self.kv
            .remove_item(self.key.as_str())
            .await
            .map_err(|e| AuthError::Store(e.to_string()))
    }
}
