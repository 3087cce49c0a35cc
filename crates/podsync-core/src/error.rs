use podsync_api::spotify::{AuthError, SpotifyError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("Spotify error: {0}")]
    Api(#[from] SpotifyError),

    #[error("auth error: {0}")]
    Auth(#[from] AuthError),

    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage actor closed")]
    ActorClosed,
}
