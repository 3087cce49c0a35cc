pub mod auth;
pub mod authorizer;
pub mod batch;
pub mod client;
pub mod error;
pub mod paging;
pub mod types;

pub use authorizer::Authorizer;
pub use client::{Fetched, SpotifyClient};
pub use error::{AuthError, SpotifyError};
