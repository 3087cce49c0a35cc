//! Spotify Web API access for podsync: PKCE authorization with single-flight
//! token refresh, an authenticated request client, and the pagination and
//! batch lookup helpers built on it.

pub mod spotify;
pub mod traits;
