//! Token lifecycle: reuse, refresh, or run the PKCE flow, with at most one
//! authorization in flight per authorizer.

use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use futures::future::{BoxFuture, FutureExt, Shared};

use super::auth::{AuthorizationRequest, ConsentPrompt, TokenEndpoint};
use super::error::AuthError;
use crate::traits::{AccessTokenProvider, TokenStore};

type Flight = Shared<BoxFuture<'static, Result<String, AuthError>>>;

/// Hands out access tokens, authorizing or refreshing as needed.
///
/// Cloning is cheap and clones share the same in-flight slot, so every
/// command in the process can hold its own handle.
pub struct Authorizer<E, P, S> {
    inner: Arc<Inner<E, P, S>>,
}

struct Inner<E, P, S> {
    endpoint: E,
    prompt: P,
    store: S,
    client_id: String,
    accounts_base: String,
    pending: Mutex<Option<Flight>>,
}

impl<E, P, S> Clone for Authorizer<E, P, S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E, P, S> Authorizer<E, P, S>
where
    E: TokenEndpoint + 'static,
    P: ConsentPrompt + 'static,
    S: TokenStore + 'static,
{
    pub fn new(
        endpoint: E,
        prompt: P,
        store: S,
        client_id: impl Into<String>,
        accounts_base: impl Into<String>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                endpoint,
                prompt,
                store,
                client_id: client_id.into(),
                accounts_base: accounts_base.into(),
                pending: Mutex::new(None),
            }),
        }
    }

    /// Return a valid access token.
    ///
    /// Concurrent callers share one pending authorization: whoever arrives
    /// while a flight is running awaits that flight instead of starting a
    /// second browser prompt or refresh.
    pub async fn authorize(&self) -> Result<String, AuthError> {
        let flight = self.join_or_start();
        let result = flight.clone().await;
        self.land(&flight);
        result
    }

    /// Drop stored tokens; the next `authorize` starts from scratch.
    pub async fn invalidate(&self) -> Result<(), AuthError> {
        self.inner.store.clear().await
    }

    fn join_or_start(&self) -> Flight {
        let mut slot = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);

        if let Some(flight) = slot.as_ref() {
            if flight.peek().is_none() {
                return flight.clone();
            }
        }

        let inner = Arc::clone(&self.inner);
        let flight = async move { inner.run().await }.boxed().shared();
        *slot = Some(flight.clone());
        flight
    }

    fn land(&self, flight: &Flight) {
        let mut slot = self
            .inner
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if slot.as_ref().is_some_and(|f| f.ptr_eq(flight)) {
            *slot = None;
        }
    }
}

impl<E, P, S> Inner<E, P, S>
where
    E: TokenEndpoint,
    P: ConsentPrompt,
    S: TokenStore,
{
    async fn run(&self) -> Result<String, AuthError> {
        match self.authorize_once().await {
            Err(AuthError::VerifierMismatch(body)) => {
                tracing::warn!(%body, "code verifier rejected, retrying authorization once");
                self.store.clear().await?;
                self.authorize_once().await
            }
            other => other,
        }
    }

    async fn authorize_once(&self) -> Result<String, AuthError> {
        if let Some(tokens) = self.store.load().await? {
            if !tokens.is_expired() {
                return Ok(tokens.access_token);
            }

            if let Some(refresh_token) = tokens.refresh_token.as_deref() {
                match self.endpoint.refresh(refresh_token).await {
                    Ok(resp) => {
                        let refreshed = resp.into_token_set(Some(refresh_token), Utc::now());
                        self.store.save(&refreshed).await?;
                        tracing::debug!("Spotify access token refreshed");
                        return Ok(refreshed.access_token);
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "token refresh failed, discarding stored tokens");
                    }
                }
            }

            self.store.clear().await?;
        }

        self.authorize_interactive().await
    }

    async fn authorize_interactive(&self) -> Result<String, AuthError> {
        let redirect_uri = self.prompt.redirect_uri();
        let request = AuthorizationRequest::new(&self.accounts_base, &self.client_id, &redirect_uri)?;

        let code = self.prompt.obtain_code(&request).await?;
        let resp = self
            .endpoint
            .exchange_code(&code, &request.code_verifier, &request.redirect_uri)
            .await?;

        let tokens = resp.into_token_set(None, Utc::now());
        self.store.save(&tokens).await?;
        tracing::info!("Spotify authorization complete");
        Ok(tokens.access_token)
    }
}

impl<E, P, S> AccessTokenProvider for Authorizer<E, P, S>
where
    E: TokenEndpoint + 'static,
    P: ConsentPrompt + 'static,
    S: TokenStore + 'static,
{
    async fn access_token(&self) -> Result<String, AuthError> {
        self.authorize().await
    }

    async fn invalidate(&self) -> Result<(), AuthError> {
        Authorizer::invalidate(self).await
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    use chrono::{DateTime, Duration};

    use super::*;
    use crate::spotify::auth::TokenResponse;
    use crate::traits::TokenSet;

    #[derive(Default)]
    struct MemoryStore {
        tokens: Mutex<Option<TokenSet>>,
    }

    impl MemoryStore {
        fn with(tokens: TokenSet) -> Self {
            Self {
                tokens: Mutex::new(Some(tokens)),
            }
        }
    }

    impl TokenStore for Arc<MemoryStore> {
        async fn load(&self) -> Result<Option<TokenSet>, AuthError> {
            Ok(self.tokens.lock().unwrap().clone())
        }

        async fn save(&self, tokens: &TokenSet) -> Result<(), AuthError> {
            *self.tokens.lock().unwrap() = Some(tokens.clone());
            Ok(())
        }

        async fn clear(&self) -> Result<(), AuthError> {
            *self.tokens.lock().unwrap() = None;
            Ok(())
        }
    }

    #[derive(Default)]
    struct FakeEndpoint {
        refresh_calls: AtomicUsize,
        exchange_calls: AtomicUsize,
        refresh_fails: bool,
        exchange_failures: Mutex<VecDeque<AuthError>>,
    }

    impl TokenEndpoint for Arc<FakeEndpoint> {
        async fn exchange_code(
            &self,
            code: &str,
            code_verifier: &str,
            _redirect_uri: &str,
        ) -> Result<TokenResponse, AuthError> {
            let n = self.exchange_calls.fetch_add(1, Ordering::SeqCst) + 1;
            assert_eq!(code, "the-code");
            assert_eq!(code_verifier.len(), 43);
            if let Some(err) = self.exchange_failures.lock().unwrap().pop_front() {
                return Err(err);
            }
            Ok(response(&format!("exchanged-{n}"), Some("fresh-refresh")))
        }

        async fn refresh(&self, refresh_token: &str) -> Result<TokenResponse, AuthError> {
            self.refresh_calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(refresh_token, "old-refresh");
            if self.refresh_fails {
                return Err(AuthError::Rejected {
                    status: 400,
                    body: "invalid_grant".into(),
                });
            }
            Ok(response("refreshed", None))
        }
    }

    #[derive(Default)]
    struct FakePrompt {
        calls: AtomicUsize,
        cancel: bool,
    }

    impl ConsentPrompt for Arc<FakePrompt> {
        fn redirect_uri(&self) -> String {
            "http://127.0.0.1:0/callback".into()
        }

        async fn obtain_code(&self, request: &AuthorizationRequest) -> Result<String, AuthError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(request.redirect_uri, "http://127.0.0.1:0/callback");
            tokio::time::sleep(StdDuration::from_millis(50)).await;
            if self.cancel {
                return Err(AuthError::Cancelled);
            }
            Ok("the-code".into())
        }
    }

    fn response(access: &str, refresh: Option<&str>) -> TokenResponse {
        TokenResponse {
            access_token: access.into(),
            refresh_token: refresh.map(str::to_owned),
            expires_in: Some(3600),
            token_type: Some("Bearer".into()),
            scope: None,
        }
    }

    fn stored(access: &str, expires_at: DateTime<Utc>) -> TokenSet {
        TokenSet {
            access_token: access.into(),
            refresh_token: Some("old-refresh".into()),
            expires_at,
        }
    }

    type TestAuthorizer = Authorizer<Arc<FakeEndpoint>, Arc<FakePrompt>, Arc<MemoryStore>>;

    fn authorizer(
        endpoint: &Arc<FakeEndpoint>,
        prompt: &Arc<FakePrompt>,
        store: &Arc<MemoryStore>,
    ) -> TestAuthorizer {
        Authorizer::new(
            Arc::clone(endpoint),
            Arc::clone(prompt),
            Arc::clone(store),
            "client-1",
            "https://accounts.example.test",
        )
    }

    #[tokio::test]
    async fn test_unexpired_token_needs_no_network() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::with(stored(
            "valid",
            Utc::now() + Duration::hours(1),
        )));

        let token = authorizer(&endpoint, &prompt, &store).authorize().await.unwrap();

        assert_eq!(token, "valid");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
        assert_eq!(endpoint.exchange_calls.load(Ordering::SeqCst), 0);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_expired_token_is_refreshed_once() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::with(stored(
            "stale",
            Utc::now() - Duration::minutes(5),
        )));

        let token = authorizer(&endpoint, &prompt, &store).authorize().await.unwrap();

        assert_eq!(token, "refreshed");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 0);

        let saved = store.tokens.lock().unwrap().clone().unwrap();
        assert_eq!(saved.access_token, "refreshed");
        assert_eq!(saved.refresh_token.as_deref(), Some("old-refresh"));
        assert!(!saved.is_expired());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_refresh_falls_back_to_full_flow() {
        let endpoint = Arc::new(FakeEndpoint {
            refresh_fails: true,
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::with(stored(
            "stale",
            Utc::now() - Duration::minutes(5),
        )));

        let token = authorizer(&endpoint, &prompt, &store).authorize().await.unwrap();

        assert_eq!(token, "exchanged-1");
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 1);
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        let saved = store.tokens.lock().unwrap().clone().unwrap();
        assert_eq!(saved.refresh_token.as_deref(), Some("fresh-refresh"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_callers_share_one_flow() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::default());
        let auth = authorizer(&endpoint, &prompt, &store);

        let calls = (0..8).map(|_| {
            let auth = auth.clone();
            async move { auth.authorize().await }
        });
        let results = futures::future::join_all(calls).await;

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 1);
        assert_eq!(endpoint.exchange_calls.load(Ordering::SeqCst), 1);
        for result in results {
            assert_eq!(result.unwrap(), "exchanged-1");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_verifier_mismatch_retries_once() {
        let endpoint = Arc::new(FakeEndpoint {
            exchange_failures: Mutex::new(VecDeque::from([AuthError::VerifierMismatch(
                "code_verifier was incorrect".into(),
            )])),
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::default());

        let token = authorizer(&endpoint, &prompt, &store).authorize().await.unwrap();

        assert_eq!(token, "exchanged-2");
        assert_eq!(prompt.calls.load(Ordering::SeqCst), 2);
        assert_eq!(endpoint.exchange_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_verifier_mismatch_propagates() {
        let mismatch = AuthError::VerifierMismatch("code_verifier was incorrect".into());
        let endpoint = Arc::new(FakeEndpoint {
            exchange_failures: Mutex::new(VecDeque::from([mismatch.clone(), mismatch.clone()])),
            ..Default::default()
        });
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::default());

        let err = authorizer(&endpoint, &prompt, &store)
            .authorize()
            .await
            .unwrap_err();

        assert_eq!(err, mismatch);
        assert_eq!(endpoint.exchange_calls.load(Ordering::SeqCst), 2);
        assert!(store.tokens.lock().unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_propagates_and_next_call_starts_new_flight() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt {
            cancel: true,
            ..Default::default()
        });
        let store = Arc::new(MemoryStore::default());
        let auth = authorizer(&endpoint, &prompt, &store);

        assert_eq!(auth.authorize().await, Err(AuthError::Cancelled));
        assert_eq!(auth.authorize().await, Err(AuthError::Cancelled));

        assert_eq!(prompt.calls.load(Ordering::SeqCst), 2);
        assert_eq!(endpoint.exchange_calls.load(Ordering::SeqCst), 0);
        assert!(store.tokens.lock().unwrap().is_none());
    }

    #[tokio::test]
    async fn test_invalidate_clears_store() {
        let endpoint = Arc::new(FakeEndpoint::default());
        let prompt = Arc::new(FakePrompt::default());
        let store = Arc::new(MemoryStore::with(stored(
            "valid",
            Utc::now() + Duration::hours(1),
        )));
        let auth = authorizer(&endpoint, &prompt, &store);

        auth.invalidate().await.unwrap();
        assert!(store.tokens.lock().unwrap().is_none());
        assert_eq!(endpoint.refresh_calls.load(Ordering::SeqCst), 0);
    }
}
