//! App access tokens via the OAuth client-credentials grant.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::clock::{Clock, SystemClock};
use crate::error::TokenError;

/// A cached token is refreshed once it is this close to expiry (seconds).
pub const REFRESH_MARGIN_SECS: i64 = 120;

/// Token endpoint response.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenGrant {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(default)]
    pub token_type: String,
}

/// Performs one token exchange against the identity provider.
#[async_trait]
pub trait TokenExchange: Send + Sync {
    async fn exchange(&self) -> Result<TokenGrant, TokenError>;
}

/// Hands out a bearer token that is valid right now.
#[async_trait]
pub trait AccessTokenProvider: Send + Sync {
    async fn access_token(&self) -> Result<String, TokenError>;
}

pub struct ClientCredentialsExchange {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: String,
}

impl ClientCredentialsExchange {
    pub fn new(http: reqwest::Client, token_url: &str, client_id: &str, client_secret: &str) -> Self {
        Self {
            http,
            token_url: token_url.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
        }
    }
}

#[derive(Serialize)]
struct TokenRequest<'a> {
    client_id: &'a str,
    client_secret: &'a str,
    grant_type: &'a str,
}

#[async_trait]
impl TokenExchange for ClientCredentialsExchange {
    async fn exchange(&self) -> Result<TokenGrant, TokenError> {
        let response = self
            .http
            .post(&self.token_url)
            .form(&TokenRequest {
                client_id: &self.client_id,
                client_secret: &self.client_secret,
                grant_type: "client_credentials",
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TokenError::Status(status.as_u16()));
        }

        let grant: TokenGrant = response.json().await?;
        if grant.access_token.trim().is_empty() {
            return Err(TokenError::EmptyToken);
        }

        tracing::debug!(
            "Obtained Twitch app token (type {}, expires in {}s)",
            grant.token_type,
            grant.expires_in
        );
        Ok(grant)
    }
}

#[derive(Debug, Clone)]
struct CachedToken {
    value: String,
    expires_at: DateTime<Utc>,
}

/// Process-local token cache in front of a [`TokenExchange`].
///
/// Concurrent callers serialize on the cache lock, so at most one exchange is
/// in flight at a time.
pub struct TokenCache<E, C = SystemClock> {
    exchange: E,
    clock: C,
    cached: Mutex<Option<CachedToken>>,
}

impl<E: TokenExchange> TokenCache<E> {
    pub fn new(exchange: E) -> Self {
        Self::with_clock(exchange, SystemClock)
    }
}

impl<E: TokenExchange, C: Clock> TokenCache<E, C> {
    pub fn with_clock(exchange: E, clock: C) -> Self {
        Self {
            exchange,
            clock,
            cached: Mutex::new(None),
        }
    }
}

#[async_trait]
impl<E: TokenExchange, C: Clock> AccessTokenProvider for TokenCache<E, C> {
    async fn access_token(&self) -> Result<String, TokenError> {
        let mut cached = self.cached.lock().await;
        let now = self.clock.now();

        if let Some(token) = cached.as_ref() {
            if now < token.expires_at - Duration::seconds(REFRESH_MARGIN_SECS) {
                return Ok(token.value.clone());
            }
        }

        let grant = self.exchange.exchange().await?;
        let expires_at = Duration::try_seconds(grant.expires_in)
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .ok_or(TokenError::InvalidExpiry(grant.expires_in))?;
        let token = CachedToken {
            value: grant.access_token,
            expires_at,
        };
        let value = token.value.clone();
        *cached = Some(token);

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FixedClock;
    use chrono::TimeZone;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingExchange {
        calls: AtomicUsize,
        expires_in: i64,
    }

    impl CountingExchange {
        fn new(expires_in: i64) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                expires_in,
            }
        }
    }

    #[async_trait]
    impl TokenExchange for CountingExchange {
        async fn exchange(&self) -> Result<TokenGrant, TokenError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            Ok(TokenGrant {
                access_token: format!("token-{}", n),
                expires_in: self.expires_in,
                token_type: "bearer".to_string(),
            })
        }
    }

    struct FailingExchange;

    #[async_trait]
    impl TokenExchange for FailingExchange {
        async fn exchange(&self) -> Result<TokenGrant, TokenError> {
            Err(TokenError::Status(401))
        }
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 7, 12, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_token_reused_until_refresh_margin() {
        let clock = Arc::new(FixedClock::at(start()));
        let cache = TokenCache::with_clock(CountingExchange::new(3600), clock.clone());

        assert_eq!(cache.access_token().await.unwrap(), "token-1");

        // 57 minutes later: 3 minutes left, still outside the margin
        clock.advance(Duration::minutes(57));
        assert_eq!(cache.access_token().await.unwrap(), "token-1");
        assert_eq!(cache.exchange.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_token_refreshed_inside_margin() {
        let clock = Arc::new(FixedClock::at(start()));
        let cache = TokenCache::with_clock(CountingExchange::new(3600), clock.clone());

        cache.access_token().await.unwrap();

        // exactly 2 minutes before expiry
        clock.advance(Duration::minutes(58));
        assert_eq!(cache.access_token().await.unwrap(), "token-2");
        assert_eq!(cache.exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_short_lived_token_is_never_reused() {
        let clock = Arc::new(FixedClock::at(start()));
        let cache = TokenCache::with_clock(CountingExchange::new(60), clock);

        cache.access_token().await.unwrap();
        cache.access_token().await.unwrap();

        assert_eq!(cache.exchange.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_exchange_failure_propagates() {
        let cache = TokenCache::new(FailingExchange);

        let err = cache.access_token().await.unwrap_err();
        assert!(matches!(err, TokenError::Status(401)));
    }

    #[tokio::test]
    async fn test_out_of_range_lifetime_is_an_error() {
        let cache = TokenCache::new(CountingExchange::new(i64::MAX));

        let err = cache.access_token().await.unwrap_err();
        assert!(matches!(err, TokenError::InvalidExpiry(i64::MAX)));
        assert!(cache.cached.lock().await.is_none());
    }

    #[test]
    fn test_grant_parses_token_endpoint_body() {
        let body = r#"{"access_token":"abc","expires_in":5011271,"token_type":"bearer"}"#;
        let grant: TokenGrant = serde_json::from_str(body).unwrap();

        assert_eq!(grant.access_token, "abc");
        assert_eq!(grant.expires_in, 5011271);
        assert_eq!(grant.token_type, "bearer");
    }
}
