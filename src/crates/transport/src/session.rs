//! Token cache for one controller session
//!
//! The cache lives behind an async mutex so token acquisition is a critical
//! section: concurrent requests that find no usable token queue up, and the
//! first one through acquires while the rest reuse its result.

use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard};
use tokio::time::Instant;

/// A token handed to one request, tagged with the cache generation it came from
#[derive(Clone, PartialEq, Eq)]
pub struct Token {
    pub value: String,
    pub generation: u64,
}

impl std::fmt::Debug for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Token")
            .field("value", &"[REDACTED]")
            .field("generation", &self.generation)
            .finish()
    }
}

#[derive(Debug)]
struct CachedToken {
    value: String,
    acquired_at: Instant,
}

/// Cached token state guarded by [`Session`]
#[derive(Debug, Default)]
pub struct TokenCache {
    token: Option<CachedToken>,
    generation: u64,
}

impl TokenCache {
    /// The cached token if it is younger than `ttl`
    pub fn fresh(&self, ttl: Duration) -> Option<Token> {
        self.token
            .as_ref()
            .filter(|cached| cached.acquired_at.elapsed() < ttl)
            .map(|cached| Token {
                value: cached.value.clone(),
                generation: self.generation,
            })
    }

    /// Store a newly acquired token, starting a new generation
    pub fn store(&mut self, value: String) -> Token {
        self.generation += 1;
        self.token = Some(CachedToken {
            value: value.clone(),
            acquired_at: Instant::now(),
        });
        Token {
            value,
            generation: self.generation,
        }
    }

    /// Drop the token a request was rejected with
    ///
    /// A no-op when another request already replaced it, so the caller
    /// picks up the newer token instead of acquiring yet another.
    pub fn invalidate(&mut self, generation: u64) -> bool {
        if self.generation == generation && self.token.is_some() {
            self.token = None;
            true
        } else {
            false
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn acquired_at(&self) -> Option<Instant> {
        self.token.as_ref().map(|cached| cached.acquired_at)
    }
}

/// Per-session authentication state
#[derive(Debug, Default)]
pub struct Session {
    cache: Mutex<TokenCache>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter the token critical section
    pub async fn lock(&self) -> MutexGuard<'_, TokenCache> {
        self.cache.lock().await
    }

    pub async fn invalidate(&self, generation: u64) -> bool {
        self.cache.lock().await.invalidate(generation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_token_expires_after_ttl() {
        let session = Session::new();
        let ttl = Duration::from_secs(3300);

        let token = session.lock().await.store("abc".to_string());
        assert_eq!(token.generation, 1);
        assert_eq!(session.lock().await.fresh(ttl), Some(token));

        tokio::time::advance(Duration::from_secs(3301)).await;
        assert!(session.lock().await.fresh(ttl).is_none());
    }

    #[tokio::test]
    async fn test_invalidate_only_matching_generation() {
        let session = Session::new();
        let ttl = Duration::from_secs(60);

        let first = session.lock().await.store("one".to_string());
        let second = session.lock().await.store("two".to_string());

        // A request still holding the first token must not discard the second.
        assert!(!session.invalidate(first.generation).await);
        assert_eq!(session.lock().await.fresh(ttl), Some(second.clone()));

        assert!(session.invalidate(second.generation).await);
        assert!(session.lock().await.fresh(ttl).is_none());
        assert_eq!(session.lock().await.generation(), 2);
    }

    #[test]
    fn test_token_debug_is_redacted() {
        let token = Token {
            value: "eyJhbGciOi".to_string(),
            generation: 3,
        };
        assert!(!format!("{:?}", token).contains("eyJ"));
    }
}
