//! Provider abstraction for remote game-history sources.
//!
//! This module defines the [`GameSource`] trait, a unified interface for pulling a
//! player's game history from any chess server (Lichess today). Each concrete
//! provider handles vendor-specific pagination, rate limits and response decoding,
//! and yields vendor-neutral [`RawGame`] records newest-first.
//!
//! The trait supports dynamic dispatch (`dyn GameSource`) so the sync layer can
//! pick a provider at runtime, and so tests can substitute a scripted source.
//!
//! # Example
//!
//! ```rust
//! use async_trait::async_trait;
//! use futures::stream::{self, StreamExt};
//! use game_ingestor::models::request_params::GamesRequestParams;
//! use game_ingestor::providers::{GameSource, GameStream, ProviderError};
//!
//! struct NoGames;
//!
//! #[async_trait]
//! impl GameSource for NoGames {
//!     async fn stream_games(
//!         &self,
//!         _params: &GamesRequestParams,
//!     ) -> Result<GameStream, ProviderError> {
//!         Ok(stream::empty().boxed())
//!     }
//! }
//! ```

pub mod lichess;

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use shared_utils::env::MissingEnvVarError;
use snafu::{Backtrace, Snafu};

use crate::models::{batch::GameBatch, game::RawGame, request_params::GamesRequestParams};

/// A stream of decoded records, newest first. Each item is yielded as soon as
/// its line has fully arrived.
pub type GameStream = BoxStream<'static, Result<RawGame, ProviderError>>;

/// Trait for fetching a player's game history from a remote source.
#[async_trait]
pub trait GameSource: Send + Sync {
    /// Opens a streamed response for the given window.
    ///
    /// Rate limiting and transient failures while *opening* the stream are
    /// retried inside the provider; errors after the first byte surface as
    /// stream items.
    async fn stream_games(&self, params: &GamesRequestParams) -> Result<GameStream, ProviderError>;

    /// Fetches one bounded batch, newest first.
    ///
    /// # Returns
    ///
    /// * `Ok(GameBatch)` - possibly empty; an empty batch means the window is exhausted.
    /// * `Err(ProviderError)` - the request failed after any retries.
    async fn fetch_games(&self, params: &GamesRequestParams) -> Result<GameBatch, ProviderError> {
        let mut stream = self.stream_games(params).await?;
        let mut batch = GameBatch::default();
        while let Some(game) = stream.next().await {
            batch.push(game?);
            if params.max.is_some_and(|max| batch.len() >= max as usize) {
                break;
            }
        }
        Ok(batch)
    }
}

/// Errors that can occur during the creation of a provider instance
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderInitError {
    /// missed environment variable.
    #[snafu(display("Missing environment variable: {source}"))]
    MissingEnvVar {
        source: MissingEnvVarError,
        backtrace: Backtrace,
    },

    /// failed to init reqwest client
    #[snafu(display("Failed to build HTTP client: {source}"))]
    ClientBuild {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The configured base URL does not parse or cannot carry a path.
    #[snafu(display("Invalid base URL: {url}"))]
    InvalidBaseUrl { url: String, backtrace: Backtrace },

    /// API token contains invalid characters.
    #[snafu(display("Invalid API token format: {source}"))]
    InvalidToken {
        source: reqwest::header::InvalidHeaderValue,
        backtrace: Backtrace,
    },
}

/// Errors that can occur within a `GameSource` implementation.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum ProviderError {
    /// Network failure, timeout, or a broken body stream.
    #[snafu(display("API request failed: {source}"))]
    Reqwest {
        source: reqwest::Error,
        backtrace: Backtrace,
    },

    /// The source kept answering 429 after every allowed attempt.
    #[snafu(display("rate limited by upstream after {attempts} attempts"))]
    RateLimited { attempts: u32, backtrace: Backtrace },

    /// The source kept failing with a 5xx status after every allowed attempt.
    #[snafu(display("upstream server error {status}: {message}"))]
    Server {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// The requested player does not exist on the source.
    #[snafu(display("unknown player: {subject}"))]
    NotFound {
        subject: String,
        backtrace: Backtrace,
    },

    /// A definitive client error (4xx other than 404/429).
    #[snafu(display("upstream rejected request with {status}: {message}"))]
    Status {
        status: u16,
        message: String,
        backtrace: Backtrace,
    },

    /// A record arrived but is not valid JSON for the expected shape.
    #[snafu(display("malformed record from upstream: {source}"))]
    Decode {
        source: serde_json::Error,
        backtrace: Backtrace,
    },

    /// An error during provider configuration or initialization.
    #[snafu(display("Provider initialization error: {source}"))]
    Init {
        #[snafu(backtrace)]
        source: ProviderInitError,
    },
}

impl ProviderError {
    /// Transient errors are worth retrying from the same cursor on the next
    /// invocation; permanent ones need a human to fix input first.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Reqwest { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_body() || source.is_request()
            }
            ProviderError::RateLimited { .. } | ProviderError::Server { .. } => true,
            ProviderError::NotFound { .. }
            | ProviderError::Status { .. }
            | ProviderError::Decode { .. }
            | ProviderError::Init { .. } => false,
        }
    }

    /// HTTP status surfaced by the upstream, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ProviderError::RateLimited { .. } => Some(429),
            ProviderError::NotFound { .. } => Some(404),
            ProviderError::Server { status, .. } | ProviderError::Status { status, .. } => {
                Some(*status)
            }
            ProviderError::Reqwest { source, .. } => source.status().map(|s| s.as_u16()),
            ProviderError::Decode { .. } | ProviderError::Init { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use chrono::{Duration, TimeZone, Utc};
    use futures::stream;

    use super::*;

    /// Serves a fixed list, honoring `max` by itself only through the default `fetch_games`.
    struct FixedSource {
        games: Vec<RawGame>,
        seen: Mutex<Vec<GamesRequestParams>>,
    }

    #[async_trait]
    impl GameSource for FixedSource {
        async fn stream_games(
            &self,
            params: &GamesRequestParams,
        ) -> Result<GameStream, ProviderError> {
            self.seen.lock().unwrap().push(params.clone());
            Ok(stream::iter(self.games.clone().into_iter().map(Ok)).boxed())
        }
    }

    fn source(n: i64) -> FixedSource {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let games = (0..n)
            .map(|i| RawGame {
                id: format!("g{i}"),
                created_at: Some(base - Duration::minutes(i)),
                ..Default::default()
            })
            .collect();
        FixedSource {
            games,
            seen: Mutex::new(vec![]),
        }
    }

    #[tokio::test]
    async fn default_fetch_stops_at_max() {
        let src = source(10);
        let batch = src
            .fetch_games(&GamesRequestParams::newest("someone", 4))
            .await
            .unwrap();
        assert_eq!(batch.len(), 4);
        assert_eq!(batch.games[0].id, "g0");
        assert_eq!(batch.oldest, src.games[3].created_at);
        assert_eq!(batch.newest, src.games[0].created_at);
        assert_eq!(src.seen.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn dynamic_dispatch_over_sources() {
        let boxed: Box<dyn GameSource> = Box::new(source(0));
        let batch = boxed
            .fetch_games(&GamesRequestParams::newest("someone", 4))
            .await
            .unwrap();
        assert!(batch.is_empty());
        assert!(batch.oldest.is_none());
    }

    #[test]
    fn transient_classification() {
        let limited = RateLimitedSnafu { attempts: 3u32 }.build();
        assert!(limited.is_transient());
        assert_eq!(limited.status(), Some(429));

        let missing = NotFoundSnafu { subject: "nobody" }.build();
        assert!(!missing.is_transient());
        assert_eq!(missing.status(), Some(404));
    }
}
