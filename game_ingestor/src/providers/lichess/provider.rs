use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use nonzero_ext::nonzero;
use reqwest::{Client, Response, StatusCode, Url, header};
use secrecy::{ExposeSecret, SecretString};
use shared_utils::env::get_env_var_opt;
use snafu::{OptionExt, ResultExt};
use tracing::{debug, warn};

use crate::{
    models::{game::RawGame, request_params::GamesRequestParams},
    ndjson::LineStream,
    providers::{
        ClientBuildSnafu, DecodeSnafu, GameSource, GameStream, InvalidBaseUrlSnafu,
        InvalidTokenSnafu, NotFoundSnafu, ProviderError, ProviderInitError, RateLimitedSnafu,
        ReqwestSnafu, ServerSnafu, StatusSnafu,
        lichess::{params::construct_params, response::LichessGame},
    },
    retry::RetryPolicy,
};

pub const DEFAULT_BASE_URL: &str = "https://lichess.org";
pub const DEFAULT_TOKEN_ENV: &str = "LICHESS_TOKEN";

/// Connection settings for [`LichessProvider`].
#[derive(Debug)]
pub struct LichessConfig {
    pub base_url: String,
    /// Optional personal API token; raises the server-side rate limit.
    pub token: Option<SecretString>,
    /// Client-side pacing so we stay under the server's limit in the first place.
    pub requests_per_minute: NonZeroU32,
    pub retry: RetryPolicy,
    /// Per-request timeout for connecting and receiving headers.
    pub connect_timeout: Duration,
}

impl Default for LichessConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            token: None,
            requests_per_minute: nonzero!(30u32),
            retry: RetryPolicy::default(),
            connect_timeout: Duration::from_secs(30),
        }
    }
}

pub struct LichessProvider {
    client: Client,
    base_url: Url,
    limiter: DefaultDirectRateLimiter,
    retry: RetryPolicy,
}

impl LichessProvider {
    /// Creates a provider against lichess.org.
    ///
    /// Reads an optional API token from the `LICHESS_TOKEN` environment variable.
    pub fn new() -> Result<Self, ProviderInitError> {
        let config = LichessConfig {
            token: get_env_var_opt(DEFAULT_TOKEN_ENV).map(|t| SecretString::new(t.into())),
            ..LichessConfig::default()
        };
        Self::with_config(config)
    }

    pub fn with_config(config: LichessConfig) -> Result<Self, ProviderInitError> {
        let base_url = Url::parse(&config.base_url)
            .ok()
            .filter(|u| !u.cannot_be_a_base())
            .context(InvalidBaseUrlSnafu {
                url: config.base_url.clone(),
            })?;

        let mut headers = header::HeaderMap::new();
        headers.insert(
            header::ACCEPT,
            header::HeaderValue::from_static("application/x-ndjson"),
        );
        if let Some(token) = &config.token {
            headers.insert(
                header::AUTHORIZATION,
                header::HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
                    .context(InvalidTokenSnafu)?,
            );
        }

        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(config.connect_timeout)
            .build()
            .context(ClientBuildSnafu)?;

        Ok(Self {
            client,
            base_url,
            limiter: RateLimiter::direct(Quota::per_minute(config.requests_per_minute)),
            retry: config.retry,
        })
    }

    fn games_url(&self, username: &str) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments
                .pop_if_empty()
                .extend(["api", "games", "user", username]);
        }
        url
    }

    /// Sends the request, retrying 429/5xx and connection failures with
    /// exponential backoff. 404 and other 4xx fail on the first attempt.
    async fn open(&self, params: &GamesRequestParams) -> Result<Response, ProviderError> {
        let url = self.games_url(&params.username);
        let query = construct_params(params);
        let mut attempt = 0u32;

        loop {
            attempt += 1;
            self.limiter.until_ready().await;

            let response = match self.client.get(url.clone()).query(&query).send().await {
                Ok(response) => response,
                Err(e) if (e.is_timeout() || e.is_connect()) && self.retry.should_retry(attempt) => {
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, ?delay, error = %e, "game export request failed; retrying");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                Err(e) => return Err(e).context(ReqwestSnafu),
            };

            let status = response.status();
            if status.is_success() {
                debug!(user = %params.username, attempt, "game export stream opened");
                return Ok(response);
            }

            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                if self.retry.should_retry(attempt) {
                    let delay = self.retry.delay_after(attempt);
                    warn!(attempt, status = status.as_u16(), ?delay, "game export throttled; backing off");
                    tokio::time::sleep(delay).await;
                    continue;
                }
                if status == StatusCode::TOO_MANY_REQUESTS {
                    return RateLimitedSnafu { attempts: attempt }.fail();
                }
                let message = response.text().await.unwrap_or_default();
                return ServerSnafu {
                    status: status.as_u16(),
                    message,
                }
                .fail();
            }

            if status == StatusCode::NOT_FOUND {
                return NotFoundSnafu {
                    subject: params.username.clone(),
                }
                .fail();
            }

            let message = response.text().await.unwrap_or_default();
            return StatusSnafu {
                status: status.as_u16(),
                message,
            }
            .fail();
        }
    }
}

#[async_trait]
impl GameSource for LichessProvider {
    async fn stream_games(&self, params: &GamesRequestParams) -> Result<GameStream, ProviderError> {
        if params.is_empty_window() {
            return Ok(futures::stream::empty().boxed());
        }

        let response = self.open(params).await?;
        let lines = LineStream::new(Box::pin(response.bytes_stream()));
        let games = lines.map(|line| -> Result<RawGame, ProviderError> {
            let line = line.context(ReqwestSnafu)?;
            let game: LichessGame = serde_json::from_slice(&line).context(DecodeSnafu)?;
            Ok(RawGame::from(game))
        });

        Ok(match params.max {
            Some(max) => games.take(max as usize).boxed(),
            None => games.boxed(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn games_url_appends_path_segments() {
        let provider = LichessProvider::with_config(LichessConfig {
            base_url: "http://127.0.0.1:9/".into(),
            ..LichessConfig::default()
        })
        .unwrap();
        assert_eq!(
            provider.games_url("Some_User").as_str(),
            "http://127.0.0.1:9/api/games/user/Some_User"
        );
    }

    #[test]
    fn rejects_non_base_urls() {
        let err = LichessProvider::with_config(LichessConfig {
            base_url: "mailto:someone@example.com".into(),
            ..LichessConfig::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, ProviderInitError::InvalidBaseUrl { .. }));
    }
}
