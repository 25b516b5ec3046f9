//! HTTP client with rate limiting for the Web API.
//!
//! Wraps `reqwest::Client` with:
//! * a client-side rate limiter, so that a misbehaving host cannot get the
//!   account throttled by hammering the player endpoints
//! * consistent timeouts, keepalive and `User-Agent`
//!
//! Credentials are not part of the client: every request carries the
//! session's token explicitly (see [`crate::remote::WebApi`]).

use std::{future::Future, num::NonZeroU32, time::Duration};

use futures_util::{FutureExt, TryFutureExt};
use governor::{DefaultDirectRateLimiter, Quota};
use reqwest::{
    header::{HeaderValue, ACCEPT},
    Method, Url,
};

use crate::{config::Config, error::Result};

pub struct Client {
    /// Direct access to the underlying client, bypassing the rate limiter.
    pub unlimited: reqwest::Client,

    rate_limiter: DefaultDirectRateLimiter,
}

impl Client {
    /// Rolling window over which the Web API counts requests.
    const RATE_LIMIT_INTERVAL: Duration = Duration::from_secs(30);

    /// Calls allowed per window. The provider does not publish its quota;
    /// this stays well below the point where it starts answering 429.
    const RATE_LIMIT_CALLS_PER_INTERVAL: u8 = 180;

    const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Whole-request timeout. Longer than the fastest poll interval would
    /// be pointless: the next poll supersedes the result anyway.
    const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a new client.
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    ///
    /// # Panics
    ///
    /// Panics if the rate limit parameters are zero.
    pub fn new(config: &Config) -> Result<Self> {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));

        let http_client = reqwest::Client::builder()
            .tcp_keepalive(Self::KEEPALIVE_TIMEOUT)
            .timeout(Self::REQUEST_TIMEOUT)
            .default_headers(headers)
            .user_agent(&config.user_agent)
            .build()?;

        let replenish_interval =
            Self::RATE_LIMIT_INTERVAL / u32::from(Self::RATE_LIMIT_CALLS_PER_INTERVAL);
        let quota = Quota::with_period(replenish_interval)
            .expect("quota time interval is zero")
            .allow_burst(
                NonZeroU32::new(Self::RATE_LIMIT_CALLS_PER_INTERVAL.into())
                    .expect("calls per interval is zero"),
            );

        Ok(Self {
            unlimited: http_client,
            rate_limiter: governor::RateLimiter::direct(quota),
        })
    }

    /// Builds a request. The body, if any, is set by the caller.
    #[must_use]
    pub fn request(&self, method: Method, url: Url) -> reqwest::Request {
        reqwest::Request::new(method, url)
    }

    #[must_use]
    pub fn get(&self, url: Url) -> reqwest::Request {
        self.request(Method::GET, url)
    }

    #[must_use]
    pub fn put(&self, url: Url) -> reqwest::Request {
        self.request(Method::PUT, url)
    }

    /// Executes a request once the rate limiter allows it.
    ///
    /// The returned response may carry any status code; interpreting it is
    /// up to the caller.
    pub fn execute(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<reqwest::Response>> + '_ {
        let throttle = self.rate_limiter.until_ready();
        throttle.then(|()| self.unlimited.execute(request).map_err(Into::into))
    }
}
