//! Access tokens for the Web API.
//!
//! Obtaining and refreshing tokens is the host's business. The core only
//! asks a [`TokenProvider`] for the current token before every request and
//! tells it to flush that token when the Web API rejects it.

use std::fmt;

use async_trait::async_trait;
use veil::Redact;

use crate::error::{Error, Result};

/// An OAuth bearer token for the Web API.
#[derive(Clone, PartialEq, Eq, Hash, Redact)]
pub struct AccessToken(#[redact] String);

impl AccessToken {
    /// Wraps a token string.
    ///
    /// # Errors
    ///
    /// Returns an error if the token is empty or contains characters that
    /// cannot appear in an `Authorization` header.
    pub fn new(token: impl Into<String>) -> Result<Self> {
        let token = token.into();
        let token = token.trim();

        if token.is_empty() {
            return Err(Error::unauthenticated("access token is empty"));
        }

        if !token.chars().all(|chr| chr.is_ascii_graphic()) {
            return Err(Error::invalid_argument("access token contains invalid characters"));
        }

        Ok(Self(token.to_owned()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Header value form, `Bearer <token>`. Never log this.
impl fmt::Display for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Bearer {}", self.0)
    }
}

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// Returns a token that is valid right now.
    async fn access_token(&self) -> Result<AccessToken>;

    /// Called after the Web API answered 401 with the current token.
    fn flush_token(&self);
}

/// A token that never changes, for hosts that manage refreshes by
/// restarting the core.
#[derive(Clone, Debug)]
pub struct StaticToken(AccessToken);

impl StaticToken {
    #[must_use]
    pub fn new(token: AccessToken) -> Self {
        Self(token)
    }
}

#[async_trait]
impl TokenProvider for StaticToken {
    async fn access_token(&self) -> Result<AccessToken> {
        Ok(self.0.clone())
    }

    fn flush_token(&self) {
        warn!("access token was rejected; restart with a fresh token");
    }
}
