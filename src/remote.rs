//! The account-wide playback service.
//!
//! [`RemoteApi`] is everything the core needs from the provider: one read of
//! the current playback status, the device list, and a handful of writes.
//! [`WebApi`] implements it over HTTP against the `/me/player` endpoints.
//!
//! Writes are fire-and-confirm: a successful answer only means the provider
//! accepted the command. The core never assumes the command took effect and
//! re-polls instead.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use reqwest::{header::AUTHORIZATION, StatusCode, Url};

use crate::{
    config::Config,
    error::{ApiError, Error, Result},
    http,
    protocol::{self, player as wire},
    state::{DeviceId, DeviceRef, PlaybackSnapshot},
    token::TokenProvider,
};

/// Where to start inside a context or track list.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Offset {
    /// Zero-based index into the context.
    Position(u32),
    /// URI of a track inside the context or list.
    Uri(String),
}

/// What to play and where. See [`crate::command::PlayContext`] for the
/// validated form hosts construct.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlayRequest {
    pub device_id: Option<DeviceId>,
    pub context_uri: Option<String>,
    pub uris: Option<Vec<String>>,
    pub offset: Option<Offset>,
    pub position: Option<Duration>,
}

impl From<PlayRequest> for wire::Play {
    fn from(request: PlayRequest) -> Self {
        Self {
            context_uri: request.context_uri,
            uris: request.uris,
            offset: request.offset.map(|offset| match offset {
                Offset::Position(position) => wire::Offset::Position { position },
                Offset::Uri(uri) => wire::Offset::Uri { uri },
            }),
            position_ms: request
                .position
                .map(|position| u64::try_from(position.as_millis()).unwrap_or(u64::MAX)),
        }
    }
}

#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// Current playback status; `None` when nothing is playing anywhere.
    async fn playback_state(&self) -> Result<Option<PlaybackSnapshot>>;

    async fn play(&self, request: PlayRequest) -> Result<()>;

    async fn pause(&self, device_id: Option<&DeviceId>) -> Result<()>;

    /// `percent` must already be validated to `0..=100`.
    async fn set_volume(&self, device_id: Option<&DeviceId>, percent: u8) -> Result<()>;

    async fn set_shuffle(&self, device_id: Option<&DeviceId>, state: bool) -> Result<()>;

    async fn transfer_playback(&self, device_id: &DeviceId, play: bool) -> Result<()>;

    async fn devices(&self) -> Result<Vec<DeviceRef>>;
}

/// [`RemoteApi`] over the provider's HTTP Web API.
///
/// Each instance belongs to one session: it carries that session's token
/// provider, so several accounts can be driven from one process.
pub struct WebApi {
    http_client: http::Client,
    base_url: Url,
    tokens: Arc<dyn TokenProvider>,
}

impl WebApi {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(config: &Config, tokens: Arc<dyn TokenProvider>) -> Result<Self> {
        Ok(Self {
            http_client: http::Client::new(config)?,
            base_url: config.api_url.clone(),
            tokens,
        })
    }

    fn url(&self, path: &str, device_id: Option<&DeviceId>) -> Result<Url> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let mut url = if path.is_empty() {
            base.parse::<Url>()?
        } else {
            format!("{base}/{path}").parse::<Url>()?
        };

        if let Some(device_id) = device_id {
            url.query_pairs_mut()
                .append_pair("device_id", device_id.as_str());
        }

        Ok(url)
    }

    /// Authorizes and executes a request, turning non-success statuses into
    /// errors.
    async fn send(&self, mut request: reqwest::Request) -> Result<reqwest::Response> {
        let token = self.tokens.access_token().await?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, token.to_string().parse()?);

        let method = request.method().clone();
        let path = request.url().path().to_owned();

        let response = self.http_client.execute(request).await?;
        let status = response.status();
        trace!("{method} {path}: {status}");

        if status.is_success() {
            return Ok(response);
        }

        if status == StatusCode::UNAUTHORIZED {
            self.tokens.flush_token();
        }

        // Error bodies are best-effort: proxies and outages produce HTML or
        // nothing at all.
        let body = response.bytes().await.unwrap_or_default();
        let (message, reason) = match serde_json::from_slice::<wire::ErrorBody>(&body) {
            Ok(body) => (body.error.message, body.error.reason),
            Err(_) => (
                status
                    .canonical_reason()
                    .unwrap_or("unexpected response")
                    .to_owned(),
                None,
            ),
        };

        Err(Error::from_api(ApiError {
            status,
            message,
            reason,
        }))
    }

    async fn put_json<T>(&self, url: Url, body: &T) -> Result<()>
    where
        T: serde::Serialize + ?Sized,
    {
        let mut request = self.http_client.put(url);
        request
            .headers_mut()
            .insert(reqwest::header::CONTENT_TYPE, "application/json".parse()?);
        *request.body_mut() = Some(serde_json::to_vec(body)?.into());

        self.send(request).await.map(|_| ())
    }

    async fn put_empty(&self, url: Url) -> Result<()> {
        let mut request = self.http_client.put(url);
        *request.body_mut() = Some(reqwest::Body::from(Vec::new()));

        self.send(request).await.map(|_| ())
    }
}

#[async_trait]
impl RemoteApi for WebApi {
    async fn playback_state(&self) -> Result<Option<PlaybackSnapshot>> {
        let request = self.http_client.get(self.url("", None)?);
        let response = self.send(request).await?;

        if response.status() == StatusCode::NO_CONTENT {
            return Ok(None);
        }

        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(None);
        }

        let state = protocol::json::<wire::PlaybackState>(&body, "playback state")?;
        Ok(Some(state.into()))
    }

    async fn play(&self, request: PlayRequest) -> Result<()> {
        let url = self.url("play", request.device_id.as_ref())?;
        let body = wire::Play::from(request);
        debug!("play: {body:?}");

        self.put_json(url, &body).await
    }

    async fn pause(&self, device_id: Option<&DeviceId>) -> Result<()> {
        self.put_empty(self.url("pause", device_id)?).await
    }

    async fn set_volume(&self, device_id: Option<&DeviceId>, percent: u8) -> Result<()> {
        let mut url = self.url("volume", device_id)?;
        url.query_pairs_mut()
            .append_pair("volume_percent", &percent.to_string());

        self.put_empty(url).await
    }

    async fn set_shuffle(&self, device_id: Option<&DeviceId>, state: bool) -> Result<()> {
        let mut url = self.url("shuffle", device_id)?;
        url.query_pairs_mut()
            .append_pair("state", if state { "true" } else { "false" });

        self.put_empty(url).await
    }

    async fn transfer_playback(&self, device_id: &DeviceId, play: bool) -> Result<()> {
        let body = wire::Transfer {
            device_ids: vec![device_id.to_string()],
            play,
        };

        self.put_json(self.url("", None)?, &body).await
    }

    async fn devices(&self) -> Result<Vec<DeviceRef>> {
        let request = self.http_client.get(self.url("devices", None)?);
        let body = self.send(request).await?.text().await?;
        let devices = protocol::json::<wire::Devices>(&body, "devices")?.devices;

        Ok(devices.into_iter().map(Into::into).collect())
    }
}
