//! Validation of control commands.
//!
//! Everything here runs before any request is made: a command that cannot
//! be valid fails without touching the network.

use std::time::Duration;

use crate::{
    error::{Error, Result},
    remote::{Offset, PlayRequest},
    state::{DeviceId, PlaybackSnapshot},
};

/// What to start playing: either a context (album, playlist, show...) or an
/// explicit list of tracks, never both.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PlayContext {
    pub context_uri: Option<String>,
    pub uris: Option<Vec<String>>,
    pub offset: Option<Offset>,
    pub position: Option<Duration>,
    /// Device to play on. Defaults to the resolved target device.
    pub device_id: Option<DeviceId>,
}

impl PlayContext {
    #[must_use]
    pub fn context(uri: impl Into<String>) -> Self {
        Self {
            context_uri: Some(uri.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn tracks<I, S>(uris: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            uris: Some(uris.into_iter().map(Into::into).collect()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_offset(mut self, offset: Offset) -> Self {
        self.offset = Some(offset);
        self
    }

    #[must_use]
    pub fn with_position(mut self, position: Duration) -> Self {
        self.position = Some(position);
        self
    }

    #[must_use]
    pub fn on_device(mut self, device_id: DeviceId) -> Self {
        self.device_id = Some(device_id);
        self
    }

    /// Checks the request and turns it into what is sent.
    ///
    /// # Errors
    ///
    /// Returns [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument)
    /// unless exactly one of a context or a non-empty track list is given.
    pub fn into_request(self) -> Result<PlayRequest> {
        let context_uri = self.context_uri.filter(|uri| !uri.trim().is_empty());
        let uris = self.uris.filter(|uris| !uris.is_empty());

        let offset = match (&context_uri, &uris) {
            (Some(_), Some(_)) => {
                return Err(Error::invalid_argument(
                    "specify either a context or a list of tracks, not both",
                ));
            }
            (None, None) => {
                return Err(Error::invalid_argument(
                    "specify a context or a list of tracks",
                ));
            }
            (None, Some(_)) => match self.offset {
                Some(Offset::Position(position)) => {
                    warn!("ignoring offset {position}: track lists only take an offset by uri");
                    None
                }
                offset => offset,
            },
            (Some(_), None) => self.offset,
        };

        Ok(PlayRequest {
            device_id: self.device_id,
            context_uri,
            uris,
            offset,
            position: self.position,
        })
    }
}

/// Validates a volume given in percent.
///
/// # Errors
///
/// Returns [`OutOfRange`](crate::error::ErrorKind::OutOfRange) above 100.
pub fn volume_percent(percent: u32) -> Result<u8> {
    u8::try_from(percent)
        .ok()
        .filter(|percent| *percent <= 100)
        .ok_or_else(|| Error::out_of_range(format!("volume {percent}% must be between 0 and 100")))
}

/// Device that remote commands go to: the local device if it is ready,
/// else whichever device the remote status says is playing.
///
/// # Errors
///
/// Returns [`FailedPrecondition`](crate::error::ErrorKind::FailedPrecondition)
/// if there is neither.
pub fn resolve_target(
    local_id: Option<&DeviceId>,
    snapshot: Option<&PlaybackSnapshot>,
) -> Result<DeviceId> {
    local_id
        .or_else(|| snapshot.and_then(PlaybackSnapshot::device_id))
        .cloned()
        .ok_or_else(|| Error::failed_precondition("no active device"))
}
