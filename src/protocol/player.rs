//! Wire format of the Web API player endpoints.
//!
//! # Playback state
//!
//! `GET /me/player` answers `204 No Content` when nothing is playing, and
//! otherwise:
//!
//! ```json
//! {
//!     "device": {
//!         "id": "0d1841b0976bae2a3a310dd74c0f3df354899bc8",
//!         "is_active": true,
//!         "name": "Living Room",
//!         "type": "Speaker",
//!         "volume_percent": 59
//!     },
//!     "shuffle_state": false,
//!     "timestamp": 1712150926321,
//!     "progress_ms": 44272,
//!     "is_playing": true,
//!     "item": {
//!         "uri": "spotify:track:4iV5W9uYEdYUVa79Axb7Rh",
//!         "name": "Track",
//!         "duration_ms": 207959,
//!         "artists": [{ "name": "Artist" }]
//!     }
//! }
//! ```
//!
//! Episodes have a `show` instead of `artists`; the show name is used as the
//! artist.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::state::{DeviceId, DeviceRef, DeviceType, PlaybackSnapshot, TrackRef};

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Device {
    pub id: Option<String>,
    #[serde(default)]
    pub is_active: bool,
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: DeviceType,
    pub volume_percent: Option<u8>,
}

impl From<Device> for DeviceRef {
    fn from(device: Device) -> Self {
        Self {
            id: device.id.filter(|id| !id.is_empty()).map(DeviceId::from),
            name: device.name,
            kind: device.kind,
            is_active: device.is_active,
            volume_percent: device.volume_percent,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Artist {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Show {
    pub name: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Item {
    pub uri: String,
    pub name: String,
    pub duration_ms: u64,
    #[serde(default)]
    pub artists: Vec<Artist>,
    pub show: Option<Show>,
}

impl From<Item> for TrackRef {
    fn from(item: Item) -> Self {
        let artists = if item.artists.is_empty() {
            item.show.into_iter().map(|show| show.name).collect()
        } else {
            item.artists.into_iter().map(|artist| artist.name).collect()
        };

        Self {
            uri: item.uri,
            name: item.name,
            artists,
            duration: Duration::from_millis(item.duration_ms),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct PlaybackState {
    pub device: Device,
    #[serde(default)]
    pub shuffle_state: bool,
    #[serde(default)]
    pub timestamp: u64,
    pub progress_ms: Option<u64>,
    #[serde(default)]
    pub is_playing: bool,
    pub item: Option<Item>,
}

impl From<PlaybackState> for PlaybackSnapshot {
    fn from(state: PlaybackState) -> Self {
        Self {
            device: state.device.into(),
            is_playing: state.is_playing,
            progress: Duration::from_millis(state.progress_ms.unwrap_or_default()),
            track: state.item.map(Into::into),
            shuffle_state: state.shuffle_state,
            timestamp: state.timestamp,
        }
    }
}

/// `GET /me/player/devices`
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct Devices {
    #[serde(default)]
    pub devices: Vec<Device>,
}

/// Starting offset inside a context or track list.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Offset {
    Position { position: u32 },
    Uri { uri: String },
}

/// Body of `PUT /me/player/play`. Every field is optional: an empty body
/// resumes whatever was playing.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct Play {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_uri: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub uris: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub offset: Option<Offset>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub position_ms: Option<u64>,
}

/// Body of `PUT /me/player`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Transfer {
    pub device_ids: Vec<String>,
    pub play: bool,
}

/// Error response body.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorDetails,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ErrorDetails {
    pub status: u16,
    #[serde(default)]
    pub message: String,
    pub reason: Option<String>,
}
