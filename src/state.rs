//! Playback state as produced by the two sources of truth.
//!
//! * [`PlaybackSnapshot`]: the account-wide status, polled from the Web API.
//! * [`LocalDeviceState`]: pushed by the local output device whenever its
//!   state changes.
//!
//! Both are plain values. Which one is believed at any moment is decided by
//! [`crate::arbiter`].

use std::{fmt, str::FromStr, time::Duration};

use serde_with::{DeserializeFromStr, SerializeDisplay};

/// Identifier of a playback device, as assigned by the provider.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct DeviceId(String);

impl DeviceId {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DeviceId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for DeviceId {
    fn from(id: &str) -> Self {
        Self(id.to_owned())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Kind of playback device.
///
/// The Web API reports this as a free-form string. Values this crate does
/// not know about are kept verbatim.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, SerializeDisplay, DeserializeFromStr)]
pub enum DeviceType {
    Computer,
    Smartphone,
    Speaker,
    Tablet,
    #[default]
    Unknown,
    Other(String),
}

impl DeviceType {
    const COMPUTER: &'static str = "Computer";
    const SMARTPHONE: &'static str = "Smartphone";
    const SPEAKER: &'static str = "Speaker";
    const TABLET: &'static str = "Tablet";
    const UNKNOWN: &'static str = "Unknown";
}

impl FromStr for DeviceType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = match s {
            _ if s.eq_ignore_ascii_case(Self::COMPUTER) => Self::Computer,
            _ if s.eq_ignore_ascii_case(Self::SMARTPHONE) => Self::Smartphone,
            _ if s.eq_ignore_ascii_case(Self::SPEAKER) => Self::Speaker,
            _ if s.eq_ignore_ascii_case(Self::TABLET) => Self::Tablet,
            _ if s.is_empty() || s.eq_ignore_ascii_case(Self::UNKNOWN) => Self::Unknown,
            other => Self::Other(other.to_owned()),
        };
        Ok(kind)
    }
}

impl fmt::Display for DeviceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Computer => f.write_str(Self::COMPUTER),
            Self::Smartphone => f.write_str(Self::SMARTPHONE),
            Self::Speaker => f.write_str(Self::SPEAKER),
            Self::Tablet => f.write_str(Self::TABLET),
            Self::Unknown => f.write_str(Self::UNKNOWN),
            Self::Other(other) => f.write_str(other),
        }
    }
}

/// A playback device on the account.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct DeviceRef {
    /// Absent for devices the Web API refuses to expose an id for.
    pub id: Option<DeviceId>,
    pub name: String,
    pub kind: DeviceType,
    pub is_active: bool,
    pub volume_percent: Option<u8>,
}

/// The minimal description of a track needed to display and compare it.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct TrackRef {
    pub uri: String,
    pub name: String,
    pub artists: Vec<String>,
    pub duration: Duration,
}

impl fmt::Display for TrackRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artists.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{} - {}", self.artists.join(", "), self.name)
        }
    }
}

/// Account-wide playback status at the time of a poll.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct PlaybackSnapshot {
    pub device: DeviceRef,
    pub is_playing: bool,
    pub progress: Duration,
    /// `None` while an advertisement or unsupported item plays.
    pub track: Option<TrackRef>,
    pub shuffle_state: bool,
    /// Server time in milliseconds since epoch at which `progress` was
    /// sampled.
    pub timestamp: u64,
}

impl PlaybackSnapshot {
    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device.id.as_ref()
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.track
            .as_ref()
            .map_or(Duration::ZERO, |track| track.duration)
    }
}

/// The remote status as last loaded.
///
/// "Nothing is playing anywhere" is a successful answer and must not be
/// confused with "not loaded yet", which is represented by the absence of a
/// `RemoteStatus` altogether.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum RemoteStatus {
    Idle,
    Playing(PlaybackSnapshot),
}

impl RemoteStatus {
    #[must_use]
    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        match self {
            Self::Idle => None,
            Self::Playing(snapshot) => Some(snapshot),
        }
    }
}

impl From<Option<PlaybackSnapshot>> for RemoteStatus {
    fn from(snapshot: Option<PlaybackSnapshot>) -> Self {
        snapshot.map_or(Self::Idle, Self::Playing)
    }
}

/// Operations the local device currently refuses.
#[expect(clippy::struct_excessive_bools)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Disallows {
    pub pausing: bool,
    pub resuming: bool,
    pub seeking: bool,
    pub skipping_next: bool,
    pub skipping_prev: bool,
}

/// State of the local output device, as pushed by the device itself.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct LocalDeviceState {
    pub paused: bool,
    pub position: Duration,
    pub duration: Duration,
    pub current_track: Option<TrackRef>,
    pub previous_tracks: Vec<TrackRef>,
    pub next_tracks: Vec<TrackRef>,
    pub disallows: Disallows,
    /// Device time in milliseconds since epoch at which `position` was
    /// sampled.
    pub timestamp: u64,
}
