//! Events emitted by the playback core.
//!
//! Events are coarse-grained notifications of changes that hosts typically
//! act upon: show a notification, update a media session, run a hook. For
//! everything else, follow [`Status`](crate::client::Status) instead.
//!
//! Events are derived from committed state only, so they never announce
//! something the status does not show yet.

use crate::{arbiter::Source, state::DeviceId};

/// Events that can be emitted by the [`Client`](crate::client::Client).
///
/// Playback events:
/// * [`Play`](Self::Play) - playback starts
/// * [`Pause`](Self::Pause) - playback pauses
/// * [`TrackChanged`](Self::TrackChanged) - current track changes
///
/// Device events:
/// * [`Connected`](Self::Connected) - the local device became ready
/// * [`Disconnected`](Self::Disconnected) - the local device went away
/// * [`SourceChanged`](Self::SourceChanged) - another source became
///   authoritative
/// * [`TransferStarted`](Self::TransferStarted) and
///   [`TransferFinished`](Self::TransferFinished)
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Event {
    /// Playback has started, from a paused state or on a new track.
    Play,

    /// Playback has paused.
    Pause,

    /// Current track has changed, by whatever means.
    TrackChanged,

    /// The local device is ready and registered under this id.
    Connected(DeviceId),

    /// The local device is no longer available.
    Disconnected,

    /// The authoritative source has changed.
    SourceChanged(Source),

    /// A transfer to this device has been requested.
    TransferStarted(DeviceId),

    /// A transfer has completed, successfully or not.
    TransferFinished {
        device_id: DeviceId,
        success: bool,
    },
}
