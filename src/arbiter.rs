//! Which source of truth to believe.
//!
//! The local device reports its own state instantly but only knows about
//! itself. The remote status knows about every device on the account but is
//! only as fresh as the last poll. The rule, in order:
//!
//! 1. The local device is *active globally* when the remote status names it
//!    as the playing device.
//! 2. If the local device is ready, has state, and is either active globally
//!    or there is no remote snapshot to contradict it, the local state wins.
//! 3. Otherwise the remote snapshot wins, if there is one.
//! 4. Otherwise there is nothing to show.
//!
//! [`arbitrate`] is a pure function of committed state. It is re-evaluated
//! after every change and holds nothing between calls.

use std::{fmt, time::Duration};

use crate::state::{DeviceId, LocalDeviceState, PlaybackSnapshot, TrackRef};

/// Inputs from the local device channel.
#[derive(Clone, Copy, Debug)]
pub struct LocalInputs<'a> {
    pub ready: bool,
    pub device_id: Option<&'a DeviceId>,
    pub state: Option<&'a LocalDeviceState>,
}

/// The source that is authoritative right now, borrowed from committed state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthoritativeView<'a> {
    Local(&'a LocalDeviceState),
    Remote(&'a PlaybackSnapshot),
    None,
}

/// Identifies a source without borrowing it.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Source {
    Local,
    Remote,
    #[default]
    None,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Local => write!(f, "local device"),
            Self::Remote => write!(f, "remote device"),
            Self::None => write!(f, "nothing"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arbitration<'a> {
    pub view: AuthoritativeView<'a>,
    pub local_active_globally: bool,
}

#[must_use]
pub fn arbitrate<'a>(
    local: LocalInputs<'a>,
    snapshot: Option<&'a PlaybackSnapshot>,
) -> Arbitration<'a> {
    let remote_id = snapshot.and_then(PlaybackSnapshot::device_id);
    let local_active_globally = match (remote_id, local.device_id) {
        (Some(remote), Some(local)) => remote == local,
        _ => false,
    };

    let view = match (local.ready, local.state, snapshot) {
        (true, Some(state), _) if local_active_globally || snapshot.is_none() => {
            AuthoritativeView::Local(state)
        }
        (_, _, Some(snapshot)) => AuthoritativeView::Remote(snapshot),
        _ => AuthoritativeView::None,
    };

    Arbitration {
        view,
        local_active_globally,
    }
}

impl AuthoritativeView<'_> {
    #[must_use]
    pub fn source(&self) -> Source {
        match self {
            Self::Local(_) => Source::Local,
            Self::Remote(_) => Source::Remote,
            Self::None => Source::None,
        }
    }

    #[must_use]
    pub fn is_local(&self) -> bool {
        matches!(self, Self::Local(_))
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        match self {
            Self::Local(state) => !state.paused,
            Self::Remote(snapshot) => snapshot.is_playing,
            Self::None => false,
        }
    }

    #[must_use]
    pub fn track(&self) -> Option<&TrackRef> {
        match self {
            Self::Local(state) => state.current_track.as_ref(),
            Self::Remote(snapshot) => snapshot.track.as_ref(),
            Self::None => None,
        }
    }

    /// Last position reported by the source itself, not extrapolated.
    #[must_use]
    pub fn position(&self) -> Duration {
        match self {
            Self::Local(state) => state.position,
            Self::Remote(snapshot) => snapshot.progress,
            Self::None => Duration::ZERO,
        }
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        match self {
            Self::Local(state) => state.duration,
            Self::Remote(snapshot) => snapshot.duration(),
            Self::None => Duration::ZERO,
        }
    }

    /// Source-side time at which [`position`](Self::position) was sampled.
    #[must_use]
    pub fn timestamp(&self) -> u64 {
        match self {
            Self::Local(state) => state.timestamp,
            Self::Remote(snapshot) => snapshot.timestamp,
            Self::None => 0,
        }
    }
}
