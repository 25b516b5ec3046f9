//! Account-wide playback status and device list.
//!
//! The [`Poller`] is the committed copy of what the Web API last said, plus
//! the bookkeeping for fetching it again. It does no I/O itself: the client
//! spawns the requests and commits their results here, in order. At most
//! one status poll and one device-list request run at a time; a refresh
//! asked for while one is running is remembered and started right after.
//!
//! Failures never throw away good data. A 401 is not even recorded as an
//! error, as the token is refreshed behind the scenes and the next poll will
//! most likely succeed.

use std::time::Duration;

use crate::{
    config::Config,
    error::{Error, ErrorKind, Result},
    state::{DeviceRef, PlaybackSnapshot, RemoteStatus},
};

/// Single-flight state of one kind of request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
struct Flight {
    running: bool,
    pending: bool,
}

impl Flight {
    /// Returns whether a request should be started now.
    fn request(&mut self) -> bool {
        if self.running {
            self.pending = true;
            return false;
        }

        self.running = true;
        true
    }

    /// Returns whether the remembered request should be started now.
    fn complete(&mut self) -> bool {
        self.running = self.pending;
        self.pending = false;
        self.running
    }
}

#[derive(Debug)]
pub struct Poller {
    status: Option<RemoteStatus>,
    last_error: Option<Error>,
    poll: Flight,

    devices: Vec<DeviceRef>,
    devices_error: Option<Error>,
    listing: Flight,

    active_interval: Duration,
    idle_interval: Duration,
    interval: Duration,
}

impl Poller {
    #[must_use]
    pub fn new(config: &Config) -> Self {
        Self {
            status: None,
            last_error: None,
            poll: Flight::default(),
            devices: Vec::new(),
            devices_error: None,
            listing: Flight::default(),
            active_interval: config.poll_interval_active,
            idle_interval: config.poll_interval_idle,
            interval: config.poll_interval_idle,
        }
    }

    /// The remote status, `None` before the first successful poll.
    #[must_use]
    pub fn status(&self) -> Option<&RemoteStatus> {
        self.status.as_ref()
    }

    #[must_use]
    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.status.as_ref().and_then(RemoteStatus::snapshot)
    }

    #[must_use]
    pub fn last_error(&self) -> Option<&Error> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn devices(&self) -> &[DeviceRef] {
        &self.devices
    }

    #[must_use]
    pub fn devices_error(&self) -> Option<&Error> {
        self.devices_error.as_ref()
    }

    #[must_use]
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Asks for a status poll. Returns whether the caller should start it
    /// now; otherwise it is started when the running one is committed.
    pub fn refresh(&mut self) -> bool {
        self.poll.request()
    }

    /// Asks for a device-list refresh, with the same rule as
    /// [`refresh`](Self::refresh).
    pub fn refresh_devices(&mut self) -> bool {
        self.listing.request()
    }

    /// Commits the result of a status poll. Returns whether another poll
    /// should be started right away.
    pub fn commit(&mut self, result: Result<Option<PlaybackSnapshot>>) -> bool {
        match result {
            Ok(snapshot) => {
                let status = RemoteStatus::from(snapshot);
                if self.status.as_ref() != Some(&status) {
                    trace!("remote status: {status:?}");
                }
                self.status = Some(status);
                self.last_error = None;
            }
            Err(e) if e.kind == ErrorKind::Unauthenticated => {
                debug!("remote status unavailable until the token is refreshed");
            }
            Err(e) => {
                warn!("failed to poll remote status: {e}");
                self.last_error = Some(e);
            }
        }

        self.poll.complete()
    }

    /// Commits the result of a device-list request. Returns whether another
    /// request should be started right away.
    pub fn commit_devices(&mut self, result: Result<Vec<DeviceRef>>) -> bool {
        match result {
            Ok(devices) => {
                debug!("{} device(s) on the account", devices.len());
                self.devices = devices;
                self.devices_error = None;
            }
            Err(e) if e.kind == ErrorKind::Unauthenticated => {
                debug!("device list unavailable until the token is refreshed");
            }
            Err(e) => {
                warn!("failed to list devices: {e}");
                self.devices_error = Some(e);
            }
        }

        self.listing.complete()
    }

    /// Picks the poll interval for the current activity. Returns the new
    /// interval if it changed, so the caller can reset its timer.
    pub fn adapt_interval(&mut self, playing_locally: bool) -> Option<Duration> {
        let interval = if playing_locally {
            self.active_interval
        } else {
            self.idle_interval
        };

        if interval == self.interval {
            return None;
        }

        debug!("polling every {}ms", interval.as_millis());
        self.interval = interval;
        Some(interval)
    }
}
