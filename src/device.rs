//! The local output device.
//!
//! A [`LocalDevice`] is whatever plays audio on this client: in a browser,
//! the provider's playback SDK. It is driven imperatively through the trait
//! and reports back asynchronously through [`DeviceEvent`]s that the host
//! forwards into the core.
//!
//! [`Channel`] wraps a device with the bookkeeping the core needs: whether
//! it is ready, under which device id, and its last reported state.
//! Commands are cleared by [`Channel::dispatch`] and then run as an
//! [`Invocation`] that does not borrow the channel, so the core can await
//! them in another task while it keeps handling notifications. A command
//! does nothing unless the caller says the device is the authoritative one:
//! controlling a device that is not playing anything is a normal situation,
//! not an error.

use std::{fmt, sync::Arc, time::Duration};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::{
    error::{Error, Result},
    state::{DeviceId, LocalDeviceState},
};

/// Failure categories reported by the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum DeviceErrorKind {
    /// The device could not be initialized, for example because the
    /// platform does not support it.
    Initialization,
    /// The token given to the device was rejected.
    Authentication,
    /// The account cannot use a local device, for example without premium.
    Account,
    /// A track failed to play.
    Playback,
}

impl DeviceErrorKind {
    /// Whether the device is unusable after this error.
    #[must_use]
    pub fn is_fatal(self) -> bool {
        !matches!(self, Self::Playback)
    }
}

impl fmt::Display for DeviceErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization => write!(f, "initialization error"),
            Self::Authentication => write!(f, "authentication error"),
            Self::Account => write!(f, "account error"),
            Self::Playback => write!(f, "playback error"),
        }
    }
}

/// Notifications from the local device.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DeviceEvent {
    /// The device is registered with the provider under this id.
    Ready(DeviceId),
    /// The device went offline.
    NotReady(DeviceId),
    /// The device's playback state changed; `None` when it has nothing
    /// loaded, typically because playback moved to another device.
    StateChanged(Option<LocalDeviceState>),
    Error(DeviceErrorKind, String),
}

#[async_trait]
pub trait LocalDevice: Send {
    /// Registers the device with the provider. Returns whether the
    /// connection attempt was accepted; readiness follows as a
    /// [`DeviceEvent::Ready`].
    async fn connect(&mut self, name: &str, volume: f32) -> Result<bool>;

    async fn disconnect(&mut self);

    async fn toggle_play(&mut self) -> Result<()>;

    async fn next_track(&mut self) -> Result<()>;

    async fn previous_track(&mut self) -> Result<()>;

    async fn seek(&mut self, position: Duration) -> Result<()>;

    /// `volume` is a ratio within `0.0..=1.0`.
    async fn set_volume(&mut self, volume: f32) -> Result<()>;
}

/// A host without a local output. Never connects, so the core runs in
/// pure remote-control mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct Detached;

#[async_trait]
impl LocalDevice for Detached {
    async fn connect(&mut self, _name: &str, _volume: f32) -> Result<bool> {
        Ok(false)
    }

    async fn disconnect(&mut self) {}

    async fn toggle_play(&mut self) -> Result<()> {
        Err(Error::unavailable("no local device"))
    }

    async fn next_track(&mut self) -> Result<()> {
        Err(Error::unavailable("no local device"))
    }

    async fn previous_track(&mut self) -> Result<()> {
        Err(Error::unavailable("no local device"))
    }

    async fn seek(&mut self, _position: Duration) -> Result<()> {
        Err(Error::unavailable("no local device"))
    }

    async fn set_volume(&mut self, _volume: f32) -> Result<()> {
        Err(Error::unavailable("no local device"))
    }
}

/// Follow-up work the core must do after a device event.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Reaction {
    pub refresh_status: bool,
    pub refresh_devices: bool,
}

/// Commands that only the local device can carry out.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum LocalCommand {
    TogglePlay,
    NextTrack,
    PreviousTrack,
    Seek(Duration),
    /// Output volume as a ratio within `0.0..=1.0`.
    SetVolume(f32),
}

impl fmt::Display for LocalCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TogglePlay => write!(f, "toggle play"),
            Self::NextTrack => write!(f, "next track"),
            Self::PreviousTrack => write!(f, "previous track"),
            Self::Seek(position) => write!(f, "seek to {}ms", position.as_millis()),
            Self::SetVolume(volume) => write!(f, "set volume to {volume}"),
        }
    }
}

type SharedDevice = Arc<Mutex<Box<dyn LocalDevice>>>;

/// A command cleared to run on the local device.
pub struct Invocation {
    device: SharedDevice,
    command: LocalCommand,
}

impl Invocation {
    #[must_use]
    pub fn command(&self) -> LocalCommand {
        self.command
    }

    /// Runs the command. Commands run one at a time, in the order they were
    /// started.
    ///
    /// # Errors
    ///
    /// Returns the device's error when the command fails.
    pub async fn run(self) -> Result<()> {
        let mut device = self.device.lock().await;
        match self.command {
            LocalCommand::TogglePlay => device.toggle_play().await,
            LocalCommand::NextTrack => device.next_track().await,
            LocalCommand::PreviousTrack => device.previous_track().await,
            LocalCommand::Seek(position) => device.seek(position).await,
            LocalCommand::SetVolume(volume) => device.set_volume(volume).await,
        }
    }
}

pub struct Channel {
    device: SharedDevice,
    ready: bool,
    device_id: Option<DeviceId>,
    state: Option<LocalDeviceState>,
}

impl Channel {
    #[must_use]
    pub fn new(device: Box<dyn LocalDevice>) -> Self {
        Self {
            device: Arc::new(Mutex::new(device)),
            ready: false,
            device_id: None,
            state: None,
        }
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    #[must_use]
    pub fn device_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref()
    }

    /// The device id, only while the device is ready.
    #[must_use]
    pub fn ready_id(&self) -> Option<&DeviceId> {
        self.device_id.as_ref().filter(|_| self.ready)
    }

    #[must_use]
    pub fn state(&self) -> Option<&LocalDeviceState> {
        self.state.as_ref()
    }

    /// Connects the device. A refusal is not an error: the core simply
    /// keeps running without a local device.
    ///
    /// # Errors
    ///
    /// Returns whatever the device returns when it fails to connect.
    pub async fn connect(&self, name: &str, volume: f32) -> Result<bool> {
        let connected = self.device.lock().await.connect(name, volume).await?;
        if connected {
            info!("local device \"{name}\" connecting");
        } else {
            debug!("local device \"{name}\" not connected");
        }

        Ok(connected)
    }

    /// Disconnects the device, after any command that is still running.
    pub async fn disconnect(&mut self) {
        if self.ready {
            debug!("disconnecting local device");
        }
        self.device.lock().await.disconnect().await;
        self.mark_not_ready();
    }

    fn mark_not_ready(&mut self) {
        self.ready = false;
        self.device_id = None;
        self.state = None;
    }

    /// Applies a notification from the device.
    pub fn handle(&mut self, event: DeviceEvent) -> Reaction {
        match event {
            DeviceEvent::Ready(device_id) => {
                info!("local device ready as {device_id}");
                self.ready = true;
                self.device_id = Some(device_id);
                Reaction {
                    refresh_status: false,
                    refresh_devices: true,
                }
            }

            DeviceEvent::NotReady(device_id) => {
                warn!("local device {device_id} went offline");
                self.mark_not_ready();
                Reaction {
                    refresh_status: true,
                    refresh_devices: true,
                }
            }

            DeviceEvent::StateChanged(state) => {
                trace!("local device state: {state:?}");
                let lost = state.is_none();
                self.state = state;
                Reaction {
                    refresh_status: lost,
                    refresh_devices: false,
                }
            }

            DeviceEvent::Error(kind, message) => {
                error!("local device {kind}: {message}");
                if kind.is_fatal() && self.ready {
                    self.mark_not_ready();
                    Reaction {
                        refresh_status: true,
                        refresh_devices: true,
                    }
                } else {
                    Reaction::default()
                }
            }
        }
    }

    /// Clears a command to run on the device.
    ///
    /// Returns `None` when the command must be skipped: the device is not
    /// ready, not `authoritative`, or its state disallows the command. Seek
    /// positions past the end of the track are clamped to the end.
    ///
    /// # Errors
    ///
    /// Returns an error if a volume is outside `0.0..=1.0`.
    pub fn dispatch(
        &self,
        command: LocalCommand,
        authoritative: bool,
    ) -> Result<Option<Invocation>> {
        let command = match command {
            LocalCommand::SetVolume(volume) if !(0.0..=1.0).contains(&volume) => {
                return Err(Error::out_of_range(format!(
                    "volume {volume} must be between 0.0 and 1.0"
                )));
            }
            LocalCommand::Seek(position) => match &self.state {
                Some(state) if !state.duration.is_zero() => {
                    LocalCommand::Seek(position.min(state.duration))
                }
                _ => command,
            },
            _ => command,
        };

        if !self.ready || !authoritative {
            debug!("ignoring {command}: local device is not the active device");
            return Ok(None);
        }

        if self.disallowed(command) {
            debug!("ignoring {command}: disallowed by the local device");
            return Ok(None);
        }

        Ok(Some(Invocation {
            device: Arc::clone(&self.device),
            command,
        }))
    }

    fn disallowed(&self, command: LocalCommand) -> bool {
        let Some(state) = &self.state else {
            return false;
        };

        let disallows = &state.disallows;
        match command {
            LocalCommand::TogglePlay if state.paused => disallows.resuming,
            LocalCommand::TogglePlay => disallows.pausing,
            LocalCommand::NextTrack => disallows.skipping_next,
            LocalCommand::PreviousTrack => disallows.skipping_prev,
            LocalCommand::Seek(_) => disallows.seeking,
            LocalCommand::SetVolume(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::state::Disallows;

    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<String>>>);

    impl Recorder {
        fn calls(&self) -> Vec<String> {
            self.0.lock().unwrap().clone()
        }

        fn record(&self, call: impl Into<String>) {
            self.0.lock().unwrap().push(call.into());
        }
    }

    #[async_trait]
    impl LocalDevice for Recorder {
        async fn connect(&mut self, name: &str, _volume: f32) -> Result<bool> {
            self.record(format!("connect {name}"));
            Ok(true)
        }

        async fn disconnect(&mut self) {
            self.record("disconnect");
        }

        async fn toggle_play(&mut self) -> Result<()> {
            self.record("toggle");
            Ok(())
        }

        async fn next_track(&mut self) -> Result<()> {
            self.record("next");
            Ok(())
        }

        async fn previous_track(&mut self) -> Result<()> {
            self.record("previous");
            Ok(())
        }

        async fn seek(&mut self, position: Duration) -> Result<()> {
            self.record(format!("seek {}", position.as_millis()));
            Ok(())
        }

        async fn set_volume(&mut self, volume: f32) -> Result<()> {
            self.record(format!("volume {volume}"));
            Ok(())
        }
    }

    async fn run(channel: &Channel, command: LocalCommand, authoritative: bool) -> Result<()> {
        match channel.dispatch(command, authoritative)? {
            Some(invocation) => invocation.run().await,
            None => Ok(()),
        }
    }

    fn ready_channel() -> (Channel, Recorder) {
        let recorder = Recorder::default();
        let mut channel = Channel::new(Box::new(recorder.clone()));
        channel.handle(DeviceEvent::Ready(DeviceId::from("local")));
        (channel, recorder)
    }

    #[test]
    fn ready_marks_the_device_and_refreshes_devices() {
        let mut channel = Channel::new(Box::new(Detached));
        let reaction = channel.handle(DeviceEvent::Ready(DeviceId::from("local")));

        assert!(channel.is_ready());
        assert_eq!(channel.ready_id(), Some(&DeviceId::from("local")));
        assert!(reaction.refresh_devices);
        assert!(!reaction.refresh_status);
    }

    #[test]
    fn not_ready_clears_everything_and_refreshes_status() {
        let (mut channel, _) = ready_channel();
        channel.handle(DeviceEvent::StateChanged(Some(LocalDeviceState::default())));

        let reaction = channel.handle(DeviceEvent::NotReady(DeviceId::from("local")));
        assert!(!channel.is_ready());
        assert!(channel.device_id().is_none());
        assert!(channel.state().is_none());
        assert!(reaction.refresh_status && reaction.refresh_devices);
    }

    #[test]
    fn losing_state_refreshes_status() {
        let (mut channel, _) = ready_channel();
        let reaction = channel.handle(DeviceEvent::StateChanged(None));
        assert!(reaction.refresh_status);
        assert!(channel.is_ready());
    }

    #[test]
    fn fatal_errors_degrade_to_not_ready() {
        let (mut channel, _) = ready_channel();
        channel.handle(DeviceEvent::Error(DeviceErrorKind::Playback, "skipped".to_string()));
        assert!(channel.is_ready());

        let reaction = channel.handle(DeviceEvent::Error(
            DeviceErrorKind::Account,
            "premium required".to_string(),
        ));
        assert!(!channel.is_ready());
        assert!(reaction.refresh_status);
    }

    #[tokio::test]
    async fn commands_are_no_ops_unless_authoritative() {
        let (channel, recorder) = ready_channel();

        for command in [
            LocalCommand::TogglePlay,
            LocalCommand::NextTrack,
            LocalCommand::PreviousTrack,
            LocalCommand::Seek(Duration::from_secs(1)),
            LocalCommand::SetVolume(0.3),
        ] {
            assert!(channel.dispatch(command, false).unwrap().is_none());
        }
        assert!(recorder.calls().is_empty());

        run(&channel, LocalCommand::TogglePlay, true).await.unwrap();
        run(&channel, LocalCommand::NextTrack, true).await.unwrap();
        run(&channel, LocalCommand::SetVolume(0.3), true).await.unwrap();
        assert_eq!(recorder.calls(), vec!["toggle", "next", "volume 0.3"]);
    }

    #[test]
    fn commands_are_no_ops_when_not_ready() {
        let channel = Channel::new(Box::new(Recorder::default()));
        assert!(channel
            .dispatch(LocalCommand::TogglePlay, true)
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn disallowed_commands_are_skipped() {
        let (mut channel, recorder) = ready_channel();
        channel.handle(DeviceEvent::StateChanged(Some(LocalDeviceState {
            disallows: Disallows {
                skipping_prev: true,
                ..Disallows::default()
            },
            ..LocalDeviceState::default()
        })));

        run(&channel, LocalCommand::PreviousTrack, true).await.unwrap();
        run(&channel, LocalCommand::NextTrack, true).await.unwrap();
        assert_eq!(recorder.calls(), vec!["next"]);
    }

    #[tokio::test]
    async fn seek_is_clamped_to_the_track() {
        let (mut channel, recorder) = ready_channel();
        channel.handle(DeviceEvent::StateChanged(Some(LocalDeviceState {
            duration: Duration::from_secs(10),
            ..LocalDeviceState::default()
        })));

        let invocation = channel
            .dispatch(LocalCommand::Seek(Duration::from_secs(60)), true)
            .unwrap()
            .unwrap();
        assert_eq!(invocation.command(), LocalCommand::Seek(Duration::from_secs(10)));

        invocation.run().await.unwrap();
        assert_eq!(recorder.calls(), vec!["seek 10000"]);
    }

    #[test]
    fn invalid_volume_is_rejected() {
        let (channel, recorder) = ready_channel();
        let err = channel
            .dispatch(LocalCommand::SetVolume(1.5), true)
            .err()
            .unwrap();
        assert_eq!(err.kind, crate::error::ErrorKind::OutOfRange);
        assert!(recorder.calls().is_empty());
    }

    #[tokio::test]
    async fn detached_device_never_connects() {
        let channel = Channel::new(Box::new(Detached));
        assert!(!channel.connect("tandem", 0.5).await.unwrap());
    }
}
