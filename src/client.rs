//! The playback core.
//!
//! A [`Client`] owns every piece of state: the remote status, the local
//! device channel, the live progress and the transfer bookkeeping. It runs
//! as a single task ([`Client::run`]) that waits on:
//!
//! * control requests from [`Handle`]s,
//! * notifications from the local device,
//! * completions of the requests it spawned,
//! * the poll timer, the deferred re-poll timer and the progress tick.
//!
//! Network requests never run inside the loop. They are spawned and report
//! back through an internal channel, and their results are committed in the
//! loop. After every commit the authoritative view is derived again from
//! scratch, and the outcome is published as a [`Status`] on a
//! [`watch`] channel and as [`Event`]s on a [`broadcast`] channel.
//!
//! Remote writes are never applied optimistically. A successful write arms
//! a re-poll that confirms its effect; a newer write replaces a pending
//! re-poll.

use std::{future::Future, ops::ControlFlow, sync::Arc, time::Duration};

use tokio::{
    sync::{broadcast, mpsc, oneshot, watch},
    time::{self, Instant},
};

use crate::{
    arbiter::{arbitrate, LocalInputs, Source},
    command::{self, PlayContext},
    config::Config,
    device::{self, DeviceEvent, LocalCommand, LocalDevice},
    error::{Error, Result},
    events::Event,
    poller::Poller,
    progress::Extrapolator,
    remote::{PlayRequest, RemoteApi},
    state::{DeviceId, DeviceRef, PlaybackSnapshot, RemoteStatus, TrackRef},
    transfer,
};

/// What the core currently shows.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Status {
    /// Remote status as last loaded; `None` while loading.
    pub remote: Option<RemoteStatus>,
    pub devices: Vec<DeviceRef>,

    /// Id of the local device while it is ready.
    pub local_device_id: Option<DeviceId>,
    /// Whether the remote status names the local device as playing.
    pub local_active: bool,

    pub source: Source,
    pub track: Option<TrackRef>,
    pub is_playing: bool,
    pub progress: Duration,
    pub duration: Duration,
    /// `progress` as a percentage of `duration`.
    pub percent: f64,
    /// Cover-art rotation in degrees.
    pub rotation: f64,

    pub transfer_in_flight: bool,
    pub auto_transfer_attempted: bool,

    pub playback_error: Option<String>,
    pub devices_error: Option<String>,
}

impl Status {
    #[must_use]
    pub fn snapshot(&self) -> Option<&PlaybackSnapshot> {
        self.remote.as_ref().and_then(RemoteStatus::snapshot)
    }

    #[must_use]
    pub fn is_loaded(&self) -> bool {
        self.remote.is_some()
    }
}

type Reply = oneshot::Sender<Result<()>>;

#[derive(Debug)]
enum Command {
    Local(LocalCommand),
    SetVolume(u32),
    ToggleShuffle,
    Play(PlayContext),
    Pause,
    Resume,
    Transfer(DeviceId),
    Refresh,
    RefreshDevices,
    Shutdown,
}

#[derive(Debug)]
struct Request {
    command: Command,
    reply: Reply,
}

/// Results of spawned requests.
enum Completion {
    Local {
        command: LocalCommand,
        result: Result<()>,
        reply: Reply,
    },
    Polled(Result<Option<PlaybackSnapshot>>),
    Listed(Result<Vec<DeviceRef>>),
    Written {
        result: Result<()>,
        reply: Reply,
    },
    Transferred {
        device_id: DeviceId,
        result: Result<()>,
        reply: Option<Reply>,
    },
}

/// Last derived values, to tell what changed between commits.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
struct Observed {
    local_ready: bool,
    source: Source,
    is_playing: bool,
    track: Option<String>,
}

pub struct Client {
    device_name: String,
    initial_volume: f32,
    repoll_delay: Duration,
    transfer_settle: Duration,

    remote: Arc<dyn RemoteApi>,
    device: device::Channel,
    poller: Poller,
    progress: Extrapolator,
    transfer: transfer::Coordinator,

    requests: mpsc::Receiver<Request>,
    device_events: mpsc::Receiver<DeviceEvent>,
    completions_tx: mpsc::UnboundedSender<Completion>,
    completions_rx: mpsc::UnboundedReceiver<Completion>,

    next_poll: Instant,
    repoll_at: Option<Instant>,

    observed: Observed,
    status_tx: watch::Sender<Status>,
    event_tx: broadcast::Sender<Event>,
}

/// Cloneable control surface of a running [`Client`].
#[derive(Clone, Debug)]
pub struct Handle {
    requests: mpsc::Sender<Request>,
    status_rx: watch::Receiver<Status>,
    event_tx: broadcast::Sender<Event>,
}

impl Client {
    const REQUEST_QUEUE_SIZE: usize = 32;
    const EVENT_QUEUE_SIZE: usize = 64;

    /// Creates the core and a handle to control it. Nothing happens until
    /// [`run`](Self::run) is awaited.
    ///
    /// `device_events` is where the host forwards the notifications of
    /// `device`.
    #[must_use]
    pub fn new(
        config: &Config,
        remote: Arc<dyn RemoteApi>,
        device: Box<dyn LocalDevice>,
        device_events: mpsc::Receiver<DeviceEvent>,
    ) -> (Self, Handle) {
        let (requests_tx, requests_rx) = mpsc::channel(Self::REQUEST_QUEUE_SIZE);
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();
        let (status_tx, status_rx) = watch::channel(Status::default());
        let (event_tx, _) = broadcast::channel(Self::EVENT_QUEUE_SIZE);

        let client = Self {
            device_name: config.device_name.clone(),
            initial_volume: config.initial_volume,
            repoll_delay: config.repoll_delay,
            transfer_settle: config.transfer_settle,

            remote,
            device: device::Channel::new(device),
            poller: Poller::new(config),
            progress: Extrapolator::new(config.tick_interval),
            transfer: transfer::Coordinator::new(config.auto_transfer),

            requests: requests_rx,
            device_events,
            completions_tx,
            completions_rx,

            next_poll: Instant::now(),
            repoll_at: None,

            observed: Observed::default(),
            status_tx,
            event_tx: event_tx.clone(),
        };

        let handle = Handle {
            requests: requests_tx,
            status_rx,
            event_tx,
        };

        (client, handle)
    }

    /// Runs the core until it is shut down through a [`Handle`], or every
    /// handle is dropped.
    pub async fn run(mut self) {
        match self
            .device
            .connect(&self.device_name, self.initial_volume)
            .await
        {
            Ok(true) => {}
            Ok(false) => info!("running without a local device"),
            Err(e) => warn!("failed to connect local device: {e}"),
        }

        self.refresh();
        self.refresh_devices();
        self.next_poll = Instant::now() + self.poller.interval();
        self.commit();

        let shutdown = loop {
            let repoll_at = self.repoll_at.unwrap_or(self.next_poll);
            tokio::select! {
                // Commit results before acting on anything that depends on
                // them.
                biased;

                Some(completion) = self.completions_rx.recv() => {
                    self.handle_completion(completion);
                }

                Some(event) = self.device_events.recv() => {
                    self.handle_device_event(event);
                }

                request = self.requests.recv() => {
                    match request {
                        Some(request) => {
                            if let ControlFlow::Break(reply) = self.handle_request(request) {
                                break Some(reply);
                            }
                        }
                        None => {
                            debug!("all handles dropped");
                            break None;
                        }
                    }
                }

                () = time::sleep_until(repoll_at), if self.repoll_at.is_some() => {
                    trace!("confirming last write");
                    self.repoll_at = None;
                    self.refresh();
                }

                () = time::sleep_until(self.next_poll) => {
                    self.refresh();
                    self.next_poll = Instant::now() + self.poller.interval();
                }

                now = self.progress.tick() => {
                    self.publish_progress(now);
                }
            }
        };

        info!("shutting down playback core");
        self.device.disconnect().await;
        if let Some(reply) = shutdown {
            let _ = reply.send(Ok(()));
        }
    }

    fn handle_request(&mut self, request: Request) -> ControlFlow<Reply> {
        let Request { command, reply } = request;
        trace!("request: {command:?}");

        match command {
            Command::Local(command) => self.local_command(command, reply),

            Command::SetVolume(percent) => match command::volume_percent(percent) {
                Ok(percent) => self.remote_write(reply, |remote, target| async move {
                    remote.set_volume(Some(&target), percent).await
                }),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            Command::ToggleShuffle => {
                let state = !self
                    .poller
                    .snapshot()
                    .is_some_and(|snapshot| snapshot.shuffle_state);
                self.remote_write(reply, move |remote, target| async move {
                    remote.set_shuffle(Some(&target), state).await
                });
            }

            Command::Play(context) => match context.into_request() {
                Ok(request) => self.play(request, reply),
                Err(e) => {
                    let _ = reply.send(Err(e));
                }
            },

            Command::Pause => self.remote_write(reply, |remote, target| async move {
                remote.pause(Some(&target)).await
            }),

            Command::Resume => self.remote_write(reply, |remote, target| async move {
                remote
                    .play(PlayRequest {
                        device_id: Some(target),
                        ..PlayRequest::default()
                    })
                    .await
            }),

            Command::Transfer(device_id) => self.start_transfer(device_id, Some(reply), true),

            Command::Refresh => {
                self.refresh();
                let _ = reply.send(Ok(()));
            }

            Command::RefreshDevices => {
                self.refresh_devices();
                let _ = reply.send(Ok(()));
            }

            Command::Shutdown => return ControlFlow::Break(reply),
        }

        ControlFlow::Continue(())
    }

    /// Spawns a command on the local device, if it is the authoritative one.
    fn local_command(&mut self, command: LocalCommand, reply: Reply) {
        let authoritative = arbitrate(self.local_inputs(), self.poller.snapshot())
            .view
            .is_local();

        match self.device.dispatch(command, authoritative) {
            Ok(Some(invocation)) => {
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let result = invocation.run().await;
                    let _ = completions.send(Completion::Local {
                        command,
                        result,
                        reply,
                    });
                });
            }
            Ok(None) => {
                let _ = reply.send(Ok(()));
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn local_inputs(&self) -> LocalInputs<'_> {
        LocalInputs {
            ready: self.device.is_ready(),
            device_id: self.device.device_id(),
            state: self.device.state(),
        }
    }

    /// Resolves the target device, or fails the request and looks for
    /// devices.
    fn resolve_target(&mut self) -> Result<DeviceId> {
        let target = command::resolve_target(self.device.ready_id(), self.poller.snapshot());
        if target.is_err() {
            self.refresh_devices();
        }
        target
    }

    /// Spawns a write to the resolved target device.
    fn remote_write<F, Fut>(&mut self, reply: Reply, write: F)
    where
        F: FnOnce(Arc<dyn RemoteApi>, DeviceId) -> Fut,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        match self.resolve_target() {
            Ok(target) => {
                let request = write(Arc::clone(&self.remote), target);
                self.spawn_write(request, reply);
            }
            Err(e) => {
                let _ = reply.send(Err(e));
            }
        }
    }

    fn play(&mut self, mut request: PlayRequest, reply: Reply) {
        if request.device_id.is_none() {
            match self.resolve_target() {
                Ok(target) => request.device_id = Some(target),
                Err(e) => {
                    let _ = reply.send(Err(e));
                    return;
                }
            }
        }

        let remote = Arc::clone(&self.remote);
        self.spawn_write(async move { remote.play(request).await }, reply);
    }

    fn spawn_write<F>(&self, write: F, reply: Reply)
    where
        F: Future<Output = Result<()>> + Send + 'static,
    {
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = write.await;
            let _ = completions.send(Completion::Written { result, reply });
        });
    }

    fn start_transfer(&mut self, device_id: DeviceId, reply: Option<Reply>, manual: bool) {
        let started = if manual {
            self.transfer.begin_manual(&device_id, self.device.ready_id())
        } else {
            self.transfer.begin(&device_id)
        };

        if !started {
            if let Some(reply) = reply {
                let _ = reply.send(Ok(()));
            }
            return;
        }

        info!("transferring playback to {device_id}");
        self.emit(Event::TransferStarted(device_id.clone()));

        let remote = Arc::clone(&self.remote);
        let completions = self.completions_tx.clone();
        let settle = self.transfer_settle;
        tokio::spawn(async move {
            let result = remote.transfer_playback(&device_id, true).await;
            if result.is_ok() {
                // Give the provider time to catch up before asking for the
                // new status.
                time::sleep(settle).await;
            }
            let _ = completions.send(Completion::Transferred {
                device_id,
                result,
                reply,
            });
        });
    }

    /// Starts a status poll, or queues one behind the running poll.
    fn refresh(&mut self) {
        if !self.poller.refresh() {
            return;
        }
        self.spawn_poll();
    }

    fn spawn_poll(&self) {
        let remote = Arc::clone(&self.remote);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = remote.playback_state().await;
            let _ = completions.send(Completion::Polled(result));
        });
    }

    fn refresh_devices(&mut self) {
        if !self.poller.refresh_devices() {
            return;
        }
        self.spawn_device_list();
    }

    fn spawn_device_list(&self) {
        let remote = Arc::clone(&self.remote);
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = remote.devices().await;
            let _ = completions.send(Completion::Listed(result));
        });
    }

    fn handle_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Local {
                command,
                result,
                reply,
            } => {
                if let Err(e) = &result {
                    error!("local {command} failed: {e}");
                    self.refresh();
                }
                let _ = reply.send(result);
            }

            Completion::Polled(result) => {
                if self.poller.commit(result) {
                    self.spawn_poll();
                }
            }

            Completion::Listed(result) => {
                if self.poller.commit_devices(result) {
                    self.spawn_device_list();
                }
            }

            Completion::Written { result, reply } => {
                match &result {
                    Ok(()) => self.repoll_at = Some(Instant::now() + self.repoll_delay),
                    Err(e) => {
                        error!("remote command failed: {e}");
                        if e.is_no_active_device() {
                            self.refresh_devices();
                        }
                    }
                }
                let _ = reply.send(result);
            }

            Completion::Transferred {
                device_id,
                result,
                reply,
            } => {
                self.transfer.finish(result.as_ref().map(|_| ()));
                match &result {
                    Ok(()) => self.refresh(),
                    Err(e) if e.is_no_active_device() => self.refresh_devices(),
                    Err(_) => {}
                }

                self.emit(Event::TransferFinished {
                    device_id,
                    success: result.is_ok(),
                });
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }

        self.commit();
    }

    fn handle_device_event(&mut self, event: DeviceEvent) {
        let reaction = self.device.handle(event);
        if reaction.refresh_status {
            self.refresh();
        }
        if reaction.refresh_devices {
            self.refresh_devices();
        }

        self.commit();
    }

    /// Derives everything from committed state and publishes it.
    fn commit(&mut self) {
        let now = Instant::now();

        let local = LocalInputs {
            ready: self.device.is_ready(),
            device_id: self.device.device_id(),
            state: self.device.state(),
        };
        let arbitration = arbitrate(local, self.poller.snapshot());
        let view = arbitration.view;
        self.progress.update(&view, now);

        let observed = Observed {
            local_ready: local.ready,
            source: view.source(),
            is_playing: view.is_playing(),
            track: view.track().map(|track| track.uri.clone()),
        };

        let mut status = Status {
            remote: self.poller.status().cloned(),
            devices: self.poller.devices().to_vec(),
            local_device_id: self.device.ready_id().cloned(),
            local_active: arbitration.local_active_globally,
            source: view.source(),
            track: view.track().cloned(),
            is_playing: view.is_playing(),
            progress: self.progress.live(now),
            duration: self.progress.duration(),
            percent: self.progress.percent(now),
            rotation: self.progress.rotation(now),
            transfer_in_flight: false,
            auto_transfer_attempted: false,
            playback_error: self.poller.last_error().map(ToString::to_string),
            devices_error: self.poller.devices_error().map(ToString::to_string),
        };

        if let Some(interval) = self
            .poller
            .adapt_interval(status.is_playing && status.local_active)
        {
            self.next_poll = now + interval;
        }

        self.emit_changes(observed);

        let remote = self.poller.snapshot();
        let auto_transfer = self.transfer.auto_transfer_target(
            self.device.ready_id(),
            remote.and_then(PlaybackSnapshot::device_id),
            remote.is_some_and(|snapshot| snapshot.is_playing),
        );
        if let Some(local_id) = auto_transfer {
            self.start_transfer(local_id, None, false);
        }

        status.transfer_in_flight = self.transfer.in_flight();
        status.auto_transfer_attempted = self.transfer.auto_transfer_attempted();
        self.status_tx.send_replace(status);
    }

    fn publish_progress(&mut self, now: Instant) {
        let progress = self.progress.live(now);
        let percent = self.progress.percent(now);
        let rotation = self.progress.rotation(now);

        self.status_tx.send_modify(|status| {
            status.progress = progress;
            status.percent = percent;
            status.rotation = rotation;
        });
    }

    fn emit_changes(&mut self, observed: Observed) {
        let previous = std::mem::replace(&mut self.observed, observed.clone());

        if observed.local_ready != previous.local_ready {
            match self.device.ready_id() {
                Some(device_id) if observed.local_ready => {
                    self.emit(Event::Connected(device_id.clone()));
                }
                _ => self.emit(Event::Disconnected),
            }
        }

        if observed.source != previous.source {
            debug!("now following {}", observed.source);
            self.emit(Event::SourceChanged(observed.source));
        }

        if observed.track != previous.track && observed.track.is_some() {
            self.emit(Event::TrackChanged);
        }

        if observed.is_playing != previous.is_playing {
            self.emit(if observed.is_playing {
                Event::Play
            } else {
                Event::Pause
            });
        }
    }

    fn emit(&self, event: Event) {
        trace!("event: {event:?}");
        // Nobody listening is fine.
        let _ = self.event_tx.send(event);
    }
}

impl Handle {
    async fn call(&self, command: Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.requests
            .send(Request { command, reply })
            .await
            .map_err(|_| Error::cancelled("playback core stopped"))?;

        response
            .await
            .map_err(|_| Error::cancelled("playback core stopped"))?
    }

    /// Toggles play/pause on the local device. Does nothing unless the
    /// local device is the authoritative source.
    ///
    /// # Errors
    ///
    /// Returns the local device's error, or `Cancelled` if the core stopped.
    pub async fn toggle_play(&self) -> Result<()> {
        self.call(Command::Local(LocalCommand::TogglePlay)).await
    }

    /// Skips to the next track on the local device, like
    /// [`toggle_play`](Self::toggle_play).
    ///
    /// # Errors
    ///
    /// Returns the local device's error, or `Cancelled` if the core stopped.
    pub async fn next_track(&self) -> Result<()> {
        self.call(Command::Local(LocalCommand::NextTrack)).await
    }

    /// # Errors
    ///
    /// Returns the local device's error, or `Cancelled` if the core stopped.
    pub async fn previous_track(&self) -> Result<()> {
        self.call(Command::Local(LocalCommand::PreviousTrack)).await
    }

    /// # Errors
    ///
    /// Returns the local device's error, or `Cancelled` if the core stopped.
    pub async fn seek(&self, position: Duration) -> Result<()> {
        self.call(Command::Local(LocalCommand::Seek(position))).await
    }

    /// Sets the output volume of the local device itself, as a ratio. Does
    /// nothing unless the local device is the authoritative source; use
    /// [`set_volume`](Self::set_volume) for whatever device is playing.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` outside `0.0..=1.0` without touching the device,
    /// the local device's error, or `Cancelled` if the core stopped.
    pub async fn set_local_volume(&self, volume: f32) -> Result<()> {
        self.call(Command::Local(LocalCommand::SetVolume(volume))).await
    }

    /// Sets the volume of the target device.
    ///
    /// # Errors
    ///
    /// Returns `OutOfRange` above 100 percent without making any request,
    /// `FailedPrecondition` without a device to act on, or the Web API's
    /// error.
    pub async fn set_volume(&self, percent: u32) -> Result<()> {
        self.call(Command::SetVolume(percent)).await
    }

    /// Flips shuffle on the target device.
    ///
    /// # Errors
    ///
    /// Returns `FailedPrecondition` without a device to act on, or the Web
    /// API's error.
    pub async fn toggle_shuffle(&self) -> Result<()> {
        self.call(Command::ToggleShuffle).await
    }

    /// # Errors
    ///
    /// Returns `InvalidArgument` without making any request unless exactly
    /// one of a context or a track list is given, or the Web API's error.
    pub async fn play_context(&self, context: PlayContext) -> Result<()> {
        self.call(Command::Play(context)).await
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without a device to act on, or the Web
    /// API's error.
    pub async fn pause(&self) -> Result<()> {
        self.call(Command::Pause).await
    }

    /// # Errors
    ///
    /// Returns `FailedPrecondition` without a device to act on, or the Web
    /// API's error.
    pub async fn resume(&self) -> Result<()> {
        self.call(Command::Resume).await
    }

    /// Moves playback to another device. Returns immediately with success if
    /// a transfer is already in flight.
    ///
    /// # Errors
    ///
    /// Returns the Web API's error.
    pub async fn transfer(&self, device_id: DeviceId) -> Result<()> {
        self.call(Command::Transfer(device_id)).await
    }

    /// Polls the remote status now.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the core stopped.
    pub async fn refresh(&self) -> Result<()> {
        self.call(Command::Refresh).await
    }

    /// # Errors
    ///
    /// Returns `Cancelled` if the core stopped.
    pub async fn refresh_devices(&self) -> Result<()> {
        self.call(Command::RefreshDevices).await
    }

    /// Stops the core and disconnects the local device.
    ///
    /// # Errors
    ///
    /// Returns `Cancelled` if the core already stopped.
    pub async fn shutdown(&self) -> Result<()> {
        self.call(Command::Shutdown).await
    }

    /// The status as last published.
    #[must_use]
    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Follows status changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }

    #[must_use]
    pub fn events(&self) -> broadcast::Receiver<Event> {
        self.event_tx.subscribe()
    }
}
