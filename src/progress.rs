//! Live playback position between updates.
//!
//! Sources report a position only now and then: the remote status once per
//! poll, the local device once per state change. In between, the
//! [`Extrapolator`] advances the position by wall-clock time from an anchor
//! `(position, instant)`:
//!
//! ```text
//! live = min(anchor.position + (now - anchor.instant), duration)
//! ```
//!
//! Every value is computed from the anchor, never by accumulating tick
//! deltas, so ticking faster or slower never drifts.
//!
//! The extrapolator is **Frozen** while the authoritative source is paused
//! and **Ticking** while it plays. The tick timer only exists while Ticking.
//!
//! A new anchor is taken when the authoritative source delivers a new
//! position (a *reseed*), or when playback starts. A position is new when
//! its source, track, value or source timestamp differs from the last one
//! seen, so the same snapshot polled twice does not make the position jump
//! back.
//!
//! The same state machine drives the cover-art rotation angle: one full
//! turn per [`Rotation::PERIOD`] while playing, held at its exact angle while
//! paused.

use std::time::Duration;

use tokio::time::{self, Instant, Interval, MissedTickBehavior};

use crate::arbiter::{AuthoritativeView, Source};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Phase {
    #[default]
    Frozen,
    Ticking,
}

/// What changed in an [`Extrapolator::update`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Transition {
    Unchanged,
    Reseeded,
    Started,
    Stopped,
}

/// Identity of a reported position.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
struct Seed {
    source: Option<Source>,
    track: Option<String>,
    position: Duration,
    timestamp: u64,
}

impl Seed {
    fn of(view: &AuthoritativeView<'_>) -> Self {
        Self {
            source: Some(view.source()),
            track: view.track().map(|track| track.uri.clone()),
            position: view.position(),
            timestamp: view.timestamp(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Anchor {
    position: Duration,
    instant: Instant,
}

#[derive(Debug)]
pub struct Extrapolator {
    phase: Phase,
    seed: Seed,
    anchor: Anchor,
    duration: Duration,
    rotation: Rotation,
    tick_interval: Duration,
    ticker: Option<Interval>,
}

impl Extrapolator {
    #[must_use]
    pub fn new(tick_interval: Duration) -> Self {
        Self {
            phase: Phase::Frozen,
            seed: Seed::default(),
            anchor: Anchor {
                position: Duration::ZERO,
                instant: Instant::now(),
            },
            duration: Duration::ZERO,
            rotation: Rotation::default(),
            tick_interval,
            ticker: None,
        }
    }

    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    #[must_use]
    pub fn is_ticking(&self) -> bool {
        self.phase == Phase::Ticking
    }

    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// Follows the authoritative view after a state change.
    pub fn update(&mut self, view: &AuthoritativeView<'_>, now: Instant) -> Transition {
        let seed = Seed::of(view);
        let playing = view.is_playing();
        let reseed = seed != self.seed;
        let flips = playing != self.is_ticking();

        if seed.track != self.seed.track {
            self.rotation.reset(now);
        }

        self.duration = view.duration();

        if reseed || flips {
            let position = if reseed {
                view.position()
            } else {
                self.live(now)
            };
            self.anchor = Anchor {
                position: position.min(self.duration),
                instant: now,
            };
        }
        self.seed = seed;

        if !flips {
            return if reseed {
                Transition::Reseeded
            } else {
                Transition::Unchanged
            };
        }

        if playing {
            self.start(now);
            Transition::Started
        } else {
            self.stop(now);
            Transition::Stopped
        }
    }

    fn start(&mut self, now: Instant) {
        self.phase = Phase::Ticking;
        self.rotation.resume(now);

        let mut ticker = time::interval_at(now + self.tick_interval, self.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        self.ticker = Some(ticker);
    }

    fn stop(&mut self, now: Instant) {
        self.phase = Phase::Frozen;
        self.rotation.hold(now);
        self.ticker = None;
    }

    /// Waits for the next tick. Never completes while Frozen.
    pub async fn tick(&mut self) -> Instant {
        match self.ticker.as_mut() {
            Some(ticker) => ticker.tick().await,
            None => std::future::pending().await,
        }
    }

    /// Live position at `now`, always within `[0, duration]`.
    #[must_use]
    pub fn live(&self, now: Instant) -> Duration {
        let position = match self.phase {
            Phase::Frozen => self.anchor.position,
            Phase::Ticking => {
                self.anchor.position + now.saturating_duration_since(self.anchor.instant)
            }
        };
        position.min(self.duration)
    }

    /// Live position as a percentage of the duration; 0 without a duration.
    #[must_use]
    pub fn percent(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 0.0;
        }
        self.live(now).as_secs_f64() / self.duration.as_secs_f64() * 100.0
    }

    /// Cover-art rotation in degrees, within `[0, 360)`.
    #[must_use]
    pub fn rotation(&self, now: Instant) -> f64 {
        self.rotation.angle(now, self.is_ticking())
    }
}

/// Continuous rotation that survives pauses without snapping back.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    /// Angle at `since`.
    angle: f64,
    since: Option<Instant>,
}

impl Rotation {
    /// Time for one full turn.
    pub const PERIOD: Duration = Duration::from_secs(20);

    fn advance(&self, now: Instant) -> f64 {
        let elapsed = self
            .since
            .map_or(Duration::ZERO, |since| now.saturating_duration_since(since));
        (self.angle + elapsed.as_secs_f64() / Self::PERIOD.as_secs_f64() * 360.0) % 360.0
    }

    fn angle(&self, now: Instant, running: bool) -> f64 {
        if running {
            self.advance(now)
        } else {
            self.angle
        }
    }

    fn resume(&mut self, now: Instant) {
        self.since = Some(now);
    }

    fn hold(&mut self, now: Instant) {
        self.angle = self.advance(now);
        self.since = None;
    }

    fn reset(&mut self, now: Instant) {
        self.angle = 0.0;
        if self.since.is_some() {
            self.since = Some(now);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{
        DeviceId, DeviceRef, DeviceType, LocalDeviceState, PlaybackSnapshot, TrackRef,
    };

    fn snapshot(
        playing: bool,
        progress_ms: u64,
        duration_ms: u64,
        timestamp: u64,
    ) -> PlaybackSnapshot {
        PlaybackSnapshot {
            device: DeviceRef {
                id: Some(DeviceId::from("A")),
                name: "A".to_string(),
                kind: DeviceType::Speaker,
                is_active: true,
                volume_percent: None,
            },
            is_playing: playing,
            progress: Duration::from_millis(progress_ms),
            track: Some(TrackRef {
                uri: "spotify:track:1".to_string(),
                name: "Track".to_string(),
                artists: Vec::new(),
                duration: Duration::from_millis(duration_ms),
            }),
            shuffle_state: false,
            timestamp,
        }
    }

    fn extrapolator() -> Extrapolator {
        Extrapolator::new(Duration::from_millis(50))
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_from_the_anchor() {
        let mut progress = extrapolator();
        let t = Instant::now();
        let remote = snapshot(true, 10_000, 20_000, 1);

        assert_eq!(progress.update(&AuthoritativeView::Remote(&remote), t), Transition::Started);
        assert_eq!(progress.live(t + Duration::from_millis(3000)), Duration::from_millis(13_000));
    }

    #[tokio::test(start_paused = true)]
    async fn clamps_to_duration() {
        let mut progress = extrapolator();
        let t = Instant::now();
        let remote = snapshot(true, 19_000, 20_000, 1);

        progress.update(&AuthoritativeView::Remote(&remote), t);
        assert_eq!(progress.live(t + Duration::from_secs(60)), Duration::from_millis(20_000));
        assert!((progress.percent(t + Duration::from_secs(60)) - 100.0).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn zero_duration_reports_zero_percent() {
        let mut progress = extrapolator();
        let t = Instant::now();
        let remote = snapshot(true, 5_000, 0, 1);

        progress.update(&AuthoritativeView::Remote(&remote), t);
        assert_eq!(progress.live(t + Duration::from_secs(1)), Duration::ZERO);
        assert!(progress.percent(t + Duration::from_secs(1)).abs() < f64::EPSILON);
    }

    #[tokio::test(start_paused = true)]
    async fn identical_snapshot_does_not_jump() {
        let mut progress = extrapolator();
        let t = Instant::now();
        let first = snapshot(true, 10_000, 200_000, 1);
        let again = first.clone();

        progress.update(&AuthoritativeView::Remote(&first), t);
        let later = t + Duration::from_millis(1500);
        assert_eq!(
            progress.update(&AuthoritativeView::Remote(&again), later),
            Transition::Unchanged
        );
        assert_eq!(progress.live(later), Duration::from_millis(11_500));
    }

    #[tokio::test(start_paused = true)]
    async fn new_position_reseeds() {
        let mut progress = extrapolator();
        let t = Instant::now();
        progress.update(&AuthoritativeView::Remote(&snapshot(true, 10_000, 200_000, 1)), t);

        let later = t + Duration::from_millis(1500);
        let fresh = snapshot(true, 11_200, 200_000, 2);
        assert_eq!(
            progress.update(&AuthoritativeView::Remote(&fresh), later),
            Transition::Reseeded
        );
        assert_eq!(progress.live(later), Duration::from_millis(11_200));
        assert_eq!(
            progress.live(later + Duration::from_millis(100)),
            Duration::from_millis(11_300)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn pausing_freezes_the_position() {
        let mut progress = extrapolator();
        let t = Instant::now();
        let mut state = LocalDeviceState {
            paused: false,
            position: Duration::from_secs(1),
            duration: Duration::from_secs(100),
            timestamp: 1,
            ..LocalDeviceState::default()
        };
        progress.update(&AuthoritativeView::Local(&state), t);
        assert!(progress.is_ticking());

        state.paused = true;
        state.position = Duration::from_secs(3);
        state.timestamp = 2;
        let paused_at = t + Duration::from_secs(2);
        assert_eq!(
            progress.update(&AuthoritativeView::Local(&state), paused_at),
            Transition::Stopped
        );
        assert_eq!(progress.phase(), Phase::Frozen);
        assert_eq!(progress.live(paused_at + Duration::from_secs(30)), Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn losing_every_source_stops_at_zero() {
        let mut progress = extrapolator();
        let t = Instant::now();
        progress.update(&AuthoritativeView::Remote(&snapshot(true, 10_000, 200_000, 1)), t);

        assert_eq!(progress.update(&AuthoritativeView::None, t), Transition::Stopped);
        assert_eq!(progress.live(t + Duration::from_secs(1)), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn ticker_only_runs_while_ticking() {
        let mut progress = extrapolator();
        let t = Instant::now();
        progress.update(&AuthoritativeView::Remote(&snapshot(true, 0, 200_000, 1)), t);

        let tick = progress.tick().await;
        assert_eq!(tick, t + Duration::from_millis(50));

        progress.update(&AuthoritativeView::Remote(&snapshot(false, 50, 200_000, 2)), tick);
        let frozen = time::timeout(Duration::from_secs(1), progress.tick()).await;
        assert!(frozen.is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn rotation_holds_its_angle_while_paused() {
        let mut progress = extrapolator();
        let t = Instant::now();
        progress.update(&AuthoritativeView::Remote(&snapshot(true, 0, 200_000, 1)), t);
        assert!((progress.rotation(t + Duration::from_secs(5)) - 90.0).abs() < 1e-9);

        let paused = t + Duration::from_secs(5);
        progress.update(&AuthoritativeView::Remote(&snapshot(false, 5_000, 200_000, 2)), paused);
        assert!((progress.rotation(paused + Duration::from_secs(60)) - 90.0).abs() < 1e-9);

        let resumed = paused + Duration::from_secs(60);
        progress.update(&AuthoritativeView::Remote(&snapshot(true, 5_000, 200_000, 3)), resumed);
        assert!((progress.rotation(resumed + Duration::from_secs(10)) - 270.0).abs() < 1e-9);
    }
}
