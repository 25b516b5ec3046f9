//! Moving playback between devices.
//!
//! At most one transfer is ever in flight. The [`Coordinator`] only keeps
//! the bookkeeping: the client issues the request and reports back through
//! [`Coordinator::finish`].
//!
//! # Auto-transfer
//!
//! When the local device is ready while another device is playing, the
//! client pulls playback over once. "Once" is tracked per remote device: the
//! policy re-arms when a different device takes over, when an attempt fails,
//! or when a transfer to another device completes.

use crate::{error::Error, state::DeviceId};

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Coordinator {
    in_flight: bool,
    target: Option<DeviceId>,
    /// Remote device for which auto-transfer has already been attempted.
    attempted_for: Option<DeviceId>,
    /// Whether the running transfer targets a device other than the local
    /// one.
    rearm_on_finish: bool,
    enabled: bool,
}

impl Coordinator {
    #[must_use]
    pub fn new(auto_transfer: bool) -> Self {
        Self {
            enabled: auto_transfer,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn in_flight(&self) -> bool {
        self.in_flight
    }

    #[must_use]
    pub fn target(&self) -> Option<&DeviceId> {
        self.target.as_ref()
    }

    #[must_use]
    pub fn auto_transfer_attempted(&self) -> bool {
        self.attempted_for.is_some()
    }

    /// Claims the single transfer slot. Returns `false` if a transfer is
    /// already running, in which case nothing changes.
    pub fn begin(&mut self, device_id: &DeviceId) -> bool {
        if self.in_flight {
            debug!(
                "transfer to {device_id} ignored: transfer to {} in flight",
                self.target.as_ref().map_or("unknown", DeviceId::as_str)
            );
            return false;
        }

        self.in_flight = true;
        self.target = Some(device_id.clone());
        self.rearm_on_finish = false;
        true
    }

    /// Like [`begin`](Self::begin) for a transfer the user asked for. A
    /// transfer away from `local_id` re-arms auto-transfer once it completes.
    pub fn begin_manual(&mut self, device_id: &DeviceId, local_id: Option<&DeviceId>) -> bool {
        if !self.begin(device_id) {
            return false;
        }

        self.rearm_on_finish = local_id != Some(device_id);
        true
    }

    /// Releases the slot after the transfer completed.
    pub fn finish(&mut self, result: Result<(), &Error>) {
        let target = self.target.take();
        let rearm = std::mem::take(&mut self.rearm_on_finish);
        self.in_flight = false;

        match result {
            Ok(()) => {
                if let Some(target) = target {
                    info!("playback transferred to {target}");
                }
                if rearm {
                    self.attempted_for = None;
                }
            }
            Err(e) => {
                error!("transfer failed: {e}");
                self.attempted_for = None;
            }
        }
    }

    /// Evaluates the auto-transfer policy against committed state.
    ///
    /// Returns the local device id when a transfer should start now, and
    /// marks the remote device as attempted. The caller must follow up with
    /// [`begin`](Self::begin). Paused playback elsewhere is left alone.
    pub fn auto_transfer_target(
        &mut self,
        local_id: Option<&DeviceId>,
        remote_id: Option<&DeviceId>,
        remote_playing: bool,
    ) -> Option<DeviceId> {
        let remote_id = remote_id?;

        // Another device took over since the last attempt.
        if self
            .attempted_for
            .as_ref()
            .is_some_and(|attempted| attempted != remote_id && Some(remote_id) != local_id)
        {
            trace!("auto-transfer re-armed for {remote_id}");
            self.attempted_for = None;
        }

        if !self.enabled || self.in_flight || !remote_playing {
            return None;
        }

        let local_id = local_id?;
        if local_id == remote_id || self.attempted_for.as_ref() == Some(remote_id) {
            return None;
        }

        info!("{remote_id} is playing, pulling playback to {local_id}");
        self.attempted_for = Some(remote_id.clone());
        Some(local_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(id: &str) -> DeviceId {
        DeviceId::from(id)
    }

    #[test]
    fn only_one_transfer_in_flight() {
        let mut transfer = Coordinator::new(true);
        assert!(transfer.begin(&id("A")));
        assert!(!transfer.begin(&id("B")));
        assert_eq!(transfer.target(), Some(&id("A")));

        transfer.finish(Ok(()));
        assert!(!transfer.in_flight());
        assert!(transfer.begin(&id("B")));
    }

    #[test]
    fn auto_transfer_fires_once_per_remote_device() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        let target = transfer.auto_transfer_target(Some(&local), Some(&id("A")), true);
        assert_eq!(target, Some(local.clone()));
        assert!(transfer.auto_transfer_attempted());
        assert!(transfer.begin(&local));
        transfer.finish(Ok(()));

        // The user moved playback back to A: A was already handled.
        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&id("A")), true), None);
        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&id("A")), true), None);
    }

    #[test]
    fn paused_remote_playback_is_left_alone() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&id("A")), false), None);
        assert!(!transfer.auto_transfer_attempted());

        let target = transfer.auto_transfer_target(Some(&local), Some(&id("A")), true);
        assert_eq!(target, Some(local));
    }

    #[test]
    fn auto_transfer_rearms_when_another_device_takes_over() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer
            .auto_transfer_target(Some(&local), Some(&id("A")), true)
            .is_some());
        let target = transfer.auto_transfer_target(Some(&local), Some(&id("B")), true);
        assert_eq!(target, Some(local));
    }

    #[test]
    fn playing_locally_keeps_the_attempt() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer
            .auto_transfer_target(Some(&local), Some(&id("A")), true)
            .is_some());
        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&local), true), None);
        assert!(transfer.auto_transfer_attempted());
        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&id("A")), true), None);
    }

    #[test]
    fn failed_transfer_rearms() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer
            .auto_transfer_target(Some(&local), Some(&id("A")), true)
            .is_some());
        assert!(transfer.begin(&local));
        transfer.finish(Err(&Error::unavailable("down")));

        assert!(!transfer.auto_transfer_attempted());
        let target = transfer.auto_transfer_target(Some(&local), Some(&id("A")), true);
        assert_eq!(target, Some(local));
    }

    #[test]
    fn no_auto_transfer_while_in_flight() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer.begin_manual(&id("C"), Some(&local)));
        assert_eq!(transfer.auto_transfer_target(Some(&local), Some(&id("A")), true), None);
    }

    #[test]
    fn transfer_to_another_device_rearms() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer
            .auto_transfer_target(Some(&local), Some(&id("A")), true)
            .is_some());
        assert!(transfer.begin(&local));
        transfer.finish(Ok(()));

        assert!(transfer.begin_manual(&id("C"), Some(&local)));
        transfer.finish(Ok(()));
        assert!(!transfer.auto_transfer_attempted());
    }

    #[test]
    fn manual_transfer_to_the_local_device_keeps_the_attempt() {
        let mut transfer = Coordinator::new(true);
        let local = id("local");

        assert!(transfer
            .auto_transfer_target(Some(&local), Some(&id("A")), true)
            .is_some());
        assert!(transfer.begin(&local));
        transfer.finish(Ok(()));

        assert!(transfer.begin_manual(&local, Some(&local)));
        transfer.finish(Ok(()));
        assert!(transfer.auto_transfer_attempted());
    }

    #[test]
    fn disabled_policy_never_fires() {
        let mut transfer = Coordinator::new(false);
        let target = transfer.auto_transfer_target(Some(&id("local")), Some(&id("A")), true);
        assert_eq!(target, None);
    }

    #[test]
    fn needs_both_devices() {
        let mut transfer = Coordinator::new(true);
        assert_eq!(transfer.auto_transfer_target(None, Some(&id("A")), true), None);
        assert_eq!(transfer.auto_transfer_target(Some(&id("local")), None, true), None);
    }
}
