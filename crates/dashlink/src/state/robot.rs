use bevy::prelude::Resource;

use dashlink_common::DashboardEvent;

use crate::gate;
use crate::hub::ViewerHub;

/// Snapshot of the path-model fields the status envelope derives from.
///
/// Mode and dock state belong to [`PathState`](crate::state::PathState);
/// the status model reads them at notification time instead of storing a
/// second copy that could drift.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PathFlags {
    pub path_module_active: bool,
    pub docked: bool,
}

/// The operating-mode label shown on the dashboard.
pub fn mode_label(path_module_active: bool) -> &'static str {
    if path_module_active {
        "Running Path Module"
    } else {
        "Teleoperating"
    }
}

/// Power, battery and connectivity state of the robot.
///
/// Every setter follows the same pipeline: gate on equality, mutate, emit
/// one `STATUS_UPDATE`. Connectivity fields are `None` until the first
/// reading arrives so viewers can distinguish "unknown" from "down".
#[derive(Resource)]
pub struct RobotState {
    hub: ViewerHub,
    is_on: bool,
    battery_percent: Option<f64>,
    wifi_connected: Option<bool>,
    comms_connected: Option<bool>,
    pi_connected: Option<bool>,
}

impl RobotState {
    pub fn new(hub: ViewerHub) -> Self {
        Self {
            hub,
            is_on: false,
            battery_percent: None,
            wifi_connected: None,
            comms_connected: None,
            pi_connected: None,
        }
    }

    pub fn set_power(&mut self, on: bool, flags: PathFlags) -> bool {
        let changed = gate::apply(&mut self.is_on, on);
        if changed {
            self.notify_status(flags);
        }
        changed
    }

    /// Store a battery reading, clamped to `[0, 100]`. Normalization of
    /// `[0, 1]`-scaled readings happens at the telemetry boundary; the
    /// model only enforces the invariant.
    pub fn set_battery_percent(&mut self, percent: f64, flags: PathFlags) -> bool {
        let changed = gate::apply(&mut self.battery_percent, Some(percent.clamp(0.0, 100.0)));
        if changed {
            self.notify_status(flags);
        }
        changed
    }

    pub fn set_wifi(&mut self, connected: bool, flags: PathFlags) -> bool {
        let changed = gate::apply(&mut self.wifi_connected, Some(connected));
        if changed {
            self.notify_status(flags);
        }
        changed
    }

    pub fn set_comms(&mut self, connected: bool, flags: PathFlags) -> bool {
        let changed = gate::apply(&mut self.comms_connected, Some(connected));
        if changed {
            self.notify_status(flags);
        }
        changed
    }

    pub fn set_pi(&mut self, connected: bool, flags: PathFlags) -> bool {
        let changed = gate::apply(&mut self.pi_connected, Some(connected));
        if changed {
            self.notify_status(flags);
        }
        changed
    }

    pub fn battery_percent(&self) -> Option<f64> {
        self.battery_percent
    }

    /// Re-emit the status envelope without mutating, used when a derived
    /// field (mode, dock state) changed underneath this model.
    pub fn notify_status(&self, flags: PathFlags) {
        self.hub.notify(&self.status_event(flags));
    }

    pub fn status_event(&self, flags: PathFlags) -> DashboardEvent {
        DashboardEvent::StatusUpdate {
            is_on: self.is_on,
            battery_percentage: self.battery_percent,
            is_wifi_connected: self.wifi_connected,
            is_comms_connected: self.comms_connected,
            is_raspberry_pi_connected: self.pi_connected,
            mode: mode_label(flags.path_module_active).to_string(),
            is_docked: flags.docked,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ViewerListener;
    use async_channel::unbounded;
    use std::sync::Arc;

    fn state_with_listener() -> (RobotState, async_channel::Receiver<Arc<str>>) {
        let hub = ViewerHub::new();
        let (tx, rx) = unbounded();
        hub.attach(ViewerListener::new(hub.allocate_id(), tx));
        (RobotState::new(hub), rx)
    }

    #[test]
    fn battery_is_clamped() {
        let (mut state, rx) = state_with_listener();
        let flags = PathFlags::default();

        assert!(state.set_battery_percent(150.0, flags));
        assert_eq!(state.battery_percent(), Some(100.0));
        assert!(state.set_battery_percent(-3.0, flags));
        assert_eq!(state.battery_percent(), Some(0.0));
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn redundant_writes_notify_nobody() {
        let (mut state, rx) = state_with_listener();
        let flags = PathFlags::default();

        assert!(state.set_wifi(true, flags));
        assert!(!state.set_wifi(true, flags));
        assert!(!state.set_wifi(true, flags));
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn mode_derives_from_path_flags() {
        let (state, _rx) = state_with_listener();

        let event = state.status_event(PathFlags {
            path_module_active: true,
            docked: true,
        });
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["mode"], "Running Path Module");
        assert_eq!(json["isDocked"], true);

        let event = state.status_event(PathFlags::default());
        let json = serde_json::to_value(&event).expect("serializable");
        assert_eq!(json["mode"], "Teleoperating");
        assert_eq!(json["isDocked"], false);
    }
}
