pub mod envelope;
pub use envelope::*;

pub mod error;
pub use error::DashboardError;

use serde::{Deserialize, Serialize};

use std::fmt::Display;

#[derive(Serialize, Deserialize, Hash, PartialEq, Eq, Clone, Copy, Debug)]
/// A [`ListenerId`] denotes a single attached viewer connection.
pub struct ListenerId {
    /// The key of the listener.
    pub id: u32,
}

impl Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!("Listener with ID={0}", self.id))
    }
}

/// The telemetry feeds the engine knows how to decode.
///
/// Feed names on the wire use the kebab-case form, e.g. `status-battery`.
#[derive(Serialize, Deserialize, Hash, PartialEq, Eq, Clone, Copy, Debug)]
#[serde(rename_all = "kebab-case")]
pub enum FeedKind {
    StatusBattery,
    StatusWifi,
    StatusComms,
    StatusPi,
    MapStatic,
    MapHumans,
    MapOdometry,
    PathRuleOutput,
    PathGlobalGoal,
    PathDockStatus,
}

impl FeedKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedKind::StatusBattery => "status-battery",
            FeedKind::StatusWifi => "status-wifi",
            FeedKind::StatusComms => "status-comms",
            FeedKind::StatusPi => "status-pi",
            FeedKind::MapStatic => "map-static",
            FeedKind::MapHumans => "map-humans",
            FeedKind::MapOdometry => "map-odometry",
            FeedKind::PathRuleOutput => "path-rule-output",
            FeedKind::PathGlobalGoal => "path-global-goal",
            FeedKind::PathDockStatus => "path-dock-status",
        }
    }
}

impl Display for FeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
