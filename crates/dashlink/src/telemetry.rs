//! Decoding boundary between the robot's telemetry feeds and the owner
//! context.
//!
//! Feed callbacks fire on arbitrary worker threads; this module decodes
//! their payloads defensively (missing numeric fields become 0.0, missing
//! quaternion `w` becomes 1.0) and schedules the resulting mutation
//! through the [`OwnerBridge`].

use std::collections::HashMap;
use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use bevy::prelude::*;
use serde_json::Value;
use tracing::{trace, warn};

use dashlink_common::{FeedKind, GoalType, HumanDetection, Point, Pose, Quaternion};

use crate::bridge::OwnerBridge;
use crate::state::{MapState, PathState, RobotState};

/// Clone-friendly handle feed workers carry. The only supported way into
/// the owner context from telemetry threads.
#[derive(Clone)]
pub struct TelemetryIngest {
    bridge: OwnerBridge,
    static_map_applied: Arc<AtomicBool>,
}

impl TelemetryIngest {
    pub fn new(bridge: OwnerBridge) -> Self {
        Self {
            bridge,
            static_map_applied: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Decode and apply one telemetry message. Safe to call from any
    /// thread; malformed payloads are logged and dropped, never fatal.
    pub fn ingest(&self, feed: FeedKind, payload: Value) {
        match feed {
            FeedKind::StatusBattery => self.ingest_battery(payload),
            FeedKind::StatusWifi | FeedKind::StatusComms | FeedKind::StatusPi => {
                self.ingest_flag(feed, payload)
            }
            FeedKind::MapStatic => self.ingest_static_map(payload),
            FeedKind::MapHumans => self.ingest_humans(payload),
            FeedKind::MapOdometry => self.ingest_odometry(payload),
            FeedKind::PathRuleOutput => self.ingest_rule_output(payload),
            FeedKind::PathGlobalGoal => self.ingest_global_goal(payload),
            FeedKind::PathDockStatus => self.ingest_dock_status(payload),
        }
    }

    /// Mirror the upstream robot link state into the power flag.
    pub fn set_robot_online(&self, online: bool) {
        self.bridge.schedule(move |world| {
            world.resource_scope(|world, mut robot: Mut<RobotState>| {
                let flags = world.resource::<PathState>().flags();
                robot.set_power(online, flags);
            });
        });
    }

    fn ingest_battery(&self, payload: Value) {
        let Some(raw) = payload.get("percentage").and_then(Value::as_f64) else {
            warn!("Battery message without a percentage; dropping");
            return;
        };
        // Some firmwares report charge as a [0, 1] fraction.
        let scaled = if (0.0..=1.0).contains(&raw) {
            raw * 100.0
        } else {
            raw
        };
        let percent = (scaled * 10.0).round() / 10.0;

        self.bridge.schedule(move |world| {
            world.resource_scope(|world, mut robot: Mut<RobotState>| {
                let flags = world.resource::<PathState>().flags();
                robot.set_battery_percent(percent, flags);
            });
        });
    }

    fn ingest_flag(&self, feed: FeedKind, payload: Value) {
        let Some(value) = extract_bool(&payload) else {
            warn!("Boolean missing from {} message; dropping", feed);
            return;
        };

        self.bridge.schedule(move |world| {
            world.resource_scope(|world, mut robot: Mut<RobotState>| {
                let flags = world.resource::<PathState>().flags();
                match feed {
                    FeedKind::StatusWifi => robot.set_wifi(value, flags),
                    FeedKind::StatusComms => robot.set_comms(value, flags),
                    FeedKind::StatusPi => robot.set_pi(value, flags),
                    _ => false,
                };
            });
        });
    }

    fn ingest_static_map(&self, payload: Value) {
        // The static map is applied once per run; later copies of the same
        // latched message are dropped before decode. Racing duplicates that
        // already passed this check are suppressed by the grid gate.
        if self.static_map_applied.load(Ordering::Acquire) {
            trace!("Static map already applied; dropping re-ingest");
            return;
        }

        let info = payload.get("info").cloned().unwrap_or(Value::Null);
        let resolution = info.get("resolution").and_then(Value::as_f64).unwrap_or(0.0);
        let width = info.get("width").and_then(Value::as_u64).unwrap_or(0) as u32;
        let height = info.get("height").and_then(Value::as_u64).unwrap_or(0) as u32;
        let Some(data) = payload.get("data").and_then(Value::as_array) else {
            warn!("Static map message without grid data; dropping");
            return;
        };
        let grid: Vec<i8> = data
            .iter()
            .map(|cell| cell.as_i64().unwrap_or(-1).clamp(i8::MIN as i64, i8::MAX as i64) as i8)
            .collect();

        let applied = self.static_map_applied.clone();
        self.bridge.schedule(move |world| {
            let mut map = world.resource_mut::<MapState>();
            map.set_static_map(resolution, width, height, grid);
            applied.store(true, Ordering::Release);
        });
    }

    fn ingest_humans(&self, payload: Value) {
        let humans = decode_humans(&payload);

        self.bridge.schedule(move |world| {
            world.resource_mut::<MapState>().set_humans(humans);
        });
    }

    fn ingest_odometry(&self, payload: Value) {
        let pose = decode_pose(payload.get("pose").and_then(|outer| outer.get("pose")));

        self.bridge.schedule(move |world| {
            world.resource_mut::<MapState>().set_robot_pose(pose);
        });
    }

    fn ingest_rule_output(&self, payload: Value) {
        // The planner publishes either a decoded object or a raw JSON
        // string wrapping one.
        let value = match payload {
            Value::String(raw) => match serde_json::from_str::<Value>(&raw) {
                Ok(value) => value,
                Err(err) => {
                    warn!("Malformed planner payload: {}; dropping", err);
                    return;
                }
            },
            other => other,
        };

        let goal_type = match value.get("goal_type").and_then(Value::as_str) {
            Some("global") => GoalType::Global,
            Some("intermediate") => GoalType::Intermediate,
            other => {
                warn!("Planner message with unusable goal_type {:?}; dropping", other);
                return;
            }
        };
        let position = decode_point(value.get("position"));
        let rule = value
            .get("rule")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let timestamp = value.get("timestamp").and_then(Value::as_f64);

        self.bridge.schedule(move |world| {
            world.resource_scope(|world, mut path: Mut<PathState>| {
                // Planner chatter while the module is off is stale.
                if !path.is_path_module_active() {
                    trace!("Planner output while path module inactive; dropping");
                    return;
                }
                let mut map = world.resource_mut::<MapState>();
                match goal_type {
                    GoalType::Intermediate => {
                        map.push_waypoint(Pose {
                            position,
                            orientation: Quaternion::default(),
                        });
                    }
                    GoalType::Global => {
                        map.set_global_goal(Some(Pose {
                            position,
                            orientation: Quaternion::default(),
                        }));
                    }
                }
                path.log_goal(goal_type, timestamp, rule);
            });
        });
    }

    fn ingest_global_goal(&self, payload: Value) {
        let pose = decode_pose(payload.get("pose"));

        self.bridge.schedule(move |world| {
            world.resource_scope(|world, path: Mut<PathState>| {
                if !path.is_path_module_active() {
                    return;
                }
                world.resource_mut::<MapState>().set_global_goal(Some(pose));
            });
        });
    }

    fn ingest_dock_status(&self, payload: Value) {
        let Some(docked) = payload
            .get("is_docked")
            .and_then(Value::as_bool)
            .or_else(|| extract_bool(&payload))
        else {
            warn!("Dock status message without a boolean; dropping");
            return;
        };

        self.bridge.schedule(move |world| {
            world.resource_scope(|world, mut path: Mut<PathState>| {
                if path.set_docked(docked) {
                    world.resource::<RobotState>().notify_status(path.flags());
                }
            });
        });
    }
}

/// Detections arrive as `{"poses": [{position, proxemic_distances?}]}`;
/// ids are positional per message.
fn decode_humans(payload: &Value) -> Vec<HumanDetection> {
    payload
        .get("poses")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .map(|(n, pose)| HumanDetection {
            id: format!("human_{}", n + 1),
            position: decode_point(pose.get("position")),
            proxemic_distances: decode_proxemic_distances(pose.get("proxemic_distances")),
        })
        .collect()
}

fn decode_proxemic_distances(value: Option<&Value>) -> Option<HashMap<String, f64>> {
    let zones = value?.as_object()?;
    let distances: HashMap<String, f64> = zones
        .iter()
        .filter_map(|(zone, distance)| distance.as_f64().map(|d| (zone.clone(), d)))
        .collect();
    if distances.is_empty() {
        None
    } else {
        Some(distances)
    }
}

/// Booleans arrive bare, or wrapped as `{"data": b}` or `{"value": b}`.
fn extract_bool(payload: &Value) -> Option<bool> {
    payload
        .as_bool()
        .or_else(|| payload.get("data").and_then(Value::as_bool))
        .or_else(|| payload.get("value").and_then(Value::as_bool))
}

fn decode_point(value: Option<&Value>) -> Point {
    let component = |name: &str| {
        value
            .and_then(|v| v.get(name))
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    };
    Point::new(component("x"), component("y"), component("z"))
}

fn decode_quaternion(value: Option<&Value>) -> Quaternion {
    let component = |name: &str, default: f64| {
        value
            .and_then(|v| v.get(name))
            .and_then(Value::as_f64)
            .unwrap_or(default)
    };
    Quaternion {
        x: component("x", 0.0),
        y: component("y", 0.0),
        z: component("z", 0.0),
        w: component("w", 1.0),
    }
}

fn decode_pose(value: Option<&Value>) -> Pose {
    Pose {
        position: decode_point(value.and_then(|v| v.get("position"))),
        orientation: decode_quaternion(value.and_then(|v| v.get("orientation"))),
    }
}
