use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A point in the map frame, metres.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// Orientation as a quaternion. The default is the identity rotation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Quaternion {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub w: f64,
}

impl Default for Quaternion {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            z: 0.0,
            w: 1.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub position: Point,
    pub orientation: Quaternion,
}

/// One detected human in the map frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HumanDetection {
    pub id: String,
    pub position: Point,
    /// Distances to the robot's proxemic zone boundaries, keyed by zone
    /// name, when the detector provides them.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub proxemic_distances: Option<HashMap<String, f64>>,
}

/// Static map description as shipped to viewers. The raw occupancy grid
/// never leaves the backend; `occupancy_grid_image` carries the rendered
/// raster as a base64-encoded binary PGM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MapPayload {
    /// Metres per grid cell.
    pub resolution: f64,
    /// Map width in metres.
    pub width: f64,
    /// Map height in metres.
    pub height: f64,
    pub occupancy_grid_image: String,
}

/// Whether a logged goal was the run's global goal or an intermediate
/// waypoint along the way.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GoalType {
    Global,
    Intermediate,
}

impl GoalType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GoalType::Global => "global",
            GoalType::Intermediate => "intermediate",
        }
    }
}

/// One entry in the navigation history. Immutable once logged, except for
/// `user_feedback` which is filled in when a viewer rates the goal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathLogEntry {
    pub label: String,
    pub id: String,
    pub goal_type: GoalType,
    /// Unix seconds when the goal was issued, if the planner provided one.
    pub timestamp: Option<f64>,
    /// The planner rule text that produced this goal.
    pub planner_output: String,
    pub user_feedback: Option<String>,
}

/// Server -> viewer broadcast envelope.
///
/// Serializes as a `type`-tagged JSON object with camelCase fields; the
/// field names are the viewer contract and must not change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DashboardEvent {
    /// Robot status snapshot. Emitted whenever any status field truly
    /// changes, and re-emitted when derived fields (mode, dock state)
    /// change underneath it.
    #[serde(rename = "STATUS_UPDATE", rename_all = "camelCase")]
    StatusUpdate {
        is_on: bool,
        battery_percentage: Option<f64>,
        is_wifi_connected: Option<bool>,
        is_comms_connected: Option<bool>,
        is_raspberry_pi_connected: Option<bool>,
        mode: String,
        is_docked: bool,
    },
    /// Static map with its rendered raster.
    #[serde(rename = "MAP_DATA", rename_all = "camelCase")]
    MapData { map_data: MapPayload },
    /// Combined live-pose snapshot: robot, goal, waypoints, humans.
    #[serde(rename = "POSE_DATA", rename_all = "camelCase")]
    PoseData {
        robot_pose: Pose,
        global_goal: Option<Pose>,
        intermediate_waypoints: Vec<Pose>,
        humans: Vec<HumanDetection>,
    },
    /// Path module state and full navigation history.
    #[serde(rename = "PATH_UPDATE", rename_all = "camelCase")]
    PathUpdate {
        is_path_module_active: bool,
        path_history: Vec<PathLogEntry>,
    },
    /// A single resolved feedback record for one goal.
    #[serde(rename = "FEEDBACK_ENTRY", rename_all = "camelCase")]
    FeedbackEntry {
        /// Seconds between the previous goal and this one; 0 when there is
        /// no predecessor or a timestamp is missing.
        duration: f64,
        start_point: String,
        end_point: String,
        feedback: String,
    },
    /// Aggregate feedback ratios over all rated goals.
    #[serde(rename = "FEEDBACK_SUMMARY", rename_all = "camelCase")]
    FeedbackSummary {
        total_good_ratings: u32,
        total_bad_ratings: u32,
        good_ratio: f64,
        bad_ratio: f64,
    },
}

/// Teleoperation directions a viewer may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Forward,
    Backward,
    Left,
    Right,
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Velocity command payload in the robot's base frame.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TwistPayload {
    pub linear: Vector3,
    pub angular: Vector3,
}

impl Direction {
    /// The velocity payload for this direction. Returns a fresh copy each
    /// call so a caller can never mutate the template.
    pub fn payload(&self) -> TwistPayload {
        let mut twist = TwistPayload::default();
        match self {
            Direction::Forward => twist.linear.x = 0.5,
            Direction::Backward => twist.linear.x = -0.5,
            Direction::Right => twist.angular.z = 1.0,
            Direction::Left => twist.angular.z = -1.0,
            Direction::Stop => {}
        }
        twist
    }
}

/// Viewer -> server command envelope.
///
/// Viewers send small JSON objects whose shape identifies the command, so
/// this deserializes untagged. Feedback is tried before the single-bool
/// shapes to keep the match unambiguous.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ViewerCommand {
    #[serde(rename_all = "camelCase")]
    Feedback { goal_id: String, feedback: String },
    Drive { command: Direction },
    #[serde(rename_all = "camelCase")]
    SetPathModule { is_path_module_active: bool },
    #[serde(rename_all = "camelCase")]
    SetDock { dock_status: bool },
}

/// Commands the engine republishes toward the robot.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "kebab-case")]
pub enum OutboundCommand {
    CancelNavigation,
    Dock,
    Undock,
    #[serde(rename_all = "camelCase")]
    Drive { twist: TwistPayload },
}
