use bevy::prelude::Resource;

use dashlink_common::{DashboardEvent, HumanDetection, MapPayload, Pose};

use crate::gate;
use crate::hub::ViewerHub;
use crate::raster;

/// Static map plus the live spatial overlay (robot pose, goals, humans).
///
/// The raw occupancy grid stays server-side; viewers only ever see the
/// rendered raster, which is cached and regenerated only when the grid
/// itself changes.
#[derive(Resource)]
pub struct MapState {
    hub: ViewerHub,
    resolution: f64,
    width_cells: u32,
    height_cells: u32,
    occupancy_grid: Vec<i8>,
    raster_cache: Option<String>,
    raster_renders: u32,
    robot_pose: Pose,
    global_goal: Option<Pose>,
    waypoints: Vec<Pose>,
    humans: Vec<HumanDetection>,
}

impl MapState {
    pub fn new(hub: ViewerHub) -> Self {
        Self {
            hub,
            resolution: 0.0,
            width_cells: 0,
            height_cells: 0,
            occupancy_grid: Vec::new(),
            raster_cache: None,
            raster_renders: 0,
            robot_pose: Pose::default(),
            global_goal: None,
            waypoints: Vec::new(),
            humans: Vec::new(),
        }
    }

    /// Replace the static map. Gated on the grid and its shape: an
    /// identical re-ingest renders nothing and notifies nobody. Returns
    /// whether anything changed.
    pub fn set_static_map(
        &mut self,
        resolution: f64,
        width_cells: u32,
        height_cells: u32,
        grid: Vec<i8>,
    ) -> bool {
        let changed = gate::apply(&mut self.resolution, resolution)
            | gate::apply(&mut self.width_cells, width_cells)
            | gate::apply(&mut self.height_cells, height_cells)
            | gate::apply(&mut self.occupancy_grid, grid);

        if !changed {
            return false;
        }

        self.raster_cache = Some(raster::render(
            &self.occupancy_grid,
            self.width_cells,
            self.height_cells,
        ));
        self.raster_renders += 1;

        if let Some(event) = self.map_event() {
            self.hub.notify(&event);
        }
        true
    }

    pub fn has_static_map(&self) -> bool {
        self.raster_cache.is_some()
    }

    /// How many times the raster has been rendered. Primarily useful for
    /// testing and diagnostics.
    pub fn raster_render_count(&self) -> u32 {
        self.raster_renders
    }

    pub fn set_robot_pose(&mut self, pose: Pose) -> bool {
        let changed = gate::apply(&mut self.robot_pose, pose);
        if changed {
            self.notify_pose();
        }
        changed
    }

    pub fn set_global_goal(&mut self, goal: Option<Pose>) -> bool {
        let changed = gate::apply(&mut self.global_goal, goal);
        if changed {
            self.notify_pose();
        }
        changed
    }

    /// Append an intermediate waypoint. Appending always changes state.
    pub fn push_waypoint(&mut self, pose: Pose) {
        self.waypoints.push(pose);
        self.notify_pose();
    }

    pub fn clear_route(&mut self) {
        if self.waypoints.is_empty() && self.global_goal.is_none() {
            return;
        }
        self.waypoints.clear();
        self.global_goal = None;
        self.notify_pose();
    }

    pub fn set_humans(&mut self, humans: Vec<HumanDetection>) -> bool {
        let changed = gate::apply(&mut self.humans, humans);
        if changed {
            self.notify_pose();
        }
        changed
    }

    fn notify_pose(&self) {
        self.hub.notify(&self.pose_event());
    }

    /// The combined live-overlay snapshot.
    pub fn pose_event(&self) -> DashboardEvent {
        DashboardEvent::PoseData {
            robot_pose: self.robot_pose,
            global_goal: self.global_goal,
            intermediate_waypoints: self.waypoints.clone(),
            humans: self.humans.clone(),
        }
    }

    /// The static-map envelope, or `None` before the first map arrived.
    pub fn map_event(&self) -> Option<DashboardEvent> {
        let image = self.raster_cache.as_ref()?;
        Some(DashboardEvent::MapData {
            map_data: MapPayload {
                resolution: self.resolution,
                width: self.width_cells as f64 * self.resolution,
                height: self.height_cells as f64 * self.resolution,
                occupancy_grid_image: image.clone(),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hub::ViewerListener;
    use async_channel::unbounded;
    use dashlink_common::{Point, Quaternion};
    use std::sync::Arc;

    fn state_with_listener() -> (MapState, async_channel::Receiver<Arc<str>>) {
        let hub = ViewerHub::new();
        let (tx, rx) = unbounded();
        hub.attach(ViewerListener::new(hub.allocate_id(), tx));
        (MapState::new(hub), rx)
    }

    #[test]
    fn identical_grid_renders_once() {
        let (mut state, rx) = state_with_listener();
        let grid = vec![0i8, -1, 100, 50];

        assert!(state.set_static_map(0.05, 2, 2, grid.clone()));
        assert!(!state.set_static_map(0.05, 2, 2, grid));
        assert_eq!(state.raster_render_count(), 1);
        assert_eq!(rx.len(), 1);
    }

    #[test]
    fn changed_grid_rerenders() {
        let (mut state, rx) = state_with_listener();

        state.set_static_map(0.05, 2, 2, vec![0, 0, 0, 0]);
        state.set_static_map(0.05, 2, 2, vec![0, 0, 0, 100]);
        assert_eq!(state.raster_render_count(), 2);
        assert_eq!(rx.len(), 2);
    }

    #[test]
    fn map_event_reports_metres() {
        let (mut state, _rx) = state_with_listener();
        state.set_static_map(0.05, 200, 100, vec![-1; 20_000]);

        let json = serde_json::to_value(state.map_event().expect("map present")).expect("json");
        assert_eq!(json["mapData"]["resolution"], 0.05);
        assert_eq!(json["mapData"]["width"], 10.0);
        assert_eq!(json["mapData"]["height"], 5.0);
    }

    #[test]
    fn pose_setters_gate_and_combine() {
        let (mut state, rx) = state_with_listener();
        let pose = Pose::default();

        assert!(!state.set_robot_pose(pose));
        assert!(state.set_global_goal(Some(pose)));
        state.push_waypoint(Pose {
            position: Point::new(1.0, 2.0, 0.0),
            orientation: Quaternion::default(),
        });
        assert_eq!(rx.len(), 2);

        let goal_event = rx.try_recv().expect("goal event");
        let json: serde_json::Value = serde_json::from_str(&goal_event).expect("json");
        assert_eq!(json["type"], "POSE_DATA");
        assert!(json["globalGoal"].is_object());

        let waypoint_event = rx.try_recv().expect("waypoint event");
        let json: serde_json::Value = serde_json::from_str(&waypoint_event).expect("json");
        assert_eq!(json["intermediateWaypoints"][0]["position"]["x"], 1.0);
        assert_eq!(json["intermediateWaypoints"][0]["orientation"]["w"], 1.0);
    }
}
