use async_channel::Sender;
use bevy::prelude::Resource;
use tracing::warn;

use dashlink_common::{DashboardEvent, GoalType, OutboundCommand, PathLogEntry};

use crate::gate;
use crate::hub::ViewerHub;
use crate::state::PathFlags;

/// Path-module activity, dock state and the navigation history.
///
/// The only model that talks back to the robot: deactivating the path
/// module and viewer-commanded dock changes push commands into the
/// outbox. Robot-reported dock state goes through [`Self::set_docked`]
/// instead, which never echoes a command.
#[derive(Resource)]
pub struct PathState {
    hub: ViewerHub,
    commands: Sender<OutboundCommand>,
    path_module_active: bool,
    docked: bool,
    history: Vec<PathLogEntry>,
    goal_counter: u32,
}

impl PathState {
    pub fn new(hub: ViewerHub, commands: Sender<OutboundCommand>) -> Self {
        Self {
            hub,
            commands,
            path_module_active: false,
            docked: false,
            history: Vec::new(),
            goal_counter: 0,
        }
    }

    pub fn flags(&self) -> PathFlags {
        PathFlags {
            path_module_active: self.path_module_active,
            docked: self.docked,
        }
    }

    pub fn is_path_module_active(&self) -> bool {
        self.path_module_active
    }

    pub fn history(&self) -> &[PathLogEntry] {
        &self.history
    }

    /// Viewer-commanded activity toggle. The active -> inactive transition
    /// emits exactly one cancel-navigation; re-asserting the current value
    /// emits nothing at all.
    pub fn set_path_module_active(&mut self, active: bool) -> bool {
        let was_active = self.path_module_active;
        if !gate::apply(&mut self.path_module_active, active) {
            return false;
        }
        if was_active && !active {
            self.push_command(OutboundCommand::CancelNavigation);
        }
        self.notify_path();
        true
    }

    /// Viewer-commanded dock change: updates state and republishes the
    /// matching dock/undock command toward the robot, gated so repeats
    /// command nothing.
    pub fn request_dock(&mut self, docked: bool) -> bool {
        if !gate::apply(&mut self.docked, docked) {
            return false;
        }
        self.push_command(if docked {
            OutboundCommand::Dock
        } else {
            OutboundCommand::Undock
        });
        self.notify_path();
        true
    }

    /// Robot-reported dock change: state only, no command.
    pub fn set_docked(&mut self, docked: bool) -> bool {
        let changed = gate::apply(&mut self.docked, docked);
        if changed {
            self.notify_path();
        }
        changed
    }

    /// Append a goal to the navigation history. Ids are unique within this
    /// instance and entries are immutable afterwards, except for feedback.
    pub fn log_goal(&mut self, goal_type: GoalType, timestamp: Option<f64>, planner_output: String) {
        self.goal_counter += 1;
        self.history.push(PathLogEntry {
            label: "Goal Entry".to_string(),
            id: format!("goal_{}", self.goal_counter),
            goal_type,
            timestamp,
            planner_output,
            user_feedback: None,
        });
        self.notify_path();
    }

    /// Record viewer feedback for one goal, then emit the resolved entry
    /// followed by the recomputed summary. Unknown ids are a logged no-op.
    /// Applying identical feedback twice re-emits the identical pair.
    pub fn apply_feedback(&mut self, goal_id: &str, feedback: &str) {
        let Some(index) = self.history.iter().position(|entry| entry.id == goal_id) else {
            warn!("Feedback for unknown goal '{}'; ignoring", goal_id);
            return;
        };

        self.history[index].user_feedback = Some(feedback.to_string());

        let entry = &self.history[index];
        let (start_point, duration) = match index.checked_sub(1).map(|i| &self.history[i]) {
            Some(previous) => {
                let duration = match (previous.timestamp, entry.timestamp) {
                    (Some(start), Some(end)) => end - start,
                    _ => 0.0,
                };
                (previous.goal_type.as_str().to_string(), duration)
            }
            None => ("START".to_string(), 0.0),
        };

        self.hub.notify(&DashboardEvent::FeedbackEntry {
            duration,
            start_point,
            end_point: entry.goal_type.as_str().to_string(),
            feedback: feedback.to_string(),
        });
        self.hub.notify(&self.summary_event());
    }

    /// Aggregate ratios over rated goals; both ratios are 0 while nothing
    /// has been rated. Every rated entry counts toward the denominator:
    /// a rating of `good` (any case) is good, anything else is bad.
    pub fn summary_event(&self) -> DashboardEvent {
        let mut good = 0u32;
        let mut total = 0u32;
        for rating in self
            .history
            .iter()
            .filter_map(|entry| entry.user_feedback.as_deref())
        {
            total += 1;
            if rating.eq_ignore_ascii_case("good") {
                good += 1;
            }
        }
        let bad = total - good;
        let (good_ratio, bad_ratio) = if total == 0 {
            (0.0, 0.0)
        } else {
            (good as f64 / total as f64, bad as f64 / total as f64)
        };

        DashboardEvent::FeedbackSummary {
            total_good_ratings: good,
            total_bad_ratings: bad,
            good_ratio,
            bad_ratio,
        }
    }

    pub fn path_event(&self) -> DashboardEvent {
        DashboardEvent::PathUpdate {
            is_path_module_active: self.path_module_active,
            path_history: self.history.clone(),
        }
    }

    fn notify_path(&self) {
        self.hub.notify(&self.path_event());
    }

    fn push_command(&self, command: OutboundCommand) {
        if let Err(err) = self.commands.try_send(command) {
            warn!("Could not queue robot command: {}", err);
        }
    }
}
