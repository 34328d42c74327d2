//! The mirrored robot state, split into three models that each own their
//! notification channel: status, map, path. All mutation happens on the
//! owner context; setters gate on value equality before touching anything.

mod map;
mod path;
mod robot;

pub use map::MapState;
pub use path::PathState;
pub use robot::{PathFlags, RobotState, mode_label};
