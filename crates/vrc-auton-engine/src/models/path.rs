//! Robot path nodes, edited through the same undoable list primitive as
//! actions.

use serde::{Deserialize, Serialize};

use crate::actions::Pose;
use crate::editing::history::CommandList;

/// Mechanism action performed on arrival at a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeAction {
    Shoot,
    PistonShoot,
    Intake,
    Roller,
    Expand,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathNode {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub actions: Vec<NodeAction>,
}

impl PathNode {
    pub fn new(x: f64, y: f64, heading: f64) -> Self {
        Self {
            x,
            y,
            heading,
            actions: Vec::new(),
        }
    }

    pub fn with_actions(mut self, actions: impl IntoIterator<Item = NodeAction>) -> Self {
        self.actions.extend(actions);
        self
    }

    pub fn pose(&self) -> Pose {
        Pose {
            x: self.x,
            y: self.y,
            heading: self.heading,
        }
    }
}

impl From<Pose> for PathNode {
    fn from(pose: Pose) -> Self {
        Self::new(pose.x, pose.y, pose.heading)
    }
}

pub type NodeList = CommandList<PathNode>;
