//! The closed set of robot actions and the identified nodes the model stores.
//!
//! An [`Action`] is pure data: its kind plus a typed parameter record. An
//! [`ActionNode`] wraps an action with a process-unique [`ActionId`] and, for
//! actions recognised in source text, the [`SourceSpan`] they were read from.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identifier correlating an action across text, model and view
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub Uuid);

impl ActionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ActionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Absolute field position and heading
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
}

/// Tag of an [`Action`], without its parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    SetPose,
    MoveTo,
    TurnTo,
    Follow,
    Wait,
    Roller,
    Expand,
    Shoot,
    PistonShoot,
    Intake,
    StopIntake,
}

impl ActionKind {
    pub const ALL: [ActionKind; 11] = [
        ActionKind::SetPose,
        ActionKind::MoveTo,
        ActionKind::TurnTo,
        ActionKind::Follow,
        ActionKind::Wait,
        ActionKind::Roller,
        ActionKind::Expand,
        ActionKind::Shoot,
        ActionKind::PistonShoot,
        ActionKind::Intake,
        ActionKind::StopIntake,
    ];

    /// Name of the function in the `auton` namespace
    pub fn call_name(self) -> &'static str {
        match self {
            ActionKind::SetPose => "setPose",
            ActionKind::MoveTo => "moveTo",
            ActionKind::TurnTo => "turnTo",
            ActionKind::Follow => "follow",
            ActionKind::Wait => "wait",
            ActionKind::Roller => "roller",
            ActionKind::Expand => "expand",
            ActionKind::Shoot => "shoot",
            ActionKind::PistonShoot => "pistonShoot",
            ActionKind::Intake => "intake",
            ActionKind::StopIntake => "stopIntake",
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ActionKind::SetPose => "set_pose",
            ActionKind::MoveTo => "move_to",
            ActionKind::TurnTo => "turn_to",
            ActionKind::Follow => "follow",
            ActionKind::Wait => "wait",
            ActionKind::Roller => "roller",
            ActionKind::Expand => "expand",
            ActionKind::Shoot => "shoot",
            ActionKind::PistonShoot => "piston_shoot",
            ActionKind::Intake => "intake",
            ActionKind::StopIntake => "stop_intake",
        }
    }

    /// Whether an action of this kind can anchor the start of an auton
    pub fn establishes_pose(self) -> bool {
        matches!(self, ActionKind::SetPose)
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single typed parameter value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ParamValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    /// Contents of a string literal, escapes kept verbatim
    Str(String),
}

impl ParamValue {
    /// Render the value the way it is written in a call
    pub fn to_source(&self) -> String {
        match self {
            ParamValue::Float(value) => format!("{value}"),
            ParamValue::Int(value) => format!("{value}"),
            ParamValue::Bool(value) => format!("{value}"),
            ParamValue::Str(value) => format!("\"{value}\""),
        }
    }

    /// Whether [`to_source`](Self::to_source) produces a literal the call
    /// grammar reads back as this value
    pub fn is_writable(&self) -> bool {
        match self {
            ParamValue::Float(value) => value.is_finite(),
            ParamValue::Int(_) | ParamValue::Bool(_) => true,
            ParamValue::Str(value) => {
                let mut chars = value.chars();
                while let Some(c) = chars.next() {
                    match c {
                        '"' | '\n' => return false,
                        '\\' => {
                            if chars.next().is_none_or(|escaped| escaped == '\n') {
                                return false;
                            }
                        }
                        _ => {}
                    }
                }
                true
            }
        }
    }
}

/// Parameters keyed by their call-site name (`x`, `maxSpeed`, ...)
pub type ParamMap = BTreeMap<String, ParamValue>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPoseParams {
    pub x: f64,
    pub y: f64,
    pub heading: f64,
    pub radians: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveToParams {
    pub x: f64,
    pub y: f64,
    pub timeout: i64,
    pub max_speed: Option<f64>,
    pub log: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TurnToParams {
    pub x: f64,
    pub y: f64,
    pub timeout: i64,
    pub reversed: Option<bool>,
    pub max_speed: Option<f64>,
    pub log: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FollowParams {
    pub file_path: String,
    pub timeout: i64,
    pub lookahead: f64,
    pub reverse: Option<bool>,
    pub max_speed: Option<f64>,
    pub log: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitParams {
    pub milliseconds: i64,
}

/// One instruction of an auton routine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "params", rename_all = "snake_case")]
pub enum Action {
    SetPose(SetPoseParams),
    MoveTo(MoveToParams),
    TurnTo(TurnToParams),
    Follow(FollowParams),
    Wait(WaitParams),
    Roller,
    Expand,
    Shoot,
    PistonShoot,
    Intake,
    StopIntake,
}

impl Action {
    pub fn set_pose(pose: Pose) -> Self {
        Action::SetPose(SetPoseParams {
            x: pose.x,
            y: pose.y,
            heading: pose.heading,
            radians: None,
        })
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            Action::SetPose(_) => ActionKind::SetPose,
            Action::MoveTo(_) => ActionKind::MoveTo,
            Action::TurnTo(_) => ActionKind::TurnTo,
            Action::Follow(_) => ActionKind::Follow,
            Action::Wait(_) => ActionKind::Wait,
            Action::Roller => ActionKind::Roller,
            Action::Expand => ActionKind::Expand,
            Action::Shoot => ActionKind::Shoot,
            Action::PistonShoot => ActionKind::PistonShoot,
            Action::Intake => ActionKind::Intake,
            Action::StopIntake => ActionKind::StopIntake,
        }
    }

    /// The absolute pose this action establishes, if any
    pub fn pose(&self) -> Option<Pose> {
        match self {
            Action::SetPose(params) => Some(Pose {
                x: params.x,
                y: params.y,
                heading: params.heading,
            }),
            _ => None,
        }
    }

    /// Parameters that are present, keyed by call-site name
    pub fn params(&self) -> ParamMap {
        let mut map = ParamMap::new();
        let mut put = |name: &str, value: Option<ParamValue>| {
            if let Some(value) = value {
                map.insert(name.to_string(), value);
            }
        };
        match self {
            Action::SetPose(p) => {
                put("x", Some(ParamValue::Float(p.x)));
                put("y", Some(ParamValue::Float(p.y)));
                put("heading", Some(ParamValue::Float(p.heading)));
                put("radians", p.radians.map(ParamValue::Bool));
            }
            Action::MoveTo(p) => {
                put("x", Some(ParamValue::Float(p.x)));
                put("y", Some(ParamValue::Float(p.y)));
                put("timeout", Some(ParamValue::Int(p.timeout)));
                put("maxSpeed", p.max_speed.map(ParamValue::Float));
                put("log", p.log.map(ParamValue::Bool));
            }
            Action::TurnTo(p) => {
                put("x", Some(ParamValue::Float(p.x)));
                put("y", Some(ParamValue::Float(p.y)));
                put("timeout", Some(ParamValue::Int(p.timeout)));
                put("reversed", p.reversed.map(ParamValue::Bool));
                put("maxSpeed", p.max_speed.map(ParamValue::Float));
                put("log", p.log.map(ParamValue::Bool));
            }
            Action::Follow(p) => {
                put("filePath", Some(ParamValue::Str(p.file_path.clone())));
                put("timeout", Some(ParamValue::Int(p.timeout)));
                put("lookahead", Some(ParamValue::Float(p.lookahead)));
                put("reverse", p.reverse.map(ParamValue::Bool));
                put("maxSpeed", p.max_speed.map(ParamValue::Float));
                put("log", p.log.map(ParamValue::Bool));
            }
            Action::Wait(p) => {
                put("milliseconds", Some(ParamValue::Int(p.milliseconds)));
            }
            Action::Roller
            | Action::Expand
            | Action::Shoot
            | Action::PistonShoot
            | Action::Intake
            | Action::StopIntake => {}
        }
        map
    }

    /// Build an action from named parameters.
    ///
    /// Returns `None` when a required parameter is missing or any parameter
    /// has the wrong type, i.e. the call is not a complete action.
    pub fn from_params(kind: ActionKind, params: &ParamMap) -> Option<Self> {
        let action = match kind {
            ActionKind::SetPose => Action::SetPose(SetPoseParams {
                x: float(params, "x")?,
                y: float(params, "y")?,
                heading: float(params, "heading")?,
                radians: optional(params, "radians", as_bool)?,
            }),
            ActionKind::MoveTo => Action::MoveTo(MoveToParams {
                x: float(params, "x")?,
                y: float(params, "y")?,
                timeout: int(params, "timeout")?,
                max_speed: optional(params, "maxSpeed", as_float)?,
                log: optional(params, "log", as_bool)?,
            }),
            ActionKind::TurnTo => Action::TurnTo(TurnToParams {
                x: float(params, "x")?,
                y: float(params, "y")?,
                timeout: int(params, "timeout")?,
                reversed: optional(params, "reversed", as_bool)?,
                max_speed: optional(params, "maxSpeed", as_float)?,
                log: optional(params, "log", as_bool)?,
            }),
            ActionKind::Follow => Action::Follow(FollowParams {
                file_path: params.get("filePath").and_then(as_str)?,
                timeout: int(params, "timeout")?,
                lookahead: float(params, "lookahead")?,
                reverse: optional(params, "reverse", as_bool)?,
                max_speed: optional(params, "maxSpeed", as_float)?,
                log: optional(params, "log", as_bool)?,
            }),
            ActionKind::Wait => Action::Wait(WaitParams {
                milliseconds: int(params, "milliseconds")?,
            }),
            ActionKind::Roller => Action::Roller,
            ActionKind::Expand => Action::Expand,
            ActionKind::Shoot => Action::Shoot,
            ActionKind::PistonShoot => Action::PistonShoot,
            ActionKind::Intake => Action::Intake,
            ActionKind::StopIntake => Action::StopIntake,
        };
        Some(action)
    }
}

fn as_float(value: &ParamValue) -> Option<f64> {
    match value {
        ParamValue::Float(v) => Some(*v),
        ParamValue::Int(v) => Some(*v as f64),
        _ => None,
    }
}

fn as_int(value: &ParamValue) -> Option<i64> {
    match value {
        ParamValue::Int(v) => Some(*v),
        _ => None,
    }
}

fn as_bool(value: &ParamValue) -> Option<bool> {
    match value {
        ParamValue::Bool(v) => Some(*v),
        _ => None,
    }
}

fn as_str(value: &ParamValue) -> Option<String> {
    match value {
        ParamValue::Str(v) => Some(v.clone()),
        _ => None,
    }
}

fn float(params: &ParamMap, name: &str) -> Option<f64> {
    params.get(name).and_then(as_float)
}

fn int(params: &ParamMap, name: &str) -> Option<i64> {
    params.get(name).and_then(as_int)
}

/// `Some(None)` when absent, `None` when present with the wrong type
fn optional<T>(
    params: &ParamMap,
    name: &str,
    convert: impl Fn(&ParamValue) -> Option<T>,
) -> Option<Option<T>> {
    match params.get(name) {
        None => Some(None),
        Some(value) => convert(value).map(Some),
    }
}

/// Where a text-origin action was read from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpan {
    /// Absolute byte offset of the first byte of the call
    pub offset: usize,
    /// Absolute byte offset one past the terminating `;`
    pub end_offset: usize,
    /// Exact source text of the call
    pub text: String,
    /// Byte range of each captured parameter, relative to `text`
    pub param_spans: BTreeMap<String, Range<usize>>,
}

impl SourceSpan {
    pub fn range(&self) -> Range<usize> {
        self.offset..self.end_offset
    }

    /// Absolute byte range of a captured parameter
    pub fn param_range(&self, name: &str) -> Option<Range<usize>> {
        self.param_spans
            .get(name)
            .map(|span| (self.offset + span.start)..(self.offset + span.end))
    }
}

/// An identified action as stored in an auton
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActionNode {
    pub id: ActionId,
    pub action: Action,
    pub source: Option<SourceSpan>,
}

impl ActionNode {
    /// A model-origin node with a fresh identity
    pub fn new(action: Action) -> Self {
        Self {
            id: ActionId::new(),
            action,
            source: None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        self.action.kind()
    }

    pub fn is_text_backed(&self) -> bool {
        self.source.is_some()
    }

    /// Same action and parameters, regardless of identity and source
    pub fn same_action(&self, other: &ActionNode) -> bool {
        self.action == other.action
    }
}
