//! Declarative call shapes for every action kind.
//!
//! Each [`ActionPattern`] pairs a compiled matcher, whose capture groups are
//! named `<type prefix>_<parameter>`, with a [`Composition`] describing how to
//! write the call back out.

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::actions::{Action, ActionKind, ParamMap, ParamValue};

/// Whitespace, line comments and block comments allowed between tokens.
/// A line comment only counts once its newline follows.
const GAP: &str = r"(?:\s|//[^\n]*\n|/\*(?s:.*?)\*/)*";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamType {
    Float,
    Int,
    Bool,
    Str,
}

impl ParamType {
    /// Prefix used in capture group names
    pub fn prefix(self) -> &'static str {
        match self {
            ParamType::Float => "f",
            ParamType::Int => "i",
            ParamType::Bool => "b",
            ParamType::Str => "s",
        }
    }

    fn literal(self) -> &'static str {
        match self {
            ParamType::Float => r"-?(?:\d+\.?\d*|\.\d+)[fF]?",
            ParamType::Int => r"-?\d+",
            ParamType::Bool => r"(?:true|false|1|0)",
            ParamType::Str => r#""(?:[^"\\\n]|\\.)*""#,
        }
    }

    /// Convert captured literal text into a typed value
    pub fn coerce(self, raw: &str) -> Option<ParamValue> {
        match self {
            ParamType::Float => raw
                .trim_end_matches(['f', 'F'])
                .parse::<f64>()
                .ok()
                .map(ParamValue::Float),
            ParamType::Int => raw.parse::<i64>().ok().map(ParamValue::Int),
            ParamType::Bool => match raw {
                "true" | "1" => Some(ParamValue::Bool(true)),
                "false" | "0" => Some(ParamValue::Bool(false)),
                _ => None,
            },
            ParamType::Str => raw
                .strip_prefix('"')
                .and_then(|rest| rest.strip_suffix('"'))
                .map(|inner| ParamValue::Str(inner.to_string())),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ParamDescriptor {
    pub name: &'static str,
    pub ty: ParamType,
    pub optional: bool,
    /// Value written when a later optional parameter forces this one out
    pub default: Option<ParamValue>,
}

impl ParamDescriptor {
    fn required(name: &'static str, ty: ParamType) -> Self {
        Self {
            name,
            ty,
            optional: false,
            default: None,
        }
    }

    fn optional(name: &'static str, ty: ParamType, default: ParamValue) -> Self {
        Self {
            name,
            ty,
            optional: true,
            default: Some(default),
        }
    }

    /// Capture group name, e.g. `f_maxSpeed`
    pub fn group(&self) -> String {
        format!("{}_{}", self.ty.prefix(), self.name)
    }
}

/// Declared parameters of each action kind, in call order.
fn descriptors(kind: ActionKind) -> Vec<ParamDescriptor> {
    use ParamType::*;
    match kind {
        ActionKind::SetPose => vec![
            ParamDescriptor::required("x", Float),
            ParamDescriptor::required("y", Float),
            ParamDescriptor::required("heading", Float),
            ParamDescriptor::optional("radians", Bool, ParamValue::Bool(false)),
        ],
        ActionKind::MoveTo => vec![
            ParamDescriptor::required("x", Float),
            ParamDescriptor::required("y", Float),
            ParamDescriptor::required("timeout", Int),
            ParamDescriptor::optional("maxSpeed", Float, ParamValue::Float(200.0)),
            ParamDescriptor::optional("log", Bool, ParamValue::Bool(false)),
        ],
        ActionKind::TurnTo => vec![
            ParamDescriptor::required("x", Float),
            ParamDescriptor::required("y", Float),
            ParamDescriptor::required("timeout", Int),
            ParamDescriptor::optional("reversed", Bool, ParamValue::Bool(false)),
            ParamDescriptor::optional("maxSpeed", Float, ParamValue::Float(127.0)),
            ParamDescriptor::optional("log", Bool, ParamValue::Bool(false)),
        ],
        ActionKind::Follow => vec![
            ParamDescriptor::required("filePath", Str),
            ParamDescriptor::required("timeout", Int),
            ParamDescriptor::required("lookahead", Float),
            ParamDescriptor::optional("reverse", Bool, ParamValue::Bool(false)),
            ParamDescriptor::optional("maxSpeed", Float, ParamValue::Float(127.0)),
            ParamDescriptor::optional("log", Bool, ParamValue::Bool(false)),
        ],
        ActionKind::Wait => vec![ParamDescriptor::required("milliseconds", Int)],
        ActionKind::Roller
        | ActionKind::Expand
        | ActionKind::Shoot
        | ActionKind::PistonShoot
        | ActionKind::Intake
        | ActionKind::StopIntake => Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fragment {
    Literal(String),
    /// Argument separator, only written when the following parameter is
    Separator,
    /// Index into the pattern's parameter list
    Param(usize),
}

/// Literal and placeholder sequence used to regenerate call text
#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub fragments: Vec<Fragment>,
}

impl Composition {
    fn for_call(call_name: &str, param_count: usize) -> Self {
        let mut fragments = vec![Fragment::Literal(format!("auton::{call_name}("))];
        for index in 0..param_count {
            if index > 0 {
                fragments.push(Fragment::Separator);
            }
            fragments.push(Fragment::Param(index));
        }
        fragments.push(Fragment::Literal(");".to_string()));
        Self { fragments }
    }

    /// Render call text and the span of every written parameter.
    ///
    /// Parameters after the last present one are omitted; absent optionals
    /// before it are written with their defaults. Returns `None` when a
    /// required parameter has no value.
    pub fn render_with_spans(
        &self,
        params: &[ParamDescriptor],
        values: &ParamMap,
    ) -> Option<(String, BTreeMap<String, Range<usize>>)> {
        let last_written = params
            .iter()
            .rposition(|descriptor| !descriptor.optional || values.contains_key(descriptor.name));

        let mut text = String::new();
        let mut spans = BTreeMap::new();
        for (position, fragment) in self.fragments.iter().enumerate() {
            match fragment {
                Fragment::Literal(literal) => text.push_str(literal),
                Fragment::Separator => {
                    if let Some(Fragment::Param(next)) = self.fragments.get(position + 1)
                        && last_written.is_some_and(|last| *next <= last)
                    {
                        text.push_str(", ");
                    }
                }
                Fragment::Param(index) => {
                    if last_written.is_none_or(|last| *index > last) {
                        continue;
                    }
                    let descriptor = &params[*index];
                    let value = values
                        .get(descriptor.name)
                        .or(descriptor.default.as_ref())?;
                    let start = text.len();
                    text.push_str(&value.to_source());
                    spans.insert(descriptor.name.to_string(), start..text.len());
                }
            }
        }
        Some((text, spans))
    }
}

/// Compiled matcher and composition for one action kind
#[derive(Debug)]
pub struct ActionPattern {
    pub kind: ActionKind,
    /// Required parameters first, then optionals in declared order
    pub params: Vec<ParamDescriptor>,
    pub regex: Regex,
    pub composition: Composition,
}

impl ActionPattern {
    pub fn new(kind: ActionKind, mut params: Vec<ParamDescriptor>) -> Self {
        // Stable: trailing omission must stay positionally valid
        params.sort_by_key(|descriptor| descriptor.optional);

        let mut source = format!(
            r"\bauton{GAP}::{GAP}{}{GAP}\(",
            regex::escape(kind.call_name())
        );
        let mut open_optionals = 0;
        for (index, descriptor) in params.iter().enumerate() {
            if descriptor.optional {
                source.push_str("(?:");
                open_optionals += 1;
            }
            if index > 0 {
                source.push_str(GAP);
                source.push(',');
            }
            source.push_str(&format!(
                "{GAP}(?P<{}>{})",
                descriptor.group(),
                descriptor.ty.literal()
            ));
        }
        source.push_str(&")?".repeat(open_optionals));
        source.push_str(&format!(r"{GAP}\){GAP};"));

        // The grammar tables are fixed, so a compile failure is a programming error
        let regex = Regex::new(&source).expect("action grammar compiles");
        let composition = Composition::for_call(kind.call_name(), params.len());
        Self {
            kind,
            params,
            regex,
            composition,
        }
    }

    /// Typed parameters and their spans relative to the whole match
    pub fn extract(&self, captures: &Captures) -> Option<(ParamMap, BTreeMap<String, Range<usize>>)> {
        let base = captures.get(0)?.start();
        let mut values = ParamMap::new();
        let mut spans = BTreeMap::new();
        for descriptor in &self.params {
            if let Some(matched) = captures.name(&descriptor.group()) {
                let value = descriptor.ty.coerce(matched.as_str())?;
                values.insert(descriptor.name.to_string(), value);
                spans.insert(
                    descriptor.name.to_string(),
                    (matched.start() - base)..(matched.end() - base),
                );
            }
        }
        Some((values, spans))
    }

    pub fn descriptor(&self, name: &str) -> Option<&ParamDescriptor> {
        self.params.iter().find(|descriptor| descriptor.name == name)
    }

    /// Generate call text for an action of this pattern's kind
    pub fn render(&self, action: &Action) -> Option<(String, BTreeMap<String, Range<usize>>)> {
        if action.kind() != self.kind {
            return None;
        }
        self.composition
            .render_with_spans(&self.params, &action.params())
    }
}

/// All action patterns, indexed by kind
#[derive(Debug)]
pub struct PatternLibrary {
    patterns: Vec<ActionPattern>,
}

impl PatternLibrary {
    /// The shared library for the built-in grammar, compiled on first use
    pub fn standard() -> &'static PatternLibrary {
        static LIBRARY: OnceLock<PatternLibrary> = OnceLock::new();
        LIBRARY.get_or_init(|| PatternLibrary {
            patterns: ActionKind::ALL
                .into_iter()
                .map(|kind| ActionPattern::new(kind, descriptors(kind)))
                .collect(),
        })
    }

    pub fn get(&self, kind: ActionKind) -> &ActionPattern {
        &self.patterns[kind as usize]
    }

    pub fn iter(&self) -> impl Iterator<Item = &ActionPattern> {
        self.patterns.iter()
    }
}
