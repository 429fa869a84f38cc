//! Model edits back to text.
//!
//! Kept actions are patched parameter by parameter, so comments and spacing
//! inside a call survive. Fresh actions are generated from the pattern
//! composition and written next to the nearest surviving action.

use std::collections::BTreeMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{Action, ActionId, ActionKind, ActionNode, SourceSpan};
use crate::editing::auton::EditOperation;
use crate::editing::history::ListError;
use crate::editing::reparse::TextSource;
use crate::parsing::PatternLibrary;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SynthError {
    #[error(transparent)]
    OutOfRange(#[from] ListError),
    #[error("cannot generate source for {kind}")]
    Unrenderable { kind: ActionKind },
    #[error("{kind} parameter {param} has no literal form")]
    InvalidValue { kind: ActionKind, param: String },
}

/// Replace `range` of the document with `new_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEdit {
    pub range: Range<usize>,
    pub new_text: String,
}

impl TextEdit {
    pub fn delta(&self) -> isize {
        self.new_text.len() as isize - (self.range.end - self.range.start) as isize
    }

    fn is_insertion_at(&self, offset: usize) -> bool {
        self.range.start == offset && self.range.end == offset
    }
}

/// Text edits for one model edit, plus where every installed action ends up
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Synthesis {
    /// Sorted by range and non-overlapping, in pre-edit coordinates
    pub edits: Vec<TextEdit>,
    /// Post-edit source of every action the model edit installs
    pub spans: Vec<(ActionId, SourceSpan)>,
}

impl Synthesis {
    pub fn is_empty(&self) -> bool {
        self.edits.is_empty()
    }

    /// Where a pre-edit offset lands; text inserted exactly at `offset` goes before it
    pub fn map_offset(&self, offset: usize) -> usize {
        let delta: isize = self
            .edits
            .iter()
            .filter(|edit| edit.range.end <= offset)
            .map(TextEdit::delta)
            .sum();
        offset.saturating_add_signed(delta)
    }

    /// Like [`map_offset`](Self::map_offset), but text inserted exactly at
    /// `offset` goes after it
    pub fn map_end(&self, offset: usize) -> usize {
        let delta: isize = self
            .edits
            .iter()
            .filter(|edit| edit.range.end <= offset && !edit.is_insertion_at(offset))
            .map(TextEdit::delta)
            .sum();
        offset.saturating_add_signed(delta)
    }

    /// Move a surviving action's span into post-edit coordinates
    pub fn remap(&self, span: &SourceSpan) -> SourceSpan {
        SourceSpan {
            offset: self.map_offset(span.offset),
            end_offset: self.map_end(span.end_offset),
            ..span.clone()
        }
    }

    pub fn span_of(&self, id: ActionId) -> Option<&SourceSpan> {
        self.spans
            .iter()
            .find(|(candidate, _)| *candidate == id)
            .map(|(_, span)| span)
    }
}

/// Refuse values that would write text the scanner cannot read back
fn check_writable(action: &Action) -> Result<(), SynthError> {
    match action.params().into_iter().find(|(_, value)| !value.is_writable()) {
        Some((param, _)) => Err(SynthError::InvalidValue {
            kind: action.kind(),
            param,
        }),
        None => Ok(()),
    }
}

/// Generated call text and parameter spans for an action
pub fn generate(action: &Action) -> Result<(String, BTreeMap<String, Range<usize>>), SynthError> {
    check_writable(action)?;
    PatternLibrary::standard()
        .get(action.kind())
        .render(action)
        .ok_or(SynthError::Unrenderable {
            kind: action.kind(),
        })
}

/// Text edits turning `source` (the text of `old`) into a call for `new`.
///
/// Only parameters whose values differ are rewritten. When a parameter has
/// to be added or dropped the whole call is regenerated in place. The
/// returned span has the pre-edit offset and the post-edit text.
pub fn patch_action(
    source: &SourceSpan,
    old: &Action,
    new: &Action,
) -> Result<(Vec<TextEdit>, SourceSpan), SynthError> {
    check_writable(new)?;
    if old.kind() == new.kind()
        && let Some(relative) = param_patches(source, old, new)
    {
        let mut text = source.text.clone();
        for patch in relative.iter().rev() {
            text.replace_range(patch.range.clone(), &patch.new_text);
        }
        let pattern = PatternLibrary::standard().get(new.kind());
        let reparsed = pattern
            .regex
            .captures(&text)
            .filter(|captures| captures.get(0).is_some_and(|whole| whole.start() == 0))
            .and_then(|captures| pattern.extract(&captures));
        if let Some((_, param_spans)) = reparsed {
            let edits = relative
                .into_iter()
                .map(|patch| TextEdit {
                    range: (source.offset + patch.range.start)..(source.offset + patch.range.end),
                    new_text: patch.new_text,
                })
                .collect();
            let span = SourceSpan {
                offset: source.offset,
                end_offset: source.offset + text.len(),
                text,
                param_spans,
            };
            return Ok((edits, span));
        }
    }

    let (text, param_spans) = generate(new)?;
    let edit = TextEdit {
        range: source.range(),
        new_text: text.clone(),
    };
    let span = SourceSpan {
        offset: source.offset,
        end_offset: source.offset + text.len(),
        text,
        param_spans,
    };
    Ok((vec![edit], span))
}

/// Per-parameter rewrites relative to the call text, or `None` when a
/// parameter must be added or removed
fn param_patches(source: &SourceSpan, old: &Action, new: &Action) -> Option<Vec<TextEdit>> {
    let old_params = old.params();
    let new_params = new.params();

    let mut patches = Vec::new();
    for name in old_params.keys().chain(new_params.keys()) {
        match (old_params.get(name), new_params.get(name)) {
            (Some(before), Some(after)) if before == after => {}
            (Some(_), Some(after)) => {
                let range = source.param_spans.get(name)?.clone();
                if !patches.iter().any(|patch: &TextEdit| patch.range == range) {
                    patches.push(TextEdit {
                        range,
                        new_text: after.to_source(),
                    });
                }
            }
            _ => return None,
        }
    }
    patches.sort_by_key(|patch| patch.range.start);
    Some(patches)
}

/// An edit plus the actions it writes, at offsets within `new_text`
struct Pending {
    edit: TextEdit,
    placed: Vec<(ActionId, usize, String, BTreeMap<String, Range<usize>>)>,
}

impl Pending {
    fn is_deletion(&self) -> bool {
        self.edit.new_text.is_empty() && self.placed.is_empty()
    }
}

/// Turn a model edit into text edits against `text`.
///
/// `nodes` is the list before the edit is applied.
pub fn synthesize<S>(
    nodes: &[ActionNode],
    edit: &EditOperation,
    text: &S,
) -> Result<Synthesis, SynthError>
where
    S: TextSource + ?Sized,
{
    let end = edit
        .index
        .checked_add(edit.count)
        .filter(|end| *end <= nodes.len())
        .ok_or(ListError::OutOfRange {
            index: edit.index,
            count: edit.count,
            len: nodes.len(),
        })?;
    let replaced = &nodes[edit.index..end];

    // Pair installed actions with replaced ones, keeping source order
    let mut matches: Vec<Option<usize>> = Vec::with_capacity(edit.actions.len());
    let mut next_slot = 0;
    for action in &edit.actions {
        let found = replaced[next_slot..]
            .iter()
            .position(|old| old.id == action.id && old.kind() == action.kind() && old.source.is_some())
            .map(|position| next_slot + position);
        if let Some(slot) = found {
            next_slot = slot + 1;
        }
        matches.push(found);
    }

    let mut pending = Vec::new();
    let mut patched = Vec::new();

    for (slot, old) in replaced.iter().enumerate() {
        if matches.contains(&Some(slot)) {
            continue;
        }
        if let Some(span) = &old.source {
            pending.push(Pending {
                edit: TextEdit {
                    range: deletion_range(text, span),
                    new_text: String::new(),
                },
                placed: Vec::new(),
            });
        }
    }

    for (action, matched) in edit.actions.iter().zip(&matches) {
        let Some(slot) = matched else { continue };
        let old = &replaced[*slot];
        let Some(source) = &old.source else { continue };
        let (edits, span) = patch_action(source, &old.action, &action.action)?;
        pending.extend(edits.into_iter().map(|edit| Pending {
            edit,
            placed: Vec::new(),
        }));
        patched.push((action.id, span));
    }

    let mut position = 0;
    while position < edit.actions.len() {
        if matches[position].is_some() {
            position += 1;
            continue;
        }
        let run_end = (position..edit.actions.len())
            .find(|candidate| matches[*candidate].is_some())
            .unwrap_or(edit.actions.len());
        let run = &edit.actions[position..run_end];

        let next_survivor = matches[run_end..]
            .iter()
            .flatten()
            .next()
            .and_then(|slot| replaced[*slot].source.as_ref())
            .or_else(|| nodes[end..].iter().find_map(|node| node.source.as_ref()));
        let previous_survivor = matches[..position]
            .iter()
            .rev()
            .flatten()
            .next()
            .and_then(|slot| replaced[*slot].source.as_ref())
            .or_else(|| nodes[..edit.index].iter().rev().find_map(|node| node.source.as_ref()));

        pending.push(insertion(text, run, next_survivor, previous_survivor)?);
        position = run_end;
    }

    pending.sort_by_key(|item| (item.edit.range.start, item.edit.range.end));

    // Whole-line deletions of neighbouring lines can claim the same newline
    let mut merged: Vec<Pending> = Vec::with_capacity(pending.len());
    for item in pending {
        if let Some(last) = merged.last_mut()
            && last.is_deletion()
            && item.is_deletion()
            && item.edit.range.start < last.edit.range.end
        {
            last.edit.range.end = last.edit.range.end.max(item.edit.range.end);
            continue;
        }
        merged.push(item);
    }
    let pending = merged;

    let mut spans = Vec::new();
    let mut shift: isize = 0;
    for item in &pending {
        let written_at = item.edit.range.start.saturating_add_signed(shift);
        for (id, at, generated, param_spans) in &item.placed {
            let offset = written_at + at;
            spans.push((
                *id,
                SourceSpan {
                    offset,
                    end_offset: offset + generated.len(),
                    text: generated.clone(),
                    param_spans: param_spans.clone(),
                },
            ));
        }
        shift += item.edit.delta();
    }

    let mut synthesis = Synthesis {
        edits: pending.into_iter().map(|item| item.edit).collect(),
        spans,
    };
    for (id, span) in patched {
        let offset = synthesis.map_offset(span.offset);
        let end_offset = offset + span.text.len();
        synthesis.spans.push((
            id,
            SourceSpan {
                offset,
                end_offset,
                ..span
            },
        ));
    }

    log::debug!(
        "synthesized {} text edit(s) for edit at {}+{}",
        synthesis.edits.len(),
        edit.index,
        edit.count
    );
    Ok(synthesis)
}

/// The range to delete for a removed action: its whole line when nothing
/// else is on it
fn deletion_range<S: TextSource + ?Sized>(text: &S, span: &SourceSpan) -> Range<usize> {
    let line_start = text.line_start(span.offset);
    let line_end = text.line_end(span.end_offset);
    let blank = |range: Range<usize>| text.slice(range).chars().all(char::is_whitespace);

    if !blank(line_start..span.offset) || !blank(span.end_offset..line_end) {
        return span.range();
    }
    if line_end < text.len() {
        line_start..line_end + 1
    } else if line_start > 0 {
        line_start - 1..line_end
    } else {
        line_start..line_end
    }
}

fn indentation<S: TextSource + ?Sized>(text: &S, offset: usize) -> String {
    let line_start = text.line_start(offset);
    text.slice(line_start..offset)
        .chars()
        .take_while(|c| *c == ' ' || *c == '\t')
        .collect()
}

/// One edit writing a run of fresh actions next to the nearest survivor
fn insertion<S: TextSource + ?Sized>(
    text: &S,
    run: &[ActionNode],
    next_survivor: Option<&SourceSpan>,
    previous_survivor: Option<&SourceSpan>,
) -> Result<Pending, SynthError> {
    let mut new_text = String::new();
    let mut placed = Vec::with_capacity(run.len());

    let at = match (next_survivor, previous_survivor) {
        (Some(next), _) => {
            let indent = indentation(text, next.offset);
            for node in run {
                let (generated, param_spans) = generate(&node.action)?;
                placed.push((node.id, new_text.len(), generated.clone(), param_spans));
                new_text.push_str(&generated);
                new_text.push('\n');
                new_text.push_str(&indent);
            }
            next.offset
        }
        (None, Some(previous)) => {
            let indent = indentation(text, previous.offset);
            for node in run {
                let (generated, param_spans) = generate(&node.action)?;
                new_text.push('\n');
                new_text.push_str(&indent);
                placed.push((node.id, new_text.len(), generated.clone(), param_spans));
                new_text.push_str(&generated);
            }
            previous.end_offset
        }
        (None, None) => {
            let len = text.len();
            if text.line_start(len) != len {
                new_text.push('\n');
            }
            for node in run {
                let (generated, param_spans) = generate(&node.action)?;
                placed.push((node.id, new_text.len(), generated.clone(), param_spans));
                new_text.push_str(&generated);
                new_text.push('\n');
            }
            len
        }
    };

    Ok(Pending {
        edit: TextEdit {
            range: at..at,
            new_text,
        },
        placed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{FollowParams, MoveToParams, Pose, WaitParams};
    use crate::parsing::scan;
    use pretty_assertions::assert_eq;

    const TEXT: &str = "void run() {
    auton::setPose(0, 0, 0);
    auton::moveTo(24.5f, /* x */ 36, 1000);
    auton::wait(10);
}
";

    fn apply(text: &str, synthesis: &Synthesis) -> String {
        let mut out = text.to_string();
        for edit in synthesis.edits.iter().rev() {
            out.replace_range(edit.range.clone(), &edit.new_text);
        }
        out
    }

    fn wait(ms: i64) -> ActionNode {
        ActionNode::new(Action::Wait(WaitParams { milliseconds: ms }))
    }

    #[test]
    fn test_generate_uses_composition() {
        let (text, spans) = generate(&Action::Wait(WaitParams { milliseconds: 250 })).unwrap();
        assert_eq!(text, "auton::wait(250);");
        assert_eq!(&text[spans["milliseconds"].clone()], "250");
    }

    #[test]
    fn test_parameter_change_patches_only_that_value() {
        let nodes = scan(TEXT);
        let mut changed = nodes[1].clone();
        changed.action = Action::MoveTo(MoveToParams {
            x: 24.5,
            y: 48.0,
            timeout: 1000,
            max_speed: None,
            log: None,
        });

        let synthesis = synthesize(&nodes, &EditOperation::replace(1, 1, vec![changed.clone()]), TEXT)
            .unwrap();
        assert_eq!(synthesis.edits.len(), 1);

        let output = apply(TEXT, &synthesis);
        insta::assert_snapshot!(output, @r"
        void run() {
            auton::setPose(0, 0, 0);
            auton::moveTo(24.5f, /* x */ 48, 1000);
            auton::wait(10);
        }
        ");

        let span = synthesis.span_of(changed.id).unwrap();
        assert_eq!(&output[span.range()], span.text);
        assert_eq!(span.param_range("y").map(|r| &output[r]), Some("48"));
    }

    #[test]
    fn test_adding_an_optional_parameter_regenerates_call() {
        let nodes = scan(TEXT);
        let mut changed = nodes[1].clone();
        changed.action = Action::MoveTo(MoveToParams {
            x: 24.5,
            y: 36.0,
            timeout: 1000,
            max_speed: Some(90.0),
            log: None,
        });

        let synthesis = synthesize(&nodes, &EditOperation::replace(1, 1, vec![changed]), TEXT)
            .unwrap();
        let output = apply(TEXT, &synthesis);
        assert!(output.contains("    auton::moveTo(24.5, 36, 1000, 90);\n"));
    }

    #[test]
    fn test_append_writes_after_last_action_only() {
        let nodes = scan(TEXT);
        let added = wait(250);
        let synthesis =
            synthesize(&nodes, &EditOperation::insert(3, vec![added.clone()]), TEXT).unwrap();

        assert_eq!(synthesis.edits.len(), 1);
        let wait_end = nodes[2].source.as_ref().unwrap().end_offset;
        assert_eq!(synthesis.edits[0].range, wait_end..wait_end);

        let output = apply(TEXT, &synthesis);
        insta::assert_snapshot!(output, @r"
        void run() {
            auton::setPose(0, 0, 0);
            auton::moveTo(24.5f, /* x */ 36, 1000);
            auton::wait(10);
            auton::wait(250);
        }
        ");
        let span = synthesis.span_of(added.id).unwrap();
        assert_eq!(&output[span.range()], "auton::wait(250);");
    }

    #[test]
    fn test_insert_goes_before_next_survivor() {
        let nodes = scan(TEXT);
        let synthesis = synthesize(
            &nodes,
            &EditOperation::insert(1, vec![ActionNode::new(Action::Intake)]),
            TEXT,
        )
        .unwrap();

        let output = apply(TEXT, &synthesis);
        assert!(output.contains("    auton::intake();\n    auton::moveTo("));

        // Survivors after the insertion move by the inserted length
        let moved = nodes[1].source.as_ref().unwrap();
        let remapped = synthesis.remap(moved);
        assert_eq!(&output[remapped.range()], moved.text);
    }

    #[test]
    fn test_remove_deletes_whole_line() {
        let nodes = scan(TEXT);
        let synthesis = synthesize(&nodes, &EditOperation::remove(1, 1), TEXT).unwrap();
        let output = apply(TEXT, &synthesis);
        insta::assert_snapshot!(output, @r"
        void run() {
            auton::setPose(0, 0, 0);
            auton::wait(10);
        }
        ");
    }

    #[test]
    fn test_remove_keeps_line_shared_with_other_code() {
        let text = "auton::setPose(0, 0, 0); auton::shoot(); auton::intake();\n";
        let nodes = scan(text);
        let synthesis = synthesize(&nodes, &EditOperation::remove(1, 1), text).unwrap();
        assert_eq!(
            apply(text, &synthesis),
            "auton::setPose(0, 0, 0);  auton::intake();\n"
        );
    }

    #[test]
    fn test_removing_last_lines_without_trailing_newline() {
        let text = "auton::setPose(0, 0, 0);\nauton::wait(1);\nauton::wait(2);";
        let nodes = scan(text);
        let synthesis = synthesize(&nodes, &EditOperation::remove(1, 2), text).unwrap();

        assert_eq!(synthesis.edits.len(), 1);
        assert!(
            synthesis
                .edits
                .windows(2)
                .all(|pair| pair[0].range.end <= pair[1].range.start)
        );
        assert_eq!(apply(text, &synthesis), "auton::setPose(0, 0, 0);\n");
    }

    #[test]
    fn test_reorder_regenerates_moved_action() {
        let nodes = scan(TEXT);
        let moved = vec![nodes[2].clone(), nodes[1].clone()];
        let synthesis = synthesize(&nodes, &EditOperation::replace(1, 2, moved), TEXT).unwrap();
        let output = apply(TEXT, &synthesis);

        let rescanned = scan(&output);
        assert_eq!(rescanned[1].kind(), ActionKind::Wait);
        assert_eq!(rescanned[2].kind(), ActionKind::MoveTo);
        for (id, span) in &synthesis.spans {
            assert_eq!(&output[span.range()], span.text, "{id}");
        }
    }

    #[test]
    fn test_empty_document_append() {
        let synthesis = synthesize(
            &[],
            &EditOperation::insert(
                0,
                vec![ActionNode::new(Action::set_pose(Pose::default())), wait(5)],
            ),
            "",
        )
        .unwrap();
        assert_eq!(
            apply("", &synthesis),
            "auton::setPose(0, 0, 0);\nauton::wait(5);\n"
        );
    }

    #[test]
    fn test_values_without_a_literal_form_are_rejected() {
        let nodes = scan(TEXT);
        let mut changed = nodes[1].clone();
        changed.action = Action::MoveTo(MoveToParams {
            x: f64::NAN,
            y: 36.0,
            timeout: 1000,
            max_speed: None,
            log: None,
        });
        assert_eq!(
            synthesize(&nodes, &EditOperation::replace(1, 1, vec![changed]), TEXT),
            Err(SynthError::InvalidValue {
                kind: ActionKind::MoveTo,
                param: "x".to_string()
            })
        );

        let quoted = Action::Follow(FollowParams {
            file_path: "a\"b.txt".to_string(),
            timeout: 1000,
            lookahead: 12.5,
            reverse: None,
            max_speed: None,
            log: None,
        });
        assert!(matches!(
            generate(&quoted),
            Err(SynthError::InvalidValue { kind: ActionKind::Follow, .. })
        ));
    }

    #[test]
    fn test_out_of_range_edit_is_rejected() {
        let nodes = scan(TEXT);
        assert!(matches!(
            synthesize(&nodes, &EditOperation::remove(2, 5), TEXT),
            Err(SynthError::OutOfRange(_))
        ));
    }

    #[test]
    fn test_unknown_id_is_treated_as_insertion() {
        let nodes = scan(TEXT);
        let mut stranger = nodes[2].clone();
        stranger.id = ActionId::new();

        let synthesis =
            synthesize(&nodes, &EditOperation::replace(2, 1, vec![stranger]), TEXT).unwrap();
        let output = apply(TEXT, &synthesis);
        assert_eq!(output.matches("auton::wait(10);").count(), 1);
        assert_eq!(scan(&output).len(), 3);
    }
}
