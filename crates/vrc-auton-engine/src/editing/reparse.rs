//! Incremental reparse of a single text change.
//!
//! Only the neighbourhood of the change is rescanned: the actions the change
//! touches plus any gap text up to the nearest untouched action on each side.
//! Everything after the change keeps its identity and has its offsets shifted.

use std::borrow::Cow;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use xi_rope::{LinesMetric, Rope};

use crate::actions::{ActionNode, SourceSpan};
use crate::editing::auton::EditOperation;
use crate::parsing::scan_with_offset;

/// A host change notification: replace `range_length` bytes at
/// `range_offset` with `new_text`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentChange {
    pub range_offset: usize,
    pub range_length: usize,
    pub new_text: String,
}

impl ContentChange {
    pub fn new(range: Range<usize>, new_text: impl Into<String>) -> Self {
        Self {
            range_offset: range.start,
            range_length: range.end - range.start,
            new_text: new_text.into(),
        }
    }

    pub fn range(&self) -> Range<usize> {
        self.range_offset..self.range_end()
    }

    pub fn range_end(&self) -> usize {
        self.range_offset + self.range_length
    }

    /// Net change in document length
    pub fn delta(&self) -> isize {
        self.new_text.len() as isize - self.range_length as isize
    }
}

/// Read access to document text
pub trait TextSource {
    fn len(&self) -> usize;
    fn slice(&self, range: Range<usize>) -> Cow<'_, str>;

    /// Offset of the first byte of the line containing `offset`
    fn line_start(&self, offset: usize) -> usize {
        self.slice(0..offset).rfind('\n').map_or(0, |newline| newline + 1)
    }

    /// Offset of the `\n` ending the line containing `offset`, or the text length
    fn line_end(&self, offset: usize) -> usize {
        self.slice(offset..self.len())
            .find('\n')
            .map_or(self.len(), |newline| offset + newline)
    }
}

/// Callers must pass ranges on char boundaries; `Session` checks host
/// changes before they reach here. Anything else reads as empty text.
impl TextSource for str {
    fn len(&self) -> usize {
        str::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, str> {
        debug_assert!(
            self.is_char_boundary(range.start) && self.is_char_boundary(range.end),
            "slice {range:?} splits a char or runs past {}",
            str::len(self)
        );
        self.get(range).map(Cow::Borrowed).unwrap_or_default()
    }
}

impl TextSource for Rope {
    fn len(&self) -> usize {
        Rope::len(self)
    }

    fn slice(&self, range: Range<usize>) -> Cow<'_, str> {
        self.slice_to_cow(range)
    }

    fn line_start(&self, offset: usize) -> usize {
        self.offset_of_line(self.line_of_offset(offset))
    }

    fn line_end(&self, offset: usize) -> usize {
        let line = self.line_of_offset(offset);
        if line < self.measure::<LinesMetric>() {
            self.offset_of_line(line + 1) - 1
        } else {
            Rope::len(self)
        }
    }
}

/// Offset drift for actions after a change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OffsetShift {
    /// First list index (before the edit is applied) that drifts
    pub from_index: usize,
    pub change_end: usize,
    pub delta: isize,
}

impl OffsetShift {
    pub fn apply(&self, span: &mut SourceSpan) {
        if span.offset >= self.change_end {
            span.offset = span.offset.saturating_add_signed(self.delta);
        }
        // An end exactly at the boundary stays put
        if span.end_offset > self.change_end {
            span.end_offset = span.end_offset.saturating_add_signed(self.delta);
        }
    }
}

/// Outcome of [`plan_reparse`]. Apply `shift` before `edit`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReparsePlan {
    pub edit: EditOperation,
    pub shift: OffsetShift,
    /// Byte range in the new text that was rescanned
    pub rescanned: Range<usize>,
}

/// Work out the minimal list edit that keeps `nodes` consistent with the
/// text after `change` is applied to `prior`.
pub fn plan_reparse<S>(nodes: &[ActionNode], change: &ContentChange, prior: &S) -> ReparsePlan
where
    S: TextSource + ?Sized,
{
    let change_start = change.range_offset;
    let change_end = change.range_end();

    let backed = || {
        nodes
            .iter()
            .enumerate()
            .filter_map(|(index, node)| node.source.as_ref().map(|span| (index, span)))
    };

    let overlaps =
        |span: &SourceSpan| span.offset.max(change_start) <= span.end_offset.min(change_end);
    let first = backed().find(|&(_, span)| overlaps(span));
    let last = backed().filter(|&(_, span)| overlaps(span)).last();
    let before = backed().filter(|(_, span)| span.end_offset < change_start).last();
    let after = backed().find(|(_, span)| span.offset > change_end);

    // Gap text on either side can hold half a call that the change completes
    let affected_start = before.map_or(0, |(_, span)| span.end_offset);
    let affected_end = after.map_or(prior.len(), |(_, span)| span.offset);

    let prefix = prior.slice(affected_start..change_start);
    let suffix = prior.slice(change_end..affected_end);

    let mut fragment =
        String::with_capacity(prefix.len() + change.new_text.len() + suffix.len());
    fragment.push_str(&prefix);
    fragment.push_str(&change.new_text);
    fragment.push_str(&suffix);

    let mut actions = scan_with_offset(&fragment, affected_start);

    let (index, count) = match (first, last) {
        (Some((first, _)), Some((last, _))) => (first, last - first + 1),
        _ => (before.map_or(0, |(index, _)| index + 1), 0),
    };
    inherit_ids(&mut actions, &nodes[index..index + count]);

    log::trace!(
        "reparse {}..{} -> {} action(s) over {affected_start}..{affected_end} replacing {index}+{count}",
        change_start,
        change_end,
        actions.len()
    );

    let rescanned_end = affected_start + fragment.len();
    ReparsePlan {
        edit: EditOperation {
            actions,
            index,
            count,
        },
        shift: OffsetShift {
            from_index: index + count,
            change_end,
            delta: change.delta(),
        },
        rescanned: affected_start..rescanned_end,
    }
}

/// Carry ids from replaced actions to rescanned ones of the same kind,
/// greedily in source order
pub(crate) fn inherit_ids(scanned: &mut [ActionNode], replaced: &[ActionNode]) {
    let mut used = vec![false; replaced.len()];
    for node in scanned {
        let candidate = replaced
            .iter()
            .enumerate()
            .find(|(slot, old)| !used[*slot] && old.kind() == node.kind());
        if let Some((slot, old)) = candidate {
            used[slot] = true;
            node.id = old.id;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actions::{Action, ActionKind, ParamValue, WaitParams};
    use crate::parsing::scan;
    use pretty_assertions::assert_eq;

    const TEXT: &str = "auton::setPose(0, 0, 0);\nauton::moveTo(24.5, 36, 1000);\n\nauton::wait(10);\n";

    fn apply_text(text: &str, change: &ContentChange) -> String {
        let mut out = text.to_string();
        out.replace_range(change.range(), &change.new_text);
        out
    }

    fn spans(nodes: &[ActionNode]) -> Vec<Range<usize>> {
        nodes
            .iter()
            .map(|node| node.source.as_ref().unwrap().range())
            .collect()
    }

    /// Apply a plan the way the session does and return the resulting list
    fn run(nodes: &[ActionNode], plan: &ReparsePlan) -> Vec<ActionNode> {
        let mut list = nodes.to_vec();
        for node in list.iter_mut().skip(plan.shift.from_index) {
            plan.shift.apply(node.source.as_mut().unwrap());
        }
        list.splice(
            plan.edit.index..plan.edit.index + plan.edit.count,
            plan.edit.actions.clone(),
        );
        list
    }

    #[test]
    fn test_parameter_edit_replaces_one_action_keeping_id() {
        let nodes = scan(TEXT);
        let x = TEXT.find("24.5").unwrap();
        let change = ContentChange::new(x..x + 4, "30");

        let plan = plan_reparse(&nodes, &change, TEXT);
        assert_eq!(plan.edit.index, 1);
        assert_eq!(plan.edit.count, 1);
        assert_eq!(plan.edit.actions.len(), 1);
        assert_eq!(plan.edit.actions[0].id, nodes[1].id);
        assert_eq!(
            plan.edit.actions[0].action.params().get("x"),
            Some(&ParamValue::Float(30.0))
        );

        let updated = run(&nodes, &plan);
        let new_text = apply_text(TEXT, &change);
        assert_eq!(spans(&updated), spans(&scan(&new_text)));
        assert_eq!(updated[2].id, nodes[2].id);
        assert_eq!(
            updated[2].source.as_ref().unwrap().offset,
            nodes[2].source.as_ref().unwrap().offset - 2
        );
    }

    #[test]
    fn test_change_in_gap_is_structural_noop() {
        let nodes = scan(TEXT);
        let gap = TEXT.find("\n\n").unwrap() + 1;
        let change = ContentChange::new(gap..gap, "// note\n");

        let plan = plan_reparse(&nodes, &change, TEXT);
        assert!(plan.edit.is_noop());
        assert_eq!(plan.edit.index, 2);
        assert_eq!(plan.shift.from_index, 2);
        assert_eq!(plan.shift.delta, 8);
    }

    #[test]
    fn test_insertion_between_actions_is_pure_insert() {
        let nodes = scan(TEXT);
        let gap = TEXT.find("\n\n").unwrap() + 1;
        let change = ContentChange::new(gap..gap, "auton::intake();");

        let plan = plan_reparse(&nodes, &change, TEXT);
        assert_eq!(plan.edit.index, 2);
        assert_eq!(plan.edit.count, 0);
        assert_eq!(plan.edit.actions.len(), 1);
        assert_eq!(plan.edit.actions[0].kind(), ActionKind::Intake);
        assert_eq!(plan.edit.actions[0].source.as_ref().unwrap().offset, gap);
    }

    #[test]
    fn test_completing_a_call_in_gap_text() {
        let text = "auton::setPose(0, 0, 0);\nauton::wait(5\nauton::roller();";
        let nodes = scan(text);
        assert_eq!(nodes.len(), 2);

        let at = text.find("5\n").unwrap() + 1;
        let change = ContentChange::new(at..at, ");");
        let plan = plan_reparse(&nodes, &change, text);

        let updated = run(&nodes, &plan);
        let kinds: Vec<_> = updated.iter().map(ActionNode::kind).collect();
        assert_eq!(
            kinds,
            vec![ActionKind::SetPose, ActionKind::Wait, ActionKind::Roller]
        );
        assert_eq!(updated[2].id, nodes[1].id);
        assert_eq!(spans(&updated), spans(&scan(&apply_text(text, &change))));
    }

    #[test]
    fn test_change_completing_a_call_started_before_the_action() {
        let text = "auton::setPose(0, 0, 0);\nauton::wait(\nauton::roller();";
        let nodes = scan(text);
        let span = nodes[1].source.clone().unwrap();
        let change = ContentChange::new(span.range(), "5);");

        let plan = plan_reparse(&nodes, &change, text);
        let updated = run(&nodes, &plan);
        let new_text = apply_text(text, &change);
        assert_eq!(updated[1].action, Action::Wait(WaitParams { milliseconds: 5 }));
        assert_eq!(spans(&updated), spans(&scan(&new_text)));
        assert_eq!(plan.rescanned, nodes[0].source.as_ref().unwrap().end_offset..new_text.len());
    }

    #[test]
    fn test_deleting_an_action_removes_it() {
        let nodes = scan(TEXT);
        let span = nodes[1].source.as_ref().unwrap();
        let change = ContentChange::new(span.offset..span.end_offset + 1, "");

        let plan = plan_reparse(&nodes, &change, TEXT);
        let updated = run(&nodes, &plan);
        assert_eq!(updated.len(), 2);
        assert_eq!(updated[1].id, nodes[2].id);
        assert_eq!(spans(&updated), spans(&scan(&apply_text(TEXT, &change))));
    }

    #[test]
    fn test_breaking_a_call_removes_it_from_the_list() {
        let nodes = scan(TEXT);
        let semicolon = nodes[2].source.as_ref().unwrap().end_offset - 1;
        let change = ContentChange::new(semicolon..semicolon + 1, "");

        let plan = plan_reparse(&nodes, &change, TEXT);
        assert_eq!(plan.edit.index, 2);
        assert_eq!(plan.edit.count, 1);
        assert!(plan.edit.actions.is_empty());
    }

    #[test]
    fn test_deleting_the_start_pose_is_surfaced_as_an_edit() {
        let nodes = scan(TEXT);
        let change = ContentChange::new(0..25, "");
        let plan = plan_reparse(&nodes, &change, TEXT);

        // The change ends where moveTo starts, so it is rescanned too
        assert_eq!(plan.edit.index, 0);
        assert_eq!(plan.edit.count, 2);
        assert_eq!(plan.edit.actions.len(), 1);
        assert_eq!(plan.edit.actions[0].kind(), ActionKind::MoveTo);
        assert_eq!(plan.edit.actions[0].id, nodes[1].id);
    }

    #[test]
    fn test_kind_change_gets_fresh_id() {
        let nodes = scan(TEXT);
        let at = TEXT.find("wait(10)").unwrap();
        let change = ContentChange::new(at..at + 8, "shoot()");

        let plan = plan_reparse(&nodes, &change, TEXT);
        assert_eq!(plan.edit.actions.len(), 1);
        assert_eq!(plan.edit.actions[0].action, Action::Shoot);
        assert_ne!(plan.edit.actions[0].id, nodes[2].id);
    }

    #[test]
    fn test_rope_and_str_sources_agree() {
        let nodes = scan(TEXT);
        let x = TEXT.find("36").unwrap();
        let change = ContentChange::new(x..x + 2, "-4.25");
        let rope = Rope::from(TEXT);

        let from_str = plan_reparse(&nodes, &change, TEXT);
        let from_rope = plan_reparse(&nodes, &change, &rope);
        assert_eq!(from_str, from_rope);
    }

    #[test]
    fn test_offset_shift_keeps_boundary_end() {
        let shift = OffsetShift {
            from_index: 0,
            change_end: 10,
            delta: -3,
        };
        let mut span = SourceSpan {
            offset: 4,
            end_offset: 10,
            text: String::new(),
            param_spans: Default::default(),
        };
        shift.apply(&mut span);
        assert_eq!(span.range(), 4..10);

        let mut later = SourceSpan {
            offset: 10,
            end_offset: 20,
            ..span
        };
        shift.apply(&mut later);
        assert_eq!(later.range(), 7..17);
    }
}
