use std::collections::HashSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::actions::{Action, ActionId, ActionKind, ActionNode, Pose, SourceSpan};
use crate::editing::history::{CommandList, ListError, ListQuery, Splice};
use crate::editing::reparse::OffsetShift;

/// Replace `count` actions starting at `index` with `actions`
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct EditOperation {
    pub actions: Vec<ActionNode>,
    pub index: usize,
    pub count: usize,
}

impl EditOperation {
    pub fn insert(index: usize, actions: Vec<ActionNode>) -> Self {
        Self {
            actions,
            index,
            count: 0,
        }
    }

    pub fn replace(index: usize, count: usize, actions: Vec<ActionNode>) -> Self {
        Self {
            actions,
            index,
            count,
        }
    }

    pub fn remove(index: usize, count: usize) -> Self {
        Self {
            actions: Vec::new(),
            index,
            count,
        }
    }

    /// Neither removes nor installs anything
    pub fn is_noop(&self) -> bool {
        self.count == 0 && self.actions.is_empty()
    }

    fn from_splice(splice: Splice<ActionNode>) -> Self {
        Self {
            actions: splice.inserted,
            index: splice.index,
            count: splice.count,
        }
    }
}

/// Monotonic sequence number of an applied edit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EditSeq(pub u64);

/// Which side of the synchronisation an edit came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EditOrigin {
    Text,
    View,
    History,
}

/// Notification sent to subscribers after every structural edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AutonEvent {
    pub seq: EditSeq,
    pub origin: EditOrigin,
    pub index: usize,
    pub removed: Vec<ActionNode>,
    pub inserted: Vec<ActionNode>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum AutonError {
    #[error("the starting pose cannot be removed")]
    RemoveStartPose,
    #[error("action {index} must establish a pose, but {attempted} does not")]
    InvalidStructure { index: usize, attempted: ActionKind },
    #[error("action id {id} is already in use")]
    DuplicateId { id: ActionId },
    #[error(transparent)]
    OutOfRange(#[from] ListError),
    #[error("an auton needs at least one action")]
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Subscriber = Box<dyn FnMut(&AutonEvent)>;

/// The ordered, invariant-checked action list of one routine.
///
/// Element 0 always establishes the starting pose and ids are unique. Every
/// structural change is journaled in a [`CommandList`] and broadcast to
/// subscribers as an [`AutonEvent`].
pub struct Auton {
    actions: CommandList<ActionNode>,
    next_seq: u64,
    subscribers: Vec<(SubscriptionId, Subscriber)>,
    next_subscription: u64,
}

impl fmt::Debug for Auton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Auton")
            .field("actions", &self.actions.as_slice())
            .field("next_seq", &self.next_seq)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}

impl Auton {
    pub fn from_nodes(nodes: Vec<ActionNode>) -> Result<Self, AutonError> {
        let first = nodes.first().ok_or(AutonError::Empty)?;
        if !first.kind().establishes_pose() {
            return Err(AutonError::InvalidStructure {
                index: 0,
                attempted: first.kind(),
            });
        }
        check_unique(nodes.iter(), &HashSet::new())?;
        Ok(Self {
            actions: CommandList::new(nodes),
            next_seq: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        })
    }

    /// A model-only auton holding just a starting pose
    pub fn new(start: Pose) -> Self {
        Self {
            actions: CommandList::new(vec![ActionNode::new(Action::set_pose(start))]),
            next_seq: 0,
            subscribers: Vec::new(),
            next_subscription: 0,
        }
    }

    pub fn nodes(&self) -> &[ActionNode] {
        self.actions.as_slice()
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ActionNode> {
        self.actions
            .get(ListQuery::At(index))
            .ok()
            .and_then(<[ActionNode]>::first)
    }

    pub fn index_of(&self, id: ActionId) -> Option<usize> {
        self.nodes().iter().position(|node| node.id == id)
    }

    pub fn start_pose(&self) -> Option<Pose> {
        self.nodes().first().and_then(|node| node.action.pose())
    }

    /// Check an edit against the list's invariants without applying it
    pub fn validate(&self, edit: &EditOperation) -> Result<(), AutonError> {
        let existing = self.actions.get(ListQuery::Range {
            index: edit.index,
            count: edit.count,
        })?;
        debug_assert_eq!(existing.len(), edit.count);

        if edit.index == 0 && !edit.is_noop() {
            match edit.actions.first() {
                None => return Err(AutonError::RemoveStartPose),
                Some(first) if !first.kind().establishes_pose() => {
                    return Err(AutonError::InvalidStructure {
                        index: 0,
                        attempted: first.kind(),
                    });
                }
                Some(_) => {}
            }
        }

        let outside: HashSet<ActionId> = self
            .nodes()
            .iter()
            .enumerate()
            .filter(|(index, _)| *index < edit.index || *index >= edit.index + edit.count)
            .map(|(_, node)| node.id)
            .collect();
        check_unique(edit.actions.iter(), &outside)
    }

    /// Apply an edit. Returns `None` for a no-op, which is not journaled.
    pub fn replace(
        &mut self,
        edit: EditOperation,
        origin: EditOrigin,
    ) -> Result<Option<AutonEvent>, AutonError> {
        if let Err(err) = self.validate(&edit) {
            log::debug!("rejected {origin:?} edit at {}: {err}", edit.index);
            return Err(err);
        }
        if edit.is_noop() {
            return Ok(None);
        }

        let removed = self.nodes()[edit.index..edit.index + edit.count].to_vec();
        let inserted = edit.actions.clone();
        if edit.count == 0 {
            self.actions.insert(edit.index, edit.actions)?;
        } else if edit.actions.is_empty() {
            self.actions.remove(edit.index, edit.count)?;
        } else {
            self.actions.replace(edit.index, edit.count, edit.actions)?;
        }

        let event = AutonEvent {
            seq: self.allocate_seq(),
            origin,
            index: edit.index,
            removed,
            inserted,
        };
        self.emit(&event);
        Ok(Some(event))
    }

    pub fn insert(
        &mut self,
        index: usize,
        actions: Vec<ActionNode>,
        origin: EditOrigin,
    ) -> Result<Option<AutonEvent>, AutonError> {
        self.replace(EditOperation::insert(index, actions), origin)
    }

    pub fn remove(
        &mut self,
        index: usize,
        count: usize,
        origin: EditOrigin,
    ) -> Result<Option<AutonEvent>, AutonError> {
        self.replace(EditOperation::remove(index, count), origin)
    }

    pub fn append(
        &mut self,
        actions: Vec<ActionNode>,
        origin: EditOrigin,
    ) -> Result<Option<AutonEvent>, AutonError> {
        self.replace(EditOperation::insert(self.len(), actions), origin)
    }

    /// Move the starting pose in place, returning the previous one.
    ///
    /// Not journaled and not broadcast; the identity of element 0 is kept.
    pub fn set_start_pose(&mut self, pose: Pose) -> Result<Pose, AutonError> {
        let first = self
            .actions
            .elements_mut()
            .first_mut()
            .ok_or(AutonError::Empty)?;
        let kind = first.kind();
        let Action::SetPose(params) = &mut first.action else {
            return Err(AutonError::InvalidStructure {
                index: 0,
                attempted: kind,
            });
        };
        let previous = Pose {
            x: params.x,
            y: params.y,
            heading: params.heading,
        };
        params.x = pose.x;
        params.y = pose.y;
        params.heading = pose.heading;
        Ok(previous)
    }

    /// The edit [`undo`](Self::undo) would apply
    pub fn peek_undo(&self) -> Option<EditOperation> {
        self.actions.peek_undo().map(EditOperation::from_splice)
    }

    /// The edit [`redo`](Self::redo) would apply
    pub fn peek_redo(&self) -> Option<EditOperation> {
        self.actions.peek_redo().map(EditOperation::from_splice)
    }

    pub fn undo(&mut self) -> Result<Option<AutonEvent>, AutonError> {
        let Some(step) = self.peek_undo() else {
            return Ok(None);
        };
        let removed = self.nodes()[step.index..step.index + step.count].to_vec();
        let Some(splice) = self.actions.undo()? else {
            return Ok(None);
        };
        Ok(Some(self.history_event(splice, removed)))
    }

    pub fn redo(&mut self) -> Result<Option<AutonEvent>, AutonError> {
        let Some(step) = self.peek_redo() else {
            return Ok(None);
        };
        let removed = self.nodes()[step.index..step.index + step.count].to_vec();
        let Some(splice) = self.actions.redo()? else {
            return Ok(None);
        };
        Ok(Some(self.history_event(splice, removed)))
    }

    fn history_event(&mut self, splice: Splice<ActionNode>, removed: Vec<ActionNode>) -> AutonEvent {
        // Report what is in the list now; revert may hand back newer copies
        let inserted = self.nodes()[splice.index..splice.index + splice.inserted.len()].to_vec();
        let event = AutonEvent {
            seq: self.allocate_seq(),
            origin: EditOrigin::History,
            index: splice.index,
            removed,
            inserted,
        };
        self.emit(&event);
        event
    }

    /// Apply offset drift to every text-backed action from `shift.from_index`
    pub fn shift_offsets(&mut self, shift: &OffsetShift) {
        for node in self.actions.elements_mut().iter_mut().skip(shift.from_index) {
            if let Some(span) = node.source.as_mut() {
                shift.apply(span);
            }
        }
    }

    /// Rewrite every source span in place
    pub fn remap_sources(&mut self, mut map: impl FnMut(&SourceSpan) -> SourceSpan) {
        for node in self.actions.elements_mut() {
            if let Some(span) = node.source.as_mut() {
                *span = map(span);
            }
        }
    }

    /// Re-anchor one action to new source text. Returns false if the id is unknown.
    pub fn set_source(&mut self, id: ActionId, source: Option<SourceSpan>) -> bool {
        match self
            .actions
            .elements_mut()
            .iter_mut()
            .find(|node| node.id == id)
        {
            Some(node) => {
                node.source = source;
                true
            }
            None => false,
        }
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&AutonEvent) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.subscribers.push((id, Box::new(subscriber)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(existing, _)| *existing != id);
        self.subscribers.len() != before
    }

    pub fn can_undo(&self) -> bool {
        self.actions.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.actions.can_redo()
    }

    pub(crate) fn allocate_seq(&mut self) -> EditSeq {
        self.next_seq += 1;
        EditSeq(self.next_seq)
    }

    fn emit(&mut self, event: &AutonEvent) {
        for (_, subscriber) in &mut self.subscribers {
            subscriber(event);
        }
    }
}

fn check_unique<'a>(
    nodes: impl Iterator<Item = &'a ActionNode>,
    taken: &HashSet<ActionId>,
) -> Result<(), AutonError> {
    let mut seen = HashSet::new();
    for node in nodes {
        if taken.contains(&node.id) || !seen.insert(node.id) {
            return Err(AutonError::DuplicateId { id: node.id });
        }
    }
    Ok(())
}
