//! Per-document synchronisation between host text and the action model.
//!
//! A [`Session`] mirrors the host document in an `xi_rope::Rope`, feeds host
//! change notifications through the incremental reparser and turns view edits
//! into host text edits. Edits it issues itself are remembered by sequence
//! number so their echoes are not reparsed.

use std::collections::VecDeque;
use std::ops::Range;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use xi_rope::Rope;
use xi_rope::delta::Builder;

use crate::actions::{ActionId, ActionKind, ActionNode, Pose};
use crate::editing::reparse::inherit_ids;
use crate::editing::{
    Auton, AutonError, AutonEvent, ContentChange, EditOperation, EditOrigin, EditSeq,
    SubscriptionId, SynthError, Synthesis, TextEdit, patch_action, plan_reparse, synthesize,
};
use crate::parsing::scan;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Auton(#[from] AutonError),
    #[error(transparent)]
    Synth(#[from] SynthError),
    #[error("document no longer starts with a setPose call")]
    Desynced,
    #[error("change {range:?} does not fit a document of {len} bytes")]
    InvalidChange { range: Range<usize>, len: usize },
    #[error("no action with id {0}")]
    UnknownAction(ActionId),
    #[error("action index {index} is outside {len} actions")]
    SelectionOutOfRange { index: usize, len: usize },
}

/// Host change notification, optionally acknowledging one of our edits
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HostNotification {
    pub echo: Option<EditSeq>,
    pub changes: Vec<ContentChange>,
}

impl HostNotification {
    pub fn change(change: ContentChange) -> Self {
        Self {
            echo: None,
            changes: vec![change],
        }
    }

    pub fn echo(seq: EditSeq, changes: Vec<ContentChange>) -> Self {
        Self {
            echo: Some(seq),
            changes,
        }
    }
}

/// Text edits for the host to apply atomically, sorted and non-overlapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostEdit {
    pub seq: EditSeq,
    pub edits: Vec<TextEdit>,
}

impl HostEdit {
    /// The same edits as change notifications, in the order a host applying
    /// them one at a time would report them
    pub fn as_changes(&self) -> Vec<ContentChange> {
        self.edits
            .iter()
            .rev()
            .map(|edit| ContentChange::new(edit.range.clone(), edit.new_text.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ViewMessage {
    Snapshot {
        actions: Vec<ActionNode>,
        selection: Option<usize>,
    },
    Edit {
        seq: EditSeq,
        origin: EditOrigin,
        index: usize,
        count: usize,
        actions: Vec<ActionNode>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Selector {
    Index(usize),
    Id(ActionId),
}

#[derive(Debug)]
pub struct Session {
    text: Rope,
    auton: Auton,
    pending: VecDeque<EditSeq>,
    selection: Option<usize>,
    desynced: bool,
}

impl Session {
    /// Scan a document and build its model
    pub fn open(text: &str) -> Result<Self, SessionError> {
        let auton = Auton::from_nodes(scan(text))?;
        log::debug!("opened document with {} action(s)", auton.len());
        Ok(Self {
            text: Rope::from(text),
            auton,
            pending: VecDeque::new(),
            selection: None,
            desynced: false,
        })
    }

    pub fn auton(&self) -> &Auton {
        &self.auton
    }

    pub fn nodes(&self) -> &[ActionNode] {
        self.auton.nodes()
    }

    pub fn rope(&self) -> &Rope {
        &self.text
    }

    pub fn text(&self) -> String {
        self.text.to_string()
    }

    pub fn selection(&self) -> Option<usize> {
        self.selection
    }

    pub fn is_desynced(&self) -> bool {
        self.desynced
    }

    /// Self-issued edits the host has not acknowledged yet
    pub fn pending(&self) -> impl Iterator<Item = &EditSeq> {
        self.pending.iter()
    }

    pub fn subscribe(&mut self, subscriber: impl FnMut(&AutonEvent) + 'static) -> SubscriptionId {
        self.auton.subscribe(subscriber)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.auton.unsubscribe(id)
    }

    pub fn snapshot(&self) -> ViewMessage {
        ViewMessage::Snapshot {
            actions: self.auton.nodes().to_vec(),
            selection: self.selection,
        }
    }

    /// Bring the model up to date with host text changes.
    ///
    /// Echoes of edits this session issued are dropped without reparsing. A
    /// change that would break the starting pose leaves the model untouched
    /// and puts the session into a desynced state until the text is valid
    /// again.
    pub fn handle_host_notification(
        &mut self,
        notification: HostNotification,
    ) -> Result<Vec<ViewMessage>, SessionError> {
        if let Some(seq) = notification.echo {
            if let Some(position) = self.pending.iter().position(|pending| *pending == seq) {
                self.pending.remove(position);
                return Ok(Vec::new());
            }
            log::debug!("echo of unknown edit {seq:?}, reparsing");
        }

        let mut messages = Vec::new();
        for change in &notification.changes {
            self.check_change(change)?;
            if self.desynced {
                self.apply_change(change);
                continue;
            }

            let plan = plan_reparse(self.auton.nodes(), change, &self.text);
            if let Err(err) = self.auton.validate(&plan.edit) {
                log::debug!("text change rejected, desyncing: {err}");
                self.desynced = true;
                self.apply_change(change);
                continue;
            }
            self.auton.shift_offsets(&plan.shift);
            self.apply_change(change);
            if let Some(event) = self.auton.replace(plan.edit, EditOrigin::Text)? {
                self.track_selection(&event);
                messages.push(self.edit_message(&event));
            }
        }

        if self.desynced {
            return match self.try_resync() {
                Some(snapshot) => Ok(vec![snapshot]),
                None => Err(SessionError::Desynced),
            };
        }
        Ok(messages)
    }

    /// Apply a structural edit from the view and produce the text to write
    pub fn apply_view_edit(
        &mut self,
        edit: EditOperation,
    ) -> Result<Option<(HostEdit, ViewMessage)>, SessionError> {
        if self.desynced {
            return Err(SessionError::Desynced);
        }
        self.auton.validate(&edit)?;
        if edit.is_noop() {
            return Ok(None);
        }
        let synthesis = synthesize(self.auton.nodes(), &edit, &self.text)?;
        let Some(event) = self.auton.replace(edit, EditOrigin::View)? else {
            return Ok(None);
        };
        Ok(Some(self.commit(event, synthesis)))
    }

    /// Undo the last structural edit, in both model and text
    pub fn undo(&mut self) -> Result<Option<(HostEdit, ViewMessage)>, SessionError> {
        if self.desynced {
            return Err(SessionError::Desynced);
        }
        let Some(step) = self.auton.peek_undo() else {
            return Ok(None);
        };
        let synthesis = synthesize(self.auton.nodes(), &step, &self.text)?;
        let Some(event) = self.auton.undo()? else {
            return Ok(None);
        };
        Ok(Some(self.commit(event, synthesis)))
    }

    /// Redo the last undone edit, in both model and text
    pub fn redo(&mut self) -> Result<Option<(HostEdit, ViewMessage)>, SessionError> {
        if self.desynced {
            return Err(SessionError::Desynced);
        }
        let Some(step) = self.auton.peek_redo() else {
            return Ok(None);
        };
        let synthesis = synthesize(self.auton.nodes(), &step, &self.text)?;
        let Some(event) = self.auton.redo()? else {
            return Ok(None);
        };
        Ok(Some(self.commit(event, synthesis)))
    }

    /// Move the starting pose, patching its call in place
    pub fn set_start_pose(&mut self, pose: Pose) -> Result<Option<HostEdit>, SessionError> {
        if self.desynced {
            return Err(SessionError::Desynced);
        }
        let Some(before) = self.auton.get(0).cloned() else {
            return Err(AutonError::Empty.into());
        };
        // Checked before the model changes so a rejected pose leaves no trace
        for (param, value) in [("x", pose.x), ("y", pose.y), ("heading", pose.heading)] {
            if !value.is_finite() {
                return Err(SynthError::InvalidValue {
                    kind: ActionKind::SetPose,
                    param: param.to_string(),
                }
                .into());
            }
        }
        self.auton.set_start_pose(pose)?;
        let Some(source) = &before.source else {
            return Ok(None);
        };
        let Some(after) = self.auton.get(0).map(|node| node.action.clone()) else {
            return Err(AutonError::Empty.into());
        };

        let (edits, span) = patch_action(source, &before.action, &after)?;
        if edits.is_empty() {
            return Ok(None);
        }
        let synthesis = Synthesis {
            edits,
            spans: vec![(before.id, span)],
        };
        self.write(&synthesis);
        let seq = self.auton.allocate_seq();
        self.pending.push_back(seq);
        Ok(Some(HostEdit {
            seq,
            edits: synthesis.edits,
        }))
    }

    /// Select an action for cross-highlighting, returning its source range
    pub fn select(&mut self, selector: Selector) -> Result<Option<Range<usize>>, SessionError> {
        let index = match selector {
            Selector::Index(index) if index < self.auton.len() => index,
            Selector::Index(index) => {
                return Err(SessionError::SelectionOutOfRange {
                    index,
                    len: self.auton.len(),
                });
            }
            Selector::Id(id) => self
                .auton
                .index_of(id)
                .ok_or(SessionError::UnknownAction(id))?,
        };
        self.selection = Some(index);
        Ok(self.highlight_range(index, None))
    }

    pub fn clear_selection(&mut self) {
        self.selection = None;
    }

    /// Index of the action whose call contains the text cursor at `offset`
    pub fn selection_at_offset(&self, offset: usize) -> Option<usize> {
        self.auton.nodes().iter().position(|node| {
            node.source
                .as_ref()
                .is_some_and(|span| span.offset <= offset && offset <= span.end_offset)
        })
    }

    /// Source range of an action, or of one of its captured parameters
    pub fn highlight_range(&self, index: usize, param: Option<&str>) -> Option<Range<usize>> {
        let span = self.auton.get(index)?.source.as_ref()?;
        match param {
            Some(name) => span.param_range(name),
            None => Some(span.range()),
        }
    }

    /// Write synthesized text, re-anchor the model and remember the edit
    fn commit(&mut self, event: AutonEvent, synthesis: Synthesis) -> (HostEdit, ViewMessage) {
        self.write(&synthesis);
        self.track_selection(&event);
        self.pending.push_back(event.seq);
        let message = self.edit_message(&event);
        (
            HostEdit {
                seq: event.seq,
                edits: synthesis.edits,
            },
            message,
        )
    }

    fn write(&mut self, synthesis: &Synthesis) {
        if !synthesis.edits.is_empty() {
            let mut builder = Builder::new(self.text.len());
            for edit in &synthesis.edits {
                builder.replace(edit.range.clone(), Rope::from(edit.new_text.as_str()));
            }
            self.text = builder.build().apply(&self.text);
        }
        self.auton.remap_sources(|span| synthesis.remap(span));
        for (id, span) in &synthesis.spans {
            self.auton.set_source(*id, Some(span.clone()));
        }
    }

    fn check_change(&self, change: &ContentChange) -> Result<(), SessionError> {
        let len = self.text.len();
        match change.range_offset.checked_add(change.range_length) {
            Some(end)
                if end <= len
                    && self.text.is_codepoint_boundary(change.range_offset)
                    && self.text.is_codepoint_boundary(end) =>
            {
                Ok(())
            }
            _ => Err(SessionError::InvalidChange {
                range: change.range_offset..change.range_offset.saturating_add(change.range_length),
                len,
            }),
        }
    }

    fn apply_change(&mut self, change: &ContentChange) {
        let mut builder = Builder::new(self.text.len());
        builder.replace(change.range(), Rope::from(change.new_text.as_str()));
        self.text = builder.build().apply(&self.text);
    }

    /// Full rescan while desynced; succeeds once the text starts with a pose
    fn try_resync(&mut self) -> Option<ViewMessage> {
        let mut nodes = scan(&self.text.to_string());
        if !nodes.first().is_some_and(|node| node.kind().establishes_pose()) {
            return None;
        }
        inherit_ids(&mut nodes, self.auton.nodes());
        let count = self.auton.len();
        match self
            .auton
            .replace(EditOperation::replace(0, count, nodes), EditOrigin::Text)
        {
            Ok(_) => {
                log::debug!("resynced with {} action(s)", self.auton.len());
                self.desynced = false;
                self.selection = self.selection.filter(|index| *index < self.auton.len());
                Some(self.snapshot())
            }
            Err(err) => {
                log::debug!("resync failed: {err}");
                None
            }
        }
    }

    fn edit_message(&self, event: &AutonEvent) -> ViewMessage {
        let end = (event.index + event.inserted.len()).min(self.auton.len());
        ViewMessage::Edit {
            seq: event.seq,
            origin: event.origin,
            index: event.index,
            count: event.removed.len(),
            actions: self.auton.nodes()[event.index.min(end)..end].to_vec(),
        }
    }

    fn track_selection(&mut self, event: &AutonEvent) {
        let Some(selected) = self.selection else {
            return;
        };
        let removed_end = event.index + event.removed.len();
        self.selection = if selected < event.index {
            Some(selected)
        } else if selected >= removed_end {
            Some(selected + event.inserted.len() - event.removed.len())
        } else {
            event
                .removed
                .get(selected - event.index)
                .and_then(|old| self.auton.index_of(old.id))
        };
    }
}
