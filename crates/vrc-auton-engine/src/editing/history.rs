//! Undoable list mutation.
//!
//! Commands are plain data. [`apply`] and [`revert`] dispatch on the variant
//! and record whatever state the inverse needs inside the command itself.

use std::ops::Range;

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ListError {
    #[error("range {index}..{} is outside a list of {len} elements", .index + .count)]
    OutOfRange {
        index: usize,
        count: usize,
        len: usize,
    },
}

fn check_range(index: usize, count: usize, len: usize) -> Result<Range<usize>, ListError> {
    match index.checked_add(count) {
        Some(end) if end <= len => Ok(index..end),
        _ => Err(ListError::OutOfRange { index, count, len }),
    }
}

/// An invertible list mutation
#[derive(Debug, Clone, PartialEq)]
pub enum ListCommand<T> {
    Append {
        elements: Vec<T>,
    },
    Insert {
        index: usize,
        elements: Vec<T>,
    },
    Replace {
        index: usize,
        count: usize,
        elements: Vec<T>,
        /// Filled in when applied
        replaced: Vec<T>,
    },
    Remove {
        index: usize,
        count: usize,
        /// Filled in when applied
        removed: Vec<T>,
    },
}

/// A splice description: remove `count` elements at `index`, then insert
/// `inserted` there
#[derive(Debug, Clone, PartialEq)]
pub struct Splice<T> {
    pub index: usize,
    pub count: usize,
    pub inserted: Vec<T>,
}

impl<T: Clone> ListCommand<T> {
    /// The splice this command performs on a list of `len` elements
    pub fn forward(&self, len: usize) -> Splice<T> {
        match self {
            ListCommand::Append { elements } => Splice {
                index: len,
                count: 0,
                inserted: elements.clone(),
            },
            ListCommand::Insert { index, elements } => Splice {
                index: *index,
                count: 0,
                inserted: elements.clone(),
            },
            ListCommand::Replace {
                index,
                count,
                elements,
                ..
            } => Splice {
                index: *index,
                count: *count,
                inserted: elements.clone(),
            },
            ListCommand::Remove { index, count, .. } => Splice {
                index: *index,
                count: *count,
                inserted: Vec::new(),
            },
        }
    }

    /// The splice that undoes this command, given the applied list of `len`
    pub fn inverse(&self, len: usize) -> Splice<T> {
        match self {
            ListCommand::Append { elements } => Splice {
                index: len.saturating_sub(elements.len()),
                count: elements.len(),
                inserted: Vec::new(),
            },
            ListCommand::Insert { index, elements } => Splice {
                index: *index,
                count: elements.len(),
                inserted: Vec::new(),
            },
            ListCommand::Replace {
                index,
                elements,
                replaced,
                ..
            } => Splice {
                index: *index,
                count: elements.len(),
                inserted: replaced.clone(),
            },
            ListCommand::Remove { index, removed, .. } => Splice {
                index: *index,
                count: 0,
                inserted: removed.clone(),
            },
        }
    }
}

/// Perform `command` on `list`
pub fn apply<T: Clone>(command: &mut ListCommand<T>, list: &mut Vec<T>) -> Result<(), ListError> {
    match command {
        ListCommand::Append { elements } => {
            list.extend(elements.iter().cloned());
        }
        ListCommand::Insert { index, elements } => {
            check_range(*index, 0, list.len())?;
            list.splice(*index..*index, elements.iter().cloned());
        }
        ListCommand::Replace {
            index,
            count,
            elements,
            replaced,
        } => {
            let range = check_range(*index, *count, list.len())?;
            *replaced = list.splice(range, elements.iter().cloned()).collect();
        }
        ListCommand::Remove {
            index,
            count,
            removed,
        } => {
            let range = check_range(*index, *count, list.len())?;
            *removed = list.drain(range).collect();
        }
    }
    Ok(())
}

/// Undo `command` on `list`.
///
/// The elements taken back out are stored in the command, so in-place changes
/// made since [`apply`] survive a later redo.
pub fn revert<T: Clone>(command: &mut ListCommand<T>, list: &mut Vec<T>) -> Result<(), ListError> {
    match command {
        ListCommand::Append { elements } => {
            let index = list
                .len()
                .checked_sub(elements.len())
                .ok_or(ListError::OutOfRange {
                    index: 0,
                    count: elements.len(),
                    len: list.len(),
                })?;
            *elements = list.drain(index..).collect();
        }
        ListCommand::Insert { index, elements } => {
            let range = check_range(*index, elements.len(), list.len())?;
            *elements = list.drain(range).collect();
        }
        ListCommand::Replace {
            index,
            elements,
            replaced,
            ..
        } => {
            let range = check_range(*index, elements.len(), list.len())?;
            *elements = list.splice(range, replaced.iter().cloned()).collect();
        }
        ListCommand::Remove { index, removed, .. } => {
            check_range(*index, 0, list.len())?;
            list.splice(*index..*index, removed.iter().cloned());
        }
    }
    Ok(())
}

/// Read access to a [`CommandList`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListQuery {
    All,
    At(usize),
    Range { index: usize, count: usize },
}

/// A list whose structural edits are journaled for undo/redo
#[derive(Debug, Clone, PartialEq)]
pub struct CommandList<T> {
    elements: Vec<T>,
    undo_stack: Vec<ListCommand<T>>,
    redo_stack: Vec<ListCommand<T>>,
}

impl<T> Default for CommandList<T> {
    fn default() -> Self {
        Self {
            elements: Vec::new(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }
}

impl<T: Clone> CommandList<T> {
    pub fn new(elements: Vec<T>) -> Self {
        Self {
            elements,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
        }
    }

    pub fn append(&mut self, elements: Vec<T>) -> Result<&ListCommand<T>, ListError> {
        self.execute(ListCommand::Append { elements })
    }

    pub fn insert(&mut self, index: usize, elements: Vec<T>) -> Result<&ListCommand<T>, ListError> {
        self.execute(ListCommand::Insert { index, elements })
    }

    pub fn replace(
        &mut self,
        index: usize,
        count: usize,
        elements: Vec<T>,
    ) -> Result<&ListCommand<T>, ListError> {
        self.execute(ListCommand::Replace {
            index,
            count,
            elements,
            replaced: Vec::new(),
        })
    }

    pub fn remove(&mut self, index: usize, count: usize) -> Result<&ListCommand<T>, ListError> {
        self.execute(ListCommand::Remove {
            index,
            count,
            removed: Vec::new(),
        })
    }

    fn execute(&mut self, mut command: ListCommand<T>) -> Result<&ListCommand<T>, ListError> {
        apply(&mut command, &mut self.elements)?;
        self.redo_stack.clear();
        self.undo_stack.push(command);
        Ok(&self.undo_stack[self.undo_stack.len() - 1])
    }

    /// Undo the most recent command, returning the splice performed
    pub fn undo(&mut self) -> Result<Option<Splice<T>>, ListError> {
        let Some(mut command) = self.undo_stack.pop() else {
            return Ok(None);
        };
        let splice = command.inverse(self.elements.len());
        if let Err(err) = revert(&mut command, &mut self.elements) {
            self.undo_stack.push(command);
            return Err(err);
        }
        self.redo_stack.push(command);
        Ok(Some(splice))
    }

    /// Re-apply the most recently undone command, returning the splice performed
    pub fn redo(&mut self) -> Result<Option<Splice<T>>, ListError> {
        let Some(mut command) = self.redo_stack.pop() else {
            return Ok(None);
        };
        let splice = command.forward(self.elements.len());
        if let Err(err) = apply(&mut command, &mut self.elements) {
            self.redo_stack.push(command);
            return Err(err);
        }
        self.undo_stack.push(command);
        Ok(Some(splice))
    }

    /// What [`undo`](Self::undo) would do, without doing it
    pub fn peek_undo(&self) -> Option<Splice<T>> {
        self.undo_stack
            .last()
            .map(|command| command.inverse(self.elements.len()))
    }

    /// What [`redo`](Self::redo) would do, without doing it
    pub fn peek_redo(&self) -> Option<Splice<T>> {
        self.redo_stack
            .last()
            .map(|command| command.forward(self.elements.len()))
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn get(&self, query: ListQuery) -> Result<&[T], ListError> {
        let range = match query {
            ListQuery::All => 0..self.elements.len(),
            ListQuery::At(index) => check_range(index, 1, self.elements.len())?,
            ListQuery::Range { index, count } => check_range(index, count, self.elements.len())?,
        };
        Ok(&self.elements[range])
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.elements
    }

    /// In-place access for non-structural changes; not journaled
    pub fn elements_mut(&mut self) -> &mut [T] {
        &mut self.elements
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn list() -> CommandList<u32> {
        CommandList::new(vec![1, 2, 3])
    }

    #[test]
    fn test_append_and_undo() {
        let mut list = list();
        list.append(vec![4, 5]).unwrap();
        assert_eq!(list.as_slice(), &[1, 2, 3, 4, 5]);

        let splice = list.undo().unwrap().unwrap();
        assert_eq!(splice, Splice { index: 3, count: 2, inserted: vec![] });
        assert_eq!(list.as_slice(), &[1, 2, 3]);
    }

    #[test]
    fn test_replace_records_replaced_elements() {
        let mut list = list();
        let command = list.replace(1, 2, vec![9]).unwrap();
        assert_eq!(
            command,
            &ListCommand::Replace {
                index: 1,
                count: 2,
                elements: vec![9],
                replaced: vec![2, 3],
            }
        );
        assert_eq!(list.as_slice(), &[1, 9]);
        assert_eq!(
            list.peek_undo(),
            Some(Splice { index: 1, count: 1, inserted: vec![2, 3] })
        );
    }

    #[rstest]
    #[case(ListQuery::At(3))]
    #[case(ListQuery::Range { index: 2, count: 2 })]
    #[case(ListQuery::Range { index: usize::MAX, count: 2 })]
    fn test_out_of_range_queries(#[case] query: ListQuery) {
        assert!(matches!(list().get(query), Err(ListError::OutOfRange { .. })));
    }

    #[test]
    fn test_failed_commands_leave_history_untouched() {
        let mut list = list();
        list.append(vec![4]).unwrap();
        list.undo().unwrap();

        assert!(list.remove(2, 5).is_err());
        assert!(list.insert(4, vec![0]).is_err());
        assert_eq!(list.as_slice(), &[1, 2, 3]);
        assert!(list.can_redo());
    }

    #[test]
    fn test_new_command_clears_redo() {
        let mut list = list();
        list.remove(0, 1).unwrap();
        list.undo().unwrap();
        assert!(list.can_redo());

        list.insert(0, vec![0]).unwrap();
        assert!(!list.can_redo());
        assert_eq!(list.redo().unwrap(), None);
    }

    #[test]
    fn test_undo_to_exhaustion_then_redo_restores_state() {
        let mut list = list();
        list.append(vec![4]).unwrap();
        list.insert(0, vec![0, 0]).unwrap();
        list.replace(1, 3, vec![7, 8]).unwrap();
        list.remove(2, 1).unwrap();
        let final_state = list.as_slice().to_vec();

        while list.undo().unwrap().is_some() {}
        assert_eq!(list.as_slice(), &[1, 2, 3]);

        while list.redo().unwrap().is_some() {}
        assert_eq!(list.as_slice(), final_state.as_slice());
    }

    #[test]
    fn test_revert_keeps_in_place_changes_for_redo() {
        let mut list = list();
        list.insert(1, vec![10]).unwrap();
        list.elements_mut()[1] = 11;
        list.undo().unwrap();
        assert_eq!(list.as_slice(), &[1, 2, 3]);

        list.redo().unwrap();
        assert_eq!(list.as_slice(), &[1, 11, 2, 3]);
    }

    #[test]
    fn test_get_reads_without_history() {
        let list = list();
        assert_eq!(list.get(ListQuery::All).unwrap(), &[1, 2, 3]);
        assert_eq!(list.get(ListQuery::At(1)).unwrap(), &[2]);
        assert_eq!(
            list.get(ListQuery::Range { index: 1, count: 2 }).unwrap(),
            &[2, 3]
        );
        assert!(!list.can_undo());
    }
}
