use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use relative_path::{RelativePath, RelativePathBuf};

use crate::actions::{ActionId, ActionNode};
use crate::io::{IoError, read_file};
use crate::parsing::scan;

/// An action together with the file it was found in
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CatalogEntry<'a> {
    pub path: &'a RelativePath,
    pub node: &'a ActionNode,
}

/// Scanned actions of every auton file in a project.
///
/// Uses BTreeMap for automatic sorted ordering by path.
#[derive(Debug, Default)]
pub struct AutonCatalog {
    files: BTreeMap<RelativePathBuf, Vec<ActionNode>>,
}

impl AutonCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read and scan `files` (absolute, under `project_root`)
    pub fn load(project_root: &Path, files: &[PathBuf]) -> Result<Self, IoError> {
        let mut catalog = Self::new();
        for file in files {
            let relative = file
                .strip_prefix(project_root)
                .ok()
                .and_then(|stripped| RelativePathBuf::from_path(stripped).ok())
                .ok_or_else(|| IoError::OutsideProject(file.clone()))?;
            let text = read_file(&relative, project_root)?;
            catalog.set_file(relative, scan(&text));
        }
        log::debug!(
            "catalogued {} action(s) in {} file(s)",
            catalog.actions().count(),
            catalog.len()
        );
        Ok(catalog)
    }

    /// Replace everything known about a file, returning the previous actions
    pub fn set_file(
        &mut self,
        path: impl Into<RelativePathBuf>,
        nodes: Vec<ActionNode>,
    ) -> Option<Vec<ActionNode>> {
        self.files.insert(path.into(), nodes)
    }

    pub fn remove_file(&mut self, path: &RelativePath) -> Option<Vec<ActionNode>> {
        self.files.remove(path)
    }

    pub fn file_actions(&self, path: &RelativePath) -> Option<&[ActionNode]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn has_file(&self, path: &RelativePath) -> bool {
        self.files.contains_key(path)
    }

    /// Every action in path order, then source order
    pub fn actions(&self) -> impl Iterator<Item = CatalogEntry<'_>> {
        self.files.iter().flat_map(|(path, nodes)| {
            nodes.iter().map(move |node| CatalogEntry {
                path: path.as_relative_path(),
                node,
            })
        })
    }

    pub fn find_id(&self, id: ActionId) -> Option<CatalogEntry<'_>> {
        self.actions().find(|entry| entry.node.id == id)
    }

    pub fn files(&self) -> impl Iterator<Item = &RelativePath> {
        self.files.keys().map(RelativePathBuf::as_relative_path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }
}
