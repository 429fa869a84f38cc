use relative_path::RelativePath;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IoError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid project directory: {0}")]
    InvalidProjectDir(String),
    #[error("Path is outside the project: {0}")]
    OutsideProject(PathBuf),
}

/// Read a source file relative to the project root
pub fn read_file(relative_path: &RelativePath, project_root: &Path) -> Result<String, IoError> {
    let absolute_path = relative_path.to_path(project_root);
    if !absolute_path.exists() {
        return Err(IoError::NotFound(absolute_path));
    }
    Ok(fs::read_to_string(&absolute_path)?)
}

/// Write a source file relative to the project root
pub fn write_file(
    relative_path: &RelativePath,
    project_root: &Path,
    content: &str,
) -> Result<(), IoError> {
    let absolute_path = relative_path.to_path(project_root);
    if let Some(parent) = absolute_path.parent() {
        fs::create_dir_all(parent)?;
    }
    log::debug!("writing {} bytes to {}", content.len(), absolute_path.display());
    Ok(fs::write(&absolute_path, content)?)
}

pub fn validate_project_dir(path: &Path) -> Result<(), IoError> {
    if !path.is_dir() {
        return Err(IoError::InvalidProjectDir(
            "Directory does not exist".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{create_test_file, create_test_project_dir};

    #[test]
    fn test_validate_project_dir() {
        let project = create_test_project_dir();
        assert!(validate_project_dir(project.path()).is_ok());

        let file = create_test_file(&project, "main.cpp", "");
        assert!(matches!(
            validate_project_dir(&file),
            Err(IoError::InvalidProjectDir(_))
        ));
    }

    #[test]
    fn test_read_missing_file() {
        let project = create_test_project_dir();
        let result = read_file(RelativePath::new("nope.cpp"), project.path());
        assert!(matches!(result, Err(IoError::NotFound(_))));
    }

    #[test]
    fn test_write_creates_parents_and_round_trips() {
        let project = create_test_project_dir();
        let relative = RelativePath::new("src/autons/new.cpp");
        let content = "auton::setPose(0, 0, 0);\nauton::intake();\n";

        write_file(relative, project.path(), content).unwrap();
        assert_eq!(read_file(relative, project.path()).unwrap(), content);
        assert!(project.path().join("src/autons").is_dir());
    }
}
