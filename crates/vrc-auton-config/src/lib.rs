use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Where auton routines live in a standard PROS project
pub const DEFAULT_AUTON_GLOB: &str = "src/autons/**/*.cpp";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file at {config_path}: {source}")]
    ConfigReadError {
        config_path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file at {config_path}: {source}")]
    ConfigParseError {
        config_path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Invalid auton file pattern {pattern}: {source}")]
    InvalidGlob {
        pattern: String,
        source: glob::PatternError,
    },
}

fn default_auton_glob() -> String {
    DEFAULT_AUTON_GLOB.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub project_path: PathBuf,
    /// Auton source files, relative to `project_path`
    #[serde(default = "default_auton_glob")]
    pub auton_glob: String,
}

impl Config {
    pub fn new(project_path: impl Into<PathBuf>) -> Self {
        Self {
            project_path: project_path.into(),
            auton_glob: default_auton_glob(),
        }
    }

    pub fn load_from_path<P: AsRef<Path>>(config_path: P) -> Result<Option<Self>, ConfigError> {
        let config_path = config_path.as_ref();
        if !config_path.exists() {
            return Ok(None);
        }

        let content = std::fs::read_to_string(config_path).map_err(|source| {
            ConfigError::ConfigReadError {
                config_path: config_path.to_path_buf(),
                source,
            }
        })?;

        let mut config: Config =
            toml::from_str(&content).map_err(|source| ConfigError::ConfigParseError {
                config_path: config_path.to_path_buf(),
                source,
            })?;

        config.project_path =
            Self::expand_path(&config.project_path).unwrap_or(config.project_path);

        Ok(Some(config))
    }

    pub fn load() -> Result<Option<Self>, ConfigError> {
        Self::load_from_path(Self::config_path())
    }

    pub fn save_to_path<P: AsRef<Path>>(&self, config_path: P) -> anyhow::Result<()> {
        let config_path = config_path.as_ref();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(config_path, toml::to_string_pretty(self)?)?;
        Ok(())
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.save_to_path(Self::config_path())
    }

    pub fn config_path() -> PathBuf {
        let config_dir = shellexpand::tilde("~/.config/vrc-auton");
        PathBuf::from(config_dir.as_ref()).join("config.toml")
    }

    /// Auton files matching `auton_glob` under the project, sorted
    pub fn auton_files(&self) -> Result<Vec<PathBuf>, ConfigError> {
        let pattern = self.project_path.join(&self.auton_glob);
        let pattern = pattern.to_string_lossy();
        let paths = glob::glob(&pattern).map_err(|source| ConfigError::InvalidGlob {
            pattern: pattern.to_string(),
            source,
        })?;

        // Unreadable directories are skipped rather than failing the listing
        let mut files: Vec<PathBuf> = paths
            .filter_map(Result::ok)
            .filter(|path| path.is_file())
            .collect();
        files.sort();
        Ok(files)
    }

    fn expand_path(path: &Path) -> Option<PathBuf> {
        let path_str = path.to_string_lossy();
        shellexpand::full(&path_str)
            .ok()
            .map(|expanded| PathBuf::from(expanded.as_ref()))
    }
}
