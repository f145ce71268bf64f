//! Engine configuration
//!
//! Resolution order: built-in defaults, then a TOML file (explicit path or
//! `STEMVAULT_CONFIG`), then `STEMVAULT_*` environment overrides.
//!
//! ```toml
//! repositories_root = "/srv/stemvault/repositories"
//! collaboration_root = "/srv/stemvault/collaborations"
//! log_profile = "production"
//!
//! [parser]
//! command = "python3"
//! args = ["parse_project.py"]
//! timeout_secs = 120
//!
//! [archive]
//! timeout_secs = 60
//! output_dir = "/srv/stemvault/archives"
//! ```

#![allow(clippy::result_large_err)]

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use stemvault_core::errors::{ExError, ExErrorKind, Result};

pub const ENV_CONFIG_PATH: &str = "STEMVAULT_CONFIG";
pub const ENV_REPOSITORIES_ROOT: &str = "STEMVAULT_REPOSITORIES_ROOT";
pub const ENV_COLLABORATION_ROOT: &str = "STEMVAULT_COLLABORATION_ROOT";
pub const ENV_PARSER_COMMAND: &str = "STEMVAULT_PARSER_COMMAND";
pub const ENV_PARSER_TIMEOUT_SECS: &str = "STEMVAULT_PARSER_TIMEOUT_SECS";

/// Root engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Parent of every project working tree (`<root>/<project-id>`)
    #[serde(default = "default_repositories_root")]
    pub repositories_root: PathBuf,

    /// Parent of every collaboration proposal directory
    #[serde(default = "default_collaboration_root")]
    pub collaboration_root: PathBuf,

    #[serde(default)]
    pub parser: ParserConfig,

    #[serde(default)]
    pub archive: ArchiveConfig,

    /// `development`, `production` or `test`
    #[serde(default = "default_log_profile")]
    pub log_profile: String,
}

fn default_repositories_root() -> PathBuf {
    PathBuf::from("repositories")
}

fn default_collaboration_root() -> PathBuf {
    PathBuf::from("collaborations")
}

fn default_log_profile() -> String {
    "development".to_string()
}

/// External project parser.
///
/// Invoked as `<command> <args...> <input-dir> <output-dir>`; it must write
/// `ableton_project.json` into the output directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParserConfig {
    #[serde(default = "default_parser_command")]
    pub command: String,

    #[serde(default)]
    pub args: Vec<String>,

    #[serde(default = "default_parser_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_parser_command() -> String {
    "stemvault-parse".to_string()
}

fn default_parser_timeout_secs() -> u64 {
    120
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            command: default_parser_command(),
            args: Vec::new(),
            timeout_secs: default_parser_timeout_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveConfig {
    #[serde(default = "default_archive_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default = "default_archive_output_dir")]
    pub output_dir: PathBuf,
}

fn default_archive_timeout_secs() -> u64 {
    60
}

fn default_archive_output_dir() -> PathBuf {
    PathBuf::from("archives")
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_archive_timeout_secs(),
            output_dir: default_archive_output_dir(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            repositories_root: default_repositories_root(),
            collaboration_root: default_collaboration_root(),
            parser: ParserConfig::default(),
            archive: ArchiveConfig::default(),
            log_profile: default_log_profile(),
        }
    }
}

fn config_error(message: impl Into<String>) -> ExError {
    ExError::new(ExErrorKind::Config)
        .with_op("load_config")
        .with_message(message)
}

impl EngineConfig {
    /// Load from `path` (or `STEMVAULT_CONFIG`) and the process environment.
    ///
    /// A missing file is only an error when it was named explicitly.
    ///
    /// # Errors
    ///
    /// `Config` for an unreadable file, invalid TOML, or invalid values.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_with_env(path, |key| std::env::var(key).ok())
    }

    /// [`EngineConfig::load`] with an injectable environment lookup
    pub fn load_with_env<F>(path: Option<&Path>, env: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let explicit = path
            .map(Path::to_path_buf)
            .or_else(|| env(ENV_CONFIG_PATH).map(PathBuf::from));

        let mut config = match explicit {
            Some(path) => Self::load_from_path(&path)?,
            None => Self::default(),
        };
        config.apply_env(env)?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse one TOML file, without environment overrides
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            config_error(format!("failed to read config at {}: {}", path.display(), e))
        })?;
        let config = Self::parse(&contents)?;
        tracing::debug!(path = %path.display(), "Loaded engine config");
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(contents).map_err(|e| config_error(format!("invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env<F>(&mut self, env: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(root) = env(ENV_REPOSITORIES_ROOT) {
            self.repositories_root = PathBuf::from(root);
        }
        if let Some(root) = env(ENV_COLLABORATION_ROOT) {
            self.collaboration_root = PathBuf::from(root);
        }
        if let Some(command) = env(ENV_PARSER_COMMAND) {
            self.parser.command = command;
        }
        if let Some(raw) = env(ENV_PARSER_TIMEOUT_SECS) {
            self.parser.timeout_secs = raw.trim().parse().map_err(|_| {
                config_error(format!(
                    "{} must be a whole number, got {:?}",
                    ENV_PARSER_TIMEOUT_SECS, raw
                ))
            })?;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.parser.timeout_secs == 0 {
            return Err(config_error("parser.timeout_secs must be greater than zero"));
        }
        if self.archive.timeout_secs == 0 {
            return Err(config_error("archive.timeout_secs must be greater than zero"));
        }
        if self.parser.command.trim().is_empty() {
            return Err(config_error("parser.command must not be empty"));
        }
        if self.log_profile.parse::<stemvault_core::logging_facility::Profile>().is_err() {
            return Err(config_error(format!("unknown log_profile {:?}", self.log_profile)));
        }
        Ok(())
    }
}
