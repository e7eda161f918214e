//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. `KQM_ROOT_FOLDER` environment variable
//! 3. `root_folder` key of the TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "KQM_ROOT_FOLDER";

/// Database file created inside the root folder unless configured otherwise
pub const DEFAULT_DATABASE_FILE: &str = "kqm.db";

/// Largest number of ids bound into one DELETE statement.
/// SQLite's historical SQLITE_MAX_VARIABLE_NUMBER.
pub const DEFAULT_REMOVE_BATCH_SIZE: usize = 999;

/// Contents of `config.toml`. Every field is optional; missing fields take defaults.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub database_file: Option<String>,
    pub logging: LoggingConfig,
    pub library: LibraryConfig,
    pub workers: WorkersConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive used when RUST_LOG is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LibraryConfig {
    pub remove_batch_size: usize,
}

impl Default for LibraryConfig {
    fn default() -> Self {
        Self {
            remove_batch_size: DEFAULT_REMOVE_BATCH_SIZE,
        }
    }
}

/// How to launch each worker process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub server: WorkerCommand,
    pub scanner: WorkerCommand,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            server: WorkerCommand::named("kqm-server"),
            scanner: WorkerCommand::named("kqm-scanner"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerCommand {
    /// Executable path; a bare name is looked up next to the supervisor, then on PATH
    pub program: PathBuf,
    pub args: Vec<String>,
}

impl WorkerCommand {
    pub fn named(program: &str) -> Self {
        Self {
            program: PathBuf::from(program),
            args: Vec::new(),
        }
    }
}

impl TomlConfig {
    /// Database file name, falling back to [`DEFAULT_DATABASE_FILE`]
    pub fn database_file(&self) -> &str {
        self.database_file
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(DEFAULT_DATABASE_FILE)
    }
}

/// Platform defaults compiled into the binary
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/kqm (or /var/lib/kqm for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("kqm"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/kqm"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("kqm"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/kqm"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("kqm"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\kqm"))
    } else {
        PathBuf::from("./kqm_data")
    }
}

/// Default configuration file path for the platform (`<config dir>/kqm/config.toml`)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("kqm").join("config.toml"))
}

/// Load a TOML config file.
///
/// A missing file is not an error: a warning is logged and defaults are
/// returned. A file that exists but cannot be read or parsed is an error.
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    if !path.exists() {
        warn!("Config file not found: {} (using defaults)", path.display());
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    debug!("Loaded config file: {}", path.display());
    Ok(config)
}

/// Resolves the root folder following the priority order in the module docs
#[derive(Debug, Clone, Default)]
pub struct RootFolderResolver {
    cli_arg: Option<PathBuf>,
    config_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cli_arg(mut self, path: Option<PathBuf>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config(mut self, config: &TomlConfig) -> Self {
        self.config_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.config_root {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder and locates the database inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    /// Create the root folder (and parents) if missing. Idempotent.
    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        Ok(())
    }

    pub fn database_path(&self, database_file: &str) -> PathBuf {
        self.root_folder.join(database_file)
    }
}
