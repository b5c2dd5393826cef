//! Per-user configuration: named projects, each saying where its index
//! lives and whether queries go to a leap server.
//!
//! Stored as JSON at `~/.leaprc`. Older flat configuration files are
//! migrated to a single `default` project when loaded.

use crate::error::{LeapError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const CONFIG_FILE: &str = ".leaprc";
const DEFAULT_INDEX_FILE: &str = ".leapindex";
const DEFAULT_PROJECT: &str = "default";
const CONFIG_VERSION: u32 = 1;

/// Environment variable overriding the default index location
pub const INDEX_ENV: &str = "LEAP_INDEX";

/// One searchable tree
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Project {
    /// Server address, `host` or `host:port`
    pub host: String,
    /// Index file on this machine. Empty means the default location.
    pub indexpath: String,
    /// Send queries to `host` instead of searching locally
    pub remote: bool,
    /// Leading paths trimmed for display and name matching
    #[serde(deserialize_with = "null_as_empty")]
    pub prefixes: Vec<String>,
    /// Index file on the server, for sync and remote content search
    pub remotepath: String,
    /// Project name on the server
    pub remoteproject: String,
}

impl Project {
    pub fn index_path(&self) -> PathBuf {
        if self.indexpath.is_empty() {
            default_index_path()
        } else {
            PathBuf::from(&self.indexpath)
        }
    }

    /// Configured prefixes, or `None` to use the index's own roots
    pub fn prefixes(&self) -> Option<Vec<String>> {
        if self.prefixes.is_empty() {
            None
        } else {
            Some(self.prefixes.clone())
        }
    }

    /// The server's index file; the local path when none is configured
    pub fn remote_index_path(&self) -> String {
        if self.remotepath.is_empty() {
            self.index_path().to_string_lossy().into_owned()
        } else {
            self.remotepath.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfiguration {
    pub version: u32,
    pub currentproject: String,
    pub projects: BTreeMap<String, Project>,
}

/// The flat single-project format that predates projects
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "PascalCase")]
struct LegacyConfiguration {
    hostname: String,
    indexpath: String,
    connect: bool,
    prefixes: Option<Vec<String>>,
}

impl From<LegacyConfiguration> for GlobalConfiguration {
    fn from(old: LegacyConfiguration) -> Self {
        let project = Project {
            host: old.hostname,
            indexpath: old.indexpath,
            remote: old.connect,
            prefixes: old.prefixes.unwrap_or_default(),
            ..Project::default()
        };
        Self::with_project(DEFAULT_PROJECT, project)
    }
}

impl Default for GlobalConfiguration {
    fn default() -> Self {
        Self::with_project(DEFAULT_PROJECT, Project::default())
    }
}

impl GlobalConfiguration {
    fn with_project(name: &str, project: Project) -> Self {
        Self {
            version: CONFIG_VERSION,
            currentproject: name.to_string(),
            projects: BTreeMap::from([(name.to_string(), project)]),
        }
    }

    /// Load from `path`. A missing file gives the default configuration.
    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => return Err(config_error(path, e)),
        };
        Self::parse(&content).map_err(|e| config_error(path, e))
    }

    fn parse(content: &str) -> std::result::Result<Self, String> {
        match serde_json::from_str::<Self>(content) {
            Ok(config) if config.version == CONFIG_VERSION => Ok(config),
            Ok(config) => Err(format!("unsupported configuration version {}", config.version)),
            Err(new_err) => match serde_json::from_str::<LegacyConfiguration>(content) {
                Ok(legacy) => {
                    log::info!("migrating legacy configuration to project {:?}", DEFAULT_PROJECT);
                    Ok(legacy.into())
                }
                Err(_) => Err(new_err.to_string()),
            },
        }
    }

    /// Write to `path`, replacing it only once the new content is complete
    pub fn save(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(|e| config_error(path, e))?;
        let mut temp = path.as_os_str().to_os_string();
        temp.push(".tmp");
        let temp = PathBuf::from(temp);
        fs::write(&temp, json + "\n").map_err(|e| config_error(&temp, e))?;
        fs::rename(&temp, path).map_err(|e| config_error(path, e))
    }

    pub fn current(&self) -> Result<&Project> {
        self.projects
            .get(&self.currentproject)
            .ok_or_else(|| LeapError::Config(format!("no project named {:?}", self.currentproject)))
    }

    pub fn current_mut(&mut self) -> Result<&mut Project> {
        let name = self.currentproject.clone();
        self.projects
            .get_mut(&name)
            .ok_or_else(|| LeapError::Config(format!("no project named {:?}", name)))
    }

    /// Make `name` current, creating an empty project if there is none
    pub fn switch_project(&mut self, name: &str) {
        self.projects.entry(name.to_string()).or_default();
        self.currentproject = name.to_string();
    }

    pub fn project_names(&self) -> impl Iterator<Item = &str> {
        self.projects.keys().map(String::as_str)
    }
}

fn null_as_empty<'de, D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Vec<String>, D::Error> {
    Ok(Option::<Vec<String>>::deserialize(d)?.unwrap_or_default())
}

fn config_error(path: &Path, err: impl std::fmt::Display) -> LeapError {
    LeapError::Config(format!("{}: {}", path.display(), err))
}

/// `~/.leaprc`
pub fn config_path() -> Result<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(CONFIG_FILE))
        .ok_or_else(|| LeapError::Config("can't find the home directory".to_string()))
}

/// [`INDEX_ENV`] if set, else `~/.leapindex`
pub fn default_index_path() -> PathBuf {
    if let Some(path) = std::env::var_os(INDEX_ENV)
        && !path.is_empty()
    {
        return PathBuf::from(path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_INDEX_FILE)
}

/// Where log files go
pub fn log_dir() -> Result<PathBuf> {
    let dir = if cfg!(target_os = "macos") {
        dirs::home_dir().map(|home| home.join("Library").join("Logs").join("leap"))
    } else {
        dirs::data_local_dir().map(|data| data.join("leap").join("logs"))
    };
    dir.ok_or_else(|| LeapError::Config("can't find a directory for logs".to_string()))
}
