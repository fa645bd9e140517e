//! Daemon settings – reads `/etc/dspd/dspd.toml`.
//!
//! Every field has a built-in default, so the file is optional.  `DSPD_*`
//! environment variables are applied on top by [`apply_env_overrides`].

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use dspd_resolver::{
    Resolver, DEFAULT_CONFIG_BASE_DIR, DEFAULT_MACHINE_NAME_PATH, DEFAULT_SEARCH_PATH_SUFFIX,
};
use dspd_supervisor::RestartPolicy;
use dspd_types::{DspDomain, ListenerLibrary};
use serde::Deserialize;

const DEFAULT_SETTINGS_PATH: &str = "/etc/dspd/dspd.toml";

/// Daemon settings read at start-up.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    /// Root of the fragment directory and of the per-machine DSP libraries.
    #[serde(default = "default_config_base_dir")]
    pub config_base_dir: String,

    /// Fragment directory.  Defaults to `<config_base_dir>/conf.d`.
    #[serde(default)]
    pub config_dir: Option<PathBuf>,

    /// One-line file holding the machine identity.
    #[serde(default = "default_machine_name_path")]
    pub machine_name_path: PathBuf,

    /// Appended after the per-machine library directory.
    #[serde(default = "default_search_path_suffix")]
    pub search_path_suffix: String,

    /// Pause between listener exits and the next load attempt.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Replaces the domain's stock listener names.
    #[serde(default)]
    pub listener: Option<ListenerLibrary>,
}

fn default_config_base_dir() -> String {
    DEFAULT_CONFIG_BASE_DIR.to_string()
}
fn default_machine_name_path() -> PathBuf {
    PathBuf::from(DEFAULT_MACHINE_NAME_PATH)
}
fn default_search_path_suffix() -> String {
    DEFAULT_SEARCH_PATH_SUFFIX.to_string()
}
fn default_backoff_ms() -> u64 {
    100
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            config_base_dir: default_config_base_dir(),
            config_dir: None,
            machine_name_path: default_machine_name_path(),
            search_path_suffix: default_search_path_suffix(),
            backoff_ms: default_backoff_ms(),
            listener: None,
        }
    }
}

impl Settings {
    /// Fragment resolver configured from these settings.
    pub fn resolver(&self) -> Resolver {
        let resolver = Resolver::new(self.config_base_dir.clone()).with_suffix(self.search_path_suffix.clone());
        match &self.config_dir {
            Some(dir) => resolver.with_config_dir(dir.clone()),
            None => resolver,
        }
    }

    pub fn policy(&self) -> RestartPolicy {
        RestartPolicy::with_backoff(Duration::from_millis(self.backoff_ms))
    }

    /// Listener names for `domain`, honouring the `[listener]` override.
    pub fn listener_for(&self, domain: DspDomain) -> ListenerLibrary {
        self.listener.clone().unwrap_or_else(|| domain.listener())
    }
}

/// Return the settings path: `$DSPD_SETTINGS` or `/etc/dspd/dspd.toml`.
pub fn settings_path() -> PathBuf {
    settings_path_from(std::env::var("DSPD_SETTINGS").ok())
}

pub(crate) fn settings_path_from(var: Option<String>) -> PathBuf {
    var.filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_SETTINGS_PATH))
}

/// Load settings from disk.  Returns `None` if the file does not exist.
pub fn load() -> Result<Option<Settings>, String> {
    load_from(&settings_path())
}

/// Load settings from a specific path, without environment overrides.
pub(crate) fn load_from(path: &Path) -> Result<Option<Settings>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings at {}: {}", path.display(), e))?;
    let settings: Settings =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse settings: {}", e))?;
    Ok(Some(settings))
}

/// Apply `DSPD_*` environment variable overrides to `settings`.
///
/// | Variable | Field |
/// |---|---|
/// | `DSPD_CONFIG_BASE_DIR` | `config_base_dir` |
/// | `DSPD_MACHINE_NAME_PATH` | `machine_name_path` |
/// | `DSPD_SEARCH_PATH_SUFFIX` | `search_path_suffix` |
/// | `DSPD_BACKOFF_MS` | `backoff_ms` |
/// | `DSPD_LISTENER_VERSIONED` + `DSPD_LISTENER_UNVERSIONED` | `listener` |
pub fn apply_env_overrides(settings: &mut Settings) {
    if let Ok(v) = std::env::var("DSPD_CONFIG_BASE_DIR") {
        settings.config_base_dir = v;
    }
    if let Ok(v) = std::env::var("DSPD_MACHINE_NAME_PATH") {
        settings.machine_name_path = PathBuf::from(v);
    }
    if let Ok(v) = std::env::var("DSPD_SEARCH_PATH_SUFFIX") {
        settings.search_path_suffix = v;
    }
    if let Ok(v) = std::env::var("DSPD_BACKOFF_MS")
        && let Ok(ms) = v.parse::<u64>() {
            settings.backoff_ms = ms;
        }
    if let (Ok(versioned), Ok(unversioned)) = (
        std::env::var("DSPD_LISTENER_VERSIONED"),
        std::env::var("DSPD_LISTENER_UNVERSIONED"),
    ) {
        settings.listener = Some(ListenerLibrary::new(versioned, unversioned));
    }
}
