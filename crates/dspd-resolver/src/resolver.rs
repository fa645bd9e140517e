//! [`Resolver`] – last-writer-wins merge of configuration fragments.
//!
//! The resolver runs once at daemon start-up, before the supervisor loop.  It
//! is read-only with respect to the filesystem and never fails: every problem
//! degrades to "skip this fragment" or, at worst, an empty
//! [`ResolvedSearchPath`] meaning "no override".
//!
//! # Example
//!
//! ```no_run
//! use dspd_resolver::Resolver;
//!
//! let search_path = Resolver::new("/usr/share/qcom")
//!     .configure_dsp_paths("/sys/devices/soc0/machine");
//! if let Some(path) = search_path.as_override() {
//!     println!("DSP libraries under {path}");
//! }
//! ```

use std::path::{Path, PathBuf};

use dspd_types::{MachineIdentity, ResolvedSearchPath};
use tracing::{debug, info, warn};

use crate::fragment::{self, FragmentLookup};

/// Directory under which the fragment directory and DSP libraries live.
pub const DEFAULT_CONFIG_BASE_DIR: &str = "/usr/share/qcom";

/// Fragment directory, relative to the config base directory.
pub const CONFIG_SUBDIR: &str = "conf.d";

/// File holding the machine identity of the running board.
pub const DEFAULT_MACHINE_NAME_PATH: &str = "/sys/devices/soc0/machine";

/// Appended verbatim after the per-machine library directory.  Empty by
/// default: search paths come from the fragments.
pub const DEFAULT_SEARCH_PATH_SUFFIX: &str = "";

/// Resolve the DSP library search path for `machine`.
///
/// Scans `config_dir` for fragments and joins the winning `DSP_LIBRARY_PATH`
/// onto `base_dir` with [`DEFAULT_SEARCH_PATH_SUFFIX`].
pub fn resolve(machine: &MachineIdentity, config_dir: &Path, base_dir: &str) -> ResolvedSearchPath {
    Resolver::new(base_dir).with_config_dir(config_dir).resolve(machine)
}

/// Resolves per-machine DSP library search paths from a fragment directory.
#[derive(Debug, Clone)]
pub struct Resolver {
    base_dir: String,
    config_dir: PathBuf,
    suffix: String,
}

impl Default for Resolver {
    fn default() -> Self {
        Self::new(DEFAULT_CONFIG_BASE_DIR)
    }
}

impl Resolver {
    /// Create a resolver rooted at `base_dir`, reading fragments from
    /// `<base_dir>/conf.d`.
    pub fn new(base_dir: impl Into<String>) -> Self {
        let base_dir = base_dir.into();
        let config_dir = Path::new(&base_dir).join(CONFIG_SUBDIR);
        Self {
            base_dir,
            config_dir,
            suffix: DEFAULT_SEARCH_PATH_SUFFIX.to_string(),
        }
    }

    /// Read fragments from `config_dir` instead of `<base_dir>/conf.d`.
    pub fn with_config_dir(mut self, config_dir: impl Into<PathBuf>) -> Self {
        self.config_dir = config_dir.into();
        self
    }

    /// Append `suffix` to every resolved path.
    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn config_dir(&self) -> &Path {
        &self.config_dir
    }

    /// Resolve the search path for `machine`.
    ///
    /// Every fragment is consulted in merge order; the value from the last
    /// fragment that defines the key wins.  Returns an empty path when no
    /// fragment supplies a non-empty value.
    pub fn resolve(&self, machine: &MachineIdentity) -> ResolvedSearchPath {
        let mut library_path: Option<String> = None;

        for path in fragment::discover(&self.config_dir) {
            match fragment::lookup_library_path(&path, machine) {
                FragmentLookup::Found(value) => {
                    debug!(file = %path.display(), %machine, value = %value, "fragment sets DSP_LIBRARY_PATH");
                    library_path = Some(value);
                }
                FragmentLookup::MachineAbsent | FragmentLookup::KeyAbsent => {
                    debug!(file = %path.display(), %machine, "DSP_LIBRARY_PATH not found in fragment");
                }
                FragmentLookup::Unreadable | FragmentLookup::Malformed => {}
            }
        }

        let Some(library_path) = library_path.filter(|p| !p.is_empty()) else {
            warn!(%machine, dir = %self.config_dir.display(), "no DSP library path found for machine in any configuration file");
            return ResolvedSearchPath::empty();
        };

        match ResolvedSearchPath::compose(&self.base_dir, &library_path, &self.suffix) {
            Ok(resolved) => {
                info!(%machine, path = %resolved, "resolved DSP library search path");
                resolved
            }
            Err(e) => {
                warn!(%machine, error = %e, "discarding DSP library search path");
                ResolvedSearchPath::empty()
            }
        }
    }

    /// Read the machine identity from `identity_path`, then [`resolve`][Self::resolve].
    ///
    /// A missing or unreadable identity file yields an empty path.
    pub fn configure_dsp_paths(&self, identity_path: impl AsRef<Path>) -> ResolvedSearchPath {
        match MachineIdentity::read_from(identity_path) {
            Ok(machine) => self.resolve(&machine),
            Err(e) => {
                warn!(error = %e, "machine identity unavailable, keeping default search paths");
                ResolvedSearchPath::empty()
            }
        }
    }
}
