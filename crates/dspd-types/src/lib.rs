//! `dspd-types` – shared vocabulary for the DSP listener daemon.
//!
//! The resolver and the supervisor never depend on each other; they only
//! agree on the types defined here.  The binary wires a
//! [`ResolvedSearchPath`] produced by one into the configuration of the other.

use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Maximum length of a filesystem path accepted by the platform loader,
/// including the terminating NUL.
pub const PATH_MAX: usize = 4096;

/// Entry symbol exported by every default listener library.
pub const LISTENER_ENTRY_SYMBOL: &str = "adsp_default_listener_start";

// ────────────────────────────────────────────────────────────────────────────
// Machine identity
// ────────────────────────────────────────────────────────────────────────────

/// Opaque token identifying the current board, used as the lookup key into
/// configuration fragments.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MachineIdentity(String);

impl MachineIdentity {
    /// Build an identity from the raw contents of a one-line identity file.
    ///
    /// Only the first line is kept, without its `\n` terminator.  No other
    /// trimming is applied: comparisons are exact.
    pub fn from_line(raw: &str) -> Self {
        let line = raw.split('\n').next().unwrap_or_default();
        Self(line.to_string())
    }

    /// Read the identity from a one-line file such as `/sys/devices/soc0/machine`.
    ///
    /// Bytes that are not valid UTF-8 are replaced with U+FFFD rather than
    /// failing the read.
    pub fn read_from(path: impl AsRef<Path>) -> Result<Self, DspError> {
        let path = path.as_ref();
        let raw = std::fs::read(path).map_err(|source| DspError::MachineIdentity {
            path: path.display().to_string(),
            source,
        })?;
        Ok(Self::from_line(&String::from_utf8_lossy(&raw)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resolved search path
// ────────────────────────────────────────────────────────────────────────────

/// Library search path derived for the current machine.
///
/// An empty value means "no override" and callers must leave the component's
/// default search behaviour untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedSearchPath(String);

impl ResolvedSearchPath {
    /// The "no override" value.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Join `base_dir`, a `/` separator, `library_path` and `suffix`.
    ///
    /// The separator is always inserted, even when `base_dir` already ends in
    /// one.  Fails with [`DspError::PathTooLong`] when the result would not
    /// fit in [`PATH_MAX`].
    pub fn compose(base_dir: &str, library_path: &str, suffix: &str) -> Result<Self, DspError> {
        let len = base_dir.len() + 1 + library_path.len() + suffix.len();
        if len >= PATH_MAX {
            return Err(DspError::PathTooLong { len, max: PATH_MAX - 1 });
        }
        let mut out = String::with_capacity(len);
        out.push_str(base_dir);
        out.push('/');
        out.push_str(library_path);
        out.push_str(suffix);
        Ok(Self(out))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// `None` for the empty value, `Some(path)` otherwise.
    pub fn as_override(&self) -> Option<&str> {
        if self.0.is_empty() { None } else { Some(&self.0) }
    }
}

impl fmt::Display for ResolvedSearchPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Component status
// ────────────────────────────────────────────────────────────────────────────

/// Integer status returned by a listener's entry point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ComponentStatus(pub i32);

impl ComponentStatus {
    pub const SUCCESS: Self = Self(0);

    /// `AEE_ECONNREFUSED`: the DSP device node cannot be reached.  The only
    /// status that stops the restart loop.
    pub const CONNECTION_REFUSED: Self = Self(0x72);

    pub fn code(self) -> i32 {
        self.0
    }
}

impl fmt::Display for ComponentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

// ────────────────────────────────────────────────────────────────────────────
// DSP domains
// ────────────────────────────────────────────────────────────────────────────

/// The pair of file names tried when loading a listener: the
/// version-qualified soname first, then the bare development name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerLibrary {
    pub versioned: String,
    pub unversioned: String,
}

impl ListenerLibrary {
    pub fn new(versioned: impl Into<String>, unversioned: impl Into<String>) -> Self {
        Self {
            versioned: versioned.into(),
            unversioned: unversioned.into(),
        }
    }
}

/// DSP subsystem a daemon build is dedicated to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DspDomain {
    Adsp,
    Cdsp,
    Sdsp,
    Gdsp,
}

impl DspDomain {
    /// Upper-case name used in diagnostics, e.g. `"CDSP"`.
    pub fn name(self) -> &'static str {
        match self {
            DspDomain::Adsp => "ADSP",
            DspDomain::Cdsp => "CDSP",
            DspDomain::Sdsp => "SDSP",
            DspDomain::Gdsp => "GDSP",
        }
    }

    /// Default listener library names for this domain.
    ///
    /// GDSP has no listener of its own and reuses the CDSP one.
    pub fn listener(self) -> ListenerLibrary {
        match self {
            DspDomain::Adsp => {
                ListenerLibrary::new("libadsp_default_listener.so.1", "libadsp_default_listener.so")
            }
            DspDomain::Sdsp => {
                ListenerLibrary::new("libsdsp_default_listener.so.1", "libsdsp_default_listener.so")
            }
            DspDomain::Cdsp | DspDomain::Gdsp => {
                ListenerLibrary::new("libcdsp_default_listener.so.1", "libcdsp_default_listener.so")
            }
        }
    }
}

impl fmt::Display for DspDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Errors
// ────────────────────────────────────────────────────────────────────────────

/// Error type shared by the resolver and the supervisor.
///
/// None of these are fatal to the daemon: each is consumed locally and turned
/// into a diagnostic or a restart.
#[derive(Error, Debug)]
pub enum DspError {
    #[error("failed to read machine identity from {path}: {source}")]
    MachineIdentity {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("resolved search path is {len} bytes, limit is {max}")]
    PathTooLong { len: usize, max: usize },

    #[error("failed to load {versioned} or {unversioned}: {details}")]
    LoadFailed {
        versioned: String,
        unversioned: String,
        details: String,
    },

    #[error("failed to load {library}: {details}")]
    Open { library: String, details: String },

    #[error("symbol {symbol} not found in {library}")]
    SymbolNotFound { library: String, symbol: String },

    #[error("failed to unload {library}: {details}")]
    UnloadFailed { library: String, details: String },

    #[error("argument {index} contains an interior NUL byte")]
    InvalidArgument { index: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_strips_trailing_newline() {
        assert_eq!(MachineIdentity::from_line("abc\n"), MachineIdentity::from_line("abc"));
        assert_eq!(MachineIdentity::from_line("abc\r\n").as_str(), "abc\r");
    }

    #[test]
    fn identity_keeps_only_first_line() {
        assert_eq!(MachineIdentity::from_line("qcs6490\nrev2\n").as_str(), "qcs6490");
    }

    #[test]
    fn identity_does_not_trim_spaces() {
        assert_eq!(MachineIdentity::from_line(" abc \n").as_str(), " abc ");
    }

    #[test]
    fn identity_read_from_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("machine");
        std::fs::write(&path, "qcom-board\n").expect("write");
        let id = MachineIdentity::read_from(&path).expect("read");
        assert_eq!(id.as_str(), "qcom-board");
    }

    #[test]
    fn identity_read_from_non_utf8_file() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("machine");
        std::fs::write(&path, b"board\xff-2\n").expect("write");
        let id = MachineIdentity::read_from(&path).expect("read");
        assert_eq!(id.as_str(), "board\u{fffd}-2");
    }

    #[test]
    fn identity_read_from_missing_file_fails() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let err = MachineIdentity::read_from(dir.path().join("absent")).unwrap_err();
        assert!(matches!(err, DspError::MachineIdentity { .. }));
    }

    #[test]
    fn compose_always_inserts_separator() {
        let p = ResolvedSearchPath::compose("/usr/share/qcom/", "dsp/cdsp", "").unwrap();
        assert_eq!(p.as_str(), "/usr/share/qcom//dsp/cdsp");

        let p = ResolvedSearchPath::compose("/usr/share/qcom", "dsp/cdsp", ";/vendor/dsp").unwrap();
        assert_eq!(p.as_str(), "/usr/share/qcom/dsp/cdsp;/vendor/dsp");
    }

    #[test]
    fn compose_rejects_overlong_path() {
        let long = "x".repeat(PATH_MAX);
        let err = ResolvedSearchPath::compose("/base", &long, "").unwrap_err();
        assert!(matches!(err, DspError::PathTooLong { .. }));
    }

    #[test]
    fn empty_path_is_no_override() {
        assert_eq!(ResolvedSearchPath::empty().as_override(), None);
        let p = ResolvedSearchPath::compose("/b", "p", "").unwrap();
        assert_eq!(p.as_override(), Some("/b/p"));
    }

    #[test]
    fn gdsp_reuses_cdsp_listener() {
        assert_eq!(DspDomain::Gdsp.listener(), DspDomain::Cdsp.listener());
        assert_eq!(DspDomain::Sdsp.listener().versioned, "libsdsp_default_listener.so.1");
    }

    #[test]
    fn domain_deserializes_lowercase() {
        #[derive(Deserialize)]
        struct Wrapper {
            domain: DspDomain,
        }
        let w: Wrapper = toml::from_str("domain = \"cdsp\"").unwrap();
        assert_eq!(w.domain, DspDomain::Cdsp);
    }

    #[test]
    fn status_display_is_hex() {
        assert_eq!(ComponentStatus::CONNECTION_REFUSED.to_string(), "0x72");
    }

    #[test]
    fn error_display_names_library() {
        let err = DspError::SymbolNotFound {
            library: "libcdsp_default_listener.so.1".to_string(),
            symbol: LISTENER_ENTRY_SYMBOL.to_string(),
        };
        assert!(err.to_string().contains("libcdsp_default_listener.so.1"));
    }
}
