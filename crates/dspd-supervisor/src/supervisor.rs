//! [`Supervisor`] – the listener restart loop.
//!
//! ```text
//!            load ok                 entry point returned / missing
//!  Loading ───────────▶ Running ───────────────────────────────┐
//!     ▲  │ both names fail                                      ▼
//!     │  └──────────────────────────────────────────────▶ (decide)
//!     │                                                   │      │
//!     │            sleep(backoff)                 restart │      │ terminal status
//!     └──────────────────────────── Backoff ◀─────────────┘      ▼
//!                                                            Terminated
//! ```
//!
//! The component handle lives only inside the `Running` stage and is dropped
//! (unloaded) before the decision is taken, so no library stays mapped across
//! iterations.
//!
//! Everything is synchronous: the entry point blocks the calling thread for
//! as long as the listener runs, and there is no timeout.

use std::ffi::OsStr;
use std::thread;

use dspd_types::{
    ComponentStatus, DspDomain, ListenerLibrary, ResolvedSearchPath, LISTENER_ENTRY_SYMBOL,
};
use tracing::{debug, error, info, warn};

use crate::component::{ComponentArgs, ComponentHandle, ComponentLoader};
use crate::policy::{Decision, RestartPolicy};

/// Environment variable through which listeners pick up the DSP library
/// search path.
pub const SEARCH_PATH_ENV: &str = "ADSP_LIBRARY_PATH";

// ────────────────────────────────────────────────────────────────────────────
// Configuration
// ────────────────────────────────────────────────────────────────────────────

/// Everything the supervisor needs to know about the listener it keeps alive.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    pub domain: DspDomain,
    pub library: ListenerLibrary,
    pub entry_symbol: String,
    pub policy: RestartPolicy,
    /// Exported as [`SEARCH_PATH_ENV`] before the first load unless empty or
    /// already set by the operator.
    pub search_path: ResolvedSearchPath,
}

impl SupervisorConfig {
    /// Stock listener names, entry symbol and restart policy for `domain`.
    pub fn for_domain(domain: DspDomain) -> Self {
        Self {
            domain,
            library: domain.listener(),
            entry_symbol: LISTENER_ENTRY_SYMBOL.to_string(),
            policy: RestartPolicy::default(),
            search_path: ResolvedSearchPath::empty(),
        }
    }

    pub fn with_library(mut self, library: ListenerLibrary) -> Self {
        self.library = library;
        self
    }

    pub fn with_policy(mut self, policy: RestartPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_search_path(mut self, search_path: ResolvedSearchPath) -> Self {
        self.search_path = search_path;
        self
    }
}

// ────────────────────────────────────────────────────────────────────────────
// State
// ────────────────────────────────────────────────────────────────────────────

/// Observable supervisor state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    Loading,
    Running,
    Backoff,
    Terminated,
}

enum Stage<H> {
    Loading,
    Running(H),
    Backoff,
    Terminated,
}

// ────────────────────────────────────────────────────────────────────────────
// Supervisor
// ────────────────────────────────────────────────────────────────────────────

/// Load → invoke → unload restart loop around one listener library.
pub struct Supervisor<L: ComponentLoader> {
    loader: L,
    config: SupervisorConfig,
    args: ComponentArgs,
    stage: Stage<ComponentHandle<L::Component>>,
    last_status: Option<ComponentStatus>,
    restarts: u64,
}

impl<L: ComponentLoader> Supervisor<L> {
    /// Create a supervisor in the `Loading` state.  `args` is forwarded to
    /// every invocation of the entry point.
    pub fn new(loader: L, config: SupervisorConfig, args: ComponentArgs) -> Self {
        Self {
            loader,
            config,
            args,
            stage: Stage::Loading,
            last_status: None,
            restarts: 0,
        }
    }

    pub fn state(&self) -> SupervisorState {
        match self.stage {
            Stage::Loading => SupervisorState::Loading,
            Stage::Running(_) => SupervisorState::Running,
            Stage::Backoff => SupervisorState::Backoff,
            Stage::Terminated => SupervisorState::Terminated,
        }
    }

    /// Status returned by the most recent invocation, if any.
    pub fn last_status(&self) -> Option<ComponentStatus> {
        self.last_status
    }

    /// Number of completed backoff periods.
    pub fn restarts(&self) -> u64 {
        self.restarts
    }

    /// Status the process should exit with: the last status, or zero when no
    /// invocation ever returned.
    pub fn exit_status(&self) -> ComponentStatus {
        self.last_status.unwrap_or(ComponentStatus::SUCCESS)
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    /// Perform one state transition and return the new state.
    ///
    /// Stepping a terminated supervisor is a no-op.
    pub fn step(&mut self) -> SupervisorState {
        let domain = self.config.domain;
        let stage = std::mem::replace(&mut self.stage, Stage::Terminated);
        self.stage = match stage {
            Stage::Loading => match ComponentHandle::load(&mut self.loader, &self.config.library) {
                Ok(handle) => {
                    debug!(%domain, library = %handle.loaded_name(), "listener loaded");
                    Stage::Running(handle)
                }
                Err(e) => {
                    error!(%domain, error = %e, "daemon error");
                    self.decide(None)
                }
            },
            Stage::Running(mut handle) => {
                let status = match handle.invoke(&self.config.entry_symbol, &self.args) {
                    Ok(status) => {
                        debug!(%domain, library = %handle.loaded_name(), %status, "listener returned");
                        self.last_status = Some(status);
                        Some(status)
                    }
                    Err(e) => {
                        warn!(%domain, error = %e, "listener entry point unavailable");
                        None
                    }
                };
                drop(handle);
                self.decide(status)
            }
            Stage::Backoff => {
                thread::sleep(self.config.policy.backoff());
                self.restarts += 1;
                Stage::Loading
            }
            Stage::Terminated => Stage::Terminated,
        };
        self.state()
    }

    fn decide(&self, status: Option<ComponentStatus>) -> Stage<ComponentHandle<L::Component>> {
        let domain = self.config.domain;
        match self.config.policy.decide(status) {
            Decision::Terminate(status) => {
                error!(%domain, %status, "fastRPC device is not accessible, daemon exiting");
                Stage::Terminated
            }
            Decision::Restart => {
                warn!(
                    %domain,
                    backoff_ms = self.config.policy.backoff().as_millis() as u64,
                    "daemon will restart"
                );
                Stage::Backoff
            }
        }
    }

    /// Supervise until the terminal status is seen and return the exit status.
    ///
    /// Exports the resolved search path first.  Under normal operation this
    /// never returns.
    pub fn run(&mut self) -> ComponentStatus {
        self.export_search_path();
        info!(domain = %self.config.domain, "daemon starting");
        while self.step() != SupervisorState::Terminated {}
        let status = self.exit_status();
        info!(domain = %self.config.domain, %status, "daemon exiting");
        status
    }

    /// Like [`run`][Self::run] but gives up after `max_steps` transitions.
    ///
    /// Returns `Some(exit status)` if the supervisor terminated within the
    /// bound.  Does not touch the environment.
    pub fn run_for(&mut self, max_steps: usize) -> Option<ComponentStatus> {
        for _ in 0..max_steps {
            if self.step() == SupervisorState::Terminated {
                return Some(self.exit_status());
            }
        }
        None
    }

    fn export_search_path(&self) {
        let existing = std::env::var_os(SEARCH_PATH_ENV);
        match search_path_export(existing.as_deref(), &self.config.search_path) {
            Some(path) => {
                // SAFETY: called once before the first listener is loaded; the
                // daemon has no other threads.
                unsafe { std::env::set_var(SEARCH_PATH_ENV, path) };
                info!(var = SEARCH_PATH_ENV, %path, "exported DSP library search path");
            }
            None if existing.is_some() => {
                debug!(var = SEARCH_PATH_ENV, "keeping search path from the environment");
            }
            None => {}
        }
    }
}

// An operator-provided value always wins over the resolved one.
fn search_path_export<'a>(existing: Option<&OsStr>, resolved: &'a ResolvedSearchPath) -> Option<&'a str> {
    match existing {
        Some(_) => None,
        None => resolved.as_override(),
    }
}
