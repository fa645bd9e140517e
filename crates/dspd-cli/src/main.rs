//! `dsprpcd` – DSP default listener daemon.
//!
//! One binary per DSP domain, selected at build time with a Cargo feature
//! (`adsp`, `sdsp`, `cdsp` or `gdsp`).  At start-up the daemon:
//!
//! 1. Loads settings from `/etc/dspd/dspd.toml` (optional) and `DSPD_*`
//!    environment overrides.
//! 2. Resolves the per-machine DSP library search path from the fragments in
//!    `<config_base_dir>/conf.d/`.
//! 3. Hands the listener library to the supervisor, which restarts it until
//!    the DSP reports that its device node is unreachable.
//!
//! The process exit code is the listener's last status.

mod config;
mod telemetry;

use dspd_supervisor::{ComponentArgs, DylibLoader, Supervisor, SupervisorConfig};
use dspd_types::DspDomain;
use tracing::{error, info, warn};

fn main() {
    telemetry::init_logging();

    let Some(domain) = selected_domain() else {
        error!("no DSP domain selected at build time; enable one of the adsp, sdsp, cdsp or gdsp features");
        info!("daemon exiting 0x0");
        std::process::exit(0);
    };

    // ── Settings ──────────────────────────────────────────────────────────
    let mut settings = match config::load() {
        Ok(Some(settings)) => {
            info!(path = %config::settings_path().display(), "settings loaded");
            settings
        }
        Ok(None) => config::Settings::default(),
        Err(e) => {
            warn!(error = %e, "using default settings");
            config::Settings::default()
        }
    };
    config::apply_env_overrides(&mut settings);

    // ── Search path ───────────────────────────────────────────────────────
    let search_path = settings
        .resolver()
        .configure_dsp_paths(&settings.machine_name_path);

    // ── Supervisor ────────────────────────────────────────────────────────
    let args = ComponentArgs::from_env().unwrap_or_else(|e| {
        warn!(error = %e, "cannot forward process arguments; listener gets an empty argv");
        ComponentArgs::default()
    });

    let supervisor_config = SupervisorConfig::for_domain(domain)
        .with_library(settings.listener_for(domain))
        .with_policy(settings.policy())
        .with_search_path(search_path);

    let status = Supervisor::new(DylibLoader::new(), supervisor_config, args).run();
    std::process::exit(status.code());
}

/// Domain this binary was built for.  When several features are enabled the
/// first of ADSP, SDSP, CDSP, GDSP wins.
fn selected_domain() -> Option<DspDomain> {
    if cfg!(feature = "adsp") {
        Some(DspDomain::Adsp)
    } else if cfg!(feature = "sdsp") {
        Some(DspDomain::Sdsp)
    } else if cfg!(feature = "cdsp") {
        Some(DspDomain::Cdsp)
    } else if cfg!(feature = "gdsp") {
        Some(DspDomain::Gdsp)
    } else {
        None
    }
}
