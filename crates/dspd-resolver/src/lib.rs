//! `dspd-resolver` – per-machine DSP library path resolution.
//!
//! Board vendors drop YAML fragments into `<config_base_dir>/conf.d/`.  Each
//! fragment maps machine identities to settings:
//!
//! ```yaml
//! machines:
//!   "Qualcomm Technologies, Inc. QCS6490":
//!     DSP_LIBRARY_PATH: dsp/qcs6490
//! ```
//!
//! Fragments are applied in byte-wise filename order and later files override
//! earlier ones, so `90-local.yaml` wins over `10-vendor.yaml`.
//!
//! # Modules
//!
//! - [`fragment`] – discovery of fragment files and single-file lookup.
//! - [`resolver`] – [`Resolver`][resolver::Resolver]: the last-writer-wins
//!   merge across all fragments and composition of the final
//!   [`ResolvedSearchPath`][dspd_types::ResolvedSearchPath].

pub mod fragment;
pub mod resolver;

pub use fragment::{discover, lookup_library_path, FragmentLookup, DSP_LIB_KEY};
pub use resolver::{
    resolve, Resolver, CONFIG_SUBDIR, DEFAULT_CONFIG_BASE_DIR, DEFAULT_MACHINE_NAME_PATH,
    DEFAULT_SEARCH_PATH_SUFFIX,
};
