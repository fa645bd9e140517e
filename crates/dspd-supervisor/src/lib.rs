//! `dspd-supervisor` – keeps a DSP default listener library alive.
//!
//! The supervisor repeatedly loads the listener, calls its entry point with
//! the daemon's own argument vector, unloads it and starts over.  Only the
//! connection-refused status (the DSP device node is unreachable) stops the
//! loop.
//!
//! # Modules
//!
//! - [`component`] – the [`Component`]/[`ComponentLoader`] seam,
//!   [`ComponentArgs`] and [`ComponentHandle`], an owned handle that unloads
//!   its component on drop.
//! - [`dylib`] – [`DylibLoader`][dylib::DylibLoader]: the `dlopen`-backed
//!   loader used in production.
//! - [`policy`] – [`RestartPolicy`]: sentinel status and backoff interval.
//! - [`supervisor`] – [`Supervisor`]: the
//!   `Loading → Running → Backoff → Loading` state machine.

pub mod component;
pub mod dylib;
pub mod policy;
pub mod supervisor;

pub use component::{Component, ComponentArgs, ComponentHandle, ComponentLoader};
pub use dylib::{DylibComponent, DylibLoader};
pub use policy::{Decision, RestartPolicy};
pub use supervisor::{Supervisor, SupervisorConfig, SupervisorState, SEARCH_PATH_ENV};
