//! `dlopen`-backed [`ComponentLoader`].
//!
//! Names are handed to the platform loader unchanged, so the usual library
//! search rules (`LD_LIBRARY_PATH`, the ld cache, `RUNPATH`) apply.  Libraries
//! are opened with `RTLD_NOW` so unresolved symbols fail the load instead of
//! crashing the listener later.

use std::ffi::{c_char, c_int};
use std::ptr;

use dspd_types::{ComponentStatus, DspError};
use libloading::os::unix::{Library, Symbol, RTLD_NOW};
use tracing::debug;

use crate::component::{Component, ComponentArgs, ComponentLoader};

/// Signature of a listener entry point: `int start(int argc, char *argv[])`.
type ListenerStart = unsafe extern "C" fn(c_int, *mut *mut c_char) -> c_int;

/// Loads components with `dlopen`.
#[derive(Debug, Clone)]
pub struct DylibLoader {
    flags: c_int,
}

impl Default for DylibLoader {
    fn default() -> Self {
        Self { flags: RTLD_NOW }
    }
}

impl DylibLoader {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ComponentLoader for DylibLoader {
    type Component = DylibComponent;

    fn load(&mut self, name: &str) -> Result<DylibComponent, DspError> {
        // SAFETY: loading runs the library's initialisers.  Listener libraries
        // are vendor components installed for exactly this daemon.
        let library = unsafe { Library::open(Some(name), self.flags) }.map_err(|e| DspError::Open {
            library: name.to_string(),
            details: e.to_string(),
        })?;
        debug!(library = %name, "dlopen succeeded");
        Ok(DylibComponent {
            library,
            name: name.to_string(),
        })
    }
}

/// A shared library opened by [`DylibLoader`].
pub struct DylibComponent {
    library: Library,
    name: String,
}

impl Component for DylibComponent {
    fn invoke(&mut self, symbol: &str, args: &ComponentArgs) -> Result<ComponentStatus, DspError> {
        // SAFETY: the symbol is declared with the listener entry point ABI.
        let start: Symbol<ListenerStart> = unsafe { self.library.get(symbol.as_bytes()) }
            .map_err(|_| DspError::SymbolNotFound {
                library: self.name.clone(),
                symbol: symbol.to_string(),
            })?;

        let mut buffers = args.to_buffers();
        let mut argv: Vec<*mut c_char> = buffers
            .iter_mut()
            .map(|buf| buf.as_mut_ptr().cast::<c_char>())
            .collect();
        let argc = c_int::try_from(argv.len()).unwrap_or(c_int::MAX);
        argv.push(ptr::null_mut());

        debug!(library = %self.name, %symbol, argc, "invoking entry point");
        // SAFETY: `argv` holds `argc` valid NUL-terminated strings followed by
        // a null pointer, and `buffers` outlives the call.
        let status = unsafe { start(argc, argv.as_mut_ptr()) };
        Ok(ComponentStatus(status))
    }

    fn unload(self) -> Result<(), DspError> {
        let name = self.name;
        self.library.close().map_err(|e| DspError::UnloadFailed {
            library: name,
            details: e.to_string(),
        })
    }
}
