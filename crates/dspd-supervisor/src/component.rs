//! Loadable component seam and the owned [`ComponentHandle`].
//!
//! The supervisor never talks to `dlopen` directly.  It drives a
//! [`ComponentLoader`], which hands back a [`Component`]; the component is
//! immediately wrapped in a [`ComponentHandle`] so that every exit path out of
//! the running state unloads it exactly once.

use std::ffi::CString;
use std::mem::ManuallyDrop;

use dspd_types::{ComponentStatus, DspError, ListenerLibrary};
use tracing::{debug, error};

// ────────────────────────────────────────────────────────────────────────────
// Traits
// ────────────────────────────────────────────────────────────────────────────

/// A loaded, invocable component.
pub trait Component {
    /// Look up `symbol` and call it once with `args`.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::SymbolNotFound`] when the component does not export
    /// `symbol`.  Nothing is invoked in that case.
    fn invoke(&mut self, symbol: &str, args: &ComponentArgs) -> Result<ComponentStatus, DspError>;

    /// Release the component.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::UnloadFailed`] if the platform refuses to unload.
    fn unload(self) -> Result<(), DspError>;
}

/// Loads components by file name.
pub trait ComponentLoader {
    type Component: Component;

    /// # Errors
    ///
    /// Returns [`DspError::Open`] when `name` cannot be loaded.
    fn load(&mut self, name: &str) -> Result<Self::Component, DspError>;
}

// ────────────────────────────────────────────────────────────────────────────
// Arguments
// ────────────────────────────────────────────────────────────────────────────

/// Argument vector forwarded verbatim to a component's entry point.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComponentArgs {
    args: Vec<CString>,
}

impl ComponentArgs {
    /// # Errors
    ///
    /// Returns [`DspError::InvalidArgument`] if any argument contains a NUL
    /// byte.
    pub fn new<I, S>(args: I) -> Result<Self, DspError>
    where
        I: IntoIterator<Item = S>,
        S: Into<Vec<u8>>,
    {
        let args = args
            .into_iter()
            .enumerate()
            .map(|(index, arg)| CString::new(arg).map_err(|_| DspError::InvalidArgument { index }))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { args })
    }

    /// The arguments this process was started with, including `argv[0]`.
    #[cfg(unix)]
    pub fn from_env() -> Result<Self, DspError> {
        use std::os::unix::ffi::OsStringExt;
        Self::new(std::env::args_os().map(|arg| arg.into_vec()))
    }

    #[cfg(not(unix))]
    pub fn from_env() -> Result<Self, DspError> {
        Self::new(std::env::args_os().map(|arg| arg.to_string_lossy().into_owned()))
    }

    pub fn len(&self) -> usize {
        self.args.len()
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty()
    }

    /// Fresh NUL-terminated copies of every argument.
    ///
    /// Entry points receive a mutable `argv`; handing out copies keeps one
    /// invocation's edits from leaking into the next.
    pub fn to_buffers(&self) -> Vec<Vec<u8>> {
        self.args.iter().map(|arg| arg.as_bytes_with_nul().to_vec()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &[u8]> {
        self.args.iter().map(|arg| arg.as_bytes())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// ComponentHandle
// ────────────────────────────────────────────────────────────────────────────

/// Exclusive ownership of one loaded component plus the name that was
/// actually loaded.
///
/// Dropping the handle unloads the component.  An unload failure is logged
/// and otherwise ignored.
pub struct ComponentHandle<C: Component> {
    // Taken out exactly once, in `Drop`.
    component: ManuallyDrop<C>,
    loaded_name: String,
}

impl<C: Component> ComponentHandle<C> {
    /// Load `library.versioned`, falling back to `library.unversioned`.
    ///
    /// # Errors
    ///
    /// Returns [`DspError::LoadFailed`] when neither name can be loaded.
    pub fn load<L>(loader: &mut L, library: &ListenerLibrary) -> Result<Self, DspError>
    where
        L: ComponentLoader<Component = C>,
    {
        let first = match loader.load(&library.versioned) {
            Ok(component) => return Ok(Self::new(component, &library.versioned)),
            Err(e) => e,
        };
        debug!(
            versioned = %library.versioned,
            fallback = %library.unversioned,
            error = %first,
            "load failed, attempting fallback"
        );
        match loader.load(&library.unversioned) {
            Ok(component) => Ok(Self::new(component, &library.unversioned)),
            Err(e) => Err(DspError::LoadFailed {
                versioned: library.versioned.clone(),
                unversioned: library.unversioned.clone(),
                details: e.to_string(),
            }),
        }
    }

    fn new(component: C, loaded_name: &str) -> Self {
        Self {
            component: ManuallyDrop::new(component),
            loaded_name: loaded_name.to_string(),
        }
    }

    /// File name the component was loaded from.
    pub fn loaded_name(&self) -> &str {
        &self.loaded_name
    }

    /// Invoke `symbol` on the held component.
    pub fn invoke(&mut self, symbol: &str, args: &ComponentArgs) -> Result<ComponentStatus, DspError> {
        self.component.invoke(symbol, args)
    }
}

impl<C: Component> Drop for ComponentHandle<C> {
    fn drop(&mut self) {
        // SAFETY: `component` is never touched again after this.
        let component = unsafe { ManuallyDrop::take(&mut self.component) };
        match component.unload() {
            Ok(()) => debug!(library = %self.loaded_name, "component unloaded"),
            Err(e) => error!(library = %self.loaded_name, error = %e, "unload failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct CountingComponent {
        unloads: Rc<RefCell<u32>>,
    }

    impl Component for CountingComponent {
        fn invoke(&mut self, _symbol: &str, args: &ComponentArgs) -> Result<ComponentStatus, DspError> {
            Ok(ComponentStatus(args.len() as i32))
        }

        fn unload(self) -> Result<(), DspError> {
            *self.unloads.borrow_mut() += 1;
            Ok(())
        }
    }

    struct NamedLoader {
        available: Vec<&'static str>,
        attempts: Vec<String>,
        unloads: Rc<RefCell<u32>>,
    }

    impl ComponentLoader for NamedLoader {
        type Component = CountingComponent;

        fn load(&mut self, name: &str) -> Result<CountingComponent, DspError> {
            self.attempts.push(name.to_string());
            if self.available.iter().any(|n| *n == name) {
                Ok(CountingComponent { unloads: self.unloads.clone() })
            } else {
                Err(DspError::Open {
                    library: name.to_string(),
                    details: "not found".to_string(),
                })
            }
        }
    }

    fn loader(available: Vec<&'static str>) -> NamedLoader {
        NamedLoader {
            available,
            attempts: Vec::new(),
            unloads: Rc::new(RefCell::new(0)),
        }
    }

    fn library() -> ListenerLibrary {
        ListenerLibrary::new("liblistener.so.1", "liblistener.so")
    }

    #[test]
    fn prefers_versioned_name() {
        let mut l = loader(vec!["liblistener.so.1", "liblistener.so"]);
        let handle = ComponentHandle::load(&mut l, &library()).expect("load");
        assert_eq!(handle.loaded_name(), "liblistener.so.1");
        assert_eq!(l.attempts, vec!["liblistener.so.1"]);
    }

    #[test]
    fn falls_back_to_unversioned_name() {
        let mut l = loader(vec!["liblistener.so"]);
        let handle = ComponentHandle::load(&mut l, &library()).expect("load");
        assert_eq!(handle.loaded_name(), "liblistener.so");
        assert_eq!(l.attempts, vec!["liblistener.so.1", "liblistener.so"]);
    }

    #[test]
    fn both_names_failing_reports_load_failed() {
        let mut l = loader(vec![]);
        let err = ComponentHandle::load(&mut l, &library()).err().expect("must fail");
        assert!(matches!(err, DspError::LoadFailed { .. }));
        assert_eq!(*l.unloads.borrow(), 0);
    }

    #[test]
    fn drop_unloads_exactly_once() {
        let mut l = loader(vec!["liblistener.so.1"]);
        let mut handle = ComponentHandle::load(&mut l, &library()).expect("load");
        let args = ComponentArgs::new(["dsprpcd", "-v"]).expect("args");
        assert_eq!(handle.invoke("start", &args).expect("invoke"), ComponentStatus(2));
        assert_eq!(*l.unloads.borrow(), 0);
        drop(handle);
        assert_eq!(*l.unloads.borrow(), 1);
    }

    #[test]
    fn every_invocation_reaches_the_component() {
        let mut l = loader(vec!["liblistener.so"]);
        let mut handle = ComponentHandle::load(&mut l, &library()).expect("load");
        let one = ComponentArgs::new(["dsprpcd"]).expect("args");
        let three = ComponentArgs::new(["dsprpcd", "-a", "-b"]).expect("args");
        assert_eq!(handle.invoke("start", &one).expect("invoke"), ComponentStatus(1));
        assert_eq!(handle.invoke("start", &three).expect("invoke"), ComponentStatus(3));
        drop(handle);
        assert_eq!(*l.unloads.borrow(), 1);
    }

    #[test]
    fn args_reject_interior_nul() {
        let err = ComponentArgs::new(vec!["ok".to_string(), "bad\0arg".to_string()]).unwrap_err();
        assert!(matches!(err, DspError::InvalidArgument { index: 1 }));
    }

    #[test]
    fn buffers_are_nul_terminated_copies() {
        let args = ComponentArgs::new(["a", "bc"]).expect("args");
        assert_eq!(args.to_buffers(), vec![b"a\0".to_vec(), b"bc\0".to_vec()]);
        assert_eq!(args.iter().collect::<Vec<_>>(), vec![&b"a"[..], &b"bc"[..]]);
    }
}
