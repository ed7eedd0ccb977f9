// crates/dispatch/src/scope.rs
//! Thread-scoped launch defaults.
//!
//! A [`Scope`] layers ambient defaults (elevate on/off, an I/O mode, an
//! environment overlay) over every descriptor dispatched on the same
//! thread while the scope guard lives. Scopes nest; inner scopes win on
//! the fields they set. The guard releases its layer on drop, on every
//! exit path.
//!
//! ```
//! use command::{Descriptor, IoMode};
//! use dispatch::scope;
//!
//! let _guard = scope().io_mode(IoMode::Sink).env("LANG", "C").enter();
//! // descriptors dispatched here default to IoMode::Sink with LANG=C
//! ```

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::marker::PhantomData;

use command::{Descriptor, Identity, IoMode, Result};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Overlay {
    pub elevate: Option<bool>,
    pub io_mode: Option<IoMode>,
    pub env: BTreeMap<String, String>,
}

thread_local! {
    static STACK: RefCell<Vec<Overlay>> = const { RefCell::new(Vec::new()) };
}

/// Starts building a scope layer.
pub fn scope() -> ScopeBuilder {
    ScopeBuilder(Overlay::default())
}

#[derive(Debug, Default)]
pub struct ScopeBuilder(Overlay);

impl ScopeBuilder {
    /// Launches in this scope run as administrator unless the
    /// descriptor names an identity itself. `elevate(false)` restricts
    /// an outer elevated scope back to the current user.
    pub fn elevate(mut self, elevate: bool) -> Self {
        self.0.elevate = Some(elevate);
        self
    }

    pub fn io_mode(mut self, io_mode: IoMode) -> Self {
        self.0.io_mode = Some(io_mode);
        self
    }

    pub fn env<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.0.env.insert(name.into(), value.into());
        self
    }

    /// Pushes the layer and returns its guard.
    pub fn enter(self) -> Scope {
        STACK.with(|stack| stack.borrow_mut().push(self.0));
        Scope {
            released: false,
            _thread_bound: PhantomData,
        }
    }
}

/// Guard for one scope layer. Dropping it pops the layer.
pub struct Scope {
    released: bool,
    // Scopes are thread-scoped state; the guard must not travel.
    _thread_bound: PhantomData<*mut ()>,
}

impl Scope {
    /// Explicit release, for call sites that want the pop to be visible.
    pub fn release(mut self) {
        self.pop();
    }

    fn pop(&mut self) {
        if !self.released {
            self.released = true;
            STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }
}

impl Drop for Scope {
    fn drop(&mut self) {
        self.pop();
    }
}

/// The composed overlay for this thread: layers applied bottom-up, each
/// overwriting the fields it sets.
pub fn current() -> Overlay {
    STACK.with(|stack| {
        let mut composed = Overlay::default();
        for layer in stack.borrow().iter() {
            if layer.elevate.is_some() {
                composed.elevate = layer.elevate;
            }
            if layer.io_mode.is_some() {
                composed.io_mode = layer.io_mode;
            }
            for (name, value) in &layer.env {
                composed.env.insert(name.clone(), value.clone());
            }
        }
        composed
    })
}

/// Applies the ambient overlay to one descriptor. Fields the descriptor
/// sets explicitly win over the overlay.
pub(crate) fn apply(desc: &Descriptor) -> Result<Descriptor> {
    let overlay = current();
    let mut desc = desc.clone();
    if let Some(io_mode) = overlay.io_mode {
        if desc.io_mode() == IoMode::Default {
            desc = desc.with_io_mode(io_mode);
        }
    }
    match overlay.elevate {
        Some(true) if desc.identity().is_current() => {
            desc = desc.with_identity(Identity::Administrator);
        }
        Some(false) => {
            desc = desc.with_identity(Identity::Current);
        }
        _ => {}
    }
    for (name, value) in overlay.env {
        if !desc.env_overlay().contains_key(&name) {
            desc = desc.with_env(name, value)?;
        }
    }
    Ok(desc)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scopes_nest_and_release() {
        assert_eq!(current(), Overlay::default());
        let outer = scope().elevate(true).env("A", "outer").enter();
        {
            let _inner = scope().elevate(false).env("A", "inner").enter();
            let composed = current();
            assert_eq!(composed.elevate, Some(false));
            assert_eq!(composed.env["A"], "inner");
        }
        let composed = current();
        assert_eq!(composed.elevate, Some(true));
        assert_eq!(composed.env["A"], "outer");
        outer.release();
        assert_eq!(current(), Overlay::default());
    }

    #[test]
    fn overlay_elevates_current_identity_only() {
        let _guard = scope().elevate(true).enter();
        let desc = Descriptor::new(["true"]).unwrap();
        let applied = apply(&desc).unwrap();
        assert_eq!(*applied.identity(), Identity::Administrator);

        let named = Descriptor::new(["true"])
            .unwrap()
            .with_identity(Identity::Uid(42));
        let applied = apply(&named).unwrap();
        assert_eq!(*applied.identity(), Identity::Uid(42));
    }

    #[test]
    fn overlay_io_mode_fills_the_default_only() {
        let _guard = scope().io_mode(IoMode::Sink).enter();
        let desc = Descriptor::new(["true"]).unwrap();
        assert_eq!(apply(&desc).unwrap().io_mode(), IoMode::Sink);

        let explicit = Descriptor::new(["true"]).unwrap().with_io_mode(IoMode::Io);
        assert_eq!(apply(&explicit).unwrap().io_mode(), IoMode::Io);
    }

    #[test]
    fn descriptor_env_wins_over_overlay() {
        let _guard = scope().env("LANG", "scope").enter();
        let desc = Descriptor::new(["true"])
            .unwrap()
            .with_env("LANG", "own")
            .unwrap();
        let applied = apply(&desc).unwrap();
        assert_eq!(applied.env_overlay()["LANG"], "own");

        let bare = Descriptor::new(["true"]).unwrap();
        assert_eq!(apply(&bare).unwrap().env_overlay()["LANG"], "scope");
    }

    #[test]
    fn other_threads_see_no_overlay() {
        let _guard = scope().elevate(true).enter();
        let seen = std::thread::spawn(current).join().unwrap();
        assert_eq!(seen, Overlay::default());
    }
}
