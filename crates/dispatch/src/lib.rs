// crates/dispatch/src/lib.rs
#![deny(unsafe_code)]
//! The client-side launch dispatcher.
//!
//! [`dispatch`] takes a [`command::Descriptor`], applies the ambient
//! [`scope`] overlay, and picks a backend: the pty collaborator for pty
//! launches, the daemon when the launch needs another identity (or asks
//! for the daemon outright) and one is reachable, and a plain local
//! exec for everything else. An unreachable daemon makes the dispatcher
//! fall back to a direct exec when the identity allows it, and down the
//! local elevation ladder when it does not.

mod direct;
mod dispatcher;
mod elevation;
mod probe;
mod process;
mod pty;
mod remote;
pub mod scope;

pub use dispatcher::{dispatch, ClientConfig, Dispatcher};
pub use process::Process;
pub use pty::{register_pty_launcher, PtyLauncher};
pub use scope::{scope, Overlay, Scope, ScopeBuilder};
