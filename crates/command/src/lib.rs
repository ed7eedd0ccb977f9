// crates/command/src/lib.rs
#![deny(unsafe_code)]
//! Launch descriptors and the shared error taxonomy.
//!
//! A [`Descriptor`] is an immutable value describing one command to run:
//! argv, working directory, environment overlay, I/O wiring, and the
//! identity the child should run under. Backends consume descriptors;
//! they never mutate them.

mod descriptor;
mod error;
mod lookup;
mod paths;
mod types;

pub use descriptor::{Descriptor, PtyHints};
pub use error::{Error, Result, PROTOCOL_EXIT_CODE};
pub use lookup::{has_command, resolve_program};
pub use paths::{cookie_path, default_state_dir};
pub use types::{ExitStatus, Identity, IoMode, UnknownIoMode};
