// src/lib.rs
//! Forker runs operating-system commands through a unified launch
//! surface: a small descriptor picks the I/O wiring and the identity,
//! and the dispatcher routes the launch through an in-process exec, the
//! privilege-mediation daemon, or a pty collaborator.
//!
//! The helpers in this crate cover the common shapes with minimal code:
//!
//! ```no_run
//! forker::run(["cp", "/tmp/a", "/tmp/b"]).unwrap();
//! let lines = forker::admin_and_capture_output(["cat", "/etc/shadow"]).unwrap();
//! # let _ = lines;
//! ```
//!
//! Ambient defaults for a stretch of calls come from [`scope`]:
//!
//! ```
//! use forker::IoMode;
//!
//! let guard = forker::scope().io_mode(IoMode::Sink).enter();
//! // launches here discard their output
//! guard.release();
//! ```

mod run;

pub use command::{
    Descriptor, Error, ExitStatus, Identity, IoMode, PtyHints, Result, PROTOCOL_EXIT_CODE,
};
pub use dispatch::{
    dispatch, register_pty_launcher, scope, ClientConfig, Dispatcher, Process, PtyLauncher, Scope,
};
pub use run::{
    admin, admin_and_capture_output, admin_command, admin_command_in, admin_to_file, has_command,
    run, run_and_capture_output, run_command, run_command_in, run_in, run_to_file, system,
};
