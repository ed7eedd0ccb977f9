// crates/daemon/src/lib.rs
#![deny(unsafe_code)]
//! The privilege-mediation daemon.
//!
//! A small, long-lived process that spawns commands on behalf of local
//! clients. Clients authenticate with a cookie read from the state
//! directory, then launch children whose stdio is multiplexed back over
//! the connection as frames. Children a client leaves behind are
//! terminated when its connection drops.

pub mod config;
pub mod cookie;
mod session;
pub mod service;

pub use config::DaemonConfig;
pub use service::{run_daemon, Server, ServerHandle};
