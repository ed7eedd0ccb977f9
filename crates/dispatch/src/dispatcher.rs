// crates/dispatch/src/dispatcher.rs
use std::path::PathBuf;
use std::time::Duration;

use command::{Descriptor, Error, IoMode, Result};
use tracing::debug;

use crate::process::Process;
use crate::{direct, elevation, probe, pty, remote, scope};

/// Client-side view of the daemon endpoint.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub port: u16,
    pub state_dir: PathBuf,
    /// Time allowed for connecting and completing the cookie handshake.
    pub probe_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            port: protocol::DEFAULT_PORT,
            state_dir: command::default_state_dir(),
            probe_timeout: Duration::from_secs(1),
        }
    }
}

impl ClientConfig {
    pub fn cookie_path(&self) -> PathBuf {
        command::cookie_path(&self.state_dir)
    }
}

/// Picks a backend for each descriptor and launches through it.
#[derive(Debug, Clone, Default)]
pub struct Dispatcher {
    config: ClientConfig,
}

impl Dispatcher {
    pub fn new(config: ClientConfig) -> Self {
        Dispatcher { config }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Launches one command.
    ///
    /// Backend order: the pty collaborator for pty launches; the daemon
    /// when the identity differs from the current user or the
    /// descriptor forces it, provided the endpoint answers; a direct
    /// local exec otherwise. `System` launches block here until the
    /// child exits.
    pub fn dispatch(&self, desc: &Descriptor) -> Result<Process> {
        let desc = scope::apply(desc)?;
        desc.validate()?;

        if desc.io_mode() == IoMode::Pty {
            return pty::launch(&desc);
        }

        let mut process = self.select_and_launch(&desc)?;
        if desc.io_mode() == IoMode::System {
            let pid = process.pid();
            let status = process.wait()?;
            return Ok(Process::finished(pid, status));
        }
        Ok(process)
    }

    fn select_and_launch(&self, desc: &Descriptor) -> Result<Process> {
        let wants_daemon = !desc.identity().is_current() || desc.force_daemon();
        if wants_daemon && !probe::recently_unreachable(self.config.port) {
            match remote::launch(desc, &self.config) {
                Ok(process) => {
                    probe::note_reachable(self.config.port);
                    return Ok(process);
                }
                Err(Error::DaemonUnreachable(reason)) => {
                    debug!(reason = %reason, "daemon unreachable, falling back");
                    probe::note_unreachable(self.config.port);
                }
                Err(other) => return Err(other),
            }
        }
        if desc.identity().is_current() {
            return direct::launch(desc);
        }
        elevation::launch_local(desc)
    }
}

/// Dispatches with the default endpoint configuration.
pub fn dispatch(desc: &Descriptor) -> Result<Process> {
    Dispatcher::default().dispatch(desc)
}
