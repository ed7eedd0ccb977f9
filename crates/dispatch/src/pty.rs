// crates/dispatch/src/pty.rs
use std::sync::OnceLock;

use command::{Descriptor, Error, Result};

use crate::process::Process;

/// Seam for the pseudo-terminal collaborator.
///
/// Pty launches are delegated wholesale: the launcher receives the full
/// descriptor, including its [`command::PtyHints`], and returns an
/// ordinary [`Process`] whose stdio is the pty master.
pub trait PtyLauncher: Send + Sync {
    fn launch(&self, desc: &Descriptor) -> Result<Process>;
}

static LAUNCHER: OnceLock<Box<dyn PtyLauncher>> = OnceLock::new();

/// Installs the process-wide pty launcher. Returns `false` when one is
/// already registered.
pub fn register_pty_launcher(launcher: Box<dyn PtyLauncher>) -> bool {
    LAUNCHER.set(launcher).is_ok()
}

pub(crate) fn launch(desc: &Descriptor) -> Result<Process> {
    match LAUNCHER.get() {
        Some(launcher) => launcher.launch(desc),
        None => Err(Error::UnsupportedPlatform),
    }
}
