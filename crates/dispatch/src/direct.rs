// crates/dispatch/src/direct.rs
use command::{Descriptor, Result};

use crate::process::Process;

/// In-process exec, the backend every launch with no special needs
/// lands on.
pub(crate) fn launch(desc: &Descriptor) -> Result<Process> {
    Ok(Process::from_local(spawn::spawn(desc)?))
}
