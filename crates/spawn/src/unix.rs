// crates/spawn/src/unix.rs
#![allow(unsafe_code)]

use std::fs::File;
use std::io;
use std::os::fd::OwnedFd;
use std::os::unix::process::CommandExt;
use std::process::Command;

use command::{Error, Identity, Result};
use nix::errno::Errno;
use nix::sys::signal::{kill, killpg, Signal};
use nix::unistd::{Gid, Pid, Uid};

pub(crate) fn merge_pipe() -> Result<(File, OwnedFd)> {
    let (reader, writer) = nix::unistd::pipe().map_err(|e| Error::Io(e.into()))?;
    Ok((File::from(reader), writer))
}

// Identity resolution happens here, in the parent: only raw ids may
// cross the fork, the pre_exec closure must stay async-signal-safe.
fn target_ids(identity: &Identity) -> Result<Option<(u32, u32)>> {
    match identity {
        Identity::Current => Ok(None),
        Identity::Administrator | Identity::FixedPasswordSudo(_) => Ok(Some((0, 0))),
        Identity::Uid(uid) => {
            let gid = users::get_user_by_uid(*uid)
                .map(|u| u.primary_group_id())
                .unwrap_or(*uid);
            Ok(Some((*uid, gid)))
        }
        Identity::Username(name) => {
            let user = users::get_user_by_name(name)
                .ok_or_else(|| Error::InvalidIdentity(format!("unknown user {name:?}")))?;
            Ok(Some((user.uid(), user.primary_group_id())))
        }
    }
}

/// Installs the after-fork hook: new process group first, then the
/// gid/uid switch when the requested identity differs from the
/// current effective one.
pub(crate) fn prepare(cmd: &mut Command, identity: &Identity) -> Result<()> {
    let current = (Uid::effective().as_raw(), Gid::effective().as_raw());
    let switch = target_ids(identity)?.filter(|ids| *ids != current);
    // SAFETY: the closure runs between fork and exec and only performs
    // async-signal-safe raw syscalls on data captured by value.
    unsafe {
        cmd.pre_exec(move || {
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            if let Some((uid, gid)) = switch {
                if libc::setgid(gid) != 0 {
                    return Err(io::Error::last_os_error());
                }
                if libc::setuid(uid) != 0 {
                    return Err(io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
    Ok(())
}

pub(crate) fn kill_group(pid: u32, signal: i32) -> Result<()> {
    let sig = Signal::try_from(signal)
        .map_err(|_| Error::Protocol(format!("invalid signal {signal}")))?;
    match killpg(Pid::from_raw(pid as i32), sig) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(Error::Io(e.into())),
    }
}

pub(crate) fn process_exists(pid: u32) -> bool {
    match kill(Pid::from_raw(pid as i32), None) {
        Ok(()) => true,
        Err(Errno::ESRCH) => false,
        Err(_) => true,
    }
}
