// crates/spawn/src/lib.rs
//! Low-level child spawning shared by the daemon and the client
//! dispatcher.
//!
//! [`spawn`] turns a [`Descriptor`] into a running child: argv resolved
//! along `PATH`, cwd and environment overlay applied, stdio wired per
//! the descriptor's I/O mode, the child placed in its own process group,
//! and the identity switched after fork and before exec when the
//! descriptor asks for one.

use std::io::Read;
use std::process::{Child, ChildStdin, Command, Stdio};

use command::{Descriptor, Error, ExitStatus, IoMode, Result};
use tracing::debug;

#[cfg(unix)]
mod unix;

/// A spawned child with whatever stdio the I/O mode left piped.
pub struct ChildProcess {
    child: Child,
    pid: u32,
    stdin: Option<ChildStdin>,
    stdout: Option<Box<dyn Read + Send>>,
    stderr: Option<Box<dyn Read + Send>>,
}

impl ChildProcess {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub fn take_stdin(&mut self) -> Option<ChildStdin> {
        self.stdin.take()
    }

    pub fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr.take()
    }

    /// Blocks until the child exits.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        // Dropping stdin first so a child reading until EOF can finish.
        drop(self.stdin.take());
        match self.child.wait() {
            Ok(status) => Ok(decode_status(status)),
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => Err(Error::Interrupted),
            Err(e) => Err(e.into()),
        }
    }

    pub fn try_wait(&mut self) -> Result<Option<ExitStatus>> {
        Ok(self.child.try_wait()?.map(decode_status))
    }

    /// Queues a signal to the child's process group. Idempotent once the
    /// child is gone.
    #[cfg(unix)]
    pub fn kill(&self, signal: i32) -> Result<()> {
        unix::kill_group(self.pid, signal)
    }

    #[cfg(not(unix))]
    pub fn kill(&self, _signal: i32) -> Result<()> {
        Err(Error::UnsupportedPlatform)
    }
}

/// Queues a signal to a process group by its leader pid.
#[cfg(unix)]
pub fn kill_group(pid: u32, signal: i32) -> Result<()> {
    unix::kill_group(pid, signal)
}

/// Whether a process with this pid still exists.
#[cfg(unix)]
pub fn process_exists(pid: u32) -> bool {
    unix::process_exists(pid)
}

fn decode_status(status: std::process::ExitStatus) -> ExitStatus {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(sig) = status.signal() {
            return ExitStatus::from_signal(sig);
        }
    }
    ExitStatus::from_code(status.code().unwrap_or(command::PROTOCOL_EXIT_CODE))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiring {
    Inherit,
    Piped,
    Null,
}

impl Wiring {
    fn stdio(self) -> Stdio {
        match self {
            Wiring::Inherit => Stdio::inherit(),
            Wiring::Piped => Stdio::piped(),
            Wiring::Null => Stdio::null(),
        }
    }
}

/// Where each child stream goes.
///
/// [`StdioPlan::local`] is the in-process wiring table; the daemon uses
/// [`StdioPlan::remote`], which never inherits (the daemon's own stdio
/// is not the client's) and instead pipes whatever the client will
/// consume as frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StdioPlan {
    pub stdin: Wiring,
    pub stdout: Wiring,
    pub stderr: Wiring,
}

impl StdioPlan {
    pub fn local(mode: IoMode) -> Result<Self> {
        use Wiring::*;
        Ok(match mode {
            IoMode::Default | IoMode::System => StdioPlan {
                stdin: Inherit,
                stdout: Inherit,
                stderr: Inherit,
            },
            IoMode::Input => StdioPlan {
                stdin: Null,
                stdout: Piped,
                stderr: Piped,
            },
            IoMode::Output => StdioPlan {
                stdin: Piped,
                stdout: Inherit,
                stderr: Inherit,
            },
            IoMode::Io => StdioPlan {
                stdin: Piped,
                stdout: Piped,
                stderr: Piped,
            },
            IoMode::Sink => StdioPlan {
                stdin: Null,
                stdout: Null,
                stderr: Null,
            },
            IoMode::Pty => return Err(Error::UnsupportedPlatform),
        })
    }

    pub fn remote(mode: IoMode) -> Result<Self> {
        use Wiring::*;
        Ok(match mode {
            IoMode::Default | IoMode::Io => StdioPlan {
                stdin: Piped,
                stdout: Piped,
                stderr: Piped,
            },
            IoMode::Input => StdioPlan {
                stdin: Null,
                stdout: Piped,
                stderr: Piped,
            },
            IoMode::Output => StdioPlan {
                stdin: Piped,
                stdout: Null,
                stderr: Null,
            },
            IoMode::Sink | IoMode::System => StdioPlan {
                stdin: Null,
                stdout: Null,
                stderr: Null,
            },
            IoMode::Pty => return Err(Error::UnsupportedPlatform),
        })
    }
}

fn wire_stdio(
    cmd: &mut Command,
    plan: StdioPlan,
    redirect_err_to_out: bool,
) -> Result<Option<Box<dyn Read + Send>>> {
    cmd.stdin(plan.stdin.stdio());
    cmd.stdout(plan.stdout.stdio());
    if plan.stdout == Wiring::Piped && redirect_err_to_out {
        #[cfg(unix)]
        {
            // One pipe, write end shared by stdout and stderr, so the
            // caller sees the streams interleaved as the child wrote
            // them.
            let (reader, writer) = unix::merge_pipe()?;
            cmd.stdout(Stdio::from(writer.try_clone().map_err(Error::Io)?));
            cmd.stderr(Stdio::from(writer));
            return Ok(Some(Box::new(reader)));
        }
        #[cfg(not(unix))]
        return Err(Error::UnsupportedPlatform);
    }
    cmd.stderr(plan.stderr.stdio());
    Ok(None)
}

/// Starts the child with the stdio wiring its own I/O mode implies.
pub fn spawn(desc: &Descriptor) -> Result<ChildProcess> {
    spawn_with(desc, StdioPlan::local(desc.io_mode())?)
}

/// Starts the child with an explicit stdio plan.
pub fn spawn_with(desc: &Descriptor, plan: StdioPlan) -> Result<ChildProcess> {
    desc.validate()?;
    let program = command::resolve_program(desc.program()).ok_or_else(|| Error::ExecFailed {
        reason: format!("{}: command not found", desc.program()),
        errno: 2,
    })?;

    let mut cmd = Command::new(&program);
    cmd.args(&desc.argv()[1..]);
    if let Some(cwd) = desc.cwd() {
        cmd.current_dir(cwd);
    }
    for (name, value) in desc.env_overlay() {
        cmd.env(name, value);
    }

    let merged = wire_stdio(&mut cmd, plan, desc.redirect_err_to_out())?;

    let switching = !desc.identity().is_current();
    #[cfg(unix)]
    unix::prepare(&mut cmd, desc.identity())?;
    #[cfg(not(unix))]
    if switching {
        return Err(Error::UnsupportedPlatform);
    }

    debug!(program = %program.display(), identity = %desc.identity(), "spawning child");
    let mut child = cmd.spawn().map_err(|e| spawn_error(e, switching))?;
    let pid = child.id();
    let stdin = child.stdin.take();
    let stdout: Option<Box<dyn Read + Send>> = match merged {
        Some(reader) => Some(reader),
        None => child.stdout.take().map(|s| Box::new(s) as _),
    };
    let stderr: Option<Box<dyn Read + Send>> = child.stderr.take().map(|s| Box::new(s) as _);

    Ok(ChildProcess {
        child,
        pid,
        stdin,
        stdout,
        stderr,
    })
}

fn spawn_error(e: std::io::Error, switching: bool) -> Error {
    let errno = e.raw_os_error().unwrap_or(0);
    if switching && errno == 1 {
        return Error::ElevationDenied;
    }
    Error::ExecFailed {
        reason: e.to_string(),
        errno,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn missing_program_is_exec_failed() {
        let desc = Descriptor::new(["forker-no-such-command"]).unwrap();
        match spawn(&desc) {
            Err(Error::ExecFailed { errno, .. }) => assert_eq!(errno, 2),
            other => panic!("unexpected result {other:?}", other = other.err()),
        }
    }

    #[cfg(unix)]
    #[test]
    fn input_mode_pipes_stdout() {
        let desc = Descriptor::new(["echo", "hello"])
            .unwrap()
            .with_io_mode(IoMode::Input);
        let mut child = spawn(&desc).unwrap();
        let mut out = String::new();
        child.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\n");
        assert!(child.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn sink_mode_pipes_nothing() {
        let desc = Descriptor::new(["echo", "ignored"])
            .unwrap()
            .with_io_mode(IoMode::Sink);
        let mut child = spawn(&desc).unwrap();
        assert!(child.take_stdout().is_none());
        assert!(child.take_stderr().is_none());
        assert!(child.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn merged_stderr_interleaves() {
        let desc = Descriptor::new(["sh", "-c", "echo out; echo err 1>&2; echo out2"])
            .unwrap()
            .with_io_mode(IoMode::Input)
            .with_redirect_err_to_out(true);
        let mut child = spawn(&desc).unwrap();
        assert!(child.take_stderr().is_none());
        let mut out = String::new();
        child.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "out\nerr\nout2\n");
        assert!(child.wait().unwrap().success());
    }

    #[cfg(unix)]
    #[test]
    fn signal_death_decoded() {
        let desc = Descriptor::new(["sleep", "30"])
            .unwrap()
            .with_io_mode(IoMode::Sink);
        let mut child = spawn(&desc).unwrap();
        child.kill(15).unwrap();
        let status = child.wait().unwrap();
        assert_eq!(status.signal(), Some(15));
        assert_eq!(status.shell_code(), 143);
        // Idempotent after exit.
        child.kill(15).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn env_overlay_reaches_child() {
        let desc = Descriptor::new(["sh", "-c", "printf %s \"$FORKER_TEST_VAR\""])
            .unwrap()
            .with_env("FORKER_TEST_VAR", "overlay-value")
            .unwrap()
            .with_io_mode(IoMode::Input);
        let mut child = spawn(&desc).unwrap();
        let mut out = String::new();
        child.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out, "overlay-value");
        child.wait().unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn cwd_applies() {
        let dir = tempfile::tempdir().unwrap();
        let canon = dir.path().canonicalize().unwrap();
        let desc = Descriptor::new(["pwd"])
            .unwrap()
            .with_cwd(&canon)
            .with_io_mode(IoMode::Input);
        let mut child = spawn(&desc).unwrap();
        let mut out = String::new();
        child.take_stdout().unwrap().read_to_string(&mut out).unwrap();
        assert_eq!(out.trim_end(), canon.to_str().unwrap());
        child.wait().unwrap();
    }
}
