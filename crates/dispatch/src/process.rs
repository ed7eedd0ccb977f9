// crates/dispatch/src/process.rs
use std::io::{Read, Write};

use command::{ExitStatus, Result};
use tempfile::TempPath;

use crate::remote::RemoteHandle;

enum Inner {
    Local(spawn::ChildProcess),
    Remote(RemoteHandle),
    Done(ExitStatus),
}

/// Handle on a launched child, whichever backend started it.
///
/// The handle names the child; it does not own the session serving it.
/// Streams are taken at most once. `wait` is terminal: after it
/// returns, `kill` becomes a no-op and the streams are whatever was
/// left unread.
pub struct Process {
    pid: u32,
    stdin: Option<Box<dyn Write + Send>>,
    stdout: Option<Box<dyn Read + Send>>,
    stderr: Option<Box<dyn Read + Send>>,
    inner: Inner,
    // Keeps an askpass helper script alive for the child's lifetime;
    // dropping the handle unlinks it.
    askpass: Option<TempPath>,
}

impl Process {
    pub(crate) fn from_local(mut child: spawn::ChildProcess) -> Process {
        let stdin = child
            .take_stdin()
            .map(|s| Box::new(s) as Box<dyn Write + Send>);
        let stdout = child.take_stdout();
        let stderr = child.take_stderr();
        Process {
            pid: child.pid(),
            stdin,
            stdout,
            stderr,
            inner: Inner::Local(child),
            askpass: None,
        }
    }

    pub(crate) fn from_remote(
        handle: RemoteHandle,
        stdin: Option<Box<dyn Write + Send>>,
        stdout: Option<Box<dyn Read + Send>>,
        stderr: Option<Box<dyn Read + Send>>,
    ) -> Process {
        Process {
            pid: handle.pid(),
            stdin,
            stdout,
            stderr,
            inner: Inner::Remote(handle),
            askpass: None,
        }
    }

    pub(crate) fn finished(pid: u32, status: ExitStatus) -> Process {
        Process {
            pid,
            stdin: None,
            stdout: None,
            stderr: None,
            inner: Inner::Done(status),
            askpass: None,
        }
    }

    pub(crate) fn with_askpass(mut self, askpass: TempPath) -> Process {
        self.askpass = Some(askpass);
        self
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Takes the child's stdin writer. Dropping the writer closes the
    /// child's stdin.
    pub fn take_stdin(&mut self) -> Option<Box<dyn Write + Send>> {
        self.stdin.take()
    }

    /// Takes the child's stdout reader. Reads block until data or EOF;
    /// EOF arrives once the child closes its end.
    pub fn take_stdout(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stdout.take()
    }

    pub fn take_stderr(&mut self) -> Option<Box<dyn Read + Send>> {
        self.stderr.take()
    }

    /// Blocks until the child exits and returns its status. Idempotent.
    pub fn wait(&mut self) -> Result<ExitStatus> {
        // Close our stdin half first so children reading to EOF finish.
        self.stdin = None;
        let status = match &mut self.inner {
            Inner::Done(status) => return Ok(*status),
            Inner::Local(child) => child.wait()?,
            Inner::Remote(handle) => handle.wait()?,
        };
        self.inner = Inner::Done(status);
        let _ = self.askpass.take();
        Ok(status)
    }

    /// Queues a signal to the child. Success means delivery was queued,
    /// not that the child died. A no-op once the child has exited.
    pub fn kill(&mut self, signal: i32) -> Result<()> {
        match &mut self.inner {
            Inner::Done(_) => Ok(()),
            Inner::Local(child) => child.kill(signal),
            Inner::Remote(handle) => handle.kill(signal),
        }
    }
}
