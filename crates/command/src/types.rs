// crates/command/src/types.rs
use std::fmt;
use std::io;

/// Stdio wiring contract for one launch.
///
/// Discriminants are fixed for wire compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum IoMode {
    /// Inherit the parent's stdio.
    #[default]
    Default = 0,
    /// Caller consumes stdout through a pipe; the child gets no stdin.
    Input = 1,
    /// Caller writes the child's stdin; output is inherited.
    Output = 2,
    /// Full bidirectional pipes.
    Io = 3,
    /// All output discarded at the source.
    Sink = 4,
    /// A pty master pair replaces pipe stdio.
    Pty = 5,
    /// Synchronous blocking exec with no captured streams.
    System = 6,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownIoMode(pub u8);

impl fmt::Display for UnknownIoMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown io mode {}", self.0)
    }
}

impl std::error::Error for UnknownIoMode {}

impl From<UnknownIoMode> for io::Error {
    fn from(e: UnknownIoMode) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

impl TryFrom<u8> for IoMode {
    type Error = UnknownIoMode;

    fn try_from(v: u8) -> Result<Self, UnknownIoMode> {
        match v {
            0 => Ok(IoMode::Default),
            1 => Ok(IoMode::Input),
            2 => Ok(IoMode::Output),
            3 => Ok(IoMode::Io),
            4 => Ok(IoMode::Sink),
            5 => Ok(IoMode::Pty),
            6 => Ok(IoMode::System),
            other => Err(UnknownIoMode(other)),
        }
    }
}

/// Effective identity requested for a child process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Identity {
    /// Run as the invoking user.
    #[default]
    Current,
    /// Run as the platform administrator (uid 0 on POSIX).
    Administrator,
    Uid(u32),
    Username(String),
    /// Elevate through sudo with a password supplied by the caller.
    /// The password is consumed locally and never crosses the wire.
    FixedPasswordSudo(String),
}

impl Identity {
    pub fn is_current(&self) -> bool {
        matches!(self, Identity::Current)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Current => f.write_str("current user"),
            Identity::Administrator => f.write_str("administrator"),
            Identity::Uid(uid) => write!(f, "uid {uid}"),
            Identity::Username(name) => write!(f, "user {name}"),
            Identity::FixedPasswordSudo(_) => f.write_str("administrator (fixed password)"),
        }
    }
}

/// Exit status of a finished child.
///
/// The wire form is a single `i32`: a non-negative exit code, or the
/// negated signal number when the child was killed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExitStatus(i32);

impl ExitStatus {
    pub fn from_code(code: i32) -> Self {
        ExitStatus(code)
    }

    pub fn from_signal(signal: i32) -> Self {
        ExitStatus(-signal)
    }

    pub fn from_raw(raw: i32) -> Self {
        ExitStatus(raw)
    }

    pub fn into_raw(self) -> i32 {
        self.0
    }

    pub fn success(&self) -> bool {
        self.0 == 0
    }

    pub fn code(&self) -> Option<i32> {
        (self.0 >= 0).then_some(self.0)
    }

    pub fn signal(&self) -> Option<i32> {
        (self.0 < 0).then_some(-self.0)
    }

    /// Shell-convention exit code: the code itself, or `128 + signal`.
    pub fn shell_code(&self) -> i32 {
        match self.signal() {
            Some(sig) => 128 + sig,
            None => self.0,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signal() {
            Some(sig) => write!(f, "killed by signal {sig}"),
            None => write!(f, "exit code {}", self.0),
        }
    }
}
