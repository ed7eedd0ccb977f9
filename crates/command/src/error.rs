// crates/command/src/error.rs
use std::io;
use thiserror::Error;

/// Exit code reported when an internal protocol error, rather than the
/// child itself, terminates a launch.
pub const PROTOCOL_EXIT_CODE: i32 = 125;

#[derive(Debug, Error)]
pub enum Error {
    #[error("command has an empty argument vector")]
    InvalidArgv,
    #[error("invalid environment variable name {0:?}")]
    InvalidEnv(String),
    #[error("identity cannot be used in this context: {0}")]
    InvalidIdentity(String),
    #[error("daemon unreachable: {0}")]
    DaemonUnreachable(String),
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("exec failed: {reason} (errno {errno})")]
    ExecFailed { reason: String, errno: i32 },
    #[error("identity switch refused by the operating system")]
    ElevationDenied,
    #[error("no mechanism available to run as the requested identity")]
    ElevationUnavailable,
    #[error("child killed by signal {0}")]
    ChildKilledBySignal(i32),
    #[error("wait interrupted")]
    Interrupted,
    #[error("operation not supported on this platform")]
    UnsupportedPlatform,
    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

const ENOENT: i32 = 2;

impl Error {
    /// Exit code a wrapper translating a failed launch should report.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::ChildKilledBySignal(sig) => 128 + sig,
            Error::ExecFailed { errno, .. } if *errno == ENOENT => 127,
            Error::ExecFailed { .. } => 126,
            _ => PROTOCOL_EXIT_CODE,
        }
    }

    pub fn is_retriable(&self) -> bool {
        matches!(self, Error::Interrupted)
    }
}
