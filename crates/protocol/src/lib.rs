// crates/protocol/src/lib.rs
#![deny(unsafe_code)]
//! Wire protocol between the forker client and daemon.
//!
//! Every message travels as one frame: a big-endian `u32` payload length,
//! one kind byte, then the payload. Frames are delivered atomically;
//! payloads larger than [`MAX_PAYLOAD`] are rejected on both ends.
//!
//! A connection carries exactly one frame stream. Child-scoped frames
//! (`Stdin`, `Stdout`, `Stderr`, `StdinClose`, `Kill`, `Exit`) start their
//! payload with the daemon-assigned child pid as a `u32`, which is how
//! multiple concurrent children share the stream. `Launch` and its
//! `Launched`/`Failed` replies are request/response ordered on the
//! connection and carry no child id. Password-bearing identities never
//! cross the wire; they are sent as their target uid.

mod frames;
mod message;
mod wire;

pub use frames::{Frame, FrameCodec, FrameHeader, OversizedFrame};
pub use message::{LaunchRequest, Message};
pub use wire::{
    read_bytes, read_string, read_string_list, read_string_map, write_bytes, write_string,
    write_string_list, write_string_map,
};

use std::fmt;
use std::io;

/// Default loopback TCP port the daemon listens on.
pub const DEFAULT_PORT: u16 = 57671;

/// Largest payload accepted in a single frame.
pub const MAX_PAYLOAD: usize = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FrameKind {
    Hello = 0,
    HelloOk = 1,
    HelloReject = 2,
    Launch = 3,
    Launched = 4,
    Failed = 5,
    Stdin = 6,
    Stdout = 7,
    Stderr = 8,
    StdinClose = 9,
    Kill = 10,
    Exit = 11,
    Ping = 12,
    Pong = 13,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnknownKind(pub u8);

impl fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown frame kind {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl From<UnknownKind> for io::Error {
    fn from(e: UnknownKind) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

impl TryFrom<u8> for FrameKind {
    type Error = UnknownKind;

    fn try_from(v: u8) -> Result<Self, UnknownKind> {
        match v {
            0 => Ok(FrameKind::Hello),
            1 => Ok(FrameKind::HelloOk),
            2 => Ok(FrameKind::HelloReject),
            3 => Ok(FrameKind::Launch),
            4 => Ok(FrameKind::Launched),
            5 => Ok(FrameKind::Failed),
            6 => Ok(FrameKind::Stdin),
            7 => Ok(FrameKind::Stdout),
            8 => Ok(FrameKind::Stderr),
            9 => Ok(FrameKind::StdinClose),
            10 => Ok(FrameKind::Kill),
            11 => Ok(FrameKind::Exit),
            12 => Ok(FrameKind::Ping),
            13 => Ok(FrameKind::Pong),
            other => Err(UnknownKind(other)),
        }
    }
}
