// crates/protocol/src/message.rs
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use command::{Descriptor, Identity, IoMode};

use crate::frames::{Frame, FrameCodec};
use crate::wire::{
    read_bytes, read_opt_string, read_string, read_string_list, read_string_map, write_bytes,
    write_opt_string, write_string, write_string_list, write_string_map,
};
use crate::FrameKind;

/// Everything the daemon needs to start one child.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchRequest {
    pub argv: Vec<String>,
    pub cwd: Option<String>,
    pub env: Vec<(String, String)>,
    pub io_mode: IoMode,
    pub identity: Identity,
    pub redirect_err_to_out: bool,
    pub pty_rows: u16,
    pub pty_cols: u16,
    pub term: Option<String>,
}

impl LaunchRequest {
    pub fn from_descriptor(desc: &Descriptor) -> Self {
        LaunchRequest {
            argv: desc.argv().to_vec(),
            cwd: desc.cwd().map(|p| p.to_string_lossy().into_owned()),
            env: desc
                .env_overlay()
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
            io_mode: desc.io_mode(),
            identity: desc.identity().clone(),
            redirect_err_to_out: desc.redirect_err_to_out(),
            pty_rows: desc.pty_hints().map(|h| h.rows).unwrap_or(0),
            pty_cols: desc.pty_hints().map(|h| h.cols).unwrap_or(0),
            term: desc.pty_hints().and_then(|h| h.term.clone()),
        }
    }
}

// Identity wire kinds. A password-bearing identity is sent as its target
// uid; the password itself stays on the client.
fn identity_wire(identity: &Identity) -> (u8, Option<String>) {
    match identity {
        Identity::Current => (0, None),
        Identity::Administrator => (1, None),
        Identity::Uid(uid) => (2, Some(uid.to_string())),
        Identity::Username(name) => (3, Some(name.clone())),
        Identity::FixedPasswordSudo(_) => (2, Some("0".to_string())),
    }
}

fn identity_from_wire(kind: u8, arg: Option<String>) -> io::Result<Identity> {
    let bad = || io::Error::new(io::ErrorKind::InvalidData, "invalid identity encoding");
    match kind {
        0 => Ok(Identity::Current),
        1 => Ok(Identity::Administrator),
        2 => {
            let uid = arg.ok_or_else(bad)?.parse().map_err(|_| bad())?;
            Ok(Identity::Uid(uid))
        }
        3 => Ok(Identity::Username(arg.ok_or_else(bad)?)),
        _ => Err(bad()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Hello { cookie: Vec<u8> },
    HelloOk,
    HelloReject { reason: String },
    Launch(LaunchRequest),
    Launched { pid: u32 },
    Failed { reason: String, errno: i32 },
    Stdin { pid: u32, data: Vec<u8> },
    Stdout { pid: u32, data: Vec<u8> },
    Stderr { pid: u32, data: Vec<u8> },
    StdinClose { pid: u32 },
    Kill { pid: u32, signal: i32 },
    Exit { pid: u32, status: i32 },
    Ping,
    Pong,
}

impl Message {
    pub fn kind(&self) -> FrameKind {
        match self {
            Message::Hello { .. } => FrameKind::Hello,
            Message::HelloOk => FrameKind::HelloOk,
            Message::HelloReject { .. } => FrameKind::HelloReject,
            Message::Launch(_) => FrameKind::Launch,
            Message::Launched { .. } => FrameKind::Launched,
            Message::Failed { .. } => FrameKind::Failed,
            Message::Stdin { .. } => FrameKind::Stdin,
            Message::Stdout { .. } => FrameKind::Stdout,
            Message::Stderr { .. } => FrameKind::Stderr,
            Message::StdinClose { .. } => FrameKind::StdinClose,
            Message::Kill { .. } => FrameKind::Kill,
            Message::Exit { .. } => FrameKind::Exit,
            Message::Ping => FrameKind::Ping,
            Message::Pong => FrameKind::Pong,
        }
    }

    pub fn into_frame(self) -> Frame {
        let kind = self.kind();
        let mut payload = Vec::new();
        self.encode_payload(&mut payload)
            .expect("writing to a Vec cannot fail");
        Frame::new(kind, payload)
    }

    fn encode_payload(&self, w: &mut Vec<u8>) -> io::Result<()> {
        match self {
            Message::Hello { cookie } => write_bytes(w, cookie),
            Message::HelloOk | Message::Ping | Message::Pong => Ok(()),
            Message::HelloReject { reason } => write_string(w, reason),
            Message::Launch(req) => {
                write_string_list(w, &req.argv)?;
                write_opt_string(w, req.cwd.as_deref())?;
                write_string_map(w, &req.env)?;
                w.write_u8(req.io_mode as u8)?;
                let (kind, arg) = identity_wire(&req.identity);
                w.write_u8(kind)?;
                write_opt_string(w, arg.as_deref())?;
                w.write_u8(req.redirect_err_to_out as u8)?;
                w.write_u16::<BigEndian>(req.pty_rows)?;
                w.write_u16::<BigEndian>(req.pty_cols)?;
                write_opt_string(w, req.term.as_deref())
            }
            Message::Launched { pid } => w.write_u32::<BigEndian>(*pid),
            Message::Failed { reason, errno } => {
                write_string(w, reason)?;
                w.write_i32::<BigEndian>(*errno)
            }
            Message::Stdin { pid, data }
            | Message::Stdout { pid, data }
            | Message::Stderr { pid, data } => {
                w.write_u32::<BigEndian>(*pid)?;
                write_bytes(w, data)
            }
            Message::StdinClose { pid } => w.write_u32::<BigEndian>(*pid),
            Message::Kill { pid, signal } => {
                w.write_u32::<BigEndian>(*pid)?;
                w.write_i32::<BigEndian>(*signal)
            }
            Message::Exit { pid, status } => {
                w.write_u32::<BigEndian>(*pid)?;
                w.write_i32::<BigEndian>(*status)
            }
        }
    }

    pub fn from_frame(frame: Frame) -> io::Result<Self> {
        let kind = frame.kind();
        let mut r = frame.payload.as_slice();
        let msg = match kind {
            FrameKind::Hello => Message::Hello {
                cookie: read_bytes(&mut r)?,
            },
            FrameKind::HelloOk => Message::HelloOk,
            FrameKind::HelloReject => Message::HelloReject {
                reason: read_string(&mut r)?,
            },
            FrameKind::Launch => {
                let argv = read_string_list(&mut r)?;
                let cwd = read_opt_string(&mut r)?;
                let env = read_string_map(&mut r)?;
                let io_mode = IoMode::try_from(r.read_u8()?).map_err(io::Error::from)?;
                let identity_kind = r.read_u8()?;
                let identity_arg = read_opt_string(&mut r)?;
                let identity = identity_from_wire(identity_kind, identity_arg)?;
                let redirect_err_to_out = r.read_u8()? != 0;
                let pty_rows = r.read_u16::<BigEndian>()?;
                let pty_cols = r.read_u16::<BigEndian>()?;
                let term = read_opt_string(&mut r)?;
                Message::Launch(LaunchRequest {
                    argv,
                    cwd,
                    env,
                    io_mode,
                    identity,
                    redirect_err_to_out,
                    pty_rows,
                    pty_cols,
                    term,
                })
            }
            FrameKind::Launched => Message::Launched {
                pid: r.read_u32::<BigEndian>()?,
            },
            FrameKind::Failed => {
                let reason = read_string(&mut r)?;
                let errno = r.read_i32::<BigEndian>()?;
                Message::Failed { reason, errno }
            }
            FrameKind::Stdin => Message::Stdin {
                pid: r.read_u32::<BigEndian>()?,
                data: read_bytes(&mut r)?,
            },
            FrameKind::Stdout => Message::Stdout {
                pid: r.read_u32::<BigEndian>()?,
                data: read_bytes(&mut r)?,
            },
            FrameKind::Stderr => Message::Stderr {
                pid: r.read_u32::<BigEndian>()?,
                data: read_bytes(&mut r)?,
            },
            FrameKind::StdinClose => Message::StdinClose {
                pid: r.read_u32::<BigEndian>()?,
            },
            FrameKind::Kill => Message::Kill {
                pid: r.read_u32::<BigEndian>()?,
                signal: r.read_i32::<BigEndian>()?,
            },
            FrameKind::Exit => Message::Exit {
                pid: r.read_u32::<BigEndian>()?,
                status: r.read_i32::<BigEndian>()?,
            },
            FrameKind::Ping => Message::Ping,
            FrameKind::Pong => Message::Pong,
        };
        if !r.is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "trailing bytes in frame payload",
            ));
        }
        Ok(msg)
    }

    pub fn write_to<W: Write>(self, w: &mut W) -> io::Result<()> {
        self.into_frame().encode(w)
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        Message::from_frame(Frame::decode(r)?)
    }
}
