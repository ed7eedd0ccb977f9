// crates/protocol/src/frames.rs
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::fmt;
use std::io::{self, Read, Write};

use crate::{FrameKind, MAX_PAYLOAD};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OversizedFrame(pub usize);

impl fmt::Display for OversizedFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "frame payload of {} bytes exceeds limit", self.0)
    }
}

impl std::error::Error for OversizedFrame {}

impl From<OversizedFrame> for io::Error {
    fn from(e: OversizedFrame) -> Self {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

pub trait FrameCodec: Sized {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()>;
    fn decode<R: Read>(r: &mut R) -> io::Result<Self>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub len: u32,
}

impl FrameHeader {
    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_u32::<BigEndian>(self.len)?;
        w.write_u8(self.kind as u8)?;
        Ok(())
    }

    pub fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let len = r.read_u32::<BigEndian>()?;
        if len as usize > MAX_PAYLOAD {
            return Err(OversizedFrame(len as usize).into());
        }
        let kind_byte = r.read_u8()?;
        let kind = FrameKind::try_from(kind_byte).map_err(io::Error::from)?;
        Ok(FrameHeader { kind, len })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub header: FrameHeader,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn new(kind: FrameKind, payload: Vec<u8>) -> Self {
        let len = payload.len() as u32;
        Frame {
            header: FrameHeader { kind, len },
            payload,
        }
    }

    pub fn kind(&self) -> FrameKind {
        self.header.kind
    }
}

impl FrameCodec for Frame {
    fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        if self.payload.len() > MAX_PAYLOAD {
            return Err(OversizedFrame(self.payload.len()).into());
        }
        self.header.encode(w)?;
        w.write_all(&self.payload)
    }

    fn decode<R: Read>(r: &mut R) -> io::Result<Self> {
        let header = FrameHeader::decode(r)?;
        let mut payload = vec![0; header.len as usize];
        r.read_exact(&mut payload)?;
        Ok(Frame { header, payload })
    }
}
