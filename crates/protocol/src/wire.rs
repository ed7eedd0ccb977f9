// crates/protocol/src/wire.rs
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::MAX_PAYLOAD;

fn bounded_len<R: Read>(r: &mut R) -> io::Result<usize> {
    let len = r.read_u32::<BigEndian>()? as usize;
    if len > MAX_PAYLOAD {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "length prefix exceeds frame limit",
        ));
    }
    Ok(len)
}

pub fn write_string<W: Write>(w: &mut W, s: &str) -> io::Result<()> {
    w.write_u32::<BigEndian>(s.len() as u32)?;
    w.write_all(s.as_bytes())
}

pub fn read_string<R: Read>(r: &mut R) -> io::Result<String> {
    let len = bounded_len(r)?;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "string is not UTF-8"))
}

pub fn write_string_list<W: Write>(w: &mut W, items: &[String]) -> io::Result<()> {
    w.write_u32::<BigEndian>(items.len() as u32)?;
    for item in items {
        write_string(w, item)?;
    }
    Ok(())
}

pub fn read_string_list<R: Read>(r: &mut R) -> io::Result<Vec<String>> {
    let count = bounded_len(r)?;
    let mut items = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        items.push(read_string(r)?);
    }
    Ok(items)
}

pub fn write_string_map<W: Write>(w: &mut W, pairs: &[(String, String)]) -> io::Result<()> {
    w.write_u32::<BigEndian>(pairs.len() as u32)?;
    for (name, value) in pairs {
        write_string(w, name)?;
        write_string(w, value)?;
    }
    Ok(())
}

pub fn read_string_map<R: Read>(r: &mut R) -> io::Result<Vec<(String, String)>> {
    let count = bounded_len(r)?;
    let mut pairs = Vec::with_capacity(count.min(64));
    for _ in 0..count {
        let name = read_string(r)?;
        let value = read_string(r)?;
        pairs.push((name, value));
    }
    Ok(pairs)
}

pub fn write_bytes<W: Write>(w: &mut W, data: &[u8]) -> io::Result<()> {
    w.write_u32::<BigEndian>(data.len() as u32)?;
    w.write_all(data)
}

pub fn read_bytes<R: Read>(r: &mut R) -> io::Result<Vec<u8>> {
    let len = bounded_len(r)?;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

pub(crate) fn write_opt_string<W: Write>(w: &mut W, s: Option<&str>) -> io::Result<()> {
    match s {
        Some(s) => {
            w.write_u8(1)?;
            write_string(w, s)
        }
        None => w.write_u8(0),
    }
}

pub(crate) fn read_opt_string<R: Read>(r: &mut R) -> io::Result<Option<String>> {
    match r.read_u8()? {
        0 => Ok(None),
        1 => Ok(Some(read_string(r)?)),
        _ => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "invalid presence flag",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn string_roundtrip() {
        let mut buf = Vec::new();
        write_string(&mut buf, "héllo").unwrap();
        assert_eq!(read_string(&mut buf.as_slice()).unwrap(), "héllo");
    }

    #[test]
    fn non_utf8_string_errors() {
        let mut buf = Vec::new();
        write_bytes(&mut buf, &[0xff, 0xfe]).unwrap();
        assert!(read_string(&mut buf.as_slice()).is_err());
    }

    #[test]
    fn list_roundtrip() {
        let items = vec!["echo".to_string(), "hello world".to_string()];
        let mut buf = Vec::new();
        write_string_list(&mut buf, &items).unwrap();
        assert_eq!(read_string_list(&mut buf.as_slice()).unwrap(), items);
    }

    #[test]
    fn map_roundtrip() {
        let pairs = vec![
            ("PATH".to_string(), "/bin".to_string()),
            ("TERM".to_string(), "xterm".to_string()),
        ];
        let mut buf = Vec::new();
        write_string_map(&mut buf, &pairs).unwrap();
        assert_eq!(read_string_map(&mut buf.as_slice()).unwrap(), pairs);
    }

    #[test]
    fn optional_string_roundtrip() {
        let mut buf = Vec::new();
        write_opt_string(&mut buf, Some("/tmp")).unwrap();
        write_opt_string(&mut buf, None).unwrap();
        let mut r = buf.as_slice();
        assert_eq!(read_opt_string(&mut r).unwrap().as_deref(), Some("/tmp"));
        assert_eq!(read_opt_string(&mut r).unwrap(), None);
    }

    #[test]
    fn absurd_length_prefix_errors() {
        let buf = u32::MAX.to_be_bytes();
        assert!(read_string(&mut &buf[..]).is_err());
    }
}
