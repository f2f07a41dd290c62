//! Binary framing shared by every container format.
//!
//! Integers are little-endian. Strings carry a 7-bit variable-length byte
//! count (LEB128, at most five bytes) followed by UTF-8, which is what the
//! .NET `BinaryWriter`/`BinaryReader` pair produces.
//!
//! Read failures on malformed data are `io::ErrorKind::InvalidData`;
//! truncation is `io::ErrorKind::UnexpectedEof`. Callers decide whether
//! those mean "corrupt header" or "wrong key".

use std::io::{self, Read, Write};

/// Largest encoded length a 7-bit prefix may describe here.
const MAX_7BIT_BYTES: usize = 5;

fn invalid(msg: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.to_owned())
}

/// Write a 7-bit encoded unsigned length.
#[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
pub fn write_7bit_len<W: Write + ?Sized>(w: &mut W, len: usize) -> io::Result<()> {
    let mut value = u32::try_from(len).map_err(|_| invalid("length exceeds u32"))?;
    let mut out = [0u8; MAX_7BIT_BYTES];
    let mut i = 0;
    while value >= 0x80 {
        out[i] = (value & 0x7F) as u8 | 0x80;
        value >>= 7;
        i = i.saturating_add(1);
    }
    out[i] = value as u8;
    w.write_all(&out[..=i])
}

/// Read a 7-bit encoded unsigned length.
#[allow(clippy::arithmetic_side_effects)]
pub fn read_7bit_len<R: Read + ?Sized>(r: &mut R) -> io::Result<usize> {
    let mut value: u32 = 0;
    for i in 0..MAX_7BIT_BYTES {
        let mut byte = [0u8; 1];
        r.read_exact(&mut byte)?;
        let low = u32::from(byte[0] & 0x7F);
        // The fifth byte may only carry the top four bits.
        if i == MAX_7BIT_BYTES - 1 && low > 0x0F {
            return Err(invalid("7-bit length overflows u32"));
        }
        value |= low << (7 * i);
        if byte[0] & 0x80 == 0 {
            return usize::try_from(value).map_err(|_| invalid("length exceeds usize"));
        }
    }
    Err(invalid("7-bit length too long"))
}

/// Write a length-prefixed UTF-8 string.
pub fn write_string<W: Write + ?Sized>(w: &mut W, s: &str) -> io::Result<()> {
    write_7bit_len(w, s.len())?;
    w.write_all(s.as_bytes())
}

/// Read a length-prefixed UTF-8 string of at most `max_len` bytes.
pub fn read_string<R: Read + ?Sized>(r: &mut R, max_len: usize) -> io::Result<String> {
    let len = read_7bit_len(r)?;
    if len > max_len {
        return Err(invalid("string length out of range"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    String::from_utf8(buf).map_err(|_| invalid("string is not UTF-8"))
}

pub fn write_i32<W: Write + ?Sized>(w: &mut W, v: i32) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_i32<R: Read + ?Sized>(r: &mut R) -> io::Result<i32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(i32::from_le_bytes(buf))
}

pub fn write_i64<W: Write + ?Sized>(w: &mut W, v: i64) -> io::Result<()> {
    w.write_all(&v.to_le_bytes())
}

pub fn read_i64<R: Read + ?Sized>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Write `bytes` behind an `i32` length.
pub fn write_blob<W: Write + ?Sized>(w: &mut W, bytes: &[u8]) -> io::Result<()> {
    let len = i32::try_from(bytes.len()).map_err(|_| invalid("blob exceeds i32"))?;
    write_i32(w, len)?;
    w.write_all(bytes)
}

/// Read an `i32`-length blob whose length must lie in `1..=max_len`.
pub fn read_blob<R: Read + ?Sized>(r: &mut R, max_len: usize) -> io::Result<Vec<u8>> {
    let len = read_i32(r)?;
    let len = usize::try_from(len).map_err(|_| invalid("negative blob length"))?;
    if len == 0 || len > max_len {
        return Err(invalid("blob length out of range"));
    }
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Read up to `n` bytes, stopping early only at end of input.
pub fn read_prefix<R: Read + ?Sized>(r: &mut R, n: usize) -> io::Result<Vec<u8>> {
    let mut buf = Vec::with_capacity(n);
    r.take(n as u64).read_to_end(&mut buf)?;
    Ok(buf)
}
