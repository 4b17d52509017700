//! Little-endian primitive readers and writers.

use std::io::{self, Read, Write};

/// Reads a single byte.
pub fn read_u8<R: Read>(r: &mut R) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads an unsigned 16-bit little-endian integer.
pub fn read_u16_le<R: Read>(r: &mut R) -> io::Result<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

/// Reads an unsigned 32-bit little-endian integer.
pub fn read_u32_le<R: Read>(r: &mut R) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads an unsigned 64-bit little-endian integer.
pub fn read_u64_le<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

/// Reads a signed 64-bit little-endian integer.
pub fn read_i64_le<R: Read>(r: &mut R) -> io::Result<i64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(i64::from_le_bytes(buf))
}

/// Reads exact number of bytes into a new vector.
pub fn read_bytes<R: Read>(r: &mut R, count: usize) -> io::Result<Vec<u8>> {
    let mut buf = vec![0u8; count];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Writes an unsigned 16-bit little-endian integer.
pub fn write_u16_le<W: Write>(w: &mut W, value: u16) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 32-bit little-endian integer.
pub fn write_u32_le<W: Write>(w: &mut W, value: u32) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes an unsigned 64-bit little-endian integer.
pub fn write_u64_le<W: Write>(w: &mut W, value: u64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

/// Writes a signed 64-bit little-endian integer.
pub fn write_i64_le<W: Write>(w: &mut W, value: i64) -> io::Result<()> {
    w.write_all(&value.to_le_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_integers_are_little_endian() {
        let mut buf = Vec::new();
        write_u16_le(&mut buf, 0x0102).unwrap();
        write_u32_le(&mut buf, 0x03040506).unwrap();
        write_i64_le(&mut buf, -2).unwrap();
        assert_eq!(&buf[..6], &[0x02, 0x01, 0x06, 0x05, 0x04, 0x03]);

        let mut r = Cursor::new(buf);
        assert_eq!(read_u16_le(&mut r).unwrap(), 0x0102);
        assert_eq!(read_u32_le(&mut r).unwrap(), 0x03040506);
        assert_eq!(read_i64_le(&mut r).unwrap(), -2);
    }

    #[test]
    fn test_short_input_is_eof() {
        let mut r = Cursor::new(vec![1u8, 2, 3]);
        let err = read_u64_le(&mut r).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }
}
