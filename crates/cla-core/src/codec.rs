//! Checked big-endian primitive reads for the binary formats.
//!
//! Writers use [`bytes::BufMut`] directly. Readers go through these helpers so
//! a truncated payload becomes [`Error::Deserialization`] instead of a panic.

use bytes::Buf;

use crate::error::{Error, Result};

#[inline]
fn ensure(buf: &impl Buf, needed: usize, what: &str) -> Result<()> {
    if buf.remaining() < needed {
        return Err(Error::truncated(what, needed, buf.remaining()));
    }
    Ok(())
}

pub(crate) fn read_u8(buf: &mut impl Buf, what: &str) -> Result<u8> {
    ensure(buf, 1, what)?;
    Ok(buf.get_u8())
}

pub(crate) fn read_bool(buf: &mut impl Buf, what: &str) -> Result<bool> {
    match read_u8(buf, what)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(Error::Deserialization(format!(
            "invalid boolean {other} for {what}"
        ))),
    }
}

pub(crate) fn read_u16(buf: &mut impl Buf, what: &str) -> Result<u16> {
    ensure(buf, 2, what)?;
    Ok(buf.get_u16())
}

pub(crate) fn read_i32(buf: &mut impl Buf, what: &str) -> Result<i32> {
    ensure(buf, 4, what)?;
    Ok(buf.get_i32())
}

pub(crate) fn read_i64(buf: &mut impl Buf, what: &str) -> Result<i64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_i64())
}

pub(crate) fn read_f64(buf: &mut impl Buf, what: &str) -> Result<f64> {
    ensure(buf, 8, what)?;
    Ok(buf.get_f64())
}

/// Reads an `i32` that must be a valid non-negative length or index.
pub(crate) fn read_len(buf: &mut impl Buf, what: &str) -> Result<usize> {
    let raw = read_i32(buf, what)?;
    usize::try_from(raw).map_err(|_| Error::Deserialization(format!("negative {what}: {raw}")))
}

/// Reads `count` doubles, checking the remaining length once up front.
pub(crate) fn read_f64_vec(buf: &mut impl Buf, count: usize, what: &str) -> Result<Vec<f64>> {
    ensure(buf, count.saturating_mul(8), what)?;
    Ok((0..count).map(|_| buf.get_f64()).collect())
}

pub(crate) fn read_u16_vec(buf: &mut impl Buf, count: usize, what: &str) -> Result<Vec<u16>> {
    ensure(buf, count.saturating_mul(2), what)?;
    (0..count).map(|_| read_u16(&mut *buf, what)).collect()
}

pub(crate) fn read_u8_vec(buf: &mut impl Buf, count: usize, what: &str) -> Result<Vec<u8>> {
    ensure(buf, count, what)?;
    let mut out = vec![0u8; count];
    buf.copy_to_slice(&mut out);
    Ok(out)
}

/// Converts a size to the `i32` used on the wire.
pub(crate) fn wire_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value)
        .map_err(|_| Error::UnsupportedOperation(format!("{what} {value} exceeds i32 range")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::BufMut;

    #[test]
    fn test_truncated_read_is_error() {
        let mut buf: &[u8] = &[0, 1];

        let result = read_i32(&mut buf, "row count");

        match result {
            Err(Error::Deserialization(msg)) => assert!(msg.contains("row count")),
            other => panic!("expected deserialization error, got {other:?}"),
        }
    }

    #[test]
    fn test_invalid_bool() {
        let mut buf: &[u8] = &[7];
        assert!(read_bool(&mut buf, "flag").is_err());
    }

    #[test]
    fn test_negative_len() {
        let mut out = Vec::new();
        out.put_i32(-3);
        let mut buf: &[u8] = &out;
        assert!(read_len(&mut buf, "column count").is_err());
    }

    #[test]
    fn test_vec_reads() {
        let mut out = Vec::new();
        out.put_f64(1.5);
        out.put_f64(-2.0);
        out.put_u16(9);
        let mut buf: &[u8] = &out;

        let values = read_f64_vec(&mut buf, 2, "values").expect("values");
        let codes = read_u16_vec(&mut buf, 1, "codes").expect("codes");

        assert_eq!(values, vec![1.5, -2.0]);
        assert_eq!(codes, vec![9]);
        assert!(read_u8_vec(&mut buf, 1, "tail").is_err());
    }

    #[test]
    fn test_truncated_u16_reads_are_errors() {
        // Arrange
        let mut buf: &[u8] = &[0, 4, 1];

        // Act
        let first = read_u16(&mut buf, "code");
        let second = read_u16(&mut buf, "code");

        // Assert
        assert_eq!(first.expect("first code"), 4);
        assert!(matches!(second, Err(Error::Deserialization(_))));
        let mut short: &[u8] = &[0, 1, 0];
        assert!(read_u16_vec(&mut short, 2, "codes").is_err());
    }
}
