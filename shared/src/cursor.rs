//! Sequential little-endian reader and writer over byte buffers.
//!
//! Every multi-byte integer on the wire is little-endian. Strings are
//! null-terminated; a string missing its terminator runs to the end of the
//! buffer, which is how servers in the wild get away with truncated trailers.

use thiserror::Error;

/// Failure while reading a buffer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CursorError {
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },
}

/// Forward-only reader that tracks how much input is left.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Reader positioned at the start of `buf`.
    pub fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    /// Number of unread bytes.
    pub fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// The unread tail of the buffer. Does not advance.
    pub fn rest(&self) -> &'a [u8] {
        &self.buf[self.pos..]
    }

    /// Advances past `count` bytes.
    pub fn skip(&mut self, count: usize) -> Result<(), CursorError> {
        self.read_bytes(count).map(|_| ())
    }

    /// Takes the next `count` bytes.
    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8], CursorError> {
        let remaining = self.remaining();
        if count > remaining {
            return Err(CursorError::UnexpectedEof {
                needed: count,
                remaining,
            });
        }

        let bytes = &self.buf[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N], CursorError> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// Reads one byte.
    pub fn read_u8(&mut self) -> Result<u8, CursorError> {
        Ok(self.read_array::<1>()?[0])
    }

    pub fn read_i8(&mut self) -> Result<i8, CursorError> {
        Ok(i8::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian u16.
    pub fn read_u16_le(&mut self) -> Result<u16, CursorError> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i16_le(&mut self) -> Result<i16, CursorError> {
        Ok(i16::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_le(&mut self) -> Result<u32, CursorError> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian i32.
    pub fn read_i32_le(&mut self) -> Result<i32, CursorError> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    /// Reads a little-endian f32.
    pub fn read_f32_le(&mut self) -> Result<f32, CursorError> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    /// Reads up to the next NUL (consumed, not returned) or to the end of the
    /// buffer. Invalid UTF-8 is replaced rather than rejected.
    pub fn read_cstring(&mut self) -> Result<String, CursorError> {
        let rest = self.rest();
        let (text, consumed) = match rest.iter().position(|&b| b == 0) {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.pos += consumed;
        Ok(String::from_utf8_lossy(text).into_owned())
    }
}

/// Growable little-endian writer used to build requests and responses.
#[derive(Debug, Clone, Default)]
pub struct ByteWriter {
    buf: Vec<u8>,
}

impl ByteWriter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Writer with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes written so far.
    pub fn as_slice(&self) -> &[u8] {
        &self.buf
    }

    /// Consumes the writer and returns its buffer.
    pub fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    /// Appends raw bytes.
    pub fn write_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.buf.extend_from_slice(bytes);
        self
    }

    pub fn write_u8(&mut self, value: u8) -> &mut Self {
        self.buf.push(value);
        self
    }

    pub fn write_i8(&mut self, value: i8) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u16_le(&mut self, value: u16) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i16_le(&mut self, value: i16) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_u32_le(&mut self, value: u32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_i32_le(&mut self, value: i32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    pub fn write_f32_le(&mut self, value: f32) -> &mut Self {
        self.write_bytes(&value.to_le_bytes())
    }

    /// Writes `value` followed by a NUL terminator.
    pub fn write_cstring(&mut self, value: &str) -> &mut Self {
        self.write_bytes(value.as_bytes()).write_u8(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_reads_little_endian_integers() {
        let data = [0xfe, 0xff, 0xff, 0xff, 0x60, 0x09, 0x7f];
        let mut reader = ByteReader::new(&data);

        assert_eq!(reader.read_i32_le().unwrap(), -2);
        assert_eq!(reader.read_i16_le().unwrap(), 2400);
        assert_eq!(reader.read_u8().unwrap(), 0x7f);
        assert!(reader.is_empty());
    }

    #[test]
    fn test_read_float() {
        let data = 12.5f32.to_le_bytes();
        let mut reader = ByteReader::new(&data);
        assert_approx_eq!(reader.read_f32_le().unwrap(), 12.5, 0.0001);
    }

    #[test]
    fn test_read_past_end_is_an_error() {
        let data = [1u8, 2];
        let mut reader = ByteReader::new(&data);

        let err = reader.read_i32_le().unwrap_err();
        assert_eq!(
            err,
            CursorError::UnexpectedEof {
                needed: 4,
                remaining: 2
            }
        );
        // A failed read leaves the cursor where it was
        assert_eq!(reader.remaining(), 2);
    }

    #[test]
    fn test_cstring_consumes_terminator() {
        let data = b"de_dust2\0cstrike\0";
        let mut reader = ByteReader::new(data);

        assert_eq!(reader.read_cstring().unwrap(), "de_dust2");
        assert_eq!(reader.read_cstring().unwrap(), "cstrike");
        assert!(reader.is_empty());
    }

    #[test]
    fn test_unterminated_cstring_runs_to_end() {
        let data = b"1.0.0.70";
        let mut reader = ByteReader::new(data);

        assert_eq!(reader.read_cstring().unwrap(), "1.0.0.70");
        assert_eq!(reader.remaining(), 0);
        assert_eq!(reader.read_cstring().unwrap(), "");
    }

    #[test]
    fn test_skip_and_rest() {
        let data = [0u8, 1, 2, 3, 4, 5];
        let mut reader = ByteReader::new(&data);

        reader.skip(2).unwrap();
        assert_eq!(reader.remaining(), 4);
        assert_eq!(reader.rest(), &[2, 3, 4, 5]);
        assert!(reader.skip(5).is_err());
    }

    #[test]
    fn test_writer_builds_request_preamble() {
        let mut writer = ByteWriter::new();
        writer.write_i32_le(-1).write_u8(b'T').write_cstring("abc");

        assert_eq!(
            writer.as_slice(),
            &[0xff, 0xff, 0xff, 0xff, b'T', b'a', b'b', b'c', 0]
        );
        assert_eq!(writer.len(), 9);
    }
}
