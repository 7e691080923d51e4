// src/iff/byte_stream.rs

//! An appendable, positionally readable sequence of bytes.
//!
//! `ByteStream` is the sink every coder writes into and the source every
//! decoder reads from. Writing is append-only; reading is random access by
//! position, which is what the arithmetic decoders need when they peek one
//! byte ahead for marker detection. The only destructive operation is
//! [`ByteStream::truncate`], which the range coder uses to trim its optimal
//! termination.
//!
//! For persistence a stream can be written to any `Write` with a 4-byte
//! big-endian length prefix and read back from any `Read`.

use crate::utils::error::Result;
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use std::io::{Read, Write};

/// An ordered byte buffer shared between a coder session and its caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ByteStream {
    data: Vec<u8>,
}

impl ByteStream {
    /// Creates an empty stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty stream with room for `capacity` bytes.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            data: Vec::with_capacity(capacity),
        }
    }

    /// Appends one byte.
    #[inline]
    pub fn put_byte(&mut self, byte: u8) {
        self.data.push(byte);
    }

    /// Returns the byte at `pos`, or `None` past the end.
    #[inline]
    pub fn get_byte(&self, pos: usize) -> Option<u8> {
        self.data.get(pos).copied()
    }

    /// Overwrites an already written byte.
    #[inline]
    pub(crate) fn set_byte(&mut self, pos: usize, byte: u8) {
        self.data[pos] = byte;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Shortens the stream to `len` bytes. Has no effect if `len` is not
    /// shorter than the current length.
    pub fn truncate(&mut self, len: usize) {
        self.data.truncate(len);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }

    /// Writes the stream as a 4-byte big-endian length followed by the bytes.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_u32::<BigEndian>(self.data.len() as u32)?;
        writer.write_all(&self.data)?;
        Ok(())
    }

    /// Reads a stream previously written with [`ByteStream::write_to`].
    pub fn read_from<R: Read>(reader: &mut R) -> Result<Self> {
        let len = reader.read_u32::<BigEndian>()? as usize;
        let mut data = vec![0u8; len];
        reader.read_exact(&mut data)?;
        Ok(Self { data })
    }
}

impl From<Vec<u8>> for ByteStream {
    fn from(data: Vec<u8>) -> Self {
        Self { data }
    }
}

impl AsRef<[u8]> for ByteStream {
    fn as_ref(&self) -> &[u8] {
        &self.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_put_and_get() {
        let mut stream = ByteStream::new();
        assert!(stream.is_empty());
        stream.put_byte(0xAB);
        stream.put_byte(0xCD);
        assert_eq!(stream.len(), 2);
        assert_eq!(stream.get_byte(0), Some(0xAB));
        assert_eq!(stream.get_byte(1), Some(0xCD));
        assert_eq!(stream.get_byte(2), None);
    }

    #[test]
    fn test_truncate_only_shortens() {
        let mut stream = ByteStream::from(vec![1, 2, 3, 4]);
        stream.truncate(10);
        assert_eq!(stream.len(), 4);
        stream.truncate(2);
        assert_eq!(stream.as_slice(), &[1, 2]);
    }

    #[test]
    fn test_length_prefixed_persistence() {
        let stream = ByteStream::from(vec![0xFF, 0x7F, 0x00, 0x10]);
        let mut buf = Vec::new();
        stream.write_to(&mut buf).unwrap();
        assert_eq!(&buf[..4], &[0, 0, 0, 4]);

        let restored = ByteStream::read_from(&mut Cursor::new(buf)).unwrap();
        assert_eq!(restored, stream);
    }

    #[test]
    fn test_read_from_short_input_fails() {
        let buf = vec![0, 0, 0, 9, 1, 2];
        assert!(ByteStream::read_from(&mut Cursor::new(buf)).is_err());
    }
}
