//! Value Codec Module
//!
//! Values are stored as gzip-compressed serialized bytes with no extra
//! framing. The optional size limit applies to the serialized bytes before
//! compression, so a value's admission does not depend on how well it
//! compresses.

use std::io::{self, Read, Write};

use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::DataSerializer;
use crate::error::{CacheError, Result};

// == Limited Writer ==
/// A writer that refuses to pass on more than `limit` bytes.
#[derive(Debug)]
pub struct LimitedWriter<W> {
    inner: W,
    limit: Option<u64>,
    written: u64,
    exceeded: bool,
}

impl<W: Write> LimitedWriter<W> {
    /// Wraps `inner`; `None` means unlimited.
    pub fn new(inner: W, limit: Option<u64>) -> Self {
        Self {
            inner,
            limit,
            written: 0,
            exceeded: false,
        }
    }

    /// Bytes passed through so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// True once a write was refused for exceeding the limit.
    pub fn exceeded(&self) -> bool {
        self.exceeded
    }

    pub fn get_mut(&mut self) -> &mut W {
        &mut self.inner
    }
}

impl<W: Write> Write for LimitedWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if let Some(limit) = self.limit {
            if self.written + buf.len() as u64 > limit {
                self.exceeded = true;
                return Err(io::Error::new(
                    io::ErrorKind::Other,
                    format!("entry exceeds {} bytes", limit),
                ));
            }
        }
        let n = self.inner.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

// == Write Value ==
/// Serializes and compresses `value` into `sink`.
///
/// # Returns
/// The number of serialized bytes written, before compression.
///
/// # Errors
/// `CacheError::EntryTooLarge` when the serialized form exceeds `limit`;
/// serializer and I/O errors otherwise. On error `sink` may hold a prefix of
/// the output and must be discarded.
pub fn write_value<V, S>(
    serializer: &S,
    value: &V,
    sink: &mut dyn Write,
    limit: Option<u64>,
) -> Result<u64>
where
    S: DataSerializer<V> + ?Sized,
{
    let mut writer = LimitedWriter::new(GzEncoder::new(sink, Compression::default()), limit);
    let outcome = serializer
        .serialize(value, &mut writer)
        .and_then(|()| writer.get_mut().try_finish().map_err(CacheError::from));

    match outcome {
        Ok(()) => Ok(writer.written()),
        Err(_) if writer.exceeded() => Err(CacheError::EntryTooLarge {
            limit: limit.unwrap_or_default(),
        }),
        Err(err) => Err(err),
    }
}

// == Read Value ==
/// Decompresses and deserializes a value from `source`.
pub fn read_value<V, S>(serializer: &S, source: impl Read) -> Result<V>
where
    S: DataSerializer<V> + ?Sized,
{
    let mut decoder = GzDecoder::new(source);
    serializer.deserialize(&mut decoder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::{BytesSerializer, StringSerializer};

    /// Deterministic, incompressible bytes.
    fn noise(len: usize) -> Vec<u8> {
        let mut state: u32 = 0x9e37_79b9;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                (state >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_round_trip() {
        let mut blob = Vec::new();
        let written =
            write_value(&StringSerializer, &"hello".to_string(), &mut blob, None).unwrap();
        assert_eq!(written, 5);
        assert_eq!(gunzip_len(&blob), 5);

        let value: String = read_value(&StringSerializer, blob.as_slice()).unwrap();
        assert_eq!(value, "hello");
    }

    fn gunzip_len(blob: &[u8]) -> usize {
        let mut out = Vec::new();
        GzDecoder::new(blob).read_to_end(&mut out).unwrap();
        out.len()
    }

    #[test]
    fn test_limit_applies_to_serialized_bytes() {
        // compresses to a few dozen bytes, still over the limit
        let mut blob = Vec::new();
        let result = write_value(&BytesSerializer, &vec![b'a'; 2048], &mut blob, Some(1024));
        assert!(matches!(result, Err(CacheError::EntryTooLarge { limit: 1024 })));
    }

    #[test]
    fn test_oversized_value_is_rejected() {
        let mut blob = Vec::new();
        let result = write_value(&BytesSerializer, &noise(2048), &mut blob, Some(1024));
        assert!(matches!(result, Err(CacheError::EntryTooLarge { limit: 1024 })));
    }

    #[test]
    fn test_value_at_limit_fits() {
        let mut blob = Vec::new();
        let written = write_value(&BytesSerializer, &noise(1024), &mut blob, Some(1024)).unwrap();
        assert_eq!(written, 1024);
        assert_eq!(gunzip_len(&blob), 1024);
    }

    #[test]
    fn test_limited_writer() {
        let mut out = Vec::new();
        let mut writer = LimitedWriter::new(&mut out, Some(4));
        writer.write_all(b"abcd").unwrap();
        assert!(writer.write_all(b"e").is_err());
        assert!(writer.exceeded());
        assert_eq!(writer.written(), 4);
    }

    #[test]
    fn test_read_rejects_non_gzip() {
        let result: Result<String> = read_value(&StringSerializer, &b"plain text"[..]);
        assert!(result.is_err());
    }
}
