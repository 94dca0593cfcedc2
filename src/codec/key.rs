//! Key Codec Module
//!
//! Encodes keys into storage-safe identifiers:
//! serialize, gzip, base64 (standard alphabet, padded, unwrapped), then
//! replace `/` with `-`. Decoding runs the same steps in reverse.
//!
//! The gzip header is written with a zero mtime, so equal keys always map to
//! the same identifier.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;

use super::DataSerializer;
use crate::error::{CacheError, Result};

/// Base64 character that is unsafe in blob names.
const UNSAFE_CHAR: &str = "/";
/// Replacement for [`UNSAFE_CHAR`].
const SAFE_CHAR: &str = "-";

/// Default blob extension.
pub const DEFAULT_EXTENSION: &str = "bin";

// == Encode ==
/// Encodes a key into its storage-safe identifier.
pub fn encode_key<K, S>(serializer: &S, key: &K) -> Result<String>
where
    S: DataSerializer<K> + ?Sized,
{
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    serializer.serialize(key, &mut encoder)?;
    let compressed = encoder.finish()?;
    Ok(STANDARD.encode(compressed).replace(UNSAFE_CHAR, SAFE_CHAR))
}

// == Decode ==
/// Decodes an identifier produced by [`encode_key`] back into a key.
pub fn decode_key<K, S>(serializer: &S, encoded: &str) -> Result<K>
where
    S: DataSerializer<K> + ?Sized,
{
    let compressed = STANDARD.decode(encoded.replace(SAFE_CHAR, UNSAFE_CHAR))?;
    let mut decoder = GzDecoder::new(compressed.as_slice());
    serializer.deserialize(&mut decoder)
}

// == Blob Naming ==
/// Builds the blob name `<encoded-key>.<extension>`.
pub fn blob_name(encoded_key: &str, extension: &str) -> String {
    format!("{}.{}", encoded_key, extension)
}

/// Extracts the encoded key from a blob name.
///
/// Everything from the first `.` on is the extension; encoded keys never
/// contain a `.`.
pub fn encoded_key_of(blob_name: &str) -> Result<&str> {
    match blob_name.split_once('.') {
        Some((encoded, _)) if !encoded.is_empty() => Ok(encoded),
        _ => Err(CacheError::InvalidBlobName(blob_name.to_string())),
    }
}

/// Size a blob contributes to the cache total: encoded key length plus payload.
pub fn accounted_size(blob_name: &str, payload_size: u64) -> u64 {
    let key_len = blob_name
        .split_once('.')
        .map_or(blob_name.len(), |(encoded, _)| encoded.len());
    key_len as u64 + payload_size
}
