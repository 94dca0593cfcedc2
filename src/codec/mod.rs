//! Codec Module
//!
//! Composes per-type serializers with gzip and base64 into the key and value
//! pipelines used by the cache engine.

mod key;
mod serializer;
mod value;

pub use key::{accounted_size, blob_name, decode_key, encode_key, encoded_key_of, DEFAULT_EXTENSION};
pub use serializer::{
    BytesSerializer, DataSerializer, JsonSerializer, SerializerRegistry, StringSerializer,
};
pub use value::{read_value, write_value, LimitedWriter};
