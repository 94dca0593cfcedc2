//! Serializer Module
//!
//! Per-type marshalling of keys and values, plus a runtime registry for
//! wiring caches whose types are only known by type id.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::io::{Read, Write};
use std::marker::PhantomData;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{CacheError, Result};

// == Data Serializer ==
/// Turns one type into bytes and back.
pub trait DataSerializer<T>: Send + Sync {
    /// Writes `value` to `sink`.
    fn serialize(&self, value: &T, sink: &mut dyn Write) -> Result<()>;

    /// Reads a value back from `source`.
    fn deserialize(&self, source: &mut dyn Read) -> Result<T>;
}

// == JSON Serializer ==
/// Serializes any serde type as JSON.
pub struct JsonSerializer<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonSerializer<T> {
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonSerializer<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonSerializer<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonSerializer<{}>", type_name::<T>())
    }
}

impl<T> DataSerializer<T> for JsonSerializer<T>
where
    T: Serialize + DeserializeOwned,
{
    fn serialize(&self, value: &T, sink: &mut dyn Write) -> Result<()> {
        serde_json::to_writer(sink, value)?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<T> {
        Ok(serde_json::from_reader(source)?)
    }
}

// == String Serializer ==
/// Stores strings as raw UTF-8.
#[derive(Debug, Default, Clone, Copy)]
pub struct StringSerializer;

impl DataSerializer<String> for StringSerializer {
    fn serialize(&self, value: &String, sink: &mut dyn Write) -> Result<()> {
        sink.write_all(value.as_bytes())?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<String> {
        let mut value = String::new();
        source.read_to_string(&mut value)?;
        Ok(value)
    }
}

// == Bytes Serializer ==
/// Stores byte vectors verbatim.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytesSerializer;

impl DataSerializer<Vec<u8>> for BytesSerializer {
    fn serialize(&self, value: &Vec<u8>, sink: &mut dyn Write) -> Result<()> {
        sink.write_all(value)?;
        Ok(())
    }

    fn deserialize(&self, source: &mut dyn Read) -> Result<Vec<u8>> {
        let mut value = Vec::new();
        source.read_to_end(&mut value)?;
        Ok(value)
    }
}

// == Serializer Registry ==
/// Runtime lookup of serializers keyed by type id.
///
/// Exactly one serializer is kept per type; registering again replaces it.
#[derive(Default)]
pub struct SerializerRegistry {
    serializers: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl SerializerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry preloaded with `String` and `Vec<u8>` serializers.
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry
            .register::<String>(Arc::new(StringSerializer))
            .register::<Vec<u8>>(Arc::new(BytesSerializer));
        registry
    }

    /// Registers the serializer for `T`.
    pub fn register<T: 'static>(&mut self, serializer: Arc<dyn DataSerializer<T>>) -> &mut Self {
        self.serializers
            .insert(TypeId::of::<T>(), Box::new(serializer));
        self
    }

    /// Registers a JSON serializer for `T`.
    pub fn register_json<T>(&mut self) -> &mut Self
    where
        T: Serialize + DeserializeOwned + 'static,
    {
        self.register::<T>(Arc::new(JsonSerializer::<T>::new()))
    }

    /// Resolves the serializer for `T`.
    ///
    /// # Errors
    /// `CacheError::NoSerializer` when nothing is registered for `T`.
    pub fn resolve<T: 'static>(&self) -> Result<Arc<dyn DataSerializer<T>>> {
        self.serializers
            .get(&TypeId::of::<T>())
            .and_then(|entry| entry.downcast_ref::<Arc<dyn DataSerializer<T>>>())
            .cloned()
            .ok_or_else(|| CacheError::NoSerializer(type_name::<T>().to_string()))
    }

    /// Returns true if a serializer is registered for `T`.
    pub fn contains<T: 'static>(&self) -> bool {
        self.serializers.contains_key(&TypeId::of::<T>())
    }
}

impl fmt::Debug for SerializerRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerializerRegistry")
            .field("types", &self.serializers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Lookup {
        host: String,
        port: u16,
    }

    #[test]
    fn test_json_serializer() {
        let serializer = JsonSerializer::<Lookup>::new();
        let value = Lookup {
            host: "example.org".to_string(),
            port: 443,
        };

        let mut bytes = Vec::new();
        serializer.serialize(&value, &mut bytes).unwrap();
        assert_eq!(bytes, br#"{"host":"example.org","port":443}"#);

        let decoded = serializer.deserialize(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn test_json_serializer_rejects_garbage() {
        let serializer = JsonSerializer::<Lookup>::new();
        let result = serializer.deserialize(&mut &b"{not json"[..]);
        assert!(matches!(result, Err(CacheError::Json(_))));
    }

    #[test]
    fn test_string_serializer_rejects_invalid_utf8() {
        let result = StringSerializer.deserialize(&mut &[0xff, 0xfe][..]);
        assert!(matches!(result, Err(CacheError::Io(_))));
    }

    #[test]
    fn test_registry_resolve() {
        let mut registry = SerializerRegistry::with_defaults();
        registry.register_json::<Lookup>();

        assert!(registry.contains::<String>());
        assert!(registry.contains::<Lookup>());
        assert!(registry.resolve::<Vec<u8>>().is_ok());
        assert!(registry.resolve::<Lookup>().is_ok());
    }

    #[test]
    fn test_registry_missing_type_fails_fast() {
        let registry = SerializerRegistry::new();
        match registry.resolve::<u64>() {
            Err(CacheError::NoSerializer(name)) => assert_eq!(name, "u64"),
            other => panic!("expected NoSerializer, got {:?}", other.map(|_| ())),
        }
    }
}
