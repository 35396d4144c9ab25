use std::marker::PhantomData;

use serde::Serialize;
use serde::de::DeserializeOwned;

/// String encoding for one value type. Persistence owns the codec; the
/// container never sees the encoded form.
pub trait Codec<T>: 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode(&self, value: &T) -> Result<String, Self::Error>;
    fn decode(&self, raw: &str) -> Result<T, Self::Error>;
}

/// JSON via `serde_json`.
pub struct JsonCodec<T>(PhantomData<fn() -> T>);

impl<T> JsonCodec<T> {
    pub fn new() -> Self {
        Self(PhantomData)
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for JsonCodec<T> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<T: Serialize + DeserializeOwned + 'static> Codec<T> for JsonCodec<T> {
    type Error = serde_json::Error;

    fn encode(&self, value: &T) -> Result<String, Self::Error> {
        serde_json::to_string(value)
    }

    fn decode(&self, raw: &str) -> Result<T, Self::Error> {
        serde_json::from_str(raw)
    }
}
