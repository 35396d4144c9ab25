use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum PersistError {
    #[error("stored value for `{key}` could not be decoded")]
    Decode {
        key: String,
        #[source]
        source: BoxError,
    },
    #[error("value for `{key}` could not be encoded")]
    Encode {
        key: String,
        #[source]
        source: BoxError,
    },
}

impl PersistError {
    pub fn key(&self) -> &str {
        match self {
            PersistError::Decode { key, .. } | PersistError::Encode { key, .. } => key,
        }
    }
}
