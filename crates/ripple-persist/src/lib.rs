//! # Persistence seam
//!
//! Containers never know they are persisted. A [`Persistence`] handle owns a
//! [`Store`] and binds individual containers to keys with a [`Codec`]:
//!
//! ```rust
//! use ripple_core::State;
//! use ripple_persist::{JsonCodec, MemoryStore, Persistence};
//!
//! let store = MemoryStore::new();
//! let persistence = Persistence::new(store.clone()).with_prefix("cart");
//!
//! let count = State::new(0u32);
//! let _binding = persistence.bind(&count, "count", JsonCodec::new());
//! count.set(3);
//!
//! let restored = State::new(0u32);
//! persistence.bind(&restored, "count", JsonCodec::new());
//! assert_eq!(restored.get(), Ok(3));
//! ```

pub mod codec;
pub mod error;
pub mod persistence;
pub mod store;


pub use codec::{Codec, JsonCodec};
pub use error::{BoxError, PersistError};
pub use persistence::Persistence;
pub use store::{MemoryStore, Store};
