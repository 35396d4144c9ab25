use std::rc::Rc;

use ripple_core::{Dispose, Listenable, SetOutcome, State};

use crate::codec::Codec;
use crate::error::PersistError;
use crate::store::Store;

/// Handle to a store, passed explicitly to whatever builds persisted
/// containers. There is no global "initialize persistence first" step: a
/// container without a `Persistence` simply is not persisted.
#[derive(Clone)]
pub struct Persistence {
    store: Rc<dyn Store>,
    prefix: String,
}

impl Persistence {
    pub fn new(store: impl Store) -> Self {
        Self {
            store: Rc::new(store),
            prefix: String::new(),
        }
    }

    /// Namespaces every key as `<prefix>.<key>`.
    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.prefix = prefix.into();
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn full_key(&self, key: &str) -> String {
        if self.prefix.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.prefix, key)
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.store.read(&self.full_key(key)).is_some()
    }

    pub fn forget(&self, key: &str) {
        self.store.remove(&self.full_key(key));
    }

    /// Decodes the stored value for `key`, if any.
    pub fn load<T, C: Codec<T>>(&self, key: &str, codec: &C) -> Result<Option<T>, PersistError> {
        let key = self.full_key(key);
        load(&*self.store, &key, codec)
    }

    /// Writes the current value of `state`. Uninitialized containers are
    /// skipped.
    pub fn save<T, C: Codec<T>>(
        &self,
        state: &State<T>,
        key: &str,
        codec: &C,
    ) -> Result<bool, PersistError> {
        let key = self.full_key(key);
        save(&*self.store, state, &key, codec)
    }

    /// Restores the stored value into `state` without notifying. Returns
    /// `None` when nothing is stored.
    pub fn restore<T, C>(
        &self,
        state: &State<T>,
        key: &str,
        codec: &C,
    ) -> Result<Option<SetOutcome>, PersistError>
    where
        T: Clone + PartialEq + 'static,
        C: Codec<T>,
    {
        Ok(self
            .load(key, codec)?
            .map(|value| state.set_silently(value)))
    }

    /// Restores `state` from the store, then writes it back after every
    /// notification until the returned handle runs or `state` is disposed.
    ///
    /// A stored value that fails to decode is logged and left in place; the
    /// container keeps its current value and the next notification
    /// overwrites the entry. When nothing is stored, the current value is
    /// written immediately.
    pub fn bind<T, C>(&self, state: &State<T>, key: &str, codec: C) -> Dispose
    where
        T: Clone + PartialEq + 'static,
        C: Codec<T>,
    {
        let full = self.full_key(key);
        let codec = Rc::new(codec);

        match load(&*self.store, &full, &*codec) {
            Ok(Some(value)) => match state.set_silently(value) {
                SetOutcome::Rejected => {
                    log::warn!("restored value for `{full}` rejected by `{}`", state.label())
                }
                _ => log::debug!("restored `{}` from `{full}`", state.label()),
            },
            Ok(None) => report(save(&*self.store, state, &full, &*codec)),
            Err(err) => report::<()>(Err(err)),
        }

        let id = {
            let store = self.store.clone();
            let weak = state.downgrade();
            let full = full.clone();
            state.add_listener(move || {
                if let Some(state) = weak.upgrade() {
                    report(save(&*store, &state, &full, &*codec));
                }
            })
        };

        let detach = {
            let weak = state.downgrade();
            Dispose::new(move || {
                if let Some(state) = weak.upgrade() {
                    state.remove_listener(id);
                    log::debug!("`{}` detached from `{full}`", state.label());
                }
            })
        };
        let on_dispose = detach.clone();
        state.on_dispose(move || on_dispose.run());
        detach
    }
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("prefix", &self.prefix)
            .finish_non_exhaustive()
    }
}

fn load<T, C: Codec<T>>(store: &dyn Store, key: &str, codec: &C) -> Result<Option<T>, PersistError> {
    let Some(raw) = store.read(key) else {
        return Ok(None);
    };
    codec
        .decode(&raw)
        .map(Some)
        .map_err(|e| PersistError::Decode {
            key: key.to_string(),
            source: Box::new(e),
        })
}

fn save<T, C: Codec<T>>(
    store: &dyn Store,
    state: &State<T>,
    key: &str,
    codec: &C,
) -> Result<bool, PersistError> {
    let Ok(encoded) = state.with(|value| codec.encode(value)) else {
        return Ok(false);
    };
    let encoded = encoded.map_err(|e| PersistError::Encode {
        key: key.to_string(),
        source: Box::new(e),
    })?;
    store.write(key, encoded);
    Ok(true)
}

fn report<T>(result: Result<T, PersistError>) {
    if let Err(err) = result {
        match std::error::Error::source(&err) {
            Some(cause) => log::warn!("{err}: {cause}"),
            None => log::warn!("{err}"),
        }
    }
}
