use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Key/value backend holding encoded strings.
pub trait Store: 'static {
    fn read(&self, key: &str) -> Option<String>;
    fn write(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process store. Clones share the same map.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    entries: Rc<RefCell<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.borrow().is_empty()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.entries.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl Store for MemoryStore {
    fn read(&self, key: &str) -> Option<String> {
        self.entries.borrow().get(key).cloned()
    }

    fn write(&self, key: &str, value: String) {
        self.entries.borrow_mut().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries.borrow_mut().remove(key);
    }
}
