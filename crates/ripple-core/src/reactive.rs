//! Dependency/observer bookkeeping attached to advanced containers.
//!
//! Edges are kept as an explicit adjacency map keyed by the source's
//! [`NodeId`]. Each edge remembers the source notifier weakly together with
//! the [`ListenerId`] it registered there, so tearing an edge down never
//! depends on closures being dropped in the right order.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::{Rc, Weak};

use smallvec::SmallVec;

use crate::notifier::{ListenerId, NodeId, Notifier};

pub type Observer<T> = Rc<dyn Fn(&T)>;

struct Edge {
    source: Weak<Notifier>,
    listener: ListenerId,
}

struct Validator<T> {
    predicate: Rc<dyn Fn(&T) -> bool>,
    on_rejected: Option<Rc<dyn Fn(&T)>>,
}

pub(crate) struct GraphLayer<T: 'static> {
    // source node -> listener registered on it
    edges: RefCell<BTreeMap<NodeId, Edge>>,
    observers: RefCell<Vec<(String, Observer<T>)>>,
    validator: RefCell<Option<Validator<T>>>,
    // set while a dependency reaction runs; breaks graph cycles
    running: Cell<bool>,
}

impl<T: 'static> GraphLayer<T> {
    pub(crate) fn new() -> Self {
        Self {
            edges: RefCell::new(BTreeMap::new()),
            observers: RefCell::new(Vec::new()),
            validator: RefCell::new(None),
            running: Cell::new(false),
        }
    }

    pub(crate) fn has_edge(&self, source: NodeId) -> bool {
        self.edges.borrow().contains_key(&source)
    }

    pub(crate) fn insert_edge(&self, source: &Rc<Notifier>, listener: ListenerId) {
        self.edges.borrow_mut().insert(
            source.id(),
            Edge {
                source: Rc::downgrade(source),
                listener,
            },
        );
    }

    pub(crate) fn remove_edge(&self, source: NodeId) -> bool {
        let edge = self.edges.borrow_mut().remove(&source);
        match edge {
            Some(edge) => {
                if let Some(notifier) = edge.source.upgrade() {
                    notifier.remove(edge.listener);
                }
                true
            }
            None => false,
        }
    }

    pub(crate) fn clear_edges(&self) {
        let edges = std::mem::take(&mut *self.edges.borrow_mut());
        for (_, edge) in edges {
            if let Some(notifier) = edge.source.upgrade() {
                notifier.remove(edge.listener);
            }
        }
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.borrow().len()
    }

    pub(crate) fn sources(&self) -> Vec<NodeId> {
        self.edges.borrow().keys().copied().collect()
    }

    /// Returns the replaced observer, if any.
    pub(crate) fn set_observer(&self, key: String, observer: Observer<T>) -> Option<Observer<T>> {
        let mut observers = self.observers.borrow_mut();
        if let Some(slot) = observers.iter_mut().find(|(k, _)| *k == key) {
            return Some(std::mem::replace(&mut slot.1, observer));
        }
        observers.push((key, observer));
        None
    }

    pub(crate) fn remove_observer(&self, key: &str) -> bool {
        let mut observers = self.observers.borrow_mut();
        let before = observers.len();
        observers.retain(|(k, _)| k != key);
        observers.len() != before
    }

    pub(crate) fn observer_count(&self) -> usize {
        self.observers.borrow().len()
    }

    pub(crate) fn has_observers(&self) -> bool {
        !self.observers.borrow().is_empty()
    }

    pub(crate) fn notify_observers(&self, value: &T) {
        let snapshot: SmallVec<[Observer<T>; 4]> = self
            .observers
            .borrow()
            .iter()
            .map(|(_, o)| o.clone())
            .collect();
        for observer in snapshot {
            observer(value);
        }
    }

    pub(crate) fn set_validator(
        &self,
        predicate: Rc<dyn Fn(&T) -> bool>,
        on_rejected: Option<Rc<dyn Fn(&T)>>,
    ) {
        *self.validator.borrow_mut() = Some(Validator {
            predicate,
            on_rejected,
        });
    }

    pub(crate) fn clear_validator(&self) -> bool {
        self.validator.borrow_mut().take().is_some()
    }

    pub(crate) fn has_validator(&self) -> bool {
        self.validator.borrow().is_some()
    }

    /// Checks a candidate against the validator. Rejections are reported to
    /// the callback, or logged when there is none.
    pub(crate) fn admits(&self, label: &str, candidate: &T) -> bool {
        let (predicate, on_rejected) = match &*self.validator.borrow() {
            Some(v) => (v.predicate.clone(), v.on_rejected.clone()),
            None => return true,
        };
        if predicate(candidate) {
            return true;
        }
        match on_rejected {
            Some(cb) => {
                log::debug!("state `{label}`: validator rejected candidate");
                cb(candidate);
            }
            None => log::warn!("state `{label}`: validator rejected candidate; value kept"),
        }
        false
    }

    /// Marks the layer as reacting. Returns `None` when a reaction is already
    /// in progress further up the stack.
    pub(crate) fn enter(&self) -> Option<RunningGuard<'_>> {
        if self.running.replace(true) {
            None
        } else {
            Some(RunningGuard(&self.running))
        }
    }

    pub(crate) fn teardown(&self) {
        self.clear_edges();
        self.observers.borrow_mut().clear();
        self.validator.borrow_mut().take();
    }
}

impl<T: 'static> Drop for GraphLayer<T> {
    fn drop(&mut self) {
        self.clear_edges();
    }
}

pub(crate) struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}
