use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

use slotmap::{SlotMap, new_key_type};
use smallvec::SmallVec;

new_key_type! {
    /// Handle for a registered listener. Closures are not comparable, so
    /// removal goes through this key.
    pub struct ListenerId;
}

/// A zero-argument change callback. Listeners re-read the container after
/// being called (push-to-notify, pull-to-read).
pub type Listener = Rc<dyn Fn()>;

/// Stable identity of a notifying node in the dependency graph.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(u64);

impl NodeId {
    pub(crate) fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Listener set of one node.
pub struct Notifier {
    id: NodeId,
    listeners: RefCell<SlotMap<ListenerId, Listener>>,
}

impl Notifier {
    pub fn new() -> Rc<Self> {
        Rc::new(Self {
            id: NodeId::next(),
            listeners: RefCell::new(SlotMap::with_key()),
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn add(&self, listener: Listener) -> ListenerId {
        self.listeners.borrow_mut().insert(listener)
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.listeners.borrow_mut().remove(id).is_some()
    }

    pub fn contains(&self, id: ListenerId) -> bool {
        self.listeners.borrow().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.listeners.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.borrow().is_empty()
    }

    /// Invokes every listener once.
    ///
    /// The set is snapshotted first so listeners may register, remove or
    /// mutate other containers. A listener removed by an earlier one in the
    /// same round is skipped.
    pub fn notify(&self) {
        let snapshot: SmallVec<[(ListenerId, Listener); 4]> = self
            .listeners
            .borrow()
            .iter()
            .map(|(id, l)| (id, l.clone()))
            .collect();
        for (id, listener) in snapshot {
            if self.contains(id) {
                listener();
            }
        }
    }
}

impl fmt::Debug for Notifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Notifier")
            .field("id", &self.id)
            .field("listeners", &self.len())
            .finish()
    }
}

/// Anything that owns a [`Notifier`] and can therefore act as a dependency
/// source or be bound by an adapter.
pub trait Listenable {
    fn notifier(&self) -> &Rc<Notifier>;

    fn node_id(&self) -> NodeId {
        self.notifier().id()
    }

    fn add_listener(&self, f: impl Fn() + 'static) -> ListenerId
    where
        Self: Sized,
    {
        self.notifier().add(Rc::new(f))
    }

    fn remove_listener(&self, id: ListenerId) -> bool {
        self.notifier().remove(id)
    }

    fn listener_count(&self) -> usize {
        self.notifier().len()
    }
}
