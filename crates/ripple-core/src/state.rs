use std::cell::{Cell, RefCell};
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

use crate::cell::MutableCell;
use crate::error::{StateError, StateResult};
use crate::notifier::{Listenable, NodeId, Notifier};
use crate::reactive::GraphLayer;
use crate::scope::{Disposable, Dispose};

/// Initialization state of a container.
pub enum InitState<T> {
    Uninitialized,
    Initialized(MutableCell<T>),
}

impl<T> InitState<T> {
    pub fn is_initialized(&self) -> bool {
        matches!(self, InitState::Initialized(_))
    }

    pub fn cell(&self) -> Option<&MutableCell<T>> {
        match self {
            InitState::Initialized(cell) => Some(cell),
            InitState::Uninitialized => None,
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct StateOptions {
    /// Name used in log lines and errors. Defaults to `state#<node id>`.
    pub label: Option<String>,
    /// Log every value transition at debug level.
    pub debug: bool,
}

impl StateOptions {
    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            label: Some(label.into()),
            ..Self::default()
        }
    }

    pub fn debug(mut self, on: bool) -> Self {
        self.debug = on;
        self
    }
}

/// Result of an assignment.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SetOutcome {
    /// Stored and (unless silent) notified.
    Changed,
    /// Equal to the current value; nothing happened.
    Unchanged,
    /// Refused by the validator; nothing happened.
    Rejected,
}

impl SetOutcome {
    pub fn is_changed(self) -> bool {
        self == SetOutcome::Changed
    }
}

/// A reactive value holder.
///
/// Cloning a `State` creates another handle to the same container.
pub struct State<T: 'static> {
    pub(crate) inner: Rc<StateInner<T>>,
}

pub(crate) struct StateInner<T: 'static> {
    slot: RefCell<InitState<T>>,
    notifier: Rc<Notifier>,
    label: String,
    debug: bool,
    pub(crate) layer: Option<Rc<GraphLayer<T>>>,
    disposers: RefCell<Vec<Dispose>>,
    disposed: Cell<bool>,
}

impl<T: 'static> Clone for State<T> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for State<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slot = self.inner.slot.borrow();
        let mut d = f.debug_struct("State");
        d.field("label", &self.inner.label);
        match slot.cell() {
            Some(cell) => d.field("value", cell),
            None => d.field("value", &"<uninitialized>"),
        };
        d.finish()
    }
}

impl<T: 'static> State<T> {
    pub fn new(value: T) -> Self {
        Self::new_with(value, StateOptions::default())
    }

    pub fn new_with(value: T, options: StateOptions) -> Self {
        Self::build(Some(value), options, None)
    }

    /// A container that starts `Uninitialized`.
    pub fn late() -> Self {
        Self::late_with(StateOptions::default())
    }

    pub fn late_with(options: StateOptions) -> Self {
        Self::build(None, options, None)
    }

    pub(crate) fn build(
        value: Option<T>,
        options: StateOptions,
        layer: Option<Rc<GraphLayer<T>>>,
    ) -> Self {
        let notifier = Notifier::new();
        let label = options
            .label
            .unwrap_or_else(|| format!("state{}", notifier.id()));
        let slot = match value {
            Some(v) => InitState::Initialized(MutableCell::new(v)),
            None => InitState::Uninitialized,
        };
        Self {
            inner: Rc::new(StateInner {
                slot: RefCell::new(slot),
                notifier,
                label,
                debug: options.debug,
                layer,
                disposers: RefCell::new(Vec::new()),
                disposed: Cell::new(false),
            }),
        }
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.slot.borrow().is_initialized()
    }

    pub fn ensure_initialized(&self) -> StateResult<()> {
        self.cell().map(|_| ())
    }

    fn uninitialized(&self) -> StateError {
        StateError::UninitializedAccess {
            label: self.inner.label.clone(),
        }
    }

    fn cell(&self) -> StateResult<MutableCell<T>> {
        self.inner
            .slot
            .borrow()
            .cell()
            .cloned()
            .ok_or_else(|| self.uninitialized())
    }

    pub fn get(&self) -> StateResult<T>
    where
        T: Clone,
    {
        self.cell().map(|c| c.get())
    }

    /// Late-safe read: `None` while uninitialized.
    pub fn try_get(&self) -> Option<T>
    where
        T: Clone,
    {
        self.cell().ok().map(|c| c.get())
    }

    pub fn get_or(&self, fallback: T) -> T
    where
        T: Clone,
    {
        self.try_get().unwrap_or(fallback)
    }

    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> StateResult<R> {
        self.cell().map(|c| c.with(f))
    }

    /// Forces the container back to `Uninitialized` without notifying.
    /// Intended for tests.
    #[doc(hidden)]
    pub fn reset_to_uninitialized(&self) {
        *self.inner.slot.borrow_mut() = InitState::Uninitialized;
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.get()
    }

    /// Registers a cleanup that runs when this container is disposed.
    pub fn on_dispose(&self, f: impl FnOnce() + 'static) -> Dispose {
        let d = Dispose::new(f);
        if self.is_disposed() {
            d.run();
        } else {
            self.inner.disposers.borrow_mut().push(d.clone());
        }
        d
    }

    /// Tears down every edge this container registered on other containers,
    /// its observers, its validator, then runs its own cleanups. Listeners
    /// that other containers registered on this one are theirs to remove.
    pub fn dispose(&self) {
        if self.inner.disposed.replace(true) {
            return;
        }
        if let Some(layer) = &self.inner.layer {
            layer.teardown();
        }
        let disposers = std::mem::take(&mut *self.inner.disposers.borrow_mut());
        for d in disposers {
            d.run();
        }
        log::debug!("state `{}` disposed", self.inner.label);
    }
}

impl<T: Clone + PartialEq + 'static> State<T> {
    /// Replaces the value and notifies. Equal values are a no-op.
    pub fn set(&self, value: T) -> SetOutcome {
        let outcome = self.assign(value);
        if outcome.is_changed() {
            self.notify();
        }
        outcome
    }

    /// Same transition as [`set`](Self::set) without notifying. Used for
    /// persistence restore and for seeding a value ahead of listeners.
    pub fn set_silently(&self, value: T) -> SetOutcome {
        self.assign(value)
    }

    fn assign(&self, value: T) -> SetOutcome {
        if let Some(layer) = &self.inner.layer
            && !layer.admits(&self.inner.label, &value)
        {
            return SetOutcome::Rejected;
        }

        let mut slot = self.inner.slot.borrow_mut();
        match &*slot {
            InitState::Initialized(cell) => {
                if cell.with(|current| *current == value) {
                    return SetOutcome::Unchanged;
                }
                cell.set(value);
            }
            InitState::Uninitialized => {
                *slot = InitState::Initialized(MutableCell::new(value));
            }
        }
        drop(slot);

        if self.inner.debug {
            log::debug!("state `{}` changed", self.inner.label);
        }
        SetOutcome::Changed
    }

    /// Batch mutation: runs `f` on the live value, then notifies exactly once.
    ///
    /// `f` must not read this container; use [`edit_async`](Self::edit_async)
    /// when the edit needs to interleave with other reads.
    pub fn edit<R>(&self, f: impl FnOnce(&mut T) -> R) -> StateResult<R> {
        let cell = self.cell()?;
        let out = cell.update(f);
        self.after_edit();
        Ok(out)
    }

    /// Asynchronous batch mutation. `f` receives a handle to the cell and may
    /// suspend any number of times; one notification fires after it resolves.
    ///
    /// The handle is only meaningful until the edit resolves. It still points
    /// at the live value afterwards, but writes made through a kept clone are
    /// stored without notifying anyone. Follow such writes with
    /// [`notify`](Self::notify), or start a new edit instead.
    pub async fn edit_async<F, Fut, R>(&self, f: F) -> StateResult<R>
    where
        F: FnOnce(MutableCell<T>) -> Fut,
        Fut: Future<Output = R>,
    {
        let cell = self.cell()?;
        let out = f(cell).await;
        self.after_edit();
        Ok(out)
    }

    fn after_edit(&self) {
        if self.inner.debug {
            log::debug!("state `{}` edited", self.inner.label);
        }
        self.notify();
    }

    /// Invokes listeners, then observers with the current value.
    pub fn notify(&self) {
        self.inner.notifier.notify();
        if let Some(layer) = &self.inner.layer
            && layer.has_observers()
            && let Some(value) = self.try_get()
        {
            layer.notify_observers(&value);
        }
    }
}

impl<T: 'static> Listenable for State<T> {
    fn notifier(&self) -> &Rc<Notifier> {
        &self.inner.notifier
    }
}

impl<T: 'static> Disposable for State<T> {
    fn dispose(&self) {
        State::dispose(self)
    }
}

impl<T: 'static> State<T> {
    pub fn id(&self) -> NodeId {
        self.inner.notifier.id()
    }

    /// A handle that does not keep the container alive. Listeners registered
    /// on a container should capture this rather than a clone of it.
    pub fn downgrade(&self) -> WeakState<T> {
        WeakState(Rc::downgrade(&self.inner))
    }
}

pub struct WeakState<T: 'static>(Weak<StateInner<T>>);

impl<T: 'static> Clone for WeakState<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

impl<T: 'static> WeakState<T> {
    pub fn upgrade(&self) -> Option<State<T>> {
        self.0.upgrade().map(|inner| State { inner })
    }
}
