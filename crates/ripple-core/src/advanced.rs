use std::fmt;
use std::ops::Deref;
use std::rc::Rc;

use crate::notifier::{Listenable, Listener, NodeId, Notifier};
use crate::reactive::GraphLayer;
use crate::scope::Disposable;
use crate::state::{State, StateOptions};

/// What a container does when one of its dependencies fires.
enum Derivation<T> {
    NotifyOnly,
    Compute(Rc<dyn Fn() -> T>),
    TryCompute(Rc<dyn Fn() -> Result<T, String>>),
}

/// A [`State`] with dependency wiring, named observers and a validator.
///
/// All [`State`] operations are available through `Deref`.
///
/// ```rust
/// use ripple_core::*;
///
/// let a = State::new(1);
/// let b = State::new(2);
/// let sum = AdvancedState::late();
/// sum.depends_on_with(&[&a, &b], {
///     let (a, b) = (a.clone(), b.clone());
///     move || a.get_or(0) + b.get_or(0)
/// });
/// assert_eq!(sum.get(), Ok(3));
///
/// a.set(10);
/// assert_eq!(sum.get(), Ok(12));
/// ```
pub struct AdvancedState<T: 'static> {
    state: State<T>,
    graph: Rc<GraphLayer<T>>,
}

impl<T: 'static> Clone for AdvancedState<T> {
    fn clone(&self) -> Self {
        Self {
            state: self.state.clone(),
            graph: self.graph.clone(),
        }
    }
}

impl<T: fmt::Debug + 'static> fmt::Debug for AdvancedState<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdvancedState")
            .field("state", &self.state)
            .field("dependencies", &self.graph.edge_count())
            .field("observers", &self.graph.observer_count())
            .finish()
    }
}

impl<T: 'static> Deref for AdvancedState<T> {
    type Target = State<T>;

    fn deref(&self) -> &State<T> {
        &self.state
    }
}

impl<T: 'static> AdvancedState<T> {
    pub fn new(value: T) -> Self {
        Self::new_with(value, StateOptions::default())
    }

    pub fn new_with(value: T, options: StateOptions) -> Self {
        Self::build(Some(value), options)
    }

    pub fn late() -> Self {
        Self::late_with(StateOptions::default())
    }

    pub fn late_with(options: StateOptions) -> Self {
        Self::build(None, options)
    }

    fn build(value: Option<T>, options: StateOptions) -> Self {
        let graph = Rc::new(GraphLayer::new());
        let state = State::build(value, options, Some(graph.clone()));
        Self { state, graph }
    }

    pub fn as_state(&self) -> &State<T> {
        &self.state
    }

    pub fn dependency_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn depends_on_node(&self, source: NodeId) -> bool {
        self.graph.has_edge(source)
    }

    /// Source node ids in ascending order.
    pub fn dependencies(&self) -> Vec<NodeId> {
        self.graph.sources()
    }

    pub fn remove_dependency(&self, source: &dyn Listenable) -> bool {
        self.graph.remove_edge(source.node_id())
    }

    pub fn clear_dependencies(&self) {
        self.graph.clear_edges();
    }

    pub fn remove_observer(&self, key: &str) -> bool {
        self.graph.remove_observer(key)
    }

    pub fn observer_count(&self) -> usize {
        self.graph.observer_count()
    }

    pub fn clear_validator(&self) -> bool {
        self.graph.clear_validator()
    }

    pub fn has_validator(&self) -> bool {
        self.graph.has_validator()
    }
}

impl<T: Clone + PartialEq + 'static> AdvancedState<T> {
    /// Notify-only wiring: when any source fires, this container notifies its
    /// own listeners and observers without touching its value.
    ///
    /// Returns the number of edges actually added. Sources already wired and
    /// the container itself are skipped.
    pub fn depends_on(&self, sources: &[&dyn Listenable]) -> usize {
        self.wire(sources, Rc::new(Derivation::NotifyOnly))
    }

    /// Derivation wiring: when any source fires, `compute` runs and its result
    /// is assigned through the normal setter (validator, dedup, notify).
    ///
    /// The computation runs once right after wiring so the container never
    /// exposes a stale first value.
    pub fn depends_on_with(
        &self,
        sources: &[&dyn Listenable],
        compute: impl Fn() -> T + 'static,
    ) -> usize {
        self.wire(sources, Rc::new(Derivation::Compute(Rc::new(compute))))
    }

    /// Like [`depends_on_with`](Self::depends_on_with) for a computation that
    /// can fail. A failure keeps the previous value, fires no notification and
    /// is logged.
    pub fn depends_on_try<E: fmt::Display>(
        &self,
        sources: &[&dyn Listenable],
        compute: impl Fn() -> Result<T, E> + 'static,
    ) -> usize {
        let compute = move || compute().map_err(|e| e.to_string());
        self.wire(sources, Rc::new(Derivation::TryCompute(Rc::new(compute))))
    }

    fn wire(&self, sources: &[&dyn Listenable], derivation: Rc<Derivation<T>>) -> usize {
        let own = self.state.node_id();
        let mut wired = 0;
        for source in sources {
            let source_id = source.node_id();
            if source_id == own {
                log::warn!(
                    "state `{}`: ignoring dependency on itself",
                    self.state.label()
                );
                continue;
            }
            if self.graph.has_edge(source_id) {
                continue;
            }
            let notifier: &Rc<Notifier> = source.notifier();
            let listener = self.reaction(derivation.clone());
            let id = notifier.add(listener);
            self.graph.insert_edge(notifier, id);
            wired += 1;
        }
        if wired > 0 {
            react(&self.state, &derivation);
        }
        wired
    }

    fn reaction(&self, derivation: Rc<Derivation<T>>) -> Listener {
        let weak = Rc::downgrade(&self.state.inner);
        Rc::new(move || {
            if let Some(inner) = weak.upgrade() {
                react(&State { inner }, &derivation);
            }
        })
    }

    /// Attaches a named side effect that receives the value on every
    /// notification. Re-using a key replaces the previous callback.
    pub fn observe(&self, key: impl Into<String>, observer: impl Fn(&T) + 'static) {
        let key = key.into();
        if self
            .graph
            .set_observer(key.clone(), Rc::new(observer))
            .is_some()
        {
            log::warn!(
                "state `{}`: observer `{key}` replaced",
                self.state.label()
            );
        }
    }

    /// Installs a gate checked before every `set`/`set_silently`. Rejected
    /// candidates are logged.
    pub fn set_validator(&self, predicate: impl Fn(&T) -> bool + 'static) {
        self.graph.set_validator(Rc::new(predicate), None);
    }

    /// Installs a gate whose rejections are reported to `on_rejected`.
    pub fn set_validator_with(
        &self,
        predicate: impl Fn(&T) -> bool + 'static,
        on_rejected: impl Fn(&T) + 'static,
    ) {
        self.graph
            .set_validator(Rc::new(predicate), Some(Rc::new(on_rejected)));
    }
}

fn react<T: Clone + PartialEq + 'static>(state: &State<T>, derivation: &Derivation<T>) {
    let Some(layer) = state.inner.layer.as_ref() else {
        return;
    };
    let Some(_running) = layer.enter() else {
        log::debug!(
            "state `{}`: dependency cycle reached the container again; skipped",
            state.label()
        );
        return;
    };
    match derivation {
        Derivation::NotifyOnly => state.notify(),
        Derivation::Compute(compute) => {
            state.set(compute());
        }
        Derivation::TryCompute(compute) => match compute() {
            Ok(value) => {
                state.set(value);
            }
            Err(err) => log::warn!(
                "state `{}`: derivation failed, keeping previous value: {err}",
                state.label()
            ),
        },
    }
}

impl<T: 'static> Listenable for AdvancedState<T> {
    fn notifier(&self) -> &Rc<Notifier> {
        self.state.notifier()
    }
}

impl<T: 'static> Disposable for AdvancedState<T> {
    fn dispose(&self) {
        self.state.dispose()
    }
}
