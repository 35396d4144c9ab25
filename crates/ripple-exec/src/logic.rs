use ripple_core::{AdvancedState, Disposable, Dispose, Scope, State, StateOptions};

use crate::engine::{Engine, EngineConfig};

/// Owner of one engine and the containers its actions operate on.
///
/// [`cleanup`](Self::cleanup) is the box-level teardown: queued actions are
/// aborted, engine bookkeeping is cleared, and every adopted container is
/// disposed.
pub struct LogicBox {
    engine: Engine,
    scope: Scope,
}

impl Default for LogicBox {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl LogicBox {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            engine: Engine::new(config),
            scope: Scope::new(),
        }
    }

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn scope(&self) -> &Scope {
        &self.scope
    }

    pub fn adopt<D>(&self, target: &D) -> Dispose
    where
        D: Disposable + Clone + 'static,
    {
        self.scope.adopt(target)
    }

    /// A basic container owned by this box.
    pub fn state<T: 'static>(&self, label: &str, value: T) -> State<T> {
        let state = State::new_with(value, StateOptions::labeled(label));
        self.scope.adopt(&state);
        state
    }

    /// An advanced container owned by this box, starting uninitialized.
    pub fn derived<T: 'static>(&self, label: &str) -> AdvancedState<T> {
        let state = AdvancedState::late_with(StateOptions::labeled(label));
        self.scope.adopt(&state);
        state
    }

    pub fn advanced<T: 'static>(&self, label: &str, value: T) -> AdvancedState<T> {
        let state = AdvancedState::new_with(value, StateOptions::labeled(label));
        self.scope.adopt(&state);
        state
    }

    pub fn is_cleaned_up(&self) -> bool {
        self.scope.is_disposed()
    }

    pub fn cleanup(&self) {
        self.engine.cleanup();
        self.scope.dispose();
        log::debug!("[{}] logic box cleaned up", self.engine.name());
    }
}
