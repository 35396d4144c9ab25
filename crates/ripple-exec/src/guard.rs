use ripple_core::{Listenable, NodeId, State, StateOptions};

/// Shared token behind the back-navigation block.
///
/// The engine keeps a reference count per guard; the flag flips to `true`
/// when the first wrapped action starts and back to `false` only when the
/// last overlapping one ends. The flag is an ordinary [`State<bool>`], so UI
/// adapters bind to it with `add_listener`.
#[derive(Clone, Debug)]
pub struct BlockingGuard {
    flag: State<bool>,
}

impl Default for BlockingGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl BlockingGuard {
    pub fn new() -> Self {
        Self::labeled("blocking-guard")
    }

    pub fn labeled(label: impl Into<String>) -> Self {
        Self {
            flag: State::new_with(false, StateOptions::labeled(label)),
        }
    }

    pub fn id(&self) -> NodeId {
        self.flag.node_id()
    }

    pub fn flag(&self) -> &State<bool> {
        &self.flag
    }

    /// `true` while at least one wrapped action holds the guard.
    pub fn should_block_back(&self) -> bool {
        self.flag.get_or(false)
    }

    /// Back-press entry point for navigation adapters: returns `true` when
    /// the press is consumed because work is still in flight, otherwise
    /// defers to `pop`.
    pub fn handle_back(&self, pop: impl FnOnce() -> bool) -> bool {
        if self.should_block_back() {
            log::debug!("back navigation blocked by `{}`", self.flag.label());
            return true;
        }
        pop()
    }
}
