pub use crate::advanced::AdvancedState;
pub use crate::cell::MutableCell;
pub use crate::error::{StateError, StateResult};
pub use crate::notifier::{Listenable, Listener, ListenerId, NodeId, Notifier};
pub use crate::reactive::Observer;
pub use crate::scope::{Disposable, Dispose, Scope};
pub use crate::state::{InitState, SetOutcome, State, StateOptions, WeakState};
