//! # State containers, dependencies, and observers
//!
//! Ripple's core is a small set of reactive value holders. There are three
//! main pieces:
//!
//! - `State<T>`: a value with an initialization state and a listener set.
//! - `AdvancedState<T>`: a `State<T>` that can depend on other containers,
//!   carry named observers, and gate assignments with a validator.
//! - `Scope`: owner of a group of containers, disposed as a unit.
//!
//! ## State
//!
//! `State<T>` is a cloneable handle:
//!
//! ```rust
//! use ripple_core::*;
//!
//! let count = State::new(0);
//! count.set(1);
//! count.edit(|v| *v += 1).unwrap();
//! assert_eq!(count.get(), Ok(2));
//! ```
//!
//! Setting a value equal to the current one is a no-op: no listener runs.
//! `edit` always notifies exactly once, however many fields the closure
//! touches.
//!
//! Containers can start late. Reading one before its first assignment is an
//! error rather than a default value:
//!
//! ```rust
//! use ripple_core::*;
//!
//! let name: State<String> = State::late();
//! assert!(matches!(name.get(), Err(StateError::UninitializedAccess { .. })));
//! name.set("Jane".into());
//! assert_eq!(name.get().as_deref(), Ok("Jane"));
//! ```
//!
//! ## Listeners
//!
//! Listeners take no arguments; they re-read whatever they need after being
//! called. `add_listener` hands back a `ListenerId` for removal.
//!
//! ## Derived state
//!
//! `AdvancedState::depends_on_with` recomputes a container from its sources
//! whenever one of them notifies. `depends_on` without a computation simply
//! forwards the notification. Edges are registered once per source, a
//! container never depends on itself, and `dispose` removes every edge the
//! container registered.
//!
//! Notification is synchronous and depth-first from the mutation that caused
//! it.

pub mod advanced;
pub mod cell;
pub mod error;
pub mod notifier;
pub mod prelude;
pub mod reactive;
pub mod scope;
pub mod state;


pub use prelude::*;
