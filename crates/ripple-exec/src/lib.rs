//! # Actions and the execution engine
//!
//! An [`Action`] is a unit of async work with a declared [`RunMode`]. The
//! [`Engine`] decides per concrete action type whether a submission runs
//! now, waits in a FIFO lane, or is dropped:
//!
//! | mode         | while another of the same type runs         |
//! |--------------|---------------------------------------------|
//! | `Parallel`   | runs anyway                                 |
//! | `Sequential` | queued; resolves when its own turn finishes |
//! | `Solo`       | dropped, resolves to `Outcome::Suppressed`  |
//!
//! Lanes of different types are independent. Who runs is decided when
//! `submit` is called; the returned [`Completion`] runs the action when
//! awaited, so dropping it unawaited cancels that one submission.
//!
//! Wrapped submissions hold a [`BlockingGuard`] while they run. The guard's
//! flag stays raised as long as any wrapped action sharing it is in flight,
//! which is what navigation adapters consult before honoring a back press.
//!
//! ```rust
//! use ripple_exec::*;
//!
//! struct Ping;
//!
//! impl Action for Ping {
//!     async fn run(self) -> ActionResult {
//!         Ok(())
//!     }
//! }
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! let engine = Engine::default();
//! let out = rt.block_on(engine.submit(Ping));
//! assert_eq!(out.unwrap(), Outcome::Completed);
//! ```

pub mod action;
pub mod engine;
pub mod error;
pub mod guard;
pub mod logic;

#[cfg(test)]
mod tests;

pub use action::{Action, ActionResult, RunMode};
pub use engine::{Completion, Engine, EngineConfig, Outcome, Submission};
pub use error::ExecError;
pub use guard::BlockingGuard;
pub use logic::LogicBox;
