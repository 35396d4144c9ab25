//! Per-action-type run-mode enforcement.
//!
//! # Model
//!
//! The engine is single-threaded and cooperative. Its bookkeeping lives in a
//! `RefCell` that is never borrowed across a suspension point.
//!
//! Every `submit*` call does its bookkeeping before returning, so the order
//! of calls (not the order in which the returned [`Completion`]s are first
//! polled) decides who runs:
//!
//! - **Parallel** actions never touch the bookkeeping.
//! - **Solo** actions claim their type at submission; a second submission of
//!   the same type while the claim is held resolves to
//!   [`Outcome::Suppressed`] without running.
//! - **Sequential** actions claim their type's lane, or join its FIFO queue.
//!   When the lane owner finishes, ownership is handed to the next queued
//!   submission, whose completion then runs its action. The lane is released
//!   once nobody is waiting.
//!
//! Claims are held by RAII values, so they are released (or handed on)
//! whether the action succeeds, fails, or its completion is dropped. A
//! dropped completion cancels its own action only; a queued one is skipped
//! when its turn comes.
//!
//! No task is ever spawned: completions run their actions when awaited, on
//! whatever executor awaits them.
//!
//! # Cleanup
//!
//! [`Engine::cleanup`] fails every queued entry with
//! [`ExecError::QueuedActionAborted`], clears all claims and guard counts,
//! and bumps a generation counter so that claims still held by running
//! actions release nothing when they finish.

use std::any::TypeId;
use std::cell::RefCell;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet, VecDeque};
use std::future;
use std::rc::{Rc, Weak};

use futures_util::future::LocalBoxFuture;
use ripple_core::NodeId;
use tokio::sync::oneshot;
use web_time::Instant;

use crate::action::{Action, ActionResult, RunMode};
use crate::error::ExecError;
use crate::guard::BlockingGuard;

/// How a submission ended when it did not fail.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    Completed,
    /// Dropped because a solo action of the same type was running.
    Suppressed,
}

pub type Submission = Result<Outcome, ExecError>;

/// Handle returned by every `submit*` call. Resolves when this submission's
/// own action has finished, was dropped, or was aborted.
pub type Completion = LocalBoxFuture<'static, Submission>;

#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Prefix for log lines.
    pub name: String,
    /// Guard used by [`Engine::submit_wrapped`].
    pub guard: Option<BlockingGuard>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            name: "engine".into(),
            guard: None,
        }
    }
}

#[derive(Clone)]
pub struct Engine {
    inner: Rc<EngineInner>,
}

struct EngineInner {
    name: String,
    guard: RefCell<Option<BlockingGuard>>,
    book: RefCell<Book>,
}

#[derive(Default)]
struct Book {
    generation: u64,
    solo: HashSet<TypeId>,
    lanes: HashMap<TypeId, Lane>,
    guards: HashMap<NodeId, usize>,
}

/// An active sequential lane. Present in the book while some submission of
/// its type owns it.
#[derive(Default)]
struct Lane {
    waiting: VecDeque<Waiting>,
    failures: usize,
    first_failure: Option<String>,
}

struct Waiting {
    name: &'static str,
    turn: oneshot::Sender<LaneHold>,
}

enum Turn {
    Now(LaneHold),
    Later(oneshot::Receiver<LaneHold>),
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Rc::new(EngineInner {
                name: config.name,
                guard: RefCell::new(config.guard),
                book: RefCell::new(Book::default()),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Replaces the guard used by wrapped submissions.
    pub fn set_guard(&self, guard: Option<BlockingGuard>) {
        *self.inner.guard.borrow_mut() = guard;
    }

    pub fn guard(&self) -> Option<BlockingGuard> {
        self.inner.guard.borrow().clone()
    }

    /// Submits `action` under its declared mode.
    pub fn submit<A: Action>(&self, action: A) -> Completion {
        let mode = action.mode();
        self.dispatch(action, mode, None)
    }

    /// Like [`submit`](Self::submit) with an explicit mode.
    pub fn submit_as<A: Action>(&self, action: A, mode: RunMode) -> Completion {
        self.dispatch(action, mode, None)
    }

    /// Submits `action` holding the configured blocking guard while it runs.
    pub fn submit_wrapped<A: Action>(&self, action: A) -> Completion {
        let Some(guard) = self.guard() else {
            log::error!(
                "[{}] `{}` needs a blocking guard but none is configured",
                self.inner.name,
                action.name()
            );
            return Box::pin(future::ready(Err(ExecError::MissingGuard {
                action: action.name(),
            })));
        };
        let mode = action.mode();
        self.dispatch(action, mode, Some(guard))
    }

    /// Submits `action` holding `guard` while it runs.
    pub fn submit_guarded<A: Action>(&self, action: A, guard: &BlockingGuard) -> Completion {
        let mode = action.mode();
        self.dispatch(action, mode, Some(guard.clone()))
    }

    fn dispatch<A: Action>(
        &self,
        action: A,
        mode: RunMode,
        guard: Option<BlockingGuard>,
    ) -> Completion {
        let key = TypeId::of::<A>();
        let name = action.name();
        let engine = self.inner.name.clone();
        match mode {
            RunMode::Parallel => {
                let work = self.prepare(action, guard);
                Box::pin(async move { execute(&engine, name, work).await })
            }
            RunMode::Solo => {
                let Some(hold) = self.claim_solo(key) else {
                    log::info!("[{engine}] solo `{name}` already running; submission dropped");
                    return Box::pin(future::ready(Ok(Outcome::Suppressed)));
                };
                let work = self.prepare(action, guard);
                Box::pin(async move {
                    let _hold = hold;
                    execute(&engine, name, work).await
                })
            }
            RunMode::Sequential => {
                let work = self.prepare(action, guard);
                match self.claim_lane(key, name) {
                    Turn::Now(hold) => Box::pin(async move {
                        let _hold = hold;
                        execute(&engine, name, work).await
                    }),
                    Turn::Later(turn) => Box::pin(async move {
                        let Ok(hold) = turn.await else {
                            return Err(ExecError::QueuedActionAborted { action: name });
                        };
                        let result = execute(&engine, name, work).await;
                        if let Err(err) = &result {
                            log::warn!("[{engine}] queued {err}");
                            hold.record_failure(err);
                        }
                        result
                    }),
                }
            }
        }
    }

    fn prepare<A: Action>(
        &self,
        action: A,
        guard: Option<BlockingGuard>,
    ) -> LocalBoxFuture<'static, ActionResult> {
        let work = action.run();
        match guard {
            None => Box::pin(work),
            Some(guard) => {
                let engine = Rc::downgrade(&self.inner);
                let name = self.inner.name.clone();
                Box::pin(async move {
                    let _hold = GuardHold::acquire(engine, guard, &name);
                    work.await
                })
            }
        }
    }

    fn claim_solo(&self, key: TypeId) -> Option<SoloHold> {
        let mut book = self.inner.book.borrow_mut();
        if !book.solo.insert(key) {
            return None;
        }
        Some(SoloHold {
            engine: Rc::downgrade(&self.inner),
            key,
            generation: book.generation,
        })
    }

    fn claim_lane(&self, key: TypeId, name: &'static str) -> Turn {
        let mut book = self.inner.book.borrow_mut();
        let generation = book.generation;
        match book.lanes.entry(key) {
            Entry::Vacant(slot) => {
                slot.insert(Lane::default());
                Turn::Now(LaneHold {
                    engine: Rc::downgrade(&self.inner),
                    key,
                    generation,
                })
            }
            Entry::Occupied(mut lane) => {
                let (tx, rx) = oneshot::channel();
                let waiting = &mut lane.get_mut().waiting;
                waiting.push_back(Waiting { name, turn: tx });
                log::debug!(
                    "[{}] sequential `{name}` queued at position {}",
                    self.inner.name,
                    waiting.len()
                );
                Turn::Later(rx)
            }
        }
    }

    /// Fails every queued entry, clears all claims and guard counts.
    /// Actions already running are not interrupted.
    pub fn cleanup(&self) {
        let aborted: Vec<Waiting> = {
            let mut book = self.inner.book.borrow_mut();
            book.generation += 1;
            book.solo.clear();
            book.guards.clear();
            book.lanes.drain().flat_map(|(_, lane)| lane.waiting).collect()
        };
        if !aborted.is_empty() {
            log::info!(
                "[{}] cleanup aborted {} queued action(s)",
                self.inner.name,
                aborted.len()
            );
        }
        // Dropping the turn senders resolves each queued completion with
        // `QueuedActionAborted`.
        drop(aborted);
    }

    pub fn is_solo_busy<A: Action>(&self) -> bool {
        self.inner.book.borrow().solo.contains(&TypeId::of::<A>())
    }

    pub fn is_lane_active<A: Action>(&self) -> bool {
        self.inner
            .book
            .borrow()
            .lanes
            .contains_key(&TypeId::of::<A>())
    }

    pub fn queued_len<A: Action>(&self) -> usize {
        self.inner
            .book
            .borrow()
            .lanes
            .get(&TypeId::of::<A>())
            .map_or(0, |lane| lane.waiting.len())
    }

    pub fn guard_count(&self, guard: &BlockingGuard) -> usize {
        self.inner
            .book
            .borrow()
            .guards
            .get(&guard.id())
            .copied()
            .unwrap_or(0)
    }
}

async fn execute(
    engine: &str,
    name: &'static str,
    work: LocalBoxFuture<'static, ActionResult>,
) -> Submission {
    let started = Instant::now();
    let result = work.await;
    log::debug!(
        "[{engine}] `{name}` finished in {:?} ({})",
        started.elapsed(),
        if result.is_ok() { "ok" } else { "error" }
    );
    result
        .map(|()| Outcome::Completed)
        .map_err(|cause| ExecError::ActionFailed {
            action: name,
            cause,
        })
}

struct SoloHold {
    engine: Weak<EngineInner>,
    key: TypeId,
    generation: u64,
}

impl Drop for SoloHold {
    fn drop(&mut self) {
        if let Some(inner) = self.engine.upgrade() {
            let mut book = inner.book.borrow_mut();
            if book.generation == self.generation {
                book.solo.remove(&self.key);
            }
        }
    }
}

/// Ownership of one sequential lane. Dropping it hands the lane to the next
/// waiting submission, or releases the lane when nobody waits.
struct LaneHold {
    engine: Weak<EngineInner>,
    key: TypeId,
    generation: u64,
}

impl LaneHold {
    fn record_failure(&self, err: &ExecError) {
        let Some(inner) = self.engine.upgrade() else {
            return;
        };
        let mut book = inner.book.borrow_mut();
        if book.generation != self.generation {
            return;
        }
        if let Some(lane) = book.lanes.get_mut(&self.key) {
            lane.failures += 1;
            lane.first_failure.get_or_insert_with(|| err.to_string());
        }
    }
}

impl Drop for LaneHold {
    fn drop(&mut self) {
        let Some(inner) = self.engine.upgrade() else {
            return;
        };
        let next = {
            let mut book = inner.book.borrow_mut();
            if book.generation != self.generation {
                return;
            }
            let Some(lane) = book.lanes.get_mut(&self.key) else {
                return;
            };
            let next = lane.waiting.pop_front();
            if next.is_none()
                && let Some(lane) = book.lanes.remove(&self.key)
                && let Some(first) = lane.first_failure
            {
                log::error!(
                    "[{}] lane drained with {} failure(s); first: {first}",
                    inner.name,
                    lane.failures
                );
            }
            next
        };
        let Some(next) = next else {
            return;
        };
        let hold = LaneHold {
            engine: self.engine.clone(),
            key: self.key,
            generation: self.generation,
        };
        // A refused hand-off drops the returned hold, which passes the lane
        // on to the entry after it.
        if next.turn.send(hold).is_err() {
            log::debug!(
                "[{}] queued `{}` was dropped before its turn",
                inner.name,
                next.name
            );
        }
    }
}

/// One reference on a guard for the duration of a wrapped action.
struct GuardHold {
    engine: Weak<EngineInner>,
    guard: BlockingGuard,
    generation: u64,
}

impl GuardHold {
    fn acquire(engine: Weak<EngineInner>, guard: BlockingGuard, name: &str) -> Option<Self> {
        let Some(inner) = engine.upgrade() else {
            log::warn!(
                "[{name}] engine dropped before a wrapped action started; running without guard `{}`",
                guard.flag().label()
            );
            return None;
        };
        let (first, generation) = {
            let mut book = inner.book.borrow_mut();
            let count = book.guards.entry(guard.id()).or_insert(0);
            *count += 1;
            (*count == 1, book.generation)
        };
        if first {
            guard.flag().set(true);
        }
        Some(Self {
            engine,
            guard,
            generation,
        })
    }
}

impl Drop for GuardHold {
    fn drop(&mut self) {
        let Some(inner) = self.engine.upgrade() else {
            return;
        };
        let last = {
            let mut book = inner.book.borrow_mut();
            if book.generation != self.generation {
                return;
            }
            let id = self.guard.id();
            match book.guards.get_mut(&id) {
                Some(count) if *count > 1 => {
                    *count -= 1;
                    false
                }
                Some(_) => {
                    book.guards.remove(&id);
                    true
                }
                None => false,
            }
        };
        if last {
            self.guard.flag().set(false);
        }
    }
}
