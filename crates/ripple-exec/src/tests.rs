use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use ripple_core::{Listenable, SetOutcome};
use tokio::time::sleep;

use crate::*;

fn init_logger() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn ms(n: u64) -> Duration {
    Duration::from_millis(n)
}

#[derive(Clone, Default)]
struct Trace(Rc<RefCell<Vec<String>>>);

impl Trace {
    fn push(&self, entry: impl Into<String>) {
        self.0.borrow_mut().push(entry.into());
    }

    fn entries(&self) -> Vec<String> {
        self.0.borrow().clone()
    }

    fn position(&self, entry: &str) -> usize {
        self.0
            .borrow()
            .iter()
            .position(|e| e == entry)
            .unwrap_or_else(|| panic!("`{entry}` not traced"))
    }

    fn runs(&self) -> Vec<String> {
        self.entries()
            .into_iter()
            .filter(|e| e.starts_with("run"))
            .collect()
    }
}

struct Step {
    id: u32,
    delay: u64,
    fail: bool,
    trace: Trace,
}

impl Step {
    fn new(id: u32, delay: u64, trace: &Trace) -> Self {
        Self {
            id,
            delay,
            fail: false,
            trace: trace.clone(),
        }
    }

    fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Action for Step {
    fn mode(&self) -> RunMode {
        RunMode::Sequential
    }

    async fn run(self) -> ActionResult {
        sleep(ms(self.delay)).await;
        self.trace.push(format!("run {}", self.id));
        anyhow::ensure!(!self.fail, "step {} failed", self.id);
        Ok(())
    }
}

/// Sequential as well, but a different lane than `Step`.
struct Backup(Step);

impl Action for Backup {
    fn mode(&self) -> RunMode {
        RunMode::Sequential
    }

    async fn run(self) -> ActionResult {
        self.0.run().await
    }
}

struct Refresh {
    delay: u64,
    fail: bool,
    trace: Trace,
}

impl Action for Refresh {
    fn mode(&self) -> RunMode {
        RunMode::Solo
    }

    async fn run(self) -> ActionResult {
        self.trace.push("run refresh");
        sleep(ms(self.delay)).await;
        anyhow::ensure!(!self.fail, "refresh failed");
        Ok(())
    }
}

struct Upload {
    id: u32,
    delay: u64,
    trace: Trace,
}

impl Action for Upload {
    async fn run(self) -> ActionResult {
        self.trace.push(format!("start {}", self.id));
        sleep(ms(self.delay)).await;
        self.trace.push(format!("end {}", self.id));
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn test_sequential_runs_fifo_and_resolves_per_entry() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();

    let submit = |step: Step| {
        let engine = engine.clone();
        let trace = trace.clone();
        async move {
            let id = step.id;
            let out = engine.submit(step).await;
            trace.push(format!("done {id}"));
            out
        }
    };

    let (r1, r2, r3) = tokio::join!(
        submit(Step::new(1, 30, &trace)),
        submit(Step::new(2, 10, &trace)),
        submit(Step::new(3, 5, &trace)),
    );

    assert_eq!(r1.unwrap(), Outcome::Completed);
    assert_eq!(r2.unwrap(), Outcome::Completed);
    assert_eq!(r3.unwrap(), Outcome::Completed);
    assert_eq!(trace.runs(), vec!["run 1", "run 2", "run 3"]);

    for id in 1..=3 {
        assert!(trace.position(&format!("run {id}")) < trace.position(&format!("done {id}")));
    }
    // the lane owner returns before the next entry runs
    assert!(trace.position("done 1") < trace.position("run 2"));
    assert!(trace.position("done 2") < trace.position("done 3"));

    assert!(!engine.is_lane_active::<Step>());
    assert_eq!(engine.queued_len::<Step>(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_sequential_order_follows_submission_not_polling() {
    let engine = Engine::default();
    let trace = Trace::default();

    let first = engine.submit(Step::new(1, 10, &trace));
    let second = engine.submit(Step::new(2, 10, &trace));
    let third = engine.submit(Step::new(3, 10, &trace));
    assert!(engine.is_lane_active::<Step>());
    assert_eq!(engine.queued_len::<Step>(), 2);

    let (r3, r2, r1) = tokio::join!(third, second, first);
    r1.unwrap();
    r2.unwrap();
    r3.unwrap();
    assert_eq!(trace.runs(), vec!["run 1", "run 2", "run 3"]);
    assert!(!engine.is_lane_active::<Step>());
}

#[tokio::test(start_paused = true)]
async fn test_solo_winner_is_the_first_submission() {
    let engine = Engine::default();
    let trace = Trace::default();
    let refresh = || Refresh {
        delay: 10,
        fail: false,
        trace: trace.clone(),
    };

    let first = engine.submit(refresh());
    let second = engine.submit(refresh());
    assert!(engine.is_solo_busy::<Refresh>());

    assert_eq!(second.await.unwrap(), Outcome::Suppressed);
    assert!(trace.runs().is_empty());
    assert_eq!(first.await.unwrap(), Outcome::Completed);
    assert_eq!(trace.runs(), vec!["run refresh"]);
    assert!(!engine.is_solo_busy::<Refresh>());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_queued_completion_passes_the_lane_on() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();

    let first = engine.submit(Step::new(1, 10, &trace));
    let second = engine.submit(Step::new(2, 10, &trace));
    let third = engine.submit(Step::new(3, 10, &trace));
    drop(second);

    let (r1, r3) = tokio::join!(first, third);
    r1.unwrap();
    r3.unwrap();
    assert_eq!(trace.runs(), vec!["run 1", "run 3"]);
    assert!(!engine.is_lane_active::<Step>());
}

#[tokio::test(start_paused = true)]
async fn test_dropped_owner_completion_hands_the_lane_over() {
    let engine = Engine::default();
    let trace = Trace::default();

    let owner = engine.submit(Step::new(1, 10, &trace));
    let next = engine.submit(Step::new(2, 10, &trace));
    drop(owner);
    assert_eq!(engine.queued_len::<Step>(), 0);
    assert!(engine.is_lane_active::<Step>());

    assert_eq!(next.await.unwrap(), Outcome::Completed);
    assert_eq!(trace.runs(), vec!["run 2"]);
    assert!(!engine.is_lane_active::<Step>());
}

#[test]
fn test_sequential_lane_runs_on_a_plain_current_thread_runtime() {
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_time()
        .build()
        .unwrap();
    let engine = Engine::default();
    let trace = Trace::default();

    let (a, b) = rt.block_on(async {
        tokio::join!(
            engine.submit(Step::new(1, 5, &trace)),
            engine.submit(Step::new(2, 5, &trace)),
        )
    });
    a.unwrap();
    b.unwrap();
    assert_eq!(trace.runs(), vec!["run 1", "run 2"]);
    assert!(!engine.is_lane_active::<Step>());
}

#[tokio::test(start_paused = true)]
async fn test_queued_failure_does_not_stop_the_lane() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();

    let (r1, r2, r3, r4) = tokio::join!(
        engine.submit(Step::new(1, 10, &trace).failing()),
        engine.submit(Step::new(2, 10, &trace).failing()),
        engine.submit(Step::new(3, 10, &trace)),
        engine.submit(Step::new(4, 10, &trace).failing()),
    );

    assert!(matches!(r1, Err(ExecError::ActionFailed { .. })));
    match r2 {
        Err(ExecError::ActionFailed { cause, .. }) => {
            assert_eq!(cause.to_string(), "step 2 failed");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert_eq!(r3.unwrap(), Outcome::Completed);
    assert!(matches!(r4, Err(ExecError::ActionFailed { .. })));
    assert_eq!(trace.runs(), vec!["run 1", "run 2", "run 3", "run 4"]);
    assert!(!engine.is_lane_active::<Step>());
}

#[tokio::test(start_paused = true)]
async fn test_lanes_of_different_types_are_independent() {
    let engine = Engine::default();
    let trace = Trace::default();

    let (a, b) = tokio::join!(
        engine.submit(Step::new(1, 20, &trace)),
        engine.submit(Backup(Step::new(2, 5, &trace))),
    );
    a.unwrap();
    b.unwrap();
    // `Backup` did not wait for `Step`'s lane
    assert_eq!(trace.runs(), vec!["run 2", "run 1"]);
}

#[tokio::test(start_paused = true)]
async fn test_solo_drops_concurrent_submission() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();
    let refresh = |delay| Refresh {
        delay,
        fail: false,
        trace: trace.clone(),
    };

    let (first, second) = tokio::join!(engine.submit(refresh(50)), async {
        let out = engine.submit(refresh(0)).await;
        trace.push("second resolved");
        out
    });

    assert_eq!(first.unwrap(), Outcome::Completed);
    assert_eq!(second.unwrap(), Outcome::Suppressed);
    assert_eq!(trace.runs(), vec!["run refresh"]);
    // the dropped submission resolved while the first was still running
    assert_eq!(trace.entries(), vec!["run refresh", "second resolved"]);
    assert!(!engine.is_solo_busy::<Refresh>());

    // the slot is free again
    assert_eq!(engine.submit(refresh(0)).await.unwrap(), Outcome::Completed);
    assert_eq!(trace.runs().len(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_solo_slot_released_after_failure() {
    let engine = Engine::default();
    let trace = Trace::default();

    let failed = engine
        .submit(Refresh {
            delay: 5,
            fail: true,
            trace: trace.clone(),
        })
        .await;
    assert!(matches!(failed, Err(ExecError::ActionFailed { .. })));
    assert!(!engine.is_solo_busy::<Refresh>());

    let ok = engine
        .submit(Refresh {
            delay: 5,
            fail: false,
            trace: trace.clone(),
        })
        .await;
    assert_eq!(ok.unwrap(), Outcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_solo_slot_released_when_submission_is_dropped() {
    let engine = Engine::default();
    let trace = Trace::default();

    let timed_out = tokio::time::timeout(
        ms(10),
        engine.submit(Refresh {
            delay: 1_000,
            fail: false,
            trace: trace.clone(),
        }),
    )
    .await;
    assert!(timed_out.is_err());
    assert!(!engine.is_solo_busy::<Refresh>());
}

#[tokio::test(start_paused = true)]
async fn test_parallel_instances_overlap() {
    let engine = Engine::default();
    let trace = Trace::default();

    let (a, b) = tokio::join!(
        engine.submit(Upload {
            id: 1,
            delay: 20,
            trace: trace.clone(),
        }),
        engine.submit(Upload {
            id: 2,
            delay: 10,
            trace: trace.clone(),
        }),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(trace.entries(), vec!["start 1", "start 2", "end 2", "end 1"]);
}

#[tokio::test(start_paused = true)]
async fn test_mode_override() {
    let engine = Engine::default();
    let trace = Trace::default();

    let (a, b) = tokio::join!(
        engine.submit_as(Step::new(1, 10, &trace), RunMode::Solo),
        engine.submit_as(Step::new(2, 10, &trace), RunMode::Solo),
    );
    assert_eq!(a.unwrap(), Outcome::Completed);
    assert_eq!(b.unwrap(), Outcome::Suppressed);
    assert_eq!(trace.runs(), vec!["run 1"]);
}

#[tokio::test(start_paused = true)]
async fn test_guard_refcount_across_overlapping_actions() {
    init_logger();
    let guard = BlockingGuard::new();
    let engine = Engine::default();
    let trace = Trace::default();

    let flips = Rc::new(RefCell::new(Vec::new()));
    {
        let flips = flips.clone();
        let flag = guard.flag().clone();
        guard
            .flag()
            .add_listener(move || flips.borrow_mut().push(flag.get_or(false)));
    }

    let first = engine.submit_guarded(
        Upload {
            id: 1,
            delay: 10,
            trace: trace.clone(),
        },
        &guard,
    );
    let second = async {
        sleep(ms(5)).await;
        engine
            .submit_guarded(
                Upload {
                    id: 2,
                    delay: 20,
                    trace: trace.clone(),
                },
                &guard,
            )
            .await
    };
    let checks = async {
        sleep(ms(2)).await;
        assert!(guard.should_block_back());
        assert_eq!(engine.guard_count(&guard), 1);

        sleep(ms(5)).await; // t = 7
        assert_eq!(engine.guard_count(&guard), 2);

        sleep(ms(8)).await; // t = 15, first ended
        assert_eq!(trace.position("end 1"), 2);
        assert!(guard.should_block_back());
        assert_eq!(engine.guard_count(&guard), 1);

        sleep(ms(15)).await; // t = 30, both ended
        assert!(!guard.should_block_back());
        assert_eq!(engine.guard_count(&guard), 0);
    };

    let (a, b, ()) = tokio::join!(first, second, checks);
    a.unwrap();
    b.unwrap();
    assert_eq!(*flips.borrow(), vec![true, false]);
}

#[tokio::test(start_paused = true)]
async fn test_guard_released_when_wrapped_action_fails() {
    let guard = BlockingGuard::new();
    let engine = Engine::default();
    let trace = Trace::default();

    let out = engine
        .submit_guarded(
            Refresh {
                delay: 5,
                fail: true,
                trace,
            },
            &guard,
        )
        .await;
    assert!(out.is_err());
    assert!(!guard.should_block_back());
    assert_eq!(engine.guard_count(&guard), 0);
}

#[tokio::test(start_paused = true)]
async fn test_wrapped_action_runs_unguarded_once_engine_is_gone() {
    init_logger();
    let guard = BlockingGuard::new();
    let engine = Engine::default();
    let trace = Trace::default();

    let pending = engine.submit_guarded(
        Upload {
            id: 1,
            delay: 5,
            trace: trace.clone(),
        },
        &guard,
    );
    drop(engine);

    assert_eq!(pending.await.unwrap(), Outcome::Completed);
    assert_eq!(trace.entries(), vec!["start 1", "end 1"]);
    assert!(!guard.should_block_back());
}

#[tokio::test(start_paused = true)]
async fn test_wrapped_submission_without_guard_is_rejected() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();

    let out = engine.submit_wrapped(Step::new(1, 0, &trace)).await;
    assert!(matches!(out, Err(ExecError::MissingGuard { .. })));
    assert!(trace.runs().is_empty());

    let guard = BlockingGuard::labeled("checkout");
    engine.set_guard(Some(guard.clone()));
    let out = engine.submit_wrapped(Step::new(2, 0, &trace)).await;
    assert_eq!(out.unwrap(), Outcome::Completed);
    assert_eq!(trace.runs(), vec!["run 2"]);
    assert!(!guard.should_block_back());
}

#[tokio::test(start_paused = true)]
async fn test_queued_wrapped_entries_take_the_guard_when_they_run() {
    let guard = BlockingGuard::new();
    let engine = Engine::new(EngineConfig {
        name: "orders".into(),
        guard: Some(guard.clone()),
    });
    let trace = Trace::default();

    let checks = async {
        sleep(ms(5)).await;
        assert_eq!(engine.queued_len::<Step>(), 1);
        assert_eq!(engine.guard_count(&guard), 1);
    };
    let (a, b, ()) = tokio::join!(
        engine.submit_wrapped(Step::new(1, 10, &trace)),
        engine.submit_wrapped(Step::new(2, 10, &trace)),
        checks,
    );
    a.unwrap();
    b.unwrap();
    assert!(!guard.should_block_back());
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_aborts_queued_entries() {
    init_logger();
    let engine = Engine::default();
    let trace = Trace::default();

    let cleanup = async {
        sleep(ms(5)).await;
        assert_eq!(engine.queued_len::<Step>(), 2);
        engine.cleanup();
    };
    let (r1, r2, r3, ()) = tokio::join!(
        engine.submit(Step::new(1, 20, &trace)),
        engine.submit(Step::new(2, 0, &trace)),
        engine.submit(Step::new(3, 0, &trace)),
        cleanup,
    );

    // the running owner is awaited to completion, not interrupted
    assert_eq!(r1.unwrap(), Outcome::Completed);
    assert!(matches!(r2, Err(ExecError::QueuedActionAborted { .. })));
    assert!(matches!(r3, Err(ExecError::QueuedActionAborted { .. })));
    assert_eq!(trace.runs(), vec!["run 1"]);
    assert!(!engine.is_lane_active::<Step>());
    assert_eq!(engine.queued_len::<Step>(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_cleanup_clears_guard_counts_without_flipping() {
    let guard = BlockingGuard::new();
    let engine = Engine::default();
    let trace = Trace::default();

    let checks = async {
        sleep(ms(5)).await;
        assert!(guard.should_block_back());
        engine.cleanup();
        assert_eq!(engine.guard_count(&guard), 0);
    };
    let (out, ()) = tokio::join!(
        engine.submit_guarded(
            Upload {
                id: 1,
                delay: 10,
                trace,
            },
            &guard,
        ),
        checks,
    );
    out.unwrap();
    // the count was dropped by cleanup; the finished action does not reach the flag
    assert!(guard.should_block_back());
    assert_eq!(guard.flag().set(false), SetOutcome::Changed);
}

#[tokio::test(start_paused = true)]
async fn test_engine_usable_after_cleanup() {
    let engine = Engine::default();
    let trace = Trace::default();
    engine.cleanup();

    let (a, b) = tokio::join!(
        engine.submit(Step::new(1, 5, &trace)),
        engine.submit(Step::new(2, 5, &trace)),
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(trace.runs(), vec!["run 1", "run 2"]);
}

#[test]
fn test_back_press_blocked_while_guard_raised() {
    let guard = BlockingGuard::new();
    let popped = Rc::new(RefCell::new(0));
    let pop = || {
        *popped.borrow_mut() += 1;
        true
    };

    assert!(guard.handle_back(pop));
    assert_eq!(*popped.borrow(), 1);

    guard.flag().set(true);
    assert!(guard.handle_back(|| {
        *popped.borrow_mut() += 1;
        true
    }));
    assert_eq!(*popped.borrow(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_logic_box_cleanup() {
    let logic = LogicBox::default();
    let total = logic.state("total", 0);
    let doubled = logic.derived("doubled");
    doubled.depends_on_with(&[&total], {
        let total = total.clone();
        move || total.get_or(0) * 2
    });
    let trace = Trace::default();

    let cleanup = async {
        sleep(ms(1)).await;
        logic.cleanup();
    };
    let (owner, queued, ()) = tokio::join!(
        logic.engine().submit(Step::new(1, 10, &trace)),
        logic.engine().submit(Step::new(2, 10, &trace)),
        cleanup,
    );

    owner.unwrap();
    assert!(matches!(queued, Err(ExecError::QueuedActionAborted { .. })));
    assert!(logic.is_cleaned_up());
    assert!(total.is_disposed());
    assert!(doubled.is_disposed());
    assert_eq!(total.listener_count(), 0);

    total.set(4);
    assert_eq!(doubled.get(), Ok(0));
}
