//! Scenario harness - seeded random schedules checked against the kernel's
//! ordering rules
//!
//! Checks, per run:
//! - Dispatch order is non-decreasing in time
//! - Equal timestamps dispatch in insertion order
//! - Cancelled and removed events never run
//! - `now()` and `context()` inside an event match what was scheduled
//! - Swapping the scheduler mid-run changes nothing

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use nsim_core::{make_event, EventId, Time};
use nsim_engine::{DefaultSimulatorImpl, SimulatorImpl};
use nsim_scheduler::SchedulerType;
use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::debug;

/// Scenario configuration
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    /// Number of top-level events
    pub event_count: usize,
    /// Largest delay, in ticks. Small values force many timestamp ties.
    pub max_delay: i64,
    /// Number of distinct contexts
    pub context_count: u32,
    /// Probability a top-level event is cancelled or removed before `run`
    pub cancel_prob: f64,
    /// Probability an event schedules one follow-up when it runs
    pub child_prob: f64,
    /// Swap to this scheduler once this many events have been dispatched
    pub swap: Option<(u64, SchedulerType)>,
    /// Random seed
    pub seed: u64,
}

impl Default for ScenarioConfig {
    fn default() -> Self {
        ScenarioConfig {
            event_count: 1000,
            max_delay: 100,
            context_count: 8,
            cancel_prob: 0.1,
            child_prob: 0.2,
            swap: None,
            seed: 42,
        }
    }
}

impl ScenarioConfig {
    /// Small scenario for quick tests
    pub fn light() -> Self {
        ScenarioConfig {
            event_count: 100,
            max_delay: 20,
            context_count: 4,
            cancel_prob: 0.1,
            child_prob: 0.2,
            swap: None,
            seed: 42,
        }
    }

    /// Large scenario for benchmarks
    pub fn heavy() -> Self {
        ScenarioConfig {
            event_count: 20_000,
            max_delay: 1_000,
            context_count: 64,
            cancel_prob: 0.2,
            child_prob: 0.3,
            swap: None,
            seed: 42,
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_swap(mut self, after: u64, to: SchedulerType) -> Self {
        self.swap = Some((after, to));
        self
    }
}

/// One dispatched event as observed from inside its body
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dispatch {
    /// Insertion sequence number
    pub seq: u64,
    pub ts: Time,
    pub context: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Withdraw {
    Cancel,
    Remove,
}

#[derive(Clone, Copy, Debug)]
struct Planned {
    delay: Time,
    context: u32,
    withdraw: Option<Withdraw>,
    child: Option<Time>,
}

/// State shared by every event of one run
struct Shared {
    engine: Arc<dyn SimulatorImpl>,
    next_seq: AtomicU64,
    log: Mutex<Vec<Dispatch>>,
    clock_mismatches: AtomicU64,
    context_mismatches: AtomicU64,
    withdrawn_invocations: AtomicU64,
    swap: Option<(u64, SchedulerType)>,
}

impl Shared {
    fn take_seq(&self) -> u64 {
        self.next_seq.fetch_add(1, Ordering::Relaxed)
    }

    fn record(&self, seq: u64, expected_ts: Time, expected_context: u32) {
        let now = self.engine.now();
        let context = self.engine.context();
        if now != expected_ts {
            self.clock_mismatches.fetch_add(1, Ordering::Relaxed);
        }
        if context != expected_context {
            self.context_mismatches.fetch_add(1, Ordering::Relaxed);
        }

        let dispatched = {
            let mut log = self.log.lock();
            log.push(Dispatch { seq, ts: now, context });
            log.len() as u64
        };
        if let Some((after, to)) = self.swap {
            if dispatched == after {
                debug!(after, to = %to, "swapping scheduler mid-run");
                self.engine.set_scheduler(to.build());
            }
        }
    }

    /// Schedule a follow-up from inside a running event; it inherits the
    /// current context
    fn schedule_child(self: &Arc<Self>, delay: Time) {
        let seq = self.take_seq();
        let ts = self.engine.now() + delay;
        let context = self.engine.context();
        let shared = self.clone();
        self.engine
            .schedule(delay, make_event(move || shared.record(seq, ts, context)));
    }
}

/// Scenario result
#[derive(Debug)]
pub struct ScenarioResult {
    /// Engine and scheduler that produced the run
    pub engine: &'static str,
    pub scheduler: Option<SchedulerType>,
    pub dispatched: Vec<Dispatch>,
    /// Events that should have run
    pub expected: usize,
    /// A dispatch earlier in time than the one before it
    pub order_violations: u32,
    /// Equal timestamps dispatched out of insertion order
    pub fifo_violations: u32,
    pub withdrawn_invocations: u64,
    pub clock_mismatches: u64,
    pub context_mismatches: u64,
}

impl ScenarioResult {
    pub fn is_valid(&self) -> bool {
        self.dispatched.len() == self.expected
            && self.order_violations == 0
            && self.fifo_violations == 0
            && self.withdrawn_invocations == 0
            && self.clock_mismatches == 0
            && self.context_mismatches == 0
    }

    /// Insertion sequence numbers in dispatch order
    pub fn trace(&self) -> Vec<u64> {
        self.dispatched.iter().map(|d| d.seq).collect()
    }
}

/// Seeded scenario runner
pub struct Scenario {
    config: ScenarioConfig,
    plan: Vec<Planned>,
}

impl Scenario {
    /// Draw the plan from `config.seed`; every run of this scenario replays it
    pub fn new(config: ScenarioConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed);
        let contexts = config.context_count.max(1);

        let plan = (0..config.event_count)
            .map(|_| {
                let delay = Time::from_step(rng.gen_range(0..=config.max_delay));
                let context = rng.gen_range(0..contexts);
                let withdraw = if rng.gen::<f64>() < config.cancel_prob {
                    Some(if rng.gen() { Withdraw::Cancel } else { Withdraw::Remove })
                } else {
                    None
                };
                let child = if rng.gen::<f64>() < config.child_prob {
                    Some(Time::from_step(rng.gen_range(0..=config.max_delay)))
                } else {
                    None
                };
                Planned { delay, context, withdraw, child }
            })
            .collect();

        Scenario { config, plan }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }

    /// Events a correct engine dispatches
    pub fn expected_dispatches(&self) -> usize {
        self.plan
            .iter()
            .filter(|p| p.withdraw.is_none())
            .map(|p| 1 + usize::from(p.child.is_some()))
            .sum()
    }

    /// Run on a fresh default engine backed by `scheduler`
    pub fn run(&self, scheduler: SchedulerType) -> ScenarioResult {
        let engine = Arc::new(DefaultSimulatorImpl::with_scheduler(scheduler.build()));
        let mut result = self.run_on(engine);
        result.scheduler = Some(scheduler);
        result
    }

    /// Run once per scheduler type
    pub fn run_all(&self) -> Vec<ScenarioResult> {
        SchedulerType::ALL.into_iter().map(|t| self.run(t)).collect()
    }

    /// Run on a caller-supplied engine, which is destroyed afterwards
    ///
    /// The engine must be fresh: the plan assumes virtual time starts at zero.
    pub fn run_on(&self, engine: Arc<dyn SimulatorImpl>) -> ScenarioResult {
        let shared = Arc::new(Shared {
            engine: engine.clone(),
            next_seq: AtomicU64::new(0),
            log: Mutex::new(Vec::with_capacity(self.expected_dispatches())),
            clock_mismatches: AtomicU64::new(0),
            context_mismatches: AtomicU64::new(0),
            withdrawn_invocations: AtomicU64::new(0),
            swap: self.config.swap,
        });

        let mut withdrawn: Vec<(EventId, Withdraw)> = Vec::new();
        for planned in &self.plan {
            let seq = shared.take_seq();
            let s = shared.clone();
            match planned.withdraw {
                Some(how) => {
                    let id = engine.schedule(
                        planned.delay,
                        make_event(move || {
                            s.withdrawn_invocations.fetch_add(1, Ordering::Relaxed);
                        }),
                    );
                    withdrawn.push((id, how));
                }
                None => {
                    let (ts, context, child) = (planned.delay, planned.context, planned.child);
                    engine.schedule_with_context(
                        context,
                        planned.delay,
                        make_event(move || {
                            s.record(seq, ts, context);
                            if let Some(delay) = child {
                                s.schedule_child(delay);
                            }
                        }),
                    );
                }
            }
        }
        for (id, how) in &withdrawn {
            match how {
                Withdraw::Cancel => engine.cancel(id),
                Withdraw::Remove => engine.remove(id),
            }
        }

        // Past every planned event and child; realtime engines need it to
        // return at all.
        engine.stop_at(Time::from_step(2 * self.config.max_delay + 1));
        engine.run();
        engine.destroy();

        let dispatched = std::mem::take(&mut *shared.log.lock());
        let (order_violations, fifo_violations) = check_order(&dispatched);
        let result = ScenarioResult {
            engine: engine.name(),
            scheduler: None,
            expected: self.expected_dispatches(),
            order_violations,
            fifo_violations,
            withdrawn_invocations: shared.withdrawn_invocations.load(Ordering::Relaxed),
            clock_mismatches: shared.clock_mismatches.load(Ordering::Relaxed),
            context_mismatches: shared.context_mismatches.load(Ordering::Relaxed),
            dispatched,
        };
        debug!(
            engine = result.engine,
            seed = self.config.seed,
            dispatched = result.dispatched.len(),
            valid = result.is_valid(),
            "scenario finished"
        );
        result
    }
}

/// Count ordering and tie-break violations in a dispatch log
pub fn check_order(log: &[Dispatch]) -> (u32, u32) {
    let mut order = 0;
    let mut fifo = 0;
    for pair in log.windows(2) {
        let (prev, next) = (pair[0], pair[1]);
        if next.ts < prev.ts {
            order += 1;
        } else if next.ts == prev.ts && next.seq < prev.seq {
            fifo += 1;
        }
    }
    (order, fifo)
}
