//! Task model: workload description, arrival processes and preemption cost
//! models, grounded on `crpd/model.py`.
//!
//! `Task` and `TaskSet` compare and hash by identity (`uniqueId`), matching
//! the original's `ValueEqual`-with-exclusions pattern applied to tasks
//! inside a running simulation: two tasks built from identical parameters
//! are still distinct tasks once they carry different ids. Structural
//! "same workload" comparison is available separately as `lax_eq`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Poisson};
use serde::{Deserialize, Serialize};

/// Process-wide monotonic counter backing [`Task::new`]'s default id
/// assignment. The only piece of global mutable state in the crate, matching
/// `SPEC_FULL.md` §5 ("no process-global mutable state except a resettable
/// monotonic uniqueId counter").
static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(0);

/// Resets the global task-id counter to zero. Intended for test isolation
/// and for worker processes that want ids to start fresh per batch.
pub fn reset_task_id_counter() {
    NEXT_TASK_ID.store(0, Ordering::SeqCst);
}

fn next_task_id() -> u64 {
    NEXT_TASK_ID.fetch_add(1, Ordering::SeqCst)
}

pub type TaskId = u64;
pub type Time = i64;

/// How a task's jobs are released over time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ArrivalDistribution {
    /// Strictly periodic releases: `arrival(k) = period * k`.
    Fixed { period: Time },
    /// Deterministic, memoised, seeded jittered releases:
    /// `arrival(0) = 0`, `arrival(k) = arrival(k-1) + minimal + Poisson(lambda)`.
    PoissonOffset {
        minimal: Time,
        lambda: f64,
        seed: u64,
        /// `Arc<Mutex<_>>`, not `RefCell`: tasks cross worker-thread
        /// boundaries via [`crate::pool::SimulationPool`], which requires
        /// `Task`/`TaskSet` to stay `Send + Sync` (`SPEC_FULL.md` §5) — a
        /// `RefCell` here would make the whole `Task` `!Sync`. The `Arc`
        /// layer (rather than a bare `Mutex`) keeps this `Clone`, sharing
        /// the memoisation cache across clones the way `TaskSet` already
        /// shares `Task`s themselves behind `Arc`.
        #[serde(skip)]
        cache: Arc<Mutex<HashMap<u64, Time>>>,
        #[serde(skip)]
        rng: Arc<Mutex<Option<SmallRng>>>,
    },
}

impl ArrivalDistribution {
    pub fn fixed(period: Time) -> Self {
        ArrivalDistribution::Fixed { period }
    }

    pub fn poisson_offset(minimal: Time, lambda: f64, seed: u64) -> Self {
        ArrivalDistribution::PoissonOffset {
            minimal,
            lambda,
            seed,
            cache: Arc::new(Mutex::new(HashMap::new())),
            rng: Arc::new(Mutex::new(None)),
        }
    }

    /// The minimal inter-arrival time: the task's period for a fixed
    /// distribution, the jitter floor for a Poisson-offset one.
    pub fn minimal(&self) -> Time {
        match self {
            ArrivalDistribution::Fixed { period } => *period,
            ArrivalDistribution::PoissonOffset { minimal, .. } => *minimal,
        }
    }

    /// The absolute arrival time of the `release_index`-th job (0-based).
    pub fn arrival_time(&self, release_index: u64) -> Time {
        match self {
            ArrivalDistribution::Fixed { period } => period * release_index as Time,
            ArrivalDistribution::PoissonOffset {
                minimal,
                lambda,
                seed,
                cache,
                rng,
            } => {
                if release_index == 0 {
                    return 0;
                }
                if let Some(t) = cache.lock().unwrap().get(&release_index) {
                    return *t;
                }
                let previous = self.arrival_time(release_index - 1);
                let mut rng_ref = rng.lock().unwrap();
                if rng_ref.is_none() {
                    *rng_ref = Some(SmallRng::seed_from_u64(*seed));
                }
                let sample = Poisson::new(*lambda)
                    .expect("lambda must be positive for a Poisson arrival process")
                    .sample(rng_ref.as_mut().unwrap()) as Time;
                let arrival = previous + minimal + sample;
                cache.lock().unwrap().insert(release_index, arrival);
                arrival
            }
        }
    }
}

/// Value-equal comparison ignoring the memoisation cache and RNG state,
/// mirroring `PoissonArrivalDistribution._nonValueFields`.
impl PartialEq for ArrivalDistribution {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ArrivalDistribution::Fixed { period: p1 }, ArrivalDistribution::Fixed { period: p2 }) => {
                p1 == p2
            }
            (
                ArrivalDistribution::PoissonOffset {
                    minimal: m1,
                    lambda: l1,
                    seed: s1,
                    ..
                },
                ArrivalDistribution::PoissonOffset {
                    minimal: m2,
                    lambda: l2,
                    seed: s2,
                    ..
                },
            ) => m1 == m2 && l1.to_bits() == l2.to_bits() && s1 == s2,
            _ => false,
        }
    }
}
impl Eq for ArrivalDistribution {}

/// Models the cost of preempting a job, charged against a scheduler's
/// preemption-debt accounting.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PreemptionCost {
    /// A constant debt regardless of how much progress the job had made.
    Fixed { cost: i64 },
    /// A debt proportional to the "area" of work lost, using the
    /// `x*ln(x) - (x-1)` shape from `crpd/model.py::LogPreemptionCost`.
    LogArea { fixed_cost: i64, time_ratio: f64 },
}

impl PreemptionCost {
    /// `x*ln(x) - (x-1)` for `x > 0`, else `0`.
    pub fn log_area(x: f64) -> f64 {
        if x <= 0.0 {
            0.0
        } else {
            x * x.ln() - (x - 1.0)
        }
    }

    /// The preemption debt charged for a job with the given `wcet`,
    /// `remaining_wcet` and `progress` (all in the same time unit).
    pub fn cost(&self, wcet: Time, remaining_wcet: Time, progress: Time) -> i64 {
        match self {
            PreemptionCost::Fixed { cost } => *cost,
            PreemptionCost::LogArea {
                fixed_cost,
                time_ratio,
            } => {
                let base_area = Self::log_area(wcet as f64);
                let rem_area = Self::log_area(remaining_wcet as f64);
                let progress_area = Self::log_area(progress as f64);
                let total_area = base_area - rem_area - progress_area;
                let area_cost = (total_area * time_ratio).floor() as i64;
                fixed_cost + area_cost
            }
        }
    }
}

/// A single task's static description: worst-case execution time, relative
/// deadline, arrival process and preemption cost model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    unique_id: TaskId,
    wcet: Time,
    deadline: Time,
    arrival_distribution: ArrivalDistribution,
    preemption_cost: PreemptionCost,
    display_name: Option<String>,
}

impl Task {
    /// `wcet` must be strictly positive; panics otherwise, matching the
    /// original's `assert wcet > 0`.
    pub fn new(wcet: Time, deadline: Time, arrival_distribution: ArrivalDistribution) -> Self {
        assert!(wcet > 0, "task wcet must be strictly positive, got {wcet}");
        Task {
            unique_id: next_task_id(),
            wcet,
            deadline,
            arrival_distribution,
            preemption_cost: PreemptionCost::Fixed { cost: 0 },
            display_name: None,
        }
    }

    pub fn with_preemption_cost(mut self, preemption_cost: PreemptionCost) -> Self {
        self.preemption_cost = preemption_cost;
        self
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Constructs a task with an explicit id, bypassing the global counter.
    /// Used by the text-format parser (`textfmt`) and by tests that need
    /// reproducible ids independent of call order.
    pub fn with_id(
        unique_id: TaskId,
        wcet: Time,
        deadline: Time,
        arrival_distribution: ArrivalDistribution,
        preemption_cost: PreemptionCost,
    ) -> Self {
        assert!(wcet > 0, "task wcet must be strictly positive, got {wcet}");
        Task {
            unique_id,
            wcet,
            deadline,
            arrival_distribution,
            preemption_cost,
            display_name: None,
        }
    }

    pub fn unique_id(&self) -> TaskId {
        self.unique_id
    }
    pub fn wcet(&self) -> Time {
        self.wcet
    }
    pub fn deadline(&self) -> Time {
        self.deadline
    }
    pub fn arrival_distribution(&self) -> &ArrivalDistribution {
        &self.arrival_distribution
    }
    pub fn preemption_cost(&self) -> &PreemptionCost {
        &self.preemption_cost
    }
    pub fn minimal_inter_arrival_time(&self) -> Time {
        self.arrival_distribution.minimal()
    }
    pub fn utilization(&self) -> f64 {
        self.wcet as f64 / self.minimal_inter_arrival_time() as f64
    }
    pub fn arrival_time(&self, release_index: u64) -> Time {
        self.arrival_distribution.arrival_time(release_index)
    }

    /// Structural "same workload" comparison, ignoring `unique_id` and
    /// display name. Mirrors `Task.laxEquality` in the original; used by
    /// tests and diagnostics, never by scheduling logic.
    pub fn lax_eq(&self, other: &Task) -> bool {
        self.wcet == other.wcet
            && self.deadline == other.deadline
            && self.arrival_distribution == other.arrival_distribution
            && self.preemption_cost == other.preemption_cost
    }
}

impl PartialEq for Task {
    fn eq(&self, other: &Self) -> bool {
        self.unique_id == other.unique_id
    }
}
impl Eq for Task {}
impl std::hash::Hash for Task {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.unique_id.hash(state);
    }
}

impl std::fmt::Display for Task {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if let Some(name) = &self.display_name {
            write!(f, "{name}")
        } else {
            write!(
                f,
                "Task({}, {}, {:?}, {:?})",
                self.wcet, self.deadline, self.arrival_distribution, self.preemption_cost
            )
        }
    }
}

/// A collection of tasks forming one scheduling problem instance.
///
/// Tasks are held behind `Arc` so every `Job` referencing a task shares its
/// arrival-process memoisation cache instead of duplicating it per clone.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSet {
    tasks: Vec<Arc<Task>>,
}

impl TaskSet {
    pub fn new(tasks: Vec<Task>) -> Self {
        TaskSet {
            tasks: tasks.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn from_arcs(tasks: Vec<Arc<Task>>) -> Self {
        TaskSet { tasks }
    }

    pub fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn task(&self, id: TaskId) -> Option<Arc<Task>> {
        self.tasks.iter().find(|t| t.unique_id() == id).cloned()
    }

    /// The least common multiple of every task's minimal inter-arrival time.
    pub fn hyperperiod(&self) -> Time {
        self.tasks
            .iter()
            .map(|t| t.minimal_inter_arrival_time())
            .fold(1, lcm)
    }

    pub fn utilization(&self) -> f64 {
        self.tasks.iter().map(|t| t.utilization()).sum()
    }

    pub fn max_period(&self) -> Time {
        self.tasks
            .iter()
            .map(|t| t.minimal_inter_arrival_time())
            .max()
            .unwrap_or(0)
    }

    /// Order-independent structural comparison: true if `other` contains,
    /// for every task in `self`, exactly one structurally-equal counterpart.
    pub fn lax_equality(&self, other: &TaskSet) -> bool {
        if self.tasks.len() != other.tasks.len() {
            return false;
        }
        let mut remaining: Vec<&Arc<Task>> = other.tasks.iter().collect();
        for t1 in &self.tasks {
            let pos = remaining.iter().position(|t2| t1.lax_eq(t2));
            match pos {
                Some(i) => {
                    remaining.remove(i);
                }
                None => return false,
            }
        }
        remaining.is_empty()
    }
}

impl<'a> IntoIterator for &'a TaskSet {
    type Item = &'a Arc<Task>;
    type IntoIter = std::slice::Iter<'a, Arc<Task>>;
    fn into_iter(self) -> Self::IntoIter {
        self.tasks.iter()
    }
}

fn gcd(a: Time, b: Time) -> Time {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn lcm(a: Time, b: Time) -> Time {
    if a == 0 || b == 0 {
        0
    } else {
        (a / gcd(a, b)) * b
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_arrival_is_strictly_periodic() {
        let ad = ArrivalDistribution::fixed(10);
        assert_eq!(ad.arrival_time(0), 0);
        assert_eq!(ad.arrival_time(3), 30);
    }

    #[test]
    fn poisson_offset_arrival_is_monotone_and_memoised() {
        let ad = ArrivalDistribution::poisson_offset(5, 1.0, 42);
        assert_eq!(ad.arrival_time(0), 0);
        let a1 = ad.arrival_time(1);
        let a2 = ad.arrival_time(1);
        assert_eq!(a1, a2, "arrival times must be memoised and deterministic");
        let a3 = ad.arrival_time(3);
        assert!(a3 > a1);
    }

    #[test]
    fn poisson_offset_is_reproducible_from_same_seed_regardless_of_call_order() {
        let a = ArrivalDistribution::poisson_offset(5, 2.0, 7);
        let b = ArrivalDistribution::poisson_offset(5, 2.0, 7);
        // query b's indices out of order: recursion must still resolve to
        // the same values as a sequential fill.
        let b5 = b.arrival_time(5);
        let a5 = a.arrival_time(5);
        assert_eq!(a5, b5);
    }

    #[test]
    fn log_area_is_zero_at_zero_and_matches_formula() {
        assert_eq!(PreemptionCost::log_area(0.0), 0.0);
        let expected = 4.0 * 4f64.ln() - 3.0;
        assert!((PreemptionCost::log_area(4.0) - expected).abs() < 1e-9);
    }

    #[test]
    fn tasks_compare_by_identity_not_structure() {
        reset_task_id_counter();
        let t1 = Task::new(1, 10, ArrivalDistribution::fixed(10));
        let t2 = Task::new(1, 10, ArrivalDistribution::fixed(10));
        assert_ne!(t1, t2, "independently constructed tasks have distinct ids");
        assert!(t1.lax_eq(&t2), "but they describe the same workload");
    }

    #[test]
    fn hyperperiod_is_lcm_of_periods() {
        reset_task_id_counter();
        let ts = TaskSet::new(vec![
            Task::new(1, 4, ArrivalDistribution::fixed(4)),
            Task::new(1, 6, ArrivalDistribution::fixed(6)),
        ]);
        assert_eq!(ts.hyperperiod(), 12);
    }

    #[test]
    #[should_panic]
    fn zero_wcet_panics() {
        let _ = Task::new(0, 10, ArrivalDistribution::fixed(10));
    }
}
