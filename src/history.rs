//! Simulation history: immutable per-instant state snapshots plus indexed
//! lookup by time and task, grounded on `crpd/hist.py` and
//! `crpd/internals/histmaps.py`.
//!
//! The Python original keeps a separately maintained sorted-time list next
//! to a `{time: state}` dict and does manual `bisect` lookups. A
//! `BTreeMap<Time, SimulatorState>` gives the same sorted-by-time lookup for
//! free and is the idiomatic Rust replacement for that pairing.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId, Time};

/// A captured event, decoupled from any live `Job`/`JobManager` so it can be
/// stored, compared and serialized independently of a running simulation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StateEvent {
    Completion {
        time: Time,
        task_id: TaskId,
        release_index: u64,
    },
    Arrival {
        time: Time,
        task_id: TaskId,
        release_index: u64,
    },
    Deadline {
        time: Time,
        task_id: TaskId,
        release_index: u64,
    },
    ScheduleTick {
        time: Time,
    },
}

/// A captured job snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct JobState {
    pub task: Arc<Task>,
    pub release_index: u64,
    pub progress: Time,
    pub preemption_debt: i64,
    pub last_start: Option<Time>,
}

/// A missed deadline. `time` is derived from the task's arrival process
/// rather than stored, matching `DeadlineMiss.time` in the original.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeadlineMiss {
    pub task: Arc<Task>,
    pub release_index: u64,
}

impl DeadlineMiss {
    pub fn time(&self) -> Time {
        self.task.arrival_time(self.release_index) + self.task.deadline()
    }

    pub fn task_id(&self) -> TaskId {
        self.task.unique_id()
    }
}

/// A recorded preemption of one job by another.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Preemption {
    pub time: Time,
    pub preempted_task: TaskId,
    pub preempted_release_index: u64,
    pub preempting_task: TaskId,
    pub preempting_release_index: u64,
    pub added_debt: i64,
    pub debt: i64,
}

/// A ready or running job identified just by task and release index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ReadyEntry {
    pub task_id: TaskId,
    pub release_index: u64,
}

/// The scheduler-specific portion of a state snapshot: which policy is
/// active, the running job (if any), and the ready set. The Dual-Priority
/// variant folds its promotion table in directly since `crpd/hist.py`'s
/// `DualPrioritySchedulerState` stores its policy alongside the base
/// ready/running entries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SchedulerKind {
    Edf,
    Rm,
    DualPriority { promotions: Vec<(TaskId, Time)> },
}

impl Default for SchedulerKind {
    fn default() -> Self {
        SchedulerKind::Edf
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchedulerState {
    pub kind: SchedulerKind,
    pub running: Option<ReadyEntry>,
    pub ready: Vec<ReadyEntry>,
}

/// A full, value-equal snapshot of the simulation at one instant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorState {
    pub time: Time,
    pub jobs: Vec<JobState>,
    pub events: Vec<StateEvent>,
    pub deadline_misses: Vec<DeadlineMiss>,
    pub preemptions: Vec<Preemption>,
    pub scheduler: SchedulerState,
}

impl SimulatorState {
    /// The state constructed at the start of a fresh simulation: no jobs
    /// yet, one arrival event per task's first release, default scheduler.
    pub fn initial(tasks: &[Arc<Task>], scheduler: SchedulerState) -> Self {
        let events = tasks
            .iter()
            .map(|t| StateEvent::Arrival {
                time: t.arrival_time(0),
                task_id: t.unique_id(),
                release_index: 0,
            })
            .collect();
        SimulatorState {
            time: 0,
            jobs: Vec::new(),
            events,
            deadline_misses: Vec::new(),
            preemptions: Vec::new(),
            scheduler,
        }
    }
}

/// Whether a deadline miss should count, based on a default policy plus a
/// named set of exceptions. Mirrors `DeadlineMissFilter`.
#[derive(Debug, Clone)]
pub struct DeadlineMissFilter {
    default: bool,
    tasks: Vec<TaskId>,
}

impl DeadlineMissFilter {
    /// Matches every task.
    pub fn all() -> Self {
        DeadlineMissFilter {
            default: true,
            tasks: Vec::new(),
        }
    }

    /// Matches no task.
    pub fn none() -> Self {
        DeadlineMissFilter {
            default: false,
            tasks: Vec::new(),
        }
    }

    /// Matches every task except the given ones.
    pub fn excluding(tasks: Vec<TaskId>) -> Self {
        DeadlineMissFilter {
            default: true,
            tasks,
        }
    }

    /// Matches only the given tasks.
    pub fn including(tasks: Vec<TaskId>) -> Self {
        DeadlineMissFilter {
            default: false,
            tasks,
        }
    }

    pub fn is_active(&self) -> bool {
        self.default || !self.tasks.is_empty()
    }

    pub fn matches(&self, task_id: TaskId) -> bool {
        let named = self.tasks.contains(&task_id);
        if named {
            !self.default
        } else {
            self.default
        }
    }
}

/// Intersection-filterable index over deadline misses, keyed by time and
/// task.
#[derive(Debug, Clone, Default)]
pub struct DeadlineMissMap {
    by_time: HashMap<Time, HashSet<DeadlineMiss>>,
    by_task: HashMap<TaskId, HashSet<DeadlineMiss>>,
    all: HashSet<DeadlineMiss>,
}

impl DeadlineMissMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, state: &SimulatorState) {
        for miss in &state.deadline_misses {
            self.by_time
                .entry(miss.time())
                .or_default()
                .insert(miss.clone());
            self.by_task
                .entry(miss.task_id())
                .or_default()
                .insert(miss.clone());
            self.all.insert(miss.clone());
        }
    }

    /// Returns the intersection of misses matching every provided
    /// constraint; with no constraints, returns every recorded miss.
    pub fn lookup(&self, time: Option<Time>, task: Option<TaskId>) -> HashSet<DeadlineMiss> {
        let mut cuts: Vec<HashSet<DeadlineMiss>> = Vec::new();
        if let Some(t) = time {
            cuts.push(self.by_time.get(&t).cloned().unwrap_or_default());
        }
        if let Some(tid) = task {
            cuts.push(self.by_task.get(&tid).cloned().unwrap_or_default());
        }
        intersect_sets(cuts, &self.all)
    }

    /// The earliest miss (by derived time) matching `filter`, if any.
    pub fn first_occurrence(&self, filter: &DeadlineMissFilter) -> Option<DeadlineMiss> {
        let mut candidates: Vec<&DeadlineMiss> = self.all.iter().collect();
        candidates.sort_by_key(|m| (m.time(), m.task_id(), m.release_index));
        candidates.into_iter().find(|m| filter.matches(m.task_id())).cloned()
    }
}

/// Intersection-filterable index over preemptions, keyed by time,
/// preempted task and preempting task.
#[derive(Debug, Clone, Default)]
pub struct PreemptionMap {
    by_time: HashMap<Time, HashSet<Preemption>>,
    by_preempted: HashMap<TaskId, HashSet<Preemption>>,
    by_preempting: HashMap<TaskId, HashSet<Preemption>>,
    all: HashSet<Preemption>,
}

impl PreemptionMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, state: &SimulatorState) {
        for p in &state.preemptions {
            self.by_time.entry(p.time).or_default().insert(p.clone());
            self.by_preempted
                .entry(p.preempted_task)
                .or_default()
                .insert(p.clone());
            self.by_preempting
                .entry(p.preempting_task)
                .or_default()
                .insert(p.clone());
            self.all.insert(p.clone());
        }
    }

    pub fn lookup(
        &self,
        time: Option<Time>,
        preempted_task: Option<TaskId>,
        preempting_task: Option<TaskId>,
    ) -> HashSet<Preemption> {
        let mut cuts: Vec<HashSet<Preemption>> = Vec::new();
        if let Some(t) = time {
            cuts.push(self.by_time.get(&t).cloned().unwrap_or_default());
        }
        if let Some(tid) = preempted_task {
            cuts.push(self.by_preempted.get(&tid).cloned().unwrap_or_default());
        }
        if let Some(tid) = preempting_task {
            cuts.push(self.by_preempting.get(&tid).cloned().unwrap_or_default());
        }
        intersect_sets(cuts, &self.all)
    }
}

fn intersect_sets<T: Clone + Eq + std::hash::Hash>(
    mut cuts: Vec<HashSet<T>>,
    all: &HashSet<T>,
) -> HashSet<T> {
    if cuts.is_empty() {
        return all.clone();
    }
    let mut result = cuts.remove(0);
    for cut in cuts {
        result = result.intersection(&cut).cloned().collect();
    }
    result
}

/// An append-only, time-indexed history of simulator states.
#[derive(Debug, Clone, Default)]
pub struct History {
    states: BTreeMap<Time, SimulatorState>,
    deadline_miss_map: DeadlineMissMap,
    preemption_map: PreemptionMap,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_state(&mut self, state: SimulatorState) {
        self.deadline_miss_map.add_state(&state);
        self.preemption_map.add_state(&state);
        self.states.insert(state.time, state);
    }

    pub fn contains(&self, time: Time) -> bool {
        self.states.contains_key(&time)
    }

    pub fn get(&self, time: Time) -> Option<&SimulatorState> {
        self.states.get(&time)
    }

    /// The last recorded state at or before `time`.
    pub fn last_state_at_or_before(&self, time: Time) -> Option<&SimulatorState> {
        self.states.range(..=time).next_back().map(|(_, s)| s)
    }

    pub fn first_deadline_miss(&self, filter: &DeadlineMissFilter) -> Option<DeadlineMiss> {
        self.deadline_miss_map.first_occurrence(filter)
    }

    pub fn deadline_misses(&self, time_limit: Time) -> HashSet<DeadlineMiss> {
        self.deadline_miss_map
            .lookup(None, None)
            .into_iter()
            .filter(|m| m.time() <= time_limit)
            .collect()
    }

    pub fn preemptions(&self, time_limit: Time) -> HashSet<Preemption> {
        self.preemption_map
            .lookup(None, None, None)
            .into_iter()
            .filter(|p| p.time <= time_limit)
            .collect()
    }

    pub fn state_times(&self) -> Vec<Time> {
        self.states.keys().copied().collect()
    }

    pub fn freeze(&self) -> FrozenHistory {
        FrozenHistory {
            states: self.states.clone(),
            deadline_miss_map: self.deadline_miss_map.clone(),
            preemption_map: self.preemption_map.clone(),
        }
    }
}

/// An immutable snapshot of a [`History`]. Carried by [`crate::error::SimulationError`]
/// so a failed run's full trace survives past the point of failure.
#[derive(Debug, Clone, Default)]
pub struct FrozenHistory {
    states: BTreeMap<Time, SimulatorState>,
    deadline_miss_map: DeadlineMissMap,
    preemption_map: PreemptionMap,
}

impl FrozenHistory {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn has_deadline_miss(&self) -> bool {
        self.first_deadline_miss(&DeadlineMissFilter::all()).is_some()
    }

    pub fn last_state(&self) -> Option<&SimulatorState> {
        self.states.values().next_back()
    }

    pub fn last_time(&self) -> Option<Time> {
        self.states.keys().next_back().copied()
    }

    pub fn state_times(&self) -> Vec<Time> {
        self.states.keys().copied().collect()
    }

    pub fn get(&self, time: Time) -> Option<&SimulatorState> {
        self.states.get(&time)
    }

    pub fn first_deadline_miss(&self, filter: &DeadlineMissFilter) -> Option<DeadlineMiss> {
        self.deadline_miss_map.first_occurrence(filter)
    }

    pub fn deadline_misses(&self, time_limit: Time) -> HashSet<DeadlineMiss> {
        self.deadline_miss_map
            .lookup(None, None)
            .into_iter()
            .filter(|m| m.time() <= time_limit)
            .collect()
    }

    pub fn preemptions(&self, time_limit: Time) -> HashSet<Preemption> {
        self.preemption_map
            .lookup(None, None, None)
            .into_iter()
            .filter(|p| p.time <= time_limit)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, Task};

    fn sample_state(time: Time) -> SimulatorState {
        SimulatorState {
            time,
            jobs: Vec::new(),
            events: Vec::new(),
            deadline_misses: Vec::new(),
            preemptions: Vec::new(),
            scheduler: SchedulerState::default(),
        }
    }

    #[test]
    fn history_lookup_finds_last_state_at_or_before() {
        let mut h = History::new();
        h.add_state(sample_state(0));
        h.add_state(sample_state(10));
        h.add_state(sample_state(20));
        assert_eq!(h.last_state_at_or_before(15).unwrap().time, 10);
        assert_eq!(h.last_state_at_or_before(20).unwrap().time, 20);
    }

    #[test]
    fn deadline_miss_filter_excludes_named_tasks() {
        let filter = DeadlineMissFilter::excluding(vec![1]);
        assert!(filter.matches(2));
        assert!(!filter.matches(1));
    }

    #[test]
    fn deadline_miss_map_intersection_lookup() {
        reset_task_id_counter();
        let task = Arc::new(Task::new(1, 10, ArrivalDistribution::fixed(10)));
        let mut state = sample_state(10);
        state.deadline_misses.push(DeadlineMiss {
            task: task.clone(),
            release_index: 0,
        });
        let mut map = DeadlineMissMap::new();
        map.add_state(&state);
        let by_task = map.lookup(None, Some(task.unique_id()));
        assert_eq!(by_task.len(), 1);
        let by_time_wrong = map.lookup(Some(999), None);
        assert!(by_time_wrong.is_empty());
    }

    #[test]
    fn frozen_history_is_read_only_snapshot() {
        let mut h = History::new();
        h.add_state(sample_state(0));
        let frozen = h.freeze();
        assert_eq!(frozen.last_time(), Some(0));
    }

    /// `spec.md` §5 requires `SimulatorState` stay "efficiently value-equal /
    /// clonable for inter-worker transport"; `serde_json` round-trips it the
    /// way an external multi-process front-end would move it across a
    /// process boundary.
    #[test]
    fn simulator_state_round_trips_through_json() {
        reset_task_id_counter();
        let task = Arc::new(Task::new(1, 10, ArrivalDistribution::fixed(10)));
        let mut state = sample_state(10);
        state.deadline_misses.push(DeadlineMiss {
            task: task.clone(),
            release_index: 0,
        });
        state.scheduler.running = Some(ReadyEntry {
            task_id: task.unique_id(),
            release_index: 0,
        });

        let encoded = serde_json::to_string(&state).unwrap();
        let decoded: SimulatorState = serde_json::from_str(&encoded).unwrap();

        assert_eq!(decoded, state);
    }
}
