//! Scheduling policies and their runtime scheduler state, grounded on
//! `crpd/internals/sched.py` and `crpd/policy.py`.
//!
//! Schedulers operate on job *keys* (`task_id`, `release_index`) rather than
//! on `Job` references directly, since the simulator owns the one
//! authoritative `Job` per key in its `JobManager` and handing out `&mut
//! Job` borrows into a scheduler's internal heaps would fight the borrow
//! checker for no benefit — every scheduler decision already needs to read
//! job state back out of the manager anyway.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use priority_queue::PriorityQueue;
use serde::{Deserialize, Serialize};

use crate::history::{ReadyEntry, SchedulerKind, SchedulerState as SchedulerStateSnapshot};
use crate::job::JobManager;
use crate::task::{Task, TaskId, TaskSet, Time};

pub type JobKey = (TaskId, u64);

/// Which job was running before and after a call to [`Scheduler::schedule`].
/// `old == new` (both `Some`) means the running job simply continued;
/// `old` differing from `new` means a preemption (or a resumption from
/// idle, when `old` is `None`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleTransition {
    pub old: Option<JobKey>,
    pub new: Option<JobKey>,
}

/// Per-task Dual-Priority information: a baseline low priority, and
/// optionally a promotion time at which the task's priority jumps to a
/// higher (numerically smaller) value. Lower priority values win.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DualPriorityTaskInfo {
    low_priority: i64,
    promotion: Option<Time>,
    high_priority: Option<i64>,
}

impl DualPriorityTaskInfo {
    pub fn without_promotion(low_priority: i64) -> Self {
        DualPriorityTaskInfo {
            low_priority,
            promotion: None,
            high_priority: None,
        }
    }

    pub fn with_promotion(low_priority: i64, promotion: Time, high_priority: i64) -> Self {
        assert!(
            high_priority <= low_priority,
            "a promoted priority must be at least as urgent as the base priority"
        );
        DualPriorityTaskInfo {
            low_priority,
            promotion: Some(promotion),
            high_priority: Some(high_priority),
        }
    }

    pub fn has_promotion(&self) -> bool {
        self.promotion.is_some()
    }

    pub fn promotion(&self) -> Option<Time> {
        self.promotion
    }

    pub fn low_priority(&self) -> i64 {
        self.low_priority
    }

    pub fn high_priority(&self) -> Option<i64> {
        self.high_priority
    }

    /// The task's priority `relative_time` after its release.
    pub fn priority_at(&self, relative_time: Time) -> i64 {
        match self.promotion {
            Some(p) if relative_time >= p => self.high_priority.unwrap(),
            _ => self.low_priority,
        }
    }
}

/// An immutable Dual-Priority assignment over a set of tasks. `with_update`
/// returns a new policy with the given entries merged in, matching the
/// original's functional `withUpdate`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DualPriorityPolicy {
    entries: HashMap<TaskId, DualPriorityTaskInfo>,
}

impl DualPriorityPolicy {
    pub fn new(entries: impl IntoIterator<Item = (TaskId, DualPriorityTaskInfo)>) -> Self {
        DualPriorityPolicy {
            entries: entries.into_iter().collect(),
        }
    }

    pub fn with_update(&self, updates: impl IntoIterator<Item = (TaskId, DualPriorityTaskInfo)>) -> Self {
        let mut entries = self.entries.clone();
        for (task_id, info) in updates {
            entries.insert(task_id, info);
        }
        DualPriorityPolicy { entries }
    }

    pub fn scheduler_info(&self, task_id: TaskId) -> &DualPriorityTaskInfo {
        self.entries
            .get(&task_id)
            .unwrap_or_else(|| panic!("task {task_id} not found in dual priority policy"))
    }

    pub fn priority_at(&self, task_id: TaskId, relative_time: Time) -> i64 {
        self.scheduler_info(task_id).priority_at(relative_time)
    }

    pub fn low_priority(&self, task_id: TaskId) -> i64 {
        self.scheduler_info(task_id).low_priority()
    }

    pub fn has_promotion(&self, task_id: TaskId) -> bool {
        self.scheduler_info(task_id).has_promotion()
    }

    pub fn promotion(&self, task_id: TaskId) -> Option<Time> {
        self.scheduler_info(task_id).promotion()
    }

    pub fn high_priority(&self, task_id: TaskId) -> Option<i64> {
        self.scheduler_info(task_id).high_priority()
    }

    pub fn tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.entries.keys().copied()
    }

    pub fn promoted_tasks(&self) -> HashSet<TaskId> {
        self.entries
            .iter()
            .filter(|(_, info)| info.has_promotion())
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn entries(&self) -> impl Iterator<Item = (TaskId, &DualPriorityTaskInfo)> {
        self.entries.iter().map(|(id, info)| (*id, info))
    }
}

impl PartialEq for DualPriorityPolicy {
    fn eq(&self, other: &Self) -> bool {
        self.entries == other.entries
    }
}

/// The scheduling discipline a simulation run is configured with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SchedulingPolicy {
    Edf,
    Rm,
    DualPriority(DualPriorityPolicy),
}

impl SchedulingPolicy {
    pub fn create_scheduler(&self) -> Box<dyn Scheduler> {
        match self {
            SchedulingPolicy::Edf => Box::new(EdfScheduler::new()),
            SchedulingPolicy::Rm => Box::new(RmScheduler::new()),
            SchedulingPolicy::DualPriority(p) => Box::new(DualPriorityScheduler::new(p.clone())),
        }
    }
}

/// Scheduler contract. `initialize` is called once before simulation with
/// the full task set (only [`DualPriorityScheduler`] needs it, to seed its
/// promotions heap); every other hook runs per event.
pub trait Scheduler {
    fn initialize(&mut self, _task_set: &TaskSet) {}

    /// Times strictly after `time` at which the schedule must be
    /// recomputed even if no other event occurs (used by Dual-Priority to
    /// force a re-evaluation at a promotion instant). Takes the task set
    /// because Dual-Priority needs each promoted task's arrival process to
    /// advance its promotions heap; EDF/RM ignore it.
    fn next_schedule_ticks(&mut self, _time: Time, _task_set: &TaskSet) -> Vec<Time> {
        Vec::new()
    }

    fn add_ready_job(&mut self, key: JobKey, job_manager: &JobManager);

    fn schedule(&mut self, time: Time, job_manager: &JobManager) -> ScheduleTransition;

    fn running_job(&self) -> Option<JobKey>;

    fn execution_completed(&mut self);

    fn scheduler_state(&self) -> SchedulerStateSnapshot;
}

fn job_deadline(job_manager: &JobManager, key: JobKey) -> Time {
    job_manager
        .get(key.0, key.1)
        .expect("scheduler referenced a job not tracked by the job manager")
        .deadline()
}

fn job_task(job_manager: &JobManager, key: JobKey) -> std::sync::Arc<Task> {
    job_manager
        .get(key.0, key.1)
        .expect("scheduler referenced a job not tracked by the job manager")
        .task()
        .clone()
}

// ---------------------------------------------------------------------
// EDF
// ---------------------------------------------------------------------

type EdfPriority = (Time, u64);

/// Earliest-Deadline-First, with a per-deadline collision index breaking
/// ties between jobs that share an absolute deadline in FIFO arrival order.
pub struct EdfScheduler {
    ready: BinaryHeap<Reverse<(EdfPriority, JobKey)>>,
    running: Option<(EdfPriority, JobKey)>,
    collisions: HashMap<Time, HashMap<JobKey, u64>>,
}

impl EdfScheduler {
    pub fn new() -> Self {
        EdfScheduler {
            ready: BinaryHeap::new(),
            running: None,
            collisions: HashMap::new(),
        }
    }

    fn compute_priority(&mut self, key: JobKey, deadline: Time) -> EdfPriority {
        let dict = self.collisions.entry(deadline).or_default();
        let index = *dict.entry(key).or_insert_with(|| {
            dict.values().copied().max().map(|m| m + 1).unwrap_or(0)
        });
        (deadline, index)
    }
}

impl Default for EdfScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for EdfScheduler {
    fn add_ready_job(&mut self, key: JobKey, job_manager: &JobManager) {
        let deadline = job_deadline(job_manager, key);
        let priority = self.compute_priority(key, deadline);
        self.ready.push(Reverse((priority, key)));
    }

    fn schedule(&mut self, _time: Time, _job_manager: &JobManager) -> ScheduleTransition {
        match (self.ready.peek().copied(), self.running) {
            (Some(Reverse((top_priority, top_key))), None) => {
                self.ready.pop();
                self.running = Some((top_priority, top_key));
                ScheduleTransition {
                    old: None,
                    new: Some(top_key),
                }
            }
            (Some(Reverse((top_priority, top_key))), Some((running_priority, running_key))) => {
                if top_priority < running_priority {
                    self.ready.pop();
                    self.ready.push(Reverse((running_priority, running_key)));
                    self.running = Some((top_priority, top_key));
                    ScheduleTransition {
                        old: Some(running_key),
                        new: Some(top_key),
                    }
                } else {
                    ScheduleTransition {
                        old: Some(running_key),
                        new: Some(running_key),
                    }
                }
            }
            (None, Some((_, running_key))) => ScheduleTransition {
                old: Some(running_key),
                new: Some(running_key),
            },
            (None, None) => ScheduleTransition { old: None, new: None },
        }
    }

    fn running_job(&self) -> Option<JobKey> {
        self.running.map(|(_, k)| k)
    }

    fn execution_completed(&mut self) {
        if let Some(((deadline, _), key)) = self.running {
            if let Some(dict) = self.collisions.get_mut(&deadline) {
                dict.remove(&key);
                if dict.is_empty() {
                    self.collisions.remove(&deadline);
                }
            }
        }
        self.running = None;
    }

    fn scheduler_state(&self) -> SchedulerStateSnapshot {
        let ready = self
            .ready
            .iter()
            .map(|Reverse((_, k))| ReadyEntry {
                task_id: k.0,
                release_index: k.1,
            })
            .collect();
        let running = self.running.map(|(_, k)| ReadyEntry {
            task_id: k.0,
            release_index: k.1,
        });
        SchedulerStateSnapshot {
            kind: SchedulerKind::Edf,
            running,
            ready,
        }
    }
}

// ---------------------------------------------------------------------
// RM
// ---------------------------------------------------------------------

type RmPriority = (Time, TaskId, u64);

/// Rate-Monotonic: static priority by ascending period, ties broken by task
/// id then by release index.
pub struct RmScheduler {
    ready: BinaryHeap<Reverse<(RmPriority, JobKey)>>,
    running: Option<(RmPriority, JobKey)>,
}

impl RmScheduler {
    pub fn new() -> Self {
        RmScheduler {
            ready: BinaryHeap::new(),
            running: None,
        }
    }

    fn compute_priority(job_manager: &JobManager, key: JobKey) -> RmPriority {
        let task = job_task(job_manager, key);
        (task.minimal_inter_arrival_time(), task.unique_id(), key.1)
    }
}

impl Default for RmScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler for RmScheduler {
    fn add_ready_job(&mut self, key: JobKey, job_manager: &JobManager) {
        let priority = Self::compute_priority(job_manager, key);
        self.ready.push(Reverse((priority, key)));
    }

    fn schedule(&mut self, _time: Time, _job_manager: &JobManager) -> ScheduleTransition {
        match (self.ready.peek().copied(), self.running) {
            (Some(Reverse((top_priority, top_key))), None) => {
                self.ready.pop();
                self.running = Some((top_priority, top_key));
                ScheduleTransition {
                    old: None,
                    new: Some(top_key),
                }
            }
            (Some(Reverse((top_priority, top_key))), Some((running_priority, running_key))) => {
                if top_priority < running_priority {
                    self.ready.pop();
                    self.ready.push(Reverse((running_priority, running_key)));
                    self.running = Some((top_priority, top_key));
                    ScheduleTransition {
                        old: Some(running_key),
                        new: Some(top_key),
                    }
                } else {
                    ScheduleTransition {
                        old: Some(running_key),
                        new: Some(running_key),
                    }
                }
            }
            (None, Some((_, running_key))) => ScheduleTransition {
                old: Some(running_key),
                new: Some(running_key),
            },
            (None, None) => ScheduleTransition { old: None, new: None },
        }
    }

    fn running_job(&self) -> Option<JobKey> {
        self.running.map(|(_, k)| k)
    }

    fn execution_completed(&mut self) {
        self.running = None;
    }

    fn scheduler_state(&self) -> SchedulerStateSnapshot {
        let ready = self
            .ready
            .iter()
            .map(|Reverse((_, k))| ReadyEntry {
                task_id: k.0,
                release_index: k.1,
            })
            .collect();
        let running = self.running.map(|(_, k)| ReadyEntry {
            task_id: k.0,
            release_index: k.1,
        });
        SchedulerStateSnapshot {
            kind: SchedulerKind::Rm,
            running,
            ready,
        }
    }
}

// ---------------------------------------------------------------------
// Dual-Priority
// ---------------------------------------------------------------------

/// Dual-Priority scheduling: every task runs at a low priority until its
/// promotion time elapses (relative to its own release), then jumps to a
/// (numerically smaller, so more urgent) high priority. Unlike EDF/RM,
/// priorities vary over a job's lifetime, so the ready set must be
/// re-evaluated from scratch on every `schedule` call instead of being kept
/// in a static heap.
pub struct DualPriorityScheduler {
    policy: DualPriorityPolicy,
    ready: HashSet<JobKey>,
    running: Option<(i64, JobKey)>,
    promoted_tasks: Vec<TaskId>,
    promotion_releases: Vec<u64>,
    promotions: PriorityQueue<usize, Reverse<Time>>,
}

impl DualPriorityScheduler {
    pub fn new(policy: DualPriorityPolicy) -> Self {
        DualPriorityScheduler {
            policy,
            ready: HashSet::new(),
            running: None,
            promoted_tasks: Vec::new(),
            promotion_releases: Vec::new(),
            promotions: PriorityQueue::new(),
        }
    }

    fn job_priority(&self, key: JobKey, job_manager: &JobManager, time: Time) -> (i64, u64) {
        let job = job_manager
            .get(key.0, key.1)
            .expect("scheduler referenced a job not tracked by the job manager");
        let relative_time = time - job.release_time();
        assert!(relative_time >= 0, "job scheduled before its release time");
        let priority = self.policy.priority_at(key.0, relative_time);
        (priority, key.1)
    }

    fn top_ready_job(&self, job_manager: &JobManager, time: Time) -> ((i64, u64), JobKey) {
        self.ready
            .iter()
            .map(|&key| (self.job_priority(key, job_manager, time), key))
            .min_by_key(|(priority, _)| *priority)
            .expect("top_ready_job called with an empty ready set")
    }

    fn top_promo(&mut self) -> Option<Time> {
        self.promotions.peek().map(|(_, Reverse(t))| *t)
    }

    fn next_promo(&mut self, task_set: &TaskSet) -> Option<Time> {
        let (index, _) = self.promotions.pop()?;
        let task_id = self.promoted_tasks[index];
        let task = task_set.task(task_id).expect("promoted task not found");
        self.promotion_releases[index] += 1;
        let release = self.promotion_releases[index];
        let promo_offset = self
            .policy
            .promotion(task_id)
            .expect("promoted task has no promotion offset");
        let new_promo = promo_offset + task.arrival_time(release);
        self.promotions.push(index, Reverse(new_promo));
        self.top_promo()
    }

    fn next_global_promo(&mut self, task_set: &TaskSet) -> Option<Time> {
        let promo = self.top_promo()?;
        let mut next = self.next_promo(task_set);
        while next == Some(promo) {
            next = self.next_promo(task_set);
        }
        Some(promo)
    }
}

impl Scheduler for DualPriorityScheduler {
    fn initialize(&mut self, task_set: &TaskSet) {
        let mut priority_values = Vec::new();
        let mut promoted = Vec::new();
        for task in task_set {
            priority_values.push(self.policy.low_priority(task.unique_id()));
            if self.policy.has_promotion(task.unique_id()) {
                priority_values.push(
                    self.policy
                        .high_priority(task.unique_id())
                        .expect("promoted task has a high priority"),
                );
                promoted.push(task.unique_id());
            }
        }
        let distinct: HashSet<i64> = priority_values.iter().copied().collect();
        assert_eq!(
            distinct.len(),
            priority_values.len(),
            "duplicate priority values in a dual-priority policy"
        );

        self.promoted_tasks = promoted;
        self.promotion_releases = vec![0; self.promoted_tasks.len()];
        self.promotions = PriorityQueue::new();
        for (index, task_id) in self.promoted_tasks.iter().enumerate() {
            let promo = self
                .policy
                .promotion(*task_id)
                .expect("promoted task has a promotion offset");
            self.promotions.push(index, Reverse(promo));
        }
    }

    fn next_schedule_ticks(&mut self, time: Time, task_set: &TaskSet) -> Vec<Time> {
        if self.promotions.is_empty() {
            return Vec::new();
        }
        let mut promo = self
            .next_global_promo(task_set)
            .expect("non-empty promotions heap yields a promo time");
        while promo <= time {
            promo = self
                .next_global_promo(task_set)
                .expect("non-empty promotions heap yields a promo time");
        }
        vec![promo]
    }

    fn add_ready_job(&mut self, key: JobKey, _job_manager: &JobManager) {
        assert!(self.ready.insert(key), "job was already ready");
    }

    fn schedule(&mut self, time: Time, job_manager: &JobManager) -> ScheduleTransition {
        if !self.ready.is_empty() {
            let (ready_priority, ready_key) = self.top_ready_job(job_manager, time);
            match self.running {
                None => {
                    self.ready.remove(&ready_key);
                    self.running = Some((ready_priority.0, ready_key));
                    ScheduleTransition {
                        old: None,
                        new: Some(ready_key),
                    }
                }
                Some((running_priority_value, running_key)) => {
                    let running_priority =
                        self.job_priority(running_key, job_manager, time);
                    if ready_priority < running_priority {
                        self.ready.remove(&ready_key);
                        self.ready.insert(running_key);
                        self.running = Some((ready_priority.0, ready_key));
                        ScheduleTransition {
                            old: Some(running_key),
                            new: Some(ready_key),
                        }
                    } else {
                        let _ = running_priority_value;
                        ScheduleTransition {
                            old: Some(running_key),
                            new: Some(running_key),
                        }
                    }
                }
            }
        } else if let Some((_, running_key)) = self.running {
            ScheduleTransition {
                old: Some(running_key),
                new: Some(running_key),
            }
        } else {
            ScheduleTransition { old: None, new: None }
        }
    }

    fn running_job(&self) -> Option<JobKey> {
        self.running.map(|(_, k)| k)
    }

    fn execution_completed(&mut self) {
        self.running = None;
    }

    fn scheduler_state(&self) -> SchedulerStateSnapshot {
        let ready = self
            .ready
            .iter()
            .map(|k| ReadyEntry {
                task_id: k.0,
                release_index: k.1,
            })
            .collect();
        let running = self.running.map(|(_, k)| ReadyEntry {
            task_id: k.0,
            release_index: k.1,
        });
        let promotions = self
            .policy
            .entries()
            .filter_map(|(id, info)| info.promotion().map(|p| (id, p)))
            .collect();
        SchedulerStateSnapshot {
            kind: SchedulerKind::DualPriority { promotions },
            running,
            ready,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::JobManager;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, Task, TaskSet};
    use std::sync::Arc;

    fn setup_two_tasks() -> (Arc<Task>, Arc<Task>, JobManager) {
        reset_task_id_counter();
        let t1 = Arc::new(Task::new(2, 5, ArrivalDistribution::fixed(5)));
        let t2 = Arc::new(Task::new(1, 10, ArrivalDistribution::fixed(10)));
        let mut jm = JobManager::new();
        jm.get_or_create(&t1, 0);
        jm.get_or_create(&t2, 0);
        (t1, t2, jm)
    }

    #[test]
    fn edf_prefers_earlier_deadline() {
        let (t1, t2, jm) = setup_two_tasks();
        let mut sched = EdfScheduler::new();
        sched.add_ready_job((t1.unique_id(), 0), &jm);
        sched.add_ready_job((t2.unique_id(), 0), &jm);
        let transition = sched.schedule(0, &jm);
        assert_eq!(transition.new, Some((t1.unique_id(), 0)));
    }

    #[test]
    fn rm_prefers_shorter_period() {
        let (t1, t2, jm) = setup_two_tasks();
        let mut sched = RmScheduler::new();
        sched.add_ready_job((t1.unique_id(), 0), &jm);
        sched.add_ready_job((t2.unique_id(), 0), &jm);
        let transition = sched.schedule(0, &jm);
        assert_eq!(transition.new, Some((t1.unique_id(), 0)));
    }

    #[test]
    fn edf_collision_index_breaks_ties_fifo() {
        reset_task_id_counter();
        let t1 = Arc::new(Task::new(1, 10, ArrivalDistribution::fixed(10)));
        let t2 = Arc::new(Task::new(1, 10, ArrivalDistribution::fixed(10)));
        let mut jm = JobManager::new();
        jm.get_or_create(&t1, 0);
        jm.get_or_create(&t2, 0);
        let mut sched = EdfScheduler::new();
        sched.add_ready_job((t1.unique_id(), 0), &jm);
        sched.add_ready_job((t2.unique_id(), 0), &jm);
        let transition = sched.schedule(0, &jm);
        // same deadline: whichever was added first gets collision index 0
        assert_eq!(transition.new, Some((t1.unique_id(), 0)));
    }

    #[test]
    fn dual_priority_promotes_after_threshold() {
        reset_task_id_counter();
        let low = Arc::new(Task::new(2, 20, ArrivalDistribution::fixed(20)));
        let high = Arc::new(Task::new(2, 20, ArrivalDistribution::fixed(20)));
        let mut jm = JobManager::new();
        jm.get_or_create(&low, 0);
        jm.get_or_create(&high, 0);
        let policy = DualPriorityPolicy::new(vec![
            (low.unique_id(), DualPriorityTaskInfo::with_promotion(10, 5, 1)),
            (high.unique_id(), DualPriorityTaskInfo::without_promotion(2)),
        ]);
        let mut sched = DualPriorityScheduler::new(policy);
        let task_set = TaskSet::from_arcs(vec![low.clone(), high.clone()]);
        sched.initialize(&task_set);
        sched.add_ready_job((low.unique_id(), 0), &jm);
        sched.add_ready_job((high.unique_id(), 0), &jm);
        // before promotion (relative time 2 < 5): high-priority task (2) wins
        let before = sched.schedule(2, &jm);
        assert_eq!(before.new, Some((high.unique_id(), 0)));
    }
}
