//! Job lifecycle and manager, grounded on `crpd/internals/jobs.py`.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::history::{JobState, Preemption};
use crate::task::{Task, TaskId, Time};

/// A single released instance of a task: its progress, outstanding
/// preemption debt, and whether (and when) it is currently running.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    task: Arc<Task>,
    release_index: u64,
    progress: Time,
    preemption_debt: i64,
    last_start: Option<Time>,
}

impl Job {
    pub fn new(task: Arc<Task>, release_index: u64) -> Self {
        Job {
            task,
            release_index,
            progress: 0,
            preemption_debt: 0,
            last_start: None,
        }
    }

    /// Rehydrates a `Job` from a previously captured [`JobState`] snapshot.
    pub fn from_state(state: &JobState) -> Self {
        Job {
            task: state.task.clone(),
            release_index: state.release_index,
            progress: state.progress,
            preemption_debt: state.preemption_debt,
            last_start: state.last_start,
        }
    }

    /// Captures the current state as a value-equal, hashable snapshot
    /// suitable for storage in a [`crate::history::FrozenHistory`].
    pub fn job_state(&self) -> JobState {
        JobState {
            task: self.task.clone(),
            release_index: self.release_index,
            progress: self.progress,
            preemption_debt: self.preemption_debt,
            last_start: self.last_start,
        }
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn task_id(&self) -> TaskId {
        self.task.unique_id()
    }

    pub fn release_index(&self) -> u64 {
        self.release_index
    }

    pub fn release_time(&self) -> Time {
        self.task.arrival_time(self.release_index)
    }

    pub fn deadline(&self) -> Time {
        self.task.deadline() + self.release_time()
    }

    pub fn wcet(&self) -> Time {
        self.task.wcet()
    }

    pub fn progress(&self) -> Time {
        self.progress
    }

    pub fn preemption_debt(&self) -> i64 {
        self.preemption_debt
    }

    pub fn last_start(&self) -> Option<Time> {
        self.last_start
    }

    pub fn has_been_started(&self) -> bool {
        self.last_start.is_some()
    }

    pub fn remaining_wcet(&self) -> Time {
        self.wcet() - self.progress
    }

    pub fn remaining_exec_with_debt(&self) -> i64 {
        self.remaining_wcet() + self.preemption_debt
    }

    pub fn is_completed(&self) -> bool {
        self.remaining_wcet() == 0 && self.preemption_debt == 0
    }

    pub fn start(&mut self, time: Time) {
        self.last_start = Some(time);
    }

    pub fn stop(&mut self) {
        self.last_start = None;
    }

    /// Advances this job's progress to `time`, first burning down any
    /// outstanding preemption debt before crediting execution progress.
    /// Panics if `time` precedes the job's last start — that would mean
    /// time ran backwards while the job was running, an invariant violation
    /// the simulator is expected to catch earlier.
    pub fn progress_to(&mut self, time: Time) {
        let last_start = self
            .last_start
            .expect("progress_to called on a job that was never started");
        let increment = time - last_start;
        assert!(increment >= 0, "time moved backwards while job was running");
        let remaining_increment = if increment >= self.preemption_debt {
            let r = increment - self.preemption_debt;
            self.preemption_debt = 0;
            r
        } else {
            self.preemption_debt -= increment;
            0
        };
        self.last_start = Some(time);
        self.progress += remaining_increment;
    }

    /// Records a preemption of this job by `preempting`, charging a fresh
    /// preemption debt computed from the task's preemption cost model.
    pub fn preemption(&mut self, time: Time, preempting: &Job) -> Preemption {
        let cost = self.task.preemption_cost().cost(
            self.wcet(),
            self.remaining_wcet(),
            self.progress,
        );
        let previous_debt = self.preemption_debt;
        self.preemption_debt = cost;
        Preemption {
            time,
            preempted_task: self.task_id(),
            preempted_release_index: self.release_index,
            preempting_task: preempting.task_id(),
            preempting_release_index: preempting.release_index,
            added_debt: cost - previous_debt,
            debt: cost,
        }
    }
}

impl std::fmt::Display for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Job({}, I {}, R {}, P {}, D {}, L {:?})",
            self.task,
            self.release_index,
            self.release_time(),
            self.progress,
            self.preemption_debt,
            self.last_start
        )
    }
}

/// Owns every live job indexed by `(task_id, release_index)`, creating jobs
/// lazily on first lookup — the event queue only ever references a job by
/// its key, never by object identity, so the manager is the single source
/// of truth for job instances during a simulation run.
#[derive(Debug, Default)]
pub struct JobManager {
    jobs: HashMap<(TaskId, u64), Job>,
}

impl JobManager {
    pub fn new() -> Self {
        JobManager {
            jobs: HashMap::new(),
        }
    }

    /// Rebuilds a manager from a set of previously captured job states,
    /// e.g. when resuming a simulation from a [`crate::history::SimulatorState`].
    pub fn from_states(states: impl IntoIterator<Item = JobState>) -> Self {
        let mut jobs = HashMap::new();
        for state in states {
            let job = Job::from_state(&state);
            jobs.insert((job.task_id(), job.release_index()), job);
        }
        JobManager { jobs }
    }

    pub fn jobs(&self) -> impl Iterator<Item = &Job> {
        self.jobs.values()
    }

    pub fn jobs_mut(&mut self) -> impl Iterator<Item = &mut Job> {
        self.jobs.values_mut()
    }

    /// Returns the job for `(task, release_index)`, creating it at zero
    /// progress if it doesn't exist yet.
    pub fn get_or_create(&mut self, task: &Arc<Task>, release_index: u64) -> &mut Job {
        self.jobs
            .entry((task.unique_id(), release_index))
            .or_insert_with(|| Job::new(task.clone(), release_index))
    }

    pub fn get(&self, task_id: TaskId, release_index: u64) -> Option<&Job> {
        self.jobs.get(&(task_id, release_index))
    }

    pub fn get_mut(&mut self, task_id: TaskId, release_index: u64) -> Option<&mut Job> {
        self.jobs.get_mut(&(task_id, release_index))
    }

    /// Removes a completed job. Panics if the job is missing, matching the
    /// original's `logger.exception` + re-raise on a deadline event that
    /// can't find its job — this is an invariant violation, not a soft
    /// failure, since every deadline event is created alongside its job.
    pub fn remove(&mut self, task_id: TaskId, release_index: u64) -> Job {
        self.jobs
            .remove(&(task_id, release_index))
            .unwrap_or_else(|| {
                panic!(
                    "job not found at deadline: (task {task_id}, release {release_index})"
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, PreemptionCost};

    fn make_task(wcet: Time, deadline: Time, period: Time) -> Arc<Task> {
        Arc::new(Task::new(wcet, deadline, ArrivalDistribution::fixed(period)).with_preemption_cost(
            PreemptionCost::Fixed { cost: 3 },
        ))
    }

    #[test]
    fn progress_to_burns_debt_before_crediting_progress() {
        reset_task_id_counter();
        let task = make_task(10, 10, 10);
        let mut job = Job::new(task, 0);
        job.start(0);
        job.preemption_debt = 4;
        job.progress_to(10);
        assert_eq!(job.preemption_debt, 0);
        assert_eq!(job.progress, 6);
    }

    #[test]
    fn is_completed_requires_zero_debt_and_zero_remaining() {
        reset_task_id_counter();
        let task = make_task(5, 10, 10);
        let mut job = Job::new(task, 0);
        job.start(0);
        job.progress_to(5);
        assert!(job.is_completed());
    }

    #[test]
    fn preemption_records_added_debt_delta() {
        reset_task_id_counter();
        let task = make_task(10, 10, 10);
        let mut low = Job::new(task.clone(), 0);
        low.start(0);
        let high = Job::new(task, 1);
        let p = low.preemption(0, &high);
        assert_eq!(p.debt, 3);
        assert_eq!(p.added_debt, 3);
    }

    #[test]
    fn manager_creates_jobs_lazily() {
        reset_task_id_counter();
        let task = make_task(5, 10, 10);
        let mut mgr = JobManager::new();
        assert!(mgr.get(task.unique_id(), 0).is_none());
        mgr.get_or_create(&task, 0);
        assert!(mgr.get(task.unique_id(), 0).is_some());
    }

    #[test]
    #[should_panic]
    fn remove_missing_job_panics() {
        let mut mgr = JobManager::new();
        mgr.remove(999, 0);
    }
}
