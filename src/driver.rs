//! Run orchestration: value-equal simulation configuration, a lazily
//! executed run wrapper, and a frozen result bundle, grounded on
//! `crpd/sim.py`.
//!
//! `SimulationSetup` and `SimulationResult` are the units that get attached
//! to a [`crate::error::SimulationError`] or handed back to a caller, so
//! they stay plain, cloneable data — all the behavior lives in
//! [`SimulationRun`].

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::aggregate::{
    Aggregator, ExecutionTimeAggregator, LongestResponseTimeAggregator,
    PreemptionCountAggregator, PreemptionTimeAggregator,
};
use crate::error::SimulationError;
use crate::history::{DeadlineMissFilter, FrozenHistory};
use crate::scheduler::SchedulingPolicy;
use crate::simulator::Simulator;
use crate::task::{TaskId, TaskSet, Time};

/// Which streaming aggregators a run should collect, named rather than
/// passed as trait objects so a setup stays `Clone`/value-equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AggregatorTag {
    PreemptionCount,
    PreemptionTime,
    ExecutionTime,
    LongestResponseTime,
}

/// The full, value-equal configuration of one simulation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSetup {
    pub task_set: TaskSet,
    pub time: Time,
    pub scheduling_policy: SchedulingPolicy,
    pub aggregator_tags: Vec<AggregatorTag>,
    pub track_history: bool,
    pub track_preemptions: bool,
    pub stop_on_deadline_miss: bool,
}

impl SimulationSetup {
    pub fn new(task_set: TaskSet, time: Time, scheduling_policy: SchedulingPolicy) -> Self {
        SimulationSetup {
            task_set,
            time,
            scheduling_policy,
            aggregator_tags: Vec::new(),
            track_history: true,
            track_preemptions: true,
            stop_on_deadline_miss: false,
        }
    }

    pub fn with_aggregators(mut self, tags: Vec<AggregatorTag>) -> Self {
        self.aggregator_tags = tags;
        self
    }

    pub fn with_tracking(mut self, track_history: bool, track_preemptions: bool) -> Self {
        self.track_history = track_history;
        self.track_preemptions = track_preemptions;
        self
    }

    pub fn stopping_on_deadline_miss(mut self) -> Self {
        self.stop_on_deadline_miss = true;
        self
    }
}

/// Bundled aggregator results, keyed by tag. Values are type-erased into a
/// small enum since the four aggregators don't share a result type.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregateStat {
    Count(u64),
    Time(Time),
    PerTask(HashMap<TaskId, Time>),
}

#[derive(Debug, Clone, Default)]
pub struct SimulationStatistics {
    stats: HashMap<AggregatorTag, AggregateStat>,
}

impl SimulationStatistics {
    pub fn get(&self, tag: AggregatorTag) -> Option<&AggregateStat> {
        self.stats.get(&tag)
    }
}

/// The outcome of a completed run: the (possibly partial) history and
/// whatever aggregate statistics were requested.
#[derive(Debug, Clone)]
pub struct SimulationResult {
    pub history: Arc<FrozenHistory>,
    pub statistics: SimulationStatistics,
}

impl SimulationResult {
    pub fn aggregate_stat(&self, tag: AggregatorTag) -> Option<&AggregateStat> {
        self.statistics.get(tag)
    }

    pub fn first_deadline_miss(&self) -> Option<crate::history::DeadlineMiss> {
        self.history.first_deadline_miss(&DeadlineMissFilter::all())
    }
}

/// Wraps a [`SimulationSetup`] with lazy execution: building one does no
/// work, `result()` runs the simulation exactly once and caches nothing —
/// callers that need the result more than once should hold onto it
/// themselves, matching the original's one-shot `SimulationRun.result()`.
pub struct SimulationRun {
    setup: SimulationSetup,
}

impl SimulationRun {
    pub fn new(setup: SimulationSetup) -> Self {
        SimulationRun { setup }
    }

    pub fn setup(&self) -> &SimulationSetup {
        &self.setup
    }

    pub fn result(&self) -> Result<SimulationResult, SimulationError> {
        let mut preemption_count = PreemptionCountAggregator::new();
        let mut preemption_time = PreemptionTimeAggregator::new();
        let mut execution_time = ExecutionTimeAggregator::new();
        let mut longest_response_time = LongestResponseTimeAggregator::new();

        let mut aggregators: Vec<&mut dyn Aggregator> = Vec::new();
        for tag in &self.setup.aggregator_tags {
            match tag {
                AggregatorTag::PreemptionCount => aggregators.push(&mut preemption_count),
                AggregatorTag::PreemptionTime => aggregators.push(&mut preemption_time),
                AggregatorTag::ExecutionTime => aggregators.push(&mut execution_time),
                AggregatorTag::LongestResponseTime => aggregators.push(&mut longest_response_time),
            }
        }

        let mut simulator = Simulator::new(self.setup.task_set.clone(), &self.setup.scheduling_policy)
            .with_tracking(self.setup.track_history, self.setup.track_preemptions)
            .with_aggregators(aggregators);

        let run_result = simulator.simulate_to(self.setup.time, self.setup.stop_on_deadline_miss);
        let history = Arc::new(simulator.into_frozen_history());

        run_result.map_err(|e| match e {
            SimulationError::InvariantViolation { message, setup, .. } => {
                SimulationError::invariant(message, *setup, history.clone())
            }
            other => other,
        })?;

        let mut stats = HashMap::new();
        for tag in &self.setup.aggregator_tags {
            let stat = match tag {
                AggregatorTag::PreemptionCount => AggregateStat::Count(preemption_count.result()),
                AggregatorTag::PreemptionTime => AggregateStat::Time(preemption_time.result()),
                AggregatorTag::ExecutionTime => AggregateStat::Time(execution_time.result()),
                AggregatorTag::LongestResponseTime => {
                    AggregateStat::PerTask(longest_response_time.result())
                }
            };
            stats.insert(*tag, stat);
        }
        Ok(SimulationResult {
            history,
            statistics: SimulationStatistics { stats },
        })
    }
}

/// Builds the timestamp-prefixed key under which a result would be stored
/// in an external manifest: `YYYYMMDD-HHMMSS-<base_key>`. Pure formatting
/// only — no file is written here; persistence is an external concern.
pub fn manifest_key(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32, base_key: &str) -> String {
    format!("{year:04}{month:02}{day:02}-{hour:02}{minute:02}{second:02}-{base_key}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, Task};

    #[test]
    fn manifest_key_formats_timestamp_prefix() {
        let key = manifest_key(2026, 7, 26, 9, 5, 3, "edf-u0.8");
        assert_eq!(key, "20260726-090503-edf-u0.8");
    }

    #[test]
    fn simulation_run_collects_requested_aggregators() {
        reset_task_id_counter();
        let task = Task::new(2, 10, ArrivalDistribution::fixed(10));
        let task_set = TaskSet::new(vec![task]);
        let setup = SimulationSetup::new(task_set, 20, SchedulingPolicy::Edf)
            .with_aggregators(vec![AggregatorTag::PreemptionCount, AggregatorTag::LongestResponseTime]);
        let run = SimulationRun::new(setup);
        let result = run.result().unwrap();
        assert!(matches!(
            result.aggregate_stat(AggregatorTag::PreemptionCount),
            Some(AggregateStat::Count(0))
        ));
        assert!(result
            .aggregate_stat(AggregatorTag::LongestResponseTime)
            .is_some());
    }

    #[test]
    fn simulation_result_exposes_first_deadline_miss() {
        reset_task_id_counter();
        let t1 = Task::new(6, 10, ArrivalDistribution::fixed(10));
        let t2 = Task::new(6, 10, ArrivalDistribution::fixed(10));
        let task_set = TaskSet::new(vec![t1, t2]);
        let setup = SimulationSetup::new(task_set, 20, SchedulingPolicy::Edf);
        let run = SimulationRun::new(setup);
        let result = run.result().unwrap();
        assert!(result.first_deadline_miss().is_some());
    }
}
