//! In-process parallel oracle runner: a bounded work queue of
//! [`SimulationSetup`]s fanned out across worker threads, each running
//! [`SimulationRun::result`] and pushing back `(index, result)` pairs.
//! Grounded on `crpd/runner.py`'s `_MulticoreSimulationRunner` /
//! `_ProcessTarget` pair, with `std::thread` + `crossbeam_channel` standing
//! in for `multiprocessing.Process` + `multiprocessing.Queue`.

use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use instant::Instant;

use crate::driver::{SimulationResult, SimulationRun};
use crate::error::SimulationError;

/// One completed run, tagged with the index of its setup in the batch
/// that was submitted, mirroring the original's `(setup, result)` pairs
/// keyed by position rather than by value-equality on the setup itself.
pub struct PooledResult {
    pub index: usize,
    pub result: Result<SimulationResult, SimulationError>,
    pub elapsed: std::time::Duration,
}

/// Runs a batch of [`SimulationRun`]s across `worker_count` threads,
/// draining results back to the caller through a channel. `worker_count
/// == 1` degenerates to the monocore case — still threaded, but with a
/// single worker, matching the original's `_MonocoreSimulationRunner`
/// doing the same work inline.
pub struct SimulationPool {
    worker_count: usize,
}

impl SimulationPool {
    pub fn new(worker_count: usize) -> Self {
        SimulationPool {
            worker_count: worker_count.max(1),
        }
    }

    /// Runs every run in `runs` to completion, returning results in
    /// submission order. Blocks until all work is drained, unlike the
    /// original's poll-based `availableResults`/`join` split — a caller
    /// wanting incremental results should use [`Self::spawn`] instead.
    pub fn run_all(&self, runs: Vec<SimulationRun>) -> Vec<PooledResult> {
        let mut results: Vec<Option<PooledResult>> = (0..runs.len()).map(|_| None).collect();
        let receiver = self.spawn(runs);
        for pooled in receiver.iter() {
            let index = pooled.index;
            results[index] = Some(pooled);
        }
        results.into_iter().map(|r| r.expect("every submitted index yields exactly one result")).collect()
    }

    /// Submits `runs` to the pool and returns immediately with a receiver
    /// that yields [`PooledResult`]s as workers finish them, in whatever
    /// order completion happens to occur — the caller observes the
    /// `index` field to recover submission order if it matters.
    pub fn spawn(&self, runs: Vec<SimulationRun>) -> Receiver<PooledResult> {
        let work_count = runs.len();
        let (work_tx, work_rx): (Sender<(usize, SimulationRun)>, Receiver<(usize, SimulationRun)>) =
            bounded(work_count.max(1));
        let (result_tx, result_rx): (Sender<PooledResult>, Receiver<PooledResult>) =
            bounded(work_count.max(1));

        for (index, run) in runs.into_iter().enumerate() {
            work_tx
                .send((index, run))
                .expect("work channel has capacity for every submitted run");
        }
        drop(work_tx);

        for worker_idx in 0..self.worker_count {
            let work_rx = work_rx.clone();
            let result_tx = result_tx.clone();
            thread::Builder::new()
                .name(format!("simulation-pool-worker-{worker_idx}"))
                .spawn(move || {
                    for (index, run) in work_rx.iter() {
                        let start = Instant::now();
                        let result = run.result();
                        let elapsed = start.elapsed();
                        if result_tx
                            .send(PooledResult { index, result, elapsed })
                            .is_err()
                        {
                            break;
                        }
                    }
                })
                .expect("failed to spawn simulation pool worker thread");
        }
        drop(result_tx);

        result_rx
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::SchedulingPolicy;
    use crate::driver::SimulationSetup;
    use crate::task::{reset_task_id_counter, ArrivalDistribution, Task, TaskSet};

    fn light_setup() -> SimulationSetup {
        let task = Task::new(2, 10, ArrivalDistribution::fixed(10));
        let task_set = TaskSet::new(vec![task]);
        SimulationSetup::new(task_set, 50, SchedulingPolicy::Edf)
    }

    #[test]
    fn run_all_returns_one_result_per_submitted_setup() {
        reset_task_id_counter();
        let runs = (0..6).map(|_| SimulationRun::new(light_setup())).collect::<Vec<_>>();
        let pool = SimulationPool::new(3);
        let results = pool.run_all(runs);
        assert_eq!(results.len(), 6);
        for (i, pooled) in results.iter().enumerate() {
            assert_eq!(pooled.index, i);
            assert!(pooled.result.is_ok());
        }
    }

    #[test]
    fn single_worker_drains_sequentially_like_the_monocore_case() {
        reset_task_id_counter();
        let runs = (0..3).map(|_| SimulationRun::new(light_setup())).collect::<Vec<_>>();
        let pool = SimulationPool::new(1);
        let results = pool.run_all(runs);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.result.is_ok()));
    }
}
