//! Demo binary: builds a small overloaded task set, synthesizes a
//! Dual-Priority policy for it with `rm_laxity_promotions`, and reports
//! whether the resulting policy meets every deadline over one hyperperiod.

use dp_sim::task::{reset_task_id_counter, ArrivalDistribution, Task, TaskSet};
use dp_sim::{dp, SchedulingPolicy, SimulationRun, SimulationSetup};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    reset_task_id_counter();
    let task_set = TaskSet::new(vec![
        Task::new(1, 4, ArrivalDistribution::fixed(4)),
        Task::new(2, 6, ArrivalDistribution::fixed(6)),
        Task::new(3, 10, ArrivalDistribution::fixed(10)),
    ]);

    tracing::info!(
        utilization = task_set.utilization(),
        hyperperiod = task_set.hyperperiod(),
        "built task set"
    );

    let policy = dp::rm_laxity_promotions(&task_set, true);
    let setup = SimulationSetup::new(
        task_set.clone(),
        task_set.hyperperiod(),
        SchedulingPolicy::DualPriority(policy),
    );
    let result = SimulationRun::new(setup).result()?;

    match result.first_deadline_miss() {
        Some(miss) => println!(
            "policy misses a deadline: task {} release {} at time {}",
            miss.task_id(),
            miss.release_index,
            miss.time()
        ),
        None => println!(
            "policy meets every deadline over the hyperperiod ({} time units)",
            task_set.hyperperiod()
        ),
    }

    Ok(())
}
