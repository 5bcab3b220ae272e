//! End-to-end scenarios: whole simulation runs and Dual-Priority policy
//! syntheses against concrete task sets, checked against known outcomes
//! rather than just unit-level properties.

use std::collections::HashSet;

use dp_sim::dp;
use dp_sim::history::Preemption;
use dp_sim::task::{reset_task_id_counter, ArrivalDistribution, Task, TaskSet};
use dp_sim::{DualPriorityPolicy, DualPriorityTaskInfo, SchedulingPolicy, SimulationRun, SimulationSetup};

fn three_task_overload() -> TaskSet {
    reset_task_id_counter();
    TaskSet::new(vec![
        Task::new(3, 6, ArrivalDistribution::fixed(6)),
        Task::new(2, 8, ArrivalDistribution::fixed(8)),
        Task::new(3, 12, ArrivalDistribution::fixed(12)),
    ])
}

/// Under plain Rate-Monotonic, the longest-period task's fixed-point
/// response time (16) exceeds its deadline (12): its first job misses.
#[test]
fn rate_monotonic_misses_the_longest_period_tasks_first_deadline() {
    let task_set = three_task_overload();
    let longest_period = task_set.tasks()[2].unique_id();
    let setup = SimulationSetup::new(task_set.clone(), task_set.hyperperiod(), SchedulingPolicy::Rm);
    let result = SimulationRun::new(setup).result().unwrap();

    let miss = result
        .first_deadline_miss()
        .expect("the longest-period task overruns its deadline under plain RM");
    assert_eq!(miss.task_id(), longest_period);
    assert_eq!(miss.release_index, 0);
}

/// Promoting the longest-period task ten time units after its own release
/// (to a priority between the other two tasks' priorities) removes the
/// miss the plain Rate-Monotonic ordering produces above.
#[test]
fn hand_tuned_dual_priority_policy_clears_the_overload() {
    let task_set = three_task_overload();
    let short = task_set.tasks()[0].unique_id();
    let medium = task_set.tasks()[1].unique_id();
    let long = task_set.tasks()[2].unique_id();

    let policy = DualPriorityPolicy::new([
        (short, DualPriorityTaskInfo::without_promotion(1)),
        (medium, DualPriorityTaskInfo::without_promotion(3)),
        (long, DualPriorityTaskInfo::with_promotion(4, 10, 2)),
    ]);
    let setup = SimulationSetup::new(
        task_set.clone(),
        task_set.hyperperiod(),
        SchedulingPolicy::DualPriority(policy),
    );
    let result = SimulationRun::new(setup).result().unwrap();

    assert!(result.first_deadline_miss().is_none());
}

/// `dichotomicPromotionSearch` over a tightly (fully) utilized four-task
/// set must leave the longest-period task as the sole unpromoted boundary
/// and produce a policy that clears the whole hyperperiod without a miss.
#[test]
fn dichotomic_search_clears_a_fully_utilized_four_task_set() {
    reset_task_id_counter();
    let task_set = TaskSet::new(vec![
        Task::new(3, 12, ArrivalDistribution::fixed(12)),
        Task::new(4, 16, ArrivalDistribution::fixed(16)),
        Task::new(4, 20, ArrivalDistribution::fixed(20)),
        Task::new(6, 20, ArrivalDistribution::fixed(20)),
    ]);
    let boundary = task_set.tasks()[3].unique_id();

    let policy = dp::dichotomic_promotion_search(&task_set).unwrap();
    assert_eq!(policy.low_priority(boundary), 1);
    assert!(!policy.has_promotion(boundary));

    let miss = dp::find_first_deadline_miss(&task_set, &policy).unwrap();
    assert!(miss.is_none());
}

/// Same check against a five-task set at unit utilization, where the
/// search has to thread promotions through every one of the other four
/// tasks around the boundary task.
#[test]
fn dichotomic_search_clears_a_fully_utilized_five_task_set() {
    reset_task_id_counter();
    let task_set = TaskSet::new(vec![
        Task::new(1, 4, ArrivalDistribution::fixed(4)),
        Task::new(1, 6, ArrivalDistribution::fixed(6)),
        Task::new(3, 12, ArrivalDistribution::fixed(12)),
        Task::new(5, 30, ArrivalDistribution::fixed(30)),
        Task::new(6, 36, ArrivalDistribution::fixed(36)),
    ]);
    let boundary = task_set.tasks()[4].unique_id();

    let policy = dp::dichotomic_promotion_search(&task_set).unwrap();
    assert_eq!(policy.low_priority(boundary), 1);
    assert!(!policy.has_promotion(boundary));

    let miss = dp::find_first_deadline_miss(&task_set, &policy).unwrap();
    assert!(miss.is_none());
}

/// A long, rarely-released task next to a short, frequent one under EDF:
/// every release of the short task preempts the long one exactly once,
/// at no preemption cost (the default), until the long task finally
/// finishes between two of the short task's releases.
#[test]
fn edf_preempts_the_long_task_on_every_short_task_release() {
    reset_task_id_counter();
    let task_set = TaskSet::new(vec![
        Task::new(20, 50, ArrivalDistribution::fixed(50)),
        Task::new(1, 5, ArrivalDistribution::fixed(5)),
    ]);
    let long = task_set.tasks()[0].unique_id();
    let short = task_set.tasks()[1].unique_id();

    let setup = SimulationSetup::new(task_set, 50, SchedulingPolicy::Edf);
    let result = SimulationRun::new(setup).result().unwrap();

    let preemptions: HashSet<Preemption> = result.history.preemptions(50);
    let expected: [(i64, u64); 4] = [(5, 1), (10, 2), (15, 3), (20, 4)];
    assert_eq!(preemptions.len(), expected.len());
    for (time, preempting_release_index) in expected {
        assert!(preemptions.iter().any(|p| {
            p.time == time
                && p.preempted_task == long
                && p.preempted_release_index == 0
                && p.preempting_task == short
                && p.preempting_release_index == preempting_release_index
                && p.added_debt == 0
        }));
    }
}

/// `dajamPromotions` on the same overloaded three-task set that trips up
/// plain Rate-Monotonic above must clear every deadline over the
/// hyperperiod.
#[test]
fn dajam_promotions_clear_the_overload() {
    let task_set = three_task_overload();
    let policy = dp::dajam_promotions(&task_set);
    let miss = dp::find_first_deadline_miss(&task_set, &policy).unwrap();
    assert!(miss.is_none());
}
