//! Dual-Priority policy synthesis: several independent strategies for
//! picking promotion times given a task set, grounded on
//! `dualpriority/policies.py`, `dualpriority/internals.py`,
//! `dualpriority/threeTasks.py` and `dualpriority/burns.py`.

use std::sync::Arc;

use crate::driver::{AggregatorTag, SimulationSetup, SimulationResult, SimulationRun};
use crate::error::{DpSearchError, SimulationError};
use crate::history::DeadlineMiss;
use crate::scheduler::{DualPriorityPolicy, DualPriorityTaskInfo, SchedulingPolicy};
use crate::task::{Task, TaskId, TaskSet, Time};

/// Tasks ordered by ascending minimal inter-arrival time (period), ties
/// broken by task id for a total, deterministic order — `rmSortedTasks`.
pub fn rm_sorted_tasks(tasks: &[Arc<Task>]) -> Vec<Arc<Task>> {
    let mut sorted: Vec<Arc<Task>> = tasks.to_vec();
    sorted.sort_by_key(|t| (t.minimal_inter_arrival_time(), t.unique_id()));
    sorted
}

/// The reverse order: longest period first, used when walking tasks from
/// the least to the most urgent.
pub fn minus_rm_sorted_tasks(tasks: &[Arc<Task>]) -> Vec<Arc<Task>> {
    let mut sorted: Vec<Arc<Task>> = tasks.to_vec();
    sorted.sort_by_key(|t| (std::cmp::Reverse(t.minimal_inter_arrival_time()), std::cmp::Reverse(t.unique_id())));
    sorted
}

/// Rate-Monotonic as a Dual-Priority policy with no promotions at all:
/// priority `1..=n` in ascending-period order.
pub fn base_rm_policy(task_set: &TaskSet) -> DualPriorityPolicy {
    let sorted = rm_sorted_tasks(task_set.tasks());
    DualPriorityPolicy::new(
        sorted
            .iter()
            .enumerate()
            .map(|(i, t)| (t.unique_id(), DualPriorityTaskInfo::without_promotion((i + 1) as i64))),
    )
}

/// An RM/RM policy: every task starts at its RM-ordered low priority band
/// and promotes, after its full period elapses, into the mirrored RM-ordered
/// high priority band. A starting point for [`greedy_deadline_fix_policy`].
pub fn base_rmrm_policy(task_set: &TaskSet) -> DualPriorityPolicy {
    let sorted = rm_sorted_tasks(task_set.tasks());
    let shift = sorted.len() as i64;
    DualPriorityPolicy::new(sorted.iter().enumerate().map(|(i, t)| {
        let priority = i as i64;
        (
            t.unique_id(),
            DualPriorityTaskInfo::with_promotion(priority, t.minimal_inter_arrival_time(), priority - shift),
        )
    }))
}

/// Decrements `task`'s promotion by one unit of time, used by the greedy
/// deadline-fix search. Errors if the promotion is already at zero — there's
/// nowhere left to push it.
pub fn fix_rmrm_policy(
    policy: &DualPriorityPolicy,
    task_id: TaskId,
) -> Result<DualPriorityPolicy, DpSearchError> {
    let low = policy.low_priority(task_id);
    let high = policy.high_priority(task_id);
    let promotion = policy
        .promotion(task_id)
        .ok_or(DpSearchError::NoValidPromotion { task_id })?;
    if promotion == 0 {
        return Err(DpSearchError::NoValidPromotion { task_id });
    }
    let high = high.unwrap_or(low);
    Ok(policy.with_update([(task_id, DualPriorityTaskInfo::with_promotion(low, promotion - 1, high))]))
}

fn run_to_hyperperiod(task_set: &TaskSet, policy: DualPriorityPolicy) -> Result<SimulationResult, SimulationError> {
    let setup = SimulationSetup::new(
        task_set.clone(),
        task_set.hyperperiod(),
        SchedulingPolicy::DualPriority(policy),
    );
    SimulationRun::new(setup).result()
}

pub fn find_first_deadline_miss(
    task_set: &TaskSet,
    policy: &DualPriorityPolicy,
) -> Result<Option<DeadlineMiss>, SimulationError> {
    let result = run_to_hyperperiod(task_set, policy.clone())?;
    Ok(result.first_deadline_miss())
}

/// Starts from an RM/RM policy and, for as long as the task set still
/// misses a deadline, pulls the offending task's promotion one unit earlier
/// — `greedyDeadlineFixPolicy`.
pub fn greedy_deadline_fix_policy(task_set: &TaskSet) -> Result<DualPriorityPolicy, DpSearchError> {
    let mut policy = base_rmrm_policy(task_set);
    loop {
        let miss = find_first_deadline_miss(task_set, &policy)
            .map_err(|e| DpSearchError::OptimisationFailure { reason: e.to_string() })?;
        match miss {
            None => return Ok(policy),
            Some(dm) => {
                policy = fix_rmrm_policy(&policy, dm.task_id())?;
            }
        }
    }
}

/// Fixed-point response-time analysis of `task` against `interfering_tasks`,
/// all running at higher priority. Capped at `2 * deadline`, which signals
/// unschedulability rather than panicking — matches `responseTime`.
pub fn response_time(task: &Task, interfering_tasks: &[&Arc<Task>]) -> Time {
    let limit = task.deadline() * 2;
    let mut rt = 0;
    let mut next_rt = task.wcet();
    while rt < next_rt && next_rt < limit {
        rt = next_rt;
        let interference: Time = interfering_tasks
            .iter()
            .map(|t| t.wcet() * (1 + (rt - 1).div_euclid(t.minimal_inter_arrival_time())))
            .sum();
        next_rt = task.wcet() + interference;
    }
    next_rt.min(limit)
}

/// Response times of every task under plain Rate-Monotonic, via fixed-point
/// analysis against every strictly-shorter-period task — `fpRMResponseTimes`.
pub fn fp_rm_response_times(task_set: &TaskSet) -> Vec<(TaskId, Time)> {
    let rm_sorted = rm_sorted_tasks(task_set.tasks());
    task_set
        .tasks()
        .iter()
        .map(|task| {
            let shorter: Vec<&Arc<Task>> = rm_sorted
                .iter()
                .take_while(|t| t.unique_id() != task.unique_id())
                .collect();
            (task.unique_id(), response_time(task, &shorter))
        })
        .collect()
}

/// Tasks that are Least-Priority-Viable in Rate-Monotonic order: a task is
/// LPV once its response time against every *other* remaining task leaves
/// non-negative laxity before its next period. Iterates in ascending
/// `uniqueId` order for determinism (the original relies on Python set
/// iteration order, which is unspecified) — `genLpViableTasks`.
pub fn gen_lpv_viable_tasks(task_set: &TaskSet) -> Vec<Arc<Task>> {
    let mut remaining: Vec<Arc<Task>> = task_set.tasks().to_vec();
    remaining.sort_by_key(|t| t.unique_id());
    let mut ordered = Vec::new();
    loop {
        let found = remaining.iter().enumerate().find_map(|(i, task)| {
            let interfering: Vec<&Arc<Task>> = remaining
                .iter()
                .enumerate()
                .filter(|(j, _)| *j != i)
                .map(|(_, t)| t)
                .collect();
            let rt = response_time(task, &interfering);
            let laxity = task.minimal_inter_arrival_time() - rt;
            if laxity >= 0 {
                Some(i)
            } else {
                None
            }
        });
        match found {
            Some(i) => ordered.push(remaining.remove(i)),
            None => break,
        }
    }
    ordered
}

/// Assigns promotion times equal to each task's worst-case RM laxity
/// (`period - longest RM response time`, floored at zero), RM-sorted from
/// the most urgent down; LPV-viable tasks stay unpromoted at the lowest
/// priority band — `rmLaxityPromotions`.
pub fn rm_laxity_promotions(task_set: &TaskSet, lpv_prep: bool) -> DualPriorityPolicy {
    let rm_sorted = rm_sorted_tasks(task_set.tasks());
    let response_times: std::collections::HashMap<TaskId, Time> =
        fp_rm_response_times(task_set).into_iter().collect();
    let max_prio = task_set.len() as i64;

    let lpv_viable = if lpv_prep {
        gen_lpv_viable_tasks(task_set)
    } else {
        Vec::new()
    };
    let nb_viable = lpv_viable.len();
    let promoted = &rm_sorted[..rm_sorted.len().saturating_sub(1 + nb_viable)];

    let mut entries = Vec::new();
    for (i, task) in promoted.iter().enumerate() {
        let rt = response_times[&task.unique_id()];
        let rm_laxity = task.minimal_inter_arrival_time() - rt;
        let promotion = rm_laxity.max(0);
        entries.push((
            task.unique_id(),
            DualPriorityTaskInfo::with_promotion(max_prio - i as i64, promotion, i as i64 - max_prio),
        ));
    }
    if nb_viable < task_set.len() {
        let boundary = &rm_sorted[rm_sorted.len() - 1 - nb_viable];
        entries.push((boundary.unique_id(), DualPriorityTaskInfo::without_promotion(1)));
    }
    for (i, task) in lpv_viable.iter().rev().enumerate() {
        let prio = max_prio + nb_viable as i64 + i as i64;
        entries.push((task.unique_id(), DualPriorityTaskInfo::without_promotion(prio)));
    }
    DualPriorityPolicy::new(entries)
}

/// Assigns promotion times equal to each task's worst-case hyperperiod-wide
/// laxity against the whole task set (the DAJAM laxity bound), RM-sorted
/// the same way as [`rm_laxity_promotions`] — `dajamPromotions`.
pub fn dajam_promotions(task_set: &TaskSet) -> DualPriorityPolicy {
    let rm_sorted = rm_sorted_tasks(task_set.tasks());
    let max_prio = task_set.len() as i64;
    let lpv_viable = gen_lpv_viable_tasks(task_set);
    let nb_viable = lpv_viable.len();
    let promoted = &rm_sorted[..rm_sorted.len().saturating_sub(1 + nb_viable)];

    let anti_wcets: Vec<Time> = rm_sorted
        .iter()
        .map(|t| t.minimal_inter_arrival_time() - t.wcet())
        .collect();
    let promo_for = |index: usize| anti_wcets[..=index].iter().copied().min().unwrap();

    let mut entries = Vec::new();
    for (i, task) in promoted.iter().enumerate() {
        let promotion = promo_for(i);
        entries.push((
            task.unique_id(),
            DualPriorityTaskInfo::with_promotion(max_prio - i as i64, promotion, i as i64 - max_prio),
        ));
    }
    if nb_viable < task_set.len() {
        let boundary = &rm_sorted[rm_sorted.len() - 1 - nb_viable];
        entries.push((boundary.unique_id(), DualPriorityTaskInfo::without_promotion(1)));
    }
    for (i, task) in lpv_viable.iter().rev().enumerate() {
        let prio = max_prio + nb_viable as i64 + i as i64;
        entries.push((task.unique_id(), DualPriorityTaskInfo::without_promotion(prio)));
    }
    DualPriorityPolicy::new(entries)
}

/// Whether simulating `policy` over one hyperperiod produces no deadline
/// miss for any of `tasks_to_test` — `_successForTasks`.
fn success_for_tasks(
    task_set: &TaskSet,
    policy: &DualPriorityPolicy,
    tasks_to_test: &[TaskId],
) -> Result<bool, DpSearchError> {
    let result = run_to_hyperperiod(task_set, policy.clone())
        .map_err(|e| DpSearchError::OptimisationFailure { reason: e.to_string() })?;
    let hyperperiod = task_set.hyperperiod();
    let has_miss = tasks_to_test.iter().any(|&task_id| {
        result
            .history
            .deadline_misses(hyperperiod)
            .iter()
            .any(|m| m.task_id() == task_id)
    });
    Ok(!has_miss)
}

/// Binary-searches each promoted task's promotion time downward from a safe
/// upper bound, recursing into the remaining tasks only once the current
/// candidate is provisionally successful — `_loopTaskPromotion`/
/// `_loopTasksToPromote`. Backtracks by narrowing the search window rather
/// than full exponential backtracking, which keeps this linear in the
/// number of tasks times the log of the search window instead of the
/// original's unbounded recursion depth.
fn loop_task_promotion(
    task_to_promote: TaskId,
    remaining_to_promote: &[TaskId],
    tasks_to_test: &[TaskId],
    task_set: &TaskSet,
    policy: &DualPriorityPolicy,
    min_promo: Time,
    max_promo: Time,
) -> Result<DualPriorityPolicy, DpSearchError> {
    let promotion = (min_promo + max_promo) / 2;
    let low = policy.low_priority(task_to_promote);
    let high = policy.high_priority(task_to_promote).unwrap_or(low);
    let updated = policy.with_update([(
        task_to_promote,
        DualPriorityTaskInfo::with_promotion(low, promotion, high),
    )]);

    let provisional_ok = success_for_tasks(task_set, &updated, tasks_to_test)?;
    let mut failed = !provisional_ok;
    let mut end_policy = updated.clone();

    if provisional_ok {
        match loop_tasks_to_promote(remaining_to_promote, tasks_to_test, task_set, &updated) {
            Ok(p) => end_policy = p,
            Err(_) => failed = true,
        }
    }

    if failed {
        if promotion == 0 {
            return Err(DpSearchError::NoValidPromotion { task_id: task_to_promote });
        }
        end_policy = loop_task_promotion(
            task_to_promote,
            remaining_to_promote,
            tasks_to_test,
            task_set,
            &updated,
            min_promo,
            promotion,
        )?;
    }
    Ok(end_policy)
}

fn loop_tasks_to_promote(
    tasks_to_promote: &[TaskId],
    tasks_to_test: &[TaskId],
    task_set: &TaskSet,
    policy: &DualPriorityPolicy,
) -> Result<DualPriorityPolicy, DpSearchError> {
    let (task_to_promote, rest) = match tasks_to_promote.split_first() {
        None => return Ok(policy.clone()),
        Some((first, rest)) => (*first, rest),
    };
    let mut tasks_to_test = tasks_to_test.to_vec();
    tasks_to_test.push(task_to_promote);
    let max_promo = policy
        .promotion(task_to_promote)
        .ok_or(DpSearchError::NoValidPromotion { task_id: task_to_promote })?;
    loop_task_promotion(task_to_promote, rest, &tasks_to_test, task_set, policy, 0, max_promo)
}

/// Sweeps spurious "promotions" left by [`dichotomic_promotion_search`]'s
/// RM(-1)/RM base policy: once a lower-priority task's promotion still sits
/// exactly at its own period, it and everything above it in priority never
/// actually promoted, so those entries collapse to plain RM —
/// `_cleanRMm1RMpolicy`.
fn clean_rmm1_rm_policy(task_set: &TaskSet, policy: &DualPriorityPolicy) -> DualPriorityPolicy {
    let mut sorted: Vec<(TaskId, DualPriorityTaskInfo)> =
        policy.entries().map(|(id, info)| (id, *info)).collect();
    sorted.sort_by_key(|(_, info)| info.low_priority());
    if sorted.is_empty() {
        return policy.clone();
    }
    let mut entries = Vec::new();
    let (first_id, _) = sorted[0];
    entries.push((first_id, DualPriorityTaskInfo::without_promotion(1)));
    let mut spurious = true;
    for (task_id, info) in &sorted[1..] {
        let period = task_set
            .task(*task_id)
            .expect("policy entry refers to a task in this task set")
            .minimal_inter_arrival_time();
        spurious = spurious && info.has_promotion() && info.promotion() == Some(period);
        if spurious {
            entries.push((*task_id, DualPriorityTaskInfo::without_promotion(info.low_priority())));
        } else {
            entries.push((*task_id, *info));
        }
    }
    DualPriorityPolicy::new(entries)
}

/// Finds promotion times by dichotomic (binary) search over each
/// RM(-1)/RM-excluded task's promotion window, leaving Least-Priority-Viable
/// tasks unpromoted — `dichotomicPromotionSearch`.
pub fn dichotomic_promotion_search(task_set: &TaskSet) -> Result<DualPriorityPolicy, DpSearchError> {
    let lpv_viable = gen_lpv_viable_tasks(task_set);
    let lpv_ids: Vec<TaskId> = lpv_viable.iter().map(|t| t.unique_id()).collect();
    let max_prio = task_set.len() as i64;

    let mut base_entries: Vec<(TaskId, DualPriorityTaskInfo)> = lpv_viable
        .iter()
        .rev()
        .enumerate()
        .map(|(i, t)| {
            (
                t.unique_id(),
                DualPriorityTaskInfo::without_promotion(max_prio + lpv_viable.len() as i64 + i as i64),
            )
        })
        .collect();

    let dual_include: Vec<Arc<Task>> = task_set
        .tasks()
        .iter()
        .filter(|t| !lpv_ids.contains(&t.unique_id()))
        .cloned()
        .collect();
    let rm_sorted_included = rm_sorted_tasks(&dual_include);
    let include_max_prio = dual_include.len() as i64;
    for (index, task) in rm_sorted_included.iter().enumerate() {
        let minus_rm_priority = include_max_prio - index as i64;
        base_entries.push((
            task.unique_id(),
            DualPriorityTaskInfo::with_promotion(minus_rm_priority, task.deadline(), -minus_rm_priority),
        ));
    }
    let base_policy = DualPriorityPolicy::new(base_entries);

    let built = loop_tasks_to_promote(
        &rm_sorted_included.iter().map(|t| t.unique_id()).collect::<Vec<_>>(),
        &lpv_ids,
        task_set,
        &base_policy,
    )?;
    Ok(clean_rmm1_rm_policy(task_set, &built))
}

/// A Dual-Priority policy that tracks down and reports the information
/// needed to manually fix the first deadline miss under a base
/// Rate-Monotonic policy, without changing the policy itself. Matches
/// `burnsWellingsPolicy`'s actual behavior in the original: it traces the
/// missed job's state through a logger and returns the unmodified
/// Rate-Monotonic policy, rather than computing a fix.
pub fn burns_wellings_policy(task_set: &TaskSet) -> Result<DualPriorityPolicy, SimulationError> {
    let policy = base_rm_policy(task_set);
    if let Some(miss) = find_first_deadline_miss(task_set, &policy)? {
        tracing::warn!(
            task_id = miss.task_id(),
            release_index = miss.release_index,
            "burns-wellings base policy misses a deadline; promotions not computed"
        );
    }
    Ok(policy)
}

fn interference_in_interval(start: Time, end: Time, i_offset: Time, i_period: Time, i_length: Time) -> Time {
    let first_interference_index = 1 + (start - 1 - (i_length + i_offset)).div_euclid(i_period);
    let first_interference_start = i_offset + first_interference_index * i_period;
    let first_partial = (start - first_interference_start).max(0);

    let last_interference_index = (end - i_offset).div_euclid(i_period);
    let last_interference_start = i_offset + last_interference_index * i_period;
    let last_interference_end = last_interference_start + i_length;
    let last_partial = (last_interference_end - end).max(0);

    let interference_sum = i_length * (1 + last_interference_index - first_interference_index).max(0);
    interference_sum - (first_partial + last_partial)
}

/// Three-task Dual-Priority optimiser shared machinery: builds the
/// three-band policy `(t1 high/low = +-3, t2 high/low = +-2, t3 = 1)` once
/// the middle task's promotion time is known — `AbstractThreeTaskOptimiser._buildWithPromo2`.
fn build_with_promo2(rm_sorted: &[Arc<Task>; 3], promo2: Time) -> DualPriorityPolicy {
    let [t1, t2, t3] = rm_sorted;
    let promo1 = t1.minimal_inter_arrival_time() - t1.wcet();
    DualPriorityPolicy::new([
        (t1.unique_id(), DualPriorityTaskInfo::with_promotion(3, promo1, -3)),
        (t2.unique_id(), DualPriorityTaskInfo::with_promotion(2, promo2, -2)),
        (t3.unique_id(), DualPriorityTaskInfo::without_promotion(1)),
    ])
}

fn rm_sorted_triple(task_set: &TaskSet) -> Result<[Arc<Task>; 3], DpSearchError> {
    let sorted = rm_sorted_tasks(task_set.tasks());
    sorted.try_into().map_err(|_| DpSearchError::OptimisationFailure {
        reason: "three-task optimiser requires exactly three tasks".to_string(),
    })
}

/// Finds the middle task's promotion time by fixed-point iteration over the
/// full hyperperiod: tightens `promo2` each pass against the worst-case
/// interference from the highest-priority task across every one of the
/// middle task's periods — `_fixedPointPromoT2`.
pub fn fixed_point_three_task_optimiser(task_set: &TaskSet) -> Result<DualPriorityPolicy, DpSearchError> {
    let [t1, t2, t3] = rm_sorted_triple(task_set)?;
    let hyperperiod = task_set.hyperperiod();

    let c1 = t1.wcet();
    let period1 = t1.minimal_inter_arrival_time();
    let c2 = t2.wcet();
    let period2 = t2.minimal_inter_arrival_time();
    let s1 = period1 - c1;

    let mut old_promo2 = period2;
    let mut promo2 = period2 - c2;
    while promo2 != old_promo2 {
        old_promo2 = promo2;
        let cycles = (hyperperiod / period2).max(1);
        for q in 1..cycles {
            let t2_promotion_time = period2 * (q - 1) + promo2;
            let t2_deadline_time = period2 * q;
            let interference = interference_in_interval(t2_promotion_time, t2_deadline_time, s1, period1, c1);
            if promo2 > period2 - c2 - interference {
                promo2 = period2 - c2 - interference;
                if promo2 < 0 {
                    return Err(DpSearchError::OptimisationFailure {
                        reason: "fixed-point promotion search went negative".to_string(),
                    });
                }
                break;
            }
        }
    }
    Ok(build_with_promo2(&[t1, t2, t3], promo2))
}

/// Finds the middle task's promotion time via simulated worst-case RM
/// laxity instead of analytic fixed-point iteration — `RMWorstCaseLaxity3TaskOptimiser`.
pub fn rm_worst_case_laxity_three_task_optimiser(
    task_set: &TaskSet,
) -> Result<DualPriorityPolicy, SimulationError> {
    let [t1, t2, t3] = rm_sorted_triple(task_set).map_err(|e| SimulationError::not_implemented(e.to_string()))?;
    let rm_policy = base_rm_policy(task_set);
    let setup = SimulationSetup::new(task_set.clone(), task_set.hyperperiod(), SchedulingPolicy::DualPriority(rm_policy))
        .with_aggregators(vec![AggregatorTag::LongestResponseTime]);
    let result = SimulationRun::new(setup).result()?;
    let longest = match result.aggregate_stat(AggregatorTag::LongestResponseTime) {
        Some(crate::driver::AggregateStat::PerTask(map)) => map.clone(),
        _ => unreachable!("LongestResponseTime aggregator always yields a per-task map"),
    };
    let t2_rt = *longest.get(&t2.unique_id()).unwrap_or(&t2.wcet());
    let period2 = t2.minimal_inter_arrival_time();
    Ok(build_with_promo2(&[t1, t2, t3], period2 - t2_rt))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::{reset_task_id_counter, ArrivalDistribution};

    fn task(wcet: Time, deadline: Time, period: Time) -> Arc<Task> {
        Arc::new(Task::new(wcet, deadline, ArrivalDistribution::fixed(period)))
    }

    #[test]
    fn base_rm_policy_orders_by_period() {
        reset_task_id_counter();
        let t1 = task(2, 10, 10);
        let t2 = task(1, 5, 5);
        let task_set = TaskSet::from_arcs(vec![t1.clone(), t2.clone()]);
        let policy = base_rm_policy(&task_set);
        assert!(policy.low_priority(t2.unique_id()) < policy.low_priority(t1.unique_id()));
    }

    #[test]
    fn rm_laxity_promotions_gives_schedulable_policy_for_light_load() {
        reset_task_id_counter();
        let t1 = task(1, 10, 10);
        let t2 = task(1, 20, 20);
        let task_set = TaskSet::from_arcs(vec![t1.clone(), t2.clone()]);
        let policy = rm_laxity_promotions(&task_set, true);
        let miss = find_first_deadline_miss(&task_set, &policy).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn greedy_deadline_fix_resolves_an_overloaded_rmrm_start() {
        reset_task_id_counter();
        let t1 = task(4, 10, 10);
        let t2 = task(4, 10, 10);
        let task_set = TaskSet::from_arcs(vec![t1, t2]);
        let policy = greedy_deadline_fix_policy(&task_set).unwrap();
        let miss = find_first_deadline_miss(&task_set, &policy).unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn burns_wellings_policy_returns_base_rm() {
        reset_task_id_counter();
        let t1 = task(2, 10, 10);
        let task_set = TaskSet::from_arcs(vec![t1]);
        let policy = burns_wellings_policy(&task_set).unwrap();
        assert_eq!(policy.tasks().count(), 1);
    }

    #[test]
    fn fixed_point_three_task_optimiser_builds_three_band_policy() {
        reset_task_id_counter();
        let t1 = task(2, 20, 20);
        let t2 = task(3, 40, 40);
        let t3 = task(5, 80, 80);
        let task_set = TaskSet::from_arcs(vec![t1, t2, t3]);
        let policy = fixed_point_three_task_optimiser(&task_set).unwrap();
        assert_eq!(policy.tasks().count(), 3);
    }
}
