//! Benchmarks the cost of running a simulation to its hyperperiod under
//! each scheduling policy, and the cost of the Dual-Priority policy
//! synthesis algorithms, on a handful of representative task sets.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use dp_sim::dp;
use dp_sim::task::{reset_task_id_counter, ArrivalDistribution, Task, TaskSet};
use dp_sim::{SchedulingPolicy, SimulationRun, SimulationSetup};

fn light_task_set() -> TaskSet {
    reset_task_id_counter();
    TaskSet::new(vec![
        Task::new(1, 4, ArrivalDistribution::fixed(4)),
        Task::new(2, 6, ArrivalDistribution::fixed(6)),
        Task::new(3, 10, ArrivalDistribution::fixed(10)),
        Task::new(1, 20, ArrivalDistribution::fixed(20)),
    ])
}

fn busy_task_set() -> TaskSet {
    reset_task_id_counter();
    TaskSet::new(vec![
        Task::new(3, 10, ArrivalDistribution::fixed(10)),
        Task::new(4, 15, ArrivalDistribution::fixed(15)),
        Task::new(5, 20, ArrivalDistribution::fixed(20)),
        Task::new(6, 30, ArrivalDistribution::fixed(30)),
        Task::new(4, 40, ArrivalDistribution::fixed(40)),
    ])
}

fn bench_simulate_to_hyperperiod(c: &mut Criterion) {
    let mut group = c.benchmark_group("simulate_to_hyperperiod");
    for (name, task_set, policy) in [
        ("light/edf", light_task_set(), SchedulingPolicy::Edf),
        ("light/rm", light_task_set(), SchedulingPolicy::Rm),
        ("busy/edf", busy_task_set(), SchedulingPolicy::Edf),
        ("busy/rm", busy_task_set(), SchedulingPolicy::Rm),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &(task_set, policy), |b, (task_set, policy)| {
            b.iter(|| {
                let setup = SimulationSetup::new(task_set.clone(), task_set.hyperperiod(), policy.clone());
                black_box(SimulationRun::new(setup).result().unwrap())
            });
        });
    }
    group.finish();
}

fn bench_dp_policy_synthesis(c: &mut Criterion) {
    let mut group = c.benchmark_group("dp_policy_synthesis");
    group.bench_function("rm_laxity_promotions", |b| {
        let task_set = busy_task_set();
        b.iter(|| black_box(dp::rm_laxity_promotions(&task_set, true)));
    });
    group.bench_function("dajam_promotions", |b| {
        let task_set = busy_task_set();
        b.iter(|| black_box(dp::dajam_promotions(&task_set)));
    });
    group.bench_function("greedy_deadline_fix_policy", |b| {
        let task_set = busy_task_set();
        b.iter(|| black_box(dp::greedy_deadline_fix_policy(&task_set).unwrap()));
    });
    group.bench_function("dichotomic_promotion_search", |b| {
        let task_set = busy_task_set();
        b.iter(|| black_box(dp::dichotomic_promotion_search(&task_set).unwrap()));
    });
    group.finish();
}

criterion_group!(benches, bench_simulate_to_hyperperiod, bench_dp_policy_synthesis);
criterion_main!(benches);
