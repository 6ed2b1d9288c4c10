//! Learning engine benchmarks
//!
//! Hot paths:
//! 1. QFunction::value() - several calls per step (greedy choice, TD target)
//! 2. QFunction::gradient() - once per step plus trace extension
//! 3. RbfQFunction::add_center() - neighbour search on every growth
//! 4. Agent::run_episode() - the full learning step loop

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use boostmdp_core::{
    Action, ActionSet, BoostConfig, LearningConfig, RbfConfig, RepresentationKind, RewardConfig,
};
use boostmdp_rl::{
    Agent, BoostingEnvironment, BoostingReward, Environment, EpsilonGreedy, Observation,
    QFunction, QTable, RbfQFunction, StateRepresentation, VoteTable,
};

fn populated_rbf(centers: usize, dims: usize) -> RbfQFunction {
    let config = RbfConfig {
        max_centers: centers + 1,
        ..RbfConfig::default()
    };
    let mut q = RbfQFunction::new(1, dims, config, 0.1);
    let mut rng = StdRng::seed_from_u64(1);
    for _ in 0..centers {
        let position: Vec<f64> = (0..dims).map(|_| rng.gen::<f64>()).collect();
        q.add_center(rng.gen_range(-1.0..1.0), &position, 0, Action::Classify)
            .unwrap();
    }
    q
}

fn random_votes(hypotheses: usize, examples: usize) -> Arc<VoteTable> {
    let mut rng = StdRng::seed_from_u64(2);
    let weights = (0..hypotheses).map(|_| rng.gen_range(0.1..1.0)).collect();
    let labels = (0..examples).map(|e| e % 2).collect();
    let votes: Vec<Vec<f64>> = (0..hypotheses)
        .map(|_| {
            (0..examples)
                .map(|_| if rng.gen_bool(0.6) { 1.0 } else { -1.0 })
                .collect()
        })
        .collect();
    Arc::new(VoteTable::binary(weights, labels, &votes).unwrap())
}

fn bench_value(c: &mut Criterion) {
    let mut group = c.benchmark_group("rbf_value");
    for centers in [10, 50, 100] {
        let q = populated_rbf(centers, 1);
        let input = Observation::Layered {
            step: 0,
            margins: vec![0.42],
        };
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(centers), &q, |b, q| {
            b.iter(|| q.value(black_box(&input), Action::Classify).unwrap());
        });
    }
    group.finish();
}

fn bench_gradient(c: &mut Criterion) {
    let mut group = c.benchmark_group("rbf_gradient");
    for dims in [1, 2] {
        let q = populated_rbf(100, dims);
        let input = Observation::Layered {
            step: 0,
            margins: vec![0.42; dims],
        };
        group.bench_with_input(BenchmarkId::new("dims", dims), &q, |b, q| {
            b.iter(|| q.gradient(black_box(&input), Action::Classify).unwrap());
        });
    }
    group.finish();
}

fn bench_add_center(c: &mut Criterion) {
    let base = populated_rbf(99, 1);
    c.bench_function("rbf_add_center_100th", |b| {
        b.iter_batched(
            || base.clone(),
            |mut q| {
                q.add_center(0.5, black_box(&[0.37]), 0, Action::Classify)
                    .unwrap()
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

fn bench_episode(c: &mut Criterion) {
    let mut group = c.benchmark_group("training_episode");
    for kind in [RepresentationKind::Tabular, RepresentationKind::Rbf] {
        let env = BoostingEnvironment::new(random_votes(50, 200)).unwrap();
        let mut config = BoostConfig::with_reward(RewardConfig::new(10.0, -10.0));
        config.representation.kind = kind;
        let repr =
            StateRepresentation::from_config(&config.representation, env.num_steps(), 2).unwrap();
        let q = QTable::from_config(&config, &repr).unwrap();
        let mut agent = Agent::builder(env, BoostingReward::new(config.reward.clone()))
            .representation(repr)
            .q_function(q)
            .policy(EpsilonGreedy::new(0.1, ActionSet::default()))
            .learner(LearningConfig::default())
            .seed(3)
            .build()
            .unwrap();

        group.bench_function(format!("{kind:?}"), |b| {
            b.iter(|| agent.run_episode(black_box(1_000)).unwrap());
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_value,
    bench_gradient,
    bench_add_center,
    bench_episode
);
criterion_main!(benches);
