//! Integration tests for the learning engine
//!
//! These drive full episodes through the agent and check the properties
//! the components must hold together.

#![allow(clippy::cast_precision_loss)]
#![allow(clippy::float_cmp)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use boostmdp_core::{
    Action, ActionSet, BoostConfig, BoostError, LearningConfig, RbfConfig, RepresentationConfig,
    RepresentationKind, RewardConfig, Schedule,
};
use boostmdp_rl::{
    Agent, BoostingEnvironment, BoostingReward, Environment, EpisodeOutcome, EpsilonGreedy,
    QFunction, QTable, RbfQFunction, State, StateRepresentation, StepObserver, Trainer,
    Transition, VoteTable,
};

/// Three classifiers, all voting for the true class of example 0; example 1
/// gets no votes at all.
fn scenario_votes() -> Arc<VoteTable> {
    let table = VoteTable::binary(
        vec![1.0, 0.5, 0.25],
        vec![0, 0],
        &[vec![1.0, 0.0], vec![1.0, 0.0], vec![1.0, 0.0]],
    )
    .unwrap();
    Arc::new(table)
}

fn mixed_votes() -> Arc<VoteTable> {
    let table = VoteTable::binary(
        vec![0.9, 0.6, 0.4, 0.2],
        vec![0, 1, 0, 1, 1],
        &[
            vec![1.0, -1.0, 1.0, 1.0, -1.0],
            vec![-1.0, -1.0, 1.0, -1.0, 1.0],
            vec![1.0, 1.0, -1.0, -1.0, -1.0],
            vec![1.0, -1.0, 1.0, -1.0, 1.0],
        ],
    )
    .unwrap();
    Arc::new(table)
}

fn scenario_reward() -> RewardConfig {
    let mut reward = RewardConfig::new(10.0, 0.0);
    reward.skip_cost = 0.0;
    reward.classify_cost = -1.0;
    reward
}

fn representation(kind: RepresentationKind, env: &impl Environment) -> StateRepresentation {
    let config = RepresentationConfig {
        kind,
        ..RepresentationConfig::default()
    };
    StateRepresentation::from_config(&config, env.num_steps(), env.num_classes()).unwrap()
}

fn fresh_q(kind: RepresentationKind, representation: &StateRepresentation) -> QTable {
    let mut config = BoostConfig::with_reward(scenario_reward());
    config.representation.kind = kind;
    QTable::from_config(&config, representation).unwrap()
}

fn scripted_agent(
    votes: Arc<VoteTable>,
    reward: RewardConfig,
    actions: Vec<Action>,
) -> Agent<BoostingEnvironment<VoteTable>, BoostingReward> {
    let env = BoostingEnvironment::new(votes).unwrap();
    let repr = representation(RepresentationKind::Tabular, &env);
    let q = fresh_q(RepresentationKind::Tabular, &repr);
    Agent::builder(env, BoostingReward::new(reward))
        .representation(repr)
        .q_function(q)
        .policy(EpsilonGreedy::greedy(ActionSet::new(actions).unwrap()))
        .seed(1)
        .build()
        .unwrap()
}

/// Raises the interrupt flag after the first step it sees
struct InterruptAfterFirstStep {
    flag: Arc<AtomicBool>,
    fired: bool,
}

impl StepObserver for InterruptAfterFirstStep {
    fn on_step(&mut self, _event: &Transition) {
        if !self.fired {
            self.flag.store(true, Ordering::SeqCst);
            self.fired = true;
        }
    }
}

/// States visited by always classifying from `example`
fn classify_path(env: &impl Environment, example: usize) -> Vec<State> {
    let mut states = vec![env.reset_to(example).unwrap()];
    while let Some(last) = states.last() {
        if env.is_terminal(last) {
            break;
        }
        let next = env.transition(last, Action::Classify).unwrap();
        states.push(next);
    }
    states
}

#[test]
fn test_classify_all_scenario_reward() {
    let mut agent = scripted_agent(scenario_votes(), scenario_reward(), vec![Action::Classify]);
    agent.start_episode_at(0).unwrap();
    let outcome = agent.run_episode(100).unwrap();

    assert_eq!(outcome, EpisodeOutcome::Terminal { steps: 3 });
    let episode = agent.episode().unwrap();
    assert_eq!(episode.total_reward(), 7.0);
    assert!(episode.actions().all(|a| a == Action::Classify));
}

#[test]
fn test_terminate_at_start_scenario_reward() {
    let mut agent = scripted_agent(scenario_votes(), scenario_reward(), vec![Action::Terminate]);
    agent.start_episode_at(1).unwrap();
    let outcome = agent.run_episode(100).unwrap();
    assert_eq!(outcome, EpisodeOutcome::Terminal { steps: 1 });
    // A zero margin is not a correct prediction: the fail penalty applies
    assert_eq!(agent.episode().unwrap().total_reward(), 0.0);

    let mut reward = scenario_reward();
    reward.fail_penalty = -3.0;
    let mut agent = scripted_agent(scenario_votes(), reward, vec![Action::Terminate]);
    agent.start_episode_at(1).unwrap();
    agent.run_episode(100).unwrap();
    assert_eq!(agent.episode().unwrap().total_reward(), -3.0);
}

#[test]
fn test_trace_entries_match_steps() {
    for kind in [
        RepresentationKind::Tabular,
        RepresentationKind::Rbf,
        RepresentationKind::RbfVector,
    ] {
        let env = BoostingEnvironment::new(mixed_votes()).unwrap();
        let repr = representation(kind, &env);
        let q = fresh_q(kind, &repr);
        let mut agent = Agent::builder(env, BoostingReward::new(scenario_reward()))
            .representation(repr)
            .q_function(q)
            .policy(EpsilonGreedy::new(1.0, ActionSet::default()))
            .learner(LearningConfig::default())
            .seed(17)
            .build()
            .unwrap();

        for _ in 0..50 {
            agent.run_episode(100).unwrap();
            let episode = agent.episode().unwrap();
            assert_eq!(agent.traces().len(), episode.steps(), "{kind:?}");
            assert!(episode.steps() <= 4);
        }
    }
}

#[test]
fn test_incremental_reward_telescopes() {
    let totals = |incremental: bool| -> Vec<f64> {
        let mut reward = RewardConfig::new(5.0, -2.0);
        reward.incremental = incremental;
        reward.skip_cost = -0.1;
        let env = BoostingEnvironment::new(mixed_votes()).unwrap();
        let repr = representation(RepresentationKind::Tabular, &env);
        let q = fresh_q(RepresentationKind::Tabular, &repr);
        let mut agent = Agent::builder(env, BoostingReward::new(reward))
            .representation(repr)
            .q_function(q)
            .policy(EpsilonGreedy::new(1.0, ActionSet::default()))
            .seed(23)
            .build()
            .unwrap();
        (0..100)
            .map(|_| {
                agent.run_episode(100).unwrap();
                agent.episode().unwrap().total_reward()
            })
            .collect()
    };

    let incremental = totals(true);
    let terminal_only = totals(false);
    for (a, b) in incremental.iter().zip(&terminal_only) {
        assert!((a - b).abs() < 1e-9, "{a} != {b}");
    }
}

#[test]
fn test_tabular_learning_converges_to_fixed_point() {
    let env = BoostingEnvironment::new(scenario_votes()).unwrap();
    let repr = representation(RepresentationKind::Tabular, &env);
    let q = fresh_q(RepresentationKind::Tabular, &repr);
    let learning = LearningConfig {
        lambda: 0.0,
        gamma: 1.0,
        learning_rate: Schedule::constant(0.5),
        exploration: Schedule::constant(0.0),
        actions: ActionSet::new(vec![Action::Classify]).unwrap(),
        ..LearningConfig::default()
    };
    let mut agent = Agent::builder(env.clone(), BoostingReward::new(scenario_reward()))
        .representation(repr.clone())
        .q_function(q)
        .policy(EpsilonGreedy::greedy(learning.actions.clone()))
        .learner(learning)
        .seed(3)
        .build()
        .unwrap();
    agent.set_learning_rate(0.5);

    for _ in 0..100 {
        agent.start_episode_at(0).unwrap();
        agent.run_episode(10).unwrap();
    }

    // Q(s_k, classify) = -1 * (3 - k) + 10
    let path = classify_path(&env, 0);
    for (k, state) in path.iter().take(3).enumerate() {
        let input = repr.observe(state).unwrap();
        let value = agent.q_function().value(&input, Action::Classify).unwrap();
        let expected = 10.0 - (3 - k) as f64;
        assert!((value - expected).abs() < 1e-6, "step {k}: {value} vs {expected}");
    }
}

#[test]
fn test_interrupted_episode_resumes() {
    let env = BoostingEnvironment::new(scenario_votes()).unwrap();
    let repr = representation(RepresentationKind::Rbf, &env);
    let q = fresh_q(RepresentationKind::Rbf, &repr);
    let learning = LearningConfig {
        actions: ActionSet::new(vec![Action::Classify]).unwrap(),
        ..LearningConfig::default()
    };

    let flag = Arc::new(AtomicBool::new(false));
    let mut agent = Agent::builder(env, BoostingReward::new(scenario_reward()))
        .representation(repr)
        .q_function(q)
        .policy(EpsilonGreedy::greedy(learning.actions.clone()))
        .learner(learning)
        .observer(InterruptAfterFirstStep {
            flag: Arc::clone(&flag),
            fired: false,
        })
        .interrupt_flag(Arc::clone(&flag))
        .seed(4)
        .build()
        .unwrap();

    agent.start_episode_at(0).unwrap();
    let outcome = agent.run_episode(100).unwrap();
    assert_eq!(outcome, EpisodeOutcome::Interrupted { steps: 1 });
    assert!(!agent.episode().unwrap().is_finished());
    // The flag is consumed when observed
    assert!(!flag.load(Ordering::SeqCst));
    let centers = agent.q_function().as_rbf().unwrap().total_centers();
    assert!(centers >= 1);

    let outcome = agent.run_episode(100).unwrap();
    assert_eq!(outcome, EpisodeOutcome::Terminal { steps: 3 });
    let episode = agent.episode().unwrap();
    assert_eq!(episode.state().example, 0);
    assert_eq!(agent.traces().len(), 3);
    assert_eq!(episode.total_reward(), 7.0);
    assert!(agent.q_function().as_rbf().unwrap().total_centers() >= centers);
}

#[test]
fn test_persistence_round_trip_after_training() {
    let dir = tempfile::tempdir().unwrap();

    for kind in [RepresentationKind::Tabular, RepresentationKind::RbfVector] {
        let mut config = BoostConfig::with_reward(RewardConfig::new(5.0, -5.0));
        config.representation.kind = kind;
        config.training.episodes = 300;
        config.training.eval_interval = 0;
        config.training.log_interval = 0;
        let mut trainer = Trainer::new(config.clone(), mixed_votes()).unwrap();
        trainer.train().unwrap();

        let path = dir.path().join(format!("{kind:?}.q"));
        trainer.q_function().save_to_file(&path).unwrap();
        let loaded = QTable::load_from_file(&path, config.rbf.clone(), 0.2).unwrap();
        let original = trainer.q_function();
        let repr = trainer.agent().representation();
        loaded.check_compatible(repr).unwrap();

        let env = trainer.agent().environment();
        for example in 0..env.num_instances() {
            for state in classify_path(env, example) {
                let input = repr.observe(&state).unwrap();
                for action in Action::ALL {
                    assert_eq!(
                        loaded.value(&input, action).unwrap(),
                        original.value(&input, action).unwrap(),
                        "{kind:?} example {example} step {} {action}",
                        state.step
                    );
                }
            }
        }

        if let (Some(a), Some(b)) = (original.as_rbf(), loaded.as_rbf()) {
            assert_eq!(a.total_centers(), b.total_centers());
            for action in Action::ALL {
                for step in 0..=a.num_steps() {
                    let before: Vec<_> = a.list(step, action).unwrap().iter_sorted().collect();
                    let after: Vec<_> = b.list(step, action).unwrap().iter_sorted().collect();
                    assert_eq!(before, after);
                }
            }
        }
    }
}

#[test]
fn test_value_lookup_is_idempotent() {
    let mut config = BoostConfig::with_reward(RewardConfig::new(5.0, -5.0));
    config.training.episodes = 100;
    config.training.eval_interval = 0;
    let mut trainer = Trainer::new(config, mixed_votes()).unwrap();
    trainer.train().unwrap();

    let q = trainer.q_function();
    let repr = trainer.agent().representation();
    let state = trainer.agent().environment().reset_to(2).unwrap();
    let input = repr.observe(&state).unwrap();
    let first: Vec<f64> = Action::ALL
        .iter()
        .map(|a| q.value(&input, *a).unwrap())
        .collect();
    for _ in 0..5 {
        let again: Vec<f64> = Action::ALL
            .iter()
            .map(|a| q.value(&input, *a).unwrap())
            .collect();
        assert_eq!(first, again);
    }
}

#[test]
fn test_first_center_activation_is_one() {
    let mut q = RbfQFunction::new(4, 2, RbfConfig::default(), 0.1);
    let added = q
        .add_center(-0.7, &[0.25, 0.75], 3, Action::Terminate)
        .unwrap()
        .unwrap();
    assert_eq!(added.slot, 0);
    let at_mean = boostmdp_rl::Observation::Layered {
        step: 3,
        margins: vec![0.25, 0.75],
    };
    assert_eq!(q.activation(&at_mean, Action::Terminate).unwrap(), 1.0);
}

#[test]
fn test_greedy_agent_is_deterministic() {
    let run = |seed: u64| -> Vec<Vec<Action>> {
        let mut config = BoostConfig::with_reward(RewardConfig::new(5.0, -5.0));
        config.training.episodes = 50;
        config.training.eval_interval = 0;
        config.training.seed = seed;
        let mut trainer = Trainer::new(config, mixed_votes()).unwrap();
        trainer.train().unwrap();

        let mut frozen = trainer.agent().frozen_copy();
        (0..5)
            .map(|example| {
                frozen.start_episode_at(example).unwrap();
                frozen.run_episode(100).unwrap();
                frozen.episode().unwrap().actions().collect()
            })
            .collect()
    };
    let a = run(8);
    let b = run(8);
    assert_eq!(a, b);
}

#[test]
fn test_agent_without_policy_is_rejected() {
    let env = BoostingEnvironment::new(mixed_votes()).unwrap();
    let repr = representation(RepresentationKind::Rbf, &env);
    let q = fresh_q(RepresentationKind::Rbf, &repr);
    let result = Agent::builder(env, BoostingReward::new(scenario_reward()))
        .representation(repr)
        .q_function(q)
        .learner(LearningConfig::default())
        .build();
    assert!(matches!(result, Err(BoostError::Config(_))));
}
