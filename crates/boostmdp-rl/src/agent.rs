//! Episode driver
//!
//! The agent owns the learned state (Q-function, traces) and runs the
//! state -> action -> transition -> reward -> update cycle. Step events go
//! to subscribers in a fixed order: the TD learner first, then every
//! observer in registration order.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::{debug, info};

use boostmdp_core::{Action, BoostError, LearningConfig, Result};

use crate::environment::Environment;
use crate::learner::{LearnerStats, LearningContext, TdLearner};
use crate::policy::EpsilonGreedy;
use crate::qfunction::{QFunction, QTable};
use crate::representation::StateRepresentation;
use crate::reward::RewardModel;
use crate::state::{Reward, State, Transition};
use crate::traces::EligibilityTraces;

/// Receives step events after the learner has seen them
pub trait StepObserver: Send {
    fn on_episode_start(&mut self, _state: &State) {}

    fn on_step(&mut self, event: &Transition);
}

/// Ordered subscriber list; the learner, when present, always comes first
#[derive(Default)]
pub struct Subscribers {
    learner: Option<TdLearner>,
    observers: Vec<Box<dyn StepObserver>>,
}

impl Subscribers {
    pub fn learner(&self) -> Option<&TdLearner> {
        self.learner.as_ref()
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }
}

/// Totals collected by [`EpisodeStats`]
#[derive(Debug, Clone, Default, Serialize)]
pub struct StatsSummary {
    pub episodes: u64,
    pub steps: u64,
    pub total_reward: f64,
    pub last_episode_reward: f64,
    /// Indexed by `Action::to_index`
    pub action_counts: [u64; 3],
}

impl StatsSummary {
    pub fn mean_reward(&self) -> f64 {
        if self.episodes == 0 {
            0.0
        } else {
            self.total_reward / self.episodes as f64
        }
    }
}

/// Observer accumulating reward and action counts across episodes
#[derive(Debug, Clone, Default)]
pub struct EpisodeStats {
    summary: Arc<Mutex<StatsSummary>>,
}

impl EpisodeStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of the totals so far
    pub fn summary(&self) -> StatsSummary {
        self.summary
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl StepObserver for EpisodeStats {
    fn on_episode_start(&mut self, _state: &State) {
        let mut summary = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
        summary.episodes += 1;
        summary.last_episode_reward = 0.0;
    }

    fn on_step(&mut self, event: &Transition) {
        let mut summary = self.summary.lock().unwrap_or_else(PoisonError::into_inner);
        summary.steps += 1;
        summary.total_reward += event.reward;
        summary.last_episode_reward += event.reward;
        summary.action_counts[event.action.to_index()] += 1;
    }
}

/// Logs every step at debug level
#[derive(Debug, Clone, Copy, Default)]
pub struct StepLogger;

impl StepObserver for StepLogger {
    fn on_step(&mut self, event: &Transition) {
        debug!(
            example = event.state.example,
            step = event.state.step,
            action = %event.action,
            reward = event.reward,
            terminal = event.terminal,
            "Step"
        );
    }
}

/// The transitions of one rollout
#[derive(Debug, Clone)]
pub struct Episode {
    start: State,
    transitions: Vec<Transition>,
    finished: bool,
}

impl Episode {
    fn new(start: State) -> Self {
        Self {
            start,
            transitions: Vec::new(),
            finished: false,
        }
    }

    pub fn steps(&self) -> usize {
        self.transitions.len()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Latest state reached
    pub fn state(&self) -> &State {
        self.transitions
            .last()
            .map_or(&self.start, |t| &t.next_state)
    }

    pub fn total_reward(&self) -> Reward {
        self.transitions.iter().map(|t| t.reward).sum()
    }

    pub fn actions(&self) -> impl Iterator<Item = Action> + '_ {
        self.transitions.iter().map(|t| t.action)
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

/// How a call to `run_episode` ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpisodeOutcome {
    Terminal { steps: usize },
    StepLimit { steps: usize },
    /// Stopped between steps; the next `run_episode` call resumes it
    Interrupted { steps: usize },
}

impl EpisodeOutcome {
    pub fn steps(&self) -> usize {
        match *self {
            EpisodeOutcome::Terminal { steps }
            | EpisodeOutcome::StepLimit { steps }
            | EpisodeOutcome::Interrupted { steps } => steps,
        }
    }
}

/// One executed step
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub action: Action,
    pub reward: Reward,
    pub terminal: bool,
}

pub struct Agent<E, R> {
    environment: E,
    reward: R,
    representation: StateRepresentation,
    q: QTable,
    traces: EligibilityTraces,
    policy: EpsilonGreedy,
    subscribers: Subscribers,
    rng: StdRng,
    episode: Option<Episode>,
    interrupt: Arc<AtomicBool>,
    total_steps: u64,
}

impl<E: Environment, R: RewardModel> Agent<E, R> {
    pub fn builder(environment: E, reward: R) -> AgentBuilder<E, R> {
        AgentBuilder::new(environment, reward)
    }

    pub fn environment(&self) -> &E {
        &self.environment
    }

    pub fn representation(&self) -> &StateRepresentation {
        &self.representation
    }

    pub fn q_function(&self) -> &QTable {
        &self.q
    }

    pub fn q_function_mut(&mut self) -> &mut QTable {
        &mut self.q
    }

    pub fn into_q_function(self) -> QTable {
        self.q
    }

    pub fn traces(&self) -> &EligibilityTraces {
        &self.traces
    }

    pub fn policy(&self) -> &EpsilonGreedy {
        &self.policy
    }

    pub fn learner_stats(&self) -> Option<&LearnerStats> {
        self.subscribers.learner().map(TdLearner::stats)
    }

    pub fn episode(&self) -> Option<&Episode> {
        self.episode.as_ref()
    }

    pub fn total_steps(&self) -> u64 {
        self.total_steps
    }

    /// Flag that stops `run_episode` before its next step
    pub fn interrupt_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.interrupt)
    }

    pub fn set_epsilon(&mut self, epsilon: f64) {
        self.policy.set_epsilon(epsilon);
    }

    pub fn set_learning_rate(&mut self, rate: f64) {
        self.q.set_learning_rate(rate);
    }

    /// Starts an episode on a randomly drawn instance
    pub fn start_new_episode(&mut self) -> Result<&State> {
        let state = self.environment.reset_state(&mut self.rng)?;
        Ok(self.begin(state))
    }

    /// Starts an episode on a given instance
    pub fn start_episode_at(&mut self, instance: usize) -> Result<&State> {
        let state = self.environment.reset_to(instance)?;
        Ok(self.begin(state))
    }

    fn begin(&mut self, state: State) -> &State {
        self.reward.reset();
        // Learner first: it clears the traces before observers see the start
        if let Some(learner) = self.subscribers.learner.as_mut() {
            learner.on_new_episode(&mut self.traces);
        }
        for observer in &mut self.subscribers.observers {
            observer.on_episode_start(&state);
        }
        self.episode.insert(Episode::new(state)).state()
    }

    /// Executes one step of the active episode
    pub fn step(&mut self) -> Result<StepResult> {
        let episode = self
            .episode
            .as_mut()
            .filter(|e| !e.finished)
            .ok_or_else(|| BoostError::domain("no active episode to step"))?;
        let old = episode.state().clone();

        let input = self.representation.observe(&old)?;
        let action = self.policy.select(&self.q, &input, &mut self.rng)?;
        self.policy.actions().ensure_contains(action)?;

        let new = self.environment.transition(&old, action)?;
        let terminal = self.environment.is_terminal(&new);
        let reward = self.reward.reward(&old, action, &new, terminal);
        let event = Transition {
            state: old,
            action,
            reward,
            next_state: new,
            terminal,
        };

        if let Some(learner) = self.subscribers.learner.as_mut() {
            learner.on_step(
                LearningContext {
                    q: &mut self.q,
                    traces: &mut self.traces,
                    representation: &self.representation,
                },
                &event,
            )?;
        }
        for observer in &mut self.subscribers.observers {
            observer.on_step(&event);
        }

        let finished = terminal || self.environment.is_reset_state(&event.next_state);
        episode.transitions.push(event);
        episode.finished = finished;
        self.total_steps += 1;

        Ok(StepResult {
            action,
            reward,
            terminal: finished,
        })
    }

    /// Runs the active episode (or a new one) until it ends, `max_steps`
    /// steps have been taken in it, or the interrupt flag is raised.
    pub fn run_episode(&mut self, max_steps: usize) -> Result<EpisodeOutcome> {
        if self.episode.as_ref().map_or(true, Episode::is_finished) {
            self.start_new_episode()?;
        }

        loop {
            let steps = self.episode.as_ref().map_or(0, Episode::steps);
            if self.interrupt.swap(false, Ordering::SeqCst) {
                info!(steps, "Episode interrupted");
                return Ok(EpisodeOutcome::Interrupted { steps });
            }
            if steps >= max_steps {
                if let Some(episode) = self.episode.as_mut() {
                    episode.finished = true;
                }
                return Ok(EpisodeOutcome::StepLimit { steps });
            }
            if self.step()?.terminal {
                return Ok(EpisodeOutcome::Terminal { steps: steps + 1 });
            }
        }
    }
}

impl<E, R> Agent<E, R>
where
    E: Environment + Clone,
    R: RewardModel + Clone,
{
    /// Greedy copy of this agent without a learner, for offline evaluation
    pub fn frozen_copy(&self) -> Agent<E, R> {
        Agent {
            environment: self.environment.clone(),
            reward: self.reward.clone(),
            representation: self.representation.clone(),
            q: self.q.clone(),
            traces: self.traces.clone(),
            policy: EpsilonGreedy::greedy(self.policy.actions().clone()),
            subscribers: Subscribers::default(),
            rng: StdRng::seed_from_u64(0),
            episode: None,
            interrupt: Arc::new(AtomicBool::new(false)),
            total_steps: 0,
        }
    }
}

pub struct AgentBuilder<E, R> {
    environment: E,
    reward: R,
    representation: Option<StateRepresentation>,
    q: Option<QTable>,
    policy: Option<EpsilonGreedy>,
    learning: Option<LearningConfig>,
    observers: Vec<Box<dyn StepObserver>>,
    seed: Option<u64>,
    interrupt: Option<Arc<AtomicBool>>,
}

impl<E: Environment, R: RewardModel> AgentBuilder<E, R> {
    pub fn new(environment: E, reward: R) -> Self {
        Self {
            environment,
            reward,
            representation: None,
            q: None,
            policy: None,
            learning: None,
            observers: Vec::new(),
            seed: None,
            interrupt: None,
        }
    }

    pub fn representation(mut self, representation: StateRepresentation) -> Self {
        self.representation = Some(representation);
        self
    }

    pub fn q_function(mut self, q: QTable) -> Self {
        self.q = Some(q);
        self
    }

    pub fn policy(mut self, policy: EpsilonGreedy) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Attaches a TD(λ) learner configured from `config`
    pub fn learner(mut self, config: LearningConfig) -> Self {
        self.learning = Some(config);
        self
    }

    pub fn observer(mut self, observer: impl StepObserver + 'static) -> Self {
        self.observers.push(Box::new(observer));
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Shares an existing interrupt flag instead of creating one
    pub fn interrupt_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = Some(flag);
        self
    }

    pub fn build(self) -> Result<Agent<E, R>> {
        let policy = self
            .policy
            .ok_or_else(|| BoostError::config("agent has no policy configured"))?;
        let representation = self
            .representation
            .ok_or_else(|| BoostError::config("agent has no state representation configured"))?;
        let q = self
            .q
            .ok_or_else(|| BoostError::config("agent has no Q-function configured"))?;
        q.check_compatible(&representation)?;
        policy.actions().validate()?;

        let (learner, traces) = match &self.learning {
            Some(config) => {
                config.actions.validate()?;
                (Some(TdLearner::new(config)), q.trace_engine(config))
            }
            None => (None, q.trace_engine(&LearningConfig::default())),
        };
        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        Ok(Agent {
            environment: self.environment,
            reward: self.reward,
            representation,
            q,
            traces,
            policy,
            subscribers: Subscribers {
                learner,
                observers: self.observers,
            },
            rng,
            episode: None,
            interrupt: self
                .interrupt
                .unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
            total_steps: 0,
        })
    }
}
