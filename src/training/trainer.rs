//! Discrete SAC training loop.
//!
//! ## Per-step protocol
//!
//! 1. Check the [`StopSignal`].
//! 2. Act: uniformly at random before `learning_starts`, from the policy after.
//! 3. Step the training environment; reset it when the episode ends.
//! 4. Push the transition with its initial TD-error.
//! 5. Optimise once the buffer holds a batch and warm-up is over.
//! 6. Every `eval_freq` steps, run a greedy validation episode, checkpoint on
//!    improvement, and apply early stopping and pruning.
//!
//! Execution is single-threaded; parallelism belongs across independent
//! trainers, each owning its own buffer, environments and approximator.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::core::{TrainError, TrainResult, TrainRng, TrainingConfig};
use crate::env::{BettingEnv, MarketSeries};
use crate::nn::{Approximator, Observation};
use crate::replay::{PriorityBuffer, Transition};

use super::checkpoint::{CheckpointId, CheckpointRecord, CheckpointStore};
use super::evaluation::{check_compatible, evaluate_policy, EvaluationReport};
use super::sac::{OptimizationReport, SacLearner};
use super::search::{PruneDecision, TrialReporter};
use super::stats::TrainingStats;

/// Cooperative cancellation flag, shareable across threads.
#[derive(Clone, Debug, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    /// Create an untriggered signal.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the run to stop before its next step.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }

    /// Whether a stop has been requested.
    #[must_use]
    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// How a run ended. None of these are errors.
#[derive(Clone, Debug, PartialEq)]
pub enum RunOutcome {
    /// Reached `total_timesteps`.
    Completed {
        /// Environment steps taken.
        steps: u64,
        /// Best validation score seen.
        best_score: Option<f64>,
    },
    /// Validation stopped improving for `early_stopping_patience` evaluations.
    EarlyStopped {
        /// Environment steps taken.
        steps: u64,
        /// Best validation score seen.
        best_score: Option<f64>,
    },
    /// The stop signal fired.
    Cancelled {
        /// Environment steps taken.
        steps: u64,
        /// Best validation score seen.
        best_score: Option<f64>,
    },
    /// The trial reporter asked to prune.
    Pruned {
        /// Environment steps taken.
        steps: u64,
        /// Best validation score seen.
        best_score: Option<f64>,
    },
}

impl RunOutcome {
    /// Environment steps taken.
    #[must_use]
    pub fn steps(&self) -> u64 {
        match *self {
            RunOutcome::Completed { steps, .. }
            | RunOutcome::EarlyStopped { steps, .. }
            | RunOutcome::Cancelled { steps, .. }
            | RunOutcome::Pruned { steps, .. } => steps,
        }
    }

    /// Best validation score seen.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        match *self {
            RunOutcome::Completed { best_score, .. }
            | RunOutcome::EarlyStopped { best_score, .. }
            | RunOutcome::Cancelled { best_score, .. }
            | RunOutcome::Pruned { best_score, .. } => best_score,
        }
    }

    /// Whether the run was pruned.
    #[must_use]
    pub fn is_pruned(&self) -> bool {
        matches!(self, RunOutcome::Pruned { .. })
    }
}

/// Owns every component of one training run.
pub struct Trainer<A: Approximator> {
    config: TrainingConfig,
    approx: A,
    learner: SacLearner,
    buffer: PriorityBuffer,
    train_env: BettingEnv,
    validation_env: BettingEnv,
    store: Box<dyn CheckpointStore>,
    reporter: Option<Box<dyn TrialReporter>>,
    stop: StopSignal,
    explore_rng: TrainRng,
    replay_rng: TrainRng,
    observation: Observation,
    global_step: u64,
    best_score: Option<f64>,
    evals_without_improvement: u32,
    checkpoint_sequence: u32,
    last_checkpoint: Option<CheckpointId>,
    stats: TrainingStats,
}

impl<A: Approximator> Trainer<A> {
    /// Build a trainer. Validates the configuration, both series and the
    /// approximator's shapes before any step runs.
    pub fn new(
        config: TrainingConfig,
        approx: A,
        train: MarketSeries,
        validation: MarketSeries,
        store: Box<dyn CheckpointStore>,
    ) -> TrainResult<Self> {
        config.validate()?;
        let mut train_env = BettingEnv::new(train, &config.env)?;
        let validation_env = BettingEnv::new(validation, &config.env)?;
        check_compatible(&approx, &train_env)?;

        let learner = SacLearner::new(&config.sac, train_env.action_count())?;
        let buffer = PriorityBuffer::new(&config.buffer)?;
        let root = TrainRng::new(config.seed);
        let (observation, _) = train_env.reset();

        Ok(Self {
            explore_rng: root.for_context("explore"),
            replay_rng: root.for_context("replay"),
            config,
            approx,
            learner,
            buffer,
            train_env,
            validation_env,
            store,
            reporter: None,
            stop: StopSignal::new(),
            observation,
            global_step: 0,
            best_score: None,
            evals_without_improvement: 0,
            checkpoint_sequence: 0,
            last_checkpoint: None,
            stats: TrainingStats::new(),
        })
    }

    /// Attach a hyperparameter-search reporter.
    pub fn with_reporter(mut self, reporter: Box<dyn TrialReporter>) -> Self {
        self.reporter = Some(reporter);
        self
    }

    /// Use an externally owned stop signal.
    pub fn with_stop_signal(mut self, signal: StopSignal) -> Self {
        self.stop = signal;
        self
    }

    /// Handle for cancelling this run.
    #[must_use]
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// The approximator being trained.
    #[must_use]
    pub fn approximator(&self) -> &A {
        &self.approx
    }

    /// Mutable access, e.g. to restore a checkpoint.
    pub fn approximator_mut(&mut self) -> &mut A {
        &mut self.approx
    }

    /// Consume the trainer, returning the approximator.
    pub fn into_approximator(self) -> A {
        self.approx
    }

    /// Replay buffer.
    #[must_use]
    pub fn buffer(&self) -> &PriorityBuffer {
        &self.buffer
    }

    /// SAC learner state.
    #[must_use]
    pub fn learner(&self) -> &SacLearner {
        &self.learner
    }

    /// Checkpoint store.
    #[must_use]
    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Run statistics.
    #[must_use]
    pub fn stats(&self) -> &TrainingStats {
        &self.stats
    }

    /// Steps taken so far.
    #[must_use]
    pub fn global_step(&self) -> u64 {
        self.global_step
    }

    /// Best validation score so far.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.best_score
    }

    /// Id of the most recently written checkpoint.
    #[must_use]
    pub fn last_checkpoint(&self) -> Option<&CheckpointId> {
        self.last_checkpoint.as_ref()
    }

    /// Configuration of this run.
    #[must_use]
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Train until `total_timesteps`, cancellation, early stopping or pruning.
    ///
    /// # Errors
    ///
    /// Precondition and numerical failures end the run with an error.
    /// Checkpoint-write failures do not.
    pub fn run(&mut self) -> TrainResult<RunOutcome> {
        info!(
            run_id = %self.config.run_id,
            total_timesteps = self.config.total_timesteps,
            learning_starts = self.config.learning_starts,
            batch_size = self.config.batch_size,
            "training started"
        );
        let start = Instant::now();
        let result = self.run_loop();
        self.stats.time_us += start.elapsed().as_micros() as u64;

        match &result {
            Ok(outcome) => {
                info!(
                    outcome = ?outcome,
                    steps_per_second = self.stats.steps_per_second(),
                    updates_per_step = self.stats.updates_per_step(),
                    checkpoints = self.stats.checkpoints_written,
                    "training finished"
                );
                if let Some(reporter) = self.reporter.as_mut() {
                    reporter.finish(outcome);
                }
            }
            Err(err) => error!(error = %err, step = self.global_step, "training aborted"),
        }
        result
    }

    fn run_loop(&mut self) -> TrainResult<RunOutcome> {
        while self.global_step < self.config.total_timesteps {
            if self.stop.is_stopped() {
                warn!(step = self.global_step, "stop requested");
                return Ok(RunOutcome::Cancelled {
                    steps: self.global_step,
                    best_score: self.best_score,
                });
            }

            self.train_step()?;

            if self.global_step % self.config.eval_freq == 0 {
                if let Some(outcome) = self.periodic_evaluation()? {
                    return Ok(outcome);
                }
            }
        }
        Ok(RunOutcome::Completed {
            steps: self.global_step,
            best_score: self.best_score,
        })
    }

    /// Take one environment step, store it, and optimise if warmed up.
    ///
    /// Returns the optimisation report when a pass ran.
    pub fn train_step(&mut self) -> TrainResult<Option<OptimizationReport>> {
        let step = self.global_step;
        let action = if step < self.config.learning_starts {
            self.explore_rng.gen_range_usize(0..self.train_env.action_count())
        } else {
            self.approx.act(&self.observation, &mut self.explore_rng)?
        };

        let result = self.train_env.step(action)?;
        let done = result.done();
        let next_observation = if done {
            self.stats.episodes += 1;
            debug!(
                step,
                balance = result.info.balance,
                consistency = self.train_env.episode_consistency_score(),
                "training episode finished"
            );
            self.train_env.reset().0
        } else {
            result.observation.clone()
        };

        let transition = Transition {
            state: std::mem::replace(&mut self.observation, next_observation),
            action,
            reward: result.reward,
            next_state: result.observation,
            done,
        };
        let td_error = self.learner.initial_td_error(&self.approx, &transition)?;
        self.buffer.push(td_error, transition)?;

        self.global_step += 1;
        self.stats.steps += 1;

        if self.buffer.len() >= self.config.batch_size && step >= self.config.learning_starts {
            return self.optimize().map(Some);
        }
        Ok(None)
    }

    fn optimize(&mut self) -> TrainResult<OptimizationReport> {
        let batch = self.buffer.sample(self.config.batch_size, &mut self.replay_rng)?;
        let indices = batch.indices.clone();
        let report = self.learner.optimize(&mut self.approx, &batch)?;
        drop(batch);

        for (&index, &td_error) in indices.iter().zip(&report.td_errors) {
            self.buffer.update(index, td_error)?;
        }

        self.stats.updates += 1;
        self.stats.last_critic_loss = report.critic_loss;
        self.stats.last_actor_loss = report.actor_loss;
        self.stats.alpha = self.learner.alpha();
        Ok(report)
    }

    /// Greedy episode on the validation environment.
    ///
    /// Pushes nothing and updates nothing, so repeated calls on the same
    /// parameters return the same report.
    pub fn evaluate_only(&mut self) -> TrainResult<EvaluationReport> {
        let report = evaluate_policy(&self.approx, &mut self.validation_env)?;
        TrainError::check_finite("validation score", report.score)?;
        Ok(report)
    }

    fn periodic_evaluation(&mut self) -> TrainResult<Option<RunOutcome>> {
        let report = self.evaluate_only()?;
        let score = report.score;
        self.stats.evaluations += 1;
        self.stats.last_score = Some(score);

        let improved = self
            .best_score
            .map_or(true, |best| score > best + self.config.improvement_threshold);
        if improved {
            self.best_score = Some(score);
            self.stats.best_score = Some(score);
            self.evals_without_improvement = 0;
            self.write_checkpoint(score);
        } else {
            self.evals_without_improvement += 1;
        }

        info!(
            step = self.global_step,
            score,
            best = ?self.best_score,
            improved,
            profit = report.profit,
            bets = report.bets,
            "validation"
        );

        if let Some(reporter) = self.reporter.as_mut() {
            if reporter.report(self.global_step, score) == PruneDecision::Prune {
                info!(step = self.global_step, "trial pruned");
                return Ok(Some(RunOutcome::Pruned {
                    steps: self.global_step,
                    best_score: self.best_score,
                }));
            }
        }

        let patience = self.config.early_stopping_patience;
        if patience > 0 && self.evals_without_improvement >= patience {
            info!(step = self.global_step, patience, "early stopping");
            return Ok(Some(RunOutcome::EarlyStopped {
                steps: self.global_step,
                best_score: self.best_score,
            }));
        }
        Ok(None)
    }

    /// Persist a candidate. Failures are logged and counted; the next
    /// improvement writes a fresh record.
    fn write_checkpoint(&mut self, score: f64) {
        self.checkpoint_sequence += 1;
        let parameters = match self.approx.snapshot() {
            Ok(snapshot) => snapshot,
            Err(err) => {
                self.stats.checkpoints_failed += 1;
                error!(error = %err, step = self.global_step, "parameter snapshot failed");
                return;
            }
        };
        let record = CheckpointRecord::candidate(
            &self.config.run_id,
            self.checkpoint_sequence,
            self.global_step,
            score,
            self.learner.alpha(),
            self.config.hyperparameters(),
            parameters,
        );
        match self.store.save(&record) {
            Ok(()) => {
                self.stats.checkpoints_written += 1;
                info!(id = %record.id, score, "checkpoint written");
                self.last_checkpoint = Some(record.id);
            }
            Err(err) => {
                self.stats.checkpoints_failed += 1;
                error!(error = %err, id = %record.id, "checkpoint write failed");
            }
        }
    }
}
