//! Integration tests for the training loop, checkpoints and search hooks.

use std::collections::BTreeMap;
use std::io;
use std::sync::{Arc, Mutex};

use smallvec::SmallVec;

use wager_sac::core::{
    BufferConfig, CheckpointError, EnvConfig, TrainError, TrainResult, TrainingConfig,
};
use wager_sac::env::{BettingEnv, MarketSeries, RewardStrategy, Side};
use wager_sac::nn::{
    ActionValues, Approximator, Evaluation, LinearActorCritic, Observation, OutputGradients,
    ParameterSnapshot, TargetValues, UniformPolicy,
};
use wager_sac::training::{
    evaluate_policy, promote_best, CheckpointId, CheckpointRecord, CheckpointStore,
    FileCheckpointStore, MemoryCheckpointStore, PruneDecision, RunOutcome, ScoreFloorPruner,
    StopSignal, Trainer, TrialReporter,
};

fn series(len: usize) -> MarketSeries {
    let features = (0..len).map(|i| vec![(i % 5) as f32 / 5.0]).collect();
    let outcomes = (0..len).map(|i| Side::from_is_high(i % 4 != 0)).collect();
    MarketSeries::new(features, outcomes).unwrap()
}

fn env_config() -> EnvConfig {
    EnvConfig::default().with_window_size(2)
}

fn config() -> TrainingConfig {
    TrainingConfig::default()
        .with_total_timesteps(1000)
        .with_learning_starts(10)
        .with_batch_size(4)
        .with_eval_freq(20)
        .with_buffer(BufferConfig::default().with_capacity(128))
        .with_env(env_config())
}

fn uniform_trainer(config: TrainingConfig) -> Trainer<UniformPolicy> {
    Trainer::new(
        config,
        UniformPolicy::new(5, 2),
        series(40),
        series(12),
        Box::new(MemoryCheckpointStore::new()),
    )
    .unwrap()
}

/// Holds until it has received `switch_after` updates, then bets high.
struct SwitchingPolicy {
    updates: u32,
    switch_after: u32,
}

impl SwitchingPolicy {
    const HOLD: usize = 0;
    const HIGH: usize = 3;

    fn probs(&self) -> ActionValues {
        let favoured = if self.updates >= self.switch_after {
            Self::HIGH
        } else {
            Self::HOLD
        };
        (0..5).map(|a| if a == favoured { 0.84 } else { 0.04 }).collect()
    }

    fn zeros(rows: usize) -> Vec<ActionValues> {
        vec![SmallVec::from_elem(0.0, 5); rows]
    }
}

impl Approximator for SwitchingPolicy {
    fn action_count(&self) -> usize {
        5
    }

    fn observation_len(&self) -> usize {
        2
    }

    fn policy(&self, _observation: &Observation) -> ActionValues {
        self.probs()
    }

    fn evaluate(&self, batch: &[&Observation]) -> Evaluation {
        let probs = self.probs();
        let log_probs: ActionValues = probs.iter().map(|p| p.ln()).collect();
        Evaluation {
            probs: vec![probs; batch.len()],
            log_probs: vec![log_probs; batch.len()],
            q1: Self::zeros(batch.len()),
            q2: Self::zeros(batch.len()),
        }
    }

    fn evaluate_target(&self, batch: &[&Observation]) -> TargetValues {
        TargetValues {
            q1: Self::zeros(batch.len()),
            q2: Self::zeros(batch.len()),
        }
    }

    fn apply_gradients(
        &mut self,
        _batch: &[&Observation],
        _grads: &OutputGradients,
        _lr: f32,
        _clip: f32,
    ) {
        self.updates += 1;
    }

    fn soft_update(&mut self, _tau: f32) {}

    fn snapshot(&self) -> TrainResult<ParameterSnapshot> {
        Ok(ParameterSnapshot {
            kind: "switching".to_string(),
            blob: self.updates.to_le_bytes().to_vec(),
        })
    }

    fn restore(&mut self, _snapshot: &ParameterSnapshot) -> TrainResult<()> {
        Err(TrainError::precondition("switching policy cannot be restored"))
    }
}

/// Memory store whose first `save` fails.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryCheckpointStore,
    failures_left: u32,
}

impl CheckpointStore for FlakyStore {
    fn save(&mut self, record: &CheckpointRecord) -> Result<(), CheckpointError> {
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(io::Error::new(io::ErrorKind::Other, "disk full").into());
        }
        self.inner.save(record)
    }

    fn load(&self, id: &CheckpointId) -> Result<CheckpointRecord, CheckpointError> {
        self.inner.load(id)
    }

    fn list(&self) -> Result<Vec<CheckpointId>, CheckpointError> {
        self.inner.list()
    }

    fn best(&self) -> Result<Option<CheckpointId>, CheckpointError> {
        self.inner.best()
    }

    fn set_best(&mut self, id: &CheckpointId) -> Result<(), CheckpointError> {
        self.inner.set_best(id)
    }
}

/// Forwards to an inner reporter and records every call.
struct RecordingReporter<R> {
    inner: R,
    reports: Arc<Mutex<Vec<(u64, f64)>>>,
    finished: Arc<Mutex<Option<RunOutcome>>>,
}

impl<R: TrialReporter> TrialReporter for RecordingReporter<R> {
    fn report(&mut self, step: u64, score: f64) -> PruneDecision {
        self.reports.lock().unwrap().push((step, score));
        self.inner.report(step, score)
    }

    fn finish(&mut self, outcome: &RunOutcome) {
        *self.finished.lock().unwrap() = Some(outcome.clone());
    }
}

/// Requests a stop from inside the first report.
struct StopOnReport(StopSignal);

impl TrialReporter for StopOnReport {
    fn report(&mut self, _step: u64, _score: f64) -> PruneDecision {
        self.0.stop();
        PruneDecision::Continue
    }
}

// =============================================================================
// Early Stopping
// =============================================================================

#[test]
fn test_early_stopping_after_patience() {
    // The uniform policy always holds, so every score is 0 and only the
    // first evaluation improves.
    let mut trainer = uniform_trainer(config().with_patience(3));
    let outcome = trainer.run().unwrap();

    assert_eq!(
        outcome,
        RunOutcome::EarlyStopped {
            steps: 80,
            best_score: Some(0.0)
        }
    );
    assert_eq!(trainer.stats().evaluations, 4);
    assert_eq!(trainer.stats().checkpoints_written, 1);
    assert_eq!(trainer.store().list().unwrap().len(), 1);
}

#[test]
fn test_zero_patience_runs_to_completion() {
    let mut trainer = uniform_trainer(config().with_total_timesteps(100).with_patience(0));
    let outcome = trainer.run().unwrap();
    assert!(matches!(outcome, RunOutcome::Completed { steps: 100, .. }));
    assert_eq!(trainer.stats().evaluations, 5);
}

#[test]
fn test_improvement_threshold() {
    let config = config()
        .with_total_timesteps(40)
        .with_patience(0)
        .with_learning_starts(0)
        .with_improvement_threshold(10.0);
    let mut trainer = Trainer::new(
        config,
        SwitchingPolicy {
            updates: 0,
            switch_after: 25,
        },
        series(40),
        series(12),
        Box::new(MemoryCheckpointStore::new()),
    )
    .unwrap();

    trainer.run().unwrap();
    // The second score is positive but below the margin.
    assert_eq!(trainer.stats().evaluations, 2);
    assert_eq!(trainer.best_score(), Some(0.0));
    assert_eq!(trainer.stats().checkpoints_written, 1);
}

// =============================================================================
// Checkpoints
// =============================================================================

#[test]
fn test_reloaded_checkpoint_reproduces_its_score() {
    let dir = tempfile::tempdir().unwrap();
    let config = config()
        .with_run_id("reload")
        .with_total_timesteps(200)
        .with_eval_freq(50)
        .with_patience(0)
        .with_env(env_config().with_reward(RewardStrategy::Shaped {
            loss_penalty_multiplier: 1.5,
            win_bonus: 0.0,
            abstain_penalty: 0.0,
        }));
    let mut trainer = Trainer::new(
        config.clone(),
        LinearActorCritic::new(2, 5, 1),
        series(60),
        series(16),
        Box::new(FileCheckpointStore::new(dir.path()).unwrap()),
    )
    .unwrap();

    trainer.run().unwrap();
    let id = trainer.last_checkpoint().cloned().unwrap();
    let record = trainer.store().load(&id).unwrap();
    assert_eq!(record.metadata.run_id, "reload");
    assert_eq!(Some(record.metadata.score), trainer.best_score());

    let mut restored = LinearActorCritic::new(2, 5, 999);
    restored.restore(&record.parameters).unwrap();
    let mut validation = BettingEnv::new(series(16), &config.env).unwrap();

    let first = evaluate_policy(&restored, &mut validation).unwrap();
    let second = evaluate_policy(&restored, &mut validation).unwrap();
    assert_eq!(first.score, record.metadata.score);
    assert_eq!(first, second);

    // Improvements only ever raise the score, so the last write is the best.
    let mut reopened = FileCheckpointStore::new(dir.path()).unwrap();
    assert_eq!(promote_best(&mut reopened).unwrap(), Some(id.clone()));
    assert_eq!(reopened.best().unwrap(), Some(id));
}

#[test]
fn test_failed_checkpoint_write_is_retried_on_next_improvement() {
    let config = config().with_total_timesteps(40).with_patience(0);
    let store = FlakyStore {
        failures_left: 1,
        ..FlakyStore::default()
    };
    let mut trainer = Trainer::new(
        config,
        SwitchingPolicy {
            updates: 0,
            switch_after: 25,
        },
        series(40),
        series(12),
        Box::new(store),
    )
    .unwrap();

    let outcome = trainer.run().unwrap();

    assert!(matches!(outcome, RunOutcome::Completed { steps: 40, .. }));
    assert_eq!(trainer.stats().checkpoints_failed, 1);
    assert_eq!(trainer.stats().checkpoints_written, 1);

    let best = trainer.best_score().unwrap();
    assert!(best > 0.0);
    let ids = trainer.store().list().unwrap();
    assert_eq!(ids.len(), 1);
    assert_eq!(trainer.last_checkpoint(), Some(&ids[0]));
    assert_eq!(trainer.store().load(&ids[0]).unwrap().metadata.score, best);
}

// =============================================================================
// Search Hooks
// =============================================================================

#[test]
fn test_pruned_trial_reports_and_finishes() {
    let reports = Arc::new(Mutex::new(Vec::new()));
    let finished = Arc::new(Mutex::new(None));
    let reporter = RecordingReporter {
        inner: ScoreFloorPruner::new(0.5, 0),
        reports: Arc::clone(&reports),
        finished: Arc::clone(&finished),
    };

    let mut trainer = uniform_trainer(config()).with_reporter(Box::new(reporter));
    let outcome = trainer.run().unwrap();

    let expected = RunOutcome::Pruned {
        steps: 20,
        best_score: Some(0.0),
    };
    assert_eq!(outcome, expected);
    assert!(outcome.is_pruned());
    assert_eq!(*reports.lock().unwrap(), vec![(20, 0.0)]);
    assert_eq!(*finished.lock().unwrap(), Some(expected));
    // The improving evaluation still wrote its checkpoint before pruning.
    assert_eq!(trainer.stats().checkpoints_written, 1);
}

#[test]
fn test_cancellation_between_steps() {
    let signal = StopSignal::new();
    let mut trainer = uniform_trainer(config().with_patience(0))
        .with_stop_signal(signal.clone())
        .with_reporter(Box::new(StopOnReport(signal)));

    let outcome = trainer.run().unwrap();

    assert_eq!(
        outcome,
        RunOutcome::Cancelled {
            steps: 20,
            best_score: Some(0.0)
        }
    );
    assert_eq!(trainer.global_step(), 20);
    assert_eq!(trainer.buffer().len(), 20);
}

#[test]
fn test_overrides_drive_the_run() {
    let mut config = config().with_patience(0);
    let mut overrides = BTreeMap::new();
    overrides.insert("total_timesteps".to_string(), 30.0);
    overrides.insert("batch_size".to_string(), 8.0);
    overrides.insert("learning_starts".to_string(), 8.0);
    config.apply_overrides(&overrides).unwrap();

    let mut trainer = uniform_trainer(config);
    let outcome = trainer.run().unwrap();

    assert_eq!(outcome.steps(), 30);
    // Passes run from step 8 onward.
    assert_eq!(trainer.stats().updates, 22);
    assert!((trainer.stats().updates_per_step() - 22.0 / 30.0).abs() < 1e-12);
    assert_eq!(trainer.config().hyperparameters()["batch_size"], 8.0);
}

#[test]
fn test_evaluate_only_is_side_effect_free() {
    let mut trainer = Trainer::new(
        config(),
        LinearActorCritic::new(2, 5, 3),
        series(40),
        series(12),
        Box::new(MemoryCheckpointStore::new()),
    )
    .unwrap();
    for _ in 0..15 {
        trainer.train_step().unwrap();
    }

    let buffered = trainer.buffer().len();
    let first = trainer.evaluate_only().unwrap();
    let second = trainer.evaluate_only().unwrap();
    assert_eq!(first, second);
    assert_eq!(trainer.buffer().len(), buffered);
    assert_eq!(trainer.global_step(), 15);
}
