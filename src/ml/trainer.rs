// ============================================================
// Layer 5 — Training Loop
// ============================================================
// The epoch loop, independent of Burn. It drives a StepExecutor
// over two BatchSources and hands every epoch's numbers to an
// EpochReporter.
//
// Per epoch, in order:
//   1. training phase    — train_step on every batch at the
//                          epoch's learning rate
//   2. validation phase  — valid_step on every batch
//   3. report            — exactly one EpochMetrics per epoch
//   4. checkpoint        — only on a strictly higher val accuracy
//                          (initial best is 0.0, ties do not count)
//   5. scheduler step    — once per epoch
//
// Errors from the executor, the sources or the reporter abort
// the run; there is no batch-level retry.
//
// Reference: Burn Book §5 (Custom Training Loop)

use anyhow::Result;
use std::time::Instant;

use crate::domain::{
    metrics::{CheckpointMeta, EpochMetrics, MetricsAccumulator, TrainingHistory},
    traits::{BatchSource, EpochReporter, StepExecutor},
};
use crate::ml::scheduler::WarmupCosineSchedule;

pub struct Trainer<E, R> {
    executor:      E,
    reporter:      R,
    schedule:      WarmupCosineSchedule,
    epochs:        usize,
    /// 1-based epoch the next `fit` starts at
    first_epoch:   usize,
    best_accuracy: f64,
}

impl<E, R> Trainer<E, R>
where
    E: StepExecutor,
    R: EpochReporter,
{
    pub fn new(executor: E, reporter: R, schedule: WarmupCosineSchedule, epochs: usize) -> Self {
        Self { executor, reporter, schedule, epochs, first_epoch: 1, best_accuracy: 0.0 }
    }

    /// Continue after the epoch recorded in `meta`: its accuracy
    /// becomes the bar to beat and the schedule moves one past it.
    pub fn resume_from(&mut self, meta: &CheckpointMeta) {
        self.best_accuracy = meta.val_accuracy;
        self.first_epoch   = meta.epoch + 1;
        self.schedule.restore(&meta.schedule);
        self.schedule.step();
    }

    pub fn best_accuracy(&self) -> f64 {
        self.best_accuracy
    }

    pub fn into_parts(self) -> (E, R) {
        (self.executor, self.reporter)
    }

    /// Run every epoch and return the per-epoch history.
    pub fn fit<T, V>(&mut self, train: &T, valid: &V) -> Result<TrainingHistory>
    where
        T: BatchSource<E::TrainBatch> + ?Sized,
        V: BatchSource<E::ValidBatch> + ?Sized,
    {
        let mut history = TrainingHistory::new();

        for epoch in self.first_epoch..=self.epochs {
            let metrics = self.run_epoch(epoch, train, valid)?;
            self.reporter.report(&metrics)?;

            if metrics.is_improvement(self.best_accuracy) {
                self.best_accuracy = metrics.val_accuracy;
                let meta = CheckpointMeta {
                    epoch,
                    val_accuracy: metrics.val_accuracy,
                    val_loss:     metrics.val_loss,
                    schedule:     self.schedule.state(),
                };
                self.executor.save_checkpoint(&meta)?;
                self.reporter.new_best(&meta)?;
            }

            self.schedule.step();
            history.push(metrics);
        }

        Ok(history)
    }

    fn run_epoch<T, V>(&mut self, epoch: usize, train: &T, valid: &V) -> Result<EpochMetrics>
    where
        T: BatchSource<E::TrainBatch> + ?Sized,
        V: BatchSource<E::ValidBatch> + ?Sized,
    {
        let started = Instant::now();
        let lr      = self.schedule.current_lr();

        // ── Training phase ────────────────────────────────────────────────────
        let mut train_acc = MetricsAccumulator::new();
        for batch in train.batches() {
            let report = self.executor.train_step(batch, lr)?;
            train_acc.update(report.stats);
            if !report.applied {
                train_acc.mark_skipped();
            }
        }

        // ── Validation phase ──────────────────────────────────────────────────
        let mut valid_acc = MetricsAccumulator::new();
        for batch in valid.batches() {
            valid_acc.update(self.executor.valid_step(batch)?);
        }

        Ok(EpochMetrics {
            epoch,
            train_loss:     train_acc.avg_loss(),
            train_accuracy: train_acc.accuracy(),
            val_loss:       valid_acc.avg_loss(),
            val_accuracy:   valid_acc.accuracy(),
            lr,
            loss_scale:     self.executor.loss_scale(),
            skipped_steps:  train_acc.skipped(),
            duration_secs:  started.elapsed().as_secs_f64(),
        })
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::metrics::{BatchStats, StepReport};
    use std::{cell::RefCell, rc::Rc};

    /// Executor that replays scripted validation accuracies.
    struct FakeExecutor {
        /// correct predictions out of 10 for each epoch's validation batch
        val_correct: Vec<usize>,
        epoch:       usize,
        lrs:         Vec<f64>,
        saved:       RefCell<Vec<usize>>,
        overflow_at: Option<usize>,
        steps:       usize,
    }

    impl FakeExecutor {
        fn new(val_correct: Vec<usize>) -> Self {
            Self { val_correct, epoch: 0, lrs: Vec::new(), saved: RefCell::default(), overflow_at: None, steps: 0 }
        }
    }

    impl StepExecutor for FakeExecutor {
        type TrainBatch = f64;
        type ValidBatch = ();

        fn train_step(&mut self, loss: f64, lr: f64) -> Result<StepReport> {
            self.lrs.push(lr);
            self.steps += 1;
            let applied = self.overflow_at != Some(self.steps);
            Ok(StepReport { stats: BatchStats { loss, correct: 1, total: 2 }, applied })
        }

        fn valid_step(&mut self, _batch: ()) -> Result<BatchStats> {
            let correct = self.val_correct[self.epoch];
            self.epoch += 1;
            Ok(BatchStats { loss: 1.0, correct, total: 10 })
        }

        fn loss_scale(&self) -> f64 {
            1.0
        }

        fn save_checkpoint(&self, meta: &CheckpointMeta) -> Result<()> {
            self.saved.borrow_mut().push(meta.epoch);
            Ok(())
        }
    }

    #[derive(Clone, Default)]
    struct Recorder {
        reports: Rc<RefCell<Vec<EpochMetrics>>>,
        bests:   Rc<RefCell<Vec<usize>>>,
    }

    impl EpochReporter for Recorder {
        fn report(&mut self, metrics: &EpochMetrics) -> Result<()> {
            self.reports.borrow_mut().push(metrics.clone());
            Ok(())
        }

        fn new_best(&mut self, meta: &CheckpointMeta) -> Result<()> {
            self.bests.borrow_mut().push(meta.epoch);
            Ok(())
        }
    }

    fn schedule(epochs: usize) -> WarmupCosineSchedule {
        WarmupCosineSchedule::new(0.0, 1.0, 0.0, 1, epochs, 1.0)
    }

    fn run(val_correct: Vec<usize>, train: Vec<f64>) -> (Recorder, FakeExecutor, TrainingHistory) {
        let epochs   = val_correct.len();
        let recorder = Recorder::default();
        let mut trainer = Trainer::new(
            FakeExecutor::new(val_correct),
            recorder.clone(),
            schedule(epochs),
            epochs,
        );
        let history = trainer.fit(&train, &vec![()]).unwrap();
        let (executor, _) = trainer.into_parts();
        (recorder, executor, history)
    }

    #[test]
    fn test_one_report_per_epoch() {
        let (recorder, _, history) = run(vec![1, 2, 3], vec![0.5]);
        assert_eq!(recorder.reports.borrow().len(), 3);
        assert_eq!(history.len(), 3);
        let epochs: Vec<usize> = history.epochs.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![1, 2, 3]);
    }

    #[test]
    fn test_checkpoint_only_on_strict_improvement() {
        // 0.3, 0.3 (tie), 0.2, 0.5, 0.0
        let (recorder, executor, history) = run(vec![3, 3, 2, 5, 0], vec![0.5]);
        assert_eq!(*executor.saved.borrow(), vec![1, 4]);
        assert_eq!(*recorder.bests.borrow(), vec![1, 4]);
        assert!((history.best_val_accuracy() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_zero_accuracy_never_checkpoints() {
        let (recorder, executor, _) = run(vec![0, 0], vec![0.5]);
        assert!(executor.saved.borrow().is_empty());
        assert!(recorder.bests.borrow().is_empty());
    }

    #[test]
    fn test_scheduler_advances_once_per_epoch() {
        // 3 batches per epoch; lr must be constant within an epoch
        let (_, executor, history) = run(vec![1, 1, 1], vec![0.1, 0.2, 0.3]);
        assert_eq!(executor.lrs.len(), 9);
        for (e, chunk) in executor.lrs.chunks(3).enumerate() {
            assert!(chunk.iter().all(|lr| *lr == chunk[0]));
            assert_eq!(history.epochs[e].lr, chunk[0]);
        }
        // warmup of 1 epoch from 0.0 to 1.0, then cosine to 0.0
        assert_eq!(executor.lrs[0], 0.0);
        assert_eq!(executor.lrs[3], 1.0);
        assert!(executor.lrs[6].abs() < 1e-12);
    }

    #[test]
    fn test_average_loss_and_accuracy() {
        let (_, _, history) = run(vec![4], vec![1.0, 2.0, 6.0]);
        let m = &history.epochs[0];
        assert!((m.train_loss - 3.0).abs() < 1e-12);
        assert!((m.train_accuracy - 0.5).abs() < 1e-12);
        assert!((m.val_accuracy - 0.4).abs() < 1e-12);
        assert_eq!(m.skipped_steps, 0);
    }

    #[test]
    fn test_skipped_steps_are_counted() {
        let recorder = Recorder::default();
        let mut executor = FakeExecutor::new(vec![1]);
        executor.overflow_at = Some(2);
        let mut trainer = Trainer::new(executor, recorder, schedule(1), 1);
        let history = trainer.fit(&vec![0.1, 0.2, 0.3], &vec![()]).unwrap();
        assert_eq!(history.epochs[0].skipped_steps, 1);
    }

    #[test]
    fn test_resume_continues_after_saved_epoch() {
        let recorder = Recorder::default();
        // epochs 3..=5 remain; 0.2 does not beat the restored 0.4
        let mut trainer = Trainer::new(FakeExecutor::new(vec![2, 5, 1]), recorder.clone(), schedule(5), 5);
        let sched = schedule(5);
        let mut at_two = sched.clone();
        at_two.step();
        trainer.resume_from(&CheckpointMeta {
            epoch:        2,
            val_accuracy: 0.4,
            val_loss:     1.0,
            schedule:     at_two.state(),
        });

        let history = trainer.fit(&vec![0.5], &vec![()]).unwrap();
        let epochs: Vec<usize> = history.epochs.iter().map(|m| m.epoch).collect();
        assert_eq!(epochs, vec![3, 4, 5]);
        assert_eq!(*recorder.bests.borrow(), vec![4]);
        assert!((trainer.best_accuracy() - 0.5).abs() < 1e-12);

        let (executor, _) = trainer.into_parts();
        assert_eq!(executor.lrs, vec![sched.lr_at(2), sched.lr_at(3), sched.lr_at(4)]);
    }

    #[test]
    fn test_empty_validation_split_gives_zero_accuracy() {
        let recorder = Recorder::default();
        let mut trainer = Trainer::new(FakeExecutor::new(vec![]), recorder.clone(), schedule(2), 2);
        let valid: Vec<()> = Vec::new();
        let history = trainer.fit(&vec![0.5], &valid).unwrap();
        assert_eq!(history.epochs[1].val_accuracy, 0.0);
        assert!(recorder.bests.borrow().is_empty());
    }
}
