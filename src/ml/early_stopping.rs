// ============================================================
// Layer 5 - Early Stopping and Learning-Rate Schedule
// ============================================================
// Both trackers watch the per-epoch validation accuracy and
// live only for the duration of one fold.
//
// EarlyStopping
//   - an epoch "improves" only if its accuracy is STRICTLY
//     greater than the best so far, so ties keep the earliest
//     epoch (first-best wins)
//   - after `patience` consecutive non-improving epochs, stop
//
// PlateauScheduler (ReduceLROnPlateau, mode = max)
//   - after more than `patience` non-improving epochs, multiply
//     the learning rate by `factor` and reset the counter
//   - purely a function of the accuracy sequence, hence
//     deterministic given the configuration

use serde::{Deserialize, Serialize};

/// The best epoch seen so far in one fold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BestEpoch {
    /// 1-based epoch number
    pub epoch: usize,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpochVerdict {
    /// New best: snapshot these weights
    Improved,
    /// No improvement, patience not yet exhausted
    Stalled,
    /// Patience exhausted: stop training this fold
    Stop,
}

#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: Option<BestEpoch>,
    stale_epochs: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: None,
            stale_epochs: 0,
        }
    }

    pub fn observe(&mut self, epoch: usize, accuracy: f64) -> EpochVerdict {
        let improved = self.best.map_or(true, |best| accuracy > best.accuracy);
        if improved {
            self.best = Some(BestEpoch { epoch, accuracy });
            self.stale_epochs = 0;
            return EpochVerdict::Improved;
        }

        self.stale_epochs += 1;
        if self.stale_epochs >= self.patience {
            EpochVerdict::Stop
        } else {
            EpochVerdict::Stalled
        }
    }

    pub fn best(&self) -> Option<BestEpoch> {
        self.best
    }
}

/// First-best reduction over a whole accuracy trajectory (epochs are 1-based).
pub fn best_epoch(trajectory: &[f64]) -> Option<BestEpoch> {
    trajectory
        .iter()
        .enumerate()
        .fold(None, |best: Option<BestEpoch>, (i, &accuracy)| match best {
            Some(b) if accuracy <= b.accuracy => Some(b),
            _ => Some(BestEpoch {
                epoch: i + 1,
                accuracy,
            }),
        })
}

#[derive(Debug, Clone)]
pub struct PlateauScheduler {
    lr: f64,
    factor: f64,
    patience: usize,
    best: Option<f64>,
    bad_epochs: usize,
}

impl PlateauScheduler {
    pub fn new(initial_lr: f64, factor: f64, patience: usize) -> Self {
        Self {
            lr: initial_lr,
            factor,
            patience,
            best: None,
            bad_epochs: 0,
        }
    }

    pub fn lr(&self) -> f64 {
        self.lr
    }

    /// Feed one epoch's validation accuracy; returns the rate for the next epoch.
    pub fn step(&mut self, accuracy: f64) -> f64 {
        if self.best.map_or(true, |best| accuracy > best) {
            self.best = Some(accuracy);
            self.bad_epochs = 0;
        } else {
            self.bad_epochs += 1;
        }

        if self.bad_epochs > self.patience {
            let reduced = self.lr * self.factor;
            tracing::debug!("Plateau: learning rate {:.2e} → {:.2e}", self.lr, reduced);
            self.lr = reduced;
            self.bad_epochs = 0;
        }
        self.lr
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ties_keep_first_best() {
        let mut es = EarlyStopping::new(5);
        assert_eq!(es.observe(1, 0.6), EpochVerdict::Improved);
        assert_eq!(es.observe(2, 0.8), EpochVerdict::Improved);
        assert_eq!(es.observe(3, 0.8), EpochVerdict::Stalled);
        assert_eq!(es.best(), Some(BestEpoch { epoch: 2, accuracy: 0.8 }));
    }

    #[test]
    fn test_stops_after_patience() {
        let mut es = EarlyStopping::new(2);
        es.observe(1, 0.9);
        assert_eq!(es.observe(2, 0.5), EpochVerdict::Stalled);
        assert_eq!(es.observe(3, 0.9), EpochVerdict::Stop);
    }

    #[test]
    fn test_improvement_resets_patience() {
        let mut es = EarlyStopping::new(2);
        es.observe(1, 0.5);
        es.observe(2, 0.4);
        assert_eq!(es.observe(3, 0.6), EpochVerdict::Improved);
        assert_eq!(es.observe(4, 0.6), EpochVerdict::Stalled);
    }

    #[test]
    fn test_zero_accuracy_first_epoch_still_counts() {
        let mut es = EarlyStopping::new(3);
        assert_eq!(es.observe(1, 0.0), EpochVerdict::Improved);
        assert_eq!(es.best().unwrap().epoch, 1);
    }

    #[test]
    fn test_best_epoch_never_below_observed_max() {
        let trajectories: [&[f64]; 4] = [
            &[0.5, 0.7, 0.7, 0.6],
            &[0.9, 0.1, 0.9],
            &[0.2],
            &[0.3, 0.4, 0.5, 0.5, 0.49],
        ];
        for t in trajectories {
            let best = best_epoch(t).unwrap();
            let max = t.iter().cloned().fold(f64::MIN, f64::max);
            assert_eq!(best.accuracy, max);
            let first = t.iter().position(|&a| a == max).unwrap() + 1;
            assert_eq!(best.epoch, first);
        }
        assert!(best_epoch(&[]).is_none());
    }

    #[test]
    fn test_incremental_and_reduction_agree() {
        let trajectory = [0.4, 0.55, 0.55, 0.7, 0.65, 0.7];
        let mut es = EarlyStopping::new(10);
        for (i, &acc) in trajectory.iter().enumerate() {
            es.observe(i + 1, acc);
        }
        assert_eq!(es.best(), best_epoch(&trajectory));
    }

    #[test]
    fn test_plateau_halves_after_patience() {
        let mut sched = PlateauScheduler::new(1e-3, 0.5, 3);
        sched.step(0.5);
        for _ in 0..3 {
            assert_eq!(sched.step(0.5), 1e-3);
        }
        assert_eq!(sched.step(0.5), 5e-4);
        // counter resets after a reduction
        assert_eq!(sched.step(0.4), 5e-4);
    }
}
