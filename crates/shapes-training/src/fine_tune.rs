//! Gradient-descent refinement of an evolved network.

use log::debug;
use rand::Rng;
use shapes_data::{Dataset, LabelSet};
use shapes_nn::Network;

use crate::{CancelToken, TrainingError};

/// Mini-batch stochastic gradient descent settings.
#[derive(Debug, Clone, PartialEq)]
pub struct FineTuner {
    /// Passes over the training set. Zero disables fine-tuning.
    pub epochs: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
}

impl Default for FineTuner {
    fn default() -> Self {
        Self {
            epochs: 0,
            batch_size: 10,
            learning_rate: 3.0,
        }
    }
}

/// Held-out metrics after a pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Validation {
    pub error: f32,
    pub accuracy: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PassReport {
    /// Zero-based index of the pass.
    pub pass: usize,
    pub training_error: f32,
    pub validation: Option<Validation>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum FineTuneStatus {
    Completed,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct FineTuneReport {
    pub network: Network,
    pub passes: Vec<PassReport>,
    pub status: FineTuneStatus,
}

impl FineTuner {
    /// Trains `network` for up to `epochs` passes over `training`.
    ///
    /// Every pass shuffles the training set, applies one gradient step per
    /// mini-batch and then measures the training error, plus the validation
    /// metrics when a non-empty `test` set is given. `cancel` is checked before
    /// each pass; on cancellation the network trained so far is returned.
    #[expect(clippy::too_many_arguments)]
    pub fn run<R, F>(
        &self,
        network: Network,
        training: &Dataset,
        labels: &LabelSet,
        test: Option<&Dataset>,
        cancel: &CancelToken,
        rng: &mut R,
        mut on_pass: F,
    ) -> Result<FineTuneReport, TrainingError>
    where
        R: Rng + ?Sized,
        F: FnMut(&PassReport),
    {
        let mut report = FineTuneReport {
            network,
            passes: Vec::with_capacity(self.epochs),
            status: FineTuneStatus::Completed,
        };
        if self.epochs == 0 {
            return Ok(report);
        }
        if self.batch_size == 0 {
            return Err(TrainingError::InvalidBatchSize);
        }

        let test = test.filter(|test| !test.is_empty());
        let mut shuffled = training.clone();
        for pass in 0..self.epochs {
            if cancel.is_cancelled() {
                debug!("fine-tuning cancelled after {pass} passes");
                report.status = FineTuneStatus::Cancelled;
                break;
            }

            shuffled.shuffle(rng);
            for batch in shuffled.samples().chunks(self.batch_size) {
                report
                    .network
                    .gradient_step(batch, labels, self.learning_rate)?;
            }

            let training_error = report.network.score(training, labels)?;
            let validation = test
                .map(|test| {
                    Ok::<_, TrainingError>(Validation {
                        error: report.network.score(test, labels)?,
                        accuracy: report.network.validate(labels, test)?,
                    })
                })
                .transpose()?;
            let pass_report = PassReport {
                pass,
                training_error,
                validation,
            };
            debug!("fine-tuning pass {pass}: error {training_error}");
            on_pass(&pass_report);
            report.passes.push(pass_report);
        }
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use ndarray::array;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use shapes_data::Sample;
    use shapes_nn::Architecture;

    use super::*;

    fn dataset() -> Dataset {
        Dataset::new([
            Sample::new("rectangle", array![[1.0, 1.0], [1.0, 1.0]]),
            Sample::new("circle", array![[0.0, 1.0], [1.0, 0.0]]),
            Sample::new("triangle", array![[0.0, 0.0], [1.0, 1.0]]),
            Sample::new("rectangle", array![[0.9, 1.0], [1.0, 0.9]]),
            Sample::new("circle", array![[0.1, 0.9], [0.9, 0.1]]),
            Sample::new("triangle", array![[0.1, 0.0], [0.9, 1.0]]),
        ])
        .unwrap()
    }

    fn network(seed: u64) -> Network {
        let arch = Architecture::for_images(4, &[6], 3).unwrap();
        Network::random(arch, &mut Pcg64Mcg::seed_from_u64(seed))
    }

    #[test]
    fn test_zero_epochs_is_identity() {
        let network = network(1);
        let tuner = FineTuner {
            epochs: 0,
            batch_size: 0,
            ..FineTuner::default()
        };
        let mut calls = 0;
        let report = tuner
            .run(
                network.clone(),
                &dataset(),
                &LabelSet::shapes(),
                None,
                &CancelToken::new(),
                &mut Pcg64Mcg::seed_from_u64(1),
                |_| calls += 1,
            )
            .unwrap();
        assert_eq!(report.network, network);
        assert!(report.passes.is_empty());
        assert!(report.status.is_completed());
        assert_eq!(calls, 0);
    }

    #[test]
    fn test_passes_reduce_error() {
        let labels = LabelSet::shapes();
        let network = network(2);
        let before = network.score(&dataset(), &labels).unwrap();
        let tuner = FineTuner {
            epochs: 100,
            batch_size: 2,
            ..FineTuner::default()
        };
        let test = dataset();
        let report = tuner
            .run(
                network,
                &dataset(),
                &labels,
                Some(&test),
                &CancelToken::new(),
                &mut Pcg64Mcg::seed_from_u64(2),
                |_| {},
            )
            .unwrap();

        assert!(report.status.is_completed());
        assert_eq!(report.passes.len(), 100);
        let last = report.passes.last().unwrap();
        assert!(last.training_error < before, "{} >= {before}", last.training_error);
        let validation = last.validation.unwrap();
        assert!((validation.error - last.training_error).abs() < 1e-6);
        assert!((0.0..=1.0).contains(&validation.accuracy));
    }

    #[test]
    fn test_cancel_keeps_partial_training() {
        let labels = LabelSet::shapes();
        let network = network(3);
        let cancel = CancelToken::new();
        let tuner = FineTuner {
            epochs: 10,
            ..FineTuner::default()
        };
        let report = tuner
            .run(
                network.clone(),
                &dataset(),
                &labels,
                None,
                &cancel,
                &mut Pcg64Mcg::seed_from_u64(3),
                |report| {
                    if report.pass == 2 {
                        cancel.cancel();
                    }
                },
            )
            .unwrap();

        assert!(report.status.is_cancelled());
        assert_eq!(report.passes.len(), 3);
        assert_ne!(report.network, network);
        assert!(report.passes.iter().all(|pass| pass.validation.is_none()));
    }

    #[test]
    fn test_invalid_batch_size() {
        let tuner = FineTuner {
            epochs: 1,
            batch_size: 0,
            ..FineTuner::default()
        };
        let result = tuner.run(
            network(4),
            &dataset(),
            &LabelSet::shapes(),
            None,
            &CancelToken::new(),
            &mut Pcg64Mcg::seed_from_u64(4),
            |_| {},
        );
        assert!(matches!(result, Err(TrainingError::InvalidBatchSize)));
    }
}
