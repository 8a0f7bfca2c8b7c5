//! Mini-batch gradient descent on the quadratic cost.

use ndarray::{Array1, Array2, Axis};
use shapes_data::{LabelSet, Sample};

use crate::{
    ModelError,
    activation::sigmoid_prime,
    network::{Network, one_hot},
};

/// Accumulated gradient of the cost with respect to every weight and bias.
struct Gradient {
    weights: Vec<Array2<f32>>,
    biases: Vec<Array1<f32>>,
}

impl Gradient {
    fn zeros_like(network: &Network) -> Self {
        Self {
            weights: network.weights.iter().map(|w| Array2::zeros(w.dim())).collect(),
            biases: network.biases.iter().map(|b| Array1::zeros(b.len())).collect(),
        }
    }
}

impl Network {
    /// Applies one gradient-descent update averaged over `batch`.
    ///
    /// The gradient is that of `½‖a - y‖²` per sample, where `y` is the one-hot
    /// target of the sample label. Every sample is checked before any parameter
    /// changes, so a failing batch leaves the network untouched.
    pub fn gradient_step(
        &mut self,
        batch: &[Sample],
        labels: &LabelSet,
        learning_rate: f32,
    ) -> Result<(), ModelError> {
        if batch.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        self.check_labels(labels)?;

        let mut gradient = Gradient::zeros_like(self);
        for sample in batch {
            let target = one_hot(labels, sample.label())?;
            self.backprop(sample, &target, &mut gradient)?;
        }

        #[expect(clippy::cast_precision_loss)]
        let step = learning_rate / batch.len() as f32;
        for (w, gw) in self.weights.iter_mut().zip(&gradient.weights) {
            w.scaled_add(-step, gw);
        }
        for (b, gb) in self.biases.iter_mut().zip(&gradient.biases) {
            b.scaled_add(-step, gb);
        }
        Ok(())
    }

    /// Adds the gradient for one sample into `gradient`.
    fn backprop(
        &self,
        sample: &Sample,
        target: &Array1<f32>,
        gradient: &mut Gradient,
    ) -> Result<(), ModelError> {
        let forward = self.forward(sample.image())?;
        let layers = self.weights.len();

        let mut delta =
            (forward.output() - target) * forward.weighted_sums[layers - 1].mapv(sigmoid_prime);
        for l in (0..layers).rev() {
            if l + 1 < layers {
                delta = self.weights[l + 1].t().dot(&delta) * forward.weighted_sums[l].mapv(sigmoid_prime);
            }
            let input = &forward.activations[l];
            gradient.weights[l] += &outer(&delta, input);
            gradient.biases[l] += &delta;
        }
        Ok(())
    }
}

fn outer(column: &Array1<f32>, row: &Array1<f32>) -> Array2<f32> {
    column
        .view()
        .insert_axis(Axis(1))
        .dot(&row.view().insert_axis(Axis(0)))
}
