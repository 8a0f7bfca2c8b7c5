use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Normal, StandardNormal};
use serde::{Deserialize, Serialize};
use shapes_data::{Dataset, Image, LabelSet};

use crate::{
    ModelError,
    activation::sigmoid,
    architecture::Architecture,
    weights::{self, Crossover},
};

/// A fully connected feed-forward network with sigmoid activations.
///
/// `weights[i]` has shape `(sizes[i + 1], sizes[i])` and maps the activations of
/// layer `i` to the weighted sums of layer `i + 1`; `biases[i]` has length
/// `sizes[i + 1]`. Shapes are validated on construction and deserialization, so
/// a `Network` is always consistent with its [`Architecture`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "NetworkRepr", into = "NetworkRepr")]
pub struct Network {
    architecture: Architecture,
    pub(crate) weights: Vec<Array2<f32>>,
    pub(crate) biases: Vec<Array1<f32>>,
}

#[derive(Serialize, Deserialize)]
struct NetworkRepr {
    architecture: Architecture,
    weights: Vec<Array2<f32>>,
    biases: Vec<Array1<f32>>,
}

impl TryFrom<NetworkRepr> for Network {
    type Error = ModelError;

    fn try_from(repr: NetworkRepr) -> Result<Self, Self::Error> {
        Network::from_parts(repr.architecture, repr.weights, repr.biases)
    }
}

impl From<Network> for NetworkRepr {
    fn from(network: Network) -> Self {
        NetworkRepr {
            architecture: network.architecture,
            weights: network.weights,
            biases: network.biases,
        }
    }
}

/// Result of a forward pass.
#[derive(Debug, Clone)]
pub struct Forward {
    /// Per-layer activations; `activations[0]` is the flattened input.
    pub activations: Vec<Array1<f32>>,
    /// Per-layer pre-activations (`z = W·a + b`), one per weight layer.
    pub weighted_sums: Vec<Array1<f32>>,
}

impl Forward {
    /// The class-probability vector.
    #[must_use]
    pub fn output(&self) -> &Array1<f32> {
        &self.activations[self.activations.len() - 1]
    }

    /// Index of the largest output; the first one wins ties.
    #[must_use]
    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for (i, &v) in self.output().iter().enumerate() {
            if v > self.output()[best] {
                best = i;
            }
        }
        best
    }
}

impl Network {
    /// Creates a network with random parameters.
    ///
    /// Weights are drawn from `N(0, 1/sqrt(fan_in))` and biases from `N(0, 1)`,
    /// which keeps the initial weighted sums out of the flat tails of the sigmoid.
    pub fn random<R>(architecture: Architecture, rng: &mut R) -> Self
    where
        R: Rng + ?Sized,
    {
        let mut weights = Vec::with_capacity(architecture.layer_count());
        let mut biases = Vec::with_capacity(architecture.layer_count());
        for (n_in, n_out) in architecture.layer_dims() {
            #[expect(clippy::cast_precision_loss)]
            let scale = 1.0 / (n_in as f32).sqrt();
            weights.push(Array2::from_shape_simple_fn((n_out, n_in), || {
                rng.sample::<f32, _>(StandardNormal) * scale
            }));
            biases.push(Array1::from_shape_simple_fn(n_out, || {
                rng.sample::<f32, _>(StandardNormal)
            }));
        }
        Self {
            architecture,
            weights,
            biases,
        }
    }

    /// Assembles a network from explicit tensors, validating every shape.
    ///
    /// An architecture without any tensors is reported as
    /// [`ModelError::Uninitialized`].
    pub fn from_parts(
        architecture: Architecture,
        weights: Vec<Array2<f32>>,
        biases: Vec<Array1<f32>>,
    ) -> Result<Self, ModelError> {
        if weights.is_empty() && biases.is_empty() {
            return Err(ModelError::Uninitialized);
        }
        let expected = architecture.parameter_count();
        let got = weights.iter().map(Array2::len).sum::<usize>()
            + biases.iter().map(Array1::len).sum::<usize>();
        let shapes_match = weights.len() == architecture.layer_count()
            && biases.len() == architecture.layer_count()
            && architecture
                .layer_dims()
                .zip(weights.iter().zip(&biases))
                .all(|((n_in, n_out), (w, b))| w.dim() == (n_out, n_in) && b.len() == n_out);
        if !shapes_match {
            return Err(ModelError::ParameterCountMismatch { expected, got });
        }
        Ok(Self {
            architecture,
            weights,
            biases,
        })
    }

    /// Rebuilds a network from a flat parameter vector (see [`Network::parameters`]).
    pub fn from_parameters(architecture: Architecture, params: &[f32]) -> Result<Self, ModelError> {
        let expected = architecture.parameter_count();
        if params.len() != expected {
            return Err(ModelError::ParameterCountMismatch {
                expected,
                got: params.len(),
            });
        }
        let mut rest = params;
        let mut weights = Vec::with_capacity(architecture.layer_count());
        let mut biases = Vec::with_capacity(architecture.layer_count());
        for (n_in, n_out) in architecture.layer_dims() {
            let (w, tail) = rest.split_at(n_out * n_in);
            let (b, tail) = tail.split_at(n_out);
            weights.push(Array2::from_shape_fn((n_out, n_in), |(r, c)| w[r * n_in + c]));
            biases.push(Array1::from(b.to_vec()));
            rest = tail;
        }
        Ok(Self {
            architecture,
            weights,
            biases,
        })
    }

    #[must_use]
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    /// Flattens all parameters: for each layer, the weights row by row, then the biases.
    #[must_use]
    pub fn parameters(&self) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.architecture.parameter_count());
        for (w, b) in self.weights.iter().zip(&self.biases) {
            params.extend(w.iter().copied());
            params.extend(b.iter().copied());
        }
        params
    }

    fn parameters_mut(&mut self) -> impl Iterator<Item = &mut f32> {
        self.weights
            .iter_mut()
            .zip(&mut self.biases)
            .flat_map(|(w, b)| w.iter_mut().chain(b.iter_mut()))
    }

    /// Runs the network on an image.
    ///
    /// The image is flattened row-major and must have exactly as many pixels as
    /// the input layer.
    pub fn forward(&self, image: &Image) -> Result<Forward, ModelError> {
        let expected = self.architecture.input_len();
        if image.len() != expected {
            return Err(ModelError::ShapeMismatch {
                expected,
                got: image.len(),
            });
        }
        Ok(self.feed(image.iter().copied().collect()))
    }

    pub(crate) fn feed(&self, input: Array1<f32>) -> Forward {
        let mut activations = Vec::with_capacity(self.weights.len() + 1);
        let mut weighted_sums = Vec::with_capacity(self.weights.len());
        activations.push(input);
        for (w, b) in self.weights.iter().zip(&self.biases) {
            let z = w.dot(&activations[activations.len() - 1]) + b;
            activations.push(z.mapv(sigmoid));
            weighted_sums.push(z);
        }
        Forward {
            activations,
            weighted_sums,
        }
    }

    /// Mean squared error against one-hot targets, averaged over the dataset.
    ///
    /// This is the fitness used by the evolutionary search; lower is better.
    pub fn score(&self, dataset: &Dataset, labels: &LabelSet) -> Result<f32, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        self.check_labels(labels)?;

        let mut total = 0.0;
        for sample in dataset {
            let target = one_hot(labels, sample.label())?;
            let forward = self.forward(sample.image())?;
            total += (forward.output() - &target)
                .mapv(|d| d * d)
                .mean()
                .unwrap_or_default();
        }
        #[expect(clippy::cast_precision_loss)]
        let n = dataset.len() as f32;
        Ok(total / n)
    }

    /// Predicts the label of an image.
    pub fn predict<'l>(&self, image: &Image, labels: &'l LabelSet) -> Result<&'l str, ModelError> {
        self.check_labels(labels)?;
        let index = self.forward(image)?.argmax();
        labels.name(index).ok_or(ModelError::LabelCountMismatch {
            outputs: self.architecture.output_len(),
            labels: labels.len(),
        })
    }

    /// Fraction of samples whose prediction matches their label.
    pub fn validate(&self, labels: &LabelSet, dataset: &Dataset) -> Result<f32, ModelError> {
        if dataset.is_empty() {
            return Err(ModelError::EmptyDataset);
        }
        let mut correct = 0_usize;
        for sample in dataset {
            if self.predict(sample.image(), labels)? == sample.label() {
                correct += 1;
            }
        }
        #[expect(clippy::cast_precision_loss)]
        let accuracy = correct as f32 / dataset.len() as f32;
        Ok(accuracy)
    }

    /// Perturbs each parameter with probability `rate` by a sample of `N(0, sigma)`.
    pub fn mutate<R>(&mut self, rate: f32, sigma: f32, rng: &mut R) -> Result<(), ModelError>
    where
        R: Rng + ?Sized,
    {
        if !(0.0..=1.0).contains(&rate) {
            return Err(ModelError::InvalidMutation { rate, sigma });
        }
        let noise = Normal::new(0.0, sigma).map_err(|_| ModelError::InvalidMutation { rate, sigma })?;
        weights::mutate(self.parameters_mut(), noise, rate, rng);
        Ok(())
    }

    /// Produces a child from `self` and `other`; both parents are left untouched.
    pub fn crossover<R>(&self, other: &Network, op: Crossover, rng: &mut R) -> Result<Network, ModelError>
    where
        R: Rng + ?Sized,
    {
        if self.architecture != other.architecture {
            return Err(ModelError::ArchitectureMismatch {
                expected: self.architecture.clone(),
                got: other.architecture.clone(),
            });
        }
        if let Crossover::BlxAlpha { alpha } = op
            && (!alpha.is_finite() || alpha < 0.0)
        {
            return Err(ModelError::InvalidCrossover { alpha });
        }
        let child = weights::crossover(&self.parameters(), &other.parameters(), op, rng);
        Network::from_parameters(self.architecture.clone(), &child)
    }

    pub(crate) fn check_labels(&self, labels: &LabelSet) -> Result<(), ModelError> {
        let outputs = self.architecture.output_len();
        if outputs == labels.len() {
            Ok(())
        } else {
            Err(ModelError::LabelCountMismatch {
                outputs,
                labels: labels.len(),
            })
        }
    }
}

pub(crate) fn one_hot(labels: &LabelSet, label: &str) -> Result<Array1<f32>, ModelError> {
    labels.one_hot(label).ok_or_else(|| ModelError::UnknownLabel {
        label: label.to_owned(),
    })
}
