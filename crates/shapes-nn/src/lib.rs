//! The trainable model of the shape classifier.
//!
//! A [`Network`] is a fully connected feed-forward network with a sigmoid on every
//! layer. It supports the two kinds of optimization used during training:
//!
//! - **Neuroevolution** - [`Network::mutate`] and [`Network::crossover`] treat the
//!   flattened weights and biases as a genome (see [`weights`])
//! - **Gradient descent** - [`Network::gradient_step`] applies one mini-batch
//!   backpropagation update against the quadratic cost
//!
//! Trained networks are persisted as a [`SavedModel`] JSON document. Reading one
//! back is a two-stage affair: an [`UnboundModel`] describes what is expected and
//! only [`UnboundModel::load`] produces a validated, usable model.
//!
//! # Example
//!
//! ```
//! use rand::SeedableRng;
//! use rand_pcg::Pcg64Mcg;
//! use shapes_data::{Image, LabelSet};
//! use shapes_nn::{Architecture, Network};
//!
//! let labels = LabelSet::shapes();
//! let arch = Architecture::for_images(16, &[10, 4], labels.len()).unwrap();
//! let mut rng = Pcg64Mcg::seed_from_u64(1);
//! let network = Network::random(arch, &mut rng);
//!
//! let label = network.predict(&Image::zeros((4, 4)), &labels).unwrap();
//! assert!(labels.index_of(label).is_some());
//! ```

pub use self::{
    architecture::Architecture,
    network::{Forward, Network},
    persist::{PersistError, SavedModel, TrainingSummary, UnboundModel},
};

mod activation;
pub mod architecture;
mod backprop;
pub mod network;
pub mod persist;
pub mod weights;

/// Errors raised by model operations.
#[derive(Debug, Clone, PartialEq, derive_more::Display, derive_more::Error)]
pub enum ModelError {
    #[display("input has {got} values, network expects {expected}")]
    ShapeMismatch { expected: usize, got: usize },
    #[display("dataset is empty")]
    EmptyDataset,
    #[display("label '{label}' is not in the label set")]
    UnknownLabel { label: String },
    #[display("network has {outputs} outputs but the label set has {labels} labels")]
    LabelCountMismatch { outputs: usize, labels: usize },
    #[display("model labels {got:?} differ from expected {expected:?}")]
    LabelMismatch {
        expected: Vec<String>,
        got: Vec<String>,
    },
    #[display("architecture mismatch: expected {expected}, got {got}")]
    ArchitectureMismatch {
        expected: Architecture,
        got: Architecture,
    },
    #[display("invalid layer sizes {sizes:?}: need at least two non-zero layers")]
    InvalidArchitecture { sizes: Vec<usize> },
    #[display("network has {expected} parameters, got {got}")]
    ParameterCountMismatch { expected: usize, got: usize },
    #[display("model has no weights; load it before use")]
    Uninitialized,
    #[display("invalid mutation parameters: rate {rate} must be in [0, 1], sigma {sigma} must be >= 0")]
    InvalidMutation { rate: f32, sigma: f32 },
    #[display("invalid crossover parameter: alpha {alpha} must be finite and >= 0")]
    InvalidCrossover { alpha: f32 },
}
