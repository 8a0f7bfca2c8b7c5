use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Layer sizes of a fully connected network, input layer first.
///
/// An architecture always has an input and an output layer, and every layer has
/// at least one neuron.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<usize>", into = "Vec<usize>")]
pub struct Architecture {
    sizes: Vec<usize>,
}

impl Architecture {
    pub fn new(sizes: Vec<usize>) -> Result<Self, ModelError> {
        if sizes.len() < 2 || sizes.contains(&0) {
            return Err(ModelError::InvalidArchitecture { sizes });
        }
        Ok(Self { sizes })
    }

    /// Builds `[input_len, hidden..., outputs]`.
    pub fn for_images(input_len: usize, hidden: &[usize], outputs: usize) -> Result<Self, ModelError> {
        let mut sizes = Vec::with_capacity(hidden.len() + 2);
        sizes.push(input_len);
        sizes.extend_from_slice(hidden);
        sizes.push(outputs);
        Self::new(sizes)
    }

    #[must_use]
    pub fn sizes(&self) -> &[usize] {
        &self.sizes
    }

    #[must_use]
    pub fn input_len(&self) -> usize {
        self.sizes[0]
    }

    #[must_use]
    pub fn output_len(&self) -> usize {
        self.sizes[self.sizes.len() - 1]
    }

    /// Number of weight matrices, i.e. layers excluding the input.
    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.sizes.len() - 1
    }

    /// `(inputs, outputs)` of each weight layer in order.
    pub fn layer_dims(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.sizes.windows(2).map(|w| (w[0], w[1]))
    }

    /// Total number of weights and biases.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        self.layer_dims().map(|(n_in, n_out)| n_out * n_in + n_out).sum()
    }
}

impl fmt::Display for Architecture {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, size) in self.sizes.iter().enumerate() {
            if i > 0 {
                f.write_str("-")?;
            }
            write!(f, "{size}")?;
        }
        Ok(())
    }
}

impl TryFrom<Vec<usize>> for Architecture {
    type Error = ModelError;

    fn try_from(sizes: Vec<usize>) -> Result<Self, Self::Error> {
        Self::new(sizes)
    }
}

impl From<Architecture> for Vec<usize> {
    fn from(arch: Architecture) -> Self {
        arch.sizes
    }
}
