//! Labeled grayscale image data for the shape classifier.
//!
//! This crate owns everything the training pipeline knows about its inputs:
//!
//! - [`Sample`] - one `(label, image)` pair, the image being a height×width
//!   [`Image`] with intensities in `[0, 1]`
//! - [`Dataset`] - an ordered collection of samples sharing a single image shape
//! - [`LabelSet`] - the ordered class names; the position of a name is the index
//!   of its output neuron
//! - [`loader`] - reads a dataset from a directory tree (one subdirectory per label)
//!
//! # Example
//!
//! ```
//! use ndarray::Array2;
//! use shapes_data::{Dataset, LabelSet, Sample};
//!
//! let labels = LabelSet::shapes();
//! assert_eq!(labels.index_of("circle"), Some(1));
//!
//! let dataset = Dataset::new(vec![
//!     Sample::new("circle", Array2::zeros((4, 4))),
//!     Sample::new("triangle", Array2::ones((4, 4))),
//! ])
//! .unwrap();
//! assert_eq!(dataset.image_shape(), Some((4, 4)));
//! ```

use std::{io, path::PathBuf};

pub use self::{
    dataset::{Dataset, Image, Sample},
    label::LabelSet,
    loader::{LoadReport, load_dir, load_image},
};

pub mod dataset;
pub mod label;
pub mod loader;

/// Errors raised while building or loading datasets.
#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum DataError {
    #[display("failed to read dataset directory {}", path.display())]
    ReadDir { path: PathBuf, source: io::Error },
    #[display("failed to decode image {}", path.display())]
    Decode {
        path: PathBuf,
        source: image::ImageError,
    },
    #[display("image {} has no pixels", path.display())]
    EmptyImage { path: PathBuf },
    #[display("image shape {got:?} does not match dataset shape {expected:?}")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[display("label set must not be empty")]
    NoLabels,
    #[display("label '{label}' appears more than once")]
    DuplicateLabel { label: String },
}

/// A sample the loader could not use.
///
/// Load errors are never fatal: the loader logs them, skips the file and
/// reports them in [`LoadReport::skipped`].
#[derive(Debug, derive_more::Display, derive_more::Error)]
#[display("skipped {}: {source}", path.display())]
pub struct DataLoadError {
    pub path: PathBuf,
    pub source: DataError,
}
