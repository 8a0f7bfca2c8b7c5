use std::slice;

use ndarray::Array2;
use rand::{Rng, seq::SliceRandom};

use crate::DataError;

/// A grayscale image, indexed `[row, column]`, intensities in `[0, 1]`.
pub type Image = Array2<f32>;

/// One labeled image.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    label: String,
    image: Image,
}

impl Sample {
    #[must_use]
    pub fn new<S>(label: S, image: Image) -> Self
    where
        S: Into<String>,
    {
        Self {
            label: label.into(),
            image,
        }
    }

    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[must_use]
    pub fn image(&self) -> &Image {
        &self.image
    }

    /// Returns `(height, width)` of the image.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.image.dim()
    }
}

/// An ordered collection of samples whose images all have the same shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    samples: Vec<Sample>,
    shape: Option<(usize, usize)>,
}

impl Dataset {
    /// Builds a dataset, checking that every image has the same non-empty shape.
    pub fn new<I>(samples: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = Sample>,
    {
        let mut dataset = Self::default();
        for sample in samples {
            dataset.push(sample)?;
        }
        Ok(dataset)
    }

    /// Appends a sample. The first sample fixes the image shape of the dataset.
    pub fn push(&mut self, sample: Sample) -> Result<(), DataError> {
        let got = sample.shape();
        match self.shape {
            Some(expected) if expected != got => {
                return Err(DataError::ShapeMismatch { expected, got });
            }
            Some(_) => {}
            None if got.0 == 0 || got.1 == 0 => {
                return Err(DataError::ShapeMismatch {
                    expected: (1, 1),
                    got,
                });
            }
            None => self.shape = Some(got),
        }
        self.samples.push(sample);
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    #[must_use]
    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn iter(&self) -> slice::Iter<'_, Sample> {
        self.samples.iter()
    }

    /// Shape shared by every image, `None` for an empty dataset.
    #[must_use]
    pub fn image_shape(&self) -> Option<(usize, usize)> {
        self.shape
    }

    /// Number of pixels per image, i.e. the input width of a network trained on it.
    #[must_use]
    pub fn input_len(&self) -> Option<usize> {
        self.shape.map(|(h, w)| h * w)
    }

    pub fn shuffle<R>(&mut self, rng: &mut R)
    where
        R: Rng + ?Sized,
    {
        self.samples.shuffle(rng);
    }
}

impl<'a> IntoIterator for &'a Dataset {
    type Item = &'a Sample;
    type IntoIter = slice::Iter<'a, Sample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

#[cfg(test)]
mod tests {
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;

    use super::*;

    fn sample(label: &str, shape: (usize, usize)) -> Sample {
        Sample::new(label, Image::zeros(shape))
    }

    #[test]
    fn test_first_sample_fixes_shape() {
        let mut dataset = Dataset::default();
        assert_eq!(dataset.image_shape(), None);
        dataset.push(sample("circle", (4, 5))).unwrap();
        assert_eq!(dataset.image_shape(), Some((4, 5)));
        assert_eq!(dataset.input_len(), Some(20));

        let err = dataset.push(sample("circle", (5, 4))).unwrap_err();
        assert!(matches!(
            err,
            DataError::ShapeMismatch {
                expected: (4, 5),
                got: (5, 4)
            }
        ));
        assert_eq!(dataset.len(), 1);
    }

    #[test]
    fn test_rejects_empty_images() {
        assert!(Dataset::new([sample("circle", (0, 4))]).is_err());
    }

    #[test]
    fn test_shuffle_keeps_samples() {
        let labels = ["a", "b", "c", "d", "e", "f", "g", "h"];
        let mut dataset = Dataset::new(labels.iter().map(|l| sample(l, (2, 2)))).unwrap();
        let mut rng = Pcg64Mcg::seed_from_u64(7);
        dataset.shuffle(&mut rng);

        let mut shuffled: Vec<_> = dataset.iter().map(Sample::label).collect();
        shuffled.sort_unstable();
        assert_eq!(shuffled, labels);
    }
}
