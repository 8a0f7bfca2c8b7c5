use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::DataError;

/// Names of the shapes the classifier is trained on, in output-neuron order.
pub const SHAPE_LABELS: [&str; 3] = ["rectangle", "circle", "triangle"];

/// Ordered set of class names.
///
/// The index of a name is the contract between the network output and the
/// label: target vectors are one-hot at that index and predictions are the
/// argmax of the output layer mapped back through [`LabelSet::name`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct LabelSet {
    names: Vec<String>,
}

impl LabelSet {
    /// Creates a label set, rejecting empty and duplicated names.
    pub fn new<I, S>(names: I) -> Result<Self, DataError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        if names.is_empty() {
            return Err(DataError::NoLabels);
        }
        for (i, name) in names.iter().enumerate() {
            if names[..i].contains(name) {
                return Err(DataError::DuplicateLabel {
                    label: name.clone(),
                });
            }
        }
        Ok(Self { names })
    }

    /// The `rectangle`, `circle`, `triangle` label set.
    #[must_use]
    pub fn shapes() -> Self {
        Self {
            names: SHAPE_LABELS.iter().map(|&s| s.to_owned()).collect(),
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.names.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.names
    }

    #[must_use]
    pub fn index_of(&self, label: &str) -> Option<usize> {
        self.names.iter().position(|n| n == label)
    }

    #[must_use]
    pub fn name(&self, index: usize) -> Option<&str> {
        self.names.get(index).map(String::as_str)
    }

    /// Returns the target vector for `label`: `1.0` at its index, `0.0` elsewhere.
    #[must_use]
    pub fn one_hot(&self, label: &str) -> Option<Array1<f32>> {
        let index = self.index_of(label)?;
        let mut target = Array1::zeros(self.names.len());
        target[index] = 1.0;
        Some(target)
    }
}

impl TryFrom<Vec<String>> for LabelSet {
    type Error = DataError;

    fn try_from(names: Vec<String>) -> Result<Self, Self::Error> {
        Self::new(names)
    }
}

impl From<LabelSet> for Vec<String> {
    fn from(labels: LabelSet) -> Self {
        labels.names
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shapes_order_defines_indices() {
        let labels = LabelSet::shapes();
        assert_eq!(labels.len(), 3);
        assert_eq!(labels.index_of("rectangle"), Some(0));
        assert_eq!(labels.index_of("triangle"), Some(2));
        assert_eq!(labels.name(1), Some("circle"));
        assert_eq!(labels.name(3), None);
        assert_eq!(labels.index_of("hexagon"), None);
    }

    #[test]
    fn test_one_hot() {
        let labels = LabelSet::shapes();
        let target = labels.one_hot("circle").unwrap();
        assert_eq!(target.to_vec(), vec![0.0, 1.0, 0.0]);
        assert!(labels.one_hot("square").is_none());
    }

    #[test]
    fn test_rejects_invalid_sets() {
        assert!(matches!(
            LabelSet::new(Vec::<String>::new()),
            Err(DataError::NoLabels)
        ));
        assert!(matches!(
            LabelSet::new(["a", "b", "a"]),
            Err(DataError::DuplicateLabel { label }) if label == "a"
        ));
    }

    #[test]
    fn test_serde_validates_on_deserialize() {
        let json = serde_json::to_string(&LabelSet::shapes()).unwrap();
        assert_eq!(json, r#"["rectangle","circle","triangle"]"#);
        let back: LabelSet = serde_json::from_str(&json).unwrap();
        assert_eq!(back, LabelSet::shapes());
        assert!(serde_json::from_str::<LabelSet>(r#"["x","x"]"#).is_err());
    }
}
