use std::path::Path;

use anyhow::Context;
use shapes_data::{Dataset, LabelSet, LoadReport};
use shapes_nn::{SavedModel, UnboundModel};

/// Read a labeled image dataset from a directory tree
///
/// Images that cannot be used are skipped; their count is reported on stderr.
///
/// # Errors
///
/// Returns error if the directory cannot be listed
pub fn read_dataset_dir<P>(data_kind: &str, path: P) -> anyhow::Result<Dataset>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let LoadReport { dataset, skipped } = shapes_data::load_dir(path)
        .with_context(|| format!("Failed to load {} data: {}", data_kind, path.display()))?;
    if !skipped.is_empty() {
        eprintln!(
            "Skipped {} unusable {} images in {}",
            skipped.len(),
            data_kind,
            path.display()
        );
    }
    Ok(dataset)
}

/// Read a trained classifier from a JSON model file
///
/// The model must predict the shape labels.
///
/// # Errors
///
/// Returns error if the file cannot be read, parsed or validated
pub fn read_model_file<P>(path: P) -> anyhow::Result<SavedModel>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    UnboundModel::new()
        .with_labels(LabelSet::shapes())
        .load(path)
        .with_context(|| format!("Failed to load model file: {}", path.display()))
}
