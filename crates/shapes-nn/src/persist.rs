//! Saving and loading trained models.
//!
//! A model file is a pretty-printed JSON [`SavedModel`]: the label set, the
//! architecture and every weight and bias tensor, plus when and how it was
//! trained. Files are written atomically: the document goes to a temporary file
//! next to the target which is then renamed over it, so a crash never leaves a
//! half-written model behind.
//!
//! Loading is two-stage. An [`UnboundModel`] holds no weights, only optional
//! expectations about the architecture and labels; [`UnboundModel::load`] reads
//! the file, validates it against those expectations and only then hands out a
//! usable [`SavedModel`].

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Write as _},
    path::{Path, PathBuf},
};

use chrono::{DateTime, Utc};
use log::debug;
use serde::{Deserialize, Serialize};
use shapes_data::{Dataset, Image, LabelSet};
use tempfile::NamedTempFile;

use crate::{Architecture, ModelError, Network};

/// Version of the model file layout written by this crate.
pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, derive_more::Display, derive_more::Error)]
pub enum PersistError {
    #[display("I/O error on model file {}", path.display())]
    Io { path: PathBuf, source: io::Error },
    #[display("malformed model file {}", path.display())]
    Json {
        path: PathBuf,
        source: serde_json::Error,
    },
    #[display(
        "model file {} has format version {found}, expected {}",
        path.display(),
        FORMAT_VERSION
    )]
    UnsupportedVersion { path: PathBuf, found: u32 },
    #[display("model file {} is not usable", path.display())]
    Invalid { path: PathBuf, source: ModelError },
}

/// How a saved model was produced.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingSummary {
    /// Completed generations of evolutionary search.
    pub generations: usize,
    /// Error of the fittest individual when the search ended.
    pub search_error: Option<f32>,
    /// Completed fine-tuning passes.
    pub fine_tune_passes: usize,
    /// Training error after the last fine-tuning pass.
    pub fine_tune_error: Option<f32>,
    /// Whether training was cut short by an interrupt.
    pub interrupted: bool,
}

/// A trained network together with the labels it predicts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SavedModel {
    pub format_version: u32,
    pub trained_at: DateTime<Utc>,
    pub labels: LabelSet,
    #[serde(default)]
    pub summary: TrainingSummary,
    pub network: Network,
}

impl SavedModel {
    pub fn new(
        network: Network,
        labels: LabelSet,
        summary: TrainingSummary,
    ) -> Result<Self, ModelError> {
        network.check_labels(&labels)?;
        Ok(Self {
            format_version: FORMAT_VERSION,
            trained_at: Utc::now(),
            labels,
            summary,
            network,
        })
    }

    pub fn predict(&self, image: &Image) -> Result<&str, ModelError> {
        self.network.predict(image, &self.labels)
    }

    pub fn validate(&self, dataset: &Dataset) -> Result<f32, ModelError> {
        self.network.validate(&self.labels, dataset)
    }

    /// Writes the model to `path`, replacing any existing file atomically.
    pub fn save<P>(&self, path: P) -> Result<(), PersistError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let io_err = |source| PersistError::Io {
            path: path.to_owned(),
            source,
        };
        let dir = match path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir,
            _ => Path::new("."),
        };

        let mut file = NamedTempFile::new_in(dir).map_err(io_err)?;
        {
            let mut writer = BufWriter::new(file.as_file_mut());
            serde_json::to_writer_pretty(&mut writer, self).map_err(|source| {
                PersistError::Json {
                    path: path.to_owned(),
                    source,
                }
            })?;
            writeln!(writer).map_err(io_err)?;
            writer.flush().map_err(io_err)?;
        }
        file.persist(path).map_err(|e| io_err(e.error))?;
        debug!("saved {} model to {}", self.network.architecture(), path.display());
        Ok(())
    }
}

/// A model handle that has not been bound to any weights yet.
///
/// Use [`UnboundModel::load`] to obtain a validated [`SavedModel`]. Expectations
/// set with [`UnboundModel::with_architecture`] or [`UnboundModel::with_labels`]
/// are checked while binding.
#[derive(Debug, Clone, Default)]
pub struct UnboundModel {
    architecture: Option<Architecture>,
    labels: Option<LabelSet>,
}

impl UnboundModel {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_architecture(mut self, architecture: Architecture) -> Self {
        self.architecture = Some(architecture);
        self
    }

    #[must_use]
    pub fn with_labels(mut self, labels: LabelSet) -> Self {
        self.labels = Some(labels);
        self
    }

    /// Reads a model file and binds it.
    pub fn load<P>(self, path: P) -> Result<SavedModel, PersistError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| PersistError::Io {
            path: path.to_owned(),
            source,
        })?;
        let saved: SavedModel =
            serde_json::from_reader(BufReader::new(file)).map_err(|source| PersistError::Json {
                path: path.to_owned(),
                source,
            })?;
        if saved.format_version != FORMAT_VERSION {
            return Err(PersistError::UnsupportedVersion {
                path: path.to_owned(),
                found: saved.format_version,
            });
        }
        self.bind(saved).map_err(|source| PersistError::Invalid {
            path: path.to_owned(),
            source,
        })
    }

    /// Checks a deserialized model against the expectations of this handle.
    pub fn bind(self, saved: SavedModel) -> Result<SavedModel, ModelError> {
        saved.network.check_labels(&saved.labels)?;
        match self.architecture {
            Some(expected) if &expected != saved.network.architecture() => {
                return Err(ModelError::ArchitectureMismatch {
                    expected,
                    got: saved.network.architecture().clone(),
                });
            }
            _ => {}
        }
        match self.labels {
            Some(expected) if expected != saved.labels => {
                return Err(ModelError::LabelMismatch {
                    expected: expected.names().to_vec(),
                    got: saved.labels.names().to_vec(),
                });
            }
            _ => {}
        }
        Ok(saved)
    }
}
