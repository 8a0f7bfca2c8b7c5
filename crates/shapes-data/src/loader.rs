//! Loading datasets from a directory tree.
//!
//! The expected layout is one subdirectory per label, each holding image files:
//!
//! ```text
//! training_data/
//! ├── circle/
//! │   ├── 0001.png
//! │   └── ...
//! ├── rectangle/
//! └── triangle/
//! ```
//!
//! Files that cannot be decoded, or whose shape differs from the first image
//! loaded, are skipped with a warning instead of failing the whole load.

use std::{
    fs,
    path::{Path, PathBuf},
};

use image::{DynamicImage, ImageReader};
use log::{debug, info, warn};

use crate::{DataError, DataLoadError, Dataset, Image, Sample};

/// The outcome of [`load_dir`]: the samples that loaded plus the ones that did not.
#[derive(Debug, Default)]
pub struct LoadReport {
    pub dataset: Dataset,
    pub skipped: Vec<DataLoadError>,
}

/// Loads every image under the immediate subdirectories of `root`.
///
/// The subdirectory name becomes the sample label. Entries are visited in path
/// order so the resulting dataset is deterministic. Only a failure to list a
/// directory is an error; per-file failures end up in [`LoadReport::skipped`].
pub fn load_dir<P>(root: P) -> Result<LoadReport, DataError>
where
    P: AsRef<Path>,
{
    let root = root.as_ref();
    let mut report = LoadReport::default();

    for label_dir in sorted_entries(root)? {
        if !label_dir.is_dir() {
            debug!("ignoring non-directory {}", label_dir.display());
            continue;
        }
        let Some(label) = label_dir.file_name().and_then(|name| name.to_str()) else {
            warn!("ignoring directory with non UTF-8 name {}", label_dir.display());
            continue;
        };

        for path in sorted_entries(&label_dir)? {
            if !path.is_file() {
                debug!("ignoring non-file {}", path.display());
                continue;
            }
            let result =
                load_image(&path).and_then(|image| report.dataset.push(Sample::new(label, image)));
            if let Err(source) = result {
                let err = DataLoadError { path, source };
                warn!("{err}");
                report.skipped.push(err);
            }
        }
    }

    info!(
        "loaded {} samples from {} ({} skipped)",
        report.dataset.len(),
        root.display(),
        report.skipped.len()
    );
    Ok(report)
}

/// Decodes one image file into grayscale intensities in `[0, 1]`.
///
/// The format is detected from the file contents, not its extension.
pub fn load_image<P>(path: P) -> Result<Image, DataError>
where
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let gray = decode(path)
        .map_err(|source| DataError::Decode {
            path: path.to_owned(),
            source,
        })?
        .into_luma8();

    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width == 0 || height == 0 {
        return Err(DataError::EmptyImage {
            path: path.to_owned(),
        });
    }

    let pixels = gray.as_raw();
    Ok(Image::from_shape_fn((height, width), |(row, col)| {
        f32::from(pixels[row * width + col]) / 255.0
    }))
}

fn decode(path: &Path) -> Result<DynamicImage, image::ImageError> {
    let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
    Ok(image)
}

fn sorted_entries(dir: &Path) -> Result<Vec<PathBuf>, DataError> {
    let read_err = |source| DataError::ReadDir {
        path: dir.to_owned(),
        source,
    };
    let mut paths = fs::read_dir(dir)
        .map_err(read_err)?
        .map(|entry| entry.map(|e| e.path()))
        .collect::<Result<Vec<_>, _>>()
        .map_err(read_err)?;
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use image::{GrayImage, Luma};

    use super::*;

    fn write_png(path: &Path, size: u32, value: u8) {
        GrayImage::from_pixel(size, size, Luma([value]))
            .save(path)
            .unwrap();
    }

    #[test]
    fn test_load_dir_labels_by_subdirectory() {
        let root = tempfile::tempdir().unwrap();
        for label in ["circle", "triangle"] {
            fs::create_dir(root.path().join(label)).unwrap();
        }
        write_png(&root.path().join("circle/a.png"), 4, 0);
        write_png(&root.path().join("circle/b.png"), 4, 255);
        write_png(&root.path().join("triangle/c.png"), 4, 128);
        fs::write(root.path().join("README"), "not a label").unwrap();

        let report = load_dir(root.path()).unwrap();
        assert!(report.skipped.is_empty());
        let labels: Vec<_> = report.dataset.iter().map(Sample::label).collect();
        assert_eq!(labels, ["circle", "circle", "triangle"]);
        assert_eq!(report.dataset.image_shape(), Some((4, 4)));
    }

    #[test]
    fn test_load_dir_skips_bad_files() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("circle")).unwrap();
        write_png(&root.path().join("circle/a.png"), 4, 0);
        write_png(&root.path().join("circle/b_small.png"), 3, 0);
        fs::write(root.path().join("circle/c.png"), b"definitely not a png").unwrap();

        let report = load_dir(root.path()).unwrap();
        assert_eq!(report.dataset.len(), 1);
        assert_eq!(report.skipped.len(), 2);
        assert!(matches!(
            report.skipped[0].source,
            DataError::ShapeMismatch { .. }
        ));
        assert!(matches!(report.skipped[1].source, DataError::Decode { .. }));
    }

    #[test]
    fn test_load_dir_missing_root_is_an_error() {
        let root = tempfile::tempdir().unwrap();
        let err = load_dir(root.path().join("nope")).unwrap_err();
        assert!(matches!(err, DataError::ReadDir { .. }));
    }

    #[test]
    fn test_load_image_normalizes_intensity() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("white");
        // no extension: format comes from the file header
        GrayImage::from_pixel(2, 3, Luma([255]))
            .save_with_format(&path, image::ImageFormat::Png)
            .unwrap();

        let image = load_image(&path).unwrap();
        assert_eq!(image.dim(), (3, 2));
        assert!(image.iter().all(|&v| (v - 1.0).abs() < f32::EPSILON));
    }
}
