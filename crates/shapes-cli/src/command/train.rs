use std::path::{Path, PathBuf};

use anyhow::{Context, bail};
use indicatif::{ProgressBar, ProgressStyle};
use rand::{Rng as _, SeedableRng as _};
use rand_pcg::Pcg64Mcg;
use shapes_data::{Dataset, LabelSet};
use shapes_nn::{Architecture, Network, SavedModel, TrainingSummary};
use shapes_training::{
    CancelToken, EvolutionarySearch, FineTuner, PopulationEvolver, TrainingError,
};

use super::ModelArg;
use crate::{interrupt, util};

const HIDDEN_LAYERS: [usize; 2] = [10, 4];

const CURVE_WIDTH: f32 = 50.0;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct TrainArg {
    /// Generations of evolutionary search
    #[arg(value_name = "GA-EPOCHS")]
    pub(crate) ga_epochs: usize,
    /// Gradient descent passes after the search (0 skips fine-tuning)
    #[arg(value_name = "SGD-EPOCHS")]
    pub(crate) sgd_epochs: usize,
    /// Print the error curves when 1
    #[arg(value_name = "VIS", value_parser = clap::value_parser!(u8).range(0..=1))]
    pub(crate) vis: u8,
    /// Directory of labeled training images
    #[arg(long, default_value = "training_data")]
    pub(crate) training_data: PathBuf,
    /// Directory of labeled test images
    #[arg(long, default_value = "test_data")]
    pub(crate) test_data: PathBuf,
    #[command(flatten)]
    pub(crate) model: ModelArg,
    /// Number of networks per generation
    #[arg(long, default_value_t = 200)]
    pub(crate) population: usize,
    /// Probability of mutating each weight of a child
    #[arg(long, default_value_t = 0.01)]
    pub(crate) mutation_rate: f32,
    /// Random seed for a reproducible run
    #[arg(long)]
    pub(crate) seed: Option<u64>,
    /// Mini-batch size for gradient descent
    #[arg(long, default_value_t = 10)]
    pub(crate) batch_size: usize,
    /// Learning rate for gradient descent
    #[arg(long, default_value_t = 3.0)]
    pub(crate) learning_rate: f32,
}

pub(crate) fn run(arg: &TrainArg) -> anyhow::Result<()> {
    let cancel = CancelToken::new();
    interrupt::cancel_on_ctrl_c(cancel.clone())?;
    train(arg, &cancel)
}

fn train(arg: &TrainArg, cancel: &CancelToken) -> anyhow::Result<()> {
    let vis = arg.vis != 0;
    let seed = arg.seed.unwrap_or_else(|| rand::rng().random());
    let mut rng = Pcg64Mcg::seed_from_u64(seed);

    let mut training = util::read_dataset_dir("training", &arg.training_data)?;
    let test = util::read_dataset_dir("test", &arg.test_data)?;
    let input_len = training.input_len().with_context(|| {
        format!("No training images found in {}", arg.training_data.display())
    })?;
    training.shuffle(&mut rng);
    eprintln!(
        "Loaded {} training and {} test images (seed {seed})",
        training.len(),
        test.len()
    );

    let labels = LabelSet::shapes();
    check_dataset("training", &arg.training_data, &training, input_len, &labels)?;
    check_dataset("test", &arg.test_data, &test, input_len, &labels)?;
    let architecture = Architecture::for_images(input_len, &HIDDEN_LAYERS, labels.len())?;
    let evolver = PopulationEvolver {
        mutation_rate: arg.mutation_rate,
        ..PopulationEvolver::default()
    };
    let mut search = EvolutionarySearch::new(
        architecture,
        training,
        labels.clone(),
        arg.ga_epochs,
        evolver,
        rng.random(),
    )?;

    eprintln!("Creating population...");
    search.populate(arg.population)?;

    eprintln!("Initiating evolutionary search...");
    let pb = ProgressBar::new(arg.ga_epochs as u64);
    pb.set_style(progress_style()?);
    let status = search.run(cancel, |report| {
        pb.set_message(format!("error: {:.6}", report.error));
        pb.inc(1);
    })?;
    if status.is_cancelled() {
        pb.abandon();
        eprintln!("Aborting search...");
    } else {
        pb.finish();
    }

    let state = search.state();
    if vis {
        print_error_curve("Evolutionary search error", &state.history);
    }
    let mut summary = TrainingSummary {
        generations: state.epoch,
        interrupted: status.is_cancelled(),
        ..TrainingSummary::default()
    };
    let network = match search.fittest() {
        Ok(best) => {
            summary.search_error = best.error();
            best.network().clone()
        }
        Err(TrainingError::NoEvaluationYet) => {
            eprintln!("No generation completed, continuing from a random network");
            Network::random(search.architecture().clone(), &mut rng)
        }
        Err(e) => return Err(e.into()),
    };
    let training = search.into_dataset();
    eprintln!("{}", "-".repeat(62));

    let network = if arg.sgd_epochs > 0 {
        // a Ctrl-C during the search must not also abort fine-tuning
        cancel.reset();
        eprintln!("Initiating gradient descent optimization...");
        let tuner = FineTuner {
            epochs: arg.sgd_epochs,
            batch_size: arg.batch_size,
            learning_rate: arg.learning_rate,
        };
        let pb = ProgressBar::new(arg.sgd_epochs as u64);
        pb.set_style(progress_style()?);
        let report = tuner.run(
            network,
            &training,
            &labels,
            Some(&test),
            cancel,
            &mut rng,
            |pass| {
                if vis && let Some(validation) = pass.validation {
                    pb.println(format!(
                        "Pass {}: error {:.6}, test error {:.6}, test accuracy {:.3}",
                        pass.pass, pass.training_error, validation.error, validation.accuracy
                    ));
                }
                pb.set_message(format!("error: {:.6}", pass.training_error));
                pb.inc(1);
            },
        )?;
        if report.status.is_cancelled() {
            pb.abandon();
            eprintln!("Aborting gradient descent...");
            summary.interrupted = true;
        } else {
            pb.finish();
        }

        let errors: Vec<f32> = report.passes.iter().map(|p| p.training_error).collect();
        if vis {
            print_error_curve("Gradient descent error", &errors);
        }
        summary.fine_tune_passes = report.passes.len();
        summary.fine_tune_error = errors.last().copied();
        report.network
    } else {
        network
    };

    let model = SavedModel::new(network, labels, summary)?;
    model
        .save(&arg.model.model)
        .with_context(|| format!("Failed to save model: {}", arg.model.model.display()))?;

    eprintln!();
    eprintln!("Model saved successfully");
    eprintln!("  Path: {}", arg.model.model.display());
    eprintln!("  Architecture: {}", model.network.architecture());
    eprintln!("  Trained at: {}", model.trained_at);
    if let Some(error) = model.summary.search_error {
        eprintln!("  Search error: {error:.6} after {} generations", model.summary.generations);
    }
    if let Some(error) = model.summary.fine_tune_error {
        eprintln!("  Fine-tune error: {error:.6} after {} passes", model.summary.fine_tune_passes);
    }
    println!("Done!");
    Ok(())
}

/// Fails before any training if `dataset` cannot be fed to the classifier.
fn check_dataset(
    data_kind: &str,
    path: &Path,
    dataset: &Dataset,
    input_len: usize,
    labels: &LabelSet,
) -> anyhow::Result<()> {
    if let Some(len) = dataset.input_len()
        && len != input_len
    {
        let (rows, cols) = dataset.image_shape().unwrap_or_default();
        bail!(
            "Expected {input_len}-pixel {data_kind} images in {}, found {rows}x{cols} ({len} pixels)",
            path.display()
        );
    }
    if let Some(sample) = dataset.iter().find(|s| labels.index_of(s.label()).is_none()) {
        bail!(
            "Unknown {data_kind} label {:?} in {}, expected one of {}",
            sample.label(),
            path.display(),
            labels.names().join(", ")
        );
    }
    Ok(())
}

fn progress_style() -> anyhow::Result<ProgressStyle> {
    let style = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")?
        .progress_chars("█▓░");
    Ok(style)
}

fn print_error_curve(title: &str, errors: &[f32]) {
    println!("{title}:");
    for line in error_curve(errors) {
        println!("{line}");
    }
}

/// One line per entry, with a bar proportional to the largest error.
fn error_curve(errors: &[f32]) -> Vec<String> {
    let max = errors.iter().copied().fold(0.0_f32, f32::max);
    errors
        .iter()
        .enumerate()
        .map(|(i, &error)| {
            let ratio = if max > 0.0 { error / max } else { 0.0 };
            #[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let width = (ratio * CURVE_WIDTH).round() as usize;
            format!("{i:5} {error:.6} {}", "#".repeat(width))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use image::{GrayImage, Luma};
    use shapes_nn::UnboundModel;

    use super::*;

    fn write_shapes(root: &Path) {
        for (i, label) in LabelSet::shapes().names().iter().enumerate() {
            let dir = root.join(label);
            fs::create_dir_all(&dir).unwrap();
            for j in 0..2_u32 {
                let image = GrayImage::from_fn(4, 4, |x, y| {
                    #[expect(clippy::cast_possible_truncation)]
                    let on = (x + y + j) % 3 == i as u32;
                    Luma([if on { 255 } else { 0 }])
                });
                image.save(dir.join(format!("{j}.png"))).unwrap();
            }
        }
    }

    fn write_image(dir: &Path, name: &str, size: u32) {
        fs::create_dir_all(dir).unwrap();
        let image = GrayImage::from_fn(size, size, |x, _| Luma([if x % 2 == 0 { 255 } else { 0 }]));
        image.save(dir.join(name)).unwrap();
    }

    fn train_arg(root: &Path, ga_epochs: usize, sgd_epochs: usize) -> TrainArg {
        TrainArg {
            ga_epochs,
            sgd_epochs,
            vis: 1,
            training_data: root.join("training"),
            test_data: root.join("test"),
            model: ModelArg {
                model: root.join("model.json"),
            },
            population: 4,
            mutation_rate: 0.01,
            seed: Some(3),
            batch_size: 2,
            learning_rate: 3.0,
        }
    }

    #[test]
    fn test_train_saves_model() {
        let dir = tempfile::tempdir().unwrap();
        write_shapes(&dir.path().join("training"));
        write_shapes(&dir.path().join("test"));
        let arg = train_arg(dir.path(), 2, 3);

        train(&arg, &CancelToken::new()).unwrap();

        let model = UnboundModel::new().load(&arg.model.model).unwrap();
        assert_eq!(model.network.architecture().sizes(), [16, 10, 4, 3]);
        assert_eq!(model.summary.generations, 2);
        assert_eq!(model.summary.fine_tune_passes, 3);
        assert!(model.summary.search_error.is_some());
        assert!(!model.summary.interrupted);
    }

    #[test]
    fn test_interrupted_train_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        write_shapes(&dir.path().join("training"));
        write_shapes(&dir.path().join("test"));
        let arg = train_arg(dir.path(), 5, 0);
        let cancel = CancelToken::new();
        cancel.cancel();

        train(&arg, &cancel).unwrap();

        let model = UnboundModel::new().load(&arg.model.model).unwrap();
        assert!(model.summary.interrupted);
        assert_eq!(model.summary.generations, 0);
        assert_eq!(model.summary.search_error, None);
    }

    #[test]
    fn test_train_requires_images() {
        let dir = tempfile::tempdir().unwrap();
        fs::create_dir_all(dir.path().join("training")).unwrap();
        fs::create_dir_all(dir.path().join("test")).unwrap();
        let err = train(&train_arg(dir.path(), 1, 0), &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("No training images"));
    }

    #[test]
    fn test_train_rejects_mismatched_test_images() {
        let dir = tempfile::tempdir().unwrap();
        write_shapes(&dir.path().join("training"));
        write_image(&dir.path().join("test/circle"), "big.png", 5);
        let arg = train_arg(dir.path(), 1, 1);

        let err = train(&arg, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("Expected 16-pixel test images"), "{err}");
        assert!(err.to_string().contains("found 5x5 (25 pixels)"), "{err}");
        assert!(!arg.model.model.exists());
    }

    #[test]
    fn test_train_rejects_unknown_labels() {
        let dir = tempfile::tempdir().unwrap();
        write_shapes(&dir.path().join("training"));
        write_shapes(&dir.path().join("test"));
        write_image(&dir.path().join("test/hexagon"), "0.png", 4);
        let arg = train_arg(dir.path(), 1, 1);

        let err = train(&arg, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("Unknown test label \"hexagon\""), "{err}");
        assert!(!arg.model.model.exists());

        fs::remove_dir_all(dir.path().join("test/hexagon")).unwrap();
        write_image(&dir.path().join("training/hexagon"), "0.png", 4);
        let err = train(&arg, &CancelToken::new()).unwrap_err();
        assert!(err.to_string().contains("Unknown training label"), "{err}");
        assert!(!arg.model.model.exists());
    }

    #[test]
    fn test_train_accepts_empty_test_set() {
        let dir = tempfile::tempdir().unwrap();
        write_shapes(&dir.path().join("training"));
        fs::create_dir_all(dir.path().join("test")).unwrap();
        let arg = train_arg(dir.path(), 1, 1);

        train(&arg, &CancelToken::new()).unwrap();
        assert!(arg.model.model.exists());
    }

    #[test]
    fn test_error_curve() {
        let lines = error_curve(&[0.5, 0.25, 0.0]);
        assert_eq!(lines.len(), 3);
        assert!(lines[0].ends_with(&"#".repeat(50)));
        assert!(lines[1].ends_with(&format!(" {}", "#".repeat(25))));
        assert_eq!(lines[2], "    2 0.000000 ");
        assert!(error_curve(&[]).is_empty());
    }
}
