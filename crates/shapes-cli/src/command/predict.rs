use std::path::PathBuf;

use anyhow::Context;

use super::ModelArg;
use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct PredictArg {
    /// Image to classify
    pub(crate) image: PathBuf,
    #[command(flatten)]
    pub(crate) model: ModelArg,
}

pub(crate) fn run(arg: &PredictArg) -> anyhow::Result<()> {
    let PredictArg { image, model } = arg;
    let pixels = shapes_data::load_image(image)
        .with_context(|| format!("Failed to read image: {}", image.display()))?;
    let model = util::read_model_file(&model.model)?;

    let label = model
        .predict(&pixels)
        .with_context(|| format!("Failed to classify {}", image.display()))?;
    println!("{label}");
    Ok(())
}
