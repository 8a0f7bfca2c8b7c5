use std::path::PathBuf;

use anyhow::Context;

use super::ModelArg;
use crate::util;

#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ValidateArg {
    /// Directory of labeled test images
    #[arg(long, default_value = "test_data")]
    test_data: PathBuf,
    #[command(flatten)]
    model: ModelArg,
}

pub(crate) fn run(arg: &ValidateArg) -> anyhow::Result<()> {
    let ValidateArg { test_data, model } = arg;
    let test = util::read_dataset_dir("test", test_data)?;
    let model = util::read_model_file(&model.model)?;

    let accuracy = model
        .validate(&test)
        .with_context(|| format!("Failed to validate against {}", test_data.display()))?;
    println!("Accuracy: {accuracy}");
    Ok(())
}
