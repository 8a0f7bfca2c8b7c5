use std::path::PathBuf;

use clap::{Parser, Subcommand};

use self::{predict::PredictArg, train::TrainArg, validate::ValidateArg};

mod predict;
mod train;
mod validate;

#[derive(Debug, Clone, Parser)]
#[command(author, version, about, long_about = None)]
pub struct CommandArgs {
    /// What mode to run the program in
    #[command(subcommand)]
    mode: Mode,
}

#[derive(Debug, Clone, Subcommand)]
enum Mode {
    /// Train a classifier with evolutionary search, then gradient descent
    Train(#[clap(flatten)] TrainArg),
    /// Report the accuracy of the saved classifier on the test data
    Validate(#[clap(flatten)] ValidateArg),
    /// Classify a single image with the saved classifier
    Predict(#[clap(flatten)] PredictArg),
    #[command(external_subcommand)]
    Unknown(Vec<String>),
}

/// Location of the model file, shared by every command.
#[derive(Debug, Clone, clap::Args)]
pub(crate) struct ModelArg {
    /// Model file path
    #[arg(long, default_value = "neuralnet.json")]
    pub(crate) model: PathBuf,
}

pub fn run() -> anyhow::Result<()> {
    let args = CommandArgs::parse();
    match args.mode {
        Mode::Train(arg) => train::run(&arg)?,
        Mode::Validate(arg) => validate::run(&arg)?,
        Mode::Predict(arg) => predict::run(&arg)?,
        Mode::Unknown(argv) => {
            let name = argv.first().map_or("", String::as_str);
            println!("ERROR: Unknown command {name}");
        }
    }
    Ok(())
}
