//! Hybrid training of the shape classifier: neuroevolution, then gradient descent.
//!
//! # How Training Works
//!
//! 1. **Population** - Create a population of networks with random weights
//! 2. **Evaluation** - Score every network against the training set (mean squared error)
//! 3. **Selection** - Pick parents, favouring low-error individuals
//! 4. **Reproduction** - Build the next generation through crossover and mutation,
//!    carrying the best individuals over unchanged
//! 5. **Repeat** - Until the generation budget (`armageddon`) is exhausted or the
//!    run is cancelled
//! 6. **Fine-tuning** - Refine the fittest network with mini-batch gradient descent
//!
//! # Architecture
//!
//! ```text
//! Dataset + LabelSet
//!     ↓ scored against
//! Population (networks + errors)          ← genetic
//!     ↓ driven by
//! EvolutionarySearch (generation loop)     ← search
//!     ↓ fittest individual
//! FineTuner (gradient descent passes)      ← fine_tune
//!     ↓ refined network
//! SavedModel (shapes-nn)
//! ```
//!
//! Both loops take a [`CancelToken`] and check it between bounded units of work,
//! so an interrupt stops training without losing the best result found so far.
//!
//! # Example
//!
//! ```rust,ignore
//! use shapes_training::{CancelToken, EvolutionarySearch, FineTuner, PopulationEvolver};
//!
//! let cancel = CancelToken::new();
//! let mut search = EvolutionarySearch::new(arch, training, labels.clone(), 100,
//!     PopulationEvolver::default(), 42)?;
//! search.populate(200)?;
//! search.run(&cancel, |report| eprintln!("{}: {}", report.generation, report.error))?;
//!
//! let best = search.fittest()?.network().clone();
//! let tuned = FineTuner { epochs: 30, ..FineTuner::default() }
//!     .run(best, search.dataset(), &labels, Some(&test), &cancel, &mut rng, |_| {})?;
//! ```
//!
//! # Current Limitations
//!
//! - **Fixed topology**: Only weights evolve; layer sizes are chosen up front
//! - **No adaptive parameters**: Mutation rate and selection pressure stay constant
//!   for the whole run
//! - **Full-batch fitness**: Every individual is scored on the whole training set
//!   each generation, which dominates the run time for large datasets

use shapes_nn::ModelError;

pub use self::{
    cancel::CancelToken,
    fine_tune::{FineTuneReport, FineTuneStatus, FineTuner, PassReport, Validation},
    genetic::{ErrorStats, Individual, Population, PopulationEvolver, SelectionPolicy},
    search::{EvolutionarySearch, GenerationReport, SearchPhase, SearchState, StepStatus},
};

pub mod cancel;
pub mod fine_tune;
pub mod genetic;
pub mod search;

#[derive(Debug, derive_more::Display, derive_more::Error, derive_more::From)]
pub enum TrainingError {
    #[display("population size must be positive")]
    InvalidPopulationSize,
    #[display("mini-batch size must be positive")]
    InvalidBatchSize,
    #[display("population has not been created yet")]
    NotPopulated,
    #[display("no individual has been evaluated yet")]
    NoEvaluationYet,
    #[display("at least one elite must survive each generation")]
    NoElites,
    #[display("search has already finished; populate it again to restart")]
    SearchFinished,
    #[display("model operation failed")]
    #[from]
    Model(ModelError),
}
