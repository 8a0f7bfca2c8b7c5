//! The generation loop of the evolutionary search.
//!
//! [`EvolutionarySearch`] owns the training set, the current [`Population`] and
//! the best individual seen so far. Each call to [`EvolutionarySearch::step`]
//! runs one generation:
//!
//! 1. Evaluate every individual against the training set
//! 2. Record the population minimum, the running best and the history entry
//! 3. Breed the next generation and swap it in (skipped after the last one)
//!
//! ```text
//! Uninitialized --populate--> Populated --step--> Evaluating --step--> ...
//!                                                     |
//!                                   epoch == armageddon --> Converged
//!                                   cancel observed     --> Killed
//! ```
//!
//! A cancelled generation is abandoned as a whole: the population, the history
//! and the epoch counter stay as they were after the last completed generation.

use log::{debug, info};
use rand::SeedableRng;
use rand_pcg::Pcg64Mcg;
use shapes_data::{Dataset, LabelSet};
use shapes_nn::{Architecture, ModelError};

use crate::{CancelToken, ErrorStats, Individual, Population, PopulationEvolver, TrainingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum SearchPhase {
    Uninitialized,
    Populated,
    Evaluating,
    Converged,
    Killed,
}

/// Outcome of one generation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, derive_more::IsVariant)]
pub enum StepStatus {
    Continue,
    Cancelled,
    Converged,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchState {
    /// Completed generations.
    pub epoch: usize,
    /// Generation budget.
    pub armageddon: usize,
    pub mutation_rate: f32,
    /// Lowest error of the most recent evaluation.
    pub error: Option<f32>,
    /// Lowest error of any evaluation so far.
    pub best_error: Option<f32>,
    /// `error` of every completed generation.
    pub history: Vec<f32>,
    pub phase: SearchPhase,
}

/// Progress of a completed generation.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationReport {
    /// Zero-based index of the generation.
    pub generation: usize,
    pub error: f32,
    pub best_error: f32,
    pub stats: ErrorStats,
}

#[derive(Debug)]
pub struct EvolutionarySearch {
    architecture: Architecture,
    dataset: Dataset,
    labels: LabelSet,
    evolver: PopulationEvolver,
    rng: Pcg64Mcg,
    population: Option<Population>,
    champion: Option<Individual>,
    last_report: Option<GenerationReport>,
    state: SearchState,
}

impl EvolutionarySearch {
    /// Creates a search over `dataset` that stops after `armageddon` generations.
    ///
    /// The dataset must be non-empty, its images must match the input layer and
    /// the output layer must have one unit per label. The evolver must keep at
    /// least one elite, so the fittest individual is always a member of the
    /// current population.
    pub fn new(
        architecture: Architecture,
        dataset: Dataset,
        labels: LabelSet,
        armageddon: usize,
        evolver: PopulationEvolver,
        seed: u64,
    ) -> Result<Self, TrainingError> {
        let input_len = dataset.input_len().ok_or(ModelError::EmptyDataset)?;
        if input_len != architecture.input_len() {
            return Err(ModelError::ShapeMismatch {
                expected: architecture.input_len(),
                got: input_len,
            }
            .into());
        }
        if architecture.output_len() != labels.len() {
            return Err(ModelError::LabelCountMismatch {
                outputs: architecture.output_len(),
                labels: labels.len(),
            }
            .into());
        }
        if evolver.elite_count == 0 {
            return Err(TrainingError::NoElites);
        }

        let state = SearchState {
            epoch: 0,
            armageddon,
            mutation_rate: evolver.mutation_rate,
            error: None,
            best_error: None,
            history: vec![],
            phase: SearchPhase::Uninitialized,
        };
        Ok(Self {
            architecture,
            dataset,
            labels,
            evolver,
            rng: Pcg64Mcg::seed_from_u64(seed),
            population: None,
            champion: None,
            last_report: None,
            state,
        })
    }

    /// Replaces the population with `size` random individuals and restarts the run.
    pub fn populate(&mut self, size: usize) -> Result<(), TrainingError> {
        let population = Population::random(&self.architecture, size, &mut self.rng)?;
        debug!("populated {size} individuals with architecture {}", self.architecture);
        self.population = Some(population);
        self.champion = None;
        self.last_report = None;
        self.state.epoch = 0;
        self.state.error = None;
        self.state.best_error = None;
        self.state.history.clear();
        self.state.phase = SearchPhase::Populated;
        Ok(())
    }

    /// Scores the current population and records the result.
    ///
    /// Returns [`StepStatus::Cancelled`] if `cancel` fired before every
    /// individual was scored; nothing is recorded in that case.
    pub fn evaluate(&mut self, cancel: &CancelToken) -> Result<StepStatus, TrainingError> {
        self.check_running()?;
        let population = self.population.as_ref().ok_or(TrainingError::NotPopulated)?;
        self.state.phase = SearchPhase::Evaluating;

        let Some(evaluated) = population.evaluate(&self.dataset, &self.labels, cancel)? else {
            self.state.phase = SearchPhase::Killed;
            return Ok(StepStatus::Cancelled);
        };
        let (Some(best), Some(stats)) = (evaluated.best(), evaluated.compute_error_stats()) else {
            return Err(TrainingError::NoEvaluationYet);
        };
        let error = stats.min;

        let improved = self
            .champion
            .as_ref()
            .and_then(Individual::error)
            .is_none_or(|champion| error < champion);
        if improved {
            self.champion = Some(best.clone());
        }
        let best_error = self.state.best_error.map_or(error, |b| b.min(error));

        self.state.error = Some(error);
        self.state.best_error = Some(best_error);
        self.state.history.push(error);
        self.last_report = Some(GenerationReport {
            generation: self.state.epoch,
            error,
            best_error,
            stats,
        });
        self.population = Some(evaluated);
        Ok(StepStatus::Continue)
    }

    /// Breeds the next generation from the evaluated population and swaps it in.
    pub fn crossover(&mut self) -> Result<(), TrainingError> {
        self.check_running()?;
        let population = self.population.as_ref().ok_or(TrainingError::NotPopulated)?;
        let next = self.evolver.evolve(population, &mut self.rng)?;
        self.population = Some(next);
        Ok(())
    }

    /// Converged and killed searches only accept `populate`.
    fn check_running(&self) -> Result<(), TrainingError> {
        match self.state.phase {
            SearchPhase::Uninitialized => Err(TrainingError::NotPopulated),
            SearchPhase::Converged | SearchPhase::Killed => Err(TrainingError::SearchFinished),
            SearchPhase::Populated | SearchPhase::Evaluating => Ok(()),
        }
    }

    /// Runs one generation.
    ///
    /// Returns [`StepStatus::Converged`] once the generation budget is used up,
    /// including for the step that completes the last generation.
    pub fn step(&mut self, cancel: &CancelToken) -> Result<StepStatus, TrainingError> {
        match self.state.phase {
            SearchPhase::Uninitialized => return Err(TrainingError::NotPopulated),
            SearchPhase::Converged => return Ok(StepStatus::Converged),
            SearchPhase::Killed => return Ok(StepStatus::Cancelled),
            SearchPhase::Populated | SearchPhase::Evaluating => {}
        }
        if self.state.epoch >= self.state.armageddon {
            self.state.phase = SearchPhase::Converged;
            return Ok(StepStatus::Converged);
        }
        if cancel.is_cancelled() {
            info!("search cancelled after {} generations", self.state.epoch);
            self.state.phase = SearchPhase::Killed;
            return Ok(StepStatus::Cancelled);
        }

        if self.evaluate(cancel)?.is_cancelled() {
            info!("search cancelled during generation {}", self.state.epoch);
            return Ok(StepStatus::Cancelled);
        }
        if self.state.epoch + 1 < self.state.armageddon {
            self.crossover()?;
        }
        self.state.epoch += 1;

        if self.state.epoch >= self.state.armageddon {
            info!(
                "search converged after {} generations, best error {:?}",
                self.state.epoch, self.state.best_error
            );
            self.state.phase = SearchPhase::Converged;
            return Ok(StepStatus::Converged);
        }
        Ok(StepStatus::Continue)
    }

    /// Steps until the search converges or is cancelled.
    ///
    /// `on_generation` is called after every completed generation.
    pub fn run<F>(&mut self, cancel: &CancelToken, mut on_generation: F) -> Result<StepStatus, TrainingError>
    where
        F: FnMut(&GenerationReport),
    {
        loop {
            let before = self.state.epoch;
            let status = self.step(cancel)?;
            if self.state.epoch > before
                && let Some(report) = &self.last_report
            {
                on_generation(report);
            }
            if !status.is_continue() {
                return Ok(status);
            }
        }
    }

    /// The lowest-error individual evaluated so far.
    ///
    /// Elites carry it from one generation to the next, so it is also the
    /// lowest-error member of the current population.
    pub fn fittest(&self) -> Result<&Individual, TrainingError> {
        self.champion.as_ref().ok_or(TrainingError::NoEvaluationYet)
    }

    #[must_use]
    pub fn architecture(&self) -> &Architecture {
        &self.architecture
    }

    #[must_use]
    pub fn state(&self) -> &SearchState {
        &self.state
    }

    #[must_use]
    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    #[must_use]
    pub fn last_report(&self) -> Option<&GenerationReport> {
        self.last_report.as_ref()
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[must_use]
    pub fn into_dataset(self) -> Dataset {
        self.dataset
    }
}
