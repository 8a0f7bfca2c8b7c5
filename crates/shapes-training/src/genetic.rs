//! Populations of networks and the genetic operators that evolve them.
//!
//! # Key Components
//!
//! - [`Individual`] - A candidate network plus its error (`None` until evaluated)
//! - [`Population`] - Ordered individuals scored together against one dataset
//! - [`PopulationEvolver`] - Builds the next generation (elitism, selection,
//!   crossover, mutation)
//!
//! # Selection
//!
//! Parents are drawn with a [`SelectionPolicy`]:
//!
//! - **Fitness-proportionate** (default) - roulette wheel where an individual's
//!   slice is `1 / (error + ε)`. Every individual keeps a chance to reproduce,
//!   and a network with half the error is twice as likely to be picked.
//! - **Tournament** - draw `size` distinct individuals and keep the one with the
//!   lowest error. Larger tournaments mean stronger selection pressure.
//!
//! # Elitism
//!
//! The `elite_count` lowest-error individuals are copied into the next generation
//! unchanged, error included. Scoring is deterministic, so the best error of a
//! population can never get worse from one generation to the next.
//!
//! # Parallelization
//!
//! [`Population::evaluate`] scores individuals on scoped threads, one chunk per
//! available core. Scores are written back in population order, so results are
//! identical to a sequential evaluation.

use std::{num::NonZeroUsize, panic, thread};

use log::warn;
use rand::{
    Rng,
    distr::{Distribution, weighted::WeightedIndex},
    seq::IndexedRandom,
};
use shapes_data::{Dataset, LabelSet};
use shapes_nn::{Architecture, ModelError, Network, weights::Crossover};

use crate::{CancelToken, TrainingError};

/// Added to errors before inverting them for roulette selection.
const ROULETTE_EPSILON: f64 = 1e-6;

/// A single individual in the population.
#[derive(Debug, Clone, PartialEq)]
pub struct Individual {
    network: Network,
    error: Option<f32>,
}

impl Individual {
    /// Wraps a network that has not been evaluated yet.
    #[must_use]
    pub fn new(network: Network) -> Self {
        Self {
            network,
            error: None,
        }
    }

    #[must_use]
    pub fn network(&self) -> &Network {
        &self.network
    }

    #[must_use]
    pub fn into_network(self) -> Network {
        self.network
    }

    /// Error against the training set, lower is better. `None` until evaluated.
    #[must_use]
    pub fn error(&self) -> Option<f32> {
        self.error
    }
}

/// Summary of the errors across a population.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ErrorStats {
    pub min: f32,
    pub max: f32,
    pub mean: f32,
    pub std_dev: f32,
}

impl ErrorStats {
    /// Returns `None` for an empty input.
    #[must_use]
    pub fn new<I>(values: I) -> Option<Self>
    where
        I: IntoIterator<Item = f32>,
    {
        let values: Vec<f32> = values.into_iter().collect();
        let min = values.iter().copied().min_by(f32::total_cmp)?;
        let max = values.iter().copied().max_by(f32::total_cmp)?;
        #[expect(clippy::cast_precision_loss)]
        let n = values.len() as f32;
        let mean = values.iter().sum::<f32>() / n;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f32>() / n;
        Some(Self {
            min,
            max,
            mean,
            std_dev: variance.sqrt(),
        })
    }
}

/// An ordered collection of individuals sharing one architecture.
#[derive(Debug, Clone, PartialEq)]
pub struct Population {
    individuals: Vec<Individual>,
}

impl Population {
    /// Creates `count` individuals with independently randomized weights.
    pub fn random<R>(
        architecture: &Architecture,
        count: usize,
        rng: &mut R,
    ) -> Result<Self, TrainingError>
    where
        R: Rng + ?Sized,
    {
        if count == 0 {
            return Err(TrainingError::InvalidPopulationSize);
        }
        let individuals = (0..count)
            .map(|_| Individual::new(Network::random(architecture.clone(), rng)))
            .collect();
        Ok(Self { individuals })
    }

    #[must_use]
    pub fn individuals(&self) -> &[Individual] {
        &self.individuals
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.individuals.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.individuals.is_empty()
    }

    /// Whether every individual carries an error.
    #[must_use]
    pub fn is_evaluated(&self) -> bool {
        self.individuals.iter().all(|ind| ind.error.is_some())
    }

    /// The evaluated individual with the lowest error; the first one wins ties.
    #[must_use]
    pub fn best(&self) -> Option<&Individual> {
        self.individuals
            .iter()
            .filter_map(|ind| ind.error.map(|e| (e, ind)))
            .reduce(|best, cur| if cur.0 < best.0 { cur } else { best })
            .map(|(_, ind)| ind)
    }

    /// Statistics over the errors of the evaluated individuals.
    #[must_use]
    pub fn compute_error_stats(&self) -> Option<ErrorStats> {
        ErrorStats::new(self.individuals.iter().filter_map(Individual::error))
    }

    /// Scores every individual against `dataset`.
    ///
    /// Returns the scored population, leaving `self` untouched; networks and
    /// their order are unchanged. Returns `Ok(None)` if `cancel` fired before
    /// every individual was scored, in which case the partial scores are
    /// discarded.
    pub fn evaluate(
        &self,
        dataset: &Dataset,
        labels: &LabelSet,
        cancel: &CancelToken,
    ) -> Result<Option<Population>, TrainingError> {
        let workers = thread::available_parallelism().map_or(1, NonZeroUsize::get);
        let chunk_size = self.individuals.len().div_ceil(workers).max(1);

        let scores: Vec<Option<Result<f32, ModelError>>> = thread::scope(|s| {
            let handles: Vec<_> = self
                .individuals
                .chunks(chunk_size)
                .map(|chunk| {
                    s.spawn(move || {
                        chunk
                            .iter()
                            .map(|ind| {
                                (!cancel.is_cancelled())
                                    .then(|| ind.network.score(dataset, labels))
                            })
                            .collect::<Vec<_>>()
                    })
                })
                .collect();
            handles
                .into_iter()
                .flat_map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|payload| panic::resume_unwind(payload))
                })
                .collect()
        });

        let Some(scores) = scores.into_iter().collect::<Option<Vec<_>>>() else {
            return Ok(None);
        };
        let individuals: Vec<Individual> = self
            .individuals
            .iter()
            .zip(scores)
            .map(|(ind, score)| {
                Ok(Individual {
                    network: ind.network.clone(),
                    error: Some(score?),
                })
            })
            .collect::<Result<_, ModelError>>()?;
        Ok(Some(Population { individuals }))
    }

    /// Indices of the individuals sorted by error, best first.
    fn ranking(&self) -> Result<Vec<usize>, TrainingError> {
        let errors = self
            .individuals
            .iter()
            .map(|ind| ind.error.ok_or(TrainingError::NoEvaluationYet))
            .collect::<Result<Vec<_>, _>>()?;
        let mut order: Vec<usize> = (0..errors.len()).collect();
        order.sort_by(|&a, &b| errors[a].total_cmp(&errors[b]));
        Ok(order)
    }
}

/// How parents are chosen for reproduction.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum SelectionPolicy {
    /// Roulette wheel on inverse error.
    #[default]
    FitnessProportionate,
    /// Best of `size` randomly drawn individuals.
    Tournament { size: usize },
}

/// Parent selection prepared for one generation.
enum ParentSelector<'a> {
    Roulette {
        pool: &'a [Individual],
        index: WeightedIndex<f64>,
    },
    Tournament {
        pool: &'a [Individual],
        size: usize,
    },
    Uniform {
        pool: &'a [Individual],
    },
}

impl<'a> ParentSelector<'a> {
    fn new(policy: SelectionPolicy, pool: &'a [Individual]) -> Self {
        match policy {
            SelectionPolicy::FitnessProportionate => {
                let weights = pool.iter().map(|ind| {
                    let error = f64::from(ind.error.unwrap_or(f32::INFINITY));
                    let weight = 1.0 / (error + ROULETTE_EPSILON);
                    if weight.is_finite() { weight } else { 0.0 }
                });
                match WeightedIndex::new(weights) {
                    Ok(index) => Self::Roulette { pool, index },
                    Err(e) => {
                        warn!("roulette selection unavailable ({e}), selecting uniformly");
                        Self::Uniform { pool }
                    }
                }
            }
            SelectionPolicy::Tournament { size } => Self::Tournament {
                pool,
                size: size.min(pool.len()).max(1),
            },
        }
    }

    fn select<R>(&self, rng: &mut R) -> &'a Individual
    where
        R: Rng + ?Sized,
    {
        match *self {
            Self::Roulette { pool, ref index } => &pool[index.sample(rng)],
            Self::Tournament { pool, size } => tournament_select(pool, size, rng),
            Self::Uniform { pool } => &pool[rng.random_range(0..pool.len())],
        }
    }
}

/// Selects the lowest-error individual among `tournament_size` random picks.
fn tournament_select<'a, R>(
    population: &'a [Individual],
    tournament_size: usize,
    rng: &mut R,
) -> &'a Individual
where
    R: Rng + ?Sized,
{
    assert!(tournament_size > 0);
    population
        .choose_multiple(rng, tournament_size)
        .min_by(|a, b| {
            let a = a.error.unwrap_or(f32::INFINITY);
            let b = b.error.unwrap_or(f32::INFINITY);
            a.total_cmp(&b)
        })
        .expect("tournament draws at least one individual")
}

/// Controls how a population evolves from one generation to the next.
#[derive(Debug, Clone, PartialEq)]
pub struct PopulationEvolver {
    /// Number of lowest-error individuals carried over unchanged.
    pub elite_count: usize,
    /// How parents are chosen.
    pub selection: SelectionPolicy,
    /// How two parents are combined.
    pub crossover: Crossover,
    /// Probability of perturbing each parameter of a child.
    pub mutation_rate: f32,
    /// Standard deviation of the perturbation.
    pub mutation_sigma: f32,
}

impl Default for PopulationEvolver {
    fn default() -> Self {
        Self {
            elite_count: 2,
            selection: SelectionPolicy::default(),
            crossover: Crossover::default(),
            mutation_rate: 0.01,
            mutation_sigma: 0.5,
        }
    }
}

impl PopulationEvolver {
    /// Creates the next generation, with the same size as `population`.
    ///
    /// 1. Copies the `elite_count` best individuals, keeping their errors
    /// 2. Fills the rest with children of selected parents, crossed over and
    ///    mutated; children start unevaluated
    ///
    /// Every individual of `population` must have been evaluated.
    pub fn evolve<R>(&self, population: &Population, rng: &mut R) -> Result<Population, TrainingError>
    where
        R: Rng + ?Sized,
    {
        let ranking = population.ranking()?;
        let size = population.len();
        let mut next = Vec::with_capacity(size);

        next.extend(
            ranking
                .iter()
                .take(self.elite_count.min(size))
                .map(|&i| population.individuals[i].clone()),
        );

        let parents = ParentSelector::new(self.selection, &population.individuals);
        while next.len() < size {
            let p1 = parents.select(rng);
            let p2 = parents.select(rng);
            let mut child = p1.network.crossover(&p2.network, self.crossover, rng)?;
            child.mutate(self.mutation_rate, self.mutation_sigma, rng)?;
            next.push(Individual::new(child));
        }

        Ok(Population { individuals: next })
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;
    use rand::SeedableRng;
    use rand_pcg::Pcg64Mcg;
    use shapes_data::Sample;

    use super::*;

    fn arch() -> Architecture {
        Architecture::for_images(4, &[3], 3).unwrap()
    }

    fn dataset() -> Dataset {
        let labels = ["rectangle", "circle", "triangle"];
        Dataset::new((0..6).map(|i| {
            #[expect(clippy::cast_precision_loss)]
            let image = Array2::from_shape_fn((2, 2), |(r, c)| ((i + r + c) % 3) as f32 / 2.0);
            Sample::new(labels[i % 3], image)
        }))
        .unwrap()
    }

    fn evaluated(count: usize, seed: u64) -> Population {
        let mut rng = Pcg64Mcg::seed_from_u64(seed);
        Population::random(&arch(), count, &mut rng)
            .unwrap()
            .evaluate(&dataset(), &LabelSet::shapes(), &CancelToken::new())
            .unwrap()
            .unwrap()
    }

    #[test]
    fn test_random_population_is_distinct() {
        let mut rng = Pcg64Mcg::seed_from_u64(1);
        for n in [1, 2, 7] {
            let population = Population::random(&arch(), n, &mut rng).unwrap();
            assert_eq!(population.len(), n);
            assert!(!population.is_evaluated());
            let params: Vec<_> = population
                .individuals()
                .iter()
                .map(|ind| ind.network().parameters())
                .collect();
            for i in 0..n {
                for j in i + 1..n {
                    assert_ne!(params[i], params[j]);
                }
            }
        }
        assert!(matches!(
            Population::random(&arch(), 0, &mut rng),
            Err(TrainingError::InvalidPopulationSize)
        ));
    }

    #[test]
    fn test_evaluate_keeps_networks_and_order() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let population = Population::random(&arch(), 9, &mut rng).unwrap();
        let labels = LabelSet::shapes();
        let cancel = CancelToken::new();

        let first = population.evaluate(&dataset(), &labels, &cancel).unwrap().unwrap();
        let second = first.evaluate(&dataset(), &labels, &cancel).unwrap().unwrap();
        assert_eq!(first, second);
        for (before, after) in population.individuals().iter().zip(first.individuals()) {
            assert_eq!(before.network(), after.network());
            let expected = before.network().score(&dataset(), &labels).unwrap();
            assert_eq!(after.error(), Some(expected));
        }

        let min = first
            .individuals()
            .iter()
            .filter_map(Individual::error)
            .min_by(f32::total_cmp)
            .unwrap();
        assert_eq!(first.best().unwrap().error(), Some(min));
        assert_eq!(first.compute_error_stats().unwrap().min, min);
    }

    #[test]
    fn test_evaluate_abandons_on_cancel() {
        let mut rng = Pcg64Mcg::seed_from_u64(2);
        let population = Population::random(&arch(), 4, &mut rng).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let result = population
            .evaluate(&dataset(), &LabelSet::shapes(), &cancel)
            .unwrap();
        assert!(result.is_none());
    }

    #[test]
    fn test_evolve_keeps_size_and_elites() {
        let population = evaluated(10, 3);
        let best = population.best().unwrap().clone();
        let mut rng = Pcg64Mcg::seed_from_u64(3);

        for selection in [
            SelectionPolicy::FitnessProportionate,
            SelectionPolicy::Tournament { size: 3 },
        ] {
            let evolver = PopulationEvolver {
                selection,
                mutation_rate: 0.2,
                ..PopulationEvolver::default()
            };
            let next = evolver.evolve(&population, &mut rng).unwrap();
            assert_eq!(next.len(), population.len());
            assert_eq!(next.individuals()[0], best);
            assert!(next.individuals()[1].error().is_some());
            assert!(next.individuals()[2..].iter().all(|ind| ind.error().is_none()));
        }
    }

    #[test]
    fn test_evolve_requires_evaluation() {
        let mut rng = Pcg64Mcg::seed_from_u64(4);
        let population = Population::random(&arch(), 3, &mut rng).unwrap();
        assert!(matches!(
            PopulationEvolver::default().evolve(&population, &mut rng),
            Err(TrainingError::NoEvaluationYet)
        ));
    }

    #[test]
    fn test_tournament_prefers_low_error() {
        let population = evaluated(6, 5);
        let best = population.best().unwrap();
        let mut rng = Pcg64Mcg::seed_from_u64(5);
        // a tournament over the whole population always returns the best
        for _ in 0..10 {
            let winner = tournament_select(population.individuals(), 6, &mut rng);
            assert_eq!(winner, best);
        }
    }

    #[test]
    fn test_roulette_prefers_low_error() {
        let mut population = evaluated(3, 6);
        for (ind, error) in population.individuals.iter_mut().zip([0.1, 1.0, f32::INFINITY]) {
            ind.error = Some(error);
        }
        let selector =
            ParentSelector::new(SelectionPolicy::FitnessProportionate, population.individuals());
        let mut rng = Pcg64Mcg::seed_from_u64(6);

        let mut counts = [0_usize; 3];
        for _ in 0..2000 {
            let chosen = selector.select(&mut rng);
            let index = population
                .individuals()
                .iter()
                .position(|ind| std::ptr::eq(ind, chosen))
                .unwrap();
            counts[index] += 1;
        }
        // expected split is 10:1, an infinite error is never picked
        assert!(counts[1] > 0);
        assert!(counts[0] > counts[1] * 4);
        assert_eq!(counts[2], 0);
    }

    #[test]
    fn test_roulette_falls_back_to_uniform() {
        let mut population = evaluated(2, 7);
        for ind in &mut population.individuals {
            ind.error = Some(f32::INFINITY);
        }
        let selector =
            ParentSelector::new(SelectionPolicy::FitnessProportionate, population.individuals());
        assert!(matches!(selector, ParentSelector::Uniform { .. }));
    }

    #[test]
    fn test_error_stats() {
        let stats = ErrorStats::new([0.5, 0.25, 0.75, 0.5]).unwrap();
        assert!((stats.min - 0.25).abs() < f32::EPSILON);
        assert!((stats.max - 0.75).abs() < f32::EPSILON);
        assert!((stats.mean - 0.5).abs() < f32::EPSILON);
        assert!(ErrorStats::new(Vec::new()).is_none());
    }
}
