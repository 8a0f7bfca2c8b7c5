//! Genome operations on flattened network parameters.
//!
//! Neuroevolution treats a network as a flat vector of weights and biases (see
//! [`Network::parameters`](crate::Network::parameters)). This module provides
//! the genetic operators on such vectors:
//!
//! - **Crossover**: [`crossover`] dispatches to [`uniform`] or [`blx_alpha`]
//! - **Mutation**: [`mutate`] applies sparse Gaussian perturbation
//!
//! # Uniform crossover
//!
//! Each child parameter is copied from one of the two parents with equal
//! probability. Children never leave the hull spanned by their parents, which
//! keeps the search conservative; it is the default operator.
//!
//! # BLX-α crossover
//!
//! Each child parameter is sampled from the parents' interval widened by `α`
//! times its length on both sides, so offspring can explore beyond both parents.
//!
//! # Gaussian mutation
//!
//! Each parameter is perturbed with probability `rate` by a sample of
//! `N(0, sigma)`. With the default rate of 1% only a few parameters change per
//! child, so selection keeps most of what the parents learned.

use rand::Rng;
use rand_distr::Normal;

/// Crossover operator used to combine two parent genomes.
#[derive(Debug, Default, Clone, Copy, PartialEq)]
pub enum Crossover {
    /// Per-parameter coin flip between the parents.
    #[default]
    Uniform,
    /// Blend crossover sampling from the widened parent interval.
    BlxAlpha { alpha: f32 },
}

/// Creates a vector by applying a function to each index.
///
/// # Examples
///
/// ```
/// use shapes_nn::weights;
///
/// let values = weights::from_fn(|i| i as f32 * 0.5, 3);
/// assert_eq!(values, vec![0.0, 0.5, 1.0]);
/// ```
pub fn from_fn<F>(mut f: F, len: usize) -> Vec<f32>
where
    F: FnMut(usize) -> f32,
{
    let mut values = Vec::with_capacity(len);
    for i in 0..len {
        values.push(f(i));
    }
    values
}

/// Combines two parent genomes with the given operator.
///
/// # Panics
///
/// Panics if the parents have different lengths.
pub fn crossover<R>(p1: &[f32], p2: &[f32], op: Crossover, rng: &mut R) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    match op {
        Crossover::Uniform => uniform(p1, p2, rng),
        Crossover::BlxAlpha { alpha } => blx_alpha(p1, p2, alpha, rng),
    }
}

/// Uniform crossover: every position is taken from `p1` or `p2` with probability 1/2.
///
/// # Panics
///
/// Panics if the parents have different lengths.
pub fn uniform<R>(p1: &[f32], p2: &[f32], rng: &mut R) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    assert_eq!(p1.len(), p2.len());
    from_fn(|i| if rng.random_bool(0.5) { p1[i] } else { p2[i] }, p1.len())
}

/// BLX-α crossover.
///
/// For parents `x1` and `x2` at position `i`, the child is sampled uniformly
/// from `[min - α·d, max + α·d]` where `d = |x2 - x1|`.
///
/// # Panics
///
/// Panics if the parents have different lengths.
pub fn blx_alpha<R>(p1: &[f32], p2: &[f32], alpha: f32, rng: &mut R) -> Vec<f32>
where
    R: Rng + ?Sized,
{
    assert_eq!(p1.len(), p2.len());
    from_fn(
        |i| {
            let min = f32::min(p1[i], p2[i]);
            let max = f32::max(p1[i], p2[i]);
            let d = max - min;
            rng.random_range((min - alpha * d)..=(max + alpha * d))
        },
        p1.len(),
    )
}

/// Applies Gaussian mutation in place.
///
/// Every value is independently replaced by `value + N(0, sigma)` with
/// probability `rate`. `rate` must lie in `[0, 1]`.
pub fn mutate<'a, I, R>(values: I, noise: Normal<f32>, rate: f32, rng: &mut R)
where
    I: IntoIterator<Item = &'a mut f32>,
    R: Rng + ?Sized,
{
    let rate = f64::from(rate);
    for v in values {
        if rng.random_bool(rate) {
            *v += rng.sample(noise);
        }
    }
}
