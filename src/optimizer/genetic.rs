//! Genetic algorithm over placement order and rotations.
//!
//! A chromosome carries a permutation of box indices and one rotation gene per
//! box (keyed by box index, not by position in the permutation). Decoding
//! replays the bottom-left-fill rule in chromosome order, so a chromosome maps
//! to exactly one layout.

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::seq::index::sample;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;

use crate::error::Result;
use crate::model::{Box3D, Rotation};
use crate::state::LoadState;

use super::{LoadProblem, RunContext, blf};

/// Parameters of the genetic algorithm.
#[derive(Clone, Debug, PartialEq)]
pub struct GaConfig {
    pub population_size: usize,
    pub generations: usize,
    /// Individuals copied unchanged into the next generation
    pub elitism: usize,
    pub crossover_rate: f64,
    pub mutation_rate: f64,
    pub tournament_size: usize,
    pub seed: Option<u64>,
}

impl GaConfig {
    pub const DEFAULT_POPULATION_SIZE: usize = 500;
    pub const DEFAULT_GENERATIONS: usize = 50;
    pub const DEFAULT_ELITISM: usize = 5;
    pub const DEFAULT_CROSSOVER_RATE: f64 = 0.9;
    pub const DEFAULT_MUTATION_RATE: f64 = 0.4;
    pub const DEFAULT_TOURNAMENT_SIZE: usize = 5;
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: Self::DEFAULT_POPULATION_SIZE,
            generations: Self::DEFAULT_GENERATIONS,
            elitism: Self::DEFAULT_ELITISM,
            crossover_rate: Self::DEFAULT_CROSSOVER_RATE,
            mutation_rate: Self::DEFAULT_MUTATION_RATE,
            tournament_size: Self::DEFAULT_TOURNAMENT_SIZE,
            seed: None,
        }
    }
}

/// Placement order plus rotation genes.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Chromosome {
    /// Permutation of box indices.
    pub order: Vec<usize>,
    /// Rotation gene of box `i` at index `i`.
    pub rotations: Vec<Rotation>,
}

fn random_rotation<R: Rng + ?Sized>(object: &Box3D, rng: &mut R) -> Rotation {
    let allowed = object.allowed_rotations;
    allowed
        .nth(rng.random_range(0..allowed.len().max(1)))
        .unwrap_or(Rotation::Lwh)
}

impl Chromosome {
    /// Random permutation with random admissible rotations.
    pub fn random<R: Rng + ?Sized>(boxes: &[Box3D], rng: &mut R) -> Self {
        let mut order: Vec<usize> = (0..boxes.len()).collect();
        order.shuffle(rng);
        let rotations = boxes.iter().map(|b| random_rotation(b, rng)).collect();
        Self { order, rotations }
    }

    /// Order crossover (OX) on the permutation and single-point crossover on
    /// the rotation genes.
    ///
    /// The slice `[start, end]` of `self` is copied to the same positions; the
    /// remaining positions are filled left to right with `other`'s values in
    /// their order, skipping values already used.
    pub fn crossover<R: Rng + ?Sized>(&self, other: &Self, boxes: &[Box3D], rng: &mut R) -> Self {
        let n = self.order.len();
        if n < 2 {
            return self.clone();
        }

        let (mut start, mut end) = (rng.random_range(0..n), rng.random_range(0..n));
        if start > end {
            std::mem::swap(&mut start, &mut end);
        }
        let mut order = vec![usize::MAX; n];
        let mut used = vec![false; n];
        for i in start..=end {
            order[i] = self.order[i];
            used[self.order[i]] = true;
        }
        let mut donor = other.order.iter().copied().filter(|value| !used[*value]);
        for slot in order.iter_mut().filter(|slot| **slot == usize::MAX) {
            if let Some(value) = donor.next() {
                *slot = value;
            }
        }

        let point = rng.random_range(0..=n);
        let rotations = (0..n)
            .map(|i| {
                let gene = if i < point { self.rotations[i] } else { other.rotations[i] };
                match boxes.get(i) {
                    Some(object) if !object.allowed_rotations.contains(gene) => {
                        random_rotation(object, rng)
                    }
                    _ => gene,
                }
            })
            .collect();

        Self { order, rotations }
    }

    /// Swaps two order positions and redraws one box's rotation gene.
    pub fn mutate<R: Rng + ?Sized>(&mut self, boxes: &[Box3D], rng: &mut R) {
        let n = self.order.len();
        if n >= 2 {
            let i = rng.random_range(0..n);
            let j = rng.random_range(0..n);
            self.order.swap(i, j);
        }
        if n > 0 {
            let target = rng.random_range(0..n);
            if let Some(object) = boxes.get(target) {
                self.rotations[target] = random_rotation(object, rng);
            }
        }
    }
}

/// Replays the BLF rule in chromosome order.
///
/// With LIFO enabled the order is stable-sorted by destination group first.
/// If a box's gene yields no feasible position, the other fitting rotations are
/// tried in id order.
pub fn decode(problem: &LoadProblem, chromosome: &Chromosome) -> LoadState {
    let mut order = chromosome.order.clone();
    if problem.flags().enforce_lifo {
        let boxes = problem.boxes();
        order.sort_by_key(|&index| boxes[index].destination_rank());
    }

    let mut state = problem.empty_state();
    for index in order {
        let fitting = problem.fitting_rotations(index);
        if fitting.is_empty() {
            continue;
        }
        let gene = chromosome.rotations.get(index).copied();
        let points = blf::anchors(&state);
        let preferred = fitting.iter().filter(|(rotation, _)| Some(*rotation) == gene);
        let fallback = fitting.iter().filter(|(rotation, _)| Some(*rotation) != gene);
        let placement = preferred.chain(fallback).find_map(|candidate| {
            blf::best_position(problem, &state, index, std::slice::from_ref(candidate), &points)
        });
        if let Some(placement) = placement {
            state.place(placement);
        }
    }
    state
}

/// Fill rate minus penalties, floored at zero.
///
/// - capacity enabled: `(weight - max) / max * 100` when overweight
/// - priority enabled: `100 / priority` per unplaced box
pub fn fitness(problem: &LoadProblem, state: &LoadState) -> f64 {
    let mut score = state.fill_rate();
    let container = problem.container();
    if problem.flags().enforce_load_capacity && state.total_weight > container.max_weight {
        score -= (state.total_weight - container.max_weight) / container.max_weight * 100.0;
    }
    if problem.flags().enforce_priority {
        let mut placed = vec![false; problem.len()];
        for placement in &state.placed {
            placed[placement.box_index] = true;
        }
        score -= problem
            .boxes()
            .iter()
            .zip(&placed)
            .filter(|(_, is_placed)| !**is_placed)
            .map(|(object, _)| 100.0 / object.priority_rank().max(1) as f64)
            .sum::<f64>();
    }
    score.max(0.0)
}

/// Tournament selection without replacement; the fittest contender wins and
/// earlier contenders win ties.
fn tournament<R: Rng + ?Sized>(scores: &[f64], size: usize, rng: &mut R) -> usize {
    let contenders = size.clamp(1, scores.len());
    let mut winner: Option<usize> = None;
    for index in sample(rng, scores.len(), contenders) {
        if winner.is_none_or(|current| scores[index] > scores[current]) {
            winner = Some(index);
        }
    }
    winner.unwrap_or(0)
}

/// Best layout ever seen plus the per-generation best fitness values.
#[derive(Clone, Debug)]
pub struct GaReport {
    pub state: LoadState,
    pub best_fitness: f64,
    pub generation_best: Vec<f64>,
}

/// Runs the genetic algorithm and returns the best layout ever decoded.
pub fn run(problem: &LoadProblem, config: &GaConfig, ctx: &RunContext<'_>) -> Result<LoadState> {
    Ok(run_with_report(problem, config, ctx)?.state)
}

/// Like [`run`], also reporting per-generation fitness.
pub fn run_with_report(problem: &LoadProblem, config: &GaConfig, ctx: &RunContext<'_>) -> Result<GaReport> {
    ctx.checkpoint()?;
    let boxes = problem.boxes();
    let population_size = config.population_size.max(1);
    let generations = config.generations.max(1);
    let elitism = config.elitism.min(population_size);
    let crossover_rate = config.crossover_rate.clamp(0.0, 1.0);
    let mutation_rate = config.mutation_rate.clamp(0.0, 1.0);

    let mut rng = StdRng::seed_from_u64(config.seed.unwrap_or_else(rand::random));
    let mut population: Vec<Chromosome> = (0..population_size)
        .map(|_| Chromosome::random(boxes, &mut rng))
        .collect();

    let mut best: Option<(f64, LoadState)> = None;
    let mut generation_best = Vec::with_capacity(generations);

    for generation in 0..generations {
        ctx.checkpoint()?;

        let evaluated: Vec<(f64, LoadState)> = population
            .par_iter()
            .map(|chromosome| {
                let state = decode(problem, chromosome);
                (fitness(problem, &state), state)
            })
            .collect();
        let scores: Vec<f64> = evaluated.iter().map(|(score, _)| *score).collect();

        let mut ranking: Vec<usize> = (0..scores.len()).collect();
        ranking.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]).then(a.cmp(&b)));
        let leader = ranking[0];
        generation_best.push(scores[leader]);

        if best.as_ref().is_none_or(|(score, _)| scores[leader] > *score) {
            best = Some((scores[leader], evaluated[leader].1.clone()));
        }
        let best_score = best.as_ref().map_or(0.0, |(score, _)| *score);

        log::debug!(
            "generation {} best fitness {:.2}, best ever {:.2}",
            generation + 1,
            scores[leader],
            best_score
        );
        ctx.report(&format!(
            "generation {}/{}: best fitness {:.2}",
            generation + 1,
            generations,
            best_score
        ));

        if generation + 1 == generations {
            break;
        }

        let mut next: Vec<Chromosome> = ranking
            .iter()
            .take(elitism)
            .map(|&index| population[index].clone())
            .collect();
        while next.len() < population_size {
            let first = &population[tournament(&scores, config.tournament_size, &mut rng)];
            let second = &population[tournament(&scores, config.tournament_size, &mut rng)];
            let mut child = if rng.random_bool(crossover_rate) {
                first.crossover(second, boxes, &mut rng)
            } else {
                first.clone()
            };
            if rng.random_bool(mutation_rate) {
                child.mutate(boxes, &mut rng);
            }
            next.push(child);
        }
        population = next;
    }

    let (best_fitness, state) = best.unwrap_or_else(|| (0.0, problem.empty_state()));
    Ok(GaReport {
        state,
        best_fitness,
        generation_best,
    })
}
