use std::cmp::Ordering;

use log::debug;
use rand::Rng;

use crate::agent::{EvolvableAgent, MutationOutcome};
use crate::error::{EvoError, Result};

/// Tournament selection with optional elitism.
///
/// Ranking uses the mean of each individual's last `eval_loop` fitness
/// values. Ties are broken in favour of the lower id, so a fixed population
/// and RNG seed always produce the same selection.
#[derive(Debug, Clone, PartialEq)]
pub struct TournamentSelection {
    pub tournament_size: usize,
    pub elitism: bool,
    pub population_size: usize,
    pub eval_loop: usize,
}

impl TournamentSelection {
    pub fn new(tournament_size: usize, elitism: bool, population_size: usize, eval_loop: usize) -> Result<Self> {
        for (name, value) in [
            ("TOURN_SIZE", tournament_size),
            ("POP_SIZE", population_size),
            ("EVAL_LOOP", eval_loop),
        ] {
            if value == 0 {
                return Err(EvoError::invalid_config(name, "must be greater than zero"));
            }
        }
        Ok(TournamentSelection {
            tournament_size,
            elitism,
            population_size,
            eval_loop,
        })
    }

    /// Ordering of `(fitness, id)` pairs where greater means fitter.
    fn compare(a: (f32, usize), b: (f32, usize)) -> Ordering {
        let key = |f: f32| if f.is_nan() { f32::NEG_INFINITY } else { f };
        key(a.0)
            .partial_cmp(&key(b.0))
            .unwrap_or(Ordering::Equal)
            .then_with(|| b.1.cmp(&a.1))
    }

    /// Index of the fittest individual.
    pub fn best_index<A: EvolvableAgent>(&self, population: &[A]) -> Option<usize> {
        population
            .iter()
            .enumerate()
            .max_by(|(_, a), (_, b)| Self::compare((a.fitness(self.eval_loop), a.id()), (b.fitness(self.eval_loop), b.id())))
            .map(|(i, _)| i)
    }

    /// Sample `tournament_size` contestants with replacement; return the winner's index.
    fn tournament<R: Rng + ?Sized>(&self, keys: &[(f32, usize)], rng: &mut R) -> usize {
        let mut winner = rng.gen_range(0..keys.len());
        for _ in 1..self.tournament_size {
            let challenger = rng.gen_range(0..keys.len());
            if Self::compare(keys[challenger], keys[winner]) == Ordering::Greater {
                winner = challenger;
            }
        }
        winner
    }

    /// Produce the next generation.
    ///
    /// Returns a copy of the elite (keeping its id) and a new population of
    /// exactly `population_size` deep copies. With elitism the elite copy is
    /// first in the new population and flagged so the mutation engine leaves
    /// it alone. Every other slot gets a fresh id counting up from the
    /// highest id in `population`.
    pub fn select<A, R>(&self, population: &[A], rng: &mut R) -> Result<(A, Vec<A>)>
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        let best = self
            .best_index(population)
            .ok_or_else(|| EvoError::EmptyBuffer("cannot select from an empty population".to_string()))?;
        let keys: Vec<(f32, usize)> = population.iter().map(|a| (a.fitness(self.eval_loop), a.id())).collect();
        let mut max_id = population.iter().map(|a| a.id()).max().unwrap_or(0);

        let elite = population[best].clone_with_id(population[best].id());
        let mut next = Vec::with_capacity(self.population_size);
        if self.elitism {
            let mut kept = elite.clone_with_id(elite.id());
            kept.meta_mut().elite = true;
            kept.meta_mut().last_mutation = MutationOutcome::Elite;
            next.push(kept);
        }

        while next.len() < self.population_size {
            let winner = self.tournament(&keys, rng);
            max_id += 1;
            next.push(population[winner].clone_with_id(max_id));
        }

        debug!(
            "selected elite {} (fitness {:.3}); next ids {:?}",
            elite.id(),
            keys[best].0,
            next.iter().map(|a| a.id()).collect::<Vec<_>>()
        );
        Ok((elite, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_constructor_rejects_zero_sizes() {
        assert!(TournamentSelection::new(0, true, 4, 1).is_err());
        assert!(TournamentSelection::new(2, true, 0, 1).is_err());
        assert!(TournamentSelection::new(2, true, 4, 0).is_err());
        assert!(TournamentSelection::new(2, false, 4, 1).is_ok());
    }

    #[test]
    fn test_compare_breaks_ties_by_lower_id() {
        let cmp = TournamentSelection::compare;
        assert_eq!(cmp((1.0, 3), (1.0, 5)), Ordering::Greater);
        assert_eq!(cmp((2.0, 5), (1.0, 3)), Ordering::Greater);
        assert_eq!(cmp((f32::NAN, 0), (-1e9, 1)), Ordering::Less);
    }
}
