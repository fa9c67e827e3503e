use rand::SeedableRng;
use rand::rngs::StdRng;

use super::scored_population;
use crate::agent::{EvolvableAgent, EvolvableDqn, MutationOutcome};
use crate::hpo::TournamentSelection;

fn parents<A: EvolvableAgent>(population: &[A]) -> Vec<Option<usize>> {
    population.iter().map(|a| a.meta().parent).collect()
}

#[test]
fn test_elite_is_best_and_first() {
    let population = scored_population(&[10.0, 20.0, 30.0, 40.0]);
    let selection = TournamentSelection::new(2, true, 4, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(0);

    let (elite, next) = selection.select(&population, &mut rng).unwrap();
    assert_eq!(elite.id(), 3);
    assert_eq!(elite.fitness(1), 40.0);
    assert_eq!(next.len(), 4);

    assert_eq!(next[0].id(), 3);
    assert!(next[0].is_elite());
    assert_eq!(next[0].meta.last_mutation, MutationOutcome::Elite);
    assert_eq!(next[0].actor, population[3].actor);
    // Carrying the elite forward does not make it its own parent.
    assert_eq!(elite.meta.parent, population[3].meta.parent);
    assert_eq!(next[0].meta.parent, population[3].meta.parent);

    let ids: Vec<usize> = next.iter().skip(1).map(|a| a.id()).collect();
    assert_eq!(ids, vec![4, 5, 6]);
    for child in &next[1..] {
        assert!(!child.is_elite());
        let parent = child.meta.parent.unwrap();
        assert!(parent < 4);
        assert_eq!(child.actor, population[parent].actor);
        assert_eq!(child.meta.fitness, population[parent].meta.fitness);
    }
}

#[test]
fn test_without_elitism_every_slot_is_new() {
    let population = scored_population(&[10.0, 20.0, 30.0, 40.0]);
    let selection = TournamentSelection::new(2, false, 4, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(1);

    let (elite, next) = selection.select(&population, &mut rng).unwrap();
    assert_eq!(elite.id(), 3);
    assert_eq!(next.iter().map(|a| a.id()).collect::<Vec<_>>(), vec![4, 5, 6, 7]);
    assert!(next.iter().all(|a| !a.is_elite()));
}

#[test]
fn test_tournament_of_one_is_uniform() {
    let population = scored_population(&[10.0, 20.0, 30.0, 40.0]);
    let selection = TournamentSelection::new(1, true, 4, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(2);

    let mut seen = [false; 4];
    for _ in 0..50 {
        let (_, next) = selection.select(&population, &mut rng).unwrap();
        for parent in parents(&next[1..]).into_iter().flatten() {
            seen[parent] = true;
        }
    }
    assert_eq!(seen, [true; 4]);
}

/// How often each of the four original individuals parents a child over `rounds` selections.
fn parent_counts(selection: &TournamentSelection, rounds: usize, seed: u64) -> [usize; 4] {
    let population = scored_population(&[10.0, 20.0, 30.0, 40.0]);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut counts = [0; 4];
    for _ in 0..rounds {
        let (_, next) = selection.select(&population, &mut rng).unwrap();
        for parent in parents(&next).into_iter().flatten() {
            counts[parent] += 1;
        }
    }
    counts
}

#[test]
fn test_fitter_individuals_win_more_often() {
    let selection = TournamentSelection::new(2, false, 4, 1).unwrap();
    let counts = parent_counts(&selection, 500, 6);
    assert_eq!(counts.iter().sum::<usize>(), 2000);
    // Expected shares with two contestants drawn with replacement: 1/16, 3/16, 5/16, 7/16.
    assert!(counts[0] < counts[1], "{:?}", counts);
    assert!(counts[1] < counts[2], "{:?}", counts);
    assert!(counts[2] < counts[3], "{:?}", counts);
}

#[test]
fn test_population_sized_tournament_mostly_picks_best() {
    // Contestants are drawn with replacement, so the best is missed with probability (3/4)^4.
    let selection = TournamentSelection::new(4, false, 4, 1).unwrap();
    let counts = parent_counts(&selection, 200, 7);
    let total: usize = counts.iter().sum();
    assert!(counts[0] < counts[3] && counts[1] < counts[3] && counts[2] < counts[3], "{:?}", counts);
    assert!(counts[3] * 2 > total, "{:?}", counts);
}

#[test]
fn test_oversized_tournament_picks_best() {
    let population = scored_population(&[10.0, 20.0, 30.0, 40.0]);
    let selection = TournamentSelection::new(64, false, 4, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(3);

    let (_, next) = selection.select(&population, &mut rng).unwrap();
    assert!(next.iter().all(|a| a.meta.parent == Some(3)));
}

#[test]
fn test_selection_is_reproducible() {
    let population = scored_population(&[5.0, 1.0, 4.0, 2.0, 3.0]);
    let selection = TournamentSelection::new(2, true, 5, 1).unwrap();

    let (_, first) = selection.select(&population, &mut StdRng::seed_from_u64(4)).unwrap();
    let (_, second) = selection.select(&population, &mut StdRng::seed_from_u64(4)).unwrap();
    assert_eq!(parents(&first), parents(&second));
}

#[test]
fn test_ties_and_nan() {
    let population = scored_population(&[7.0, f32::NAN, 7.0]);
    let selection = TournamentSelection::new(2, true, 3, 1).unwrap();
    assert_eq!(selection.best_index(&population), Some(0));

    let population = scored_population(&[f32::NAN, -1e9]);
    let selection = TournamentSelection::new(2, true, 2, 1).unwrap();
    assert_eq!(selection.best_index(&population), Some(1));
}

#[test]
fn test_window_averages_history() {
    let mut population = scored_population(&[100.0, 0.0]);
    population[0].meta.fitness.push(0.0);
    population[1].meta.fitness.push(60.0);
    // Means over two evaluations: 50 vs 30.
    let selection = TournamentSelection::new(2, true, 2, 2).unwrap();
    assert_eq!(selection.best_index(&population), Some(0));
    // Only the latest evaluation: 0 vs 60.
    let selection = TournamentSelection::new(2, true, 2, 1).unwrap();
    assert_eq!(selection.best_index(&population), Some(1));
}

#[test]
fn test_unscored_population_still_selects() {
    let selection = TournamentSelection::new(2, true, 3, 1).unwrap();
    let empty: Vec<EvolvableDqn> = Vec::new();
    assert!(selection.select(&empty, &mut StdRng::seed_from_u64(5)).is_err());

    let mut population = scored_population(&[1.0, 2.0, 3.0]);
    for agent in population.iter_mut() {
        agent.meta.fitness.clear();
    }
    let (elite, next) = selection.select(&population, &mut StdRng::seed_from_u64(5)).unwrap();
    assert_eq!(elite.id(), 0);
    assert_eq!(next.len(), 3);
}

#[test]
fn test_elite_keeps_its_lineage() {
    let mut population = scored_population(&[1.0, 2.0, 9.0]);
    population[2].meta.parent = Some(0);
    let selection = TournamentSelection::new(2, true, 3, 1).unwrap();
    let (elite, next) = selection.select(&population, &mut StdRng::seed_from_u64(8)).unwrap();
    assert_eq!(elite.meta.parent, Some(0));
    assert_eq!(next[0].meta.parent, Some(0));
    assert!(next[1..].iter().all(|a| a.meta.parent.is_some_and(|p| p < 3)));
}
