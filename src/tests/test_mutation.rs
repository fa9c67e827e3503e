use rand::SeedableRng;
use rand::rngs::StdRng;

use super::{population, scored_population};
use crate::activations::Activation;
use crate::agent::{EvolvableAgent, MutationOutcome};
use crate::hpo::{Mutations, TournamentSelection};

fn params_only() -> Mutations {
    Mutations::new(0.0, 0.0, 0.2, 1.0, 0.0, 0.0, 0.1).unwrap()
}

#[test]
fn test_elite_is_not_mutated() {
    let population = scored_population(&[1.0, 2.0, 3.0, 4.0]);
    let selection = TournamentSelection::new(2, true, 4, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(0);
    let (elite, next) = selection.select(&population, &mut rng).unwrap();
    let before: Vec<_> = next.iter().map(|a| a.actor.clone()).collect();

    let mutated = params_only().mutation(next, false, &mut rng);
    assert_eq!(mutated.len(), 4);
    assert_eq!(mutated[0].meta.last_mutation, MutationOutcome::Elite);
    assert_eq!(mutated[0].actor, elite.actor);
    for (agent, old) in mutated.iter().zip(&before).skip(1) {
        assert_eq!(agent.meta.last_mutation, MutationOutcome::Parameters);
        assert_ne!(&agent.actor, old);
    }
}

#[test]
fn test_mutate_elite_flag() {
    let population = scored_population(&[1.0, 2.0]);
    let selection = TournamentSelection::new(2, true, 2, 1).unwrap();
    let mut rng = StdRng::seed_from_u64(1);
    let (elite, next) = selection.select(&population, &mut rng).unwrap();

    let mutated = params_only().with_mutate_elite(true).mutation(next, false, &mut rng);
    assert_eq!(mutated[0].meta.last_mutation, MutationOutcome::Parameters);
    assert_ne!(mutated[0].actor, elite.actor);
}

#[test]
fn test_architecture_mutations_keep_agents_consistent() {
    let mutations = Mutations::new(0.0, 1.0, 0.5, 0.0, 0.0, 0.0, 0.1).unwrap();
    let mut rng = StdRng::seed_from_u64(2);
    let mut agents = population(6, 2);

    for _ in 0..5 {
        agents = mutations.mutation(agents, false, &mut rng);
        for agent in &agents {
            assert!(matches!(
                agent.meta.last_mutation,
                MutationOutcome::Architecture(_) | MutationOutcome::ArchitectureNoOp
            ));
            agent.descriptor().validate().unwrap();
            assert!(agent.actor.matches(agent.descriptor()));
            assert!(agent.actor_target.matches(agent.descriptor()));
            assert!(agent.optimizer().fits(&agent.actor));
        }
    }
    assert_eq!(agents.iter().map(|a| a.id()).collect::<Vec<_>>(), vec![0, 1, 2, 3, 4, 5]);
}

#[test]
fn test_activation_mutation_swaps_hidden_layers() {
    let mutations = Mutations::new(0.0, 0.0, 0.2, 0.0, 1.0, 0.0, 0.1)
        .unwrap()
        .with_activation_selection(vec![Activation::Tanh]);
    let mut rng = StdRng::seed_from_u64(3);

    let agents = mutations.mutation(population(2, 3), false, &mut rng);
    for agent in &agents {
        assert_eq!(agent.meta.last_mutation.label(), format!("Act({})", Activation::Tanh.name()));
        assert_eq!(agent.descriptor().hidden_activation(), Activation::Tanh);
        let (output, hidden) = agent.actor.layers.split_last().unwrap();
        assert!(hidden.iter().all(|l| l.activation == Activation::Tanh));
        assert_eq!(output.activation, Activation::Linear);
    }

    // Nothing left to swap to.
    let agents = mutations.mutation(agents, false, &mut rng);
    assert!(agents.iter().all(|a| a.meta.last_mutation == MutationOutcome::ActivationNoOp));
}

#[test]
fn test_rl_hyperparameter_mutation_stays_in_bounds() {
    let mutations = Mutations::new(0.0, 0.0, 0.2, 0.0, 0.0, 1.0, 0.1).unwrap();
    let mut rng = StdRng::seed_from_u64(4);
    let mut agents = population(4, 4);

    for _ in 0..20 {
        agents = mutations.mutation(agents, false, &mut rng);
        for agent in &agents {
            let MutationOutcome::RlHyperparameter { name, value } = &agent.meta.last_mutation else {
                panic!("unexpected outcome {:?}", agent.meta.last_mutation);
            };
            let spec = agent.hyperparameters().get(name).unwrap();
            assert_eq!(spec.value, *value);
            assert!(spec.min <= *value && *value <= spec.max);
        }
        for agent in &agents {
            let space = agent.hyperparameters();
            assert_eq!(agent.batch_size(), space.value("batch_size").unwrap() as usize);
            assert_eq!(agent.learn_step(), space.value("learn_step").unwrap() as usize);
            assert_eq!(agent.lr(), space.value("lr").unwrap() as f32);
        }
    }
}

#[test]
fn test_unknown_hyperparameter_is_noop() {
    let mutations = Mutations::new(0.0, 0.0, 0.2, 0.0, 0.0, 1.0, 0.1)
        .unwrap()
        .with_rl_hp_selection(vec!["entropy_coef".to_string()]);
    let mut rng = StdRng::seed_from_u64(5);
    let agents = mutations.mutation(population(2, 5), false, &mut rng);
    assert!(agents.iter().all(|a| a.meta.last_mutation == MutationOutcome::RlHyperparameterNoOp));
}

#[test]
fn test_pre_training_mutation_changes_everyone() {
    let mutations = Mutations::new(0.9, 0.0, 0.2, 0.1, 0.0, 0.0, 0.1).unwrap();
    let mut rng = StdRng::seed_from_u64(6);
    let agents = mutations.mutation(population(5, 6), true, &mut rng);
    assert!(agents.iter().all(|a| a.meta.last_mutation == MutationOutcome::Parameters));
}

#[test]
fn test_same_seed_same_mutations() {
    let mutations = Mutations::new(0.2, 0.2, 0.2, 0.2, 0.2, 0.2, 0.1).unwrap();
    let first = mutations.mutation(population(4, 7), false, &mut StdRng::seed_from_u64(7));
    let second = mutations.mutation(population(4, 7), false, &mut StdRng::seed_from_u64(7));
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.meta, b.meta);
        assert_eq!(a.actor, b.actor);
        assert_eq!(a.descriptor(), b.descriptor());
    }
}
