use evorl::{
    agent::{EvolvableAgent, EvolvableDqn, DQN_ALGO},
    config::EvolutionConfig,
    env::CartPole,
    hpo::{Mutations, TournamentSelection},
    train::{load_population, EvolutionLoop, StopReason},
    utils::{create_population, format_hyperparams},
};
use rand::SeedableRng;
use rand::rngs::StdRng;

const CONFIG: &str = r#"
INIT_HP:
  POP_SIZE: 4
  NUM_ENVS: 2
  EVO_STEPS: 64
  LEARNING_DELAY: 16
  EVAL_STEPS: 50
  EVAL_LOOP: 1
  MAX_STEPS: 192
  TARGET_SCORE: null
  TOURN_SIZE: 2
  ELITISM: true
  BATCH_SIZE: 16
  MEMORY_SIZE: 1000
  PARALLEL: true
MUTATION_PARAMS:
  NO_MUT: 0.3
  ARCH_MUT: 0.2
  NEW_LAYER: 0.2
  PARAMS_MUT: 0.2
  ACT_MUT: 0.1
  RL_HP_MUT: 0.2
  RAND_SEED: 7
NET_CONFIG:
  ENCODER:
    HIDDEN_SIZE: [32]
    LATENT_DIM: 16
  HEAD:
    HIDDEN_SIZE: [32]
"#;

#[test]
fn test_end_to_end_cartpole_evolution() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = EvolutionConfig::from_yaml_str(CONFIG).unwrap();
    config.init_hp.checkpoint_dir = Some(dir.path().to_string_lossy().into_owned());
    config.validate().unwrap();

    let hp = &config.init_hp;
    let mut rng = StdRng::seed_from_u64(config.mutation_params.rand_seed.unwrap());
    let population = create_population(&config, 4, 2, &mut rng).unwrap();
    let tournament = TournamentSelection::new(hp.tourn_size, hp.elitism, hp.pop_size, hp.eval_loop).unwrap();
    let mutations = Mutations::from_config(&config.mutation_params).unwrap();

    // Start from a varied population, as the demo does.
    let population = mutations.mutation(population, true, &mut rng);

    let mut best_per_generation = Vec::new();
    let outcome = EvolutionLoop::from_config(hp)
        .run_with_observer(
            population,
            |seed| Ok(CartPole::new(seed)),
            &tournament,
            &mutations,
            &mut rng,
            |report| best_per_generation.push(report.best_fitness),
        )
        .unwrap();

    assert_eq!(outcome.stop_reason, StopReason::MaxSteps);
    assert_eq!(outcome.reports.len(), 3);
    assert_eq!(best_per_generation.len(), 3);
    assert!(best_per_generation.iter().all(|f| f.is_finite()));
    assert_eq!(outcome.population.len(), 4);

    for report in &outcome.reports {
        assert_eq!(report.ids.len(), 4);
        assert_eq!(report.mutations.len(), 4);
        assert_eq!(report.hyperparameters.len(), 4);
    }
    // Ids keep counting up across generations.
    let last_ids = &outcome.reports[2].ids;
    assert!(last_ids.iter().skip(1).all(|&id| id >= 4));

    for agent in &outcome.population {
        assert!(agent.actor.matches(agent.descriptor()));
        assert!(agent.optimizer().fits(&agent.actor));
        assert_eq!(agent.meta.fitness.len(), 3);
    }

    let restored: Vec<EvolvableDqn> = load_population(dir.path(), DQN_ALGO, 4).unwrap();
    assert_eq!(
        restored.iter().map(|a| a.id()).collect::<Vec<_>>(),
        outcome.population.iter().map(|a| a.id()).collect::<Vec<_>>()
    );

    let summary = format_hyperparams(&outcome.population, hp.eval_loop);
    assert!(summary.iter().all(|line| line.contains("lr")));
}

#[test]
fn test_same_seed_same_run() {
    let config = EvolutionConfig::from_yaml_str(CONFIG).unwrap();
    let hp = &config.init_hp;
    let tournament = TournamentSelection::new(hp.tourn_size, hp.elitism, hp.pop_size, hp.eval_loop).unwrap();
    let mutations = Mutations::from_config(&config.mutation_params).unwrap();

    let run = || {
        let mut rng = StdRng::seed_from_u64(11);
        let population = create_population(&config, 4, 2, &mut rng).unwrap();
        EvolutionLoop::from_config(hp)
            .run(population, |seed| Ok(CartPole::new(seed)), &tournament, &mutations, &mut rng)
            .unwrap()
    };
    let first = run();
    let second = run();
    assert_eq!(first.reports, second.reports);
}
