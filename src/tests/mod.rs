// Cross-module tests for the evolution engine
pub mod test_checkpoint;
pub mod test_mutation;
pub mod test_tournament;

use rand::SeedableRng;
use rand::rngs::StdRng;

use crate::agent::EvolvableDqn;
use crate::config::EvolutionConfig;
use crate::env::{CartPole, VecEnv};
use crate::utils::create_population;

/// Small config so a generation finishes in milliseconds.
pub(crate) fn small_config(pop_size: usize) -> EvolutionConfig {
    let mut config = EvolutionConfig::default();
    config.init_hp.pop_size = pop_size;
    config.init_hp.num_envs = 2;
    config.init_hp.evo_steps = 32;
    config.init_hp.learning_delay = 8;
    config.init_hp.batch_size = 8;
    config.init_hp.memory_size = 256;
    config.init_hp.eval_steps = Some(20);
    config.init_hp.max_steps = 10_000;
    config.init_hp.target_score = None;
    config.init_hp.parallel = false;
    config.net_config.encoder.hidden_size = vec![16];
    config.net_config.encoder.latent_dim = 8;
    config.net_config.head.hidden_size = vec![16];
    config
}

pub(crate) fn population(pop_size: usize, seed: u64) -> Vec<EvolvableDqn> {
    let mut rng = StdRng::seed_from_u64(seed);
    create_population(&small_config(pop_size), 4, 2, &mut rng).unwrap()
}

/// Population whose individuals carry the given fitness histories.
pub(crate) fn scored_population(fitness: &[f32]) -> Vec<EvolvableDqn> {
    let mut population = population(fitness.len(), 0);
    for (agent, &f) in population.iter_mut().zip(fitness) {
        agent.meta.fitness.push(f);
    }
    population
}

pub(crate) fn cartpole_envs(num_envs: usize, seed: u64) -> VecEnv<CartPole> {
    VecEnv::new(|seed| Ok(CartPole::new(seed)), num_envs, seed).unwrap()
}
