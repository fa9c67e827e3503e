//! Population helpers: construction from a config, score aggregation over
//! vectorized rollouts, and a one-line-per-agent summary.

use log::info;
use rand::Rng;

use crate::agent::{DqnSettings, EvolvableAgent, EvolvableDqn, DQN_ALGO};
use crate::config::EvolutionConfig;
use crate::error::{EvoError, Result};

/// Build `POP_SIZE` freshly initialized individuals with ids `0..POP_SIZE`.
pub fn create_population<R: Rng + ?Sized>(
    config: &EvolutionConfig,
    observation_dim: usize,
    num_actions: usize,
    rng: &mut R,
) -> Result<Vec<EvolvableDqn>> {
    config.validate()?;
    if !config.init_hp.algo.eq_ignore_ascii_case(DQN_ALGO) {
        return Err(EvoError::invalid_config(
            "ALGO".to_string(),
            format!("unsupported algorithm '{}'", config.init_hp.algo),
        ));
    }
    let descriptor = config.net_config.descriptor(observation_dim, num_actions)?;
    let space = config.mutation_params.hyperparameters(&config.init_hp);
    let settings = DqnSettings::from_init_hp(&config.init_hp);
    (0..config.init_hp.pop_size)
        .map(|id| EvolvableDqn::new(id, descriptor.clone(), space.clone(), settings.clone(), &mut *rng))
        .collect()
}

/// Episode returns from step-wise rewards of several environments.
///
/// Row `i` of `rewards` and `terminations` holds the rollout of environment
/// `i`. An episode ends at a step flagged in `terminations`. With
/// `only_first_episode` only each environment's first episode is scored;
/// with `include_unterminated` the trailing unfinished episode is scored
/// too.
///
/// ```rust
/// use evorl::utils::calculate_vectorized_scores;
///
/// let rewards = vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]];
/// let terminations = vec![vec![false, false, true], vec![false, true, false]];
/// let scores = calculate_vectorized_scores(&rewards, &terminations, true, false);
/// assert_eq!(scores, vec![6.0, 9.0, 6.0]);
/// ```
pub fn calculate_vectorized_scores(
    rewards: &[Vec<f32>],
    terminations: &[Vec<bool>],
    include_unterminated: bool,
    only_first_episode: bool,
) -> Vec<f32> {
    let mut scores = Vec::new();
    for (env_rewards, env_terminations) in rewards.iter().zip(terminations) {
        let mut episode_reward = 0.0;
        let mut steps_in_episode = 0;
        let mut finished_one = false;
        for (&reward, &terminated) in env_rewards.iter().zip(env_terminations) {
            episode_reward += reward;
            steps_in_episode += 1;
            if terminated {
                scores.push(episode_reward);
                episode_reward = 0.0;
                steps_in_episode = 0;
                finished_one = true;
                if only_first_episode {
                    break;
                }
            }
        }
        let trailing = steps_in_episode > 0 && !(only_first_episode && finished_one);
        if include_unterminated && trailing {
            scores.push(episode_reward);
        }
    }
    scores
}

/// One summary line per individual: id, recent fitness and hyperparameters.
pub fn format_hyperparams<A: EvolvableAgent>(population: &[A], window: usize) -> Vec<String> {
    population
        .iter()
        .map(|agent| {
            let hyperparameters = agent
                .hyperparameters()
                .iter()
                .map(|spec| format!("{}: {}", spec.name, spec.value))
                .collect::<Vec<_>>()
                .join(", ");
            format!(
                "Agent ID: {}    Mean {} Fitness: {:.2}    Attributes: {{{}}}",
                agent.id(),
                window,
                agent.fitness(window),
                hyperparameters
            )
        })
        .collect()
}

/// Log [`format_hyperparams`] at info level.
pub fn print_hyperparams<A: EvolvableAgent>(population: &[A], window: usize) {
    for line in format_hyperparams(population, window) {
        info!("{}", line);
    }
}
