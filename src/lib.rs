//! # evorl - Evolutionary Optimization for Reinforcement Learning Populations
//!
//! evorl trains a population of reinforcement learning agents and evolves it
//! between training rounds. Each generation every individual trains for a
//! fixed number of environment steps, is evaluated, and the population is
//! rebuilt by tournament selection and mutation of network architectures,
//! weights, activations and learning hyperparameters.
//!
//! ## Key Features
//!
//! - **Evolvable Networks**: Dense networks described by a serializable descriptor
//!   that can grow, shrink and swap activations while keeping learned weights
//! - **Optimizer Migration**: Adam moment estimates follow every architecture change
//! - **Population Training**: Individuals train and evaluate in parallel on rayon
//! - **Tournament Selection**: Deterministic ranking with elitism
//! - **Checkpoints**: Versioned bincode checkpoints per population slot
//! - **Configuration**: YAML or JSON run configuration with validation
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use evorl::config::EvolutionConfig;
//! use evorl::env::CartPole;
//! use evorl::hpo::{Mutations, TournamentSelection};
//! use evorl::train::EvolutionLoop;
//! use evorl::utils::create_population;
//! use rand::SeedableRng;
//!
//! let config = EvolutionConfig::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(42);
//!
//! // Four DQN agents for a 4-dimensional observation and two actions
//! let population = create_population(&config, 4, 2, &mut rng).unwrap();
//!
//! let hp = &config.init_hp;
//! let tournament = TournamentSelection::new(hp.tourn_size, hp.elitism, hp.pop_size, hp.eval_loop).unwrap();
//! let mutations = Mutations::from_config(&config.mutation_params).unwrap();
//!
//! let outcome = EvolutionLoop::from_config(hp)
//!     .run(population, |seed| Ok(CartPole::new(seed)), &tournament, &mutations, &mut rng)
//!     .unwrap();
//! println!("stopped: {:?}", outcome.stop_reason);
//! ```
//!
//! ## Module Organization
//!
//! - [`activations`] - Activation functions selectable by name
//! - [`agent`] - Evolvable agent traits, the DQN agent and checkpoints
//! - [`config`] - Run configuration (`INIT_HP`, `MUTATION_PARAMS`, `NET_CONFIG`)
//! - [`env`] - Environment trait, vectorized environments and CartPole
//! - [`error`] - Error types and result handling
//! - [`hpo`] - Tournament selection and the mutation engine
//! - [`hyperparameter`] - Bounded, mutable learning hyperparameters
//! - [`layers`] - Dense layers and weight initialization
//! - [`network`] - Network descriptors, materialization and migration
//! - [`optimizer`] - Adam with migratable state and gradient clipping
//! - [`replay_buffer`] - Experience replay for off-policy agents
//! - [`train`] - The generational evolution loop
//! - [`utils`] - Population construction and score helpers

pub mod activations;
pub mod agent;
pub mod config;
pub mod env;
pub mod error;
pub mod hpo;
pub mod hyperparameter;
pub mod layers;
pub mod network;
pub mod optimizer;
pub mod replay_buffer;
pub mod train;
pub mod utils;

#[cfg(test)]
mod tests;
