//! # Environments
//!
//! The evolution loop only needs reset/step semantics from an environment.
//! [`Environment`] captures that contract; [`VecEnv`] bundles `NUM_ENVS`
//! instances owned by one individual; [`CartPole`] is the reference
//! implementation used by tests and the demo.
//!
//! Environments report failures through [`EvoError`](crate::error::EvoError):
//! `Evaluation` for an episode that went wrong (the individual gets the worst
//! fitness for this generation) and `Environment` for a broken setup that
//! aborts the run.

pub mod cartpole;

pub use cartpole::CartPole;

use ndarray::Array1;

use crate::error::{EvoError, Result};

/// Outcome of a single environment step.
#[derive(Clone, Debug, PartialEq)]
pub struct Step {
    pub observation: Array1<f32>,
    pub reward: f32,
    /// The episode reached a terminal state.
    pub done: bool,
    /// The episode was cut short by a step limit.
    pub truncated: bool,
}

impl Step {
    pub fn is_last(&self) -> bool {
        self.done || self.truncated
    }
}

/// Single-agent environment with a discrete action space.
pub trait Environment: Send {
    fn observation_dim(&self) -> usize;

    fn num_actions(&self) -> usize;

    /// Start a new episode and return its first observation.
    fn reset(&mut self) -> Result<Array1<f32>>;

    fn step(&mut self, action: usize) -> Result<Step>;
}

/// A fixed set of environment instances stepped in lockstep.
pub struct VecEnv<E: Environment> {
    envs: Vec<E>,
}

impl<E: Environment> VecEnv<E> {
    /// Build `num_envs` environments, seeding instance `i` with `seed + i`.
    pub fn new<F>(make_env: F, num_envs: usize, seed: u64) -> Result<Self>
    where
        F: Fn(u64) -> Result<E>,
    {
        if num_envs == 0 {
            return Err(EvoError::invalid_config("NUM_ENVS", "must be at least 1"));
        }
        let envs = (0..num_envs as u64)
            .map(|i| make_env(seed.wrapping_add(i)))
            .collect::<Result<Vec<E>>>()?;
        Self::from_envs(envs)
    }

    pub fn from_envs(envs: Vec<E>) -> Result<Self> {
        let first = envs.first().ok_or_else(|| EvoError::invalid_config("NUM_ENVS", "must be at least 1"))?;
        let (obs, actions) = (first.observation_dim(), first.num_actions());
        if envs.iter().any(|e| e.observation_dim() != obs || e.num_actions() != actions) {
            return Err(EvoError::Environment(
                "vectorized environments disagree on observation or action space".to_string(),
            ));
        }
        Ok(VecEnv { envs })
    }

    pub fn len(&self) -> usize {
        self.envs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.envs.is_empty()
    }

    pub fn observation_dim(&self) -> usize {
        self.envs[0].observation_dim()
    }

    pub fn num_actions(&self) -> usize {
        self.envs[0].num_actions()
    }

    pub fn reset_all(&mut self) -> Result<Vec<Array1<f32>>> {
        self.envs.iter_mut().map(Environment::reset).collect()
    }

    pub fn envs_mut(&mut self) -> &mut [E] {
        &mut self.envs
    }
}
