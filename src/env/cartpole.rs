use ndarray::{array, Array1};
use rand::{Rng, SeedableRng};
use rand::rngs::StdRng;
use std::f32::consts::PI;

use crate::error::{EvoError, Result};
use super::{Environment, Step};

const GRAVITY: f32 = 9.8;
const MASS_CART: f32 = 1.0;
const MASS_POLE: f32 = 0.1;
const LENGTH: f32 = 0.5;
const FORCE_MAG: f32 = 10.0;
const DT: f32 = 0.02;
const X_THRESHOLD: f32 = 2.4;
const THETA_THRESHOLD: f32 = 12.0 * 2.0 * PI / 360.0;

/// Classic cart-pole balancing task: reward 1 per step, two actions.
#[derive(Clone, Debug)]
pub struct CartPole {
    state: [f32; 4],
    steps: usize,
    max_episode_steps: usize,
    needs_reset: bool,
    rng: StdRng,
}

impl CartPole {
    pub fn new(seed: u64) -> Self {
        CartPole {
            state: [0.0; 4],
            steps: 0,
            max_episode_steps: 500,
            needs_reset: true,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn with_max_episode_steps(mut self, max_episode_steps: usize) -> Self {
        self.max_episode_steps = max_episode_steps.max(1);
        self
    }

    fn observation(&self) -> Array1<f32> {
        let [x, x_dot, theta, theta_dot] = self.state;
        array![x, x_dot, theta, theta_dot]
    }
}

impl Environment for CartPole {
    fn observation_dim(&self) -> usize {
        4
    }

    fn num_actions(&self) -> usize {
        2
    }

    fn reset(&mut self) -> Result<Array1<f32>> {
        for v in self.state.iter_mut() {
            *v = self.rng.gen_range(-0.05..0.05);
        }
        self.steps = 0;
        self.needs_reset = false;
        Ok(self.observation())
    }

    fn step(&mut self, action: usize) -> Result<Step> {
        if action >= 2 {
            return Err(EvoError::Environment(format!("CartPole action {} out of range 0..2", action)));
        }
        if self.needs_reset {
            return Err(EvoError::Environment("CartPole stepped before reset".to_string()));
        }

        let [x, x_dot, theta, theta_dot] = self.state;
        let force = if action == 1 { FORCE_MAG } else { -FORCE_MAG };
        let cos_theta = theta.cos();
        let sin_theta = theta.sin();
        let total_mass = MASS_CART + MASS_POLE;
        let pole_mass_length = MASS_POLE * LENGTH;

        let temp = (force + pole_mass_length * theta_dot * theta_dot * sin_theta) / total_mass;
        let theta_acc = (GRAVITY * sin_theta - cos_theta * temp)
            / (LENGTH * (4.0 / 3.0 - MASS_POLE * cos_theta * cos_theta / total_mass));
        let x_acc = temp - pole_mass_length * theta_acc * cos_theta / total_mass;

        self.state = [
            x + DT * x_dot,
            x_dot + DT * x_acc,
            theta + DT * theta_dot,
            theta_dot + DT * theta_acc,
        ];
        self.steps += 1;

        let done = self.state[0].abs() > X_THRESHOLD || self.state[2].abs() > THETA_THRESHOLD;
        let truncated = !done && self.steps >= self.max_episode_steps;
        self.needs_reset = done || truncated;

        Ok(Step {
            observation: self.observation(),
            reward: 1.0,
            done,
            truncated,
        })
    }
}
