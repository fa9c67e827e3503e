use std::path::Path;

use ndarray::{Array2, ArrayView1};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::agent::checkpoint;
use crate::agent::traits::{AgentMeta, EvolvableAgent, RlAgent, TrainStats};
use crate::config::InitHp;
use crate::env::{Environment, VecEnv};
use crate::error::{EvoError, Result};
use crate::hpo::mutation::classic_parameter_mutation;
use crate::hyperparameter::HyperparameterSpace;
use crate::network::{DenseNetwork, DescriptorMutation, NetworkDescriptor};
use crate::optimizer::{Adam, GradientClipper};
use crate::replay_buffer::{Experience, ReplayBuffer};
use crate::utils::calculate_vectorized_scores;

/// Algorithm tag stored in checkpoints.
pub const ALGO: &str = "DQN";

/// Fixed (non-evolving) settings of a DQN individual.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DqnSettings {
    pub gamma: f32,
    pub tau: f32,
    /// Double DQN: the online network picks the next action, the target
    /// network values it.
    pub double: bool,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay: f32,
    pub memory_size: usize,
    pub clipper: GradientClipper,
}

impl Default for DqnSettings {
    fn default() -> Self {
        DqnSettings::from_init_hp(&InitHp::default())
    }
}

impl DqnSettings {
    pub fn from_init_hp(init_hp: &InitHp) -> Self {
        DqnSettings {
            gamma: init_hp.gamma as f32,
            tau: init_hp.tau as f32,
            double: init_hp.double,
            epsilon_start: init_hp.epsilon_start,
            epsilon_end: init_hp.epsilon_end,
            epsilon_decay: init_hp.epsilon_decay,
            memory_size: init_hp.memory_size,
            clipper: init_hp
                .max_grad_norm
                .map_or(GradientClipper::None, |max_norm| GradientClipper::ClipByGlobalNorm { max_norm }),
        }
    }
}

/// Evolvable Deep Q-Network individual.
///
/// Owns an online network, a Polyak-averaged target network, Adam state and
/// a replay buffer. The evolving hyperparameters are `lr`, `batch_size` and
/// `learn_step`; their current values are mirrored into plain fields by
/// [`sync_hyperparameters`](EvolvableAgent::sync_hyperparameters).
///
/// ```rust
/// use evorl::agent::{EvolvableAgent, EvolvableDqn, DqnSettings};
/// use evorl::config::EvolutionConfig;
/// use rand::SeedableRng;
///
/// let config = EvolutionConfig::default();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// let descriptor = config.net_config.descriptor(4, 2).unwrap();
/// let space = config.mutation_params.hyperparameters(&config.init_hp);
/// let agent = EvolvableDqn::new(0, descriptor, space, DqnSettings::default(), &mut rng).unwrap();
///
/// let copy = agent.clone_with_id(7);
/// assert_eq!(copy.id(), 7);
/// assert_eq!(copy.actor, agent.actor);
/// ```
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EvolvableDqn {
    pub meta: AgentMeta,
    descriptor: NetworkDescriptor,
    pub actor: DenseNetwork,
    pub actor_target: DenseNetwork,
    optimizer: Adam,
    hyperparameters: HyperparameterSpace,
    lr: f32,
    batch_size: usize,
    learn_step: usize,
    pub settings: DqnSettings,
    pub epsilon: f32,
    /// Vectorized environment steps, used to schedule updates.
    vector_steps: usize,
    #[serde(skip)]
    memory: ReplayBuffer,
}

impl EvolvableDqn {
    pub fn new<R: Rng + ?Sized>(
        id: usize,
        descriptor: NetworkDescriptor,
        hyperparameters: HyperparameterSpace,
        settings: DqnSettings,
        rng: &mut R,
    ) -> Result<Self> {
        descriptor.validate()?;
        hyperparameters.validate()?;
        let actor = DenseNetwork::materialize(&descriptor, rng);
        let actor_target = actor.clone();
        let optimizer = Adam::for_network(&actor);
        let mut agent = EvolvableDqn {
            meta: AgentMeta::new(id),
            descriptor,
            actor,
            actor_target,
            optimizer,
            hyperparameters,
            lr: 0.0,
            batch_size: 1,
            learn_step: 1,
            epsilon: settings.epsilon_start,
            memory: ReplayBuffer::new(settings.memory_size),
            settings,
            vector_steps: 0,
        };
        agent.sync_hyperparameters()?;
        Ok(agent)
    }

    pub fn lr(&self) -> f32 {
        self.lr
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn learn_step(&self) -> usize {
        self.learn_step
    }

    pub fn optimizer(&self) -> &Adam {
        &self.optimizer
    }

    pub fn memory(&self) -> &ReplayBuffer {
        &self.memory
    }

    pub fn remember(&mut self, experience: Experience) {
        self.memory.add(experience);
    }

    /// Greedy action. Non-finite Q-values are a numerical failure.
    pub fn greedy_action(&self, state: ArrayView1<f32>) -> Result<usize> {
        let q_values = self.actor.predict(state);
        if q_values.iter().any(|q| !q.is_finite()) {
            return Err(EvoError::NumericalError(format!(
                "agent {} produced non-finite Q-values",
                self.meta.id
            )));
        }
        Ok(argmax(q_values.view()))
    }

    /// Epsilon-greedy action.
    pub fn act<R: Rng + ?Sized>(&self, state: ArrayView1<f32>, epsilon: f32, rng: &mut R) -> Result<usize> {
        if rng.gen::<f32>() < epsilon {
            Ok(rng.gen_range(0..self.descriptor.num_outputs))
        } else {
            self.greedy_action(state)
        }
    }

    /// One gradient step on a sampled minibatch; returns the TD loss.
    pub fn learn<R: Rng + ?Sized>(&mut self, rng: &mut R) -> Result<f32> {
        if self.memory.is_empty() {
            return Err(EvoError::EmptyBuffer("no experiences to learn from".to_string()));
        }
        let num_inputs = self.descriptor.num_inputs;
        let batch = self.memory.sample(self.batch_size, rng);
        let n = batch.len();

        let mut states = Array2::zeros((n, num_inputs));
        let mut next_states = Array2::zeros((n, num_inputs));
        for (i, exp) in batch.iter().enumerate() {
            if exp.state.len() != num_inputs || exp.next_state.len() != num_inputs {
                return Err(EvoError::dimension_mismatch(
                    format!("observations of size {}", num_inputs),
                    format!("{} / {}", exp.state.len(), exp.next_state.len()),
                ));
            }
            states.row_mut(i).assign(&exp.state);
            next_states.row_mut(i).assign(&exp.next_state);
        }

        let next_target = self.actor_target.predict_batch(next_states.view());
        let next_values: Vec<f32> = if self.settings.double {
            let next_online = self.actor.predict_batch(next_states.view());
            next_online
                .outer_iter()
                .enumerate()
                .map(|(i, row)| next_target[[i, argmax(row)]])
                .collect()
        } else {
            next_target
                .outer_iter()
                .map(|row| row.iter().fold(f32::NEG_INFINITY, |m, &q| m.max(q)))
                .collect()
        };

        let q_values = self.actor.forward_batch(states.view());
        let mut errors = Array2::zeros(q_values.dim());
        let mut loss = 0.0;
        for (i, exp) in batch.iter().enumerate() {
            let bootstrap = if exp.done { 0.0 } else { self.settings.gamma * next_values[i] };
            let diff = q_values[[i, exp.action]] - (exp.reward + bootstrap);
            errors[[i, exp.action]] = 2.0 * diff / n as f32;
            loss += diff * diff;
        }
        let loss = loss / n as f32;
        if !loss.is_finite() {
            self.actor.clear_caches();
            return Err(EvoError::NumericalError(format!("agent {} diverged: TD loss {}", self.meta.id, loss)));
        }

        let mut gradients = self.actor.backward_batch(errors.view())?;
        self.actor.clear_caches();
        self.settings.clipper.clip(&mut gradients);
        self.optimizer.step(&mut self.actor, &gradients, self.lr)?;
        self.actor_target.soft_update_from(&self.actor, self.settings.tau)?;
        Ok(loss)
    }

    fn check_envs<E: Environment>(&self, envs: &VecEnv<E>) -> Result<()> {
        let expected = (self.descriptor.num_inputs, self.descriptor.num_outputs);
        let found = (envs.observation_dim(), envs.num_actions());
        if expected != found {
            return Err(EvoError::Environment(format!(
                "agent expects {} observations and {} actions, environment has {} and {}",
                expected.0, expected.1, found.0, found.1
            )));
        }
        Ok(())
    }
}

fn argmax(values: ArrayView1<f32>) -> usize {
    values
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best, best_q), (i, &q)| if q > best_q { (i, q) } else { (best, best_q) })
        .0
}

impl EvolvableAgent for EvolvableDqn {
    fn meta(&self) -> &AgentMeta {
        &self.meta
    }

    fn meta_mut(&mut self) -> &mut AgentMeta {
        &mut self.meta
    }

    fn clone_with_id(&self, id: usize) -> Self {
        let mut clone = self.clone();
        clone.meta = self.meta.derive(id);
        clone
    }

    fn descriptor(&self) -> &NetworkDescriptor {
        &self.descriptor
    }

    fn apply_architecture<R: Rng + ?Sized>(&mut self, mutation: &DescriptorMutation, rng: &mut R) -> Result<()> {
        let next = &mutation.descriptor;
        next.validate()?;
        let actor = self.actor.migrate(&self.descriptor, next, &mutation.plan, rng)?;
        // New regions of the target start equal to the actor's; preserved ones keep their Polyak state.
        let actor_target = self.actor_target.migrate_onto(&self.descriptor, next, &mutation.plan, &actor)?;
        let optimizer = self.optimizer.migrate(&mutation.plan, &next.layer_shapes())?;

        self.actor = actor;
        self.actor_target = actor_target;
        self.optimizer = optimizer;
        self.descriptor = next.clone();
        Ok(())
    }

    fn perturb_parameters<R: Rng + ?Sized>(&mut self, mutation_sd: f64, rng: &mut R) {
        classic_parameter_mutation(&mut self.actor, mutation_sd, rng);
    }

    fn hyperparameters(&self) -> &HyperparameterSpace {
        &self.hyperparameters
    }

    fn hyperparameters_mut(&mut self) -> &mut HyperparameterSpace {
        &mut self.hyperparameters
    }

    fn sync_hyperparameters(&mut self) -> Result<()> {
        let space = &self.hyperparameters;
        let lookup = |name: &str| {
            space
                .get(name)
                .ok_or_else(|| EvoError::invalid_config(name.to_string(), "missing from the hyperparameter space".to_string()))
        };
        let lr = lookup("lr")?.value as f32;
        let batch_size = lookup("batch_size")?.as_usize().max(1);
        let learn_step = lookup("learn_step")?.as_usize().max(1);
        if !(lr.is_finite() && lr > 0.0) {
            return Err(EvoError::invalid_config("lr".to_string(), format!("must be positive, got {}", lr)));
        }
        self.lr = lr;
        self.batch_size = batch_size;
        self.learn_step = learn_step;
        Ok(())
    }

    fn save_checkpoint(&self, path: &Path) -> Result<()> {
        checkpoint::save(path, ALGO, self)
    }

    fn load_checkpoint(path: &Path) -> Result<Self> {
        let mut agent: EvolvableDqn = checkpoint::load(path, ALGO)?;
        let consistent = agent.descriptor.validate().is_ok()
            && agent.actor.matches(&agent.descriptor)
            && agent.actor_target.matches(&agent.descriptor)
            && agent.optimizer.fits(&agent.actor);
        if !consistent {
            return Err(EvoError::IncompatibleCheckpoint {
                expected: format!("networks shaped {:?}", agent.descriptor.layer_shapes()),
                found: format!("networks shaped {:?}", agent.actor.shapes()),
            });
        }
        agent.memory = ReplayBuffer::new(agent.settings.memory_size);
        agent.sync_hyperparameters()?;
        Ok(agent)
    }
}

impl<E: Environment> RlAgent<E> for EvolvableDqn {
    fn train<R: Rng + ?Sized>(
        &mut self,
        envs: &mut VecEnv<E>,
        steps: usize,
        learning_delay: usize,
        rng: &mut R,
    ) -> Result<TrainStats> {
        self.check_envs(envs)?;
        let num_envs = envs.len();
        let mut states = envs.reset_all()?;
        let mut stats = TrainStats::default();
        let mut loss_sum = 0.0;

        while stats.steps < steps {
            for (env, state) in envs.envs_mut().iter_mut().zip(states.iter_mut()) {
                let action = self.act(state.view(), self.epsilon, rng)?;
                let step = env.step(action)?;
                let next_state = if step.is_last() {
                    stats.episodes += 1;
                    env.reset()?
                } else {
                    step.observation.clone()
                };
                let state = std::mem::replace(state, next_state);
                self.memory.add(Experience {
                    state,
                    action,
                    reward: step.reward,
                    next_state: step.observation,
                    done: step.done,
                });
            }
            stats.steps += num_envs;
            self.meta.steps += num_envs;
            self.vector_steps += 1;
            self.epsilon = (self.epsilon * self.settings.epsilon_decay).max(self.settings.epsilon_end);

            let ready = self.meta.steps > learning_delay && self.memory.len() >= self.batch_size;
            if ready && self.vector_steps % self.learn_step == 0 {
                loss_sum += self.learn(rng)?;
                stats.updates += 1;
            }
        }

        stats.mean_loss = (stats.updates > 0).then(|| loss_sum / stats.updates as f32);
        Ok(stats)
    }

    fn evaluate_fitness(&self, envs: &mut VecEnv<E>, episodes: usize, max_steps: Option<usize>) -> Result<f32> {
        self.check_envs(envs)?;
        let episodes = episodes.max(1);
        let mut total = 0.0;

        for _ in 0..episodes {
            let mut states = envs.reset_all()?;
            let num_envs = states.len();
            let mut rewards = vec![Vec::new(); num_envs];
            let mut terminations = vec![Vec::new(); num_envs];
            let mut finished = vec![false; num_envs];
            let mut t = 0;

            while finished.iter().any(|f| !f) && max_steps.map_or(true, |cap| t < cap) {
                for (i, env) in envs.envs_mut().iter_mut().enumerate() {
                    if finished[i] {
                        continue;
                    }
                    let action = self.greedy_action(states[i].view())?;
                    let step = env.step(action)?;
                    rewards[i].push(step.reward);
                    terminations[i].push(step.is_last());
                    finished[i] = step.is_last();
                    states[i] = step.observation;
                }
                t += 1;
            }

            let scores = calculate_vectorized_scores(&rewards, &terminations, true, true);
            total += scores.iter().sum::<f32>() / scores.len().max(1) as f32;
        }

        let fitness = total / episodes as f32;
        if !fitness.is_finite() {
            return Err(EvoError::NumericalError(format!("agent {} scored {}", self.meta.id, fitness)));
        }
        Ok(fitness)
    }
}
