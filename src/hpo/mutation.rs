use log::{debug, warn};
use rand::Rng;
use rand::distributions::WeightedIndex;
use rand::seq::index;
use rand_distr::{Distribution, StandardNormal};

use crate::activations::Activation;
use crate::agent::{EvolvableAgent, MutationOutcome};
use crate::config::{check_probabilities, MutationParams};
use crate::error::{EvoError, Result};
use crate::network::DenseNetwork;

/// Fraction of a weight matrix touched by one parameter mutation.
pub const MUTATION_RATE: f64 = 0.1;
/// Share of touched weights that get a super mutation.
pub const SUPER_MUTATION_PROB: f32 = 0.05;
/// Share of touched weights reset to a standard normal draw.
pub const RESET_PROB: f32 = 0.02;
pub const SUPER_MUTATION_STRENGTH: f32 = 10.0;
/// Magnitude bound applied after parameter noise.
pub const WEIGHT_MAGNITUDE: f32 = 1e6;

/// The five mutually exclusive things that can happen to an individual.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationCategory {
    None,
    Architecture,
    Parameters,
    Activation,
    RlHyperparameter,
}

const CATEGORIES: [MutationCategory; 5] = [
    MutationCategory::None,
    MutationCategory::Architecture,
    MutationCategory::Parameters,
    MutationCategory::Activation,
    MutationCategory::RlHyperparameter,
];

/// Clamp a weight into `[-magnitude, magnitude]`.
pub fn regularize_weight(weight: f32, magnitude: f32) -> f32 {
    if weight > magnitude {
        magnitude
    } else if weight < -magnitude {
        -magnitude
    } else {
        weight
    }
}

/// Perturb a random tenth of every hidden weight matrix.
///
/// Each touched weight `w` either gets a super mutation `N(0, |10 w|)`, is
/// reset to `N(0, 1)`, or gets `N(0, |mutation_sd * w|)`. The output layer
/// and all biases are left alone.
pub fn classic_parameter_mutation<R: Rng + ?Sized>(network: &mut DenseNetwork, mutation_sd: f64, rng: &mut R) {
    let hidden = network.layers.len().saturating_sub(1);
    let mutation_sd = mutation_sd as f32;
    for layer in network.layers.iter_mut().take(hidden) {
        let weights = &mut layer.weights;
        let (len, cols) = (weights.len(), weights.ncols());
        let count = ((len as f64) * MUTATION_RATE).ceil() as usize;
        for i in index::sample(rng, len, count.min(len)) {
            let idx = [i / cols, i % cols];
            let w = weights[idx];
            let roll: f32 = rng.gen();
            let noise: f32 = StandardNormal.sample(rng);
            let mutated = if roll < SUPER_MUTATION_PROB {
                w + (SUPER_MUTATION_STRENGTH * w).abs() * noise
            } else if roll < SUPER_MUTATION_PROB + RESET_PROB {
                noise
            } else {
                w + (mutation_sd * w).abs() * noise
            };
            weights[idx] = regularize_weight(mutated, WEIGHT_MAGNITUDE);
        }
    }
}

/// Mutation engine.
///
/// Every generation each individual receives exactly one category, drawn
/// from the weights over none / architecture / parameters / activation /
/// RL hyperparameter, which must sum to one. Inside an architecture mutation,
/// `new_layer_prob` chooses between a layer-count change and a width change;
/// a width change resizes the latent vector with `latent_mutation_prob`.
///
/// ```rust
/// use evorl::hpo::{MutationCategory, Mutations};
/// use rand::SeedableRng;
///
/// let mutations = Mutations::new(0.0, 0.0, 0.2, 1.0, 0.0, 0.0, 0.1).unwrap();
/// let mut rng = rand::rngs::StdRng::seed_from_u64(0);
/// assert_eq!(mutations.sample_category(false, &mut rng), MutationCategory::Parameters);
///
/// // Weights that do not sum to one are a configuration error.
/// assert!(Mutations::new(0.0, 0.0, 0.2, 0.0, 0.0, 0.0, 0.1).is_err());
/// assert!(Mutations::new(0.5, 0.5, 0.2, 0.5, 0.0, 0.0, 0.1).is_err());
/// ```
#[derive(Debug, Clone)]
pub struct Mutations {
    probabilities: [f64; 5],
    new_layer_prob: f64,
    latent_mutation_prob: f64,
    mutation_sd: f64,
    activation_selection: Vec<Activation>,
    rl_hp_selection: Vec<String>,
    mutate_elite: bool,
}

impl Mutations {
    pub fn new(
        no_mutation: f64,
        architecture: f64,
        new_layer_prob: f64,
        parameters: f64,
        activation: f64,
        rl_hp: f64,
        mutation_sd: f64,
    ) -> Result<Self> {
        let weights = [no_mutation, architecture, parameters, activation, rl_hp];
        // Dividing by the total only absorbs float drift within the tolerance.
        let total = check_probabilities(&weights)?;
        if !(0.0..=1.0).contains(&new_layer_prob) {
            return Err(EvoError::invalid_config("NEW_LAYER".to_string(), format!("must lie in [0, 1], got {}", new_layer_prob)));
        }
        if !(mutation_sd.is_finite() && mutation_sd >= 0.0) {
            return Err(EvoError::invalid_config("MUTATION_SD".to_string(), format!("must be non-negative, got {}", mutation_sd)));
        }
        Ok(Mutations {
            probabilities: weights.map(|w| w / total),
            new_layer_prob,
            latent_mutation_prob: 0.1,
            mutation_sd,
            activation_selection: vec![Activation::Relu, Activation::Elu { alpha: 1.0 }, Activation::Gelu],
            rl_hp_selection: vec!["lr".to_string(), "batch_size".to_string(), "learn_step".to_string()],
            mutate_elite: false,
        })
    }

    pub fn from_config(params: &MutationParams) -> Result<Self> {
        params.validate()?;
        Ok(Self::new(
            params.no_mut,
            params.arch_mut,
            params.new_layer,
            params.params_mut,
            params.act_mut,
            params.rl_hp_mut,
            params.mutation_sd,
        )?
        .with_activation_selection(params.activations()?)
        .with_rl_hp_selection(params.rl_hp_selection.clone())
        .with_mutate_elite(params.mutate_elite)
        .with_latent_mutation_prob(params.latent_mutation_prob))
    }

    pub fn with_activation_selection(mut self, activations: Vec<Activation>) -> Self {
        self.activation_selection = activations;
        self
    }

    pub fn with_rl_hp_selection(mut self, names: Vec<String>) -> Self {
        self.rl_hp_selection = names;
        self
    }

    pub fn with_mutate_elite(mut self, mutate_elite: bool) -> Self {
        self.mutate_elite = mutate_elite;
        self
    }

    pub fn with_latent_mutation_prob(mut self, p: f64) -> Self {
        self.latent_mutation_prob = p.max(0.0).min(1.0);
        self
    }

    /// Category probabilities in [`MutationCategory`] order.
    pub fn probabilities(&self) -> [f64; 5] {
        self.probabilities
    }

    /// Draw one category. With `pre_training_mut` the "none" category is
    /// excluded so every individual changes; if nothing else has weight the
    /// draw falls back to none.
    pub fn sample_category<R: Rng + ?Sized>(&self, pre_training_mut: bool, rng: &mut R) -> MutationCategory {
        let mut weights = self.probabilities;
        if pre_training_mut {
            weights[0] = 0.0;
        }
        match WeightedIndex::new(weights) {
            Ok(dist) => CATEGORIES[dist.sample(rng)],
            Err(_) => MutationCategory::None,
        }
    }

    /// Mutate every individual in place and hand the population back.
    /// Population size never changes.
    pub fn mutation<A, R>(&self, mut population: Vec<A>, pre_training_mut: bool, rng: &mut R) -> Vec<A>
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        for agent in population.iter_mut() {
            let outcome = self.mutate_agent(agent, pre_training_mut, rng);
            debug!("agent {}: {}", agent.id(), outcome.label());
            agent.meta_mut().last_mutation = outcome;
        }
        population
    }

    /// Apply one mutation to `agent` and report what happened.
    pub fn mutate_agent<A, R>(&self, agent: &mut A, pre_training_mut: bool, rng: &mut R) -> MutationOutcome
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        if agent.is_elite() && !self.mutate_elite {
            return MutationOutcome::Elite;
        }
        match self.sample_category(pre_training_mut, rng) {
            MutationCategory::None => MutationOutcome::None,
            MutationCategory::Architecture => self.architecture_mutation(agent, rng),
            MutationCategory::Parameters => {
                agent.perturb_parameters(self.mutation_sd, rng);
                MutationOutcome::Parameters
            }
            MutationCategory::Activation => self.activation_mutation(agent, rng),
            MutationCategory::RlHyperparameter => self.rl_hyperparameter_mutation(agent, rng),
        }
    }

    fn architecture_mutation<A, R>(&self, agent: &mut A, rng: &mut R) -> MutationOutcome
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        let descriptor = agent.descriptor();
        let proposal = if rng.gen_bool(self.new_layer_prob) {
            descriptor.mutate_architecture(rng)
        } else if rng.gen_bool(self.latent_mutation_prob) {
            descriptor.mutate_latent_dim(rng)
        } else {
            descriptor.mutate_nodes(rng)
        };
        let Some(mutation) = proposal else {
            return MutationOutcome::ArchitectureNoOp;
        };
        match agent.apply_architecture(&mutation, rng) {
            Ok(()) => MutationOutcome::Architecture(mutation.change),
            Err(e) => {
                warn!("agent {}: architecture mutation {:?} failed: {}", agent.id(), mutation.change, e);
                MutationOutcome::Failed(e.to_string())
            }
        }
    }

    fn activation_mutation<A, R>(&self, agent: &mut A, rng: &mut R) -> MutationOutcome
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        let Some(mutation) = agent.descriptor().mutate_activation(&self.activation_selection, rng) else {
            return MutationOutcome::ActivationNoOp;
        };
        match agent.apply_architecture(&mutation, rng) {
            Ok(()) => MutationOutcome::Activation(mutation.change),
            Err(e) => {
                warn!("agent {}: activation mutation failed: {}", agent.id(), e);
                MutationOutcome::Failed(e.to_string())
            }
        }
    }

    fn rl_hyperparameter_mutation<A, R>(&self, agent: &mut A, rng: &mut R) -> MutationOutcome
    where
        A: EvolvableAgent,
        R: Rng + ?Sized,
    {
        let previous = agent.hyperparameters().clone();
        let Some((name, value)) = agent.hyperparameters_mut().mutate_one(&self.rl_hp_selection, rng) else {
            return MutationOutcome::RlHyperparameterNoOp;
        };
        match agent.sync_hyperparameters() {
            Ok(()) => MutationOutcome::RlHyperparameter { name, value },
            Err(e) => {
                warn!("agent {}: hyperparameter {} = {} rejected: {}", agent.id(), name, value, e);
                *agent.hyperparameters_mut() = previous;
                MutationOutcome::Failed(e.to_string())
            }
        }
    }
}
