use std::path::Path;

use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::env::{Environment, VecEnv};
use crate::error::Result;
use crate::hyperparameter::HyperparameterSpace;
use crate::network::{ArchitectureChange, DescriptorMutation, NetworkDescriptor};

/// Fitness assigned to an individual without history or whose evaluation
/// failed. Ranks below every real score.
pub const WORST_FITNESS: f32 = f32::NEG_INFINITY;

/// What the mutation engine did to an individual in the last generation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MutationOutcome {
    /// Not mutated yet, or the "none" category was drawn.
    None,
    /// Carried forward untouched as the elite.
    Elite,
    Architecture(ArchitectureChange),
    /// An architecture mutation was drawn but every option hit a bound.
    ArchitectureNoOp,
    Parameters,
    Activation(ArchitectureChange),
    ActivationNoOp,
    RlHyperparameter { name: String, value: f64 },
    RlHyperparameterNoOp,
    /// Materializing the mutated network failed; the individual is unchanged.
    Failed(String),
}

impl MutationOutcome {
    /// Short label for reports.
    pub fn label(&self) -> String {
        match self {
            MutationOutcome::None => "None".to_string(),
            MutationOutcome::Elite => "Elite".to_string(),
            MutationOutcome::Architecture(change) => format!("Arch({:?})", change),
            MutationOutcome::ArchitectureNoOp => "Arch(no-op)".to_string(),
            MutationOutcome::Parameters => "Params".to_string(),
            MutationOutcome::Activation(ArchitectureChange::Activation { to, .. }) => format!("Act({})", to.name()),
            MutationOutcome::Activation(change) => format!("Act({:?})", change),
            MutationOutcome::ActivationNoOp => "Act(no-op)".to_string(),
            MutationOutcome::RlHyperparameter { name, value } => format!("{}={:.6}", name, value),
            MutationOutcome::RlHyperparameterNoOp => "RL HP(no-op)".to_string(),
            MutationOutcome::Failed(reason) => format!("Failed({})", reason),
        }
    }
}

impl Default for MutationOutcome {
    fn default() -> Self {
        MutationOutcome::None
    }
}

/// Bookkeeping the evolution engine keeps on every individual.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentMeta {
    pub id: usize,
    /// Id of the individual this one was cloned from.
    pub parent: Option<usize>,
    pub generation: usize,
    /// One entry per evaluation, oldest first.
    pub fitness: Vec<f32>,
    /// Environment steps taken over the individual's lineage.
    pub steps: usize,
    pub elite: bool,
    pub last_mutation: MutationOutcome,
}

impl AgentMeta {
    pub fn new(id: usize) -> Self {
        AgentMeta { id, ..Default::default() }
    }

    /// Mean of the last `window` fitness values, or [`WORST_FITNESS`] when
    /// there is no history. NaN entries count as the worst fitness.
    pub fn mean_fitness(&self, window: usize) -> f32 {
        let window = window.max(1).min(self.fitness.len());
        if window == 0 {
            return WORST_FITNESS;
        }
        let recent = &self.fitness[self.fitness.len() - window..];
        if recent.iter().any(|f| f.is_nan()) {
            return WORST_FITNESS;
        }
        recent.iter().sum::<f32>() / window as f32
    }

    /// Copy for a new individual: same lineage and history, fresh id, not elite.
    /// A copy that keeps `self.id` is the same individual and keeps its parent.
    pub fn derive(&self, id: usize) -> Self {
        AgentMeta {
            id,
            parent: if id == self.id { self.parent } else { Some(self.id) },
            elite: false,
            last_mutation: MutationOutcome::None,
            ..self.clone()
        }
    }
}

/// What the evolution engine needs from an individual.
pub trait EvolvableAgent: Send + Sized {
    fn meta(&self) -> &AgentMeta;

    fn meta_mut(&mut self) -> &mut AgentMeta;

    fn id(&self) -> usize {
        self.meta().id
    }

    /// Selection fitness: mean of the last `window` evaluations.
    fn fitness(&self, window: usize) -> f32 {
        self.meta().mean_fitness(window)
    }

    fn is_elite(&self) -> bool {
        self.meta().elite
    }

    /// Deep copy of parameters, optimizer state and hyperparameters under a new id.
    fn clone_with_id(&self, id: usize) -> Self;

    fn descriptor(&self) -> &NetworkDescriptor;

    /// Rebuild every network and its optimizer state for `mutation.descriptor`,
    /// following `mutation.plan`. On error the agent is left unchanged.
    fn apply_architecture<R: Rng + ?Sized>(&mut self, mutation: &DescriptorMutation, rng: &mut R) -> Result<()>;

    /// Gaussian noise on the trainable weights.
    fn perturb_parameters<R: Rng + ?Sized>(&mut self, mutation_sd: f64, rng: &mut R);

    fn hyperparameters(&self) -> &HyperparameterSpace;

    fn hyperparameters_mut(&mut self) -> &mut HyperparameterSpace;

    /// Push hyperparameter values into whatever state depends on them.
    fn sync_hyperparameters(&mut self) -> Result<()>;

    fn save_checkpoint(&self, path: &Path) -> Result<()>;

    fn load_checkpoint(path: &Path) -> Result<Self>;
}

/// Counters from one training call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrainStats {
    pub steps: usize,
    pub episodes: usize,
    pub updates: usize,
    /// Mean loss over the gradient updates, if any happened.
    pub mean_loss: Option<f32>,
}

/// An individual that can learn in, and be scored on, environments of type `E`.
pub trait RlAgent<E: Environment>: EvolvableAgent {
    /// Collect `steps` environment steps across `envs`, learning once the
    /// individual is past `learning_delay` total steps.
    fn train<R: Rng + ?Sized>(
        &mut self,
        envs: &mut VecEnv<E>,
        steps: usize,
        learning_delay: usize,
        rng: &mut R,
    ) -> Result<TrainStats>;

    /// Greedy return averaged over `episodes` rounds of one episode per
    /// environment, each capped at `max_steps`. Training state is untouched;
    /// recording the score is up to the caller.
    fn evaluate_fitness(&self, envs: &mut VecEnv<E>, episodes: usize, max_steps: Option<usize>) -> Result<f32>;
}
