//! Evolvable network descriptors.
//!
//! A [`NetworkDescriptor`] is the blueprint of a Q-network: an encoder MLP that
//! maps observations to a latent vector, followed by a head MLP that maps the
//! latent vector to outputs. The materialized layer stack is
//!
//! ```text
//! inputs -> encoder hidden... -> latent_dim -> head hidden... -> outputs
//! ```
//!
//! Every structural mutation returns a new descriptor together with the
//! [`MigrationPlan`] that carries trained weights across the change. A mutation
//! that would leave the configured [`ArchitectureBounds`] is a no-op and returns
//! `None`.

use rand::Rng;
use rand::seq::SliceRandom;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{EvoError, Result};
use super::migration::MigrationPlan;

/// Layout version written into checkpoints.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Candidate widths for node mutations on hidden layers.
const NODE_CHOICES: [usize; 3] = [16, 32, 64];

/// Candidate widths for latent-dimension mutations.
const LATENT_CHOICES: [usize; 3] = [8, 16, 32];

/// Hard limits every descriptor must stay inside, per block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ArchitectureBounds {
    pub min_hidden_layers: usize,
    pub max_hidden_layers: usize,
    pub min_mlp_nodes: usize,
    pub max_mlp_nodes: usize,
    pub min_latent_dim: usize,
    pub max_latent_dim: usize,
}

impl Default for ArchitectureBounds {
    fn default() -> Self {
        ArchitectureBounds {
            min_hidden_layers: 1,
            max_hidden_layers: 3,
            min_mlp_nodes: 16,
            max_mlp_nodes: 500,
            min_latent_dim: 8,
            max_latent_dim: 128,
        }
    }
}

impl ArchitectureBounds {
    pub fn validate(&self) -> Result<()> {
        if self.min_hidden_layers > self.max_hidden_layers {
            return Err(EvoError::invalid_config(
                "MIN_HIDDEN_LAYERS".to_string(),
                format!("{} exceeds MAX_HIDDEN_LAYERS {}", self.min_hidden_layers, self.max_hidden_layers),
            ));
        }
        if self.min_mlp_nodes == 0 || self.min_mlp_nodes > self.max_mlp_nodes {
            return Err(EvoError::invalid_config(
                "MIN_MLP_NODES".to_string(),
                format!("range [{}, {}] is empty or starts at zero", self.min_mlp_nodes, self.max_mlp_nodes),
            ));
        }
        if self.min_latent_dim == 0 || self.min_latent_dim > self.max_latent_dim {
            return Err(EvoError::invalid_config(
                "MIN_LATENT_DIM".to_string(),
                format!("range [{}, {}] is empty or starts at zero", self.min_latent_dim, self.max_latent_dim),
            ));
        }
        Ok(())
    }
}

/// One hidden layer: output width and activation tag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    pub width: usize,
    pub activation: Activation,
}

/// Ordered hidden layers of one MLP block.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct LayerSpec {
    pub layers: Vec<LayerDescriptor>,
}

impl LayerSpec {
    pub fn new(widths: &[usize], activation: Activation) -> Self {
        LayerSpec {
            layers: widths.iter().map(|&width| LayerDescriptor { width, activation }).collect(),
        }
    }

    pub fn widths(&self) -> Vec<usize> {
        self.layers.iter().map(|l| l.width).collect()
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncoderConfig {
    pub hidden: LayerSpec,
    pub latent_dim: usize,
    pub latent_activation: Activation,
    /// Recurrent agents expose the latent vector as carried hidden state,
    /// which pins `latent_dim` for the lifetime of the individual.
    pub use_hidden_state: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadConfig {
    pub hidden: LayerSpec,
    pub output_activation: Activation,
}

/// Which MLP block a mutation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Block {
    Encoder,
    Head,
}

/// Structural change recorded alongside a mutated descriptor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ArchitectureChange {
    AddLayer { block: Block },
    RemoveLayer { block: Block },
    AddNodes { block: Block, layer: usize, count: usize },
    RemoveNodes { block: Block, layer: usize, count: usize },
    LatentDim { from: usize, to: usize },
    Activation { from: Activation, to: Activation },
}

/// Result of a successful structural mutation.
#[derive(Debug, Clone)]
pub struct DescriptorMutation {
    pub descriptor: NetworkDescriptor,
    pub plan: MigrationPlan,
    pub change: ArchitectureChange,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkDescriptor {
    pub version: u32,
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub encoder: EncoderConfig,
    pub head: HeadConfig,
    pub bounds: ArchitectureBounds,
}

impl NetworkDescriptor {
    /// A ReLU encoder/head pair with a linear output layer.
    pub fn mlp(
        num_inputs: usize,
        num_outputs: usize,
        encoder_hidden: &[usize],
        latent_dim: usize,
        head_hidden: &[usize],
        bounds: ArchitectureBounds,
    ) -> Self {
        NetworkDescriptor {
            version: DESCRIPTOR_VERSION,
            num_inputs,
            num_outputs,
            encoder: EncoderConfig {
                hidden: LayerSpec::new(encoder_hidden, Activation::Relu),
                latent_dim,
                latent_activation: Activation::Relu,
                use_hidden_state: false,
            },
            head: HeadConfig {
                hidden: LayerSpec::new(head_hidden, Activation::Relu),
                output_activation: Activation::Linear,
            },
            bounds,
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.bounds.validate()?;
        if self.num_inputs == 0 || self.num_outputs == 0 {
            return Err(EvoError::invalid_config(
                "NET_CONFIG".to_string(),
                format!("network needs inputs and outputs, got {} -> {}", self.num_inputs, self.num_outputs),
            ));
        }
        for (name, spec) in [("ENCODER", &self.encoder.hidden), ("HEAD", &self.head.hidden)] {
            if spec.len() < self.bounds.min_hidden_layers || spec.len() > self.bounds.max_hidden_layers {
                return Err(EvoError::invalid_config(
                    format!("{}.HIDDEN_SIZE", name),
                    format!(
                        "{} hidden layers outside [{}, {}]",
                        spec.len(),
                        self.bounds.min_hidden_layers,
                        self.bounds.max_hidden_layers
                    ),
                ));
            }
            if let Some(bad) = spec
                .layers
                .iter()
                .find(|l| l.width < self.bounds.min_mlp_nodes || l.width > self.bounds.max_mlp_nodes)
            {
                return Err(EvoError::invalid_config(
                    format!("{}.HIDDEN_SIZE", name),
                    format!(
                        "width {} outside [{}, {}]",
                        bad.width, self.bounds.min_mlp_nodes, self.bounds.max_mlp_nodes
                    ),
                ));
            }
        }
        let latent = self.encoder.latent_dim;
        if latent < self.bounds.min_latent_dim || latent > self.bounds.max_latent_dim {
            return Err(EvoError::invalid_config(
                "ENCODER.LATENT_DIM".to_string(),
                format!(
                    "{} outside [{}, {}]",
                    latent, self.bounds.min_latent_dim, self.bounds.max_latent_dim
                ),
            ));
        }
        Ok(())
    }

    /// Hidden state size advertised to recurrent collaborators.
    pub fn hidden_state_size(&self) -> Option<usize> {
        self.encoder.use_hidden_state.then_some(self.encoder.latent_dim)
    }

    /// The activation shared by hidden layers, taken from the first hidden layer.
    pub fn hidden_activation(&self) -> Activation {
        self.encoder
            .hidden
            .layers
            .first()
            .or_else(|| self.head.hidden.layers.first())
            .map(|l| l.activation)
            .unwrap_or(self.encoder.latent_activation)
    }

    fn spec(&self, block: Block) -> &LayerSpec {
        match block {
            Block::Encoder => &self.encoder.hidden,
            Block::Head => &self.head.hidden,
        }
    }

    fn spec_mut(&mut self, block: Block) -> &mut LayerSpec {
        match block {
            Block::Encoder => &mut self.encoder.hidden,
            Block::Head => &mut self.head.hidden,
        }
    }

    /// Index of the first materialized layer belonging to `block`.
    fn block_offset(&self, block: Block) -> usize {
        match block {
            Block::Encoder => 0,
            Block::Head => self.encoder.hidden.len() + 1,
        }
    }

    /// Input width feeding into `block`.
    fn block_input(&self, block: Block) -> usize {
        match block {
            Block::Encoder => self.num_inputs,
            Block::Head => self.encoder.latent_dim,
        }
    }

    /// Materialized `(input, output, activation)` of every dense layer.
    pub fn layer_plan(&self) -> Vec<(usize, usize, Activation)> {
        let mut plan = Vec::with_capacity(self.encoder.hidden.len() + self.head.hidden.len() + 2);
        let mut prev = self.num_inputs;
        for layer in &self.encoder.hidden.layers {
            plan.push((prev, layer.width, layer.activation));
            prev = layer.width;
        }
        plan.push((prev, self.encoder.latent_dim, self.encoder.latent_activation));
        prev = self.encoder.latent_dim;
        for layer in &self.head.hidden.layers {
            plan.push((prev, layer.width, layer.activation));
            prev = layer.width;
        }
        plan.push((prev, self.num_outputs, self.head.output_activation));
        plan
    }

    /// Weight-matrix shapes of every dense layer.
    pub fn layer_shapes(&self) -> Vec<(usize, usize)> {
        self.layer_plan().into_iter().map(|(i, o, _)| (i, o)).collect()
    }

    pub fn num_layers(&self) -> usize {
        self.encoder.hidden.len() + self.head.hidden.len() + 2
    }

    fn finish(&self, descriptor: NetworkDescriptor, correspondence: Vec<Option<usize>>, change: ArchitectureChange) -> DescriptorMutation {
        let plan = MigrationPlan::between(&self.layer_shapes(), &descriptor.layer_shapes(), &correspondence);
        DescriptorMutation { descriptor, plan, change }
    }

    /// Append a hidden layer to `block`, copying the width of its current last
    /// hidden layer. The new layer is fresh; every other layer is preserved.
    pub fn add_layer(&self, block: Block) -> Option<DescriptorMutation> {
        let spec = self.spec(block);
        if spec.len() >= self.bounds.max_hidden_layers {
            return None;
        }
        let template = spec.layers.last().copied().unwrap_or(LayerDescriptor {
            width: self.block_input(block).max(self.bounds.min_mlp_nodes).min(self.bounds.max_mlp_nodes),
            activation: self.hidden_activation(),
        });
        let insert_at = self.block_offset(block) + spec.len();

        let mut next = self.clone();
        next.spec_mut(block).layers.push(template);

        let correspondence = (0..next.num_layers())
            .map(|i| match i.cmp(&insert_at) {
                std::cmp::Ordering::Less => Some(i),
                std::cmp::Ordering::Equal => None,
                std::cmp::Ordering::Greater => Some(i - 1),
            })
            .collect();
        Some(self.finish(next, correspondence, ArchitectureChange::AddLayer { block }))
    }

    /// Drop the last hidden layer of `block`. The layer that consumed it keeps
    /// the overlapping leading rows of its weights.
    pub fn remove_layer(&self, block: Block) -> Option<DescriptorMutation> {
        let spec = self.spec(block);
        if spec.len() <= self.bounds.min_hidden_layers || spec.is_empty() {
            return None;
        }
        let removed = self.block_offset(block) + spec.len() - 1;

        let mut next = self.clone();
        next.spec_mut(block).layers.pop();

        let correspondence = (0..next.num_layers())
            .map(|i| if i < removed { Some(i) } else { Some(i + 1) })
            .collect();
        Some(self.finish(next, correspondence, ArchitectureChange::RemoveLayer { block }))
    }

    /// Widen hidden layer `layer` of `block` by up to `count` nodes.
    pub fn add_nodes(&self, block: Block, layer: usize, count: usize) -> Option<DescriptorMutation> {
        let width = self.spec(block).layers.get(layer)?.width;
        let new_width = (width + count).min(self.bounds.max_mlp_nodes);
        if new_width <= width {
            return None;
        }
        let mut next = self.clone();
        next.spec_mut(block).layers[layer].width = new_width;
        let correspondence = (0..next.num_layers()).map(Some).collect();
        Some(self.finish(next, correspondence, ArchitectureChange::AddNodes { block, layer, count: new_width - width }))
    }

    /// Narrow hidden layer `layer` of `block` by up to `count` nodes.
    pub fn remove_nodes(&self, block: Block, layer: usize, count: usize) -> Option<DescriptorMutation> {
        let width = self.spec(block).layers.get(layer)?.width;
        let new_width = width.saturating_sub(count).max(self.bounds.min_mlp_nodes);
        if new_width >= width {
            return None;
        }
        let mut next = self.clone();
        next.spec_mut(block).layers[layer].width = new_width;
        let correspondence = (0..next.num_layers()).map(Some).collect();
        Some(self.finish(next, correspondence, ArchitectureChange::RemoveNodes { block, layer, count: width - new_width }))
    }

    /// Resize the encoder/head interface. Pinned while the latent vector is
    /// used as hidden state.
    pub fn resize_latent(&self, new_dim: usize) -> Option<DescriptorMutation> {
        if self.encoder.use_hidden_state {
            return None;
        }
        let from = self.encoder.latent_dim;
        let to = new_dim.max(self.bounds.min_latent_dim).min(self.bounds.max_latent_dim);
        if to == from {
            return None;
        }
        let mut next = self.clone();
        next.encoder.latent_dim = to;
        let correspondence = (0..next.num_layers()).map(Some).collect();
        Some(self.finish(next, correspondence, ArchitectureChange::LatentDim { from, to }))
    }

    /// Swap the activation of every hidden and latent layer.
    pub fn set_activation(&self, activation: Activation) -> Option<DescriptorMutation> {
        let from = self.hidden_activation();
        if from == activation {
            return None;
        }
        let mut next = self.clone();
        for layer in next.encoder.hidden.layers.iter_mut().chain(next.head.hidden.layers.iter_mut()) {
            layer.activation = activation;
        }
        next.encoder.latent_activation = activation;
        let plan = MigrationPlan::identity(&self.layer_shapes());
        Some(DescriptorMutation {
            descriptor: next,
            plan,
            change: ArchitectureChange::Activation { from, to: activation },
        })
    }

    /// Add or remove a hidden layer in a randomly chosen block.
    pub fn mutate_architecture<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<DescriptorMutation> {
        let block = if rng.gen_bool(0.5) { Block::Encoder } else { Block::Head };
        if rng.gen_bool(0.5) {
            self.add_layer(block)
        } else {
            self.remove_layer(block)
        }
    }

    /// Grow or shrink one randomly chosen hidden layer.
    pub fn mutate_nodes<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<DescriptorMutation> {
        let candidates: Vec<(Block, usize)> = [Block::Encoder, Block::Head]
            .iter()
            .flat_map(|&block| (0..self.spec(block).len()).map(move |layer| (block, layer)))
            .collect();
        let &(block, layer) = candidates.choose(rng)?;
        let count = *NODE_CHOICES.choose(rng)?;
        if rng.gen_bool(0.5) {
            self.add_nodes(block, layer, count)
        } else {
            self.remove_nodes(block, layer, count)
        }
    }

    /// Grow or shrink the latent dimension by a random amount.
    pub fn mutate_latent_dim<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<DescriptorMutation> {
        let delta = *LATENT_CHOICES.choose(rng)?;
        let current = self.encoder.latent_dim;
        let target = if rng.gen_bool(0.5) { current + delta } else { current.saturating_sub(delta) };
        self.resize_latent(target)
    }

    /// Pick a different activation from `choices`.
    pub fn mutate_activation<R: Rng + ?Sized>(&self, choices: &[Activation], rng: &mut R) -> Option<DescriptorMutation> {
        let current = self.hidden_activation();
        let options: Vec<Activation> = choices.iter().copied().filter(|a| *a != current).collect();
        let next = *options.choose(rng)?;
        self.set_activation(next)
    }
}
