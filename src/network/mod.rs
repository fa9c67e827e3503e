//! # Evolvable Networks
//!
//! - [`descriptor`]: the blueprint ([`NetworkDescriptor`]) and its structural mutations
//! - [`migration`]: the index maps ([`MigrationPlan`]) a mutation hands to materialization
//! - [`DenseNetwork`]: the materialized parameter tensors
//!
//! ```rust
//! use evorl::network::{ArchitectureBounds, Block, DenseNetwork, NetworkDescriptor};
//! use rand::SeedableRng;
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let desc = NetworkDescriptor::mlp(4, 2, &[64], 32, &[32], ArchitectureBounds::default());
//! let net = DenseNetwork::materialize(&desc, &mut rng);
//!
//! let mutation = desc.add_nodes(Block::Encoder, 0, 32).unwrap();
//! let grown = net.migrate(&desc, &mutation.descriptor, &mutation.plan, &mut rng).unwrap();
//! assert_eq!(grown.layers[0].weights.shape(), &[4, 96]);
//! assert_eq!(grown.layers[0].weights.slice(ndarray::s![.., ..64]), net.layers[0].weights);
//! ```

pub mod descriptor;
pub mod migration;

pub use descriptor::{
    ArchitectureBounds, ArchitectureChange, Block, DescriptorMutation, EncoderConfig, HeadConfig,
    LayerDescriptor, LayerSpec, NetworkDescriptor, DESCRIPTOR_VERSION,
};
pub use migration::{AxisMap, LayerMigration, MigrationPlan};

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::error::{EvoError, Result};
use crate::layers::DenseLayer;
use migration::{migrate_matrix, migrate_vector};

/// A stack of dense layers materialized from a [`NetworkDescriptor`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct DenseNetwork {
    pub layers: Vec<DenseLayer>,
}

impl DenseNetwork {
    /// Instantiate fresh parameters for `descriptor`.
    pub fn materialize<R: Rng + ?Sized>(descriptor: &NetworkDescriptor, rng: &mut R) -> Self {
        let layers = descriptor
            .layer_plan()
            .into_iter()
            .map(|(input, output, activation)| DenseLayer::new(input, output, activation, rng))
            .collect();
        DenseNetwork { layers }
    }

    /// Build the network for `new` from `self` (materialized from `old`) by
    /// following `plan`: mapped entries are copied exactly, everything else is
    /// freshly initialized.
    pub fn migrate<R: Rng + ?Sized>(
        &self,
        old: &NetworkDescriptor,
        new: &NetworkDescriptor,
        plan: &MigrationPlan,
        rng: &mut R,
    ) -> Result<Self> {
        self.check_migration(old, new, plan)?;
        let fresh = Self::materialize(new, rng);
        self.migrate_onto(old, new, plan, &fresh)
    }

    /// Like [`migrate`](Self::migrate), but unmapped entries are taken from
    /// `fill`, which must already match `new`. A target network migrated onto
    /// its freshly migrated online network shares every new parameter with it.
    pub fn migrate_onto(
        &self,
        old: &NetworkDescriptor,
        new: &NetworkDescriptor,
        plan: &MigrationPlan,
        fill: &DenseNetwork,
    ) -> Result<Self> {
        self.check_migration(old, new, plan)?;
        if !fill.matches(new) {
            return Err(EvoError::dimension_mismatch(
                format!("{:?}", new.layer_shapes()),
                format!("{:?}", fill.shapes()),
            ));
        }

        let layers = fill
            .layers
            .iter()
            .zip(&plan.layers)
            .map(|(fresh, migration)| match migration {
                LayerMigration::Fresh => fresh.clone(),
                LayerMigration::Migrate { source, rows, cols } => {
                    let old_layer = &self.layers[*source];
                    let weights = migrate_matrix(&old_layer.weights, rows, cols, fresh.weights.clone());
                    let biases = migrate_vector(&old_layer.biases, cols, fresh.biases.clone());
                    fresh.clone().with_weights(weights).with_biases(biases)
                }
            })
            .collect();
        Ok(DenseNetwork { layers })
    }

    fn check_migration(&self, old: &NetworkDescriptor, new: &NetworkDescriptor, plan: &MigrationPlan) -> Result<()> {
        if !self.matches(old) {
            return Err(EvoError::dimension_mismatch(
                format!("{:?}", old.layer_shapes()),
                format!("{:?}", self.shapes()),
            ));
        }
        plan.check(&self.shapes(), &new.layer_shapes())
    }

    pub fn shapes(&self) -> Vec<(usize, usize)> {
        self.layers.iter().map(|l| (l.input_size(), l.output_size())).collect()
    }

    /// True when every layer has the shape and activation `descriptor` prescribes.
    pub fn matches(&self, descriptor: &NetworkDescriptor) -> bool {
        let plan = descriptor.layer_plan();
        plan.len() == self.layers.len()
            && plan.iter().zip(&self.layers).all(|(&(input, output, activation), layer)| {
                layer.input_size() == input && layer.output_size() == output && layer.activation == activation
            })
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(|l| l.weights.len() + l.biases.len()).sum()
    }

    pub fn output_size(&self) -> usize {
        self.layers.last().map_or(0, DenseLayer::output_size)
    }

    /// Forward pass for a batch, caching activations for [`backward_batch`](Self::backward_batch).
    pub fn forward_batch(&mut self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current_output = inputs.to_owned();
        for layer in &mut self.layers {
            current_output = layer.forward_batch(current_output.view());
        }
        current_output
    }

    /// Side-effect free forward pass for a batch.
    pub fn predict_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        let mut current_output = inputs.to_owned();
        for layer in &self.layers {
            current_output = layer.predict_batch(current_output.view());
        }
        current_output
    }

    /// Side-effect free forward pass for a single observation.
    pub fn predict(&self, input: ArrayView1<f32>) -> Array1<f32> {
        self.predict_batch(input.insert_axis(Axis(0))).index_axis_move(Axis(0), 0)
    }

    /// Gradients of every layer for `output_errors` (dLoss/dOutput), ordered
    /// front to back.
    pub fn backward_batch(&self, output_errors: ArrayView2<f32>) -> Result<Vec<(Array2<f32>, Array1<f32>)>> {
        let mut gradients: Vec<(Array2<f32>, Array1<f32>)> = Vec::with_capacity(self.layers.len());
        let mut current_error = output_errors.to_owned();

        for (i, layer) in self.layers.iter().enumerate().rev() {
            let (adjusted_error, weight_gradients, bias_gradients) = layer
                .backward_batch(current_error.view())
                .ok_or_else(|| EvoError::TrainingError("backward pass without a cached forward pass".to_string()))?;
            gradients.push((weight_gradients, bias_gradients));
            if i != 0 {
                current_error = adjusted_error.dot(&layer.weights.t());
            }
        }

        gradients.reverse();
        Ok(gradients)
    }

    /// Polyak update: `self = tau * source + (1 - tau) * self`.
    pub fn soft_update_from(&mut self, source: &DenseNetwork, tau: f32) -> Result<()> {
        if self.shapes() != source.shapes() {
            return Err(EvoError::dimension_mismatch(
                format!("{:?}", self.shapes()),
                format!("{:?}", source.shapes()),
            ));
        }
        for (target, src) in self.layers.iter_mut().zip(&source.layers) {
            target.weights.zip_mut_with(&src.weights, |t, &s| *t = tau * s + (1.0 - tau) * *t);
            target.biases.zip_mut_with(&src.biases, |t, &s| *t = tau * s + (1.0 - tau) * *t);
            target.activation = src.activation;
        }
        Ok(())
    }

    pub fn clear_caches(&mut self) {
        for layer in &mut self.layers {
            layer.clear_cache();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, s};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn setup() -> (NetworkDescriptor, DenseNetwork, StdRng) {
        let mut rng = StdRng::seed_from_u64(5);
        let desc = NetworkDescriptor::mlp(3, 2, &[64], 16, &[32], ArchitectureBounds::default());
        let net = DenseNetwork::materialize(&desc, &mut rng);
        (desc, net, rng)
    }

    #[test]
    fn test_materialize_matches_descriptor() {
        let (desc, net, _) = setup();
        assert!(net.matches(&desc));
        assert_eq!(net.output_size(), 2);
        let out = net.predict(array![0.1, -0.2, 0.3].view());
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn test_width_growth_preserves_leading_outputs() {
        let (desc, net, mut rng) = setup();
        let m = desc.add_nodes(Block::Encoder, 0, 32).unwrap();
        let grown = net.migrate(&desc, &m.descriptor, &m.plan, &mut rng).unwrap();

        assert_eq!(grown.layers[0].weights.dim(), (3, 96));
        assert_eq!(grown.layers[0].weights.slice(s![.., ..64]), net.layers[0].weights);
        assert_eq!(grown.layers[0].biases.slice(s![..64]), net.layers[0].biases);
        assert_eq!(grown.layers[1].weights.dim(), (96, 16));
        assert_eq!(grown.layers[1].weights.slice(s![..64, ..]), net.layers[1].weights);
        assert_eq!(grown.layers[2], net.layers[2]);
    }

    #[test]
    fn test_added_layer_keeps_other_layers() {
        let (desc, net, mut rng) = setup();
        let m = desc.add_layer(Block::Head).unwrap();
        let deeper = net.migrate(&desc, &m.descriptor, &m.plan, &mut rng).unwrap();
        assert_eq!(deeper.layers.len(), net.layers.len() + 1);
        assert_eq!(deeper.layers[0], net.layers[0]);
        assert_eq!(deeper.layers[1], net.layers[1]);
        assert_eq!(deeper.layers[2], net.layers[2]);
        assert_eq!(deeper.layers[4], net.layers[3]);
        assert!(deeper.matches(&m.descriptor));
    }

    #[test]
    fn test_migrate_onto_fills_from_given_network() {
        let (desc, net, mut rng) = setup();
        let m = desc.add_nodes(Block::Encoder, 0, 16).unwrap();
        let fill = DenseNetwork::materialize(&m.descriptor, &mut rng);
        let grown = net.migrate_onto(&desc, &m.descriptor, &m.plan, &fill).unwrap();
        assert_eq!(grown.layers[0].weights.slice(s![.., ..64]), net.layers[0].weights);
        assert_eq!(grown.layers[0].weights.slice(s![.., 64..]), fill.layers[0].weights.slice(s![.., 64..]));
        assert_eq!(grown.layers[1].weights.slice(s![64.., ..]), fill.layers[1].weights.slice(s![64.., ..]));
        assert!(net.migrate_onto(&desc, &m.descriptor, &m.plan, &net).is_err());
    }

    #[test]
    fn test_migrate_rejects_stale_descriptor() {
        let (desc, net, mut rng) = setup();
        let m = desc.add_layer(Block::Head).unwrap();
        assert!(net.migrate(&m.descriptor, &m.descriptor, &m.plan, &mut rng).is_err());
    }

    #[test]
    fn test_backward_requires_forward() {
        let (_, mut net, _) = setup();
        let errors = Array2::<f32>::ones((1, 2));
        assert!(net.backward_batch(errors.view()).is_err());
        net.forward_batch(Array2::<f32>::ones((1, 3)).view());
        let grads = net.backward_batch(errors.view()).unwrap();
        assert_eq!(grads.len(), 3);
        assert_eq!(grads[0].0.dim(), (3, 64));
    }

    #[test]
    fn test_soft_update() {
        let (_, net, mut rng) = setup();
        let mut target = net.clone();
        let desc = NetworkDescriptor::mlp(3, 2, &[64], 16, &[32], ArchitectureBounds::default());
        let other = DenseNetwork::materialize(&desc, &mut rng);
        target.soft_update_from(&other, 1.0).unwrap();
        assert_eq!(target, other);
    }
}
