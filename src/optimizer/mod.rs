//! # Optimizers
//!
//! Optimizer state lives next to the network it trains and has to follow
//! every structural mutation of that network. [`Adam::migrate`]
//! consumes the same [`MigrationPlan`] as [`DenseNetwork::migrate`], copying
//! moment estimates for preserved parameters and zeroing them for fresh ones.
//!
//! [`DenseNetwork::migrate`]: crate::network::DenseNetwork::migrate

pub mod gradient_clipper;

use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

use crate::error::{EvoError, Result};
use crate::layers::DenseLayer;
use crate::network::{DenseNetwork, LayerMigration, MigrationPlan};
use crate::network::migration::{migrate_matrix, migrate_vector};

pub use gradient_clipper::GradientClipper;

/// Adam with one set of moment estimates per layer.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Adam {
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    m_weights: Vec<Array2<f32>>,
    v_weights: Vec<Array2<f32>>,
    m_biases: Vec<Array1<f32>>,
    v_biases: Vec<Array1<f32>>,
    /// Number of completed optimizer steps.
    pub t: i32,
}

impl Adam {
    pub fn new(layers: &[DenseLayer], beta1: f32, beta2: f32, epsilon: f32) -> Self {
        Adam {
            beta1,
            beta2,
            epsilon,
            m_weights: layers.iter().map(|l| Array2::zeros(l.weights.dim())).collect(),
            v_weights: layers.iter().map(|l| Array2::zeros(l.weights.dim())).collect(),
            m_biases: layers.iter().map(|l| Array1::zeros(l.biases.dim())).collect(),
            v_biases: layers.iter().map(|l| Array1::zeros(l.biases.dim())).collect(),
            t: 0,
        }
    }

    pub fn default(layers: &[DenseLayer]) -> Self {
        Self::new(layers, 0.9, 0.999, 1e-8)
    }

    /// Moment shapes, one `(rows, cols)` per layer.
    pub fn shapes(&self) -> Vec<(usize, usize)> {
        self.m_weights.iter().map(|m| m.dim()).collect()
    }

    pub fn first_moment(&self, index: usize) -> Option<&Array2<f32>> {
        self.m_weights.get(index)
    }

    /// Resize the moments in lockstep with a network migration. Preserved
    /// parameters keep their estimates, fresh ones start at zero.
    pub fn migrate(&self, plan: &MigrationPlan, new_shapes: &[(usize, usize)]) -> Result<Self> {
        plan.check(&self.shapes(), new_shapes)?;
        let mut next = Adam {
            beta1: self.beta1,
            beta2: self.beta2,
            epsilon: self.epsilon,
            m_weights: Vec::with_capacity(new_shapes.len()),
            v_weights: Vec::with_capacity(new_shapes.len()),
            m_biases: Vec::with_capacity(new_shapes.len()),
            v_biases: Vec::with_capacity(new_shapes.len()),
            t: self.t,
        };
        for (migration, &shape) in plan.layers.iter().zip(new_shapes) {
            let (m_w, v_w, m_b, v_b) = match migration {
                LayerMigration::Fresh => (
                    Array2::zeros(shape),
                    Array2::zeros(shape),
                    Array1::zeros(shape.1),
                    Array1::zeros(shape.1),
                ),
                LayerMigration::Migrate { source, rows, cols } => (
                    migrate_matrix(&self.m_weights[*source], rows, cols, Array2::zeros(shape)),
                    migrate_matrix(&self.v_weights[*source], rows, cols, Array2::zeros(shape)),
                    migrate_vector(&self.m_biases[*source], cols, Array1::zeros(shape.1)),
                    migrate_vector(&self.v_biases[*source], cols, Array1::zeros(shape.1)),
                ),
            };
            next.m_weights.push(m_w);
            next.v_weights.push(v_w);
            next.m_biases.push(m_b);
            next.v_biases.push(v_b);
        }
        Ok(next)
    }
}

impl Adam {
    fn update_layer(
        &mut self,
        index: usize,
        layer: &mut DenseLayer,
        weight_gradients: &Array2<f32>,
        bias_gradients: &Array1<f32>,
        learning_rate: f32,
    ) {
        let (beta1, beta2, epsilon) = (self.beta1, self.beta2, self.epsilon);
        let bias_correction1 = 1.0 - beta1.powi(self.t + 1);
        let bias_correction2 = 1.0 - beta2.powi(self.t + 1);

        let m = &mut self.m_weights[index];
        let v = &mut self.v_weights[index];
        m.zip_mut_with(weight_gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(weight_gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
        ndarray::Zip::from(&mut layer.weights).and(&*m).and(&*v).for_each(|w, &m, &v| {
            *w -= learning_rate * (m / bias_correction1) / ((v / bias_correction2).sqrt() + epsilon);
        });

        let m = &mut self.m_biases[index];
        let v = &mut self.v_biases[index];
        m.zip_mut_with(bias_gradients, |m, &g| *m = beta1 * *m + (1.0 - beta1) * g);
        v.zip_mut_with(bias_gradients, |v, &g| *v = beta2 * *v + (1.0 - beta2) * g * g);
        ndarray::Zip::from(&mut layer.biases).and(&*m).and(&*v).for_each(|b, &m, &v| {
            *b -= learning_rate * (m / bias_correction1) / ((v / bias_correction2).sqrt() + epsilon);
        });
    }
}

impl Adam {
    pub fn for_network(network: &DenseNetwork) -> Self {
        Adam::default(&network.layers)
    }

    /// Apply one optimizer step to every layer of `network`.
    pub fn step(
        &mut self,
        network: &mut DenseNetwork,
        gradients: &[(Array2<f32>, Array1<f32>)],
        learning_rate: f32,
    ) -> Result<()> {
        if gradients.len() != network.layers.len() {
            return Err(EvoError::dimension_mismatch(
                format!("{} gradient pairs", network.layers.len()),
                format!("{} gradient pairs", gradients.len()),
            ));
        }
        if !self.fits(network) {
            return Err(EvoError::dimension_mismatch(
                format!("{:?}", network.shapes()),
                format!("{:?}", self.shapes()),
            ));
        }
        for (index, (layer, (wg, bg))) in network.layers.iter_mut().zip(gradients).enumerate() {
            self.update_layer(index, layer, wg, bg, learning_rate);
        }
        self.t += 1;
        Ok(())
    }

    /// Whether the moments can drive `network` without resizing.
    pub fn fits(&self, network: &DenseNetwork) -> bool {
        self.shapes() == network.shapes()
    }
}
