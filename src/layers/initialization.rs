use ndarray::Array2;
use ndarray_rand::RandomExt;
use ndarray_rand::rand_distr::Uniform;
use rand::Rng;
use serde::{Serialize, Deserialize};

use crate::activations::Activation;

/// Weight initialization strategies
///
/// Every strategy draws from a caller-supplied generator so that freshly
/// initialized regions of a migrated network are reproducible from the run seed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum WeightInit {
    /// Xavier/Glorot uniform initialization
    XavierUniform,

    /// He/Kaiming uniform initialization (for ReLU)
    HeUniform,
}

impl WeightInit {
    /// Initialize weights for a layer of shape `(fan_in, fan_out)`
    pub fn initialize_weights<R: Rng + ?Sized>(&self, shape: (usize, usize), rng: &mut R) -> Array2<f32> {
        let (fan_in, fan_out) = shape;
        let limit = match *self {
            WeightInit::XavierUniform => (6.0 / (fan_in + fan_out).max(1) as f32).sqrt(),
            WeightInit::HeUniform => (6.0 / fan_in.max(1) as f32).sqrt(),
        };
        Array2::random_using(shape, Uniform::new_inclusive(-limit, limit), rng)
    }

    /// Get the recommended initialization for an activation function
    pub fn for_activation(activation: &Activation) -> Self {
        match activation {
            Activation::Relu | Activation::LeakyRelu { .. } | Activation::Elu { .. } | Activation::Gelu => {
                WeightInit::HeUniform
            }
            Activation::Sigmoid | Activation::Tanh | Activation::Linear => WeightInit::XavierUniform,
        }
    }
}
