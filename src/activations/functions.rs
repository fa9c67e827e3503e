use ndarray::{Array2, ArrayView2};
use serde::{Serialize, Deserialize};

use crate::error::{EvoError, Result};

const SQRT_2_OVER_PI: f32 = 0.797_884_6;

/// An enumeration of the possible activation functions that can be used in a neural network layer.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize, Default)]
pub enum Activation {
    #[default]
    Relu,
    Linear,
    Sigmoid,
    Tanh,
    LeakyRelu { alpha: f32 },
    Elu { alpha: f32 },
    Gelu,
}

impl Activation {
    /// Parse the names used in configuration documents (`"ReLU"`, `"GELU"`, ...).
    pub fn from_name(name: &str) -> Result<Self> {
        match name.to_ascii_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "linear" | "identity" => Ok(Activation::Linear),
            "sigmoid" => Ok(Activation::Sigmoid),
            "tanh" => Ok(Activation::Tanh),
            "leakyrelu" | "leaky_relu" => Ok(Activation::LeakyRelu { alpha: 0.01 }),
            "elu" => Ok(Activation::Elu { alpha: 1.0 }),
            "gelu" => Ok(Activation::Gelu),
            other => Err(EvoError::invalid_config(
                "activation".to_string(),
                format!("unknown activation '{}'", other),
            )),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Activation::Relu => "ReLU",
            Activation::Linear => "Linear",
            Activation::Sigmoid => "Sigmoid",
            Activation::Tanh => "Tanh",
            Activation::LeakyRelu { .. } => "LeakyReLU",
            Activation::Elu { .. } => "ELU",
            Activation::Gelu => "GELU",
        }
    }

    /// Value of the activation for a single pre-activation.
    #[inline]
    pub fn value(&self, x: f32) -> f32 {
        match *self {
            Activation::Relu => x.max(0.0),
            Activation::Linear => x,
            Activation::Sigmoid => 1.0 / (1.0 + (-x).exp()),
            Activation::Tanh => x.tanh(),
            Activation::LeakyRelu { alpha } => if x > 0.0 { x } else { alpha * x },
            Activation::Elu { alpha } => if x > 0.0 { x } else { alpha * (x.exp() - 1.0) },
            Activation::Gelu => {
                let inner = SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3));
                0.5 * x * (1.0 + inner.tanh())
            }
        }
    }

    /// Derivative of the activation at a single pre-activation.
    #[inline]
    pub fn gradient(&self, x: f32) -> f32 {
        match *self {
            Activation::Relu => if x > 0.0 { 1.0 } else { 0.0 },
            Activation::Linear => 1.0,
            Activation::Sigmoid => {
                let sigmoid = 1.0 / (1.0 + (-x).exp());
                sigmoid * (1.0 - sigmoid)
            }
            Activation::Tanh => {
                let tanh_v = x.tanh();
                1.0 - tanh_v * tanh_v
            }
            Activation::LeakyRelu { alpha } => if x > 0.0 { 1.0 } else { alpha },
            Activation::Elu { alpha } => if x > 0.0 { 1.0 } else { alpha * x.exp() },
            Activation::Gelu => {
                let inner = SQRT_2_OVER_PI * (x + 0.044715 * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2_inner = 1.0 - tanh_inner.powi(2);
                0.5 * (1.0 + tanh_inner)
                    + 0.5 * x * sech2_inner * SQRT_2_OVER_PI * (1.0 + 0.134145 * x.powi(2))
            }
        }
    }

    /// Apply the activation function to a batch of input arrays in-place.
    pub fn apply_batch(&self, inputs: &mut Array2<f32>) {
        if let Activation::Linear = self {
            return;
        }
        inputs.mapv_inplace(|v| self.value(v));
    }

    /// Compute the derivative of the activation function for a batch of input arrays.
    pub fn derivative_batch(&self, inputs: ArrayView2<f32>) -> Array2<f32> {
        inputs.mapv(|v| self.gradient(v))
    }
}
