//! # Activation Functions Module
//!
//! Activation tags double as the alphabet of the activation mutation: an
//! evolvable network stores one [`Activation`] for its hidden layers and the
//! mutation engine swaps it for another member of the configured selection.
//!
//! ## Available Activations
//!
//! - **ReLU**: `max(0, x)`
//! - **Sigmoid**: `1 / (1 + e^(-x))`
//! - **Tanh**: hyperbolic tangent
//! - **Linear**: identity, the usual output activation for Q-values
//! - **LeakyReLU** / **ELU**: ReLU variants without dead units
//! - **GELU**: tanh approximation
//!
//! ## Usage Example
//!
//! ```rust
//! use evorl::activations::Activation;
//! use ndarray::array;
//!
//! let mut data = array![[1.0, -0.5, 0.0, 2.0]];
//! Activation::Relu.apply_batch(&mut data);
//! assert_eq!(data, array![[1.0, 0.0, 0.0, 2.0]]);
//!
//! assert_eq!(Activation::from_name("GELU").unwrap(), Activation::Gelu);
//! ```

pub mod functions;

pub use functions::Activation;
