//! # Evolutionary Hyperparameter Optimization
//!
//! The two population operators applied between training phases:
//!
//! - [`TournamentSelection`] ranks individuals by recent fitness, carries the
//!   elite forward and fills the remaining slots with tournament winners
//! - [`Mutations`] applies exactly one mutation category to every
//!   non-elite individual
//!
//! Both draw all randomness from an injected RNG so a seeded run is
//! reproducible.

pub mod mutation;
pub mod tournament;

pub use mutation::{classic_parameter_mutation, regularize_weight, MutationCategory, Mutations};
pub use tournament::TournamentSelection;
