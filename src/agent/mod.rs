//! # Evolvable Agents
//!
//! The evolution engine never looks inside an individual. It works through
//! two traits:
//!
//! - [`EvolvableAgent`]: identity and fitness bookkeeping ([`AgentMeta`]),
//!   deep cloning under a new id, architecture migration, parameter noise,
//!   hyperparameter access and checkpointing
//! - [`RlAgent`]: training and greedy evaluation on a [`VecEnv`](crate::env::VecEnv)
//!   of a given environment type
//!
//! [`EvolvableDqn`] is the reference implementation.
//!
//! ## Checkpoints
//!
//! An agent is saved as one bincode file holding its descriptor, weights,
//! optimizer state, hyperparameters and metadata behind a versioned header
//! (see [`checkpoint`]). Loading a file written by another format version, or
//! whose weights do not match its descriptor, fails with
//! [`EvoError::IncompatibleCheckpoint`](crate::error::EvoError::IncompatibleCheckpoint).

pub mod checkpoint;
pub mod traits;

mod dqn;
pub use dqn::{DqnSettings, EvolvableDqn, ALGO as DQN_ALGO};
pub use traits::{AgentMeta, EvolvableAgent, MutationOutcome, RlAgent, TrainStats, WORST_FITNESS};
