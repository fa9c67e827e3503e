//! # Configuration
//!
//! Runs are described by three documents, kept under their conventional
//! upper-case keys so existing experiment files load unchanged:
//!
//! - [`InitHp`] (`INIT_HP`): population size, training budget and the
//!   agent's initial hyperparameters
//! - [`MutationParams`] (`MUTATION_PARAMS`): mutation probabilities, the
//!   mutable hyperparameters and their bounds
//! - [`NetConfig`] (`NET_CONFIG`): the initial architecture and its bounds
//!
//! Every field has a default, so a document only needs the keys it changes.
//!
//! ```rust
//! use evorl::config::EvolutionConfig;
//!
//! let config = EvolutionConfig::from_yaml_str(
//!     "INIT_HP:\n  POP_SIZE: 6\nMUTATION_PARAMS:\n  ACT_MUT: 0.1\n  NO_MUT: 0.3\n",
//! ).unwrap();
//! assert_eq!(config.init_hp.pop_size, 6);
//! config.validate().unwrap();
//! ```

use std::fs::File;
use std::io::{BufReader, Write};
use std::path::Path;

use serde::{Serialize, Deserialize};

use crate::activations::Activation;
use crate::error::{EvoError, Result};
use crate::hyperparameter::{HyperparameterSpace, HyperparameterSpec};
use crate::network::{ArchitectureBounds, EncoderConfig, HeadConfig, LayerSpec, NetworkDescriptor, DESCRIPTOR_VERSION};

/// Relative slack allowed when checking that mutation weights are usable.
pub const PROBABILITY_TOLERANCE: f64 = 1e-6;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct InitHp {
    pub env_name: String,
    pub algo: String,
    pub pop_size: usize,
    pub num_envs: usize,
    /// Environment steps per individual between evolution events.
    pub evo_steps: usize,
    /// Steps collected before gradient updates begin.
    pub learning_delay: usize,
    /// Step cap for a single evaluation episode. `None` runs to termination.
    pub eval_steps: Option<usize>,
    /// Evaluation episodes per generation; also the fitness window.
    pub eval_loop: usize,
    pub max_steps: usize,
    pub target_score: Option<f32>,
    pub tourn_size: usize,
    pub elitism: bool,
    pub batch_size: usize,
    pub lr: f64,
    pub learn_step: usize,
    pub gamma: f64,
    pub tau: f64,
    /// Double DQN targets.
    pub double: bool,
    pub memory_size: usize,
    pub epsilon_start: f32,
    pub epsilon_end: f32,
    pub epsilon_decay: f32,
    pub max_grad_norm: Option<f32>,
    /// Directory for per-individual checkpoints written after each generation.
    pub checkpoint_dir: Option<String>,
    /// Train and evaluate individuals on the rayon pool.
    pub parallel: bool,
}

impl Default for InitHp {
    fn default() -> Self {
        InitHp {
            env_name: "CartPole-v1".to_string(),
            algo: "DQN".to_string(),
            pop_size: 4,
            num_envs: 8,
            evo_steps: 10_000,
            learning_delay: 1000,
            eval_steps: None,
            eval_loop: 1,
            max_steps: 200_000,
            target_score: Some(200.0),
            tourn_size: 2,
            elitism: true,
            batch_size: 64,
            lr: 1e-3,
            learn_step: 1,
            gamma: 0.99,
            tau: 1e-3,
            double: false,
            memory_size: 10_000,
            epsilon_start: 1.0,
            epsilon_end: 0.1,
            epsilon_decay: 0.995,
            max_grad_norm: None,
            checkpoint_dir: None,
            parallel: true,
        }
    }
}

impl InitHp {
    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("POP_SIZE", self.pop_size),
            ("NUM_ENVS", self.num_envs),
            ("EVO_STEPS", self.evo_steps),
            ("EVAL_LOOP", self.eval_loop),
            ("MAX_STEPS", self.max_steps),
            ("TOURN_SIZE", self.tourn_size),
            ("BATCH_SIZE", self.batch_size),
            ("LEARN_STEP", self.learn_step),
            ("MEMORY_SIZE", self.memory_size),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(EvoError::invalid_config(name, "must be greater than zero"));
            }
        }
        if self.eval_steps == Some(0) {
            return Err(EvoError::invalid_config("EVAL_STEPS", "must be greater than zero when set"));
        }
        if !(self.lr.is_finite() && self.lr > 0.0) {
            return Err(EvoError::invalid_config("LR".to_string(), format!("must be positive, got {}", self.lr)));
        }
        if !(0.0..=1.0).contains(&self.gamma) {
            return Err(EvoError::invalid_config("GAMMA".to_string(), format!("must lie in [0, 1], got {}", self.gamma)));
        }
        if !(0.0..=1.0).contains(&self.tau) {
            return Err(EvoError::invalid_config("TAU".to_string(), format!("must lie in [0, 1], got {}", self.tau)));
        }
        if !(0.0..=1.0).contains(&self.epsilon_end) || self.epsilon_end > self.epsilon_start {
            return Err(EvoError::invalid_config("EPSILON_END", "must lie in [0, EPSILON_START]"));
        }
        if !(0.0..=1.0).contains(&self.epsilon_decay) {
            return Err(EvoError::invalid_config("EPSILON_DECAY", "must lie in [0, 1]"));
        }
        Ok(())
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct MutationParams {
    pub no_mut: f64,
    pub arch_mut: f64,
    /// Within an architecture mutation, probability of changing layer count
    /// rather than a width.
    pub new_layer: f64,
    pub params_mut: f64,
    pub act_mut: f64,
    pub rl_hp_mut: f64,
    pub rl_hp_selection: Vec<String>,
    pub mutation_sd: f64,
    /// Relative jitter applied to RL hyperparameters.
    pub rl_hp_sd: f64,
    pub activation_selection: Vec<String>,
    pub mutate_elite: bool,
    /// Within a width mutation, probability of resizing the latent vector.
    pub latent_mutation_prob: f64,
    pub rand_seed: Option<u64>,
    pub min_lr: f64,
    pub max_lr: f64,
    pub min_batch_size: usize,
    pub max_batch_size: usize,
    pub min_learn_step: usize,
    pub max_learn_step: usize,
}

impl Default for MutationParams {
    fn default() -> Self {
        MutationParams {
            no_mut: 0.4,
            arch_mut: 0.2,
            new_layer: 0.2,
            params_mut: 0.2,
            act_mut: 0.0,
            rl_hp_mut: 0.2,
            rl_hp_selection: vec!["lr".to_string(), "batch_size".to_string(), "learn_step".to_string()],
            mutation_sd: 0.1,
            rl_hp_sd: 0.2,
            activation_selection: vec!["ReLU".to_string(), "ELU".to_string(), "GELU".to_string()],
            mutate_elite: false,
            latent_mutation_prob: 0.1,
            rand_seed: Some(42),
            min_lr: 6.25e-5,
            max_lr: 1e-2,
            min_batch_size: 8,
            max_batch_size: 512,
            min_learn_step: 1,
            max_learn_step: 10,
        }
    }
}

/// Checks that the top-level mutation weights are finite, non-negative and
/// sum to one within [`PROBABILITY_TOLERANCE`]. Returns the exact total.
pub fn check_probabilities(weights: &[f64; 5]) -> Result<f64> {
    if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
        return Err(EvoError::invalid_config(
            "MUTATION_PARAMS".to_string(),
            format!("mutation probabilities must be finite and non-negative, got {:?}", weights),
        ));
    }
    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() > PROBABILITY_TOLERANCE {
        return Err(EvoError::invalid_config(
            "MUTATION_PARAMS".to_string(),
            format!("mutation probabilities must sum to 1, got {} from {:?}", total, weights),
        ));
    }
    Ok(total)
}

impl MutationParams {
    /// Top-level category weights in the order none, architecture,
    /// parameters, activation, RL hyperparameters.
    pub fn weights(&self) -> [f64; 5] {
        [self.no_mut, self.arch_mut, self.params_mut, self.act_mut, self.rl_hp_mut]
    }

    pub fn activations(&self) -> Result<Vec<Activation>> {
        self.activation_selection.iter().map(|name| Activation::from_name(name)).collect()
    }

    pub fn validate(&self) -> Result<()> {
        check_probabilities(&self.weights())?;
        for (name, p) in [("NEW_LAYER", self.new_layer), ("LATENT_MUTATION_PROB", self.latent_mutation_prob)] {
            if !(0.0..=1.0).contains(&p) {
                return Err(EvoError::invalid_config(name.to_string(), format!("must lie in [0, 1], got {}", p)));
            }
        }
        if !(self.mutation_sd.is_finite() && self.mutation_sd >= 0.0) {
            return Err(EvoError::invalid_config("MUTATION_SD", "must be finite and non-negative"));
        }
        if self.act_mut > 0.0 && self.activation_selection.is_empty() {
            return Err(EvoError::invalid_config("ACTIVATION_SELECTION", "empty while ACT_MUT is positive"));
        }
        self.activations()?;
        self.hyperparameters(&InitHp::default()).validate()
    }

    /// The mutable hyperparameters of an agent configured by `init_hp`.
    pub fn hyperparameters(&self, init_hp: &InitHp) -> HyperparameterSpace {
        let mut space = HyperparameterSpace::new();
        space.insert(HyperparameterSpec::continuous("lr", init_hp.lr, self.min_lr, self.max_lr, self.rl_hp_sd));
        space.insert(HyperparameterSpec::discrete(
            "batch_size",
            init_hp.batch_size as f64,
            self.min_batch_size as f64,
            self.max_batch_size as f64,
            1.0,
            self.rl_hp_sd,
        ));
        space.insert(HyperparameterSpec::discrete(
            "learn_step",
            init_hp.learn_step as f64,
            self.min_learn_step as f64,
            self.max_learn_step as f64,
            1.0,
            self.rl_hp_sd,
        ));
        space
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct EncoderSection {
    pub hidden_size: Vec<usize>,
    pub latent_dim: usize,
    pub use_hidden_state: bool,
    pub activation: String,
}

impl Default for EncoderSection {
    fn default() -> Self {
        EncoderSection {
            hidden_size: vec![64],
            latent_dim: 32,
            use_hidden_state: false,
            activation: "ReLU".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct HeadSection {
    pub hidden_size: Vec<usize>,
    pub output_activation: String,
}

impl Default for HeadSection {
    fn default() -> Self {
        HeadSection {
            hidden_size: vec![64],
            output_activation: "Linear".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct NetConfig {
    pub encoder: EncoderSection,
    pub head: HeadSection,
    pub min_hidden_layers: usize,
    pub max_hidden_layers: usize,
    pub min_mlp_nodes: usize,
    pub max_mlp_nodes: usize,
    pub min_latent_dim: usize,
    pub max_latent_dim: usize,
}

impl Default for NetConfig {
    fn default() -> Self {
        let bounds = ArchitectureBounds::default();
        NetConfig {
            encoder: EncoderSection::default(),
            head: HeadSection::default(),
            min_hidden_layers: bounds.min_hidden_layers,
            max_hidden_layers: bounds.max_hidden_layers,
            min_mlp_nodes: bounds.min_mlp_nodes,
            max_mlp_nodes: bounds.max_mlp_nodes,
            min_latent_dim: bounds.min_latent_dim,
            max_latent_dim: bounds.max_latent_dim,
        }
    }
}

impl NetConfig {
    pub fn bounds(&self) -> ArchitectureBounds {
        ArchitectureBounds {
            min_hidden_layers: self.min_hidden_layers,
            max_hidden_layers: self.max_hidden_layers,
            min_mlp_nodes: self.min_mlp_nodes,
            max_mlp_nodes: self.max_mlp_nodes,
            min_latent_dim: self.min_latent_dim,
            max_latent_dim: self.max_latent_dim,
        }
    }

    /// Build and validate the initial descriptor for an environment with the
    /// given observation and action sizes.
    pub fn descriptor(&self, num_inputs: usize, num_outputs: usize) -> Result<NetworkDescriptor> {
        let hidden_activation = Activation::from_name(&self.encoder.activation)?;
        let descriptor = NetworkDescriptor {
            version: DESCRIPTOR_VERSION,
            num_inputs,
            num_outputs,
            encoder: EncoderConfig {
                hidden: LayerSpec::new(&self.encoder.hidden_size, hidden_activation),
                latent_dim: self.encoder.latent_dim,
                latent_activation: hidden_activation,
                use_hidden_state: self.encoder.use_hidden_state,
            },
            head: HeadConfig {
                hidden: LayerSpec::new(&self.head.hidden_size, hidden_activation),
                output_activation: Activation::from_name(&self.head.output_activation)?,
            },
            bounds: self.bounds(),
        };
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// A complete run description.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE", default)]
pub struct EvolutionConfig {
    pub init_hp: InitHp,
    pub mutation_params: MutationParams,
    pub net_config: NetConfig,
}

impl EvolutionConfig {
    /// Load from a `.json`, `.yaml` or `.yml` file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let rdr = BufReader::new(File::open(path)?);
        let config = match extension(path).as_deref() {
            Some("json") => serde_json::from_reader(rdr)?,
            Some("yaml") | Some("yml") => serde_yaml::from_reader(rdr)?,
            other => {
                return Err(EvoError::invalid_config(
                    path.display().to_string(),
                    format!("unsupported config format {:?}", other),
                ))
            }
        };
        Ok(config)
    }

    /// Save in the format implied by the file extension.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let text = match extension(path).as_deref() {
            Some("json") => serde_json::to_string_pretty(self)?,
            _ => serde_yaml::to_string(self)?,
        };
        let mut file = File::create(path)?;
        file.write_all(text.as_bytes())?;
        Ok(())
    }

    pub fn from_yaml_str(text: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Reject configurations the evolution loop cannot run.
    pub fn validate(&self) -> Result<()> {
        self.init_hp.validate()?;
        self.mutation_params.validate()?;
        self.mutation_params.hyperparameters(&self.init_hp).validate()?;
        // The observation and action sizes are unknown here; any positive
        // value exercises the architecture bounds.
        self.net_config.descriptor(1, 1)?;
        Ok(())
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension().and_then(|e| e.to_str()).map(str::to_ascii_lowercase)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults_are_valid() {
        let config = EvolutionConfig::default();
        config.validate().unwrap();
        let sum: f64 = config.mutation_params.weights().iter().sum();
        assert!((sum - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_negative_probability_rejected() {
        let mut config = EvolutionConfig::default();
        config.mutation_params.arch_mut = -0.1;
        assert!(matches!(config.validate(), Err(EvoError::InvalidConfig { .. })));
    }

    #[test]
    fn test_all_zero_probabilities_rejected() {
        let mut config = EvolutionConfig::default();
        let p = &mut config.mutation_params;
        p.no_mut = 0.0;
        p.arch_mut = 0.0;
        p.params_mut = 0.0;
        p.act_mut = 0.0;
        p.rl_hp_mut = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probabilities_must_sum_to_one() {
        let mut config = EvolutionConfig::default();
        config.mutation_params.no_mut = 5.0;
        config.mutation_params.rl_hp_mut = 3.0;
        assert!(matches!(config.validate(), Err(EvoError::InvalidConfig { .. })));

        let mut config = EvolutionConfig::default();
        config.mutation_params.no_mut = 0.3;
        assert!(config.validate().is_err());

        // Drift below the tolerance is absorbed.
        config.mutation_params.no_mut = 0.4 + 1e-9;
        config.validate().unwrap();
    }

    #[test]
    fn test_inverted_bounds_rejected() {
        let mut config = EvolutionConfig::default();
        config.mutation_params.min_lr = 1.0;
        assert!(config.validate().is_err());

        let mut config = EvolutionConfig::default();
        config.net_config.min_mlp_nodes = 600;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_architecture_out_of_bounds() {
        let mut config = EvolutionConfig::default();
        config.net_config.encoder.hidden_size = vec![64, 64, 64, 64];
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_unknown_activation_rejected() {
        let mut config = EvolutionConfig::default();
        config.mutation_params.activation_selection.push("Swish".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_json_and_yaml_round_trip() {
        let dir = tempdir().unwrap();
        let mut config = EvolutionConfig::default();
        config.init_hp.pop_size = 7;
        config.net_config.head.hidden_size = vec![32, 16];

        for name in ["run.json", "run.yaml"] {
            let path = dir.path().join(name);
            config.save(&path).unwrap();
            assert_eq!(EvolutionConfig::load(&path).unwrap(), config);
        }
        assert!(EvolutionConfig::load(dir.path().join("run.toml")).is_err());
    }

    #[test]
    fn test_upper_case_keys() {
        let config = EvolutionConfig::from_json_str(
            r#"{"NET_CONFIG": {"ENCODER": {"HIDDEN_SIZE": [32, 32], "LATENT_DIM": 16}}, "INIT_HP": {"TARGET_SCORE": null}}"#,
        )
        .unwrap();
        assert_eq!(config.net_config.encoder.hidden_size, vec![32, 32]);
        assert_eq!(config.init_hp.target_score, None);
        let desc = config.net_config.descriptor(4, 2).unwrap();
        assert_eq!(desc.layer_shapes(), vec![(4, 32), (32, 32), (32, 16), (16, 64), (64, 2)]);
    }
}
