//! # Hyperparameter Space
//!
//! Declarative description of the RL hyperparameters an individual may mutate.
//! A [`HyperparameterSpec`] owns its current value together with its bounds and
//! mutation strength; a [`HyperparameterSpace`] is the ordered collection an
//! agent carries around.
//!
//! ```rust
//! use evorl::hyperparameter::{HyperparameterSpec, HyperparameterSpace};
//! use rand::SeedableRng;
//!
//! let mut space = HyperparameterSpace::new();
//! space.insert(HyperparameterSpec::continuous("lr", 1e-3, 1e-4, 1e-2, 0.2));
//! space.insert(HyperparameterSpec::discrete("batch_size", 64.0, 8.0, 512.0, 8.0, 0.2));
//!
//! let mut rng = rand::rngs::StdRng::seed_from_u64(0);
//! let spec = space.get_mut("batch_size").unwrap();
//! let value = spec.mutate(&mut rng);
//! assert!((8.0..=512.0).contains(&value));
//! assert_eq!(value % 8.0, 0.0);
//! ```

use std::collections::BTreeMap;

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::StandardNormal;
use serde::{Serialize, Deserialize};

use crate::error::{EvoError, Result};

/// How a hyperparameter moves when mutated.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum MutationKind {
    /// Any real value in `[min, max]`.
    Continuous,
    /// Values of the form `min + k * step`.
    Discrete { step: f64 },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpec {
    pub name: String,
    pub value: f64,
    pub min: f64,
    pub max: f64,
    pub kind: MutationKind,
    /// Standard deviation of the relative Gaussian jitter.
    pub strength: f64,
}

impl HyperparameterSpec {
    pub fn continuous(name: &str, value: f64, min: f64, max: f64, strength: f64) -> Self {
        HyperparameterSpec {
            name: name.to_string(),
            value: value.max(min).min(max),
            min,
            max,
            kind: MutationKind::Continuous,
            strength,
        }
    }

    pub fn discrete(name: &str, value: f64, min: f64, max: f64, step: f64, strength: f64) -> Self {
        let mut spec = HyperparameterSpec {
            name: name.to_string(),
            value,
            min,
            max,
            kind: MutationKind::Discrete { step },
            strength,
        };
        spec.value = spec.project(value);
        spec
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.min.is_finite() && self.max.is_finite()) || self.min > self.max {
            return Err(EvoError::invalid_config(
                self.name.clone(),
                format!("bounds [{}, {}] are not a valid range", self.min, self.max),
            ));
        }
        if self.strength < 0.0 || !self.strength.is_finite() {
            return Err(EvoError::invalid_config(
                self.name.clone(),
                format!("mutation strength {} must be a finite non-negative number", self.strength),
            ));
        }
        if let MutationKind::Discrete { step } = self.kind {
            if step <= 0.0 {
                return Err(EvoError::invalid_config(
                    self.name.clone(),
                    format!("discrete step {} must be positive", step),
                ));
            }
        }
        Ok(())
    }

    /// Snap a candidate onto the valid set: the nearest step for discrete
    /// hyperparameters, then `[min, max]`.
    pub fn project(&self, candidate: f64) -> f64 {
        let clamped = candidate.max(self.min).min(self.max);
        match self.kind {
            MutationKind::Continuous => clamped,
            MutationKind::Discrete { step } => {
                let steps = ((clamped - self.min) / step).round();
                let snapped = self.min + steps * step;
                if snapped > self.max {
                    snapped - step
                } else {
                    snapped
                }
            }
        }
    }

    /// Apply multiplicative Gaussian jitter and return the new value.
    ///
    /// A jitter that produces a non-finite candidate leaves the value unchanged.
    pub fn mutate<R: Rng + ?Sized>(&mut self, rng: &mut R) -> f64 {
        let noise: f64 = rng.sample(StandardNormal);
        let candidate = self.value * (1.0 + self.strength * noise);
        if candidate.is_finite() {
            self.value = self.project(candidate);
        }
        self.value
    }

    pub fn as_usize(&self) -> usize {
        self.value.round().max(0.0) as usize
    }
}

/// Ordered set of hyperparameters keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HyperparameterSpace {
    specs: BTreeMap<String, HyperparameterSpec>,
}

impl HyperparameterSpace {
    pub fn new() -> Self {
        HyperparameterSpace { specs: BTreeMap::new() }
    }

    pub fn insert(&mut self, spec: HyperparameterSpec) {
        self.specs.insert(spec.name.clone(), spec);
    }

    pub fn get(&self, name: &str) -> Option<&HyperparameterSpec> {
        self.specs.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut HyperparameterSpec> {
        self.specs.get_mut(name)
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        self.specs.get(name).map(|s| s.value)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.specs.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HyperparameterSpec> {
        self.specs.values()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        self.specs.values().try_for_each(HyperparameterSpec::validate)
    }

    /// Pick one of `candidates` uniformly among those present in this space and
    /// mutate it. Returns the name and new value, or `None` when no candidate is
    /// present.
    pub fn mutate_one<R: Rng + ?Sized>(&mut self, candidates: &[String], rng: &mut R) -> Option<(String, f64)> {
        let present: Vec<&String> = candidates.iter().filter(|c| self.specs.contains_key(c.as_str())).collect();
        let name = (*present.choose(rng)?).clone();
        let spec = self.specs.get_mut(&name)?;
        let value = spec.mutate(rng);
        Some((name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_continuous_stays_in_bounds() {
        let mut rng = StdRng::seed_from_u64(3);
        let mut spec = HyperparameterSpec::continuous("lr", 1e-3, 6.25e-5, 1e-2, 5.0);
        for _ in 0..1000 {
            let v = spec.mutate(&mut rng);
            assert!(v >= 6.25e-5 && v <= 1e-2);
        }
    }

    #[test]
    fn test_discrete_rounds_to_step() {
        let spec = HyperparameterSpec::discrete("learn_step", 3.0, 1.0, 10.0, 1.0, 0.5);
        assert_eq!(spec.project(3.4), 3.0);
        assert_eq!(spec.project(3.6), 4.0);
        assert_eq!(spec.project(42.0), 10.0);
        assert_eq!(spec.project(-1.0), 1.0);

        let batch = HyperparameterSpec::discrete("batch_size", 64.0, 8.0, 100.0, 16.0, 0.5);
        // 8 + 6 * 16 = 104 is out of range, so the highest reachable value is 88.
        assert_eq!(batch.project(100.0), 88.0);
    }

    #[test]
    fn test_zero_strength_is_fixed_point() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut spec = HyperparameterSpec::continuous("gamma", 0.99, 0.9, 0.999, 0.0);
        assert_eq!(spec.mutate(&mut rng), 0.99);
    }

    #[test]
    fn test_mutate_one_skips_missing_candidates() {
        let mut rng = StdRng::seed_from_u64(0);
        let mut space = HyperparameterSpace::new();
        space.insert(HyperparameterSpec::continuous("lr", 1e-3, 1e-4, 1e-2, 0.1));
        let picked = space.mutate_one(&["lr".to_string(), "tau".to_string()], &mut rng);
        assert_eq!(picked.map(|(name, _)| name), Some("lr".to_string()));
        assert!(space.mutate_one(&["tau".to_string()], &mut rng).is_none());
    }

    #[test]
    fn test_invalid_bounds_rejected() {
        let spec = HyperparameterSpec {
            name: "lr".into(),
            value: 0.1,
            min: 1.0,
            max: 0.0,
            kind: MutationKind::Continuous,
            strength: 0.1,
        };
        assert!(spec.validate().is_err());
    }
}
