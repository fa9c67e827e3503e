use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

/// Gradient clipping methods
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum GradientClipper {
    /// Clip gradients by global norm (across all parameters)
    ClipByGlobalNorm { max_norm: f32 },

    /// No clipping
    None,
}

impl Default for GradientClipper {
    fn default() -> Self {
        GradientClipper::None
    }
}

impl GradientClipper {
    /// Clip a full set of per-layer `(weight, bias)` gradients in place.
    pub fn clip(&self, gradients: &mut [(Array2<f32>, Array1<f32>)]) {
        match *self {
            GradientClipper::ClipByGlobalNorm { max_norm } => {
                let global_norm = Self::compute_global_norm(gradients);
                if global_norm > max_norm && global_norm.is_finite() {
                    let scale = max_norm / global_norm;
                    for (w, b) in gradients.iter_mut() {
                        w.mapv_inplace(|g| g * scale);
                        b.mapv_inplace(|g| g * scale);
                    }
                }
            }

            GradientClipper::None => {}
        }
    }

    /// Compute global norm of all gradients
    pub fn compute_global_norm(gradients: &[(Array2<f32>, Array1<f32>)]) -> f32 {
        gradients
            .iter()
            .map(|(w, b)| w.iter().map(|&x| x * x).sum::<f32>() + b.iter().map(|&x| x * x).sum::<f32>())
            .sum::<f32>()
            .sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{array, Array2};

    #[test]
    fn test_global_norm_scaling() {
        let mut grads = vec![(Array2::from_elem((1, 1), 3.0), array![4.0])];
        GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut grads);
        let norm = GradientClipper::compute_global_norm(&grads);
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_small_gradients_untouched() {
        let mut grads = vec![(Array2::from_elem((1, 1), 0.3), array![0.4])];
        GradientClipper::ClipByGlobalNorm { max_norm: 1.0 }.clip(&mut grads);
        assert_eq!(grads[0].0[[0, 0]], 0.3);
        GradientClipper::None.clip(&mut grads);
        assert_eq!(grads[0].1, array![0.4]);
    }
}
