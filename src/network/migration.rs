//! Weight-migration plans.
//!
//! A structural mutation never touches tensors directly. It emits a
//! [`MigrationPlan`] describing, for every layer of the *new* network, where
//! each row and column of its weight matrix comes from in the *old* network.
//! The materialization step ([`DenseNetwork::migrate`]) and the optimizer
//! ([`Adam::migrate`]) both consume the same plan, which keeps weights
//! and optimizer moments in lockstep.
//!
//! [`DenseNetwork::migrate`]: crate::network::DenseNetwork::migrate
//! [`Adam::migrate`]: crate::optimizer::Adam::migrate

use ndarray::{Array1, Array2};
use serde::{Serialize, Deserialize};

use crate::error::{EvoError, Result};

/// Maps every index along one tensor axis of the new layer to an index of
/// the old layer, or to `None` for a freshly initialized slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AxisMap(pub Vec<Option<usize>>);

impl AxisMap {
    pub fn identity(len: usize) -> Self {
        AxisMap((0..len).map(Some).collect())
    }

    /// Keep the leading `min(old_len, new_len)` indices, fresh-initialize the rest.
    pub fn prefix(old_len: usize, new_len: usize) -> Self {
        AxisMap((0..new_len).map(|i| if i < old_len { Some(i) } else { None }).collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn is_identity_of(&self, old_len: usize) -> bool {
        self.0.len() == old_len && self.0.iter().enumerate().all(|(i, src)| *src == Some(i))
    }

    fn max_source(&self) -> Option<usize> {
        self.0.iter().flatten().copied().max()
    }
}

/// What happens to one layer of the new network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum LayerMigration {
    /// Brand-new layer; every parameter is freshly initialized.
    Fresh,
    /// Parameters are gathered from `source` in the old network.
    Migrate {
        source: usize,
        rows: AxisMap,
        cols: AxisMap,
    },
}

/// Per-layer migration instructions, indexed by new layer position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MigrationPlan {
    pub layers: Vec<LayerMigration>,
}

impl MigrationPlan {
    /// Identity plan for a network whose shapes did not change.
    pub fn identity(shapes: &[(usize, usize)]) -> Self {
        MigrationPlan {
            layers: shapes
                .iter()
                .enumerate()
                .map(|(i, &(rows, cols))| LayerMigration::Migrate {
                    source: i,
                    rows: AxisMap::identity(rows),
                    cols: AxisMap::identity(cols),
                })
                .collect(),
        }
    }

    /// Build a plan from old and new layer shapes plus a correspondence from
    /// each new layer to the old layer it descends from. Overlapping leading
    /// regions are copied; everything else is fresh.
    pub fn between(
        old_shapes: &[(usize, usize)],
        new_shapes: &[(usize, usize)],
        correspondence: &[Option<usize>],
    ) -> Self {
        let layers = new_shapes
            .iter()
            .zip(correspondence)
            .map(|(&(new_rows, new_cols), source)| match source {
                Some(src) if *src < old_shapes.len() => {
                    let (old_rows, old_cols) = old_shapes[*src];
                    LayerMigration::Migrate {
                        source: *src,
                        rows: AxisMap::prefix(old_rows, new_rows),
                        cols: AxisMap::prefix(old_cols, new_cols),
                    }
                }
                _ => LayerMigration::Fresh,
            })
            .collect();
        MigrationPlan { layers }
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// True when applying the plan reproduces `old_shapes` unchanged.
    pub fn is_identity(&self, old_shapes: &[(usize, usize)]) -> bool {
        self.layers.len() == old_shapes.len()
            && self.layers.iter().enumerate().all(|(i, layer)| match layer {
                LayerMigration::Migrate { source, rows, cols } => {
                    *source == i && rows.is_identity_of(old_shapes[i].0) && cols.is_identity_of(old_shapes[i].1)
                }
                LayerMigration::Fresh => false,
            })
    }

    /// Check the plan against the shapes it will be applied to.
    pub fn check(&self, old_shapes: &[(usize, usize)], new_shapes: &[(usize, usize)]) -> Result<()> {
        if self.layers.len() != new_shapes.len() {
            return Err(EvoError::dimension_mismatch(
                format!("{} layer migrations", new_shapes.len()),
                format!("{} layer migrations", self.layers.len()),
            ));
        }
        for (i, (layer, &(new_rows, new_cols))) in self.layers.iter().zip(new_shapes).enumerate() {
            if let LayerMigration::Migrate { source, rows, cols } = layer {
                let &(old_rows, old_cols) = old_shapes.get(*source).ok_or_else(|| {
                    EvoError::dimension_mismatch(
                        format!("source layer < {}", old_shapes.len()),
                        format!("source layer {} for layer {}", source, i),
                    )
                })?;
                let rows_fit = rows.len() == new_rows && rows.max_source().map_or(true, |m| m < old_rows);
                let cols_fit = cols.len() == new_cols && cols.max_source().map_or(true, |m| m < old_cols);
                if !(rows_fit && cols_fit) {
                    return Err(EvoError::dimension_mismatch(
                        format!("layer {} shaped {}x{} from {}x{}", i, new_rows, new_cols, old_rows, old_cols),
                        format!("axis maps of length {}x{}", rows.len(), cols.len()),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Copy the mapped entries of `old` into `fresh`, leaving unmapped entries as
/// initialized by the caller.
pub fn migrate_matrix(old: &Array2<f32>, rows: &AxisMap, cols: &AxisMap, mut fresh: Array2<f32>) -> Array2<f32> {
    for (new_r, old_r) in rows.0.iter().enumerate() {
        let Some(old_r) = old_r else { continue };
        for (new_c, old_c) in cols.0.iter().enumerate() {
            if let Some(old_c) = old_c {
                fresh[[new_r, new_c]] = old[[*old_r, *old_c]];
            }
        }
    }
    fresh
}

/// Vector counterpart of [`migrate_matrix`], used for biases (indexed by columns).
pub fn migrate_vector(old: &Array1<f32>, map: &AxisMap, mut fresh: Array1<f32>) -> Array1<f32> {
    for (new_i, old_i) in map.0.iter().enumerate() {
        if let Some(old_i) = old_i {
            fresh[new_i] = old[*old_i];
        }
    }
    fresh
}
