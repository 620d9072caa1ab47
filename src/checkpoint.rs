//! Snapshot save/load for trained networks.
//!
//! Serializes the architecture and every parameter store to JSON. Arrays are
//! stored as nested `Vec`s so the file stays readable and independent of
//! ndarray's own serde layout. Activations are fixed by layer position and
//! are not stored.

use crate::core::{DbnError, DbnResult, LayerParams, OutputParams, RecurrentParams};
use crate::model::{Architecture, Dbn};
use ndarray::{Array1, Array2};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Shared weights and both biases of one hidden position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerSnapshot {
    pub w: Vec<Vec<f32>>,
    pub hbias: Vec<f32>,
    pub vbias: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecurrentSnapshot {
    pub w_uh: Vec<Vec<f32>>,
    pub w_uv: Vec<Vec<f32>>,
    pub w_vu: Vec<Vec<f32>>,
    pub w_uu: Vec<Vec<f32>>,
    pub bu: Vec<f32>,
    pub u0: Vec<f32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputSnapshot {
    pub w: Vec<Vec<f32>>,
    pub b: Vec<f32>,
}

/// Serializable form of a [`Dbn`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelSnapshot {
    /// Dimensions and label mode.
    pub architecture: Architecture,
    pub layers: Vec<LayerSnapshot>,
    pub recurrent: RecurrentSnapshot,
    pub output: OutputSnapshot,
    /// Validation loss of the parameters at save time, if the caller knows it.
    #[serde(default)]
    pub validation_loss: Option<f32>,
}

/// Convert an Array2 to Vec<Vec<f32>> for serialization.
fn array2_to_vecs(arr: &Array2<f32>) -> Vec<Vec<f32>> {
    arr.rows().into_iter().map(|row| row.to_vec()).collect()
}

/// Convert Vec<Vec<f32>> back to Array2.
fn vecs_to_array2(name: &str, vecs: &[Vec<f32>]) -> DbnResult<Array2<f32>> {
    let nrows = vecs.len();
    let ncols = vecs.first().map_or(0, Vec::len);
    let flat: Vec<f32> = vecs.iter().flat_map(|r| r.iter().copied()).collect();
    Array2::from_shape_vec((nrows, ncols), flat)
        .map_err(|e| DbnError::Checkpoint(format!("{name} is not a rectangular matrix: {e}")))
}

impl ModelSnapshot {
    pub fn from_dbn(dbn: &Dbn, validation_loss: Option<f32>) -> Self {
        let layers = dbn
            .layers()
            .iter()
            .map(|p| LayerSnapshot {
                w: array2_to_vecs(&p.w),
                hbias: p.hbias.to_vec(),
                vbias: p.vbias.to_vec(),
            })
            .collect();
        let r = dbn.recurrent_params();
        let o = dbn.output_params();
        Self {
            architecture: dbn.architecture().clone(),
            layers,
            recurrent: RecurrentSnapshot {
                w_uh: array2_to_vecs(&r.w_uh),
                w_uv: array2_to_vecs(&r.w_uv),
                w_vu: array2_to_vecs(&r.w_vu),
                w_uu: array2_to_vecs(&r.w_uu),
                bu: r.bu.to_vec(),
                u0: r.u0.to_vec(),
            },
            output: OutputSnapshot {
                w: array2_to_vecs(&o.w),
                b: o.b.to_vec(),
            },
            validation_loss,
        }
    }

    /// Rebuild the network, checking every array against the architecture.
    ///
    /// # Errors
    /// - `Checkpoint` if an array is ragged or disagrees with the stored dimensions
    pub fn to_dbn(&self) -> DbnResult<Dbn> {
        let mut layers = Vec::with_capacity(self.layers.len());
        for (i, l) in self.layers.iter().enumerate() {
            layers.push(LayerParams {
                w: vecs_to_array2(&format!("layer {i} weights"), &l.w)?,
                hbias: Array1::from(l.hbias.clone()),
                vbias: Array1::from(l.vbias.clone()),
            });
        }
        let r = &self.recurrent;
        let recurrent = RecurrentParams {
            w_uh: vecs_to_array2("w_uh", &r.w_uh)?,
            w_uv: vecs_to_array2("w_uv", &r.w_uv)?,
            w_vu: vecs_to_array2("w_vu", &r.w_vu)?,
            w_uu: vecs_to_array2("w_uu", &r.w_uu)?,
            bu: Array1::from(r.bu.clone()),
            u0: Array1::from(r.u0.clone()),
        };
        let output = OutputParams {
            w: vecs_to_array2("output weights", &self.output.w)?,
            b: Array1::from(self.output.b.clone()),
        };
        Dbn::from_parts(self.architecture.clone(), layers, recurrent, output)
            .map_err(|e| DbnError::Checkpoint(format!("snapshot does not describe a network: {e}")))
    }
}

/// Save a network snapshot to a JSON file, creating parent directories.
///
/// # Errors
///
/// Returns `Checkpoint` if the file cannot be written or the data cannot be serialized.
pub fn save_snapshot(dbn: &Dbn, path: &Path, validation_loss: Option<f32>) -> DbnResult<()> {
    let data = ModelSnapshot::from_dbn(dbn, validation_loss);
    let json = serde_json::to_string_pretty(&data)
        .map_err(|e| DbnError::Checkpoint(format!("Failed to serialize snapshot: {e}")))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| DbnError::Checkpoint(format!("Failed to create snapshot directory: {e}")))?;
    }

    std::fs::write(path, json).map_err(|e| {
        DbnError::Checkpoint(format!("Failed to write snapshot to {}: {e}", path.display()))
    })
}

/// Load a snapshot from a JSON file and rebuild the network.
///
/// # Errors
///
/// Returns `Checkpoint` if the file cannot be read, parsed, or rebuilt.
pub fn load_snapshot(path: &Path) -> DbnResult<(ModelSnapshot, Dbn)> {
    let json = std::fs::read_to_string(path).map_err(|e| {
        DbnError::Checkpoint(format!("Failed to read snapshot from {}: {e}", path.display()))
    })?;
    let data: ModelSnapshot = serde_json::from_str(&json)
        .map_err(|e| DbnError::Checkpoint(format!("Failed to parse snapshot: {e}")))?;
    let dbn = data.to_dbn()?;
    Ok((data, dbn))
}
