//! Layer number and Z height lookup
//!
//! [`LayerMapper`] resolves a user selection (a layer number or a Z height
//! measured on the failed print) to one of the parsed layers. Z lookups snap
//! to the nearest layer when within the tolerance and report the snap as a
//! warning.

use crate::error::{Error, Result};
use crate::parser::Layer;
use serde::Serialize;
use std::collections::HashMap;

/// Default Z matching tolerance in mm
pub const DEFAULT_TOLERANCE_MM: f64 = 0.15;

/// Float noise allowance when comparing Z distances
const Z_EPSILON: f64 = 1e-9;

/// Result of a layer lookup
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerMatch {
    /// The matched layer
    pub layer: Layer,
    /// True for exact number or Z matches
    pub exact: bool,
    /// Requested Z minus matched Z (0 for exact matches)
    pub delta_mm: f64,
    /// Human-readable note for fuzzy matches
    pub warning: Option<String>,
}

impl LayerMatch {
    /// An exact match on `layer`
    pub fn exact(layer: Layer) -> Self {
        Self {
            layer,
            exact: true,
            delta_mm: 0.0,
            warning: None,
        }
    }
}

/// Bidirectional layer number / Z height mapper
#[derive(Debug, Clone)]
pub struct LayerMapper {
    layers: Vec<Layer>,
    tolerance: f64,
    by_number: HashMap<i64, usize>,
    z_sorted: Vec<usize>,
    min_layer: i64,
    max_layer: i64,
}

impl LayerMapper {
    /// Build a mapper over `layers`
    ///
    /// Fails with [`Error::NoLayers`] when `layers` is empty.
    pub fn new(layers: &[Layer], tolerance_mm: f64) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::NoLayers);
        }
        let layers = layers.to_vec();

        // Later duplicates of a layer number replace earlier ones.
        let by_number = layers
            .iter()
            .enumerate()
            .map(|(idx, layer)| (layer.number, idx))
            .collect();

        let mut z_sorted: Vec<usize> = (0..layers.len()).collect();
        z_sorted.sort_by(|&a, &b| layers[a].z_height.total_cmp(&layers[b].z_height));

        let min_layer = layers.iter().map(|l| l.number).min().unwrap_or_default();
        let max_layer = layers.iter().map(|l| l.number).max().unwrap_or_default();

        Ok(Self {
            layers,
            tolerance: tolerance_mm,
            by_number,
            z_sorted,
            min_layer,
            max_layer,
        })
    }

    /// Number of layers
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Smallest layer number
    pub fn min_layer(&self) -> i64 {
        self.min_layer
    }

    /// Largest layer number
    pub fn max_layer(&self) -> i64 {
        self.max_layer
    }

    /// Lowest layer Z
    pub fn min_z(&self) -> f64 {
        self.layers[self.z_sorted[0]].z_height
    }

    /// Highest layer Z
    pub fn max_z(&self) -> f64 {
        self.layers[self.z_sorted[self.z_sorted.len() - 1]].z_height
    }

    /// Z matching tolerance in mm
    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    /// All layers in source order
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// The layer following `number` in source order, if any
    pub fn next_layer(&self, number: i64) -> Option<&Layer> {
        let idx = *self.by_number.get(&number)?;
        self.layers.get(idx + 1)
    }

    /// Look up a layer by number
    pub fn by_layer_number(&self, number: i64) -> Result<LayerMatch> {
        let idx = self
            .by_number
            .get(&number)
            .ok_or(Error::LayerNotFound {
                number,
                min: self.min_layer,
                max: self.max_layer,
            })?;
        Ok(LayerMatch::exact(self.layers[*idx].clone()))
    }

    /// Find the layer whose Z is closest to `z_mm`
    pub fn by_z_height(&self, z_mm: f64) -> Result<LayerMatch> {
        let mut best = &self.layers[self.z_sorted[0]];
        let mut best_delta = f64::INFINITY;
        for &idx in &self.z_sorted {
            let layer = &self.layers[idx];
            let delta = z_mm - layer.z_height;
            if delta.abs() < best_delta.abs() {
                best_delta = delta;
                best = layer;
            }
        }

        if best_delta.abs() <= Z_EPSILON {
            return Ok(LayerMatch::exact(best.clone()));
        }

        if best_delta.abs() <= self.tolerance + Z_EPSILON {
            let warning = format!(
                "Measured Z {:.3} mm is {:+.3} mm from layer {} (Z {:.3} mm). \
                 Within tolerance (±{} mm), using layer {}.",
                z_mm, best_delta, best.number, best.z_height, self.tolerance, best.number
            );
            tracing::debug!("{}", warning);
            return Ok(LayerMatch {
                layer: best.clone(),
                exact: false,
                delta_mm: best_delta,
                warning: Some(warning),
            });
        }

        Err(Error::ZOutOfTolerance {
            z: z_mm,
            distance: best_delta.abs(),
            nearest_layer: best.number,
            nearest_z: best.z_height,
            tolerance: self.tolerance,
        })
    }
}
