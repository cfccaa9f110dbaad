//! Shared configuration for Filigree
//!
//! This crate provides the single source of truth for the sketching
//! thresholds used while drawing, snapping, trimming and surfacing.
//! Distances are authored in world units; [`SketchParameters::scaled`]
//! converts them into canvas units for a given canvas scale.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[cfg(feature = "bevy")]
use bevy::prelude::Resource;

/// Default minimum distance between two consecutive accepted samples
pub const DEFAULT_MIN_SAMPLING_DISTANCE: f32 = 0.002;

/// Default distance under which two consecutive constraints are merged
pub const DEFAULT_MERGE_CONSTRAINTS_THRESHOLD: f32 = 0.01;

/// Default snapping radius around existing graph nodes
pub const DEFAULT_SNAP_TO_EXISTING_NODE_THRESHOLD: f32 = 0.03;

/// Default snapping radius for grid points, mirror plane and patches
pub const DEFAULT_PROXIMITY_THRESHOLD: f32 = 0.02;

/// Default maximum length of a dangling hook section
pub const DEFAULT_MAX_HOOK_SECTION_LENGTH: f32 = 0.05;

/// Default maximum hook length as a fraction of the stroke length
pub const DEFAULT_MAX_HOOK_SECTION_STROKE_RATIO: f32 = 0.1;

/// Maximum vertex/face count accepted from a surface reconstruction
pub const DEFAULT_RECONSTRUCTION_CAPACITY: usize = 50_000;

/// Errors raised while loading or validating parameters
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse parameters: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Parameter `{name}` must be a positive finite distance, got {value}")]
    InvalidDistance { name: &'static str, value: f32 },
    #[error("Parameter `{name}` must be a ratio in (0, 1], got {value}")]
    InvalidRatio { name: &'static str, value: f32 },
    #[error("Parameter `{0}` must be non-zero")]
    ZeroCapacity(&'static str),
    #[error("Invalid canvas scale: {0}")]
    InvalidScale(f32),
}

/// Thresholds driving sampling, snapping, trimming and surfacing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct SketchParameters {
    /// Samples closer than this to the previous accepted sample are dropped
    pub min_sampling_distance: f32,
    /// Consecutive constraints closer than this are collapsed into one
    pub merge_constraints_threshold: f32,
    /// Radius within which a committed node captures the pen
    pub snap_to_existing_node_threshold: f32,
    /// Radius for grid points, the mirror plane, stroke hits and patches
    pub proximity_threshold: f32,
    /// Hooks longer than this are never trimmed
    pub max_hook_section_length: f32,
    /// Hooks longer than this fraction of the stroke are never trimmed
    pub max_hook_section_stroke_ratio: f32,
    /// Base tolerance; cuts snap to existing curve points within a tenth of it
    pub small_distance: f32,
    /// Resampling step of built curves
    pub min_segment_length: f32,
    /// Allowed out-of-plane deviation of a cycle, as a fraction of its perimeter
    pub cycle_planarity_tolerance: f32,
    /// Stroke display diameter
    pub base_curve_width: f32,
    /// Keep stroke widths constant in canvas space while zooming
    pub canvas_space_constant_width: bool,
    /// Detect cycles automatically after every graph change
    pub automatic_surfacing: bool,
    /// Vertex capacity handed to the surface reconstructor
    pub max_reconstruction_vertices: usize,
    /// Face capacity handed to the surface reconstructor
    pub max_reconstruction_faces: usize,
}

impl Default for SketchParameters {
    fn default() -> Self {
        Self {
            min_sampling_distance: DEFAULT_MIN_SAMPLING_DISTANCE,
            merge_constraints_threshold: DEFAULT_MERGE_CONSTRAINTS_THRESHOLD,
            snap_to_existing_node_threshold: DEFAULT_SNAP_TO_EXISTING_NODE_THRESHOLD,
            proximity_threshold: DEFAULT_PROXIMITY_THRESHOLD,
            max_hook_section_length: DEFAULT_MAX_HOOK_SECTION_LENGTH,
            max_hook_section_stroke_ratio: DEFAULT_MAX_HOOK_SECTION_STROKE_RATIO,
            small_distance: 0.01,
            min_segment_length: 0.01,
            cycle_planarity_tolerance: 0.25,
            base_curve_width: 0.005,
            canvas_space_constant_width: true,
            automatic_surfacing: true,
            max_reconstruction_vertices: DEFAULT_RECONSTRUCTION_CAPACITY,
            max_reconstruction_faces: DEFAULT_RECONSTRUCTION_CAPACITY,
        }
    }
}

impl SketchParameters {
    /// Parse parameters from JSON, filling missing fields with defaults
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let params: Self = serde_json::from_str(json)?;
        params.validate()?;
        Ok(params)
    }

    /// Check that every threshold is usable
    pub fn validate(&self) -> Result<(), ConfigError> {
        let distances = [
            ("min_sampling_distance", self.min_sampling_distance),
            ("merge_constraints_threshold", self.merge_constraints_threshold),
            (
                "snap_to_existing_node_threshold",
                self.snap_to_existing_node_threshold,
            ),
            ("proximity_threshold", self.proximity_threshold),
            ("max_hook_section_length", self.max_hook_section_length),
            ("small_distance", self.small_distance),
            ("min_segment_length", self.min_segment_length),
            ("cycle_planarity_tolerance", self.cycle_planarity_tolerance),
            ("base_curve_width", self.base_curve_width),
        ];
        for (name, value) in distances {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::InvalidDistance { name, value });
            }
        }

        let ratio = self.max_hook_section_stroke_ratio;
        if !ratio.is_finite() || ratio <= 0.0 || ratio > 1.0 {
            return Err(ConfigError::InvalidRatio {
                name: "max_hook_section_stroke_ratio",
                value: ratio,
            });
        }

        if self.max_reconstruction_vertices == 0 {
            return Err(ConfigError::ZeroCapacity("max_reconstruction_vertices"));
        }
        if self.max_reconstruction_faces == 0 {
            return Err(ConfigError::ZeroCapacity("max_reconstruction_faces"));
        }
        Ok(())
    }

    /// Convert world-unit distances to canvas units for the given canvas scale
    ///
    /// Ratios, widths and capacities are left untouched.
    pub fn scaled(&self, canvas_scale: f32) -> Result<Self, ConfigError> {
        if !canvas_scale.is_finite() || canvas_scale <= 0.0 {
            return Err(ConfigError::InvalidScale(canvas_scale));
        }
        let inv = 1.0 / canvas_scale;
        Ok(Self {
            min_sampling_distance: self.min_sampling_distance * inv,
            merge_constraints_threshold: self.merge_constraints_threshold * inv,
            snap_to_existing_node_threshold: self.snap_to_existing_node_threshold * inv,
            proximity_threshold: self.proximity_threshold * inv,
            max_hook_section_length: self.max_hook_section_length * inv,
            small_distance: self.small_distance * inv,
            min_segment_length: self.min_segment_length * inv,
            ..self.clone()
        })
    }

    /// Distance under which a cut snaps onto an existing curve point
    pub fn cut_snap_distance(&self) -> f32 {
        self.small_distance * 0.1
    }
}

/// Uniform snapping lattice around the canvas origin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "bevy", derive(Resource))]
#[serde(default)]
pub struct GridConfig {
    /// Distance between neighboring grid points, in canvas units
    pub spacing: f32,
    /// Number of cells on each side of the origin along every axis
    pub half_extent: u32,
    /// Lattice origin in canvas space
    pub origin: [f32; 3],
}

impl Default for GridConfig {
    fn default() -> Self {
        Self {
            spacing: 0.1,
            half_extent: 5,
            origin: [0.0, 0.0, 0.0],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_parameters_are_valid() {
        let params = SketchParameters::default();
        assert!(params.validate().is_ok());
        assert_eq!(params.min_sampling_distance, DEFAULT_MIN_SAMPLING_DISTANCE);
        assert!(params.automatic_surfacing);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let params =
            SketchParameters::from_json_str(r#"{ "proximity_threshold": 0.05 }"#).unwrap();
        assert_eq!(params.proximity_threshold, 0.05);
        assert_eq!(
            params.merge_constraints_threshold,
            DEFAULT_MERGE_CONSTRAINTS_THRESHOLD
        );
    }

    #[test]
    fn test_invalid_ratio_rejected() {
        let err = SketchParameters::from_json_str(r#"{ "max_hook_section_stroke_ratio": 1.5 }"#)
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRatio { .. }));
    }

    #[test]
    fn test_negative_distance_rejected() {
        let params = SketchParameters {
            min_sampling_distance: -1.0,
            ..Default::default()
        };
        assert!(matches!(
            params.validate(),
            Err(ConfigError::InvalidDistance {
                name: "min_sampling_distance",
                ..
            })
        ));
    }

    #[test]
    fn test_scaled_divides_distances_only() {
        let params = SketchParameters::default();
        let scaled = params.scaled(2.0).unwrap();
        assert!((scaled.proximity_threshold - params.proximity_threshold / 2.0).abs() < 1e-7);
        assert_eq!(
            scaled.max_hook_section_stroke_ratio,
            params.max_hook_section_stroke_ratio
        );
        assert_eq!(scaled.base_curve_width, params.base_curve_width);
        assert!(params.scaled(0.0).is_err());
    }

    #[test]
    fn test_cut_snap_distance() {
        let params = SketchParameters::default();
        assert!((params.cut_snap_distance() - 0.001).abs() < 1e-7);
    }
}
