//! Filigree sketching core - constrained 3D curves and the network they form
//!
//! This crate provides everything between raw pen input and surface patches:
//! - [`samples`] / [`constraint`] - what a stroke records while drawn
//! - [`builder`] / [`curve`] - curve fitting through constraints, hook trimming
//! - [`graph`] - node/segment network and cycle detection
//! - [`spatial`] - uniform-grid proximity index
//! - [`snapping`] - turning pen proximity into constraints
//! - [`surface`], [`mirror`], [`grid`] - host collaborators and in-memory versions
//! - [`reconstruction`] - oriented point buffers for an external reconstructor
//! - [`session`] - the drawing session tying it all together
//!
//! All geometry is in canvas space; positions coming from the host are
//! converted through a [`CanvasTransform`] on entry.

pub mod builder;
pub mod constants;
pub mod constraint;
pub mod curve;
pub mod graph;
pub mod grid;
pub mod mirror;
pub mod reconstruction;
pub mod samples;
pub mod selection;
pub mod session;
pub mod snapping;
pub mod spatial;
pub mod strokes;
pub mod surface;
pub mod types;

pub use builder::{trim_dangling_endpoints, BuildError, CurveBuilder, HookTrim};
pub use constants::*;
pub use constraint::{Constraint, ConstraintSet};
pub use curve::{Anchor, Curve, CurvePoint, KeepSide, Reparameterization};
pub use graph::{Cycle, CycleDetector, CycleKey, CycleUpdate, Graph, GraphNode, GraphSegment};
pub use grid::{Grid3D, LatticeGrid};
pub use mirror::{MirrorPlane, SymmetryPlane};
pub use reconstruction::{
    OrientedPoint, ReconstructionError, SurfaceReconstructor, TriangleMesh,
};
pub use samples::SampleBuffer;
pub use selection::PatchSelection;
pub use session::{PenSample, SessionError, SketchSession, StrokeChange};
pub use snapping::{classify, CollisionTarget};
pub use spatial::ProximityIndex;
pub use strokes::{CurveHit, FinalStroke, StrokeStore};
pub use surface::{PlanarPatch, PlanarPatches, SurfaceManager};
pub use types::*;

pub use filigree_config::{ConfigError, GridConfig, SketchParameters};
