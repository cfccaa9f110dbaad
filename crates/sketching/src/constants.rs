/// Numerical tolerance for positions and curve parameters.
pub const EPS: f32 = 1e-5;

/// Minimum area-vector length for a cycle to count as non-degenerate.
pub const MIN_CYCLE_AREA: f32 = 1e-8;

/// Segments scanned past the arrival hint when locating a constraint on the samples.
pub const CONSTRAINT_LOOKAHEAD_SEGMENTS: usize = 3;

/// Cell size used by proximity indices before any threshold is known.
pub const DEFAULT_CELL_SIZE: f32 = 0.05;
