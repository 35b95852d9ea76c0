#![deny(bare_trait_objects)]

//! The svgbake flattening pipeline.
//!
//! Takes an SVG document and reduces every geometric element to a minimal
//! canonical form: `transform` attributes baked into coordinates,
//! indirection (`use`/`symbol`, markers, patterns, masks) expanded into
//! concrete geometry, and clip paths applied as actual boolean
//! intersections. Every numeric step runs through the decimal kernel, and
//! a verification pass checks each mutation stage against the invariants
//! it is supposed to preserve.
//!
//! ```no_run
//! use svgbake_flatten::{flatten_str, FlattenOptions};
//!
//! let svg = r#"<svg><circle cx="10" cy="10" r="5" transform="scale(2)"/></svg>"#;
//! let out = flatten_str(svg, &FlattenOptions::DEFAULT).unwrap();
//! println!("{}", out.svg);
//! for warning in &out.stats.warnings {
//!     eprintln!("warning: {}", warning);
//! }
//! ```

pub extern crate svgbake_algorithms as algorithms;

pub use crate::algorithms::decimal;
pub use crate::algorithms::linalg;
pub use crate::algorithms::path;

pub mod dom;
mod clips;
mod gradients;
mod markers;
mod masks;
mod patterns;
mod pipeline;
pub mod transform;
mod use_resolve;
pub mod verify;

pub use crate::pipeline::{flatten_str, FlattenOutput, Flattener};
pub use crate::verify::{Verification, VerificationMode, VerifyCategory};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use svgbake_algorithms::GeometryError;
use svgbake_decimal::DecimalError;
use svgbake_linalg::LinAlgError;
use svgbake_path::PathError;
use thiserror::Error;

/// The pipeline stages, in execution order, plus the surrounding XML
/// parse step.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Stage {
    Parse,
    ResolveUse,
    Markers,
    Patterns,
    Masks,
    ClipPaths,
    Gradients,
    Transforms,
    DefsSweep,
}

impl Stage {
    pub fn name(self) -> &'static str {
        match self {
            Stage::Parse => "xml-parse",
            Stage::ResolveUse => "use-resolution",
            Stage::Markers => "marker-instantiation",
            Stage::Patterns => "pattern-expansion",
            Stage::Masks => "mask-conversion",
            Stage::ClipPaths => "clip-path-application",
            Stage::Gradients => "gradient-baking",
            Stage::Transforms => "transform-flattening",
            Stage::DefsSweep => "defs-sweep",
        }
    }
}

impl core::fmt::Display for Stage {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.name())
    }
}

/// What went wrong, without pipeline context.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ErrorKind {
    #[error("XML parse error: {0}")]
    Xml(#[from] roxmltree::Error),
    #[error("invalid transform {src:?}: {message}")]
    InvalidTransform { src: String, message: String },
    #[error("invalid viewBox {src:?}: {message}")]
    InvalidViewBox { src: String, message: String },
    #[error("invalid path data: {0}")]
    InvalidPath(#[from] PathError),
    #[error("unresolved reference {0:?}")]
    UnresolvedReference(String),
    #[error("reference cycle through {0:?}")]
    ReferenceCycle(String),
    #[error("clip produced an empty intersection")]
    DegenerateIntersection,
    #[error("cancelled")]
    Cancelled,
    #[error("verification failed: {0}")]
    VerificationFailed(String),
    #[error(transparent)]
    Numeric(#[from] DecimalError),
    #[error(transparent)]
    LinAlg(#[from] LinAlgError),
    #[error(transparent)]
    Geometry(#[from] GeometryError),
}

/// A pipeline error, located by stage and (when known) element id.
#[derive(Debug)]
pub struct FlattenError {
    pub stage: Stage,
    pub element: Option<String>,
    pub kind: ErrorKind,
}

impl FlattenError {
    pub fn new(stage: Stage, element: Option<String>, kind: ErrorKind) -> FlattenError {
        FlattenError {
            stage,
            element,
            kind,
        }
    }
}

impl core::fmt::Display for FlattenError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match &self.element {
            Some(id) => write!(f, "{} (#{}): {}", self.stage, id, self.kind),
            None => write!(f, "{}: {}", self.stage, self.kind),
        }
    }
}

impl std::error::Error for FlattenError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.kind)
    }
}

/// Options controlling the pipeline.
///
/// The defaults flatten everything; individual stages can be switched off
/// with the `with_*` builders.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
#[non_exhaustive]
pub struct FlattenOptions {
    /// Decimal places in emitted numbers.
    ///
    /// Default value: `6`.
    pub precision: i64,

    /// Significant digits carried by internal decimals.
    ///
    /// Default value: `80`.
    pub working_precision: u32,

    /// Cubic Béziers per full circle or ellipse, rounded up to a multiple
    /// of four.
    ///
    /// Default value: `8`.
    pub bezier_arcs: u32,

    /// Sample count per curve edge when converting to polygons.
    ///
    /// Default value: `64`.
    pub clip_segments: u32,

    /// Tolerance of the end-to-end area conservation check.
    ///
    /// Default value: `1e-10`.
    pub e2e_tolerance: f64,

    pub resolve_use: bool,
    pub resolve_markers: bool,
    pub resolve_patterns: bool,
    pub resolve_masks: bool,
    pub resolve_clip_paths: bool,
    pub flatten_transforms: bool,
    pub bake_gradients: bool,
    pub remove_unused_defs: bool,

    /// Whether a failed verification aborts the pipeline.
    ///
    /// Default value: `VerificationMode::Report`.
    pub verification: VerificationMode,
}

impl FlattenOptions {
    pub const DEFAULT_PRECISION: i64 = 6;
    pub const DEFAULT_WORKING_PRECISION: u32 = 80;
    pub const DEFAULT_BEZIER_ARCS: u32 = 8;
    pub const DEFAULT_CLIP_SEGMENTS: u32 = 64;

    pub const DEFAULT: Self = FlattenOptions {
        precision: Self::DEFAULT_PRECISION,
        working_precision: Self::DEFAULT_WORKING_PRECISION,
        bezier_arcs: Self::DEFAULT_BEZIER_ARCS,
        clip_segments: Self::DEFAULT_CLIP_SEGMENTS,
        e2e_tolerance: 1e-10,
        resolve_use: true,
        resolve_markers: true,
        resolve_patterns: true,
        resolve_masks: true,
        resolve_clip_paths: true,
        flatten_transforms: true,
        bake_gradients: true,
        remove_unused_defs: true,
        verification: VerificationMode::Report,
    };

    #[inline]
    pub fn with_precision(mut self, precision: i64) -> Self {
        self.precision = precision;
        self
    }

    #[inline]
    pub fn with_working_precision(mut self, digits: u32) -> Self {
        self.working_precision = digits;
        self
    }

    #[inline]
    pub fn with_bezier_arcs(mut self, arcs: u32) -> Self {
        self.bezier_arcs = arcs;
        self
    }

    #[inline]
    pub fn with_clip_segments(mut self, segments: u32) -> Self {
        self.clip_segments = segments;
        self
    }

    #[inline]
    pub fn with_e2e_tolerance(mut self, tolerance: f64) -> Self {
        self.e2e_tolerance = tolerance;
        self
    }

    #[inline]
    pub fn with_verification(mut self, mode: VerificationMode) -> Self {
        self.verification = mode;
        self
    }

    #[inline]
    pub fn without_use_resolution(mut self) -> Self {
        self.resolve_use = false;
        self
    }

    #[inline]
    pub fn without_markers(mut self) -> Self {
        self.resolve_markers = false;
        self
    }

    #[inline]
    pub fn without_patterns(mut self) -> Self {
        self.resolve_patterns = false;
        self
    }

    #[inline]
    pub fn without_masks(mut self) -> Self {
        self.resolve_masks = false;
        self
    }

    #[inline]
    pub fn without_clip_paths(mut self) -> Self {
        self.resolve_clip_paths = false;
        self
    }

    #[inline]
    pub fn without_transform_flattening(mut self) -> Self {
        self.flatten_transforms = false;
        self
    }

    #[inline]
    pub fn without_gradient_baking(mut self) -> Self {
        self.bake_gradients = false;
        self
    }

    #[inline]
    pub fn keep_unused_defs(mut self) -> Self {
        self.remove_unused_defs = false;
        self
    }
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Counters and warnings reported by a flatten run.
#[derive(Clone, Debug, Default)]
#[cfg_attr(feature = "serialization", derive(serde::Serialize, serde::Deserialize))]
pub struct FlattenStats {
    pub transforms_flattened: u64,
    pub use_resolved: u64,
    pub markers_resolved: u64,
    pub patterns_resolved: u64,
    pub masks_resolved: u64,
    pub clip_paths_applied: u64,
    pub gradients_processed: u64,
    pub warnings: Vec<String>,
    #[cfg_attr(feature = "serialization", serde(skip))]
    pub verifications: Vec<Verification>,
}

impl FlattenStats {
    pub(crate) fn warn(&mut self, stage: Stage, message: impl Into<String>) {
        let message = message.into();
        log::warn!("{}: {}", stage.name(), message);
        self.warnings.push(format!("{}: {}", stage.name(), message));
    }

    /// Number of failed verifications.
    pub fn verification_failures(&self) -> usize {
        self.verifications.iter().filter(|v| !v.valid).count()
    }
}

/// Cooperative cancellation, polled between stages and between top-level
/// elements within a stage.
#[derive(Clone, Debug, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> CancellationToken {
        CancellationToken::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}
