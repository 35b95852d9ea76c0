#![deny(bare_trait_objects)]

//! svgbake takes an SVG document and produces a semantically equivalent
//! document in which every geometric element has been reduced to a
//! minimal canonical form: `transform` attributes baked into
//! coordinates, `use`/`symbol` references, markers, patterns and masks
//! expanded into concrete geometry, and clip paths applied as actual
//! boolean intersections. Every numeric operation runs through an
//! arbitrary-precision decimal layer, and every mutation stage is
//! checked by a verification pass.
//!
//! This crate re-exports the member crates:
//!
//! - [`decimal`]: the decimal kernel ([`Decimal`], [`Context`]);
//! - [`linalg`]: decimal matrices, vectors and affine constructors;
//! - [`path`]: path data model, parser, canonicalizer, serializer;
//! - [`algorithms`]: shape conversion and the polygon engine;
//! - [`flatten`]: the pipeline itself.
//!
//! # Example
//!
//! ```no_run
//! use svgbake::{flatten_str, FlattenOptions};
//!
//! let input = std::fs::read_to_string("drawing.svg").unwrap();
//! let output = flatten_str(&input, &FlattenOptions::DEFAULT).unwrap();
//! std::fs::write("drawing.flat.svg", &output.svg).unwrap();
//! println!(
//!     "{} transforms flattened, {} warnings",
//!     output.stats.transforms_flattened,
//!     output.stats.warnings.len()
//! );
//! ```

pub use svgbake_algorithms as algorithms;
pub use svgbake_flatten as flatten;

pub use svgbake_flatten::decimal;
pub use svgbake_flatten::linalg;
pub use svgbake_flatten::path;

pub use svgbake_flatten::{
    flatten_str, CancellationToken, FlattenError, FlattenOptions, FlattenOutput, FlattenStats,
    Flattener, Verification, VerificationMode,
};

pub use svgbake_flatten::decimal::{Context, Decimal};
pub use svgbake_flatten::linalg::{Matrix, Point, Vector};
pub use svgbake_flatten::path::Path;
