#![deny(bare_trait_objects)]
#![deny(unconditional_recursion)]
#![allow(clippy::many_single_char_names)]

//! Dense linear algebra over arbitrary-precision decimals.
//!
//! This crate is reexported in [svgbake](https://docs.rs/svgbake/).
//!
//! Provides the [`Matrix`] and [`Vector`] types used throughout the
//! flattening pipeline, and the affine transform constructors (2D 3×3 and
//! 3D 4×4 homogeneous matrices) in [`affine`] and [`affine3`].
//!
//! All values are built from [`svgbake_decimal::Decimal`] and every
//! rounding operation goes through an explicit
//! [`Context`](svgbake_decimal::Context).

pub use svgbake_decimal as decimal;

pub mod affine;
pub mod affine3;
mod matrix;
mod point;
mod vector;

pub use crate::matrix::{LuDecomposition, Matrix};
pub use crate::point::{point, Point};
pub use crate::vector::Vector;

use svgbake_decimal::DecimalError;
use thiserror::Error;

/// Errors produced by matrix and vector operations.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq)]
pub enum LinAlgError {
    #[error("Expected a square matrix, got {rows}x{cols}.")]
    NotSquare { rows: usize, cols: usize },
    #[error("Incompatible shapes: {0}.")]
    ShapeMismatch(String),
    #[error("The matrix is singular.")]
    Singular,
    #[error("The zero vector has no direction.")]
    ZeroVector,
    #[error("The rotation axis is the zero vector.")]
    ZeroAxis,
    #[error(transparent)]
    Numeric(#[from] DecimalError),
}
