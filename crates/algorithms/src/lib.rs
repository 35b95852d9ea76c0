#![deny(bare_trait_objects)]
#![allow(clippy::many_single_char_names)]

//! Geometry algorithms on decimal paths: basic shape conversion, arc
//! sampling, and the polygon engine used to realize clip paths.
//!
//! This crate is reexported in [svgbake](https://docs.rs/svgbake/).

pub extern crate svgbake_path as path;

pub mod arc;
pub mod polygon;
pub mod shapes;

pub use crate::path::decimal;
pub use crate::path::linalg;

use svgbake_decimal::DecimalError;
use svgbake_linalg::LinAlgError;
use thiserror::Error;

/// Errors produced by the geometry algorithms.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq)]
pub enum GeometryError {
    #[error(transparent)]
    Numeric(#[from] DecimalError),
    #[error(transparent)]
    LinAlg(#[from] LinAlgError),
}
