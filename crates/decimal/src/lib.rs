#![deny(bare_trait_objects)]
#![deny(unconditional_recursion)]
#![allow(clippy::excessive_precision)]

//! Arbitrary-precision decimal arithmetic for the svgbake crates.
//!
//! This crate is reexported in [svgbake](https://docs.rs/svgbake/).
//!
//! # Overview
//!
//! The other svgbake crates never touch IEEE-754 floats for geometry.
//! Everything runs on [`Decimal`], a thin wrapper around
//! [`bigdecimal::BigDecimal`], together with an explicit [`Context`]
//! carrying the working precision.
//!
//! Addition, subtraction and multiplication of decimals are exact and
//! available as plain operators. Everything that has to round (division,
//! square roots, the trigonometric functions) lives on [`Context`], which
//! rounds half-to-even at the configured number of significant digits.
//!
//! ```
//! use svgbake_decimal::{Context, Decimal};
//!
//! let cx = Context::default();
//! let three: Decimal = "3".parse().unwrap();
//! let seven: Decimal = "7".parse().unwrap();
//! let q = cx.div(&three, &seven).unwrap();
//! assert_eq!(cx.round(&(&q * &seven)), cx.round(&three));
//! ```

// Reexport the wrapped library.
pub use bigdecimal;

mod context;
mod decimal;

pub use crate::context::Context;
pub use crate::decimal::Decimal;

use thiserror::Error;

/// Errors produced by the decimal kernel.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum DecimalError {
    #[error("Division by zero.")]
    DivisionByZero,
    #[error("Square root of the negative value {0}.")]
    NegativeRoot(String),
    #[error("Not a decimal number: {0:?}.")]
    InvalidNumber(String),
}
