#![deny(bare_trait_objects)]
#![deny(unconditional_recursion)]

//! SVG path data: model, parser, canonicalizer and serializer.
//!
//! This crate is reexported in [svgbake](https://docs.rs/svgbake/).
//!
//! A [`Path`] is an ordered list of [`PathCommand`]s, each a command kind
//! ([`Verb`]) with its relative flag and a fixed-arity list of decimal
//! arguments. The [`parser`] turns SVG `d` attribute strings into paths
//! without ever going through binary floats; [`absolute`] canonicalizes
//! paths down to absolute `{M, L, C, Q, A, Z}` (or `{M, L, C, A, Z}` in
//! cubic-only mode); [`serialize`] renders them back out at a requested
//! output precision.

pub use svgbake_decimal as decimal;
pub use svgbake_linalg as linalg;

pub mod absolute;
pub mod parser;
pub mod serialize;

use arrayvec::ArrayVec;
use svgbake_decimal::Decimal;
use thiserror::Error;

/// Errors produced while parsing path data.
#[non_exhaustive]
#[derive(Error, Clone, Debug, PartialEq)]
pub enum PathError {
    #[error("Offset {offset}: unexpected character {found:?} in path data.")]
    UnexpectedToken { found: char, offset: usize },
    #[error("Offset {offset}: malformed number {src:?}.")]
    InvalidNumber { src: String, offset: usize },
    #[error("Offset {offset}: expected arc flag (0/1), got {found:?}.")]
    InvalidFlag { found: char, offset: usize },
}

/// The ten SVG path command kinds.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Verb {
    MoveTo,
    LineTo,
    HorizontalTo,
    VerticalTo,
    CurveTo,
    SmoothCurveTo,
    QuadraticTo,
    SmoothQuadraticTo,
    ArcTo,
    ClosePath,
}

impl Verb {
    /// Number of arguments the command consumes per group.
    pub fn arity(self) -> usize {
        match self {
            Verb::MoveTo | Verb::LineTo | Verb::SmoothQuadraticTo => 2,
            Verb::HorizontalTo | Verb::VerticalTo => 1,
            Verb::CurveTo => 6,
            Verb::SmoothCurveTo | Verb::QuadraticTo => 4,
            Verb::ArcTo => 7,
            Verb::ClosePath => 0,
        }
    }

    /// Decode a command letter; the second element is the relative flag.
    pub fn from_letter(c: char) -> Option<(Verb, bool)> {
        let verb = match c.to_ascii_uppercase() {
            'M' => Verb::MoveTo,
            'L' => Verb::LineTo,
            'H' => Verb::HorizontalTo,
            'V' => Verb::VerticalTo,
            'C' => Verb::CurveTo,
            'S' => Verb::SmoothCurveTo,
            'Q' => Verb::QuadraticTo,
            'T' => Verb::SmoothQuadraticTo,
            'A' => Verb::ArcTo,
            'Z' => Verb::ClosePath,
            _ => return None,
        };
        Some((verb, c.is_ascii_lowercase()))
    }

    pub fn letter(self, relative: bool) -> char {
        let upper = match self {
            Verb::MoveTo => 'M',
            Verb::LineTo => 'L',
            Verb::HorizontalTo => 'H',
            Verb::VerticalTo => 'V',
            Verb::CurveTo => 'C',
            Verb::SmoothCurveTo => 'S',
            Verb::QuadraticTo => 'Q',
            Verb::SmoothQuadraticTo => 'T',
            Verb::ArcTo => 'A',
            Verb::ClosePath => 'Z',
        };
        if relative {
            upper.to_ascii_lowercase()
        } else {
            upper
        }
    }
}

/// Maximum command arity (`A` takes 7 arguments).
pub const MAX_ARITY: usize = 7;

/// One path command with its arguments.
#[derive(Clone, Debug, PartialEq)]
pub struct PathCommand {
    pub verb: Verb,
    pub relative: bool,
    pub args: ArrayVec<Decimal, MAX_ARITY>,
}

impl PathCommand {
    pub fn new(verb: Verb, relative: bool, args: Vec<Decimal>) -> PathCommand {
        debug_assert_eq!(args.len(), verb.arity());
        PathCommand {
            verb,
            relative,
            args: args.into_iter().collect(),
        }
    }

    /// The command letter as serialized.
    pub fn letter(&self) -> char {
        self.verb.letter(self.relative)
    }
}

/// An ordered sequence of path commands.
#[derive(Clone, Debug, PartialEq, Default)]
pub struct Path {
    commands: Vec<PathCommand>,
}

impl Path {
    pub fn new() -> Path {
        Path::default()
    }

    pub fn from_commands(commands: Vec<PathCommand>) -> Path {
        Path { commands }
    }

    pub fn commands(&self) -> &[PathCommand] {
        &self.commands
    }

    pub fn into_commands(self) -> Vec<PathCommand> {
        self.commands
    }

    pub fn push(&mut self, command: PathCommand) {
        self.commands.push(command);
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn iter(&self) -> core::slice::Iter<'_, PathCommand> {
        self.commands.iter()
    }
}

impl core::str::FromStr for Path {
    type Err = PathError;
    fn from_str(s: &str) -> Result<Path, PathError> {
        parser::parse_path(s)
    }
}
