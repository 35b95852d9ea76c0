//! Parsing of SVG `d` attribute strings.
//!
//! The tokenizer is a plain cursor over the input: a command letter
//! followed by argument groups, with commas and whitespace as separators
//! and a leading `-` acting as an implicit separator (`0.8-2.9` reads as
//! two numbers). Numbers are converted straight into [`Decimal`] from the
//! source slice, never through a binary float.

use svgbake_decimal::Decimal;

use crate::{Path, PathCommand, PathError, Verb};

/// Parse a `d` attribute into a [`Path`].
///
/// Implicit repetition is expanded: every argument group becomes its own
/// [`PathCommand`], with groups after an `M`/`m` becoming `L`/`l`. An
/// incomplete argument group is dropped silently, per SVG error handling.
pub fn parse_path(src: &str) -> Result<Path, PathError> {
    let mut cursor = Cursor::new(src);
    let mut commands = Vec::new();
    // The verb applied to letterless argument groups.
    let mut pending: Option<(Verb, bool)> = None;

    cursor.skip_separators();
    while let Some(c) = cursor.peek() {
        let (verb, relative) = if let Some((verb, relative)) = Verb::from_letter(c) {
            cursor.advance(c);
            (verb, relative)
        } else if is_number_start(c) {
            match pending {
                Some(p) => p,
                None => {
                    return Err(PathError::UnexpectedToken {
                        found: c,
                        offset: cursor.pos,
                    })
                }
            }
        } else {
            return Err(PathError::UnexpectedToken {
                found: c,
                offset: cursor.pos,
            });
        };

        if verb == Verb::ClosePath {
            commands.push(PathCommand::new(verb, relative, Vec::new()));
            // A group after a close restarts the sub-path.
            pending = Some((Verb::MoveTo, relative));
            cursor.skip_separators();
            continue;
        }

        let mut group_verb = verb;
        loop {
            cursor.skip_separators();
            match cursor.peek() {
                None => break,
                Some(c) if !is_number_start(c) => break,
                Some(_) => {}
            }
            match read_group(&mut cursor, group_verb)? {
                Some(args) => {
                    commands.push(PathCommand {
                        verb: group_verb,
                        relative,
                        args,
                    });
                    if group_verb == Verb::MoveTo {
                        group_verb = Verb::LineTo;
                    }
                }
                // Incomplete group: drop it and move on.
                None => break,
            }
        }
        pending = Some((group_verb, relative));
        cursor.skip_separators();
    }

    Ok(Path::from_commands(commands))
}

/// Parse a standalone SVG number, as found in attribute values like
/// `transform` or `viewBox`. The whole input must be one number.
pub fn parse_decimal(src: &str) -> Option<Decimal> {
    let s = src.trim();
    if s.is_empty() {
        return None;
    }
    let mut cursor = Cursor::new(s);
    match read_number(&mut cursor) {
        Ok(Some(value)) if cursor.pos == s.len() => Some(value),
        _ => None,
    }
}

struct Cursor<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(src: &'a str) -> Self {
        Cursor { src, pos: 0 }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn advance(&mut self, c: char) {
        self.pos += c.len_utf8();
    }

    fn skip_separators(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() || c == ',' {
                self.advance(c);
            } else {
                break;
            }
        }
    }
}

fn is_number_start(c: char) -> bool {
    c.is_ascii_digit() || c == '+' || c == '-' || c == '.'
}

// Read one argument group. `None` means the group was incomplete.
fn read_group(
    cursor: &mut Cursor<'_>,
    verb: Verb,
) -> Result<Option<arrayvec::ArrayVec<Decimal, { crate::MAX_ARITY }>>, PathError> {
    let mut args = arrayvec::ArrayVec::new();
    for i in 0..verb.arity() {
        cursor.skip_separators();
        let is_flag = verb == Verb::ArcTo && (i == 3 || i == 4);
        let value = if is_flag {
            match read_flag(cursor)? {
                Some(v) => v,
                None => return Ok(None),
            }
        } else {
            match read_number(cursor)? {
                Some(v) => v,
                None => return Ok(None),
            }
        };
        args.push(value);
    }
    Ok(Some(args))
}

// Arc flags are single characters and may be packed ("0110" is two flags
// followed by the number 10).
fn read_flag(cursor: &mut Cursor<'_>) -> Result<Option<Decimal>, PathError> {
    match cursor.peek() {
        None => Ok(None),
        Some('0') => {
            cursor.advance('0');
            Ok(Some(Decimal::zero()))
        }
        Some('1') => {
            cursor.advance('1');
            Ok(Some(Decimal::one()))
        }
        Some(c) if c.is_ascii_alphabetic() => Ok(None),
        Some(c) => Err(PathError::InvalidFlag {
            found: c,
            offset: cursor.pos,
        }),
    }
}

// `None` when the cursor does not sit on a number at all (end of input or
// a command letter).
fn read_number(cursor: &mut Cursor<'_>) -> Result<Option<Decimal>, PathError> {
    let start = cursor.pos;

    match cursor.peek() {
        None => return Ok(None),
        Some(c) if c.is_ascii_alphabetic() => return Ok(None),
        Some(c) if !is_number_start(c) => {
            return Err(PathError::UnexpectedToken {
                found: c,
                offset: cursor.pos,
            })
        }
        Some(_) => {}
    }

    if let Some(c @ ('+' | '-')) = cursor.peek() {
        cursor.advance(c);
    }
    let int_digits = consume_digits(cursor);
    let mut frac_digits = 0;
    if cursor.peek() == Some('.') {
        cursor.advance('.');
        frac_digits = consume_digits(cursor);
    }
    if int_digits == 0 && frac_digits == 0 {
        return Err(PathError::InvalidNumber {
            src: cursor.src[start..cursor.pos].to_string(),
            offset: start,
        });
    }
    if let Some(c @ ('e' | 'E')) = cursor.peek() {
        cursor.advance(c);
        if let Some(c @ ('+' | '-')) = cursor.peek() {
            cursor.advance(c);
        }
        if consume_digits(cursor) == 0 {
            return Err(PathError::InvalidNumber {
                src: cursor.src[start..cursor.pos].to_string(),
                offset: start,
            });
        }
    }

    to_decimal(&cursor.src[start..cursor.pos], start).map(Some)
}

fn consume_digits(cursor: &mut Cursor<'_>) -> usize {
    let mut count = 0;
    while let Some(c) = cursor.peek() {
        if c.is_ascii_digit() {
            cursor.advance(c);
            count += 1;
        } else {
            break;
        }
    }
    count
}

// Normalize forms the decimal library does not accept ("+1", "1.", ".5",
// "1.e-9") before the exact conversion.
fn to_decimal(slice: &str, offset: usize) -> Result<Decimal, PathError> {
    let (mantissa, exponent) = match slice.find(['e', 'E']) {
        Some(idx) => (&slice[..idx], Some(&slice[idx..])),
        None => (slice, None),
    };

    let mut normalized = String::with_capacity(slice.len() + 2);
    let digits = match mantissa.strip_prefix('+') {
        Some(rest) => rest,
        None => match mantissa.strip_prefix('-') {
            Some(rest) => {
                normalized.push('-');
                rest
            }
            None => mantissa,
        },
    };
    if digits.starts_with('.') {
        normalized.push('0');
    }
    normalized.push_str(digits.strip_suffix('.').unwrap_or(digits));
    if let Some(exp) = exponent {
        normalized.push_str(exp);
    }

    normalized.parse().map_err(|_| PathError::InvalidNumber {
        src: slice.to_string(),
        offset,
    })
}
