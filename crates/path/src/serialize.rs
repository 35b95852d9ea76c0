//! Rendering paths back into `d` attribute strings.

use svgbake_decimal::Decimal;

use crate::Path;

/// Format a number at `precision` decimal places, with trailing zeros and
/// a trailing `.` stripped.
pub fn format_number(value: &Decimal, precision: i64) -> String {
    let fixed = value.to_fixed(precision);
    if !fixed.contains('.') {
        return fixed;
    }
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    trimmed.to_string()
}

/// Serialize a path as space-separated tokens.
///
/// Commands are single ASCII letters and `Z` is emitted bare.
pub fn path_to_string(path: &Path, precision: i64) -> String {
    let mut out = String::new();
    for cmd in path.iter() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push(cmd.letter());
        for arg in &cmd.args {
            out.push(' ');
            out.push_str(&format_number(arg, precision));
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::absolute::path_to_absolute;
    use crate::parser::parse_path;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    #[test]
    fn trims_trailing_zeros() {
        assert_eq!(format_number(&dec("1.500000"), 6), "1.5");
        assert_eq!(format_number(&dec("10"), 6), "10");
        assert_eq!(format_number(&dec("0.1000001"), 6), "0.1");
        assert_eq!(format_number(&dec("-3.140000"), 6), "-3.14");
    }

    #[test]
    fn rounds_at_precision() {
        assert_eq!(format_number(&dec("1.2345678"), 3), "1.235");
        assert_eq!(format_number(&dec("1.99999999"), 6), "2");
        assert_eq!(format_number(&dec("-0.0000004"), 6), "0");
    }

    #[test]
    fn serializes_commands() {
        let path = parse_path("M 0 0 L 10 0 A 5 5 0 0 1 20 10 Z").unwrap();
        assert_eq!(
            path_to_string(&path, 6),
            "M 0 0 L 10 0 A 5 5 0 0 1 20 10 Z"
        );
    }

    #[test]
    fn keeps_relative_letters() {
        let path = parse_path("m 1 2 l 3 4 z").unwrap();
        assert_eq!(path_to_string(&path, 6), "m 1 2 l 3 4 z");
    }

    #[test]
    fn parse_serialize_parse_is_idempotent() {
        let src = "M 0.8 -2.9 L 10 20 C 1 2 3 4 5 6 Q 1 1 2 2 Z";
        let first = path_to_absolute(&parse_path(src).unwrap());
        let text = path_to_string(&first, 6);
        let second = path_to_absolute(&parse_path(&text).unwrap());
        assert_eq!(path_to_string(&second, 6), text);
    }
}
