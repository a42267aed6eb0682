//! Lenient numeric parsing shared by threshold values and LTSV fields.

/// Parse an integer (decimal, `0x`, `0o` or `0b` prefixed) or a float.
///
/// Surrounding spaces, tabs and newlines are ignored.
pub fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim_matches(|c| c == ' ' || c == '\t' || c == '\n');
    if text.is_empty() {
        return None;
    }

    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text.strip_prefix('+').unwrap_or(text)),
    };

    let radix_value = [("0x", 16), ("0X", 16), ("0o", 8), ("0O", 8), ("0b", 2), ("0B", 2)]
        .iter()
        .find_map(|(prefix, radix)| {
            digits
                .strip_prefix(*prefix)
                .map(|rest| i64::from_str_radix(rest, *radix).ok())
        });

    if let Some(parsed) = radix_value {
        return parsed.map(|v| if negative { -(v as f64) } else { v as f64 });
    }

    if let Ok(v) = text.parse::<i64>() {
        return Some(v as f64);
    }
    text.parse::<f64>().ok().filter(|v| !v.is_nan())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_number_forms() {
        assert_eq!(parse_number("42"), Some(42.0));
        assert_eq!(parse_number(" -7\n"), Some(-7.0));
        assert_eq!(parse_number("0x1f"), Some(31.0));
        assert_eq!(parse_number("0b101"), Some(5.0));
        assert_eq!(parse_number("3.25"), Some(3.25));
        assert_eq!(parse_number("1e3"), Some(1000.0));
        assert_eq!(parse_number("GET"), None);
        assert_eq!(parse_number(""), None);
        assert_eq!(parse_number("0xzz"), None);
    }
}
