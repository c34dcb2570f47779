//! Shared validation helpers used by the section validators.

use regex::Regex;

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `value` does not match `pattern`.
pub(crate) fn validate_pattern(
    errors: &mut Vec<String>,
    name: &str,
    value: &str,
    pattern: &Regex,
    expected: &str,
) {
    if !pattern.is_match(value) {
        errors.push(format!("{name} = {value:?} is not {expected}"));
    }
}
