//! Parsing of perception command output into a trusted reading.

use crate::core::types::PerceptionReading;

/// Interpret captured classifier stdout.
///
/// Lines are trimmed and blank lines dropped; only the last remaining line
/// counts, compared lower-cased against the exact tokens `yes` and `no`.
/// Anything else is indeterminate.
pub fn parse_reading(stdout: &str) -> PerceptionReading {
    let Some(last) = stdout
        .lines()
        .map(str::trim)
        .rev()
        .find(|line| !line.is_empty())
    else {
        return PerceptionReading::Indeterminate("no usable stdout".to_string());
    };

    match last.to_lowercase().as_str() {
        "yes" => PerceptionReading::Yes,
        "no" => PerceptionReading::No,
        other => PerceptionReading::Indeterminate(format!("unexpected token '{other}'")),
    }
}
