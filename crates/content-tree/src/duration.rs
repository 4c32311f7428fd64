//! Lenient parsing of free-text durations.

/// Minutes from a free-text timeframe such as `"30 mins"`.
///
/// Only the first run of ASCII digits counts: `"1 hour 30 mins"` is 1 and a
/// string without digits is 0. Never fails; oversized numbers saturate.
pub fn parse_minutes(timeframe: &str) -> u32 {
    timeframe
        .chars()
        .skip_while(|c| !c.is_ascii_digit())
        .take_while(|c| c.is_ascii_digit())
        .fold(0u32, |acc, c| {
            let digit = c.to_digit(10).unwrap_or(0);
            acc.saturating_mul(10).saturating_add(digit)
        })
}
