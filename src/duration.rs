#![forbid(unsafe_code)]

//! Parsing for the compact ISO 8601 durations the YouTube Data API reports in
//! `contentDetails.duration` (`PT1H2M3S`, `PT45S`, ...).

/// Anything shorter than this is treated as a Short and never stored.
pub const MIN_LONG_FORM_SECONDS: i64 = 60;

/// Converts `PT#H#M#S` into whole seconds.
///
/// Segments are optional but must appear in `H`, `M`, `S` order and at most
/// once. Returns `None` for a missing or empty value and for anything that does
/// not match the pattern, so callers can tell "unknown" apart from zero.
pub fn parse_duration(value: Option<&str>) -> Option<i64> {
    let rest = value?.trim().strip_prefix("PT")?;
    if rest.is_empty() {
        return None;
    }

    let mut total: i64 = 0;
    // Index into H/M/S of the last unit seen, enforcing order and uniqueness.
    let mut last_unit: Option<usize> = None;
    let mut digits = String::new();

    for ch in rest.chars() {
        if ch.is_ascii_digit() {
            digits.push(ch);
            continue;
        }
        let (unit_index, multiplier) = match ch {
            'H' => (0, 3600),
            'M' => (1, 60),
            'S' => (2, 1),
            _ => return None,
        };
        if digits.is_empty() || last_unit.is_some_and(|last| last >= unit_index) {
            return None;
        }
        let amount: i64 = digits.parse().ok()?;
        total = total.checked_add(amount.checked_mul(multiplier)?)?;
        last_unit = Some(unit_index);
        digits.clear();
    }

    // Trailing digits without a unit letter.
    if !digits.is_empty() {
        return None;
    }
    Some(total)
}

/// Short-form filter: only a known duration under a minute disqualifies an
/// item. Unparsable durations are kept.
pub fn is_short_form(duration: Option<i64>) -> bool {
    duration.is_some_and(|seconds| seconds < MIN_LONG_FORM_SECONDS)
}
