//! Human duration strings such as `30m`, `1h30m` or `2d`

use chrono::Duration;
use regex::Regex;
use std::sync::LazyLock;

static DURATION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\s*([dhms])").expect("duration pattern"));
static WHOLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:\s*\d+\s*[dhms])+\s*$").expect("duration pattern"));

/// How long a mute lasts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuteLength {
    Forever,
    For(Duration),
}

/// Parse a duration made of `<number><unit>` parts, units being `d`, `h`, `m` and `s`.
///
/// Returns `None` for anything else, including trailing garbage.
#[must_use]
pub fn parse_duration(input: &str) -> Option<Duration> {
    let input = input.to_ascii_lowercase();
    if !WHOLE.is_match(&input) {
        return None;
    }

    let mut total_seconds = 0i64;
    for cap in DURATION.captures_iter(&input) {
        let value: i64 = cap[1].parse().ok()?;
        let unit = match &cap[2] {
            "d" => 86_400,
            "h" => 3_600,
            "m" => 60,
            _ => 1,
        };
        total_seconds = total_seconds.checked_add(value.checked_mul(unit)?)?;
    }
    Duration::try_seconds(total_seconds)
}

/// Parse a mute length; no input, `0` and `forever` all mean an indefinite mute
#[must_use]
pub fn parse_mute_length(input: Option<&str>) -> Option<MuteLength> {
    match input.map(str::trim) {
        None | Some("" | "0" | "forever") => Some(MuteLength::Forever),
        Some(text) => match parse_duration(text)? {
            d if d.is_zero() => Some(MuteLength::Forever),
            d => Some(MuteLength::For(d)),
        },
    }
}
