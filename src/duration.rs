use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use regex::Regex;

/// Fallback when a token can't be read: one minute.
pub const DEFAULT_SECONDS: u32 = 60;

fn token_regex() -> Result<&'static Regex> {
    static TOKEN_RE: OnceCell<Regex> = OnceCell::new();
    TOKEN_RE.get_or_try_init(|| {
        Regex::new(r"(?i)^\s*(\d+)\s*(s|secs?|seconds?|초|m|mins?|minutes?|분)\s*$")
            .context("failed to compile duration token regex")
    })
}

/// Converts a duration token such as `"30s"`, `"10m"`, `"30초"` or `"60분"`
/// into whole seconds. Anything unreadable (or zero) yields [`DEFAULT_SECONDS`].
pub fn parse_duration_seconds(token: &str) -> u32 {
    let Some(caps) = token_regex().ok().and_then(|re| re.captures(token)) else {
        return DEFAULT_SECONDS;
    };

    let amount: u32 = match caps[1].parse() {
        Ok(v) if v > 0 => v,
        _ => return DEFAULT_SECONDS,
    };

    let unit = caps[2].to_lowercase();
    let is_minutes = unit.starts_with('m') || unit == "분";
    if is_minutes {
        amount.saturating_mul(60)
    } else {
        amount
    }
}

/// Same token as fractional minutes. Always `parse_duration_seconds(token) / 60`.
pub fn parse_target_minutes(token: &str) -> f64 {
    f64::from(parse_duration_seconds(token)) / 60.0
}

/// Short human label for a minute count: `45s`, `5m`, `2m 30s`.
pub fn format_duration(minutes: f64) -> String {
    if minutes < 1.0 {
        return format!("{}s", (minutes * 60.0).round() as i64);
    }
    let mins = minutes.floor() as i64;
    let secs = ((minutes - minutes.floor()) * 60.0).round() as i64;
    match secs {
        0 => format!("{}m", mins),
        60 => format!("{}m", mins + 1),
        _ => format!("{}m {}s", mins, secs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_known_tokens() {
        let cases = [("30s", 30), ("1m", 60), ("2m", 120), ("10m", 600), ("60m", 3600)];
        for (token, want) in cases {
            assert_eq!(parse_duration_seconds(token), want, "token {token}");
        }
    }

    #[test]
    fn test_localized_words() {
        assert_eq!(parse_duration_seconds("30초"), 30);
        assert_eq!(parse_duration_seconds("20분"), 1200);
        assert_eq!(parse_duration_seconds("45 seconds"), 45);
        assert_eq!(parse_duration_seconds("3 Minutes"), 180);
        assert_eq!(parse_duration_seconds(" 5min "), 300);
    }

    #[test]
    fn test_unknown_tokens_default_to_one_minute() {
        for token in ["", "abc", "10h", "1.5m", "m", "0s", "-5m"] {
            assert_eq!(parse_duration_seconds(token), DEFAULT_SECONDS, "token {token:?}");
        }
    }

    #[test]
    fn test_minutes_agree_with_seconds() {
        for token in ["30s", "1m", "90s", "60m", "garbage", "45초"] {
            let secs = parse_duration_seconds(token);
            let mins = parse_target_minutes(token);
            assert!((mins * 60.0 - f64::from(secs)).abs() < 1e-9, "token {token}");
        }
        assert_eq!(parse_target_minutes("30s"), 0.5);
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0.5), "30s");
        assert_eq!(format_duration(5.0), "5m");
        assert_eq!(format_duration(2.5), "2m 30s");
        assert_eq!(format_duration(2.999), "3m");
    }
}
