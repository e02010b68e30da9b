use std::str::FromStr;
use std::time::Duration;

use serde::Deserialize;

/// When the publisher should create a commit in the output directory.
///
/// - `OnlyOnChange`: commit only when the staged tree differs from `HEAD`
///   (default).
/// - `Always`: always create a commit, even an empty one, so every deploy is
///   visible in the hosting branch history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "kebab-case")]
pub enum CommitPolicy {
    #[default]
    OnlyOnChange,
    Always,
}

impl FromStr for CommitPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "only-on-change" => Ok(CommitPolicy::OnlyOnChange),
            "always" => Ok(CommitPolicy::Always),
            other => Err(format!(
                "invalid commit policy: {other} (expected \"only-on-change\" or \"always\")"
            )),
        }
    }
}

/// Parse a short duration string such as `"250ms"`, `"3s"`, `"5m"` or `"1h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| "duration missing unit suffix".to_string())?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
