//! Small helpers shared by the relaybot crates.

/// Truncate a string to at most `max_chars` characters, appending "..." if truncated.
///
/// Cuts on character boundaries, so multi-byte text is safe.
pub fn truncate_with_ellipsis(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => {
            let truncated = &s[..idx];
            format!("{}...", truncated.trim_end())
        }
        None => s.to_string(),
    }
}

/// Parse a duration string like "5m", "1h", "30s" into seconds.
///
/// A bare number is taken as seconds.
pub fn parse_duration_secs(s: &str) -> Result<u64, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("Empty duration string".into());
    }

    if let Ok(secs) = s.parse::<u64>() {
        return Ok(secs);
    }

    let Some((unit_idx, _)) = s.char_indices().last() else {
        return Err("Empty duration string".into());
    };
    let (num_str, unit) = s.split_at(unit_idx);
    let num: u64 = num_str
        .parse()
        .map_err(|_| format!("Invalid number: {num_str}"))?;

    match unit {
        "s" => Ok(num),
        "m" => Ok(num * 60),
        "h" => Ok(num * 3600),
        "d" => Ok(num * 86400),
        _ => Err(format!("Unknown unit: {unit}")),
    }
}

/// Normalize a phone number to E.164 (`+` followed by digits).
///
/// Spaces, dashes and parentheses are dropped. Returns `None` when no digits remain.
pub fn normalize_phone(raw: &str) -> Option<String> {
    let digits: String = raw.chars().filter(char::is_ascii_digit).collect();
    if digits.is_empty() {
        None
    } else {
        Some(format!("+{digits}"))
    }
}
