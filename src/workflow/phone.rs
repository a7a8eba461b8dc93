/// National prefix every accepted number must carry.
const PREFIX: &str = "+998";
/// Digits following the prefix.
const NATIONAL_DIGITS: usize = 9;

/// Normalize a submitted phone number to `+998` + 9 digits.
///
/// Separators (spaces, dashes, parentheses) are stripped and a bare `998…`
/// gets its leading `+` restored, since Telegram contact payloads arrive
/// without one. Anything that does not land exactly on the expected pattern
/// is rejected.
pub fn normalize(raw: &str) -> Option<String> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();

    let candidate = if cleaned.starts_with("998") {
        format!("+{cleaned}")
    } else {
        cleaned
    };

    let national = candidate.strip_prefix(PREFIX)?;
    if national.len() == NATIONAL_DIGITS && national.chars().all(|c| c.is_ascii_digit()) {
        Some(candidate)
    } else {
        None
    }
}
