//! Commit history message aggregation

/// Longest history message handed to the backend, in characters.
pub const MAX_HISTORY_LENGTH: usize = 2000;

/// Appended when a message had to be shortened.
pub const TRUNCATION_MARKER: &str = "...";

/// Join the configured comment and the engine's diagnostic messages into
/// one history message of at most `MAX_HISTORY_LENGTH` characters.
pub fn aggregate_history(comment: Option<&str>, messages: &[String]) -> String {
    let parts: Vec<&str> = comment
        .into_iter()
        .chain(messages.iter().map(String::as_str))
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .collect();
    truncate_history(&parts.join("\n"), MAX_HISTORY_LENGTH)
}

/// Shorten `message` to at most `max_length` characters, ending in the
/// truncation marker when anything was cut.
///
/// A `max_length` below the marker length is raised to it, so a shortened
/// message always carries the whole marker.
pub fn truncate_history(message: &str, max_length: usize) -> String {
    let marker_length = TRUNCATION_MARKER.chars().count();
    let max_length = max_length.max(marker_length);
    if message.chars().count() <= max_length {
        return message.to_string();
    }
    let keep = max_length.saturating_sub(marker_length);
    let mut truncated: String = message.chars().take(keep).collect();
    truncated.push_str(TRUNCATION_MARKER);
    truncated
}
