use chrono::{DateTime, Utc};

use crate::constants::INVALID_FILENAME_CHARS;
use crate::utils::split_extension;

/// Turn a model reply into a file name.
///
/// Whitespace runs become hyphens, anything outside `[A-Za-z0-9._-]` is
/// dropped, the result is lowercased, cut so the extension still fits in
/// `max_len`, and the extension is re-appended when missing. `extension`
/// includes its dot.
pub fn sanitize_suggestion(raw: &str, extension: &str, max_len: usize) -> String {
    let hyphenated = raw.split_whitespace().collect::<Vec<_>>().join("-");
    let mut clean: String = hyphenated
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect::<String>()
        .to_ascii_lowercase();

    let budget = max_len.saturating_sub(extension.len());
    clean.truncate(budget);

    let extension = extension.to_ascii_lowercase();
    if !extension.is_empty() && !clean.ends_with(&extension) {
        clean.push_str(&extension);
    }
    clean
}

/// A candidate is worth renaming to only if it is longer than two
/// characters, has a stem with at least one letter or digit, and differs
/// from the current name beyond case. A leading dot would hide the file.
pub fn is_improvement(candidate: &str, current: &str) -> bool {
    let (stem, _) = split_extension(candidate);
    candidate.len() > 2
        && !candidate.starts_with('.')
        && stem.chars().any(|c| c.is_ascii_alphanumeric())
        && !candidate.eq_ignore_ascii_case(current)
}

/// Drop characters the filesystem refuses, keeping the extension on
pub fn finalize_name(name: &str, extension: &str) -> String {
    let mut clean: String = name
        .trim()
        .chars()
        .filter(|c| !INVALID_FILENAME_CHARS.contains(c))
        .collect();
    if !extension.is_empty() && !clean.to_ascii_lowercase().ends_with(&extension.to_ascii_lowercase()) {
        clean.push_str(extension);
    }
    clean
}

/// `base-N.ext` for the N-th collision retry
pub fn collision_candidate(name: &str, attempt: u32) -> String {
    let (base, extension) = split_extension(name);
    format!("{}-{}{}", base, attempt, extension)
}

/// Deterministic name used when the inference API cannot be reached.
///
/// Non-word characters of the original stem become hyphens; a degenerate
/// result is replaced by a timestamp.
pub fn fallback_name(original: &str, extension: &str, now: DateTime<Utc>, max_len: usize) -> String {
    let (stem, _) = split_extension(original);

    let mut words = String::with_capacity(stem.len());
    for c in stem.chars() {
        if c.is_alphanumeric() || c == '_' {
            words.extend(c.to_lowercase());
        } else if !words.ends_with('-') {
            words.push('-');
        }
    }
    let words = words.trim_matches('-');

    let base = if words.chars().filter(|c| c.is_alphanumeric()).count() <= 2 {
        format!("download-{}", now.format("%Y%m%d-%H%M%S"))
    } else {
        words.to_string()
    };

    sanitize_suggestion(&base, extension, max_len)
}
