//! Presenter capacity policy.
//!
//! The presenter retains at most `max_chars` characters. Appending discards
//! the oldest content first; the newly appended text is only ever cut from
//! its head, and only when it alone exceeds the limit.

use crate::ports::LimitProvider;
use tracing::warn;

/// Default maximum number of characters retained by a presenter.
pub const DEFAULT_MAX_CHARS: usize = 100_000;

/// Append `incoming` to `retained`, then drop leading characters until at
/// most `max_chars` remain.
///
/// The result is always the last `min(L + K, max_chars)` characters of
/// `retained ++ incoming`. A limit of zero leaves `retained` empty.
pub fn apply_limit(retained: &mut String, incoming: &str, max_chars: usize) {
    retained.push_str(incoming);

    let total = retained.chars().count();
    if total <= max_chars {
        return;
    }

    let excess = total - max_chars;
    let cut = retained
        .char_indices()
        .nth(excess)
        .map_or(retained.len(), |(idx, _)| idx);
    retained.replace_range(..cut, "");
}

/// Resolve the effective limit from `provider`.
///
/// Called on every delivery; the value is never cached. An unset limit
/// yields [`DEFAULT_MAX_CHARS`]. A zero limit or a failing provider also
/// yields the default and is logged at WARN level.
pub fn resolve_max_chars(provider: &dyn LimitProvider) -> usize {
    match provider.max_chars() {
        Ok(Some(0)) => {
            warn!(
                fallback = DEFAULT_MAX_CHARS,
                "Invalid console capacity 0, using default {DEFAULT_MAX_CHARS}"
            );
            DEFAULT_MAX_CHARS
        }
        Ok(Some(max_chars)) => max_chars,
        Ok(None) => DEFAULT_MAX_CHARS,
        Err(e) => {
            warn!(
                error = %e,
                fallback = DEFAULT_MAX_CHARS,
                "Cannot determine console capacity, using default {DEFAULT_MAX_CHARS}"
            );
            DEFAULT_MAX_CHARS
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{LimitError, limit_fn};

    fn bounded(existing: &str, incoming: &str, max_chars: usize) -> String {
        let mut retained = existing.to_string();
        apply_limit(&mut retained, incoming, max_chars);
        retained
    }

    #[test]
    fn test_head_truncation_scenario() {
        assert_eq!(bounded("ABCDEFGHIJ", "XYZ", 10), "DEFGHIJXYZ");
    }

    #[test]
    fn test_within_limit_untouched() {
        assert_eq!(bounded("abc", "def", 10), "abcdef");
        assert_eq!(bounded("abc", "def", 6), "abcdef");
    }

    #[test]
    fn test_incoming_longer_than_limit_keeps_tail() {
        assert_eq!(bounded("old", "0123456789", 4), "6789");
        assert_eq!(bounded("", "0123456789", 4), "6789");
    }

    #[test]
    fn test_zero_limit_empties() {
        assert_eq!(bounded("abc", "def", 0), "");
    }

    #[test]
    fn test_counts_characters_not_bytes() {
        assert_eq!(bounded("ééé", "日本", 3), "é日本");
    }

    #[test]
    fn test_length_is_min_of_total_and_limit() {
        let existing = "the quick brown fox";
        let incoming = " jumps over";
        let joined = format!("{existing}{incoming}");
        let total = joined.chars().count();

        for limit in 0..=total + 3 {
            let result = bounded(existing, incoming, limit);
            let expected_len = total.min(limit);
            assert_eq!(result.chars().count(), expected_len);
            assert!(joined.ends_with(&result));
        }
    }

    #[test]
    fn test_resolve_fixed_limit() {
        assert_eq!(resolve_max_chars(&42usize), 42);
    }

    #[test]
    fn test_resolve_unset_uses_default() {
        assert_eq!(resolve_max_chars(&None::<usize>), DEFAULT_MAX_CHARS);
    }

    #[test]
    fn test_resolve_zero_uses_default() {
        assert_eq!(resolve_max_chars(&0usize), DEFAULT_MAX_CHARS);
    }

    #[test]
    fn test_resolve_failure_uses_default() {
        let provider = limit_fn(|| Err(LimitError::Unavailable("config locked".into())));
        assert_eq!(resolve_max_chars(&provider), DEFAULT_MAX_CHARS);
    }
}
