//! Text hygiene and the friend-request threshold, shared by every surface.

/// Board rules: thread titles up to 64 chars, posts up to 150.
pub const THREAD_TITLE_MAX: usize = 64;
pub const BOARD_MESSAGE_MAX: usize = 150;
/// Direct messages are only UI-limited; this is the server-side ceiling.
pub const CHAT_MESSAGE_MAX: usize = 500;

/// Messages exchanged (both directions, no turn-taking required) before a
/// friend request unlocks.
pub const FRIEND_REQUEST_THRESHOLD: usize = 6;

/// Strip newlines, collapse whitespace runs, trim, truncate to `max_len`
/// characters. Idempotent: sanitizing sanitized text is a no-op.
pub fn sanitize(text: &str, max_len: usize) -> String {
    let mut out = String::with_capacity(text.len().min(max_len * 4));
    for word in text.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    if out.chars().count() > max_len {
        // truncation can land on a word boundary and leave a trailing space
        out = out.chars().take(max_len).collect::<String>().trim_end().to_string();
    }
    out
}

/// Pure function of the conversation length; recomputed on every check so a
/// growing log is always reflected. Count never decreases, so once true the
/// gate stays open for that pair.
pub fn can_request_friend(message_count: usize) -> bool {
    message_count >= FRIEND_REQUEST_THRESHOLD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_collapses_and_trims() {
        assert_eq!(sanitize("  hello   world  ", 150), "hello world");
        assert_eq!(sanitize("a\r\nb\nc", 150), "a b c");
        assert_eq!(sanitize("\t tabs\tand\nnewlines ", 150), "tabs and newlines");
    }

    #[test]
    fn sanitize_is_idempotent() {
        let inputs = ["  x  y ", "line\nbreak", "猫   が\r\n好き", ""];
        for raw in inputs {
            let once = sanitize(raw, 150);
            assert_eq!(sanitize(&once, 150), once);
        }
        // truncation landing on a word boundary must not leave a trailing
        // space behind
        assert_eq!(sanitize("aa bb", 3), "aa");
        assert_eq!(sanitize(&sanitize("aa bb", 3), 3), sanitize("aa bb", 3));
        let wordy = "word ".repeat(40);
        let once = sanitize(&wordy, BOARD_MESSAGE_MAX);
        assert_eq!(sanitize(&once, BOARD_MESSAGE_MAX), once);
    }

    #[test]
    fn sanitize_bounds_length_in_chars() {
        let long = "あ".repeat(200);
        let out = sanitize(&long, BOARD_MESSAGE_MAX);
        assert_eq!(out.chars().count(), BOARD_MESSAGE_MAX);
        // truncation happens on a char boundary, never mid-codepoint
        assert!(out.chars().all(|c| c == 'あ'));
    }

    #[test]
    fn sanitize_rejects_nothing_but_yields_empty() {
        assert_eq!(sanitize("   \r\n\t  ", 150), "");
    }

    #[test]
    fn threshold_flips_at_six() {
        assert!(!can_request_friend(0));
        assert!(!can_request_friend(5));
        assert!(can_request_friend(6));
        assert!(can_request_friend(7));
    }
}
