//! Query normalization for catalog searches.
//!
//! Raw track and artist names carry annotations like "(Remastered)" or
//! "[Live]" that hurt search recall, and apostrophes break the catalog's
//! query syntax. Normalization strips both.

/// Map a raw name to its query-safe form: drop text enclosed in balanced
/// parentheses or square brackets (brackets included), strip apostrophes,
/// trim. Unmatched brackets are kept literal. Idempotent.
pub fn normalize(raw: &str) -> String {
    let stripped = strip_balanced(&strip_balanced(raw, '(', ')'), '[', ']');
    stripped.replace('\'', "").trim().to_string()
}

/// Remove balanced `open`..`close` groups in one left-to-right scan.
///
/// Openers are emitted optimistically and their output positions pushed on a
/// stack; a matching closer truncates the output back to the opener,
/// discarding the group. A closer with no open counterpart is literal text.
/// Openers that never close remain in the output untouched.
fn strip_balanced(text: &str, open: char, close: char) -> String {
    let mut out: Vec<char> = Vec::with_capacity(text.len());
    let mut open_positions: Vec<usize> = Vec::new();

    for ch in text.chars() {
        if ch == open {
            open_positions.push(out.len());
            out.push(ch);
        } else if ch == close {
            match open_positions.pop() {
                Some(start) => out.truncate(start),
                None => out.push(ch),
            }
        } else {
            out.push(ch);
        }
    }

    out.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_balanced_annotations() {
        assert_eq!(normalize("Song (Remastered) [2011]"), "Song");
        assert_eq!(normalize("Intro (Live) / Outro"), "Intro  / Outro");
    }

    #[test]
    fn strips_nested_brackets() {
        assert_eq!(normalize("Track ((take 2))"), "Track");
        assert_eq!(normalize("Track [a [b] c]"), "Track");
    }

    #[test]
    fn keeps_unmatched_closers_literal() {
        assert_eq!(normalize("weird) title"), "weird) title");
        assert_eq!(normalize("also] here"), "also] here");
    }

    #[test]
    fn keeps_unterminated_openers_literal() {
        assert_eq!(
            normalize("(unterminated bracket text"),
            "(unterminated bracket text"
        );
        assert_eq!(normalize("half [open"), "half [open");
    }

    #[test]
    fn strips_apostrophes() {
        assert_eq!(normalize("Don't Stop Me Now"), "Dont Stop Me Now");
        assert_eq!(normalize("Livin' la Vida Loca"), "Livin la Vida Loca");
    }

    #[test]
    fn is_idempotent() {
        let cases = [
            "Song (Remastered) [2011]",
            "(unterminated bracket text",
            "weird) title",
            "Don't Stop (Believin') [Live]",
            "plain title",
            "",
        ];
        for case in cases {
            let once = normalize(case);
            assert_eq!(normalize(&once), once, "not idempotent for {case:?}");
        }
    }

    #[test]
    fn empty_and_bracket_only_inputs() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize("(everything bracketed)"), "");
        assert_eq!(normalize("[]()"), "");
    }
}
