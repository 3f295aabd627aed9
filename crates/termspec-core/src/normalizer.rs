//! Terminology Markdown normalizer (spec.md section 4.3).
//!
//! Enforces canonical whitespace and definition-list continuation-marker
//! conventions before parsing. Idempotent: `normalize(normalize(f)) == normalize(f)`.

use regex::Regex;
use std::sync::OnceLock;

fn tag_opener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[\[(def|tref):").unwrap())
}

fn blank_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\n{3,}").unwrap())
}

/// Normalizes the content of one terminology Markdown file.
#[must_use]
pub fn normalize(content: &str) -> String {
    let with_blank_after_tags = ensure_blank_line_after_tag_openers(content);
    let with_continuation_markers = prefix_continuation_markers(&with_blank_after_tags);
    let collapsed = collapse_blank_runs(&with_continuation_markers);
    ensure_single_trailing_newline(&collapsed)
}

/// Lines beginning with `[[def:` or `[[tref:` are immediately followed by
/// exactly one blank line.
fn ensure_blank_line_after_tag_openers(content: &str) -> String {
    let lines: Vec<&str> = content.lines().collect();
    let mut out = Vec::with_capacity(lines.len() + 4);

    let mut i = 0;
    while i < lines.len() {
        let line = lines[i];
        out.push(line.to_string());

        if tag_opener_re().is_match(line) {
            let next_is_blank = lines.get(i + 1).is_some_and(|l| l.trim().is_empty());
            if !next_is_blank {
                out.push(String::new());
            }
        }
        i += 1;
    }

    out.join("\n")
}

/// Every non-empty line that is not a tag opener, not already `~ `-prefixed,
/// and not an HTML comment is prefixed with `~ ` (definition-list continuation
/// marker).
fn prefix_continuation_markers(content: &str) -> String {
    content
        .lines()
        .map(|line| {
            let trimmed = line.trim_start();
            if trimmed.is_empty()
                || trimmed.starts_with("~ ")
                || trimmed.starts_with("<!--")
                || tag_opener_re().is_match(line)
            {
                line.to_string()
            } else {
                format!("~ {line}")
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Runs of blank lines collapse to at most one blank line.
fn collapse_blank_runs(content: &str) -> String {
    blank_run_re().replace_all(content, "\n\n").into_owned()
}

/// The file ends with exactly one trailing newline.
fn ensure_single_trailing_newline(content: &str) -> String {
    format!("{}\n", content.trim_end_matches('\n'))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn is_idempotent() {
        let input = "[[def: alpha]]\ndescription\n\n\n\nmore text";
        let once = normalize(input);
        let twice = normalize(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn adds_blank_line_after_def_opener() {
        let input = "[[def: alpha]]\ndescription";
        let normalized = normalize(input);
        let lines: Vec<&str> = normalized.lines().collect();
        assert_eq!(lines[0], "[[def: alpha]]");
        assert_eq!(lines[1], "");
    }

    #[test]
    fn prefixes_continuation_marker_on_plain_lines() {
        let input = "[[def: alpha]]\n\ndescription here";
        let normalized = normalize(input);
        assert!(normalized.contains("~ description here"));
    }

    #[test]
    fn leaves_already_prefixed_and_html_comment_lines_alone() {
        let input = "~ already prefixed\n<!-- a comment -->";
        let normalized = normalize(input);
        assert!(normalized.contains("~ already prefixed"));
        assert!(normalized.contains("<!-- a comment -->"));
        assert!(!normalized.contains("~ <!--"));
    }

    #[test]
    fn collapses_blank_line_runs() {
        let input = "a\n\n\n\n\nb";
        let normalized = normalize(input);
        assert!(!normalized.contains("\n\n\n"));
    }

    #[test]
    fn ends_with_exactly_one_newline() {
        let input = "a\n\n\n";
        let normalized = normalize(input);
        assert!(normalized.ends_with("a\n"));
        assert!(!normalized.ends_with("a\n\n"));
    }
}
