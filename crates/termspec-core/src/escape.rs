//! Three-phase backslash-escape mechanism (spec.md section 4.4).
//!
//! Authors write `\[[...]]` to get a literal `[[...]]` in the output, bypassing
//! tag interpretation entirely. This is implemented as a reversible
//! placeholder substitution so the rest of the pipeline never sees an escaped
//! `[[` as a real tag opener.

/// Placeholder that stands in for an escaped `[[` while the Markdown engine runs.
/// Contains no `[` so it can never itself be mistaken for a tag opener.
const PLACEHOLDER: &str = "\u{e000}TERMSPEC_ESCAPED_BRACKET\u{e000}";

/// Phase 1: replaces every `\[[` with [`PLACEHOLDER`], and every `\\[[` with a
/// literal backslash followed by [`PLACEHOLDER`] (so a doubled backslash still
/// escapes the escape).
#[must_use]
pub fn pre_process(input: &str) -> String {
    input.replace("\\\\[[", &format!("\\{PLACEHOLDER}")).replace("\\[[", PLACEHOLDER)
}

/// Phase 3: restores every remaining [`PLACEHOLDER`] to a literal `[[`.
#[must_use]
pub fn post_process(input: &str) -> String {
    input.replace(PLACEHOLDER, "[[")
}
