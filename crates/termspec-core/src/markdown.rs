//! Markdown Engine Facade (spec.md sections 4.9, 4.10).
//!
//! Wraps `pulldown-cmark` with the terminology tag inline rule and the
//! `[[spec:...]]`/`[[spec-<group>:...]]` cross-reference extension. Tag
//! bodies are located on [`Event::Text`] nodes only, which keeps code spans,
//! code blocks, link destinations, and other structural events untouched
//! without needing a hand-rolled context stack -- `pulldown-cmark` already
//! separates those into their own event kinds (grounded in the event-based
//! term-linking approach used by the pack's mdbook term-linker example).
//!
//! `pulldown-cmark` has no notion of the `~`-prefixed definition-list
//! continuation marker the Normalizer writes (spec.md section 4.3) -- that
//! convention mirrors a third-party Markdown-engine plugin this facade does
//! not carry. So a `[[def:...]]`/`[[tref:...]]` block and its following
//! `~`-prefixed continuation lines are extracted line-wise, ahead of handing
//! the remaining prose to `pulldown-cmark`, and rendered directly to a
//! `<dt>...</dt><dd>...</dd>` pair (the same shape `render::render_tref`
//! already produces). This keeps the rest of the document's prose on the
//! normal `pulldown-cmark` + inline-tag-expansion path below.
use std::sync::OnceLock;

use pulldown_cmark::{html, Event, Options, Parser, Tag, TagEnd};
use regex::Regex;

use crate::error::{Error, Result};
use crate::escape::{post_process, pre_process};
use crate::render::{self, RenderContext};
use crate::tag::{parse_tag_body_with_alias_overflow, TerminologyTag};

/// Matches one `[[...]]` lexeme within a text run.
fn tag_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[([^\]]*)\]\]").unwrap())
}

/// Matches a line that is *only* a `[[def:...]]`/`[[tref:...]]` lexeme (the
/// two tag kinds the Normalizer treats as definition-list entries, spec.md
/// section 4.3) -- anchored at both ends so a tag followed by trailing prose
/// on the same line is left as ordinary text instead of silently swallowing
/// that prose.
fn block_tag_opener_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*\[\[\s*(?:def|tref)\s*:[^\]]*\]\]\s*$").unwrap())
}

/// Matches the spec-reference extension: `[[spec: term]]` or
/// `[[spec-<group>: term]]` (spec.md section 4.9).
fn spec_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^spec(?:-([a-zA-Z0-9_-]+))?\s*:\s*(.+)$").unwrap())
}

fn cmark_options() -> Options {
    Options::ENABLE_TABLES
        | Options::ENABLE_FOOTNOTES
        | Options::ENABLE_STRIKETHROUGH
        | Options::ENABLE_TASKLISTS
        | Options::ENABLE_HEADING_ATTRIBUTES
}

/// One chunk of a source document: either ordinary prose (rendered through
/// `pulldown-cmark`) or a `def`/`tref` block with its continuation body
/// already unwrapped from its `~ ` markers (rendered directly to `<dt>/<dd>`).
enum Segment {
    Prose(String),
    Definition { tag_line: String, body: String },
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Splits `content` into alternating prose and definition segments, tracking
/// fenced code blocks so a `[[def:...]]`/`[[tref:...]]` lexeme written as a
/// literal inside a fence is never mistaken for a real block opener.
fn split_definition_segments(content: &str) -> Vec<Segment> {
    let lines: Vec<&str> = content.lines().collect();
    let mut segments = Vec::new();
    let mut prose_buf: Vec<&str> = Vec::new();
    let mut in_fence = false;
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i];

        if is_fence_line(line) {
            in_fence = !in_fence;
            prose_buf.push(line);
            i += 1;
            continue;
        }

        if !in_fence && block_tag_opener_re().is_match(line) {
            if !prose_buf.is_empty() {
                segments.push(Segment::Prose(prose_buf.join("\n")));
                prose_buf.clear();
            }

            let tag_line = line.to_string();
            i += 1;
            if lines.get(i).is_some_and(|l| l.trim().is_empty()) {
                i += 1;
            }

            let mut body_lines: Vec<String> = Vec::new();
            while i < lines.len() {
                let candidate = lines[i];
                if is_fence_line(candidate) || block_tag_opener_re().is_match(candidate) {
                    break;
                }
                if candidate.trim().is_empty() {
                    body_lines.push(String::new());
                    i += 1;
                    continue;
                }
                match candidate.trim_start().strip_prefix("~ ") {
                    Some(stripped) => {
                        body_lines.push(stripped.to_string());
                        i += 1;
                    }
                    None => break,
                }
            }

            segments.push(Segment::Definition {
                tag_line,
                body: body_lines.join("\n"),
            });
            continue;
        }

        prose_buf.push(line);
        i += 1;
    }

    if !prose_buf.is_empty() {
        segments.push(Segment::Prose(prose_buf.join("\n")));
    }

    segments
}

/// Renders one Markdown document (already normalized) to an HTML fragment,
/// resolving every terminology tag against `ctx` and updating `ctx` with any
/// `def`/`ref`/`iref` discoveries along the way.
///
/// # Errors
///
/// Returns [`Error::TagMalformed`] if a tag lexeme fails to parse; the
/// collector is expected to have already validated tags ahead of rendering,
/// so in practice this should not trigger for input that passed collection.
pub fn render_document(content: &str, ctx: &mut RenderContext<'_>, source_file: &str) -> Result<String> {
    let escaped = pre_process(content);

    let mut html_out = String::new();
    for segment in split_definition_segments(&escaped) {
        match segment {
            Segment::Prose(text) => html_out.push_str(&render_prose(&text, ctx, source_file)?),
            Segment::Definition { tag_line, body } => {
                html_out.push_str(&render_definition_block(&tag_line, &body, ctx, source_file)?);
            }
        }
    }

    Ok(post_process(&html_out))
}

/// Renders one `[[def:...]]`/`[[tref:...]]` block directly to its
/// `<dt>.../dt><dd>...</dd>` pair (spec.md section 4.10/4.11's classification
/// rule: `term-local` for `def`, `term-external` for `tref`). `tref`'s `<dd>`
/// content always comes from the fetched remote record (`render::render_tref`
/// already produces the whole pair), so any local continuation body an
/// author wrote under a `tref` is intentionally not rendered -- the
/// transclusion replaces it, matching spec.md section 4.10's contract that
/// `tref` mirrors the remote definition, not the local file.
fn render_definition_block(
    tag_line: &str,
    body: &str,
    ctx: &mut RenderContext<'_>,
    source_file: &str,
) -> Result<String> {
    let captures = tag_re()
        .captures(tag_line)
        .ok_or_else(|| Error::Render(format!("malformed definition-block opener in {source_file}")))?;
    let tag_body = captures.get(1).expect("group 1 always present").as_str();

    let (tag, _overflow) = parse_tag_body_with_alias_overflow(tag_body)
        .map_err(|e| Error::Render(format!("tag failed to render in {source_file}: {e}")))?;

    match tag {
        TerminologyTag::Def { term, aliases } => {
            let dt_inner = render::render_def(ctx, &term, &aliases, source_file);
            let dd_inner = render_prose(body, ctx, source_file)?;
            Ok(format!(r#"<dt class="term-local">{dt_inner}</dt><dd>{dd_inner}</dd>"#))
        }
        TerminologyTag::Tref { external_spec, term, aliases } => {
            Ok(render::render_tref(ctx, &external_spec, &term, &aliases))
        }
        TerminologyTag::Ref { .. } | TerminologyTag::Iref { .. } | TerminologyTag::Xref { .. } => {
            Err(Error::Render(format!(
                "unexpected inline-only tag at block position in {source_file}"
            )))
        }
    }
}

/// Renders one prose chunk through `pulldown-cmark`, expanding every inline
/// terminology/spec-reference tag found in its text runs. Code spans and
/// code blocks are left untouched by only inspecting [`Event::Text`] nodes
/// outside of [`Tag::CodeBlock`].
fn render_prose(content: &str, ctx: &mut RenderContext<'_>, source_file: &str) -> Result<String> {
    let parser = Parser::new_ext(content, cmark_options());
    let mut events = Vec::new();
    let mut in_code = false;

    for event in parser {
        match &event {
            Event::Start(Tag::CodeBlock(_)) => {
                in_code = true;
                events.push(event);
            }
            Event::End(TagEnd::CodeBlock) => {
                in_code = false;
                events.push(event);
            }
            Event::Text(text) if !in_code && tag_re().is_match(text) => {
                let text = text.clone();
                for html_event in expand_tags(&text, ctx, source_file)? {
                    events.push(html_event);
                }
            }
            _ => events.push(event),
        }
    }

    let mut html_out = String::new();
    html::push_html(&mut html_out, events.into_iter());
    Ok(html_out)
}

/// Splits one text run on `[[...]]` boundaries, rendering each tag in place
/// and leaving the surrounding plain text untouched.
fn expand_tags<'a>(
    text: &str,
    ctx: &mut RenderContext<'_>,
    source_file: &str,
) -> Result<Vec<Event<'a>>> {
    let mut out = Vec::new();
    let mut last_end = 0;

    for capture in tag_re().captures_iter(text) {
        let whole = capture.get(0).expect("group 0 always present");
        if whole.start() > last_end {
            out.push(Event::Text(text[last_end..whole.start()].to_string().into()));
        }

        let body = capture.get(1).expect("group 1 always present").as_str();
        out.push(Event::Html(render_one_tag(body, ctx, source_file)?.into()));

        last_end = whole.end();
    }

    if last_end < text.len() {
        out.push(Event::Text(text[last_end..].to_string().into()));
    }

    Ok(out)
}

/// Renders a single tag body (the content between `[[` and `]]`), dispatching
/// either to the spec-reference extension or to the standard terminology tag
/// renderer.
fn render_one_tag(body: &str, ctx: &mut RenderContext<'_>, source_file: &str) -> Result<String> {
    if let Some(captures) = spec_ref_re().captures(body.trim()) {
        let group = captures.get(1).map(|m| m.as_str().to_string()).unwrap_or_default();
        let value = captures[2].trim().to_string();
        ctx.spec_groups.entry(group.clone()).or_default().push(value.clone());
        let id = render::sanitize(&value);
        let label = format!(r#"<a class="spec-reference" href="#ref:{id}">{value}</a>"#);
        return Ok(label);
    }

    let (tag, _overflow) = parse_tag_body_with_alias_overflow(body)
        .map_err(|e| Error::Render(format!("tag failed to render in {source_file}: {e}")))?;

    Ok(match tag {
        TerminologyTag::Def { term, aliases } => render::render_def(ctx, &term, &aliases, source_file),
        TerminologyTag::Ref { term } => render::render_ref(ctx, &term, source_file),
        TerminologyTag::Iref { term } => render::render_iref(ctx, &term, source_file),
        TerminologyTag::Xref { external_spec, term, alias } => {
            render::render_xref(ctx, &external_spec, &term, alias.as_deref())
        }
        TerminologyTag::Tref { external_spec, term, aliases } => {
            render::render_tref(ctx, &external_spec, &term, &aliases)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReferenceStore;

    #[test]
    fn renders_def_inside_a_paragraph() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_document("[[def: Alpha]] is a term.", &mut ctx, "a.md").unwrap();
        assert!(html.contains(r#"id="term:alpha""#));
        assert!(html.contains("is a term."));
    }

    #[test]
    fn tag_inside_fenced_code_block_is_left_untouched() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_document("```\n[[def: Alpha]]\n```", &mut ctx, "a.md").unwrap();
        assert!(html.contains("[[def: Alpha]]"));
        assert!(ctx.definitions.is_empty());
    }

    #[test]
    fn spec_reference_extension_records_group() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_document("[[spec-terms: delegator]]", &mut ctx, "a.md").unwrap();
        assert!(html.contains("spec-reference"));
        assert_eq!(ctx.spec_groups.get("terms").unwrap(), &vec!["delegator".to_string()]);
    }

    #[test]
    fn escaped_tag_is_rendered_as_literal_text() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_document(r"\[[def: Alpha]]", &mut ctx, "a.md").unwrap();
        assert!(html.contains("[[def: Alpha]]"));
        assert!(ctx.definitions.is_empty());
    }

    #[test]
    fn def_block_with_continuation_body_becomes_a_dt_dd_pair() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let content = "[[def: Alpha, alp]]\n\n~ the first letter.\n~ also see [[ref: Beta]].";
        let html = render_document(content, &mut ctx, "terms/a.md").unwrap();

        assert!(html.contains(r#"<dt class="term-local">"#));
        assert!(html.contains(r#"id="term:alp""#));
        assert!(html.contains("the first letter."));
        assert!(html.contains(r##"href="#term:beta""##));
        assert_eq!(ctx.definitions.len(), 1);
        assert_eq!(ctx.references.len(), 1);
    }

    #[test]
    fn def_block_body_lines_no_longer_carry_the_tilde_marker() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let content = "[[def: Alpha]]\n\n~ plain description";
        let html = render_document(content, &mut ctx, "terms/a.md").unwrap();
        assert!(!html.contains("~ plain description"));
        assert!(html.contains("plain description"));
    }

    #[test]
    fn tref_block_renders_via_the_same_dt_dd_shape_as_inline_tref() {
        let mut store = ReferenceStore::new();
        store.observe(
            "terms/a.md",
            &TerminologyTag::Tref {
                external_spec: "keri".to_string(),
                term: "delegator".to_string(),
                aliases: vec!["del".to_string()],
            },
        );
        store.get_mut("keri", "delegator").unwrap().content = Some("<p>remote body</p>".to_string());

        let mut ctx = RenderContext::new(&store);
        let content = "[[tref: keri, delegator, del]]\n\n~ locally-written text is ignored.";
        let html = render_document(content, &mut ctx, "terms/a.md").unwrap();

        assert!(html.starts_with("<dt"));
        assert!(html.contains("remote body"));
        assert!(!html.contains("locally-written text"));
    }

    #[test]
    fn def_followed_by_trailing_prose_on_the_same_line_is_not_treated_as_a_block() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_document("[[def: Alpha]] is a term.", &mut ctx, "a.md").unwrap();
        assert!(!html.contains("<dt"));
        assert!(html.contains(r#"id="term:alpha""#));
        assert!(html.contains("is a term."));
    }
}
