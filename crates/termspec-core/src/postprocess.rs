//! Definition-list postprocessor (spec.md section 4.11).
//!
//! Runs after Markdown rendering to reunify every rendered `term-local`
//! definition and `term-external` transclusion into a single alphabetically
//! sorted `<dl>`, regardless of how the Markdown engine happened to wrap
//! them. Works on a parsed DOM tree (`scraper`) rather than regex, per
//! spec.md section 4.4's caution against regex-based HTML rewriting --
//! definition markup nests and line-wraps in ways a line-oriented regex
//! cannot reliably track (grounded in the pack's `scraper`-based HTML
//! rewriting examples).

use scraper::{ElementRef, Html, Node, Selector};

fn dl_selector() -> Selector {
    Selector::parse("dl").expect("static selector")
}

fn dt_selector() -> Selector {
    Selector::parse("dt").expect("static selector")
}

fn dd_selector() -> Selector {
    Selector::parse("dd").expect("static selector")
}

fn term_external_span_selector() -> Selector {
    Selector::parse("span.term-external").expect("static selector")
}

/// Spec-reference bibliography entries are `<dt id="ref:...">` (spec.md
/// section 4.9); they must never be folded into the terminology `<dl>`.
fn is_bibliography_dt(dt: ElementRef<'_>) -> bool {
    dt.value().attr("id").is_some_and(|id| id.starts_with("ref:"))
}

fn is_bibliography_dl(dl: ElementRef<'_>) -> bool {
    dl.children()
        .filter_map(ElementRef::wrap)
        .filter(|child| child.value().name() == "dt")
        .any(is_bibliography_dt)
}

/// One reunified definition-list entry: the `<dt>...</dt>` and `<dd>...</dd>`
/// fragments plus the key used to alphabetize it.
struct Entry {
    dt_html: String,
    dd_html: String,
    sort_key: String,
}

/// Rewrites `body_html` (the Tag Renderer's output for one document, wrapped
/// in a top-level container) so every definition and transcluded term lands
/// in one sorted `<dl class="terms-and-definitions-list">`.
#[must_use]
pub fn reunify_definition_lists(body_html: &str) -> String {
    let document = Html::parse_fragment(body_html);
    let root = document.root_element();

    let mut entries = collect_entries(&document);
    entries.sort_by(|a, b| a.sort_key.cmp(&b.sort_key));

    if entries.is_empty() {
        return body_html.to_string();
    }

    let new_dl = build_dl(&entries);
    splice_in_new_dl(root, &new_dl)
}

/// Gathers every definition entry from wherever it is found in the document:
/// existing `<dl>`s, stray `<dt>`/`<dd>` pairs, and orphaned
/// `<p><span class="term-external">` paragraphs the Markdown engine left
/// un-wrapped.
fn collect_entries(document: &Html) -> Vec<Entry> {
    let mut entries = Vec::new();

    for dl in document.select(&dl_selector()) {
        if is_bibliography_dl(dl) {
            continue;
        }
        collect_dt_dd_pairs(dl, &mut entries);
    }

    for dt in document.select(&dt_selector()) {
        if is_inside_dl(dt) || is_bibliography_dt(dt) {
            continue;
        }
        if let Some(dd) = next_element_sibling(dt).filter(|el| dd_selector().matches(el)) {
            push_pair(dt, dd, &mut entries);
        }
    }

    for span in document.select(&term_external_span_selector()) {
        let Some(paragraph) = parent_paragraph(span) else {
            continue;
        };
        if is_inside_dl(paragraph) {
            continue;
        }
        push_paragraph_as_entry(paragraph, span, &mut entries);
    }

    entries
}

fn collect_dt_dd_pairs(dl: ElementRef<'_>, entries: &mut Vec<Entry>) {
    let mut current_dt: Option<ElementRef<'_>> = None;
    for child in dl.children().filter_map(ElementRef::wrap) {
        let name = child.value().name();
        if name == "dt" {
            if let Some(dt) = current_dt.take() {
                if is_empty(dt) {
                    continue;
                }
            }
            current_dt = Some(child);
        } else if name == "dd" {
            if let Some(dt) = current_dt.take() {
                if !is_empty(dt) && !is_empty(child) {
                    push_pair(dt, child, entries);
                }
            }
        }
    }
}

fn push_pair(dt: ElementRef<'_>, dd: ElementRef<'_>, entries: &mut Vec<Entry>) {
    if is_empty(dt) {
        return;
    }
    entries.push(Entry {
        sort_key: dt.text().collect::<String>().trim().to_lowercase(),
        dt_html: dt.html(),
        dd_html: dd.html(),
    });
}

fn push_paragraph_as_entry(paragraph: ElementRef<'_>, span: ElementRef<'_>, entries: &mut Vec<Entry>) {
    let term_text = span.text().collect::<String>().trim().to_string();
    if term_text.is_empty() {
        return;
    }

    let dt_html = format!(
        r#"<dt class="{}">{}</dt>"#,
        span.value().classes().collect::<Vec<_>>().join(" "),
        span.inner_html()
    );

    let remainder: String = paragraph
        .children()
        .filter(|child| ElementRef::wrap(*child).map(|el| el != span).unwrap_or(true))
        .filter_map(render_node_as_html)
        .collect();

    entries.push(Entry {
        sort_key: term_text.to_lowercase(),
        dt_html,
        dd_html: format!("<dd>{remainder}</dd>"),
    });
}

fn render_node_as_html(node: ego_tree::NodeRef<'_, Node>) -> Option<String> {
    match node.value() {
        Node::Text(text) => Some(text.to_string()),
        Node::Element(_) => ElementRef::wrap(node).map(|el| el.html()),
        Node::Comment(comment) => Some(format!("<!--{comment}-->")),
        _ => None,
    }
}

fn is_empty(element: ElementRef<'_>) -> bool {
    element.text().collect::<String>().trim().is_empty() && element.inner_html().trim().is_empty()
}

fn is_inside_dl(element: ElementRef<'_>) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(|ancestor| ancestor.value().name() == "dl")
}

fn next_element_sibling(element: ElementRef<'_>) -> Option<ElementRef<'_>> {
    element.next_siblings().find_map(ElementRef::wrap)
}

fn parent_paragraph(span: ElementRef<'_>) -> Option<ElementRef<'_>> {
    let parent = ElementRef::wrap(span.parent()?)?;
    (parent.value().name() == "p").then_some(parent)
}

fn build_dl(entries: &[Entry]) -> String {
    let mut out = String::from(r#"<dl class="terms-and-definitions-list">"#);
    for entry in entries {
        out.push_str(&entry.dt_html);
        out.push_str(&entry.dd_html);
    }
    out.push_str("</dl>");
    out
}

/// Walks the top-level children of `root`, dropping every node that
/// contributed an [`Entry`] (existing `<dl>`s, stray `<dt>`/`<dd>` pairs,
/// consumed `term-external` paragraphs, and now-empty `<p>`/`<dt>` leftovers),
/// preserving spec-reference bibliography `<dl>`s untouched, and splicing
/// `new_dl` in immediately after the `id="terminology-section-start"` marker
/// when present (spec.md section 4.11 step 1), or else at the position of the
/// first consumed node.
fn splice_in_new_dl(root: ElementRef<'_>, new_dl: &str) -> String {
    let mut out = String::new();
    let mut spliced = false;

    for child in root.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Element(_) => {
                let Some(element) = ElementRef::wrap(child) else {
                    continue;
                };
                if is_terminology_section_marker(element) {
                    out.push_str(&element.html());
                    out.push_str(new_dl);
                    spliced = true;
                    continue;
                }
                if is_consumed(element) {
                    if !spliced {
                        out.push_str(new_dl);
                        spliced = true;
                    }
                    continue;
                }
                out.push_str(&element.html());
            }
            _ => {}
        }
    }

    if !spliced {
        out.push_str(new_dl);
    }

    out
}

fn is_terminology_section_marker(element: ElementRef<'_>) -> bool {
    element.value().attr("id") == Some("terminology-section-start")
}

fn is_consumed(element: ElementRef<'_>) -> bool {
    let name = element.value().name();
    if name == "dl" {
        return !is_bibliography_dl(element);
    }
    if name == "dt" {
        return !is_bibliography_dt(element);
    }
    if name == "dd" {
        return true;
    }
    if name == "p" && is_empty(element) {
        return true;
    }
    if name == "p" {
        return element
            .children()
            .filter_map(ElementRef::wrap)
            .any(|child| child.value().classes().any(|c| c == "term-external"));
    }
    false
}
