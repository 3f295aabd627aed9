//! Tag Renderer (spec.md section 4.10).
//!
//! Turns one parsed [`TerminologyTag`] into its HTML fragment. Definitions
//! accumulate client-visible anchors; references/transclusions look up
//! already-rendered state passed in via [`RenderContext`] (see `markdown.rs`
//! for how that state is threaded through a full document render).

use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

use regex::Regex;

use crate::store::ReferenceStore;
use crate::types::{LocalDefinition, LocalReference};

/// Produces the `id`/`href` fragment identifier for a term: non-alphanumeric
/// characters (other than `-`) become `-`, runs of `-` collapse to one,
/// leading/trailing `-` are stripped, and the result is lowercased (spec.md
/// section 4.10).
#[must_use]
pub fn sanitize(term: &str) -> String {
    fn punctuation_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"[()\[\]{}/\\]").unwrap())
    }
    fn run_re() -> &'static Regex {
        static RE: OnceLock<Regex> = OnceLock::new();
        RE.get_or_init(|| Regex::new(r"-{2,}").unwrap())
    }

    let replaced = punctuation_re().replace_all(term, "-");
    let collapsed = run_re().replace_all(&replaced, "-");
    collapsed.trim_matches('-').to_lowercase()
}

/// Mutable rendering state threaded through one document render (spec.md
/// section 9: explicit state, not a global). Accumulates local definitions
/// and references as they're encountered so the Validator can check them
/// afterwards.
#[derive(Debug)]
pub struct RenderContext<'a> {
    /// The enriched reference store, used by `xref`/`tref` rendering.
    pub store: &'a ReferenceStore,
    /// Local definitions encountered so far, in document order.
    pub definitions: Vec<LocalDefinition>,
    /// Local `ref`/`iref` references encountered so far, in document order.
    pub references: Vec<LocalReference>,
    /// `spec-<group>` cross-reference groupings accumulated while rendering
    /// the spec-reference extension (spec.md section 4.9).
    pub spec_groups: HashMap<String, Vec<String>>,
    /// External spec keys declared in the manifest. An `xref`/`tref` naming
    /// a key outside this set renders the "cannot be resolved" fallback
    /// (spec.md section 4.10).
    pub known_external_specs: HashSet<String>,
}

impl<'a> RenderContext<'a> {
    /// Creates a fresh render context bound to `store`, with no external
    /// specs yet declared known (see [`RenderContext::with_known_specs`]).
    #[must_use]
    pub fn new(store: &'a ReferenceStore) -> Self {
        Self {
            store,
            definitions: Vec::new(),
            references: Vec::new(),
            spec_groups: HashMap::new(),
            known_external_specs: HashSet::new(),
        }
    }

    /// Creates a fresh render context bound to `store`, declaring
    /// `known_external_specs` as the manifest's set of declared external
    /// spec keys.
    #[must_use]
    pub fn with_known_specs(store: &'a ReferenceStore, known_external_specs: HashSet<String>) -> Self {
        Self {
            known_external_specs,
            ..Self::new(store)
        }
    }
}

/// Builds the `def`/`tref` display text: the first alias followed by a
/// parenthetical listing any remaining aliases and finally the original
/// term, or just the original term when there are no aliases (spec.md
/// section 4.10). `variant` selects between the `term-local-*` classes
/// (`def`) and the `term-external-*` classes (`tref`).
fn display_text(term: &str, aliases: &[String], variant: &str) -> String {
    let original = format!(
        r#"<span class="term-{variant}-original-term term-original-term" title="original term">{term}</span>"#
    );
    match aliases.split_first() {
        None => original,
        Some((first, rest)) => {
            let mut parenthetical = String::new();
            for alias in rest {
                parenthetical.push_str(alias);
                parenthetical.push_str(", ");
            }
            format!(
                r#"{first} <span class="term-{variant}-parenthetical-terms">({parenthetical}{original})</span>"#
            )
        }
    }
}

/// Wraps `inner` in one nested `<span id="term:...">` per entry of `ids`, in
/// order -- the first id becomes the innermost span, the last becomes the
/// outermost (spec.md section 4.10: "outermost bearing the last alias's
/// sanitized id"). `extra_attrs_for_last` is appended only to the outermost
/// span's opening tag.
fn nest_id_spans(ids: &[String], inner: &str, extra_attrs_for_last: &str) -> String {
    let mut html = inner.to_string();
    for (index, id) in ids.iter().enumerate() {
        let sanitized = sanitize(id);
        let extra = if index == ids.len() - 1 { extra_attrs_for_last } else { "" };
        html = format!(r#"<span id="term:{sanitized}"{extra}>{html}</span>"#);
    }
    html
}

/// Renders `[[def: term, alias...]]` (spec.md section 4.10).
pub fn render_def(ctx: &mut RenderContext<'_>, term: &str, aliases: &[String], source_file: &str) -> String {
    ctx.definitions.push(LocalDefinition {
        term: term.to_string(),
        primary_alias: aliases.first().cloned(),
        source_file: source_file.to_string(),
    });

    let ids: Vec<String> = std::iter::once(term.to_string()).chain(aliases.iter().cloned()).collect();
    let text = display_text(term, aliases, "local");
    nest_id_spans(&ids, &text, "")
}

/// Renders `[[ref: term]]` (spec.md section 4.10).
pub fn render_ref(ctx: &mut RenderContext<'_>, term: &str, source_file: &str) -> String {
    ctx.references.push(LocalReference {
        term: term.to_string(),
        source_file: source_file.to_string(),
    });
    let id = sanitize(term);
    format!(r#"<a class="term-reference" href="#term:{id}">{term}</a>"#)
}

/// Renders `[[iref: term]]`: an inert placeholder resolved entirely
/// client-side (spec.md section 4.10), not a visible link.
pub fn render_iref(ctx: &mut RenderContext<'_>, term: &str, source_file: &str) -> String {
    ctx.references.push(LocalReference {
        term: term.to_string(),
        source_file: source_file.to_string(),
    });
    let id = sanitize(term);
    format!(r#"<span class="iref-placeholder" data-iref-term="{id}" data-iref-original="{term}"></span>"#)
}

/// Renders `[[xref: externalSpec, term, alias?]]`: a link to the external
/// specification's own rendered definition, no local transclusion (spec.md
/// section 4.10).
pub fn render_xref(ctx: &RenderContext<'_>, external_spec: &str, term: &str, alias: Option<&str>) -> String {
    if !ctx.known_external_specs.is_empty() && !ctx.known_external_specs.contains(external_spec) {
        return format!(
            r#"<span class="no-xref-found-message" title="{external_spec} is not a declared external spec">xref cannot be resolved</span>"#
        );
    }

    let label = alias.unwrap_or(term);
    let id = sanitize(term);
    let record = ctx.store.get(external_spec, term);
    let gh_page = record.and_then(|r| r.gh_page_url.as_deref()).unwrap_or_default();
    let data_local_href = format!("#term:{external_spec}:{id}");
    let href = format!("{gh_page}#term:{id}");

    let enrichment = record
        .filter(|r| r.is_resolved())
        .map(|r| {
            format!(
                r#" title="External term definition" data-term-content="{}""#,
                html_escape(r.content.as_deref().unwrap_or_default())
            )
        })
        .unwrap_or_default();

    format!(
        r#"<a class="x-term-reference term-reference" data-local-href="{data_local_href}" href="{href}"{enrichment}>{label}</a>"#
    )
}

/// Renders `[[tref: externalSpec, term, alias...]]`: a transcluded
/// definition entry mirroring `def`'s span nesting but with the
/// `term-external-*` classes (spec.md section 4.10), paired with a `<dd>`
/// carrying the transcluded remote content so the Postprocessor (section
/// 4.11) can regroup it alongside local definitions without needing to
/// synthesize content that doesn't otherwise exist in the tree.
pub fn render_tref(ctx: &RenderContext<'_>, external_spec: &str, term: &str, aliases: &[String]) -> String {
    let ids: Vec<String> = std::iter::once(term.to_string()).chain(aliases.iter().cloned()).collect();
    let text = display_text(term, aliases, "external");

    // Innermost span (term itself) gets the "Externally defined as T" title
    // when at least one alias exists; outermost gets the external-transclusion
    // marker class/attribute.
    let mut html = text;
    for (index, id) in ids.iter().enumerate() {
        let sanitized = sanitize(id);
        let mut attrs = String::new();
        if index == 0 && !aliases.is_empty() {
            attrs.push_str(&format!(r#" title="Externally defined as {term}""#));
        }
        if index == ids.len() - 1 {
            attrs.push_str(&format!(r#" class="term-external" data-original-term="{term}""#));
        }
        html = format!(r#"<span id="term:{sanitized}"{attrs}>{html}</span>"#);
    }

    let body = ctx
        .store
        .get(external_spec, term)
        .and_then(|r| r.content.clone())
        .unwrap_or_default();

    format!(r#"<dt class="term-external">{html}</dt><dd>{body}</dd>"#)
}

fn html_escape(raw: &str) -> String {
    raw.replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ReferenceStore;
    use crate::tag::TerminologyTag;

    #[test]
    fn sanitize_collapses_punctuation_and_lowercases() {
        assert_eq!(sanitize("Key Event Log"), "key-event-log");
        assert_eq!(sanitize("a/b\\c(d)[e]{f}"), "a-b-c-d-e-f");
        assert_eq!(sanitize("--leading-and-trailing--"), "leading-and-trailing");
    }

    #[test]
    fn render_def_emits_id_and_records_local_definition() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_def(&mut ctx, "Delegator", &["del".to_string()], "a.md");
        assert!(html.contains(r#"id="term:delegator""#));
        assert_eq!(ctx.definitions.len(), 1);
        assert_eq!(ctx.definitions[0].primary_alias.as_deref(), Some("del"));
    }

    #[test]
    fn render_ref_links_to_def_anchor() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_ref(&mut ctx, "Delegator", "b.md");
        assert!(html.contains(r##"href="#term:delegator""##));
        assert_eq!(ctx.references.len(), 1);
    }

    #[test]
    fn render_xref_prefers_gh_page_url_when_resolved() {
        let mut store = ReferenceStore::new();
        store.observe("a.md", &TerminologyTag::Xref {
            external_spec: "keri".to_string(),
            term: "delegator".to_string(),
            alias: None,
        });
        store.get_mut("keri", "delegator").unwrap().gh_page_url =
            Some("https://example.com/keri/".to_string());

        let ctx = RenderContext::new(&store);
        let html = render_xref(&ctx, "keri", "delegator", None);
        assert!(html.contains("https://example.com/keri/#term:delegator"));
    }

    #[test]
    fn render_tref_embeds_fetched_content() {
        let mut store = ReferenceStore::new();
        store.observe("a.md", &TerminologyTag::Tref {
            external_spec: "keri".to_string(),
            term: "delegator".to_string(),
            aliases: vec!["del".to_string()],
        });
        store.get_mut("keri", "delegator").unwrap().content = Some("<p>def</p>".to_string());

        let ctx = RenderContext::new(&store);
        let html = render_tref(&ctx, "keri", "delegator", &["del".to_string()]);
        assert!(html.starts_with("<dt"));
        assert!(html.contains("del "));
        assert!(html.contains("delegator"));
        assert!(html.contains("<p>def</p>"));
    }

    #[test]
    fn render_xref_falls_back_when_spec_not_declared() {
        let store = ReferenceStore::new();
        let mut known = HashSet::new();
        known.insert("keri".to_string());
        let ctx = RenderContext::with_known_specs(&store, known);
        let html = render_xref(&ctx, "unknown-spec", "delegator", None);
        assert!(html.contains("no-xref-found-message"));
    }

    #[test]
    fn render_iref_is_an_inert_placeholder_not_a_link() {
        let store = ReferenceStore::new();
        let mut ctx = RenderContext::new(&store);
        let html = render_iref(&mut ctx, "Delegator", "b.md");
        assert!(!html.contains("<a "));
        assert!(html.contains("iref-placeholder"));
        assert!(html.contains(r#"data-iref-term="delegator""#));
    }
}
