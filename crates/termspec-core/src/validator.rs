//! Validator (spec.md section 4.12).
//!
//! Runs against the fully rendered HTML document after postprocessing. Both
//! checks are non-fatal (spec.md section 7): an unresolved `ref`/`iref` or a
//! dangling `def` is recorded as a [`Finding`] and the build proceeds.

use scraper::{Html, Selector};
use std::collections::HashSet;

use crate::findings::{Finding, FindingKind, FindingSink, Severity};
use crate::render::sanitize;
use crate::types::{LocalDefinition, LocalReference};

fn anchor_id_selector() -> Selector {
    Selector::parse("[id]").expect("static selector")
}

fn href_selector() -> Selector {
    Selector::parse("[href]").expect("static selector")
}

/// Checks every `ref`/`iref` against the set of `id="term:..."` anchors
/// actually present in the rendered HTML, and every local `def` against the
/// set of `href="#term:..."` targets actually used anywhere in the document.
pub fn validate(
    rendered_html: &str,
    definitions: &[LocalDefinition],
    references: &[LocalReference],
    sink: &mut FindingSink,
    timestamp: &str,
) {
    let document = Html::parse_document(rendered_html);

    let anchor_ids: HashSet<String> = document
        .select(&anchor_id_selector())
        .filter_map(|el| el.value().attr("id"))
        .map(str::to_string)
        .collect();

    let href_targets: HashSet<String> = document
        .select(&href_selector())
        .filter_map(|el| el.value().attr("href"))
        .filter_map(|href| href.strip_prefix('#'))
        .map(str::to_string)
        .collect();

    check_unresolved_references(references, &anchor_ids, sink, timestamp);
    check_dangling_definitions(definitions, &href_targets, sink, timestamp);
}

fn check_unresolved_references(
    references: &[LocalReference],
    anchor_ids: &HashSet<String>,
    sink: &mut FindingSink,
    timestamp: &str,
) {
    for reference in references {
        let expected_id = format!("term:{}", sanitize(&reference.term));
        if anchor_ids.contains(&expected_id) {
            continue;
        }
        sink.record(Finding {
            timestamp: timestamp.to_string(),
            kind: FindingKind::UnresolvedRef,
            severity: Severity::Warning,
            operation: "validator".to_string(),
            message: format!(
                "{:?} referenced in {} has no matching definition",
                reference.term, reference.source_file
            ),
            source_files: vec![reference.source_file.clone()],
            additional_data: None,
        });
    }
}

fn check_dangling_definitions(
    definitions: &[LocalDefinition],
    href_targets: &HashSet<String>,
    sink: &mut FindingSink,
    timestamp: &str,
) {
    for definition in definitions {
        let candidate_ids: Vec<String> = std::iter::once(definition.term.clone())
            .chain(definition.primary_alias.clone())
            .map(|t| format!("term:{}", sanitize(&t)))
            .collect();

        let is_targeted = candidate_ids.iter().any(|id| href_targets.contains(id));
        if is_targeted {
            continue;
        }

        sink.record(Finding {
            timestamp: timestamp.to_string(),
            kind: FindingKind::DanglingDefinition,
            severity: Severity::Warning,
            operation: "validator".to_string(),
            message: format!(
                "{:?} defined in {} is never referenced",
                definition.term, definition.source_file
            ),
            source_files: vec![definition.source_file.clone()],
            additional_data: None,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(term: &str, file: &str) -> LocalDefinition {
        LocalDefinition {
            term: term.to_string(),
            primary_alias: None,
            source_file: file.to_string(),
        }
    }

    fn reference(term: &str, file: &str) -> LocalReference {
        LocalReference {
            term: term.to_string(),
            source_file: file.to_string(),
        }
    }

    #[test]
    fn resolved_reference_produces_no_finding() {
        let html = r#"<span id="term:alpha">Alpha</span><a href="#term:alpha">Alpha</a>"#;
        let mut sink = FindingSink::new();
        validate(html, &[], &[reference("Alpha", "a.md")], &mut sink, "t");
        assert!(sink.findings().is_empty());
    }

    #[test]
    fn unresolved_reference_is_a_warning() {
        let html = r#"<p>no anchors here</p>"#;
        let mut sink = FindingSink::new();
        validate(html, &[], &[reference("Alpha", "a.md")], &mut sink, "t");
        assert_eq!(sink.findings().len(), 1);
        assert_eq!(sink.findings()[0].kind, FindingKind::UnresolvedRef);
    }

    #[test]
    fn referenced_definition_produces_no_finding() {
        let html = r#"<a href="#term:alpha">Alpha</a>"#;
        let mut sink = FindingSink::new();
        validate(html, &[def("Alpha", "a.md")], &[], &mut sink, "t");
        assert!(sink.findings().is_empty());
    }

    #[test]
    fn dangling_definition_is_a_warning() {
        let html = r#"<p>no links here</p>"#;
        let mut sink = FindingSink::new();
        validate(html, &[def("Alpha", "a.md")], &[], &mut sink, "t");
        assert_eq!(sink.findings().len(), 1);
        assert_eq!(sink.findings()[0].kind, FindingKind::DanglingDefinition);
    }
}
