//! Reference Collector (spec.md section 4.6).
//!
//! Bridges the Markdown Scanner and the Reference Store: prunes records no
//! longer mentioned anywhere, re-scans every terminology file for
//! `xref`/`tref` tags in lexical file order, applies the store's merge rules,
//! and validates each discovered tag's `externalSpec` against the manifest.

use regex::Regex;
use std::sync::OnceLock;

use crate::findings::{Finding, FindingKind, FindingSink, Severity};
use crate::manifest::Manifest;
use crate::scanner::MarkdownFile;
use crate::store::ReferenceStore;
use crate::tag::{parse_tag_body_with_alias_overflow, TerminologyTag};
use crate::vcs;

/// Matches one `[[xref:...]]` or `[[tref:...]]` lexeme, capturing its type and body.
fn tag_lexeme_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[\[\s*(xref|tref)\s*:([^\]]*)\]\]").unwrap())
}

/// Runs one collection pass: prune, scan, merge, validate.
///
/// `timestamp` is the caller-supplied ISO 8601 timestamp used for any
/// findings recorded (spec.md section 9: no system-clock reads inside the
/// library).
pub fn collect(
    manifest: &Manifest,
    files: &[MarkdownFile],
    store: &mut ReferenceStore,
    sink: &mut FindingSink,
    timestamp: &str,
) {
    let contents: Vec<String> = files.iter().map(|f| f.content.clone()).collect();
    store.prune(&contents);

    for file in files {
        for capture in tag_lexeme_re().captures_iter(&file.content) {
            let kind_token = &capture[1];
            let body = format!("{}: {}", kind_token, &capture[2]);

            let (tag, alias_overflow) = match parse_tag_body_with_alias_overflow(&body) {
                Ok(parsed) => parsed,
                Err(err) => {
                    sink.record(Finding {
                        timestamp: timestamp.to_string(),
                        kind: FindingKind::TagMalformed,
                        severity: Severity::Warning,
                        operation: "collector".to_string(),
                        message: format!("{} in {}", err, file.relative_path),
                        source_files: vec![file.relative_path.clone()],
                        additional_data: None,
                    });
                    continue;
                }
            };

            if alias_overflow {
                sink.record(Finding {
                    timestamp: timestamp.to_string(),
                    kind: FindingKind::XrefWithMultipleAliases,
                    severity: Severity::Warning,
                    operation: "collector".to_string(),
                    message: format!(
                        "xref for {:?} in {} supplied more than one alias; using the first",
                        tag.term(),
                        file.relative_path
                    ),
                    source_files: vec![file.relative_path.clone()],
                    additional_data: None,
                });
            }

            if let Some(external_spec) = tag.external_spec() {
                if manifest.external_spec(external_spec).is_none() {
                    // Non-fatal (spec.md section 4.6 step 4): the record is
                    // still kept so the author sees *something* rendered;
                    // only enrichment (owner/repo/content) is skipped for it.
                    sink.record(Finding {
                        timestamp: timestamp.to_string(),
                        kind: FindingKind::UnknownExternalSpec,
                        severity: Severity::Warning,
                        operation: "collector".to_string(),
                        message: format!(
                            "{:?} references undeclared external spec {external_spec:?}",
                            tag.term()
                        ),
                        source_files: vec![file.relative_path.clone()],
                        additional_data: None,
                    });
                }
            }

            store.observe(&file.relative_path, &tag);
        }
    }

    enrich_from_manifest(manifest, store);
}

/// Fills in owner/repo/URL/branch enrichment fields from the manifest's
/// external spec descriptors (spec.md section 4.6's enrichment step),
/// without overwriting fields the Remote Fetcher may have already populated
/// in a prior record (merge rule 4: enrichment fields are preserved if
/// present).
fn enrich_from_manifest(manifest: &Manifest, store: &mut ReferenceStore) {
    let branch = vcs::current_branch(&manifest.base_dir);
    let keys: Vec<(String, String)> = store.records().map(|r| r.key()).collect();
    for (external_spec, term) in keys {
        let Some(descriptor) = manifest.external_spec(&external_spec) else {
            if let Some(record) = store.get_mut(&external_spec, &term) {
                if record.branch.is_none() {
                    record.branch = Some(branch.clone());
                }
            }
            continue;
        };
        let (owner, repo) = split_owner_repo(&descriptor.url);
        if let Some(record) = store.get_mut(&external_spec, &term) {
            if record.owner.is_none() {
                record.owner = owner;
            }
            if record.repo.is_none() {
                record.repo = repo;
            }
            if record.repo_url.is_none() {
                record.repo_url = Some(descriptor.url.clone());
            }
            if record.gh_page_url.is_none() {
                record.gh_page_url = Some(descriptor.gh_page.clone());
            }
            if record.avatar_url.is_none() {
                record.avatar_url = descriptor.avatar_url.clone();
            }
            if record.branch.is_none() {
                record.branch = Some(branch.clone());
            }
        }
    }
}

/// Extracts `owner`/`repo` from a GitHub-style repository URL via a real
/// URL parse (tolerating a trailing slash or `.git` suffix), rather than
/// hand-rolled string slicing.
pub(crate) fn split_owner_repo(url: &str) -> (Option<String>, Option<String>) {
    let Ok(parsed) = url::Url::parse(url) else {
        return (None, None);
    };
    let segments: Vec<&str> = parsed
        .path_segments()
        .map(|segments| segments.filter(|s| !s.is_empty()).collect())
        .unwrap_or_default();
    let mut it = segments.into_iter().rev();
    let repo = it.next().map(|s| s.trim_end_matches(".git").to_string());
    let owner = it.next().map(str::to_string);
    (owner, repo)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{ExternalSpecDescriptor, Manifest, ManifestSpec, SourceInfo};
    use std::path::PathBuf;

    fn test_manifest() -> Manifest {
        Manifest {
            spec: ManifestSpec {
                title: "t".to_string(),
                description: "d".to_string(),
                author: "a".to_string(),
                source: SourceInfo { account: "acct".to_string(), repo: "repo".to_string() },
                spec_directory: "spec".to_string(),
                spec_terms_directory: Some("terms".to_string()),
                output_path: "docs".to_string(),
                markdown_paths: vec![],
                external_specs: vec![ExternalSpecDescriptor {
                    external_spec: "keri".to_string(),
                    url: "https://github.com/trustoverip/keri-spec".to_string(),
                    gh_page: "https://trustoverip.github.io/keri-spec/".to_string(),
                    terms_dir: None,
                    avatar_url: None,
                }],
                logo: None,
                logo_link: None,
                favicon: None,
                katex: false,
                anchor_symbol: None,
                search_highlight_style: None,
            },
            base_dir: PathBuf::from("/tmp"),
        }
    }

    fn file(relative_path: &str, content: &str) -> MarkdownFile {
        MarkdownFile {
            relative_path: relative_path.to_string(),
            absolute_path: PathBuf::from(relative_path),
            content: content.to_string(),
        }
    }

    #[test]
    fn collects_xref_and_enriches_owner_repo() {
        let manifest = test_manifest();
        let files = vec![file("a.md", "see [[xref: keri, delegator, del]] for detail")];
        let mut store = ReferenceStore::new();
        let mut sink = FindingSink::new();

        collect(&manifest, &files, &mut store, &mut sink, "2026-01-01T00:00:00Z");

        let record = store.get("keri", "delegator").unwrap();
        assert_eq!(record.owner.as_deref(), Some("trustoverip"));
        assert_eq!(record.repo.as_deref(), Some("keri-spec"));
        assert_eq!(record.first_xref_alias.as_deref(), Some("del"));
        assert!(sink.findings().is_empty());
    }

    #[test]
    fn unknown_external_spec_is_a_warning_but_record_is_kept_unenriched() {
        let manifest = test_manifest();
        let files = vec![file("a.md", "[[xref: not-declared, term]]")];
        let mut store = ReferenceStore::new();
        let mut sink = FindingSink::new();

        collect(&manifest, &files, &mut store, &mut sink, "2026-01-01T00:00:00Z");

        let record = store.get("not-declared", "term").expect("record kept despite unknown spec");
        assert!(record.owner.is_none());
        assert_eq!(sink.findings().len(), 1);
        assert_eq!(sink.findings()[0].kind, FindingKind::UnknownExternalSpec);
    }

    #[test]
    fn malformed_tag_is_a_warning() {
        let manifest = test_manifest();
        let files = vec![file("a.md", "[[xref: keri]]")];
        let mut store = ReferenceStore::new();
        let mut sink = FindingSink::new();

        collect(&manifest, &files, &mut store, &mut sink, "2026-01-01T00:00:00Z");

        assert_eq!(sink.findings().len(), 1);
        assert_eq!(sink.findings()[0].kind, FindingKind::TagMalformed);
    }

    #[test]
    fn prune_runs_before_rescan_so_stale_records_do_not_survive() {
        let manifest = test_manifest();
        let mut store = ReferenceStore::new();
        store.observe("old.md", &TerminologyTag::Xref {
            external_spec: "keri".to_string(),
            term: "stale".to_string(),
            alias: None,
        });

        let files = vec![file("a.md", "no references here")];
        let mut sink = FindingSink::new();
        collect(&manifest, &files, &mut store, &mut sink, "2026-01-01T00:00:00Z");

        assert!(store.get("keri", "stale").is_none());
    }
}
