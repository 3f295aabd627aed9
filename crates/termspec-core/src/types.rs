//! Core data types shared across the pipeline (spec.md section 3).

use serde::{Deserialize, Serialize};

/// Which kind of tag discovered a `(externalSpec, term)` pair in a given source file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    /// Discovered via `[[xref:...]]`.
    Xref,
    /// Discovered via `[[tref:...]]`.
    Tref,
}

impl ReferenceType {
    /// Returns the lowercase tag name, as used in `sourceFiles[].type`.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Xref => "xref",
            Self::Tref => "tref",
        }
    }
}

/// One `(file, type)` provenance entry on a [`ReferenceRecord`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceFileEntry {
    /// The Markdown file (relative path) that referenced this term.
    pub file: String,
    /// Which tag type made the reference.
    #[serde(rename = "type")]
    pub reference_type: ReferenceType,
}

/// An enriched, persisted reference to a term defined in an external specification.
///
/// Exactly one record exists per `(external_spec, term)` pair for the
/// lifetime of a build (spec.md section 3's key invariant); see `store.rs`
/// for the merge rules that maintain this.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    /// The external spec key, e.g. `"keri"`.
    pub external_spec: String,
    /// The term, in its source-authored form.
    pub term: String,

    /// Aliases observed via `tref`, in first-observation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tref_aliases: Vec<String>,
    /// Aliases observed via `xref` (at most one meaningfully populated; see spec.md
    /// section 4.5), in first-observation order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub xref_aliases: Vec<String>,
    /// The first element of `tref_aliases`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_tref_alias: Option<String>,
    /// The first element of `xref_aliases`, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub first_xref_alias: Option<String>,

    /// Every `(file, type)` that discovered this reference, in scan order.
    #[serde(default)]
    pub source_files: Vec<SourceFileEntry>,

    /// Repository owner, resolved from the manifest's external spec descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Repository name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Repository URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    /// Built GitHub Pages site URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gh_page_url: Option<String>,
    /// Avatar image URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Current branch of the remote repository (or this project's own, before enrichment).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub branch: Option<String>,
    /// Commit hash of the fetched remote content, or `"not found"` on fetch failure.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_hash: Option<String>,
    /// Raw HTML fragment of the remote `<dd>` block(s) for this term.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// The remote `<dt>`'s class set, intersected with `{term-local, term-external}`.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub classes: Vec<String>,
    /// Optional display label for the external spec.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub site: Option<String>,
    /// The reference type that most recently discovered this record, when known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<ReferenceType>,
}

impl ReferenceRecord {
    /// Creates a bare record for `(external_spec, term)` with no enrichment yet.
    #[must_use]
    pub fn new(external_spec: impl Into<String>, term: impl Into<String>) -> Self {
        Self {
            external_spec: external_spec.into(),
            term: term.into(),
            ..Self::default()
        }
    }

    /// The `(external_spec, term)` identity key for this record.
    #[must_use]
    pub fn key(&self) -> (String, String) {
        (self.external_spec.clone(), self.term.clone())
    }

    /// Whether the remote fetch for this record found a match (i.e. `content`
    /// was populated and is not the not-found sentinel).
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        match &self.content {
            Some(content) => content != NOT_FOUND_CONTENT,
            None => false,
        }
    }
}

/// Sentinel content set when a remote fetch fails outright or the term is missing
/// (spec.md section 4.7).
pub const NOT_FOUND_CONTENT: &str = "This term was not found in the external repository.";
/// Sentinel commit hash set alongside [`NOT_FOUND_CONTENT`].
pub const NOT_FOUND_COMMIT_HASH: &str = "not found";

/// A local term definition collected by the Tag Renderer during Markdown rendering.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalDefinition {
    /// The defined term.
    pub term: String,
    /// The first alias, if any (used by the Validator to check reachability).
    pub primary_alias: Option<String>,
    /// Which file defined this term.
    pub source_file: String,
}

/// An intra-document reference (`ref`/`iref`) collected during rendering, used by the Validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalReference {
    /// The referenced term.
    pub term: String,
    /// Which file made the reference.
    pub source_file: String,
}

/// The final build output: the HTML document plus the embedded store snapshot.
#[derive(Debug, Clone)]
pub struct RenderedArtifact {
    /// Complete HTML document contents.
    pub html: String,
}
