//! Project manifest loading (spec.md section 4.1).
//!
//! The manifest is a JSON document with a required top-level `specs` array
//! (spec.md section 6); this implementation treats the first entry as the
//! active project, matching the source format's convention of one manifest
//! file describing one build.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default file name the loader looks for.
pub const MANIFEST_FILE_NAME: &str = "specs.json";

/// Default anchor symbol emitted by TOC heading anchors when the manifest omits one.
pub const DEFAULT_ANCHOR_SYMBOL: &str = "\u{a7}"; // "§"

/// Default subdirectory of `spec_directory` holding terminology Markdown files.
pub const DEFAULT_TERMS_SUBDIRECTORY: &str = "terms";

/// One external specification declared in the manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExternalSpecDescriptor {
    /// Stable key used in `[[xref:...]]`/`[[tref:...]]` tags.
    pub external_spec: String,
    /// Repository URL (used for API fallback fetches and enrichment fields).
    pub url: String,
    /// Built GitHub Pages site URL, tried first by the Remote Fetcher.
    pub gh_page: String,
    /// Optional hint for where terminology files live in the remote repository.
    #[serde(default)]
    pub terms_dir: Option<String>,
    /// Optional avatar image URL shown alongside transcluded/linked terms.
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// `source.account`/`source.repo` pair identifying this project's own repository.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceInfo {
    /// Account or organization name.
    pub account: String,
    /// Repository name.
    pub repo: String,
}

/// One element of the manifest's `specs` array -- the project description for a single build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestSpec {
    /// Human-readable title, interpolated into the output HTML.
    pub title: String,
    /// Short description, interpolated into the output HTML `<meta>` tags.
    pub description: String,
    /// Author name, interpolated into the output HTML.
    pub author: String,
    /// This project's own repository identity.
    pub source: SourceInfo,
    /// Path to the authored Markdown root.
    pub spec_directory: String,
    /// Subpath of `spec_directory` containing terminology files.
    #[serde(default)]
    pub spec_terms_directory: Option<String>,
    /// Destination directory for build artifacts.
    pub output_path: String,
    /// Ordered list of Markdown paths concatenated to form the main document.
    pub markdown_paths: Vec<String>,
    /// Declared external specifications available to `xref`/`tref`.
    #[serde(default)]
    pub external_specs: Vec<ExternalSpecDescriptor>,
    /// Optional logo image path/URL.
    #[serde(default)]
    pub logo: Option<String>,
    /// Optional link target for the logo.
    #[serde(default)]
    pub logo_link: Option<String>,
    /// Optional favicon path/URL.
    #[serde(default)]
    pub favicon: Option<String>,
    /// Enables the Markdown engine's math (KaTeX) rules.
    #[serde(default)]
    pub katex: bool,
    /// Anchor symbol emitted by TOC heading anchors.
    #[serde(default)]
    pub anchor_symbol: Option<String>,
    /// CSS class hint passed through for client-side search highlighting.
    #[serde(default)]
    pub search_highlight_style: Option<String>,
}

/// The raw on-disk manifest shape: `{ "specs": [ ... ] }`.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawManifestFile {
    specs: Vec<ManifestSpec>,
}

/// The fully normalized, immutable manifest used throughout a build.
///
/// Created once per build by [`Manifest::load`] and never mutated afterwards
/// (spec.md section 3's "Lifecycles" note).
#[derive(Debug, Clone)]
pub struct Manifest {
    /// Normalized spec description (see [`ManifestSpec`]).
    pub spec: ManifestSpec,
    /// Root directory the manifest was loaded from, used to resolve relative paths.
    pub base_dir: PathBuf,
}

impl Manifest {
    /// Loads and validates the manifest rooted at `base_dir`, reading
    /// `base_dir/specs.json`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ManifestMissing`] when the file does not exist, or
    /// [`Error::ManifestInvalid`] when JSON parsing fails or `specs` is empty.
    pub fn load(base_dir: impl AsRef<Path>) -> Result<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        let manifest_path = base_dir.join(MANIFEST_FILE_NAME);
        Self::load_from_file(&manifest_path, base_dir)
    }

    /// Loads and validates a manifest from an explicit file path.
    pub fn load_from_file(manifest_path: &Path, base_dir: PathBuf) -> Result<Self> {
        if !manifest_path.is_file() {
            return Err(Error::ManifestMissing(manifest_path.display().to_string()));
        }

        let contents = fs::read_to_string(manifest_path)?;
        let raw: RawManifestFile = serde_json::from_str(&contents)
            .map_err(|e| Error::ManifestInvalid(format!("failed to parse JSON: {e}")))?;

        if raw.specs.is_empty() {
            return Err(Error::ManifestInvalid(
                "`specs` array must contain at least one entry".to_string(),
            ));
        }

        let mut spec = raw.specs.into_iter().next().expect("checked non-empty above");

        if spec.spec_terms_directory.is_none() {
            tracing::debug!(
                "manifest omitted `spec_terms_directory`; defaulting to {DEFAULT_TERMS_SUBDIRECTORY:?}"
            );
            spec.spec_terms_directory = Some(DEFAULT_TERMS_SUBDIRECTORY.to_string());
        }

        if spec.anchor_symbol.is_none() {
            spec.anchor_symbol = Some(DEFAULT_ANCHOR_SYMBOL.to_string());
        }

        spec.spec_directory = normalize_path_string(&spec.spec_directory);
        spec.output_path = normalize_path_string(&spec.output_path);

        Ok(Self { spec, base_dir })
    }

    /// Absolute path to the authored Markdown root.
    #[must_use]
    pub fn spec_directory(&self) -> PathBuf {
        self.base_dir.join(&self.spec.spec_directory)
    }

    /// Absolute path to the terminology Markdown directory.
    #[must_use]
    pub fn terms_directory(&self) -> PathBuf {
        let sub = self
            .spec
            .spec_terms_directory
            .as_deref()
            .unwrap_or(DEFAULT_TERMS_SUBDIRECTORY);
        self.spec_directory().join(sub)
    }

    /// Absolute path to the output directory.
    #[must_use]
    pub fn output_directory(&self) -> PathBuf {
        self.base_dir.join(&self.spec.output_path)
    }

    /// Absolute path to the `.cache` directory under the output directory's project root.
    #[must_use]
    pub fn cache_directory(&self) -> PathBuf {
        self.base_dir.join(".cache")
    }

    /// Looks up a declared external spec by key.
    #[must_use]
    pub fn external_spec(&self, key: &str) -> Option<&ExternalSpecDescriptor> {
        self.spec
            .external_specs
            .iter()
            .find(|s| s.external_spec == key)
    }

    /// The anchor symbol to use for TOC heading anchors.
    #[must_use]
    pub fn anchor_symbol(&self) -> &str {
        self.spec
            .anchor_symbol
            .as_deref()
            .unwrap_or(DEFAULT_ANCHOR_SYMBOL)
    }
}

/// Trims trailing separators and ensures a leading separator is present for
/// relative paths that are meant to be joined, matching spec.md section 4.1's
/// "normalizes paths" requirement.
fn normalize_path_string(raw: &str) -> String {
    let trimmed = raw.trim_end_matches(['/', '\\']);
    trimmed.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_manifest(dir: &Path, contents: &str) {
        let mut f = fs::File::create(dir.join(MANIFEST_FILE_NAME)).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
    }

    #[test]
    fn missing_manifest_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestMissing(_)));
    }

    #[test]
    fn empty_specs_array_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), r#"{"specs": []}"#);
        let err = Manifest::load(dir.path()).unwrap_err();
        assert!(matches!(err, Error::ManifestInvalid(_)));
    }

    #[test]
    fn defaults_terms_subdirectory_and_anchor_symbol() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"specs": [{
                "title": "t", "description": "d", "author": "a",
                "source": {"account": "acct", "repo": "repo"},
                "spec_directory": "spec", "output_path": "docs",
                "markdown_paths": ["index.md"]
            }]}"#,
        );
        let manifest = Manifest::load(dir.path()).unwrap();
        assert_eq!(
            manifest.spec.spec_terms_directory.as_deref(),
            Some(DEFAULT_TERMS_SUBDIRECTORY)
        );
        assert_eq!(manifest.anchor_symbol(), DEFAULT_ANCHOR_SYMBOL);
    }

    #[test]
    fn normalizes_trailing_separators() {
        assert_eq!(normalize_path_string("spec/"), "spec");
        assert_eq!(normalize_path_string("./spec"), "spec");
        assert_eq!(normalize_path_string("spec\\"), "spec");
    }

    #[test]
    fn external_spec_lookup_by_key() {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(
            dir.path(),
            r#"{"specs": [{
                "title": "t", "description": "d", "author": "a",
                "source": {"account": "acct", "repo": "repo"},
                "spec_directory": "spec", "output_path": "docs",
                "markdown_paths": [],
                "external_specs": [{"external_spec": "keri", "url": "https://github.com/x/keri", "gh_page": "https://example.com/keri/"}]
            }]}"#,
        );
        let manifest = Manifest::load(dir.path()).unwrap();
        assert!(manifest.external_spec("keri").is_some());
        assert!(manifest.external_spec("unknown").is_none());
    }
}
