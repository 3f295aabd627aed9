//! The persistent reference store (spec.md sections 3, 4.6, 4.8).
//!
//! Modelled as a mapping from `(externalSpec, term)` to [`ReferenceRecord`]
//! with stable iteration order for serialization (spec.md section 9). Owns
//! the merge rules that keep the "exactly one record per key" invariant, the
//! garbage-collection pass, and the two on-disk serialization forms (JSON and
//! the `const allXTrefs = ...;` JS snapshot).

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::tag::TerminologyTag;
use crate::types::{ReferenceRecord, ReferenceType, SourceFileEntry};

/// Canonical JSON cache file name (spec.md section 6).
pub const STORE_JSON_FILE_NAME: &str = "xtrefs-data.json";
/// Client-consumable JS cache file name.
pub const STORE_JS_FILE_NAME: &str = "xtrefs-data.js";
/// History snapshot subdirectory name.
pub const STORE_HISTORY_DIR_NAME: &str = "xtrefs-history";

/// The persistent, keyed collection of enriched references.
///
/// Uses a [`BTreeMap`] keyed by `(external_spec, term)` so iteration -- and
/// therefore serialization -- is always sorted, satisfying spec.md section
/// 4.8's "records sorted by `(externalSpec, term)`" requirement without a
/// separate sort step.
#[derive(Debug, Clone, Default)]
pub struct ReferenceStore {
    records: BTreeMap<(String, String), ReferenceRecord>,
}

/// On-disk shape of the canonical JSON store.
#[derive(Debug, Serialize, Deserialize)]
struct StoreDocument {
    xtrefs: Vec<ReferenceRecord>,
}

impl ReferenceStore {
    /// An empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads a previously-persisted store from `path`, or returns an empty
    /// store if the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be parsed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)?;
        let doc: StoreDocument = serde_json::from_str(&contents)?;
        let mut records = BTreeMap::new();
        for record in doc.xtrefs {
            records.insert(record.key(), record);
        }
        Ok(Self { records })
    }

    /// Number of records currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the store holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records in canonical `(externalSpec, term)` order.
    pub fn records(&self) -> impl Iterator<Item = &ReferenceRecord> {
        self.records.values()
    }

    /// Looks up a record by key.
    #[must_use]
    pub fn get(&self, external_spec: &str, term: &str) -> Option<&ReferenceRecord> {
        self.records
            .get(&(external_spec.to_string(), term.to_string()))
    }

    /// Mutable lookup, for the Remote Fetcher's enrichment pass.
    pub fn get_mut(&mut self, external_spec: &str, term: &str) -> Option<&mut ReferenceRecord> {
        self.records
            .get_mut(&(external_spec.to_string(), term.to_string()))
    }

    /// Applies the spec.md section 3 merge rules for one discovered tag in one
    /// source file, inserting a new record if none exists yet.
    pub fn observe(&mut self, file: &str, tag: &TerminologyTag) {
        match tag {
            TerminologyTag::Xref {
                external_spec,
                term,
                alias,
            } => self.observe_xref(file, external_spec, term, alias.clone()),
            TerminologyTag::Tref {
                external_spec,
                term,
                aliases,
            } => self.observe_tref(file, external_spec, term, aliases),
            TerminologyTag::Def { .. } | TerminologyTag::Ref { .. } | TerminologyTag::Iref { .. } => {}
        }
    }

    fn observe_xref(&mut self, file: &str, external_spec: &str, term: &str, alias: Option<String>) {
        let key = (external_spec.to_string(), term.to_string());
        let record = self
            .records
            .entry(key)
            .or_insert_with(|| ReferenceRecord::new(external_spec, term));

        push_source_file(record, file, ReferenceType::Xref);

        // Rule 2: a tref record re-observed as xref keeps its tref data; only the
        // xref alias list is recorded.
        if let Some(alias) = alias {
            if !record.xref_aliases.contains(&alias) {
                record.xref_aliases.push(alias);
            }
        } else {
            record.xref_aliases.clear();
        }
        record.first_xref_alias = record.xref_aliases.first().cloned();
        record.source = Some(ReferenceType::Xref);
    }

    fn observe_tref(&mut self, file: &str, external_spec: &str, term: &str, aliases: &[String]) {
        let key = (external_spec.to_string(), term.to_string());
        let record = self
            .records
            .entry(key)
            .or_insert_with(|| ReferenceRecord::new(external_spec, term));

        push_source_file(record, file, ReferenceType::Tref);

        // Rule 3: re-observed as tref, alias arrays are replaced wholesale.
        record.tref_aliases = aliases.to_vec();
        record.first_tref_alias = record.tref_aliases.first().cloned();
        record.source = Some(ReferenceType::Tref);
    }

    /// Removes every record whose key is not mentioned by any of `contents`
    /// (spec.md section 4.6 step 2 / section 9's documented blind spot: the
    /// membership test is a whitespace-tolerant regex, not a real parse, so a
    /// term mentioned only inside a fenced code block is incorrectly retained
    /// -- this is preserved intentionally).
    pub fn prune(&mut self, contents: &[String]) {
        self.records
            .retain(|(external_spec, term), _| is_still_referenced(contents, external_spec, term));
    }

    /// Serializes the store to its canonical JSON form.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String> {
        let doc = StoreDocument {
            xtrefs: self.records.values().cloned().collect(),
        };
        Ok(serde_json::to_string_pretty(&doc)?)
    }

    /// Serializes the store as the client-consumable `const allXTrefs = ...;`
    /// JavaScript assignment (spec.md section 4.8). The core treats this as an
    /// inert serialization and never re-parses it (spec.md section 9).
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_js_snapshot(&self) -> Result<String> {
        Ok(format!("const allXTrefs = {};\n", self.to_json()?))
    }

    /// Persists the store to `cache_dir`: the canonical JSON file, the JS
    /// snapshot, and a timestamped history copy of the JS snapshot.
    ///
    /// # Errors
    ///
    /// Returns an error if any write fails.
    pub fn persist(&self, cache_dir: &Path, unix_ms: i64) -> Result<()> {
        fs::create_dir_all(cache_dir)?;

        let json = self.to_json()?;
        atomic_write(&cache_dir.join(STORE_JSON_FILE_NAME), json.as_bytes())?;

        let js = self.to_js_snapshot()?;
        atomic_write(&cache_dir.join(STORE_JS_FILE_NAME), js.as_bytes())?;

        let history_dir = cache_dir.join(STORE_HISTORY_DIR_NAME);
        fs::create_dir_all(&history_dir)?;
        let history_path = history_dir.join(format!("xtrefs-data-{unix_ms}.js"));
        atomic_write(&history_path, js.as_bytes())?;

        Ok(())
    }
}

fn push_source_file(record: &mut ReferenceRecord, file: &str, reference_type: ReferenceType) {
    let entry = SourceFileEntry {
        file: file.to_string(),
        reference_type,
    };
    if !record.source_files.contains(&entry) {
        record.source_files.push(entry);
    }
}

/// Whitespace-tolerant, regex-based membership test mirroring the original
/// tool's pruning behavior (spec.md sections 4.6, 9). Matches either
/// `[[xref: spec, term ...]]` or `[[tref: spec, term ...]]`, case-sensitively,
/// anchored on `external_spec` and `term` but tolerant of surrounding
/// whitespace and trailing alias arguments.
fn is_still_referenced(contents: &[String], external_spec: &str, term: &str) -> bool {
    let pattern = format!(
        r"\[\[\s*(?:xref|tref)\s*:\s*{}\s*,\s*{}\s*(?:,|\])",
        regex::escape(external_spec),
        regex::escape(term)
    );
    let re = match Regex::new(&pattern) {
        Ok(re) => re,
        Err(_) => return true, // fail open: never silently drop a record on a regex bug
    };
    contents.iter().any(|content| re.is_match(content))
}

fn atomic_write(path: &PathBuf, bytes: &[u8]) -> Result<()> {
    let tmp_path = path.with_extension("tmp");
    fs::write(&tmp_path, bytes)?;
    fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tag::parse_tag_body;

    #[test]
    fn xref_then_tref_merge_preserves_tref_priority() {
        let mut store = ReferenceStore::new();
        let tref = parse_tag_body("tref: spec, t, a1, a2").unwrap();
        store.observe("f1.md", &tref);

        let xref = parse_tag_body("xref: spec, t").unwrap();
        store.observe("f2.md", &xref);

        let record = store.get("spec", "t").unwrap();
        assert_eq!(record.tref_aliases, vec!["a1".to_string(), "a2".to_string()]);
        assert_eq!(record.first_tref_alias, Some("a1".to_string()));
        assert!(record.xref_aliases.is_empty());
        assert_eq!(record.source_files.len(), 2);
        assert_eq!(record.source_files[0].file, "f1.md");
        assert_eq!(record.source_files[1].file, "f2.md");
    }

    #[test]
    fn re_observed_tref_replaces_alias_list_and_drops_missing_aliases() {
        let mut store = ReferenceStore::new();
        store.observe("f1.md", &parse_tag_body("tref: spec, t, a1, a2").unwrap());
        store.observe("f1.md", &parse_tag_body("tref: spec, t").unwrap());

        let record = store.get("spec", "t").unwrap();
        assert!(record.tref_aliases.is_empty());
        assert!(record.first_tref_alias.is_none());
    }

    #[test]
    fn duplicate_file_type_pair_not_repeated() {
        let mut store = ReferenceStore::new();
        store.observe("f1.md", &parse_tag_body("xref: spec, t").unwrap());
        store.observe("f1.md", &parse_tag_body("xref: spec, t").unwrap());
        assert_eq!(store.get("spec", "t").unwrap().source_files.len(), 1);
    }

    #[test]
    fn prune_removes_unreferenced_and_keeps_fresh() {
        let mut store = ReferenceStore::new();
        store.observe("gone.md", &parse_tag_body("xref: ext, gone").unwrap());

        let live_content = vec!["[[xref: ext, fresh]]".to_string()];
        store.observe("fresh.md", &parse_tag_body("xref: ext, fresh").unwrap());

        store.prune(&live_content);

        assert!(store.get("ext", "gone").is_none());
        assert!(store.get("ext", "fresh").is_some());
    }

    #[test]
    fn json_round_trips_through_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = ReferenceStore::new();
        store.observe("f.md", &parse_tag_body("xref: spec, t, alias").unwrap());
        store.persist(dir.path(), 1_700_000_000_000).unwrap();

        let reloaded = ReferenceStore::load(&dir.path().join(STORE_JSON_FILE_NAME)).unwrap();
        assert_eq!(reloaded.len(), 1);
        assert_eq!(reloaded.get("spec", "t").unwrap().first_xref_alias.as_deref(), Some("alias"));
    }

    #[test]
    fn js_snapshot_is_a_const_assignment() {
        let store = ReferenceStore::new();
        let js = store.to_js_snapshot().unwrap();
        assert!(js.starts_with("const allXTrefs = "));
        assert!(js.trim_end().ends_with(';'));
    }

    #[test]
    fn load_missing_file_is_empty_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = ReferenceStore::load(&dir.path().join("missing.json")).unwrap();
        assert!(store.is_empty());
    }
}
