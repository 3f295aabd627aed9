//! Pipeline orchestration: wires every component into the `build` and
//! `validate` operations the CLI exposes (spec.md section 6).

use std::fs;
use std::path::PathBuf;

use scraper::{Html, Selector};

use crate::collector;
use crate::emitter::{self, EmitterContext};
use crate::error::Result;
use crate::findings::FindingSink;
use crate::manifest::Manifest;
use crate::markdown;
use crate::normalizer;
use crate::postprocess;
use crate::remote::{self, EtagCache};
use crate::render::RenderContext;
use crate::scanner;
use crate::store::ReferenceStore;
use crate::validator;
use crate::vcs;

/// Everything the pipeline needs to know that it cannot discover on disk or
/// the system clock: caller-supplied so runs stay reproducible in tests
/// (spec.md section 9).
#[derive(Debug, Clone)]
pub struct BuildOptions {
    /// Directory containing `specs.json`.
    pub base_dir: PathBuf,
    /// Explicit manifest path override; defaults to `base_dir/specs.json`.
    pub manifest_path: Option<PathBuf>,
    /// Skips the Remote Fetcher entirely, relying only on the cached store.
    pub no_fetch: bool,
    /// ISO 8601 timestamp stamped onto every finding and the store's history
    /// snapshot file name.
    pub timestamp: String,
    /// Unix milliseconds, used as the history snapshot file name suffix.
    pub unix_ms: i64,
    /// Human-readable build date shown in the document footer.
    pub current_date: String,
    /// Whether to write `index.html` to the output directory. `termspec
    /// validate` (spec.md section 6) runs the same pipeline through
    /// rendering and validation but must not write this file, so it sets
    /// this to `false`.
    pub write_output: bool,
}

/// Summary of one completed build, returned to the CLI for `--format json`
/// and exit-code decisions.
#[derive(Debug, Clone)]
pub struct BuildReport {
    /// Path to the written `index.html`, or `None` when
    /// [`BuildOptions::write_output`] was `false`.
    pub output_path: Option<PathBuf>,
    /// Every finding recorded during this build, in recording order.
    pub findings: Vec<crate::findings::Finding>,
    /// Number of reference records in the persisted store after this build.
    pub reference_count: usize,
}

/// Runs a full build: load manifest, scan, collect references, optionally
/// fetch remotes, render, postprocess, validate, and emit.
///
/// # Errors
///
/// Returns an error for any fatal condition (spec.md section 6): a missing
/// or invalid manifest, or an unwritable output path. Everything else is
/// recorded as a non-fatal [`crate::findings::Finding`] in the returned
/// report.
pub async fn build(options: &BuildOptions) -> Result<BuildReport> {
    let manifest = match &options.manifest_path {
        Some(path) => Manifest::load_from_file(path, options.base_dir.clone())?,
        None => Manifest::load(&options.base_dir)?,
    };

    let mut sink = FindingSink::new();

    let mut term_files = scanner::scan_terminology_files(&manifest.terms_directory())?;
    normalize_term_files_in_place(&mut term_files)?;
    let main_content = scanner::concatenate_main_document(
        &manifest.spec_directory(),
        &manifest.spec.markdown_paths,
    )?;

    let cache_dir = manifest.cache_directory();
    let mut store = ReferenceStore::load(&cache_dir.join(crate::store::STORE_JSON_FILE_NAME))?;
    write_term_index(&cache_dir, &term_files)?;

    // The main document content is scanned for xref/tref too, but isn't itself
    // a `MarkdownFile` on disk in the same sense (it's the concatenation of
    // `markdown_paths`); feed it through the same scan by wrapping it. Both are
    // collected in a single pass so the prune step (spec.md section 4.6 step 2)
    // sees every currently-live reference at once -- pruning against only a
    // subset of files would incorrectly drop records mentioned solely in the
    // other subset.
    let mut combined_files: Vec<scanner::MarkdownFile> = term_files.clone();
    combined_files.push(scanner::MarkdownFile {
        relative_path: "(main document)".to_string(),
        absolute_path: manifest.spec_directory(),
        content: main_content.clone(),
    });
    collector::collect(&manifest, &combined_files, &mut store, &mut sink, &options.timestamp);

    if !options.no_fetch {
        let descriptors = manifest
            .spec
            .external_specs
            .iter()
            .map(|d| (d.external_spec.clone(), d.clone()))
            .collect();
        let client = reqwest::Client::builder()
            .user_agent("termspec/0.1")
            .build()?;
        let mut etag_cache = EtagCache::new();
        remote::fetch_and_enrich(
            &client,
            &descriptors,
            &mut etag_cache,
            &mut store,
            &mut sink,
            &options.timestamp,
            &cache_dir,
            options.unix_ms,
        )
        .await;
    }

    store.persist(&cache_dir, options.unix_ms)?;

    let known_specs: std::collections::HashSet<String> = manifest
        .spec
        .external_specs
        .iter()
        .map(|d| d.external_spec.clone())
        .collect();
    let mut ctx = RenderContext::with_known_specs(&store, known_specs);
    let main_html = markdown::render_document(&main_content, &mut ctx, "(main document)")?;

    let mut definitions_html = String::new();
    for file in &term_files {
        definitions_html.push_str(&markdown::render_document(
            &file.content,
            &mut ctx,
            &file.relative_path,
        )?);
    }

    let combined_body = format!(
        r#"{main_html}<div id="terminology-section-start"></div>{definitions_html}"#
    );
    let postprocessed_body = postprocess::reunify_definition_lists(&combined_body);

    validator::validate(
        &postprocessed_body,
        &ctx.definitions,
        &ctx.references,
        &mut sink,
        &options.timestamp,
    );

    let toc = build_toc(&postprocessed_body, manifest.anchor_symbol());
    let xtrefs_data = store.to_js_snapshot()?;
    let branch = vcs::current_branch(&manifest.base_dir);

    let emitter_ctx = EmitterContext {
        render: &postprocessed_body,
        toc: &toc,
        xtrefs_data: &xtrefs_data,
        assets_head: "",
        assets_body: "",
        assets_svg: "",
        current_date: &options.current_date,
        universal_timestamp: &options.timestamp,
        branch: &branch,
    };

    let output_path = if options.write_output {
        let html = emitter::render_document(emitter::DEFAULT_TEMPLATE, &manifest, &emitter_ctx);
        Some(emitter::write_output(&manifest.output_directory(), &html)?)
    } else {
        None
    };

    write_console_messages(&cache_dir, &sink, &options.timestamp)?;

    Ok(BuildReport {
        output_path,
        findings: sink.findings().to_vec(),
        reference_count: store.len(),
    })
}

/// Runs only the scan/collect/render/validate stages and reports findings,
/// without fetching remotes or writing any output (spec.md section 6's
/// `validate` subcommand).
///
/// # Errors
///
/// Returns an error for a missing or invalid manifest.
pub async fn validate_only(options: &BuildOptions) -> Result<Vec<crate::findings::Finding>> {
    let mut fetch_options = options.clone();
    fetch_options.no_fetch = true;
    fetch_options.write_output = false;
    let report = build(&fetch_options).await?;
    Ok(report.findings)
}

/// Applies the Normalizer (spec.md section 4.3) to every scanned terminology
/// file, rewriting the file on disk when normalization changes it ("operates
/// on terminology files in place") and updating the in-memory content so the
/// rest of the pipeline parses the normalized form.
fn normalize_term_files_in_place(term_files: &mut [scanner::MarkdownFile]) -> Result<()> {
    for file in term_files.iter_mut() {
        let normalized = normalizer::normalize(&file.content);
        if normalized != file.content {
            fs::write(&file.absolute_path, &normalized)?;
        }
        file.content = normalized;
    }
    Ok(())
}

/// Writes `term-index.json`: the list of terminology-file relative paths
/// scanned for this build, kept as a diagnostics aid (spec.md section 6).
fn write_term_index(cache_dir: &std::path::Path, term_files: &[scanner::MarkdownFile]) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let paths: Vec<&str> = term_files.iter().map(|f| f.relative_path.as_str()).collect();
    let json = serde_json::to_string_pretty(&paths)?;
    let tmp_path = cache_dir.join("term-index.json.tmp");
    let final_path = cache_dir.join("term-index.json");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}

fn heading_selector() -> Selector {
    Selector::parse("h1[id], h2[id], h3[id]").expect("static selector")
}

/// Builds a flat table of contents from every `id`-bearing heading in the
/// rendered body. Each entry's anchor carries the manifest's configured
/// `anchorSymbol` (spec.md section 4.1), so a reader can see which headings
/// are directly linkable.
fn build_toc(body_html: &str, anchor_symbol: &str) -> String {
    let document = Html::parse_fragment(body_html);
    let mut out = String::from("<ul>");
    for heading in document.select(&heading_selector()) {
        let id = heading.value().attr("id").unwrap_or_default();
        let level = heading.value().name();
        let text = heading.text().collect::<String>();
        out.push_str(&format!(
            r#"<li class="toc-{level}"><a class="toc-anchor" href="#{id}">{anchor_symbol}</a> <a href="#{id}">{text}</a></li>"#
        ));
    }
    out.push_str("</ul>");
    out
}

fn write_console_messages(cache_dir: &std::path::Path, sink: &FindingSink, timestamp: &str) -> Result<()> {
    fs::create_dir_all(cache_dir)?;
    let snapshot = sink.to_snapshot(timestamp);
    let json = serde_json::to_string_pretty(&snapshot)?;
    let tmp_path = cache_dir.join("console-messages.json.tmp");
    let final_path = cache_dir.join("console-messages.json");
    fs::write(&tmp_path, json)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(())
}
