//! Emitter (spec.md section 4.13).
//!
//! Interpolates the rendered body and the project's metadata into the HTML
//! document template and writes the result atomically to
//! `<outputPath>/index.html`, alongside the reference store's cache files
//! (written separately by `store.rs`) and `console-messages.json`. The
//! write-to-temp-then-rename pattern mirrors `blz-core`'s storage layer.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::manifest::Manifest;

/// The built-in document template, used unless the manifest/CLI overrides it.
pub const DEFAULT_TEMPLATE: &str = include_str!("../templates/default.html");

/// Values interpolated into the template (spec.md section 4.13).
#[derive(Debug, Clone)]
pub struct EmitterContext<'a> {
    /// The rendered, postprocessed document body.
    pub render: &'a str,
    /// The serialized table of contents fragment.
    pub toc: &'a str,
    /// The `const allXTrefs = ...;` JS snapshot, inlined for client-side search.
    pub xtrefs_data: &'a str,
    /// Extra `<head>` markup (stylesheet links, KaTeX, favicon).
    pub assets_head: &'a str,
    /// Extra markup injected just before `</body>`.
    pub assets_body: &'a str,
    /// Inline SVG sprite sheet markup.
    pub assets_svg: &'a str,
    /// Caller-supplied current date string (spec.md section 9: no system-clock reads
    /// inside the library), used for the "last built" footer line.
    pub current_date: &'a str,
    /// Caller-supplied ISO 8601 timestamp, embedded for client-side cache busting.
    pub universal_timestamp: &'a str,
    /// The current branch of this project's own repository (spec.md section
    /// 4.6 step 5), used to complete the `account,repo,branch` CSV embedded
    /// in the `spec-up-t:github-repo-info` meta tag (spec.md section 6).
    pub branch: &'a str,
}

/// Renders the final HTML document by interpolating `ctx` and the manifest's
/// project metadata into `template`.
#[must_use]
pub fn render_document(template: &str, manifest: &Manifest, ctx: &EmitterContext<'_>) -> String {
    // spec.md section 4.13: "githubRepoInfo (a three-element CSV `account,repo,branch`)".
    let github_repo_info = format!(
        "{},{},{}",
        manifest.spec.source.account, manifest.spec.source.repo, ctx.branch
    );
    let repo_url = format!(
        "https://github.com/{}/{}",
        manifest.spec.source.account, manifest.spec.source.repo
    );

    template
        .replace("{{title}}", &manifest.spec.title)
        .replace("{{description}}", &manifest.spec.description)
        .replace("{{author}}", &manifest.spec.author)
        .replace("{{toc}}", ctx.toc)
        .replace("{{render}}", ctx.render)
        .replace("{{xtrefsData}}", ctx.xtrefs_data)
        .replace("{{assetsHead}}", ctx.assets_head)
        .replace("{{assetsBody}}", ctx.assets_body)
        .replace("{{assetsSvg}}", ctx.assets_svg)
        .replace("{{repoUrl}}", &repo_url)
        .replace("{{currentDate}}", ctx.current_date)
        .replace("{{universalTimestamp}}", ctx.universal_timestamp)
        .replace("{{githubRepoInfo}}", &github_repo_info)
        .replace("{{logo}}", manifest.spec.logo.as_deref().unwrap_or_default())
        .replace(
            "{{favicon}}",
            manifest.spec.favicon.as_deref().unwrap_or_default(),
        )
}

/// Writes `html` to `<outputPath>/index.html`, creating the output directory
/// if necessary, via write-to-temp-then-rename.
///
/// # Errors
///
/// Returns [`crate::error::Error::OutputPathUnwritable`] if the output
/// directory cannot be created, or an IO error if the write/rename fails.
pub fn write_output(output_dir: &Path, html: &str) -> Result<PathBuf> {
    fs::create_dir_all(output_dir).map_err(|e| {
        crate::error::Error::OutputPathUnwritable(format!(
            "{}: {e}",
            output_dir.display()
        ))
    })?;

    let final_path = output_dir.join("index.html");
    let tmp_path = output_dir.join("index.html.tmp");
    fs::write(&tmp_path, html)?;
    fs::rename(&tmp_path, &final_path)?;
    Ok(final_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::{Manifest, ManifestSpec, SourceInfo};

    fn manifest() -> Manifest {
        Manifest {
            spec: ManifestSpec {
                title: "My Spec".to_string(),
                description: "A description".to_string(),
                author: "An Author".to_string(),
                source: SourceInfo { account: "acct".to_string(), repo: "repo".to_string() },
                spec_directory: "spec".to_string(),
                spec_terms_directory: Some("terms".to_string()),
                output_path: "docs".to_string(),
                markdown_paths: vec![],
                external_specs: vec![],
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

    #[test]
    fn interpolates_title_and_body() {
        let manifest = manifest();
        let ctx = EmitterContext {
            render: "<p>body</p>",
            toc: "<nav></nav>",
            xtrefs_data: "const allXTrefs = [];",
            assets_head: "",
            assets_body: "",
            assets_svg: "",
            current_date: "2026-07-28",
            universal_timestamp: "2026-07-28T00:00:00Z",
            branch: "main",
        };
        let template = "<title>{{title}}</title><body>{{render}}</body>";
        let html = render_document(template, &manifest, &ctx);
        assert!(html.contains("<title>My Spec</title>"));
        assert!(html.contains("<p>body</p>"));
    }

    #[test]
    fn github_repo_info_is_account_repo_branch_csv() {
        let manifest = manifest();
        let ctx = EmitterContext {
            render: "",
            toc: "",
            xtrefs_data: "",
            assets_head: "",
            assets_body: "",
            assets_svg: "",
            current_date: "",
            universal_timestamp: "",
            branch: "main",
        };
        let html = render_document("{{githubRepoInfo}}", &manifest, &ctx);
        assert_eq!(html, "acct,repo,main");
    }

    #[test]
    fn repo_url_is_derived_from_source() {
        let manifest = manifest();
        let ctx = EmitterContext {
            render: "",
            toc: "",
            xtrefs_data: "",
            assets_head: "",
            assets_body: "",
            assets_svg: "",
            current_date: "",
            universal_timestamp: "",
            branch: "main",
        };
        let html = render_document("{{repoUrl}}", &manifest, &ctx);
        assert_eq!(html, "https://github.com/acct/repo");
    }

    #[test]
    fn writes_index_html_atomically() {
        let dir = tempfile::tempdir().unwrap();
        let output_dir = dir.path().join("docs");
        let path = write_output(&output_dir, "<html></html>").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "<html></html>");
        assert!(!output_dir.join("index.html.tmp").exists());
    }
}
