//! Markdown file discovery (spec.md section 4.2).

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::Result;

/// One discovered Markdown file: its path relative to the terminology
/// directory, and its UTF-8 content.
#[derive(Debug, Clone)]
pub struct MarkdownFile {
    /// Path relative to the directory that was scanned (used as provenance
    /// in `ReferenceRecord.source_files` and `LocalDefinition.source_file`).
    pub relative_path: String,
    /// Absolute path on disk, for error messages.
    pub absolute_path: PathBuf,
    /// Raw UTF-8 file content.
    pub content: String,
}

/// Recursively walks `dir`, yielding every `.md` file whose name does not
/// start with `_`, in lexical directory order (spec.md section 4.2).
///
/// # Errors
///
/// Returns an error if the directory cannot be read or a file is not valid UTF-8.
pub fn scan_terminology_files(dir: &Path) -> Result<Vec<MarkdownFile>> {
    let mut files = Vec::new();
    if dir.is_dir() {
        walk(dir, dir, &mut files)?;
    }
    files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(files)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<MarkdownFile>) -> Result<()> {
    let mut entries: Vec<_> = fs::read_dir(dir)?.collect::<std::io::Result<_>>()?;
    entries.sort_by_key(std::fs::DirEntry::file_name);

    for entry in entries {
        let path = entry.path();
        if path.is_dir() {
            walk(root, &path, out)?;
            continue;
        }

        let file_name = match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => name,
            None => continue,
        };

        if !file_name.ends_with(".md") || file_name.starts_with('_') {
            continue;
        }

        let content = fs::read_to_string(&path)?;
        let relative_path = path
            .strip_prefix(root)
            .unwrap_or(&path)
            .to_string_lossy()
            .replace('\\', "/");

        out.push(MarkdownFile {
            relative_path,
            absolute_path: path,
            content,
        });
    }
    Ok(())
}

/// Concatenates the declared `markdown_paths` (resolved relative to
/// `spec_directory`) in manifest order to form the main document source.
///
/// # Errors
///
/// Returns an error if any declared path cannot be read.
pub fn concatenate_main_document(spec_directory: &Path, markdown_paths: &[String]) -> Result<String> {
    let mut combined = String::new();
    for path in markdown_paths {
        let content = fs::read_to_string(spec_directory.join(path))?;
        if !combined.is_empty() {
            combined.push('\n');
        }
        combined.push_str(&content);
    }
    Ok(combined)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};

    #[test]
    fn skips_non_markdown_and_underscore_prefixed_files() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path().join("term-a.md"), "a").unwrap();
        write(dir.path().join("_draft.md"), "draft").unwrap();
        write(dir.path().join("notes.txt"), "notes").unwrap();

        let files = scan_terminology_files(dir.path()).unwrap();
        assert_eq!(files.len(), 1);
        assert_eq!(files[0].relative_path, "term-a.md");
    }

    #[test]
    fn recurses_into_subdirectories_in_lexical_order() {
        let dir = tempfile::tempdir().unwrap();
        create_dir_all(dir.path().join("sub")).unwrap();
        write(dir.path().join("b.md"), "b").unwrap();
        write(dir.path().join("sub/a.md"), "a").unwrap();

        let files = scan_terminology_files(dir.path()).unwrap();
        let paths: Vec<_> = files.iter().map(|f| f.relative_path.clone()).collect();
        assert_eq!(paths, vec!["b.md".to_string(), "sub/a.md".to_string()]);
    }

    #[test]
    fn missing_directory_yields_empty_list() {
        let dir = tempfile::tempdir().unwrap();
        let files = scan_terminology_files(&dir.path().join("does-not-exist")).unwrap();
        assert!(files.is_empty());
    }
}
