//! Minimal local source-control introspection (spec.md section 4.6 step 5).
//!
//! The Reference Collector enriches each record with the current branch of
//! *this* project (not the remote spec) by consulting the local
//! `.git/HEAD` file, defaulting to `"main"` when the information is
//! unavailable, so a full VCS library is not warranted here -- `.git/HEAD`
//! is read directly rather than shelling out to `git`.

use std::fs;
use std::path::Path;

/// Default branch name used when the local `.git/HEAD` cannot be read or
/// does not point at a named branch (e.g. a detached checkout).
pub const DEFAULT_BRANCH: &str = "main";

/// Resolves the current branch name for the repository rooted at
/// `project_dir`, falling back to [`DEFAULT_BRANCH`] when `.git/HEAD` is
/// absent, unreadable, or not a symbolic ref.
#[must_use]
pub fn current_branch(project_dir: &Path) -> String {
    read_head_branch(project_dir).unwrap_or_else(|| DEFAULT_BRANCH.to_string())
}

fn read_head_branch(project_dir: &Path) -> Option<String> {
    let head_path = find_git_dir(project_dir)?.join("HEAD");
    let contents = fs::read_to_string(head_path).ok()?;
    let line = contents.trim();
    line.strip_prefix("ref: refs/heads/")
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

/// Walks upward from `start` looking for a `.git` directory, mirroring how
/// Git itself locates the repository root from a subdirectory.
fn find_git_dir(start: &Path) -> Option<std::path::PathBuf> {
    let mut dir = Some(start);
    while let Some(candidate) = dir {
        let git_dir = candidate.join(".git");
        if git_dir.is_dir() {
            return Some(git_dir);
        }
        dir = candidate.parent();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{create_dir_all, write};

    #[test]
    fn defaults_to_main_without_a_git_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(current_branch(dir.path()), "main");
    }

    #[test]
    fn reads_branch_name_from_head() {
        let dir = tempfile::tempdir().unwrap();
        create_dir_all(dir.path().join(".git")).unwrap();
        write(dir.path().join(".git/HEAD"), "ref: refs/heads/develop\n").unwrap();
        assert_eq!(current_branch(dir.path()), "develop");
    }

    #[test]
    fn detached_head_falls_back_to_default() {
        let dir = tempfile::tempdir().unwrap();
        create_dir_all(dir.path().join(".git")).unwrap();
        write(dir.path().join(".git/HEAD"), "abcdef0123456789\n").unwrap();
        assert_eq!(current_branch(dir.path()), "main");
    }
}
