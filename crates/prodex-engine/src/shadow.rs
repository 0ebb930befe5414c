//! The scratch copy of the source tree used in CHECK mode, and the diff
//! against the original.

use crate::config::glob_set;
use crate::error::{PlanError, Result};
use globset::GlobSet;
use prodex_core::ROOT_DESCRIPTOR;
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

/// Scratch directory relative to the source tree
pub const SCRATCH_DIR: &str = "target/prodex-check";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Change {
    /// Present only in the computed tree
    Added,
    /// Present only in the source tree
    Removed,
    Modified,
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Change::Added => "Added",
            Change::Removed => "Removed",
            Change::Modified => "Modified",
        };
        write!(f, "{}", s)
    }
}

/// One file differing between the source tree and the computed tree
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileDiff {
    /// Relative unix path
    pub path: String,
    pub change: Change,
    /// Changed lines prefixed with `-` (source) or `+` (computed)
    pub lines: Vec<String>,
}

/// Human readable listing of `diffs`
pub fn format_report(diffs: &[FileDiff]) -> String {
    let mut out = String::new();
    for diff in diffs {
        out.push_str(&format!("{} {}\n", diff.change, diff.path));
        for line in &diff.lines {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

pub struct ShadowTree {
    source: PathBuf,
    root: PathBuf,
    auxiliary: GlobSet,
}

impl ShadowTree {
    /// Copy the descriptors and auxiliary files of `source` into a fresh scratch directory
    pub fn stage(source: &Path, auxiliary_globs: &[String]) -> Result<Self> {
        let shadow = Self {
            source: source.to_path_buf(),
            root: source.join(SCRATCH_DIR),
            auxiliary: glob_set(auxiliary_globs)?,
        };
        if shadow.root.exists() {
            std::fs::remove_dir_all(&shadow.root).map_err(|e| PlanError::io(&shadow.root, e))?;
        }
        let files = shadow.tracked_files(&shadow.source)?;
        for relative in &files {
            let from = shadow.source.join(relative);
            let to = shadow.root.join(relative);
            if let Some(dir) = to.parent() {
                std::fs::create_dir_all(dir).map_err(|e| PlanError::io(dir, e))?;
            }
            std::fs::copy(&from, &to).map_err(|e| PlanError::io(&from, e))?;
        }
        debug!("Staged {} file(s) in {}", files.len(), shadow.root.display());
        Ok(shadow)
    }

    /// Root of the scratch tree
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Files of the source tree that differ from the scratch tree, by path
    pub fn diff(&self) -> Result<Vec<FileDiff>> {
        let mut paths = self.tracked_files(&self.source)?;
        paths.extend(self.tracked_files(&self.root)?);

        let mut diffs = Vec::new();
        for path in paths {
            let before = read_optional(&self.source.join(&path))?;
            let after = read_optional(&self.root.join(&path))?;
            let diff = match (before, after) {
                (Some(before), Some(after)) if before == after => continue,
                (Some(before), Some(after)) => FileDiff {
                    path,
                    change: Change::Modified,
                    lines: line_diff(&before, &after),
                },
                (None, Some(after)) => FileDiff {
                    path,
                    change: Change::Added,
                    lines: after.lines().map(|l| format!("+{}", l)).collect(),
                },
                (Some(before), None) => FileDiff {
                    path,
                    change: Change::Removed,
                    lines: before.lines().map(|l| format!("-{}", l)).collect(),
                },
                (None, None) => continue,
            };
            diffs.push(diff);
        }
        Ok(diffs)
    }

    /// Relative unix paths of descriptors and auxiliary files below `root`
    fn tracked_files(&self, root: &Path) -> Result<BTreeSet<String>> {
        let mut files = BTreeSet::new();
        let walker = WalkDir::new(root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));
        for entry in walker {
            let entry = entry.map_err(|e| {
                PlanError::io(
                    root,
                    e.into_io_error()
                        .unwrap_or_else(|| std::io::Error::other("directory walk failed")),
                )
            })?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Ok(relative) = entry.path().strip_prefix(root) else {
                continue;
            };
            if entry.file_name() == ROOT_DESCRIPTOR || self.auxiliary.is_match(relative) {
                files.insert(relative.to_string_lossy().replace('\\', "/"));
            }
        }
        Ok(files)
    }
}

/// Build output and hidden directories are never part of the tree
fn is_skipped_dir(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    entry.file_type().is_dir() && (name == "target" || name.starts_with('.'))
}

fn read_optional(path: &Path) -> Result<Option<String>> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(Some(content)),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(PlanError::io(path, e)),
    }
}

/// Largest LCS table [`line_diff`] builds for the changed middle of a file
pub const MAX_DIFF_CELLS: usize = 4_000_000;

/// Changed lines between `before` and `after`, in order of appearance.
///
/// When the changed region is too large to align, it is reported as removed
/// then added as a whole.
pub fn line_diff(before: &str, after: &str) -> Vec<String> {
    let old: Vec<&str> = before.lines().collect();
    let new: Vec<&str> = after.lines().collect();

    let prefix = old.iter().zip(&new).take_while(|(a, b)| a == b).count();
    let suffix = old[prefix..]
        .iter()
        .rev()
        .zip(new[prefix..].iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    let old = &old[prefix..old.len() - suffix];
    let new = &new[prefix..new.len() - suffix];

    if old.len().saturating_mul(new.len()) > MAX_DIFF_CELLS {
        let removed = old.iter().map(|line| format!("-{}", line));
        let added = new.iter().map(|line| format!("+{}", line));
        return removed.chain(added).collect();
    }

    // lcs[i][j]: longest common subsequence of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut lines = Vec::new();
    let (mut i, mut j) = (0, 0);
    while i < old.len() || j < new.len() {
        if i < old.len() && j < new.len() && old[i] == new[j] {
            i += 1;
            j += 1;
        } else if j < new.len() && (i == old.len() || lcs[i][j + 1] >= lcs[i + 1][j]) {
            lines.push(format!("+{}", new[j]));
            j += 1;
        } else {
            lines.push(format!("-{}", old[i]));
            i += 1;
        }
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn changed_lines_only() {
        let before = "a\nb\nc\nd\n";
        let after = "a\nB\nc\nd\ne\n";
        assert_eq!(line_diff(before, after), vec!["+B", "-b", "+e"]);
        assert!(line_diff(before, before).is_empty());
    }

    #[test]
    fn oversized_change_is_reported_whole() {
        let old: String = (0..2_500).map(|i| format!("old {}\n", i)).collect();
        let new: String = (0..2_500).map(|i| format!("new {}\n", i)).collect();
        let before = format!("head\n{}tail\n", old);
        let after = format!("head\n{}tail\n", new);

        let lines = line_diff(&before, &after);
        assert_eq!(lines.len(), 5_000);
        assert_eq!(lines[0], "-old 0");
        assert_eq!(lines[2_499], "-old 2499");
        assert_eq!(lines[2_500], "+new 0");
        assert_eq!(lines[4_999], "+new 2499");
    }

    #[test]
    fn stage_and_diff() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("ext/target")).unwrap();
        std::fs::create_dir_all(root.join(".git")).unwrap();
        std::fs::write(root.join("pom.xml"), "<project/>\n").unwrap();
        std::fs::write(root.join("ext/pom.xml"), "<project>\n</project>\n").unwrap();
        std::fs::write(root.join("ext/target/pom.xml"), "ignored").unwrap();
        std::fs::write(root.join(".git/pom.xml"), "ignored").unwrap();
        std::fs::write(root.join("Jenkinsfile"), "stages\n").unwrap();
        std::fs::write(root.join("README.md"), "not tracked").unwrap();

        let shadow = ShadowTree::stage(root, &["Jenkinsfile".to_string()]).unwrap();
        assert!(shadow.root().join("ext/pom.xml").is_file());
        assert!(shadow.root().join("Jenkinsfile").is_file());
        assert!(!shadow.root().join("README.md").exists());
        assert!(!shadow.root().join("ext/target").exists());
        assert!(shadow.diff().unwrap().is_empty());

        std::fs::write(shadow.root().join("ext/pom.xml"), "<project>\n  <x/>\n</project>\n").unwrap();
        std::fs::create_dir_all(shadow.root().join("new")).unwrap();
        std::fs::write(shadow.root().join("new/pom.xml"), "<project/>\n").unwrap();
        std::fs::remove_file(shadow.root().join("Jenkinsfile")).unwrap();

        let diffs = shadow.diff().unwrap();
        let summary: Vec<(&str, Change)> = diffs.iter().map(|d| (d.path.as_str(), d.change)).collect();
        assert_eq!(
            summary,
            vec![
                ("Jenkinsfile", Change::Removed),
                ("ext/pom.xml", Change::Modified),
                ("new/pom.xml", Change::Added),
            ]
        );
        assert_eq!(diffs[1].lines, vec!["+  <x/>"]);
        assert!(format_report(&diffs).contains("Modified ext/pom.xml\n    +  <x/>\n"));
    }

    #[test]
    fn stage_discards_previous_scratch() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::write(root.join("pom.xml"), "<project/>\n").unwrap();
        let stale = root.join(SCRATCH_DIR).join("stale/pom.xml");
        std::fs::create_dir_all(stale.parent().unwrap()).unwrap();
        std::fs::write(&stale, "old").unwrap();

        let shadow = ShadowTree::stage(root, &[]).unwrap();
        assert!(!stale.exists());
        assert!(shadow.root().join("pom.xml").is_file());
    }
}
