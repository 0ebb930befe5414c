//! Restoring child module references disabled by a previous run.

use crate::descriptor;
use crate::editor::DescriptorEditor;
use crate::graph::module_descriptor_path;
use crate::{Result, TreeError};
use prodex_core::{parent_dir, ElementWhitespace, ROOT_DESCRIPTOR};
use std::collections::{BTreeSet, VecDeque};
use std::path::Path;
use tracing::{debug, info};

/// Uncomment every child reference carrying `mark`, starting at the root
/// descriptor and descending into all referenced children (enabled or just
/// re-enabled, in every profile).
///
/// Returns the re-enabled references as `<aggregator dir>/<module>`, in
/// visiting order. References to missing descriptors are skipped.
pub fn relink_modules(root_dir: &Path, mark: &str, style: ElementWhitespace) -> Result<Vec<String>> {
    let mut relinked = Vec::new();
    let mut visited = BTreeSet::new();
    let mut queue = VecDeque::from([ROOT_DESCRIPTOR.to_string()]);

    while let Some(path) = queue.pop_front() {
        if !visited.insert(path.clone()) {
            continue;
        }
        let file = root_dir.join(&path);
        if !file.is_file() {
            debug!("Skipping missing descriptor {}", path);
            continue;
        }

        let restored = DescriptorEditor::edit(&file, style, |editor| {
            editor.uncomment_modules(mark, |_| true)
        })?;
        let dir = parent_dir(&path);
        for name in restored {
            relinked.push(if dir.is_empty() {
                name
            } else {
                format!("{}/{}", dir, name)
            });
        }

        let content = std::fs::read_to_string(&file).map_err(|e| TreeError::io(&file, e))?;
        let parsed = descriptor::parse(&path, &content)?;
        for name in parsed.all_module_references() {
            if let Some(child) = module_descriptor_path(dir, name) {
                queue.push_back(child);
            }
        }
    }

    if !relinked.is_empty() {
        info!("Re-enabled {} previously disabled module(s)", relinked.len());
    }
    Ok(relinked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    const MARK: &str = "disabled by prodex:prod-excludes";

    #[test]
    fn restores_nested_references() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::write(
            root.join("pom.xml"),
            format!(
                "<project>\n    <artifactId>root</artifactId>\n    <modules>\n        <!-- <module>tests</module> {} -->\n    </modules>\n</project>\n",
                MARK
            ),
        )
        .unwrap();
        fs::create_dir_all(root.join("tests/it-a")).unwrap();
        fs::write(
            root.join("tests/pom.xml"),
            format!(
                "<project>\n    <artifactId>tests</artifactId>\n    <modules>\n        <!-- <module>it-a</module> {} -->\n        <!-- <module>it-b</module> -->\n    </modules>\n</project>\n",
                MARK
            ),
        )
        .unwrap();
        fs::write(
            root.join("tests/it-a/pom.xml"),
            "<project><artifactId>it-a</artifactId></project>",
        )
        .unwrap();

        let relinked = relink_modules(root, MARK, ElementWhitespace::Space).unwrap();
        assert_eq!(relinked, vec!["tests", "tests/it-a"]);

        let tests = fs::read_to_string(root.join("tests/pom.xml")).unwrap();
        assert!(tests.contains("<module>it-a</module>\n"));
        assert!(tests.contains("<!-- <module>it-b</module> -->"));

        let again = relink_modules(root, MARK, ElementWhitespace::Space).unwrap();
        assert!(again.is_empty());
    }
}
