//! Resolving the per-path action of a push.

use std::collections::BTreeMap;

use crate::github::PushCommit;
use crate::models::FileAction;

/// One path and the action to apply to its artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileChange {
    pub path: String,
    pub action: FileAction,
}

impl FileChange {
    pub fn is_removal(&self) -> bool {
        self.action == FileAction::Removed
    }
}

/// Collapse the file lists of every commit into one action per path.
///
/// Commits are applied in the order given (GitHub lists them oldest first)
/// and within a commit `added`, then `modified`, then `removed`. The last
/// action seen for a path wins, so a path modified and later removed in the
/// same push is a removal, and one removed and re-added is an upsert.
/// Output is sorted by path.
pub fn resolve_changes(commits: &[PushCommit]) -> Vec<FileChange> {
    let mut last: BTreeMap<&str, FileAction> = BTreeMap::new();
    for commit in commits {
        let lists = [
            (&commit.added, FileAction::Added),
            (&commit.modified, FileAction::Modified),
            (&commit.removed, FileAction::Removed),
        ];
        for (paths, action) in lists {
            for path in paths {
                last.insert(path.as_str(), action);
            }
        }
    }

    last.into_iter()
        .map(|(path, action)| FileChange {
            path: path.to_string(),
            action,
        })
        .collect()
}
