//! Which changed files get documentation.
//!
//! Provides [`FilePolicy`] which encapsulates the `[sync]` file-selection
//! settings and evaluates each changed path of a push before any content is
//! fetched.
//!
//! # Decision model
//!
//! | Condition | Decision |
//! |-----------|----------|
//! | Path contains an exclude pattern | `Excluded` |
//! | Path matches an ignore glob | `Ignored` |
//! | Path does not end with a code extension (ASCII case-insensitive) | `NotSourceCode` |
//! | None of the above | `Allow` |
//!
//! Content size is only known after fetching, so `max_file_bytes` is checked
//! separately through [`FilePolicy::check_size`].

use tracing::debug;

use crate::config::SyncConfig;

// ---------------------------------------------------------------------------
// Decision enum
// ---------------------------------------------------------------------------

/// The outcome of evaluating a path against the policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilePolicyDecision {
    /// Path is recognized source code; generate documentation for it.
    Allow,
    /// Path contains one of the exclude substrings.
    Excluded { pattern: String },
    /// Path matches one of the extra ignore globs.
    Ignored { pattern: String },
    /// Path has no recognized source-code extension.
    NotSourceCode,
}

impl FilePolicyDecision {
    pub fn should_sync(&self) -> bool {
        matches!(self, Self::Allow)
    }

    /// Short human-readable label for logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Excluded { .. } => "excluded",
            Self::Ignored { .. } => "ignored",
            Self::NotSourceCode => "not-source-code",
        }
    }
}

// ---------------------------------------------------------------------------
// FilePolicy
// ---------------------------------------------------------------------------

/// Evaluates changed paths against extensions, exclusions and ignore globs.
#[derive(Debug, Clone)]
pub struct FilePolicy {
    /// Suffixes (with leading dot) that mark a path as source code.
    code_extensions: Vec<String>,
    /// Substrings matched anywhere in the relative path.
    exclude_patterns: Vec<String>,
    /// Glob patterns matched against the whole relative path.
    ignore_globs: Vec<String>,
    /// Largest content accepted for generation. 0 = no limit.
    max_file_bytes: u64,
}

impl FilePolicy {
    pub fn new(
        code_extensions: Vec<String>,
        exclude_patterns: Vec<String>,
        ignore_globs: Vec<String>,
        max_file_bytes: u64,
    ) -> Self {
        Self {
            code_extensions,
            exclude_patterns,
            ignore_globs,
            max_file_bytes,
        }
    }

    /// Evaluate a path relative to the repository root (forward-slash
    /// separated, as GitHub reports it).
    pub fn evaluate(&self, rel_path: &str) -> FilePolicyDecision {
        let path = rel_path.replace('\\', "/");

        if let Some(pattern) = self.exclude_patterns.iter().find(|p| path.contains(p.as_str())) {
            debug!(path = rel_path, pattern = pattern.as_str(), "path excluded");
            return FilePolicyDecision::Excluded {
                pattern: pattern.clone(),
            };
        }

        if let Some(pattern) = self
            .ignore_globs
            .iter()
            .find(|p| glob_match::glob_match(&p.replace('\\', "/"), &path))
        {
            debug!(path = rel_path, pattern = pattern.as_str(), "path matches ignore glob");
            return FilePolicyDecision::Ignored {
                pattern: pattern.clone(),
            };
        }

        let lowered = path.to_ascii_lowercase();
        if !self
            .code_extensions
            .iter()
            .any(|ext| lowered.ends_with(&ext.to_ascii_lowercase()))
        {
            return FilePolicyDecision::NotSourceCode;
        }

        FilePolicyDecision::Allow
    }

    /// `Err((size, limit))` if `size` exceeds `max_file_bytes`.
    pub fn check_size(&self, size: u64) -> Result<(), (u64, u64)> {
        if self.max_file_bytes > 0 && size > self.max_file_bytes {
            return Err((size, self.max_file_bytes));
        }
        Ok(())
    }
}

impl From<&SyncConfig> for FilePolicy {
    fn from(cfg: &SyncConfig) -> Self {
        Self::new(
            cfg.code_extensions.clone(),
            cfg.exclude_patterns.clone(),
            cfg.ignore_globs.clone(),
            cfg.max_file_bytes,
        )
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn default_policy() -> FilePolicy {
        FilePolicy::from(&SyncConfig::default())
    }

    #[test]
    fn test_allow_source_files() {
        let policy = default_policy();
        for path in ["a.py", "src/lib.rs", "web/static/site.css", "scripts/run.sh"] {
            assert_eq!(policy.evaluate(path), FilePolicyDecision::Allow, "{path}");
        }
    }

    #[test]
    fn test_markdown_is_not_source() {
        let policy = default_policy();
        let decision = policy.evaluate("docs/c.md");
        assert_eq!(decision, FilePolicyDecision::NotSourceCode);
        assert!(!decision.should_sync());
        assert_eq!(decision.label(), "not-source-code");
    }

    #[test]
    fn test_exclusions_match_anywhere() {
        let policy = default_policy();
        assert!(matches!(
            policy.evaluate("frontend/node_modules/lodash/index.js"),
            FilePolicyDecision::Excluded { ref pattern } if pattern == "node_modules/"
        ));
        assert!(matches!(
            policy.evaluate("app/__pycache__/mod.py"),
            FilePolicyDecision::Excluded { .. }
        ));
        assert!(matches!(
            policy.evaluate("config/.env.local.sh"),
            FilePolicyDecision::Excluded { .. }
        ));
    }

    #[test]
    fn test_ignore_globs() {
        let policy = FilePolicy::new(
            vec![".py".into()],
            vec![],
            vec!["vendor/**".into(), "**/*_pb2.py".into()],
            0,
        );
        assert!(matches!(
            policy.evaluate("vendor/six.py"),
            FilePolicyDecision::Ignored { .. }
        ));
        assert!(matches!(
            policy.evaluate("proto/gen/api_pb2.py"),
            FilePolicyDecision::Ignored { .. }
        ));
        assert_eq!(policy.evaluate("app/main.py"), FilePolicyDecision::Allow);
    }

    #[test]
    fn test_extension_match_ignores_case() {
        let policy = default_policy();
        for path in ["src/Main.PY", "web/App.JS", "LEGACY.Rs"] {
            assert!(policy.evaluate(path).should_sync(), "{path}");
        }
        assert_eq!(policy.evaluate("docs/GUIDE.MD"), FilePolicyDecision::NotSourceCode);

        let upper = FilePolicy::new(vec![".GO".into()], vec![], vec![], 0);
        assert!(upper.evaluate("cmd/main.go").should_sync());
    }

    #[test]
    fn test_size_limit() {
        let policy = FilePolicy::new(vec![".py".into()], vec![], vec![], 1000);
        assert!(policy.check_size(1000).is_ok());
        assert_eq!(policy.check_size(1001), Err((1001, 1000)));

        let unlimited = default_policy();
        assert!(unlimited.check_size(u64::MAX).is_ok());
    }
}
