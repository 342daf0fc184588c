use crate::config::IndexingSettings;
use crate::error::{IndexerError, Result};
use codestack_code_chunker::Language;
use globset::{Glob, GlobSet, GlobSetBuilder};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

type CustomPredicate = Arc<dyn Fn(&str) -> bool + Send + Sync>;

/// Predicate over repository-relative paths (`/` separated).
///
/// A path passes when its language is detected and allowed, no path segment
/// is an excluded directory name, no exclusion glob matches, and the custom
/// predicate (if any) accepts it.
#[derive(Clone, Default)]
pub struct FileFilter {
    languages: BTreeSet<Language>,
    exclude_paths: Vec<String>,
    exclude_globs: Option<GlobSet>,
    custom: Option<CustomPredicate>,
}

impl fmt::Debug for FileFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileFilter")
            .field("languages", &self.languages)
            .field("exclude_paths", &self.exclude_paths)
            .field("exclude_globs", &self.exclude_globs.as_ref().map(GlobSet::len))
            .field("custom", &self.custom.is_some())
            .finish()
    }
}

impl FileFilter {
    /// Accepts every file with a detected language.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_settings(settings: &IndexingSettings) -> Result<Self> {
        Self::new()
            .with_languages(settings.languages.iter().copied())
            .with_excluded_paths(settings.exclude_paths.iter().cloned())
            .with_excluded_globs(&settings.exclude_globs)
    }

    /// Restrict to these languages. An empty set allows all of them.
    #[must_use]
    pub fn with_languages(mut self, languages: impl IntoIterator<Item = Language>) -> Self {
        self.languages = languages.into_iter().collect();
        self
    }

    /// Reject paths containing any of these names as a segment.
    #[must_use]
    pub fn with_excluded_paths(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.exclude_paths
            .extend(names.into_iter().map(|n| n.trim_matches('/').to_string()).filter(|n| !n.is_empty()));
        self
    }

    pub fn with_excluded_globs<S: AsRef<str>>(mut self, patterns: &[S]) -> Result<Self> {
        if patterns.is_empty() {
            return Ok(self);
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let glob = Glob::new(pattern.as_ref())
                .map_err(|e| IndexerError::Config(format!("bad glob {}: {e}", pattern.as_ref())))?;
            builder.add(glob);
        }
        let set = builder
            .build()
            .map_err(|e| IndexerError::Config(format!("bad glob set: {e}")))?;
        self.exclude_globs = Some(set);
        Ok(self)
    }

    #[must_use]
    pub fn with_predicate<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.custom = Some(Arc::new(predicate));
        self
    }

    #[must_use]
    pub fn allows(&self, relative_path: &str) -> bool {
        let language = Language::from_path(relative_path);
        if language == Language::Unknown {
            return false;
        }
        if !self.languages.is_empty() && !self.languages.contains(&language) {
            return false;
        }
        if relative_path
            .split('/')
            .any(|segment| self.exclude_paths.iter().any(|ex| ex == segment))
        {
            return false;
        }
        if self
            .exclude_globs
            .as_ref()
            .is_some_and(|set| set.is_match(relative_path))
        {
            return false;
        }
        self.custom.as_ref().is_none_or(|predicate| predicate(relative_path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_filter_needs_a_known_language() {
        let filter = FileFilter::new();
        assert!(filter.allows("src/lib.rs"));
        assert!(filter.allows("app/main.py"));
        assert!(!filter.allows("README.md"));
        assert!(!filter.allows("Makefile"));
    }

    #[test]
    fn language_allow_list() {
        let filter = FileFilter::new().with_languages([Language::Python]);
        assert!(filter.allows("a.py"));
        assert!(!filter.allows("a.ts"));
    }

    #[test]
    fn excluded_names_match_whole_segments() {
        let filter = FileFilter::new().with_excluded_paths(["node_modules".to_string(), "env".to_string()]);
        assert!(!filter.allows("web/node_modules/react/index.js"));
        assert!(!filter.allows("env/lib/site.py"));
        assert!(filter.allows("src/environment.py"));
    }

    #[test]
    fn globs_and_predicate_compose() {
        let filter = FileFilter::new()
            .with_excluded_globs(&["**/*_test.go", "gen/**"])
            .unwrap()
            .with_predicate(|path| !path.contains("legacy"));
        assert!(!filter.allows("pkg/server_test.go"));
        assert!(!filter.allows("gen/api.go"));
        assert!(!filter.allows("src/legacy/old.go"));
        assert!(filter.allows("pkg/server.go"));
    }

    #[test]
    fn invalid_glob_is_a_config_error() {
        let err = FileFilter::new().with_excluded_globs(&["a/[b"]).unwrap_err();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[test]
    fn settings_defaults_exclude_vendor_dirs() {
        let filter = FileFilter::from_settings(&IndexingSettings::default()).unwrap();
        assert!(!filter.allows("vendor/github.com/x/y.go"));
        assert!(!filter.allows("target/debug/build.rs"));
        assert!(filter.allows("cmd/main.go"));
    }
}
