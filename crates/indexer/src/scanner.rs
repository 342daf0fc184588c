use ignore::WalkBuilder;
use std::path::{Path, PathBuf};

/// Walks a repository and yields candidate source files in sorted order.
///
/// Hidden entries are skipped. `.gitignore`, `.git/info/exclude` and the
/// global git excludes apply unless disabled; they are honoured even when the
/// directory is not a git checkout.
#[derive(Debug, Clone)]
pub struct FileScanner {
    root: PathBuf,
    respect_gitignore: bool,
}

impl FileScanner {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            respect_gitignore: true,
        }
    }

    #[must_use]
    pub const fn respect_gitignore(mut self, enabled: bool) -> Self {
        self.respect_gitignore = enabled;
        self
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn scan(&self) -> Vec<PathBuf> {
        let walker = WalkBuilder::new(&self.root)
            .hidden(true)
            .parents(self.respect_gitignore)
            .git_ignore(self.respect_gitignore)
            .git_global(self.respect_gitignore)
            .git_exclude(self.respect_gitignore)
            .ignore(self.respect_gitignore)
            .require_git(false)
            .build();

        let mut files = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if entry.file_type().is_some_and(|ft| ft.is_file()) {
                        files.push(entry.into_path());
                    }
                }
                Err(err) => log::debug!("Skipping unreadable entry: {err}"),
            }
        }

        files.sort();
        log::debug!("Scanned {} files under {}", files.len(), self.root.display());
        files
    }
}
