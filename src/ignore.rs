use ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Path, PathBuf};

/// Matches paths against a project's exclude paths.
///
/// Exclude paths are absolute files or directories; each becomes an
/// anchored gitignore pattern relative to the project root. Paths outside
/// the root are compared by prefix.
pub struct ExcludeFilter {
    inner: Gitignore,
    outside_root: Vec<PathBuf>,
}

impl ExcludeFilter {
    pub fn new(root: &Path, excludes: &[PathBuf]) -> Self {
        let mut builder = GitignoreBuilder::new(root);
        let mut outside_root = Vec::new();

        for exclude in excludes {
            match exclude.strip_prefix(root) {
                Ok(relative) if !relative.as_os_str().is_empty() => {
                    let pattern = format!("/{}", relative.to_string_lossy().replace('\\', "/"));
                    // patterns come from paths, a malformed one just matches nothing
                    builder.add_line(None, &pattern).ok();
                }
                _ => outside_root.push(exclude.clone()),
            }
        }

        Self {
            inner: builder.build().unwrap_or_else(|_| Gitignore::empty()),
            outside_root,
        }
    }

    pub fn is_excluded(&self, path: &Path, is_dir: bool) -> bool {
        if self.outside_root.iter().any(|ex| path.starts_with(ex)) {
            return true;
        }
        if !path.starts_with(self.inner.path()) {
            return false;
        }
        self.inner.matched_path_or_any_parents(path, is_dir).is_ignore()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_excluded_directory_covers_children() {
        let root = Path::new("/project");
        let filter = ExcludeFilter::new(root, &[root.join("vendor")]);
        assert!(filter.is_excluded(&root.join("vendor/lib/x.cpp"), false));
        assert!(!filter.is_excluded(&root.join("src/vendor.cpp"), false));
    }

    #[test]
    fn test_exclude_outside_root() {
        let root = Path::new("/project");
        let filter = ExcludeFilter::new(root, &[PathBuf::from("/usr/include")]);
        assert!(filter.is_excluded(Path::new("/usr/include/stdio.h"), false));
        assert!(!filter.is_excluded(&root.join("main.c"), false));
    }
}
