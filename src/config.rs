//! Project configuration
//!
//! Describes which files a front end should analyze: source paths, exclude
//! paths and source extensions. The ingestion engine itself never looks at
//! this; it only sees whatever event streams the front ends produce.

use crate::ignore::ExcludeFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Config format version written into new files.
pub const CONFIG_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    C,
    Cpp,
    Java,
}

impl Language {
    pub fn as_str(&self) -> &'static str {
        match self {
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Java => "java",
        }
    }

    pub fn default_standard(&self) -> &'static str {
        match self {
            Language::C => "c11",
            Language::Cpp => "c++17",
            Language::Java => "8",
        }
    }

    pub fn default_source_extensions(&self) -> Vec<String> {
        let exts: &[&str] = match self {
            Language::C => &[".c"],
            Language::Cpp => &[".cpp", ".cxx", ".cc"],
            Language::Java => &[".java"],
        };
        exts.iter().map(|e| e.to_string()).collect()
    }

    /// Guess the language of a file from its extension.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "c" => Some(Language::C),
            "cpp" | "cxx" | "cc" | "h" | "hpp" | "hxx" | "hh" => Some(Language::Cpp),
            "java" => Some(Language::Java),
            _ => None,
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "c" => Ok(Language::C),
            "cpp" | "c++" => Ok(Language::Cpp),
            "java" => Ok(Language::Java),
            other => Err(format!("unknown language: {other} (expected c, cpp or java)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectConfig {
    pub version: u32,
    pub name: String,
    pub language: Language,
    pub standard: String,
    pub source_paths: Vec<PathBuf>,
    pub exclude_paths: Vec<PathBuf>,
    pub source_extensions: Vec<String>,
    /// SQLite file the finished graph is committed to
    pub database: PathBuf,
    /// Parallel ingestion workers
    pub workers: usize,
    /// Directory relative paths are resolved against
    #[serde(skip)]
    pub location: PathBuf,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self::for_language("project", Language::Cpp)
    }
}

impl ProjectConfig {
    pub fn for_language(name: impl Into<String>, language: Language) -> Self {
        Self {
            version: CONFIG_VERSION,
            name: name.into(),
            language,
            standard: language.default_standard().to_string(),
            source_paths: vec![PathBuf::from(".")],
            exclude_paths: Vec::new(),
            source_extensions: language.default_source_extensions(),
            database: default_database_path_in(Path::new("")),
            workers: default_workers(),
            location: PathBuf::new(),
        }
    }

    pub fn make_path_absolute(&self, path: &Path) -> PathBuf {
        let joined = if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.location.join(path)
        };
        // drops interior `.` components so prefix matching stays exact
        joined.components().collect()
    }

    pub fn make_paths_absolute(&self, paths: &[PathBuf]) -> Vec<PathBuf> {
        paths.iter().map(|p| self.make_path_absolute(p)).collect()
    }

    pub fn absolute_source_paths(&self) -> Vec<PathBuf> {
        self.make_paths_absolute(&self.source_paths)
    }

    pub fn absolute_exclude_paths(&self) -> Vec<PathBuf> {
        self.make_paths_absolute(&self.exclude_paths)
    }

    pub fn database_path(&self) -> PathBuf {
        self.make_path_absolute(&self.database)
    }

    pub fn has_source_extension(&self, path: &Path) -> bool {
        let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
            return false;
        };
        self.source_extensions
            .iter()
            .any(|wanted| wanted.trim_start_matches('.').eq_ignore_ascii_case(ext))
    }

    /// All files under the source paths that match a source extension and
    /// are not excluded, sorted.
    pub fn collect_source_files(&self) -> Vec<PathBuf> {
        let excludes = ExcludeFilter::new(&self.location, &self.absolute_exclude_paths());
        let mut files = Vec::new();

        for root in self.absolute_source_paths() {
            if root.is_file() {
                if self.has_source_extension(&root) && !excludes.is_excluded(&root, false) {
                    files.push(root);
                }
                continue;
            }

            let walker = ignore::WalkBuilder::new(&root).standard_filters(false).build();
            for entry in walker.filter_map(|e| e.ok()) {
                let path = entry.path();
                let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
                if is_dir || excludes.is_excluded(path, is_dir) || !self.has_source_extension(path) {
                    continue;
                }
                files.push(path.to_path_buf());
            }
        }

        files.sort();
        files.dedup();
        files
    }
}

fn default_workers() -> usize {
    std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1)
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("symgraph.toml")
}

pub fn default_database_path_in(base: &Path) -> PathBuf {
    base.join(".symgraph").join("graph.db")
}

/// Load a project config. Returns `None` when the file does not exist.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<ProjectConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let mut config: ProjectConfig = toml::from_str(&contents)?;
    if config.version > CONFIG_VERSION {
        anyhow::bail!(
            "config {} has version {}, newest supported is {}",
            path.display(),
            config.version,
            CONFIG_VERSION
        );
    }
    config.location = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_default();
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &ProjectConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use --force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

pub fn ensure_db_dir(db_path: &Path) -> anyhow::Result<()> {
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_extensions() {
        let config = ProjectConfig::for_language("demo", Language::Cpp);
        assert_eq!(config.source_extensions, vec![".cpp", ".cxx", ".cc"]);
        assert_eq!(config.standard, "c++17");
        assert!(config.has_source_extension(Path::new("src/main.CPP")));
        assert!(!config.has_source_extension(Path::new("include/main.h")));
    }

    #[test]
    fn test_language_from_path() {
        assert_eq!(Language::from_path(Path::new("a/B.java")), Some(Language::Java));
        assert_eq!(Language::from_path(Path::new("x.hpp")), Some(Language::Cpp));
        assert_eq!(Language::from_path(Path::new("README")), None);
        assert_eq!("C++".parse::<Language>(), Ok(Language::Cpp));
        assert!("rust".parse::<Language>().is_err());
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("symgraph.toml");
        let mut config = ProjectConfig::for_language("demo", Language::C);
        config.exclude_paths = vec![PathBuf::from("third_party")];

        write_config(&path, &config, false).unwrap();
        assert!(write_config(&path, &config, false).is_err());

        let loaded = load_config(Some(&path)).unwrap().unwrap();
        assert_eq!(loaded.name, "demo");
        assert_eq!(loaded.language, Language::C);
        assert_eq!(loaded.exclude_paths, vec![PathBuf::from("third_party")]);
        assert_eq!(loaded.location, dir.path());
    }

    #[test]
    fn test_missing_config_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_config(Some(&dir.path().join("nope.toml"))).unwrap().is_none());
    }

    #[test]
    fn test_collect_source_files() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        std::fs::create_dir_all(root.join("src")).unwrap();
        std::fs::create_dir_all(root.join("third_party")).unwrap();
        std::fs::write(root.join("src/a.cpp"), "int a;").unwrap();
        std::fs::write(root.join("src/a.h"), "int a;").unwrap();
        std::fs::write(root.join("third_party/b.cpp"), "int b;").unwrap();

        let mut config = ProjectConfig::for_language("demo", Language::Cpp);
        config.location = root.to_path_buf();
        config.exclude_paths = vec![PathBuf::from("third_party")];

        let files = config.collect_source_files();
        assert_eq!(files, vec![root.join("src/a.cpp")]);
    }
}
