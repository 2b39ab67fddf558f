//! Source loader: discovers workflow files under a corpus root

use crate::deadline::Deadline;
use crate::syntax::{ParseError, PythonParser, SyntaxNode};
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::{debug, warn};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("cannot read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("file is not valid UTF-8 (first invalid byte at offset {offset})")]
    NotUtf8 { offset: usize },

    #[error("cannot walk directory: {0}")]
    Walk(String),
}

/// A discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourcePath {
    pub path: PathBuf,
    /// Path relative to the root, `/`-separated
    pub relative: String,
    /// Set when the walk itself failed at this entry
    pub walk_error: Option<String>,
}

/// Why a unit produced no tree
#[derive(Debug, Error)]
pub enum UnitError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// One workflow file: its text and, once parsed, its tree
#[derive(Debug)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub relative: String,
    pub text: String,
    pub tree: Option<Arc<SyntaxNode>>,
    pub error: Option<UnitError>,
}

impl SourceUnit {
    /// Read a discovered file; failures are kept on the unit
    pub fn load(source: &SourcePath) -> Self {
        let mut unit = Self {
            path: source.path.clone(),
            relative: source.relative.clone(),
            text: String::new(),
            tree: None,
            error: None,
        };
        if let Some(message) = &source.walk_error {
            unit.error = Some(LoadError::Walk(message.clone()).into());
            return unit;
        }
        match read_text(&source.path) {
            Ok(text) => unit.text = text,
            Err(e) => {
                warn!("{}: {}", source.relative, e);
                unit.error = Some(e.into());
            }
        }
        unit
    }

    /// In-memory unit, mostly for tests and tooling
    pub fn from_text(relative: &str, text: &str) -> Self {
        Self {
            path: PathBuf::from(relative),
            relative: relative.to_string(),
            text: text.to_string(),
            tree: None,
            error: None,
        }
    }

    /// Parse the text; a unit that already failed is returned unchanged
    pub fn parse(mut self, parser: &PythonParser, deadline: &Deadline) -> Self {
        if self.error.is_some() || self.tree.is_some() {
            return self;
        }
        match parser.parse(&self.text, deadline) {
            Ok(tree) => self.tree = Some(tree),
            Err(e) => {
                debug!("{}: {}", self.relative, e);
                self.error = Some(e.into());
            }
        }
        self
    }

    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

fn read_text(path: &Path) -> Result<String, LoadError> {
    let bytes = fs::read(path)?;
    String::from_utf8(bytes).map_err(|e| LoadError::NotUtf8 {
        offset: e.utf8_error().valid_up_to(),
    })
}

fn build_globset(patterns: &[String]) -> Result<GlobSet, LoadError> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        let glob = Glob::new(pattern).map_err(|source| LoadError::Pattern {
            pattern: pattern.clone(),
            source,
        })?;
        builder.add(glob);
    }
    builder.build().map_err(|source| LoadError::Pattern {
        pattern: patterns.join(", "),
        source,
    })
}

/// `/`-joined path of `path` below `root`
fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// Finds the workflow files of a corpus
#[derive(Debug, Clone)]
pub struct SourceLoader {
    root: PathBuf,
    include: GlobSet,
    exclude: GlobSet,
}

impl SourceLoader {
    /// Loader with the default patterns
    pub fn new(root: impl Into<PathBuf>) -> Result<Self, LoadError> {
        let files = crate::config::FilesConfig::default();
        Self::with_patterns(root, &files.include, &files.exclude)
    }

    pub fn with_patterns(
        root: impl Into<PathBuf>,
        include: &[String],
        exclude: &[String],
    ) -> Result<Self, LoadError> {
        Ok(Self {
            root: root.into(),
            include: build_globset(include)?,
            exclude: build_globset(exclude)?,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn is_selected(&self, relative: &str) -> bool {
        self.include.is_match(relative) && !self.exclude.is_match(relative)
    }

    /// Whether the walk descends into directory `relative`
    ///
    /// A directory whose contents the exclude patterns cover is skipped
    /// without being read.
    fn enters(&self, relative: &str) -> bool {
        relative.is_empty() || !self.exclude.is_match(format!("{}/", relative))
    }

    /// Entry for a path the walk could not read, if the path is selected
    fn walk_failure(&self, path: PathBuf, message: String) -> Option<SourcePath> {
        let relative = relative_path(&self.root, &path);
        warn!("{}: {}", relative, message);
        self.is_selected(&relative).then(|| SourcePath {
            path,
            relative,
            walk_error: Some(message),
        })
    }

    /// Matching files in lexicographic order of their relative paths
    pub fn discover(&self) -> Result<Vec<SourcePath>, LoadError> {
        if !self.root.is_dir() {
            return Err(LoadError::NotADirectory(self.root.clone()));
        }

        let walker = WalkDir::new(&self.root)
            .follow_links(false)
            .into_iter()
            .filter_entry(|entry| {
                !entry.file_type().is_dir() || self.enters(&relative_path(&self.root, entry.path()))
            });

        let mut found = Vec::new();
        for entry in walker {
            match entry {
                Ok(entry) => {
                    if !entry.file_type().is_file() {
                        continue;
                    }
                    let relative = relative_path(&self.root, entry.path());
                    if self.is_selected(&relative) {
                        found.push(SourcePath {
                            path: entry.into_path(),
                            relative,
                            walk_error: None,
                        });
                    }
                }
                Err(e) => {
                    let Some(path) = e.path().map(Path::to_path_buf) else {
                        warn!("skipping unreadable entry: {}", e);
                        continue;
                    };
                    found.extend(self.walk_failure(path, e.to_string()));
                }
            }
        }

        found.sort_by(|a, b| a.relative.cmp(&b.relative));
        found.dedup_by(|a, b| a.relative == b.relative);
        debug!("discovered {} files under {}", found.len(), self.root.display());
        Ok(found)
    }

    /// Lazily loaded units, one per discovered file
    pub fn units(&self) -> Result<impl Iterator<Item = SourceUnit>, LoadError> {
        Ok(self.discover()?.into_iter().map(|source| SourceUnit::load(&source)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn corpus(files: &[(&str, &[u8])]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            let path = dir.path().join(name);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(path, content).unwrap();
        }
        dir
    }

    #[test]
    fn test_discover_sorted_and_filtered() {
        let dir = corpus(&[
            ("dags/b.py", b"x = 1\n"),
            ("dags/a.py", b"x = 1\n"),
            ("dags/notes.txt", b"hello"),
            ("dags/__pycache__/a.py", b"x = 1\n"),
            ("z.py", b"x = 1\n"),
        ]);
        let loader = SourceLoader::new(dir.path()).unwrap();
        let relative: Vec<String> = loader
            .discover()
            .unwrap()
            .into_iter()
            .map(|s| s.relative)
            .collect();
        assert_eq!(relative, vec!["dags/a.py", "dags/b.py", "z.py"]);
    }

    #[test]
    fn test_excluded_directories_are_not_entered() {
        let dir = corpus(&[
            (".venv/lib/site.py", b"x = '\xff'\n"),
            ("node_modules/pkg/a.py", b"x = 1\n"),
            ("dags/a.py", b"x = 1\n"),
        ]);
        let loader = SourceLoader::new(dir.path()).unwrap();
        assert!(!loader.enters(".venv"));
        assert!(!loader.enters("dags/.venv"));
        assert!(!loader.enters("node_modules/pkg"));
        assert!(loader.enters(""));
        assert!(loader.enters("dags"));

        let units: Vec<SourceUnit> = loader.units().unwrap().collect();
        assert_eq!(units.len(), 1);
        assert_eq!(units[0].relative, "dags/a.py");
        assert!(units[0].is_ok());
    }

    #[test]
    fn test_walk_failures_outside_patterns_are_dropped() {
        let dir = TempDir::new().unwrap();
        let loader = SourceLoader::new(dir.path()).unwrap();
        let failure = |relative: &str| {
            loader.walk_failure(dir.path().join(relative), "permission denied".to_string())
        };
        assert!(failure("dags/private").is_none());
        assert!(failure(".venv/lib/site.py").is_none());

        let kept = failure("dags/a.py").unwrap();
        assert_eq!(kept.relative, "dags/a.py");
        assert_eq!(kept.walk_error.as_deref(), Some("permission denied"));
    }

    #[test]
    fn test_custom_patterns() {
        let dir = corpus(&[("dags/a.py", b""), ("tests/test_a.py", b""), ("setup.py", b"")]);
        let loader = SourceLoader::with_patterns(
            dir.path(),
            &["dags/**/*.py".to_string()],
            &[],
        )
        .unwrap();
        let found = loader.discover().unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].relative, "dags/a.py");
    }

    #[test]
    fn test_invalid_pattern() {
        let err = SourceLoader::with_patterns("/tmp", &["[bad".to_string()], &[]).unwrap_err();
        assert!(matches!(err, LoadError::Pattern { .. }));
    }

    #[test]
    fn test_missing_root() {
        let dir = TempDir::new().unwrap();
        let loader = SourceLoader::new(dir.path().join("missing")).unwrap();
        assert!(matches!(loader.discover(), Err(LoadError::NotADirectory(_))));
    }

    #[test]
    fn test_non_utf8_file_becomes_unit_error() {
        let dir = corpus(&[("bad.py", b"x = '\xff\xfe'\n"), ("good.py", b"x = 1\n")]);
        let units: Vec<SourceUnit> = SourceLoader::new(dir.path()).unwrap().units().unwrap().collect();
        assert_eq!(units.len(), 2);
        assert!(matches!(
            units[0].error,
            Some(UnitError::Load(LoadError::NotUtf8 { offset: 5 }))
        ));
        assert!(units[1].is_ok());
        assert_eq!(units[1].text, "x = 1\n");
    }

    #[test]
    fn test_parse_keeps_errors() {
        let parser = PythonParser::new();
        let unit = SourceUnit::from_text("a.py", "def f(:\n").parse(&parser, &Deadline::none());
        assert!(matches!(unit.error, Some(UnitError::Parse(ParseError::Syntax { .. }))));
        assert!(unit.tree.is_none());

        let unit = SourceUnit::from_text("b.py", "x = 1\n").parse(&parser, &Deadline::none());
        assert!(unit.is_ok());
        assert_eq!(unit.tree.unwrap().render(), "x = 1\n");
    }
}
