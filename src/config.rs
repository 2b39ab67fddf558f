//! Configuration system
//!
//! Reads configuration from:
//! - `dag-migrate.yaml` / `.dag-migrate.yaml` / `.dag-migrate.yml` /
//!   `.dag-migrate.json` in the corpus root (project-level)
//! - the same names in the current directory
//! - the same names in the home directory (user-level)

use crate::catalog::{CatalogBuilder, ConstructRule, ImportMapping, ParamMapping};
use crate::diagnostic::Severity;
use globset::{Glob, GlobSet, GlobSetBuilder};
use log::info;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// File names probed, in order, in each search directory
pub const CONFIG_NAMES: [&str; 4] = [
    "dag-migrate.yaml",
    ".dag-migrate.yaml",
    ".dag-migrate.yml",
    ".dag-migrate.json",
];

/// Configuration error
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid pattern `{pattern}`: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Engine settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Enable parallel processing
    pub parallel: bool,

    /// Number of parallel jobs (0 = auto-detect)
    pub jobs: usize,

    /// Per-file time budget in milliseconds (0 = unlimited)
    pub timeout_ms: u64,

    /// Re-run the transformation on its own output and require no changes
    pub verify: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parallel: true,
            jobs: 0,
            timeout_ms: 10_000,
            verify: true,
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_ms > 0).then(|| Duration::from_millis(self.timeout_ms))
    }
}

/// What a run does to the corpus
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Mode {
    /// Analyze only; never modify files
    #[default]
    ValidateOnly,
    /// Rewrite files, then validate the result
    Transform,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::ValidateOnly => "validate-only",
            Mode::Transform => "transform",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('_', "-").as_str() {
            "validate-only" | "validate" => Ok(Mode::ValidateOnly),
            "transform" => Ok(Mode::Transform),
            _ => Err(format!("Unknown mode: {}", s)),
        }
    }
}

/// Output settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Report format
    pub format: OutputFormat,

    /// Minimum severity included in the rendered report
    pub level: Severity,

    /// Color mode for terminal output
    pub color: ColorMode,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: OutputFormat::Json,
            level: Severity::Info,
            color: ColorMode::Auto,
        }
    }
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Html,
    Text,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "html" => Ok(OutputFormat::Html),
            "text" => Ok(OutputFormat::Text),
            _ => Err(format!("Unknown output format: {}", s)),
        }
    }
}

/// Color mode options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorMode {
    #[default]
    Auto,
    Always,
    Never,
}

/// File handling settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilesConfig {
    /// Include patterns
    pub include: Vec<String>,

    /// Exclude patterns
    pub exclude: Vec<String>,
}

impl Default for FilesConfig {
    fn default() -> Self {
        Self {
            include: vec!["**/*.py".to_string()],
            exclude: vec![
                "**/.git/**".to_string(),
                "**/__pycache__/**".to_string(),
                "**/.venv/**".to_string(),
                "**/venv/**".to_string(),
                "**/node_modules/**".to_string(),
            ],
        }
    }
}

/// Rule configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RulesConfig {
    /// Disabled rules (ids or id prefixes)
    pub disabled: Vec<String>,

    /// Enabled rules (empty = all)
    pub enabled: Vec<String>,

    /// Ignore rules by prefix (e.g., "AF4" ignores all AF4xx rules)
    pub ignore: Vec<String>,

    /// Severity overrides (rule_id -> severity)
    pub severity: HashMap<String, Severity>,

    /// Per-file rule ignores (glob pattern -> rule IDs)
    pub per_file: HashMap<String, Vec<String>>,
}

/// Extra catalog entries, in the same form as the built-in tables
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub imports: Vec<ImportMapping>,
    pub parameters: Vec<ParamMapping>,
    pub constructs: Vec<ConstructRule>,
}

impl CatalogConfig {
    fn is_empty(&self) -> bool {
        self.imports.is_empty() && self.parameters.is_empty() && self.constructs.is_empty()
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Configuration files this one builds on
    pub extends: Vec<String>,

    /// Engine settings
    pub engine: EngineConfig,

    /// Output settings
    pub output: OutputConfig,

    /// File handling settings
    pub files: FilesConfig,

    /// Rule configuration
    pub rules: RulesConfig,

    /// Additional catalog entries
    pub catalog: CatalogConfig,
}

/// Command-line values that take precedence over configuration files
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub format: Option<OutputFormat>,
    pub level: Option<Severity>,
    pub color: Option<ColorMode>,
    pub jobs: Option<usize>,
    pub timeout_ms: Option<u64>,
    pub verify: Option<bool>,
    pub include: Vec<String>,
    pub exclude: Vec<String>,
    pub disabled: Vec<String>,
    pub enabled: Vec<String>,
}

impl Config {
    /// Create default configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        Self::load_with_depth(path, 0)
    }

    /// Load with recursion depth limit (to prevent infinite loops)
    fn load_with_depth(path: &Path, depth: usize) -> Result<Self, ConfigError> {
        const MAX_DEPTH: usize = 10;
        if depth >= MAX_DEPTH {
            return Err(ConfigError::Invalid(
                "Maximum config inheritance depth exceeded".to_string(),
            ));
        }

        let content = std::fs::read_to_string(path)?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        let mut config: Self = match ext {
            "yaml" | "yml" => serde_yaml::from_str(&content)?,
            "json" => serde_json::from_str(&content)?,
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "Unknown config file format: {}",
                    ext
                )))
            }
        };

        if !config.extends.is_empty() {
            let base_dir = path.parent().unwrap_or(Path::new("."));
            let mut base_config = Self::default();

            for extend in &config.extends {
                let extend_path = if Path::new(extend).is_absolute() {
                    PathBuf::from(extend)
                } else {
                    base_dir.join(extend)
                };
                base_config.merge(Self::load_with_depth(&extend_path, depth + 1)?);
            }

            base_config.merge(std::mem::take(&mut config));
            config = base_config;
        }

        Ok(config)
    }

    /// Merge another config into this one (other takes precedence)
    pub fn merge(&mut self, other: Self) {
        let defaults = Self::default();

        if other.engine.jobs != 0 {
            self.engine.jobs = other.engine.jobs;
        }
        self.engine.parallel = other.engine.parallel;
        if other.engine.timeout_ms != defaults.engine.timeout_ms {
            self.engine.timeout_ms = other.engine.timeout_ms;
        }
        self.engine.verify = other.engine.verify;

        if other.output.format != defaults.output.format {
            self.output.format = other.output.format;
        }
        if other.output.level != defaults.output.level {
            self.output.level = other.output.level;
        }
        if other.output.color != defaults.output.color {
            self.output.color = other.output.color;
        }

        // Files - extend lists
        extend_unique(&mut self.files.include, other.files.include);
        extend_unique(&mut self.files.exclude, other.files.exclude);

        // Rules - merge
        extend_unique(&mut self.rules.disabled, other.rules.disabled);
        if !other.rules.enabled.is_empty() {
            self.rules.enabled = other.rules.enabled;
        }
        extend_unique(&mut self.rules.ignore, other.rules.ignore);
        self.rules.severity.extend(other.rules.severity);
        for (pattern, rules) in other.rules.per_file {
            extend_unique(self.rules.per_file.entry(pattern).or_default(), rules);
        }

        // Catalog entries - later ids replace earlier ones when built
        self.catalog.imports.extend(other.catalog.imports);
        self.catalog.parameters.extend(other.catalog.parameters);
        self.catalog.constructs.extend(other.catalog.constructs);
    }

    /// Configuration file for a corpus: root, then current directory, then home
    pub fn discover(root: &Path) -> Option<PathBuf> {
        let mut search = vec![root.to_path_buf()];
        if let Ok(cwd) = std::env::current_dir() {
            search.push(cwd);
        }
        if let Some(home) = dirs::home_dir() {
            search.push(home);
        }
        search
            .iter()
            .flat_map(|dir| CONFIG_NAMES.iter().map(move |name| dir.join(name)))
            .find(|path| path.is_file())
    }

    /// Load the discovered configuration, or defaults when none exists
    pub fn load_default(root: &Path) -> Result<Self, ConfigError> {
        match Self::discover(root) {
            Some(path) => {
                info!("using configuration {}", path.display());
                Self::load(&path)
            }
            None => Ok(Self::default()),
        }
    }

    /// Merge CLI arguments into configuration
    pub fn merge_cli(&mut self, overrides: Overrides) {
        if let Some(format) = overrides.format {
            self.output.format = format;
        }
        if let Some(level) = overrides.level {
            self.output.level = level;
        }
        if let Some(color) = overrides.color {
            self.output.color = color;
        }
        if let Some(jobs) = overrides.jobs {
            self.engine.jobs = jobs;
            if jobs == 1 {
                self.engine.parallel = false;
            }
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            self.engine.timeout_ms = timeout_ms;
        }
        if let Some(verify) = overrides.verify {
            self.engine.verify = verify;
        }
        if !overrides.include.is_empty() {
            self.files.include = overrides.include;
        }
        extend_unique(&mut self.files.exclude, overrides.exclude);
        extend_unique(&mut self.rules.disabled, overrides.disabled);
        if !overrides.enabled.is_empty() {
            self.rules.enabled = overrides.enabled;
        }
    }

    /// Catalog builder with the built-in tables, configured entries,
    /// rule selection and severity overrides applied
    pub fn catalog_builder(&self) -> CatalogBuilder {
        let mut builder = CatalogBuilder::builtin();
        if !self.catalog.is_empty() {
            info!(
                "configuration adds {} import, {} parameter and {} construct entries",
                self.catalog.imports.len(),
                self.catalog.parameters.len(),
                self.catalog.constructs.len()
            );
        }
        for mapping in &self.catalog.imports {
            builder = builder.import(mapping.clone());
        }
        for mapping in &self.catalog.parameters {
            builder = builder.parameter(mapping.clone());
        }
        for rule in &self.catalog.constructs {
            builder = builder.construct(rule.clone());
        }
        builder = builder
            .disable(self.rules.disabled.iter().map(|id| id.to_uppercase()))
            .disable(self.rules.ignore.iter().map(|id| id.to_uppercase()))
            .select(self.rules.enabled.iter().map(|id| id.to_uppercase()));
        for (id, severity) in &self.rules.severity {
            builder = builder.severity(&id.to_uppercase(), *severity);
        }
        builder
    }

    /// Compiled `rules.per_file` table
    pub fn per_file_ignores(&self) -> Result<PerFileIgnores, ConfigError> {
        let mut entries: Vec<(&String, &Vec<String>)> = self.rules.per_file.iter().collect();
        entries.sort();

        let mut builder = GlobSetBuilder::new();
        let mut rules = Vec::with_capacity(entries.len());
        for (pattern, ids) in entries {
            let glob = Glob::new(pattern).map_err(|source| ConfigError::Pattern {
                pattern: pattern.clone(),
                source,
            })?;
            builder.add(glob);
            rules.push(ids.iter().map(|id| id.to_uppercase()).collect());
        }
        let set = builder.build().map_err(|source| ConfigError::Pattern {
            pattern: "rules.per_file".to_string(),
            source,
        })?;
        Ok(PerFileIgnores { set, rules })
    }
}

fn extend_unique(target: &mut Vec<String>, items: Vec<String>) {
    for item in items {
        if !target.contains(&item) {
            target.push(item);
        }
    }
}

/// Rule ids ignored per relative path
#[derive(Debug, Clone, Default)]
pub struct PerFileIgnores {
    set: GlobSet,
    rules: Vec<Vec<String>>,
}

impl PerFileIgnores {
    /// Ids ignored for `relative` (a `/`-separated path)
    pub fn for_file(&self, relative: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .set
            .matches(relative)
            .into_iter()
            .flat_map(|i| self.rules[i].iter().cloned())
            .collect();
        ids.sort();
        ids.dedup();
        ids
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::new();
        assert!(config.engine.parallel);
        assert_eq!(config.engine.jobs, 0);
        assert!(config.engine.verify);
        assert_eq!(config.engine.timeout(), Some(Duration::from_secs(10)));
        assert_eq!(config.output.format, OutputFormat::Json);
        assert_eq!(config.output.level, Severity::Info);
        assert_eq!(config.files.include, vec!["**/*.py".to_string()]);
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("json".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!("HTML".parse::<OutputFormat>().unwrap(), OutputFormat::Html);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("sarif".parse::<OutputFormat>().is_err());
    }

    #[test]
    fn test_mode_from_str() {
        assert_eq!("validate-only".parse::<Mode>().unwrap(), Mode::ValidateOnly);
        assert_eq!("VALIDATE_ONLY".parse::<Mode>().unwrap(), Mode::ValidateOnly);
        assert_eq!("transform".parse::<Mode>().unwrap(), Mode::Transform);
        assert!("rewrite".parse::<Mode>().is_err());
    }

    #[test]
    fn test_zero_timeout_is_unlimited() {
        let engine = EngineConfig {
            timeout_ms: 0,
            ..Default::default()
        };
        assert_eq!(engine.timeout(), None);
    }

    #[test]
    fn test_yaml_deserialize() {
        let yaml = r#"
engine:
  parallel: false
  jobs: 4
  timeout_ms: 500
output:
  format: html
  level: warning
rules:
  disabled:
    - AF404
  severity:
    AF301: warning
  per_file:
    "legacy/**": [AF101]
catalog:
  parameters:
    - id: AF290
      callees: ["MyOperator"]
      param: old_flag
      action: drop
"#;

        let config: Config = serde_yaml::from_str(yaml).unwrap();
        assert!(!config.engine.parallel);
        assert_eq!(config.engine.jobs, 4);
        assert_eq!(config.engine.timeout_ms, 500);
        assert_eq!(config.output.format, OutputFormat::Html);
        assert_eq!(config.output.level, Severity::Warning);
        assert_eq!(config.rules.disabled, vec!["AF404".to_string()]);
        assert_eq!(config.catalog.parameters.len(), 1);
    }

    #[test]
    fn test_unknown_catalog_field_is_rejected() {
        let yaml = r#"
catalog:
  imports:
    - id: AF190
      from: a.b
      to: a.c
      rename: {}
"#;
        assert!(serde_yaml::from_str::<Config>(yaml).is_err());
    }

    #[test]
    fn test_catalog_builder_applies_rules_section() {
        let mut config = Config::new();
        config.rules.disabled.push("af4".to_string());
        config.rules.severity.insert("AF301".to_string(), Severity::Error);
        let catalog = config.catalog_builder().build().unwrap();
        assert!(catalog.rule("AF401").is_none());
        assert_eq!(catalog.rule("AF301").unwrap().meta.severity, Severity::Error);
    }

    #[test]
    fn test_catalog_builder_adds_entries() {
        let yaml = r#"
catalog:
  imports:
    - id: AF190
      from: company.legacy_ops
      to: company.ops
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let catalog = config.catalog_builder().build().unwrap();
        assert!(catalog.rule("AF190").is_some());
        assert!(catalog.rule("AF101").is_some());
    }

    #[test]
    fn test_config_merge_cli() {
        let mut config = Config::new();
        config.merge_cli(Overrides {
            format: Some(OutputFormat::Text),
            jobs: Some(1),
            verify: Some(false),
            disabled: vec!["AF201".to_string()],
            ..Default::default()
        });

        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(config.engine.jobs, 1);
        assert!(!config.engine.parallel);
        assert!(!config.engine.verify);
        assert!(config.rules.disabled.contains(&"AF201".to_string()));
    }

    #[test]
    fn test_per_file_ignores() {
        let mut config = Config::new();
        config
            .rules
            .per_file
            .insert("legacy/**".to_string(), vec!["AF101".to_string()]);
        config
            .rules
            .per_file
            .insert("**/test_*.py".to_string(), vec!["af404".to_string()]);
        let ignores = config.per_file_ignores().unwrap();
        assert_eq!(ignores.for_file("legacy/old.py"), vec!["AF101".to_string()]);
        assert_eq!(
            ignores.for_file("legacy/test_old.py"),
            vec!["AF101".to_string(), "AF404".to_string()]
        );
        assert!(ignores.for_file("dags/etl.py").is_empty());
    }

    #[test]
    fn test_bad_per_file_pattern() {
        let mut config = Config::new();
        config
            .rules
            .per_file
            .insert("[oops".to_string(), vec!["AF101".to_string()]);
        assert!(matches!(
            config.per_file_ignores(),
            Err(ConfigError::Pattern { .. })
        ));
    }

    #[test]
    fn test_extends_chain() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join("base.yaml"),
            "engine:\n  timeout_ms: 2000\nrules:\n  disabled: [AF404]\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("dag-migrate.yaml"),
            "extends: [base.yaml]\noutput:\n  format: text\nrules:\n  disabled: [AF403]\n",
        )
        .unwrap();

        let config = Config::load(&dir.path().join("dag-migrate.yaml")).unwrap();
        assert_eq!(config.engine.timeout_ms, 2000);
        assert_eq!(config.output.format, OutputFormat::Text);
        assert_eq!(
            config.rules.disabled,
            vec!["AF404".to_string(), "AF403".to_string()]
        );
    }

    #[test]
    fn test_extends_cycle_hits_depth_limit() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.yaml"), "extends: [b.yaml]\n").unwrap();
        fs::write(dir.path().join("b.yaml"), "extends: [a.yaml]\n").unwrap();
        assert!(matches!(
            Config::load(&dir.path().join("a.yaml")),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_discover_prefers_root() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join(".dag-migrate.json"), "{\"output\": {\"format\": \"html\"}}").unwrap();
        assert_eq!(
            Config::discover(dir.path()),
            Some(dir.path().join(".dag-migrate.json"))
        );
        let config = Config::load_default(dir.path()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Html);
    }

    #[test]
    fn test_unknown_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Invalid(_))));
    }
}
