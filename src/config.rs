//! Configuration file support for code-health
//!
//! Every heuristic constant the analyzers use lives in [`HealthConfig`].
//! Values come from an optional `.code-health.toml`; anything left out
//! keeps its built-in default.
//!
//! ## Configuration File Format
//!
//! ```toml
//! # .code-health.toml
//!
//! [analysis]
//! # Directory names (or relative paths) never analyzed
//! exclude_dirs = ["vendor", "testdata", "target"]
//! # Glob patterns on relative paths
//! exclude = ["src/generated/*"]
//! # Skip #[cfg(test)] modules and #[test] functions
//! exclude_tests = true
//!
//! [thresholds]
//! god_object_lcom4 = 5
//! god_object_afferent = 10
//! unstable_afferent = 10
//! unstable_instability = 0.7
//! complex_function = 15
//! ambiguous_lcom4 = 3
//! ambiguous_method_complexity = 10
//! field_cluster_critical = 3
//!
//! [clustering]
//! min_call_frequency = 1
//! min_cluster_size = 2
//! min_cluster_ratio = 0.2
//!
//! [pca]
//! min_fields = 3
//! min_methods = 2
//! max_components = 5
//!
//! [heuristics]
//! utility_patterns = ["test", "util", "helper", "mock", "stub"]
//! accessor_prefixes = ["get", "set", "is", "has"]
//! ```

use glob::Pattern;
use regex_lite::Regex;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur when loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Invalid pattern: {0}")]
    PatternError(String),

    #[error("Config file not found: {}", .0.display())]
    NotFound(PathBuf),
}

/// Analysis scope section
#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisConfig {
    /// Directory base names or relative paths to skip entirely
    #[serde(default = "default_exclude_dirs")]
    pub exclude_dirs: Vec<String>,

    /// Glob patterns matched against slash-normalized relative paths
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Exclude test code from analysis (#[test], #[cfg(test)])
    #[serde(default = "default_true")]
    pub exclude_tests: bool,
}

fn default_exclude_dirs() -> Vec<String> {
    vec!["vendor".into(), "testdata".into(), "target".into()]
}

fn default_true() -> bool {
    true
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            exclude_dirs: default_exclude_dirs(),
            exclude: Vec::new(),
            exclude_tests: true,
        }
    }
}

/// Rule thresholds used by the diagnostics engine
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// Minimum LCOM4 for a God Object
    pub god_object_lcom4: usize,
    /// Minimum package afferent coupling for a God Object
    pub god_object_afferent: usize,
    pub unstable_afferent: usize,
    pub unstable_instability: f64,
    /// Minimum cyclomatic complexity for an Overly Complex Function
    pub complex_function: usize,
    pub ambiguous_lcom4: usize,
    pub ambiguous_method_complexity: usize,
    /// Field cluster estimate at which the finding becomes Critical
    pub field_cluster_critical: usize,
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            god_object_lcom4: 5,
            god_object_afferent: 10,
            unstable_afferent: 10,
            unstable_instability: 0.7,
            complex_function: 15,
            ambiguous_lcom4: 3,
            ambiguous_method_complexity: 10,
            field_cluster_critical: 3,
        }
    }
}

/// Private-method call graph clustering
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ClusteringConfig {
    /// Minimum call-site frequency for an edge
    pub min_call_frequency: usize,
    /// Absolute floor for a surviving cluster's size
    pub min_cluster_size: usize,
    /// Cluster size relative to the method count
    pub min_cluster_ratio: f64,
}

impl Default for ClusteringConfig {
    fn default() -> Self {
        Self {
            min_call_frequency: 1,
            min_cluster_size: 2,
            min_cluster_ratio: 0.2,
        }
    }
}

/// Field usage PCA
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PcaConfig {
    pub min_fields: usize,
    pub min_methods: usize,
    /// Eigenvalues extracted at most
    pub max_components: usize,
    pub power_iterations: usize,
    /// Fraction of each eigenvalue removed from the diagonal between extractions
    pub deflation_factor: f64,
    /// Extraction stops once an eigenvalue is at or below this
    pub eigen_epsilon: f64,
    pub kaiser_threshold: f64,
    pub elbow_threshold: f64,
    pub cumulative_threshold: f64,
    pub max_clusters: usize,
}

impl Default for PcaConfig {
    fn default() -> Self {
        Self {
            min_fields: 3,
            min_methods: 2,
            max_components: 5,
            power_iterations: 100,
            deflation_factor: 0.5,
            eigen_epsilon: 1e-10,
            kaiser_threshold: 1.0,
            elbow_threshold: 0.1,
            cumulative_threshold: 0.8,
            max_clusters: 5,
        }
    }
}

/// Name-based heuristics
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HeuristicsConfig {
    /// Substrings (case-insensitive) marking test/helper methods
    pub utility_patterns: Vec<String>,
    /// Accessor prefixes, matched as `GetX` or `get_x`
    pub accessor_prefixes: Vec<String>,
    /// Words ignored when naming a method cluster
    pub label_stop_words: Vec<String>,
}

impl Default for HeuristicsConfig {
    fn default() -> Self {
        Self {
            utility_patterns: ["test", "util", "helper", "mock", "stub"]
                .into_iter()
                .map(String::from)
                .collect(),
            accessor_prefixes: ["get", "set", "is", "has"]
                .into_iter()
                .map(String::from)
                .collect(),
            label_stop_words: ["get", "set", "is", "has", "do"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize, Default)]
pub struct HealthConfig {
    #[serde(default)]
    pub analysis: AnalysisConfig,

    #[serde(default)]
    pub thresholds: ThresholdsConfig,

    #[serde(default)]
    pub clustering: ClusteringConfig,

    #[serde(default)]
    pub pca: PcaConfig,

    #[serde(default)]
    pub heuristics: HeuristicsConfig,
}

/// Compiled configuration with glob patterns and the accessor regex
#[derive(Debug)]
pub struct CompiledConfig {
    pub analysis: AnalysisConfig,
    pub thresholds: ThresholdsConfig,
    pub clustering: ClusteringConfig,
    pub pca: PcaConfig,
    pub heuristics: HeuristicsConfig,
    exclude_patterns: Vec<Pattern>,
    /// Lowercased utility substrings
    utility_patterns: Vec<String>,
    /// `None` when no accessor prefixes are configured
    accessor_regex: Option<Regex>,
}

impl CompiledConfig {
    /// Create a compiled config from raw config
    pub fn from_config(config: HealthConfig) -> Result<Self, ConfigError> {
        let exclude_patterns = config
            .analysis
            .exclude
            .iter()
            .map(|p| Pattern::new(p).map_err(|e| ConfigError::PatternError(format!("{}: {}", p, e))))
            .collect::<Result<Vec<_>, _>>()?;

        let accessor_regex = compile_accessor_regex(&config.heuristics.accessor_prefixes)?;

        Ok(Self {
            utility_patterns: config
                .heuristics
                .utility_patterns
                .iter()
                .map(|p| p.to_lowercase())
                .collect(),
            exclude_patterns,
            accessor_regex,
            analysis: config.analysis,
            thresholds: config.thresholds,
            clustering: config.clustering,
            pca: config.pca,
            heuristics: config.heuristics,
        })
    }

    /// Built-in defaults
    pub fn defaults() -> Self {
        // The default accessor prefixes are plain words, so compilation cannot fail
        Self::from_config(HealthConfig::default()).unwrap_or_else(|_| Self {
            analysis: AnalysisConfig::default(),
            thresholds: ThresholdsConfig::default(),
            clustering: ClusteringConfig::default(),
            pca: PcaConfig::default(),
            heuristics: HeuristicsConfig::default(),
            exclude_patterns: Vec::new(),
            utility_patterns: Vec::new(),
            accessor_regex: None,
        })
    }

    /// Check if a directory should be skipped.
    ///
    /// `relative_path` is slash-normalized and relative to the analysis root.
    pub fn should_exclude_dir(&self, base_name: &str, relative_path: &str) -> bool {
        self.analysis
            .exclude_dirs
            .iter()
            .map(|d| d.replace('\\', "/"))
            .any(|d| d == base_name || d == relative_path)
            || self.should_exclude(relative_path)
    }

    /// Check if a path matches one of the exclude globs
    pub fn should_exclude(&self, relative_path: &str) -> bool {
        self.exclude_patterns.iter().any(|p| p.matches(relative_path))
    }

    /// Utility heuristic: test/helper/mock style names and accessors.
    ///
    /// `method_name` is the bare method name (no struct qualifier).
    pub fn is_utility_method(&self, method_name: &str) -> bool {
        let lower = method_name.to_lowercase();
        if self.utility_patterns.iter().any(|p| lower.contains(p.as_str())) {
            return true;
        }
        self.accessor_regex
            .as_ref()
            .is_some_and(|re| re.is_match(method_name))
    }

    /// Whether a word should be ignored when labelling a method cluster
    pub fn is_label_stop_word(&self, word: &str) -> bool {
        self.heuristics
            .label_stop_words
            .iter()
            .any(|w| w.eq_ignore_ascii_case(word))
    }
}

/// `GetX`/`get_x` style accessors for every configured prefix
fn compile_accessor_regex(prefixes: &[String]) -> Result<Option<Regex>, ConfigError> {
    let prefixes: Vec<&String> = prefixes.iter().filter(|p| !p.is_empty()).collect();
    if prefixes.is_empty() {
        return Ok(None);
    }

    let camel = prefixes
        .iter()
        .map(|p| regex_lite::escape(&capitalize_first(p)))
        .collect::<Vec<_>>()
        .join("|");
    let snake = prefixes
        .iter()
        .map(|p| regex_lite::escape(&p.to_lowercase()))
        .collect::<Vec<_>>()
        .join("|");

    let pattern = format!(r"^(?:{})[A-Z]|^(?:{})_[A-Za-z0-9]", camel, snake);
    Regex::new(&pattern)
        .map(Some)
        .map_err(|e| ConfigError::PatternError(format!("{}: {}", pattern, e)))
}

fn capitalize_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars.flat_map(|c| c.to_lowercase())).collect(),
        None => String::new(),
    }
}

/// Load configuration for a project.
///
/// A file path is read directly; a directory is searched for
/// `.code-health.toml` / `code-health.toml`, walking up to the filesystem root.
pub fn load_config(path: &Path) -> Result<HealthConfig, ConfigError> {
    let config_path = if path.is_file() {
        Some(path.to_path_buf())
    } else {
        find_config_file(path)
    };

    match config_path {
        Some(path) => {
            let content = fs::read_to_string(&path)?;
            let config: HealthConfig = toml::from_str(&content)?;
            Ok(config)
        }
        None => Ok(HealthConfig::default()),
    }
}

/// Load an explicitly named config file; unlike [`load_config`] a missing
/// file is an error rather than a fallback to defaults
pub fn load_config_file(path: &Path) -> Result<HealthConfig, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.to_path_buf()));
    }
    let content = fs::read_to_string(path)?;
    Ok(toml::from_str(&content)?)
}

/// Find the config file by searching up the directory tree
fn find_config_file(start_path: &Path) -> Option<PathBuf> {
    let config_names = [".code-health.toml", "code-health.toml"];

    let mut current = start_path.to_path_buf();
    loop {
        for name in &config_names {
            let config_path = current.join(name);
            if config_path.is_file() {
                return Some(config_path);
            }
        }

        if let Some(parent) = current.parent() {
            current = parent.to_path_buf();
        } else {
            break;
        }
    }

    None
}

/// Load and compile configuration
pub fn load_compiled_config(path: &Path) -> Result<CompiledConfig, ConfigError> {
    let config = load_config(path)?;
    CompiledConfig::from_config(config)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = HealthConfig::default();
        assert_eq!(config.thresholds.god_object_lcom4, 5);
        assert_eq!(config.thresholds.complex_function, 15);
        assert_eq!(config.clustering.min_cluster_size, 2);
        assert_eq!(config.pca.max_components, 5);
        assert!(config.analysis.exclude_tests);
        assert!(config.analysis.exclude_dirs.contains(&"vendor".to_string()));
    }

    #[test]
    fn test_parse_partial_config() {
        let toml = r#"
            [thresholds]
            complex_function = 20
            unstable_instability = 0.8

            [clustering]
            min_cluster_ratio = 0.25
        "#;

        let config: HealthConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.thresholds.complex_function, 20);
        assert_eq!(config.thresholds.unstable_instability, 0.8);
        // Untouched keys keep defaults
        assert_eq!(config.thresholds.god_object_afferent, 10);
        assert_eq!(config.clustering.min_cluster_ratio, 0.25);
        assert_eq!(config.clustering.min_call_frequency, 1);
        assert_eq!(config.pca.power_iterations, 100);
    }

    #[test]
    fn test_utility_detection() {
        let config = CompiledConfig::defaults();

        assert!(config.is_utility_method("testHelper"));
        assert!(config.is_utility_method("buildMock"));
        assert!(config.is_utility_method("GetName"));
        assert!(config.is_utility_method("IsReady"));
        assert!(config.is_utility_method("get_name"));
        assert!(config.is_utility_method("has_entries"));

        // Accessor shape needs an uppercase letter or underscore after the prefix
        assert!(!config.is_utility_method("Getaway"));
        assert!(!config.is_utility_method("issue"));
        assert!(!config.is_utility_method("process"));
        assert!(!config.is_utility_method("Settle"));
    }

    #[test]
    fn test_exclude_dirs_and_globs() {
        let toml = r#"
            [analysis]
            exclude_dirs = ["vendor", "internal/legacy"]
            exclude = ["gen/*"]
        "#;

        let config: HealthConfig = toml::from_str(toml).unwrap();
        let compiled = CompiledConfig::from_config(config).unwrap();

        assert!(compiled.should_exclude_dir("vendor", "third_party/vendor"));
        assert!(compiled.should_exclude_dir("legacy", "internal/legacy"));
        assert!(!compiled.should_exclude_dir("legacy", "legacy"));
        assert!(compiled.should_exclude_dir("proto", "gen/proto"));
        assert!(!compiled.should_exclude_dir("store", "store"));
    }

    #[test]
    fn test_invalid_glob_is_rejected() {
        let toml = r#"
            [analysis]
            exclude = ["src/[broken"]
        "#;

        let config: HealthConfig = toml::from_str(toml).unwrap();
        assert!(matches!(
            CompiledConfig::from_config(config),
            Err(ConfigError::PatternError(_))
        ));
    }

    #[test]
    fn test_load_config_from_directory() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(".code-health.toml"),
            "[thresholds]\ncomplex_function = 12\n",
        )
        .unwrap();
        let nested = dir.path().join("src").join("deep");
        fs::create_dir_all(&nested).unwrap();

        let config = load_config(&nested).unwrap();
        assert_eq!(config.thresholds.complex_function, 12);
    }

    #[test]
    fn test_explicit_config_file_must_exist() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            load_config_file(&missing),
            Err(ConfigError::NotFound(p)) if p == missing
        ));

        let present = dir.path().join("health.toml");
        fs::write(&present, "[thresholds]\ngod_object_lcom4 = 7\n").unwrap();
        assert_eq!(load_config_file(&present).unwrap().thresholds.god_object_lcom4, 7);
    }

    #[test]
    fn test_label_stop_words() {
        let config = CompiledConfig::defaults();
        assert!(config.is_label_stop_word("Get"));
        assert!(config.is_label_stop_word("do"));
        assert!(!config.is_label_stop_word("cache"));
    }
}
