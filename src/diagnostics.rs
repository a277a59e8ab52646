//! Cross-metric diagnostics
//!
//! A fixed rule set evaluated once per run over every package's results.
//! Each rule reads metrics produced by the analyzers and emits findings that
//! carry the exact values which triggered them.
//!
//! | Rule | Condition | Severity |
//! |------|-----------|----------|
//! | God Object | LCOM4 ≥ 5 and package Ca ≥ 10 | Critical |
//! | Unstable Foundation | Ca ≥ 10 and I ≥ 0.7 | Critical |
//! | Overly Complex Function | complexity ≥ 15 | Warning |
//! | Ambiguous Struct | LCOM4 ≥ 3 and a method with complexity ≥ 10 | Warning |
//! | Method Islands | ≥ 2 private method clusters | Warning |
//! | Field Clusters | PCA estimate ≥ 2 | Warning, Critical from 3 |
//!
//! Thresholds come from [`ThresholdsConfig`]. Findings are emitted in rule
//! order, then package order, then declaration order.

use std::collections::BTreeMap;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::ThresholdsConfig;
use crate::metrics::{PackageResult, StructResult};

/// Finding severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Severity {
    /// Should be addressed in regular maintenance
    Warning,
    /// Actively hurting the codebase
    Critical,
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Severity::Warning => write!(f, "Warning"),
            Severity::Critical => write!(f, "Critical"),
        }
    }
}

/// Rule that produced a finding
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    /// Low cohesion struct in a heavily depended-upon package
    GodObject,
    /// Heavily depended-upon package that itself depends on much
    UnstableFoundation,
    /// Function with excessive cyclomatic complexity
    ComplexFunction,
    /// Low cohesion struct with complex methods
    AmbiguousStruct,
    /// Disconnected groups of private methods
    MethodIslands,
    /// Several latent groups in the method × field usage matrix
    FieldClusters,
}

impl std::fmt::Display for FindingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FindingKind::GodObject => write!(f, "God Object"),
            FindingKind::UnstableFoundation => write!(f, "Unstable Foundation"),
            FindingKind::ComplexFunction => write!(f, "Overly Complex Function"),
            FindingKind::AmbiguousStruct => write!(f, "Ambiguous Struct"),
            FindingKind::MethodIslands => write!(f, "Split Responsibility (Method Islands)"),
            FindingKind::FieldClusters => write!(f, "Split Responsibility (Field Clusters)"),
        }
    }
}

impl FindingKind {
    /// What this kind of finding means
    pub fn description(&self) -> &'static str {
        match self {
            FindingKind::GodObject => {
                "A struct doing many unrelated things that much of the project depends on. Every change to it risks breaking its many dependents."
            }
            FindingKind::UnstableFoundation => {
                "A package many others rely on, which itself depends on many packages. Changes flowing into it ripple out to all of its dependents."
            }
            FindingKind::ComplexFunction => {
                "A function with many independent paths through its control flow. It is hard to test exhaustively and hard to change safely."
            }
            FindingKind::AmbiguousStruct => {
                "A struct with weak cohesion that also contains complex logic, a sign that several concerns are mixed together."
            }
            FindingKind::MethodIslands => {
                "Private methods form groups that never call each other. Each group is likely a separate responsibility."
            }
            FindingKind::FieldClusters => {
                "Methods split into groups that use different subsets of the fields. The struct probably bundles several responsibilities."
            }
        }
    }
}

/// One diagnostic finding
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Finding {
    pub kind: FindingKind,
    /// `package`, `package.Struct` or `package.function`
    pub target_name: String,
    pub severity: Severity,
    pub message: String,
    /// Metric values that triggered the rule
    pub evidence: BTreeMap<String, Value>,
    /// Anchor into a rendered report
    pub related_path: String,
}

impl Finding {
    fn new(
        kind: FindingKind,
        severity: Severity,
        target_name: String,
        message: String,
        related_path: String,
    ) -> Self {
        Self {
            kind,
            target_name,
            severity,
            message,
            evidence: BTreeMap::new(),
            related_path,
        }
    }

    fn with_evidence(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.evidence.insert(key.to_string(), value.into());
        self
    }
}

/// Finding counts by severity
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub warning: usize,
}

pub fn count_by_severity(findings: &[Finding]) -> SeverityCounts {
    findings.iter().fold(SeverityCounts::default(), |mut counts, f| {
        match f.severity {
            Severity::Critical => counts.critical += 1,
            Severity::Warning => counts.warning += 1,
        }
        counts
    })
}

/// Evaluate every rule, in order, over all packages
pub fn run_diagnostics(packages: &[PackageResult], thresholds: &ThresholdsConfig) -> Vec<Finding> {
    let mut findings = Vec::new();
    findings.extend(detect_god_objects(packages, thresholds));
    findings.extend(detect_unstable_foundations(packages, thresholds));
    findings.extend(detect_complex_functions(packages, thresholds));
    findings.extend(detect_ambiguous_structs(packages, thresholds));
    findings.extend(detect_method_islands(packages));
    findings.extend(detect_field_clusters(packages, thresholds));
    findings
}

fn struct_anchor(package: &PackageResult, s: &StructResult) -> String {
    format!("#struct-{}-{}", package.path, s.name())
}

fn qualified(package: &PackageResult, name: &str) -> String {
    format!("{}.{}", package.name, name)
}

fn detect_god_objects(packages: &[PackageResult], t: &ThresholdsConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for package in packages.iter().filter(|p| p.afferent >= t.god_object_afferent) {
        for s in package.structs.iter().filter(|s| s.lcom4() >= t.god_object_lcom4) {
            let message = format!(
                "Struct '{}' has excessive responsibilities (LCOM4={}) and is heavily depended upon (Ca={}). \
                 Consider splitting into smaller, focused structs.",
                s.name(),
                s.lcom4(),
                package.afferent
            );
            findings.push(
                Finding::new(
                    FindingKind::GodObject,
                    Severity::Critical,
                    qualified(package, s.name()),
                    message,
                    struct_anchor(package, s),
                )
                .with_evidence("lcom4_score", s.lcom4())
                .with_evidence("afferent", package.afferent)
                .with_evidence("package", package.name.as_str())
                .with_evidence("file_path", s.file_path()),
            );
        }
    }

    findings
}

fn detect_unstable_foundations(packages: &[PackageResult], t: &ThresholdsConfig) -> Vec<Finding> {
    packages
        .iter()
        .filter(|p| p.afferent >= t.unstable_afferent && p.instability >= t.unstable_instability)
        .map(|package| {
            let message = format!(
                "Package '{}' is heavily depended upon (Ca={}) but highly unstable (I={:.2}). \
                 This creates a fragile foundation. Consider stabilizing this package by reducing dependencies.",
                package.name, package.afferent, package.instability
            );
            Finding::new(
                FindingKind::UnstableFoundation,
                Severity::Critical,
                package.name.clone(),
                message,
                format!("#package-{}", package.path),
            )
            .with_evidence("afferent", package.afferent)
            .with_evidence("efferent", package.efferent)
            .with_evidence("instability", package.instability)
            .with_evidence("package", package.name.as_str())
        })
        .collect()
}

fn detect_complex_functions(packages: &[PackageResult], t: &ThresholdsConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for package in packages {
        for f in package.functions.iter().filter(|f| f.complexity >= t.complex_function) {
            let message = format!(
                "Function '{}' is too complex (Complexity={}). High complexity makes code hard to test and maintain. \
                 Consider refactoring into smaller functions.",
                f.func_name, f.complexity
            );
            findings.push(
                Finding::new(
                    FindingKind::ComplexFunction,
                    Severity::Warning,
                    qualified(package, &f.func_name),
                    message,
                    format!("#function-{}-{}", package.path, f.func_name),
                )
                .with_evidence("complexity", f.complexity)
                .with_evidence("function", f.func_name.as_str())
                .with_evidence("package", package.name.as_str())
                .with_evidence("file_path", f.file_path.as_str()),
            );
        }
    }

    findings
}

fn detect_ambiguous_structs(packages: &[PackageResult], t: &ThresholdsConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for package in packages {
        for s in package.structs.iter().filter(|s| s.lcom4() >= t.ambiguous_lcom4) {
            let prefix = format!("{}.", s.name());
            let mut complex_methods: Vec<&str> = package
                .functions
                .iter()
                .filter(|f| f.func_name.len() > prefix.len() && f.func_name.starts_with(&prefix))
                .filter(|f| f.complexity >= t.ambiguous_method_complexity)
                .map(|f| f.func_name.as_str())
                .collect();
            if complex_methods.is_empty() {
                continue;
            }
            complex_methods.sort_unstable();

            let message = format!(
                "Struct '{}' has unclear responsibilities (LCOM4={}) and contains complex logic. \
                 This suggests mixed concerns. Consider refactoring.",
                s.name(),
                s.lcom4()
            );
            findings.push(
                Finding::new(
                    FindingKind::AmbiguousStruct,
                    Severity::Warning,
                    qualified(package, s.name()),
                    message,
                    struct_anchor(package, s),
                )
                .with_evidence("lcom4_score", s.lcom4())
                .with_evidence("complex_methods", complex_methods)
                .with_evidence("package", package.name.as_str())
                .with_evidence("file_path", s.file_path()),
            );
        }
    }

    findings
}

fn detect_method_islands(packages: &[PackageResult]) -> Vec<Finding> {
    let mut findings = Vec::new();

    for package in packages {
        for s in &package.structs {
            let Some(mc) = s.method_clusters.as_ref().filter(|mc| mc.has_multiple_islands) else {
                continue;
            };

            let summary = mc
                .clusters
                .iter()
                .map(|c| format!("Cluster {} ({} methods): {}", c.id, c.size, c.responsibility_hint))
                .collect::<Vec<_>>()
                .join("; ");
            let message = format!(
                "Struct '{}' has {} isolated groups of private methods, suggesting {} distinct responsibilities. \
                 Private methods that don't call each other likely serve different purposes. \
                 Clusters: {}. Consider splitting into separate structs.",
                s.name(),
                mc.cluster_count(),
                mc.cluster_count(),
                summary
            );
            let clusters: Vec<Value> = mc
                .clusters
                .iter()
                .map(|c| {
                    json!({
                        "id": c.id,
                        "methods": c.methods,
                        "size": c.size,
                        "called_by": c.called_by,
                        "responsibility_hint": c.responsibility_hint,
                    })
                })
                .collect();

            findings.push(
                Finding::new(
                    FindingKind::MethodIslands,
                    Severity::Warning,
                    qualified(package, s.name()),
                    message,
                    struct_anchor(package, s),
                )
                .with_evidence("cluster_count", mc.cluster_count())
                .with_evidence("total_private_methods", mc.total_private_methods)
                .with_evidence("clusters", clusters)
                .with_evidence("package", package.name.as_str())
                .with_evidence("file_path", s.file_path()),
            );
        }
    }

    findings
}

fn detect_field_clusters(packages: &[PackageResult], t: &ThresholdsConfig) -> Vec<Finding> {
    let mut findings = Vec::new();

    for package in packages {
        for s in &package.structs {
            let Some(fm) = s
                .field_clusters
                .as_ref()
                .filter(|fm| fm.has_multiple_responsibilities)
            else {
                continue;
            };

            let severity = if fm.estimated_clusters >= t.field_cluster_critical {
                Severity::Critical
            } else {
                Severity::Warning
            };
            let message = format!(
                "Struct '{}' shows {} distinct responsibility patterns in method-field usage (PCA analysis). {}",
                s.name(),
                fm.estimated_clusters,
                fm.recommendation
            );

            findings.push(
                Finding::new(
                    FindingKind::FieldClusters,
                    severity,
                    qualified(package, s.name()),
                    message,
                    struct_anchor(package, s),
                )
                .with_evidence("estimated_clusters", fm.estimated_clusters)
                .with_evidence("explained_variance", fm.explained_variance.clone())
                .with_evidence("method_count", fm.method_names.len())
                .with_evidence("field_count", fm.field_names.len())
                .with_evidence("package", package.name.as_str())
                .with_evidence("file_path", s.file_path())
                .with_evidence("recommendations", fm.recommendation.as_str()),
            );
        }
    }

    findings
}
