//! Analysis pipeline
//!
//! facts → dependency graph (barrier) → per-package metrics (parallel) →
//! diagnostics (barrier). Package results come back in path order no matter
//! how the work was scheduled, so two runs over the same facts serialize to
//! the same bytes.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Instant;

use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cohesion;
use crate::complexity;
use crate::config::CompiledConfig;
use crate::coupling::DependencyGraph;
use crate::diagnostics::{self, Finding};
use crate::extract::{self, ExtractError};
use crate::facts::{PackageFacts, ProjectFacts, SkippedDir};
use crate::field_clustering;
use crate::method_clustering;
use crate::metrics::{PackageResult, StructResult};

/// Errors that abort a run
#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error("Invalid path: {0}")]
    InvalidPath(PathBuf),

    #[error("Failed to extract facts: {0}")]
    Extract(#[from] ExtractError),

    #[error("Deadline exceeded after {completed} of {total} packages")]
    DeadlineExceeded { completed: usize, total: usize },

    #[error("Internal invariant violated in package '{package}': {detail}")]
    InvariantViolation { package: String, detail: String },
}

/// Complete output of one run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub module_path: String,
    pub total_loc: usize,
    pub findings: Vec<Finding>,
    pub packages: Vec<PackageResult>,
    /// Directories left out because they failed to parse
    pub skipped_dirs: Vec<SkippedDir>,
    /// In-project import cycles; dependency depth is under-counted along them
    pub dependency_cycles: Vec<Vec<String>>,
}

impl AnalysisReport {
    pub fn struct_count(&self) -> usize {
        self.packages.iter().map(|p| p.structs.len()).sum()
    }

    pub fn function_count(&self) -> usize {
        self.packages.iter().map(|p| p.functions.len()).sum()
    }
}

/// Extract facts from a source tree and analyze them
pub fn analyze_path(path: &Path, config: &CompiledConfig) -> Result<AnalysisReport, AnalysisError> {
    analyze_path_with_deadline(path, config, None)
}

/// Like [`analyze_path`], aborting once `deadline` passes
pub fn analyze_path_with_deadline(
    path: &Path,
    config: &CompiledConfig,
    deadline: Option<Instant>,
) -> Result<AnalysisReport, AnalysisError> {
    if !path.exists() {
        return Err(AnalysisError::InvalidPath(path.to_path_buf()));
    }

    let start = Instant::now();
    let facts = extract::extract_project(path, config)?;
    info!(
        packages = facts.packages.len(),
        skipped = facts.skipped_dirs.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "extracted facts"
    );

    analyze_facts(&facts, config, deadline)
}

/// Run every analyzer and the diagnostics rules over a fact model
pub fn analyze_facts(
    facts: &ProjectFacts,
    config: &CompiledConfig,
    deadline: Option<Instant>,
) -> Result<AnalysisReport, AnalysisError> {
    let start = Instant::now();

    let graph = DependencyGraph::build(&facts.module_path, &facts.packages);
    let depths = graph.dependency_depths();
    let dependency_cycles = graph.detect_cycles();
    if !dependency_cycles.is_empty() {
        warn!(
            cycles = dependency_cycles.len(),
            "import cycles found, dependency depth is under-counted along them"
        );
    }
    debug!(
        packages = graph.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "built dependency graph"
    );

    let mut ordered: Vec<&PackageFacts> = facts.packages.iter().collect();
    ordered.sort_by(|a, b| a.path.cmp(&b.path));

    let total = ordered.len();
    let completed = AtomicUsize::new(0);
    let packages: Vec<PackageResult> = ordered
        .par_iter()
        .map(|package| {
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Err(AnalysisError::DeadlineExceeded {
                    completed: completed.load(Ordering::SeqCst),
                    total,
                });
            }
            let result = analyze_package(package, &graph, &depths, config)?;
            completed.fetch_add(1, Ordering::SeqCst);
            Ok(result)
        })
        .collect::<Result<Vec<_>, _>>()?;
    debug!(
        elapsed_ms = start.elapsed().as_millis() as u64,
        "computed package metrics"
    );

    let findings = diagnostics::run_diagnostics(&packages, &config.thresholds);
    let counts = diagnostics::count_by_severity(&findings);
    info!(
        packages = packages.len(),
        critical = counts.critical,
        warning = counts.warning,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "analysis complete"
    );

    Ok(AnalysisReport {
        module_path: facts.module_path.clone(),
        total_loc: packages.iter().map(|p| p.total_loc).sum(),
        findings,
        packages,
        skipped_dirs: facts.skipped_dirs.clone(),
        dependency_cycles,
    })
}

fn analyze_package(
    package: &PackageFacts,
    graph: &DependencyGraph,
    depths: &std::collections::BTreeMap<String, usize>,
    config: &CompiledConfig,
) -> Result<PackageResult, AnalysisError> {
    let invariant = |detail: String| AnalysisError::InvariantViolation {
        package: package.path.clone(),
        detail,
    };

    let import_path = package.import_path(graph.module_path());
    let coupling = graph
        .coupling(&package.name, &import_path, depths)
        .ok_or_else(|| invariant(format!("'{}' is missing from the dependency graph", import_path)))?;

    let structs = package
        .structs
        .iter()
        .map(|s| {
            s.validate().map_err(|e| invariant(e.to_string()))?;
            Ok(StructResult {
                cohesion: cohesion::analyze_struct(s),
                method_clusters: method_clustering::analyze_struct(s, config),
                field_clusters: field_clustering::analyze_struct(s, config),
            })
        })
        .collect::<Result<Vec<_>, AnalysisError>>()?;

    let functions = complexity::analyze_package(package, graph.module_path());
    debug!(
        package = %package.path,
        structs = structs.len(),
        functions = functions.len(),
        "analyzed package"
    );

    Ok(PackageResult::new(
        package.path.clone(),
        coupling,
        structs,
        functions,
        package.total_loc(),
        package.files.len(),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::FindingKind;
    use crate::facts::{FieldUsage, FileFacts, FunctionFacts, MethodFacts, StructFacts};
    use std::time::Duration;

    const MODULE: &str = "example.com/app";

    /// `core` imported by twelve packages and holding an LCOM4=6 struct
    fn project() -> ProjectFacts {
        let mut facts = ProjectFacts::new(MODULE);

        let mut manager = StructFacts::new("Manager", "core/manager.rs")
            .with_fields(["a", "b", "c", "d", "e", "f"]);
        for field in ["a", "b", "c", "d", "e", "f"] {
            manager = manager.with_method(
                MethodFacts::new(format!("Manager.use_{}", field), false)
                    .with_field(field, FieldUsage::Read),
            );
        }

        let mut core = PackageFacts::new("core", "core");
        core.structs.push(manager);
        let mut helper = FunctionFacts::new("helper", "core/manager.rs");
        helper.body_line_count = 8;
        core.functions.push(helper);
        core.files.push(FileFacts {
            path: "core/manager.rs".into(),
            line_count: 120,
        });
        facts.packages.push(core);

        for i in 0..12 {
            let mut client = PackageFacts::new(format!("client{}", i), format!("client{}", i));
            client.imports.insert(format!("{}/core", MODULE));
            client.files.push(FileFacts {
                path: format!("client{}/lib.rs", i),
                line_count: 10,
            });
            facts.packages.push(client);
        }

        facts
    }

    #[test]
    fn test_god_object_through_pipeline() {
        let config = CompiledConfig::defaults();
        let report = analyze_facts(&project(), &config, None).unwrap();

        assert_eq!(report.packages.len(), 13);
        assert_eq!(report.total_loc, 240);
        // Sorted by path
        assert_eq!(report.packages[0].path, "client0");
        assert_eq!(report.packages[12].path, "core");

        let core = &report.packages[12];
        assert_eq!(core.afferent, 12);
        assert_eq!(core.avg_func_loc, 8.0);
        assert_eq!(core.structs[0].lcom4(), 6);

        let god: Vec<_> = report
            .findings
            .iter()
            .filter(|f| f.kind == FindingKind::GodObject)
            .collect();
        assert_eq!(god.len(), 1);
        assert_eq!(god[0].target_name, "core.Manager");
        assert_eq!(god[0].evidence["lcom4_score"], serde_json::json!(6));
        assert_eq!(god[0].evidence["afferent"], serde_json::json!(12));
    }

    #[test]
    fn test_runs_are_byte_identical() {
        let config = CompiledConfig::defaults();
        let facts = project();

        let first = serde_json::to_string(&analyze_facts(&facts, &config, None).unwrap()).unwrap();
        let second = serde_json::to_string(&analyze_facts(&facts, &config, None).unwrap()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_expired_deadline_fails_the_run() {
        let config = CompiledConfig::defaults();
        let past = Instant::now() - Duration::from_millis(1);

        let err = analyze_facts(&project(), &config, Some(past)).unwrap_err();
        assert!(matches!(err, AnalysisError::DeadlineExceeded { total: 13, .. }));
    }

    #[test]
    fn test_invalid_struct_facts_abort() {
        let mut facts = ProjectFacts::new(MODULE);
        let mut pkg = PackageFacts::new("broken", "broken");
        pkg.structs.push(
            StructFacts::new("Svc", "broken/svc.rs")
                .with_method(MethodFacts::new("Svc.run", false).with_field("ghost", FieldUsage::Read)),
        );
        facts.packages.push(pkg);

        let err = analyze_facts(&facts, &CompiledConfig::defaults(), None).unwrap_err();
        assert!(matches!(err, AnalysisError::InvariantViolation { ref package, .. } if package == "broken"));
    }

    #[test]
    fn test_missing_root_is_invalid_path() {
        let err = analyze_path(Path::new("/definitely/not/here"), &CompiledConfig::defaults()).unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidPath(_)));
    }

    #[test]
    fn test_cycles_reported() {
        let mut facts = ProjectFacts::new(MODULE);
        let mut a = PackageFacts::new("a", "a");
        a.imports.insert(format!("{}/b", MODULE));
        let mut b = PackageFacts::new("b", "b");
        b.imports.insert(format!("{}/a", MODULE));
        facts.packages = vec![b, a];

        let report = analyze_facts(&facts, &CompiledConfig::defaults(), None).unwrap();
        assert_eq!(
            report.dependency_cycles,
            vec![vec![format!("{}/a", MODULE), format!("{}/b", MODULE)]]
        );
        assert_eq!(report.packages[0].path, "a");
    }
}
