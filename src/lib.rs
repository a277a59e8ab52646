//! # code-health - Cohesion, Complexity and Coupling Analysis
//!
//! Measures the structural health of a codebase and cross-references the
//! metrics into actionable findings.
//!
//! ## Overview
//!
//! Every run works on a language-neutral fact model ([`facts`]): packages,
//! structs with their fields and methods, functions with their decision
//! points, calls and imports. Facts come from the Rust front end
//! ([`extract`]) or from a JSON fact file written by any other parser.
//!
//! From the facts, five analyzers compute:
//!
//! 1. **LCOM4** - connected components of a struct's methods and fields
//! 2. **Cyclomatic complexity** - per function, with function-level coupling
//! 3. **Package coupling** - Ca, Ce, instability and dependency depth
//! 4. **Method islands** - groups of private methods that never call each other
//! 5. **Field clusters** - latent responsibilities in the method × field matrix
//!
//! The diagnostics engine then combines them into findings such as
//! *God Object* (low cohesion + high afferent coupling) or
//! *Unstable Foundation* (high afferent coupling + high instability).
//!
//! ## Usage
//!
//! ```bash
//! # Summary of the current crate
//! code-health .
//!
//! # Full JSON report
//! code-health -f json -o report.json ./my-crate
//!
//! # Facts produced by another front end
//! code-health --facts facts.json
//! ```

pub mod analysis;
pub mod cohesion;
pub mod complexity;
pub mod config;
pub mod coupling;
pub mod diagnostics;
pub mod extract;
pub mod facts;
pub mod field_clustering;
pub mod method_clustering;
pub mod metrics;
pub mod report;
pub mod union_find;

pub use analysis::{
    AnalysisError, AnalysisReport, analyze_facts, analyze_path, analyze_path_with_deadline,
};
pub use cohesion::CohesionResult;
pub use complexity::{ComplexityResult, cyclomatic_complexity};
pub use config::{
    AnalysisConfig, ClusteringConfig, CompiledConfig, ConfigError, HealthConfig,
    HeuristicsConfig, PcaConfig, ThresholdsConfig, load_compiled_config, load_config,
    load_config_file,
};
pub use coupling::{CouplingResult, DependencyGraph, PackageDependency};
pub use diagnostics::{Finding, FindingKind, Severity, SeverityCounts, run_diagnostics};
pub use extract::{ExtractError, extract_project, extract_source};
pub use facts::{
    DecisionPoints, FactsError, FieldUsage, FileFacts, FunctionFacts, MethodFacts, PackageFacts,
    ProjectFacts, SkippedDir, StructFacts,
};
pub use field_clustering::FieldClusterResult;
pub use method_clustering::{MethodCluster, MethodClusterResult};
pub use metrics::{PackageResult, StructResult};
pub use report::{SummaryCounts, write_json, write_summary};
pub use union_find::UnionFind;
