//! Cyclomatic complexity and function-level coupling

use std::collections::BTreeSet;

use serde::Serialize;

use crate::coupling::{instability, is_internal_path};
use crate::facts::{FunctionFacts, PackageFacts};

/// Complexity and coupling for one function
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComplexityResult {
    pub func_name: String,
    pub file_path: String,
    pub complexity: usize,
    pub loc: usize,
    /// Every import referenced from the body, sorted
    pub dependencies: Vec<String>,
    pub internal_deps: Vec<String>,
    pub external_deps: Vec<String>,
    pub dependency_count: usize,
    /// Distinct imported packages referenced from the body
    pub efferent: usize,
    /// Other functions of the same package calling this one
    pub afferent: usize,
    pub instability: f64,
}

/// 1 + decision points; bodiless declarations score 1
pub fn cyclomatic_complexity(function: &FunctionFacts) -> usize {
    if !function.has_body {
        return 1;
    }
    1 + function.decision_points.total()
}

/// Analyze every function of a package.
///
/// Afferent coupling is resolved by exact qualified-name match against the
/// callees of the other functions in the same package.
pub fn analyze_package(package: &PackageFacts, module_path: &str) -> Vec<ComplexityResult> {
    package
        .functions
        .iter()
        .map(|function| analyze_function(function, &package.functions, module_path))
        .collect()
}

fn analyze_function(
    function: &FunctionFacts,
    siblings: &[FunctionFacts],
    module_path: &str,
) -> ComplexityResult {
    let dependencies: Vec<String> = function.imported_packages_used.iter().cloned().collect();
    let (internal_deps, external_deps): (Vec<String>, Vec<String>) = dependencies
        .iter()
        .cloned()
        .partition(|dep| is_internal_path(dep, module_path));

    let callers: BTreeSet<&str> = siblings
        .iter()
        .filter(|other| other.qualified_name != function.qualified_name)
        .filter(|other| other.callees.contains(&function.qualified_name))
        .map(|other| other.qualified_name.as_str())
        .collect();

    let efferent = dependencies.len();
    let afferent = callers.len();

    ComplexityResult {
        func_name: function.qualified_name.clone(),
        file_path: function.file_path.clone(),
        complexity: cyclomatic_complexity(function),
        loc: if function.has_body {
            function.body_line_count
        } else {
            0
        },
        dependency_count: dependencies.len(),
        dependencies,
        internal_deps,
        external_deps,
        efferent,
        afferent,
        instability: instability(afferent, efferent),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::DecisionPoints;

    const MODULE: &str = "example.com/app";

    #[test]
    fn test_base_complexity_is_one() {
        let f = FunctionFacts::new("run", "main.rs");
        assert_eq!(cyclomatic_complexity(&f), 1);
    }

    #[test]
    fn test_each_if_adds_one() {
        let mut f = FunctionFacts::new("run", "main.rs");
        f.decision_points.loops = 2;
        f.decision_points.logical_operators = 1;
        let before = cyclomatic_complexity(&f);

        f.decision_points.if_statements += 1;
        assert_eq!(cyclomatic_complexity(&f), before + 1);
    }

    #[test]
    fn test_all_decision_kinds_count() {
        let mut f = FunctionFacts::new("dispatch", "d.rs");
        f.decision_points = DecisionPoints {
            if_statements: 2,
            loops: 1,
            switches: 1,
            case_clauses: 3,
            select_cases: 0,
            logical_operators: 2,
        };
        assert_eq!(cyclomatic_complexity(&f), 10);
    }

    #[test]
    fn test_bodiless_function() {
        let mut f = FunctionFacts::new("Store.get", "s.rs");
        f.has_body = false;
        f.body_line_count = 12;
        f.decision_points.if_statements = 4;

        let mut package = PackageFacts::new("store", "store");
        package.functions.push(f);
        let results = analyze_package(&package, MODULE);
        assert_eq!(results[0].complexity, 1);
        assert_eq!(results[0].loc, 0);
    }

    #[test]
    fn test_dependencies_split_internal_external() {
        let mut f = FunctionFacts::new("load", "load.rs");
        f.imported_packages_used.insert("example.com/app/store".into());
        f.imported_packages_used.insert("serde_json".into());
        f.imported_packages_used.insert("example.com/application".into());

        let mut package = PackageFacts::new("app", "");
        package.functions.push(f);
        let result = &analyze_package(&package, MODULE)[0];

        assert_eq!(result.internal_deps, vec!["example.com/app/store".to_string()]);
        assert_eq!(result.external_deps.len(), 2);
        assert_eq!(result.dependency_count, 3);
        assert_eq!(result.efferent, 3);
        assert_eq!(result.afferent, 0);
        assert_eq!(result.instability, 1.0);
    }

    #[test]
    fn test_afferent_counts_distinct_callers() {
        let mut helper = FunctionFacts::new("helper", "a.rs");
        helper.imported_packages_used.insert("fmt".into());
        let mut first = FunctionFacts::new("first", "a.rs");
        first.callees.insert("helper".into());
        let mut second = FunctionFacts::new("second", "a.rs");
        second.callees.insert("helper".into());
        // Recursion does not count
        helper.callees.insert("helper".into());

        let mut package = PackageFacts::new("app", "");
        package.functions = vec![helper, first, second];
        let results = analyze_package(&package, MODULE);

        assert_eq!(results[0].afferent, 2);
        assert_eq!(results[0].efferent, 1);
        assert!((results[0].instability - 1.0 / 3.0).abs() < 1e-12);
        assert_eq!(results[1].afferent, 0);
        assert_eq!(results[1].instability, 0.0);
    }

    #[test]
    fn test_receiver_qualified_callers() {
        let mut caller = FunctionFacts::new("Cache.refresh", "c.rs");
        caller.callees.insert("Cache.evict".into());
        let evict = FunctionFacts::new("Cache.evict", "c.rs");
        let other_evict = FunctionFacts::new("Pool.evict", "p.rs");

        let mut package = PackageFacts::new("cache", "cache");
        package.functions = vec![caller, evict, other_evict];
        let results = analyze_package(&package, MODULE);

        assert_eq!(results[1].afferent, 1);
        assert_eq!(results[2].afferent, 0);
    }
}
