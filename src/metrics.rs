//! Per-package metric records handed to diagnostics and renderers

use serde::Serialize;

use crate::cohesion::CohesionResult;
use crate::complexity::ComplexityResult;
use crate::coupling::CouplingResult;
use crate::field_clustering::FieldClusterResult;
use crate::method_clustering::MethodClusterResult;

/// Everything measured for one struct
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StructResult {
    #[serde(flatten)]
    pub cohesion: CohesionResult,
    /// `None` when the struct has no private non-utility methods
    pub method_clusters: Option<MethodClusterResult>,
    /// `None` when there is too little data for the field matrix
    pub field_clusters: Option<FieldClusterResult>,
}

impl StructResult {
    pub fn name(&self) -> &str {
        &self.cohesion.struct_name
    }

    pub fn file_path(&self) -> &str {
        &self.cohesion.file_path
    }

    pub fn lcom4(&self) -> usize {
        self.cohesion.lcom4_score
    }
}

/// Metrics of one package: coupling plus nested struct and function results
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PackageResult {
    pub name: String,
    /// Project-relative path, empty for the root package
    pub path: String,
    pub afferent: usize,
    pub efferent: usize,
    pub instability: f64,
    pub dependency_depth: usize,
    pub structs: Vec<StructResult>,
    pub functions: Vec<ComplexityResult>,
    pub total_loc: usize,
    pub avg_func_loc: f64,
    pub func_count: usize,
    pub file_count: usize,
}

impl PackageResult {
    /// Assemble a package record, deriving the size aggregates
    pub fn new(
        path: impl Into<String>,
        coupling: CouplingResult,
        structs: Vec<StructResult>,
        functions: Vec<ComplexityResult>,
        total_loc: usize,
        file_count: usize,
    ) -> Self {
        let func_count = functions.len();
        let avg_func_loc = if func_count == 0 {
            0.0
        } else {
            functions.iter().map(|f| f.loc).sum::<usize>() as f64 / func_count as f64
        };

        Self {
            name: coupling.package_name,
            path: path.into(),
            afferent: coupling.afferent,
            efferent: coupling.efferent,
            instability: coupling.instability,
            dependency_depth: coupling.dependency_depth,
            structs,
            functions,
            total_loc,
            avg_func_loc,
            func_count,
            file_count,
        }
    }

    pub fn struct_count(&self) -> usize {
        self.structs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn function(name: &str, loc: usize) -> ComplexityResult {
        ComplexityResult {
            func_name: name.to_string(),
            file_path: "lib.rs".to_string(),
            complexity: 1,
            loc,
            dependencies: Vec::new(),
            internal_deps: Vec::new(),
            external_deps: Vec::new(),
            dependency_count: 0,
            efferent: 0,
            afferent: 0,
            instability: 0.0,
        }
    }

    fn coupling() -> CouplingResult {
        CouplingResult {
            package_name: "store".to_string(),
            afferent: 3,
            efferent: 1,
            instability: 0.25,
            dependency_depth: 1,
        }
    }

    #[test]
    fn test_average_function_loc() {
        let package = PackageResult::new(
            "store",
            coupling(),
            Vec::new(),
            vec![function("a", 10), function("b", 5)],
            120,
            2,
        );

        assert_eq!(package.name, "store");
        assert_eq!(package.func_count, 2);
        assert_eq!(package.avg_func_loc, 7.5);
        assert_eq!(package.afferent, 3);
        assert_eq!(package.dependency_depth, 1);
    }

    #[test]
    fn test_empty_package() {
        let package = PackageResult::new("store", coupling(), Vec::new(), Vec::new(), 0, 0);
        assert_eq!(package.avg_func_loc, 0.0);
        assert_eq!(package.struct_count(), 0);
    }

    #[test]
    fn test_struct_result_flattens_cohesion() {
        let result = StructResult {
            cohesion: CohesionResult {
                struct_name: "Store".to_string(),
                file_path: "store/store.rs".to_string(),
                lcom4_score: 2,
                components: vec![vec!["Store.get".to_string()], vec!["Store.put".to_string()]],
            },
            method_clusters: None,
            field_clusters: None,
        };

        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["struct_name"], "Store");
        assert_eq!(json["lcom4_score"], 2);
        assert!(json["method_clusters"].is_null());
    }
}
