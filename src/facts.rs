//! Structural fact model
//!
//! The analyzers never look at source text. They consume the facts defined
//! here: per-package structs, fields, methods, functions, calls and imports.
//! Facts are produced once per run (by [`crate::extract`] for Rust sources,
//! or loaded from a JSON fact file written by any other front end) and are
//! read-only afterwards.
//!
//! Every collection is either a `Vec` in declaration order or a `BTreeMap` /
//! `BTreeSet`, so two runs over the same facts see the same iteration order.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading or validating facts
#[derive(Error, Debug)]
pub enum FactsError {
    #[error("Failed to read fact file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse fact file: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Invalid field usage weight {0} (expected 0-3)")]
    InvalidUsageWeight(u8),

    #[error("Method '{method}' uses '{field}', which is not a field of '{struct_name}'")]
    UnknownField {
        struct_name: String,
        method: String,
        field: String,
    },

    #[error("Method '{method}' is attached to '{struct_name}' but qualified for another receiver")]
    ForeignMethod { struct_name: String, method: String },

    #[error("Method '{method}' appears more than once on '{struct_name}'")]
    DuplicateMethod { struct_name: String, method: String },
}

/// How a method touches a field.
///
/// Serialized as its numeric weight: 0 unused, 1 read-only, 2 write-only,
/// 3 read and write.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(try_from = "u8", into = "u8")]
pub enum FieldUsage {
    #[default]
    Unused,
    Read,
    Write,
    ReadWrite,
}

impl FieldUsage {
    pub fn weight(self) -> u8 {
        match self {
            FieldUsage::Unused => 0,
            FieldUsage::Read => 1,
            FieldUsage::Write => 2,
            FieldUsage::ReadWrite => 3,
        }
    }

    /// Combine two observations of the same field (read bit | write bit)
    pub fn merge(self, other: FieldUsage) -> FieldUsage {
        match self.weight() | other.weight() {
            0 => FieldUsage::Unused,
            1 => FieldUsage::Read,
            2 => FieldUsage::Write,
            _ => FieldUsage::ReadWrite,
        }
    }

    pub fn is_used(self) -> bool {
        self != FieldUsage::Unused
    }
}

impl From<FieldUsage> for u8 {
    fn from(usage: FieldUsage) -> u8 {
        usage.weight()
    }
}

impl TryFrom<u8> for FieldUsage {
    type Error = FactsError;

    fn try_from(weight: u8) -> Result<Self, Self::Error> {
        match weight {
            0 => Ok(FieldUsage::Unused),
            1 => Ok(FieldUsage::Read),
            2 => Ok(FieldUsage::Write),
            3 => Ok(FieldUsage::ReadWrite),
            other => Err(FactsError::InvalidUsageWeight(other)),
        }
    }
}

/// A method attached to a struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MethodFacts {
    /// `Struct.method`
    pub qualified_name: String,
    /// Name bound to the receiver inside the body, empty when unnamed
    #[serde(default)]
    pub receiver_binding: String,
    pub is_private: bool,
    /// Test/helper/accessor style method, ignored by the clustering analyzers
    #[serde(default)]
    pub is_utility: bool,
    #[serde(default)]
    pub field_usage: BTreeMap<String, FieldUsage>,
    /// Callee qualified name -> number of call sites
    #[serde(default)]
    pub calls: BTreeMap<String, usize>,
}

impl MethodFacts {
    pub fn new(qualified_name: impl Into<String>, is_private: bool) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            receiver_binding: String::new(),
            is_private,
            is_utility: false,
            field_usage: BTreeMap::new(),
            calls: BTreeMap::new(),
        }
    }

    /// Record a field access, merging with earlier observations
    pub fn with_field(mut self, field: impl Into<String>, usage: FieldUsage) -> Self {
        let entry = self.field_usage.entry(field.into()).or_default();
        *entry = entry.merge(usage);
        self
    }

    /// Record `count` call sites to `callee`
    pub fn with_call(mut self, callee: impl Into<String>, count: usize) -> Self {
        *self.calls.entry(callee.into()).or_default() += count;
        self
    }

    pub fn with_utility(mut self, is_utility: bool) -> Self {
        self.is_utility = is_utility;
        self
    }

    /// Method name without the struct qualifier
    pub fn bare_name(&self) -> &str {
        bare_name(&self.qualified_name)
    }

    /// Usage weight of `field`, `Unused` if never touched
    pub fn usage_of(&self, field: &str) -> FieldUsage {
        self.field_usage.get(field).copied().unwrap_or_default()
    }

    /// Fields this method reads or writes
    pub fn used_fields(&self) -> impl Iterator<Item = &str> {
        self.field_usage
            .iter()
            .filter(|(_, usage)| usage.is_used())
            .map(|(field, _)| field.as_str())
    }
}

/// A struct with named fields and the methods whose receiver resolves to it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructFacts {
    pub name: String,
    pub file_path: String,
    /// Declaration order
    #[serde(default)]
    pub fields: Vec<String>,
    #[serde(default)]
    pub methods: Vec<MethodFacts>,
}

impl StructFacts {
    pub fn new(name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_path: file_path.into(),
            fields: Vec::new(),
            methods: Vec::new(),
        }
    }

    pub fn with_fields<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_method(mut self, method: MethodFacts) -> Self {
        self.methods.push(method);
        self
    }

    /// Check that every method belongs to this struct and only touches
    /// declared fields.
    pub fn validate(&self) -> Result<(), FactsError> {
        let prefix = format!("{}.", self.name);
        let mut seen = BTreeSet::new();
        for method in &self.methods {
            if !seen.insert(method.qualified_name.as_str()) {
                return Err(FactsError::DuplicateMethod {
                    struct_name: self.name.clone(),
                    method: method.qualified_name.clone(),
                });
            }
            if !method.qualified_name.starts_with(&prefix) {
                return Err(FactsError::ForeignMethod {
                    struct_name: self.name.clone(),
                    method: method.qualified_name.clone(),
                });
            }
            for field in method.used_fields() {
                if !self.fields.iter().any(|f| f == field) {
                    return Err(FactsError::UnknownField {
                        struct_name: self.name.clone(),
                        method: method.qualified_name.clone(),
                        field: field.to_string(),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Decision points counted inside a function body
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DecisionPoints {
    pub if_statements: usize,
    pub loops: usize,
    /// `switch` / type switch / `match` expressions
    pub switches: usize,
    /// Case clauses with at least one match value (defaults excluded)
    pub case_clauses: usize,
    /// Non-empty `select` cases
    pub select_cases: usize,
    /// `&&` and `||` occurrences
    pub logical_operators: usize,
}

impl DecisionPoints {
    pub fn total(&self) -> usize {
        self.if_statements
            + self.loops
            + self.switches
            + self.case_clauses
            + self.select_cases
            + self.logical_operators
    }
}

/// A free function, associated function or method
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionFacts {
    /// Receiver-prefixed for methods (`Struct.method`)
    pub qualified_name: String,
    pub file_path: String,
    /// False for declarations without a body
    #[serde(default = "default_true")]
    pub has_body: bool,
    #[serde(default)]
    pub body_line_count: usize,
    #[serde(default)]
    pub decision_points: DecisionPoints,
    /// Import paths referenced through qualified access inside the body
    #[serde(default)]
    pub imported_packages_used: BTreeSet<String>,
    /// Syntactic callees, qualified the same way as `qualified_name`
    #[serde(default)]
    pub callees: BTreeSet<String>,
}

fn default_true() -> bool {
    true
}

impl FunctionFacts {
    pub fn new(qualified_name: impl Into<String>, file_path: impl Into<String>) -> Self {
        Self {
            qualified_name: qualified_name.into(),
            file_path: file_path.into(),
            has_body: true,
            body_line_count: 0,
            decision_points: DecisionPoints::default(),
            imported_packages_used: BTreeSet::new(),
            callees: BTreeSet::new(),
        }
    }
}

/// A source file that belongs to a package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFacts {
    pub path: String,
    pub line_count: usize,
}

/// Everything known about one analyzed package
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageFacts {
    pub name: String,
    /// Project-relative, slash-normalized; empty for the root package
    pub path: String,
    #[serde(default)]
    pub structs: Vec<StructFacts>,
    #[serde(default)]
    pub functions: Vec<FunctionFacts>,
    /// Raw import paths used anywhere in the package
    #[serde(default)]
    pub imports: BTreeSet<String>,
    #[serde(default)]
    pub files: Vec<FileFacts>,
}

impl PackageFacts {
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            structs: Vec::new(),
            functions: Vec::new(),
            imports: BTreeSet::new(),
            files: Vec::new(),
        }
    }

    /// Fully qualified import path of this package under `module_path`
    pub fn import_path(&self, module_path: &str) -> String {
        package_import_path(module_path, &self.path)
    }

    pub fn total_loc(&self) -> usize {
        self.files.iter().map(|f| f.line_count).sum()
    }
}

/// A directory left out of the run, with the reason
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedDir {
    pub path: String,
    pub reason: String,
}

/// The complete fact model of one project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectFacts {
    /// Module path prefix shared by every in-project import
    pub module_path: String,
    #[serde(default)]
    pub packages: Vec<PackageFacts>,
    #[serde(default)]
    pub skipped_dirs: Vec<SkippedDir>,
}

impl ProjectFacts {
    pub fn new(module_path: impl Into<String>) -> Self {
        Self {
            module_path: module_path.into(),
            ..Default::default()
        }
    }

    /// Load facts written by an external front end
    pub fn from_json_file(path: &Path) -> Result<Self, FactsError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, FactsError> {
        let mut facts: ProjectFacts = serde_json::from_str(content)?;
        facts.packages.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(facts)
    }
}

/// `Struct.method` -> `method`, `Struct.fmt#Display` -> `fmt`
pub fn bare_name(qualified_name: &str) -> &str {
    let method = qualified_name
        .rsplit('.')
        .next()
        .unwrap_or(qualified_name);
    method.split('#').next().unwrap_or(method)
}

/// Import path of the package at `relative_path` under `module_path`
pub fn package_import_path(module_path: &str, relative_path: &str) -> String {
    if relative_path.is_empty() {
        module_path.to_string()
    } else {
        format!("{}/{}", module_path, relative_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_usage_merge() {
        assert_eq!(FieldUsage::Read.merge(FieldUsage::Write), FieldUsage::ReadWrite);
        assert_eq!(FieldUsage::Unused.merge(FieldUsage::Read), FieldUsage::Read);
        assert_eq!(FieldUsage::Write.merge(FieldUsage::Write), FieldUsage::Write);
    }

    #[test]
    fn test_field_usage_rejects_bad_weight() {
        assert!(FieldUsage::try_from(4).is_err());
        assert_eq!(FieldUsage::try_from(3).unwrap(), FieldUsage::ReadWrite);
    }

    #[test]
    fn test_bare_name() {
        assert_eq!(bare_name("Service.handle"), "handle");
        assert_eq!(bare_name("standalone"), "standalone");
        assert_eq!(bare_name("Pair.fmt#Display"), "fmt");
    }

    #[test]
    fn test_package_import_path() {
        assert_eq!(package_import_path("example.com/app", ""), "example.com/app");
        assert_eq!(
            package_import_path("example.com/app", "internal/store"),
            "example.com/app/internal/store"
        );
    }

    #[test]
    fn test_validate_rejects_unknown_field() {
        let s = StructFacts::new("Cache", "cache.rs")
            .with_fields(["entries"])
            .with_method(MethodFacts::new("Cache.get", false).with_field("missing", FieldUsage::Read));

        assert!(matches!(s.validate(), Err(FactsError::UnknownField { .. })));
    }

    #[test]
    fn test_validate_rejects_foreign_method() {
        let s = StructFacts::new("Cache", "cache.rs").with_method(MethodFacts::new("Store.get", false));
        assert!(matches!(s.validate(), Err(FactsError::ForeignMethod { .. })));
    }

    #[test]
    fn test_validate_rejects_duplicate_method() {
        let s = StructFacts::new("Pair", "pair.rs")
            .with_fields(["left", "right"])
            .with_method(MethodFacts::new("Pair.fmt", false).with_field("left", FieldUsage::Read))
            .with_method(MethodFacts::new("Pair.fmt", false).with_field("right", FieldUsage::Read));
        assert!(matches!(s.validate(), Err(FactsError::DuplicateMethod { .. })));
    }

    #[test]
    fn test_load_from_json() {
        let json = r#"{
            "module_path": "example.com/app",
            "packages": [
                {
                    "name": "store",
                    "path": "store",
                    "structs": [{
                        "name": "Store",
                        "file_path": "store/store.rs",
                        "fields": ["db", "cache"],
                        "methods": [{
                            "qualified_name": "Store.Get",
                            "is_private": false,
                            "field_usage": {"db": 1, "cache": 3},
                            "calls": {"Store.lookup": 2}
                        }]
                    }],
                    "imports": ["example.com/app/model", "fmt"]
                },
                {"name": "app", "path": ""}
            ]
        }"#;

        let facts = ProjectFacts::from_json(json).unwrap();
        assert_eq!(facts.packages.len(), 2);
        // Sorted by path, root first
        assert_eq!(facts.packages[0].path, "");

        let method = &facts.packages[1].structs[0].methods[0];
        assert_eq!(method.usage_of("cache"), FieldUsage::ReadWrite);
        assert_eq!(method.usage_of("db"), FieldUsage::Read);
        assert_eq!(method.calls.get("Store.lookup"), Some(&2));
        assert!(!method.is_utility);
    }
}
