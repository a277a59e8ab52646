//! LCOM4 cohesion analysis
//!
//! LCOM4 is the number of connected components in the graph whose nodes are
//! a struct's methods and fields, with an edge between a method and every
//! field it reads or writes. One component means every method shares state
//! with every other, directly or transitively.
//!
//! | LCOM4 | Reading |
//! |-------|---------|
//! | 0 | no methods, not applicable |
//! | 1 | cohesive |
//! | 2+ | that many independent groups of behavior |

use serde::Serialize;

use crate::facts::StructFacts;
use crate::union_find::UnionFind;

/// Cohesion score for one struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CohesionResult {
    pub struct_name: String,
    pub file_path: String,
    pub lcom4_score: usize,
    /// Members of each component: qualified method names and field names,
    /// sorted within a component, components ordered by their first member.
    pub components: Vec<Vec<String>>,
}

impl CohesionResult {
    /// Zero methods: the score is 0 and must not be read as "cohesive"
    pub fn is_applicable(&self) -> bool {
        self.lcom4_score > 0
    }
}

/// Compute LCOM4 for a struct.
///
/// Method nodes are keyed by qualified name (`Struct.method`), so a method
/// can never collide with a field of the same name.
pub fn analyze_struct(facts: &StructFacts) -> CohesionResult {
    if facts.methods.is_empty() {
        return CohesionResult {
            struct_name: facts.name.clone(),
            file_path: facts.file_path.clone(),
            lcom4_score: 0,
            components: Vec::new(),
        };
    }

    let mut uf = UnionFind::new();
    for method in &facts.methods {
        uf.add(&method.qualified_name);
    }
    for field in &facts.fields {
        uf.add(field);
    }

    for method in &facts.methods {
        for field in method.used_fields() {
            if facts.fields.iter().any(|f| f == field) {
                uf.union(&method.qualified_name, field);
            }
        }
    }

    let mut components = uf.components();
    for component in &mut components {
        component.sort();
    }
    components.sort();

    CohesionResult {
        struct_name: facts.name.clone(),
        file_path: facts.file_path.clone(),
        lcom4_score: components.len(),
        components,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::facts::{FieldUsage, MethodFacts};

    fn method(name: &str, fields: &[&str]) -> MethodFacts {
        fields.iter().fold(MethodFacts::new(name, false), |m, f| {
            m.with_field(*f, FieldUsage::Read)
        })
    }

    #[test]
    fn test_disjoint_methods_score_per_method() {
        let s = StructFacts::new("Service", "service.rs")
            .with_fields(["a", "b", "c"])
            .with_method(method("Service.one", &["a"]))
            .with_method(method("Service.two", &["b"]))
            .with_method(method("Service.three", &["c"]));

        let result = analyze_struct(&s);
        assert_eq!(result.lcom4_score, 3);
        assert_eq!(result.components[0], vec!["Service.one".to_string(), "a".to_string()]);
    }

    #[test]
    fn test_fully_shared_fields_score_one() {
        let all = ["a", "b", "c"];
        let s = StructFacts::new("Service", "service.rs")
            .with_fields(all)
            .with_method(method("Service.one", &all))
            .with_method(method("Service.two", &all))
            .with_method(method("Service.three", &all));

        let result = analyze_struct(&s);
        assert_eq!(result.lcom4_score, 1);
        assert_eq!(result.components[0].len(), 6);
    }

    #[test]
    fn test_no_methods_is_not_applicable() {
        let s = StructFacts::new("Plain", "plain.rs").with_fields(["x", "y"]);

        let result = analyze_struct(&s);
        assert_eq!(result.lcom4_score, 0);
        assert!(result.components.is_empty());
        assert!(!result.is_applicable());
    }

    #[test]
    fn test_unused_fields_and_methods_are_singletons() {
        let s = StructFacts::new("Svc", "svc.rs")
            .with_fields(["a", "unused"])
            .with_method(method("Svc.reads", &["a"]))
            .with_method(method("Svc.idle", &[]));

        // {reads, a}, {idle}, {unused}
        assert_eq!(analyze_struct(&s).lcom4_score, 3);
    }

    #[test]
    fn test_write_usage_connects_like_read() {
        let s = StructFacts::new("Svc", "svc.rs")
            .with_fields(["state"])
            .with_method(MethodFacts::new("Svc.load", false).with_field("state", FieldUsage::Read))
            .with_method(MethodFacts::new("Svc.store", false).with_field("state", FieldUsage::Write));

        assert_eq!(analyze_struct(&s).lcom4_score, 1);
    }

    #[test]
    fn test_deterministic_components() {
        let s = StructFacts::new("Svc", "svc.rs")
            .with_fields(["z", "a", "m"])
            .with_method(method("Svc.zeta", &["z"]))
            .with_method(method("Svc.alpha", &["a", "m"]));

        let first = analyze_struct(&s);
        let second = analyze_struct(&s);
        assert_eq!(first, second);
        assert_eq!(first.lcom4_score, 2);
    }
}
