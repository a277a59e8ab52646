//! Private method "islands"
//!
//! Private, non-utility methods are grouped into connected components of
//! their call graph. Two or more sizeable components that never call each
//! other usually mean the struct carries more than one responsibility.
//! Utility methods (accessors, helpers, test hooks) are left out because
//! they are called from everywhere and would merge unrelated groups.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::config::CompiledConfig;
use crate::facts::{MethodFacts, StructFacts, bare_name};
use crate::union_find::UnionFind;

/// One surviving group of private methods
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodCluster {
    /// 1-based, in final sort order
    pub id: usize,
    /// Qualified method names, sorted
    pub methods: Vec<String>,
    pub size: usize,
    /// Public methods calling into any member, sorted
    pub called_by: Vec<String>,
    pub responsibility_hint: String,
}

/// Method clustering outcome for a struct
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MethodClusterResult {
    pub clusters: Vec<MethodCluster>,
    /// Private non-utility methods considered
    pub total_private_methods: usize,
    pub has_multiple_islands: bool,
}

impl MethodClusterResult {
    pub fn cluster_count(&self) -> usize {
        self.clusters.len()
    }
}

/// Cluster a struct's private methods.
///
/// Returns `None` when the struct has no private non-utility methods.
pub fn analyze_struct(facts: &StructFacts, config: &CompiledConfig) -> Option<MethodClusterResult> {
    let candidates: Vec<&MethodFacts> = facts
        .methods
        .iter()
        .filter(|m| m.is_private && !m.is_utility)
        .collect();
    if candidates.is_empty() {
        return None;
    }
    let candidate_names: BTreeSet<&str> = candidates.iter().map(|m| m.qualified_name.as_str()).collect();

    let mut uf = UnionFind::new();
    for method in &candidates {
        uf.add(&method.qualified_name);
    }
    let min_frequency = config.clustering.min_call_frequency;
    for method in &candidates {
        for (callee, &frequency) in &method.calls {
            if frequency >= min_frequency && candidate_names.contains(callee.as_str()) {
                uf.union(&method.qualified_name, callee);
            }
        }
    }

    let components = uf.components();
    let total = candidates.len();
    let min_size = minimum_cluster_size(total, config);
    let only_one = components.len() == 1;

    let mut kept: Vec<Vec<String>> = components
        .into_iter()
        .filter(|component| only_one || component.len() >= min_size)
        .map(|mut component| {
            component.sort();
            component
        })
        .collect();
    kept.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a[0].cmp(&b[0])));

    let clusters: Vec<MethodCluster> = kept
        .into_iter()
        .enumerate()
        .map(|(i, methods)| MethodCluster {
            id: i + 1,
            size: methods.len(),
            called_by: public_callers(&methods, facts),
            responsibility_hint: suggest_responsibility(&methods, config),
            methods,
        })
        .collect();

    Some(MethodClusterResult {
        has_multiple_islands: clusters.len() >= 2,
        total_private_methods: total,
        clusters,
    })
}

/// `max(min_cluster_size, round(total × min_cluster_ratio))`
pub fn minimum_cluster_size(total_methods: usize, config: &CompiledConfig) -> usize {
    let ratio_based = (total_methods as f64 * config.clustering.min_cluster_ratio).round() as usize;
    ratio_based.max(config.clustering.min_cluster_size)
}

fn public_callers(members: &[String], facts: &StructFacts) -> Vec<String> {
    let callers: BTreeSet<&str> = facts
        .methods
        .iter()
        .filter(|m| !m.is_private)
        .filter(|m| members.iter().any(|member| m.calls.contains_key(member)))
        .map(|m| m.qualified_name.as_str())
        .collect();
    callers.into_iter().map(String::from).collect()
}

/// Label a cluster by its most frequent name word.
///
/// Names are split on `_` and lower-to-upper case boundaries; stop words
/// (`get`, `set`, ...) are ignored. Ties go to the alphabetically first word.
pub fn suggest_responsibility(methods: &[String], config: &CompiledConfig) -> String {
    if methods.is_empty() {
        return "Unknown".to_string();
    }

    let mut keywords: BTreeMap<String, usize> = BTreeMap::new();
    for method in methods {
        for word in split_words(bare_name(method)) {
            let word = word.to_lowercase();
            if config.is_label_stop_word(&word) {
                continue;
            }
            *keywords.entry(word).or_default() += 1;
        }
    }

    // BTreeMap iterates alphabetically, so the first maximum wins ties
    let mut best: Option<(&str, usize)> = None;
    for (word, &count) in &keywords {
        if best.is_none_or(|(_, c)| count > c) {
            best = Some((word, count));
        }
    }

    match best {
        Some((word, _)) => format!("{}-related operations", title_case(word)),
        None => "Mixed operations".to_string(),
    }
}

/// Split `snake_case` and `camelCase` identifiers into words
fn split_words(name: &str) -> Vec<String> {
    let mut words = Vec::new();
    for part in name.split('_').filter(|p| !p.is_empty()) {
        let mut current = String::new();
        for (i, c) in part.chars().enumerate() {
            if i > 0 && c.is_uppercase() && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            current.push(c);
        }
        if !current.is_empty() {
            words.push(current);
        }
    }
    words
}

fn title_case(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
