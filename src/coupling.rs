//! Package dependency graph: Ca/Ce, instability, dependency depth and cycles
//!
//! The graph has one node per analyzed package, keyed by import path.
//! Only in-project imports (those under the module path) become edges;
//! external imports are kept on the package but never walked.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use serde::Serialize;

use crate::facts::PackageFacts;

/// Dependency edges of one package
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PackageDependency {
    pub import_path: String,
    /// In-project import paths this package uses (self-imports excluded)
    pub imports: BTreeSet<String>,
    /// Analyzed packages importing this one
    pub imported_by: BTreeSet<String>,
}

/// Package-level coupling metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CouplingResult {
    pub package_name: String,
    /// Ca: in-project importers
    pub afferent: usize,
    /// Ce: in-project imports
    pub efferent: usize,
    /// Ce / (Ca + Ce)
    pub instability: f64,
    /// Longest chain of in-project imports
    pub dependency_depth: usize,
}

/// Instability = Ce / (Ca + Ce), 0 when both are 0
pub fn instability(afferent: usize, efferent: usize) -> f64 {
    let total = afferent + efferent;
    if total == 0 {
        0.0
    } else {
        efferent as f64 / total as f64
    }
}

/// Whether `import` is `module_path` itself or lies below it.
///
/// Matching respects path segments, so `example.com/application` is not
/// inside `example.com/app`.
pub fn is_internal_path(import: &str, module_path: &str) -> bool {
    if module_path.is_empty() {
        return false;
    }
    match import.strip_prefix(module_path) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

/// Inter-package import graph, built once and read-only afterwards
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    module_path: String,
    /// import path -> edges, for analyzed packages only
    nodes: BTreeMap<String, PackageDependency>,
}

impl DependencyGraph {
    pub fn build(module_path: &str, packages: &[PackageFacts]) -> Self {
        let mut nodes: BTreeMap<String, PackageDependency> = packages
            .iter()
            .map(|package| {
                let import_path = package.import_path(module_path);
                (
                    import_path.clone(),
                    PackageDependency {
                        import_path,
                        ..Default::default()
                    },
                )
            })
            .collect();

        for package in packages {
            let source = package.import_path(module_path);
            let imports: BTreeSet<String> = package
                .imports
                .iter()
                .filter(|import| is_internal_path(import, module_path))
                .filter(|import| **import != source)
                .cloned()
                .collect();

            for import in &imports {
                if let Some(target) = nodes.get_mut(import) {
                    target.imported_by.insert(source.clone());
                }
            }
            if let Some(node) = nodes.get_mut(&source) {
                node.imports.extend(imports);
            }
        }

        Self {
            module_path: module_path.to_string(),
            nodes,
        }
    }

    pub fn module_path(&self) -> &str {
        &self.module_path
    }

    pub fn get(&self, import_path: &str) -> Option<&PackageDependency> {
        self.nodes.get(import_path)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Ca/Ce/instability plus depth for one package; `None` if not analyzed
    pub fn coupling(
        &self,
        package_name: &str,
        import_path: &str,
        depths: &BTreeMap<String, usize>,
    ) -> Option<CouplingResult> {
        let node = self.nodes.get(import_path)?;
        let afferent = node.imported_by.len();
        let efferent = node.imports.len();
        Some(CouplingResult {
            package_name: package_name.to_string(),
            afferent,
            efferent,
            instability: instability(afferent, efferent),
            dependency_depth: depths.get(import_path).copied().unwrap_or(0),
        })
    }

    /// Longest in-project import chain for every analyzed package.
    ///
    /// Memoized DFS. An edge back to a package still on the recursion stack
    /// contributes 0, so cycles are broken rather than followed. An internal
    /// import that was not analyzed counts as a leaf one level down.
    pub fn dependency_depths(&self) -> BTreeMap<String, usize> {
        let mut memo: HashMap<&str, usize> = HashMap::new();
        let mut on_stack: HashSet<&str> = HashSet::new();

        for import_path in self.nodes.keys() {
            self.depth_of(import_path, &mut memo, &mut on_stack);
        }

        self.nodes
            .keys()
            .map(|path| (path.clone(), memo.get(path.as_str()).copied().unwrap_or(0)))
            .collect()
    }

    fn depth_of<'a>(
        &'a self,
        import_path: &'a str,
        memo: &mut HashMap<&'a str, usize>,
        on_stack: &mut HashSet<&'a str>,
    ) -> usize {
        if let Some(&depth) = memo.get(import_path) {
            return depth;
        }
        let Some(node) = self.nodes.get(import_path) else {
            return 0;
        };

        on_stack.insert(import_path);
        let mut depth = 0;
        for import in &node.imports {
            let chain = if on_stack.contains(import.as_str()) {
                0
            } else {
                1 + self.depth_of(import, memo, on_stack)
            };
            depth = depth.max(chain);
        }
        on_stack.remove(import_path);

        memo.insert(import_path, depth);
        depth
    }

    /// Import cycles between analyzed packages.
    ///
    /// This is a representative set, not every elementary cycle: one cycle
    /// per back edge of a single depth-first pass. Every package that sits
    /// on some cycle appears in at least one reported cycle. Each cycle
    /// starts at its lexicographically smallest member; cycles found from
    /// several entry points are reported once.
    pub fn detect_cycles(&self) -> Vec<Vec<String>> {
        let mut cycles: Vec<Vec<String>> = Vec::new();
        let mut visited: HashSet<&str> = HashSet::new();
        let mut rec_stack: HashSet<&str> = HashSet::new();

        for node in self.nodes.keys() {
            if !visited.contains(node.as_str()) {
                let mut path = Vec::new();
                self.dfs_find_cycles(node, &mut visited, &mut rec_stack, &mut path, &mut cycles);
            }
        }

        let unique: BTreeSet<Vec<String>> = cycles.iter().map(|c| normalize_cycle(c)).collect();
        unique.into_iter().collect()
    }

    fn dfs_find_cycles<'a>(
        &'a self,
        node: &'a str,
        visited: &mut HashSet<&'a str>,
        rec_stack: &mut HashSet<&'a str>,
        path: &mut Vec<&'a str>,
        cycles: &mut Vec<Vec<String>>,
    ) {
        visited.insert(node);
        rec_stack.insert(node);
        path.push(node);

        if let Some(dependency) = self.nodes.get(node) {
            for neighbor in &dependency.imports {
                let neighbor = neighbor.as_str();
                if !self.nodes.contains_key(neighbor) {
                    continue;
                }
                if !visited.contains(neighbor) {
                    self.dfs_find_cycles(neighbor, visited, rec_stack, path, cycles);
                } else if rec_stack.contains(neighbor) {
                    // Found a cycle - extract it from the current path
                    if let Some(start_idx) = path.iter().position(|n| *n == neighbor) {
                        let cycle: Vec<String> =
                            path[start_idx..].iter().map(|s| s.to_string()).collect();
                        if cycle.len() >= 2 {
                            cycles.push(cycle);
                        }
                    }
                }
            }
        }

        path.pop();
        rec_stack.remove(node);
    }
}

/// Rotate a cycle so its smallest element comes first
fn normalize_cycle(cycle: &[String]) -> Vec<String> {
    let min_pos = cycle
        .iter()
        .enumerate()
        .min_by_key(|(_, s)| s.as_str())
        .map(|(i, _)| i)
        .unwrap_or(0);

    let mut normalized: Vec<String> = cycle[min_pos..].to_vec();
    normalized.extend_from_slice(&cycle[..min_pos]);
    normalized
}
