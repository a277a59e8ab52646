//! Disjoint-set forest keyed by node name
//!
//! Shared by the cohesion analyzer (method/field graph) and method
//! clustering (private call graph). Path compression plus union by rank.

use std::collections::HashMap;

/// String-keyed union-find.
///
/// Components come back in the order their first member was added, and
/// members keep insertion order, so results only depend on the order the
/// caller adds nodes.
#[derive(Debug, Default, Clone)]
pub struct UnionFind {
    index: HashMap<String, usize>,
    names: Vec<String>,
    parent: Vec<usize>,
    rank: Vec<u8>,
}

impl UnionFind {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a singleton node; adding an existing node is a no-op
    pub fn add(&mut self, node: &str) {
        if self.index.contains_key(node) {
            return;
        }
        let id = self.names.len();
        self.index.insert(node.to_string(), id);
        self.names.push(node.to_string());
        self.parent.push(id);
        self.rank.push(0);
    }

    pub fn contains(&self, node: &str) -> bool {
        self.index.contains_key(node)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    fn find_id(&mut self, id: usize) -> usize {
        let mut root = id;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut current = id;
        while self.parent[current] != root {
            let next = self.parent[current];
            self.parent[current] = root;
            current = next;
        }
        root
    }

    /// Representative of `node`'s component, `None` for unknown nodes
    pub fn find(&mut self, node: &str) -> Option<&str> {
        let id = *self.index.get(node)?;
        let root = self.find_id(id);
        Some(self.names[root].as_str())
    }

    /// Merge the components of `a` and `b`.
    ///
    /// Returns `false` when either node is unknown or both already share a
    /// component.
    pub fn union(&mut self, a: &str, b: &str) -> bool {
        let (Some(&id_a), Some(&id_b)) = (self.index.get(a), self.index.get(b)) else {
            return false;
        };
        let root_a = self.find_id(id_a);
        let root_b = self.find_id(id_b);
        if root_a == root_b {
            return false;
        }

        match self.rank[root_a].cmp(&self.rank[root_b]) {
            std::cmp::Ordering::Less => self.parent[root_a] = root_b,
            std::cmp::Ordering::Greater => self.parent[root_b] = root_a,
            std::cmp::Ordering::Equal => {
                self.parent[root_b] = root_a;
                self.rank[root_a] += 1;
            }
        }
        true
    }

    pub fn connected(&mut self, a: &str, b: &str) -> bool {
        match (self.index.get(a).copied(), self.index.get(b).copied()) {
            (Some(id_a), Some(id_b)) => self.find_id(id_a) == self.find_id(id_b),
            _ => false,
        }
    }

    pub fn component_count(&mut self) -> usize {
        (0..self.names.len())
            .filter(|&id| self.find_id(id) == id)
            .count()
    }

    /// All connected components
    pub fn components(&mut self) -> Vec<Vec<String>> {
        let mut slot_of_root: HashMap<usize, usize> = HashMap::new();
        let mut components: Vec<Vec<String>> = Vec::new();

        for id in 0..self.names.len() {
            let root = self.find_id(id);
            let slot = *slot_of_root.entry(root).or_insert_with(|| {
                components.push(Vec::new());
                components.len() - 1
            });
            components[slot].push(self.names[id].clone());
        }

        components
    }
}
