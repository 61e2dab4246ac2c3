//! Role inheritance graph
//!
//! An edge `child -> parent` means holding `child` implies holding `parent`.
//! The graph must stay acyclic; cycles are detected with a three-colour DFS and
//! reported with the full path.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::types::EntityId;

#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Visiting,
    Done,
}

/// Parent links between roles
#[derive(Debug, Clone, Default)]
pub struct RoleHierarchy {
    parents: HashMap<EntityId, Vec<EntityId>>,
}

impl RoleHierarchy {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the hierarchy from `(child, parent)` pairs
    pub fn from_edges<I>(edges: I) -> Self
    where
        I: IntoIterator<Item = (EntityId, EntityId)>,
    {
        let mut hierarchy = Self::new();
        for (child, parent) in edges {
            hierarchy.add_parent(child, parent);
        }
        hierarchy
    }

    pub fn add_parent(&mut self, child: EntityId, parent: EntityId) {
        let parents = self.parents.entry(child).or_default();
        if !parents.contains(&parent) {
            parents.push(parent);
        }
    }

    pub fn parents_of(&self, role: &EntityId) -> &[EntityId] {
        self.parents.get(role).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }

    /// The given roles plus every ancestor reachable through parent links
    pub fn expand<I>(&self, roles: I) -> HashSet<EntityId>
    where
        I: IntoIterator<Item = EntityId>,
    {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<EntityId> = VecDeque::new();
        for role in roles {
            if seen.insert(role) {
                queue.push_back(role);
            }
        }

        while let Some(current) = queue.pop_front() {
            for parent in self.parents_of(&current) {
                if seen.insert(*parent) {
                    queue.push_back(*parent);
                }
            }
        }

        seen
    }

    /// Whether `descendant` inherits from `ancestor` (directly or transitively)
    pub fn inherits(&self, descendant: EntityId, ancestor: EntityId) -> bool {
        descendant != ancestor && self.expand([descendant]).contains(&ancestor)
    }

    /// Path that adding `child -> parent` would close into a cycle, if any.
    ///
    /// The returned path starts and ends with `child`.
    pub fn cycle_if_added(&self, child: EntityId, parent: EntityId) -> Option<Vec<EntityId>> {
        if child == parent {
            return Some(vec![child, child]);
        }

        // Search upward from `parent` for `child`, remembering how we got there
        let mut previous: HashMap<EntityId, EntityId> = HashMap::new();
        let mut queue = VecDeque::from([parent]);
        let mut seen = HashSet::from([parent]);

        while let Some(current) = queue.pop_front() {
            if current == child {
                let mut path = vec![child];
                let mut cursor = child;
                while let Some(prev) = previous.get(&cursor) {
                    path.push(*prev);
                    cursor = *prev;
                }
                // path is child <- ... <- parent; flip it and close the loop
                path.reverse();
                path.insert(0, child);
                return Some(path);
            }
            for next in self.parents_of(&current) {
                if seen.insert(*next) {
                    previous.insert(*next, current);
                    queue.push_back(*next);
                }
            }
        }

        None
    }

    /// First cycle found in the graph, if any
    pub fn detect_cycle(&self) -> Option<Vec<EntityId>> {
        let mut state: HashMap<EntityId, Visit> = HashMap::new();
        let mut path = Vec::new();

        let mut roots: Vec<&EntityId> = self.parents.keys().collect();
        roots.sort();
        for start in roots {
            if !state.contains_key(start) {
                if let Some(cycle) = self.dfs(*start, &mut state, &mut path) {
                    return Some(cycle);
                }
            }
        }
        None
    }

    fn dfs(
        &self,
        node: EntityId,
        state: &mut HashMap<EntityId, Visit>,
        path: &mut Vec<EntityId>,
    ) -> Option<Vec<EntityId>> {
        match state.get(&node) {
            Some(Visit::Visiting) => {
                let start = path.iter().position(|n| *n == node)?;
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                return Some(cycle);
            }
            Some(Visit::Done) => return None,
            None => {}
        }

        state.insert(node, Visit::Visiting);
        path.push(node);

        for parent in self.parents_of(&node) {
            if let Some(cycle) = self.dfs(*parent, state, path) {
                return Some(cycle);
            }
        }

        state.insert(node, Visit::Done);
        path.pop();
        None
    }
}
