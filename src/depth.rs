use crate::error::ExtractError;
use crate::index::CategoryGraph;
use rustc_hash::FxHashMap;
use std::cmp::Reverse;
use std::collections::BinaryHeap;
use tracing::{info, warn};

/// Category name -> minimal number of subcategory edges from the seed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DepthMap {
    depths: FxHashMap<String, u32>,
}

impl DepthMap {
    pub fn from_map(depths: FxHashMap<String, u32>) -> Self {
        Self { depths }
    }

    pub fn get(&self, category: &str) -> Option<u32> {
        self.depths.get(category).copied()
    }

    pub fn contains(&self, category: &str) -> bool {
        self.depths.contains_key(category)
    }

    pub fn len(&self) -> usize {
        self.depths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.depths.is_empty()
    }

    pub fn max_depth(&self) -> Option<u32> {
        self.depths.values().copied().max()
    }

    /// Entries ordered by depth, then name. Used wherever output must be stable.
    pub fn sorted(&self) -> Vec<(&str, u32)> {
        let mut entries: Vec<(&str, u32)> = self
            .depths
            .iter()
            .map(|(name, depth)| (name.as_str(), *depth))
            .collect();
        entries.sort_unstable_by(|a, b| a.1.cmp(&b.1).then_with(|| a.0.cmp(b.0)));
        entries
    }
}

/// Breadth-first walk of the category graph from `seed`.
///
/// The frontier is a min-heap on `(depth, name)`. Since every edge adds exactly
/// one level, the first time a category is reached fixes its minimal depth. Once
/// the popped depth reaches `max_depth` nothing further can be expanded and the
/// walk stops; categories at exactly `max_depth` are recorded but never expanded.
/// `None` walks the whole reachable graph.
///
/// The seed is always present at depth 0, even when the graph has no entry for it.
pub fn explore(graph: &CategoryGraph, seed: &str, max_depth: Option<u32>) -> DepthMap {
    let mut depths: FxHashMap<String, u32> = FxHashMap::default();
    depths.insert(seed.to_string(), 0);

    let mut frontier = BinaryHeap::new();
    frontier.push(Reverse((0u32, seed.to_string())));

    while let Some(Reverse((depth, category))) = frontier.pop() {
        if max_depth.is_some_and(|limit| depth >= limit) {
            break;
        }

        let Some(children) = graph.children(&category) else {
            let err = ExtractError::MissingGraphNode(category.clone());
            warn!(error = %err, "Skipped category");
            if category != seed {
                depths.remove(&category);
            }
            continue;
        };

        for child in children {
            if !depths.contains_key(child) {
                depths.insert(child.clone(), depth + 1);
                frontier.push(Reverse((depth + 1, child.clone())));
            }
        }
    }

    info!(
        seed = seed,
        max_depth = ?max_depth,
        categories = depths.len(),
        "Category depths collected"
    );
    DepthMap { depths }
}

/// The adjacency entries of every category in `depths`.
pub fn restrict(graph: &CategoryGraph, depths: &DepthMap) -> CategoryGraph {
    let children = depths
        .depths
        .keys()
        .filter_map(|category| {
            graph
                .children(category)
                .map(|list| (category.clone(), list.to_vec()))
        })
        .collect();
    CategoryGraph::from_map(children)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> CategoryGraph {
        CategoryGraph::from_edges([("A", "B"), ("B", "C"), ("C", "D")])
    }

    /// Every non-seed entry needs a parent one level up that lists it.
    fn assert_shortest_path_witnesses(graph: &CategoryGraph, depths: &DepthMap, seed: &str) {
        assert_eq!(depths.get(seed), Some(0));
        for (category, depth) in depths.sorted() {
            if category == seed {
                continue;
            }
            let witnessed = depths.sorted().iter().any(|(parent, d)| {
                *d + 1 == depth
                    && graph
                        .children(parent)
                        .is_some_and(|c| c.iter().any(|x| x == category))
            });
            assert!(witnessed, "no parent at depth {} for {}", depth - 1, category);
        }
    }

    #[test]
    fn chain_bounded_at_two() {
        let depths = explore(&chain(), "A", Some(2));
        assert_eq!(depths.len(), 3);
        assert_eq!(depths.get("A"), Some(0));
        assert_eq!(depths.get("B"), Some(1));
        assert_eq!(depths.get("C"), Some(2));
        assert!(!depths.contains("D"));
    }

    #[test]
    fn unbounded_reaches_everything() {
        let depths = explore(&chain(), "A", None);
        assert_eq!(depths.get("D"), Some(3));
    }

    #[test]
    fn zero_depth_keeps_only_seed() {
        let depths = explore(&chain(), "A", Some(0));
        assert_eq!(depths.sorted(), vec![("A", 0)]);
    }

    #[test]
    fn depth_never_exceeds_bound() {
        let graph = CategoryGraph::from_edges([
            ("R", "A"),
            ("R", "B"),
            ("A", "C"),
            ("B", "C"),
            ("C", "D"),
            ("D", "E"),
            ("E", "F"),
        ]);
        for limit in 0..6 {
            let depths = explore(&graph, "R", Some(limit));
            assert!(depths.max_depth().unwrap() <= limit);
            assert_shortest_path_witnesses(&graph, &depths, "R");
        }
    }

    #[test]
    fn takes_shortest_path_in_diamond_with_shortcut() {
        // R -> A -> B -> C and R -> C directly
        let graph = CategoryGraph::from_edges([("R", "A"), ("A", "B"), ("B", "C"), ("R", "C")]);
        let depths = explore(&graph, "R", None);
        assert_eq!(depths.get("C"), Some(1));
        assert_eq!(depths.get("B"), Some(2));
        assert_shortest_path_witnesses(&graph, &depths, "R");
    }

    #[test]
    fn cycles_terminate() {
        let graph = CategoryGraph::from_edges([("A", "B"), ("B", "C"), ("C", "A")]);
        let depths = explore(&graph, "A", None);
        assert_eq!(depths.len(), 3);
        assert_eq!(depths.get("A"), Some(0));
        assert_eq!(depths.get("C"), Some(2));
    }

    #[test]
    fn neighbour_order_does_not_change_depths() {
        let forward = CategoryGraph::from_edges([
            ("R", "A"),
            ("R", "B"),
            ("R", "C"),
            ("A", "X"),
            ("C", "X"),
            ("X", "Y"),
            ("B", "Y"),
        ]);
        let reversed = CategoryGraph::from_edges([
            ("B", "Y"),
            ("X", "Y"),
            ("C", "X"),
            ("A", "X"),
            ("R", "C"),
            ("R", "B"),
            ("R", "A"),
        ]);
        for limit in [Some(1), Some(2), None] {
            assert_eq!(
                explore(&forward, "R", limit),
                explore(&reversed, "R", limit)
            );
        }
    }

    #[test]
    fn rerun_is_identical() {
        let graph = chain();
        assert_eq!(explore(&graph, "A", Some(3)), explore(&graph, "A", Some(3)));
    }

    #[test]
    fn seed_without_entry_is_kept() {
        let depths = explore(&chain(), "Unknown", Some(5));
        assert_eq!(depths.sorted(), vec![("Unknown", 0)]);
    }

    #[test]
    fn child_without_entry_is_dropped() {
        let mut map = FxHashMap::default();
        map.insert("A".to_string(), vec!["B".to_string(), "Ghost".to_string()]);
        map.insert("B".to_string(), Vec::new());
        let graph = CategoryGraph::from_map(map);

        let depths = explore(&graph, "A", None);
        assert!(depths.contains("B"));
        assert!(!depths.contains("Ghost"));
    }

    #[test]
    fn sorted_orders_by_depth_then_name() {
        let graph = CategoryGraph::from_edges([("R", "b"), ("R", "a"), ("a", "c")]);
        let depths = explore(&graph, "R", None);
        assert_eq!(depths.sorted(), vec![("R", 0), ("a", 1), ("b", 1), ("c", 2)]);
    }

    #[test]
    fn restrict_keeps_reached_entries_only() {
        let depths = explore(&chain(), "A", Some(1));
        let sub = restrict(&chain(), &depths);
        assert_eq!(sub.category_count(), 2);
        assert_eq!(sub.children("A").unwrap(), &["B".to_string()]);
        assert!(!sub.contains("C"));
    }
}
