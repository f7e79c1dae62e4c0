use hashbrown::HashSet;

use crate::{Vec, program::TopLevelId};

/// Edges "`from` reads a global defined by `to`" recorded while references
/// are resolved.
#[derive(Debug, Clone, Default)]
pub struct Dependencies {
    edges: Vec<(TopLevelId, TopLevelId)>,
    seen: HashSet<(TopLevelId, TopLevelId)>,
}

impl Dependencies {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, from: TopLevelId, to: TopLevelId) {
        if from != to && self.seen.insert((from, to)) {
            self.edges.push((from, to));
        }
    }

    pub fn depends_on(&self, from: TopLevelId) -> impl Iterator<Item = TopLevelId> + '_ {
        self.edges
            .iter()
            .filter(move |(source, _)| *source == from)
            .map(|(_, target)| *target)
    }

    pub fn contains(&self, from: TopLevelId, to: TopLevelId) -> bool {
        self.seen.contains(&(from, to))
    }

    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Order `nodes` so that every node comes after the nodes it depends on.
    ///
    /// Among nodes that are ready at the same time the earlier one in
    /// `nodes` goes first. Dependencies outside `nodes` are ignored, and
    /// nodes caught in a cycle keep their relative order at the end.
    pub fn order(&self, nodes: &[TopLevelId]) -> Vec<TopLevelId> {
        let wanted: HashSet<TopLevelId> = nodes.iter().copied().collect();
        let mut placed: HashSet<TopLevelId> = HashSet::new();
        let mut order = Vec::with_capacity(nodes.len());

        loop {
            let ready = nodes.iter().copied().find(|node| {
                !placed.contains(node)
                    && self
                        .depends_on(*node)
                        .all(|dep| !wanted.contains(&dep) || placed.contains(&dep))
            });
            match ready {
                Some(node) => {
                    placed.insert(node);
                    order.push(node);
                }
                None => break,
            }
        }

        order.extend(nodes.iter().copied().filter(|node| !placed.contains(node)));
        order
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ids(raw: &[u32]) -> Vec<TopLevelId> {
        raw.iter().map(|n| TopLevelId(*n)).collect()
    }

    #[test]
    fn test_order_respects_edges() {
        let mut deps = Dependencies::new();
        // 0 reads 2, 2 reads 1
        deps.add(TopLevelId(0), TopLevelId(2));
        deps.add(TopLevelId(2), TopLevelId(1));
        assert_eq!(deps.order(&ids(&[0, 1, 2])), ids(&[1, 2, 0]));
    }

    #[test]
    fn test_order_is_stable_for_independent_nodes() {
        let deps = Dependencies::new();
        assert_eq!(deps.order(&ids(&[3, 1, 2])), ids(&[3, 1, 2]));
    }

    #[test]
    fn test_duplicate_and_self_edges_are_ignored() {
        let mut deps = Dependencies::new();
        deps.add(TopLevelId(0), TopLevelId(1));
        deps.add(TopLevelId(0), TopLevelId(1));
        deps.add(TopLevelId(1), TopLevelId(1));
        assert_eq!(deps.len(), 1);
        assert!(deps.contains(TopLevelId(0), TopLevelId(1)));
    }

    #[test]
    fn test_cycles_go_last() {
        let mut deps = Dependencies::new();
        deps.add(TopLevelId(0), TopLevelId(1));
        deps.add(TopLevelId(1), TopLevelId(0));
        assert_eq!(deps.order(&ids(&[0, 1, 2])), ids(&[2, 0, 1]));
    }
}
