use std::collections::HashMap;

use super::graph::{KmerGraph, VertexId};

/// Immediate dominators for every vertex reachable from `root`, excluding
/// the root itself.
///
/// Works by iterated intersection over a topological order, which computes
/// the exact dominator tree in one pass on a DAG; the assembler only asks
/// for dominators after pruning has established acyclicity. A graph with a
/// cycle yields an empty map.
pub fn dominator_tree(graph: &KmerGraph, root: VertexId) -> HashMap<VertexId, VertexId> {
    let Some(order) = graph.topological_sort() else {
        return HashMap::new();
    };
    let reachable = graph.reachable_from(root);
    let order: Vec<VertexId> = order
        .into_iter()
        .filter(|v| reachable[v.slot()])
        .collect();

    let mut position = vec![usize::MAX; graph.slot_bound()];
    for (i, v) in order.iter().enumerate() {
        position[v.slot()] = i;
    }
    let mut idom: Vec<Option<VertexId>> = vec![None; graph.slot_bound()];
    idom[root.slot()] = Some(root);

    let intersect = |mut a: VertexId, mut b: VertexId, idom: &[Option<VertexId>]| {
        while a != b {
            if position[a.slot()] > position[b.slot()] {
                a = idom[a.slot()].expect("processed vertex has a dominator");
            } else {
                b = idom[b.slot()].expect("processed vertex has a dominator");
            }
        }
        a
    };

    for &v in order.iter().filter(|&&v| v != root) {
        let mut candidate: Option<VertexId> = None;
        for &e in graph.in_edges(v) {
            let p = graph.edge(e).source;
            if !reachable[p.slot()] || idom[p.slot()].is_none() {
                continue;
            }
            candidate = Some(match candidate {
                None => p,
                Some(current) => intersect(current, p, &idom),
            });
        }
        idom[v.slot()] = candidate;
    }

    order
        .into_iter()
        .filter(|&v| v != root)
        .filter_map(|v| idom[v.slot()].map(|d| (v, d)))
        .collect()
}
