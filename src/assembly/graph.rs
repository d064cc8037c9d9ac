use std::collections::VecDeque;

/// Stable handle to a vertex slot in a [`KmerGraph`] arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VertexId(usize);

impl VertexId {
    /// Slot index, usable to key scratch arrays of length [`KmerGraph::slot_bound`].
    pub fn slot(self) -> usize {
        self.0
    }
}

/// Stable handle to an edge record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EdgeId(usize);

/// A k-mer vertex with its adjacency lists.
#[derive(Debug, Clone)]
pub struct Vertex {
    /// The k-mer this vertex represents.
    pub kmer: Box<[u8]>,
    /// Whether the vertex lies on the reference path.
    pub is_reference: bool,
    out_edges: Vec<EdgeId>,
    in_edges: Vec<EdgeId>,
}

/// A weighted, scored edge between two k-mer vertices.
#[derive(Debug, Clone)]
pub struct Edge {
    /// Source vertex.
    pub source: VertexId,
    /// Target vertex.
    pub target: VertexId,
    /// Number of read observations supporting the transition.
    pub weight: u32,
    /// Whether the edge lies on the reference path.
    pub is_reference: bool,
    /// Negative log-relative-weight cost used by the bubble search.
    pub transition_score: f32,
}

/// Arena-backed directed multigraph specialised for k-mer assembly.
///
/// Vertex and edge handles stay valid across removals of other elements.
/// Callers maintain the one-edge-per-ordered-pair invariant by checking
/// [`find_edge`](Self::find_edge) before inserting.
#[derive(Debug, Default)]
pub struct KmerGraph {
    vertices: Vec<Option<Vertex>>,
    edges: Vec<Option<Edge>>,
    free_vertices: Vec<usize>,
    free_edges: Vec<usize>,
    num_vertices: usize,
    num_edges: usize,
}

impl KmerGraph {
    /// An empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live vertices.
    pub fn num_vertices(&self) -> usize {
        self.num_vertices
    }

    /// Number of live edges.
    pub fn num_edges(&self) -> usize {
        self.num_edges
    }

    /// Upper bound (exclusive) on vertex slot indices, for scratch arrays.
    pub fn slot_bound(&self) -> usize {
        self.vertices.len()
    }

    /// Drop all vertices and edges.
    pub fn clear(&mut self) {
        self.vertices.clear();
        self.edges.clear();
        self.free_vertices.clear();
        self.free_edges.clear();
        self.num_vertices = 0;
        self.num_edges = 0;
    }

    /// Insert a vertex and return its handle.
    pub fn add_vertex(&mut self, kmer: Box<[u8]>, is_reference: bool) -> VertexId {
        let vertex = Vertex {
            kmer,
            is_reference,
            out_edges: Vec::new(),
            in_edges: Vec::new(),
        };
        self.num_vertices += 1;
        match self.free_vertices.pop() {
            Some(slot) => {
                self.vertices[slot] = Some(vertex);
                VertexId(slot)
            }
            None => {
                self.vertices.push(Some(vertex));
                VertexId(self.vertices.len() - 1)
            }
        }
    }

    /// Remove an isolated vertex, returning its k-mer.
    ///
    /// Panics if the vertex still has incident edges; use
    /// [`clear_vertex`](Self::clear_vertex) first when unsure.
    pub fn remove_vertex(&mut self, v: VertexId) -> Box<[u8]> {
        let vertex = self.vertices[v.0].take().expect("live vertex");
        assert!(
            vertex.out_edges.is_empty() && vertex.in_edges.is_empty(),
            "removed vertex must be isolated"
        );
        self.free_vertices.push(v.0);
        self.num_vertices -= 1;
        vertex.kmer
    }

    /// Remove every edge incident to `v`.
    pub fn clear_vertex(&mut self, v: VertexId) {
        let vertex = self.vertices[v.0].as_ref().expect("live vertex");
        let mut incident: Vec<EdgeId> = vertex.out_edges.clone();
        incident.extend(vertex.in_edges.iter().copied());
        incident.sort_by_key(|e| e.0);
        incident.dedup();
        for e in incident {
            self.remove_edge(e);
        }
    }

    /// Borrow a vertex.
    pub fn vertex(&self, v: VertexId) -> &Vertex {
        self.vertices[v.0].as_ref().expect("live vertex")
    }

    /// Mutably borrow a vertex.
    pub fn vertex_mut(&mut self, v: VertexId) -> &mut Vertex {
        self.vertices[v.0].as_mut().expect("live vertex")
    }

    /// Whether `v` refers to a live vertex.
    pub fn contains_vertex(&self, v: VertexId) -> bool {
        self.vertices.get(v.0).is_some_and(Option::is_some)
    }

    /// Insert an edge. The caller guarantees no parallel edge exists.
    pub fn add_edge(
        &mut self,
        source: VertexId,
        target: VertexId,
        weight: u32,
        is_reference: bool,
    ) -> EdgeId {
        let edge = Edge {
            source,
            target,
            weight,
            is_reference,
            transition_score: 0.0,
        };
        self.num_edges += 1;
        let id = match self.free_edges.pop() {
            Some(slot) => {
                self.edges[slot] = Some(edge);
                EdgeId(slot)
            }
            None => {
                self.edges.push(Some(edge));
                EdgeId(self.edges.len() - 1)
            }
        };
        self.vertices[source.0]
            .as_mut()
            .expect("live source")
            .out_edges
            .push(id);
        self.vertices[target.0]
            .as_mut()
            .expect("live target")
            .in_edges
            .push(id);
        id
    }

    /// Remove an edge by handle.
    pub fn remove_edge(&mut self, e: EdgeId) {
        let edge = self.edges[e.0].take().expect("live edge");
        self.free_edges.push(e.0);
        self.num_edges -= 1;
        if let Some(source) = self.vertices[edge.source.0].as_mut() {
            source.out_edges.retain(|&id| id != e);
        }
        if let Some(target) = self.vertices[edge.target.0].as_mut() {
            target.in_edges.retain(|&id| id != e);
        }
    }

    /// Remove the edge between an ordered vertex pair, if present.
    pub fn remove_edge_between(&mut self, source: VertexId, target: VertexId) {
        if let Some(e) = self.find_edge(source, target) {
            self.remove_edge(e);
        }
    }

    /// Find the edge from `source` to `target`.
    pub fn find_edge(&self, source: VertexId, target: VertexId) -> Option<EdgeId> {
        self.vertex(source)
            .out_edges
            .iter()
            .copied()
            .find(|&e| self.edge(e).target == target)
    }

    /// Borrow an edge.
    pub fn edge(&self, e: EdgeId) -> &Edge {
        self.edges[e.0].as_ref().expect("live edge")
    }

    /// Mutably borrow an edge.
    pub fn edge_mut(&mut self, e: EdgeId) -> &mut Edge {
        self.edges[e.0].as_mut().expect("live edge")
    }

    /// Live vertex handles in slot order.
    pub fn vertex_ids(&self) -> impl Iterator<Item = VertexId> + '_ {
        self.vertices
            .iter()
            .enumerate()
            .filter_map(|(slot, v)| v.as_ref().map(|_| VertexId(slot)))
    }

    /// Live edge handles in slot order.
    pub fn edge_ids(&self) -> impl Iterator<Item = EdgeId> + '_ {
        self.edges
            .iter()
            .enumerate()
            .filter_map(|(slot, e)| e.as_ref().map(|_| EdgeId(slot)))
    }

    /// Outgoing edge handles of `v`.
    pub fn out_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex(v).out_edges
    }

    /// Incoming edge handles of `v`.
    pub fn in_edges(&self, v: VertexId) -> &[EdgeId] {
        &self.vertex(v).in_edges
    }

    /// Out-degree of `v`.
    pub fn out_degree(&self, v: VertexId) -> usize {
        self.vertex(v).out_edges.len()
    }

    /// In-degree of `v`.
    pub fn in_degree(&self, v: VertexId) -> usize {
        self.vertex(v).in_edges.len()
    }

    /// Total degree of `v` (a self-loop counts twice).
    pub fn degree(&self, v: VertexId) -> usize {
        self.out_degree(v) + self.in_degree(v)
    }

    /// Remove every edge matching `predicate`.
    pub fn remove_edges_where(&mut self, mut predicate: impl FnMut(&Edge) -> bool) {
        let doomed: Vec<EdgeId> = self
            .edge_ids()
            .filter(|&e| predicate(self.edge(e)))
            .collect();
        for e in doomed {
            self.remove_edge(e);
        }
    }

    /// Vertices reachable from `from` along forward edges (including `from`).
    pub fn reachable_from(&self, from: VertexId) -> Vec<bool> {
        self.breadth_first(from, false)
    }

    /// Vertices that can reach `to` along forward edges (including `to`).
    pub fn reaching(&self, to: VertexId) -> Vec<bool> {
        self.breadth_first(to, true)
    }

    fn breadth_first(&self, start: VertexId, reverse: bool) -> Vec<bool> {
        let mut seen = vec![false; self.slot_bound()];
        let mut queue = VecDeque::from([start]);
        seen[start.0] = true;
        while let Some(u) = queue.pop_front() {
            let edges = if reverse {
                &self.vertex(u).in_edges
            } else {
                &self.vertex(u).out_edges
            };
            for &e in edges {
                let edge = self.edge(e);
                let next = if reverse { edge.source } else { edge.target };
                if !seen[next.0] {
                    seen[next.0] = true;
                    queue.push_back(next);
                }
            }
        }
        seen
    }

    /// Kahn topological sort over all live vertices, FIFO over slot order.
    ///
    /// Returns `None` when the graph contains a cycle (self-loops included).
    pub fn topological_sort(&self) -> Option<Vec<VertexId>> {
        let mut in_degree = vec![0usize; self.slot_bound()];
        for v in self.vertex_ids() {
            in_degree[v.0] = self.in_degree(v);
        }
        let mut queue: VecDeque<VertexId> =
            self.vertex_ids().filter(|v| in_degree[v.0] == 0).collect();
        let mut order = Vec::with_capacity(self.num_vertices);
        while let Some(u) = queue.pop_front() {
            order.push(u);
            for &e in self.out_edges(u) {
                let target = self.edge(e).target;
                in_degree[target.0] -= 1;
                if in_degree[target.0] == 0 {
                    queue.push_back(target);
                }
            }
        }
        (order.len() == self.num_vertices).then_some(order)
    }

    /// Cycle check that ignores trivial self-loops, per the assembler's
    /// notion of acyclicity.
    pub fn is_acyclic_ignoring_self_loops(&self) -> bool {
        #[derive(Clone, Copy, PartialEq)]
        enum Colour {
            White,
            Grey,
            Black,
        }
        let mut colour = vec![Colour::White; self.slot_bound()];
        for root in self.vertex_ids() {
            if colour[root.0] != Colour::White {
                continue;
            }
            // Iterative DFS with an explicit edge cursor per frame.
            let mut stack: Vec<(VertexId, usize)> = vec![(root, 0)];
            colour[root.0] = Colour::Grey;
            while let Some(&(u, cursor)) = stack.last() {
                if cursor < self.out_degree(u) {
                    stack.last_mut().expect("non-empty stack").1 += 1;
                    let e = self.out_edges(u)[cursor];
                    let target = self.edge(e).target;
                    if target == u {
                        continue;
                    }
                    match colour[target.0] {
                        Colour::Grey => return false,
                        Colour::White => {
                            colour[target.0] = Colour::Grey;
                            stack.push((target, 0));
                        }
                        Colour::Black => {}
                    }
                } else {
                    colour[u.0] = Colour::Black;
                    stack.pop();
                }
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kmer(s: &str) -> Box<[u8]> {
        s.as_bytes().to_vec().into_boxed_slice()
    }

    fn chain(graph: &mut KmerGraph, kmers: &[&str]) -> Vec<VertexId> {
        let ids: Vec<VertexId> = kmers.iter().map(|k| graph.add_vertex(kmer(k), false)).collect();
        for pair in ids.windows(2) {
            graph.add_edge(pair[0], pair[1], 1, false);
        }
        ids
    }

    #[test]
    fn handles_stay_stable_across_removal() {
        let mut graph = KmerGraph::new();
        let ids = chain(&mut graph, &["AAA", "AAC", "ACG"]);
        graph.clear_vertex(ids[1]);
        graph.remove_vertex(ids[1]);
        assert_eq!(graph.num_vertices(), 2);
        assert_eq!(graph.num_edges(), 0);
        assert_eq!(&*graph.vertex(ids[2]).kmer, b"ACG");
        // Freed slot is reused.
        let v = graph.add_vertex(kmer("CGT"), false);
        assert_eq!(v, ids[1]);
    }

    #[test]
    fn topological_sort_detects_cycles() {
        let mut graph = KmerGraph::new();
        let ids = chain(&mut graph, &["AAA", "AAC", "ACG"]);
        let order = graph.topological_sort().unwrap();
        assert_eq!(order, ids);
        graph.add_edge(ids[2], ids[0], 1, false);
        assert!(graph.topological_sort().is_none());
        assert!(!graph.is_acyclic_ignoring_self_loops());
    }

    #[test]
    fn self_loops_do_not_count_as_cycles() {
        let mut graph = KmerGraph::new();
        let ids = chain(&mut graph, &["AAA", "AAC"]);
        graph.add_edge(ids[0], ids[0], 1, false);
        assert!(graph.is_acyclic_ignoring_self_loops());
        assert!(graph.topological_sort().is_none());
    }

    #[test]
    fn reachability_in_both_directions() {
        let mut graph = KmerGraph::new();
        let ids = chain(&mut graph, &["AAA", "AAC", "ACG"]);
        let orphan = graph.add_vertex(kmer("TTT"), false);
        let forward = graph.reachable_from(ids[0]);
        assert!(forward[ids[2].slot()] && !forward[orphan.slot()]);
        let backward = graph.reaching(ids[2]);
        assert!(backward[ids[0].slot()] && !backward[orphan.slot()]);
    }

    #[test]
    fn find_edge_respects_direction() {
        let mut graph = KmerGraph::new();
        let ids = chain(&mut graph, &["AAA", "AAC"]);
        assert!(graph.find_edge(ids[0], ids[1]).is_some());
        assert!(graph.find_edge(ids[1], ids[0]).is_none());
    }
}
