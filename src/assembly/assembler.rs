use std::collections::{HashMap, VecDeque};

use thiserror::Error;

use super::dominators::dominator_tree;
use super::graph::{EdgeId, KmerGraph, VertexId};

/// Largest transition score assigned to a zero-weight edge.
const MAX_TRANSITION_SCORE: f32 = 100.0;
/// Sentinel score marking an edge as blocked for the bubble search. Finite
/// so blocked routes still relax and the predecessor map stays total.
const BLOCKED_SCORE: f32 = 1.0e10;
/// Safety valve on the number of edge-blocking events per extraction.
const MAX_BLOCKINGS: u32 = 50;

/// Errors fatal to an assembler instance.
#[derive(Debug, Error)]
pub enum AssemblerError {
    /// The reference window is shorter than the k-mer size or contains a
    /// non-canonical base.
    #[error("reference sequence is unusable for k-mer size {kmer_size}")]
    BadReferenceSequence {
        /// The k-mer size in force when insertion failed.
        kmer_size: usize,
    },

    /// A reference has already been inserted into this graph.
    #[error("only one reference sequence may be inserted")]
    ReferenceAlreadyInserted,
}

/// An alt-vs-reference bubble, parsimony-trimmed: the common flanks of the
/// raw bubble sequences are removed and the begin position adjusted, so a
/// substitution emits single-base alleles and a pure insertion an empty
/// reference allele.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssembledVariant {
    /// 0-based position within the reference window coordinate space.
    pub begin_pos: u32,
    /// Replaced reference bases (may be empty for insertions).
    pub ref_seq: Vec<u8>,
    /// Substituted bases (may be empty for deletions).
    pub alt_seq: Vec<u8>,
}

/// Local de Bruijn assembler over one reference window.
///
/// Build by inserting the reference once and any number of read substrings,
/// then [`prune`](Self::prune) and [`extract_variants`](Self::extract_variants).
/// Callers should check [`is_acyclic`](Self::is_acyclic) before extraction;
/// on a cyclic graph extraction returns nothing.
#[derive(Debug, Default)]
pub struct Assembler {
    k: usize,
    graph: KmerGraph,
    vertex_cache: HashMap<Box<[u8]>, VertexId>,
    reference_kmers: VecDeque<VertexId>,
    reference_head_position: usize,
    blocking_cap_hit: bool,
}

fn is_canonical_dna(sequence: &[u8]) -> bool {
    sequence
        .iter()
        .all(|&b| matches!(b, b'A' | b'C' | b'G' | b'T'))
}

fn sequence_length(num_kmers: usize, k: usize) -> usize {
    num_kmers + k - 1
}

fn count_kmers(sequence_len: usize, k: usize) -> usize {
    if sequence_len >= k {
        sequence_len - k + 1
    } else {
        0
    }
}

impl Assembler {
    /// Create an empty assembler for `k`-mers.
    pub fn new(k: usize) -> Self {
        assert!((3..=63).contains(&k), "unsupported k-mer size {k}");
        Self {
            k,
            ..Self::default()
        }
    }

    /// Create an assembler seeded with a reference window.
    pub fn new_with_reference(k: usize, reference: &[u8]) -> Result<Self, AssemblerError> {
        let mut assembler = Self::new(k);
        assembler.insert_reference(reference)?;
        Ok(assembler)
    }

    /// The k-mer size.
    pub fn kmer_size(&self) -> usize {
        self.k
    }

    /// Number of distinct k-mers in the graph.
    pub fn num_kmers(&self) -> usize {
        self.vertex_cache.len()
    }

    /// True iff no k-mer has been inserted.
    pub fn is_empty(&self) -> bool {
        self.vertex_cache.is_empty()
    }

    /// Offset of the current reference head within the original window, in
    /// bases; grows as reference flanks are pruned.
    pub fn reference_head_position(&self) -> usize {
        self.reference_head_position
    }

    /// Whether the extraction blocking cap was hit; a diagnostic for
    /// callers that want to report incomplete searches.
    pub fn blocking_cap_hit(&self) -> bool {
        self.blocking_cap_hit
    }

    /// Insert the reference window, marking its k-mer path.
    ///
    /// May be called at most once per instance, before or after reads.
    pub fn insert_reference(&mut self, sequence: &[u8]) -> Result<(), AssemblerError> {
        if !self.reference_kmers.is_empty() {
            return Err(AssemblerError::ReferenceAlreadyInserted);
        }
        if sequence.len() < self.k || !is_canonical_dna(sequence) {
            return Err(AssemblerError::BadReferenceSequence { kmer_size: self.k });
        }
        let mut prev: Option<VertexId> = None;
        for window in sequence.windows(self.k) {
            let v = match self.vertex_cache.get(window) {
                Some(&v) => {
                    self.graph.vertex_mut(v).is_reference = true;
                    v
                }
                None => self
                    .try_add_vertex(window, true)
                    .expect("canonical reference kmer"),
            };
            if let Some(u) = prev {
                match self.graph.find_edge(u, v) {
                    Some(e) => self.graph.edge_mut(e).is_reference = true,
                    None => {
                        self.graph.add_edge(u, v, 0, true);
                    }
                }
            }
            self.reference_kmers.push_back(v);
            prev = Some(v);
        }
        self.reference_head_position = 0;
        Ok(())
    }

    /// Insert or reinforce the k-mer path of one read substring. Windows
    /// containing non-canonical bases break the edge chain without failing.
    pub fn insert_read(&mut self, sequence: &[u8]) {
        if sequence.len() < self.k {
            return;
        }
        let mut windows = sequence.windows(self.k);
        let mut prev_kmer = windows.next().expect("at least one window");
        let mut prev_kmer_good = true;
        if !self.vertex_cache.contains_key(prev_kmer) && self.try_add_vertex(prev_kmer, false).is_none()
        {
            prev_kmer_good = false;
        }
        for kmer in windows {
            match self.vertex_cache.get(kmer).copied() {
                None => {
                    if let Some(v) = self.try_add_vertex(kmer, false) {
                        if prev_kmer_good {
                            let u = self.vertex_cache[prev_kmer];
                            self.graph.add_edge(u, v, 1, false);
                        }
                        prev_kmer_good = true;
                    } else {
                        prev_kmer_good = false;
                    }
                }
                Some(v) if prev_kmer_good => {
                    let u = self.vertex_cache[prev_kmer];
                    match self.graph.find_edge(u, v) {
                        Some(e) => self.graph.edge_mut(e).weight += 1,
                        None => {
                            self.graph.add_edge(u, v, 1, false);
                        }
                    }
                }
                Some(_) => prev_kmer_good = true,
            }
            prev_kmer = kmer;
        }
    }

    /// True iff the graph has no cycle (trivial self-loops included).
    pub fn is_acyclic(&self) -> bool {
        if self.graph_has_trivial_cycle() {
            return false;
        }
        self.graph.is_acyclic_ignoring_self_loops()
    }

    /// True iff every edge lies on the reference path.
    pub fn is_all_reference(&self) -> bool {
        self.graph
            .edge_ids()
            .all(|e| self.graph.edge(e).is_reference)
    }

    /// Drop all graph state. The reference head position is retained, as in
    /// a failed prune the caller only observes the cleared graph.
    pub fn clear(&mut self) {
        self.graph.clear();
        self.vertex_cache.clear();
        self.reference_kmers.clear();
    }

    /// Whether the reference k-mers form a unique path: every non-tail
    /// reference vertex has exactly one reference out-edge and the tail has
    /// none.
    pub fn is_reference_unique_path(&self) -> bool {
        if self.reference_kmers.is_empty() {
            return true;
        }
        let tail = self.reference_tail();
        let mut u = self.reference_head();
        let mut steps = 0usize;
        while u != tail {
            // A unique path cannot be longer than the reference itself.
            if steps > self.reference_kmers.len() {
                return false;
            }
            let mut reference_out = self
                .graph
                .out_edges(u)
                .iter()
                .filter(|&&e| self.graph.edge(e).is_reference);
            let Some(&first) = reference_out.next() else {
                return false;
            };
            if reference_out.next().is_some() {
                return false;
            }
            u = self.graph.edge(first).target;
            steps += 1;
        }
        !self
            .graph
            .out_edges(tail)
            .iter()
            .any(|&e| self.graph.edge(e).is_reference)
    }

    /// Run the pruning protocol with the given minimum edge weight.
    ///
    /// Returns `false` when the graph was found structurally unusable and
    /// has been cleared; `true` otherwise (including the trivial cases).
    pub fn prune(&mut self, min_weight: u32) -> bool {
        if !self.is_reference_unique_path() {
            self.clear();
            return false;
        }
        let mut old_size = self.graph.num_vertices();
        if old_size < 2 || self.reference_kmers.is_empty() {
            return true;
        }

        self.graph
            .remove_edges_where(|e| !e.is_reference && e.source == e.target);
        debug_assert!(self.is_reference_unique_path());

        self.remove_low_weight_edges(min_weight);
        self.remove_disconnected_vertices();
        let mut new_size = self.graph.num_vertices();
        if new_size != old_size {
            if new_size < 2 {
                return true;
            }
            old_size = new_size;
        }
        debug_assert!(self.is_reference_unique_path());

        self.remove_vertices_unreachable_from(self.reference_head());
        new_size = self.graph.num_vertices();
        if new_size != old_size {
            if new_size < 2 {
                return true;
            }
            old_size = new_size;
        }
        debug_assert!(self.is_reference_unique_path());

        self.remove_vertices_past(self.reference_tail());
        new_size = self.graph.num_vertices();
        if new_size != old_size {
            if new_size < 2 {
                return true;
            }
            old_size = new_size;
        }
        debug_assert!(self.is_reference_unique_path());

        self.remove_vertices_that_cannot_reach(self.reference_tail());
        new_size = self.graph.num_vertices();
        if new_size != old_size {
            if new_size < 2 {
                return true;
            }
        }
        debug_assert!(self.is_reference_unique_path());

        if self.can_prune_reference_flanks() && !self.prune_reference_flanks() {
            self.clear();
            return false;
        }
        debug_assert!(self.is_reference_unique_path());
        if self.reference_kmers.is_empty() {
            self.clear();
            return true;
        }
        if self.can_prune_reference_flanks() {
            // A second applicable pass indicates a latent inconsistency.
            self.clear();
            return false;
        }
        true
    }

    /// Extract up to `max` bubble variants, sorted by
    /// `(begin, |ref|, alt)` and unique on `(begin, alt)`.
    pub fn extract_variants(&mut self, max: usize) -> Vec<AssembledVariant> {
        if self.is_empty() || self.is_all_reference() || max == 0 {
            return Vec::new();
        }
        self.set_all_edge_transition_scores();
        let raw = self.extract_highest_scoring_bubble_paths(max);
        let mut variants: Vec<AssembledVariant> = raw.into_iter().map(make_parsimonious).collect();
        variants.sort_by(|a, b| {
            (a.begin_pos, a.ref_seq.len(), &a.alt_seq).cmp(&(b.begin_pos, b.ref_seq.len(), &b.alt_seq))
        });
        variants.dedup_by(|b, a| b.begin_pos == a.begin_pos && b.alt_seq == a.alt_seq);
        variants.truncate(max);
        variants
    }

    // graph bookkeeping

    fn try_add_vertex(&mut self, kmer: &[u8], is_reference: bool) -> Option<VertexId> {
        if !is_canonical_dna(kmer) {
            return None;
        }
        let boxed: Box<[u8]> = kmer.into();
        let v = self.graph.add_vertex(boxed.clone(), is_reference);
        self.vertex_cache.insert(boxed, v);
        Some(v)
    }

    fn remove_vertex(&mut self, v: VertexId) {
        let kmer = self.graph.remove_vertex(v);
        let removed = self.vertex_cache.remove(&kmer);
        debug_assert!(removed.is_some());
    }

    fn clear_and_remove_vertex(&mut self, v: VertexId) {
        self.graph.clear_vertex(v);
        self.remove_vertex(v);
    }

    fn reference_head(&self) -> VertexId {
        *self.reference_kmers.front().expect("non-empty reference")
    }

    fn reference_tail(&self) -> VertexId {
        *self.reference_kmers.back().expect("non-empty reference")
    }

    fn next_reference(&self, u: VertexId) -> VertexId {
        let e = self
            .graph
            .out_edges(u)
            .iter()
            .copied()
            .find(|&e| self.graph.edge(e).is_reference)
            .expect("reference successor");
        self.graph.edge(e).target
    }

    fn reference_size(&self) -> usize {
        sequence_length(self.reference_kmers.len(), self.k)
    }

    fn num_reference_kmers(&self) -> usize {
        self.graph
            .vertex_ids()
            .filter(|&v| self.graph.vertex(v).is_reference)
            .count()
    }

    fn back_base(&self, v: VertexId) -> u8 {
        *self.graph.vertex(v).kmer.last().expect("non-empty kmer")
    }

    fn graph_has_trivial_cycle(&self) -> bool {
        self.graph.edge_ids().any(|e| {
            let edge = self.graph.edge(e);
            edge.source == edge.target
        })
    }

    // pruning passes

    fn sum_in_weight(&self, v: VertexId) -> u32 {
        self.graph
            .in_edges(v)
            .iter()
            .map(|&e| self.graph.edge(e).weight)
            .sum()
    }

    fn sum_out_weight(&self, v: VertexId) -> u32 {
        self.graph
            .out_edges(v)
            .iter()
            .map(|&e| self.graph.edge(e).weight)
            .sum()
    }

    fn is_low_weight(&self, e: EdgeId, min_weight: u32) -> bool {
        let edge = self.graph.edge(e);
        if edge.is_reference || edge.weight >= min_weight {
            return false;
        }
        let source_weight = self.sum_in_weight(edge.source);
        if source_weight < min_weight {
            return true;
        }
        let target_weight = self.sum_out_weight(edge.target);
        source_weight + edge.weight + target_weight < 3 * min_weight
    }

    fn remove_low_weight_edges(&mut self, min_weight: u32) {
        let doomed: Vec<EdgeId> = self
            .graph
            .edge_ids()
            .filter(|&e| self.is_low_weight(e, min_weight))
            .collect();
        for e in doomed {
            self.graph.remove_edge(e);
        }
    }

    fn remove_disconnected_vertices(&mut self) {
        let doomed: Vec<VertexId> = self
            .graph
            .vertex_ids()
            .filter(|&v| self.graph.degree(v) == 0)
            .collect();
        for v in doomed {
            self.remove_vertex(v);
        }
    }

    fn remove_vertices_unreachable_from(&mut self, v: VertexId) -> Vec<VertexId> {
        let reachable = self.graph.reachable_from(v);
        let doomed: Vec<VertexId> = self
            .graph
            .vertex_ids()
            .filter(|u| !reachable[u.slot()])
            .collect();
        for &u in &doomed {
            self.clear_and_remove_vertex(u);
        }
        doomed
    }

    fn remove_vertices_that_cannot_reach(&mut self, v: VertexId) {
        if self.reference_kmers.is_empty() {
            return;
        }
        let reaching = self.graph.reaching(v);
        let doomed: Vec<VertexId> = self
            .graph
            .vertex_ids()
            .filter(|u| !reaching[u.slot()])
            .collect();
        for u in doomed {
            self.clear_and_remove_vertex(u);
        }
    }

    /// Remove vertices lying beyond `v`, preserving any that sit on a cycle
    /// passing back through it.
    fn remove_vertices_past(&mut self, v: VertexId) {
        let reachable = self.graph.reachable_from(v);
        let mut doomed: Vec<VertexId> = self
            .graph
            .vertex_ids()
            .filter(|&u| u != v && reachable[u.slot()])
            .collect();
        let out_edges: Vec<EdgeId> = self.graph.out_edges(v).to_vec();
        for e in out_edges {
            self.graph.remove_edge(e);
        }
        let cycle_tails: Vec<VertexId> = doomed
            .iter()
            .copied()
            .filter(|&u| self.graph.find_edge(u, v).is_some())
            .collect();
        if !cycle_tails.is_empty() {
            let mut back_reachable = vec![false; self.graph.slot_bound()];
            for &tail in &cycle_tails {
                for (slot, hit) in self.graph.reaching(tail).into_iter().enumerate() {
                    back_reachable[slot] = back_reachable[slot] || hit;
                }
                doomed.retain(|&u| u != tail);
            }
            let before = doomed.len();
            doomed.retain(|u| !back_reachable[u.slot()]);
            if doomed.len() != before {
                let removed = self.remove_vertices_unreachable_from(self.reference_head());
                doomed.retain(|u| !removed.contains(u));
            }
        }
        for u in doomed {
            self.clear_and_remove_vertex(u);
        }
    }

    fn can_prune_reference_flanks(&self) -> bool {
        self.graph.out_degree(self.reference_head()) == 1
            || self.graph.in_degree(self.reference_tail()) == 1
    }

    /// Pop prunable reference flanks; returns `false` when the graph is not
    /// a DAG (topological sort failed).
    fn prune_reference_flanks(&mut self) -> bool {
        if self.reference_kmers.is_empty() {
            return true;
        }
        let Some(sorted) = self.graph.topological_sort() else {
            return false;
        };
        debug_assert_eq!(sorted.first(), Some(&self.reference_head()));
        debug_assert_eq!(sorted.last(), Some(&self.reference_tail()));
        if sorted.first() != Some(&self.reference_head())
            || sorted.last() != Some(&self.reference_tail())
        {
            return true;
        }

        let is_head_prunable = |graph: &KmerGraph, v: VertexId| {
            graph.out_degree(v) == 1 && graph.edge(graph.out_edges(v)[0]).is_reference
        };
        let cut = sorted
            .iter()
            .position(|&v| !is_head_prunable(&self.graph, v))
            .unwrap_or(sorted.len());
        for &u in &sorted[..cut] {
            let successor = self.graph.edge(self.graph.out_edges(u)[0]).target;
            self.graph.remove_edge_between(u, successor);
            self.remove_vertex(u);
            self.reference_kmers.pop_front();
            self.reference_head_position += 1;
        }

        let is_tail_prunable = |graph: &KmerGraph, v: VertexId| {
            graph.in_degree(v) == 1 && graph.edge(graph.in_edges(v)[0]).is_reference
        };
        let remaining = &sorted[cut..];
        let keep = remaining
            .iter()
            .rev()
            .position(|&v| !is_tail_prunable(&self.graph, v))
            .unwrap_or(remaining.len());
        let doomed: Vec<VertexId> = remaining.iter().rev().take(keep).copied().collect();
        for u in doomed {
            let predecessor = self.graph.edge(self.graph.in_edges(u)[0]).source;
            self.graph.remove_edge_between(predecessor, u);
            self.remove_vertex(u);
            self.reference_kmers.pop_back();
        }
        true
    }

    // transition scoring

    fn transition_score(weight: u32, total_out_weight: u32) -> f32 {
        if total_out_weight == 0 {
            0.0
        } else if weight == 0 {
            MAX_TRANSITION_SCORE
        } else {
            (weight as f32 / total_out_weight as f32).ln().abs()
        }
    }

    fn set_out_edge_transition_scores(&mut self, v: VertexId) {
        let total = self.sum_out_weight(v);
        let out: Vec<EdgeId> = self.graph.out_edges(v).to_vec();
        for e in out {
            let weight = self.graph.edge(e).weight;
            self.graph.edge_mut(e).transition_score = Self::transition_score(weight, total);
        }
    }

    fn set_all_edge_transition_scores(&mut self) {
        let vertices: Vec<VertexId> = self.graph.vertex_ids().collect();
        for v in vertices {
            self.set_out_edge_transition_scores(v);
        }
    }

    fn is_blocked(&self, e: EdgeId) -> bool {
        self.graph.edge(e).transition_score >= BLOCKED_SCORE
    }

    fn block_edge(&mut self, e: EdgeId) {
        self.graph.edge_mut(e).transition_score = BLOCKED_SCORE;
    }

    fn block_all_in_edges(&mut self, v: VertexId) {
        let in_edges: Vec<EdgeId> = self.graph.in_edges(v).to_vec();
        for e in in_edges {
            self.block_edge(e);
        }
    }

    fn all_in_edges_are_blocked(&self, v: VertexId) -> bool {
        self.graph.in_edges(v).iter().all(|&e| self.is_blocked(e))
    }

    // shortest scoring paths

    fn find_shortest_scoring_paths(
        &self,
        from: VertexId,
    ) -> Option<HashMap<VertexId, VertexId>> {
        let order = self.graph.topological_sort()?;
        let mut distance = vec![f32::INFINITY; self.graph.slot_bound()];
        distance[from.slot()] = 0.0;
        let mut predecessors: HashMap<VertexId, VertexId> =
            self.graph.vertex_ids().map(|v| (v, v)).collect();
        for u in order {
            if distance[u.slot()].is_infinite() {
                continue;
            }
            for &e in self.graph.out_edges(u) {
                let edge = self.graph.edge(e);
                let candidate = distance[u.slot()] + edge.transition_score;
                if candidate < distance[edge.target.slot()] {
                    distance[edge.target.slot()] = candidate;
                    predecessors.insert(edge.target, u);
                }
            }
        }
        Some(predecessors)
    }

    fn is_vertex_on_path(
        &self,
        v: VertexId,
        predecessors: &HashMap<VertexId, VertexId>,
        from: VertexId,
    ) -> bool {
        if v == from {
            return true;
        }
        let mut current = from;
        while let Some(&pred) = predecessors.get(&current) {
            if pred == current {
                return false;
            }
            if pred == v {
                return true;
            }
            current = pred;
        }
        false
    }

    fn backtrack_until_nonreference(
        &self,
        predecessors: &HashMap<VertexId, VertexId>,
        mut from: VertexId,
    ) -> (VertexId, VertexId, usize) {
        let head = self.reference_head();
        let mut v = predecessors[&from];
        let mut count = 1usize;
        while v != head {
            debug_assert_ne!(v, from, "tail must be reachable from the head");
            let e = self.graph.find_edge(v, from).expect("predecessor edge");
            if !self.graph.edge(e).is_reference {
                break;
            }
            from = v;
            v = predecessors[&from];
            count += 1;
        }
        (v, from, count)
    }

    fn extract_nonreference_path(
        &self,
        predecessors: &HashMap<VertexId, VertexId>,
        mut from: VertexId,
    ) -> Vec<VertexId> {
        let mut path = vec![from];
        from = predecessors[&from];
        while !self.graph.vertex(from).is_reference {
            path.push(from);
            from = predecessors[&from];
        }
        path.reverse();
        path
    }

    // path classification

    fn is_bridge(&self, v: VertexId) -> bool {
        self.graph.in_degree(v) == 1 && self.graph.out_degree(v) == 1
    }

    fn bridge_prefix_len(&self, path: &[VertexId]) -> usize {
        path.iter()
            .position(|&v| !self.is_bridge(v))
            .unwrap_or(path.len())
    }

    fn joins_reference_only(&self, v: VertexId) -> bool {
        self.graph.out_degree(v) == 1
            && self
                .graph
                .edge(self.graph.out_edges(v)[0])
                .is_reference
    }

    fn is_simple_deletion(&self, e: EdgeId) -> bool {
        let edge = self.graph.edge(e);
        !edge.is_reference
            && self.graph.vertex(edge.source).is_reference
            && self.graph.vertex(edge.target).is_reference
    }

    fn is_edge_on_path(&self, e: EdgeId, path: &[VertexId]) -> bool {
        path.windows(2)
            .any(|pair| self.graph.find_edge(pair[0], pair[1]) == Some(e))
    }

    fn connects_to_path(&self, e: EdgeId, path: &[VertexId]) -> bool {
        let front_in = self.graph.in_edges(path[0]).first().copied();
        let back_out = self
            .graph
            .out_edges(*path.last().expect("non-empty path"))
            .first()
            .copied();
        front_in == Some(e) || back_out == Some(e)
    }

    fn is_dependent_on_path(&self, e: EdgeId, path: &[VertexId]) -> bool {
        self.connects_to_path(e, path) || self.is_edge_on_path(e, path)
    }

    fn is_dominated_by_path(
        &self,
        v: VertexId,
        prefix: &[VertexId],
        dominators: &HashMap<VertexId, VertexId>,
    ) -> bool {
        let Some(dominator) = dominators.get(&v) else {
            return false;
        };
        prefix.iter().rev().any(|u| u == dominator)
    }

    /// Remove a bridge chain and its boundary edges.
    fn remove_path(&mut self, path: &[VertexId]) {
        debug_assert!(!path.is_empty());
        if path.len() == 1 {
            self.clear_and_remove_vertex(path[0]);
            return;
        }
        if let Some(&e) = self.graph.in_edges(path[0]).first() {
            self.graph.remove_edge(e);
        }
        for pair in path.windows(2) {
            self.graph.remove_edge_between(pair[0], pair[1]);
            self.remove_vertex(pair[0]);
        }
        let back = *path.last().expect("non-empty path");
        if let Some(&e) = self.graph.out_edges(back).first() {
            self.graph.remove_edge(e);
        }
        self.remove_vertex(back);
    }

    // sequence reconstruction

    fn make_sequence(&self, path: &[VertexId]) -> Vec<u8> {
        let mut sequence = self.graph.vertex(path[0]).kmer.to_vec();
        sequence.reserve(path.len() - 1);
        for &v in &path[1..] {
            sequence.push(self.back_base(v));
        }
        sequence
    }

    fn make_reference(&self, from: VertexId, to: VertexId) -> Vec<u8> {
        if from == to {
            return Vec::new();
        }
        let mut sequence = self.graph.vertex(from).kmer.to_vec();
        let mut u = self.next_reference(from);
        while u != to {
            sequence.push(self.back_base(u));
            u = self.next_reference(u);
        }
        sequence
    }

    fn extract_nondominant_reference(
        &self,
        dominators: &HashMap<VertexId, VertexId>,
    ) -> Vec<VertexId> {
        let dominating: std::collections::HashSet<VertexId> =
            dominators.values().copied().collect();
        let tail = self.reference_tail();
        dominators
            .keys()
            .copied()
            .filter(|&v| {
                self.graph.vertex(v).is_reference && v != tail && !dominating.contains(&v)
            })
            .collect()
    }

    // bubble extraction

    fn extract_highest_scoring_bubble_paths(&mut self, max: usize) -> VecDeque<RawVariant> {
        let mut dominators = dominator_tree(&self.graph, self.reference_head());
        let mut num_remaining_alt = self.num_kmers() - self.num_reference_kmers();
        let mut blocked_edge: Option<EdgeId> = None;
        let mut remaining_blockings = MAX_BLOCKINGS;
        let mut result: VecDeque<RawVariant> = VecDeque::new();
        let mut budget = max;

        while budget > 0 && num_remaining_alt > 0 {
            let Some(predecessors) = self.find_shortest_scoring_paths(self.reference_head())
            else {
                break;
            };
            if let Some(blocked) = blocked_edge {
                if remaining_blockings == 0 {
                    self.blocking_cap_hit = true;
                    return result;
                }
                remaining_blockings -= 1;
                let blocked_target = self.graph.edge(blocked).target;
                if !self.is_vertex_on_path(blocked_target, &predecessors, self.reference_tail()) {
                    let source = self.graph.edge(blocked).source;
                    self.set_out_edge_transition_scores(source);
                    blocked_edge = None;
                } else if self
                    .graph
                    .out_edges(blocked_target)
                    .iter()
                    .all(|&e| self.is_blocked(e))
                {
                    return result;
                }
            }

            let (mut alt, mut ref_join, mut rhs_kmer_count) =
                self.backtrack_until_nonreference(&predecessors, self.reference_tail());

            if alt == self.reference_head() {
                // The reference itself is the shortest path; force the
                // search off it by blocking non-dominant reference vertices.
                let nondominant = self.extract_nondominant_reference(&dominators);
                if nondominant
                    .iter()
                    .all(|&v| self.all_in_edges_are_blocked(v))
                {
                    return result;
                }
                for v in nondominant {
                    self.block_all_in_edges(v);
                }
                continue;
            }

            while alt != self.reference_head() {
                let mut alt_path = self.extract_nonreference_path(&predecessors, alt);
                debug_assert!(!alt_path.is_empty());
                let ref_before_bubble = predecessors[&alt_path[0]];
                let ref_seq = self.make_reference(ref_before_bubble, ref_join);
                let alt_seq = {
                    let mut anchored = Vec::with_capacity(alt_path.len() + 1);
                    anchored.push(ref_before_bubble);
                    anchored.extend_from_slice(&alt_path);
                    self.make_sequence(&anchored)
                };
                rhs_kmer_count += count_kmers(ref_seq.len(), self.k);
                let pos = (self.reference_head_position + self.reference_size())
                    .saturating_sub(sequence_length(rhs_kmer_count, self.k));
                result.push_front(RawVariant {
                    begin_pos: pos,
                    ref_seq,
                    alt_seq,
                });
                // One reference kmer was borrowed as the bubble anchor.
                rhs_kmer_count -= 1;

                let edge_to_join = self
                    .graph
                    .find_edge(alt, ref_join)
                    .expect("bubble rejoin edge");
                if alt_path.len() == 1 && self.is_simple_deletion(edge_to_join) {
                    if let Some(blocked) = blocked_edge {
                        let be = self.graph.edge(blocked);
                        if be.source == alt_path[0] && be.target == ref_join {
                            blocked_edge = None;
                        }
                    }
                    self.graph.remove_edge_between(alt_path[0], ref_join);
                    self.set_out_edge_transition_scores(alt_path[0]);
                } else {
                    let mut vertex_before_bridge = ref_before_bubble;
                    while !alt_path.is_empty() {
                        let bifurcation = self.bridge_prefix_len(&alt_path);
                        if bifurcation == alt_path.len() {
                            if let Some(blocked) = blocked_edge {
                                if self.is_dependent_on_path(blocked, &alt_path) {
                                    blocked_edge = None;
                                }
                            }
                            self.remove_path(&alt_path);
                            self.set_out_edge_transition_scores(vertex_before_bridge);
                            for v in &alt_path {
                                dominators.remove(v);
                            }
                            num_remaining_alt = num_remaining_alt.saturating_sub(alt_path.len());
                            alt_path.clear();
                        } else if bifurcation > 0 && self.joins_reference_only(alt_path[bifurcation])
                        {
                            alt_path.truncate(bifurcation);
                            if let Some(blocked) = blocked_edge {
                                if self.is_dependent_on_path(blocked, &alt_path) {
                                    blocked_edge = None;
                                }
                            }
                            self.remove_path(&alt_path);
                            self.set_out_edge_transition_scores(vertex_before_bridge);
                            for v in &alt_path {
                                dominators.remove(v);
                            }
                            num_remaining_alt = num_remaining_alt.saturating_sub(alt_path.len());
                            break;
                        } else if self.is_dominated_by_path(
                            alt_path[bifurcation],
                            &alt_path[..bifurcation],
                            &dominators,
                        ) {
                            vertex_before_bridge = alt_path[bifurcation];
                            alt_path.drain(..=bifurcation);
                        } else {
                            if bifurcation != 0 {
                                let e = self
                                    .graph
                                    .find_edge(alt_path[bifurcation - 1], alt_path[bifurcation])
                                    .expect("path edge");
                                self.block_edge(e);
                                blocked_edge = Some(e);
                            } else {
                                self.block_all_in_edges(alt_path[0]);
                            }
                            break;
                        }
                    }
                }

                let (next_alt, next_ref, kmer_count) =
                    self.backtrack_until_nonreference(&predecessors, ref_before_bubble);
                alt = next_alt;
                ref_join = next_ref;
                rhs_kmer_count += kmer_count;
                budget = budget.saturating_sub(1);
            }

            debug_assert!(self.graph.out_degree(self.reference_head()) > 0);
            debug_assert!(self.graph.in_degree(self.reference_tail()) > 0);
            if self.can_prune_reference_flanks() {
                if !self.prune_reference_flanks() {
                    break;
                }
                dominators = dominator_tree(&self.graph, self.reference_head());
            }
        }
        result
    }
}

#[derive(Debug)]
struct RawVariant {
    begin_pos: usize,
    ref_seq: Vec<u8>,
    alt_seq: Vec<u8>,
}

fn make_parsimonious(raw: RawVariant) -> AssembledVariant {
    let RawVariant {
        begin_pos,
        mut ref_seq,
        mut alt_seq,
    } = raw;
    let prefix = ref_seq
        .iter()
        .zip(alt_seq.iter())
        .take_while(|(a, b)| a == b)
        .count();
    ref_seq.drain(..prefix);
    alt_seq.drain(..prefix);
    let suffix = ref_seq
        .iter()
        .rev()
        .zip(alt_seq.iter().rev())
        .take_while(|(a, b)| a == b)
        .count();
    ref_seq.truncate(ref_seq.len() - suffix);
    alt_seq.truncate(alt_seq.len() - suffix);
    AssembledVariant {
        begin_pos: (begin_pos + prefix) as u32,
        ref_seq,
        alt_seq,
    }
}
