// This file contains the neighbour selection policy: for one query leaf, which other leaves of
// the tree count as its closest neighbours.

// This file is part of CladeSeek. CladeSeek is free software: you can redistribute it and/or
// modify it under the terms of the GNU General Public License as published by the Free Software
// Foundation, either version 3 of the License, or (at your option) any later version. CladeSeek
// is distributed in the hope that it will be useful, but WITHOUT ANY WARRANTY; without even the
// implied warranty of MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU General
// Public License for more details. You should have received a copy of the GNU General Public
// License along with CladeSeek. If not, see <http://www.gnu.org/licenses/>.

use fxhash::FxHashSet;
use std::fmt;

use crate::identifier::{resolve, same_genome};
use crate::misc::format_float;
use crate::tree::Tree;


#[derive(Clone, Debug)]
pub struct SelectionPolicy {
    pub num_neighbours: usize,

    // Neighbours are only kept while their distance is at most this multiple of the closest
    // neighbour's distance. None keeps everything (up to num_neighbours).
    pub max_ratio: Option<f64>,

    // Candidates closer than this are treated as duplicate records of the query itself.
    pub self_hit_threshold: Option<f64>,
}

impl SelectionPolicy {
    pub fn new(num_neighbours: usize, max_ratio: f64, self_hit_threshold: f64) -> Self {
        // Zero turns off the ratio cutoff and the self-hit threshold, which is how the command
        // line options express "disabled".
        SelectionPolicy {
            num_neighbours,
            max_ratio: if max_ratio > 0.0 { Some(max_ratio) } else { None },
            self_hit_threshold: if self_hit_threshold > 0.0 { Some(self_hit_threshold) }
                                                       else { None },
        }
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "at most {} neighbours", self.num_neighbours)?;
        if let Some(ratio) = self.max_ratio {
            write!(f, ", within {}x of the closest", format_float(ratio))?;
        }
        if let Some(threshold) = self.self_hit_threshold {
            write!(f, ", ignoring hits closer than {}", format_float(threshold))?;
        }
        Ok(())
    }
}


#[derive(Clone, Debug, PartialEq)]
pub struct Neighbour {
    pub leaf: usize,
    pub id: String,
    pub distance: f64,
}


#[derive(Clone, Debug, PartialEq)]
pub struct NeighbourRecord {
    pub query_id: String,
    pub neighbour_id: String,
    pub distance: f64,
    pub taxonomy: String,
}


pub struct ResolvedQueries {
    pub leaves: Vec<(String, usize)>,  // (query ID, leaf), in input order
    pub unresolved: Vec<String>,
}

impl ResolvedQueries {
    pub fn leaf_set(&self) -> FxHashSet<usize> {
        self.leaves.iter().map(|(_, leaf)| *leaf).collect()
    }
}


pub fn resolve_query_leaves(tree: &Tree, query_ids: &[String]) -> ResolvedQueries {
    // Each query ID is matched to a leaf using its variations. A leaf only counts once, for the
    // first query ID that matched it.
    let mut leaves = Vec::new();
    let mut unresolved = Vec::new();
    let mut used = FxHashSet::default();
    for query_id in query_ids {
        match resolve(query_id, |v| tree.leaf_by_name(v)) {
            Some((_, leaf)) => {
                if used.insert(leaf) { leaves.push((query_id.clone(), leaf)); }
            }
            None => unresolved.push(query_id.clone()),
        }
    }
    ResolvedQueries { leaves, unresolved }
}


pub fn prefix_queries(tree: &Tree, prefixes: &[String]) -> Vec<(String, usize)> {
    // Leaves whose names start with any of the prefixes, in leaf order.
    tree.leaf_names().zip(tree.leaves().iter().copied())
        .filter(|(name, _)| prefixes.iter().any(|p| name.starts_with(p.as_str())))
        .map(|(name, leaf)| (name.to_string(), leaf)).collect()
}


pub fn candidate_distances(tree: &Tree, query: usize, queries: &FxHashSet<usize>) -> Vec<Neighbour> {
    // Returns every leaf that could be a neighbour of the query, sorted by distance (ties broken
    // by name). Leaves from the query's own genome and other query leaves are never candidates.
    let query_name = tree.name(query);
    let distances = tree.distances_from(query);
    let mut candidates: Vec<Neighbour> = tree.leaves().iter()
        .filter(|&&leaf| leaf != query && !queries.contains(&leaf))
        .filter(|&&leaf| !same_genome(tree.name(leaf), query_name))
        .map(|&leaf| Neighbour { leaf, id: tree.name(leaf).to_string(),
                                 distance: distances[leaf] })
        .collect();
    sort_neighbours(&mut candidates);
    candidates
}


pub fn query_distances(tree: &Tree, query: usize, queries: &FxHashSet<usize>) -> Vec<Neighbour> {
    // Every other query, including those from the query's own genome, sorted like
    // candidate_distances. Query sets are small, so each distance is found with its own ancestor
    // walk.
    let mut others: Vec<Neighbour> = queries.iter().copied()
        .filter(|&leaf| leaf != query)
        .map(|leaf| Neighbour { leaf, id: tree.name(leaf).to_string(),
                                distance: tree.distance(query, leaf) })
        .collect();
    sort_neighbours(&mut others);
    others
}


fn sort_neighbours(neighbours: &mut [Neighbour]) {
    neighbours.sort_by(|a, b| a.distance.total_cmp(&b.distance).then_with(|| a.id.cmp(&b.id)));
}


pub fn select_neighbours(tree: &Tree, query: usize, queries: &FxHashSet<usize>,
                         policy: &SelectionPolicy) -> Vec<Neighbour> {
    let mut candidates = candidate_distances(tree, query, queries);
    if let Some(threshold) = policy.self_hit_threshold {
        candidates.retain(|n| n.distance >= threshold);
    }
    let mut neighbours = match policy.max_ratio {
        Some(ratio) => apply_ratio_cutoff(candidates, ratio),
        None        => candidates,
    };
    neighbours.truncate(policy.num_neighbours);
    neighbours
}


pub fn apply_ratio_cutoff(sorted_candidates: Vec<Neighbour>, ratio: f64) -> Vec<Neighbour> {
    // The candidates are sorted by distance, so this is a single forward scan that stops at the
    // first candidate beyond the cutoff. The comparison is inclusive: a candidate at exactly
    // ratio times the closest distance is kept.
    let Some(closest) = sorted_candidates.first().map(|n| n.distance) else {
        return sorted_candidates;
    };
    let cutoff = closest * ratio;
    sorted_candidates.into_iter().take_while(|n| n.distance <= cutoff).collect()
}
