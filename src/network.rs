//! Communication Network Builder
//!
//! Builds the weighted participant graph from a source's full item set
//! and computes per-node degree and betweenness centrality plus
//! graph-level density and average clustering. Single CPU-bound pass,
//! deterministic output for an unchanged item set.

use crate::models::{CommunicationNetwork, ForensicItem, NetworkEdge, NetworkNode};
use std::collections::{BTreeMap, BTreeSet, VecDeque};

/// Build the graph and its metrics from the full item set.
pub fn build(items: &[ForensicItem]) -> CommunicationNetwork {
    let mut nodes: BTreeSet<String> = BTreeSet::new();
    let mut weights: BTreeMap<(String, String), u64> = BTreeMap::new();

    for item in items {
        let participants = item.participants();
        for p in &participants {
            nodes.insert(p.clone());
        }
        // One increment per unordered pair per item. participants() is a
        // set, so an address appearing as sender and recipient of the
        // same item cannot double count.
        let list: Vec<&String> = participants.iter().collect();
        for i in 0..list.len() {
            for j in i + 1..list.len() {
                let key = (list[i].clone(), list[j].clone());
                *weights.entry(key).or_insert(0) += 1;
            }
        }
    }

    let ids: Vec<String> = nodes.into_iter().collect();
    let index: BTreeMap<&str, usize> = ids.iter().map(|s| s.as_str()).zip(0..).collect();
    let n = ids.len();

    let mut adjacency: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); n];
    for (a, b) in weights.keys() {
        let (ia, ib) = (index[a.as_str()], index[b.as_str()]);
        adjacency[ia].insert(ib);
        adjacency[ib].insert(ia);
    }

    let betweenness = betweenness_centrality(&adjacency);
    let node_list: Vec<NetworkNode> = ids
        .iter()
        .enumerate()
        .map(|(i, id)| NetworkNode {
            id: id.clone(),
            degree_centrality: if n > 1 {
                adjacency[i].len() as f64 / (n - 1) as f64
            } else {
                0.0
            },
            betweenness_centrality: betweenness[i],
        })
        .collect();

    let edge_count = weights.len();
    let density = if n > 1 {
        (2 * edge_count) as f64 / (n * (n - 1)) as f64
    } else {
        0.0
    };

    CommunicationNetwork {
        nodes: node_list,
        edges: weights
            .into_iter()
            .map(|((a, b), weight)| NetworkEdge { a, b, weight })
            .collect(),
        density,
        average_clustering: average_clustering(&adjacency),
    }
}

/// Brandes' algorithm on the unweighted graph, normalized to the share
/// of shortest paths passing through each node.
fn betweenness_centrality(adjacency: &[BTreeSet<usize>]) -> Vec<f64> {
    let n = adjacency.len();
    let mut centrality = vec![0.0f64; n];
    if n < 3 {
        return centrality;
    }

    for s in 0..n {
        let mut stack = Vec::new();
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); n];
        let mut sigma = vec![0.0f64; n];
        let mut dist = vec![-1i64; n];
        sigma[s] = 1.0;
        dist[s] = 0;

        let mut queue = VecDeque::new();
        queue.push_back(s);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for &w in &adjacency[v] {
                if dist[w] < 0 {
                    dist[w] = dist[v] + 1;
                    queue.push_back(w);
                }
                if dist[w] == dist[v] + 1 {
                    sigma[w] += sigma[v];
                    predecessors[w].push(v);
                }
            }
        }

        let mut delta = vec![0.0f64; n];
        while let Some(w) = stack.pop() {
            for &v in &predecessors[w] {
                delta[v] += (sigma[v] / sigma[w]) * (1.0 + delta[w]);
            }
            if w != s {
                centrality[w] += delta[w];
            }
        }
    }

    // Undirected: each pair counted twice; normalize by the number of
    // node pairs excluding the node itself.
    let scale = ((n - 1) * (n - 2)) as f64;
    for c in centrality.iter_mut() {
        *c /= scale;
    }
    centrality
}

/// Average of local clustering coefficients over all nodes.
fn average_clustering(adjacency: &[BTreeSet<usize>]) -> f64 {
    let n = adjacency.len();
    if n == 0 {
        return 0.0;
    }
    let mut total = 0.0;
    for neighbors in adjacency {
        let k = neighbors.len();
        if k < 2 {
            continue;
        }
        let mut links = 0;
        let list: Vec<usize> = neighbors.iter().copied().collect();
        for i in 0..list.len() {
            for j in i + 1..list.len() {
                if adjacency[list[i]].contains(&list[j]) {
                    links += 1;
                }
            }
        }
        total += (2 * links) as f64 / (k * (k - 1)) as f64;
    }
    total / n as f64
}
