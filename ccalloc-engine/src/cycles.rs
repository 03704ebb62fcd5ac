//! Cycle breaking.
//!
//! Cycles are detected one at a time by a depth-first search over instance
//! nodes in insertion order. A cycle can be broken when at least two
//! different services of the precedence list appear on it. The edge
//! removed is the one entering the first instance, along the cycle, of
//! the service ranked highest. Services missing from the list never
//! decide where a cycle is broken.

use ccalloc_core::CycleConfig;
use tracing::{error, info};

use crate::error::AllocationError;
use crate::graph::AllocationGraph;

/// A removed edge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleBreak {
    /// The removed edge.
    pub edge: usize,
    /// The cycle it was removed from, e.g. `a.a,b.b,a.a`.
    pub cycle: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Visit {
    New,
    Active,
    Done,
}

/// Removes edges until the graph is acyclic.
///
/// Self consumption and already removed edges are ignored.
///
/// # Errors
///
/// Returns [`AllocationError::AmbiguousCycle`] when a cycle has no removable
/// edge, and [`AllocationError::CycleBreakLimitExceeded`] when a cycle is
/// still present after `max_breaks` removals.
pub fn break_cycles(
    graph: &mut AllocationGraph,
    config: &CycleConfig,
) -> Result<Vec<CycleBreak>, AllocationError> {
    let mut breaks = Vec::new();
    loop {
        info!(pass = breaks.len(), "Detecting and breaking cycles");
        let Some(cycle) = find_cycle(graph) else {
            return Ok(breaks);
        };
        let cycle_text = describe_cycle(graph, &cycle);

        if breaks.len() >= config.max_breaks {
            error!(
                max_breaks = config.max_breaks,
                cycle = %cycle_text,
                "Max number of cost allocation cycle breaks was reached"
            );
            return Err(AllocationError::CycleBreakLimitExceeded {
                max_breaks: config.max_breaks,
            });
        }

        let Some(edge) = choose_edge(graph, &cycle, config) else {
            error!(cycle = %cycle_text, "Unbreakable cost allocation cycle detected");
            return Err(AllocationError::AmbiguousCycle { cycle: cycle_text });
        };

        let removed = graph.edge(edge);
        info!(
            provider = %graph.instance(removed.provider),
            consumer = %graph.instance(removed.consumer),
            cycle = %cycle_text,
            "Broke cost allocation cycle"
        );
        graph.remove_edge(edge);
        breaks.push(CycleBreak {
            edge,
            cycle: cycle_text,
        });
    }
}

/// Finds one cycle, returned as its edges starting from the re-entered node.
pub fn find_cycle(graph: &AllocationGraph) -> Option<Vec<usize>> {
    let count = graph.instance_count();
    let mut state = vec![Visit::New; count];

    for root in 0..count {
        if state[root] != Visit::New {
            continue;
        }
        state[root] = Visit::Active;
        // (node, position in its outgoing list); path[i] links stack[i] to stack[i + 1]
        let mut stack = vec![(root, 0usize)];
        let mut path: Vec<usize> = Vec::new();

        while let Some(frame) = stack.last_mut() {
            let node = frame.0;
            let outgoing = graph.outgoing(node);
            if frame.1 >= outgoing.len() {
                state[node] = Visit::Done;
                stack.pop();
                path.pop();
                continue;
            }
            let edge_id = outgoing[frame.1];
            frame.1 += 1;

            let edge = graph.edge(edge_id);
            if edge.removed || edge.is_self_consumption() {
                continue;
            }
            match state[edge.consumer] {
                Visit::New => {
                    state[edge.consumer] = Visit::Active;
                    stack.push((edge.consumer, 0));
                    path.push(edge_id);
                }
                Visit::Active => {
                    let start = stack.iter().position(|&(n, _)| n == edge.consumer)?;
                    let mut cycle = path[start..].to_vec();
                    cycle.push(edge_id);
                    return Some(cycle);
                }
                Visit::Done => {}
            }
        }
    }
    None
}

fn choose_edge(graph: &AllocationGraph, cycle: &[usize], config: &CycleConfig) -> Option<usize> {
    // cycle[i] leaves node i, so cycle[i - 1] enters it
    let listed: Vec<(usize, usize)> = cycle
        .iter()
        .enumerate()
        .filter_map(|(i, &e)| {
            let node = graph.edge(e).provider;
            config
                .precedence_rank(&graph.instance(node).service)
                .map(|rank| (rank, i))
        })
        .collect();

    let &(first_rank, first) = listed.iter().min_by_key(|&&(rank, _)| rank)?;
    if !listed.iter().any(|&(rank, _)| rank != first_rank) {
        return None;
    }
    let entering = if first == 0 { cycle.len() - 1 } else { first - 1 };
    Some(cycle[entering])
}

fn describe_cycle(graph: &AllocationGraph, cycle: &[usize]) -> String {
    let mut nodes: Vec<String> = cycle
        .iter()
        .map(|&e| graph.instance(graph.edge(e).provider).to_string())
        .collect();
    if let Some(&first) = cycle.first() {
        nodes.push(graph.instance(graph.edge(first).provider).to_string());
    }
    nodes.join(",")
}
