//! Validation helpers for run parameters and dependency graphs.

use crate::errors::DeployError;
use regex::Regex;
use std::sync::LazyLock;

/// Allowed shape of a run id. It is appended to token names and checkpoint
/// file names, so it stays short and filesystem safe.
pub const RUN_ID_PATTERN: &str = r"^[A-Za-z0-9_-]{1,64}$";

static RUN_ID: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(RUN_ID_PATTERN).ok());

/// Checks a run id against [`RUN_ID_PATTERN`].
pub fn validate_run_id(run_id: &str) -> Result<(), DeployError> {
    let valid = RUN_ID.as_ref().is_some_and(|re| re.is_match(run_id));
    if valid {
        Ok(())
    } else {
        Err(DeployError::InvalidConfig(format!(
            "run_id '{run_id}' must match {RUN_ID_PATTERN}"
        )))
    }
}

/// Finds a cycle in an index-based graph, returning the node path with the
/// first node repeated at the end.
///
/// `edges[n]` lists the nodes `n` depends on. Only nodes in `candidates` are
/// explored, which lets callers restrict the search to what a topological
/// pass could not order.
#[must_use]
pub fn find_cycle(edges: &[Vec<usize>], candidates: &[usize]) -> Option<Vec<usize>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        Unvisited,
        InStack,
        Done,
    }

    fn dfs(node: usize, edges: &[Vec<usize>], marks: &mut [Mark], path: &mut Vec<usize>) -> Option<Vec<usize>> {
        match marks[node] {
            Mark::InStack => {
                let start = path.iter().position(|n| *n == node).unwrap_or(0);
                let mut cycle = path[start..].to_vec();
                cycle.push(node);
                return Some(cycle);
            }
            Mark::Done => return None,
            Mark::Unvisited => {}
        }

        marks[node] = Mark::InStack;
        path.push(node);
        for dep in &edges[node] {
            if let Some(cycle) = dfs(*dep, edges, marks, path) {
                return Some(cycle);
            }
        }
        path.pop();
        marks[node] = Mark::Done;
        None
    }

    let mut marks = vec![Mark::Unvisited; edges.len()];
    let mut path = Vec::new();
    candidates
        .iter()
        .find_map(|start| dfs(*start, edges, &mut marks, &mut path))
}
