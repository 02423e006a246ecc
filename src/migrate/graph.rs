//! Dependency ordering.
//!
//! Kahn's algorithm over the declared-prerequisite graph. A prerequisite
//! that was never discovered is a hard configuration error; a cycle means
//! no valid order exists and the whole run must abort before applying
//! anything.

use std::collections::HashMap;

use super::MigrationError;

/// Compute a total order over `(id, dependencies)` nodes, returning
/// indexes into the input slice. Ready nodes are consumed in id order so
/// the result is deterministic and timestamp-prefixed ids stay
/// chronological.
pub fn topological_order(
    nodes: &[(String, Vec<String>)],
) -> Result<Vec<usize>, MigrationError> {
    let index_of: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(i, (id, _))| (id.as_str(), i))
        .collect();

    let mut in_degree = vec![0usize; nodes.len()];
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); nodes.len()];
    for (i, (id, dependencies)) in nodes.iter().enumerate() {
        for dependency in dependencies {
            let Some(&dep_index) = index_of.get(dependency.as_str()) else {
                return Err(MigrationError::MissingDependency {
                    id: id.clone(),
                    dependency: dependency.clone(),
                });
            };
            dependents[dep_index].push(i);
            in_degree[i] += 1;
        }
    }

    let mut ready: Vec<usize> = (0..nodes.len()).filter(|&i| in_degree[i] == 0).collect();
    ready.sort_by(|&a, &b| nodes[a].0.cmp(&nodes[b].0));

    let mut order = Vec::with_capacity(nodes.len());
    while let Some(next) = ready.first().copied() {
        ready.remove(0);
        order.push(next);
        for &dependent in &dependents[next] {
            in_degree[dependent] -= 1;
            if in_degree[dependent] == 0 {
                let position = ready
                    .binary_search_by(|&i| nodes[i].0.cmp(&nodes[dependent].0))
                    .unwrap_or_else(|p| p);
                ready.insert(position, dependent);
            }
        }
    }

    if order.len() < nodes.len() {
        let mut stuck: Vec<String> = (0..nodes.len())
            .filter(|i| !order.contains(i))
            .map(|i| nodes[i].0.clone())
            .collect();
        stuck.sort();
        return Err(MigrationError::CircularDependency(stuck));
    }

    Ok(order)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(id: &str, deps: &[&str]) -> (String, Vec<String>) {
        (
            id.to_string(),
            deps.iter().map(|d| d.to_string()).collect(),
        )
    }

    fn ids(nodes: &[(String, Vec<String>)], order: &[usize]) -> Vec<String> {
        order.iter().map(|&i| nodes[i].0.clone()).collect()
    }

    #[test]
    fn test_dependency_precedes_dependent() {
        // Declared out of order on purpose.
        let nodes = vec![node("b", &["a"]), node("a", &[])];
        let order = topological_order(&nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["a", "b"]);
    }

    #[test]
    fn test_independent_nodes_sort_by_id() {
        let nodes = vec![node("c", &[]), node("a", &[]), node("b", &[])];
        let order = topological_order(&nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_diamond() {
        let nodes = vec![
            node("d", &["b", "c"]),
            node("b", &["a"]),
            node("c", &["a"]),
            node("a", &[]),
        ];
        let order = topological_order(&nodes).unwrap();
        assert_eq!(ids(&nodes, &order), vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let nodes = vec![node("a", &["b"]), node("b", &["a"])];
        let err = topological_order(&nodes).unwrap_err();
        match err {
            MigrationError::CircularDependency(stuck) => {
                assert_eq!(stuck, vec!["a".to_string(), "b".to_string()]);
            }
            other => panic!("expected CircularDependency, got {other}"),
        }
    }

    #[test]
    fn test_missing_dependency_is_rejected() {
        let nodes = vec![node("a", &["ghost"])];
        let err = topological_order(&nodes).unwrap_err();
        assert!(matches!(err, MigrationError::MissingDependency { .. }));
    }

    #[test]
    fn test_empty_input() {
        assert!(topological_order(&[]).unwrap().is_empty());
    }
}
