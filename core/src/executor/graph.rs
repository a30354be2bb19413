use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};

use crate::error::GraphError;
use crate::executor::types::TaskLike;

/// Shape metrics of a validated task graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GraphStatistics {
    pub total_tasks: usize,
    pub batch_count: usize,
    /// Largest batch, i.e. the parallelism ceiling.
    pub max_parallelism: usize,
    /// Number of tasks on the longest dependency chain.
    pub critical_path_length: usize,
    pub mean_dependencies: f64,
}

/// Task dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, T>,

    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,

    /// task_id -> position in `insertion_order`
    position: HashMap<String, usize>,
}

impl<T: TaskLike> TaskGraph<T> {
    /// Construct task graph from task list.
    ///
    /// Only duplicate ids are rejected here; use [`TaskGraph::build`] for a
    /// fully validated graph.
    pub fn from_tasks(tasks: &[T]) -> Result<Self, GraphError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();
        let mut position = HashMap::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(GraphError::DuplicateTaskId(task.id().to_string()));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            position.insert(task_id.clone(), insertion_order.len());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
            position,
        })
    }

    /// Build and validate: dangling references and cycles are errors.
    pub fn build(tasks: &[T]) -> Result<Self, GraphError> {
        let graph = Self::from_tasks(tasks)?;
        graph.validate()?;
        Ok(graph)
    }

    /// Collect every problem in a task list without stopping at the first.
    ///
    /// Returns an empty list when the tasks form a valid graph.
    pub fn validate_dependencies(tasks: &[T]) -> Vec<String> {
        let mut problems = Vec::new();

        let mut seen = HashSet::new();
        for task in tasks {
            if !seen.insert(task.id().to_string()) {
                problems.push(GraphError::DuplicateTaskId(task.id().to_string()).to_string());
            }
        }

        // Later duplicates are ignored so the rest of the table can still be checked.
        let mut unique = Vec::new();
        let mut kept = HashSet::new();
        for task in tasks {
            if kept.insert(task.id().to_string()) {
                unique.push(task.clone());
            }
        }

        let graph = match Self::from_tasks(&unique) {
            Ok(graph) => graph,
            Err(e) => {
                problems.push(e.to_string());
                return problems;
            }
        };

        for task_id in &graph.insertion_order {
            let task = &graph.nodes[task_id];
            for dep in task.dependencies() {
                if !graph.nodes.contains_key(dep) {
                    problems.push(
                        GraphError::DependencyNotFound {
                            task_id: task_id.clone(),
                            missing_dep: dep.clone(),
                        }
                        .to_string(),
                    );
                }
            }
        }

        if let Some(path) = graph.detect_cycle() {
            problems.push(GraphError::Cycle { path }.to_string());
        }

        problems.extend(graph.affected_output_problems().iter().map(|e| e.to_string()));

        problems
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), GraphError> {
        for task_id in &self.insertion_order {
            for dep in &self.edges[task_id] {
                if !self.nodes.contains_key(dep) {
                    return Err(GraphError::DependencyNotFound {
                        task_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(path) = self.detect_cycle() {
            return Err(GraphError::Cycle { path });
        }

        Ok(())
    }

    /// Every `affected_outputs` entry must exist and be a transitive dependent
    /// of the task that lists it.
    pub fn validate_affected_outputs(&self) -> Result<(), GraphError> {
        match self.affected_output_problems().into_iter().next() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn affected_output_problems(&self) -> Vec<GraphError> {
        let mut problems = Vec::new();
        for task_id in &self.insertion_order {
            let affected = self.nodes[task_id].affected_outputs();
            if affected.is_empty() {
                continue;
            }
            let downstream = self.transitive_dependents(task_id);
            for id in affected {
                if !self.nodes.contains_key(id) {
                    problems.push(GraphError::AffectedOutputNotFound {
                        task_id: task_id.clone(),
                        missing: id.clone(),
                    });
                } else if !downstream.contains(id) {
                    problems.push(GraphError::AffectedOutputNotDependent {
                        task_id: task_id.clone(),
                        affected: id.clone(),
                    });
                }
            }
        }
        problems
    }

    /// Task ids in definition order.
    pub fn task_ids(&self) -> &[String] {
        &self.insertion_order
    }

    pub fn get(&self, task_id: &str) -> Option<&T> {
        self.nodes.get(task_id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Direct dependents of a task, in definition order.
    pub fn dependents(&self, task_id: &str) -> &[String] {
        self.reverse_edges
            .get(task_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every task reachable downstream of `task_id` (excluding itself).
    pub fn transitive_dependents(&self, task_id: &str) -> HashSet<String> {
        let mut seen = HashSet::new();
        let mut queue: VecDeque<&str> = VecDeque::from([task_id]);

        while let Some(current) = queue.pop_front() {
            for dependent in self.dependents(current) {
                if seen.insert(dependent.clone()) {
                    queue.push_back(dependent);
                }
            }
        }

        seen.remove(task_id);
        seen
    }

    /// Topological sort using Kahn's algorithm
    ///
    /// Returns execution batches where tasks in the same batch can run in
    /// parallel. Ties within a batch keep definition order.
    ///
    /// # Time Complexity
    ///
    /// O(V log V + E) where V = number of tasks, E = number of dependencies
    pub fn topological_sort(&self) -> Result<Vec<Vec<String>>, GraphError> {
        // edges[A] = [B, C] means A depends on B and C, so A's in-degree is 2.
        let mut in_degree: HashMap<&str, usize> = HashMap::new();
        for (task_id, dependencies) in &self.edges {
            in_degree.insert(task_id.as_str(), dependencies.len());
        }

        let mut batches: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = self
            .insertion_order
            .iter()
            .filter(|id| in_degree.get(id.as_str()) == Some(&0))
            .cloned()
            .collect();

        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();

            let mut next = Vec::new();
            for task_id in &current {
                for dependent in self.dependents(task_id) {
                    let Some(degree) = in_degree.get_mut(dependent.as_str()) else {
                        continue;
                    };
                    *degree -= 1;
                    if *degree == 0 {
                        next.push(dependent.clone());
                    }
                }
            }

            self.sort_by_definition(&mut next);
            batches.push(std::mem::replace(&mut current, next));
        }

        if processed != self.nodes.len() {
            let path = self.detect_cycle().unwrap_or_else(|| {
                self.insertion_order
                    .iter()
                    .filter(|id| in_degree.get(id.as_str()).copied().unwrap_or(0) > 0)
                    .cloned()
                    .collect()
            });
            return Err(GraphError::Cycle { path });
        }

        Ok(batches)
    }

    /// Tasks whose every dependency is in `completed` and which have not been
    /// decided yet, in definition order.
    ///
    /// `completed` holds Completed and Skipped ids; `decided` additionally
    /// holds Paused and Failed ones. A paused or failed task therefore never
    /// satisfies a dependency, which keeps its whole subtree out of this list.
    pub fn ready_tasks(&self, completed: &HashSet<String>, decided: &HashSet<String>) -> Vec<String> {
        self.insertion_order
            .iter()
            .filter(|id| !decided.contains(*id) && !completed.contains(*id))
            .filter(|id| self.edges[*id].iter().all(|dep| completed.contains(dep)))
            .cloned()
            .collect()
    }

    pub fn statistics(&self) -> Result<GraphStatistics, GraphError> {
        let batches = self.topological_sort()?;

        let mut depth: HashMap<&str, usize> = HashMap::new();
        for batch in &batches {
            for id in batch {
                let d = self.edges[id]
                    .iter()
                    .filter_map(|dep| depth.get(dep.as_str()))
                    .max()
                    .copied()
                    .unwrap_or(0)
                    + 1;
                depth.insert(id.as_str(), d);
            }
        }

        let total_deps: usize = self.edges.values().map(Vec::len).sum();
        let mean_dependencies = if self.nodes.is_empty() {
            0.0
        } else {
            total_deps as f64 / self.nodes.len() as f64
        };

        Ok(GraphStatistics {
            total_tasks: self.nodes.len(),
            batch_count: batches.len(),
            max_parallelism: batches.iter().map(Vec::len).max().unwrap_or(0),
            critical_path_length: depth.values().max().copied().unwrap_or(0),
            mean_dependencies,
        })
    }

    fn sort_by_definition(&self, ids: &mut [String]) {
        ids.sort_by_key(|id| self.position.get(id).copied().unwrap_or(usize::MAX));
    }

    /// Detect circular dependencies using DFS.
    ///
    /// Returns the offending cycle as a closed path, e.g. `[a, b, c, a]`.
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(stack);
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                // Dependency already on the active path: cycle.
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::types::{SkipStrategy, TaskDefinition};
    use pretty_assertions::assert_eq;

    fn diamond() -> Vec<TaskDefinition> {
        vec![
            TaskDefinition::new("A"),
            TaskDefinition::new("B").depends_on(["A"]),
            TaskDefinition::new("C").depends_on(["A"]),
            TaskDefinition::new("D").depends_on(["B", "C"]),
        ]
    }

    fn set(ids: &[&str]) -> HashSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diamond_batches_and_statistics() {
        let graph = TaskGraph::build(&diamond()).unwrap();

        let batches = graph.topological_sort().unwrap();
        assert_eq!(
            batches,
            vec![
                vec!["A".to_string()],
                vec!["B".to_string(), "C".to_string()],
                vec!["D".to_string()],
            ]
        );

        let stats = graph.statistics().unwrap();
        assert_eq!(stats.total_tasks, 4);
        assert_eq!(stats.batch_count, 3);
        assert_eq!(stats.max_parallelism, 2);
        assert_eq!(stats.critical_path_length, 3);
        assert!((stats.mean_dependencies - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_batches_preserve_definition_order() {
        let tasks = vec![
            TaskDefinition::new("root"),
            TaskDefinition::new("zeta").depends_on(["root"]),
            TaskDefinition::new("alpha").depends_on(["root"]),
            TaskDefinition::new("mid"),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        let batches = graph.topological_sort().unwrap();
        assert_eq!(batches[0], vec!["root".to_string(), "mid".to_string()]);
        assert_eq!(batches[1], vec!["zeta".to_string(), "alpha".to_string()]);
    }

    #[test]
    fn test_cycle_is_named() {
        let tasks = vec![
            TaskDefinition::new("A").depends_on(["C"]),
            TaskDefinition::new("B").depends_on(["A"]),
            TaskDefinition::new("C").depends_on(["B"]),
        ];

        let err = TaskGraph::build(&tasks).unwrap_err();
        let GraphError::Cycle { path } = err else {
            panic!("expected cycle error, got {err:?}");
        };
        assert_eq!(path.first(), path.last());
        assert!(path.iter().any(|id| ["A", "B", "C"].contains(&id.as_str())));

        let problems = TaskGraph::validate_dependencies(&tasks);
        assert_eq!(problems.len(), 1);
        assert!(problems[0].contains("Circular dependency"));
        assert!(problems[0].contains('A'));
    }

    #[test]
    fn test_validate_dependencies_reports_everything() {
        let tasks = vec![
            TaskDefinition::new("A").depends_on(["ghost"]),
            TaskDefinition::new("A"),
            TaskDefinition::new("B").affects(["nowhere"]),
            TaskDefinition::new("C").depends_on(["C"]),
        ];

        let problems = TaskGraph::validate_dependencies(&tasks);
        assert_eq!(problems.len(), 4, "{problems:#?}");
        assert!(problems.iter().any(|p| p.contains("Duplicate task ID: A")));
        assert!(problems.iter().any(|p| p.contains("'ghost'")));
        assert!(problems.iter().any(|p| p.contains("'nowhere'")));
        assert!(problems.iter().any(|p| p.contains("C -> C")));
    }

    #[test]
    fn test_valid_table_has_no_problems() {
        let mut tasks = diamond();
        tasks[1] = tasks[1].clone().affects(["D"]);
        assert!(TaskGraph::validate_dependencies(&tasks).is_empty());
    }

    #[test]
    fn test_affected_outputs_must_be_downstream() {
        let tasks = vec![
            TaskDefinition::new("A"),
            TaskDefinition::new("B")
                .depends_on(["A"])
                .human(true, SkipStrategy::Placeholder)
                .affects(["A"]),
        ];
        let graph = TaskGraph::build(&tasks).unwrap();
        let err = graph.validate_affected_outputs().unwrap_err();
        assert_eq!(
            err,
            GraphError::AffectedOutputNotDependent {
                task_id: "B".to_string(),
                affected: "A".to_string(),
            }
        );
    }

    #[test]
    fn test_transitive_dependents() {
        let graph = TaskGraph::build(&diamond()).unwrap();
        assert_eq!(graph.transitive_dependents("A"), set(&["B", "C", "D"]));
        assert_eq!(graph.transitive_dependents("C"), set(&["D"]));
        assert!(graph.transitive_dependents("D").is_empty());
    }

    #[test]
    fn test_ready_tasks_follow_completion() {
        let graph = TaskGraph::build(&diamond()).unwrap();

        assert_eq!(graph.ready_tasks(&set(&[]), &set(&[])), vec!["A".to_string()]);
        assert_eq!(
            graph.ready_tasks(&set(&["A"]), &set(&["A"])),
            vec!["B".to_string(), "C".to_string()]
        );
        assert_eq!(
            graph.ready_tasks(&set(&["A", "B"]), &set(&["A", "B"])),
            vec!["C".to_string()]
        );
    }

    #[test]
    fn test_paused_task_blocks_subtree() {
        let graph = TaskGraph::build(&diamond()).unwrap();
        // B paused: decided but not completed.
        let completed = set(&["A", "C"]);
        let decided = set(&["A", "B", "C"]);
        assert!(graph.ready_tasks(&completed, &decided).is_empty());
    }

    #[test]
    fn test_empty_graph() {
        let graph = TaskGraph::<TaskDefinition>::build(&[]).unwrap();
        assert!(graph.topological_sort().unwrap().is_empty());
        let stats = graph.statistics().unwrap();
        assert_eq!(stats.critical_path_length, 0);
        assert_eq!(stats.max_parallelism, 0);
    }
}
