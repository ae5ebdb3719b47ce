use crate::error::{AllocationError, AllocationResult};
use crate::task::TaskId;
use petgraph::Direction;
use petgraph::algo::toposort;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::HashMap;

/// Finish-to-start dependencies between leaf tasks.
pub struct DependencyDag {
    pub graph: DiGraph<TaskId, ()>,
    pub id_to_index: HashMap<TaskId, NodeIndex>,
}

impl DependencyDag {
    pub fn new<I>(task_ids: I) -> Self
    where
        I: IntoIterator<Item = TaskId>,
    {
        let mut graph = DiGraph::new();
        let mut id_to_index = HashMap::new();
        for task_id in task_ids {
            let node_ix = graph.add_node(task_id);
            id_to_index.insert(task_id, node_ix);
        }
        Self { graph, id_to_index }
    }

    /// Adds `from -> to`; unknown ids and repeated edges are ignored.
    pub fn add_edge(&mut self, from: TaskId, to: TaskId) {
        if let (Some(&u), Some(&v)) = (self.id_to_index.get(&from), self.id_to_index.get(&to)) {
            self.graph.update_edge(u, v, ());
        }
    }

    pub fn predecessors(&self, task_id: TaskId) -> Vec<TaskId> {
        self.id_to_index
            .get(&task_id)
            .map(|&ix| {
                self.graph
                    .neighbors_directed(ix, Direction::Incoming)
                    .map(|pred| self.graph[pred])
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Task ids with every predecessor before its successors.
    pub fn topological_order(&self) -> AllocationResult<Vec<TaskId>> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|ix| self.graph[ix]).collect())
            .map_err(|cycle| AllocationError::CyclicDependency(self.graph[cycle.node_id()]))
    }
}
