use crate::capacity::{CapacityProvider, ResourceLedger};
use crate::config::PlannerConfig;
use crate::error::{AllocationError, AllocationResult};
use crate::graph::DependencyDag;
use crate::split::TaskGroup;
use crate::task::{Task, TaskId};
use chrono::NaiveDate;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::debug;

/// Tasks, the groups produced by splitting them, and the finish-to-start
/// dependencies between them.
///
/// Operations that touch several tasks are all-or-nothing: if any task fails
/// to replan, every task is restored.
#[derive(Debug, Clone)]
pub struct Plan {
    tasks: BTreeMap<TaskId, Task>,
    groups: BTreeMap<TaskId, TaskGroup>,
    next_id: TaskId,
}

impl Default for Plan {
    fn default() -> Self {
        Self::new()
    }
}

impl Plan {
    pub fn new() -> Self {
        Self {
            tasks: BTreeMap::new(),
            groups: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Inserts or replaces a task by id.
    pub fn insert_task(&mut self, task: Task) {
        self.next_id = self.next_id.max(task.id + 1);
        self.tasks.insert(task.id, task);
    }

    pub fn task(&self, id: TaskId) -> Option<&Task> {
        self.tasks.get(&id)
    }

    pub fn task_mut(&mut self, id: TaskId) -> Option<&mut Task> {
        self.tasks.get_mut(&id)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.tasks.values()
    }

    pub fn group(&self, id: TaskId) -> Option<&TaskGroup> {
        self.groups.get(&id)
    }

    pub fn contains(&self, id: TaskId) -> bool {
        self.tasks.contains_key(&id) || self.groups.contains_key(&id)
    }

    /// Load recorded by every task's associated allocations.
    pub fn resource_ledger(&self) -> ResourceLedger {
        ResourceLedger::from_tasks(self.tasks.values())
    }

    /// `(resource, day)` pairs whose load across all tasks exceeds capacity.
    pub fn overloaded_resources<P>(&self, provider: &P) -> Vec<(String, NaiveDate)>
    where
        P: CapacityProvider + ?Sized,
    {
        self.resource_ledger().overloaded(provider)
    }

    /// Makes `to` start after `from` finishes. Rejected if it would close a cycle.
    pub fn add_dependency(&mut self, from: TaskId, to: TaskId) -> AllocationResult<()> {
        for id in [from, to] {
            if !self.contains(id) {
                return Err(AllocationError::UnknownTask(id));
            }
        }
        if from == to {
            return Err(AllocationError::CyclicDependency(from));
        }
        let snapshot = (self.tasks.clone(), self.groups.clone());
        self.edges_mut(from, |_, successors| push_unique(successors, to));
        self.edges_mut(to, |predecessors, _| push_unique(predecessors, from));
        if let Err(err) = self.dependency_graph().and_then(|dag| dag.topological_order()) {
            (self.tasks, self.groups) = snapshot;
            return Err(err);
        }
        Ok(())
    }

    /// Dependencies expanded to leaf tasks: an edge touching a group stands
    /// for edges to or from every task inside it.
    pub fn dependency_graph(&self) -> AllocationResult<DependencyDag> {
        let mut dag = DependencyDag::new(self.tasks.keys().copied());
        let nodes = self
            .tasks
            .values()
            .map(|task| (task.id, &task.successors))
            .chain(self.groups.values().map(|group| (group.id, &group.successors)));
        for (id, successors) in nodes {
            let sources = self.leaves(id);
            for successor in successors {
                for target in self.leaves(*successor) {
                    for source in &sources {
                        dag.add_edge(*source, target);
                    }
                }
            }
        }
        Ok(dag)
    }

    /// Splits a task into shares; the new group takes its place in the plan
    /// and in its neighbours' dependency lists. Returns the group id.
    pub fn split_task(&mut self, id: TaskId, shares: &[u32]) -> AllocationResult<TaskId> {
        let task = self.tasks.get(&id).ok_or(AllocationError::UnknownTask(id))?;
        let next_id = &mut self.next_id;
        let split = task.split(shares, || {
            let id = *next_id;
            *next_id += 1;
            id
        })?;

        let group_id = split.group.id;
        self.tasks.remove(&id);
        for predecessor in split.group.predecessors.clone() {
            self.edges_mut(predecessor, |_, successors| replace_id(successors, id, group_id));
        }
        for successor in split.group.successors.clone() {
            self.edges_mut(successor, |predecessors, _| replace_id(predecessors, id, group_id));
        }
        if let Some(parent) = split.group.parent_id.and_then(|p| self.groups.get_mut(&p)) {
            replace_id(&mut parent.children, id, group_id);
        }
        for child in split.children {
            self.tasks.insert(child.id, child);
        }
        debug!(task = id, group = group_id, shares = shares.len(), "task split");
        self.groups.insert(group_id, split.group);
        Ok(group_id)
    }

    /// Moves a task to `start`, replans it and pushes every dependent task
    /// that would now start before its predecessors finish.
    pub fn move_task<P>(
        &mut self,
        id: TaskId,
        start: NaiveDate,
        provider: &P,
        config: &PlannerConfig,
    ) -> AllocationResult<()>
    where
        P: CapacityProvider + ?Sized,
    {
        let snapshot = self.tasks.clone();
        let result = self.move_and_propagate(id, start, provider, config);
        if result.is_err() {
            self.tasks = snapshot;
        }
        self.refresh_group_windows();
        result
    }

    /// Replans every task, each on its own, then pushes dependents forward.
    /// Tasks are independent during the first step so it runs in parallel.
    pub fn replan_all<P>(&mut self, provider: &P, config: &PlannerConfig) -> AllocationResult<()>
    where
        P: CapacityProvider + Sync + ?Sized,
    {
        let snapshot = self.tasks.clone();
        let result = self
            .tasks
            .par_iter_mut()
            .map(|(_, task)| task.replan(provider, config).map(|_| ()))
            .collect::<AllocationResult<Vec<()>>>()
            .and_then(|_| self.propagate(provider, config));
        if result.is_err() {
            self.tasks = snapshot;
        }
        self.refresh_group_windows();
        result
    }

    fn move_and_propagate<P>(
        &mut self,
        id: TaskId,
        start: NaiveDate,
        provider: &P,
        config: &PlannerConfig,
    ) -> AllocationResult<()>
    where
        P: CapacityProvider + ?Sized,
    {
        let task = self.tasks.get_mut(&id).ok_or(AllocationError::UnknownTask(id))?;
        task.move_to(start)?;
        task.replan(provider, config)?;
        self.propagate(provider, config)
    }

    fn propagate<P>(&mut self, provider: &P, config: &PlannerConfig) -> AllocationResult<()>
    where
        P: CapacityProvider + ?Sized,
    {
        let dag = self.dependency_graph()?;
        for id in dag.topological_order()? {
            let latest_end = dag
                .predecessors(id)
                .iter()
                .filter_map(|pred| self.tasks.get(pred))
                .map(Task::end_date)
                .max();
            let Some(latest_end) = latest_end else {
                continue;
            };
            let Some(task) = self.tasks.get_mut(&id) else {
                continue;
            };
            if task.start_date() > latest_end {
                continue;
            }
            let earliest = latest_end
                .succ_opt()
                .ok_or(AllocationError::InvalidWindow {
                    start: latest_end,
                    end: latest_end,
                })?;
            debug!(task = id, from = %task.start_date(), to = %earliest, "pushing dependent task");
            task.move_to(earliest)?;
            task.replan(provider, config)?;
        }
        Ok(())
    }

    fn refresh_group_windows(&mut self) {
        let windows: Vec<(TaskId, NaiveDate, NaiveDate)> = self
            .groups
            .keys()
            .filter_map(|&id| {
                let leaves = self.leaves(id);
                let start = leaves.iter().filter_map(|l| self.tasks.get(l)).map(Task::start_date).min()?;
                let end = leaves.iter().filter_map(|l| self.tasks.get(l)).map(Task::end_date).max()?;
                Some((id, start, end))
            })
            .collect();
        for (id, start, end) in windows {
            if let Some(group) = self.groups.get_mut(&id) {
                group.start_date = start;
                group.end_date = end;
            }
        }
    }

    fn leaves(&self, id: TaskId) -> Vec<TaskId> {
        if self.tasks.contains_key(&id) {
            return vec![id];
        }
        self.groups
            .get(&id)
            .map(|group| group.children.iter().flat_map(|child| self.leaves(*child)).collect())
            .unwrap_or_default()
    }

    fn edges_mut<F>(&mut self, id: TaskId, update: F)
    where
        F: FnOnce(&mut Vec<TaskId>, &mut Vec<TaskId>),
    {
        if let Some(task) = self.tasks.get_mut(&id) {
            update(&mut task.predecessors, &mut task.successors);
        } else if let Some(group) = self.groups.get_mut(&id) {
            update(&mut group.predecessors, &mut group.successors);
        }
    }
}

fn push_unique(ids: &mut Vec<TaskId>, id: TaskId) {
    if !ids.contains(&id) {
        ids.push(id);
    }
}

fn replace_id(ids: &mut [TaskId], old: TaskId, new: TaskId) {
    for id in ids.iter_mut().filter(|id| **id == old) {
        *id = new;
    }
}
