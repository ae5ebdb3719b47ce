use crate::error::{AllocationError, AllocationResult};
use crate::task::{Task, TaskId};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// Grouping node that replaces a task once it is split into shares.
///
/// The group takes over the task's place in the plan: its parent, its share
/// and its dependency edges. Children carry no dependencies of their own.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroup {
    pub id: TaskId,
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_of_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub predecessors: Vec<TaskId>,
    #[serde(default)]
    pub successors: Vec<TaskId>,
    /// Child ids in share order.
    pub children: Vec<TaskId>,
}

/// Result of splitting a task: the group and its freshly built children.
#[derive(Debug, Clone, PartialEq)]
pub struct Split {
    pub group: TaskGroup,
    pub children: Vec<Task>,
}

impl Split {
    pub fn total_share(&self) -> u64 {
        sum_of_shares(self.children.iter().filter_map(|child| child.share_of_hours))
    }
}

impl Task {
    /// Splits this task into one child per share, under a new group.
    ///
    /// `shares` must add up to the task's work hours; otherwise nothing is
    /// built. `next_id` hands out ids, first for the group and then for each
    /// child in share order. Children copy the name, window, calculated
    /// value, hour budget and work item, but start without allocations.
    pub fn split<F>(&self, shares: &[u32], mut next_id: F) -> AllocationResult<Split>
    where
        F: FnMut() -> TaskId,
    {
        let actual = sum_of_shares(shares.iter().copied());
        let expected = self.work_hours();
        if actual != u64::from(expected) {
            return Err(AllocationError::ShareMismatch { expected, actual });
        }

        let group_id = next_id();
        let children: Vec<Task> = shares
            .iter()
            .map(|share| Task {
                id: next_id(),
                name: self.name.clone(),
                hours_specified: self.hours_specified,
                work_item: self.work_item.clone(),
                calculated_value: self.calculated_value,
                start_date: self.start_date,
                end_date: self.end_date,
                resource_allocations: IndexMap::new(),
                share_of_hours: Some(*share),
                parent_id: Some(group_id),
                predecessors: Vec::new(),
                successors: Vec::new(),
                revision: 0,
            })
            .collect();

        let group = TaskGroup {
            id: group_id,
            name: self.name.clone(),
            start_date: self.start_date,
            end_date: self.end_date,
            share_of_hours: self.share_of_hours,
            parent_id: self.parent_id,
            predecessors: self.predecessors.clone(),
            successors: self.successors.clone(),
            children: children.iter().map(|child| child.id).collect(),
        };
        Ok(Split { group, children })
    }
}

/// Exact sum; a share list can add up past `u32::MAX`.
fn sum_of_shares<I: Iterator<Item = u32>>(shares: I) -> u64 {
    shares.map(u64::from).sum()
}
