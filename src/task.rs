use crate::aggregate::AllocationAggregate;
use crate::calendar::{add_days, days_between};
use crate::effort::EffortDuration;
use crate::error::{AllocationError, AllocationResult};
use crate::resource::{AllocationId, ResourceAllocation};
use chrono::NaiveDate;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub type TaskId = i32;

/// Which of duration and hours is authoritative for a task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CalculatedValue {
    /// The window is fixed; assigned hours follow from it.
    NumberOfHours,
    /// The hours are fixed; the end date follows from them.
    #[default]
    EndDate,
}

/// A schedulable leaf unit of work and the allocations of effort to it.
///
/// Allocations are kept in the order they were added, which is also the
/// order the planner visits them in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "TaskRecord")]
pub struct Task {
    pub id: TaskId,
    pub name: String,
    pub(crate) hours_specified: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) work_item: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) calculated_value: Option<CalculatedValue>,
    pub(crate) start_date: NaiveDate,
    pub(crate) end_date: NaiveDate,
    #[serde(default)]
    pub(crate) resource_allocations: IndexMap<AllocationId, ResourceAllocation>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub share_of_hours: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<TaskId>,
    #[serde(default)]
    pub predecessors: Vec<TaskId>,
    #[serde(default)]
    pub successors: Vec<TaskId>,
    #[serde(default)]
    pub(crate) revision: u64,
}

/// Serialized form of a [`Task`], checked before it becomes one.
#[derive(Deserialize)]
struct TaskRecord {
    id: TaskId,
    name: String,
    hours_specified: u32,
    #[serde(default)]
    work_item: Option<String>,
    #[serde(default)]
    calculated_value: Option<CalculatedValue>,
    start_date: NaiveDate,
    end_date: NaiveDate,
    #[serde(default)]
    resource_allocations: IndexMap<AllocationId, ResourceAllocation>,
    #[serde(default)]
    share_of_hours: Option<u32>,
    #[serde(default)]
    parent_id: Option<TaskId>,
    #[serde(default)]
    predecessors: Vec<TaskId>,
    #[serde(default)]
    successors: Vec<TaskId>,
    #[serde(default)]
    revision: u64,
}

impl TryFrom<TaskRecord> for Task {
    type Error = AllocationError;

    fn try_from(record: TaskRecord) -> Result<Self, Self::Error> {
        if record.end_date < record.start_date {
            return Err(AllocationError::InvalidWindow {
                start: record.start_date,
                end: record.end_date,
            });
        }
        for (key, allocation) in &record.resource_allocations {
            if *key != allocation.id() {
                return Err(AllocationError::MisfiledAllocation {
                    task: record.id,
                    key: *key,
                    allocation: allocation.id(),
                });
            }
            if allocation.task_id() != Some(record.id) {
                return Err(AllocationError::OwnershipMismatch {
                    allocation: allocation.id(),
                    owner: allocation.task_id(),
                    task: record.id,
                });
            }
        }
        Ok(Self {
            id: record.id,
            name: record.name,
            hours_specified: record.hours_specified,
            work_item: record.work_item,
            calculated_value: record.calculated_value,
            start_date: record.start_date,
            end_date: record.end_date,
            resource_allocations: record.resource_allocations,
            share_of_hours: record.share_of_hours,
            parent_id: record.parent_id,
            predecessors: record.predecessors,
            successors: record.successors,
            revision: record.revision,
        })
    }
}

impl Task {
    pub fn new(id: TaskId, name: impl Into<String>, hours_specified: u32, start: NaiveDate) -> Self {
        Self {
            id,
            name: name.into(),
            hours_specified,
            work_item: None,
            calculated_value: None,
            start_date: start,
            end_date: start,
            resource_allocations: IndexMap::new(),
            share_of_hours: None,
            parent_id: None,
            predecessors: Vec::new(),
            successors: Vec::new(),
            revision: 0,
        }
    }

    pub fn with_work_item(mut self, work_item: impl Into<String>) -> Self {
        self.work_item = Some(work_item.into());
        self
    }

    /// Nominal effort budget of the originating work item.
    pub fn hours_specified(&self) -> u32 {
        self.hours_specified
    }

    /// Hours the task is expected to carry: its share when it came out of a
    /// split, the full budget otherwise.
    pub fn work_hours(&self) -> u32 {
        self.share_of_hours.unwrap_or(self.hours_specified)
    }

    pub fn work_item(&self) -> Option<&str> {
        self.work_item.as_deref()
    }

    /// Tasks that never had a calculated value set behave as [`CalculatedValue::EndDate`].
    pub fn calculated_value(&self) -> CalculatedValue {
        self.calculated_value.unwrap_or_default()
    }

    pub fn set_calculated_value(&mut self, calculated_value: CalculatedValue) {
        self.calculated_value = Some(calculated_value);
        self.revision += 1;
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn days_duration(&self) -> i64 {
        days_between(self.start_date, self.end_date)
    }

    pub fn set_days_duration(&mut self, days: u32) -> AllocationResult<()> {
        self.end_date = shifted(self.start_date, i64::from(days))?;
        self.revision += 1;
        Ok(())
    }

    /// Moves the window to begin on `start`, keeping its duration. Assigned
    /// effort is left where it was until the task is replanned.
    pub fn move_to(&mut self, start: NaiveDate) -> AllocationResult<()> {
        let end = shifted(start, self.days_duration())?;
        self.start_date = start;
        self.end_date = end;
        self.revision += 1;
        Ok(())
    }

    /// Counter bumped by every committed change; used to notice a staged
    /// merge going stale.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn resource_allocations(&self) -> impl Iterator<Item = &ResourceAllocation> {
        self.resource_allocations.values()
    }

    pub fn allocation(&self, id: AllocationId) -> Option<&ResourceAllocation> {
        self.resource_allocations.get(&id)
    }

    pub fn contains_allocation(&self, id: AllocationId) -> bool {
        self.resource_allocations.contains_key(&id)
    }

    pub fn allocation_ids(&self) -> Vec<AllocationId> {
        self.resource_allocations.keys().copied().collect()
    }

    pub fn allocation_count(&self) -> usize {
        self.resource_allocations.len()
    }

    pub fn generic_allocations(&self) -> impl Iterator<Item = &ResourceAllocation> {
        self.resource_allocations().filter(|a| a.is_generic())
    }

    pub fn specific_allocations(&self) -> impl Iterator<Item = &ResourceAllocation> {
        self.resource_allocations().filter(|a| a.is_specific())
    }

    pub fn aggregate(&self) -> AllocationAggregate<'_> {
        AllocationAggregate::new(self.resource_allocations.values())
    }

    pub fn assigned_hours(&self) -> EffortDuration {
        self.aggregate().total_hours()
    }

    /// Attaches an allocation created for this task and records its effort
    /// against its resources.
    pub fn add_resource_allocation(&mut self, allocation: ResourceAllocation) -> AllocationResult<()> {
        self.check_new_allocation(&allocation, &[])?;
        self.attach(allocation);
        self.revision += 1;
        Ok(())
    }

    /// Detaches and returns the allocation, or `None` if it is not part of this task.
    pub fn remove_resource_allocation(&mut self, id: AllocationId) -> Option<ResourceAllocation> {
        let mut removed = self.resource_allocations.shift_remove(&id)?;
        removed.detach();
        self.revision += 1;
        Some(removed)
    }

    /// `false` when two specific allocations point at the same worker. Tasks
    /// may be in this state while being edited, so it is not an error.
    pub fn validate_worker_uniqueness(&self) -> bool {
        let mut workers = HashSet::new();
        self.specific_allocations()
            .filter_map(|a| a.specific_resource())
            .all(|worker| workers.insert(worker))
    }

    pub(crate) fn check_new_allocation(
        &self,
        allocation: &ResourceAllocation,
        being_removed: &[AllocationId],
    ) -> AllocationResult<()> {
        if allocation.task_id() != Some(self.id) {
            return Err(AllocationError::OwnershipMismatch {
                allocation: allocation.id(),
                owner: allocation.task_id(),
                task: self.id,
            });
        }
        if self.contains_allocation(allocation.id()) && !being_removed.contains(&allocation.id()) {
            return Err(AllocationError::DuplicateAllocation(allocation.id(), self.id));
        }
        Ok(())
    }

    pub(crate) fn attach(&mut self, mut allocation: ResourceAllocation) {
        allocation.associate_assignments_to_resource();
        self.resource_allocations.insert(allocation.id(), allocation);
    }
}

fn shifted(from: NaiveDate, days: i64) -> AllocationResult<NaiveDate> {
    add_days(from, days).ok_or(AllocationError::DateOutOfRange { from, days })
}
