use crate::resource::AllocationId;
use crate::task::TaskId;
use chrono::NaiveDate;
use thiserror::Error;

/// Failures of allocation planning and reconciliation.
///
/// Every variant raised by a merge is produced before the task is touched, so
/// an error always leaves the task exactly as it was.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AllocationError {
    #[error("window end {end} is before start {start}")]
    InvalidWindow { start: NaiveDate, end: NaiveDate },
    #[error("cannot derive a window from allocations without assigned effort")]
    EmptyAggregate,
    #[error("allocation {0} no longer belongs to task {1}")]
    StaleAllocation(AllocationId, TaskId),
    #[error("task {task} changed since the merge was staged (revision {staged} -> {current})")]
    StaleMerge {
        task: TaskId,
        staged: u64,
        current: u64,
    },
    #[error("allocation {original} cannot merge data from an allocation not copied from it")]
    InconsistentState { original: AllocationId },
    #[error("allocation {allocation} belongs to {owner:?}, not task {task}")]
    OwnershipMismatch {
        allocation: AllocationId,
        owner: Option<TaskId>,
        task: TaskId,
    },
    #[error("allocation {0} is already part of task {1}")]
    DuplicateAllocation(AllocationId, TaskId),
    #[error("{0} hours exceed the effort that can be planned")]
    HoursOutOfRange(u32),
    #[error("moving {from} by {days} days leaves the calendar")]
    DateOutOfRange { from: NaiveDate, days: i64 },
    #[error("allocation {allocation} has no resource {resource_id}")]
    UnknownResource {
        allocation: AllocationId,
        resource_id: String,
    },
    #[error("task {task} keys allocation {allocation} under {key}")]
    MisfiledAllocation {
        task: TaskId,
        key: AllocationId,
        allocation: AllocationId,
    },
    #[error("no capacity available to allocate from {from}")]
    NoCapacity { from: NaiveDate },
    #[error("shares sum to {actual} hours but the task budget is {expected}")]
    ShareMismatch { expected: u32, actual: u64 },
    #[error("unknown task {0}")]
    UnknownTask(TaskId),
    #[error("dependency cycle through task {0}")]
    CyclicDependency(TaskId),
    #[error("resources per day must be within (0, 1], got {0}")]
    InvalidResourcesPerDay(f64),
}

pub type AllocationResult<T> = Result<T, AllocationError>;
