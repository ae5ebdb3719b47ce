//! Committing allocation changes to a task.
//!
//! A merge runs in two phases. [`Task::stage_merge`] resolves the window and
//! checks every input against the task without touching it; the resulting
//! [`ValidatedMerge`] is then applied by [`Task::commit`], which re-checks
//! that the task has not changed in between before mutating anything. An
//! error in either phase leaves the task exactly as it was.

use crate::aggregate::AllocationAggregate;
use crate::capacity::CapacityProvider;
use crate::config::PlannerConfig;
use crate::effort::EffortDuration;
use crate::error::{AllocationError, AllocationResult};
use crate::planner::AllocationPlanner;
use crate::resource::{AllocationId, ResourceAllocation};
use crate::task::{CalculatedValue, Task, TaskId};
use chrono::NaiveDate;
use std::collections::HashSet;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergePhase {
    Staged,
    Validated,
    Committed,
    Aborted,
}

/// Where the task window of a merge comes from.
pub enum WindowSource<'a> {
    /// First and last day carrying effort in the given allocations.
    Aggregate(AllocationAggregate<'a>),
    Explicit { start: NaiveDate, end: NaiveDate },
}

impl WindowSource<'_> {
    fn resolve(self) -> AllocationResult<(NaiveDate, NaiveDate)> {
        let (start, end) = match self {
            WindowSource::Aggregate(aggregate) => match (aggregate.start(), aggregate.end()) {
                (Some(start), Some(end)) => (start, end),
                _ => return Err(AllocationError::EmptyAggregate),
            },
            WindowSource::Explicit { start, end } => (start, end),
        };
        if end < start {
            return Err(AllocationError::InvalidWindow { start, end });
        }
        Ok((start, end))
    }
}

/// A staged change to an existing allocation: the id of the live original
/// and the working copy carrying the new effort.
#[derive(Debug, Clone, PartialEq)]
pub struct ModifiedAllocation {
    original: AllocationId,
    modification: ResourceAllocation,
}

impl ModifiedAllocation {
    pub fn new(original: AllocationId, modification: ResourceAllocation) -> Self {
        Self {
            original,
            modification,
        }
    }

    /// Pairs every allocation with a fresh working copy of itself.
    pub fn copy_all<'a, I>(allocations: I) -> Vec<Self>
    where
        I: IntoIterator<Item = &'a ResourceAllocation>,
    {
        allocations
            .into_iter()
            .map(|allocation| Self::new(allocation.id(), allocation.copy()))
            .collect()
    }

    pub fn original(&self) -> AllocationId {
        self.original
    }

    pub fn modification(&self) -> &ResourceAllocation {
        &self.modification
    }

    pub fn modification_mut(&mut self) -> &mut ResourceAllocation {
        &mut self.modification
    }
}

/// A merge whose inputs were checked against one revision of one task.
#[derive(Debug)]
pub struct ValidatedMerge {
    task: TaskId,
    revision: u64,
    calculated_value: CalculatedValue,
    start: NaiveDate,
    end: NaiveDate,
    new_allocations: Vec<ResourceAllocation>,
    modifications: Vec<ModifiedAllocation>,
    to_remove: Vec<AllocationId>,
}

impl ValidatedMerge {
    pub fn phase(&self) -> MergePhase {
        MergePhase::Validated
    }

    pub fn window(&self) -> (NaiveDate, NaiveDate) {
        (self.start, self.end)
    }
}

/// What a committed merge did.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeReport {
    pub phase: MergePhase,
    pub modified: Vec<AllocationId>,
    pub added: Vec<AllocationId>,
    /// Removed allocations, already detached.
    pub removed: Vec<ResourceAllocation>,
}

impl Task {
    /// Resolves the window and validates every input. Nothing is mutated.
    pub fn stage_merge(
        &self,
        calculated_value: CalculatedValue,
        window: WindowSource<'_>,
        new_allocations: Vec<ResourceAllocation>,
        modifications: Vec<ModifiedAllocation>,
        to_remove: &[AllocationId],
    ) -> AllocationResult<ValidatedMerge> {
        let (start, end) = window.resolve()?;
        debug!(task = self.id, phase = ?MergePhase::Staged, %start, %end, "merge staged");

        for pair in &modifications {
            let original = self
                .allocation(pair.original)
                .ok_or(AllocationError::StaleAllocation(pair.original, self.id))?;
            if !pair.modification.is_copy_of(original) {
                return Err(AllocationError::InconsistentState {
                    original: pair.original,
                });
            }
        }

        let mut incoming = HashSet::with_capacity(new_allocations.len());
        for allocation in &new_allocations {
            self.check_new_allocation(allocation, to_remove)?;
            if !incoming.insert(allocation.id()) {
                return Err(AllocationError::DuplicateAllocation(allocation.id(), self.id));
            }
        }

        debug!(
            task = self.id,
            phase = ?MergePhase::Validated,
            modified = modifications.len(),
            added = new_allocations.len(),
            removed = to_remove.len(),
            "merge validated"
        );
        Ok(ValidatedMerge {
            task: self.id,
            revision: self.revision,
            calculated_value,
            start,
            end,
            new_allocations,
            modifications,
            to_remove: to_remove.to_vec(),
        })
    }

    /// Applies a validated merge: calculated value and window first, then the
    /// modifications, the removals and finally the additions. Originals are
    /// updated in place so their ids stay valid.
    pub fn commit(&mut self, merge: ValidatedMerge) -> AllocationResult<MergeReport> {
        if merge.task != self.id || merge.revision != self.revision {
            return Err(AllocationError::StaleMerge {
                task: self.id,
                staged: merge.revision,
                current: self.revision,
            });
        }

        self.calculated_value = Some(merge.calculated_value);
        self.start_date = merge.start;
        self.end_date = merge.end;

        let mut modified = Vec::with_capacity(merge.modifications.len());
        for pair in &merge.modifications {
            if let Some(original) = self.resource_allocations.get_mut(&pair.original) {
                original.overwrite_from(&pair.modification);
                modified.push(pair.original);
            }
        }

        let mut removed = Vec::with_capacity(merge.to_remove.len());
        for id in &merge.to_remove {
            if let Some(mut allocation) = self.resource_allocations.shift_remove(id) {
                allocation.detach();
                removed.push(allocation);
            }
        }

        let mut added = Vec::with_capacity(merge.new_allocations.len());
        for allocation in merge.new_allocations {
            added.push(allocation.id());
            self.attach(allocation);
        }

        self.revision += 1;
        debug!(task = self.id, phase = ?MergePhase::Committed, revision = self.revision, "merge committed");
        Ok(MergeReport {
            phase: MergePhase::Committed,
            modified,
            added,
            removed,
        })
    }

    /// Stages and commits in one step.
    pub fn merge_allocation(
        &mut self,
        calculated_value: CalculatedValue,
        window: WindowSource<'_>,
        new_allocations: Vec<ResourceAllocation>,
        modifications: Vec<ModifiedAllocation>,
        to_remove: &[AllocationId],
    ) -> AllocationResult<MergeReport> {
        let result = self
            .stage_merge(calculated_value, window, new_allocations, modifications, to_remove)
            .and_then(|staged| self.commit(staged));
        if let Err(err) = &result {
            warn!(task = self.id, phase = ?MergePhase::Aborted, error = %err, "merge aborted");
        }
        result
    }

    /// Recomputes the effort of every allocation from the current start date
    /// according to the task's calculated value, then merges the result.
    ///
    /// With [`CalculatedValue::EndDate`] the currently assigned hours are
    /// redistributed and the end date follows; with
    /// [`CalculatedValue::NumberOfHours`] the window is refilled. A task
    /// without allocations is left alone.
    pub fn replan<P>(&mut self, provider: &P, config: &PlannerConfig) -> AllocationResult<Option<MergeReport>>
    where
        P: CapacityProvider + ?Sized,
    {
        let target = self.assigned_hours();
        self.replan_towards(target, provider, config)
    }

    /// Like [`replan`](Self::replan), but targets the task's work hours
    /// instead of what is currently assigned. Used when allocations are first
    /// set up and carry no effort yet.
    pub fn allocate_work_hours<P>(
        &mut self,
        provider: &P,
        config: &PlannerConfig,
    ) -> AllocationResult<Option<MergeReport>>
    where
        P: CapacityProvider + ?Sized,
    {
        let hours = self.work_hours();
        let target =
            EffortDuration::checked_hours(hours).ok_or(AllocationError::HoursOutOfRange(hours))?;
        self.replan_towards(target, provider, config)
    }

    fn replan_towards<P>(
        &mut self,
        target: EffortDuration,
        provider: &P,
        config: &PlannerConfig,
    ) -> AllocationResult<Option<MergeReport>>
    where
        P: CapacityProvider + ?Sized,
    {
        if self.resource_allocations.is_empty() {
            return Ok(None);
        }

        let mut copies: Vec<ResourceAllocation> =
            self.resource_allocations().map(ResourceAllocation::copy).collect();
        let planner = AllocationPlanner::new(provider, config);
        let calculated_value = self.calculated_value();
        let start = self.start_date;
        let end = match calculated_value {
            CalculatedValue::NumberOfHours => {
                planner.allocate_on_task_length(start, self.end_date, &mut copies)?;
                self.end_date
            }
            CalculatedValue::EndDate => planner.allocate_until(start, target, &mut copies)?,
        };

        let modifications = copies
            .into_iter()
            .map(|copy| ModifiedAllocation::new(copy.id(), copy))
            .collect();
        self.merge_allocation(
            calculated_value,
            WindowSource::Explicit { start, end },
            Vec::new(),
            modifications,
            &[],
        )
        .map(Some)
    }
}
