use crate::effort::EffortDuration;
use crate::error::{AllocationError, AllocationResult};
use crate::task::TaskId;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Opaque, comparable identity of an allocation. Assigned by whoever creates
/// the allocation (usually the persistence layer) and never reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AllocationId(u64);

impl AllocationId {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Share of each resource's daily capacity an allocation may consume.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f64", into = "f64")]
pub struct ResourcesPerDay(f64);

impl ResourcesPerDay {
    pub const FULL: Self = Self(1.0);

    pub fn new(amount: f64) -> AllocationResult<Self> {
        if !amount.is_finite() || amount <= 0.0 || amount > 1.0 {
            return Err(AllocationError::InvalidResourcesPerDay(amount));
        }
        Ok(Self(amount))
    }

    pub fn amount(self) -> f64 {
        self.0
    }
}

impl Default for ResourcesPerDay {
    fn default() -> Self {
        Self::FULL
    }
}

impl TryFrom<f64> for ResourcesPerDay {
    type Error = AllocationError;

    fn try_from(value: f64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ResourcesPerDay> for f64 {
    fn from(value: ResourcesPerDay) -> Self {
        value.0
    }
}

/// What an allocation is bound to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllocationKind {
    /// A pool matching `criteria`, resolved to concrete `resources` when allocated.
    Generic {
        criteria: Vec<String>,
        resources: Vec<String>,
    },
    /// Exactly one worker or machine.
    Specific { resource_id: String },
}

/// Effort assigned to one resource on one day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DayAssignment<'a> {
    pub day: NaiveDate,
    pub resource_id: &'a str,
    pub effort: EffortDuration,
}

/// An allocation of a resource (or criterion pool) to a task.
///
/// Effort is kept per day and per concrete resource. Days and resources with
/// zero effort are never stored, so `start`/`end` are the first and last days
/// that actually carry work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "AllocationRecord")]
pub struct ResourceAllocation {
    id: AllocationId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    task_id: Option<TaskId>,
    #[serde(flatten)]
    kind: AllocationKind,
    #[serde(default)]
    resources_per_day: ResourcesPerDay,
    #[serde(default)]
    assignments: BTreeMap<NaiveDate, BTreeMap<String, EffortDuration>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    copied_from: Option<AllocationId>,
    #[serde(default)]
    associated: bool,
}

#[derive(Deserialize)]
struct AllocationRecord {
    id: AllocationId,
    #[serde(default)]
    task_id: Option<TaskId>,
    #[serde(flatten)]
    kind: AllocationKind,
    #[serde(default)]
    resources_per_day: ResourcesPerDay,
    #[serde(default)]
    assignments: BTreeMap<NaiveDate, BTreeMap<String, EffortDuration>>,
    #[serde(default)]
    copied_from: Option<AllocationId>,
    #[serde(default)]
    associated: bool,
}

impl TryFrom<AllocationRecord> for ResourceAllocation {
    type Error = AllocationError;

    fn try_from(record: AllocationRecord) -> Result<Self, Self::Error> {
        let mut allocation = Self::with_kind(record.id, 0, record.kind);
        allocation.task_id = record.task_id;
        allocation.resources_per_day = record.resources_per_day;
        allocation.copied_from = record.copied_from;
        allocation.associated = record.associated;
        for (day, per_resource) in record.assignments {
            for (resource_id, effort) in per_resource {
                allocation.set_assignment(day, resource_id, effort)?;
            }
        }
        Ok(allocation)
    }
}

impl ResourceAllocation {
    pub fn specific(id: AllocationId, task_id: TaskId, resource_id: impl Into<String>) -> Self {
        Self::with_kind(
            id,
            task_id,
            AllocationKind::Specific {
                resource_id: resource_id.into(),
            },
        )
    }

    pub fn generic<C, R>(id: AllocationId, task_id: TaskId, criteria: C, resources: R) -> Self
    where
        C: IntoIterator,
        C::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self::with_kind(
            id,
            task_id,
            AllocationKind::Generic {
                criteria: criteria.into_iter().map(Into::into).collect(),
                resources: resources.into_iter().map(Into::into).collect(),
            },
        )
    }

    fn with_kind(id: AllocationId, task_id: TaskId, kind: AllocationKind) -> Self {
        Self {
            id,
            task_id: Some(task_id),
            kind,
            resources_per_day: ResourcesPerDay::FULL,
            assignments: BTreeMap::new(),
            copied_from: None,
            associated: false,
        }
    }

    pub fn with_resources_per_day(mut self, resources_per_day: ResourcesPerDay) -> Self {
        self.resources_per_day = resources_per_day;
        self
    }

    pub fn id(&self) -> AllocationId {
        self.id
    }

    pub fn task_id(&self) -> Option<TaskId> {
        self.task_id
    }

    pub fn kind(&self) -> &AllocationKind {
        &self.kind
    }

    pub fn is_generic(&self) -> bool {
        matches!(self.kind, AllocationKind::Generic { .. })
    }

    pub fn is_specific(&self) -> bool {
        matches!(self.kind, AllocationKind::Specific { .. })
    }

    /// The worker or machine of a specific allocation.
    pub fn specific_resource(&self) -> Option<&str> {
        match &self.kind {
            AllocationKind::Specific { resource_id } => Some(resource_id),
            AllocationKind::Generic { .. } => None,
        }
    }

    /// Concrete resources effort can be assigned to, in a stable order.
    pub fn resource_ids(&self) -> &[String] {
        match &self.kind {
            AllocationKind::Specific { resource_id } => std::slice::from_ref(resource_id),
            AllocationKind::Generic { resources, .. } => resources,
        }
    }

    /// Whether effort can land on `resource_id` through this allocation.
    pub fn references_worker(&self, resource_id: &str) -> bool {
        self.resource_ids().iter().any(|id| id == resource_id)
    }

    pub fn resources_per_day(&self) -> ResourcesPerDay {
        self.resources_per_day
    }

    pub fn set_resources_per_day(&mut self, resources_per_day: ResourcesPerDay) {
        self.resources_per_day = resources_per_day;
    }

    pub fn assignments(&self) -> impl Iterator<Item = DayAssignment<'_>> {
        self.assignments.iter().flat_map(|(day, per_resource)| {
            per_resource
                .iter()
                .map(move |(resource_id, effort)| DayAssignment {
                    day: *day,
                    resource_id,
                    effort: *effort,
                })
        })
    }

    /// Per-day totals across all resources of this allocation.
    pub fn effort_per_day(&self) -> BTreeMap<NaiveDate, EffortDuration> {
        self.assignments
            .iter()
            .map(|(day, per_resource)| (*day, per_resource.values().sum()))
            .collect()
    }

    pub fn assigned_on(&self, day: NaiveDate) -> EffortDuration {
        self.assignments
            .get(&day)
            .map(|per_resource| per_resource.values().sum())
            .unwrap_or_default()
    }

    pub fn assigned_to(&self, resource_id: &str, day: NaiveDate) -> EffortDuration {
        self.assignments
            .get(&day)
            .and_then(|per_resource| per_resource.get(resource_id).copied())
            .unwrap_or_default()
    }

    pub fn assigned_hours(&self) -> EffortDuration {
        self.assignments
            .values()
            .flat_map(|per_resource| per_resource.values())
            .sum()
    }

    pub fn start(&self) -> Option<NaiveDate> {
        self.assignments.keys().next().copied()
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.assignments.keys().next_back().copied()
    }

    /// Sets the effort of `resource_id` on `day`, replacing any previous
    /// value. Zero effort removes the entry. Only resources this allocation
    /// references can carry effort.
    pub fn set_assignment(
        &mut self,
        day: NaiveDate,
        resource_id: impl Into<String>,
        effort: EffortDuration,
    ) -> AllocationResult<()> {
        let resource_id = resource_id.into();
        if !self.references_worker(&resource_id) {
            return Err(AllocationError::UnknownResource {
                allocation: self.id,
                resource_id,
            });
        }
        self.record(day, resource_id, effort);
        Ok(())
    }

    /// [`set_assignment`](Self::set_assignment) for a resource taken from
    /// [`resource_ids`](Self::resource_ids).
    pub(crate) fn record(&mut self, day: NaiveDate, resource_id: String, effort: EffortDuration) {
        if effort.is_zero() {
            if let Some(per_resource) = self.assignments.get_mut(&day) {
                per_resource.remove(&resource_id);
                if per_resource.is_empty() {
                    self.assignments.remove(&day);
                }
            }
            return;
        }
        self.assignments
            .entry(day)
            .or_default()
            .insert(resource_id, effort);
    }

    pub fn clear_assignments(&mut self) {
        self.assignments.clear();
    }

    pub fn is_attached(&self) -> bool {
        self.task_id.is_some()
    }

    /// Whether this allocation's effort is recorded against its resources.
    pub fn is_associated(&self) -> bool {
        self.associated
    }

    pub fn copied_from(&self) -> Option<AllocationId> {
        self.copied_from
    }

    /// Records the effort of this allocation against its resources, making
    /// it visible to [`crate::capacity::ResourceLedger`].
    pub fn associate_assignments_to_resource(&mut self) {
        self.associated = true;
    }

    /// Drops the owner back-reference and the resource-side bookkeeping.
    /// Calling it again has no further effect.
    pub fn detach(&mut self) {
        self.task_id = None;
        self.associated = false;
    }

    /// An unattached working duplicate carrying the same effort, usable to
    /// stage changes that are later merged back with
    /// [`merge_assignments_and_resources_per_day`](Self::merge_assignments_and_resources_per_day).
    pub fn copy(&self) -> Self {
        Self {
            id: self.id,
            task_id: None,
            kind: self.kind.clone(),
            resources_per_day: self.resources_per_day,
            assignments: self.assignments.clone(),
            copied_from: Some(self.id),
            associated: false,
        }
    }

    pub fn is_copy_of(&self, original: &ResourceAllocation) -> bool {
        self.copied_from == Some(original.id) && original.copied_from.is_none()
    }

    /// Replaces this allocation's effort and load with those of `other`.
    ///
    /// `other` must come from [`copy`](Self::copy) of this allocation. The
    /// ledger association is kept, so the resources now see the new effort.
    pub fn merge_assignments_and_resources_per_day(
        &mut self,
        other: &ResourceAllocation,
    ) -> AllocationResult<()> {
        if !other.is_copy_of(self) {
            return Err(AllocationError::InconsistentState { original: self.id });
        }
        self.overwrite_from(other);
        Ok(())
    }

    /// The unchecked half of the merge, for callers that already validated
    /// the provenance of `other`.
    pub(crate) fn overwrite_from(&mut self, other: &ResourceAllocation) {
        self.assignments = other.assignments.clone();
        self.resources_per_day = other.resources_per_day;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn zero_effort_entries_are_not_stored() {
        let mut allocation = ResourceAllocation::specific(AllocationId::new(1), 1, "ana");
        allocation.set_assignment(d(2025, 3, 3), "ana", EffortDuration::hours(4)).unwrap();
        allocation.set_assignment(d(2025, 3, 4), "ana", EffortDuration::hours(8)).unwrap();
        allocation.set_assignment(d(2025, 3, 3), "ana", EffortDuration::ZERO).unwrap();

        assert_eq!(allocation.start(), Some(d(2025, 3, 4)));
        assert_eq!(allocation.end(), Some(d(2025, 3, 4)));
        assert_eq!(allocation.assigned_hours(), EffortDuration::hours(8));
    }

    #[test]
    fn merge_rejects_data_not_copied_from_original() {
        let mut original = ResourceAllocation::specific(AllocationId::new(1), 1, "ana");
        let stranger = ResourceAllocation::specific(AllocationId::new(2), 1, "bob").copy();
        assert_eq!(
            original.merge_assignments_and_resources_per_day(&stranger),
            Err(AllocationError::InconsistentState {
                original: AllocationId::new(1)
            })
        );

        let not_a_copy = original.clone();
        assert!(
            original
                .merge_assignments_and_resources_per_day(&not_a_copy)
                .is_err()
        );
    }

    #[test]
    fn merge_keeps_identity_and_association() {
        let mut original = ResourceAllocation::specific(AllocationId::new(7), 3, "ana");
        original.associate_assignments_to_resource();
        let mut working = original.copy();
        working.set_assignment(d(2025, 3, 3), "ana", EffortDuration::hours(6)).unwrap();
        working.set_resources_per_day(ResourcesPerDay::new(0.75).unwrap());

        original
            .merge_assignments_and_resources_per_day(&working)
            .unwrap();

        assert_eq!(original.id(), AllocationId::new(7));
        assert_eq!(original.task_id(), Some(3));
        assert!(original.is_associated());
        assert_eq!(original.assigned_hours(), EffortDuration::hours(6));
        assert_eq!(original.resources_per_day().amount(), 0.75);
    }

    #[test]
    fn generic_allocation_references_its_pool() {
        let pool = ResourceAllocation::generic(AllocationId::new(1), 1, ["welder"], ["ana", "bob"]);
        assert!(pool.references_worker("bob"));
        assert!(!pool.references_worker("cy"));
        assert_eq!(pool.specific_resource(), None);
    }

    #[test]
    fn effort_for_an_unreferenced_resource_is_rejected() {
        let mut bob = ResourceAllocation::specific(AllocationId::new(2), 1, "bob").copy();
        assert_eq!(
            bob.set_assignment(d(2025, 3, 3), "ana", EffortDuration::hours(8)),
            Err(AllocationError::UnknownResource {
                allocation: AllocationId::new(2),
                resource_id: "ana".to_string(),
            })
        );
        assert_eq!(bob.assigned_hours(), EffortDuration::ZERO);

        let pool = r#"{
            "id": 3, "task_id": 1, "kind": "generic", "criteria": ["welder"], "resources": ["ana"],
            "assignments": { "2025-03-03": { "bob": 480 } }
        }"#;
        assert!(serde_json::from_str::<ResourceAllocation>(pool).is_err());
    }

    #[test]
    fn serialized_allocation_loads_back() {
        let mut pool = ResourceAllocation::generic(AllocationId::new(3), 1, ["welder"], ["ana", "bob"]);
        pool.set_assignment(d(2025, 3, 3), "bob", EffortDuration::hours(8)).unwrap();
        pool.associate_assignments_to_resource();

        let json = serde_json::to_string(&pool).unwrap();
        assert_eq!(serde_json::from_str::<ResourceAllocation>(&json).unwrap(), pool);
    }

    #[test]
    fn resources_per_day_rejects_out_of_range() {
        assert!(ResourcesPerDay::new(0.0).is_err());
        assert!(ResourcesPerDay::new(1.5).is_err());
        assert!(ResourcesPerDay::new(f64::NAN).is_err());
        assert!(ResourcesPerDay::new(0.5).is_ok());
    }
}
